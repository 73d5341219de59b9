//! The proxy daemon.

use clap::Parser;
use snmp_cache_proxy::Proxy;
use snmp_cache_proxy::cli::ProxyArgs;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = ProxyArgs::parse();
    args.init_tracing();

    let proxy = match Proxy::builder()
        .bind(args.bind_addr())
        .backend_community(args.backend_community.as_bytes())
        .backend_timeout(args.backend_timeout())
        .backend_retries(args.num_backend_retries)
        .cache_ttl(args.cache_ttl())
        .build()
        .await
    {
        Ok(proxy) => proxy,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = proxy.run().await {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
