//! Command-line arguments for the proxy daemon.

use clap::Parser;
use std::time::Duration;

/// Caching proxy for SNMPv2c request/response traffic.
///
/// Clients set the community string of their requests to the hostname of the
/// backend device they want to reach; the proxy rewrites the community,
/// forwards the query, and caches the response.
#[derive(Debug, Parser)]
#[command(name = "snmp-cache-proxy", version)]
pub struct ProxyArgs {
    /// Port to listen on.
    #[arg(long, default_value = "161")]
    pub port: u16,

    /// Community to query on backend devices.
    #[arg(long)]
    pub backend_community: String,

    /// Timeout, in seconds, for each backend query attempt.
    #[arg(long, default_value = "2")]
    pub backend_timeout_sec: u64,

    /// Number of retries for querying backends.
    #[arg(long, default_value = "2")]
    pub num_backend_retries: u32,

    /// Time-to-live, in seconds, for cache entries.
    #[arg(long, default_value = "300")]
    pub cache_ttl_sec: u64,

    /// Enable debug logging (snmp_cache_proxy=debug).
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Enable trace logging (snmp_cache_proxy=trace).
    #[arg(short = 'D', long)]
    pub trace: bool,
}

impl ProxyArgs {
    /// Listen address derived from the configured port.
    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_sec)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_sec)
    }

    /// Initialize tracing based on the debug/trace flags.
    pub fn init_tracing(&self) {
        use tracing_subscriber::EnvFilter;

        let filter = if self.trace {
            "snmp_cache_proxy=trace"
        } else if self.debug {
            "snmp_cache_proxy=debug"
        } else {
            "snmp_cache_proxy=info"
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_writer(std::io::stderr)
            .try_init();
    }
}
