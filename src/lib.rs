//! # snmp-cache-proxy
//!
//! Caching proxy for SNMPv2c request/response traffic.
//!
//! Network-management clients address the proxy as if it were a managed
//! device and set the community string of each request to the hostname of
//! the backend they actually want. The proxy rewrites the community, queries
//! the backend over UDP with retries, and caches responses keyed by
//! (backend, community, context suffix, PDU type, PDU payload) so polling
//! systems do not hammer managed devices. Cached and synthesized responses
//! always carry the asking client's own request id.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snmp_cache_proxy::Proxy;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), snmp_cache_proxy::Error> {
//!     let proxy = Proxy::builder()
//!         .bind("0.0.0.0:161")
//!         .backend_community(b"public")
//!         .backend_timeout(Duration::from_secs(2))
//!         .cache_ttl(Duration::from_secs(300))
//!         .build()
//!         .await?;
//!
//!     proxy.run().await
//! }
//! ```
//!
//! A backend that stays silent through every retry yields a cached
//! `GetResponse` with error-status `resourceUnavailable`, so a dead device
//! costs its pollers one timeout per TTL instead of one per poll.

pub mod backend;
pub mod ber;
pub mod cache;
pub mod error;
pub mod message;
pub mod proxy;

mod flight;
pub(crate) mod util;

#[cfg(feature = "cli")]
pub mod cli;

// Re-exports for convenience
pub use backend::{BackendClient, SNMP_PORT};
pub use cache::{Cache, CacheKey};
pub use error::{DecodeErrorKind, Error, Result};
pub use message::{PduType, RESOURCE_UNAVAILABLE, SnmpMessage};
pub use proxy::{Proxy, ProxyBuilder};
