//! The proxy front end.
//!
//! [`Proxy`] binds the listening socket, classifies incoming datagrams, and
//! orchestrates the request lifecycle: cache lookup, backend query behind a
//! per-key singleflight, and synthesis of the client-facing response around
//! the client's own request id.
//!
//! Clients address the proxy as if it were the managed device itself and
//! name the real backend in the community string. An optional `@` suffix is
//! forwarded to the backend appended to the configured backend community,
//! so context-addressed agents (per-VRF views and the like) work through
//! the proxy unchanged.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::backend::{BackendClient, SNMP_PORT};
use crate::cache::{Cache, CacheKey};
use crate::error::{Error, Result};
use crate::flight::{Entry, Flight};
use crate::message::{PduType, RESOURCE_UNAVAILABLE, SnmpMessage};
use crate::util::bind_udp_socket;

/// Maximum UDP datagram size, used for the receive buffer.
const RECV_BUFFER_SIZE: usize = 65536;

/// Default bound on concurrently handled client requests.
const DEFAULT_MAX_IN_FLIGHT: usize = 1000;

/// Builder for [`Proxy`].
pub struct ProxyBuilder {
    bind_addr: String,
    backend_community: Bytes,
    backend_port: u16,
    backend_timeout: Duration,
    backend_retries: u32,
    cache_ttl: Duration,
    max_in_flight: usize,
    cancel: Option<CancellationToken>,
}

impl ProxyBuilder {
    /// Create a builder with the stock defaults: listen on `0.0.0.0:161`,
    /// query backends on port 161 with a 2-second per-attempt timeout and
    /// 2 retries, cache entries for 300 seconds.
    pub fn new() -> Self {
        Self {
            bind_addr: "0.0.0.0:161".to_string(),
            backend_community: Bytes::new(),
            backend_port: SNMP_PORT,
            backend_timeout: Duration::from_secs(2),
            backend_retries: 2,
            cache_ttl: Duration::from_secs(300),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            cancel: None,
        }
    }

    /// Set the UDP listen address (default `0.0.0.0:161`).
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Community string sent to backends in place of the client's routing
    /// token. A client's `@` suffix is appended to it.
    pub fn backend_community(mut self, community: &[u8]) -> Self {
        self.backend_community = Bytes::copy_from_slice(community);
        self
    }

    /// Backend agent port (default 161). Tests point this at ephemeral
    /// mock agents.
    pub fn backend_port(mut self, port: u16) -> Self {
        self.backend_port = port;
        self
    }

    /// Per-attempt backend timeout (default 2 seconds).
    pub fn backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    /// Additional backend attempts after the first (default 2).
    pub fn backend_retries(mut self, retries: u32) -> Self {
        self.backend_retries = retries;
        self
    }

    /// Cache entry TTL and sweeper period (default 300 seconds).
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Bound on concurrently handled client requests (default 1000).
    pub fn max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = limit;
        self
    }

    /// Use an external cancellation token for shutdown.
    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Bind the listening socket and start the cache sweeper.
    ///
    /// A bind failure here is fatal to the caller; nothing else can fail.
    pub async fn build(self) -> Result<Proxy> {
        let bind_addr: SocketAddr = self
            .bind_addr
            .parse()
            .map_err(|_| Error::Config(format!("invalid bind address: {}", self.bind_addr)))?;

        let socket = bind_udp_socket(bind_addr).map_err(|e| Error::Bind {
            addr: bind_addr,
            source: e,
        })?;
        let local_addr = socket.local_addr().map_err(|e| Error::Bind {
            addr: bind_addr,
            source: e,
        })?;

        let cancel = self.cancel.unwrap_or_default();
        let cache = Arc::new(Cache::new(self.cache_ttl));
        Arc::clone(&cache).spawn_sweeper(cancel.clone());

        tracing::info!(
            target: "snmp_cache_proxy::proxy",
            local_addr = %local_addr,
            cache_ttl = ?self.cache_ttl,
            backend_timeout = ?self.backend_timeout,
            backend_retries = self.backend_retries,
            "proxy bound"
        );

        Ok(Proxy {
            inner: Arc::new(ProxyInner {
                socket,
                local_addr,
                backend_community: self.backend_community,
                backend: BackendClient::new(self.backend_timeout, self.backend_retries)
                    .with_port(self.backend_port),
                cache,
                flight: Flight::new(),
                limit: Arc::new(Semaphore::new(self.max_in_flight)),
                cancel,
            }),
        })
    }
}

impl Default for ProxyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct ProxyInner {
    socket: UdpSocket,
    local_addr: SocketAddr,
    backend_community: Bytes,
    backend: BackendClient,
    cache: Arc<Cache>,
    flight: Flight,
    limit: Arc<Semaphore>,
    cancel: CancellationToken,
}

/// Caching SNMPv2c proxy.
///
/// Cheap to clone; all clones share the socket, cache, and in-flight state.
#[derive(Debug, Clone)]
pub struct Proxy {
    inner: Arc<ProxyInner>,
}

impl Proxy {
    /// Create a builder for configuring the proxy.
    pub fn builder() -> ProxyBuilder {
        ProxyBuilder::new()
    }

    /// Local address of the listening socket.
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Cancellation token controlling [`run`](Self::run) and the sweeper.
    pub fn cancel(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Receive and serve client requests until cancelled.
    ///
    /// Each accepted datagram is handled on its own task, bounded by the
    /// configured in-flight limit, so one slow backend does not stall other
    /// clients. Malformed datagrams and non-request PDU types are dropped
    /// silently.
    pub async fn run(&self) -> Result<()> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            let (len, peer) = tokio::select! {
                result = self.inner.socket.recv_from(&mut buf) => match result {
                    Ok(received) => received,
                    Err(e) => {
                        tracing::error!(target: "snmp_cache_proxy::proxy", error = %e, "recv error");
                        continue;
                    }
                },
                _ = self.inner.cancel.cancelled() => {
                    tracing::info!(target: "snmp_cache_proxy::proxy", "proxy shutdown requested");
                    return Ok(());
                }
            };

            let mut message = match SnmpMessage::parse(&buf[..len]) {
                Ok(message) => message,
                Err(e) => {
                    tracing::debug!(
                        target: "snmp_cache_proxy::proxy",
                        source = %peer,
                        bytes = len,
                        error = %e,
                        "dropping malformed datagram"
                    );
                    continue;
                }
            };

            if !message.pdu_type().is_request() {
                tracing::debug!(
                    target: "snmp_cache_proxy::proxy",
                    source = %peer,
                    pdu_type = %message.pdu_type(),
                    "dropping unsupported PDU type"
                );
                continue;
            }

            // The community is the routing token; it has to name a resolvable
            // backend host.
            let Ok(host) = std::str::from_utf8(message.community()) else {
                tracing::debug!(
                    target: "snmp_cache_proxy::proxy",
                    source = %peer,
                    "dropping request with non-UTF-8 community"
                );
                continue;
            };
            let host = host.to_string();

            tracing::debug!(
                target: "snmp_cache_proxy::proxy",
                source = %peer,
                community = %host,
                pdu_type = %message.pdu_type(),
                "got SNMPv2c request"
            );

            let key = CacheKey {
                backend_host: host.clone(),
                community: message.community().clone(),
                community_index: message.community_index().clone(),
                pdu_type: message.pdu_type(),
                data: message.data().clone(),
            };

            // The backend sees the configured community with the client's
            // context suffix carried through.
            let mut outbound = BytesMut::with_capacity(
                self.inner.backend_community.len() + message.community_index().len(),
            );
            outbound.extend_from_slice(&self.inner.backend_community);
            outbound.extend_from_slice(message.community_index());
            message.set_community(outbound.freeze());

            let permit = self
                .inner
                .limit
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore closed");
            let proxy = self.clone();

            tokio::spawn(async move {
                if let Some(response) = proxy.get_response(&host, key, message).await {
                    if let Err(e) = proxy.inner.socket.send_to(&response, peer).await {
                        tracing::debug!(
                            target: "snmp_cache_proxy::proxy",
                            client = %peer,
                            error = %e,
                            "failed to send response"
                        );
                    }
                }
                drop(permit);
            });
        }
    }

    /// Produce the response bytes for one rewritten client request, or
    /// `None` when the request fails silently (backend unresolvable).
    #[instrument(
        level = "debug",
        skip(self, key, request),
        fields(snmp.backend = %host, snmp.pdu_type = %request.pdu_type())
    )]
    async fn get_response(&self, host: &str, key: CacheKey, request: SnmpMessage) -> Option<Bytes> {
        loop {
            if let Some(cached) = self.inner.cache.lookup(&key) {
                tracing::debug!(target: "snmp_cache_proxy::proxy", "cache hit");
                let mut response = request.clone();
                response.set_community(Bytes::copy_from_slice(host.as_bytes()));
                response.set_pdu_type(PduType::GetResponse);
                response.set_data(cached);
                return Some(response.serialize());
            }

            match self.inner.flight.begin(&key) {
                Entry::Leader(guard) => {
                    let response = self.query_backend(host, &key, &request).await;
                    drop(guard);
                    return response;
                }
                Entry::Waiter(done) => {
                    // Another task is querying this exact key; take its result
                    // from the cache once it lands.
                    done.cancelled().await;
                }
            }
        }
    }

    /// Query the backend and turn the outcome into client-facing bytes,
    /// caching whatever can serve future identical requests.
    async fn query_backend(&self, host: &str, key: &CacheKey, request: &SnmpMessage) -> Option<Bytes> {
        let wire = request.serialize();

        match self.inner.backend.query(host, &wire).await {
            Ok(reply) => match SnmpMessage::parse(&reply) {
                Ok(mut parsed) => {
                    // Cache only the PDU suffix; a future hit is synthesized
                    // around that client's own request id.
                    self.inner.cache.insert(key.clone(), parsed.data().clone());
                    parsed.set_community(Bytes::copy_from_slice(host.as_bytes()));
                    Some(parsed.serialize())
                }
                Err(e) => {
                    tracing::debug!(
                        target: "snmp_cache_proxy::proxy",
                        backend = %host,
                        bytes = reply.len(),
                        error = %e,
                        "forwarding unparseable backend reply verbatim"
                    );
                    Some(reply)
                }
            },
            Err(e) if e.is_timeout() => {
                tracing::debug!(
                    target: "snmp_cache_proxy::proxy",
                    backend = %host,
                    "backend silent, synthesizing resourceUnavailable"
                );
                let mut response = request.clone();
                response.set_community(Bytes::copy_from_slice(host.as_bytes()));
                response.set_pdu_type(PduType::GetResponse);
                response.set_error(RESOURCE_UNAVAILABLE);
                self.inner.cache.insert(key.clone(), response.data().clone());
                Some(response.serialize())
            }
            Err(e) => {
                tracing::warn!(
                    target: "snmp_cache_proxy::proxy",
                    backend = %host,
                    error = %e,
                    "backend query failed"
                );
                None
            }
        }
    }
}
