//! Backend query client.
//!
//! One [`query`](BackendClient::query) resolves the backend hostname once,
//! opens an ephemeral UDP socket, and runs the send/await loop: up to
//! `retries + 1` attempts, each bounded by the per-attempt timeout. The
//! timeout aborts the pending receive immediately rather than waiting for a
//! late datagram. The socket is released when the function returns.

use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::util::bind_ephemeral_udp_socket;

/// Well-known SNMP agent port (the `snmp` service).
pub const SNMP_PORT: u16 = 161;

/// Maximum UDP datagram size, used for the reply buffer.
const RECV_BUFFER_SIZE: usize = 65536;

/// UDP client for querying backend agents.
#[derive(Debug, Clone)]
pub struct BackendClient {
    port: u16,
    timeout: Duration,
    retries: u32,
}

impl BackendClient {
    /// Create a client targeting the standard SNMP port.
    ///
    /// `retries` is the number of additional attempts after the first, so a
    /// backend that stays silent costs `timeout * (retries + 1)`.
    pub fn new(timeout: Duration, retries: u32) -> Self {
        Self {
            port: SNMP_PORT,
            timeout,
            retries,
        }
    }

    /// Override the backend port. Deployments behind port redirection and
    /// the test suite's ephemeral mock agents use this.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Send `request` to `host` and return the first reply datagram.
    pub async fn query(&self, host: &str, request: &[u8]) -> Result<Bytes> {
        let start = Instant::now();

        let target = tokio::net::lookup_host((host, self.port))
            .await
            .map_err(|e| Error::Resolve {
                host: host.to_string(),
                source: e,
            })?
            .next()
            .ok_or_else(|| Error::Resolve {
                host: host.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
            })?;

        let socket = bind_ephemeral_udp_socket(target).map_err(|e| Error::io(target, e))?;
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        for attempt in 0..=self.retries {
            if attempt > 0 {
                tracing::debug!(
                    target: "snmp_cache_proxy::backend",
                    backend = %target,
                    attempt,
                    "retrying backend query"
                );
            }

            socket
                .send_to(request, target)
                .await
                .map_err(|e| Error::io(target, e))?;

            match tokio::time::timeout(self.timeout, socket.recv_from(&mut buf)).await {
                Ok(Ok((len, source))) => {
                    tracing::trace!(
                        target: "snmp_cache_proxy::backend",
                        backend = %target,
                        source = %source,
                        bytes = len,
                        "backend reply"
                    );
                    return Ok(Bytes::copy_from_slice(&buf[..len]));
                }
                Ok(Err(e)) => return Err(Error::io(target, e)),
                Err(_) => continue,
            }
        }

        let elapsed = start.elapsed();
        tracing::debug!(
            target: "snmp_cache_proxy::backend",
            backend = %target,
            ?elapsed,
            attempts = self.retries + 1,
            "backend timed out"
        );
        Err(Error::Timeout {
            host: host.to_string(),
            elapsed,
            attempts: self.retries + 1,
        })
    }
}
