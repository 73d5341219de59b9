//! In-process mock backend agents and wire helpers for proxy tests.
//!
//! Backends bind ephemeral localhost ports and shut down on drop, so tests
//! never collide and never leak tasks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use snmp_cache_proxy::SnmpMessage;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A mock backend agent on an ephemeral localhost port.
pub struct MockBackend {
    addr: SocketAddr,
    requests: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Vec<u8>>>>,
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

impl MockBackend {
    /// Agent that answers each request with `respond(request)`; `None`
    /// drops the request. `delay` is applied before every reply.
    pub async fn with_responder<F>(delay: Duration, respond: F) -> Self
    where
        F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock backend");
        let addr = socket.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        let counter = requests.clone();
        let captured = seen.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; 65536];
            loop {
                let (len, peer) = tokio::select! {
                    result = socket.recv_from(&mut buf) => match result {
                        Ok(received) => received,
                        Err(_) => break,
                    },
                    _ = token.cancelled() => break,
                };
                counter.fetch_add(1, Ordering::SeqCst);
                captured.lock().unwrap().push(buf[..len].to_vec());
                if let Some(reply) = respond(&buf[..len]) {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let _ = socket.send_to(&reply, peer).await;
                }
            }
        });

        Self {
            addr,
            requests,
            seen,
            cancel,
            _task: task,
        }
    }

    /// Agent answering every parseable request like a real device would:
    /// echo the community and request id, return a GetResponse carrying the
    /// given PDU suffix.
    pub async fn answering(suffix: Vec<u8>) -> Self {
        Self::answering_after(Duration::ZERO, suffix).await
    }

    /// Like [`answering`](Self::answering), but each reply is delayed.
    pub async fn answering_after(delay: Duration, suffix: Vec<u8>) -> Self {
        Self::with_responder(delay, move |request| {
            let parsed = SnmpMessage::parse(request).ok()?;
            let mut community = parsed.community().to_vec();
            community.extend_from_slice(parsed.community_index());
            Some(build_v2c(&community, 0xA2, *parsed.request_id(), &suffix))
        })
        .await
    }

    /// Agent that never answers.
    #[allow(dead_code)]
    pub async fn silent() -> Self {
        Self::with_responder(Duration::ZERO, |_| None).await
    }

    /// Agent that answers every request with the same fixed bytes.
    #[allow(dead_code)]
    pub async fn canned(reply: Vec<u8>) -> Self {
        Self::with_responder(Duration::ZERO, move |_| Some(reply.clone())).await
    }

    #[allow(dead_code)]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Number of datagrams received so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Raw datagrams received so far.
    #[allow(dead_code)]
    pub fn seen(&self) -> Vec<Vec<u8>> {
        self.seen.lock().unwrap().clone()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Assemble a well-formed SNMPv2c message.
///
/// Independent of the crate's serializer so tests can cross-check its
/// framing against hand-computed BER.
pub fn build_v2c(community: &[u8], pdu_tag: u8, request_id: [u8; 4], data: &[u8]) -> Vec<u8> {
    fn push_length(out: &mut Vec<u8>, value: usize) {
        if value < 0x80 {
            out.push(value as u8);
            return;
        }
        let bytes = value.to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }

    fn length_size(value: usize) -> usize {
        let mut out = Vec::new();
        push_length(&mut out, value);
        out.len()
    }

    let pdu_len = 2 + 4 + data.len();
    let content_len = 3
        + 1
        + length_size(community.len())
        + community.len()
        + 1
        + length_size(pdu_len)
        + pdu_len;

    let mut out = Vec::with_capacity(2 + content_len);
    out.push(0x30);
    push_length(&mut out, content_len);
    out.extend_from_slice(&[0x02, 0x01, 0x01]);
    out.push(0x04);
    push_length(&mut out, community.len());
    out.extend_from_slice(community);
    out.push(pdu_tag);
    push_length(&mut out, pdu_len);
    out.extend_from_slice(&[0x02, 0x04]);
    out.extend_from_slice(&request_id);
    out.extend_from_slice(data);
    out
}

/// A minimal plausible PDU suffix: error-status 0, error-index 0, empty
/// varbind list.
#[allow(dead_code)]
pub fn empty_pdu_suffix() -> Vec<u8> {
    vec![0x02, 0x01, 0x00, 0x02, 0x01, 0x00, 0x30, 0x00]
}
