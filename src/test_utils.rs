//! Shared helpers for crate tests.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::protocol::StatusRecord;
use crate::transport::{Dialer, IoStream, MessageCodec};

const PIPE_CAPACITY: usize = 64 * 1024;

/// Configuration with short periods so tests settle quickly.
pub fn fast_config() -> LinkConfig {
    LinkConfig {
        poll_period_ms: 20,
        retry_period_ms: 10,
        reconnect_backoff_ms: 10,
        write_backoff_ms: 10,
        closed_backoff_ms: 20,
        ..LinkConfig::default()
    }
}

/// Install a compact subscriber for test debugging. Safe to call repeatedly.
#[allow(dead_code)]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Dialer handing out pre-created in-memory pipes, one per dial.
///
/// Once the queue is exhausted further dials fail, which exercises the
/// adapter's reconnect backoff path.
pub struct DuplexDialer {
    streams: std::sync::Mutex<VecDeque<DuplexStream>>,
}

impl DuplexDialer {
    /// Dialer with exactly one connection; returns the peer end.
    pub fn single() -> (Arc<Self>, DuplexStream) {
        let (dialer, mut peers) = Self::with_connections(1);
        (dialer, peers.remove(0))
    }

    /// Dialer with `count` sequential connections; returns the peer ends in
    /// dial order.
    pub fn with_connections(count: usize) -> (Arc<Self>, Vec<DuplexStream>) {
        let mut streams = VecDeque::new();
        let mut peers = Vec::new();
        for _ in 0..count {
            let (local, peer) = tokio::io::duplex(PIPE_CAPACITY);
            streams.push_back(local);
            peers.push(peer);
        }
        (Arc::new(Self { streams: std::sync::Mutex::new(streams) }), peers)
    }
}

#[async_trait::async_trait]
impl Dialer for DuplexDialer {
    async fn dial(&self) -> Result<IoStream> {
        match self.streams.lock().unwrap().pop_front() {
            Some(stream) => Ok(Box::new(stream) as IoStream),
            None => Err(LinkError::transport("no test connection available")),
        }
    }

    fn endpoint(&self) -> String {
        "duplex".to_string()
    }
}

/// The device side of a test pipe, framed like the real wire.
pub struct PeerChannel {
    framed: Framed<DuplexStream, MessageCodec>,
}

impl PeerChannel {
    pub fn new(stream: DuplexStream) -> Self {
        Self { framed: Framed::new(stream, MessageCodec::new()) }
    }

    /// Next message from the adapter, or `None` once the pipe is closed.
    pub async fn read(&mut self) -> Option<Bytes> {
        match self.framed.next().await {
            Some(Ok(payload)) => Some(payload),
            _ => None,
        }
    }

    /// Send one message to the adapter.
    pub async fn write(&mut self, payload: &[u8]) {
        self.framed.send(Bytes::copy_from_slice(payload)).await.expect("peer write failed");
    }
}

/// A well-formed status reply payload.
pub fn status_reply(last_received: i64, last_processed: i64, time_since: f64) -> Vec<u8> {
    let status = StatusRecord {
        state: 0,
        version: "1.0.0".to_string(),
        process_duration: 100.0,
        process_period: 1000.0,
        last_received_frame: last_received,
        last_processed_frame: last_processed,
        time_since_last_message: time_since,
        current_attenuation: 15,
    };
    serde_json::to_vec(&serde_json::json!({ "success": true, "status": status }))
        .expect("status reply serialization")
}
