//! Queue-decoupled transport adapter.
//!
//! A [`TransportAdapter`] owns one logical connection to one channel of the
//! device: request/reply for control traffic, subscribe for the event
//! stream. Callers talk to queues, never to the socket: [`enqueue`] appends
//! to an unbounded outbound queue and returns immediately, [`receive`]
//! awaits the next inbound message in arrival order. Two loops move data
//! between the queues and the socket as independently scheduled tasks, so a
//! slow consumer never stalls the socket read and a stalled socket never
//! blocks enqueuing callers.
//!
//! The receive loop owns the connection: it dials, installs the write half
//! for the send loop, reads until the socket fails, then backs off and dials
//! again, forever. An outbound item consumed while the socket is down or
//! failing is logged and dropped after a fixed pause; the only guarantee on
//! the send path is that the loop survives.
//!
//! [`enqueue`]: TransportAdapter::enqueue
//! [`receive`]: TransportAdapter::receive

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::codec::MessageCodec;
use super::dialer::{Dialer, IoStream};
use crate::config::LinkConfig;

type MessageSink = FramedWrite<WriteHalf<IoStream>, MessageCodec>;
type MessageSource = FramedRead<ReadHalf<IoStream>, MessageCodec>;

/// Socket pattern served by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// Request/reply; the adapter both sends and receives.
    Request,
    /// Publish/subscribe; the adapter only receives and `enqueue` is a
    /// logged no-op.
    Subscribe,
}

/// Adapter for one message channel of the device.
pub struct TransportAdapter {
    mode: ChannelMode,
    label: &'static str,
    dialer: Arc<dyn Dialer>,
    max_message_bytes: usize,
    reconnect_backoff: Duration,
    write_backoff: Duration,
    closed_backoff: Duration,
    outbound_tx: mpsc::UnboundedSender<Bytes>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
    inbound_tx: mpsc::UnboundedSender<Bytes>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    writer: Mutex<Option<MessageSink>>,
    running: AtomicBool,
    cancel: CancellationToken,
}

impl TransportAdapter {
    /// Create an adapter for `dialer`'s endpoint.
    ///
    /// `label` names the channel in log lines. Nothing connects until
    /// [`run`](Self::run) is called.
    pub fn new(
        mode: ChannelMode,
        label: &'static str,
        dialer: Arc<dyn Dialer>,
        config: &LinkConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            mode,
            label,
            dialer,
            max_message_bytes: config.max_message_bytes,
            reconnect_backoff: config.reconnect_backoff(),
            write_backoff: config.write_backoff(),
            closed_backoff: config.closed_backoff(),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            writer: Mutex::new(None),
            running: AtomicBool::new(false),
            cancel,
        }
    }

    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Append a message to the outbound queue.
    ///
    /// Never blocks and never reports failure to the caller; the send loop
    /// owns delivery. On a subscribe channel this is a logged no-op.
    pub fn enqueue(&self, message: Bytes) {
        if self.mode == ChannelMode::Subscribe {
            debug!(channel = self.label, "enqueue ignored on subscribe channel");
            return;
        }
        if self.outbound_tx.send(message).is_err() {
            debug!(channel = self.label, "enqueue after close, message dropped");
        }
    }

    /// Await the next inbound message.
    ///
    /// Messages arrive in wire order and none are dropped while the adapter
    /// runs. Returns `None` once the adapter is closed and the queue is
    /// drained.
    pub async fn receive(&self) -> Option<Bytes> {
        let mut inbound = self.inbound_rx.lock().await;
        tokio::select! {
            message = inbound.recv() => message,
            _ = self.cancel.cancelled() => inbound.try_recv().ok(),
        }
    }

    /// Start the adapter loops.
    ///
    /// Idempotent: a second call while running returns no new tasks. The
    /// returned handles belong to the supervisor, which joins them at
    /// shutdown.
    pub fn run(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        if self.cancel.is_cancelled() {
            warn!(channel = self.label, "adapter is closed, not starting");
            return Vec::new();
        }
        if self.running.swap(true, Ordering::SeqCst) {
            debug!(channel = self.label, "adapter already running");
            return Vec::new();
        }

        let mut handles = Vec::new();
        let adapter = Arc::clone(&self);
        handles.push(tokio::spawn(async move { adapter.receive_loop().await }));
        if self.mode == ChannelMode::Request {
            let adapter = Arc::clone(&self);
            handles.push(tokio::spawn(async move { adapter.send_loop().await }));
        }
        handles
    }

    /// Stop the loops and release the socket. Reentrant.
    pub fn close(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!(channel = self.label, "closing transport adapter");
        }
        self.cancel.cancel();
    }

    /// Dials, reads, and redials until cancelled.
    async fn receive_loop(self: Arc<Self>) {
        info!(channel = self.label, endpoint = %self.dialer.endpoint(), "receive loop started");
        'connect: loop {
            let stream = tokio::select! {
                _ = self.cancel.cancelled() => break 'connect,
                dialed = self.dialer.dial() => match dialed {
                    Ok(stream) => stream,
                    Err(e) => {
                        debug!(channel = self.label, error = %e, "dial failed, backing off");
                        if !self.pause(self.reconnect_backoff).await {
                            break 'connect;
                        }
                        continue 'connect;
                    }
                },
            };
            info!(channel = self.label, "socket connected");

            let (read_half, write_half) = tokio::io::split(stream);
            let mut source: MessageSource =
                FramedRead::new(read_half, MessageCodec::with_max_length(self.max_message_bytes));
            if self.mode == ChannelMode::Request {
                let sink: MessageSink = FramedWrite::new(
                    write_half,
                    MessageCodec::with_max_length(self.max_message_bytes),
                );
                *self.writer.lock().await = Some(sink);
            }

            'read: loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break 'connect,
                    next = source.next() => match next {
                        Some(Ok(payload)) => {
                            trace!(channel = self.label, bytes = payload.len(), "message received");
                            if self.inbound_tx.send(payload).is_err() {
                                debug!(channel = self.label, "inbound queue gone, stopping");
                                break 'connect;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(channel = self.label, error = %e, "socket read failed");
                            break 'read;
                        }
                        None => {
                            warn!(channel = self.label, "peer closed the socket");
                            break 'read;
                        }
                    },
                }
            }

            self.writer.lock().await.take();
            if !self.pause(self.reconnect_backoff).await {
                break 'connect;
            }
        }

        self.writer.lock().await.take();
        info!(channel = self.label, "receive loop ended");
    }

    /// Drains the outbound queue onto the socket.
    async fn send_loop(self: Arc<Self>) {
        let Some(mut outbound) = self.outbound_rx.lock().await.take() else {
            debug!(channel = self.label, "send loop already claimed");
            return;
        };
        info!(channel = self.label, "send loop started");
        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => break,
                message = outbound.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            self.dispatch(message).await;
        }
        info!(channel = self.label, "send loop ended");
    }

    /// One delivery attempt. A failed or unwritable attempt pauses the loop;
    /// the item is not redelivered.
    async fn dispatch(&self, message: Bytes) {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(sink) => {
                if let Err(e) = sink.send(message).await {
                    warn!(channel = self.label, error = %e, "socket write failed, backing off");
                    drop(writer);
                    self.pause(self.write_backoff).await;
                }
            }
            None => {
                debug!(channel = self.label, "socket closed, pausing send loop");
                drop(writer);
                self.pause(self.closed_backoff).await;
            }
        }
    }

    /// Sleep unless cancelled first; returns false on cancellation.
    async fn pause(&self, period: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(period) => true,
        }
    }
}
