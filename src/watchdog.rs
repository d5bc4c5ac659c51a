//! Connectivity inference for a transport with no connection-state signal.
//!
//! The control protocol is strict request/response with no message IDs, so
//! liveness has to be inferred from traffic: the watchdog issues a status
//! probe every poll period and treats "no reply since the last probe" as
//! "peer unreachable". While disconnected it re-issues the probe on a tight
//! retry period until a reply arrives, then resumes normal polling.
//!
//! Two tasks cooperate here. [`ConnectivityWatchdog`] runs the probe loop
//! and is the only writer of [`ConnectionState`]. [`StatusMonitor`] consumes
//! the control channel's inbound queue, publishes decoded status records,
//! flags reply arrival for the watchdog, and applies the automatic
//! dataset-close policy when the frame stream goes quiet.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{Command, Inbound, StatusRecord};
use crate::recorder::FrameRecorder;
use crate::transport::TransportAdapter;

/// Connectivity as inferred from control-channel traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionState {
    /// Whether the peer answered the most recent probe window.
    pub connected: bool,
    /// Whether a probe is outstanding.
    pub awaiting_reply: bool,
}

/// Probe loop inferring peer liveness.
pub struct ConnectivityWatchdog {
    control: Arc<TransportAdapter>,
    state_tx: watch::Sender<ConnectionState>,
    reply_seen: Arc<AtomicBool>,
    poll_period: Duration,
    retry_period: Duration,
    cancel: CancellationToken,
}

impl ConnectivityWatchdog {
    pub fn new(
        control: Arc<TransportAdapter>,
        state_tx: watch::Sender<ConnectionState>,
        reply_seen: Arc<AtomicBool>,
        poll_period: Duration,
        retry_period: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self { control, state_tx, reply_seen, poll_period, retry_period, cancel }
    }

    /// Run the probe loop until cancelled.
    pub async fn run(self) {
        info!(poll_ms = self.poll_period.as_millis() as u64, "connectivity watchdog started");

        // First probe goes out immediately; the link starts disconnected
        // with a reply outstanding.
        self.probe();
        self.set_state(false, true);
        if !self.pause(self.poll_period).await {
            info!("connectivity watchdog stopped");
            return;
        }

        'poll: loop {
            if self.cancel.is_cancelled() {
                break 'poll;
            }
            if self.reply_seen.swap(false, Ordering::SeqCst) {
                if !self.state_tx.borrow().connected {
                    info!("status reply received, peer connected");
                }
                self.set_state(true, false);
                self.probe();
                self.set_state(true, true);
                if !self.pause(self.poll_period).await {
                    break 'poll;
                }
            } else {
                if self.state_tx.borrow().connected {
                    warn!("no reply to status probe, marking peer disconnected");
                }
                self.set_state(false, true);
                // Re-probe on the tight retry period until a reply shows up;
                // the short sleep doubles as the yield to sibling tasks.
                while !self.reply_seen.load(Ordering::SeqCst) {
                    self.probe();
                    if !self.pause(self.retry_period).await {
                        break 'poll;
                    }
                }
            }
        }

        info!("connectivity watchdog stopped");
    }

    fn probe(&self) {
        match Command::Status.encode() {
            Ok(payload) => self.control.enqueue(payload),
            Err(e) => warn!(error = %e, "could not encode status probe"),
        }
    }

    fn set_state(&self, connected: bool, awaiting_reply: bool) {
        let next = ConnectionState { connected, awaiting_reply };
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    async fn pause(&self, period: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(period) => true,
        }
    }
}

/// Control-channel reply consumer.
pub struct StatusMonitor {
    control: Arc<TransportAdapter>,
    reply_seen: Arc<AtomicBool>,
    status_tx: watch::Sender<Option<StatusRecord>>,
    recorder: Arc<std::sync::Mutex<FrameRecorder>>,
    frame_timeout: watch::Receiver<f64>,
    cancel: CancellationToken,
}

impl StatusMonitor {
    pub fn new(
        control: Arc<TransportAdapter>,
        reply_seen: Arc<AtomicBool>,
        status_tx: watch::Sender<Option<StatusRecord>>,
        recorder: Arc<std::sync::Mutex<FrameRecorder>>,
        frame_timeout: watch::Receiver<f64>,
        cancel: CancellationToken,
    ) -> Self {
        Self { control, reply_seen, status_tx, recorder, frame_timeout, cancel }
    }

    /// Drain the control channel until cancelled.
    pub async fn run(self) {
        info!("status monitor started");
        loop {
            let payload = tokio::select! {
                _ = self.cancel.cancelled() => break,
                payload = self.control.receive() => match payload {
                    Some(payload) => payload,
                    None => break,
                },
            };

            match Inbound::decode(&payload) {
                Ok(Inbound::Status { success, status }) => {
                    if !success {
                        debug!("status reply flagged success=false");
                    }
                    self.reply_seen.store(true, Ordering::SeqCst);
                    self.apply_close_policy(&status);
                    let _ = self.status_tx.send(Some(status));
                }
                Ok(Inbound::Ack(ack)) => {
                    debug!(success = ack.success, "command acknowledged");
                }
                Ok(Inbound::Frame(frame)) => {
                    warn!(frame = frame.frame_number, "frame event on control channel, dropped");
                }
                Ok(Inbound::Unrecognized(value)) => {
                    warn!(payload = %value, "unrecognized control payload, dropped");
                }
                Err(e) => {
                    warn!(error = %e, "malformed control payload, dropped");
                }
            }
        }
        info!("status monitor stopped");
    }

    /// Close the dataset once the frame stream has been quiet past the
    /// timeout. A file that never saw a frame stays open.
    fn apply_close_policy(&self, status: &StatusRecord) {
        let timeout = *self.frame_timeout.borrow();
        if status.time_since_last_message > timeout && status.last_received_frame >= 1 {
            let mut recorder = self.recorder.lock().expect("recorder lock poisoned");
            if recorder.is_open() {
                info!(
                    idle_secs = status.time_since_last_message,
                    timeout_secs = timeout,
                    "frame stream idle past timeout, closing dataset"
                );
                recorder.close();
            }
        }
    }
}
