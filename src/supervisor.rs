//! Task supervision and coordinated shutdown.
//!
//! Every background loop of a link (the two adapters' loops, the watchdog,
//! the status monitor, and the event consumer) is spawned here and its
//! handle kept. [`Supervisor::shutdown`] cancels the shared token, joins
//! every task, and only then flushes and closes the recorder, so a link
//! never relies on process exit for clean file or socket release.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::protocol::{FrameRecord, Inbound};
use crate::recorder::FrameRecorder;
use crate::transport::TransportAdapter;
use crate::watchdog::{ConnectivityWatchdog, StatusMonitor};

/// Owner of a link's background tasks.
pub struct Supervisor {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    control: Arc<TransportAdapter>,
    event: Arc<TransportAdapter>,
    recorder: Arc<std::sync::Mutex<FrameRecorder>>,
}

impl Supervisor {
    /// Spawn every loop of a link and collect their handles.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        control: Arc<TransportAdapter>,
        event: Arc<TransportAdapter>,
        watchdog: ConnectivityWatchdog,
        monitor: StatusMonitor,
        recorder: Arc<std::sync::Mutex<FrameRecorder>>,
        frame_tx: watch::Sender<Option<FrameRecord>>,
        cancel: CancellationToken,
    ) -> Self {
        let mut tasks = Vec::new();
        tasks.extend(Arc::clone(&control).run());
        tasks.extend(Arc::clone(&event).run());
        tasks.push(tokio::spawn(watchdog.run()));
        tasks.push(tokio::spawn(monitor.run()));

        let event_adapter = Arc::clone(&event);
        let event_recorder = Arc::clone(&recorder);
        let event_cancel = cancel.child_token();
        tasks.push(tokio::spawn(async move {
            Self::event_loop(event_adapter, event_recorder, frame_tx, event_cancel).await;
        }));

        Self { cancel, tasks, control, event, recorder }
    }

    /// Event-channel consumer: decodes frame messages, records them, and
    /// republishes them for subscribers.
    async fn event_loop(
        event: Arc<TransportAdapter>,
        recorder: Arc<std::sync::Mutex<FrameRecorder>>,
        frame_tx: watch::Sender<Option<FrameRecord>>,
        cancel: CancellationToken,
    ) {
        info!("event consumer started");
        loop {
            let payload = tokio::select! {
                _ = cancel.cancelled() => break,
                payload = event.receive() => match payload {
                    Some(payload) => payload,
                    None => break,
                },
            };

            match Inbound::decode(&payload) {
                Ok(Inbound::Frame(frame)) => {
                    {
                        let mut recorder = recorder.lock().expect("recorder lock poisoned");
                        if recorder.is_open() {
                            if let Err(e) = recorder.write(&frame) {
                                error!(
                                    frame = frame.frame_number,
                                    error = %e,
                                    "failed to record frame"
                                );
                            }
                        } else {
                            warn!(frame = frame.frame_number, "frame received with no open dataset");
                        }
                    }
                    let _ = frame_tx.send(Some(frame));
                }
                Ok(Inbound::Status { .. }) | Ok(Inbound::Ack(_)) => {
                    warn!("control reply on event channel, dropped");
                }
                Ok(Inbound::Unrecognized(value)) => {
                    warn!(payload = %value, "unrecognized event payload, dropped");
                }
                Err(e) => {
                    warn!(error = %e, "malformed event payload, dropped");
                }
            }
        }
        info!("event consumer stopped");
    }

    /// Cancel, join every task, then flush and close the recorder.
    pub async fn shutdown(mut self) {
        info!("shutting down link tasks");
        self.cancel.cancel();
        self.control.close();
        self.event.close();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!("link task panicked during shutdown");
                } else {
                    debug!(error = %e, "link task join failed");
                }
            }
        }
        self.recorder.lock().expect("recorder lock poisoned").close();
        info!("link shutdown complete");
    }
}
