//! The controller link facade.
//!
//! [`ControllerLink`] is what the process-variable layer holds: typed
//! command methods gated on connectivity, the decoded status and frame
//! streams, the recorder lifecycle, and a deterministic shutdown. All the
//! moving parts (adapters, watchdog, monitor, event consumer) are wired and
//! spawned at construction and owned by the supervisor until
//! [`shutdown`](ControllerLink::shutdown).

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::LinkConfig;
use crate::gate::CommandGate;
use crate::protocol::{Command, ConfigureParams, FrameRecord, StatusRecord};
use crate::recorder::FrameRecorder;
use crate::supervisor::Supervisor;
use crate::transport::{ChannelMode, Dialer, TcpDialer, TransportAdapter};
use crate::watchdog::{ConnectionState, ConnectivityWatchdog, StatusMonitor};

/// Live link to an attenuation controller.
pub struct ControllerLink {
    gate: CommandGate,
    state_rx: watch::Receiver<ConnectionState>,
    status_rx: watch::Receiver<Option<StatusRecord>>,
    frame_rx: watch::Receiver<Option<FrameRecord>>,
    frame_timeout_tx: watch::Sender<f64>,
    recorder: Arc<std::sync::Mutex<FrameRecorder>>,
    supervisor: Supervisor,
}

impl ControllerLink {
    /// Build a link over the given dialers and start its background tasks.
    ///
    /// Must be called from within a tokio runtime. The link starts
    /// disconnected; the watchdog brings `connected` up once the peer
    /// answers its first probe.
    pub fn with_dialers(
        config: LinkConfig,
        control_dialer: Arc<dyn Dialer>,
        event_dialer: Arc<dyn Dialer>,
    ) -> Self {
        let cancel = CancellationToken::new();

        let control = Arc::new(TransportAdapter::new(
            ChannelMode::Request,
            "control",
            control_dialer,
            &config,
            cancel.child_token(),
        ));
        let event = Arc::new(TransportAdapter::new(
            ChannelMode::Subscribe,
            "event",
            event_dialer,
            &config,
            cancel.child_token(),
        ));

        let (state_tx, state_rx) = watch::channel(ConnectionState::default());
        let (status_tx, status_rx) = watch::channel(None);
        let (frame_tx, frame_rx) = watch::channel(None);
        let (frame_timeout_tx, frame_timeout_rx) = watch::channel(config.frame_timeout_secs);
        let reply_seen = Arc::new(AtomicBool::new(false));

        let mut recorder = FrameRecorder::new();
        if let Some(path) = &config.dataset_path {
            recorder.set_target_path(path);
        }
        let recorder = Arc::new(std::sync::Mutex::new(recorder));

        let watchdog = ConnectivityWatchdog::new(
            Arc::clone(&control),
            state_tx,
            Arc::clone(&reply_seen),
            config.poll_period(),
            config.retry_period(),
            cancel.child_token(),
        );
        let monitor = StatusMonitor::new(
            Arc::clone(&control),
            reply_seen,
            status_tx,
            Arc::clone(&recorder),
            frame_timeout_rx,
            cancel.child_token(),
        );

        let supervisor = Supervisor::spawn(
            Arc::clone(&control),
            event,
            watchdog,
            monitor,
            Arc::clone(&recorder),
            frame_tx,
            cancel,
        );
        let gate = CommandGate::new(control, state_rx.clone());

        info!(
            control = %config.control_addr(),
            event = %config.event_addr(),
            "controller link started"
        );

        Self { gate, state_rx, status_rx, frame_rx, frame_timeout_tx, recorder, supervisor }
    }

    // --- connectivity -----------------------------------------------------

    /// Whether the peer answered the most recent probe window.
    pub fn connected(&self) -> bool {
        self.state_rx.borrow().connected
    }

    /// Full connection state, including whether a probe is outstanding.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    // --- commands ---------------------------------------------------------

    /// Enqueue a raw pre-encoded control payload, if connected.
    pub fn enqueue(&self, message: Bytes) -> bool {
        self.gate.try_send_raw(message)
    }

    /// Request an extra status reply outside the watchdog's cadence.
    pub fn request_status(&self) -> bool {
        self.gate.try_send(&Command::Status)
    }

    /// Send a `configure` command.
    pub fn configure(&self, params: ConfigureParams) -> bool {
        self.gate.try_send(&Command::Configure { params })
    }

    pub fn reset(&self) -> bool {
        self.gate.try_send(&Command::Reset)
    }

    pub fn clear_error(&self) -> bool {
        self.gate.try_send(&Command::ClearError)
    }

    pub fn singleshot(&self) -> bool {
        self.gate.try_send(&Command::Singleshot)
    }

    /// Ask the device process to shut itself down.
    pub fn shutdown_device(&self) -> bool {
        self.gate.try_send(&Command::Shutdown)
    }

    /// Configure the frame timeout on the device and in the local automatic
    /// close policy.
    pub fn set_frame_timeout(&self, secs: f64) -> bool {
        if !self.gate.try_send(&Command::Configure { params: ConfigureParams::timeout(secs) }) {
            return false;
        }
        let _ = self.frame_timeout_tx.send(secs);
        true
    }

    // --- status and frames ------------------------------------------------

    /// Latest decoded status, if any reply has arrived yet.
    pub fn current_status(&self) -> Option<StatusRecord> {
        self.status_rx.borrow().clone()
    }

    /// Await the next status reply.
    ///
    /// Returns `None` once the link is shut down.
    pub async fn receive_status(&self) -> Option<StatusRecord> {
        let mut status_rx = self.status_rx.clone();
        loop {
            if status_rx.changed().await.is_err() {
                return None;
            }
            if let Some(status) = status_rx.borrow_and_update().clone() {
                return Some(status);
            }
        }
    }

    /// Await the next frame event.
    ///
    /// Returns `None` once the link is shut down.
    pub async fn receive_event(&self) -> Option<FrameRecord> {
        let mut frame_rx = self.frame_rx.clone();
        loop {
            if frame_rx.changed().await.is_err() {
                return None;
            }
            if let Some(frame) = frame_rx.borrow_and_update().clone() {
                return Some(frame);
            }
        }
    }

    /// Stream of decoded status replies.
    pub fn status_updates(&self) -> impl Stream<Item = StatusRecord> + 'static {
        WatchStream::new(self.status_rx.clone()).filter_map(|opt| async move { opt })
    }

    /// Stream of decoded frame events.
    pub fn frame_events(&self) -> impl Stream<Item = FrameRecord> + 'static {
        WatchStream::new(self.frame_rx.clone()).filter_map(|opt| async move { opt })
    }

    // --- recorder ---------------------------------------------------------

    /// Set the acquisition file path for the next open.
    pub fn set_target_path(&self, path: &str) -> bool {
        self.recorder.lock().expect("recorder lock poisoned").set_target_path(path)
    }

    /// Open the acquisition file.
    pub fn open(&self) -> bool {
        self.recorder.lock().expect("recorder lock poisoned").open()
    }

    /// Close the acquisition file. A no-op if nothing is open.
    pub fn close(&self) {
        self.recorder.lock().expect("recorder lock poisoned").close();
    }

    /// Whether an acquisition file is currently open.
    pub fn recording(&self) -> bool {
        self.recorder.lock().expect("recorder lock poisoned").is_open()
    }

    // --- lifecycle --------------------------------------------------------

    /// Stop every background task, then flush and close the recorder.
    pub async fn shutdown(self) {
        self.supervisor.shutdown().await;
    }
}

/// Unified entry point for controller links.
pub struct Filterlink;

impl Filterlink {
    /// Connect to a device over TCP.
    ///
    /// Returns immediately; connection establishment, liveness probing, and
    /// reconnection all happen in background tasks. Use
    /// [`ControllerLink::connected`] or the status stream to observe when
    /// the peer becomes reachable.
    pub async fn connect(config: LinkConfig) -> crate::Result<ControllerLink> {
        let control_dialer = Arc::new(TcpDialer::new(config.control_addr()));
        let event_dialer = Arc::new(TcpDialer::new(config.event_addr()));
        Ok(ControllerLink::with_dialers(config, control_dialer, event_dialer))
    }
}
