//! Connectivity precondition for command senders.
//!
//! Every operation that issues a command to the device goes through a
//! [`CommandGate`], which checks the watchdog's connection state first. A
//! command issued while disconnected is dropped and logged, never queued;
//! nothing stale is replayed when the link comes back.

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::protocol::Command;
use crate::transport::TransportAdapter;
use crate::watchdog::ConnectionState;
use std::sync::Arc;

/// Gate between command-issuing callers and the control channel.
#[derive(Clone)]
pub struct CommandGate {
    control: Arc<TransportAdapter>,
    state: watch::Receiver<ConnectionState>,
}

impl CommandGate {
    pub fn new(control: Arc<TransportAdapter>, state: watch::Receiver<ConnectionState>) -> Self {
        Self { control, state }
    }

    /// Current connectivity as seen by the watchdog.
    pub fn connected(&self) -> bool {
        self.state.borrow().connected
    }

    /// The precondition every command send checks.
    ///
    /// A command issued while disconnected is a [`LinkError::Disconnected`];
    /// it is dropped at the call site, never queued for replay.
    fn ensure_connected(&self, command: &str) -> crate::Result<()> {
        if self.connected() {
            Ok(())
        } else {
            Err(crate::LinkError::disconnected(command))
        }
    }

    /// Send a typed command if the peer is reachable.
    ///
    /// Returns whether the command was enqueued.
    pub fn try_send(&self, command: &Command) -> bool {
        if let Err(e) = self.ensure_connected(command.name()) {
            warn!(error = %e, "command dropped");
            return false;
        }
        match command.encode() {
            Ok(payload) => {
                debug!(command = command.name(), "command enqueued");
                self.control.enqueue(payload);
                true
            }
            Err(e) => {
                warn!(command = command.name(), error = %e, "command encode failed");
                false
            }
        }
    }

    /// Send a pre-encoded payload if the peer is reachable.
    pub fn try_send_raw(&self, payload: Bytes) -> bool {
        if let Err(e) = self.ensure_connected("raw") {
            warn!(error = %e, "command dropped");
            return false;
        }
        self.control.enqueue(payload);
        true
    }
}
