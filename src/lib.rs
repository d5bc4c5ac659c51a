//! Async client integration layer for real-time filter attenuation
//! controllers.
//!
//! The device is reached over two message channels: a request/reply control
//! channel for commands and status polling, and a publish/subscribe event
//! channel carrying one message per processed frame. This crate owns the
//! client side of both:
//!
//! - **Transport adapters** decouple callers from the sockets through
//!   queues and survive reconnects ([`transport`]).
//! - A **connectivity watchdog** infers peer liveness from status replies,
//!   since the protocol has no connection-state signal ([`watchdog`]), and a
//!   [`CommandGate`] drops commands while the peer is unreachable.
//! - A **frame recorder** appends per-frame records into four equal-length
//!   growable on-disk arrays indexed by frame number ([`recorder`]).
//!
//! # Quick start
//!
//! ```rust,no_run
//! use filterlink::{Filterlink, LinkConfig};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> filterlink::Result<()> {
//!     let config = LinkConfig::new("127.0.0.1", 9000, 9001)
//!         .with_dataset_path("/data/attenuation.dat");
//!     let link = Filterlink::connect(config).await?;
//!
//!     let mut frames = Box::pin(link.frame_events());
//!     link.open();
//!     while let Some(frame) = frames.next().await {
//!         println!("frame {} attenuation {}", frame.frame_number, frame.attenuation);
//!     }
//!
//!     link.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod protocol;
pub mod recorder;
pub mod supervisor;
pub mod transport;
pub mod watchdog;

mod link;

#[cfg(test)]
pub(crate) mod test_utils;

// Core exports
pub use config::LinkConfig;
pub use error::{LinkError, Result};
pub use gate::CommandGate;
pub use link::{ControllerLink, Filterlink};
pub use protocol::{AckRecord, Command, ConfigureParams, FrameRecord, Inbound, StatusRecord};
pub use recorder::{FrameRecorder, FrameRow, FrameStore, StoreReader};
pub use supervisor::Supervisor;
pub use transport::{ChannelMode, Dialer, IoStream, MessageCodec, TcpDialer, TransportAdapter};
pub use watchdog::{ConnectionState, ConnectivityWatchdog, StatusMonitor};
