//! Message transport for the device channels.
//!
//! The adapter moves opaque newline-delimited payloads between queues and a
//! socket; the dialer trait is the seam that lets tests substitute
//! in-memory pipes for TCP.

mod adapter;
mod codec;
mod dialer;

pub use adapter::{ChannelMode, TransportAdapter};
pub use codec::{DEFAULT_MAX_MESSAGE_BYTES, MessageCodec};
pub use dialer::{Dialer, Io, IoStream, TcpDialer};
