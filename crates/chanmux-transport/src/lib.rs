//! Byte transports for the chanmux stream multiplexer.
//!
//! The multiplexer only needs an ordered, reliable, bidirectional byte
//! stream. Anything implementing tokio's `AsyncRead + AsyncWrite` qualifies
//! through the blanket [`Transport`] impl; this crate additionally ships:
//! - Unix domain sockets (Linux/macOS)
//! - An in-memory pair for tests and single-process wiring
//!
//! This is the lowest layer of chanmux. Everything else builds on top of
//! the [`Transport`] trait provided here.

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use memory::{memory_pair, MemoryStream, DEFAULT_MEMORY_CAPACITY};
pub use traits::Transport;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
