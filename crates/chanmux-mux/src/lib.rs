//! Many independent duplex channels over one ordered byte transport.
//!
//! Either side can open channels; each gets a slot in its opener's index
//! table, so both peers allocate indices without coordinating. Channels can
//! be bound by name ([`Multiplexer::accept_by_name`]), surfaced as they
//! arrive ([`Incoming`]) or agreed on symmetrically ([`SharedChannel`]).
//!
//! A single driver task owns all channel state and the transport's read
//! half; a writer task owns the write half. A full channel reader pauses
//! transport reads for the whole multiplexer until it drains.
//!
//! ```no_run
//! use chanmux_mux::{ChannelOptions, Multiplexer};
//!
//! # async fn demo() -> chanmux_mux::Result<()> {
//! let (left, right) = chanmux_transport::memory_pair(64 * 1024);
//! let (client, _) = Multiplexer::new(left);
//! let (server, _) = Multiplexer::new(right);
//!
//! let mut inbox = server.accept_by_name("echo", ChannelOptions::default()).await?;
//! let outbox = client.create_channel("echo", ChannelOptions::default()).await?;
//! outbox.write("hi").await?;
//! outbox.end().await?;
//! assert_eq!(inbox.read_to_end().await?, "hi");
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
mod driver;
pub mod error;
mod lifecycle;
pub mod multiplexer;
mod outbound;
pub mod shared;

pub use channel::{Channel, ChannelReader, ChannelStatus, ChannelWriter};
pub use config::{ChannelOptions, MuxConfig, DEFAULT_CHANNEL_BUFFER, DEFAULT_READ_CHUNK_SIZE};
pub use error::{ChannelError, MuxError, Result};
pub use multiplexer::{Incoming, Multiplexer};
pub use shared::SharedChannel;
