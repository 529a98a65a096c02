//! Many named duplex channels over a single byte stream.
//!
//! chanmux splits one ordered, reliable transport (a Unix socket, a pipe, an
//! in-memory pair) into independent channels that either peer can open.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte transports (Unix sockets, in-memory pairs)
//! - [`frame`]: the varint-framed wire format and its demultiplexer
//! - [`mux`]: the multiplexer, channels and shared channels

/// Re-export transport types.
pub mod transport {
    pub use chanmux_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use chanmux_frame::*;
}

/// Re-export multiplexer types.
pub mod mux {
    pub use chanmux_mux::*;
}

pub use chanmux_mux::{
    Channel, ChannelError, ChannelOptions, Incoming, Multiplexer, MuxConfig, MuxError,
    SharedChannel,
};
