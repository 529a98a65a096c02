//! Wire format for the chanmux stream multiplexer.
//!
//! Every message on the shared transport is framed as:
//! - A varint header: `(channel index << 3) | opcode`
//! - A varint payload length
//! - `length` payload bytes
//!
//! The writer side turns [`Frame`]s into bytes; the reader side is a
//! byte-level [`Demuxer`] that reassembles frames out of arbitrarily sized
//! transport chunks without any global state.

pub mod codec;
pub mod error;
pub mod opcode;
pub mod reader;
pub mod varint;
pub mod writer;

pub use codec::{encode_frame, Frame, FrameConfig, FrameEncoder, DEFAULT_MAX_MESSAGE_SIZE};
pub use error::{FrameError, Result};
pub use opcode::{MessageKind, Opcode, Role, Table};
pub use reader::{Demuxer, Event};
pub use writer::FrameWriter;
