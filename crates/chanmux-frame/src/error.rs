/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The declared payload length exceeds the configured maximum.
    #[error("incoming message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: u64, max: u64 },

    /// The header carries the unassigned opcode.
    #[error("invalid message type (opcode {0})")]
    InvalidOpcode(u8),

    /// A header or length varint is longer than 10 bytes or overflows 64 bits.
    #[error("invalid varint in frame header")]
    InvalidVarint,

    /// An I/O error occurred while writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a frame could be written.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
