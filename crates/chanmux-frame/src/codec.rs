use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::Encoder;

use crate::error::FrameError;
use crate::opcode::{pack_header, MessageKind, Opcode, Role};
use crate::varint;

/// Default maximum incoming message size: unlimited.
pub const DEFAULT_MAX_MESSAGE_SIZE: u64 = u64::MAX;

/// One outgoing message, addressed to a channel index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The sender-side channel index.
    pub index: u64,
    pub opcode: Opcode,
    /// Name for OPEN, chunk for DATA, message for ERROR, empty for END.
    pub payload: Bytes,
}

impl Frame {
    pub fn new(index: u64, opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            index,
            opcode,
            payload: payload.into(),
        }
    }

    /// OPEN carrying the channel name.
    pub fn open(index: u64, name: impl Into<Bytes>) -> Self {
        Self::new(index, Opcode::Open, name)
    }

    pub fn data(index: u64, role: Role, payload: impl Into<Bytes>) -> Self {
        Self::new(index, Opcode::for_role(MessageKind::Data, role), payload)
    }

    pub fn end(index: u64, role: Role) -> Self {
        Self::new(index, Opcode::for_role(MessageKind::End, role), Bytes::new())
    }

    /// ERROR carrying a UTF-8 message, possibly empty.
    pub fn error(index: u64, role: Role, message: impl Into<Bytes>) -> Self {
        Self::new(index, Opcode::for_role(MessageKind::Error, role), message)
    }

    pub fn header(&self) -> u64 {
        pack_header(self.index, self.opcode)
    }

    /// The total wire size of this frame (header + length + payload).
    pub fn wire_size(&self) -> usize {
        let len = self.payload.len() as u64;
        varint::encoded_len(self.header()) + varint::encoded_len(len) + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────────────┬────────────────┬──────────────────┐
/// │ varint header            │ varint length  │ payload          │
/// │ (index << 3) | opcode    │                │ (length bytes)   │
/// └──────────────────────────┴────────────────┴──────────────────┘
/// ```
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) {
    dst.reserve(frame.wire_size());
    varint::encode(frame.header(), dst);
    varint::encode(frame.payload.len() as u64, dst);
    dst.put_slice(&frame.payload);
}

/// `tokio_util` encoder for [`Frame`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameEncoder;

impl Encoder<Frame> for FrameEncoder {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&frame, dst);
        Ok(())
    }
}

/// Configuration for the frame layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Largest payload length accepted from the peer. Default: unlimited.
    pub max_message_size: u64,
}

impl FrameConfig {
    pub fn with_max_message_size(mut self, max: u64) -> Self {
        self.max_message_size = max;
        self
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}
