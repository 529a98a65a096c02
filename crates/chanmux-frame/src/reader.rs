use bytes::{Buf, Bytes, BytesMut};
use tracing::{trace, warn};

use crate::codec::FrameConfig;
use crate::error::{FrameError, Result};
use crate::opcode::{unpack_header, MessageKind, Opcode, Table};
use crate::varint::VarintAccumulator;

/// A decoded message, already routed to a table by opcode parity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The peer opened a channel; always lands in the peer table.
    Open { index: u64, name: Bytes },
    /// Payload for a channel. For chunked channels one message may arrive as
    /// several `Data` events; `last` marks the one that completes it.
    Data {
        table: Table,
        index: u64,
        payload: Bytes,
        last: bool,
    },
    /// The sender finished writing.
    End { table: Table, index: u64 },
    /// The sender destroyed the channel; `message` may be empty.
    Error {
        table: Table,
        index: u64,
        message: Bytes,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Length,
    Body { remaining: usize, streaming: bool },
}

/// Byte-level demultiplexing state machine.
///
/// Feed it transport bytes as they arrive, in chunks of any size; it yields
/// one [`Event`] per call to [`decode`](Self::decode) and keeps every piece
/// of partial state (half-read varints, half-received payloads) itself.
#[derive(Debug)]
pub struct Demuxer {
    state: State,
    varint: VarintAccumulator,
    index: u64,
    opcode: Opcode,
    body: BytesMut,
    config: FrameConfig,
}

impl Demuxer {
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            state: State::Header,
            varint: VarintAccumulator::new(),
            index: 0,
            opcode: Opcode::Open,
            body: BytesMut::new(),
            config,
        }
    }

    /// Decode the next event out of `src`, consuming the bytes it used.
    ///
    /// Returns `Ok(None)` once `src` is exhausted without completing an
    /// event; call again when more bytes arrive. `chunked` is asked, once
    /// per DATA message, whether the target channel wants its payload
    /// streamed as it arrives instead of buffered whole.
    ///
    /// Any error is fatal: the stream can no longer be resynchronized.
    pub fn decode<F>(&mut self, src: &mut BytesMut, mut chunked: F) -> Result<Option<Event>>
    where
        F: FnMut(Table, u64) -> bool,
    {
        loop {
            match self.state {
                State::Header => {
                    let Some(header) = self.next_varint(src)? else {
                        return Ok(None);
                    };
                    let (index, opcode) = unpack_header(header)?;
                    self.index = index;
                    self.opcode = opcode;
                    self.state = State::Length;
                }
                State::Length => {
                    let Some(length) = self.next_varint(src)? else {
                        return Ok(None);
                    };
                    let max = self.config.max_message_size;
                    if length > max {
                        warn!(index = self.index, size = length, max, "incoming message too large");
                        return Err(FrameError::MessageTooLarge { size: length, max });
                    }
                    let remaining =
                        usize::try_from(length).map_err(|_| FrameError::MessageTooLarge {
                            size: length,
                            max: usize::MAX as u64,
                        })?;
                    let streaming = self.opcode.kind() == MessageKind::Data
                        && chunked(self.opcode.table(), self.index);
                    trace!(
                        index = self.index,
                        opcode = self.opcode.as_u8(),
                        size = remaining,
                        streaming,
                        "frame header decoded"
                    );
                    self.state = State::Body {
                        remaining,
                        streaming,
                    };
                    if remaining == 0 {
                        return Ok(Some(self.complete(Bytes::new())));
                    }
                }
                State::Body {
                    remaining,
                    streaming,
                } => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    if streaming {
                        return Ok(Some(self.stream_slice(src, remaining)));
                    }
                    if self.body.is_empty() && src.len() >= remaining {
                        // Whole payload already buffered: hand out a view.
                        let payload = src.split_to(remaining).freeze();
                        return Ok(Some(self.complete(payload)));
                    }
                    let take = remaining.min(src.len());
                    self.body.extend_from_slice(&src[..take]);
                    src.advance(take);
                    if take < remaining {
                        self.state = State::Body {
                            remaining: remaining - take,
                            streaming,
                        };
                        return Ok(None);
                    }
                    let payload = self.body.split().freeze();
                    return Ok(Some(self.complete(payload)));
                }
            }
        }
    }

    /// Whether the demuxer is between messages.
    pub fn is_idle(&self) -> bool {
        self.state == State::Header && !self.varint.is_partial()
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn next_varint(&mut self, src: &mut BytesMut) -> Result<Option<u64>> {
        while src.has_remaining() {
            let byte = src.get_u8();
            if let Some(value) = self.varint.push(byte)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn stream_slice(&mut self, src: &mut BytesMut, remaining: usize) -> Event {
        let take = remaining.min(src.len());
        let payload = src.split_to(take).freeze();
        let left = remaining - take;
        self.state = if left == 0 {
            State::Header
        } else {
            State::Body {
                remaining: left,
                streaming: true,
            }
        };
        Event::Data {
            table: self.opcode.table(),
            index: self.index,
            payload,
            last: left == 0,
        }
    }

    fn complete(&mut self, payload: Bytes) -> Event {
        self.state = State::Header;
        let (index, opcode) = (self.index, self.opcode);
        let table = opcode.table();
        match opcode.kind() {
            MessageKind::Open => Event::Open {
                index,
                name: payload,
            },
            MessageKind::Data => Event::Data {
                table,
                index,
                payload,
                last: true,
            },
            MessageKind::End => Event::End { table, index },
            MessageKind::Error => Event::Error {
                table,
                index,
                message: payload,
            },
        }
    }
}

impl Default for Demuxer {
    fn default() -> Self {
        Self::new()
    }
}
