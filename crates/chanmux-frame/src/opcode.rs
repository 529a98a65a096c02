//! Opcodes and the parity rule that routes them.
//!
//! Initiator channels always send even opcodes and acceptor channels odd
//! ones (OPEN is sent only by initiators). A receiver therefore looks up odd
//! opcodes in its own table and even opcodes in its peer table.

use std::fmt;

use crate::error::{FrameError, Result};

/// Number of header bits holding the opcode.
pub const OPCODE_BITS: u32 = 3;
const OPCODE_MASK: u64 = (1 << OPCODE_BITS) - 1;

/// Which side created a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Created locally by an explicit open.
    Initiator,
    /// Created on receipt of the peer's OPEN.
    Acceptor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => f.write_str("initiator"),
            Role::Acceptor => f.write_str("acceptor"),
        }
    }
}

/// The receiver-side table a message is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Channels this endpoint created.
    Own,
    /// Channels the remote endpoint created.
    Peer,
}

/// Message class, independent of the sender's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Open,
    Data,
    End,
    Error,
}

/// Wire opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Open = 0,
    AcceptorData = 1,
    InitiatorData = 2,
    AcceptorEnd = 3,
    InitiatorEnd = 4,
    AcceptorError = 5,
    InitiatorError = 6,
}

impl Opcode {
    /// The opcode a channel of `role` uses for `kind`.
    ///
    /// OPEN has a single opcode; acceptors never send it.
    pub fn for_role(kind: MessageKind, role: Role) -> Self {
        match (kind, role) {
            (MessageKind::Open, _) => Opcode::Open,
            (MessageKind::Data, Role::Acceptor) => Opcode::AcceptorData,
            (MessageKind::Data, Role::Initiator) => Opcode::InitiatorData,
            (MessageKind::End, Role::Acceptor) => Opcode::AcceptorEnd,
            (MessageKind::End, Role::Initiator) => Opcode::InitiatorEnd,
            (MessageKind::Error, Role::Acceptor) => Opcode::AcceptorError,
            (MessageKind::Error, Role::Initiator) => Opcode::InitiatorError,
        }
    }

    pub fn kind(self) -> MessageKind {
        match self {
            Opcode::Open => MessageKind::Open,
            Opcode::AcceptorData | Opcode::InitiatorData => MessageKind::Data,
            Opcode::AcceptorEnd | Opcode::InitiatorEnd => MessageKind::End,
            Opcode::AcceptorError | Opcode::InitiatorError => MessageKind::Error,
        }
    }

    /// Role of the channel that sent this opcode.
    pub fn sender_role(self) -> Role {
        if self as u8 % 2 == 0 {
            Role::Initiator
        } else {
            Role::Acceptor
        }
    }

    /// Table the receiver resolves this opcode against.
    pub fn table(self) -> Table {
        match self.sender_role() {
            Role::Acceptor => Table::Own,
            Role::Initiator => Table::Peer,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Opcode::Open),
            1 => Ok(Opcode::AcceptorData),
            2 => Ok(Opcode::InitiatorData),
            3 => Ok(Opcode::AcceptorEnd),
            4 => Ok(Opcode::InitiatorEnd),
            5 => Ok(Opcode::AcceptorError),
            6 => Ok(Opcode::InitiatorError),
            other => Err(FrameError::InvalidOpcode(other)),
        }
    }
}

/// Largest channel index that still fits in a header.
pub const MAX_CHANNEL_INDEX: u64 = u64::MAX >> OPCODE_BITS;

/// Pack a channel index and opcode into a header value.
pub fn pack_header(index: u64, opcode: Opcode) -> u64 {
    debug_assert!(index <= MAX_CHANNEL_INDEX);
    (index << OPCODE_BITS) | u64::from(opcode.as_u8())
}

/// Split a header value into channel index and opcode.
pub fn unpack_header(header: u64) -> Result<(u64, Opcode)> {
    let opcode = Opcode::try_from((header & OPCODE_MASK) as u8)?;
    Ok((header >> OPCODE_BITS, opcode))
}
