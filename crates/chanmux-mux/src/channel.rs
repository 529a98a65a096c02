use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::{Bytes, BytesMut};
use chanmux_frame::Role;
use futures_core::Stream;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::io::StreamReader;

use crate::driver::Command;
use crate::error::{ChannelError, MuxError, Result};

/// Driver-side key of a channel. Unlike the wire index it is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ChannelId(pub u64);

/// Item on a channel's readable side.
#[derive(Debug)]
pub(crate) enum Inbound {
    Data(Bytes),
    End,
    Error(ChannelError),
}

/// Observable channel state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    /// Wire index; `None` until assigned.
    pub index: Option<u64>,
    pub opened: bool,
    /// OPEN written to the transport (initiator) or received (acceptor).
    pub open_acked: bool,
    pub read_ended: bool,
    pub write_finished: bool,
    pub finalized: bool,
    pub destroyed: bool,
}

const DRIVER_GONE: &str = "multiplexer driver stopped";

fn driver_gone() -> MuxError {
    MuxError::Closed(DRIVER_GONE.to_owned())
}

struct WriterShared {
    id: ChannelId,
    name: Bytes,
    role: Role,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ChannelStatus>,
}

impl Drop for WriterShared {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Dropped { id: self.id });
    }
}

/// Writable side of a channel. Cheap to clone.
///
/// Dropping the last writer of a channel whose write half was never ended
/// destroys the channel.
#[derive(Clone)]
pub struct ChannelWriter {
    shared: Arc<WriterShared>,
}

impl ChannelWriter {
    pub(crate) fn new(
        id: ChannelId,
        name: Bytes,
        role: Role,
        commands: mpsc::UnboundedSender<Command>,
        status: watch::Receiver<ChannelStatus>,
    ) -> Self {
        Self {
            shared: Arc::new(WriterShared {
                id,
                name,
                role,
                commands,
                status,
            }),
        }
    }

    /// Write one message.
    ///
    /// Completes once the frame has been handed to the transport, so a
    /// stalled transport (or a slow remote reader) holds writers back.
    /// Writes to an acceptor that has not been opened yet wait for the OPEN.
    pub async fn write(&self, data: impl Into<Bytes>) -> Result<()> {
        let status = self.status();
        if status.write_finished && !status.destroyed {
            return Err(MuxError::WriteAfterEnd);
        }
        let (ack, done) = oneshot::channel();
        self.command(Command::Write {
            id: self.shared.id,
            data: data.into(),
            ack,
        })?;
        done.await.unwrap_or_else(|_| Err(driver_gone()))
    }

    /// End the write half. Completes once END reached the transport.
    pub async fn end(&self) -> Result<()> {
        if self.status().write_finished {
            return Ok(());
        }
        let (ack, done) = oneshot::channel();
        self.command(Command::End {
            id: self.shared.id,
            ack: Some(ack),
        })?;
        done.await.unwrap_or_else(|_| Err(driver_gone()))
    }

    /// Request END without waiting for it.
    pub(crate) fn end_detached(&self) -> Result<()> {
        self.command(Command::End {
            id: self.shared.id,
            ack: None,
        })
    }

    /// Abort the channel in both directions.
    ///
    /// Returns immediately; the peer is notified with an ERROR frame carrying
    /// `error` (or an empty one). A given error is only surfaced to this
    /// channel's own reader while it is still attached.
    pub fn destroy(&self, error: Option<String>) {
        let _ = self.command(Command::Destroy {
            id: self.shared.id,
            error,
        });
    }

    /// Resolves with the wire index once the open handshake is done on
    /// this side.
    pub async fn wait_for_open_ack(&self) -> Result<u64> {
        let mut status = self.shared.status.clone();
        let status = *status
            .wait_for(|s| s.open_acked || s.finalized)
            .await
            .map_err(|_| driver_gone())?;
        match status.index {
            Some(index) if status.open_acked => Ok(index),
            _ => Err(MuxError::Destroyed),
        }
    }

    /// Resolves once the channel is finalized or destroyed.
    pub async fn closed(&self) -> ChannelStatus {
        let mut status = self.shared.status.clone();
        if let Ok(current) = status.wait_for(|s| s.finalized).await {
            return *current;
        }
        let last = *status.borrow();
        last
    }

    pub fn status(&self) -> ChannelStatus {
        *self.shared.status.borrow()
    }

    pub fn status_watch(&self) -> watch::Receiver<ChannelStatus> {
        self.shared.status.clone()
    }

    pub fn index(&self) -> Option<u64> {
        self.status().index
    }

    pub fn name(&self) -> &Bytes {
        &self.shared.name
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    fn command(&self, command: Command) -> Result<()> {
        self.shared
            .commands
            .send(command)
            .map_err(|_| driver_gone())
    }
}

impl fmt::Debug for ChannelWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelWriter")
            .field("name", &self.shared.name)
            .field("role", &self.shared.role)
            .field("status", &self.status())
            .finish()
    }
}

/// Readable side of a channel.
///
/// Yields payloads in arrival order, then `None` at end-of-data. A channel
/// destroyed with an error yields that error once before ending. Dropping
/// the reader detaches it: later payloads are discarded.
#[derive(Debug)]
pub struct ChannelReader {
    inbound: mpsc::Receiver<Inbound>,
    done: bool,
}

impl ChannelReader {
    pub(crate) fn new(inbound: mpsc::Receiver<Inbound>) -> Self {
        Self {
            inbound,
            done: false,
        }
    }

    /// Receive the next payload.
    pub async fn recv(&mut self) -> Option<std::result::Result<Bytes, ChannelError>> {
        std::future::poll_fn(|cx| self.poll_recv(cx)).await
    }

    /// Collect every payload until end-of-data.
    pub async fn read_to_end(&mut self) -> std::result::Result<Bytes, ChannelError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.recv().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    pub fn is_ended(&self) -> bool {
        self.done
    }

    fn poll_recv(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Option<std::result::Result<Bytes, ChannelError>>> {
        if self.done {
            return Poll::Ready(None);
        }
        match ready!(self.inbound.poll_recv(cx)) {
            Some(Inbound::Data(data)) => Poll::Ready(Some(Ok(data))),
            Some(Inbound::Error(err)) => {
                self.done = true;
                Poll::Ready(Some(Err(err)))
            }
            Some(Inbound::End) | None => {
                self.done = true;
                Poll::Ready(None)
            }
        }
    }
}

impl Stream for ChannelReader {
    type Item = std::result::Result<Bytes, ChannelError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_recv(cx)
    }
}

/// One multiplexed bidirectional byte stream.
#[derive(Debug)]
pub struct Channel {
    reader: ChannelReader,
    writer: ChannelWriter,
}

impl Channel {
    pub(crate) fn new(reader: ChannelReader, writer: ChannelWriter) -> Self {
        Self { reader, writer }
    }

    pub async fn recv(&mut self) -> Option<std::result::Result<Bytes, ChannelError>> {
        self.reader.recv().await
    }

    pub async fn read_to_end(&mut self) -> std::result::Result<Bytes, ChannelError> {
        self.reader.read_to_end().await
    }

    pub async fn write(&self, data: impl Into<Bytes>) -> Result<()> {
        self.writer.write(data).await
    }

    pub async fn end(&self) -> Result<()> {
        self.writer.end().await
    }

    pub fn destroy(&self, error: Option<String>) {
        self.writer.destroy(error);
    }

    pub async fn wait_for_open_ack(&self) -> Result<u64> {
        self.writer.wait_for_open_ack().await
    }

    pub async fn closed(&self) -> ChannelStatus {
        self.writer.closed().await
    }

    /// A clonable handle to the write half.
    pub fn writer(&self) -> ChannelWriter {
        self.writer.clone()
    }

    pub fn status(&self) -> ChannelStatus {
        self.writer.status()
    }

    pub fn status_watch(&self) -> watch::Receiver<ChannelStatus> {
        self.writer.status_watch()
    }

    pub fn index(&self) -> Option<u64> {
        self.writer.index()
    }

    pub fn name(&self) -> &Bytes {
        self.writer.name()
    }

    pub fn role(&self) -> Role {
        self.writer.role()
    }

    /// Split into independently owned halves.
    ///
    /// End the write half before dropping the writer if the reader should
    /// keep receiving; dropping an unfinished writer destroys the channel.
    pub fn into_split(self) -> (ChannelReader, ChannelWriter) {
        (self.reader, self.writer)
    }

    /// Adapt the readable side to [`tokio::io::AsyncRead`].
    pub fn into_async_read(self) -> StreamReader<Channel, Bytes> {
        StreamReader::new(self)
    }
}

impl Stream for Channel {
    type Item = std::result::Result<Bytes, ChannelError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().reader.poll_recv(cx)
    }
}
