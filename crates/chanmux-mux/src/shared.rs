use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_core::Stream;

use crate::channel::{Channel, ChannelReader, ChannelWriter};
use crate::error::{ChannelError, Result};

/// A duplex stream two symmetric peers agree on by name alone.
///
/// Built from a lazy initiator (the write half) and an acceptor waiting for
/// the peer's OPEN of the same name (the read half). When both sides create
/// a shared channel called `x`, each one's writes land in the other's
/// reader without either deciding who opens.
#[derive(Debug)]
pub struct SharedChannel {
    name: Bytes,
    reader: ChannelReader,
    writer: ChannelWriter,
    read_side: ChannelWriter,
}

impl SharedChannel {
    pub(crate) fn new(name: Bytes, read_side: Channel, write_side: Channel) -> Result<Self> {
        let (reader, read_control) = read_side.into_split();
        // The acceptor never carries our data; its END waits for the OPEN.
        read_control.end_detached()?;
        let (_detached, writer) = write_side.into_split();
        Ok(Self {
            name,
            reader,
            writer,
            read_side: read_control,
        })
    }

    pub fn name(&self) -> &Bytes {
        &self.name
    }

    pub async fn recv(&mut self) -> Option<std::result::Result<Bytes, ChannelError>> {
        self.reader.recv().await
    }

    pub async fn read_to_end(&mut self) -> std::result::Result<Bytes, ChannelError> {
        self.reader.read_to_end().await
    }

    /// Write to the peer. The first write sends the OPEN.
    pub async fn write(&self, data: impl Into<Bytes>) -> Result<()> {
        self.writer.write(data).await
    }

    pub async fn end(&self) -> Result<()> {
        self.writer.end().await
    }

    /// Destroy both underlying channels.
    pub fn destroy(&self, error: Option<String>) {
        self.writer.destroy(error.clone());
        self.read_side.destroy(error);
    }

    pub fn writer(&self) -> ChannelWriter {
        self.writer.clone()
    }

    /// Resolves once both underlying channels are finalized.
    pub async fn closed(&self) {
        self.writer.closed().await;
        self.read_side.closed().await;
    }
}

impl Stream for SharedChannel {
    type Item = std::result::Result<Bytes, ChannelError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().reader).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chanmux_transport::memory_pair;
    use tokio::time::timeout;

    use crate::config::ChannelOptions;
    use crate::error::MuxError;
    use crate::multiplexer::Multiplexer;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn symmetric_peers_share_one_duplex_stream() {
        let (left, right) = memory_pair(4096);
        let (a, _a_incoming) = Multiplexer::new(left);
        let (b, _b_incoming) = Multiplexer::new(right);

        let mut on_a = a.create_shared_channel("x", ChannelOptions::default()).await.unwrap();
        let mut on_b = b.create_shared_channel("x", ChannelOptions::default()).await.unwrap();

        on_a.write("ping").await.unwrap();
        on_a.end().await.unwrap();
        on_b.write("pong").await.unwrap();
        on_b.end().await.unwrap();

        let from_a = timeout(WAIT, on_b.read_to_end()).await.unwrap().unwrap();
        let from_b = timeout(WAIT, on_a.read_to_end()).await.unwrap().unwrap();
        assert_eq!(from_a, "ping");
        assert_eq!(from_b, "pong");

        timeout(WAIT, on_a.closed()).await.unwrap();
        timeout(WAIT, on_b.closed()).await.unwrap();
    }

    #[tokio::test]
    async fn one_sided_shared_channel_reads_nothing_until_peer_writes() {
        let (left, right) = memory_pair(4096);
        let (a, _a_incoming) = Multiplexer::new(left);
        let (b, _b_incoming) = Multiplexer::new(right);

        let mut on_a = a.create_shared_channel("y", ChannelOptions::default()).await.unwrap();
        let on_b = b.create_shared_channel("y", ChannelOptions::default()).await.unwrap();

        assert!(timeout(Duration::from_millis(100), on_a.recv()).await.is_err());

        on_b.write("late").await.unwrap();
        let got = timeout(WAIT, on_a.recv()).await.unwrap().unwrap().unwrap();
        assert_eq!(got, "late");
    }

    #[tokio::test]
    async fn destroy_surfaces_local_error_on_reader() {
        let (left, right) = memory_pair(4096);
        let (a, _a_incoming) = Multiplexer::new(left);
        let (_b, _b_incoming) = Multiplexer::new(right);

        let mut shared = a.create_shared_channel("z", ChannelOptions::default()).await.unwrap();
        shared.destroy(Some("done".into()));

        let err = timeout(WAIT, shared.recv()).await.unwrap().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "done");
        assert!(matches!(shared.write("x").await, Err(MuxError::Destroyed)));
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let (left, _right) = memory_pair(64);
        let (a, _incoming) = Multiplexer::new(left);
        assert!(matches!(
            a.create_shared_channel("", ChannelOptions::default()).await,
            Err(MuxError::InvalidName)
        ));
    }
}
