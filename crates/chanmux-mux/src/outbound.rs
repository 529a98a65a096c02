//! The writer task: sole owner of the transport's write half.

use chanmux_frame::{Frame, FrameWriter};
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::channel::ChannelId;
use crate::error::{MuxError, Result};

pub(crate) type Ack = oneshot::Sender<Result<()>>;

/// Who to tell once a frame reached the transport.
#[derive(Debug)]
pub(crate) enum WriteAck {
    None,
    Caller(Ack),
    /// The OPEN of this channel is out.
    Opened(ChannelId),
}

impl WriteAck {
    pub(crate) fn fail(self, reason: &str) {
        if let WriteAck::Caller(ack) = self {
            let _ = ack.send(Err(MuxError::Closed(reason.to_owned())));
        }
    }
}

#[derive(Debug)]
pub(crate) enum Outbound {
    Frame { frame: Frame, ack: WriteAck },
    Cork,
    Uncork,
    Shutdown,
}

/// Reported back to the driver.
#[derive(Debug)]
pub(crate) enum WriterEvent {
    Opened(ChannelId),
    Failed(String),
}

pub(crate) async fn run_writer<W>(
    mut writer: FrameWriter<W>,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<WriterEvent>,
) where
    W: AsyncWrite + Unpin,
{
    let mut failed: Option<String> = None;

    while let Some(item) = queue.recv().await {
        if let Some(reason) = &failed {
            match item {
                Outbound::Frame { ack, .. } => ack.fail(reason),
                Outbound::Shutdown => break,
                Outbound::Cork | Outbound::Uncork => {}
            }
            continue;
        }

        let outcome = match item {
            Outbound::Frame { frame, ack } => {
                let index = frame.index;
                match writer.write_frame(frame).await {
                    Ok(()) => {
                        match ack {
                            WriteAck::None => {}
                            WriteAck::Caller(ack) => {
                                let _ = ack.send(Ok(()));
                            }
                            WriteAck::Opened(id) => {
                                let _ = events.send(WriterEvent::Opened(id));
                            }
                        }
                        Ok(())
                    }
                    Err(err) => {
                        let reason = format!("transport write failed: {err}");
                        warn!(index, error = %err, "frame write failed");
                        ack.fail(&reason);
                        Err(reason)
                    }
                }
            }
            Outbound::Cork => {
                writer.cork();
                trace!("transport corked");
                Ok(())
            }
            Outbound::Uncork => writer
                .uncork()
                .await
                .map_err(|err| format!("transport write failed: {err}")),
            Outbound::Shutdown => {
                if let Err(err) = writer.shutdown().await {
                    debug!(error = %err, "transport shutdown failed");
                }
                break;
            }
        };

        if let Err(reason) = outcome {
            let _ = events.send(WriterEvent::Failed(reason.clone()));
            failed = Some(reason);
        }
    }

    debug!("writer task stopped");
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use chanmux_frame::Role;
    use tokio::io::AsyncReadExt;

    use super::*;

    fn spawn<W: AsyncWrite + Unpin + Send + 'static>(
        inner: W,
    ) -> (
        mpsc::UnboundedSender<Outbound>,
        mpsc::UnboundedReceiver<WriterEvent>,
        tokio::task::JoinHandle<()>,
    ) {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_writer(FrameWriter::new(inner), queue_rx, events_tx));
        (queue_tx, events_rx, task)
    }

    #[tokio::test]
    async fn frames_are_acked_in_order() {
        let (left, mut right) = tokio::io::duplex(1024);
        let (queue, mut events, task) = spawn(left);

        queue
            .send(Outbound::Frame {
                frame: Frame::open(0, "a"),
                ack: WriteAck::Opened(ChannelId(1)),
            })
            .unwrap();
        let (ack, done) = oneshot::channel();
        queue
            .send(Outbound::Frame {
                frame: Frame::data(0, Role::Initiator, "hi"),
                ack: WriteAck::Caller(ack),
            })
            .unwrap();
        done.await.unwrap().unwrap();
        assert!(matches!(events.recv().await, Some(WriterEvent::Opened(ChannelId(1)))));

        queue.send(Outbound::Shutdown).unwrap();
        task.await.unwrap();

        let mut wire = Vec::new();
        right.read_to_end(&mut wire).await.unwrap();
        assert_eq!(wire, b"\x00\x01a\x02\x02hi");
    }

    #[tokio::test]
    async fn failure_is_reported_and_later_acks_fail() {
        let (queue, mut events, task) = spawn(Broken);

        let (first, first_done) = oneshot::channel();
        queue
            .send(Outbound::Frame {
                frame: Frame::open(0, "a"),
                ack: WriteAck::Caller(first),
            })
            .unwrap();
        let (second, second_done) = oneshot::channel();
        queue
            .send(Outbound::Frame {
                frame: Frame::end(0, Role::Initiator),
                ack: WriteAck::Caller(second),
            })
            .unwrap();

        assert!(matches!(first_done.await.unwrap(), Err(MuxError::Closed(_))));
        assert!(matches!(second_done.await.unwrap(), Err(MuxError::Closed(_))));
        assert!(matches!(events.recv().await, Some(WriterEvent::Failed(reason)) if reason.contains("write failed")));

        drop(queue);
        task.await.unwrap();
    }

    struct Broken;

    impl AsyncWrite for Broken {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::from(io::ErrorKind::ConnectionReset)))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }
}
