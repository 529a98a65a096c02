use futures_util::SinkExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::FramedWrite;
use tracing::trace;

use crate::codec::{Frame, FrameEncoder};
use crate::error::Result;

/// Writes frames to any `AsyncWrite` transport.
///
/// Each [`write_frame`](Self::write_frame) completes once the transport has
/// accepted the bytes, which is how transport backpressure reaches callers.
/// While corked, frames are only buffered; the last matching
/// [`uncork`](Self::uncork) flushes them in one go.
pub struct FrameWriter<W> {
    inner: FramedWrite<W, FrameEncoder>,
    cork_depth: usize,
    // Boundary to restore once uncorked; corking lifts it so `feed` never flushes.
    boundary: usize,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        let inner = FramedWrite::new(inner, FrameEncoder);
        Self {
            boundary: inner.backpressure_boundary(),
            inner,
            cork_depth: 0,
        }
    }

    /// Encode and send one frame.
    pub async fn write_frame(&mut self, frame: Frame) -> Result<()> {
        trace!(
            index = frame.index,
            opcode = frame.opcode.as_u8(),
            size = frame.payload.len(),
            corked = self.is_corked(),
            "writing frame"
        );
        if self.is_corked() {
            self.inner.feed(frame).await
        } else {
            self.inner.send(frame).await
        }
    }

    /// Hold back transport flushes until the matching [`uncork`](Self::uncork).
    pub fn cork(&mut self) {
        if self.cork_depth == 0 {
            self.boundary = self.inner.backpressure_boundary();
            self.inner.set_backpressure_boundary(usize::MAX);
        }
        self.cork_depth += 1;
    }

    /// Undo one [`cork`](Self::cork); flushes once the depth returns to zero.
    pub async fn uncork(&mut self) -> Result<()> {
        if self.cork_depth == 0 {
            return Ok(());
        }
        self.cork_depth -= 1;
        if self.cork_depth == 0 {
            self.inner.set_backpressure_boundary(self.boundary);
            self.flush().await?;
        }
        Ok(())
    }

    pub fn is_corked(&self) -> bool {
        self.cork_depth > 0
    }

    /// Flush every buffered frame to the transport.
    pub async fn flush(&mut self) -> Result<()> {
        SinkExt::<Frame>::flush(&mut self.inner).await
    }

    /// Flush, then shut down the transport's write direction.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.flush().await?;
        self.inner.get_mut().shutdown().await?;
        Ok(())
    }

    /// Borrow the underlying transport.
    pub fn get_ref(&self) -> &W {
        self.inner.get_ref()
    }

    /// Consume the writer and return the inner transport.
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }

    /// Bytes encoded but not yet handed to the transport.
    pub fn buffered_len(&self) -> usize {
        self.inner.write_buffer().len()
    }
}
