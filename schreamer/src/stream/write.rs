use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::StreamState;
use crate::error::{Error, Result};

pub type BoxSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Fixed-capacity write buffer in front of a sink.
pub struct WriteStream<W = BoxSink> {
    sink: W,
    buf: Box<[u8]>,
    cursor: usize,
    flushed: u64,
    state: StreamState,
    path: String,
}

impl<W> std::fmt::Debug for WriteStream<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteStream")
            .field("path", &self.path)
            .field("capacity", &self.buf.len())
            .field("cursor", &self.cursor)
            .field("flushed", &self.flushed)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<W: AsyncWrite + Unpin> WriteStream<W> {
    /// `path` only labels errors and trace events.
    pub fn new(sink: W, capacity: usize, path: impl Into<String>) -> Self {
        let path = path.into();
        tracing::trace!(%path, capacity, "write stream ready");
        WriteStream {
            sink,
            buf: vec![0; capacity.max(1)].into_boxed_slice(),
            cursor: 0,
            flushed: 0,
            state: StreamState::Ready,
            path,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Total bytes accepted so far, flushed or not.
    pub fn position(&self) -> u64 {
        self.flushed + self.cursor as u64
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    fn check(&self) -> Result<()> {
        match self.state {
            StreamState::Errored | StreamState::Closed => Err(Error::Poisoned {
                path: self.path.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Returns a window of exactly `n` bytes at the cursor, flushing first if
    /// the buffer can not hold them.
    pub async fn reserve(&mut self, n: usize) -> Result<&mut [u8]> {
        self.check()?;
        if n > self.buf.len() {
            return Err(Error::invalid_value(
                &self.path,
                format!("{} bytes do not fit a {} byte buffer", n, self.buf.len()),
            ));
        }
        if self.cursor + n > self.buf.len() {
            self.flush().await?;
        }
        self.state = StreamState::Streaming;
        let start = self.cursor;
        self.cursor += n;
        Ok(&mut self.buf[start..start + n])
    }

    /// Copies a variable-length payload through as many buffer windows as it takes.
    pub async fn copy_bytes(&mut self, mut src: &[u8]) -> Result<()> {
        self.check()?;
        self.state = StreamState::Streaming;
        while !src.is_empty() {
            if self.cursor == self.buf.len() {
                self.flush().await?;
            }
            let n = (self.buf.len() - self.cursor).min(src.len());
            self.buf[self.cursor..self.cursor + n].copy_from_slice(&src[..n]);
            self.cursor += n;
            src = &src[n..];
        }
        Ok(())
    }

    /// Hands the buffered bytes to the sink. While the sink reports that it is
    /// saturated this suspends, and resumes once it drains.
    pub async fn flush(&mut self) -> Result<()> {
        self.check()?;
        if self.cursor == 0 {
            return Ok(());
        }
        if let Err(source) = self.sink.write_all(&self.buf[..self.cursor]).await {
            self.state = StreamState::Errored;
            return Err(Error::io(&self.path, source));
        }
        tracing::trace!(
            path = %self.path,
            bytes = self.cursor,
            offset = self.flushed,
            "flushed write buffer"
        );
        self.flushed += self.cursor as u64;
        self.cursor = 0;
        Ok(())
    }

    /// Flushes the remainder and shuts the sink down.
    pub async fn finish(&mut self) -> Result<u64> {
        self.check()?;
        self.state = StreamState::Finalizing;
        self.flush().await?;
        let closed = match self.sink.flush().await {
            Ok(()) => self.sink.shutdown().await,
            Err(err) => Err(err),
        };
        if let Err(source) = closed {
            self.state = StreamState::Errored;
            return Err(Error::io(&self.path, source));
        }
        self.state = StreamState::Closed;
        tracing::trace!(path = %self.path, bytes = self.flushed, "write stream closed");
        Ok(self.flushed)
    }

    /// Marks the stream failed; whatever was already flushed stays written.
    pub fn abort(&mut self) {
        if self.state != StreamState::Closed {
            self.state = StreamState::Errored;
        }
    }
}
