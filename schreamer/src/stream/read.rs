use tokio::io::{AsyncRead, AsyncReadExt};

use super::StreamState;
use crate::error::{Error, Result};

pub type BoxSource = Box<dyn AsyncRead + Send + Unpin>;

/// Growing read buffer in front of a source.
pub struct ReadStream<R = BoxSource> {
    source: R,
    buf: Vec<u8>,
    offset: usize,
    chunk: usize,
    consumed: u64,
    complete: bool,
    state: StreamState,
    path: String,
}

impl<R> std::fmt::Debug for ReadStream<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadStream")
            .field("path", &self.path)
            .field("chunk", &self.chunk)
            .field("resident", &(self.buf.len() - self.offset))
            .field("consumed", &self.consumed)
            .field("complete", &self.complete)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<R: AsyncRead + Unpin> ReadStream<R> {
    /// Every fill asks the source for at most `chunk` bytes.
    pub fn new(source: R, chunk: usize, path: impl Into<String>) -> Self {
        let path = path.into();
        tracing::trace!(%path, chunk, "read stream ready");
        ReadStream {
            source,
            buf: Vec::with_capacity(chunk),
            offset: 0,
            chunk: chunk.max(1),
            consumed: 0,
            complete: false,
            state: StreamState::Ready,
            path,
        }
    }

    /// Unread bytes currently resident.
    pub fn available(&self) -> usize {
        self.buf.len() - self.offset
    }

    /// Total bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.consumed
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk
    }

    /// Whether the source has signalled end of input.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Resolves once `n` unread bytes are resident. Fails if the source ends first.
    pub async fn await_bytes(&mut self, n: usize) -> Result<()> {
        loop {
            if matches!(self.state, StreamState::Errored | StreamState::Closed) {
                return Err(Error::Poisoned {
                    path: self.path.clone(),
                });
            }
            if self.available() >= n {
                return Ok(());
            }
            if self.complete {
                return Err(Error::UnexpectedEof {
                    path: self.path.clone(),
                    needed: n - self.available(),
                });
            }
            self.fill().await?;
        }
    }

    async fn fill(&mut self) -> Result<()> {
        if self.offset > 0 {
            self.buf.drain(..self.offset);
            self.offset = 0;
        }
        self.state = StreamState::Streaming;

        let len = self.buf.len();
        self.buf.resize(len + self.chunk, 0);
        match self.source.read(&mut self.buf[len..]).await {
            Ok(0) => {
                self.buf.truncate(len);
                self.complete = true;
                tracing::trace!(path = %self.path, offset = self.consumed, "source ended");
            }
            Ok(n) => {
                self.buf.truncate(len + n);
                tracing::trace!(
                    path = %self.path,
                    bytes = n,
                    resident = self.buf.len(),
                    "filled read buffer"
                );
            }
            Err(source) => {
                self.buf.truncate(len);
                self.state = StreamState::Errored;
                return Err(Error::io(&self.path, source));
            }
        }
        Ok(())
    }

    /// Consumes `n` resident bytes. Call [`ReadStream::await_bytes`] first.
    pub fn take(&mut self, n: usize) -> Result<&[u8]> {
        if self.available() < n {
            return Err(Error::UnexpectedEof {
                path: self.path.clone(),
                needed: n - self.available(),
            });
        }
        let start = self.offset;
        self.offset += n;
        self.consumed += n as u64;
        Ok(&self.buf[start..start + n])
    }

    /// Accumulates exactly `n` bytes, at most one chunk at a time.
    pub async fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(n.min(self.chunk * 16));
        while out.len() < n {
            let want = (n - out.len()).min(self.chunk);
            self.await_bytes(want).await?;
            out.extend_from_slice(self.take(want)?);
        }
        Ok(out)
    }

    /// Drops whatever is left unread.
    pub fn close(&mut self) {
        if self.state != StreamState::Errored {
            self.state = StreamState::Closed;
        }
        self.buf.clear();
        self.offset = 0;
        tracing::trace!(path = %self.path, consumed = self.consumed, "read stream closed");
    }

    pub fn abort(&mut self) {
        self.state = StreamState::Errored;
    }
}
