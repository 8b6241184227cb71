use std::io::Result;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::*;
use crate::error::{Error, ErrorCategory};

/// Sink that reports itself saturated on every other poll and accepts at most
/// `max` bytes per write, recording each accepted chunk.
struct Throttled {
    data: Vec<u8>,
    writes: Vec<usize>,
    max: usize,
    saturated: bool,
}

impl Throttled {
    fn new(max: usize) -> Self {
        Throttled {
            data: vec![],
            writes: vec![],
            max,
            saturated: false,
        }
    }
}

impl AsyncWrite for Throttled {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<Result<usize>> {
        if self.saturated {
            self.saturated = false;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        self.saturated = true;
        let n = buf.len().min(self.max);
        self.data.extend_from_slice(&buf[..n]);
        self.writes.push(n);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Source that hands out its data `step` bytes at a time.
struct Trickle {
    data: Vec<u8>,
    pos: usize,
    step: usize,
}

impl AsyncRead for Trickle {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<Result<()>> {
        let n = self.step.min(buf.remaining()).min(self.data.len() - self.pos);
        let start = self.pos;
        buf.put_slice(&self.data[start..start + n]);
        self.pos += n;
        Poll::Ready(Ok(()))
    }
}

struct Broken;

impl AsyncWrite for Broken {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<Result<usize>> {
        Poll::Ready(Err(std::io::Error::other("disk on fire")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn reserve_flushes_before_overflow() {
    let mut stream = WriteStream::new(Vec::new(), 4, "t.bin");
    stream.reserve(3).await.unwrap().copy_from_slice(&[1, 2, 3]);
    assert!(stream.get_ref().is_empty());

    stream.reserve(2).await.unwrap().copy_from_slice(&[4, 5]);
    assert_eq!(stream.get_ref(), &[1, 2, 3]);
    assert_eq!(stream.position(), 5);

    assert_eq!(stream.finish().await.unwrap(), 5);
    assert_eq!(stream.state(), StreamState::Closed);
    assert_eq!(stream.into_inner(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn copy_bytes_spans_windows() {
    let payload = (0..=255u8).collect::<Vec<_>>();
    let mut stream = WriteStream::new(Vec::new(), 16, "t.bin");
    stream.reserve(1).await.unwrap()[0] = 0xaa;
    stream.copy_bytes(&payload).await.unwrap();
    stream.finish().await.unwrap();

    let out = stream.into_inner();
    assert_eq!(out[0], 0xaa);
    assert_eq!(&out[1..], &payload[..]);
}

#[tokio::test]
async fn flush_waits_for_a_saturated_sink() {
    let payload = b"the quick brown fox jumps over the lazy dog".to_vec();
    let mut stream = WriteStream::new(Throttled::new(5), 8, "t.bin");
    stream.copy_bytes(&payload).await.unwrap();
    stream.finish().await.unwrap();

    let sink = stream.into_inner();
    assert_eq!(sink.data, payload);
    assert!(sink.writes.iter().all(|&n| n <= 5));
}

#[tokio::test]
async fn sink_failure_poisons_the_stream() {
    let mut stream = WriteStream::new(Broken, 4, "t.bin");
    stream.copy_bytes(&[1, 2, 3, 4]).await.unwrap();

    let err = stream.reserve(1).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Io);
    assert_eq!(stream.state(), StreamState::Errored);

    let err = stream.copy_bytes(&[5]).await.unwrap_err();
    assert!(matches!(err, Error::Poisoned { .. }));
}

#[tokio::test]
async fn oversized_reservation_is_refused() {
    let mut stream = WriteStream::new(Vec::new(), 4, "t.bin");
    assert!(stream.reserve(8).await.is_err());
}

#[tokio::test]
async fn await_bytes_accumulates_chunks() {
    let data = (0..40u8).collect::<Vec<_>>();
    let source = Trickle {
        data: data.clone(),
        pos: 0,
        step: 3,
    };
    let mut stream = ReadStream::new(source, 4, "t.bin");

    stream.await_bytes(10).await.unwrap();
    assert!(stream.available() >= 10);
    assert_eq!(stream.take(2).unwrap(), &[0, 1]);

    let rest = stream.read_bytes(38).await.unwrap();
    assert_eq!(rest, &data[2..]);
    assert_eq!(stream.position(), 40);
}

#[tokio::test]
async fn await_bytes_resolves_without_io_when_resident() {
    let mut stream = ReadStream::new(&b"abcdef"[..], 16, "t.bin");
    stream.await_bytes(6).await.unwrap();
    assert_eq!(stream.take(3).unwrap(), b"abc");
    stream.await_bytes(3).await.unwrap();
    assert!(!stream.is_complete());
    assert_eq!(stream.take(3).unwrap(), b"def");
}

#[tokio::test]
async fn early_end_of_source() {
    let mut stream = ReadStream::new(&b"abc"[..], 16, "t.bin");
    let err = stream.await_bytes(5).await.unwrap_err();
    assert!(matches!(err, Error::UnexpectedEof { needed: 2, .. }));
    assert!(stream.is_complete());
}
