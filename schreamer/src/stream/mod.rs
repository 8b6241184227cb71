//! Buffered stream adapters shared by both engines.
//!
//! The write side owns a fixed-capacity buffer which is flushed to the sink
//! whenever the next reservation would overflow it. The read side owns a
//! growing buffer that is refilled from the source until enough unread bytes
//! are resident. These are the only two places a pass suspends.

mod read;
mod write;

#[cfg(test)]
mod tests;

pub use read::{BoxSource, ReadStream};
pub use write::{BoxSink, WriteStream};

/// Lifecycle of a file scope's stream, from the moment its sink or source is
/// open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Ready,
    Streaming,
    Finalizing,
    Closed,
    Errored,
}
