//! User-defined codecs for fields the built-in kinds can not describe.
//!
//! A custom node bypasses the scalar and string machinery entirely. On the
//! write side the callback fills a byte buffer that the engine then copies
//! into the stream; on the read side the callback pulls bytes straight from
//! the stream with the same awaiting primitives the engine uses.

use std::fmt;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::codec::Endian;
use crate::error::{BoxError, Result};
use crate::stream::ReadStream;

pub type WriteFn = Arc<dyn Fn(&mut CustomWrite<'_>) -> Result<(), BoxError> + Send + Sync>;
pub type ReadFn =
    Arc<dyn for<'a> Fn(CustomRead<'a>) -> BoxFuture<'a, Result<Value, BoxError>> + Send + Sync>;

/// Encoder and decoder of a custom node.
#[derive(Clone)]
pub struct CustomCodec {
    pub(crate) write: WriteFn,
    pub(crate) read: ReadFn,
}

impl CustomCodec {
    pub fn new<W, R>(write: W, read: R) -> Self
    where
        W: Fn(&mut CustomWrite<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
        R: for<'a> Fn(CustomRead<'a>) -> BoxFuture<'a, Result<Value, BoxError>>
            + Send
            + Sync
            + 'static,
    {
        CustomCodec {
            write: Arc::new(write),
            read: Arc::new(read),
        }
    }
}

impl fmt::Debug for CustomCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomCodec(..)")
    }
}

macro_rules! put_fixed {
    ($($name:ident: $ty:ty => $write:ident,)*) => {
        $(
            pub fn $name(&mut self, value: $ty) {
                let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                match self.endian {
                    Endian::Big => BigEndian::$write(&mut bytes, value),
                    Endian::Little => LittleEndian::$write(&mut bytes, value),
                }
                self.out.extend_from_slice(&bytes);
            }
        )*
    };
}

macro_rules! read_fixed {
    ($($name:ident: $ty:ty => $read:ident,)*) => {
        $(
            pub async fn $name(&mut self) -> Result<$ty> {
                let width = std::mem::size_of::<$ty>();
                self.stream.await_bytes(width).await?;
                let bytes = self.stream.take(width)?;
                Ok(match self.endian {
                    Endian::Big => BigEndian::$read(bytes),
                    Endian::Little => LittleEndian::$read(bytes),
                })
            }
        )*
    };
}

/// Write-side handle given to a custom encoder.
pub struct CustomWrite<'a> {
    pub(crate) value: &'a Value,
    pub(crate) endian: Endian,
    pub(crate) path: &'a str,
    pub(crate) user: &'a Value,
    pub(crate) record: &'a Map<String, Value>,
    pub(crate) out: Vec<u8>,
}

impl<'a> CustomWrite<'a> {
    /// The value resolved for this field, `null` if the provider had none.
    pub fn value(&self) -> &'a Value {
        self.value
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn path(&self) -> &'a str {
        self.path
    }

    pub fn user(&self) -> &'a Value {
        self.user
    }

    pub fn record(&self) -> &'a Map<String, Value> {
        self.record
    }

    /// Bytes produced so far.
    pub fn written(&self) -> &[u8] {
        &self.out
    }

    pub fn put_u8(&mut self, value: u8) {
        self.out.push(value);
    }

    pub fn put_i8(&mut self, value: i8) {
        self.out.push(value as u8);
    }

    put_fixed! {
        put_u16: u16 => write_u16,
        put_i16: i16 => write_i16,
        put_u32: u32 => write_u32,
        put_i32: i32 => write_i32,
        put_u64: u64 => write_u64,
        put_i64: i64 => write_i64,
        put_f32: f32 => write_f32,
        put_f64: f64 => write_f64,
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }
}

/// Read-side handle given to a custom decoder.
pub struct CustomRead<'a> {
    pub(crate) stream: &'a mut ReadStream,
    pub(crate) endian: Endian,
    pub(crate) path: String,
    pub(crate) user: &'a Value,
    pub(crate) record: &'a Map<String, Value>,
}

impl<'a> CustomRead<'a> {
    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn user(&self) -> &'a Value {
        self.user
    }

    pub fn record(&self) -> &'a Map<String, Value> {
        self.record
    }

    /// Stream offset of the next byte.
    pub fn position(&self) -> u64 {
        self.stream.position()
    }

    /// Suspends until `n` bytes are resident, without consuming them.
    pub async fn await_bytes(&mut self, n: usize) -> Result<()> {
        self.stream.await_bytes(n).await
    }

    pub async fn read_u8(&mut self) -> Result<u8> {
        self.stream.await_bytes(1).await?;
        Ok(self.stream.take(1)?[0])
    }

    pub async fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8().await? as i8)
    }

    read_fixed! {
        read_u16: u16 => read_u16,
        read_i16: i16 => read_i16,
        read_u32: u32 => read_u32,
        read_i32: i32 => read_i32,
        read_u64: u64 => read_u64,
        read_i64: i64 => read_i64,
        read_f32: f32 => read_f32,
        read_f64: f64 => read_f64,
    }

    pub async fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.stream.read_bytes(n).await
    }
}
