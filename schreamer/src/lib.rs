//! Schema-driven binary streams.
//!
//! Describe a binary layout once as a tree of [`schema::Node`]s, then write
//! application data into files with [`create_writer`], or read those files
//! back into a [`serde_json::Value`] record with [`create_reader`]. Byte
//! order, string length prefixes, sequence counts and file boundaries are all
//! declared in the schema, never computed by hand.
//!
//! ```no_run
//! # async fn run() -> schreamer::Result<()> {
//! use schreamer::schema::{big_endian, u16, u32, Schema};
//! use schreamer::{create_reader, create_writer};
//! use serde_json::json;
//!
//! let schema = std::sync::Arc::new(Schema::new(big_endian([
//!     u32("magic").default_value(0x4C4F434F),
//!     u16("version"),
//! ]))?);
//!
//! create_writer(schema.clone(), json!({ "version": 1 }))
//!     .write("out/header.bin")
//!     .await?;
//! let record = create_reader(schema).read("out/header.bin").await?;
//! assert_eq!(record, json!({ "magic": 0x4C4F434F, "version": 1 }));
//! # Ok(())
//! # }
//! ```

pub mod codec;
mod context;
pub mod custom;
mod error;
pub mod options;
pub mod provider;
#[cfg(feature = "reader")]
mod reader;
pub mod schema;
pub mod stream;
pub mod text;
#[cfg(feature = "writer")]
mod writer;

pub use codec::{Endian, FloatKind, IntKind};
pub use context::FieldContext;
pub use custom::{CustomCodec, CustomRead, CustomWrite};
pub use error::{BoxError, Error, ErrorCategory, Result};
pub use options::{ReaderOptions, SinkFactory, SourceFactory, WriterOptions};
pub use provider::{LazySequence, Provider, Transform};
#[cfg(feature = "reader")]
pub use reader::{create_reader, Reader};
pub use schema::{Node, Schema};
pub use text::TextEncoding;
#[cfg(feature = "writer")]
pub use writer::{create_writer, Writer};
