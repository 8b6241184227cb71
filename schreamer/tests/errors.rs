//! Failures: malformed schemas, unusable values and truncated input.

#![cfg(all(feature = "reader", feature = "writer"))]

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use schreamer::schema::{
    big_endian, file, group, i8, latin1, select, u16, u32, u64, u8, utf8, Schema,
};
use schreamer::stream::BoxSink;
use schreamer::{create_reader, create_writer, Error, ErrorCategory, IntKind, Node, WriterOptions};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::AsyncWrite;

/// In-memory sink whose contents outlive the pass.
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl AsyncWrite for SharedSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

async fn write_err(schema: Node, provider: Value) -> Error {
    let tmp = TempDir::new().unwrap();
    let schema = Schema::new(schema).unwrap();
    create_writer(schema, provider)
        .write(tmp.path().join("out.bin"))
        .await
        .unwrap_err()
}

#[test]
fn malformed_schemas_are_rejected_up_front() {
    let err = Schema::new(big_endian([Node::int(IntKind::U8)])).unwrap_err();
    assert!(matches!(err, Error::MissingName { .. }));
    assert_eq!(err.category(), ErrorCategory::Configuration);

    let err = Schema::new(big_endian([utf8()])).unwrap_err();
    assert!(matches!(err, Error::MisplacedString { .. }));
    assert!(err.to_string().contains("U8, U16, U32, or U64"), "{}", err);

    let err = Schema::new(big_endian([file("a.bin", [file("b.bin", [u8("x")])])])).unwrap_err();
    assert!(matches!(err, Error::NestedFile { .. }));

    let err = Schema::new(big_endian([u8("list").sequence(Vec::<Node>::new())])).unwrap_err();
    assert!(matches!(err, Error::EmptySequence { .. }));
}

#[tokio::test]
async fn byte_order_must_be_declared() {
    let err = write_err(group([u8("a")]), json!({ "a": 1 })).await;
    assert!(matches!(err, Error::MissingEndianness { .. }));
    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert!(err.to_string().contains("endianness not specified"), "{}", err);
}

#[tokio::test]
async fn missing_values_name_the_field() {
    let err = write_err(big_endian([u8("present"), u16("absent")]), json!({ "present": 1 })).await;
    assert_eq!(err.category(), ErrorCategory::Value);
    assert!(err.to_string().contains("absent"), "{}", err);

    let err = write_err(big_endian([u8("s").string(latin1())]), json!({ "s": null })).await;
    assert_eq!(err.category(), ErrorCategory::Value);

    let err = write_err(big_endian([u8("list").sequence([u8("x")])]), json!({})).await;
    assert_eq!(err.category(), ErrorCategory::Value);
}

#[tokio::test]
async fn unusable_values_are_rejected() {
    let cases = [
        (big_endian([u8("n")]), json!({ "n": 256 })),
        (big_endian([i8("n")]), json!({ "n": -129 })),
        (big_endian([u16("n")]), json!({ "n": 1.5 })),
        (big_endian([u64("n")]), json!({ "n": -1 })),
        (big_endian([u32("n")]), json!({ "n": "12" })),
        (big_endian([u8("s").string(latin1())]), json!({ "s": "日本" })),
        (big_endian([u8("s").string(utf8())]), json!({ "s": "x".repeat(256) })),
        (big_endian([u8("list").sequence([u8("x")])]), json!({ "list": 3 })),
    ];
    for (schema, values) in cases {
        let err = write_err(schema, values.clone()).await;
        assert_eq!(err.category(), ErrorCategory::Value, "{} gave {}", values, err);
    }
}

#[tokio::test]
async fn truncated_input_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("short.bin");
    std::fs::write(&path, [0x4C, 0x4F, 0x43]).unwrap();

    let schema = Schema::new(big_endian([u32("magic"), u16("version")])).unwrap();
    let err = create_reader(schema).read(path.as_path()).await.unwrap_err();
    assert!(matches!(err, Error::UnexpectedEof { .. }));
    assert_eq!(err.category(), ErrorCategory::UnexpectedEof);

    std::fs::write(&path, [5, b'a', b'b']).unwrap();
    let schema = Schema::new(big_endian([u8("s").string(latin1())])).unwrap();
    let err = create_reader(schema).read(path.as_path()).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::UnexpectedEof);
}

#[tokio::test]
async fn missing_input_is_an_io_error() {
    let tmp = TempDir::new().unwrap();
    let schema = Schema::new(big_endian([u8("n")])).unwrap();
    let err = create_reader(schema)
        .read(tmp.path().join("absent.bin"))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Io);
}

#[tokio::test]
async fn fields_need_a_file_scope() {
    let tmp = TempDir::new().unwrap();
    let schema = Schema::new(big_endian([file("a.bin", [u8("x")]), u8("stray")])).unwrap();
    let err = create_writer(schema, json!({ "a.bin": { "x": 1 }, "stray": 2 }))
        .write(tmp.path())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoFileScope { .. }));
}

#[tokio::test]
async fn selected_files_do_not_nest() {
    let format = big_endian([file("a.bin", [select(|_| file("b.bin", [u8("x")]))])]);
    let tmp = TempDir::new().unwrap();
    let schema = Schema::new(format).unwrap();
    let err = create_writer(schema, json!({ "a.bin": { "x": 1 } }))
        .write(tmp.path())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NestedFile { .. }));
}

#[tokio::test]
async fn flushed_bytes_stay_written() {
    let sink = SharedSink::default();
    let format = big_endian([u8("list").sequence([Node::int(IntKind::U8)]), u8("missing")]);
    let schema = Schema::new(format).unwrap();

    let handle = sink.clone();
    let options = WriterOptions::new("out.bin")
        .with_buffer_size(16)
        .with_sink(move |_: &Path| {
            let sink = handle.clone();
            async move { Ok(Box::new(sink) as BoxSink) }
        });
    let err = create_writer(schema, json!({ "list": (0..20).collect::<Vec<u8>>() }))
        .write(options)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Value);

    let mut flushed = vec![20];
    flushed.extend(0..15u8);
    assert_eq!(sink.contents(), flushed);
}
