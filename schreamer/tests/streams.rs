//! Pass options: sink and source overrides, user context and transforms.

#![cfg(all(feature = "reader", feature = "writer"))]

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use schreamer::schema::{big_endian, u16, u32, u8, utf8, Schema};
use schreamer::stream::{BoxSink, BoxSource};
use schreamer::{
    create_reader, create_writer, ErrorCategory, Provider, ReaderOptions, Transform, WriterOptions,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::DuplexStream;

/// Hands out one end of a pipe, once.
fn take_once(end: DuplexStream) -> Arc<Mutex<Option<DuplexStream>>> {
    Arc::new(Mutex::new(Some(end)))
}

fn taken(slot: &Mutex<Option<DuplexStream>>) -> io::Result<DuplexStream> {
    slot.lock()
        .unwrap()
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "pipe end already taken"))
}

/// A pipe much smaller than the data makes the writer wait on the reader.
#[tokio::test]
async fn writer_waits_for_a_slow_sink() {
    let format = big_endian([
        u16("title").string(utf8()),
        u32("samples").sequence([u32("t"), u16("v")]),
    ]);
    let values = json!({
        "title": "streamed through an eight byte pipe",
        "samples": (0..500u32).map(|t| json!({ "t": t, "v": t % 7 })).collect::<Vec<_>>(),
    });
    let schema = Arc::new(Schema::new(format).unwrap());

    let (tx, rx) = tokio::io::duplex(8);
    let tx = take_once(tx);
    let rx = take_once(rx);

    let write_options = WriterOptions::new("pipe.bin")
        .with_buffer_size(16)
        .with_sink(move |_: &Path| {
            let tx = taken(&tx);
            async move { tx.map(|tx| Box::new(tx) as BoxSink) }
        });
    let read_options = ReaderOptions::new("pipe.bin")
        .with_buffer_size(16)
        .with_source(move |_: &Path| {
            let rx = taken(&rx);
            async move { rx.map(|rx| Box::new(rx) as BoxSource) }
        });

    let writer = create_writer(schema.clone(), values.clone());
    let reader = create_reader(schema);
    let (written, read) = tokio::join!(writer.write(write_options), reader.read(read_options));
    written.unwrap();
    assert_eq!(read.unwrap(), values);
}

#[tokio::test]
async fn sink_factory_failures_are_io_errors() {
    let schema = Schema::new(big_endian([u8("n")])).unwrap();
    let options = WriterOptions::new("nowhere.bin").with_sink(|_: &Path| async {
        Err::<BoxSink, _>(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
    });
    let err = create_writer(schema, json!({ "n": 1 }))
        .write(options)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Io);
}

#[tokio::test]
async fn sink_factory_gets_the_resolved_path() {
    let seen = Arc::new(Mutex::new(vec![]));
    let format = big_endian([
        schreamer::schema::file("a.bin", [u8("x")]),
        schreamer::schema::dir("d", [schreamer::schema::file("b.bin", [u8("y")])]),
    ]);
    let schema = Schema::new(format).unwrap();

    let log = seen.clone();
    let options = WriterOptions::new("base").with_sink(move |path: &Path| {
        log.lock().unwrap().push(path.to_path_buf());
        async { Ok(Box::new(tokio::io::sink()) as BoxSink) }
    });
    create_writer(schema, json!({ "a.bin": { "x": 1 }, "d": { "b.bin": { "y": 2 } } }))
        .write(options)
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        [Path::new("base").join("a.bin"), Path::new("base").join("d").join("b.bin")]
    );
}

#[tokio::test]
async fn user_context_reaches_computed_values() {
    let format = big_endian([u16("version"), u8("label").string(utf8())]);
    let provider = Provider::record([
        (
            "version",
            Provider::computed(|cx| Provider::from(cx.user()["version"].clone())),
        ),
        (
            "label",
            Provider::computed(|cx| {
                let version = cx.record().get("version").cloned().unwrap_or(Value::Null);
                let field = cx.path().rsplit('/').next().unwrap_or("");
                Provider::from(format!("{} v{}", field, version))
            }),
        ),
    ]);

    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("ctx.bin");
    let schema = Arc::new(Schema::new(format).unwrap());
    create_writer(schema.clone(), provider)
        .write(
            WriterOptions::new(&path)
                .with_user_context(json!({ "version": 3 }))
                .with_debug(true),
        )
        .await
        .unwrap();

    let record = create_reader(schema)
        .read(ReaderOptions::new(&path).with_debug(true))
        .await
        .unwrap();
    assert_eq!(record, json!({ "version": 3, "label": "label v3" }));
}

#[tokio::test]
async fn transforms_rewrite_read_values() {
    let format = big_endian([
        u16("version"),
        u8("points").sequence([u8("x"), u8("y")]),
        u8("raw").sequence([schreamer::Node::int(schreamer::IntKind::U8)]),
    ]);
    let values = json!({
        "version": 2,
        "points": [{ "x": 1, "y": 2 }, { "x": 3, "y": 4 }],
        "raw": [7, 8],
    });

    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("t.bin");
    let schema = Arc::new(Schema::new(format).unwrap());
    create_writer(schema.clone(), values)
        .write(path.as_path())
        .await
        .unwrap();

    let reader = create_reader(schema).with_transform(Transform::fields([
        (
            "version",
            Transform::map(|value, cx| {
                let prefix = cx.user()["prefix"].as_str().unwrap_or("");
                json!(format!("{}{}", prefix, value))
            }),
        ),
        (
            "points",
            Transform::fields([(
                "x",
                Transform::map(|value, _| json!(value.as_u64().unwrap_or(0) * 10)),
            )]),
        ),
        (
            "raw",
            Transform::map(|value, cx| json!({ "index": cx.index(), "value": value })),
        ),
    ]));
    let record = reader
        .read(ReaderOptions::new(&path).with_user_context(json!({ "prefix": "v" })))
        .await
        .unwrap();

    assert_eq!(
        record,
        json!({
            "version": "v2",
            "points": [{ "x": 10, "y": 2 }, { "x": 30, "y": 4 }],
            "raw": [{ "index": 0, "value": 7 }, { "index": 1, "value": 8 }],
        })
    );
}
