//! Read pass: walks a schema against byte streams and rebuilds the record.

use std::path::Path;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use relative_path::RelativePath;
use serde_json::{Map, Value};

use crate::codec::{Endian, IntKind};
use crate::context::{split_target, FieldContext, Scope};
use crate::custom::{CustomCodec, CustomRead};
use crate::error::{Error, Result};
use crate::options::ReaderOptions;
use crate::provider::Transform;
use crate::schema::{Entry, Kind, NodeId, Schema, Slot};
use crate::stream::{BoxSource, ReadStream};

/// Upper bound of the up-front allocation for a sequence, whatever its count.
const MAX_PREALLOCATED_ITEMS: usize = 4096;

pub fn create_reader(schema: impl Into<Arc<Schema>>) -> Reader {
    Reader {
        schema: schema.into(),
        transform: None,
    }
}

#[derive(Debug, Clone)]
pub struct Reader {
    schema: Arc<Schema>,
    transform: Option<Transform>,
}

impl Reader {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Rewrites decoded values on their way into the result.
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Runs one complete pass and returns the result record.
    ///
    /// With more than one `file` node, each file's fields are nested under
    /// its path; otherwise they sit at the top level.
    pub async fn read(&self, source: impl Into<ReaderOptions>) -> Result<Value> {
        let options = source.into().clamped();
        let files = self.schema.file_count();
        let pass = ReadPass {
            options: &options,
            nest: files > 1,
        };
        let transform = self.transform.as_ref();
        let mut record = Map::new();

        if files == 0 {
            let (dir, name) = split_target(&options.path)?;
            tracing::trace!(path = %options.path.display(), "no file node, reading a single file");
            let root = [self.schema.root()];
            pass.file(&self.schema, &root, &name, &Scope::new(dir), transform, &mut record)
                .await?;
        } else {
            let scope = Scope::new(options.path.clone());
            pass.walk(&self.schema, self.schema.root(), scope, transform, None, &mut record)
                .await?;
        }
        Ok(Value::Object(record))
    }
}

struct ReadPass<'p> {
    options: &'p ReaderOptions,
    nest: bool,
}

impl<'p> ReadPass<'p> {
    fn walk<'s>(
        &'s self,
        schema: &'s Schema,
        id: NodeId,
        scope: Scope,
        transform: Option<&'s Transform>,
        stream: Option<&'s mut ReadStream>,
        record: &'s mut Map<String, Value>,
    ) -> BoxFuture<'s, Result<Value>> {
        async move {
            let entry = schema.entry(id);
            match &entry.kind {
                Kind::Endian(endian) => {
                    let scope = scope.with_endian(*endian);
                    self.children(schema, &entry.children, &scope, transform, stream, record)
                        .await
                }
                Kind::Group => {
                    self.children(schema, &entry.children, &scope, transform, stream, record)
                        .await
                }
                Kind::Directory(rel) => {
                    let scope = scope.enter_dir(rel);
                    let transform = transform.and_then(|t| t.field(rel.as_str()));
                    self.children(schema, &entry.children, &scope, transform, stream, record)
                        .await
                }
                Kind::File(rel) => {
                    let transform = transform.and_then(|t| t.field(rel.as_str()));
                    self.file(schema, &entry.children, rel, &scope, transform, record)
                        .await
                }
                Kind::Select(select) => {
                    let node = select(&FieldContext::new(
                        &scope,
                        &self.options.user_context,
                        record,
                    ));
                    let sub = Schema::attach(node, schema, id)?;
                    self.walk(&sub, sub.root(), scope, transform, stream, record)
                        .await
                }
                Kind::Custom(codec) => {
                    let scope = scope.field(entry.label());
                    let stream = attached(stream, entry, &scope)?;
                    self.custom(entry, codec, &scope, transform, stream, record)
                        .await
                }
                Kind::Int(kind) => {
                    let scope = scope.field(entry.label());
                    let stream = attached(stream, entry, &scope)?;
                    let endian = scope.require_endian()?;
                    let value = self.get_int(stream, *kind, endian, &scope).await?;
                    match &entry.payload {
                        Slot::Empty => Ok(self.settle(entry, &scope, transform, record, value)),
                        Slot::Text(text) => {
                            let len = count_of(&value, &scope)?;
                            let text = schema.entry(*text);
                            let encoding = match text.kind {
                                Kind::Text(encoding) => encoding,
                                _ => {
                                    return Err(Error::UnexpectedNode {
                                        kind: text.kind.label(),
                                        path: scope.path().to_string(),
                                    })
                                }
                            };
                            let bytes = stream.read_bytes(len).await?;
                            let value = Value::String(encoding.decode(&bytes));
                            Ok(self.settle(entry, &scope, transform, record, value))
                        }
                        Slot::Sequence(elements) => {
                            let count = count_of(&value, &scope)?;
                            self.sequence(
                                schema, entry, elements, count, &scope, transform, stream, record,
                            )
                            .await
                        }
                    }
                }
                Kind::Float(kind) => {
                    let scope = scope.field(entry.label());
                    let stream = attached(stream, entry, &scope)?;
                    let endian = scope.require_endian()?;
                    self.trace(&scope, kind.label(), stream.position());
                    stream.await_bytes(kind.width()).await?;
                    let value = kind.decode(endian, stream.take(kind.width())?);
                    Ok(self.settle(entry, &scope, transform, record, value))
                }
                Kind::Text(_) => Err(Error::UnexpectedNode {
                    kind: entry.kind.label(),
                    path: scope.path().to_string(),
                }),
            }
        }
        .boxed()
    }

    async fn children(
        &self,
        schema: &Schema,
        ids: &[NodeId],
        scope: &Scope,
        transform: Option<&Transform>,
        mut stream: Option<&mut ReadStream>,
        record: &mut Map<String, Value>,
    ) -> Result<Value> {
        for &id in ids {
            self.walk(schema, id, scope.clone(), transform, stream.as_deref_mut(), record)
                .await?;
        }
        Ok(Value::Null)
    }

    async fn file(
        &self,
        schema: &Schema,
        children: &[NodeId],
        rel: &RelativePath,
        scope: &Scope,
        transform: Option<&Transform>,
        record: &mut Map<String, Value>,
    ) -> Result<Value> {
        let path = rel.to_path(scope.dir());
        let scope = scope.enter_file(rel)?;
        tracing::trace!(path = %path.display(), "opening file");
        let source = self.open(&path).await?;
        let mut stream = ReadStream::new(source, self.options.read_buffer_size, scope.path());

        let walked = if self.nest {
            let mut nested = Map::new();
            let walked = self
                .children(schema, children, &scope, transform, Some(&mut stream), &mut nested)
                .await;
            record.insert(rel.to_string(), Value::Object(nested));
            walked
        } else {
            self.children(schema, children, &scope, transform, Some(&mut stream), record)
                .await
        };
        match walked {
            Ok(_) => {
                tracing::trace!(path = %path.display(), bytes = stream.position(), "file read");
                stream.close();
                Ok(Value::Null)
            }
            Err(err) => {
                stream.abort();
                Err(err)
            }
        }
    }

    async fn open(&self, path: &Path) -> Result<BoxSource> {
        let label = path.display().to_string();
        if let Some(factory) = &self.options.create_readable_stream {
            return factory(path).await.map_err(|err| Error::io(&label, err));
        }
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|err| Error::io(&label, err))?;
        Ok(Box::new(file))
    }

    async fn get_int(
        &self,
        stream: &mut ReadStream,
        kind: IntKind,
        endian: Endian,
        scope: &Scope,
    ) -> Result<Value> {
        self.trace(scope, kind.label(), stream.position());
        stream.await_bytes(kind.width()).await?;
        Ok(kind.decode(endian, stream.take(kind.width())?))
    }

    /// Reads `count` items against the element schema.
    #[allow(clippy::too_many_arguments)]
    async fn sequence(
        &self,
        schema: &Schema,
        entry: &Entry,
        elements: &[NodeId],
        count: usize,
        scope: &Scope,
        transform: Option<&Transform>,
        stream: &mut ReadStream,
        record: &mut Map<String, Value>,
    ) -> Result<Value> {
        let field = entry
            .name
            .as_deref()
            .and_then(|name| transform?.field(name));
        let (per_item, fields) = match field {
            Some(Transform::Map(_)) => (field, None),
            Some(Transform::Fields(_)) => (None, field),
            None => (None, None),
        };

        let mut items = Vec::with_capacity(count.min(MAX_PREALLOCATED_ITEMS));
        for index in 0..count {
            let scope = scope.item(index);
            let mut item_record = Map::new();
            let mut results = Vec::with_capacity(elements.len());
            for &id in elements {
                let result = self
                    .walk(schema, id, scope.clone(), fields, Some(&mut *stream), &mut item_record)
                    .await?;
                results.push(result);
            }
            let item = schema.item_value(elements, item_record, results);
            let item = match per_item {
                Some(map) => map.apply(
                    item,
                    &FieldContext::new(&scope, &self.options.user_context, record),
                ),
                None => item,
            };
            items.push(item);
        }

        let value = Value::Array(items);
        if let Some(name) = &entry.name {
            record.insert(name.clone(), value.clone());
        }
        Ok(value)
    }

    async fn custom(
        &self,
        entry: &Entry,
        codec: &CustomCodec,
        scope: &Scope,
        transform: Option<&Transform>,
        stream: &mut ReadStream,
        record: &mut Map<String, Value>,
    ) -> Result<Value> {
        let endian = scope.require_endian()?;
        self.trace(scope, entry.kind.label(), stream.position());
        let read = CustomRead {
            stream,
            endian,
            path: scope.path().to_string(),
            user: &self.options.user_context,
            record: &*record,
        };
        let value = (codec.read)(read)
            .await
            .map_err(|err| Error::from_callback(scope.path(), err))?;
        Ok(self.settle(entry, scope, transform, record, value))
    }

    /// Applies the field's transform, then records the value under its name.
    fn settle(
        &self,
        entry: &Entry,
        scope: &Scope,
        transform: Option<&Transform>,
        record: &mut Map<String, Value>,
        value: Value,
    ) -> Value {
        let name = match &entry.name {
            Some(name) => name,
            None => return value,
        };
        let value = match transform.and_then(|t| t.field(name)) {
            Some(t) => t.apply(
                value,
                &FieldContext::new(scope, &self.options.user_context, record),
            ),
            None => value,
        };
        record.insert(name.clone(), value.clone());
        value
    }

    fn trace(&self, scope: &Scope, kind: &str, offset: u64) {
        if self.options.debug {
            tracing::debug!(path = scope.path(), kind, offset, "read field");
        } else {
            tracing::trace!(path = scope.path(), kind, offset, "read field");
        }
    }
}

fn attached<'a>(
    stream: Option<&'a mut ReadStream>,
    entry: &Entry,
    scope: &Scope,
) -> Result<&'a mut ReadStream> {
    stream.ok_or_else(|| Error::NoFileScope {
        kind: entry.kind.label(),
        path: scope.path().to_string(),
    })
}

/// A decoded length or count, as a size.
fn count_of(value: &Value, scope: &Scope) -> Result<usize> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            Error::invalid_value(scope.path(), format!("{} is not a valid count", value))
        })
}
