//! Write pass: walks a schema against a [`Provider`] and emits bytes.

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use relative_path::RelativePath;
use serde_json::{Map, Value};

use crate::codec::{describe, Endian, IntKind};
use crate::context::{split_target, FieldContext, Scope};
use crate::custom::{CustomCodec, CustomWrite};
use crate::error::{Error, Result};
use crate::options::WriterOptions;
use crate::provider::{LazySequence, Provider};
use crate::schema::{Entry, Kind, NodeId, Schema, Slot};
use crate::stream::{BoxSink, WriteStream};
use crate::text::text_of;

/// Binds a schema to the data it will be written from.
pub fn create_writer(schema: impl Into<Arc<Schema>>, provider: impl Into<Provider>) -> Writer {
    Writer {
        schema: schema.into(),
        provider: provider.into(),
    }
}

#[derive(Debug, Clone)]
pub struct Writer {
    schema: Arc<Schema>,
    provider: Provider,
}

impl Writer {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Runs one complete pass.
    ///
    /// On failure, whatever was already flushed to a sink stays written.
    pub async fn write(&self, target: impl Into<WriterOptions>) -> Result<()> {
        let options = target.into().clamped();
        let files = self.schema.file_count();
        let pass = WritePass {
            options: &options,
            nest: files > 1,
        };
        let input = Input::Scope(&self.provider);
        let mut record = Map::new();

        if files == 0 {
            let (dir, name) = split_target(&options.path)?;
            tracing::trace!(path = %options.path.display(), "no file node, writing a single file");
            let root = [self.schema.root()];
            pass.file(&self.schema, &root, &name, &Scope::new(dir), input, &mut record)
                .await?;
        } else {
            let scope = Scope::new(options.path.clone());
            pass.walk(&self.schema, self.schema.root(), scope, input, None, &mut record)
                .await?;
        }
        Ok(())
    }
}

/// Where a node looks for its value.
#[derive(Debug, Clone, Copy)]
enum Input<'a> {
    Absent,
    /// Named nodes look their field up, unnamed ones take the whole value.
    Scope(&'a Provider),
    /// Positional value of a sequence element, taken whatever the name.
    Bare(&'a Provider),
}

impl<'a> Input<'a> {
    fn lookup(self, name: Option<&str>) -> Option<&'a Provider> {
        match (self, name) {
            (Input::Absent, _) => None,
            (Input::Bare(provider), _) | (Input::Scope(provider), None) => Some(provider),
            (Input::Scope(provider), Some(name)) => provider.field(name),
        }
    }

    fn scoped(self) -> Input<'a> {
        match self {
            Input::Bare(provider) => Input::Scope(provider),
            other => other,
        }
    }

    fn nested(self, key: &str) -> Input<'a> {
        match self.scoped() {
            Input::Scope(provider) => provider.field(key).map_or(Input::Absent, Input::Scope),
            _ => Input::Absent,
        }
    }
}

struct WritePass<'p> {
    options: &'p WriterOptions,
    nest: bool,
}

impl<'p> WritePass<'p> {
    fn walk<'s>(
        &'s self,
        schema: &'s Schema,
        id: NodeId,
        scope: Scope,
        input: Input<'s>,
        stream: Option<&'s mut WriteStream>,
        record: &'s mut Map<String, Value>,
    ) -> BoxFuture<'s, Result<Value>> {
        async move {
            let entry = schema.entry(id);
            match &entry.kind {
                Kind::Endian(endian) => {
                    let scope = scope.with_endian(*endian);
                    self.children(schema, &entry.children, &scope, input.scoped(), stream, record)
                        .await
                }
                Kind::Group => {
                    self.children(schema, &entry.children, &scope, input.scoped(), stream, record)
                        .await
                }
                Kind::Directory(rel) => {
                    let scope = scope.enter_dir(rel);
                    let input = input.nested(rel.as_str());
                    self.children(schema, &entry.children, &scope, input, stream, record)
                        .await
                }
                Kind::File(rel) => {
                    let input = input.nested(rel.as_str());
                    self.file(schema, &entry.children, rel, &scope, input, record)
                        .await
                }
                Kind::Select(select) => {
                    let node = select(&FieldContext::new(
                        &scope,
                        &self.options.user_context,
                        record,
                    ));
                    let sub = Schema::attach(node, schema, id)?;
                    self.walk(&sub, sub.root(), scope, input, stream, record)
                        .await
                }
                Kind::Custom(codec) => {
                    let scope = scope.field(entry.label());
                    let stream = attached(stream, entry, &scope)?;
                    self.custom(entry, codec, &scope, input, stream, record)
                        .await
                }
                Kind::Int(kind) => {
                    let scope = scope.field(entry.label());
                    let stream = attached(stream, entry, &scope)?;
                    let endian = scope.require_endian()?;
                    match &entry.payload {
                        Slot::Empty => {
                            let value = self
                                .value(entry, &scope, input, record)
                                .or_else(|| entry.default.clone())
                                .ok_or_else(|| missing(&scope))?;
                            let n = kind
                                .check(&value)
                                .map_err(|reason| Error::invalid_value(scope.path(), reason))?;
                            self.put_int(stream, *kind, endian, n, &scope).await?;
                            Ok(keep(entry, record, int_value(n)))
                        }
                        Slot::Text(text) => {
                            let text = schema.entry(*text);
                            self.string(text, entry, *kind, endian, &scope, input, stream, record)
                                .await
                        }
                        Slot::Sequence(elements) => {
                            let ctx = Counted {
                                entry,
                                kind: *kind,
                                endian,
                            };
                            self.sequence(schema, ctx, elements, &scope, input, stream, record)
                                .await
                        }
                    }
                }
                Kind::Float(kind) => {
                    let scope = scope.field(entry.label());
                    let stream = attached(stream, entry, &scope)?;
                    let endian = scope.require_endian()?;
                    let value = self
                        .value(entry, &scope, input, record)
                        .or_else(|| entry.default.clone())
                        .ok_or_else(|| missing(&scope))?;
                    let f = kind
                        .check(&value)
                        .map_err(|reason| Error::invalid_value(scope.path(), reason))?;
                    self.trace(&scope, kind.label(), stream.position());
                    kind.encode(endian, f, stream.reserve(kind.width()).await?);
                    Ok(keep(entry, record, value))
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
        input: Input<'_>,
        mut stream: Option<&mut WriteStream>,
        record: &mut Map<String, Value>,
    ) -> Result<Value> {
        for &id in ids {
            self.walk(schema, id, scope.clone(), input, stream.as_deref_mut(), record)
                .await?;
        }
        Ok(Value::Null)
    }

    /// Opens one file scope, writes its children and closes it.
    async fn file(
        &self,
        schema: &Schema,
        children: &[NodeId],
        rel: &RelativePath,
        scope: &Scope,
        input: Input<'_>,
        record: &mut Map<String, Value>,
    ) -> Result<Value> {
        let path = rel.to_path(scope.dir());
        let scope = scope.enter_file(rel)?;
        tracing::trace!(path = %path.display(), "opening file");
        let sink = self.open(&path).await?;
        let mut stream = WriteStream::new(sink, self.options.write_buffer_size, scope.path());

        let walked = if self.nest {
            let mut nested = Map::new();
            let walked = self
                .children(schema, children, &scope, input, Some(&mut stream), &mut nested)
                .await;
            record.insert(rel.to_string(), Value::Object(nested));
            walked
        } else {
            self.children(schema, children, &scope, input, Some(&mut stream), record)
                .await
        };
        if let Err(err) = walked {
            stream.abort();
            return Err(err);
        }

        let bytes = stream.finish().await?;
        tracing::trace!(path = %path.display(), bytes, "file written");
        Ok(Value::Null)
    }

    async fn open(&self, path: &Path) -> Result<BoxSink> {
        let label = path.display().to_string();
        if let Some(factory) = &self.options.create_writable_stream {
            return factory(path).await.map_err(|err| Error::io(&label, err));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| Error::io(&parent.display().to_string(), err))?;
        }
        let file = tokio::fs::File::create(path)
            .await
            .map_err(|err| Error::io(&label, err))?;
        Ok(Box::new(file))
    }

    /// Provider entry of a field, computed entries evaluated.
    fn provided<'a>(
        &self,
        entry: &Entry,
        scope: &Scope,
        input: Input<'a>,
        record: &Map<String, Value>,
    ) -> Option<Cow<'a, Provider>> {
        match input.lookup(entry.name.as_deref())? {
            Provider::Computed(f) => Some(Cow::Owned(f(&FieldContext::new(
                scope,
                &self.options.user_context,
                record,
            )))),
            provider => Some(Cow::Borrowed(provider)),
        }
    }

    /// Literal value of a field. `null` counts as no value.
    fn value(
        &self,
        entry: &Entry,
        scope: &Scope,
        input: Input<'_>,
        record: &Map<String, Value>,
    ) -> Option<Value> {
        self.provided(entry, scope, input, record)
            .and_then(|provider| provider.to_value())
            .filter(|value| !value.is_null())
    }

    async fn put_int(
        &self,
        stream: &mut WriteStream,
        kind: IntKind,
        endian: Endian,
        n: i128,
        scope: &Scope,
    ) -> Result<()> {
        self.trace(scope, kind.label(), stream.position());
        kind.encode(endian, n, stream.reserve(kind.width()).await?);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn string(
        &self,
        text: &Entry,
        owner: &Entry,
        kind: IntKind,
        endian: Endian,
        scope: &Scope,
        input: Input<'_>,
        stream: &mut WriteStream,
        record: &mut Map<String, Value>,
    ) -> Result<Value> {
        let encoding = match text.kind {
            Kind::Text(encoding) => encoding,
            _ => {
                return Err(Error::UnexpectedNode {
                    kind: text.kind.label(),
                    path: scope.path().to_string(),
                })
            }
        };
        let value = self
            .value(owner, scope, input, record)
            .or_else(|| text.default.clone())
            .or_else(|| owner.default.clone())
            .ok_or_else(|| missing(scope))?;
        let text = text_of(&value).map_err(|reason| Error::invalid_value(scope.path(), reason))?;
        let bytes = encoding
            .encode(&text)
            .map_err(|reason| Error::invalid_value(scope.path(), reason))?;
        let width = encoding.byte_len(&text);
        let len = kind.check(&Value::from(width)).map_err(|_| {
            Error::invalid_value(
                scope.path(),
                format!("{} encoded bytes overflow a {} length", width, kind.label()),
            )
        })?;

        self.put_int(stream, kind, endian, len, scope).await?;
        stream.copy_bytes(&bytes).await?;
        Ok(keep(owner, record, Value::String(text)))
    }

    /// Writes the count, then every item against the element schema.
    #[allow(clippy::too_many_arguments)]
    async fn sequence(
        &self,
        schema: &Schema,
        seq: Counted<'_>,
        elements: &[NodeId],
        scope: &Scope,
        input: Input<'_>,
        stream: &mut WriteStream,
        record: &mut Map<String, Value>,
    ) -> Result<Value> {
        let provided = match self.provided(seq.entry, scope, input, record) {
            Some(provided) if !matches!(&*provided, Provider::Value(Value::Null)) => provided,
            _ => match &seq.entry.default {
                Some(value) => Cow::Owned(Provider::from(value.clone())),
                None => return Err(missing(scope)),
            },
        };

        let (count, items): (Value, Box<dyn Iterator<Item = Cow<'_, Provider>> + Send + '_>) =
            match &*provided {
                Provider::List(list) => (
                    Value::from(list.len()),
                    Box::new(list.iter().map(Cow::Borrowed)),
                ),
                Provider::Lazy(generate) => {
                    let LazySequence { count, items } = generate(&FieldContext::new(
                        scope,
                        &self.options.user_context,
                        record,
                    ));
                    (count, Box::new(items.map(Cow::Owned)))
                }
                Provider::Value(value) => {
                    return Err(Error::invalid_value(
                        scope.path(),
                        format!("expected a list, found {}", describe(value)),
                    ))
                }
                Provider::Record(_) | Provider::Computed(_) => {
                    return Err(Error::invalid_value(scope.path(), "expected a list"))
                }
            };

        let n = seq.kind.check(&count).map_err(|reason| {
            Error::invalid_value(scope.path(), format!("sequence count: {}", reason))
        })?;
        self.put_int(stream, seq.kind, seq.endian, n, scope).await?;

        let mut values = vec![];
        for (index, item) in items.enumerate() {
            let scope = scope.item(index);
            values.push(self.item(schema, elements, &scope, &item, stream).await?);
        }
        Ok(keep(seq.entry, record, Value::Array(values)))
    }

    async fn item(
        &self,
        schema: &Schema,
        elements: &[NodeId],
        scope: &Scope,
        item: &Provider,
        stream: &mut WriteStream,
    ) -> Result<Value> {
        let mut record = Map::new();
        let item = match item {
            Provider::Computed(f) => Cow::Owned(f(&FieldContext::new(
                scope,
                &self.options.user_context,
                &record,
            ))),
            other => Cow::Borrowed(other),
        };
        let positional = match &*item {
            Provider::List(values) if elements.len() > 1 => Some(values),
            _ => None,
        };

        let mut results = Vec::with_capacity(elements.len());
        for (index, &id) in elements.iter().enumerate() {
            let input = match positional {
                Some(values) => values.get(index).map_or(Input::Absent, Input::Bare),
                None => Input::Scope(&*item),
            };
            let result = self
                .walk(schema, id, scope.clone(), input, Some(&mut *stream), &mut record)
                .await?;
            results.push(result);
        }
        Ok(schema.item_value(elements, record, results))
    }

    async fn custom(
        &self,
        entry: &Entry,
        codec: &CustomCodec,
        scope: &Scope,
        input: Input<'_>,
        stream: &mut WriteStream,
        record: &mut Map<String, Value>,
    ) -> Result<Value> {
        let endian = scope.require_endian()?;
        let value = self
            .value(entry, scope, input, record)
            .or_else(|| entry.default.clone())
            .unwrap_or(Value::Null);

        let bytes = {
            let mut out = CustomWrite {
                value: &value,
                endian,
                path: scope.path(),
                user: &self.options.user_context,
                record: &*record,
                out: vec![],
            };
            (codec.write)(&mut out).map_err(|err| Error::from_callback(scope.path(), err))?;
            out.out
        };

        self.trace(scope, entry.kind.label(), stream.position());
        stream.copy_bytes(&bytes).await?;
        Ok(keep(entry, record, value))
    }

    fn trace(&self, scope: &Scope, kind: &str, offset: u64) {
        if self.options.debug {
            tracing::debug!(path = scope.path(), kind, offset, "write field");
        } else {
            tracing::trace!(path = scope.path(), kind, offset, "write field");
        }
    }
}

/// The integer node that prefixes a sequence with its count.
#[derive(Clone, Copy)]
struct Counted<'a> {
    entry: &'a Entry,
    kind: IntKind,
    endian: Endian,
}

fn attached<'a>(
    stream: Option<&'a mut WriteStream>,
    entry: &Entry,
    scope: &Scope,
) -> Result<&'a mut WriteStream> {
    stream.ok_or_else(|| Error::NoFileScope {
        kind: entry.kind.label(),
        path: scope.path().to_string(),
    })
}

fn missing(scope: &Scope) -> Error {
    Error::invalid_value(scope.path(), "no value provided")
}

/// Records a written value for later `select` callbacks of the same record.
fn keep(entry: &Entry, record: &mut Map<String, Value>, value: Value) -> Value {
    if let Some(name) = &entry.name {
        record.insert(name.clone(), value.clone());
    }
    value
}

fn int_value(n: i128) -> Value {
    match i64::try_from(n) {
        Ok(n) => Value::from(n),
        Err(_) => Value::from(n as u64),
    }
}
