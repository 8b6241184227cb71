//! Caller-supplied data for a write pass, and value hooks for a read pass.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::context::FieldContext;

pub type ComputeFn = Arc<dyn Fn(&FieldContext<'_>) -> Provider + Send + Sync>;
pub type LazyFn = Arc<dyn Fn(&FieldContext<'_>) -> LazySequence + Send + Sync>;
pub type MapFn = Arc<dyn Fn(Value, &FieldContext<'_>) -> Value + Send + Sync>;

/// Data source of a write pass, keyed by field name.
///
/// Resolved once per node visit: literals are used as they are, computed
/// entries are called, lazy entries only make sense for sequence nodes.
#[derive(Clone)]
pub enum Provider {
    Value(Value),
    Record(BTreeMap<String, Provider>),
    List(Vec<Provider>),
    Computed(ComputeFn),
    Lazy(LazyFn),
}

/// A sequence produced on demand.
///
/// `count` is written as the sequence's count scalar before any item is
/// pulled. It is trusted as declared and not compared with the number of
/// items the iterator actually yields.
pub struct LazySequence {
    pub(crate) count: Value,
    pub(crate) items: Box<dyn Iterator<Item = Provider> + Send>,
}

impl LazySequence {
    pub fn new<C, I>(count: C, items: I) -> Self
    where
        C: Into<Value>,
        I: IntoIterator<Item = Provider>,
        I::IntoIter: Send + 'static,
    {
        LazySequence {
            count: count.into(),
            items: Box::new(items.into_iter()),
        }
    }
}

impl fmt::Debug for LazySequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySequence")
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

impl Provider {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&FieldContext<'_>) -> Provider + Send + Sync + 'static,
    {
        Provider::Computed(Arc::new(f))
    }

    pub fn lazy<F>(f: F) -> Self
    where
        F: Fn(&FieldContext<'_>) -> LazySequence + Send + Sync + 'static,
    {
        Provider::Lazy(Arc::new(f))
    }

    pub fn record<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<Provider>,
        I: IntoIterator<Item = (K, V)>,
    {
        Provider::Record(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn list<V, I>(items: I) -> Self
    where
        V: Into<Provider>,
        I: IntoIterator<Item = V>,
    {
        Provider::List(items.into_iter().map(Into::into).collect())
    }

    /// Looks a field up in a record. Anything else has no fields.
    pub fn field(&self, name: &str) -> Option<&Provider> {
        match self {
            Provider::Record(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Literal view of this provider. Computed and lazy entries have none.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Provider::Value(value) => Some(value.clone()),
            Provider::Record(fields) => Some(Value::Object(
                fields
                    .iter()
                    .filter_map(|(k, v)| v.to_value().map(|v| (k.clone(), v)))
                    .collect(),
            )),
            Provider::List(items) => Some(Value::Array(
                items.iter().filter_map(Provider::to_value).collect(),
            )),
            Provider::Computed(_) | Provider::Lazy(_) => None,
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Provider::Record(fields) => f.debug_map().entries(fields.iter()).finish(),
            Provider::List(items) => f.debug_list().entries(items.iter()).finish(),
            Provider::Computed(_) => f.write_str("Computed(..)"),
            Provider::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl Default for Provider {
    fn default() -> Self {
        Provider::Record(BTreeMap::new())
    }
}

impl From<Value> for Provider {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => Provider::Record(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Provider::from(v)))
                    .collect(),
            ),
            Value::Array(items) => Provider::List(items.into_iter().map(Provider::from).collect()),
            scalar => Provider::Value(scalar),
        }
    }
}

impl From<Vec<Provider>> for Provider {
    fn from(items: Vec<Provider>) -> Self {
        Provider::List(items)
    }
}

impl From<&str> for Provider {
    fn from(text: &str) -> Self {
        Provider::Value(Value::from(text))
    }
}

impl From<String> for Provider {
    fn from(text: String) -> Self {
        Provider::Value(Value::from(text))
    }
}

macro_rules! provider_from_scalar {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Provider {
                fn from(value: $ty) -> Self {
                    Provider::Value(Value::from(value))
                }
            }
        )*
    };
}

provider_from_scalar!(bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

/// Rewrites decoded values during a read pass.
///
/// Laid out like the provider of a write pass: `Fields` is keyed by field
/// name (or file/directory path), `Map` rewrites the value found there. A
/// `Map` on a sequence applies to every item; `Fields` on a sequence applies
/// to the fields of every item.
#[derive(Clone)]
pub enum Transform {
    Map(MapFn),
    Fields(BTreeMap<String, Transform>),
}

impl Transform {
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(Value, &FieldContext<'_>) -> Value + Send + Sync + 'static,
    {
        Transform::Map(Arc::new(f))
    }

    pub fn fields<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Transform)>,
    {
        Transform::Fields(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn field(&self, name: &str) -> Option<&Transform> {
        match self {
            Transform::Fields(fields) => fields.get(name),
            Transform::Map(_) => None,
        }
    }

    pub(crate) fn apply(&self, value: Value, cx: &FieldContext<'_>) -> Value {
        match self {
            Transform::Map(f) => f(value, cx),
            Transform::Fields(_) => value,
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Map(_) => f.write_str("Map(..)"),
            Transform::Fields(fields) => f.debug_map().entries(fields.iter()).finish(),
        }
    }
}
