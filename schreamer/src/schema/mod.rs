//! Declarative description of a binary layout.
//!
//! A layout is built as a tree of [`Node`] values with the constructor
//! functions of this module, then attached into a [`Schema`], which checks its
//! structure once. A schema holds no per-pass state and can drive any number
//! of reads and writes.
//!
//! ```
//! use schreamer::schema::{big_endian, u16, u32, utf8, Schema};
//!
//! let schema = Schema::new(big_endian([
//!     u32("magic").default_value(0x4C4F434F),
//!     u16("version").default_value(1),
//!     u16("title").string(utf8()),
//! ]))
//! .unwrap();
//! assert_eq!(schema.file_count(), 0);
//! ```

mod arena;

use std::fmt;
use std::sync::Arc;

use relative_path::RelativePathBuf;
use serde_json::Value;

use crate::codec::{Endian, FloatKind, IntKind};
use crate::context::FieldContext;
use crate::custom::CustomCodec;
use crate::text::TextEncoding;

pub use self::arena::{NodeId, Schema};
pub(crate) use self::arena::{Entry, Slot};

/// Picks a sub-schema at walk time from the values seen so far in the record.
pub type SelectFn = Arc<dyn Fn(&FieldContext<'_>) -> Node + Send + Sync>;

#[derive(Clone)]
pub enum Kind {
    Endian(Endian),
    Directory(RelativePathBuf),
    File(RelativePathBuf),
    Group,
    Select(SelectFn),
    Custom(CustomCodec),
    Text(TextEncoding),
    Int(IntKind),
    Float(FloatKind),
}

impl Kind {
    pub fn label(&self) -> &'static str {
        match self {
            Kind::Endian(Endian::Big) => "BIG_ENDIAN",
            Kind::Endian(Endian::Little) => "LITTLE_ENDIAN",
            Kind::Directory(_) => "DIR",
            Kind::File(_) => "FILE",
            Kind::Group => "GROUP",
            Kind::Select(_) => "SELECT",
            Kind::Custom(_) => "CUSTOM",
            Kind::Text(encoding) => encoding.label(),
            Kind::Int(kind) => kind.label(),
            Kind::Float(kind) => kind.label(),
        }
    }

    /// Whether a node of this kind produces a field of the result.
    pub(crate) fn is_field(&self) -> bool {
        matches!(self, Kind::Int(_) | Kind::Float(_) | Kind::Custom(_))
    }
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Directory(path) => write!(f, "Directory({})", path),
            Kind::File(path) => write!(f, "File({})", path),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Payload {
    None,
    Text(Box<Node>),
    Sequence(Vec<Node>),
}

/// One unit of a layout, as built by the caller.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) kind: Kind,
    pub(crate) name: Option<String>,
    pub(crate) default: Option<Value>,
    pub(crate) payload: Payload,
    pub(crate) children: Vec<Node>,
}

impl Node {
    fn new(kind: Kind) -> Node {
        Node {
            kind,
            name: None,
            default: None,
            payload: Payload::None,
            children: vec![],
        }
    }

    fn container(kind: Kind, children: impl IntoIterator<Item = Node>) -> Node {
        Node {
            children: children.into_iter().collect(),
            ..Node::new(kind)
        }
    }

    /// Unnamed integer, for use as a sequence element.
    pub fn int(kind: IntKind) -> Node {
        Node::new(Kind::Int(kind))
    }

    /// Unnamed float, for use as a sequence element.
    pub fn float(kind: FloatKind) -> Node {
        Node::new(Kind::Float(kind))
    }

    /// Unnamed custom node, for use as a sequence element.
    pub fn custom(codec: CustomCodec) -> Node {
        Node::new(Kind::Custom(codec))
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn named(mut self, name: impl Into<String>) -> Node {
        self.name = Some(name.into());
        self
    }

    /// Literal used when the provider has nothing for this field.
    pub fn default_value(mut self, value: impl Into<Value>) -> Node {
        self.default = Some(value.into());
        self
    }

    /// Makes this integer the byte-length prefix of a string.
    pub fn string(mut self, text: Node) -> Node {
        self.payload = Payload::Text(Box::new(text));
        self
    }

    /// Makes this integer the count prefix of a sequence of `elements`.
    pub fn sequence(mut self, elements: impl IntoIterator<Item = Node>) -> Node {
        self.payload = Payload::Sequence(elements.into_iter().collect());
        self
    }

    /// Name of the field, or a label of the node kind for diagnostics.
    pub(crate) fn label(&self) -> String {
        match (&self.name, &self.kind) {
            (Some(name), _) => name.clone(),
            (None, Kind::Directory(path)) | (None, Kind::File(path)) => path.to_string(),
            (None, kind) => kind.label().to_string(),
        }
    }
}

pub fn big_endian(children: impl IntoIterator<Item = Node>) -> Node {
    Node::container(Kind::Endian(Endian::Big), children)
}

pub fn little_endian(children: impl IntoIterator<Item = Node>) -> Node {
    Node::container(Kind::Endian(Endian::Little), children)
}

/// Directory scope, resolved against the enclosing one.
pub fn dir(path: impl Into<RelativePathBuf>, children: impl IntoIterator<Item = Node>) -> Node {
    Node::container(Kind::Directory(path.into()), children)
}

/// One output (or input) stream. Files do not nest.
pub fn file(path: impl Into<RelativePathBuf>, children: impl IntoIterator<Item = Node>) -> Node {
    Node::container(Kind::File(path.into()), children)
}

pub fn group(children: impl IntoIterator<Item = Node>) -> Node {
    Node::container(Kind::Group, children)
}

pub fn select<F>(f: F) -> Node
where
    F: Fn(&FieldContext<'_>) -> Node + Send + Sync + 'static,
{
    Node::new(Kind::Select(Arc::new(f)))
}

pub fn custom(name: impl Into<String>, codec: CustomCodec) -> Node {
    Node::custom(codec).named(name)
}

pub fn latin1() -> Node {
    Node::new(Kind::Text(TextEncoding::Latin1))
}

pub fn utf16() -> Node {
    Node::new(Kind::Text(TextEncoding::Utf16))
}

pub fn utf8() -> Node {
    Node::new(Kind::Text(TextEncoding::Utf8))
}

macro_rules! scalar_constructors {
    ($($fn:ident => $ctor:ident($kind:expr),)*) => {
        $(
            pub fn $fn(name: impl Into<String>) -> Node {
                Node::$ctor($kind).named(name)
            }
        )*
    };
}

scalar_constructors! {
    i8 => int(IntKind::I8),
    u8 => int(IntKind::U8),
    i16 => int(IntKind::I16),
    u16 => int(IntKind::U16),
    i32 => int(IntKind::I32),
    u32 => int(IntKind::U32),
    i64 => int(IntKind::I64),
    u64 => int(IntKind::U64),
    f32 => float(FloatKind::F32),
    f64 => float(FloatKind::F64),
}
