use serde_json::{Map, Value};

use super::{Kind, Node, Payload};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Where an entry sits relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    Root,
    Child,
    /// Directly in the element list of a sequence.
    Element,
    /// The string descriptor of an integer.
    Payload,
}

#[derive(Debug)]
pub(crate) enum Slot {
    Empty,
    Text(NodeId),
    Sequence(Vec<NodeId>),
}

#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) kind: Kind,
    pub(crate) name: Option<String>,
    pub(crate) default: Option<Value>,
    pub(crate) payload: Slot,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) placement: Placement,
}

impl Entry {
    pub(crate) fn label(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.kind.label())
    }
}

/// A validated layout, stored as an arena of entries.
///
/// Parent links are indices, so validation can look upward while the walk
/// only ever goes down.
#[derive(Debug)]
pub struct Schema {
    entries: Vec<Entry>,
    root: NodeId,
    files: usize,
}

impl Schema {
    /// Attaches `node` as the root of a new schema, checking its structure.
    pub fn new(node: Node) -> Result<Schema> {
        Schema::build(node, Placement::Root, false, "")
    }

    /// Attaches the result of a `select` in place of the select entry `at`.
    ///
    /// The new tree takes over the placement of the select node, and counts as
    /// nested in a file when the select node is.
    pub(crate) fn attach(node: Node, parent: &Schema, at: NodeId) -> Result<Schema> {
        let entry = parent.entry(at);
        let in_file = parent
            .ancestors(at)
            .any(|id| matches!(parent.entry(id).kind, Kind::File(_)));
        Schema::build(node, entry.placement, in_file, entry.label())
    }

    fn build(node: Node, placement: Placement, in_file: bool, trail: &str) -> Result<Schema> {
        let mut schema = Schema {
            entries: vec![],
            root: NodeId(0),
            files: 0,
        };
        schema.root = schema.push(node, None, placement, in_file, trail)?;
        Ok(schema)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of `file` nodes declared in the tree. Files produced by a
    /// `select` at walk time are not counted.
    pub fn file_count(&self) -> usize {
        self.files
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entry(&self, id: NodeId) -> &Entry {
        &self.entries[id.0]
    }

    pub(crate) fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.entry(id).parent, move |&id| self.entry(id).parent)
    }

    /// Whether no element of a sequence is an unnamed field. Structural
    /// elements (groups, selects) contribute whatever their children name.
    pub(crate) fn is_keyed(&self, elements: &[NodeId]) -> bool {
        elements.iter().all(|&id| {
            let entry = self.entry(id);
            entry.name.is_some() || !entry.kind.is_field()
        })
    }

    /// Shapes one sequence item: a record when its elements are keyed and
    /// named something, the bare value of a lone element, a positional list
    /// otherwise.
    pub(crate) fn item_value(
        &self,
        elements: &[NodeId],
        record: Map<String, Value>,
        results: Vec<Value>,
    ) -> Value {
        if self.is_keyed(elements) && !record.is_empty() {
            Value::Object(record)
        } else if elements.len() == 1 {
            results.into_iter().next().unwrap_or(Value::Null)
        } else {
            Value::Array(results)
        }
    }

    fn push(
        &mut self,
        node: Node,
        parent: Option<NodeId>,
        placement: Placement,
        in_file: bool,
        trail: &str,
    ) -> Result<NodeId> {
        let path = if trail.is_empty() {
            node.label()
        } else {
            format!("{}/{}", trail, node.label())
        };
        let Node {
            kind,
            name,
            default,
            payload,
            children,
        } = node;

        if kind.is_field() && name.is_none() && placement != Placement::Element {
            return Err(Error::MissingName {
                kind: kind.label(),
                path,
            });
        }
        if matches!(kind, Kind::Text(_)) && placement != Placement::Payload {
            return Err(Error::MisplacedString {
                kind: kind.label(),
                path,
            });
        }
        let is_file = matches!(kind, Kind::File(_));
        if is_file {
            if in_file {
                return Err(Error::NestedFile { path });
            }
            self.files += 1;
        }

        let id = NodeId(self.entries.len());
        let owner = kind.label();
        let owner_int = match kind {
            Kind::Int(int) => Some(int),
            _ => None,
        };
        self.entries.push(Entry {
            kind,
            name,
            default,
            payload: Slot::Empty,
            children: vec![],
            parent,
            placement,
        });

        let slot = match payload {
            Payload::None => Slot::Empty,
            Payload::Text(text) => {
                let int = owner_int.ok_or_else(|| Error::InvalidPayload {
                    kind: owner,
                    payload: "string",
                    path: path.clone(),
                })?;
                if !matches!(text.kind, Kind::Text(_)) {
                    return Err(Error::InvalidPayload {
                        kind: owner,
                        payload: text.kind.label(),
                        path,
                    });
                }
                if !int.is_unsigned() {
                    return Err(Error::MisplacedString {
                        kind: text.kind.label(),
                        path,
                    });
                }
                Slot::Text(self.push(*text, Some(id), Placement::Payload, in_file, &path)?)
            }
            Payload::Sequence(elements) => {
                if owner_int.is_none() {
                    return Err(Error::InvalidPayload {
                        kind: owner,
                        payload: "sequence",
                        path,
                    });
                }
                if elements.is_empty() {
                    return Err(Error::EmptySequence { path });
                }
                let ids = elements
                    .into_iter()
                    .map(|element| self.push(element, Some(id), Placement::Element, in_file, &path))
                    .collect::<Result<Vec<_>>>()?;
                Slot::Sequence(ids)
            }
        };

        let children = children
            .into_iter()
            .map(|child| self.push(child, Some(id), Placement::Child, in_file || is_file, &path))
            .collect::<Result<Vec<_>>>()?;

        let entry = &mut self.entries[id.0];
        entry.payload = slot;
        entry.children = children;
        Ok(id)
    }
}
