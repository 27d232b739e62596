// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Arena-backed object graphs.
//!
//! The codec works on [`ObjectGraph`]: a vector of object/array nodes addressed
//! by [`NodeId`]. A [`Value::Node`] is an edge, so shared sub-objects are two
//! edges to the same id and cycles are ordinary back-edges. Identity is id
//! equality.

use core::fmt;
use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use crate::error::GraphError;

/// Index of a node inside an [`ObjectGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Raw arena index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Container kind of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// String-keyed object.
    Object,
    /// Ordered array.
    Array,
}

/// A container node.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// String-keyed fields, kept in key order.
    Object(BTreeMap<String, Value>),
    /// Ordered elements.
    Array(Vec<Value>),
}

impl Node {
    /// Kind of this node.
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::Object(_) => NodeKind::Object,
            Self::Array(_) => NodeKind::Array,
        }
    }

    /// An empty node of the given kind.
    pub fn empty(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Object => Self::Object(BTreeMap::new()),
            NodeKind::Array => Self::Array(Vec::new()),
        }
    }
}

/// A live asset handed back by an [`AssetLoader`](crate::AssetLoader).
///
/// Equality is identity of the payload allocation.
#[derive(Clone)]
pub struct AssetRef {
    uuid: Uuid,
    payload: Arc<dyn Any + Send + Sync>,
}

impl AssetRef {
    /// Wrap a loaded asset.
    pub fn new<T: Any + Send + Sync>(uuid: Uuid, payload: T) -> Self {
        Self {
            uuid,
            payload: Arc::new(payload),
        }
    }

    /// Wrap an already shared asset without cloning it.
    pub fn from_arc(uuid: Uuid, payload: Arc<dyn Any + Send + Sync>) -> Self {
        Self { uuid, payload }
    }

    /// Uuid the asset was loaded from.
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Borrow the payload as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl PartialEq for AssetRef {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid && Arc::ptr_eq(&self.payload, &other.payload)
    }
}

impl fmt::Debug for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetRef").field("uuid", &self.uuid).finish_non_exhaustive()
    }
}

/// A value stored in an object field or array slot.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer (all integer storage types decode to this).
    Int(i64),
    /// Float (both float storage types decode to this).
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Non-nil UUID.
    Uuid(Uuid),
    /// Opaque byte buffer.
    Bytes(Vec<u8>),
    /// Edge to another node of the same graph.
    Node(NodeId),
    /// Loaded asset.
    Asset(AssetRef),
}

impl Value {
    /// Short name of the variant, used in error messages.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Uuid(_) => "uuid",
            Self::Bytes(_) => "bytes",
            Self::Node(_) => "node",
            Self::Asset(_) => "asset",
        }
    }

    /// `true` for [`Value::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Node id for [`Value::Node`].
    pub const fn as_node(&self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(*id),
            _ => None,
        }
    }

    /// String slice for [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<NodeId> for Value {
    fn from(v: NodeId) -> Self {
        Self::Node(v)
    }
}

/// Key of a slot inside a node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlotKey {
    /// Object field.
    Field(String),
    /// Array index.
    Index(usize),
}

/// A writable position in the graph: a field of an object or an index of an array.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Slot {
    /// Owning node.
    pub node: NodeId,
    /// Field or index inside it.
    pub key: SlotKey,
}

/// Arena of object and array nodes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectGraph {
    nodes: Vec<Node>,
}

impl ObjectGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` when the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a node and return its id.
    pub fn insert(&mut self, node: Node) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(node);
        id
    }

    /// Add an object node built from `fields`.
    pub fn object<K, I>(&mut self, fields: I) -> NodeId
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let map = fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.insert(Node::Object(map))
    }

    /// Add an array node built from `items`.
    pub fn array<I: IntoIterator<Item = Value>>(&mut self, items: I) -> NodeId {
        self.insert(Node::Array(items.into_iter().collect()))
    }

    /// Borrow a node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.nodes
            .get_mut(id.index())
            .ok_or(GraphError::UnknownNode(id))
    }

    /// Read an object field. `None` for missing fields, non-objects and unknown ids.
    pub fn field(&self, id: NodeId, key: &str) -> Option<&Value> {
        match self.node(id)? {
            Node::Object(map) => map.get(key),
            Node::Array(_) => None,
        }
    }

    /// Read an array element. `None` when out of range, not an array or unknown id.
    pub fn element(&self, id: NodeId, index: usize) -> Option<&Value> {
        match self.node(id)? {
            Node::Array(items) => items.get(index),
            Node::Object(_) => None,
        }
    }

    /// Follow a chain of object fields starting at `id`, returning the node
    /// reached. Convenient for walking linked structures in tests and tools.
    pub fn follow(&self, id: NodeId, path: &[&str]) -> Option<NodeId> {
        path.iter()
            .try_fold(id, |at, key| self.field(at, key).and_then(Value::as_node))
    }

    /// Set an object field, replacing any previous value.
    pub fn set_field(
        &mut self,
        id: NodeId,
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), GraphError> {
        match self.node_mut(id)? {
            Node::Object(map) => {
                map.insert(key.into(), value);
                Ok(())
            }
            Node::Array(_) => Err(GraphError::WrongKind {
                node: id,
                expected: "object",
            }),
        }
    }

    /// Set an array element, padding with [`Value::Null`] when `index` is past the end.
    pub fn set_element(&mut self, id: NodeId, index: usize, value: Value) -> Result<(), GraphError> {
        match self.node_mut(id)? {
            Node::Array(items) => {
                if items.len() <= index {
                    items.resize(index + 1, Value::Null);
                }
                items[index] = value;
                Ok(())
            }
            Node::Object(_) => Err(GraphError::WrongKind {
                node: id,
                expected: "array",
            }),
        }
    }

    /// Append to an array node.
    pub fn push(&mut self, id: NodeId, value: Value) -> Result<(), GraphError> {
        match self.node_mut(id)? {
            Node::Array(items) => {
                items.push(value);
                Ok(())
            }
            Node::Object(_) => Err(GraphError::WrongKind {
                node: id,
                expected: "array",
            }),
        }
    }

    /// Write a value into a slot.
    pub fn set_slot(&mut self, slot: &Slot, value: Value) -> Result<(), GraphError> {
        match &slot.key {
            SlotKey::Field(name) => self.set_field(slot.node, name.clone(), value),
            SlotKey::Index(index) => self.set_element(slot.node, *index, value),
        }
    }

    /// Read the value stored in a slot.
    pub fn slot(&self, slot: &Slot) -> Option<&Value> {
        match &slot.key {
            SlotKey::Field(name) => self.field(slot.node, name),
            SlotKey::Index(index) => self.element(slot.node, *index),
        }
    }

    /// Deep comparison of the graph reachable from `a` with the graph reachable
    /// from `b` in `other`.
    ///
    /// Besides equal leaves this requires node identity to correspond
    /// one-to-one: if two edges share a node on one side, they must share a
    /// node on the other side. Cycles are handled.
    pub fn structurally_eq(&self, a: NodeId, other: &Self, b: NodeId) -> bool {
        let mut forward: HashMap<NodeId, NodeId> = HashMap::new();
        let mut backward: HashMap<NodeId, NodeId> = HashMap::new();
        let mut stack = vec![(a, b)];
        while let Some((x, y)) = stack.pop() {
            match (forward.get(&x), backward.get(&y)) {
                (Some(&mx), Some(&my)) if mx == y && my == x => continue,
                (None, None) => {
                    forward.insert(x, y);
                    backward.insert(y, x);
                }
                _ => return false,
            }
            let (Some(nx), Some(ny)) = (self.node(x), other.node(y)) else {
                return false;
            };
            let pairs: Vec<(&Value, &Value)> = match (nx, ny) {
                (Node::Object(mx), Node::Object(my)) => {
                    if mx.len() != my.len() || mx.keys().ne(my.keys()) {
                        return false;
                    }
                    mx.values().zip(my.values()).collect()
                }
                (Node::Array(ix), Node::Array(iy)) => {
                    if ix.len() != iy.len() {
                        return false;
                    }
                    ix.iter().zip(iy.iter()).collect()
                }
                _ => return false,
            };
            for (vx, vy) in pairs {
                match (vx, vy) {
                    (Value::Node(cx), Value::Node(cy)) => stack.push((*cx, *cy)),
                    (lx, ly) if lx == ly => {}
                    _ => return false,
                }
            }
        }
        true
    }

    /// Build a tree graph from JSON. Returns the graph and the value for the
    /// JSON root (a [`Value::Node`] unless the JSON root is a scalar).
    ///
    /// Integral numbers become [`Value::Int`], other numbers [`Value::Float`].
    pub fn from_json(json: &serde_json::Value) -> Result<(Self, Value), GraphError> {
        let mut graph = Self::new();
        let root = graph.insert_json(json)?;
        Ok((graph, root))
    }

    /// Insert a JSON value as a new subtree and return the value to link it with.
    pub fn insert_json(&mut self, json: &serde_json::Value) -> Result<Value, GraphError> {
        use serde_json::Value as Json;
        Ok(match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64().filter(|f| f.is_finite()) {
                    Value::Float(f)
                } else {
                    return Err(GraphError::UnsupportedNumber(n.to_string()));
                }
            }
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| self.insert_json(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::Node(self.array(values))
            }
            Json::Object(map) => {
                let mut fields = BTreeMap::new();
                for (key, item) in map {
                    fields.insert(key.clone(), self.insert_json(item)?);
                }
                Value::Node(self.insert(Node::Object(fields)))
            }
        })
    }

    /// Render the subtree reachable from `root` as JSON.
    ///
    /// Shared nodes are expanded at every use; a cycle is an error. UUIDs and
    /// assets render as their uuid string, byte buffers as number arrays.
    pub fn to_json(&self, root: NodeId) -> Result<serde_json::Value, GraphError> {
        let mut on_path = HashSet::new();
        self.node_to_json(root, &mut on_path)
    }

    fn node_to_json(
        &self,
        id: NodeId,
        on_path: &mut HashSet<NodeId>,
    ) -> Result<serde_json::Value, GraphError> {
        use serde_json::Value as Json;
        if !on_path.insert(id) {
            return Err(GraphError::Cycle(id));
        }
        let json = match self.node(id).ok_or(GraphError::UnknownNode(id))? {
            Node::Object(map) => {
                let mut out = serde_json::Map::new();
                for (key, value) in map {
                    out.insert(key.clone(), self.value_to_json(value, on_path)?);
                }
                Json::Object(out)
            }
            Node::Array(items) => Json::Array(
                items
                    .iter()
                    .map(|value| self.value_to_json(value, on_path))
                    .collect::<Result<_, _>>()?,
            ),
        };
        on_path.remove(&id);
        Ok(json)
    }

    fn value_to_json(
        &self,
        value: &Value,
        on_path: &mut HashSet<NodeId>,
    ) -> Result<serde_json::Value, GraphError> {
        use serde_json::Value as Json;
        Ok(match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .ok_or_else(|| GraphError::UnsupportedNumber(f.to_string()))?,
            Value::String(s) => Json::String(s.clone()),
            Value::Uuid(u) => Json::String(u.to_string()),
            Value::Asset(asset) => Json::String(asset.uuid().to_string()),
            Value::Bytes(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
            Value::Node(id) => self.node_to_json(*id, on_path)?,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn structurally_eq_tracks_sharing() {
        let mut shared = ObjectGraph::new();
        let leaf = shared.object([("x", Value::Int(1))]);
        let root = shared.object([("a", Value::Node(leaf)), ("b", Value::Node(leaf))]);

        let mut copied = ObjectGraph::new();
        let l1 = copied.object([("x", Value::Int(1))]);
        let l2 = copied.object([("x", Value::Int(1))]);
        let root2 = copied.object([("a", Value::Node(l1)), ("b", Value::Node(l2))]);

        assert!(shared.structurally_eq(root, &shared, root));
        assert!(!shared.structurally_eq(root, &copied, root2));
        assert!(!copied.structurally_eq(root2, &shared, root));
    }

    #[test]
    fn structurally_eq_handles_cycles() {
        let mut g = ObjectGraph::new();
        let foo = g.object([("name", Value::from("foo"))]);
        let bar = g.object([("name", Value::from("bar")), ("child", Value::Node(foo))]);
        g.set_field(foo, "child", Value::Node(bar)).unwrap();

        let mut h = ObjectGraph::new();
        let bar2 = h.object([("name", Value::from("bar"))]);
        let foo2 = h.object([("name", Value::from("foo")), ("child", Value::Node(bar2))]);
        h.set_field(bar2, "child", Value::Node(foo2)).unwrap();

        assert!(g.structurally_eq(foo, &h, foo2));
        assert!(!g.structurally_eq(foo, &h, bar2));
    }

    #[test]
    fn json_round_trip_for_trees() {
        let json = serde_json::json!({
            "name": "root",
            "scale": 1.5,
            "tags": ["a", "b"],
            "child": { "id": 7, "flag": true, "none": null }
        });
        let (graph, root) = ObjectGraph::from_json(&json).unwrap();
        let root = root.as_node().unwrap();
        assert_eq!(graph.to_json(root).unwrap(), json);
        assert_eq!(graph.field(root, "scale"), Some(&Value::Float(1.5)));
    }

    #[test]
    fn to_json_rejects_cycles() {
        let mut g = ObjectGraph::new();
        let a = g.object(Vec::<(String, Value)>::new());
        g.set_field(a, "me", Value::Node(a)).unwrap();
        assert_eq!(g.to_json(a), Err(GraphError::Cycle(a)));
    }

    #[test]
    fn set_element_pads_with_null() {
        let mut g = ObjectGraph::new();
        let arr = g.array([]);
        g.set_element(arr, 2, Value::Int(3)).unwrap();
        assert_eq!(
            g.node(arr),
            Some(&Node::Array(vec![Value::Null, Value::Null, Value::Int(3)]))
        );
        assert!(g.set_field(arr, "x", Value::Null).is_err());
    }
}
