// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Structures (schemas) and the field-name id table.
//!
//! A [`Schema`] is an arena of [`SchemaNode`]s. Nodes reference each other by
//! [`SchemaId`], so a node used from several places is *the same* node (this
//! is what makes it a shared-reference position on the wire) and recursive
//! structures are plain back-references. Build one with [`SchemaBuilder`].

use core::fmt;
use std::collections::{BTreeMap, HashMap};

use crate::error::SchemaError;
use crate::storage::{IntWidth, StorageType};

/// Index of a node inside a [`Schema`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaId(pub(crate) u32);

impl SchemaId {
    /// Raw arena index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// One node of a structure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaNode {
    /// A primitive value.
    Leaf(StorageType),
    /// A string restricted to the listed values, stored as its 1-based index.
    Enum(Vec<String>),
    /// Zero or more elements of one structure.
    VariableArray(SchemaId),
    /// Fixed positions, one structure each.
    Tuple(Vec<SchemaId>),
    /// Named fields.
    Object(Vec<(String, SchemaId)>),
    /// An object whose structure is one of the listed object structures.
    Union(Vec<SchemaId>),
}

impl SchemaNode {
    fn children(&self) -> Vec<SchemaId> {
        match self {
            Self::Leaf(_) | Self::Enum(_) => Vec::new(),
            Self::VariableArray(elem) => vec![*elem],
            Self::Tuple(items) | Self::Union(items) => items.clone(),
            Self::Object(fields) => fields.iter().map(|(_, id)| *id).collect(),
        }
    }
}

/// A compiled, immutable structure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    nodes: Vec<SchemaNode>,
    root: SchemaId,
}

impl Schema {
    /// Root structure node.
    pub const fn root(&self) -> SchemaId {
        self.root
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` when the schema has no nodes (never the case for a built schema).
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Borrow a node.
    pub fn node(&self, id: SchemaId) -> Option<&SchemaNode> {
        self.nodes.get(id.index())
    }

    /// `true` for object, variable-array and tuple nodes.
    pub fn is_container(&self, id: SchemaId) -> bool {
        matches!(
            self.node(id),
            Some(SchemaNode::Object(_) | SchemaNode::VariableArray(_) | SchemaNode::Tuple(_))
        )
    }

    /// Storage type a node sorts under when it appears as an object field.
    pub fn storage_type(&self, id: SchemaId) -> StorageType {
        match self.node(id) {
            Some(SchemaNode::Leaf(ty)) => *ty,
            Some(SchemaNode::Enum(values)) => IntWidth::for_len(values.len()).storage_type(),
            Some(SchemaNode::VariableArray(_) | SchemaNode::Tuple(_)) => StorageType::Array,
            Some(SchemaNode::Union(_)) => StorageType::UnionArray,
            Some(SchemaNode::Object(_)) | None => StorageType::Object,
        }
    }

    /// BLAKE3 fingerprint of the structure together with its name ids.
    ///
    /// Nodes are renumbered in depth-first discovery order from the root, so
    /// two schemas built in a different order but with the same shape and the
    /// same sharing produce the same fingerprint.
    pub fn fingerprint(&self, name_ids: &NameIds) -> [u8; 32] {
        let mut order: HashMap<SchemaId, u32> = HashMap::new();
        let mut stack = vec![self.root];
        let mut visit = Vec::new();
        while let Some(id) = stack.pop() {
            if order.contains_key(&id) {
                continue;
            }
            let next = u32::try_from(order.len()).unwrap_or(u32::MAX);
            order.insert(id, next);
            visit.push(id);
            if let Some(node) = self.node(id) {
                stack.extend(node.children().into_iter().rev());
            }
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(b"echo-binpack/schema/v1");
        let num = |id: &SchemaId| order.get(id).copied().unwrap_or(u32::MAX).to_le_bytes();
        for id in &visit {
            match self.node(*id) {
                Some(SchemaNode::Leaf(ty)) => {
                    hasher.update(&[0, *ty as u8]);
                }
                Some(SchemaNode::Enum(values)) => {
                    hasher.update(&[1]);
                    for value in values {
                        hasher.update(&(value.len() as u64).to_le_bytes());
                        hasher.update(value.as_bytes());
                    }
                }
                Some(SchemaNode::VariableArray(elem)) => {
                    hasher.update(&[2]);
                    hasher.update(&num(elem));
                }
                Some(SchemaNode::Tuple(items)) => {
                    hasher.update(&[3]);
                    hasher.update(&(items.len() as u64).to_le_bytes());
                    items.iter().for_each(|item| {
                        hasher.update(&num(item));
                    });
                }
                Some(SchemaNode::Object(fields)) => {
                    hasher.update(&[4]);
                    hasher.update(&(fields.len() as u64).to_le_bytes());
                    for (name, child) in fields {
                        hasher.update(&(name.len() as u64).to_le_bytes());
                        hasher.update(name.as_bytes());
                        hasher.update(&num(child));
                    }
                }
                Some(SchemaNode::Union(variants)) => {
                    hasher.update(&[5]);
                    hasher.update(&(variants.len() as u64).to_le_bytes());
                    variants.iter().for_each(|variant| {
                        hasher.update(&num(variant));
                    });
                }
                None => {}
            }
        }
        for (name, id) in &name_ids.ids {
            hasher.update(&(name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
            hasher.update(&id.to_le_bytes());
        }
        *hasher.finalize().as_bytes()
    }
}

/// Incremental [`Schema`] builder.
///
/// Nodes that refer to themselves are created in two steps: [`declare`]
/// reserves an id, [`define`] fills it in once the children exist.
///
/// ```
/// use echo_binpack::{SchemaBuilder, SchemaNode, StorageType};
///
/// let mut b = SchemaBuilder::new();
/// let entity = b.declare();
/// let name = b.leaf(StorageType::String);
/// let children = b.array(entity);
/// b.define(entity, SchemaNode::Object(vec![
///     ("name".into(), name),
///     ("children".into(), children),
/// ])).unwrap();
/// let schema = b.build(entity).unwrap();
/// assert_eq!(schema.root(), entity);
/// ```
///
/// [`declare`]: SchemaBuilder::declare
/// [`define`]: SchemaBuilder::define
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    nodes: Vec<Option<SchemaNode>>,
}

impl SchemaBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> SchemaId {
        SchemaId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX))
    }

    /// Add a fully specified node.
    pub fn add(&mut self, node: SchemaNode) -> SchemaId {
        let id = self.next_id();
        self.nodes.push(Some(node));
        id
    }

    /// Reserve an id to be defined later.
    pub fn declare(&mut self) -> SchemaId {
        let id = self.next_id();
        self.nodes.push(None);
        id
    }

    /// Define a previously declared node.
    pub fn define(&mut self, id: SchemaId, node: SchemaNode) -> Result<(), SchemaError> {
        match self.nodes.get_mut(id.index()) {
            Some(slot @ None) => {
                *slot = Some(node);
                Ok(())
            }
            Some(Some(_)) => Err(SchemaError::AlreadyDefined(id)),
            None => Err(SchemaError::UnknownNode(id)),
        }
    }

    /// Leaf of the given storage type.
    pub fn leaf(&mut self, ty: StorageType) -> SchemaId {
        self.add(SchemaNode::Leaf(ty))
    }

    /// Enum over the given strings.
    pub fn enumeration<I, S>(&mut self, values: I) -> SchemaId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add(SchemaNode::Enum(values.into_iter().map(Into::into).collect()))
    }

    /// Variable-length array of `elem`.
    pub fn array(&mut self, elem: SchemaId) -> SchemaId {
        self.add(SchemaNode::VariableArray(elem))
    }

    /// Fixed tuple of the given positional structures.
    pub fn tuple<I: IntoIterator<Item = SchemaId>>(&mut self, items: I) -> SchemaId {
        self.add(SchemaNode::Tuple(items.into_iter().collect()))
    }

    /// Object with the given fields.
    pub fn object<I, S>(&mut self, fields: I) -> SchemaId
    where
        I: IntoIterator<Item = (S, SchemaId)>,
        S: Into<String>,
    {
        self.add(SchemaNode::Object(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Union over the given object structures.
    pub fn union<I: IntoIterator<Item = SchemaId>>(&mut self, variants: I) -> SchemaId {
        self.add(SchemaNode::Union(variants.into_iter().collect()))
    }

    /// Validate and freeze the schema.
    pub fn build(self, root: SchemaId) -> Result<Schema, SchemaError> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for (index, node) in self.nodes.into_iter().enumerate() {
            let id = SchemaId(u32::try_from(index).unwrap_or(u32::MAX));
            nodes.push(node.ok_or(SchemaError::Undefined(id))?);
        }
        let exists = |id: SchemaId| {
            if id.index() < nodes.len() {
                Ok(())
            } else {
                Err(SchemaError::UnknownNode(id))
            }
        };
        exists(root)?;
        for node in &nodes {
            match node {
                SchemaNode::Leaf(ty) if ty.is_structural() => {
                    return Err(SchemaError::StructuralLeaf(*ty));
                }
                SchemaNode::Enum(values) if values.is_empty() => {
                    return Err(SchemaError::Empty("enum"));
                }
                SchemaNode::Tuple(items) if items.is_empty() => {
                    return Err(SchemaError::Empty("tuple"));
                }
                SchemaNode::Union(variants) => {
                    if variants.is_empty() {
                        return Err(SchemaError::Empty("union"));
                    }
                    for variant in variants {
                        exists(*variant)?;
                        if !matches!(nodes[variant.index()], SchemaNode::Object(_)) {
                            return Err(SchemaError::UnionVariantNotObject(*variant));
                        }
                    }
                }
                _ => {}
            }
            node.children().into_iter().try_for_each(exists)?;
        }
        let schema = Schema { nodes, root };
        if !schema.is_container(root) {
            return Err(SchemaError::InvalidRoot(root));
        }
        Ok(schema)
    }
}

/// Field name → wire id table.
///
/// Only fields listed here are serialized. Ids must be unique so that decoded
/// locations can be mapped back to names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NameIds {
    ids: BTreeMap<String, u32>,
    names: BTreeMap<u32, String>,
}

impl NameIds {
    /// Build the table, rejecting duplicate ids.
    pub fn new<I, S>(entries: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let mut table = Self::default();
        for (name, id) in entries {
            let name = name.into();
            if let Some(first) = table.names.get(&id) {
                if *first != name {
                    return Err(SchemaError::DuplicateNameId {
                        id,
                        first: first.clone(),
                        second: name,
                    });
                }
            }
            if let Some(old) = table.ids.insert(name.clone(), id) {
                table.names.remove(&old);
            }
            table.names.insert(id, name);
        }
        Ok(table)
    }

    /// Wire id for a field name.
    pub fn id(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    /// Field name for a wire id.
    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// `true` when `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.ids.contains_key(name)
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate `(name, id)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.ids.iter().map(|(name, id)| (name.as_str(), *id))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn build_rejects_undefined_declarations() {
        let mut b = SchemaBuilder::new();
        let root = b.declare();
        let _dangling = b.declare();
        b.define(root, SchemaNode::Object(vec![])).unwrap();
        assert!(matches!(b.build(root), Err(SchemaError::Undefined(id)) if id.0 == 1));
    }

    #[test]
    fn build_validates_shapes() {
        let mut b = SchemaBuilder::new();
        let leaf = b.leaf(StorageType::Uint8);
        assert!(matches!(b.build(leaf), Err(SchemaError::InvalidRoot(_))));

        let mut b = SchemaBuilder::new();
        let leaf = b.leaf(StorageType::Uint8);
        let union = b.union([leaf]);
        let root = b.object([("u", union)]);
        assert!(matches!(
            b.build(root),
            Err(SchemaError::UnionVariantNotObject(_))
        ));

        let mut b = SchemaBuilder::new();
        let bad = b.leaf(StorageType::Object);
        let root = b.object([("x", bad)]);
        assert!(matches!(
            b.build(root),
            Err(SchemaError::StructuralLeaf(StorageType::Object))
        ));
    }

    #[test]
    fn enum_storage_type_follows_length() {
        let mut b = SchemaBuilder::new();
        let small = b.enumeration(["a", "b"]);
        let big = b.enumeration((0..300).map(|i| i.to_string()));
        let root = b.object([("small", small), ("big", big)]);
        let schema = b.build(root).unwrap();
        assert_eq!(schema.storage_type(small), StorageType::Uint8);
        assert_eq!(schema.storage_type(big), StorageType::Uint16);
    }

    #[test]
    fn name_ids_reject_duplicate_ids() {
        assert!(NameIds::new([("a", 1), ("b", 2)]).is_ok());
        assert!(matches!(
            NameIds::new([("a", 1), ("b", 1)]),
            Err(SchemaError::DuplicateNameId { id: 1, .. })
        ));
        let table = NameIds::new([("a", 1)]).unwrap();
        assert_eq!(table.name(1), Some("a"));
        assert_eq!(table.id("a"), Some(1));
    }

    #[test]
    fn fingerprint_ignores_build_order_but_not_sharing() {
        let names = NameIds::new([("x", 1), ("y", 2)]).unwrap();

        let mut a = SchemaBuilder::new();
        let num = a.leaf(StorageType::Float32);
        let root_a = a.object([("x", num), ("y", num)]);
        let a = a.build(root_a).unwrap();

        let mut b = SchemaBuilder::new();
        let root_b = b.declare();
        let num_b = b.leaf(StorageType::Float32);
        b.define(
            root_b,
            SchemaNode::Object(vec![("x".into(), num_b), ("y".into(), num_b)]),
        )
        .unwrap();
        let b = b.build(root_b).unwrap();
        assert_eq!(a.fingerprint(&names), b.fingerprint(&names));

        let mut c = SchemaBuilder::new();
        let x = c.leaf(StorageType::Float32);
        let y = c.leaf(StorageType::Float32);
        let root_c = c.object([("x", x), ("y", y)]);
        let c = c.build(root_c).unwrap();
        assert_ne!(a.fingerprint(&names), c.fingerprint(&names));

        let other_names = NameIds::new([("x", 1), ("y", 3)]).unwrap();
        assert_ne!(a.fingerprint(&names), a.fingerprint(&other_names));
    }
}
