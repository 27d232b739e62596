// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Graph → bytes.
//!
//! The encoder works in instances. An instance is one data node stored at a
//! reference position, written once and addressed by its reference id; the
//! root is instance 0. For every instance the encoder:
//!
//! 1. digests the node against its structure into a tree of [`Digest`]s,
//!    coercing leaves and turning reference positions into [`Digest::Reference`];
//! 2. flattens the tree depth-first into [`FlatEntry`]s, handing out reference
//!    ids on first encounter and queueing newly seen targets as instances.
//!
//! Once the queue is drained the flat entries of all instances are scanned
//! for the widths they need, the header is written and the entries follow.

use core::fmt;
use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, instrument, trace, warn, Level};
use uuid::Uuid;

use crate::asset::AssetLinkResolver;
use crate::codec::Writer;
use crate::error::CodecError;
use crate::header::{write_header, WidthStats, Widths};
use crate::options::ComposerOptions;
use crate::references::{collect_reoccurring_nodes, collect_reoccurring_structures};
use crate::schema::{NameIds, Schema, SchemaId, SchemaNode};
use crate::storage::{IntWidth, StorageType};
use crate::union::select_variant;
use crate::value::{Node, NodeId, ObjectGraph, Value};

/// Encode the graph rooted at `root`.
pub fn object_to_binary(
    graph: &ObjectGraph,
    root: NodeId,
    opts: &ComposerOptions<'_>,
) -> Result<Vec<u8>, CodecError> {
    encode(graph, root, opts, None)
}

/// Encode the graph rooted at `root`, passing every `ASSET_UUID` through `resolver` first.
pub fn object_to_binary_with_resolver(
    graph: &ObjectGraph,
    root: NodeId,
    opts: &ComposerOptions<'_>,
    resolver: &dyn AssetLinkResolver,
) -> Result<Vec<u8>, CodecError> {
    encode(graph, root, opts, Some(resolver))
}

#[instrument(skip_all, fields(root = %root))]
fn encode(
    graph: &ObjectGraph,
    root: NodeId,
    opts: &ComposerOptions<'_>,
    resolver: Option<&dyn AssetLinkResolver>,
) -> Result<Vec<u8>, CodecError> {
    graph.node(root).ok_or(CodecError::DanglingNode(root))?;
    let encoder = Encoder {
        schema: opts.schema,
        name_ids: opts.name_ids,
        graph,
        reoccurring: collect_reoccurring_structures(opts.schema, opts.name_ids),
        // Only feeds the inline-copy warning.
        shared_nodes: if tracing::enabled!(Level::WARN) {
            collect_reoccurring_nodes(graph, root, opts.name_ids)
        } else {
            HashSet::new()
        },
        resolver,
    };

    let mut refs = RefTable::default();
    let mut entries = Vec::new();
    let root_structure = opts.schema.root();
    if encoder.reoccurring.contains(&root_structure) {
        let id = refs.id_for(root, root_structure, String::from("root"))?;
        entries.push(FlatEntry::RefId(id));
    } else {
        refs.queue.push(Instance {
            node: root,
            structure: root_structure,
            path: String::from("root"),
        });
    }

    let mut next = 0;
    while let Some(instance) = refs.queue.get(next).cloned() {
        let path = Path::Root(&instance.path);
        let digest = encoder.digest_inline(
            &Value::Node(instance.node),
            instance.structure,
            &path,
            true,
        )?;
        flatten(digest, &mut refs, &mut entries)?;
        next += 1;
    }

    let stats = scan(&entries);
    let widths = if opts.options.use_header_byte {
        stats.negotiate()?
    } else {
        opts.options.widths
    };
    debug!(
        instances = refs.queue.len(),
        entries = entries.len(),
        ?widths,
        "flattened graph"
    );

    let mut writer = Writer::with_capacity(entries.len() * 4, opts.options.little_endian);
    if opts.options.use_header_byte {
        write_header(&mut writer, widths);
    }
    for entry in &entries {
        write_entry(&mut writer, entry, &widths)?;
    }
    debug!(bytes = writer.len(), "encoded");
    Ok(writer.into_vec())
}

/// One node of the per-instance planning tree.
#[derive(Debug, Clone, PartialEq)]
enum Digest {
    /// A coerced primitive.
    Leaf { value: Value, ty: StorageType },
    /// An inline object, tuple or variable array.
    Group {
        ty: StorageType,
        children: Vec<Digest>,
        variable_array_length: Option<usize>,
    },
    /// A node stored as its own instance.
    Reference {
        target: NodeId,
        structure: SchemaId,
        ty: StorageType,
    },
    /// A union value: variant index, then a reference.
    UnionReference {
        variant: usize,
        index_width: IntWidth,
        target: NodeId,
        structure: SchemaId,
    },
}

impl Digest {
    /// Storage type the digest sorts under inside an object.
    const fn storage_type(&self) -> StorageType {
        match self {
            Self::Leaf { ty, .. } | Self::Group { ty, .. } | Self::Reference { ty, .. } => *ty,
            Self::UnionReference { .. } => StorageType::UnionArray,
        }
    }
}

/// One write, in wire order.
#[derive(Debug, Clone, PartialEq)]
enum FlatEntry {
    Leaf { value: Value, ty: StorageType },
    ArrayLength(u64),
    RefId(u32),
    UnionIndex { index: u64, width: IntWidth },
}

#[derive(Debug, Clone)]
struct Instance {
    node: NodeId,
    structure: SchemaId,
    path: String,
}

/// Reference ids handed out so far, and the instances they stand for.
#[derive(Debug, Default)]
struct RefTable {
    ids: HashMap<(NodeId, SchemaId), u32>,
    queue: Vec<Instance>,
}

impl RefTable {
    fn id_for(
        &mut self,
        node: NodeId,
        structure: SchemaId,
        path: String,
    ) -> Result<u32, CodecError> {
        if let Some(id) = self.ids.get(&(node, structure)) {
            return Ok(*id);
        }
        let id = next_ref_id(self.queue.len())?;
        self.ids.insert((node, structure), id);
        self.queue.push(Instance {
            node,
            structure,
            path,
        });
        Ok(id)
    }
}

/// Id of the instance queued after `count` others.
fn next_ref_id(count: usize) -> Result<u32, CodecError> {
    u32::try_from(count).map_err(|_| CodecError::WidthOverflow {
        what: "reference id",
        value: count as u64,
        width: IntWidth::U32,
    })
}

/// Value path used in error messages and logs, built lazily.
#[derive(Clone, Copy)]
enum Path<'p> {
    Root(&'p str),
    Field(&'p Path<'p>, &'p str),
    Index(&'p Path<'p>, usize),
}

impl fmt::Display for Path<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root(label) => f.write_str(label),
            Self::Field(parent, name) => write!(f, "{parent}.{name}"),
            Self::Index(parent, index) => write!(f, "{parent}[{index}]"),
        }
    }
}

struct Encoder<'a> {
    schema: &'a Schema,
    name_ids: &'a NameIds,
    graph: &'a ObjectGraph,
    reoccurring: HashSet<SchemaId>,
    shared_nodes: HashSet<NodeId>,
    resolver: Option<&'a dyn AssetLinkResolver>,
}

impl Encoder<'_> {
    /// Digest a value sitting at a position described by `structure`.
    fn digest_position(
        &self,
        value: &Value,
        structure: SchemaId,
        path: &Path<'_>,
    ) -> Result<Digest, CodecError> {
        match self.schema.node(structure) {
            None => Err(CodecError::UnknownStructure(structure)),
            Some(SchemaNode::Union(variants)) => self.digest_union(value, variants, path),
            Some(node) if self.reoccurring.contains(&structure) => {
                let target = self.reference_target(value, container_name(node), path)?;
                Ok(Digest::Reference {
                    target,
                    structure,
                    ty: self.schema.storage_type(structure),
                })
            }
            Some(_) => self.digest_inline(value, structure, path, false),
        }
    }

    /// Digest a value in place. `top` marks the node of an instance itself.
    fn digest_inline(
        &self,
        value: &Value,
        structure: SchemaId,
        path: &Path<'_>,
        top: bool,
    ) -> Result<Digest, CodecError> {
        let node = self
            .schema
            .node(structure)
            .ok_or(CodecError::UnknownStructure(structure))?;
        match node {
            SchemaNode::Leaf(ty) => Ok(Digest::Leaf {
                value: self.coerce_leaf(*ty, value, path)?,
                ty: *ty,
            }),
            SchemaNode::Enum(values) => digest_enum(values, value, path),
            SchemaNode::Union(variants) => self.digest_union(value, variants, path),
            SchemaNode::VariableArray(elem) => {
                let items = self.array_items(value, path, top)?;
                let children = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.digest_position(item, *elem, &Path::Index(path, i)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Digest::Group {
                    ty: StorageType::Array,
                    variable_array_length: Some(children.len()),
                    children,
                })
            }
            SchemaNode::Tuple(positions) => {
                let items = self.array_items(value, path, top)?;
                let children = positions
                    .iter()
                    .enumerate()
                    .map(|(i, position)| {
                        let item = items.get(i).unwrap_or(&Value::Null);
                        self.digest_position(item, *position, &Path::Index(path, i))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Digest::Group {
                    ty: StorageType::Array,
                    variable_array_length: None,
                    children,
                })
            }
            SchemaNode::Object(fields) => {
                let data = self.object_fields(value, path, top)?;
                let mut keyed = Vec::with_capacity(fields.len());
                for (name, child) in fields {
                    let Some(id) = self.name_ids.id(name) else {
                        trace!(path = %path, field = %name, "skipping unregistered field");
                        continue;
                    };
                    let item = data.and_then(|m| m.get(name)).unwrap_or(&Value::Null);
                    let digest = self.digest_position(item, *child, &Path::Field(path, name))?;
                    keyed.push(((digest.storage_type(), id), digest));
                }
                keyed.sort_by_key(|(key, _)| *key);
                Ok(Digest::Group {
                    ty: StorageType::Object,
                    variable_array_length: None,
                    children: keyed.into_iter().map(|(_, digest)| digest).collect(),
                })
            }
        }
    }

    fn digest_union(
        &self,
        value: &Value,
        variants: &[SchemaId],
        path: &Path<'_>,
    ) -> Result<Digest, CodecError> {
        let target = self.reference_target(value, "object", path)?;
        let node = self
            .graph
            .node(target)
            .ok_or(CodecError::DanglingNode(target))?;
        let variant = select_variant(self.schema, self.name_ids, variants, node, path)?;
        Ok(Digest::UnionReference {
            variant,
            index_width: IntWidth::for_len(variants.len()),
            target,
            structure: variants[variant],
        })
    }

    fn reference_target(
        &self,
        value: &Value,
        expected: &str,
        path: &Path<'_>,
    ) -> Result<NodeId, CodecError> {
        match value {
            Value::Node(id) => {
                self.graph.node(*id).ok_or(CodecError::DanglingNode(*id))?;
                Ok(*id)
            }
            Value::Null => Err(CodecError::NullReference {
                path: path.to_string(),
            }),
            other => Err(mismatch(path, expected, other)),
        }
    }

    fn inline_node(
        &self,
        value: &Value,
        path: &Path<'_>,
        top: bool,
    ) -> Result<Option<&Node>, CodecError> {
        match value {
            Value::Null => Ok(None),
            Value::Node(id) => {
                if !top && self.shared_nodes.contains(id) {
                    warn!(node = %id, path = %path, "shared node at inline position is written as a copy");
                }
                self.graph
                    .node(*id)
                    .map(Some)
                    .ok_or(CodecError::DanglingNode(*id))
            }
            other => Err(mismatch(path, "container", other)),
        }
    }

    fn array_items(&self, value: &Value, path: &Path<'_>, top: bool) -> Result<&[Value], CodecError> {
        match self.inline_node(value, path, top)? {
            None => Ok(&[]),
            Some(Node::Array(items)) => Ok(items),
            Some(Node::Object(_)) => Err(CodecError::TypeMismatch {
                path: path.to_string(),
                expected: String::from("array"),
                found: "object",
            }),
        }
    }

    fn object_fields(
        &self,
        value: &Value,
        path: &Path<'_>,
        top: bool,
    ) -> Result<Option<&BTreeMap<String, Value>>, CodecError> {
        match self.inline_node(value, path, top)? {
            None => Ok(None),
            Some(Node::Object(fields)) => Ok(Some(fields)),
            Some(Node::Array(_)) => Err(CodecError::TypeMismatch {
                path: path.to_string(),
                expected: String::from("object"),
                found: "array",
            }),
        }
    }

    /// Bring a data value into the shape [`Writer::write_leaf`] expects for `ty`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::float_cmp
    )] // Integral and range-checked
    fn coerce_leaf(
        &self,
        ty: StorageType,
        value: &Value,
        path: &Path<'_>,
    ) -> Result<Value, CodecError> {
        let out = match (ty, value) {
            (StorageType::Null, _) => Value::Null,
            (ty, Value::Int(v)) if ty.is_integer() => {
                check_range(ty, *v, path)?;
                Value::Int(*v)
            }
            (ty, Value::Float(f)) if ty.is_integer() => {
                let truncated = f.trunc();
                if truncated != *f || !(i64::MIN as f64..=i64::MAX as f64).contains(f) {
                    return Err(CodecError::ValueOutOfRange {
                        path: path.to_string(),
                        value: f.to_string(),
                        storage_type: ty,
                    });
                }
                check_range(ty, truncated as i64, path)?;
                Value::Int(truncated as i64)
            }
            (ty, Value::Null) if ty.is_integer() => Value::Int(0),
            (StorageType::Float32 | StorageType::Float64, Value::Float(f)) => Value::Float(*f),
            (StorageType::Float32 | StorageType::Float64, Value::Int(v)) => Value::Float(*v as f64),
            (StorageType::Float32 | StorageType::Float64, Value::Null) => Value::Float(0.0),
            (StorageType::Bool, Value::Bool(b)) => Value::Bool(*b),
            (StorageType::Bool, Value::Null) => Value::Bool(false),
            (StorageType::String, Value::String(s)) => Value::String(s.clone()),
            (StorageType::String, Value::Null) => Value::String(String::new()),
            (StorageType::ArrayBuffer, Value::Bytes(b)) => Value::Bytes(b.clone()),
            (StorageType::ArrayBuffer, Value::Null) => Value::Bytes(Vec::new()),
            (StorageType::Uuid | StorageType::AssetUuid, value) => {
                let uuid = match value {
                    Value::Null => return Ok(Value::Null),
                    Value::Uuid(uuid) => *uuid,
                    Value::Asset(asset) => asset.uuid(),
                    Value::String(s) => Uuid::parse_str(s).map_err(|_| CodecError::TypeMismatch {
                        path: path.to_string(),
                        expected: String::from("uuid string"),
                        found: "string",
                    })?,
                    other => return Err(mismatch(path, ty.name(), other)),
                };
                match self.resolver {
                    Some(resolver) if ty == StorageType::AssetUuid && !uuid.is_nil() => {
                        Value::Uuid(resolver.resolve(uuid))
                    }
                    _ => Value::Uuid(uuid),
                }
            }
            (ty, other) => return Err(mismatch(path, ty.name(), other)),
        };
        Ok(out)
    }
}

fn digest_enum(values: &[String], value: &Value, path: &Path<'_>) -> Result<Digest, CodecError> {
    let width = IntWidth::for_len(values.len());
    let index = match value {
        Value::Null => 0,
        Value::String(s) => match values.iter().position(|candidate| candidate == s) {
            Some(position) => position + 1,
            None => {
                warn!(path = %path, value = %s, "enum value not in list, encoded as absent");
                0
            }
        },
        other => return Err(mismatch(path, "enum string", other)),
    };
    Ok(Digest::Leaf {
        value: Value::Int(i64::try_from(index).unwrap_or(i64::MAX)),
        ty: width.storage_type(),
    })
}

fn check_range(ty: StorageType, v: i64, path: &Path<'_>) -> Result<(), CodecError> {
    match ty.integer_range() {
        Some((lo, hi)) if (lo..=hi).contains(&v) => Ok(()),
        _ => Err(CodecError::ValueOutOfRange {
            path: path.to_string(),
            value: v.to_string(),
            storage_type: ty,
        }),
    }
}

fn mismatch(path: &Path<'_>, expected: &str, found: &Value) -> CodecError {
    CodecError::TypeMismatch {
        path: path.to_string(),
        expected: expected.to_owned(),
        found: found.kind_name(),
    }
}

const fn container_name(node: &SchemaNode) -> &'static str {
    match node {
        SchemaNode::VariableArray(_) | SchemaNode::Tuple(_) => "array",
        _ => "object",
    }
}

/// Depth-first flattening; reference ids are handed out here, in wire order.
fn flatten(
    digest: Digest,
    refs: &mut RefTable,
    out: &mut Vec<FlatEntry>,
) -> Result<(), CodecError> {
    match digest {
        Digest::Leaf { value, ty } => out.push(FlatEntry::Leaf { value, ty }),
        Digest::Group {
            children,
            variable_array_length,
            ..
        } => {
            if let Some(len) = variable_array_length {
                out.push(FlatEntry::ArrayLength(len as u64));
            }
            for child in children {
                flatten(child, refs, out)?;
            }
        }
        Digest::Reference {
            target, structure, ..
        } => {
            let id = refs.id_for(target, structure, format!("@{}", refs.queue.len()))?;
            out.push(FlatEntry::RefId(id));
        }
        Digest::UnionReference {
            variant,
            index_width,
            target,
            structure,
        } => {
            out.push(FlatEntry::UnionIndex {
                index: variant as u64,
                width: index_width,
            });
            let id = refs.id_for(target, structure, format!("@{}", refs.queue.len()))?;
            out.push(FlatEntry::RefId(id));
        }
    }
    Ok(())
}

fn scan(entries: &[FlatEntry]) -> WidthStats {
    let mut stats = WidthStats::default();
    for entry in entries {
        match entry {
            FlatEntry::RefId(id) => {
                stats.max_ref_id = stats.max_ref_id.max(Some(u64::from(*id)));
            }
            FlatEntry::ArrayLength(len) => {
                stats.max_array_length = stats.max_array_length.max(Some(*len));
            }
            FlatEntry::Leaf {
                value: Value::String(s),
                ..
            } => stats.max_string_length = stats.max_string_length.max(s.len() as u64),
            FlatEntry::Leaf {
                value: Value::Bytes(b),
                ..
            } => stats.max_array_buffer_length = stats.max_array_buffer_length.max(b.len() as u64),
            FlatEntry::Leaf { .. } | FlatEntry::UnionIndex { .. } => {}
        }
    }
    stats
}

fn write_entry(writer: &mut Writer, entry: &FlatEntry, widths: &Widths) -> Result<(), CodecError> {
    match entry {
        FlatEntry::Leaf { value, ty } => writer.write_leaf(*ty, value, widths),
        FlatEntry::ArrayLength(len) => writer.write_uint(widths.array_length, *len, "array length"),
        FlatEntry::RefId(id) => writer.write_uint(widths.ref_id, u64::from(*id), "reference id"),
        FlatEntry::UnionIndex { index, width } => writer.write_uint(*width, *index, "union index"),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::schema::SchemaBuilder;

    fn point_schema() -> (Schema, NameIds) {
        let mut b = SchemaBuilder::new();
        let x = b.leaf(StorageType::Float32);
        let id = b.leaf(StorageType::Uint16);
        let flag = b.leaf(StorageType::Bool);
        let root = b.object([("x", x), ("id", id), ("flag", flag)]);
        (
            b.build(root).unwrap(),
            NameIds::new([("x", 3), ("id", 2), ("flag", 1)]).unwrap(),
        )
    }

    #[test]
    fn reference_ids_stop_at_u32() {
        assert_eq!(next_ref_id(0).unwrap(), 0);
        assert_eq!(next_ref_id(u32::MAX as usize).unwrap(), u32::MAX);
        #[cfg(target_pointer_width = "64")]
        assert!(matches!(
            next_ref_id(u32::MAX as usize + 1),
            Err(CodecError::WidthOverflow {
                what: "reference id",
                value: 4_294_967_296,
                width: IntWidth::U32,
            })
        ));
    }

    #[test]
    fn fields_are_sorted_by_storage_type_then_name_id() {
        let (schema, names) = point_schema();
        let mut g = ObjectGraph::new();
        let root = g.object([
            ("x", Value::Float(1.0)),
            ("id", Value::Int(0x0102)),
            ("flag", Value::Bool(true)),
        ]);
        let bytes = object_to_binary(&g, root, &ComposerOptions::new(&schema, &names)).unwrap();
        // header, uint16 id, float32 x, bool flag
        assert_eq!(bytes, vec![0, 0x02, 0x01, 0, 0, 0x80, 0x3f, 1]);
    }

    #[test]
    fn missing_fields_encode_zero_values() {
        let (schema, names) = point_schema();
        let mut g = ObjectGraph::new();
        let root = g.object([("flag", Value::Bool(true))]);
        let bytes = object_to_binary(&g, root, &ComposerOptions::new(&schema, &names)).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn out_of_range_and_mismatched_leaves_are_rejected() {
        let (schema, names) = point_schema();
        let opts = ComposerOptions::new(&schema, &names);

        let mut g = ObjectGraph::new();
        let root = g.object([("id", Value::Int(70_000))]);
        assert!(matches!(
            object_to_binary(&g, root, &opts),
            Err(CodecError::ValueOutOfRange { path, .. }) if path == "root.id"
        ));

        let mut g = ObjectGraph::new();
        let root = g.object([("flag", Value::from("yes"))]);
        assert!(matches!(
            object_to_binary(&g, root, &opts),
            Err(CodecError::TypeMismatch { found: "string", .. })
        ));

        let mut g = ObjectGraph::new();
        let root = g.object([("id", Value::Float(1.5))]);
        assert!(object_to_binary(&g, root, &opts).is_err());
    }

    #[test]
    fn enum_miss_encodes_zero() {
        let mut b = SchemaBuilder::new();
        let mode = b.enumeration(["off", "on"]);
        let root = b.object([("mode", mode)]);
        let schema = b.build(root).unwrap();
        let names = NameIds::new([("mode", 1)]).unwrap();
        let opts = ComposerOptions::new(&schema, &names);

        let mut g = ObjectGraph::new();
        let on = g.object([("mode", Value::from("on"))]);
        let bogus = g.object([("mode", Value::from("sideways"))]);
        assert_eq!(object_to_binary(&g, on, &opts).unwrap(), vec![0, 2]);
        assert_eq!(object_to_binary(&g, bogus, &opts).unwrap(), vec![0, 0]);
    }

    #[test]
    fn null_reference_is_rejected() {
        let mut b = SchemaBuilder::new();
        let node = b.declare();
        b.define(node, SchemaNode::Object(vec![("next".into(), node)]))
            .unwrap();
        let schema = b.build(node).unwrap();
        let names = NameIds::new([("next", 1)]).unwrap();

        let mut g = ObjectGraph::new();
        let root = g.object([("next", Value::Null)]);
        assert!(matches!(
            object_to_binary(&g, root, &ComposerOptions::new(&schema, &names)),
            Err(CodecError::NullReference { path }) if path == "root.next"
        ));
    }

    #[test]
    fn resolver_rewrites_asset_uuids_only() {
        let mut b = SchemaBuilder::new();
        let asset = b.leaf(StorageType::AssetUuid);
        let plain = b.leaf(StorageType::Uuid);
        let root = b.object([("asset", asset), ("plain", plain)]);
        let schema = b.build(root).unwrap();
        let names = NameIds::new([("asset", 1), ("plain", 2)]).unwrap();

        let original = Uuid::from_u128(1);
        let real = Uuid::from_u128(2);
        let mut g = ObjectGraph::new();
        let root = g.object([("asset", Value::Uuid(original)), ("plain", Value::Uuid(original))]);
        let resolver = |uuid: Uuid| if uuid == original { real } else { uuid };
        let bytes = object_to_binary_with_resolver(
            &g,
            root,
            &ComposerOptions::new(&schema, &names),
            &resolver,
        )
        .unwrap();
        // sorted: uuid (13) before asset_uuid (14)
        assert_eq!(&bytes[1..17], original.as_bytes());
        assert_eq!(&bytes[17..33], real.as_bytes());
    }

    #[test]
    fn headerless_encoding_uses_configured_widths() {
        let mut b = SchemaBuilder::new();
        let byte = b.leaf(StorageType::Uint8);
        let list = b.array(byte);
        let root = b.object([("list", list)]);
        let schema = b.build(root).unwrap();
        let names = NameIds::new([("list", 1)]).unwrap();
        let opts = ComposerOptions::new(&schema, &names).use_header_byte(false);

        let mut g = ObjectGraph::new();
        let items = g.array([Value::Int(7)]);
        let root = g.object([("list", Value::Node(items))]);
        assert_eq!(object_to_binary(&g, root, &opts).unwrap(), vec![1, 7]);

        let long = g.array((0..300).map(|_| Value::Int(0)));
        let root = g.object([("list", Value::Node(long))]);
        assert!(matches!(
            object_to_binary(&g, root, &opts),
            Err(CodecError::WidthOverflow { what: "array length", value: 300, .. })
        ));
    }
}
