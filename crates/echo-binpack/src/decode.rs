// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Bytes → graph.
//!
//! Decoding never looks at data to plan. Each structure used as an instance
//! is digested once into [`StructureDigest`]s: the reads to perform, in
//! encoder order, and where each result goes relative to the instance node.
//!
//! Phase one walks the buffer instance by instance. Reference ids found along
//! the way append new instances to the worklist, so instances are read in id
//! order. Nothing is built yet; every read becomes a [`PendingOp`].
//!
//! Phase two allocates one node per instance, then replays the ops: inline
//! containers are created, leaves go through the transform hook and links
//! are pointed at the instance nodes. Because every instance node exists
//! before the first link is written, the order in which the wire mentions
//! parents and children does not matter.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument};

use crate::codec::Reader;
use crate::error::CodecError;
use crate::header::{read_header, Widths};
use crate::hook::{self, KeepValues, LeafContext, TransformValueHook};
use crate::options::ComposerOptions;
use crate::references::collect_reoccurring_structures;
use crate::schema::{NameIds, Schema, SchemaId, SchemaNode};
use crate::storage::{IntWidth, StorageType};
use crate::value::{Node, NodeId, NodeKind, ObjectGraph, Slot, SlotKey, Value};

/// One step of a location, relative to an instance node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LocationStep {
    /// Object field, by name id.
    Field(u32),
    /// Array index.
    Index(usize),
    /// The index of the variable array element currently being read.
    VariableIndex,
}

/// What a [`StructureDigest`] reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DigestKind {
    /// A primitive of the digest's storage type.
    Leaf,
    /// A 1-based enum index into the strings of this structure.
    Enum(SchemaId),
    /// Nothing; an inline container is created at the location.
    Container(NodeKind),
    /// A length, then the element digests once per element.
    VariableArray(Vec<StructureDigest>),
    /// A reference id to an instance of this structure.
    Reference(SchemaId),
    /// A variant index of this union, then a reference id.
    Union(SchemaId),
}

/// A read planned from the structure alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructureDigest {
    /// Storage type of the position.
    pub ty: StorageType,
    /// Where the result goes. Relative to the instance node, or to the
    /// enclosing array for variable array elements.
    pub location: Vec<LocationStep>,
    /// What to read.
    pub kind: DigestKind,
}

/// Reads planned for one instance of `structure`, in wire order.
pub fn plan_instance(
    schema: &Schema,
    name_ids: &NameIds,
    structure: SchemaId,
) -> Result<Vec<StructureDigest>, CodecError> {
    DigestCache::new(schema, name_ids)
        .get(structure)
        .map(<[StructureDigest]>::to_vec)
}

/// Decode a buffer produced by [`object_to_binary`](crate::object_to_binary).
pub fn binary_to_object(
    bytes: &[u8],
    opts: &ComposerOptions<'_>,
) -> Result<(ObjectGraph, NodeId), CodecError> {
    binary_to_object_with_hook(bytes, opts, &mut KeepValues)
}

/// Decode, passing every leaf through `hook` before it is stored.
#[instrument(skip_all, fields(len = bytes.len()))]
pub fn binary_to_object_with_hook(
    bytes: &[u8],
    opts: &ComposerOptions<'_>,
    hook: &mut dyn TransformValueHook,
) -> Result<(ObjectGraph, NodeId), CodecError> {
    let schema = opts.schema;
    let mut reader = Reader::new(bytes, opts.options.little_endian);
    let widths = if opts.options.use_header_byte {
        read_header(&mut reader)?
    } else {
        opts.options.widths
    };
    debug!(?widths, "decoding");

    let mut digests = DigestCache::new(schema, opts.name_ids);
    let mut decoder = Decoder {
        schema,
        reader,
        widths,
        instances: Vec::new(),
        element_budget: u64::from(opts.options.max_array_elements),
        element_limit: opts.options.max_array_elements,
    };
    let root = schema.root();
    if digests.builder.reoccurring.contains(&root) {
        let id = decoder.reader.read_uint(widths.ref_id)?;
        decoder.register(id, root)?;
    } else {
        decoder.instances.push(Instance::new(root));
    }

    let mut next = 0;
    while let Some(structure) = decoder.instances.get(next).map(|i| i.structure) {
        let plan = digests.get(structure)?;
        let mut ops = Vec::new();
        for digest in plan {
            decoder.read(digest, &[], None, &mut ops)?;
        }
        decoder.instances[next].ops = ops;
        next += 1;
    }
    let remaining = decoder.reader.remaining();
    if remaining > 0 {
        return Err(CodecError::TrailingBytes(remaining));
    }
    debug!(instances = decoder.instances.len(), "read all instances");

    reconstruct(schema, opts.name_ids, &decoder.instances, hook)
}

/// Per-call cache of instance digests, keyed by structure node.
struct DigestCache<'a> {
    builder: DigestBuilder<'a>,
    cache: HashMap<SchemaId, Vec<StructureDigest>>,
}

impl<'a> DigestCache<'a> {
    fn new(schema: &'a Schema, name_ids: &'a NameIds) -> Self {
        Self {
            builder: DigestBuilder {
                schema,
                name_ids,
                reoccurring: collect_reoccurring_structures(schema, name_ids),
            },
            cache: HashMap::new(),
        }
    }

    fn get(&mut self, structure: SchemaId) -> Result<&[StructureDigest], CodecError> {
        match self.cache.entry(structure) {
            Entry::Occupied(entry) => Ok(entry.into_mut().as_slice()),
            Entry::Vacant(entry) => {
                let mut plan = Vec::new();
                self.builder.build(structure, Vec::new(), true, &mut plan)?;
                Ok(entry.insert(plan).as_slice())
            }
        }
    }
}

struct DigestBuilder<'a> {
    schema: &'a Schema,
    name_ids: &'a NameIds,
    reoccurring: HashSet<SchemaId>,
}

impl DigestBuilder<'_> {
    fn build(
        &self,
        structure: SchemaId,
        location: Vec<LocationStep>,
        top: bool,
        out: &mut Vec<StructureDigest>,
    ) -> Result<(), CodecError> {
        let node = self
            .schema
            .node(structure)
            .ok_or(CodecError::UnknownStructure(structure))?;
        let ty = self.schema.storage_type(structure);
        let kind = match node {
            SchemaNode::Union(_) => DigestKind::Union(structure),
            _ if !top && self.reoccurring.contains(&structure) => {
                DigestKind::Reference(structure)
            }
            SchemaNode::Leaf(_) => DigestKind::Leaf,
            SchemaNode::Enum(_) => DigestKind::Enum(structure),
            SchemaNode::VariableArray(elem) => {
                let mut children = Vec::new();
                self.build(*elem, vec![LocationStep::VariableIndex], false, &mut children)?;
                DigestKind::VariableArray(children)
            }
            SchemaNode::Tuple(items) => {
                if !top {
                    out.push(StructureDigest {
                        ty,
                        location: location.clone(),
                        kind: DigestKind::Container(NodeKind::Array),
                    });
                }
                for (i, item) in items.iter().enumerate() {
                    self.build(*item, extend(&location, LocationStep::Index(i)), false, out)?;
                }
                return Ok(());
            }
            SchemaNode::Object(fields) => {
                if !top {
                    out.push(StructureDigest {
                        ty,
                        location: location.clone(),
                        kind: DigestKind::Container(NodeKind::Object),
                    });
                }
                let mut keyed: Vec<((StorageType, u32), SchemaId)> = fields
                    .iter()
                    .filter_map(|(name, child)| {
                        let id = self.name_ids.id(name)?;
                        Some(((self.schema.storage_type(*child), id), *child))
                    })
                    .collect();
                keyed.sort_by_key(|(key, _)| *key);
                for ((_, id), child) in keyed {
                    self.build(child, extend(&location, LocationStep::Field(id)), false, out)?;
                }
                return Ok(());
            }
        };
        out.push(StructureDigest { ty, location, kind });
        Ok(())
    }
}

fn extend(location: &[LocationStep], step: LocationStep) -> Vec<LocationStep> {
    let mut out = Vec::with_capacity(location.len() + 1);
    out.extend_from_slice(location);
    out.push(step);
    out
}

/// A read result waiting for phase two. Locations are relative to the instance node.
#[derive(Debug, Clone, PartialEq)]
enum PendingOp {
    Container {
        location: Vec<LocationStep>,
        kind: NodeKind,
    },
    Leaf {
        location: Vec<LocationStep>,
        ty: StorageType,
        value: Value,
    },
    Absent {
        location: Vec<LocationStep>,
    },
    Link {
        location: Vec<LocationStep>,
        ref_id: usize,
    },
}

#[derive(Debug)]
struct Instance {
    structure: SchemaId,
    ops: Vec<PendingOp>,
}

impl Instance {
    const fn new(structure: SchemaId) -> Self {
        Self {
            structure,
            ops: Vec::new(),
        }
    }
}

struct Decoder<'a, 'b> {
    schema: &'a Schema,
    reader: Reader<'b>,
    widths: Widths,
    instances: Vec<Instance>,
    /// Array elements still allowed in this payload.
    element_budget: u64,
    element_limit: u32,
}

impl Decoder<'_, '_> {
    /// Accept a reference id: either one already seen or the next new one.
    fn register(&mut self, id: u64, structure: SchemaId) -> Result<usize, CodecError> {
        let expected = self.instances.len();
        let index = usize::try_from(id).unwrap_or(usize::MAX);
        if index == expected {
            self.instances.push(Instance::new(structure));
        } else if index > expected {
            return Err(CodecError::UnexpectedReferenceId {
                expected: u32::try_from(expected).unwrap_or(u32::MAX),
                found: u32::try_from(id).unwrap_or(u32::MAX),
            });
        }
        Ok(index)
    }

    fn read(
        &mut self,
        digest: &StructureDigest,
        base: &[LocationStep],
        index: Option<usize>,
        ops: &mut Vec<PendingOp>,
    ) -> Result<(), CodecError> {
        let location = locate(base, &digest.location, index);
        match &digest.kind {
            DigestKind::Leaf => {
                let value = self.reader.read_leaf(digest.ty, &self.widths)?;
                ops.push(PendingOp::Leaf {
                    location,
                    ty: digest.ty,
                    value,
                });
            }
            DigestKind::Enum(structure) => {
                let Some(SchemaNode::Enum(values)) = self.schema.node(*structure) else {
                    return Err(CodecError::UnknownStructure(*structure));
                };
                let raw = self.reader.read_uint(IntWidth::for_len(values.len()))?;
                let position = usize::try_from(raw).unwrap_or(usize::MAX);
                if position == 0 {
                    ops.push(PendingOp::Absent { location });
                } else {
                    let value = values.get(position - 1).ok_or(CodecError::InvalidEnumIndex {
                        index: raw,
                        len: values.len(),
                    })?;
                    ops.push(PendingOp::Leaf {
                        location,
                        ty: digest.ty,
                        value: Value::String(value.clone()),
                    });
                }
            }
            DigestKind::Container(kind) => ops.push(PendingOp::Container {
                location,
                kind: *kind,
            }),
            DigestKind::VariableArray(children) => {
                let raw = self.reader.read_uint(self.widths.array_length)?;
                if raw > self.element_budget {
                    return Err(CodecError::ArrayLimitExceeded {
                        offset: self.reader.offset(),
                        len: raw,
                        limit: self.element_limit,
                    });
                }
                self.element_budget -= raw;
                let len = usize::try_from(raw).unwrap_or(usize::MAX);
                let needed = children
                    .iter()
                    .map(|child| self.min_len(child))
                    .sum::<usize>()
                    .saturating_mul(len);
                if needed > self.reader.remaining() {
                    return Err(CodecError::UnexpectedEof {
                        offset: self.reader.offset(),
                        needed,
                    });
                }
                if !location.is_empty() {
                    ops.push(PendingOp::Container {
                        location: location.clone(),
                        kind: NodeKind::Array,
                    });
                }
                for i in 0..len {
                    for child in children {
                        self.read(child, &location, Some(i), ops)?;
                    }
                }
            }
            DigestKind::Reference(structure) => {
                let id = self.reader.read_uint(self.widths.ref_id)?;
                let ref_id = self.register(id, *structure)?;
                ops.push(PendingOp::Link { location, ref_id });
            }
            DigestKind::Union(structure) => {
                let Some(SchemaNode::Union(variants)) = self.schema.node(*structure) else {
                    return Err(CodecError::UnknownStructure(*structure));
                };
                let raw = self
                    .reader
                    .read_uint(IntWidth::for_len(variants.len()))?;
                let variant = usize::try_from(raw)
                    .ok()
                    .and_then(|i| variants.get(i))
                    .copied()
                    .ok_or(CodecError::InvalidUnionIndex {
                        index: raw,
                        len: variants.len(),
                    })?;
                let id = self.reader.read_uint(self.widths.ref_id)?;
                let ref_id = self.register(id, variant)?;
                ops.push(PendingOp::Link { location, ref_id });
            }
        }
        Ok(())
    }

    /// Fewest bytes a digest can occupy with the current widths.
    fn min_len(&self, digest: &StructureDigest) -> usize {
        match &digest.kind {
            DigestKind::Leaf | DigestKind::Enum(_) => match digest.ty {
                StorageType::String => self.widths.string_length.byte_len(),
                StorageType::ArrayBuffer => self.widths.array_buffer_length.byte_len(),
                ty => ty.fixed_len().unwrap_or(0),
            },
            DigestKind::Container(_) => 0,
            DigestKind::VariableArray(_) => self.widths.array_length.byte_len(),
            DigestKind::Reference(_) => self.widths.ref_id.byte_len(),
            DigestKind::Union(structure) => {
                let variants = match self.schema.node(*structure) {
                    Some(SchemaNode::Union(variants)) => variants.len(),
                    _ => 0,
                };
                IntWidth::for_len(variants).byte_len() + self.widths.ref_id.byte_len()
            }
        }
    }
}

fn locate(base: &[LocationStep], relative: &[LocationStep], index: Option<usize>) -> Vec<LocationStep> {
    let mut out = Vec::with_capacity(base.len() + relative.len());
    out.extend_from_slice(base);
    out.extend(relative.iter().map(|step| match (step, index) {
        (LocationStep::VariableIndex, Some(i)) => LocationStep::Index(i),
        (step, _) => *step,
    }));
    out
}

fn instance_kind(schema: &Schema, structure: SchemaId) -> NodeKind {
    match schema.node(structure) {
        Some(SchemaNode::VariableArray(_) | SchemaNode::Tuple(_)) => NodeKind::Array,
        _ => NodeKind::Object,
    }
}

/// Phase two: build the graph from the pending ops of every instance.
fn reconstruct(
    schema: &Schema,
    name_ids: &NameIds,
    instances: &[Instance],
    hook: &mut dyn TransformValueHook,
) -> Result<(ObjectGraph, NodeId), CodecError> {
    let mut graph = ObjectGraph::new();
    let nodes: Vec<NodeId> = instances
        .iter()
        .map(|instance| graph.insert(Node::empty(instance_kind(schema, instance.structure))))
        .collect();

    for (instance, &node) in instances.iter().zip(&nodes) {
        for op in &instance.ops {
            match op {
                PendingOp::Container { location, kind } => {
                    if location.is_empty() {
                        continue;
                    }
                    let slot = slot_for(&graph, name_ids, node, location)?;
                    let child = graph.insert(Node::empty(*kind));
                    graph.set_slot(&slot, Value::Node(child))?;
                }
                PendingOp::Leaf {
                    location,
                    ty,
                    value,
                } => {
                    let slot = slot_for(&graph, name_ids, node, location)?;
                    let stored = hook::apply(
                        hook,
                        &LeafContext {
                            value,
                            storage_type: *ty,
                            slot: &slot,
                        },
                    );
                    graph.set_slot(&slot, stored)?;
                }
                PendingOp::Absent { location } => {
                    let slot = slot_for(&graph, name_ids, node, location)?;
                    if matches!(slot.key, SlotKey::Index(_)) {
                        graph.set_slot(&slot, Value::Null)?;
                    }
                }
                PendingOp::Link { location, ref_id } => {
                    let target = nodes.get(*ref_id).copied().ok_or(CodecError::InvalidLocation {
                        node,
                        reason: "link to an instance that was never read",
                    })?;
                    let slot = slot_for(&graph, name_ids, node, location)?;
                    graph.set_slot(&slot, Value::Node(target))?;
                }
            }
        }
    }

    let root = nodes.first().copied().ok_or(CodecError::UnexpectedEof {
        offset: 0,
        needed: 1,
    })?;
    debug!(nodes = graph.len(), "reconstructed graph");
    Ok((graph, root))
}

/// Walk `location` from `node` to the slot it names.
fn slot_for(
    graph: &ObjectGraph,
    name_ids: &NameIds,
    node: NodeId,
    location: &[LocationStep],
) -> Result<Slot, CodecError> {
    let Some((last, parents)) = location.split_last() else {
        return Err(CodecError::InvalidLocation {
            node,
            reason: "empty location",
        });
    };
    let mut at = node;
    for step in parents {
        let slot = Slot {
            node: at,
            key: slot_key(name_ids, *step, at)?,
        };
        at = graph
            .slot(&slot)
            .and_then(Value::as_node)
            .ok_or(CodecError::InvalidLocation {
                node: at,
                reason: "location passes through a value that is not a container",
            })?;
    }
    Ok(Slot {
        node: at,
        key: slot_key(name_ids, *last, at)?,
    })
}

fn slot_key(name_ids: &NameIds, step: LocationStep, node: NodeId) -> Result<SlotKey, CodecError> {
    match step {
        LocationStep::Field(id) => name_ids
            .name(id)
            .map(|name| SlotKey::Field(name.to_owned()))
            .ok_or(CodecError::UnknownNameId(id)),
        LocationStep::Index(i) => Ok(SlotKey::Index(i)),
        LocationStep::VariableIndex => Err(CodecError::InvalidLocation {
            node,
            reason: "unresolved variable index",
        }),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::hook::HookOutcome;
    use crate::schema::SchemaBuilder;

    fn entity_schema() -> (Schema, NameIds, SchemaId) {
        let mut b = SchemaBuilder::new();
        let entity = b.declare();
        let name = b.leaf(StorageType::String);
        let children = b.array(entity);
        b.define(
            entity,
            SchemaNode::Object(vec![("name".into(), name), ("children".into(), children)]),
        )
        .unwrap();
        (
            b.build(entity).unwrap(),
            NameIds::new([("name", 1), ("children", 2)]).unwrap(),
            entity,
        )
    }

    #[test]
    fn digests_follow_wire_order_and_mark_references() {
        let (schema, names, entity) = entity_schema();
        let mut cache = DigestCache::new(&schema, &names);
        let plan = cache.get(entity).unwrap().to_vec();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].ty, StorageType::Array);
        assert_eq!(plan[0].location, vec![LocationStep::Field(2)]);
        assert_eq!(
            plan[0].kind,
            DigestKind::VariableArray(vec![StructureDigest {
                ty: StorageType::Object,
                location: vec![LocationStep::VariableIndex],
                kind: DigestKind::Reference(entity),
            }])
        );
        assert_eq!(plan[1].kind, DigestKind::Leaf);
        assert_eq!(plan[1].location, vec![LocationStep::Field(1)]);
    }

    #[test]
    fn decodes_hand_written_buffer() {
        let (schema, names, _) = entity_schema();
        // custom widths: refId u8, array u8, string u16, buffer u16
        let bytes = [
            0x01, 0xa5, // header
            0x00, // root ref
            0x01, 0x01, 0x04, 0x00, b'r', b'o', b'o', b't', // instance 0
            0x00, 0x01, 0x00, b'a', // instance 1
        ];
        let (graph, root) = binary_to_object(&bytes, &ComposerOptions::new(&schema, &names)).unwrap();
        assert_eq!(graph.field(root, "name"), Some(&Value::from("root")));
        let children = graph.field(root, "children").and_then(Value::as_node).unwrap();
        let child = graph.element(children, 0).and_then(Value::as_node).unwrap();
        assert_eq!(graph.field(child, "name"), Some(&Value::from("a")));
        let grandchildren = graph.field(child, "children").and_then(Value::as_node).unwrap();
        assert_eq!(graph.node(grandchildren), Some(&Node::Array(vec![])));
    }

    #[test]
    fn corrupt_buffers_are_rejected() {
        let (schema, names, _) = entity_schema();
        let opts = ComposerOptions::new(&schema, &names);

        // refId 5 where 1 is the next new id
        let skipped = [0x01, 0xa5, 0x00, 0x01, 0x05, 0x00, 0x00];
        assert!(matches!(
            binary_to_object(&skipped, &opts),
            Err(CodecError::UnexpectedReferenceId { expected: 1, found: 5 })
        ));

        let truncated = [0x01, 0xa5, 0x00, 0x01];
        assert!(matches!(
            binary_to_object(&truncated, &opts),
            Err(CodecError::UnexpectedEof { .. })
        ));

        let trailing = [0x01, 0xa5, 0x00, 0x00, 0x00, 0x00, 0xff];
        assert!(matches!(
            binary_to_object(&trailing, &opts),
            Err(CodecError::TrailingBytes(1))
        ));
    }

    #[test]
    fn enum_index_zero_is_absent_and_out_of_range_fails() {
        let mut b = SchemaBuilder::new();
        let mode = b.enumeration(["off", "on"]);
        let modes = b.array(mode);
        let root = b.object([("mode", mode), ("modes", modes)]);
        let schema = b.build(root).unwrap();
        let names = NameIds::new([("mode", 1), ("modes", 2)]).unwrap();
        let opts = ComposerOptions::new(&schema, &names);

        // uint8 mode, then array: len 2, [0, 1]
        let bytes = [0x00, 0x00, 0x02, 0x00, 0x01];
        let (graph, root) = binary_to_object(&bytes, &opts).unwrap();
        assert_eq!(graph.field(root, "mode"), None);
        let modes = graph.field(root, "modes").and_then(Value::as_node).unwrap();
        assert_eq!(
            graph.node(modes),
            Some(&Node::Array(vec![Value::Null, Value::from("off")]))
        );

        let bad = [0x00, 0x03, 0x00];
        assert!(matches!(
            binary_to_object(&bad, &opts),
            Err(CodecError::InvalidEnumIndex { index: 3, len: 2 })
        ));
    }

    #[test]
    fn hook_sees_every_leaf_once_and_can_replace() {
        let (schema, names, _) = entity_schema();
        let bytes = [
            0x01, 0xa5, 0x00, 0x01, 0x01, 0x04, 0x00, b'r', b'o', b'o', b't', 0x00, 0x01, 0x00,
            b'a',
        ];
        let mut seen = Vec::new();
        let (graph, root) = binary_to_object_with_hook(
            &bytes,
            &ComposerOptions::new(&schema, &names),
            &mut |leaf: &LeafContext<'_>| {
                seen.push(leaf.value.clone());
                match leaf.value {
                    Value::String(s) if s == "root" => HookOutcome::Replace(Value::from("ROOT")),
                    _ => HookOutcome::Keep,
                }
            },
        )
        .unwrap();
        assert_eq!(seen, vec![Value::from("root"), Value::from("a")]);
        assert_eq!(graph.field(root, "name"), Some(&Value::from("ROOT")));
    }
}
