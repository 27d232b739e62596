// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Reference collection.
//!
//! Two breadth-first walks with the same rule ("seen twice means reoccurring"):
//!
//! - over the structure, where a variable array pushes its element twice and a
//!   union pushes every variant twice, so those are reoccurring no matter what
//!   the data looks like. Both encoder and decoder derive reference positions
//!   from this set, so it must only depend on the structure;
//! - over the data, following registered keys and array indices. This one
//!   finds nodes that are shared in the data itself.

use std::collections::{HashSet, VecDeque};

use crate::schema::{NameIds, Schema, SchemaId, SchemaNode};
use crate::value::{Node, NodeId, ObjectGraph, Value};

/// Container structure nodes that must be stored by reference.
pub fn collect_reoccurring_structures(schema: &Schema, name_ids: &NameIds) -> HashSet<SchemaId> {
    let mut seen = HashSet::new();
    let mut reoccurring = HashSet::new();
    let mut queue = VecDeque::from([schema.root()]);
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            if schema.is_container(id) {
                reoccurring.insert(id);
            }
            continue;
        }
        match schema.node(id) {
            Some(SchemaNode::Object(fields)) => queue.extend(
                fields
                    .iter()
                    .filter(|(name, _)| name_ids.contains(name))
                    .map(|(_, child)| *child),
            ),
            Some(SchemaNode::Tuple(items)) => queue.extend(items.iter().copied()),
            Some(SchemaNode::VariableArray(elem)) => queue.extend([*elem, *elem]),
            Some(SchemaNode::Union(variants)) => {
                for variant in variants {
                    queue.extend([*variant, *variant]);
                }
            }
            Some(SchemaNode::Leaf(_) | SchemaNode::Enum(_)) | None => {}
        }
    }
    reoccurring
}

/// Data nodes reachable from `root` more than once.
pub fn collect_reoccurring_nodes(
    graph: &ObjectGraph,
    root: NodeId,
    name_ids: &NameIds,
) -> HashSet<NodeId> {
    let mut seen = HashSet::new();
    let mut reoccurring = HashSet::new();
    let mut queue = VecDeque::from([root]);
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            reoccurring.insert(id);
            continue;
        }
        match graph.node(id) {
            Some(Node::Object(fields)) => queue.extend(
                fields
                    .iter()
                    .filter(|(name, _)| name_ids.contains(name))
                    .filter_map(|(_, value)| value.as_node()),
            ),
            Some(Node::Array(items)) => queue.extend(items.iter().filter_map(Value::as_node)),
            None => {}
        }
    }
    reoccurring
}
