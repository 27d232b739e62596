// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Schema-driven binary object codec for Echo.
//!
//! `echo-binpack` turns an [`ObjectGraph`] (objects and arrays that may share
//! children or form cycles) into a compact byte buffer and back. The wire
//! format is schema-relative: a [`Schema`] describes field types, a
//! [`NameIds`] table replaces field names by small integers, and nothing of
//! either is embedded in the output. Both sides must use the same pair.
//!
//! ```
//! use echo_binpack::{
//!     binary_to_object, object_to_binary, ComposerOptions, NameIds, ObjectGraph, SchemaBuilder,
//!     SchemaNode, StorageType, Value,
//! };
//!
//! let mut b = SchemaBuilder::new();
//! let entity = b.declare();
//! let name = b.leaf(StorageType::String);
//! let children = b.array(entity);
//! b.define(entity, SchemaNode::Object(vec![
//!     ("name".into(), name),
//!     ("children".into(), children),
//! ])).unwrap();
//! let schema = b.build(entity).unwrap();
//! let names = NameIds::new([("name", 1), ("children", 2)]).unwrap();
//! let opts = ComposerOptions::new(&schema, &names);
//!
//! let mut graph = ObjectGraph::new();
//! let leaf_children = graph.array([]);
//! let leaf = graph.object([("name", Value::from("a")), ("children", leaf_children.into())]);
//! let root_children = graph.array([leaf.into()]);
//! let root = graph.object([("name", Value::from("root")), ("children", root_children.into())]);
//!
//! let bytes = object_to_binary(&graph, root, &opts).unwrap();
//! let (decoded, decoded_root) = binary_to_object(&bytes, &opts).unwrap();
//! assert!(graph.structurally_eq(root, &decoded, decoded_root));
//! ```
//!
//! # Wire format
//!
//! `[header byte] [custom widths byte] [instances]`. The header is optional
//! ([`CodecOptions::use_header_byte`]); the custom widths byte only appears
//! when the negotiated [`Widths`] differ from [`Widths::WIRE_DEFAULT`]. See
//! [`header`] for the bit layout.
//!
//! Nodes at positions whose structure can occur more than once (variable
//! array elements, recursive or shared structures, union values) are stored
//! once as *instances* and referenced by id. Instance 0 is the root; the
//! others follow in the order their ids were first written.
#![forbid(unsafe_code)]

mod asset;
mod codec;
mod decode;
mod document;
mod encode;
mod error;
pub mod header;
mod hook;
mod options;
mod references;
mod schema;
mod storage;
mod union;
mod value;

pub use asset::{binary_to_object_with_asset_loader, AssetLinkResolver, AssetLoader};
pub use codec::{Reader, Writer};
pub use decode::{
    binary_to_object, binary_to_object_with_hook, plan_instance, DigestKind, LocationStep,
    StructureDigest,
};
pub use document::{SchemaBundle, SchemaDocument};
pub use encode::{object_to_binary, object_to_binary_with_resolver};
pub use error::{AssetLoadError, CodecError, GraphError, SchemaError};
pub use header::{WidthStats, Widths};
pub use hook::{HookOutcome, KeepValues, LeafContext, TransformValueHook};
pub use options::{CodecOptions, ComposerOptions, DEFAULT_MAX_ARRAY_ELEMENTS};
pub use references::{collect_reoccurring_nodes, collect_reoccurring_structures};
pub use schema::{NameIds, Schema, SchemaBuilder, SchemaId, SchemaNode};
pub use storage::{IntWidth, StorageType, UnknownStorageType};
pub use union::select_variant;
pub use value::{AssetRef, Node, NodeId, NodeKind, ObjectGraph, Slot, SlotKey, Value};

/// UUID type carried by [`Value::Uuid`] and handed to asset loaders.
pub use uuid::Uuid;
