// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error types for schema building, graph edits and the codec itself.

use thiserror::Error;
use uuid::Uuid;

use crate::schema::SchemaId;
use crate::storage::{IntWidth, StorageType};
use crate::value::NodeId;

/// Errors produced while encoding or decoding a graph.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The data does not have the shape the structure asks for.
    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Field path of the offending value (e.g. `root.children[2].name`).
        path: String,
        /// What the structure expected.
        expected: String,
        /// What the data contained.
        found: &'static str,
    },
    /// A numeric value does not fit into its storage type.
    #[error("value {value} at {path} does not fit into {storage_type:?}")]
    ValueOutOfRange {
        /// Field path of the offending value.
        path: String,
        /// Rendered value.
        value: String,
        /// Target storage type.
        storage_type: StorageType,
    },
    /// A referenced position holds `Null`; references cannot be absent.
    #[error("pointer not specified at {path}")]
    NullReference {
        /// Field path of the missing reference.
        path: String,
    },
    /// A `Value::Node` points outside the graph.
    #[error("node {0} does not exist in the graph")]
    DanglingNode(NodeId),
    /// A length, id or index does not fit into the negotiated width.
    #[error("{what} {value} does not fit into width {width:?}")]
    WidthOverflow {
        /// Which quantity overflowed (`"reference id"`, `"string length"`, ...).
        what: &'static str,
        /// The value that did not fit.
        value: u64,
        /// The width it had to fit into.
        width: IntWidth,
    },
    /// Variable arrays claim more elements than [`CodecOptions::max_array_elements`](crate::CodecOptions::max_array_elements) allows.
    #[error("array at offset {offset} claims {len} elements, over the limit of {limit} per payload")]
    ArrayLimitExceeded {
        /// Read offset just past the array length.
        offset: usize,
        /// Claimed element count.
        len: u64,
        /// Configured limit.
        limit: u32,
    },
    /// The buffer ended before the structure was fully read.
    #[error("unexpected end of buffer at offset {offset} (needed {needed} bytes)")]
    UnexpectedEof {
        /// Read offset where the short read happened.
        offset: usize,
        /// Number of bytes requested.
        needed: usize,
    },
    /// Bytes remained after every instance was decoded.
    #[error("{0} trailing bytes after the last instance")]
    TrailingBytes(usize),
    /// A STRING payload was not valid UTF-8.
    #[error("invalid utf-8 in string payload at offset {offset}")]
    InvalidUtf8 {
        /// Offset of the string payload.
        offset: usize,
    },
    /// The header byte carries flags this codec does not understand.
    #[error("unsupported header byte {0:#04x}")]
    UnsupportedHeader(u8),
    /// A reference id skipped ahead of the next id to be allocated.
    #[error("reference id {found} out of order (next new id is {expected})")]
    UnexpectedReferenceId {
        /// The next id the decoder would allocate.
        expected: u32,
        /// The id found in the buffer.
        found: u32,
    },
    /// An enum index points past the end of its string list.
    #[error("enum index {index} out of range for {len} variants")]
    InvalidEnumIndex {
        /// Decoded 1-based index.
        index: u64,
        /// Number of enum strings.
        len: usize,
    },
    /// A union variant index points past the end of its variant list.
    #[error("union variant index {index} out of range for {len} variants")]
    InvalidUnionIndex {
        /// Decoded variant index.
        index: u64,
        /// Number of variants.
        len: usize,
    },
    /// More than one union variant matches the object's fields.
    #[error("ambiguous union at {path}: variants {candidates:?} all match")]
    AmbiguousUnion {
        /// Field path of the union value.
        path: String,
        /// Indices of the matching variants.
        candidates: Vec<usize>,
    },
    /// No union variant matches the object's fields.
    #[error("no union variant at {path} matches fields {fields:?}")]
    NoUnionMatch {
        /// Field path of the union value.
        path: String,
        /// Registered, non-null fields present on the object.
        fields: Vec<String>,
    },
    /// A decoded location refers to a name id missing from the NameIds table.
    #[error("unknown name id {0}")]
    UnknownNameId(u32),
    /// A decoded location could not be resolved against the graph under construction.
    #[error("cannot resolve location in node {node}: {reason}")]
    InvalidLocation {
        /// Node the location was resolved against.
        node: NodeId,
        /// What went wrong.
        reason: &'static str,
    },
    /// A structure node referenced from the digest is missing from the schema.
    #[error("structure node {0} is not part of the schema")]
    UnknownStructure(SchemaId),
    /// Graph manipulation failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// The asset loader failed.
    #[error(transparent)]
    AssetLoad(#[from] AssetLoadError),
}

/// Errors produced while building a [`Schema`](crate::Schema) or compiling a schema document.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A node was declared with [`SchemaBuilder::declare`](crate::SchemaBuilder::declare) but never defined.
    #[error("structure node {0} was declared but never defined")]
    Undefined(SchemaId),
    /// A node was defined twice.
    #[error("structure node {0} is already defined")]
    AlreadyDefined(SchemaId),
    /// A child id does not belong to this builder.
    #[error("structure node {0} does not exist")]
    UnknownNode(SchemaId),
    /// Enum, tuple and union nodes need at least one entry.
    #[error("{0} structure must not be empty")]
    Empty(&'static str),
    /// Union variants must be object structures.
    #[error("union variant {0} is not an object structure")]
    UnionVariantNotObject(SchemaId),
    /// The root must be an object, array or tuple structure.
    #[error("root structure {0} must be an object, array or tuple")]
    InvalidRoot(SchemaId),
    /// ARRAY, OBJECT and UNION_ARRAY are described by structure nodes, not leaves.
    #[error("{0:?} cannot be used as a leaf storage type")]
    StructuralLeaf(crate::storage::StorageType),
    /// Two field names map to the same name id.
    #[error("name id {id} is used by both `{first}` and `{second}`")]
    DuplicateNameId {
        /// The shared id.
        id: u32,
        /// First field name.
        first: String,
        /// Second field name.
        second: String,
    },
    /// A `#Name` reference points to a missing definition.
    #[error("unknown definition `{0}`")]
    UnknownDefinition(String),
    /// A schema document node could not be interpreted.
    #[error("invalid structure node at {path}: {reason}")]
    InvalidNode {
        /// JSON path of the node.
        path: String,
        /// What was wrong with it.
        reason: String,
    },
    /// The schema document is not valid JSON or does not match the document shape.
    #[error("schema document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors produced by [`ObjectGraph`](crate::ObjectGraph) edits and JSON conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The node id is not part of this graph.
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),
    /// The node is an array where an object was required, or vice versa.
    #[error("node {node} is not an {expected}")]
    WrongKind {
        /// Offending node.
        node: NodeId,
        /// Expected kind (`"object"` or `"array"`).
        expected: &'static str,
    },
    /// The graph contains a cycle and cannot be rendered as a JSON tree.
    #[error("node {0} is part of a cycle and cannot be rendered as JSON")]
    Cycle(NodeId),
    /// A JSON number is neither an `i64` nor a finite `f64`.
    #[error("unsupported JSON number {0}")]
    UnsupportedNumber(String),
}

/// Errors reported by an [`AssetLoader`](crate::AssetLoader).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetLoadError {
    /// No asset exists for the uuid.
    #[error("asset {0} not found")]
    NotFound(Uuid),
    /// The asset exists but could not be loaded.
    #[error("asset {uuid} failed to load: {message}")]
    Failed {
        /// Asset uuid.
        uuid: Uuid,
        /// Loader-specific message.
        message: String,
    },
}
