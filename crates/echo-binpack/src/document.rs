// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! JSON schema documents.
//!
//! A document carries everything both sides of a call need:
//!
//! ```json
//! {
//!   "nameIds": { "name": 1, "children": 2 },
//!   "definitions": { "Entity": { "name": "string", "children": ["#Entity"] } },
//!   "root": "#Entity",
//!   "options": { "littleEndian": true }
//! }
//! ```
//!
//! Node forms: a storage type name is a leaf, `"#Name"` refers to a
//! definition (same node, so recursion and sharing work), `[node]` is a
//! variable array, `[a, b, ...]` a tuple, `{"$enum": [...]}` an enum,
//! `{"$union": [...]}` a union and any other object is an object structure.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::SchemaError;
use crate::options::{CodecOptions, ComposerOptions};
use crate::schema::{NameIds, Schema, SchemaBuilder, SchemaId, SchemaNode};
use crate::storage::StorageType;

const ENUM_KEY: &str = "$enum";
const UNION_KEY: &str = "$union";

/// Serialized form of a schema, its name ids and its options.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SchemaDocument {
    /// Field name → wire id.
    pub name_ids: BTreeMap<String, u32>,
    /// Named structures, referenced as `"#Name"`.
    #[serde(default)]
    pub definitions: BTreeMap<String, Json>,
    /// Root structure.
    pub root: Json,
    /// Wire switches.
    #[serde(default)]
    pub options: CodecOptions,
}

/// A compiled [`SchemaDocument`].
#[derive(Clone, Debug)]
pub struct SchemaBundle {
    /// Compiled structure.
    pub schema: Schema,
    /// Name id table.
    pub name_ids: NameIds,
    /// Wire switches.
    pub options: CodecOptions,
}

impl SchemaBundle {
    /// Options for encoding and decoding with this bundle.
    pub const fn composer(&self) -> ComposerOptions<'_> {
        ComposerOptions::with_options(&self.schema, &self.name_ids, self.options)
    }
}

impl SchemaDocument {
    /// Parse a document from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse a document from JSON bytes.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, SchemaError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Compile into a [`Schema`] and [`NameIds`].
    pub fn compile(&self) -> Result<SchemaBundle, SchemaError> {
        let name_ids = NameIds::new(self.name_ids.iter().map(|(name, id)| (name.as_str(), *id)))?;

        let mut compiler = Compiler {
            builder: SchemaBuilder::new(),
            definitions: HashMap::new(),
        };
        for name in self.definitions.keys() {
            let id = compiler.builder.declare();
            compiler.definitions.insert(name.as_str(), id);
        }
        for (name, body) in &self.definitions {
            let path = format!("definitions.{name}");
            let node = compiler.describe(body, &path)?;
            let id = compiler.definitions[name.as_str()];
            compiler.builder.define(id, node)?;
        }
        let root = compiler.compile(&self.root, "root")?;
        let schema = compiler.builder.build(root)?;
        Ok(SchemaBundle {
            schema,
            name_ids,
            options: self.options,
        })
    }
}

struct Compiler<'d> {
    builder: SchemaBuilder,
    definitions: HashMap<&'d str, SchemaId>,
}

impl Compiler<'_> {
    /// Compile a node in a child position, returning its id.
    fn compile(&mut self, json: &Json, path: &str) -> Result<SchemaId, SchemaError> {
        match json {
            Json::String(text) => match text.strip_prefix('#') {
                Some(name) => self
                    .definitions
                    .get(name)
                    .copied()
                    .ok_or_else(|| SchemaError::UnknownDefinition(name.to_owned())),
                None => Ok(self.builder.leaf(parse_leaf(text, path)?)),
            },
            other => {
                let node = self.describe(other, path)?;
                Ok(self.builder.add(node))
            }
        }
    }

    /// Describe a node without allocating an id for it.
    fn describe(&mut self, json: &Json, path: &str) -> Result<SchemaNode, SchemaError> {
        match json {
            Json::String(text) => {
                if text.starts_with('#') {
                    return Err(invalid(path, "a definition cannot be an alias of another"));
                }
                Ok(SchemaNode::Leaf(parse_leaf(text, path)?))
            }
            Json::Array(items) => match items.as_slice() {
                [] => Err(invalid(path, "empty array structure")),
                [elem] => Ok(SchemaNode::VariableArray(
                    self.compile(elem, &format!("{path}[0]"))?,
                )),
                items => Ok(SchemaNode::Tuple(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| self.compile(item, &format!("{path}[{i}]")))
                        .collect::<Result<_, _>>()?,
                )),
            },
            Json::Object(map) => {
                if let Some(values) = map.get(ENUM_KEY) {
                    if map.len() != 1 {
                        return Err(invalid(path, "`$enum` must be the only key"));
                    }
                    let Json::Array(values) = values else {
                        return Err(invalid(path, "`$enum` must be an array of strings"));
                    };
                    let strings = values
                        .iter()
                        .map(|v| v.as_str().map(str::to_owned))
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| invalid(path, "`$enum` must be an array of strings"))?;
                    return Ok(SchemaNode::Enum(strings));
                }
                if let Some(variants) = map.get(UNION_KEY) {
                    if map.len() != 1 {
                        return Err(invalid(path, "`$union` must be the only key"));
                    }
                    let Json::Array(variants) = variants else {
                        return Err(invalid(path, "`$union` must be an array of structures"));
                    };
                    return Ok(SchemaNode::Union(
                        variants
                            .iter()
                            .enumerate()
                            .map(|(i, v)| self.compile(v, &format!("{path}.$union[{i}]")))
                            .collect::<Result<_, _>>()?,
                    ));
                }
                Ok(SchemaNode::Object(
                    map.iter()
                        .map(|(name, child)| {
                            Ok((name.clone(), self.compile(child, &format!("{path}.{name}"))?))
                        })
                        .collect::<Result<_, SchemaError>>()?,
                ))
            }
            Json::Null | Json::Bool(_) | Json::Number(_) => {
                Err(invalid(path, "expected a type name, array or object"))
            }
        }
    }
}

fn parse_leaf(text: &str, path: &str) -> Result<StorageType, SchemaError> {
    text.parse::<StorageType>()
        .map_err(|err| invalid(path, &err.to_string()))
}

fn invalid(path: &str, reason: &str) -> SchemaError {
    SchemaError::InvalidNode {
        path: path.to_owned(),
        reason: reason.to_owned(),
    }
}
