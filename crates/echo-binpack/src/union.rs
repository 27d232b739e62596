// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Union variant selection by field presence.

use std::collections::BTreeSet;
use std::fmt::Display;

use crate::error::CodecError;
use crate::schema::{NameIds, Schema, SchemaId, SchemaNode};
use crate::value::Node;

/// Pick the variant of a union that describes `fields`.
///
/// Only registered fields holding a non-null value count as present. A
/// variant whose registered field set equals the present set wins outright;
/// failing that, variants whose field set contains the present set are
/// considered. More than one candidate in the winning tier is ambiguous.
pub fn select_variant(
    schema: &Schema,
    name_ids: &NameIds,
    variants: &[SchemaId],
    object: &Node,
    path: &dyn Display,
) -> Result<usize, CodecError> {
    let Node::Object(fields) = object else {
        return Err(CodecError::TypeMismatch {
            path: path.to_string(),
            expected: String::from("object"),
            found: "array",
        });
    };
    let present: BTreeSet<&str> = fields
        .iter()
        .filter(|(name, value)| name_ids.contains(name) && !value.is_null())
        .map(|(name, _)| name.as_str())
        .collect();

    let shapes: Vec<BTreeSet<&str>> = variants
        .iter()
        .map(|variant| match schema.node(*variant) {
            Some(SchemaNode::Object(variant_fields)) => variant_fields
                .iter()
                .map(|(name, _)| name.as_str())
                .filter(|name| name_ids.contains(name))
                .collect(),
            _ => BTreeSet::new(),
        })
        .collect();

    let exact: Vec<usize> = (0..shapes.len())
        .filter(|i| shapes[*i] == present)
        .collect();
    let candidates = if exact.is_empty() {
        (0..shapes.len())
            .filter(|i| present.is_subset(&shapes[*i]))
            .collect()
    } else {
        exact
    };

    match candidates.as_slice() {
        [single] => Ok(*single),
        [] => Err(CodecError::NoUnionMatch {
            path: path.to_string(),
            fields: present.into_iter().map(str::to_owned).collect(),
        }),
        _ => Err(CodecError::AmbiguousUnion {
            path: path.to_string(),
            candidates,
        }),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use std::collections::BTreeMap;

    use super::*;
    use crate::schema::SchemaBuilder;
    use crate::storage::StorageType;
    use crate::value::Value;

    fn shapes() -> (Schema, NameIds, Vec<SchemaId>) {
        let mut b = SchemaBuilder::new();
        let num = b.leaf(StorageType::Float32);
        let circle = b.object([("radius", num)]);
        let rect = b.object([("width", num), ("height", num)]);
        let square = b.object([("width", num)]);
        let union = b.union([circle, rect, square]);
        let root = b.object([("shape", union)]);
        let schema = b.build(root).unwrap();
        let names = NameIds::new([("radius", 1), ("width", 2), ("height", 3), ("shape", 4)]).unwrap();
        (schema, names, vec![circle, rect, square])
    }

    fn object(fields: &[(&str, Value)]) -> Node {
        Node::Object(
            fields
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    #[test]
    fn exact_match_beats_partial() {
        let (schema, names, variants) = shapes();
        let square = object(&[("width", Value::Float(2.0))]);
        assert_eq!(select_variant(&schema, &names, &variants, &square, &"s").unwrap(), 2);

        let rect = object(&[("width", Value::Float(2.0)), ("height", Value::Float(1.0))]);
        assert_eq!(select_variant(&schema, &names, &variants, &rect, &"s").unwrap(), 1);
    }

    #[test]
    fn partial_match_and_null_fields() {
        let (schema, names, variants) = shapes();
        let only_height = object(&[("height", Value::Float(1.0)), ("width", Value::Null)]);
        assert_eq!(
            select_variant(&schema, &names, &variants, &only_height, &"s").unwrap(),
            1
        );
    }

    #[test]
    fn ambiguity_and_no_match_are_errors() {
        let (schema, names, variants) = shapes();
        let empty = object(&[("unregistered", Value::Int(1))]);
        assert!(matches!(
            select_variant(&schema, &names, &variants, &empty, &"s"),
            Err(CodecError::AmbiguousUnion { candidates, .. }) if candidates == vec![0, 1, 2]
        ));

        let mixed = object(&[("radius", Value::Float(1.0)), ("width", Value::Float(1.0))]);
        assert!(matches!(
            select_variant(&schema, &names, &variants, &mixed, &"s"),
            Err(CodecError::NoUnionMatch { fields, .. }) if fields == vec!["radius", "width"]
        ));
    }
}
