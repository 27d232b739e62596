// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(clippy::unwrap_used, clippy::expect_used)]
//! JSON schema documents driving a JSON → binary → JSON round trip.

use echo_binpack::{binary_to_object, object_to_binary, ObjectGraph, SchemaDocument, Value};
use serde_json::json;

const SCENE: &str = r##"{
    "nameIds": { "name": 1, "kind": 2, "pos": 3, "id": 4, "tags": 5, "children": 6 },
    "definitions": {
        "Entity": {
            "name": "string",
            "kind": { "$enum": ["mesh", "light", "camera"] },
            "pos": ["float32", "float32", "float32"],
            "id": "uuid",
            "tags": ["string"],
            "children": ["#Entity"]
        }
    },
    "root": "#Entity"
}"##;

fn scene_json() -> serde_json::Value {
    json!({
        "name": "world",
        "kind": "mesh",
        "pos": [1.5, -0.25, 8.5],
        "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
        "tags": ["static", "root"],
        "children": [
            {
                "name": "lamp",
                "kind": "light",
                "pos": [0.5, 2.5, -1.5],
                "id": "0f9c3a54-6a3e-4c55-8f0e-3f4a7b2f9d11",
                "tags": [],
                "children": []
            },
            {
                "name": "eye",
                "kind": "camera",
                "pos": [0.5, 0.5, 0.5],
                "id": "5b1d7e2c-0c8e-4c1b-9e55-2d7b6d0a4f3e",
                "tags": ["main"],
                "children": []
            }
        ]
    })
}

#[test]
fn json_round_trips_through_a_compiled_document() {
    let bundle = SchemaDocument::from_json_str(SCENE)
        .expect("parse")
        .compile()
        .expect("compile");
    let opts = bundle.composer();

    let input = scene_json();
    let (graph, root) = ObjectGraph::from_json(&input).expect("graph");
    let root = root.as_node().expect("object root");

    let bytes = object_to_binary(&graph, root, &opts).expect("encode");
    let (decoded, decoded_root) = binary_to_object(&bytes, &opts).expect("decode");

    assert!(matches!(decoded.field(decoded_root, "id"), Some(Value::Uuid(_))));
    assert_eq!(decoded.to_json(decoded_root).expect("json"), input);
}

#[test]
fn fingerprint_follows_structure_and_names() {
    let first = SchemaDocument::from_json_str(SCENE).unwrap().compile().unwrap();
    let second = SchemaDocument::from_json_str(SCENE).unwrap().compile().unwrap();
    assert_eq!(
        first.schema.fingerprint(&first.name_ids),
        second.schema.fingerprint(&second.name_ids)
    );

    let mut renamed = SchemaDocument::from_json_str(SCENE).unwrap();
    renamed.name_ids.insert("tags".into(), 42);
    let renamed = renamed.compile().unwrap();
    assert_ne!(
        first.schema.fingerprint(&first.name_ids),
        renamed.schema.fingerprint(&renamed.name_ids)
    );
}

#[test]
fn document_options_reach_the_wire() {
    let mut doc = SchemaDocument::from_json_str(SCENE).unwrap();
    let little = doc.compile().unwrap();
    doc.options.little_endian = false;
    let big = doc.compile().unwrap();

    let input = scene_json();
    let (graph, root) = ObjectGraph::from_json(&input).unwrap();
    let root = root.as_node().unwrap();

    let le = object_to_binary(&graph, root, &little.composer()).unwrap();
    let be = object_to_binary(&graph, root, &big.composer()).unwrap();
    assert_ne!(le, be);

    let (decoded, decoded_root) = binary_to_object(&be, &big.composer()).unwrap();
    assert_eq!(decoded.to_json(decoded_root).unwrap(), input);
}

#[test]
fn document_serializes_back_to_equivalent_json() {
    let doc = SchemaDocument::from_json_str(SCENE).unwrap();
    let text = serde_json::to_string(&doc).unwrap();
    assert_eq!(SchemaDocument::from_json_str(&text).unwrap(), doc);
}
