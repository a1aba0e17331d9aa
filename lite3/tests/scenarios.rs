// Copyright 2019-2020 PolkaX Authors. Licensed under GPL-3.0.

use lite3::{Decoded, Lite3, NodeType, Value};

#[test]
fn lap_complete_event_overwrites_a_scalar_in_place() {
    let mut doc = Lite3::init_object();
    let root = doc.root();
    doc.set_string(root, "event", "lap_complete").unwrap();
    doc.set_i64(root, "lap", 55).unwrap();
    doc.set_f64(root, "time_sec", 88.427).unwrap();
    assert_eq!(
        doc.to_json(root).unwrap(),
        serde_json::json!({"event": "lap_complete", "lap": 55, "time_sec": 88.427})
    );

    let len_before = doc.buffer().len();
    doc.set_i64(root, "lap", 56).unwrap();
    assert_eq!(doc.get(root, "lap").unwrap(), Some(Decoded::I64(56)));
    assert_eq!(doc.buffer().len(), len_before);
}

#[test]
fn nested_headers_object_is_reachable_through_its_offset() {
    let mut doc = Lite3::init_object();
    let root = doc.root();
    let headers = doc.set_object(root, "headers").unwrap();
    doc.set_string(headers, "content-type", "application/json")
        .unwrap();
    doc.set_string(headers, "x-request-id", "req_9f8e2a").unwrap();
    doc.set_string(headers, "user-agent", "curl/8.1.2").unwrap();

    let nested = match doc.get(root, "headers").unwrap().unwrap() {
        Decoded::Nested(ofs, NodeType::Object) => ofs,
        other => panic!("expected a nested object, got {:?}", other),
    };
    assert_eq!(
        doc.get(nested, "user-agent").unwrap(),
        Some(Decoded::Str("curl/8.1.2".into()))
    );
}

#[test]
fn array_of_mixed_types_deep_equals_the_json_literal() {
    let mut doc = Lite3::init_array();
    let root = doc.root();
    for v in [
        Value::I64(1),
        Value::Str("two".into()),
        Value::Bool(true),
        Value::Null,
        Value::Object(vec![("nested".into(), Value::Str("object".into()))]),
    ] {
        doc.append(root, v).unwrap();
    }
    assert_eq!(doc.size(root), 5);
    assert_eq!(
        doc.to_json(root).unwrap(),
        serde_json::json!([1, "two", true, null, {"nested": "object"}])
    );
}

#[test]
fn big_integer_round_trips_through_set_and_get() {
    let mut doc = Lite3::init_object();
    let root = doc.root();
    let big = 12_345_678_901_234_567i64;
    doc.set_i64(root, "counter", big).unwrap();
    assert_eq!(doc.get(root, "counter").unwrap(), Some(Decoded::I64(big)));

    let negative = i64::MIN + 1;
    doc.set_i64(root, "counter", negative).unwrap();
    assert_eq!(
        doc.get(root, "counter").unwrap(),
        Some(Decoded::I64(negative))
    );
}

#[test]
fn thirty_four_keys_force_several_splits_and_stay_findable() {
    let mut doc = Lite3::init_object();
    let root = doc.root();
    for i in 0..34u32 {
        doc.set_i64(root, &format!("k{}", i), i as i64).unwrap();
    }
    assert_eq!(doc.size(root), 34);
    for i in 0..34u32 {
        assert_eq!(
            doc.get(root, &format!("k{}", i)).unwrap(),
            Some(Decoded::I64(i as i64))
        );
    }
    assert!(doc.get(root, "does-not-exist").unwrap().is_none());
}

#[test]
fn five_byte_binary_payload_round_trips() {
    let mut doc = Lite3::init_object();
    let root = doc.root();
    let blob = vec![0xde, 0xad, 0xbe, 0xef, 0x01];
    doc.set_bytes(root, "blob", blob.clone()).unwrap();
    assert_eq!(doc.get(root, "blob").unwrap(), Some(Decoded::Bytes(blob)));
}

#[test]
fn from_buffer_wraps_an_existing_encoding_without_revalidating() {
    let mut doc = Lite3::init_object();
    let root = doc.root();
    doc.set_string(root, "greeting", "hello").unwrap();
    let length = doc.buffer().len() as u32;
    let bytes = doc.buffer().to_vec();

    let reopened = Lite3::from_buffer(bytes, length);
    assert_eq!(
        reopened.to_json(reopened.root()).unwrap(),
        doc.to_json(root).unwrap()
    );
}

#[test]
fn json_bridge_round_trips_modulo_key_order() {
    let original = serde_json::json!({
        "a": 1,
        "b": [true, null, "x", 2.5],
        "c": {"d": {"e": "deep"}}
    });
    let doc = Lite3::from_json(&original).unwrap();
    assert_eq!(doc.to_json(doc.root()).unwrap(), original);
}

#[test]
fn array_append_uses_the_dense_index_as_hash() {
    let mut doc = Lite3::init_array();
    let root = doc.root();
    for i in 0..16i64 {
        doc.append_i64(root, i * 10).unwrap();
    }
    for i in 0..16u32 {
        assert_eq!(
            doc.get_at(root, i).unwrap(),
            Some(Decoded::I64(i as i64 * 10))
        );
    }
    assert!(doc.get_at(root, 16).unwrap().is_none());
}

#[test]
fn keys_enumerate_hash_ascending_not_insertion_order() {
    let mut doc = Lite3::init_object();
    let root = doc.root();
    doc.set_bool(root, "zzz", true).unwrap();
    doc.set_bool(root, "aaa", true).unwrap();
    doc.set_bool(root, "mmm", true).unwrap();

    let keys = doc.keys(root).unwrap();
    let mut sorted_by_hash = keys.clone();
    sorted_by_hash.sort_by_key(|k| lite3_hash::djb2(k.as_bytes()));
    assert_eq!(keys, sorted_by_hash);
}
