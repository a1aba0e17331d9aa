// Copyright 2019-2020 PolkaX Authors. Licensed under GPL-3.0.

//! Lite3: a JSON-compatible binary format whose encoded bytes ARE an
//! in-place, mutable B-tree.
//!
//! The wire layout, B-tree maintenance and value codec live in the private
//! [`node`], [`arena`], [`btree`] and [`value`] modules; this crate root is
//! the thin facade a caller actually talks to (construction, typed
//! setters, reads, and the [`serde_json`] bridge). Every mutating/reading
//! method takes an explicit node offset (`self.root()` for the outermost
//! value, or whatever a prior `set_object`/`set_array`/`append_object`
//! returned) rather than a nested handle type, matching the engine's
//! offset-addressed design all the way up to the public boundary.

mod arena;
mod bytes;
mod btree;
pub mod error;
mod node;
pub mod traverse;
pub mod value;

use log::debug;

use lite3_params::DEFAULT_CAPACITY;

pub use error::{Lite3Error, Result};
pub use node::NodeType;

use arena::Arena;
use value::Scalar;

/// A runtime-typed value, for the generic [`Lite3::set`]/[`Lite3::append`]
/// auto-dispatch entry points.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL
    Null,
    /// BOOL
    Bool(bool),
    /// I64 (covers both small and arbitrarily large integers; `i64` already
    /// represents the format's full 64-bit integer range losslessly, so
    /// there is no separate big-integer variant).
    I64(i64),
    /// F64
    F64(f64),
    /// STRING
    Str(String),
    /// BYTES
    Bytes(Vec<u8>),
    /// An ordered sequence, auto-dispatched to ARRAY.
    Array(Vec<Value>),
    /// A keyed mapping, auto-dispatched to OBJECT.
    Object(Vec<(String, Value)>),
}

/// A decoded value read back from a [`Lite3`] handle.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// NULL
    Null,
    /// BOOL
    Bool(bool),
    /// I64
    I64(i64),
    /// F64
    F64(f64),
    /// STRING
    Str(String),
    /// BYTES
    Bytes(Vec<u8>),
    /// A nested OBJECT/ARRAY; the offset is a valid `node_ofs` for every
    /// other method on this handle.
    Nested(u32, NodeType),
}

fn decode(read: value::ValueRead, scalar: Option<Scalar>) -> Decoded {
    match read {
        value::ValueRead::Nested(ofs, ty) => Decoded::Nested(ofs, ty),
        value::ValueRead::Scalar => match scalar.expect("scalar payload") {
            Scalar::Null => Decoded::Null,
            Scalar::Bool(b) => Decoded::Bool(b),
            Scalar::I64(v) => Decoded::I64(v),
            Scalar::F64(v) => Decoded::F64(v),
            Scalar::Bytes(b) => Decoded::Bytes(b),
            Scalar::Str(s) => Decoded::Str(s),
        },
    }
}

/// A Lite3 buffer and the offset of its outermost OBJECT/ARRAY.
pub struct Lite3 {
    arena: Arena,
    root_ofs: u32,
}

impl Lite3 {
    /// Initializes a fresh handle rooted at a keyed OBJECT, with
    /// [`lite3_params::DEFAULT_CAPACITY`] bytes of initial backing storage.
    pub fn init_object() -> Self {
        Self::init_object_with_capacity(DEFAULT_CAPACITY)
    }

    /// As [`Lite3::init_object`], with an explicit initial capacity.
    pub fn init_object_with_capacity(capacity: u32) -> Self {
        Self::init_with(NodeType::Object, capacity)
    }

    /// Initializes a fresh handle rooted at a dense ARRAY, with
    /// [`lite3_params::DEFAULT_CAPACITY`] bytes of initial backing storage.
    pub fn init_array() -> Self {
        Self::init_array_with_capacity(DEFAULT_CAPACITY)
    }

    /// As [`Lite3::init_array`], with an explicit initial capacity.
    pub fn init_array_with_capacity(capacity: u32) -> Self {
        Self::init_with(NodeType::Array, capacity)
    }

    fn init_with(ty: NodeType, capacity: u32) -> Self {
        let mut arena = Arena::new(capacity);
        let root_ofs = arena
            .reserve_aligned(lite3_params::NODE_SIZE, lite3_params::DEFAULT_ALIGNMENT)
            .expect("a fresh arena always has room for one root node");
        node::init_node(arena.raw_mut(), root_ofs, ty);
        debug!("lite3: initialized {:?} root at offset {}", ty, root_ofs);
        Lite3 { arena, root_ofs }
    }

    /// Wraps an already-encoded buffer, trusting `length` as the used
    /// region with no validation. Consumers must trust the producer.
    pub fn from_buffer(bytes: Vec<u8>, length: u32) -> Self {
        Lite3 {
            arena: Arena::from_existing(bytes, length),
            root_ofs: 0,
        }
    }

    /// A view of the used bytes: the wire-format representation, bit-exact
    /// across implementations.
    pub fn buffer(&self) -> &[u8] {
        self.arena.as_slice()
    }

    /// The offset of this handle's outermost value; pass this as `node_ofs`
    /// to every other method to operate on the top-level OBJECT/ARRAY.
    pub fn root(&self) -> u32 {
        self.root_ofs
    }

    /// The OBJECT/ARRAY type stored at `node_ofs`.
    pub fn node_type(&self, node_ofs: u32) -> Result<NodeType> {
        node::node_type(self.arena.raw(), node_ofs)
    }

    /// Number of entries in the OBJECT/ARRAY rooted at `node_ofs`.
    pub fn size(&self, node_ofs: u32) -> u32 {
        node::subtree_size(self.arena.raw(), node_ofs)
    }

    /// `true` if `key` is present in the OBJECT rooted at `node_ofs`.
    pub fn has(&self, node_ofs: u32, key: &str) -> Result<bool> {
        value::has(&self.arena, node_ofs, key)
    }

    /// Looks up `key` in the OBJECT rooted at `node_ofs`.
    pub fn get(&self, node_ofs: u32, key: &str) -> Result<Option<Decoded>> {
        Ok(value::get(&self.arena, node_ofs, key)?.map(|(r, s)| decode(r, s)))
    }

    /// Looks up index `i` in the ARRAY rooted at `node_ofs`.
    pub fn get_at(&self, node_ofs: u32, i: u32) -> Result<Option<Decoded>> {
        Ok(value::get_at(&self.arena, node_ofs, i)?.map(|(r, s)| decode(r, s)))
    }

    /// Keys of the OBJECT rooted at `node_ofs`, hash-ascending (NOT
    /// insertion order).
    pub fn keys(&self, node_ofs: u32) -> Result<Vec<String>> {
        Ok(traverse::entries(&self.arena, node_ofs)?
            .into_iter()
            .map(|(k, _)| k)
            .collect())
    }

    /// `(key, value)` pairs of the OBJECT rooted at `node_ofs`,
    /// hash-ascending.
    pub fn entries(&self, node_ofs: u32) -> Result<Vec<(String, Decoded)>> {
        traverse::entries(&self.arena, node_ofs)?
            .into_iter()
            .map(|(k, value_ofs)| {
                let (r, s) = value::read_value(&self.arena, value_ofs)?;
                Ok((k, decode(r, s)))
            })
            .collect()
    }

    /// Elements of the ARRAY rooted at `node_ofs`, in index order.
    pub fn values(&self, node_ofs: u32) -> Result<Vec<Decoded>> {
        traverse::items(&self.arena, node_ofs)?
            .into_iter()
            .map(|value_ofs| {
                let (r, s) = value::read_value(&self.arena, value_ofs)?;
                Ok(decode(r, s))
            })
            .collect()
    }

    /// Sets `key` to NULL in the OBJECT rooted at `node_ofs`.
    pub fn set_null(&mut self, node_ofs: u32, key: &str) -> Result<()> {
        self.set_scalar(node_ofs, key, Scalar::Null)
    }

    /// Sets `key` to a BOOL in the OBJECT rooted at `node_ofs`.
    pub fn set_bool(&mut self, node_ofs: u32, key: &str, v: bool) -> Result<()> {
        self.set_scalar(node_ofs, key, Scalar::Bool(v))
    }

    /// Sets `key` to an I64 in the OBJECT rooted at `node_ofs`.
    pub fn set_i64(&mut self, node_ofs: u32, key: &str, v: i64) -> Result<()> {
        self.set_scalar(node_ofs, key, Scalar::I64(v))
    }

    /// Sets `key` to an F64 in the OBJECT rooted at `node_ofs`.
    pub fn set_f64(&mut self, node_ofs: u32, key: &str, v: f64) -> Result<()> {
        self.set_scalar(node_ofs, key, Scalar::F64(v))
    }

    /// Sets `key` to a STRING in the OBJECT rooted at `node_ofs`.
    pub fn set_string(&mut self, node_ofs: u32, key: &str, v: impl Into<String>) -> Result<()> {
        self.set_scalar(node_ofs, key, Scalar::Str(v.into()))
    }

    /// Sets `key` to a BYTES payload in the OBJECT rooted at `node_ofs`.
    pub fn set_bytes(&mut self, node_ofs: u32, key: &str, v: impl Into<Vec<u8>>) -> Result<()> {
        self.set_scalar(node_ofs, key, Scalar::Bytes(v.into()))
    }

    fn set_scalar(&mut self, node_ofs: u32, key: &str, scalar: Scalar) -> Result<()> {
        self.arena.ensure_space(value::scalar_set_reservation(key, &scalar))?;
        value::set_scalar(&mut self.arena, node_ofs, key, scalar)
    }

    /// Sets `key` to a freshly initialized OBJECT in the OBJECT rooted at
    /// `node_ofs`, returning the new object's offset.
    pub fn set_object(&mut self, node_ofs: u32, key: &str) -> Result<u32> {
        self.arena.ensure_space(value::nested_set_reservation(key))?;
        value::set_nested(&mut self.arena, node_ofs, key, NodeType::Object)
    }

    /// Sets `key` to a freshly initialized ARRAY in the OBJECT rooted at
    /// `node_ofs`, returning the new array's offset.
    pub fn set_array(&mut self, node_ofs: u32, key: &str) -> Result<u32> {
        self.arena.ensure_space(value::nested_set_reservation(key))?;
        value::set_nested(&mut self.arena, node_ofs, key, NodeType::Array)
    }

    /// Appends NULL to the ARRAY rooted at `node_ofs`.
    pub fn append_null(&mut self, node_ofs: u32) -> Result<()> {
        self.append_scalar(node_ofs, Scalar::Null)
    }

    /// Appends a BOOL to the ARRAY rooted at `node_ofs`.
    pub fn append_bool(&mut self, node_ofs: u32, v: bool) -> Result<()> {
        self.append_scalar(node_ofs, Scalar::Bool(v))
    }

    /// Appends an I64 to the ARRAY rooted at `node_ofs`.
    pub fn append_i64(&mut self, node_ofs: u32, v: i64) -> Result<()> {
        self.append_scalar(node_ofs, Scalar::I64(v))
    }

    /// Appends an F64 to the ARRAY rooted at `node_ofs`.
    pub fn append_f64(&mut self, node_ofs: u32, v: f64) -> Result<()> {
        self.append_scalar(node_ofs, Scalar::F64(v))
    }

    /// Appends a STRING to the ARRAY rooted at `node_ofs`.
    pub fn append_string(&mut self, node_ofs: u32, v: impl Into<String>) -> Result<()> {
        self.append_scalar(node_ofs, Scalar::Str(v.into()))
    }

    /// Appends a BYTES payload to the ARRAY rooted at `node_ofs`.
    pub fn append_bytes(&mut self, node_ofs: u32, v: impl Into<Vec<u8>>) -> Result<()> {
        self.append_scalar(node_ofs, Scalar::Bytes(v.into()))
    }

    fn append_scalar(&mut self, node_ofs: u32, scalar: Scalar) -> Result<()> {
        self.arena.ensure_space(value::scalar_append_reservation(&scalar))?;
        value::append_scalar(&mut self.arena, node_ofs, scalar)
    }

    /// Appends a freshly initialized OBJECT to the ARRAY rooted at
    /// `node_ofs`, returning its offset.
    pub fn append_object(&mut self, node_ofs: u32) -> Result<u32> {
        self.arena.ensure_space(value::nested_append_reservation())?;
        value::append_nested(&mut self.arena, node_ofs, NodeType::Object)
    }

    /// Appends a freshly initialized ARRAY to the ARRAY rooted at
    /// `node_ofs`, returning its offset.
    pub fn append_array(&mut self, node_ofs: u32) -> Result<u32> {
        self.arena.ensure_space(value::nested_append_reservation())?;
        value::append_nested(&mut self.arena, node_ofs, NodeType::Array)
    }

    /// Auto-dispatching set: writes `value` under `key` in the OBJECT
    /// rooted at `node_ofs`, recursing into nested OBJECT/ARRAY values.
    pub fn set(&mut self, node_ofs: u32, key: &str, value: Value) -> Result<()> {
        match value {
            Value::Null => self.set_null(node_ofs, key),
            Value::Bool(b) => self.set_bool(node_ofs, key, b),
            Value::I64(v) => self.set_i64(node_ofs, key, v),
            Value::F64(v) => self.set_f64(node_ofs, key, v),
            Value::Str(s) => self.set_string(node_ofs, key, s),
            Value::Bytes(b) => self.set_bytes(node_ofs, key, b),
            Value::Object(entries) => {
                let nested_ofs = self.set_object(node_ofs, key)?;
                for (k, v) in entries {
                    self.set(nested_ofs, &k, v)?;
                }
                Ok(())
            }
            Value::Array(items) => {
                let nested_ofs = self.set_array(node_ofs, key)?;
                for v in items {
                    self.append(nested_ofs, v)?;
                }
                Ok(())
            }
        }
    }

    /// Auto-dispatching append: appends `value` to the ARRAY rooted at
    /// `node_ofs`, recursing into nested OBJECT/ARRAY values.
    pub fn append(&mut self, node_ofs: u32, value: Value) -> Result<()> {
        match value {
            Value::Null => self.append_null(node_ofs),
            Value::Bool(b) => self.append_bool(node_ofs, b),
            Value::I64(v) => self.append_i64(node_ofs, v),
            Value::F64(v) => self.append_f64(node_ofs, v),
            Value::Str(s) => self.append_string(node_ofs, s),
            Value::Bytes(b) => self.append_bytes(node_ofs, b),
            Value::Object(entries) => {
                let nested_ofs = self.append_object(node_ofs)?;
                for (k, v) in entries {
                    self.set(nested_ofs, &k, v)?;
                }
                Ok(())
            }
            Value::Array(items) => {
                let nested_ofs = self.append_array(node_ofs)?;
                for v in items {
                    self.append(nested_ofs, v)?;
                }
                Ok(())
            }
        }
    }

    /// Projects the value rooted at `node_ofs` to a [`serde_json::Value`]
    /// tree.
    pub fn to_json(&self, node_ofs: u32) -> Result<serde_json::Value> {
        let ty = self.node_type(node_ofs)?;
        traverse::to_json(&self.arena, node_ofs, ty)
    }

    /// Builds a fresh handle from a [`serde_json::Value`] tree. `json` must
    /// be an object or array at the top level.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let ty = match json {
            serde_json::Value::Object(_) => NodeType::Object,
            serde_json::Value::Array(_) => NodeType::Array,
            other => {
                return Err(Lite3Error::InvalidArgument(format!(
                    "from_json root must be an object or array, got {}",
                    other
                )))
            }
        };
        let mut handle = Self::init_with(ty, DEFAULT_CAPACITY);
        let root_ofs = handle.root_ofs;
        traverse::from_json(&mut handle.arena, root_ofs, json)?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lap_complete_event_overwrite_is_in_place() {
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
    fn nested_headers_object_is_reachable_by_offset() {
        let mut doc = Lite3::init_object();
        let root = doc.root();
        let headers = doc.set_object(root, "headers").unwrap();
        doc.set_string(headers, "content-type", "application/json").unwrap();
        doc.set_string(headers, "x-request-id", "req_9f8e2a").unwrap();
        doc.set_string(headers, "user-agent", "curl/8.1.2").unwrap();

        match doc.get(root, "headers").unwrap().unwrap() {
            Decoded::Nested(ofs, NodeType::Object) => {
                assert_eq!(
                    doc.get(ofs, "user-agent").unwrap(),
                    Some(Decoded::Str("curl/8.1.2".into()))
                );
            }
            other => panic!("expected nested object, got {:?}", other),
        }
    }

    #[test]
    fn array_of_mixed_types_via_generic_append() {
        let mut doc = Lite3::init_array();
        let root = doc.root();
        doc.append(root, Value::I64(1)).unwrap();
        doc.append(root, Value::Str("two".into())).unwrap();
        doc.append(root, Value::Bool(true)).unwrap();
        doc.append(root, Value::Null).unwrap();
        doc.append(
            root,
            Value::Object(vec![("nested".into(), Value::Str("object".into()))]),
        )
        .unwrap();

        assert_eq!(doc.size(root), 5);
        assert_eq!(
            doc.to_json(root).unwrap(),
            serde_json::json!([1, "two", true, null, {"nested": "object"}])
        );
    }

    #[test]
    fn big_integer_round_trips_losslessly() {
        let mut doc = Lite3::init_object();
        let root = doc.root();
        let big = i64::MAX - 7;
        doc.set_i64(root, "counter", big).unwrap();
        assert_eq!(doc.get(root, "counter").unwrap(), Some(Decoded::I64(big)));
    }

    #[test]
    fn thirty_four_keys_force_multiple_splits_and_stay_shallow() {
        let mut doc = Lite3::init_object();
        let root = doc.root();
        for i in 0..34 {
            doc.set_i64(root, &format!("k{}", i), i as i64).unwrap();
        }
        assert_eq!(doc.size(root), 34);
        for i in 0..34 {
            assert_eq!(
                doc.get(root, &format!("k{}", i)).unwrap(),
                Some(Decoded::I64(i as i64))
            );
        }
    }

    #[test]
    fn five_byte_binary_round_trips() {
        let mut doc = Lite3::init_object();
        let root = doc.root();
        let blob = vec![0xde, 0xad, 0xbe, 0xef, 0x01];
        doc.set_bytes(root, "blob", blob.clone()).unwrap();
        assert_eq!(doc.get(root, "blob").unwrap(), Some(Decoded::Bytes(blob)));
    }

    #[test]
    fn from_buffer_round_trips_via_to_json() {
        let mut doc = Lite3::init_object();
        let root = doc.root();
        doc.set_string(root, "a", "b").unwrap();
        let length = doc.buffer().len() as u32;
        let bytes = doc.buffer().to_vec();

        let reopened = Lite3::from_buffer(bytes, length);
        assert_eq!(
            reopened.to_json(reopened.root()).unwrap(),
            doc.to_json(root).unwrap()
        );
    }

    #[test]
    fn from_json_then_to_json_is_deep_equal_modulo_key_order() {
        let original = serde_json::json!({"a": 1, "b": [true, null, "x"], "c": {"d": 2.5}});
        let doc = Lite3::from_json(&original).unwrap();
        assert_eq!(doc.to_json(doc.root()).unwrap(), original);
    }
}
