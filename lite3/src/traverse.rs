// Copyright 2019-2020 PolkaX Authors. Licensed under GPL-3.0.

//! In-order enumeration and JSON projection.
//!
//! Enumeration order is hash-ascending, not insertion order: for an ARRAY
//! the hash IS the index, so this also happens to walk elements in their
//! natural 0..N-1 order; for an OBJECT it is simply whatever order the DJB2
//! hashes of the keys sort into.
//!
//! Every public entry point here snapshots the root's generation counter
//! before walking and checks it again after. A buffer has a single writer,
//! so this only catches reentrancy through a callback, and is reported as
//! `bad_message` rather than silently returning a partial or torn view.

use base64::encode as base64_encode;
use serde_json::{Map, Number, Value as Json};

use crate::arena::Arena;
use crate::error::{Lite3Error, Result};
use crate::node::{self, NodeType};
use crate::value::{self, Scalar, ValueRead};

fn collect_in_order(buf: &[u8], node_ofs: u32, out: &mut Vec<(u32, u32)>) {
    let kc = node::key_count(buf, node_ofs);
    for i in 0..=kc {
        if !node::is_leaf(buf, node_ofs) {
            collect_in_order(buf, node::child_ofs_at(buf, node_ofs, i), out);
        }
        if i < kc {
            out.push((node::hash_at(buf, node_ofs, i), node::kv_ofs_at(buf, node_ofs, i)));
        }
    }
}

fn with_generation_fence<T>(
    arena: &Arena,
    root_ofs: u32,
    f: impl FnOnce(&Arena) -> Result<T>,
) -> Result<T> {
    let gen_before = node::generation(arena.raw(), root_ofs);
    let result = f(arena)?;
    let gen_after = node::generation(arena.raw(), root_ofs);
    if gen_before != gen_after {
        return Err(Lite3Error::BadMessage(format!(
            "root {} was mutated during traversal (generation {} -> {})",
            root_ofs, gen_before, gen_after
        )));
    }
    Ok(result)
}

/// Enumerates an OBJECT's entries in hash-ascending order as `(key,
/// value_ofs)` pairs.
pub fn entries(arena: &Arena, root_ofs: u32) -> Result<Vec<(String, u32)>> {
    with_generation_fence(arena, root_ofs, |arena| {
        let mut raw = Vec::new();
        collect_in_order(arena.raw(), root_ofs, &mut raw);
        raw.into_iter()
            .map(|(_, payload_ofs)| {
                let entry = value::read_key(arena, payload_ofs)?;
                Ok((entry.key, entry.value_ofs))
            })
            .collect()
    })
}

/// Enumerates an ARRAY's elements in index order as value offsets.
pub fn items(arena: &Arena, root_ofs: u32) -> Result<Vec<u32>> {
    with_generation_fence(arena, root_ofs, |arena| {
        let mut raw = Vec::new();
        collect_in_order(arena.raw(), root_ofs, &mut raw);
        Ok(raw.into_iter().map(|(_, value_ofs)| value_ofs).collect())
    })
}

fn scalar_to_json(scalar: Scalar) -> Result<Json> {
    Ok(match scalar {
        Scalar::Null => Json::Null,
        Scalar::Bool(b) => Json::Bool(b),
        Scalar::I64(v) => Json::Number(Number::from(v)),
        Scalar::F64(v) => Number::from_f64(v)
            .map(Json::Number)
            .ok_or_else(|| Lite3Error::BadMessage(format!("f64 {} is not JSON-representable", v)))?,
        Scalar::Bytes(b) => Json::String(base64_encode(&b)),
        Scalar::Str(s) => Json::String(s),
    })
}

/// Projects the value rooted at `node_ofs` (of type `ty`) to a
/// [`serde_json::Value`] tree.
pub fn to_json(arena: &Arena, node_ofs: u32, ty: NodeType) -> Result<Json> {
    match ty {
        NodeType::Object => {
            let mut map = Map::new();
            for (key, value_ofs) in entries(arena, node_ofs)? {
                let (read, scalar) = value::read_value(arena, value_ofs)?;
                let json_value = match read {
                    ValueRead::Scalar => scalar_to_json(scalar.expect("scalar payload"))?,
                    ValueRead::Nested(nested_ofs, nested_ty) => {
                        to_json(arena, nested_ofs, nested_ty)?
                    }
                };
                map.insert(key, json_value);
            }
            Ok(Json::Object(map))
        }
        NodeType::Array => {
            let mut seq = Vec::new();
            for value_ofs in items(arena, node_ofs)? {
                let (read, scalar) = value::read_value(arena, value_ofs)?;
                let json_value = match read {
                    ValueRead::Scalar => scalar_to_json(scalar.expect("scalar payload"))?,
                    ValueRead::Nested(nested_ofs, nested_ty) => {
                        to_json(arena, nested_ofs, nested_ty)?
                    }
                };
                seq.push(json_value);
            }
            Ok(Json::Array(seq))
        }
    }
}

fn number_to_scalar(n: &Number) -> Scalar {
    if let Some(i) = n.as_i64() {
        Scalar::I64(i)
    } else {
        Scalar::F64(n.as_f64().unwrap_or(0.0))
    }
}

/// Populates the already-initialized OBJECT/ARRAY rooted at `root_ofs` from
/// `json`. `root_ofs` must already have been `init_node`'d with a type
/// matching `json`'s shape.
pub fn from_json(arena: &mut Arena, root_ofs: u32, json: &Json) -> Result<()> {
    match json {
        Json::Object(map) => {
            for (key, v) in map {
                set_json_value(arena, root_ofs, Some(key), v)?;
            }
            Ok(())
        }
        Json::Array(items) => {
            for v in items {
                set_json_value(arena, root_ofs, None, v)?;
            }
            Ok(())
        }
        other => Err(Lite3Error::InvalidArgument(format!(
            "from_json root must be an object or array, got {}",
            other
        ))),
    }
}

fn set_json_value(arena: &mut Arena, root_ofs: u32, key: Option<&str>, v: &Json) -> Result<()> {
    match v {
        Json::Object(map) => {
            let nested_ofs = match key {
                Some(k) => {
                    arena.ensure_space(value::nested_set_reservation(k))?;
                    value::set_nested(arena, root_ofs, k, NodeType::Object)?
                }
                None => {
                    arena.ensure_space(value::nested_append_reservation())?;
                    value::append_nested(arena, root_ofs, NodeType::Object)?
                }
            };
            from_json(arena, nested_ofs, v)
        }
        Json::Array(_) => {
            let nested_ofs = match key {
                Some(k) => {
                    arena.ensure_space(value::nested_set_reservation(k))?;
                    value::set_nested(arena, root_ofs, k, NodeType::Array)?
                }
                None => {
                    arena.ensure_space(value::nested_append_reservation())?;
                    value::append_nested(arena, root_ofs, NodeType::Array)?
                }
            };
            from_json(arena, nested_ofs, v)
        }
        scalar_json => {
            let scalar = match scalar_json {
                Json::Null => Scalar::Null,
                Json::Bool(b) => Scalar::Bool(*b),
                Json::Number(n) => number_to_scalar(n),
                Json::String(s) => Scalar::Str(s.clone()),
                _ => unreachable!("object/array handled above"),
            };
            match key {
                Some(k) => {
                    arena.ensure_space(value::scalar_set_reservation(k, &scalar))?;
                    value::set_scalar(arena, root_ofs, k, scalar)
                }
                None => {
                    arena.ensure_space(value::scalar_append_reservation(&scalar))?;
                    value::append_scalar(arena, root_ofs, scalar)
                }
            }
        }
    }
}
