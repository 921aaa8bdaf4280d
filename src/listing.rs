//! Normalization of heterogeneous listing responses
//!
//! The object-store API has answered listings in several shapes over time.
//! Recognizers are tried in a fixed order:
//!
//! 1. a JSON array of descriptor objects or bare strings
//! 2. an object wrapping such an array under one of [`WRAPPER_FIELDS`]
//! 3. any other object, whose keys are taken as names
//!
//! Anything else is a [`ProxyError::Listing`].

use serde_json::{Map, Value};

use crate::types::ObjectDescriptor;
use crate::{ProxyError, Result};

/// Wrapper fields checked, in order, for an embedded listing array
pub const WRAPPER_FIELDS: [&str; 3] = ["objects", "contents", "buckets"];

/// Normalize an object listing body into descriptors
pub fn normalize_objects(body: &Value) -> Result<Vec<ObjectDescriptor>> {
    match body {
        Value::Array(items) => normalize_array(items),
        Value::Object(map) => match wrapped_array(map) {
            Some(items) => normalize_array(items),
            None => Ok(map
                .iter()
                .map(|(name, raw)| ObjectDescriptor {
                    name: name.clone(),
                    size: raw.get("size").and_then(Value::as_u64),
                    raw: raw.clone(),
                })
                .collect()),
        },
        other => Err(ProxyError::Listing(format!(
            "unrecognized listing shape: {}",
            shape_name(other)
        ))),
    }
}

/// Normalize a bucket listing body into bucket names
pub fn normalize_buckets(body: &Value) -> Result<Vec<String>> {
    Ok(normalize_objects(body)?
        .into_iter()
        .map(|descriptor| descriptor.name)
        .collect())
}

fn wrapped_array(map: &Map<String, Value>) -> Option<&Vec<Value>> {
    WRAPPER_FIELDS
        .iter()
        .find_map(|field| map.get(*field).and_then(Value::as_array))
}

fn normalize_array(items: &[Value]) -> Result<Vec<ObjectDescriptor>> {
    items.iter().map(normalize_entry).collect()
}

fn normalize_entry(item: &Value) -> Result<ObjectDescriptor> {
    match item {
        Value::String(name) => Ok(ObjectDescriptor {
            name: name.clone(),
            size: None,
            raw: item.clone(),
        }),
        Value::Number(n) => Ok(ObjectDescriptor {
            name: n.to_string(),
            size: None,
            raw: item.clone(),
        }),
        Value::Object(map) => {
            let name = ["name", "key"]
                .iter()
                .find_map(|field| map.get(*field).and_then(Value::as_str))
                .ok_or_else(|| {
                    ProxyError::Listing(format!(
                        "listing entry has neither 'name' nor 'key': {item}"
                    ))
                })?;
            let size = map.get("size").and_then(|size| match size {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            });
            Ok(ObjectDescriptor {
                name: name.to_string(),
                size,
                raw: item.clone(),
            })
        }
        other => Err(ProxyError::Listing(format!(
            "unrecognized listing entry: {}",
            shape_name(other)
        ))),
    }
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
