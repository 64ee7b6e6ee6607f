//! Decoding of batch responses into per-item outcomes
//!
//! Stores answer a batch write either with an array aligned to the request or
//! with a structure keyed by item id. Both shapes are reduced to one
//! [`DispatchOutcome`] per request item, in request order.

use crate::core::batch::{DispatchOutcome, ItemError};
use crate::utils::error::{BatchError, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Decode a batch response.
///
/// `keys` holds the id of each request item in order (`None` when the item
/// has no addressable id). Arrays whose entries all carry ids are matched by
/// id when every key is known, otherwise positionally. Objects are read as
/// `results`/`objects` wrappers or as id-keyed maps.
pub fn decode_outcomes(body: &Value, keys: &[Option<String>]) -> Result<Vec<DispatchOutcome>> {
    match body {
        Value::Array(entries) => decode_array(entries, keys),
        Value::Object(map) => {
            for wrapper in ["results", "objects", "references"] {
                if let Some(Value::Array(entries)) = map.get(wrapper) {
                    return decode_array(entries, keys);
                }
            }
            decode_keyed(map, keys)
        }
        Value::Null if keys.is_empty() => Ok(Vec::new()),
        other => Err(BatchError::parsing(format!(
            "Unexpected batch response shape: {}",
            type_name(other)
        ))),
    }
}

fn decode_array(entries: &[Value], keys: &[Option<String>]) -> Result<Vec<DispatchOutcome>> {
    let ids: Option<Vec<String>> = entries.iter().map(entry_id).collect();
    let all_keyed = keys.iter().all(Option::is_some);

    match ids {
        Some(ids) if all_keyed && !entries.is_empty() => {
            let by_id: HashMap<String, &Value> = ids.into_iter().zip(entries.iter()).collect();
            keys.iter()
                .map(|key| {
                    let key = key.as_deref().map(normalize_id).unwrap_or_default();
                    by_id
                        .get(&key)
                        .map(|entry| outcome_from_entry(entry))
                        .ok_or_else(|| {
                            BatchError::parsing(format!("Response is missing item {}", key))
                        })
                })
                .collect()
        }
        _ => {
            if entries.len() != keys.len() {
                return Err(BatchError::parsing(format!(
                    "Response carries {} results for {} items",
                    entries.len(),
                    keys.len()
                )));
            }
            Ok(entries.iter().map(outcome_from_entry).collect())
        }
    }
}

fn decode_keyed(
    map: &serde_json::Map<String, Value>,
    keys: &[Option<String>],
) -> Result<Vec<DispatchOutcome>> {
    let by_id: HashMap<String, &Value> = map.iter().map(|(k, v)| (normalize_id(k), v)).collect();

    keys.iter()
        .enumerate()
        .map(|(position, key)| {
            let key = key.as_deref().ok_or_else(|| {
                BatchError::parsing(format!(
                    "Id-keyed response cannot address item at position {}",
                    position
                ))
            })?;
            by_id
                .get(&normalize_id(key))
                .map(|entry| outcome_from_entry(entry))
                .ok_or_else(|| BatchError::parsing(format!("Response is missing item {}", key)))
        })
        .collect()
}

fn entry_id(entry: &Value) -> Option<String> {
    entry.get("id").and_then(Value::as_str).map(normalize_id)
}

fn normalize_id(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}

/// Outcome of a single response entry
pub fn outcome_from_entry(entry: &Value) -> DispatchOutcome {
    let mut errors = Vec::new();

    if let Some(result) = entry.get("result") {
        if let Some(found) = result.get("errors") {
            collect_errors(found, &mut errors);
        }
        if let Some(found) = result.get("error") {
            collect_errors(found, &mut errors);
        }
    }
    if let Some(found) = entry.get("errors") {
        collect_errors(found, &mut errors);
    }
    if let Some(found) = entry.get("error") {
        collect_errors(found, &mut errors);
    }

    if errors.is_empty() {
        return DispatchOutcome::Success;
    }

    let code = errors.iter().find_map(|e| e.code.clone());
    let message = errors
        .into_iter()
        .map(|e| e.message)
        .collect::<Vec<_>>()
        .join("; ");
    DispatchOutcome::Error(ItemError { message, code })
}

fn collect_errors(value: &Value, out: &mut Vec<ItemError>) {
    match value {
        Value::Null => {}
        Value::String(message) if !message.is_empty() => out.push(ItemError::new(message.clone())),
        Value::Array(items) => items.iter().for_each(|item| collect_errors(item, out)),
        Value::Object(map) => {
            if let Some(nested) = map.get("error") {
                collect_errors(nested, out);
                return;
            }
            if let Some(message) = map.get("message").and_then(Value::as_str) {
                let code = map.get("code").and_then(|code| match code {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                });
                out.push(ItemError {
                    message: message.to_string(),
                    code,
                });
            }
        }
        _ => {}
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
