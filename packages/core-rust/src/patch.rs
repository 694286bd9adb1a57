//! JSON Merge Patch (RFC 7386) over decoded values.
//!
//! A patch object updates the fields it names, removes the ones it sets to
//! null and leaves the rest alone. Any other patch value replaces the target
//! wholesale. Mappings with string keys patch the same way as objects.

use std::collections::BTreeMap;

use crate::types::Value;

/// Applies `patch` to `target`, returning the patched value.
#[must_use]
pub fn merge_patch(target: &Value, patch: &Value) -> Value {
    match patch {
        Value::Object(changes) => {
            let mut fields = match target {
                Value::Object(fields) => fields.clone(),
                Value::Map(entries) => string_keyed(entries),
                _ => BTreeMap::new(),
            };
            for (name, change) in changes {
                apply(&mut fields, name, change);
            }
            Value::Object(fields)
        }
        Value::Map(changes) if changes.iter().all(|(k, _)| k.as_str().is_some()) => {
            let mut entries = match target {
                Value::Map(entries) => entries.clone(),
                Value::Object(fields) => fields
                    .iter()
                    .map(|(k, v)| (Value::String(k.clone()), v.clone()))
                    .collect(),
                _ => Vec::new(),
            };
            for (key, change) in changes {
                let at = entries.iter().position(|(k, _)| k == key);
                match (at, change) {
                    (Some(at), Value::Null) => {
                        entries.remove(at);
                    }
                    (None, Value::Null) => {}
                    (Some(at), _) => entries[at].1 = merge_patch(&entries[at].1, change),
                    (None, _) => entries.push((key.clone(), merge_patch(&Value::Null, change))),
                }
            }
            Value::Map(entries)
        }
        _ => patch.clone(),
    }
}

fn apply(fields: &mut BTreeMap<String, Value>, name: &str, change: &Value) {
    if change.is_null() {
        fields.remove(name);
        return;
    }
    let current = fields.remove(name).unwrap_or(Value::Null);
    fields.insert(name.to_string(), merge_patch(&current, change));
}

fn string_keyed(entries: &[(Value, Value)]) -> BTreeMap<String, Value> {
    entries
        .iter()
        .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.clone())))
        .collect()
}
