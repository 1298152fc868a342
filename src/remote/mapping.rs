//! Field-name mapping between the local `camelCase` records and the remote
//! `snake_case` columns.

use super::Entity;
use serde_json::{Map, Value};

/// `dueDate` → `due_date`.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `due_date` → `dueDate`.
pub fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn rename_keys(value: &Value, rename: fn(&str) -> String) -> Value {
    match value {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (rename(k), v.clone()))
                .collect::<Map<String, Value>>(),
        ),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Array(_) => value.clone(),
    }
}

/// Local record → remote row. The owner column is added by the caller.
pub fn to_remote(value: &Value) -> Value {
    rename_keys(value, to_snake_case)
}

/// Remote row → local record. Drops the owner column.
pub fn from_remote(entity: Entity, value: &Value) -> Value {
    let mut local = rename_keys(value, to_camel_case);
    if let Value::Object(fields) = &mut local {
        fields.remove("userId");
        match entity {
            // A non-null `blocked` column overrides `is_enabled`.
            Entity::BlockedSites => {
                if let Some(blocked) = fields.get("blocked").filter(|v| !v.is_null()).cloned() {
                    fields.insert("isEnabled".into(), blocked);
                }
            }
            Entity::Tasks | Entity::FocusSessions => {}
        }
    }
    local
}
