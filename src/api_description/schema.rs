//! Turning OpenAPI schema objects into `jsonschema` validators

use std::collections::HashSet;

use jsonschema::{Draft, Validator};
use serde_json::{json, Map, Value};

/// Keywords whose values are data, not schemas
const DATA_KEYWORDS: [&str; 5] = ["example", "examples", "enum", "default", "const"];

/// Inline every local `$ref` of `schema` against `root`.
///
/// A reference that is already being expanded further up collapses to `{}`,
/// so recursive schemas accept anything below the first repetition. With
/// `map_nullable` the OpenAPI 3.0 `nullable` keyword becomes a type union.
pub fn prepare(schema: &Value, root: &Value, map_nullable: bool) -> Value {
    let mut expanding = HashSet::new();
    inline(schema, root, map_nullable, &mut expanding)
}

fn inline(value: &Value, root: &Value, map_nullable: bool, expanding: &mut HashSet<String>) -> Value {
    match value {
        Value::Object(object) => {
            if let Some(reference) = object.get("$ref").and_then(Value::as_str) {
                return inline_reference(reference, object, root, map_nullable, expanding);
            }

            let mut inlined = Map::new();
            for (key, child) in object {
                let child = if SCHEMA_MAP_KEYWORDS.contains(&key.as_str()) {
                    inline_schema_map(child, root, map_nullable, expanding)
                } else if DATA_KEYWORDS.contains(&key.as_str()) {
                    child.clone()
                } else {
                    inline(child, root, map_nullable, expanding)
                };
                inlined.insert(key.clone(), child);
            }

            if map_nullable {
                apply_nullable(inlined)
            } else {
                Value::Object(inlined)
            }
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| inline(item, root, map_nullable, expanding))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Values of these keywords map arbitrary names to schemas
const SCHEMA_MAP_KEYWORDS: [&str; 4] = ["properties", "patternProperties", "definitions", "$defs"];

fn inline_schema_map(value: &Value, root: &Value, map_nullable: bool, expanding: &mut HashSet<String>) -> Value {
    match value {
        Value::Object(entries) => Value::Object(
            entries
                .iter()
                .map(|(name, schema)| (name.clone(), inline(schema, root, map_nullable, expanding)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn inline_reference(
    reference: &str,
    object: &Map<String, Value>,
    root: &Value,
    map_nullable: bool,
    expanding: &mut HashSet<String>,
) -> Value {
    let Some(pointer) = reference.strip_prefix('#') else {
        log::warn!("Only local references are supported, accepting anything for {}", reference);
        return json!({});
    };
    let Some(target) = root.pointer(pointer) else {
        log::warn!("Unresolvable reference {}, accepting anything", reference);
        return json!({});
    };
    if !expanding.insert(reference.to_string()) {
        return json!({});
    }

    let resolved = inline(target, root, map_nullable, expanding);
    expanding.remove(reference);

    let siblings: Map<String, Value> = object
        .iter()
        .filter(|(key, _)| key.as_str() != "$ref")
        .map(|(key, value)| (key.clone(), inline(value, root, map_nullable, expanding)))
        .collect();

    if siblings.is_empty() {
        resolved
    } else {
        let mut combined = siblings;
        combined.insert("allOf".to_string(), Value::Array(vec![resolved]));
        Value::Object(combined)
    }
}

fn apply_nullable(mut object: Map<String, Value>) -> Value {
    let nullable = matches!(object.remove("nullable"), Some(Value::Bool(true)));
    if !nullable {
        return Value::Object(object);
    }

    if let Some(Value::Array(variants)) = object.get_mut("enum") {
        if !variants.contains(&Value::Null) {
            variants.push(Value::Null);
        }
    }

    match object.get("type").cloned() {
        Some(Value::String(kind)) => {
            object.insert("type".to_string(), json!([kind, "null"]));
            Value::Object(object)
        }
        Some(Value::Array(mut kinds)) => {
            if !kinds.contains(&json!("null")) {
                kinds.push(json!("null"));
            }
            object.insert("type".to_string(), Value::Array(kinds));
            Value::Object(object)
        }
        _ => json!({ "anyOf": [{ "type": "null" }, Value::Object(object)] }),
    }
}

pub fn compile(schema: &Value, draft: Draft) -> Result<Validator, String> {
    jsonschema::options()
        .with_draft(draft)
        .build(schema)
        .map_err(|e| format!("invalid schema: {}", e))
}

/// Validate `instance`, joining every violation into one detail string
pub fn check(validator: &Validator, instance: &Value) -> Result<(), String> {
    let errors: Vec<String> = validator.iter_errors(instance).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

/// Turn a raw parameter string into the JSON value its schema expects
pub fn coerce_parameter(raw: &str, schema: &Value) -> Value {
    match schema.get("type").and_then(Value::as_str) {
        Some("integer") => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Some("number") => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        Some("boolean") => match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        Some("array") => {
            let items = schema.get("items").cloned().unwrap_or_else(|| json!({}));
            Value::Array(raw.split(',').map(|part| coerce_parameter(part, &items)).collect())
        }
        _ => Value::String(raw.to_string()),
    }
}
