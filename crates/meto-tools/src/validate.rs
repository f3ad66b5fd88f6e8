// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use jsonschema::validator_for;
use serde_json::Value;

/// Check `args` against a tool's JSON Schema.
///
/// Top-level `null` values count as absent, so an optional parameter the
/// model sends as `null` passes.  Returns a message suitable for the model
/// listing every violation.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    let Some(obj) = args.as_object() else {
        return Err(format!("arguments must be a JSON object, got {}", type_name(args)));
    };
    let instance = Value::Object(obj.iter().filter(|(_, v)| !v.is_null()).map(|(k, v)| (k.clone(), v.clone())).collect());

    let compiled = validator_for(schema).map_err(|e| format!("tool has an invalid parameter schema: {e}"))?;
    let messages: Vec<String> = compiled.iter_errors(&instance).map(|e| e.to_string()).collect();
    if messages.is_empty() {
        Ok(())
    } else {
        Err(messages.join("; "))
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
