//! A default `SchemaDialect` for JSON Schema documents.
//!
//! `registry-core` treats the dialect as an external collaborator: a production deployment
//! plugs in whichever parser/compatibility checker matches its schema format (Avro, JSON Schema,
//! Protobuf). This module provides the JSON Schema one, using `jsonschema` to confirm a submitted
//! schema actually compiles before accepting it, so `registry-service` has something to run with
//! out of the box.

use registry_core::CompatibilityLevel;
use serde_json::Value;

#[derive(Debug, Default)]
pub struct JsonSchemaDialect;

impl registry_core::SchemaDialect for JsonSchemaDialect {
    /// Reparses and re-serializes `schema`, rejecting it unless `jsonschema` can compile it as a
    /// JSON Schema document. Re-serialization is what gives two textually different but logically
    /// equal submissions the same canonical form.
    fn canonicalize(&self, schema: &str) -> Option<String> {
        let value: Value = serde_json::from_str(schema).ok()?;
        jsonschema::JSONSchema::compile(&value).ok()?;
        serde_json::to_string(&value).ok()
    }

    /// A conservative structural check: compatible unless some field `existing` already declares
    /// has changed `type` in `candidate`. This does not implement the full Avro-style BACKWARD /
    /// FORWARD / FULL semantics a mature JSON Schema compatibility checker would (narrowing an
    /// enum, tightening a `required` list, and additional-properties rules are all currently
    /// ignored), but it is enough to reject the obviously-breaking case of a field changing type
    /// under any level stricter than NONE.
    fn is_compatible(&self, level: CompatibilityLevel, candidate: &str, existing: &str) -> bool {
        if level == CompatibilityLevel::None {
            return true;
        }
        let (Ok(candidate), Ok(existing)) = (
            serde_json::from_str::<Value>(candidate),
            serde_json::from_str::<Value>(existing),
        ) else {
            return false;
        };
        fields_compatible(&candidate, &existing)
    }
}

fn fields_compatible(candidate: &Value, existing: &Value) -> bool {
    let (Some(candidate_properties), Some(existing_properties)) = (
        candidate.get("properties").and_then(Value::as_object),
        existing.get("properties").and_then(Value::as_object),
    ) else {
        return candidate == existing;
    };

    for (name, existing_schema) in existing_properties {
        let Some(candidate_schema) = candidate_properties.get(name) else {
            continue;
        };
        if candidate_schema.get("type") != existing_schema.get("type") {
            return false;
        }
    }
    true
}
