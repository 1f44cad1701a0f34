//! The schema-validation capability seam.
//!
//! The engine consumes validation as a black box: `validate` says pass or
//! fail with detail, `generate` produces a value satisfying a schema. The
//! core never inspects schema internals beyond these calls.
//!
//! `BasicValidator` is a small structural validator over JSON schemas of the
//! form used by the demo contracts and the test suites:
//!
//! - scalar types: `"string" | "number" | "integer" | "boolean" | "null" |
//!   "any"`; a trailing `?` (e.g. `"string?"`) also admits null.
//! - unions: `["string", "number"]` accepts any listed alternative.
//! - arrays: `{"$array": T}`.
//! - objects: `{"field": T, ...}` with exactly these fields; a key ending
//!   in `?` marks the field optional. Unknown fields fail.

use serde_json::{json, Map, Value as JsonValue};

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Pass,
    Fail(Vec<JsonValue>),
}

impl ValidationOutcome {
    pub fn failed(&self) -> bool {
        matches!(self, ValidationOutcome::Fail(_))
    }

    pub fn into_errors(self) -> Vec<JsonValue> {
        match self {
            ValidationOutcome::Pass => Vec::new(),
            ValidationOutcome::Fail(errors) => errors,
        }
    }
}

pub trait SchemaValidator: Send + Sync {
    fn validate(&self, schema: &JsonValue, value: &JsonValue) -> ValidationOutcome;

    /// Produces a value that satisfies `schema`; used by tooling and tests.
    fn generate(&self, schema: &JsonValue) -> JsonValue;
}

/// Accepts everything. Useful when validation is handled elsewhere.
pub struct NoValidation;

impl SchemaValidator for NoValidation {
    fn validate(&self, _schema: &JsonValue, _value: &JsonValue) -> ValidationOutcome {
        ValidationOutcome::Pass
    }

    fn generate(&self, _schema: &JsonValue) -> JsonValue {
        JsonValue::Null
    }
}

pub struct BasicValidator;

impl BasicValidator {
    fn fail(path: &str, expected: &str, got: &JsonValue) -> JsonValue {
        json!({ "path": path, "expected": expected, "got": got })
    }

    fn check_scalar(name: &str, value: &JsonValue) -> bool {
        match name {
            "any" => true,
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "null" => value.is_null(),
            _ => false,
        }
    }

    fn check(schema: &JsonValue, value: &JsonValue, path: &str, errors: &mut Vec<JsonValue>) {
        match schema {
            JsonValue::String(name) => {
                let (base, optional) = match name.strip_suffix('?') {
                    Some(base) => (base, true),
                    None => (name.as_str(), false),
                };
                if optional && value.is_null() {
                    return;
                }
                if !Self::check_scalar(base, value) {
                    errors.push(Self::fail(path, base, value));
                }
            }
            JsonValue::Array(alternatives) => {
                let ok = alternatives.iter().any(|alt| {
                    let mut scratch = Vec::new();
                    Self::check(alt, value, path, &mut scratch);
                    scratch.is_empty()
                });
                if !ok {
                    errors.push(Self::fail(path, "one of the alternatives", value));
                }
            }
            JsonValue::Object(map) if map.contains_key("$array") => match value {
                JsonValue::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        Self::check(&map["$array"], item, &format!("{}[{}]", path, i), errors);
                    }
                }
                other => errors.push(Self::fail(path, "array", other)),
            },
            JsonValue::Object(fields) => match value {
                JsonValue::Object(object) => {
                    for (key, sub) in fields {
                        let (field, optional) = match key.strip_suffix('?') {
                            Some(base) => (base, true),
                            None => (key.as_str(), false),
                        };
                        match object.get(field) {
                            Some(v) => Self::check(sub, v, &format!("{}.{}", path, field), errors),
                            None if optional => {}
                            None => errors.push(Self::fail(
                                &format!("{}.{}", path, field),
                                "required field",
                                &JsonValue::Null,
                            )),
                        }
                    }
                    for key in object.keys() {
                        let known = fields.contains_key(key)
                            || fields.contains_key(&format!("{}?", key));
                        if !known {
                            errors.push(Self::fail(
                                &format!("{}.{}", path, key),
                                "no such field",
                                &object[key],
                            ));
                        }
                    }
                }
                other => errors.push(Self::fail(path, "object", other)),
            },
            other => errors.push(Self::fail(path, "valid schema node", other)),
        }
    }
}

impl SchemaValidator for BasicValidator {
    fn validate(&self, schema: &JsonValue, value: &JsonValue) -> ValidationOutcome {
        let mut errors = Vec::new();
        Self::check(schema, value, "$", &mut errors);
        if errors.is_empty() {
            ValidationOutcome::Pass
        } else {
            ValidationOutcome::Fail(errors)
        }
    }

    fn generate(&self, schema: &JsonValue) -> JsonValue {
        match schema {
            JsonValue::String(name) => match name.trim_end_matches('?') {
                "string" => json!(""),
                "number" | "integer" => json!(0),
                "boolean" => json!(false),
                _ => JsonValue::Null,
            },
            JsonValue::Array(alternatives) => alternatives
                .first()
                .map(|alt| self.generate(alt))
                .unwrap_or(JsonValue::Null),
            JsonValue::Object(map) if map.contains_key("$array") => json!([]),
            JsonValue::Object(fields) => {
                let mut out = Map::new();
                for (key, sub) in fields {
                    if let Some(base) = key.strip_suffix('?') {
                        let _ = base;
                        continue;
                    }
                    out.insert(key.clone(), self.generate(sub));
                }
                JsonValue::Object(out)
            }
            _ => JsonValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_and_optional_fields() {
        let schema = json!({"name": "string", "age?": "integer"});
        let v = BasicValidator;
        assert_eq!(v.validate(&schema, &json!({"name": "a"})), ValidationOutcome::Pass);
        assert_eq!(v.validate(&schema, &json!({"name": "a", "age": 3})), ValidationOutcome::Pass);
        assert!(v.validate(&schema, &json!({"age": 3})).failed());
        assert!(v.validate(&schema, &json!({"name": 1})).failed());
    }

    #[test]
    fn unknown_fields_fail() {
        let schema = json!({"name": "string"});
        assert!(BasicValidator.validate(&schema, &json!({"name": "a", "x": 1})).failed());
    }

    #[test]
    fn arrays_and_unions() {
        let schema = json!({"$array": {"id": "string"}});
        let v = BasicValidator;
        assert_eq!(v.validate(&schema, &json!([{"id": "a"}])), ValidationOutcome::Pass);
        assert!(v.validate(&schema, &json!([{"id": 1}])).failed());

        let union = json!(["string", "number"]);
        assert_eq!(v.validate(&union, &json!(1.5)), ValidationOutcome::Pass);
        assert!(v.validate(&union, &json!(true)).failed());
    }

    #[test]
    fn generate_produces_passing_values() {
        let schema = json!({"name": "string", "count": "integer", "tags": {"$array": "string"}});
        let v = BasicValidator;
        let generated = v.generate(&schema);
        assert_eq!(v.validate(&schema, &generated), ValidationOutcome::Pass);
    }
}
