//! Coercion of loosely-shaped field lists into [`Field`] values.
//!
//! Clients send fields in several shapes: a JSON array, a JSON-encoded
//! string of an array, a one-element array holding such a string, or an
//! array mixing objects and JSON-encoded object strings. Entries that do not
//! yield an object with a non-empty `id` and `type` are dropped, as are later
//! entries repeating an earlier `id`.

use std::collections::HashSet;

use serde_json::{Map, Value};

use formhub_core::DomainError;

use crate::field::{Field, FieldConstraints, FieldKind};

/// Normalize a raw field list. Fails when nothing valid survives.
pub fn normalize_fields(raw: &Value) -> Result<Vec<Field>, DomainError> {
    let entries = unwrap_entries(raw)?;

    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(entries.len());
    for entry in &entries {
        match normalize_field(entry) {
            NormalizedField::Valid(field) if seen.insert(field.id.clone()) => fields.push(field),
            NormalizedField::Valid(field) => {
                tracing::debug!(field_id = %field.id, "dropping duplicate field")
            }
            NormalizedField::Invalid(reason) => tracing::debug!(%reason, "dropping field entry"),
        }
    }

    if fields.is_empty() {
        return Err(DomainError::validation("form must contain at least one valid field"));
    }
    Ok(fields)
}

fn unwrap_entries(raw: &Value) -> Result<Vec<Value>, DomainError> {
    let not_a_list = || DomainError::validation("fields must be a list");

    let list = match raw {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => items,
            _ => return Err(not_a_list()),
        },
        Value::Array(items) => items.clone(),
        _ => return Err(not_a_list()),
    };

    // `["[{...}, {...}]"]`: a single encoded list wrapped in an array.
    if let [Value::String(s)] = list.as_slice() {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(s) {
            return Ok(items);
        }
    }
    Ok(list)
}

/// Result of coercing one entry.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedField {
    Valid(Field),
    Invalid(String),
}

impl NormalizedField {
    pub fn valid(self) -> Option<Field> {
        match self {
            NormalizedField::Valid(field) => Some(field),
            NormalizedField::Invalid(_) => None,
        }
    }
}

/// Coerce a single entry.
pub fn normalize_field(entry: &Value) -> NormalizedField {
    let invalid = |reason: &str| NormalizedField::Invalid(reason.to_string());

    let parsed;
    let obj = match entry {
        Value::Object(obj) => obj,
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(obj)) => {
                parsed = obj;
                &parsed
            }
            _ => return invalid("string entry is not an encoded object"),
        },
        _ => return invalid("entry is not an object"),
    };

    let Some(id) = obj.get("id").and_then(scalar_string).filter(|id| !id.is_empty()) else {
        return invalid("missing id");
    };
    let Some(kind) = obj
        .get("type")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|k| !k.is_empty())
    else {
        return invalid("missing type");
    };

    NormalizedField::Valid(Field {
        id,
        kind: FieldKind::from(kind.to_string()),
        label: text(obj, "label"),
        placeholder: text(obj, "placeholder"),
        required: obj.get("required") == Some(&Value::Bool(true)),
        default_value: obj.get("defaultValue").and_then(scalar_string).unwrap_or_default(),
        options: obj
            .get("options")
            .and_then(Value::as_array)
            .map(|opts| opts.iter().filter_map(scalar_string).collect())
            .unwrap_or_default(),
        constraints: FieldConstraints {
            min: obj.get("min").and_then(number),
            max: obj.get("max").and_then(number),
            min_length: obj.get("minLength").and_then(length),
            max_length: obj.get("maxLength").and_then(length),
            min_date: non_empty(obj, "minDate"),
            max_date: non_empty(obj, "maxDate"),
            pattern: non_empty(obj, "pattern"),
        },
    })
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .unwrap_or_default()
}

fn non_empty(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) if !s.trim().is_empty() => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn length(v: &Value) -> Option<u64> {
    let n = number(v)?;
    (n >= 0.0 && n.fract() == 0.0).then_some(n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_array_is_kept() {
        let fields = normalize_fields(&json!([
            {"id": "name", "type": "text", "label": "Name", "required": true},
            {"id": "age", "type": "number", "min": "18", "max": 99}
        ]))
        .unwrap();
        assert_eq!(fields.len(), 2);
        assert!(fields[0].required);
        assert_eq!(fields[1].constraints.min, Some(18.0));
        assert_eq!(fields[1].constraints.max, Some(99.0));
    }

    #[test]
    fn encoded_list_string_is_parsed() {
        let raw = json!(r#"[{"id":"a","type":"email"}]"#);
        let fields = normalize_fields(&raw).unwrap();
        assert_eq!(fields[0].kind, FieldKind::Email);
    }

    #[test]
    fn single_wrapped_encoded_list_is_parsed() {
        let raw = json!([r#"[{"id":"a","type":"text"},{"id":"b","type":"date"}]"#]);
        assert_eq!(normalize_fields(&raw).unwrap().len(), 2);
    }

    #[test]
    fn encoded_entries_are_parsed_and_garbage_dropped() {
        let raw = json!([
            r#"{"id":"a","type":"text"}"#,
            "not json",
            42,
            {"type": "text"},
            {"id": "b"},
            {"id": "c", "type": "radio", "options": ["x", 2, null]}
        ]);
        let fields = normalize_fields(&raw).unwrap();
        let ids: Vec<_> = fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(fields[1].options, vec!["x".to_string(), "2".to_string()]);
    }

    #[test]
    fn required_must_be_literal_true() {
        let f = normalize_field(&json!({"id": "a", "type": "text", "required": "true"}))
            .valid()
            .unwrap();
        assert!(!f.required);
    }

    #[test]
    fn invalid_entries_carry_a_reason() {
        assert_eq!(
            normalize_field(&json!({"type": "text"})),
            NormalizedField::Invalid("missing id".into())
        );
        assert!(matches!(normalize_field(&json!(7)), NormalizedField::Invalid(_)));
    }

    #[test]
    fn duplicate_ids_keep_first() {
        let fields = normalize_fields(&json!([
            {"id": "a", "type": "text", "label": "first"},
            {"id": "a", "type": "text", "label": "second"}
        ]))
        .unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].label, "first");
    }

    #[test]
    fn nothing_valid_is_a_validation_error() {
        let err = normalize_fields(&json!(["nope", {"label": "x"}])).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(normalize_fields(&json!([])).is_err());
        assert!(normalize_fields(&json!({"id": "a"})).is_err());
    }

    #[test]
    fn bad_lengths_are_dropped() {
        let f = normalize_field(&json!({
            "id": "a", "type": "text", "minLength": -1, "maxLength": "2.5"
        }))
        .valid()
        .unwrap();
        assert_eq!(f.constraints.min_length, None);
        assert_eq!(f.constraints.max_length, None);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_json() -> impl Strategy<Value = Value> {
            let leaf = prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(|n| json!(n)),
                "[a-z{}\\[\\]\":, ]{0,16}".prop_map(Value::String),
            ];
            leaf.prop_recursive(3, 24, 6, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                    prop::collection::hash_map("(id|type|label|min|options)", inner, 0..5)
                        .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            })
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 512,
                ..ProptestConfig::default()
            })]

            /// Property: any surviving field has a non-empty, unique id and kind.
            #[test]
            fn survivors_are_well_formed(raw in arb_json()) {
                if let Ok(fields) = normalize_fields(&raw) {
                    let mut ids = HashSet::new();
                    for f in &fields {
                        prop_assert!(!f.id.is_empty());
                        prop_assert!(!f.kind.as_str().is_empty());
                        prop_assert!(ids.insert(f.id.clone()));
                    }
                    prop_assert!(!fields.is_empty());
                }
            }

            /// Property: normalizing already-normalized fields is a no-op.
            #[test]
            fn normalization_is_idempotent(raw in arb_json()) {
                if let Ok(fields) = normalize_fields(&raw) {
                    let again = normalize_fields(&serde_json::to_value(&fields).unwrap()).unwrap();
                    prop_assert_eq!(fields, again);
                }
            }
        }
    }
}
