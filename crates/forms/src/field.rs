use serde::{Deserialize, Serialize};

/// Input widget kind.
///
/// The well-known kinds get their own variant; anything else is carried
/// through verbatim so clients can introduce new widgets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldKind {
    Text,
    Email,
    Number,
    Textarea,
    Checkbox,
    Radio,
    Select,
    Date,
    Other(String),
}

impl FieldKind {
    pub fn as_str(&self) -> &str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Email => "email",
            FieldKind::Number => "number",
            FieldKind::Textarea => "textarea",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Radio => "radio",
            FieldKind::Select => "select",
            FieldKind::Date => "date",
            FieldKind::Other(s) => s,
        }
    }
}

impl From<String> for FieldKind {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "text" => FieldKind::Text,
            "email" => FieldKind::Email,
            "number" => FieldKind::Number,
            "textarea" => FieldKind::Textarea,
            "checkbox" => FieldKind::Checkbox,
            "radio" => FieldKind::Radio,
            "select" => FieldKind::Select,
            "date" => FieldKind::Date,
            _ => FieldKind::Other(value.trim().to_string()),
        }
    }
}

impl From<FieldKind> for String {
    fn from(value: FieldKind) -> Self {
        value.as_str().to_string()
    }
}

/// Optional per-field constraints. Stored and echoed, not enforced on answers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// One input definition inside a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default_value: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(flatten)]
    pub constraints: FieldConstraints,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_kind_is_preserved() {
        let k = FieldKind::from("rating".to_string());
        assert_eq!(k, FieldKind::Other("rating".into()));
        assert_eq!(String::from(k), "rating");
    }

    #[test]
    fn kind_is_case_insensitive() {
        assert_eq!(FieldKind::from(" Email ".to_string()), FieldKind::Email);
    }

    #[test]
    fn field_serializes_with_wire_names() {
        let f = Field {
            id: "f1".into(),
            kind: FieldKind::Number,
            label: "Age".into(),
            placeholder: String::new(),
            required: true,
            default_value: String::new(),
            options: vec![],
            constraints: FieldConstraints {
                min: Some(0.0),
                max_length: Some(3),
                ..FieldConstraints::default()
            },
        };
        let v = serde_json::to_value(&f).unwrap();
        assert_eq!(v["type"], json!("number"));
        assert_eq!(v["defaultValue"], json!(""));
        assert_eq!(v["min"], json!(0.0));
        assert_eq!(v["maxLength"], json!(3));
        assert!(v.get("pattern").is_none());
    }
}
