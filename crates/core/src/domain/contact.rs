use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::call::digits_only;
use crate::domain::null_as_default;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(pub i64);

impl std::fmt::Display for ContactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(pub i64);

/// One value of a custom field. Attributes the pipeline does not interpret (`enum_code`,
/// `subtype`, ...) ride along in `extra` so an update can send them back untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldValue {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_id: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CustomFieldValue {
    pub fn new(value: impl Into<String>, enum_id: Option<i64>) -> Self {
        Self { value: Value::String(value.into()), enum_id, extra: Map::new() }
    }

    pub fn as_text(&self) -> String {
        match &self.value {
            Value::String(text) => text.clone(),
            Value::Number(number) => number.to_string(),
            Value::Bool(flag) => flag.to_string(),
            Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldValues {
    pub field_id: FieldId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub values: Vec<CustomFieldValue>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CustomFieldValues {
    pub fn single(field_id: FieldId, value: CustomFieldValue) -> Self {
        Self { field_id, values: vec![value], extra: Map::new() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub custom_fields_values: Option<Vec<CustomFieldValues>>,
}

impl Contact {
    pub fn custom_fields(&self) -> &[CustomFieldValues] {
        self.custom_fields_values.as_deref().unwrap_or_default()
    }

    /// Whether any custom field value, reduced to digits, equals `digits` exactly.
    pub fn has_phone_digits(&self, digits: &str) -> bool {
        self.custom_fields()
            .iter()
            .flat_map(|field| field.values.iter())
            .any(|value| digits_only(&value.as_text()) == digits)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Contact, ContactId, FieldId};

    #[test]
    fn deserializes_null_custom_fields_as_empty() {
        let contact: Contact =
            serde_json::from_value(json!({"id": 5, "name": "Ivan", "custom_fields_values": null}))
                .expect("contact should decode");

        assert_eq!(contact.id, ContactId(5));
        assert!(contact.custom_fields().is_empty());
        assert!(!contact.has_phone_digits("7999"));
    }

    #[test]
    fn null_field_values_decode_as_empty() {
        let contact: Contact = serde_json::from_value(json!({
            "id": 3,
            "custom_fields_values": [
                {"field_id": 7, "values": null},
                {"field_id": 100, "values": [{"value": "+7 999 123-45-67"}]}
            ]
        }))
        .expect("contact should decode");

        assert!(contact.custom_fields()[0].values.is_empty());
        assert!(contact.has_phone_digits("79991234567"));
    }

    #[test]
    fn keeps_unknown_field_attributes_for_round_trip() {
        let contact: Contact = serde_json::from_value(json!({
            "id": 9,
            "custom_fields_values": [{
                "field_id": 100,
                "field_name": "Телефон",
                "field_code": "PHONE",
                "values": [{"value": "+7 999 123-45-67", "enum_id": 3, "enum_code": "WORK"}]
            }]
        }))
        .expect("contact should decode");

        let field = &contact.custom_fields()[0];
        assert_eq!(field.field_id, FieldId(100));
        assert_eq!(field.extra.get("field_code"), Some(&json!("PHONE")));
        assert_eq!(field.values[0].extra.get("enum_code"), Some(&json!("WORK")));
        assert!(contact.has_phone_digits("79991234567"));

        let encoded = serde_json::to_value(field).expect("field should encode");
        assert_eq!(encoded["field_name"], json!("Телефон"));
        assert_eq!(encoded["values"][0]["enum_id"], json!(3));
    }

    #[test]
    fn numeric_values_participate_in_phone_matching() {
        let contact: Contact = serde_json::from_value(json!({
            "id": 1,
            "custom_fields_values": [{"field_id": 1, "values": [{"value": 79991234567_i64}]}]
        }))
        .expect("contact should decode");

        assert!(contact.has_phone_digits("79991234567"));
    }
}
