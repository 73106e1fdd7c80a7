//! Conversions from parsed YAML/JSON into attribute values.

use kiln_types::{AttributeValue, Attributes};

/// Convert a JSON value into an attribute value
pub fn attribute_from_json(value: serde_json::Value) -> AttributeValue {
    use serde_json::Value;

    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Integer(i),
            None => AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => AttributeValue::String(s),
        Value::Array(items) => {
            AttributeValue::List(items.into_iter().map(attribute_from_json).collect())
        }
        Value::Object(map) => AttributeValue::Map(
            map.into_iter()
                .map(|(k, v)| (k, attribute_from_json(v)))
                .collect(),
        ),
    }
}

/// Convert a YAML value into an attribute value.
///
/// Mapping keys that are not scalars are dropped; tags are ignored.
pub fn attribute_from_yaml(value: serde_yaml::Value) -> AttributeValue {
    use serde_yaml::Value;

    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Integer(i),
            None => AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => AttributeValue::String(s),
        Value::Sequence(items) => {
            AttributeValue::List(items.into_iter().map(attribute_from_yaml).collect())
        }
        Value::Mapping(map) => AttributeValue::Map(attributes_from_mapping(map)),
        Value::Tagged(tagged) => attribute_from_yaml(tagged.value),
    }
}

/// Convert a YAML mapping into an attribute map
pub fn attributes_from_mapping(map: serde_yaml::Mapping) -> Attributes {
    map.into_iter()
        .filter_map(|(key, value)| {
            let key = match key {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                other => {
                    tracing::debug!("Ignoring non-scalar attribute key {:?}", other);
                    return None;
                }
            };
            Some((key, attribute_from_yaml(value)))
        })
        .collect()
}
