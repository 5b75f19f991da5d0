use serde_json::{Map, Value};

/// `{"data": {"type": .., "id"?: .., "attributes": {..}}}`
pub fn envelope(resource_type: &str, id: Option<&str>, attributes: Value) -> Value {
    let mut data = Map::new();
    data.insert("type".to_string(), Value::String(resource_type.to_string()));
    if let Some(id) = id {
        data.insert("id".to_string(), Value::String(id.to_string()));
    }
    let attributes = if attributes.is_object() {
        attributes
    } else {
        Value::Object(Map::new())
    };
    data.insert("attributes".to_string(), attributes);
    serde_json::json!({ "data": Value::Object(data) })
}

/// Insert `key` into an attributes object, replacing any previous value.
pub fn with_attribute(mut attributes: Value, key: &str, value: Value) -> Value {
    if let Value::Object(map) = &mut attributes {
        map.insert(key.to_string(), value);
    }
    attributes
}
