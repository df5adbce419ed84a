use dispatch_transform::model::JsonObject;
use serde_json::Value;

/// Converts a serialized wire struct into the mutable `JsonObject` the
/// request-builder helpers (`apply_custom_parameters`, `clean_payload`)
/// operate on.
pub fn value_to_object(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        other => {
            let mut object = JsonObject::new();
            object.insert("value".to_string(), other);
            object
        }
    }
}

pub fn object_to_value(object: JsonObject) -> Value {
    Value::Object(object.into_iter().collect())
}
