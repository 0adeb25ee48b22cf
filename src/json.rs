//! Typed access to the schema-less JSON the platform returns.
//!
//! Record payloads are form-specific, so they stay as [`serde_json::Value`].
//! These helpers pull out the few fields the client itself depends on and
//! turn a shape mismatch into [`ApiError::UnexpectedShape`].

use serde_json::{Map, Value};

use crate::error::ApiError;

/// A JSON object.
pub type JsonObject = Map<String, Value>;

/// Rewrites a fractional top-level `id` (for example `5.0`) as an integer.
pub fn normalize_id(object: &mut JsonObject) {
    let fractional = match object.get("id") {
        Some(Value::Number(number)) if !number.is_i64() && !number.is_u64() => number.as_f64(),
        _ => None,
    };
    if let Some(float) = fractional {
        #[allow(clippy::cast_possible_truncation)]
        let truncated = float as i64;
        object.insert("id".to_string(), Value::from(truncated));
    }
}

/// String value at `key`.
///
/// # Errors
///
/// Returns [`ApiError::UnexpectedShape`] if the key is absent or not a string.
pub fn str_field<'a>(object: &'a JsonObject, key: &str) -> Result<&'a str, ApiError> {
    object
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::unexpected_shape(key, "string"))
}

/// Object value at `key`.
///
/// # Errors
///
/// Returns [`ApiError::UnexpectedShape`] if the key is absent or not an object.
pub fn object_field<'a>(object: &'a JsonObject, key: &str) -> Result<&'a JsonObject, ApiError> {
    object
        .get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| ApiError::unexpected_shape(key, "object"))
}

/// Mutable object value at `key`.
///
/// # Errors
///
/// Returns [`ApiError::UnexpectedShape`] if the key is absent or not an object.
pub fn object_field_mut<'a>(
    object: &'a mut JsonObject,
    key: &str,
) -> Result<&'a mut JsonObject, ApiError> {
    object
        .get_mut(key)
        .and_then(Value::as_object_mut)
        .ok_or_else(|| ApiError::unexpected_shape(key, "object"))
}

/// Array value at `key`.
///
/// # Errors
///
/// Returns [`ApiError::UnexpectedShape`] if the key is absent or not an array.
pub fn array_field<'a>(object: &'a JsonObject, key: &str) -> Result<&'a [Value], ApiError> {
    object
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| ApiError::unexpected_shape(key, "array"))
}

/// The first record of an `items` list, as returned by record retrieval.
///
/// # Errors
///
/// Returns [`ApiError::UnexpectedShape`] if `items` is missing, empty, or its
/// first element is not an object.
pub fn first_item(object: &JsonObject) -> Result<&JsonObject, ApiError> {
    array_field(object, "items")?
        .first()
        .and_then(Value::as_object)
        .ok_or_else(|| ApiError::unexpected_shape("items[0]", "object"))
}

/// Takes ownership of the first record of an `items` list.
///
/// # Errors
///
/// Same as [`first_item`].
pub fn take_first_item(mut object: JsonObject) -> Result<JsonObject, ApiError> {
    let items = match object.remove("items") {
        Some(Value::Array(items)) => items,
        _ => return Err(ApiError::unexpected_shape("items", "array")),
    };
    match items.into_iter().next() {
        Some(Value::Object(record)) => Ok(record),
        _ => Err(ApiError::unexpected_shape("items[0]", "object")),
    }
}

/// Parses `text` as a JSON object.
///
/// # Errors
///
/// Returns [`ApiError::MalformedBody`] for invalid JSON or a non-object root.
pub fn parse_object(source: &str, text: &str) -> Result<JsonObject, ApiError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(ApiError::malformed_json(source, "top-level value is not an object")),
        Err(e) => Err(ApiError::malformed_json(source, e)),
    }
}

/// Blanks out the values of a sample record so it can be used as a
/// submission template.
///
/// Top-level strings and numbers become `""` and booleans `false`. Inside
/// nested objects, strings and numbers become `""` and arrays `[]`; other
/// nested values are kept. Top-level arrays become `[]`.
pub fn clear_values(record: &mut JsonObject) {
    for value in record.values_mut() {
        match value {
            Value::String(_) | Value::Number(_) => *value = Value::String(String::new()),
            Value::Bool(_) => *value = Value::Bool(false),
            Value::Array(items) => items.clear(),
            Value::Object(nested) => {
                for inner in nested.values_mut() {
                    match inner {
                        Value::String(_) | Value::Number(_) => {
                            *inner = Value::String(String::new());
                        }
                        Value::Array(items) => items.clear(),
                        _ => {}
                    }
                }
            }
            Value::Null => {}
        }
    }
}

/// Strips the `<textarea>` wrapper the import endpoint puts around its JSON
/// and unescapes `&quot;`.
#[must_use]
pub fn unwrap_textarea(text: &str) -> String {
    text.replacen("<textarea>", "", 1)
        .replacen("</textarea>", "", 1)
        .replace("&quot;", "\"")
}
