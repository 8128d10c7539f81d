//! PropertyMap: the key-value store on nodes and relationships.

use std::collections::HashMap;
use super::Value;

/// A map of property names to values.
pub type PropertyMap = HashMap<String, Value>;

/// Build a PropertyMap from (key, value) pairs.
///
/// ```rust
/// use kantian_graph::model::{props, Value};
///
/// let p = props([("name", Value::from("Heat")), ("quality", Value::from("Reality"))]);
/// assert_eq!(p.len(), 2);
/// ```
pub fn props<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> PropertyMap
where
    K: Into<String>,
    V: Into<Value>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Convert a JSON object into a PropertyMap. Returns None for non-objects.
pub fn props_from_json(json: &serde_json::Value) -> Option<PropertyMap> {
    json.as_object().map(|obj| {
        obj.iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect()
    })
}

/// Render a PropertyMap as a JSON object.
pub fn props_to_json(map: &PropertyMap) -> serde_json::Map<String, serde_json::Value> {
    map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
}
