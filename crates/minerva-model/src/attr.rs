use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Open key→value bag carried by symbols and edges.
///
/// Backed by a `BTreeMap` so JSON serialisation is deterministic: re-analysing
/// identical bytecode must produce byte-identical attribute columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttrMap(BTreeMap<String, Value>);

impl AttrMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn set_flag(&mut self, key: impl Into<String>) {
        self.0.insert(key.into(), Value::Bool(true));
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.0.insert(key.into(), Value::Bool(value));
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), Value::String(value.into()));
    }

    pub fn set_i64(&mut self, key: impl Into<String>, value: i64) {
        self.0.insert(key.into(), Value::Number(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn from_json(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(map) => Self(map),
            Err(err) => {
                tracing::debug!(target = "minerva.model", error = %err, "malformed attribute json; using empty bag");
                Self::default()
            }
        }
    }
}

impl FromIterator<(String, Value)> for AttrMap {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_is_deterministic() {
        let mut attrs = AttrMap::new();
        attrs.set_str("proxy_type", "cglib");
        attrs.set_flag("spring_bean");
        attrs.set_i64("transaction_timeout", 30);

        let a = attrs.to_json();
        let b = AttrMap::from_json(&a).to_json();
        assert_eq!(a, b);
    }

    #[test]
    fn malformed_json_degrades_to_empty() {
        assert!(AttrMap::from_json("{not json").is_empty());
    }
}
