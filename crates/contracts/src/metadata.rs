//! SimulationMetadata - key/value description of a run

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Run-wide metadata handed to `simulation_started` / `simulation_completed`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimulationMetadata {
    entries: BTreeMap<String, Value>,
}

impl SimulationMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a key
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Copy every entry of `other` over this one
    pub fn merge(&mut self, other: &SimulationMetadata) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_overwrites() {
        let mut base = SimulationMetadata::new();
        base.insert("total_frames", 3);
        base.insert("scenario", "urban");

        let mut user = SimulationMetadata::new();
        user.insert("scenario", "highway");

        base.merge(&user);
        assert_eq!(base.get("scenario"), Some(&json!("highway")));
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn test_serializes_as_flat_object() {
        let mut meta = SimulationMetadata::new();
        meta.insert("sensors", json!(["camera"]));
        let text = serde_json::to_string(&meta).unwrap();
        assert_eq!(text, r#"{"sensors":["camera"]}"#);
    }
}
