// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `getConfig` accessor passed into every user function.

use std::sync::Arc;
use thiserror::Error;

/// A single config value, stored as JSON so it round-trips over the worker
/// protocol the same way the rest of a run's options do.
pub type ConfigValue = serde_json::Value;

/// A run's read-only configuration map, handed to every hook and case body.
///
/// Cloning is cheap: the underlying map is reference-counted.
#[derive(Clone, Debug, Default)]
pub struct RunConfig {
    values: Arc<indexmap::IndexMap<String, ConfigValue>>,
}

/// Looking up a key that was never set with [`RunConfig`].
#[derive(Debug, Error)]
#[error("no config value found for key '{key}'")]
pub struct ConfigKeyMissing {
    key: String,
}

impl RunConfig {
    pub fn new(values: indexmap::IndexMap<String, ConfigValue>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Reads `key`, or fails with a message that names the key, matching
    /// `getConfig`'s "throws when key is absent" contract.
    pub fn get(&self, key: &str) -> Result<&ConfigValue, ConfigKeyMissing> {
        self.values.get(key).ok_or_else(|| ConfigKeyMissing { key: key.to_owned() })
    }

    /// Builds a config map from an ordered list of key/value pairs, the
    /// shape the worker protocol carries it in (a `BTreeMap` wouldn't
    /// preserve the `--config` flags' original order).
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, ConfigValue)>) -> Self {
        Self::new(pairs.into_iter().collect())
    }

    /// Flattens this config to the sorted map the worker protocol sends
    /// over the wire, or `None` if empty.
    pub fn to_json_map(&self) -> Option<std::collections::BTreeMap<String, ConfigValue>> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_error_names_the_key() {
        let config = RunConfig::empty();
        let err = config.get("myConfig").unwrap_err();
        assert!(err.to_string().contains("myConfig"));
    }

    #[test]
    fn present_key_returns_value() {
        let mut map = indexmap::IndexMap::new();
        map.insert("myConfig".to_string(), serde_json::json!("my_config"));
        let config = RunConfig::new(map);
        assert_eq!(config.get("myConfig").unwrap(), "my_config");
    }

    #[test]
    fn empty_config_has_no_json_map() {
        assert_eq!(RunConfig::empty().to_json_map(), None);
    }

    #[test]
    fn from_pairs_round_trips_through_json_map() {
        let config = RunConfig::from_pairs([("a".to_string(), serde_json::json!(1)), ("b".to_string(), serde_json::json!(2))]);
        let map = config.to_json_map().unwrap();
        assert_eq!(map.get("a"), Some(&serde_json::json!(1)));
        assert_eq!(map.get("b"), Some(&serde_json::json!(2)));
    }
}
