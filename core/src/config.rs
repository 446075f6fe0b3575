//! Client configuration loaded from the environment or a JSON document.

use serde::Deserialize;

use crate::error::{Error, Result};

pub const ENV_BASE_URL: &str = "METHODKIT_BASE_URL";
pub const ENV_TIMEOUT_MS: &str = "METHODKIT_TIMEOUT_MS";
pub const ENV_GET_CACHE_MS: &str = "METHODKIT_GET_CACHE_MS";

/// Values a deployment may set without code changes. Absent fields keep the
/// builder's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
    /// Default reuse window for GET responses; `0` disables GET caching.
    pub get_cache_ms: Option<u64>,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup, e.g. a map in tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            base_url: lookup(ENV_BASE_URL).filter(|v| !v.is_empty()),
            timeout_ms: parse_millis(ENV_TIMEOUT_MS, lookup(ENV_TIMEOUT_MS))?,
            get_cache_ms: parse_millis(ENV_GET_CACHE_MS, lookup(ENV_GET_CACHE_MS))?,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

fn parse_millis(key: &str, raw: Option<String>) -> Result<Option<u64>> {
    match raw {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidConfig(format!("{key} must be milliseconds, got {v:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_is_all_defaults() {
        assert_eq!(ClientConfig::from_lookup(lookup(&[])).unwrap(), ClientConfig::default());
    }

    #[test]
    fn reads_every_key() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, "http://api.test"),
            (ENV_TIMEOUT_MS, "2500"),
            (ENV_GET_CACHE_MS, " 0 "),
        ]))
        .unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://api.test"));
        assert_eq!(config.timeout_ms, Some(2500));
        assert_eq!(config.get_cache_ms, Some(0));
    }

    #[test]
    fn rejects_non_numeric_durations() {
        let err = ClientConfig::from_lookup(lookup(&[(ENV_TIMEOUT_MS, "soon")])).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains(ENV_TIMEOUT_MS)));
    }

    #[test]
    fn parses_json_documents() {
        let config = ClientConfig::from_json(r#"{"base_url":"http://h","timeout_ms":10}"#).unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://h"));
        assert_eq!(config.timeout_ms, Some(10));
        assert!(config.get_cache_ms.is_none());

        let err = ClientConfig::from_json(r#"{"base":"http://h"}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
