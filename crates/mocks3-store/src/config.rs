//! Storage-engine configuration.
//!
//! Provides [`StoreConfig`] for configuring a [`crate::FileStore`]. Values
//! can be loaded from environment variables via [`StoreConfig::from_env`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Storage-engine configuration.
///
/// All fields have defaults suitable for throwaway test runs: an ephemeral
/// root directory that is removed on drop, `us-east-1`, and no initial
/// buckets.
///
/// # Examples
///
/// ```
/// use mocks3_store::StoreConfig;
///
/// let config = StoreConfig::default();
/// assert!(config.root.is_none());
/// assert_eq!(config.region, "us-east-1");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Root directory for all bucket folders. When unset, a temporary
    /// directory is created and (unless `retain_files` is set) removed when
    /// the store is dropped.
    #[builder(default)]
    pub root: Option<PathBuf>,

    /// Region recorded on newly created buckets.
    #[builder(default = String::from("us-east-1"))]
    #[serde(default = "default_region")]
    pub region: String,

    /// Buckets created when the store is opened.
    #[builder(default)]
    #[serde(default)]
    pub initial_buckets: Vec<String>,

    /// Whether stored files outlive the store handle.
    #[builder(default = false)]
    #[serde(default)]
    pub retain_files: bool,
}

fn default_region() -> String {
    String::from("us-east-1")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: None,
            region: default_region(),
            initial_buckets: Vec::new(),
            retain_files: false,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the following variables (falling back to defaults):
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `MOCKS3_ROOT` | unset (temp dir) |
    /// | `MOCKS3_REGION` | `us-east-1` |
    /// | `MOCKS3_INITIAL_BUCKETS` | empty (comma-separated list) |
    /// | `MOCKS3_RETAIN_FILES` | `false` |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("MOCKS3_ROOT") {
            if !v.is_empty() {
                config.root = Some(PathBuf::from(v));
            }
        }
        if let Ok(v) = std::env::var("MOCKS3_REGION") {
            config.region = v;
        }
        if let Ok(v) = std::env::var("MOCKS3_INITIAL_BUCKETS") {
            config.initial_buckets = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect();
        }
        if let Ok(v) = std::env::var("MOCKS3_RETAIN_FILES") {
            config.retain_files = parse_bool(&v);
        }

        config
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_default_config() {
        let config = StoreConfig::default();
        assert!(config.root.is_none());
        assert_eq!(config.region, "us-east-1");
        assert!(config.initial_buckets.is_empty());
        assert!(!config.retain_files);
    }

    #[test]
    fn test_should_build_with_typed_builder() {
        let config = StoreConfig::builder()
            .root(Some(PathBuf::from("/tmp/mocks3")))
            .region("eu-west-1".into())
            .initial_buckets(vec!["b1".to_owned(), "b2".to_owned()])
            .retain_files(true)
            .build();

        assert_eq!(config.root, Some(PathBuf::from("/tmp/mocks3")));
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.initial_buckets.len(), 2);
        assert!(config.retain_files);
    }

    #[test]
    fn test_should_serialize_to_camel_case_json() {
        let config = StoreConfig::builder().retain_files(true).build();
        let json = serde_json::to_string(&config).expect("serialize");
        assert!(json.contains("retainFiles"));
        assert!(json.contains("initialBuckets"));
    }

    #[test]
    fn test_should_parse_bool_values() {
        assert!(parse_bool("1"));
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool(""));
    }
}
