//! Simulator configuration.
//!
//! Provides [`StorageConfig`] for configuring the gcstack storage simulator.
//! Configuration values can be loaded from environment variables.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Storage simulator configuration.
///
/// All fields have defaults suitable for tests. Configuration can be loaded
/// from environment variables via [`StorageConfig::from_env`].
///
/// # Examples
///
/// ```
/// use gcstack_storage_core::config::StorageConfig;
///
/// let config = StorageConfig::default();
/// assert_eq!(config.project_number, "123456789");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Base URL stamped into `selfLink` fields, e.g.
    /// `http://localhost:9000/storage/v1/`.
    #[builder(default = String::from("http://localhost:9000/storage/v1/"))]
    pub base_url: String,

    /// The project number used for owner and project-team ACL entities.
    #[builder(default = String::from("123456789"))]
    pub project_number: String,

    /// The location new revisions report, e.g. `US`.
    #[builder(default = String::from("US"))]
    pub default_location: String,

    /// The storage class new revisions report, e.g. `STANDARD`.
    #[builder(default = String::from("STANDARD"))]
    pub default_storage_class: String,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("http://localhost:9000/storage/v1/"),
            project_number: String::from("123456789"),
            default_location: String::from("US"),
            default_storage_class: String::from("STANDARD"),
            log_level: String::from("info"),
        }
    }
}

impl StorageConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables (falling back to defaults):
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `GCSTACK_BASE_URL` | `http://localhost:9000/storage/v1/` |
    /// | `GCSTACK_PROJECT_NUMBER` | `123456789` |
    /// | `GCSTACK_DEFAULT_LOCATION` | `US` |
    /// | `GCSTACK_DEFAULT_STORAGE_CLASS` | `STANDARD` |
    /// | `GCSTACK_LOG_LEVEL` | `info` |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("GCSTACK_BASE_URL") {
            config.base_url = v;
        }
        if let Ok(v) = std::env::var("GCSTACK_PROJECT_NUMBER") {
            config.project_number = v;
        }
        if let Ok(v) = std::env::var("GCSTACK_DEFAULT_LOCATION") {
            config.default_location = v;
        }
        if let Ok(v) = std::env::var("GCSTACK_DEFAULT_STORAGE_CLASS") {
            config.default_storage_class = v;
        }
        if let Ok(v) = std::env::var("GCSTACK_LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// The entity of the project-owners team, e.g. `project-owners-123456789`.
    #[must_use]
    pub fn project_owner_entity(&self) -> String {
        format!("project-owners-{}", self.project_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_default_config() {
        let config = StorageConfig::default();
        assert_eq!(config.base_url, "http://localhost:9000/storage/v1/");
        assert_eq!(config.project_number, "123456789");
        assert_eq!(config.default_location, "US");
        assert_eq!(config.default_storage_class, "STANDARD");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_should_build_with_typed_builder() {
        let config = StorageConfig::builder()
            .base_url("http://127.0.0.1:4443/storage/v1/".into())
            .project_number("42".into())
            .default_location("EU".into())
            .default_storage_class("NEARLINE".into())
            .log_level("debug".into())
            .build();

        assert_eq!(config.base_url, "http://127.0.0.1:4443/storage/v1/");
        assert_eq!(config.project_number, "42");
        assert_eq!(config.default_location, "EU");
        assert_eq!(config.default_storage_class, "NEARLINE");
        assert_eq!(config.project_owner_entity(), "project-owners-42");
    }

    #[test]
    fn test_should_load_from_env() {
        let config = StorageConfig::from_env();
        assert!(!config.base_url.is_empty());
    }

    #[test]
    fn test_should_serialize_to_camel_case_json() {
        let config = StorageConfig::default();
        let json = serde_json::to_string(&config).expect("test serialization");
        assert!(json.contains("baseUrl"));
        assert!(json.contains("projectNumber"));
    }
}
