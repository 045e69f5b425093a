//! YAML configuration loading shared by the floe binaries.

mod vars;

pub use vars::{InterpolationResult, interpolate};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{ConfigError, ReadFileSnafu, YamlParseSnafu};

/// Byte size constants (binary/IEC units).
pub const KB: usize = 1024;
pub const MB: usize = 1024 * KB;

/// Read a YAML file, substitute environment references and deserialize it.
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
    parse_yaml(&contents)
}

/// Deserialize YAML text after environment interpolation.
pub fn parse_yaml<T: DeserializeOwned>(contents: &str) -> Result<T, ConfigError> {
    let result = interpolate(contents);
    if !result.is_ok() {
        return Err(ConfigError::EnvInterpolation {
            message: result.errors.join("\n"),
        });
    }

    serde_yaml::from_str(&result.text).context(YamlParseSnafu)
}

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Address to bind the exporter to (e.g. "0.0.0.0:9090"). Disabled when unset.
    #[serde(default)]
    pub address: Option<String>,
}

/// Options handed to object storage backends (credentials, region, endpoint).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Options for `s3://` buckets, keyed by `object_store` S3 config key.
    #[serde(default)]
    pub s3: HashMap<String, String>,
    /// Options for `gs://` buckets, keyed by `object_store` GCS config key.
    #[serde(default)]
    pub gcs: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        #[serde(default)]
        metrics: MetricsConfig,
    }

    #[test]
    fn test_parse_yaml_with_defaults() {
        let sample: Sample = parse_yaml("name: demo\n").unwrap();
        assert_eq!(sample.name, "demo");
        assert!(sample.metrics.address.is_none());
    }

    #[test]
    fn test_parse_yaml_reports_interpolation_errors() {
        let err = parse_yaml::<Sample>("name: ${FLOE_CONFIG_TEST_NEVER_SET}\n").unwrap_err();
        assert!(matches!(err, ConfigError::EnvInterpolation { .. }));
    }

    #[test]
    fn test_load_yaml_missing_file() {
        let err = load_yaml::<Sample>(Path::new("/nonexistent/floe.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }
}
