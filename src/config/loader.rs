//! Configuration loader with environment variable expansion

use super::{Config, ConfigError};
use regex_lite::Regex;
use std::path::Path;

/// Matches `${VAR}` and `${VAR:-default}`
const ENV_PATTERN: &str = r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn parse(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Expand environment variables
    ///
    /// - `${VAR_NAME}` keeps the placeholder if the variable is not set
    /// - `${VAR_NAME:-default}` falls back to `default`
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let re = Regex::new(ENV_PATTERN)
            .map_err(|e| ConfigError::ValidationError(format!("bad env pattern: {}", e)))?;

        let mut result = String::with_capacity(content.len());
        let mut last_match = 0;
        for cap in re.captures_iter(content) {
            let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            result.push_str(&content[last_match..full_match.start()]);

            let value = match (std::env::var(var_name.as_str()), cap.get(2)) {
                (Ok(val), _) => val,
                (Err(_), Some(default)) => default.as_str().to_string(),
                (Err(_), None) => full_match.as_str().to_string(),
            };
            result.push_str(&value);
            last_match = full_match.end();
        }
        result.push_str(&content[last_match..]);

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_expand_env_vars() {
        std::env::set_var("S3_ADAPTOR_TEST_VAR", "test_value");
        let expanded = ConfigLoader::expand_env_vars("key: ${S3_ADAPTOR_TEST_VAR}").unwrap();
        assert_eq!(expanded, "key: test_value");
        std::env::remove_var("S3_ADAPTOR_TEST_VAR");
    }

    #[test]
    #[serial]
    fn test_expand_env_vars_default_and_missing() {
        std::env::remove_var("S3_ADAPTOR_UNSET");
        let expanded =
            ConfigLoader::expand_env_vars("a: ${S3_ADAPTOR_UNSET:-fallback}\nb: ${S3_ADAPTOR_UNSET}")
                .unwrap();
        assert_eq!(expanded, "a: fallback\nb: ${S3_ADAPTOR_UNSET}");
    }

    #[test]
    fn test_parse_minimal() {
        let config = ConfigLoader::parse("client:\n  region: ap-southeast-2\n").unwrap();
        assert_eq!(config.client.region, "ap-southeast-2");
        assert_eq!(config.transfer.concurrent_parts, 4);
    }
}
