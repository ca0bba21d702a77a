//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("replication.flush_interval_ms must be greater than 0")]
    ZeroFlushInterval,
    #[error("replication.channel_capacity must be greater than 0")]
    ZeroChannelCapacity,
    #[error("names.adjectives_file and names.names_file must be set together")]
    PartialNameTables,
    #[error("name table does not exist: {0}")]
    NameTableNotFound(String),
    #[error("array.name is required")]
    MissingArrayName,
    #[error("array '{0}' is defined more than once")]
    DuplicateArray(String),
    #[error("array '{0}' has an empty type_tag")]
    EmptyTypeTag(String),
    #[error("array '{0}' preload_file does not exist: {1}")]
    PreloadNotFound(String, String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }

    if config.replication.flush_interval_ms == 0 {
        errors.push(ValidationError::ZeroFlushInterval);
    }
    if config.replication.channel_capacity == 0 {
        errors.push(ValidationError::ZeroChannelCapacity);
    }

    // Name tables
    match (&config.names.adjectives_file, &config.names.names_file) {
        (Some(adjectives), Some(names)) => {
            for path in [adjectives, names] {
                if !path.exists() {
                    errors.push(ValidationError::NameTableNotFound(path.display().to_string()));
                }
            }
        }
        (None, None) => {}
        _ => errors.push(ValidationError::PartialNameTables),
    }

    // Arrays
    let mut seen = HashSet::new();
    for array in &config.arrays {
        if array.name.is_empty() {
            errors.push(ValidationError::MissingArrayName);
            continue;
        }
        if !seen.insert(array.name.as_str()) {
            errors.push(ValidationError::DuplicateArray(array.name.clone()));
        }
        if array.type_tag.is_empty() {
            errors.push(ValidationError::EmptyTypeTag(array.name.clone()));
        }
        if let Some(ref preload) = array.preload_file
            && !Path::new(preload).exists()
        {
            errors.push(ValidationError::PreloadNotFound(
                array.name.clone(),
                preload.display().to_string(),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_valid_config() -> String {
        r#"
[server]
name = "test.server"

[[array]]
name = "inventory"
"#
        .to_string()
    }

    #[test]
    fn test_valid_config_passes() {
        let config: Config = toml::from_str(&minimal_valid_config()).unwrap();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_server_name_fails() {
        let toml = r#"
[server]
name = ""
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::MissingServerName)));
    }

    #[test]
    fn test_zero_intervals_fail() {
        let toml = r#"
[replication]
flush_interval_ms = 0
channel_capacity = 0
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_duplicate_array_fails() {
        let toml = r#"
[[array]]
name = "inventory"

[[array]]
name = "inventory"

[[array]]
name = ""
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::DuplicateArray(n) if n == "inventory")));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::MissingArrayName)));
    }

    #[test]
    fn test_partial_name_tables_fail() {
        let toml = r#"
[names]
adjectives_file = "/nonexistent/adjectives.txt"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::PartialNameTables)));
    }

    #[test]
    fn test_missing_files_fail() {
        let toml = r#"
[names]
adjectives_file = "/nonexistent/adjectives.txt"
names_file = "/nonexistent/names.txt"

[[array]]
name = "inventory"
preload_file = "/nonexistent/inventory.jsonl"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert_eq!(
            errors
                .iter()
                .filter(|e| matches!(e, ValidationError::NameTableNotFound(_)))
                .count(),
            2
        );
        assert!(errors.iter().any(|e| matches!(e, ValidationError::PreloadNotFound(..))));
    }
}
