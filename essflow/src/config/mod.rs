//! Configuration for the remote service and the orchestration policy.
//!
//! Configuration values are built once and passed into each component's
//! constructor. Nothing here is process-global.

mod service;
mod workflow;

pub use service::{ServiceConfig, DEFAULT_UCM_ACCOUNT};
pub use workflow::{
    ArtifactConfig, ImportParameters, PollConfig, ResolverConfig, WorkflowConfig,
};

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required value is absent.
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired {
        /// Variable or field name.
        key: String,
        /// How to provide it.
        hint: String,
    },

    /// A value could not be parsed.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Variable or field name.
        key: String,
        /// Parse failure.
        message: String,
    },

    /// The `.env` file could not be read.
    #[error("Failed to load env file: {0}")]
    EnvFile(String),
}

/// Reads an optional value through `lookup`, treating empty strings as unset.
pub(crate) fn optional_value<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

/// Reads and parses an optional value, falling back to `default`.
pub(crate) fn parse_optional<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_value(lookup, key)
        .map(|s| {
            s.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{e}"),
            })
        })
        .transpose()
        .map(|opt| opt.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_optional_value_ignores_blank() {
        let lookup = lookup_from(&[("A", "  "), ("B", "x")]);
        assert_eq!(optional_value(&lookup, "A"), None);
        assert_eq!(optional_value(&lookup, "B").as_deref(), Some("x"));
        assert_eq!(optional_value(&lookup, "C"), None);
    }

    #[test]
    fn test_parse_optional() {
        let lookup = lookup_from(&[("N", "45"), ("BAD", "soon")]);
        assert_eq!(parse_optional(&lookup, "N", 10u64).unwrap(), 45);
        assert_eq!(parse_optional(&lookup, "MISSING", 10u64).unwrap(), 10);

        let err = parse_optional(&lookup, "BAD", 10u64).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "BAD"));
    }
}
