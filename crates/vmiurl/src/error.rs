//! Error types for the vmiurl crate.

use thiserror::Error;

/// Errors raised while resolving a `vmi://` URL.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Scheme error: got {got:?}, expected {expected:?}")]
    SchemeMismatch { got: String, expected: &'static str },

    #[error("Invalid driver type {name:?}. Valid driver types: {}", .valid.join(" "))]
    UnknownHypervisor {
        name: String,
        valid: Vec<&'static str>,
    },

    #[error("Unknown driver initialization parameter {key:?}. Allowed parameters: {}", .valid.join(", "))]
    UnknownConfigKey {
        key: String,
        valid: Vec<&'static str>,
    },

    #[error("Conflicting driver configuration: {0}")]
    ConflictingConfig(String),

    #[error("Empty vm_name")]
    EmptyTarget,

    #[error("Malformed query string: {0}")]
    MalformedQuery(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_hypervisor_lists_valid_names() {
        let err = ConfigError::UnknownHypervisor {
            name: "BOGUS".to_string(),
            valid: vec!["KVM", "Xen"],
        };
        let msg = err.to_string();
        assert!(msg.contains("BOGUS"));
        assert!(msg.contains("KVM Xen"));
    }

    #[test]
    fn test_scheme_mismatch_names_both_schemes() {
        let err = ConfigError::SchemeMismatch {
            got: "http".to_string(),
            expected: "vmi",
        };
        let msg = err.to_string();
        assert!(msg.contains("\"http\""));
        assert!(msg.contains("\"vmi\""));
    }
}
