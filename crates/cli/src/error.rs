//! Error types for CLI operations.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use thiserror::Error;

/// Operator-facing failures detected before the agent starts
///
/// Anything that goes wrong after start-up is reported through `anyhow` with
/// context and maps to a generic failure exit code.
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    /// A command-line override does not fit the configuration
    #[error("Invalid {flag}: {message}")]
    InvalidOverride { flag: &'static str, message: String },

    /// Configuration (after overrides) failed validation
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },
}

impl CliError {
    pub fn config_not_found(path: &Path) -> Self {
        Self::ConfigNotFound {
            path: path.to_path_buf(),
        }
    }

    pub fn invalid_override(flag: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidOverride {
            flag,
            message: message.into(),
        }
    }

    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Exit code for service managers: 78 (EX_CONFIG) so restarts can be suppressed
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(78)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_problem() {
        let err = CliError::config_not_found(Path::new("/etc/altimon/agent.toml"));
        assert_eq!(
            err.to_string(),
            "Configuration file not found: /etc/altimon/agent.toml"
        );

        let err = CliError::invalid_override("--sink-addr", "expected host:port");
        assert_eq!(err.to_string(), "Invalid --sink-addr: expected host:port");
    }
}
