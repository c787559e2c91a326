//! # Config Loader
//!
//! Turns an altimon configuration file into a validated [`AgentBlueprint`].
//!
//! Every section is optional and falls back to the device defaults
//! (5 Hz, 1013.25 hPa, 1 m threshold, 60 s lookback). Anything that would
//! make the detector truncate events, such as a ring buffer shorter than
//! lookback plus comparison window, is refused at load time.
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("config.toml")).unwrap();
//! println!("Device: {}", blueprint.device.name);
//! ```

mod parser;
mod validator;

pub use contracts::AgentBlueprint;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Entry point for loading and re-validating agent configuration
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a `.toml` or `.json` file
    ///
    /// # Errors
    /// Unknown extension, unreadable file, parse failure or the first
    /// validation rule that does not hold.
    pub fn load_from_path(path: &Path) -> Result<AgentBlueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Parse and validate in-memory configuration content
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<AgentBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Re-validate a blueprint after programmatic overrides (e.g. CLI flags)
    ///
    /// # Errors
    /// Returns the first validation failure
    pub fn validate(blueprint: &AgentBlueprint) -> Result<(), ContractError> {
        validator::validate(blueprint)
    }

    /// Render a blueprint as TOML, defaults included
    pub fn to_toml(blueprint: &AgentBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    pub fn to_json(blueprint: &AgentBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    fn read_file(path: &Path) -> Result<String, ContractError> {
        std::fs::read_to_string(path).map_err(|e| ContractError::ConfigParse {
            message: format!("cannot read {}: {e}", path.display()),
            source: Some(Box::new(e)),
        })
    }
}
