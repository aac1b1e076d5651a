//! Runtime configuration.
//!
//! A `RuntimeConfig` is deserialized from TOML. Every field has a default,
//! so an empty document is a valid configuration.
//!
//! ```toml
//! max_steps = 256
//! signature_depth = 3
//! blocking_severity = 100
//! break_cycles = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use plang_contracts::{
    context::DEFAULT_MAX_STEPS,
    error::{PlangError, PlangResult},
};
use plang_core::resolver::DEFAULT_SIGNATURE_DEPTH;

fn default_max_steps() -> u64 {
    DEFAULT_MAX_STEPS
}

fn default_signature_depth() -> usize {
    DEFAULT_SIGNATURE_DEPTH
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Per-policy step budget for requests that do not carry their own.
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,

    /// Instruction tags compared when grouping policies for action
    /// conflicts.
    #[serde(default = "default_signature_depth")]
    pub signature_depth: usize,

    /// Refuse to publish a module with an unresolved conflict at or above
    /// this severity (0-100). Absent means never refuse.
    #[serde(default)]
    pub blocking_severity: Option<u8>,

    /// Rewrite verified cycle-breaking routes into ALLOW before publishing.
    #[serde(default)]
    pub break_cycles: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            signature_depth: DEFAULT_SIGNATURE_DEPTH,
            blocking_severity: None,
            break_cycles: false,
        }
    }
}

impl RuntimeConfig {
    /// Parse `s` as TOML.
    ///
    /// Returns `PlangError::Config` for malformed TOML, unknown keys, a zero
    /// step budget, or a severity above 100.
    pub fn from_toml_str(s: &str) -> PlangResult<Self> {
        let config: RuntimeConfig = toml::from_str(s).map_err(|e| PlangError::Config {
            reason: format!("failed to parse runtime TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path` and parse it as TOML.
    pub fn from_file(path: &Path) -> PlangResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| PlangError::Config {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> PlangResult<()> {
        if self.max_steps == 0 {
            return Err(PlangError::Config {
                reason: "max_steps must be at least 1".to_string(),
            });
        }
        if let Some(severity) = self.blocking_severity {
            if severity > 100 {
                return Err(PlangError::Config {
                    reason: format!("blocking_severity must be 0-100, got {}", severity),
                });
            }
        }
        Ok(())
    }
}
