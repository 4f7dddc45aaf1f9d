//! Durable state repository configuration.

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Default file name of the pool + configuration document.
pub const DEFAULT_POOL_FILE: &str = "keys.json";

/// Default file name of the claims document.
pub const DEFAULT_CLAIMS_FILE: &str = "claims.json";

/// What to do when a persisted document exists but cannot be read or parsed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum CorruptionPolicy {
    /// Quarantine the damaged file and continue from defaults.
    #[default]
    Recover,
    /// Refuse to start; the operator must repair or remove the file.
    Abort,
}

/// Location and recovery behavior of the two persisted documents.
///
/// Both documents live in `data_dir`; temporary files used for atomic
/// replacement are created next to them so the final rename never crosses
/// a filesystem boundary.
///
/// # Validation Rules
///
/// - `pool_file` and `claims_file` must be plain, distinct file names
///
/// # Example
///
/// ```no_run
/// # use keyledger_types::config::{CorruptionPolicy, RepositoryOptions};
/// let options = RepositoryOptions::builder()
///     .data_dir("/var/lib/keyledger")
///     .corruption_policy(CorruptionPolicy::Abort)
///     .build()
///     .expect("valid repository options");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RepositoryOptions {
    /// Directory holding both documents.
    pub data_dir: PathBuf,
    /// File name of the pool + configuration document.
    #[serde(default = "default_pool_file")]
    pub pool_file: String,
    /// File name of the claims document.
    #[serde(default = "default_claims_file")]
    pub claims_file: String,
    /// Behavior when a document is unreadable or corrupt.
    #[serde(default)]
    pub corruption_policy: CorruptionPolicy,
}

#[bon::bon]
impl RepositoryOptions {
    /// Creates repository options with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if either file name is empty,
    /// contains a path separator, or both names are equal.
    #[builder]
    pub fn new(
        #[builder(into)] data_dir: PathBuf,
        #[builder(into, default = default_pool_file())] pool_file: String,
        #[builder(into, default = default_claims_file())] claims_file: String,
        #[builder(default)] corruption_policy: CorruptionPolicy,
    ) -> Result<Self, ConfigError> {
        let options = Self { data_dir, pool_file, claims_file, corruption_policy };
        options.validate()?;
        Ok(options)
    }
}

impl RepositoryOptions {
    /// Validates the file names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] on an invalid or duplicated name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, name) in [("pool_file", &self.pool_file), ("claims_file", &self.claims_file)] {
            if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
                return Err(ConfigError::Validation {
                    message: format!("{field} must be a plain file name, got '{name}'"),
                });
            }
        }
        if self.pool_file == self.claims_file {
            return Err(ConfigError::Validation {
                message: format!(
                    "pool_file and claims_file must differ, both are '{}'",
                    self.pool_file
                ),
            });
        }
        Ok(())
    }

    /// Full path of the pool + configuration document.
    #[must_use]
    pub fn pool_path(&self) -> PathBuf {
        self.data_dir.join(&self.pool_file)
    }

    /// Full path of the claims document.
    #[must_use]
    pub fn claims_path(&self) -> PathBuf {
        self.data_dir.join(&self.claims_file)
    }

    /// The data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

fn default_pool_file() -> String {
    DEFAULT_POOL_FILE.to_string()
}

fn default_claims_file() -> String {
    DEFAULT_CLAIMS_FILE.to_string()
}
