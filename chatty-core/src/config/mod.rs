//! Configuration for chatty
//!
//! Defaults, `CHATTY_*` environment overrides, or a TOML file. Every loader
//! validates before returning.

use crate::core_session::IvPolicy;
use crate::core_vault::KdfParams;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

mod error;

pub use error::{ConfigError, ConfigResult};

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vault: VaultConfig,
    pub invite: InviteConfig,
    pub messages: MessageConfig,
    pub logging: LoggingConfig,
}

/// Local vault storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Directory holding the password hash, vault blob and pending invites
    pub data_dir: PathBuf,

    /// Minimum password length accepted when a vault is first created
    pub min_password_len: usize,

    /// Argon2id work factor for new hashes and blobs
    pub kdf: KdfParams,
}

/// Invite code publication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InviteConfig {
    /// Fresh codes tried before giving up when every candidate is taken
    pub max_issue_attempts: u32,
}

/// Per-message encryption
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    pub iv_policy: IvPolicy,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./chatty-data"),
            min_password_len: 8,
            kdf: KdfParams::default(),
        }
    }
}

impl Default for InviteConfig {
    fn default() -> Self {
        Self { max_issue_attempts: 8 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_target: true,
        }
    }
}

fn parse_var<T>(key: &'static str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue { key, reason: e.to_string() }),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Variables follow the pattern `CHATTY_<SECTION>_<KEY>`, for example
    /// `CHATTY_VAULT_DATA_DIR=/var/lib/chatty`.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Ok(dir) = env::var("CHATTY_VAULT_DATA_DIR") {
            config.vault.data_dir = PathBuf::from(dir);
        }
        if let Some(len) = parse_var("CHATTY_VAULT_MIN_PASSWORD_LEN")? {
            config.vault.min_password_len = len;
        }
        if let Some(memory) = parse_var("CHATTY_VAULT_KDF_MEMORY_KIB")? {
            config.vault.kdf.memory_kib = memory;
        }
        if let Some(iterations) = parse_var("CHATTY_VAULT_KDF_ITERATIONS")? {
            config.vault.kdf.iterations = iterations;
        }
        if let Some(parallelism) = parse_var("CHATTY_VAULT_KDF_PARALLELISM")? {
            config.vault.kdf.parallelism = parallelism;
        }

        if let Some(attempts) = parse_var("CHATTY_INVITE_MAX_ISSUE_ATTEMPTS")? {
            config.invite.max_issue_attempts = attempts;
        }

        if let Some(policy) = parse_var::<IvPolicy>("CHATTY_MESSAGES_IV_POLICY")? {
            config.messages.iv_policy = policy;
        }

        if let Ok(level) = env::var("CHATTY_LOG_LEVEL") {
            config.logging.level = level.to_lowercase();
        }
        if let Some(json) = parse_var("CHATTY_LOG_JSON")? {
            config.logging.json_format = json;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.vault.min_password_len == 0 {
            return Err(ConfigError::ValidationFailed(
                "min_password_len must be greater than 0".to_string(),
            ));
        }

        self.vault
            .kdf
            .validate()
            .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;

        if self.invite.max_issue_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_issue_attempts must be greater than 0".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}
