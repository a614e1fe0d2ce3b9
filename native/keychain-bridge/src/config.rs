use crate::error::{BridgeErrorCode, BridgeResult, KeychainError};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::warn;

pub const ENV_LOG_LEVEL: &str = "KEYCHAIN_BRIDGE_LOG_LEVEL";
pub const ENV_PATH_INCREMENT: &str = "KEYCHAIN_BRIDGE_PATH_INCREMENT";
pub const ENV_PATH_ATTEMPTS: &str = "KEYCHAIN_BRIDGE_PATH_ATTEMPTS";
pub const ENV_DELETE_CONVENTION: &str = "KEYCHAIN_BRIDGE_DELETE_CONVENTION";

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// What the boolean returned by delete means
///
/// The historical bridge returns `true` when the native delete did *not*
/// succeed. Consumers written against it rely on that, so it stays the
/// default until they opt into `ReportsSuccess`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeleteConvention {
    /// `true` when the native call failed; failures are not raised
    ReportsFailure,
    /// `true` when the native call succeeded; failures are raised
    ReportsSuccess,
}

impl FromStr for DeleteConvention {
    type Err = KeychainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "reports-failure" => Ok(DeleteConvention::ReportsFailure),
            "reports-success" => Ok(DeleteConvention::ReportsSuccess),
            other => Err(KeychainError::new(
                BridgeErrorCode::InvalidConfig,
                format!("Unknown delete convention: {}", other),
            )),
        }
    }
}

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Bytes added to the path buffer on each retry
    pub path_buffer_increment: usize,
    /// Upper bound on path retrieval attempts
    pub max_path_attempts: usize,
    pub delete_convention: DeleteConvention,
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            path_buffer_increment: 100,
            max_path_attempts: 64,
            delete_convention: DeleteConvention::ReportsFailure,
            log_level: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Defaults overlaid with `KEYCHAIN_BRIDGE_*` environment variables
    pub fn from_env() -> Self {
        Self::default().overlay(|key| env::var(key).ok())
    }

    /// Apply overrides from a lookup; unparsable values are skipped
    pub fn overlay<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level.to_lowercase();
        }
        if let Some(value) = lookup(ENV_PATH_INCREMENT) {
            match value.parse() {
                Ok(increment) => self.path_buffer_increment = increment,
                Err(_) => warn!(key = ENV_PATH_INCREMENT, %value, "ignoring unparsable value"),
            }
        }
        if let Some(value) = lookup(ENV_PATH_ATTEMPTS) {
            match value.parse() {
                Ok(attempts) => self.max_path_attempts = attempts,
                Err(_) => warn!(key = ENV_PATH_ATTEMPTS, %value, "ignoring unparsable value"),
            }
        }
        if let Some(value) = lookup(ENV_DELETE_CONVENTION) {
            match value.parse() {
                Ok(convention) => self.delete_convention = convention,
                Err(_) => warn!(key = ENV_DELETE_CONVENTION, %value, "ignoring unparsable value"),
            }
        }
        self
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.path_buffer_increment == 0 {
            return Err(KeychainError::new(
                BridgeErrorCode::InvalidConfig,
                "Path buffer increment must be greater than zero",
            ));
        }

        if self.max_path_attempts == 0 {
            return Err(KeychainError::new(
                BridgeErrorCode::InvalidConfig,
                "Path attempts must be greater than zero",
            ));
        }

        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(KeychainError::new(
                BridgeErrorCode::InvalidConfig,
                format!("Invalid log level: {}", self.log_level),
            ));
        }

        Ok(())
    }
}
