/**
 * Error taxonomy for the keychain bridge
 *
 * Every failure carries a numbered code grouped by range, the native
 * status that caused it (when there is one) and enough context for the
 * managed side to branch on the exception kind.
 */

use crate::handle::KeychainRef;
use crate::status::OsStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Error codes exposed across the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BridgeErrorCode {
    // Keychain status errors (1000-1099)
    NoSuchKeychain = 1000,
    InvalidKeychain = 1001,
    InvalidKeychainCredentials = 1002,
    DuplicateKeychain = 1003,
    NoDefaultKeychain = 1004,
    InvalidPreferenceDomain = 1005,
    MacOsSecurity = 1099,

    // Argument errors (2000-2099)
    NullArgument = 2000,
    IllegalArgument = 2001,

    // Handle errors (3000-3099)
    ReleasedHandle = 3000,
    UnknownHandle = 3001,

    // Runtime errors (4000-4099)
    NotInitialized = 4000,
    AlreadyInitialized = 4001,
    InvalidConfig = 4002,
}

/// Coarse grouping used for logging and the error info payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    Keychain,
    Argument,
    Handle,
    Runtime,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Keychain => "keychain",
            ErrorCategory::Argument => "argument",
            ErrorCategory::Handle => "handle",
            ErrorCategory::Runtime => "runtime",
        };
        f.write_str(name)
    }
}

impl BridgeErrorCode {
    pub fn category(&self) -> ErrorCategory {
        match *self as u32 {
            1000..=1099 => ErrorCategory::Keychain,
            2000..=2099 => ErrorCategory::Argument,
            3000..=3099 => ErrorCategory::Handle,
            _ => ErrorCategory::Runtime,
        }
    }

    /// Name of the managed exception type this code is thrown as
    pub fn exception_name(&self) -> &'static str {
        match self {
            BridgeErrorCode::NoSuchKeychain => "NoSuchKeychainException",
            BridgeErrorCode::InvalidKeychain => "InvalidKeychainException",
            BridgeErrorCode::InvalidKeychainCredentials => "InvalidKeychainCredentialsException",
            BridgeErrorCode::DuplicateKeychain => "DuplicateKeychainException",
            BridgeErrorCode::NoDefaultKeychain => "NoDefaultKeychainException",
            BridgeErrorCode::InvalidPreferenceDomain => "InvalidPreferenceDomainException",
            BridgeErrorCode::MacOsSecurity => "MacOsSecurityException",
            BridgeErrorCode::NullArgument => "NullPointerException",
            BridgeErrorCode::IllegalArgument => "IllegalArgumentException",
            BridgeErrorCode::ReleasedHandle => "ReleasedKeychainException",
            BridgeErrorCode::UnknownHandle => "UnknownKeychainException",
            BridgeErrorCode::NotInitialized => "BridgeNotInitializedException",
            BridgeErrorCode::AlreadyInitialized => "BridgeAlreadyInitializedException",
            BridgeErrorCode::InvalidConfig => "InvalidBridgeConfigException",
        }
    }

    /// True for codes produced by translating a native status
    pub fn is_native(&self) -> bool {
        self.category() == ErrorCategory::Keychain
    }
}

impl AsRef<str> for BridgeErrorCode {
    fn as_ref(&self) -> &str {
        self.exception_name()
    }
}

/// Where an error happened, serialised into the error info payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// JSON for the managed side; `None` when there is nothing to report
    pub fn to_json(&self) -> Option<String> {
        if self.operation.is_none() && self.metadata.is_empty() {
            return None;
        }
        serde_json::to_string(self).ok()
    }
}

/// Bridge failure
#[derive(Debug, Error)]
#[error("{message}")]
pub struct KeychainError {
    code: BridgeErrorCode,
    status: Option<OsStatus>,
    message: String,
    context: ErrorContext,
    keychain: Option<KeychainRef>,
}

impl KeychainError {
    pub fn new(code: BridgeErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            status: None,
            message: message.into(),
            context: ErrorContext::new(),
            keychain: None,
        }
    }

    /// Error originating from a non-zero native status
    pub fn from_status(code: BridgeErrorCode, status: OsStatus, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(code, message)
        }
    }

    pub fn null_argument(parameter: &str) -> Self {
        Self::new(
            BridgeErrorCode::NullArgument,
            format!("Parameter {} should not be null", parameter),
        )
        .metadata("parameter", parameter)
    }

    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::new(BridgeErrorCode::IllegalArgument, message)
    }

    pub fn released_handle(handle: i64) -> Self {
        Self::new(
            BridgeErrorCode::ReleasedHandle,
            format!("Keychain handle {} has already been released", handle),
        )
        .metadata("handle", handle.to_string())
    }

    pub fn unknown_handle(handle: i64) -> Self {
        Self::new(
            BridgeErrorCode::UnknownHandle,
            format!("Keychain handle {} was not issued by this bridge", handle),
        )
        .metadata("handle", handle.to_string())
    }

    pub fn not_initialized() -> Self {
        Self::new(
            BridgeErrorCode::NotInitialized,
            "Keychain bridge is not initialized",
        )
    }

    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach a keychain reference the failed operation already produced
    pub fn with_keychain(mut self, keychain: KeychainRef) -> Self {
        self.keychain = Some(keychain);
        self
    }

    pub fn code(&self) -> BridgeErrorCode {
        self.code
    }

    pub fn status(&self) -> Option<OsStatus> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    pub fn keychain(&self) -> Option<&KeychainRef> {
        self.keychain.as_ref()
    }

    /// Give up ownership of an attached reference
    pub fn take_keychain(&mut self) -> Option<KeychainRef> {
        self.keychain.take()
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.code as i32,
            exception: self.code.exception_name().to_string(),
            message: self.message.clone(),
            status: self.status,
            category: self.category().to_string(),
            context: self.context.to_json(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Serialisable error payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub code: i32,
    pub exception: String,
    pub message: String,
    pub status: Option<OsStatus>,
    pub category: String,
    pub context: Option<String>,
    pub timestamp: String,
}

pub type BridgeResult<T> = std::result::Result<T, KeychainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_categories() {
        assert_eq!(BridgeErrorCode::DuplicateKeychain.category(), ErrorCategory::Keychain);
        assert_eq!(BridgeErrorCode::MacOsSecurity.category(), ErrorCategory::Keychain);
        assert_eq!(BridgeErrorCode::NullArgument.category(), ErrorCategory::Argument);
        assert_eq!(BridgeErrorCode::ReleasedHandle.category(), ErrorCategory::Handle);
        assert_eq!(BridgeErrorCode::InvalidConfig.category(), ErrorCategory::Runtime);
        assert!(BridgeErrorCode::NoDefaultKeychain.is_native());
        assert!(!BridgeErrorCode::IllegalArgument.is_native());
    }

    #[test]
    fn test_null_argument_message() {
        let error = KeychainError::null_argument("keychain");
        assert_eq!(error.code(), BridgeErrorCode::NullArgument);
        assert_eq!(error.to_string(), "Parameter keychain should not be null");
        assert_eq!(error.code().as_ref(), "NullPointerException");
        assert_eq!(error.status(), None);
    }

    #[test]
    fn test_error_context_json() {
        let context = ErrorContext::new()
            .with_operation("keychain_create")
            .with_metadata("path", "/tmp/test.keychain");

        let json = context.to_json().unwrap();
        assert!(json.contains("keychain_create"));
        assert!(json.contains("/tmp/test.keychain"));
        assert_eq!(ErrorContext::new().to_json(), None);
    }

    #[test]
    fn test_error_context_json_omits_empty_parts() {
        let operation_only = ErrorContext::new().with_operation("keychain_lock");
        assert_eq!(operation_only.to_json().unwrap(), r#"{"operation":"keychain_lock"}"#);

        let metadata_only = ErrorContext::new()
            .with_metadata("status", "-25294")
            .with_metadata("attempts", "3");
        let value: serde_json::Value = serde_json::from_str(&metadata_only.to_json().unwrap()).unwrap();
        assert!(value.get("operation").is_none());
        assert_eq!(value["metadata"]["status"], "-25294");
        assert_eq!(value["metadata"]["attempts"], "3");
    }

    #[test]
    fn test_error_info_conversion() {
        let error = KeychainError::from_status(BridgeErrorCode::NoSuchKeychain, -25294, "gone")
            .operation("keychain_get_status");
        let info = error.to_error_info();

        assert_eq!(info.code, 1000);
        assert_eq!(info.exception, "NoSuchKeychainException");
        assert_eq!(info.status, Some(-25294));
        assert_eq!(info.category, "keychain");
        assert!(info.context.unwrap().contains("keychain_get_status"));
    }
}
