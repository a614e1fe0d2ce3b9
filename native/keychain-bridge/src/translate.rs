// Native status translation
//
// Maps a failing `OsStatus` onto the error taxonomy and builds the message
// callers see: "<context> Error: '<native message>'".

use crate::error::{BridgeErrorCode, KeychainError};
use crate::native::SecurityApi;
use crate::status::{
    OsStatus, ERR_SEC_AUTH_FAILED, ERR_SEC_DUPLICATE_KEYCHAIN, ERR_SEC_INVALID_KEYCHAIN,
    ERR_SEC_INVALID_PREFS_DOMAIN, ERR_SEC_NO_DEFAULT_KEYCHAIN, ERR_SEC_NO_SUCH_KEYCHAIN,
};
use tracing::warn;

const STATUS_TABLE: &[(OsStatus, BridgeErrorCode)] = &[
    (ERR_SEC_NO_SUCH_KEYCHAIN, BridgeErrorCode::NoSuchKeychain),
    (ERR_SEC_INVALID_KEYCHAIN, BridgeErrorCode::InvalidKeychain),
    (ERR_SEC_AUTH_FAILED, BridgeErrorCode::InvalidKeychainCredentials),
    (ERR_SEC_DUPLICATE_KEYCHAIN, BridgeErrorCode::DuplicateKeychain),
    (ERR_SEC_NO_DEFAULT_KEYCHAIN, BridgeErrorCode::NoDefaultKeychain),
    (ERR_SEC_INVALID_PREFS_DOMAIN, BridgeErrorCode::InvalidPreferenceDomain),
];

/// Most specific error code for a status
pub fn error_code(status: OsStatus) -> BridgeErrorCode {
    STATUS_TABLE
        .iter()
        .find(|(known, _)| *known == status)
        .map(|(_, code)| *code)
        .unwrap_or(BridgeErrorCode::MacOsSecurity)
}

/// Platform message for a status, or a generic one naming the code
pub fn status_message<A: SecurityApi + ?Sized>(api: &A, status: OsStatus) -> String {
    api.error_message(status)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("OSStatus {}", status))
}

/// Build the error for a failed native call
pub fn translate<A: SecurityApi + ?Sized>(api: &A, status: OsStatus, context: &str) -> KeychainError {
    let code = error_code(status);
    let native_message = status_message(api, status);
    warn!(
        status,
        exception = code.exception_name(),
        "{} {}",
        context,
        native_message
    );
    KeychainError::from_status(code, status, format!("{} Error: '{}'", context, native_message))
        .metadata("status", status.to_string())
}
