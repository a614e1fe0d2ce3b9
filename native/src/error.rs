//! Conversion of bridge failures into JavaScript exceptions
//!
//! The exception name becomes the thrown error's `code`, so callers can
//! branch on `err.code === 'NoSuchKeychainException'`.

use crate::types::JsKeychainRef;
use keychain_bridge::{BridgeErrorCode, KeychainError};
use napi::{Env, Error, Status};
use tracing::debug;

/// Error status carrying the bridge error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsException(pub BridgeErrorCode);

impl AsRef<str> for JsException {
    fn as_ref(&self) -> &str {
        self.0.exception_name()
    }
}

pub fn throw(error: KeychainError) -> Error<JsException> {
    debug!(
        code = error.code() as i32,
        category = %error.category(),
        context = error.context().to_json().as_deref().unwrap_or(""),
        "throwing {}",
        error.code().exception_name()
    );
    Error::new(JsException(error.code()), error.message().to_string())
}

/// Detach the reference a failed call still handed out
pub fn detach_keychain(error: &mut KeychainError) -> Option<JsKeychainRef> {
    error.take_keychain().map(JsKeychainRef::from)
}

/// Leave an exception pending that carries `keychain` next to the usual
/// `code` and message. Returning [`throw`] afterwards rethrows it.
pub fn raise_with_keychain(
    env: &Env,
    error: &KeychainError,
    keychain: JsKeychainRef,
) -> napi::Result<()> {
    let reason = error.message().to_string();
    let mut exception = env.create_error(Error::new(Status::GenericFailure, reason))?;
    exception.set_named_property("code", error.code().exception_name())?;
    exception.set_named_property("keychain", keychain)?;
    env.throw(exception)
}
