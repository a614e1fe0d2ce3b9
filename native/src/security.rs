//! Keychain entry points exported to JavaScript
//!
//! Every export is a synchronous pass-through to the bridge. Absent or
//! `null` arguments arrive as `None` and are checked by the bridge, which
//! decides whether they mean "default keychain" or a null argument.

use crate::error::{detach_keychain, raise_with_keychain, throw, JsException};
use crate::types::{JsKeychainRef, JsKeychainSettings, JsKeychainStatus};
use crate::RUNTIME;
use keychain_bridge::{
    KeychainBridge, KeychainError, KeychainRef, KeychainSettings, KeychainStatus, PlatformSecurity,
    PreferenceDomain,
};
use napi::{Env, Result};
use napi_derive::napi;
use std::sync::Arc;
use tracing::warn;

fn bridge() -> Result<Arc<KeychainBridge<PlatformSecurity>>, JsException> {
    RUNTIME.bridge().map_err(throw)
}

/// -1 selects the current preference domain
fn to_domain(raw: i32) -> Option<PreferenceDomain> {
    PreferenceDomain::from_raw(raw)
}

fn reference(keychain: &Option<JsKeychainRef>) -> Option<KeychainRef> {
    keychain.as_ref().map(JsKeychainRef::to_ref)
}

fn references(
    keychains: Option<Vec<Option<JsKeychainRef>>>,
) -> Result<Vec<Option<KeychainRef>>, JsException> {
    let keychains = keychains.ok_or_else(|| throw(KeychainError::null_argument("keychains")))?;
    Ok(keychains.iter().map(reference).collect())
}

fn to_js(keychains: Vec<KeychainRef>) -> Vec<JsKeychainRef> {
    keychains.into_iter().map(JsKeychainRef::from).collect()
}

#[napi]
pub fn keychain_create(
    path: Option<String>,
    password: Option<String>,
) -> Result<JsKeychainRef, JsException> {
    bridge()?
        .create(path.as_deref(), password.as_deref())
        .map(JsKeychainRef::from)
        .map_err(throw)
}

/// Create a keychain and apply initial settings.
///
/// When the settings cannot be applied the keychain still exists: the thrown
/// error carries its reference as `err.keychain`, which the caller must
/// release.
#[napi]
pub fn keychain_create_with_settings(
    env: Env,
    path: Option<String>,
    password: Option<String>,
    settings: Option<JsKeychainSettings>,
) -> Result<JsKeychainRef, JsException> {
    let bridge = bridge()?;
    let settings = settings.map(KeychainSettings::from);
    let result = bridge.create_with_settings(path.as_deref(), password.as_deref(), settings.as_ref());
    let mut error = match result {
        Ok(keychain) => return Ok(keychain.into()),
        Err(error) => error,
    };

    if let Some(keychain) = detach_keychain(&mut error) {
        let handle = keychain.handle;
        if let Err(e) = raise_with_keychain(&env, &error, keychain) {
            // the caller cannot see the reference, so it is released here
            warn!(handle, "unable to attach keychain to exception: {}", e);
            if let Err(released) = bridge.release(handle) {
                warn!(handle, "{}", released);
            }
        }
    }
    Err(throw(error))
}

#[napi]
pub fn keychain_delete(keychain: Option<JsKeychainRef>) -> Result<bool, JsException> {
    bridge()?.delete(reference(&keychain).as_ref()).map_err(throw)
}

#[napi]
pub fn keychain_lock(keychain: Option<JsKeychainRef>) -> Result<JsKeychainStatus, JsException> {
    bridge()?
        .lock(reference(&keychain).as_ref())
        .map(JsKeychainStatus::from)
        .map_err(throw)
}

#[napi]
pub fn keychain_lock_all() -> Result<bool, JsException> {
    bridge()?.lock_all().map_err(throw)
}

#[napi]
pub fn keychain_unlock(
    keychain: Option<JsKeychainRef>,
    password: Option<String>,
) -> Result<JsKeychainStatus, JsException> {
    bridge()?
        .unlock(reference(&keychain).as_ref(), password.as_deref())
        .map(JsKeychainStatus::from)
        .map_err(throw)
}

#[napi]
pub fn keychain_copy_settings(
    keychain: Option<JsKeychainRef>,
) -> Result<JsKeychainSettings, JsException> {
    bridge()?
        .copy_settings(reference(&keychain).as_ref())
        .map(JsKeychainSettings::from)
        .map_err(throw)
}

#[napi]
pub fn keychain_set_settings(
    keychain: Option<JsKeychainRef>,
    settings: Option<JsKeychainSettings>,
) -> Result<bool, JsException> {
    let settings = settings.map(KeychainSettings::from);
    bridge()?
        .set_settings(reference(&keychain).as_ref(), settings.as_ref())
        .map_err(throw)
}

#[napi]
pub fn keychain_open(path: Option<String>) -> Result<JsKeychainRef, JsException> {
    bridge()?
        .open(path.as_deref())
        .map(JsKeychainRef::from)
        .map_err(throw)
}

#[napi]
pub fn keychain_set_default(keychain: Option<JsKeychainRef>) -> Result<bool, JsException> {
    bridge()?.set_default(reference(&keychain).as_ref()).map_err(throw)
}

#[napi]
pub fn keychain_set_domain_default(
    domain: i32,
    keychain: Option<JsKeychainRef>,
) -> Result<bool, JsException> {
    bridge()?
        .set_domain_default(to_domain(domain), reference(&keychain).as_ref())
        .map_err(throw)
}

#[napi]
pub fn keychain_copy_default() -> Result<JsKeychainRef, JsException> {
    bridge()?
        .copy_default()
        .map(JsKeychainRef::from)
        .map_err(throw)
}

#[napi]
pub fn keychain_copy_domain_default(domain: i32) -> Result<JsKeychainRef, JsException> {
    bridge()?
        .copy_domain_default(to_domain(domain))
        .map(JsKeychainRef::from)
        .map_err(throw)
}

#[napi]
pub fn keychain_get_path(keychain: Option<JsKeychainRef>) -> Result<String, JsException> {
    bridge()?.path(reference(&keychain).as_ref()).map_err(throw)
}

#[napi]
pub fn keychain_get_status(
    keychain: Option<JsKeychainRef>,
) -> Result<JsKeychainStatus, JsException> {
    bridge()?
        .status(reference(&keychain).as_ref())
        .map(JsKeychainStatus::from)
        .map_err(throw)
}

#[napi]
pub fn keychain_set_search_list(
    keychains: Option<Vec<Option<JsKeychainRef>>>,
) -> Result<bool, JsException> {
    let keychains = references(keychains)?;
    bridge()?.set_search_list(&keychains).map_err(throw)
}

#[napi]
pub fn keychain_set_domain_search_list(
    domain: i32,
    keychains: Option<Vec<Option<JsKeychainRef>>>,
) -> Result<bool, JsException> {
    let keychains = references(keychains)?;
    bridge()?
        .set_domain_search_list(to_domain(domain), &keychains)
        .map_err(throw)
}

#[napi]
pub fn keychain_copy_search_list() -> Result<Vec<JsKeychainRef>, JsException> {
    bridge()?.copy_search_list().map(to_js).map_err(throw)
}

#[napi]
pub fn keychain_copy_domain_search_list(domain: i32) -> Result<Vec<JsKeychainRef>, JsException> {
    bridge()?
        .copy_domain_search_list(to_domain(domain))
        .map(to_js)
        .map_err(throw)
}

#[napi]
pub fn keychain_get_preference_domain() -> Result<i32, JsException> {
    bridge()?
        .preference_domain()
        .map(PreferenceDomain::raw)
        .map_err(throw)
}

#[napi]
pub fn keychain_set_preference_domain(domain: i32) -> Result<bool, JsException> {
    bridge()?
        .set_preference_domain(PreferenceDomain::new(domain))
        .map_err(throw)
}

/// Release the native keychain behind a handle. Each handle can be released once.
#[napi]
pub fn release(handle: i64) -> Result<(), JsException> {
    bridge()?.release(handle).map_err(throw)
}

#[napi]
pub fn describe_keychain_status(raw: u32) -> JsKeychainStatus {
    KeychainStatus::from_raw(raw).into()
}

#[napi]
pub fn four_char_code(bytes: Vec<u8>) -> Result<u32, JsException> {
    keychain_bridge::four_char_code(&bytes).map_err(throw)
}

#[napi]
pub fn keychain_bridge_live_handles() -> Result<u32, JsException> {
    Ok(bridge()?.live_handles() as u32)
}

/// Tear the bridge down, releasing handles JavaScript never released.
/// Returns how many there were.
#[napi]
pub fn keychain_bridge_shutdown() -> Result<u32, JsException> {
    RUNTIME.teardown().map(|released| released as u32).map_err(throw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keychain_bridge::{BridgeErrorCode, RefFlavor};

    fn js_ref(handle: i64, kind: &str) -> JsKeychainRef {
        JsKeychainRef {
            handle,
            kind: kind.to_string(),
        }
    }

    #[test]
    fn test_missing_search_list_is_null_argument() {
        let error = references(None).unwrap_err();
        assert_eq!(error.status, JsException(BridgeErrorCode::NullArgument));
        assert_eq!(error.status.as_ref(), "NullPointerException");
        assert_eq!(error.reason, "Parameter keychains should not be null");
    }

    #[test]
    fn test_search_list_keeps_null_entries() {
        let keychains = references(Some(vec![
            Some(js_ref(1, "keychain")),
            None,
            Some(js_ref(2, "default")),
        ]))
        .unwrap();

        assert_eq!(keychains.len(), 3);
        assert_eq!(keychains[0].map(|k| k.handle()), Some(1));
        assert!(keychains[1].is_none());
        assert_eq!(keychains[2].map(|k| k.flavor()), Some(RefFlavor::Default));
    }

    #[test]
    fn test_domain_sentinel() {
        assert_eq!(to_domain(-1), None);
        assert_eq!(to_domain(0), Some(PreferenceDomain::new(0)));
        assert_eq!(to_domain(3).map(PreferenceDomain::raw), Some(3));
    }

    #[test]
    fn test_copied_lists_keep_order() {
        let copied = to_js(vec![
            KeychainRef::new(5, RefFlavor::Plain),
            KeychainRef::new(3, RefFlavor::Plain),
        ]);
        let handles: Vec<i64> = copied.iter().map(|k| k.handle).collect();
        assert_eq!(handles, vec![5, 3]);
        assert!(copied.iter().all(|k| k.kind == "keychain"));
    }

    #[test]
    fn test_status_is_decoded_without_a_bridge() {
        let status = describe_keychain_status(0b111);
        assert!(status.is_unlocked);
        assert!(status.is_readable);
        assert!(status.is_writeable);
        assert!(!status.is_locked);
    }

    #[test]
    fn test_exports_before_initialization() {
        let error = keychain_copy_default().unwrap_err();
        assert_eq!(error.status, JsException(BridgeErrorCode::NotInitialized));
        assert_eq!(error.status.as_ref(), BridgeErrorCode::NotInitialized.exception_name());
    }
}
