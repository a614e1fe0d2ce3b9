/**
 * Keychain operation dispatcher
 *
 * One method per bridge entry point. Each validates its arguments, resolves
 * handles, makes a single native call (the path lookup may repeat it with a
 * larger buffer), translates failures and wraps results.
 */

use crate::collection;
use crate::config::{BridgeConfig, DeleteConvention};
use crate::error::{BridgeResult, KeychainError};
use crate::handle::{HandleRegistry, KeychainHandle, KeychainRef, RefFlavor};
use crate::native::{NativeResult, RawKeychain, SecurityApi};
use crate::settings::{self, KeychainSettings, SettingsRecord};
use crate::status::{KeychainStatus, OsStatus, PreferenceDomain, ERR_SEC_BUFFER_TOO_SMALL};
use crate::translate::translate;
use tracing::{debug, info, warn};

const CREATE_FAILED: &str = "Failed to create keychain.";
const DELETE_FAILED: &str = "Failed to delete keychain.";
const LOCK_FAILED: &str = "Unable to lock keychain.";
const LOCK_ALL_FAILED: &str = "Unable to lock all keychains.";
const UNLOCK_FAILED: &str = "Unable to unlock keychain.";
const COPY_SETTINGS_FAILED: &str = "Failed to copy keychain settings.";
const SET_SETTINGS_FAILED: &str = "Failed to set keychain settings.";
const OPEN_FAILED: &str = "Failed to open keychain.";
const SET_DEFAULT_FAILED: &str = "Failed to set default keychain.";
const COPY_DEFAULT_FAILED: &str = "Failed to copy default keychain.";
const GET_PATH_FAILED: &str = "Unable to fetch keychain path.";
const GET_STATUS_FAILED: &str = "Unable to fetch keychain status.";
const SET_SEARCH_LIST_FAILED: &str = "Failed to set keychain searchlist.";
const COPY_SEARCH_LIST_FAILED: &str = "Failed to copy keychain searchlist.";
const GET_DOMAIN_FAILED: &str = "Failed to get keychain preference domain.";
const SET_DOMAIN_FAILED: &str = "Failed to set keychain preference domain.";

/// Path bytes up to the first NUL. Bytes that are not UTF-8 are an error
/// rather than a path that names a different file.
fn decode_path(bytes: &[u8]) -> BridgeResult<String> {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8(bytes[..end].to_vec()).map_err(|e| {
        warn!(valid_up_to = e.utf8_error().valid_up_to(), "keychain path is not valid UTF-8");
        KeychainError::illegal_argument("Keychain path is not valid UTF-8")
            .operation("keychain_get_path")
            .metadata("valid_up_to", e.utf8_error().valid_up_to().to_string())
    })
}

fn required<'a, T: ?Sized>(value: Option<&'a T>, parameter: &str) -> BridgeResult<&'a T> {
    value.ok_or_else(|| KeychainError::null_argument(parameter))
}

/// Bridge between managed callers and a keychain service
#[derive(Debug)]
pub struct KeychainBridge<A: SecurityApi> {
    api: A,
    registry: HandleRegistry,
    config: BridgeConfig,
}

impl<A: SecurityApi> KeychainBridge<A> {
    pub fn new(api: A, config: BridgeConfig) -> Self {
        Self {
            api,
            registry: HandleRegistry::new(),
            config,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn fail(&self, status: OsStatus, context: &str, operation: &str) -> KeychainError {
        translate(&self.api, status, context).operation(operation)
    }

    fn call<T>(&self, result: NativeResult<T>, context: &str, operation: &str) -> BridgeResult<T> {
        result.map_err(|status| self.fail(status, context, operation))
    }

    /// Absent references select the default keychain
    fn optional_keychain(&self, keychain: Option<&KeychainRef>) -> BridgeResult<Option<RawKeychain>> {
        keychain.map(|k| self.registry.unwrap(Some(k))).transpose()
    }

    pub fn create(&self, path: Option<&str>, password: Option<&str>) -> BridgeResult<KeychainRef> {
        let path = required(path, "keychain")?;
        let password = required(password, "password")?;

        debug!(path, "creating keychain");
        let raw = self.call(
            self.api.create(path, password.as_bytes()),
            CREATE_FAILED,
            "keychain_create",
        )?;
        let keychain = self.registry.wrap(raw, RefFlavor::Plain);
        info!(path, handle = keychain.handle(), "created keychain");
        Ok(keychain)
    }

    /// Create and apply initial settings.
    ///
    /// The keychain is not rolled back when applying settings fails; the
    /// returned error carries the new reference, which the caller now owns.
    pub fn create_with_settings(
        &self,
        path: Option<&str>,
        password: Option<&str>,
        initial_settings: Option<&KeychainSettings>,
    ) -> BridgeResult<KeychainRef> {
        let keychain = self.create(path, password)?;
        if let Some(initial_settings) = initial_settings {
            self.set_settings(Some(&keychain), Some(initial_settings))
                .map_err(|e| e.with_keychain(keychain))?;
        }
        Ok(keychain)
    }

    /// Delete the keychain file; see `DeleteConvention` for the return value
    pub fn delete(&self, keychain: Option<&KeychainRef>) -> BridgeResult<bool> {
        let raw = self.registry.unwrap(keychain)?;
        let result = self.api.delete(raw);

        match self.config.delete_convention {
            DeleteConvention::ReportsFailure => {
                if let Err(status) = result {
                    warn!(status, "native keychain delete failed");
                }
                Ok(result.is_err())
            }
            DeleteConvention::ReportsSuccess => {
                self.call(result, DELETE_FAILED, "keychain_delete")?;
                Ok(true)
            }
        }
    }

    pub fn lock(&self, keychain: Option<&KeychainRef>) -> BridgeResult<KeychainStatus> {
        let raw = self.optional_keychain(keychain)?;
        self.call(self.api.lock(raw), LOCK_FAILED, "keychain_lock")?;
        self.status(keychain)
    }

    pub fn lock_all(&self) -> BridgeResult<bool> {
        self.call(self.api.lock_all(), LOCK_ALL_FAILED, "keychain_lock_all")?;
        Ok(true)
    }

    pub fn unlock(&self, keychain: Option<&KeychainRef>, password: Option<&str>) -> BridgeResult<KeychainStatus> {
        let raw = self.optional_keychain(keychain)?;
        let password = required(password, "password")?;
        self.call(
            self.api.unlock(raw, password.as_bytes()),
            UNLOCK_FAILED,
            "keychain_unlock",
        )?;
        self.status(keychain)
    }

    pub fn copy_settings(&self, keychain: Option<&KeychainRef>) -> BridgeResult<KeychainSettings> {
        let raw = self.optional_keychain(keychain)?;
        let mut record = SettingsRecord::query_template();
        self.call(
            self.api.copy_settings(raw, &mut record),
            COPY_SETTINGS_FAILED,
            "keychain_copy_settings",
        )?;
        Ok(settings::to_managed(&record))
    }

    pub fn set_settings(
        &self,
        keychain: Option<&KeychainRef>,
        new_settings: Option<&KeychainSettings>,
    ) -> BridgeResult<bool> {
        let raw = self.optional_keychain(keychain)?;
        let new_settings = required(new_settings, "settings")?;
        let record = settings::to_native(new_settings);
        self.call(
            self.api.set_settings(raw, &record),
            SET_SETTINGS_FAILED,
            "keychain_set_settings",
        )?;
        Ok(true)
    }

    pub fn open(&self, path: Option<&str>) -> BridgeResult<KeychainRef> {
        let path = required(path, "keychainPath")?;
        let raw = self.call(self.api.open(path), OPEN_FAILED, "keychain_open")?;
        Ok(self.registry.wrap(raw, RefFlavor::Plain))
    }

    pub fn set_default(&self, keychain: Option<&KeychainRef>) -> BridgeResult<bool> {
        self.set_domain_default(None, keychain)
    }

    pub fn set_domain_default(
        &self,
        domain: Option<PreferenceDomain>,
        keychain: Option<&KeychainRef>,
    ) -> BridgeResult<bool> {
        let raw = self.registry.unwrap(keychain)?;
        let result = match domain {
            None => self.api.set_default(raw),
            Some(domain) => self.api.set_domain_default(domain, raw),
        };
        self.call(result, SET_DEFAULT_FAILED, "keychain_set_default")?;
        Ok(true)
    }

    pub fn copy_default(&self) -> BridgeResult<KeychainRef> {
        self.copy_domain_default(None)
    }

    pub fn copy_domain_default(&self, domain: Option<PreferenceDomain>) -> BridgeResult<KeychainRef> {
        let result = match domain {
            None => self.api.copy_default(),
            Some(domain) => self.api.copy_domain_default(domain),
        };
        let raw = self.call(result, COPY_DEFAULT_FAILED, "keychain_copy_default")?;
        Ok(self.registry.wrap(raw, RefFlavor::Default))
    }

    /// Filesystem path of a keychain, growing the buffer until it fits
    pub fn path(&self, keychain: Option<&KeychainRef>) -> BridgeResult<String> {
        let raw = self.registry.unwrap(keychain)?;
        let increment = self.config.path_buffer_increment;

        for attempt in 1..=self.config.max_path_attempts {
            let size = increment.saturating_mul(attempt);
            let mut buffer = vec![0u8; size];
            match self.api.get_path(raw, &mut buffer) {
                Ok(length) => return decode_path(&buffer[..length.min(size)]),
                Err(ERR_SEC_BUFFER_TOO_SMALL) => {
                    debug!(attempt, size, "keychain path buffer too small");
                }
                Err(status) => return Err(self.fail(status, GET_PATH_FAILED, "keychain_get_path")),
            }
        }

        warn!(
            attempts = self.config.max_path_attempts,
            "giving up on keychain path retrieval"
        );
        Err(self
            .fail(ERR_SEC_BUFFER_TOO_SMALL, GET_PATH_FAILED, "keychain_get_path")
            .metadata("attempts", self.config.max_path_attempts.to_string()))
    }

    pub fn status(&self, keychain: Option<&KeychainRef>) -> BridgeResult<KeychainStatus> {
        let raw = self.optional_keychain(keychain)?;
        let status = self.call(
            self.api.get_status(raw),
            GET_STATUS_FAILED,
            "keychain_get_status",
        )?;
        Ok(KeychainStatus::from_raw(status))
    }

    pub fn set_search_list(&self, keychains: &[Option<KeychainRef>]) -> BridgeResult<bool> {
        self.set_domain_search_list(None, keychains)
    }

    pub fn set_domain_search_list(
        &self,
        domain: Option<PreferenceDomain>,
        keychains: &[Option<KeychainRef>],
    ) -> BridgeResult<bool> {
        let list = collection::to_native(&self.api, &self.registry, keychains)?;
        let result = match domain {
            None => self.api.set_search_list(&list),
            Some(domain) => self.api.set_domain_search_list(domain, &list),
        };
        drop(list);

        self.call(result, SET_SEARCH_LIST_FAILED, "keychain_set_search_list")?;
        Ok(true)
    }

    pub fn copy_search_list(&self) -> BridgeResult<Vec<KeychainRef>> {
        self.copy_domain_search_list(None)
    }

    pub fn copy_domain_search_list(&self, domain: Option<PreferenceDomain>) -> BridgeResult<Vec<KeychainRef>> {
        let result = match domain {
            None => self.api.copy_search_list(),
            Some(domain) => self.api.copy_domain_search_list(domain),
        };
        let list = self.call(result, COPY_SEARCH_LIST_FAILED, "keychain_copy_search_list")?;
        let keychains = collection::to_managed(&self.api, &self.registry, &list);
        drop(list);
        Ok(keychains)
    }

    pub fn preference_domain(&self) -> BridgeResult<PreferenceDomain> {
        self.call(
            self.api.get_preference_domain(),
            GET_DOMAIN_FAILED,
            "keychain_get_preference_domain",
        )
    }

    pub fn set_preference_domain(&self, domain: PreferenceDomain) -> BridgeResult<bool> {
        self.call(
            self.api.set_preference_domain(domain),
            SET_DOMAIN_FAILED,
            "keychain_set_preference_domain",
        )?;
        Ok(true)
    }

    /// Drop the native retain behind a handle; valid once per handle
    pub fn release(&self, handle: KeychainHandle) -> BridgeResult<()> {
        let raw = self.registry.release(handle)?;
        self.api.release(raw);
        Ok(())
    }

    /// Release every handle still live, returning how many were released
    pub fn release_all(&self) -> usize {
        let live = self.registry.drain_live();
        for raw in &live {
            self.api.release(*raw);
        }
        live.len()
    }

    pub fn live_handles(&self) -> usize {
        self.registry.live_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeErrorCode;
    use crate::native::{MemorySecurity, NativeOp};
    use crate::status::{ERR_SEC_AUTH_FAILED, ERR_SEC_NO_DEFAULT_KEYCHAIN};

    fn bridge() -> KeychainBridge<MemorySecurity> {
        KeychainBridge::new(MemorySecurity::new(), BridgeConfig::default())
    }

    #[test]
    fn test_decode_path_stops_at_nul() {
        assert_eq!(decode_path(b"/tmp/a.keychain\0junk").unwrap(), "/tmp/a.keychain");
        assert_eq!(decode_path(b"/tmp/b.keychain").unwrap(), "/tmp/b.keychain");
        assert_eq!(decode_path("/tmp/caf\u{e9}.keychain\0".as_bytes()).unwrap(), "/tmp/caf\u{e9}.keychain");
    }

    #[test]
    fn test_decode_path_rejects_invalid_utf8() {
        let error = decode_path(b"/tmp/\xff\xfe.keychain\0").unwrap_err();
        assert_eq!(error.code(), BridgeErrorCode::IllegalArgument);
        assert_eq!(error.message(), "Keychain path is not valid UTF-8");
        assert_eq!(error.context().operation.as_deref(), Some("keychain_get_path"));
        assert_eq!(error.context().metadata.get("valid_up_to").map(String::as_str), Some("5"));
    }

    #[test]
    fn test_create_requires_arguments() {
        let bridge = bridge();
        let error = bridge.create(None, Some("pw")).unwrap_err();
        assert_eq!(error.code(), BridgeErrorCode::NullArgument);
        assert_eq!(error.message(), "Parameter keychain should not be null");

        let error = bridge.create(Some("/tmp/a.keychain"), None).unwrap_err();
        assert_eq!(error.message(), "Parameter password should not be null");
        assert!(!bridge.api().keychain_exists("/tmp/a.keychain"));
    }

    #[test]
    fn test_create_duplicate() {
        let bridge = bridge();
        bridge.create(Some("/tmp/a.keychain"), Some("pw")).unwrap();
        let error = bridge.create(Some("/tmp/a.keychain"), Some("pw")).unwrap_err();

        assert_eq!(error.code(), BridgeErrorCode::DuplicateKeychain);
        assert!(error.message().starts_with("Failed to create keychain. Error: '"));
        assert_eq!(error.context().operation.as_deref(), Some("keychain_create"));
    }

    #[test]
    fn test_unlock_with_wrong_password() {
        let bridge = bridge();
        let keychain = bridge.create(Some("/tmp/a.keychain"), Some("pw")).unwrap();
        bridge.lock(Some(&keychain)).unwrap();

        let error = bridge.unlock(Some(&keychain), Some("wrong")).unwrap_err();
        assert_eq!(error.code(), BridgeErrorCode::InvalidKeychainCredentials);
        assert_eq!(error.status(), Some(ERR_SEC_AUTH_FAILED));

        let error = bridge.unlock(Some(&keychain), None).unwrap_err();
        assert_eq!(error.code(), BridgeErrorCode::NullArgument);
    }

    #[test]
    fn test_lock_returns_post_lock_status() {
        let bridge = bridge();
        let keychain = bridge.create(Some("/tmp/a.keychain"), Some("pw")).unwrap();
        assert!(bridge.status(Some(&keychain)).unwrap().is_unlocked());

        let status = bridge.lock(Some(&keychain)).unwrap();
        assert!(status.is_locked());

        let status = bridge.unlock(Some(&keychain), Some("pw")).unwrap();
        assert!(status.is_unlocked());
    }

    #[test]
    fn test_no_default_keychain() {
        let bridge = bridge();
        let error = bridge.copy_default().unwrap_err();
        assert_eq!(error.code(), BridgeErrorCode::NoDefaultKeychain);
        assert_eq!(error.status(), Some(ERR_SEC_NO_DEFAULT_KEYCHAIN));
        assert_eq!(
            error.message(),
            "Failed to copy default keychain. Error: 'A default keychain could not be found.'"
        );
    }

    #[test]
    fn test_copy_default_is_default_flavored() {
        let bridge = bridge();
        let keychain = bridge.create(Some("/tmp/a.keychain"), Some("pw")).unwrap();
        bridge.set_default(Some(&keychain)).unwrap();

        let default = bridge.copy_default().unwrap();
        assert_eq!(default.flavor(), RefFlavor::Default);
        assert_eq!(bridge.path(Some(&default)).unwrap(), "/tmp/a.keychain");
    }

    #[test]
    fn test_lock_all_failure_is_translated() {
        let bridge = bridge();
        bridge.api().fail_next(NativeOp::LockAll, -25291);
        let error = bridge.lock_all().unwrap_err();
        assert_eq!(error.code(), BridgeErrorCode::MacOsSecurity);
        assert!(error.message().starts_with("Unable to lock all keychains. Error: '"));
        assert!(bridge.lock_all().unwrap());
    }

    #[test]
    fn test_release_returns_native_retain() {
        let bridge = bridge();
        let keychain = bridge.create(Some("/tmp/a.keychain"), Some("pw")).unwrap();
        let raw = bridge.registry().resolve(keychain.handle()).unwrap();

        bridge.release(keychain.handle()).unwrap();
        assert_eq!(bridge.api().retain_count(raw), None);

        let error = bridge.status(Some(&keychain)).unwrap_err();
        assert_eq!(error.code(), BridgeErrorCode::ReleasedHandle);
        let error = bridge.release(keychain.handle()).unwrap_err();
        assert_eq!(error.code(), BridgeErrorCode::ReleasedHandle);
    }
}
