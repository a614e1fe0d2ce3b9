// Keychain service for hosts without Security.framework
//
// Every keychain call fails with `errSecNotAvailable`, so the addon loads
// and reports a keychain error instead of pretending to persist secrets.

use super::{KeychainList, NativeResult, RawKeychain, SecurityApi};
use crate::settings::SettingsRecord;
use crate::status::{OsStatus, PreferenceDomain, ERR_SEC_NOT_AVAILABLE};

#[derive(Debug, Default)]
pub struct UnavailableList {
    items: Vec<RawKeychain>,
}

impl KeychainList for UnavailableList {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn get(&self, index: usize) -> Option<RawKeychain> {
        self.items.get(index).copied()
    }

    fn push(&mut self, keychain: RawKeychain) {
        self.items.push(keychain);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSecurity;

impl UnavailableSecurity {
    pub fn new() -> Self {
        Self
    }
}

impl SecurityApi for UnavailableSecurity {
    type List = UnavailableList;

    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn new_list(&self, capacity: usize) -> UnavailableList {
        UnavailableList {
            items: Vec::with_capacity(capacity),
        }
    }

    fn create(&self, _path: &str, _password: &[u8]) -> NativeResult<RawKeychain> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    fn open(&self, _path: &str) -> NativeResult<RawKeychain> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    fn delete(&self, _keychain: RawKeychain) -> NativeResult<()> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    fn lock(&self, _keychain: Option<RawKeychain>) -> NativeResult<()> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    fn lock_all(&self) -> NativeResult<()> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    fn unlock(&self, _keychain: Option<RawKeychain>, _password: &[u8]) -> NativeResult<()> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    fn copy_settings(&self, _keychain: Option<RawKeychain>, _settings: &mut SettingsRecord) -> NativeResult<()> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    fn set_settings(&self, _keychain: Option<RawKeychain>, _settings: &SettingsRecord) -> NativeResult<()> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    fn set_default(&self, _keychain: RawKeychain) -> NativeResult<()> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    fn set_domain_default(&self, _domain: PreferenceDomain, _keychain: RawKeychain) -> NativeResult<()> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    fn copy_default(&self) -> NativeResult<RawKeychain> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    fn copy_domain_default(&self, _domain: PreferenceDomain) -> NativeResult<RawKeychain> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    fn get_path(&self, _keychain: RawKeychain, _buffer: &mut [u8]) -> NativeResult<usize> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    fn get_status(&self, _keychain: Option<RawKeychain>) -> NativeResult<u32> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    fn set_search_list(&self, _list: &UnavailableList) -> NativeResult<()> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    fn set_domain_search_list(&self, _domain: PreferenceDomain, _list: &UnavailableList) -> NativeResult<()> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    fn copy_search_list(&self) -> NativeResult<UnavailableList> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    fn copy_domain_search_list(&self, _domain: PreferenceDomain) -> NativeResult<UnavailableList> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    fn get_preference_domain(&self) -> NativeResult<PreferenceDomain> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    fn set_preference_domain(&self, _domain: PreferenceDomain) -> NativeResult<()> {
        Err(ERR_SEC_NOT_AVAILABLE)
    }

    // no handle is ever issued, so there is nothing to count
    fn retain(&self, _keychain: RawKeychain) {}

    fn release(&self, _keychain: RawKeychain) {}

    fn error_message(&self, status: OsStatus) -> Option<String> {
        match status {
            ERR_SEC_NOT_AVAILABLE => Some("Keychain services are only available on macOS.".to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_call_reports_not_available() {
        let api = UnavailableSecurity::new();
        assert_eq!(api.create("/tmp/a.keychain", b"pw"), Err(ERR_SEC_NOT_AVAILABLE));
        assert_eq!(api.open("/tmp/a.keychain"), Err(ERR_SEC_NOT_AVAILABLE));
        assert_eq!(api.copy_default(), Err(ERR_SEC_NOT_AVAILABLE));
        assert_eq!(api.lock_all(), Err(ERR_SEC_NOT_AVAILABLE));
        assert_eq!(api.get_status(None), Err(ERR_SEC_NOT_AVAILABLE));
        assert!(api.copy_search_list().is_err());
        assert_eq!(api.name(), "unavailable");
    }

    #[test]
    fn test_message_names_the_platform() {
        let api = UnavailableSecurity::new();
        let message = api.error_message(ERR_SEC_NOT_AVAILABLE).unwrap();
        assert!(message.contains("macOS"));
        assert_eq!(api.error_message(-50), None);
    }
}
