//! Values exchanged with JavaScript

use keychain_bridge::{KeychainRef, KeychainSettings, KeychainStatus, RefFlavor};
use napi_derive::napi;

pub const KIND_KEYCHAIN: &str = "keychain";
pub const KIND_DEFAULT: &str = "default";

/// Reference to a native keychain
#[napi(object)]
#[derive(Debug, Clone)]
pub struct JsKeychainRef {
    /// Opaque handle issued by the bridge
    pub handle: i64,
    /// "keychain" or "default"
    pub kind: String,
}

impl JsKeychainRef {
    pub fn to_ref(&self) -> KeychainRef {
        let flavor = if self.kind == KIND_DEFAULT {
            RefFlavor::Default
        } else {
            RefFlavor::Plain
        };
        KeychainRef::new(self.handle, flavor)
    }
}

impl From<KeychainRef> for JsKeychainRef {
    fn from(keychain: KeychainRef) -> Self {
        let kind = match keychain.flavor() {
            RefFlavor::Plain => KIND_KEYCHAIN,
            RefFlavor::Default => KIND_DEFAULT,
        };
        Self {
            handle: keychain.handle(),
            kind: kind.to_string(),
        }
    }
}

#[napi(object)]
#[derive(Debug, Clone)]
pub struct JsKeychainSettings {
    pub lock_when_system_sleeps: bool,
    /// Seconds of inactivity before locking; 2147483647 disables the timeout
    pub timeout: i32,
}

impl From<JsKeychainSettings> for KeychainSettings {
    fn from(settings: JsKeychainSettings) -> Self {
        KeychainSettings::new(settings.lock_when_system_sleeps, settings.timeout)
    }
}

impl From<KeychainSettings> for JsKeychainSettings {
    fn from(settings: KeychainSettings) -> Self {
        Self {
            lock_when_system_sleeps: settings.lock_on_sleep,
            timeout: settings.timeout,
        }
    }
}

/// Decoded keychain status bitmask
#[napi(object)]
#[derive(Debug, Clone)]
pub struct JsKeychainStatus {
    pub raw: u32,
    pub is_unlocked: bool,
    pub is_locked: bool,
    pub is_readable: bool,
    pub is_writeable: bool,
    pub description: String,
}

impl From<KeychainStatus> for JsKeychainStatus {
    fn from(status: KeychainStatus) -> Self {
        Self {
            raw: status.raw(),
            is_unlocked: status.is_unlocked(),
            is_locked: status.is_locked(),
            is_readable: status.is_readable(),
            is_writeable: status.is_writeable(),
            description: status.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keychain_bridge::NO_TIMEOUT;

    #[test]
    fn test_reference_kind_round_trip() {
        let plain = JsKeychainRef::from(KeychainRef::new(4, RefFlavor::Plain));
        assert_eq!(plain.kind, KIND_KEYCHAIN);
        assert_eq!(plain.to_ref().flavor(), RefFlavor::Plain);

        let default = JsKeychainRef::from(KeychainRef::new(5, RefFlavor::Default));
        assert_eq!(default.kind, KIND_DEFAULT);
        assert_eq!(default.to_ref().flavor(), RefFlavor::Default);
        assert_eq!(default.to_ref().handle(), 5);
    }

    #[test]
    fn test_unrecognised_kind_is_plain() {
        let reference = JsKeychainRef {
            handle: 6,
            kind: "something-else".to_string(),
        };
        assert_eq!(reference.to_ref().flavor(), RefFlavor::Plain);
        assert_eq!(reference.to_ref().handle(), 6);
    }

    #[test]
    fn test_settings_field_names() {
        let settings = KeychainSettings::from(JsKeychainSettings {
            lock_when_system_sleeps: true,
            timeout: NO_TIMEOUT,
        });
        assert!(settings.lock_on_sleep);
        assert_eq!(settings.timeout, NO_TIMEOUT);

        let back = JsKeychainSettings::from(KeychainSettings::new(false, 300));
        assert!(!back.lock_when_system_sleeps);
        assert_eq!(back.timeout, 300);
    }

    #[test]
    fn test_status_flags() {
        let status = JsKeychainStatus::from(KeychainStatus::from_raw(KeychainStatus::READABLE));
        assert_eq!(status.raw, 2);
        assert!(status.is_locked);
        assert!(!status.is_unlocked);
        assert!(status.is_readable);
        assert!(!status.is_writeable);
        assert_eq!(status.description, KeychainStatus::from_raw(2).to_string());
    }
}
