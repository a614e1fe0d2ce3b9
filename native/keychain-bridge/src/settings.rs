/**
 * Keychain settings and their native record layout
 */

use serde::{Deserialize, Serialize};

/// `SEC_KEYCHAIN_SETTINGS_VERS1`
pub const SETTINGS_VERSION: u32 = 1;

/// Timeout value meaning "never lock after inactivity"
pub const NO_TIMEOUT: i32 = i32::MAX;

/// Timeout applied when lock-after-timeout is switched on without a value
pub const DEFAULT_TIMEOUT: i32 = 300;

/// Native `Boolean` (unsigned char)
pub type Boolean = u8;

/// Managed view of a keychain's lock settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeychainSettings {
    pub lock_on_sleep: bool,
    /// Seconds of inactivity before locking, `NO_TIMEOUT` to disable
    pub timeout: i32,
}

impl KeychainSettings {
    pub fn new(lock_on_sleep: bool, timeout: i32) -> Self {
        Self {
            lock_on_sleep,
            timeout,
        }
    }

    pub fn with_lock_after_timeout(lock_on_sleep: bool, lock_after_timeout: bool) -> Self {
        let timeout = if lock_after_timeout {
            DEFAULT_TIMEOUT
        } else {
            NO_TIMEOUT
        };
        Self::new(lock_on_sleep, timeout)
    }

    pub fn lock_after_timeout(&self) -> bool {
        self.timeout != NO_TIMEOUT
    }

    /// Enabling keeps an explicit timeout and falls back to the default one
    pub fn set_lock_after_timeout(&mut self, enabled: bool) {
        if enabled {
            if self.timeout == NO_TIMEOUT {
                self.timeout = DEFAULT_TIMEOUT;
            }
        } else {
            self.timeout = NO_TIMEOUT;
        }
    }
}

impl Default for KeychainSettings {
    fn default() -> Self {
        Self::new(false, DEFAULT_TIMEOUT)
    }
}

/// `SecKeychainSettings`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsRecord {
    pub version: u32,
    pub lock_on_sleep: Boolean,
    pub use_lock_interval: Boolean,
    pub lock_interval: u32,
}

impl SettingsRecord {
    /// Record handed to `SecKeychainCopySettings`; fields the native side
    /// leaves untouched keep these values.
    pub fn query_template() -> Self {
        Self {
            version: SETTINGS_VERSION,
            lock_on_sleep: 0,
            use_lock_interval: 0,
            lock_interval: NO_TIMEOUT as u32,
        }
    }

    pub fn lock_on_sleep(&self) -> bool {
        self.lock_on_sleep != 0
    }

    pub fn use_lock_interval(&self) -> bool {
        self.use_lock_interval != 0
    }
}

/// Build the native record; a non-zero timeout always sets `use_lock_interval`.
pub fn to_native(settings: &KeychainSettings) -> SettingsRecord {
    SettingsRecord {
        version: SETTINGS_VERSION,
        lock_on_sleep: Boolean::from(settings.lock_on_sleep),
        use_lock_interval: Boolean::from(settings.timeout != 0),
        lock_interval: settings.timeout as u32,
    }
}

/// Read back a native record; `use_lock_interval` is not part of the managed value.
pub fn to_managed(record: &SettingsRecord) -> KeychainSettings {
    KeychainSettings::new(record.lock_on_sleep(), record.lock_interval as i32)
}
