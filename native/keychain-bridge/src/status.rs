/**
 * Native status codes, keychain status bitmask and preference domains
 *
 * Values mirror the constants in Security.framework's SecBase.h and
 * SecKeychain.h so they can be passed through the FFI boundary unchanged.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Native result code; zero is success
pub type OsStatus = i32;

pub const ERR_SEC_SUCCESS: OsStatus = 0;
pub const ERR_SEC_PARAM: OsStatus = -50;
pub const ERR_SEC_ALLOCATE: OsStatus = -108;
pub const ERR_SEC_NOT_AVAILABLE: OsStatus = -25291;
pub const ERR_SEC_AUTH_FAILED: OsStatus = -25293;
pub const ERR_SEC_NO_SUCH_KEYCHAIN: OsStatus = -25294;
pub const ERR_SEC_INVALID_KEYCHAIN: OsStatus = -25295;
pub const ERR_SEC_DUPLICATE_KEYCHAIN: OsStatus = -25296;
pub const ERR_SEC_BUFFER_TOO_SMALL: OsStatus = -25301;
pub const ERR_SEC_NO_DEFAULT_KEYCHAIN: OsStatus = -25307;
pub const ERR_SEC_INVALID_PREFS_DOMAIN: OsStatus = -25319;

/// Status bitmask returned by `SecKeychainGetStatus`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeychainStatus(u32);

impl KeychainStatus {
    pub const UNLOCKED: u32 = 1;
    pub const READABLE: u32 = 2;
    pub const WRITEABLE: u32 = 4;

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub fn is_unlocked(self) -> bool {
        self.0 & Self::UNLOCKED != 0
    }

    pub fn is_locked(self) -> bool {
        !self.is_unlocked()
    }

    pub fn is_readable(self) -> bool {
        self.0 & Self::READABLE != 0
    }

    pub fn is_writeable(self) -> bool {
        self.0 & Self::WRITEABLE != 0
    }
}

impl fmt::Display for KeychainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KeychainStatus{{isWriteable={} isReadable={} isLocked={}}}",
            self.is_writeable(),
            self.is_readable(),
            self.is_locked()
        )
    }
}

/// Keychain preference domain (`SecPreferencesDomain`)
///
/// Any integer is representable so that out-of-range values reach the native
/// layer, which is the authority on what a valid domain is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreferenceDomain(i32);

impl PreferenceDomain {
    pub const USER: Self = Self(0);
    pub const SYSTEM: Self = Self(1);
    pub const COMMON: Self = Self(2);
    pub const DYNAMIC: Self = Self(3);

    /// Sentinel used at the managed boundary for "no explicit domain"
    pub const UNSPECIFIED: i32 = -1;

    /// Interpret a boundary integer, mapping the sentinel to `None`
    pub fn from_raw(raw: i32) -> Option<Self> {
        if raw == Self::UNSPECIFIED {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Whether the value is one of the four domains the platform defines
    pub fn is_known(self) -> bool {
        (Self::USER.0..=Self::DYNAMIC.0).contains(&self.0)
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "user",
            1 => "system",
            2 => "common",
            3 => "dynamic",
            _ => "unknown",
        }
    }
}

impl fmt::Display for PreferenceDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_bits() {
        let status = KeychainStatus::from_raw(7);
        assert!(status.is_unlocked());
        assert!(status.is_readable());
        assert!(status.is_writeable());

        let locked = KeychainStatus::from_raw(KeychainStatus::READABLE | KeychainStatus::WRITEABLE);
        assert!(locked.is_locked());
        assert!(locked.is_readable());
        assert_eq!(
            locked.to_string(),
            "KeychainStatus{isWriteable=true isReadable=true isLocked=true}"
        );
    }

    #[test]
    fn test_domain_sentinel() {
        assert_eq!(PreferenceDomain::from_raw(-1), None);
        assert_eq!(PreferenceDomain::from_raw(1), Some(PreferenceDomain::SYSTEM));
        assert!(!PreferenceDomain::new(9).is_known());
        assert_eq!(PreferenceDomain::DYNAMIC.to_string(), "dynamic(3)");
    }
}
