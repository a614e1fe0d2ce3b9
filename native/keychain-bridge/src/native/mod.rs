// Native keychain service seam
//
// `SecurityApi` is the exact surface of Security.framework the bridge
// consumes. Every call returns the raw `OsStatus` on failure so the
// translation into typed errors happens in one place.

#[cfg(target_os = "macos")]
pub mod macos;
pub mod memory;
pub mod unavailable;

use crate::settings::SettingsRecord;
use crate::status::{OsStatus, PreferenceDomain};
use std::fmt;

#[cfg(target_os = "macos")]
pub use macos::MacOsSecurity;
pub use memory::{MemorySecurity, NativeOp};
pub use unavailable::UnavailableSecurity;

/// Backend used by the addon on this platform
#[cfg(target_os = "macos")]
pub type PlatformSecurity = MacOsSecurity;

/// Elsewhere every keychain call fails with `errSecNotAvailable`;
/// [`MemorySecurity`] is only ever chosen explicitly.
#[cfg(not(target_os = "macos"))]
pub type PlatformSecurity = UnavailableSecurity;

pub type NativeResult<T> = std::result::Result<T, OsStatus>;

/// Opaque native keychain handle (`SecKeychainRef`)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawKeychain(usize);

impl RawKeychain {
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> usize {
        self.0
    }
}

impl fmt::Debug for RawKeychain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawKeychain({:#x})", self.0)
    }
}

/// Native ordered collection of keychain handles (`CFArrayRef`)
///
/// The collection retains what is pushed into it and releases its elements
/// and itself when dropped.
pub trait KeychainList {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrowed element; callers must retain it to keep it past the list
    fn get(&self, index: usize) -> Option<RawKeychain>;

    fn push(&mut self, keychain: RawKeychain);
}

/// Keychain services consumed by the bridge
///
/// A `None` keychain argument selects the default keychain, exactly as a
/// NULL `SecKeychainRef` does natively.
pub trait SecurityApi: Send + Sync {
    type List: KeychainList;

    fn name(&self) -> &'static str;

    fn new_list(&self, capacity: usize) -> Self::List;

    fn create(&self, path: &str, password: &[u8]) -> NativeResult<RawKeychain>;

    fn open(&self, path: &str) -> NativeResult<RawKeychain>;

    fn delete(&self, keychain: RawKeychain) -> NativeResult<()>;

    fn lock(&self, keychain: Option<RawKeychain>) -> NativeResult<()>;

    fn lock_all(&self) -> NativeResult<()>;

    fn unlock(&self, keychain: Option<RawKeychain>, password: &[u8]) -> NativeResult<()>;

    /// Fill `settings`; the caller sets the version before the call
    fn copy_settings(&self, keychain: Option<RawKeychain>, settings: &mut SettingsRecord) -> NativeResult<()>;

    fn set_settings(&self, keychain: Option<RawKeychain>, settings: &SettingsRecord) -> NativeResult<()>;

    fn set_default(&self, keychain: RawKeychain) -> NativeResult<()>;

    fn set_domain_default(&self, domain: PreferenceDomain, keychain: RawKeychain) -> NativeResult<()>;

    /// Returned handle is owned by the caller (+1)
    fn copy_default(&self) -> NativeResult<RawKeychain>;

    fn copy_domain_default(&self, domain: PreferenceDomain) -> NativeResult<RawKeychain>;

    /// Write the NUL-terminated path into `buffer` and return its length
    /// without the terminator; `ERR_SEC_BUFFER_TOO_SMALL` if it does not fit.
    fn get_path(&self, keychain: RawKeychain, buffer: &mut [u8]) -> NativeResult<usize>;

    fn get_status(&self, keychain: Option<RawKeychain>) -> NativeResult<u32>;

    fn set_search_list(&self, list: &Self::List) -> NativeResult<()>;

    fn set_domain_search_list(&self, domain: PreferenceDomain, list: &Self::List) -> NativeResult<()>;

    fn copy_search_list(&self) -> NativeResult<Self::List>;

    fn copy_domain_search_list(&self, domain: PreferenceDomain) -> NativeResult<Self::List>;

    fn get_preference_domain(&self) -> NativeResult<PreferenceDomain>;

    fn set_preference_domain(&self, domain: PreferenceDomain) -> NativeResult<()>;

    fn retain(&self, keychain: RawKeychain);

    fn release(&self, keychain: RawKeychain);

    /// Human readable text for a status, if the platform has one
    fn error_message(&self, status: OsStatus) -> Option<String>;
}
