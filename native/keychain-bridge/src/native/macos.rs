// Security.framework backend
//
// Thin unsafe layer over the SecKeychain C API. Each method performs exactly
// one native call; ownership follows the Core Foundation create/copy rules
// and is handed back to the bridge untouched.

use super::{KeychainList, NativeResult, RawKeychain, SecurityApi};
use crate::settings::SettingsRecord;
use crate::status::{OsStatus, PreferenceDomain, ERR_SEC_PARAM, ERR_SEC_SUCCESS};
use core_foundation::array::{
    kCFTypeArrayCallBacks, CFArrayAppendValue, CFArrayCreateMutable, CFArrayGetCount,
    CFArrayGetValueAtIndex, CFArrayRef, CFMutableArrayRef,
};
use core_foundation::base::{kCFAllocatorDefault, CFIndex, CFRelease, CFRetain};
use std::ffi::{c_char, c_void, CString};
use std::ptr;
use tracing::debug;

type SecKeychainRef = *mut c_void;
type SecPreferencesDomain = i32;
type SecKeychainStatus = u32;
type Boolean = u8;

#[link(name = "Security", kind = "framework")]
extern "C" {
    fn SecKeychainCreate(
        path_name: *const c_char,
        password_length: u32,
        password: *const c_void,
        prompt_user: Boolean,
        initial_access: *const c_void,
        keychain: *mut SecKeychainRef,
    ) -> OsStatus;
    fn SecKeychainOpen(path_name: *const c_char, keychain: *mut SecKeychainRef) -> OsStatus;
    fn SecKeychainDelete(keychain_or_array: SecKeychainRef) -> OsStatus;
    fn SecKeychainLock(keychain: SecKeychainRef) -> OsStatus;
    fn SecKeychainLockAll() -> OsStatus;
    fn SecKeychainUnlock(
        keychain: SecKeychainRef,
        password_length: u32,
        password: *const c_void,
        use_password: Boolean,
    ) -> OsStatus;
    fn SecKeychainCopySettings(keychain: SecKeychainRef, out_settings: *mut SettingsRecord) -> OsStatus;
    fn SecKeychainSetSettings(keychain: SecKeychainRef, new_settings: *const SettingsRecord) -> OsStatus;
    fn SecKeychainSetDefault(keychain: SecKeychainRef) -> OsStatus;
    fn SecKeychainSetDomainDefault(domain: SecPreferencesDomain, keychain: SecKeychainRef) -> OsStatus;
    fn SecKeychainCopyDefault(keychain: *mut SecKeychainRef) -> OsStatus;
    fn SecKeychainCopyDomainDefault(domain: SecPreferencesDomain, keychain: *mut SecKeychainRef) -> OsStatus;
    fn SecKeychainGetPath(keychain: SecKeychainRef, io_path_length: *mut u32, path_name: *mut c_char) -> OsStatus;
    fn SecKeychainGetStatus(keychain: SecKeychainRef, keychain_status: *mut SecKeychainStatus) -> OsStatus;
    fn SecKeychainSetSearchList(search_list: CFArrayRef) -> OsStatus;
    fn SecKeychainSetDomainSearchList(domain: SecPreferencesDomain, search_list: CFArrayRef) -> OsStatus;
    fn SecKeychainCopySearchList(search_list: *mut CFArrayRef) -> OsStatus;
    fn SecKeychainCopyDomainSearchList(domain: SecPreferencesDomain, search_list: *mut CFArrayRef) -> OsStatus;
    fn SecKeychainGetPreferenceDomain(domain: *mut SecPreferencesDomain) -> OsStatus;
    fn SecKeychainSetPreferenceDomain(domain: SecPreferencesDomain) -> OsStatus;
}

fn check(status: OsStatus) -> NativeResult<()> {
    if status == ERR_SEC_SUCCESS {
        Ok(())
    } else {
        Err(status)
    }
}

fn keychain_ptr(keychain: Option<RawKeychain>) -> SecKeychainRef {
    keychain.map_or(ptr::null_mut(), |k| k.as_raw() as SecKeychainRef)
}

fn c_path(path: &str) -> NativeResult<CString> {
    CString::new(path).map_err(|_| ERR_SEC_PARAM)
}

fn password_len(password: &[u8]) -> NativeResult<u32> {
    u32::try_from(password.len()).map_err(|_| ERR_SEC_PARAM)
}

/// Owned `CFArray` of keychains
#[derive(Debug)]
pub struct CfKeychainList {
    array: CFMutableArrayRef,
}

impl CfKeychainList {
    /// Take ownership of an array returned by a copy function
    unsafe fn from_copied(array: CFArrayRef) -> Self {
        Self {
            array: array as CFMutableArrayRef,
        }
    }
}

impl KeychainList for CfKeychainList {
    fn len(&self) -> usize {
        unsafe { CFArrayGetCount(self.array) as usize }
    }

    fn get(&self, index: usize) -> Option<RawKeychain> {
        if index >= self.len() {
            return None;
        }
        let value = unsafe { CFArrayGetValueAtIndex(self.array, index as CFIndex) };
        Some(RawKeychain::from_raw(value as usize))
    }

    fn push(&mut self, keychain: RawKeychain) {
        unsafe { CFArrayAppendValue(self.array, keychain.as_raw() as *const c_void) }
    }
}

impl Drop for CfKeychainList {
    fn drop(&mut self) {
        if !self.array.is_null() {
            unsafe { CFRelease(self.array as *const c_void) }
        }
    }
}

/// Keychain services provided by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct MacOsSecurity;

impl MacOsSecurity {
    pub fn new() -> Self {
        Self
    }
}

impl SecurityApi for MacOsSecurity {
    type List = CfKeychainList;

    fn name(&self) -> &'static str {
        "macos"
    }

    fn new_list(&self, capacity: usize) -> CfKeychainList {
        let array = unsafe {
            CFArrayCreateMutable(kCFAllocatorDefault, capacity as CFIndex, &kCFTypeArrayCallBacks)
        };
        CfKeychainList { array }
    }

    fn create(&self, path: &str, password: &[u8]) -> NativeResult<RawKeychain> {
        let path = c_path(path)?;
        let mut keychain: SecKeychainRef = ptr::null_mut();
        check(unsafe {
            SecKeychainCreate(
                path.as_ptr(),
                password_len(password)?,
                password.as_ptr() as *const c_void,
                0,
                ptr::null(),
                &mut keychain,
            )
        })?;
        Ok(RawKeychain::from_raw(keychain as usize))
    }

    fn open(&self, path: &str) -> NativeResult<RawKeychain> {
        let path = c_path(path)?;
        let mut keychain: SecKeychainRef = ptr::null_mut();
        check(unsafe { SecKeychainOpen(path.as_ptr(), &mut keychain) })?;
        Ok(RawKeychain::from_raw(keychain as usize))
    }

    fn delete(&self, keychain: RawKeychain) -> NativeResult<()> {
        check(unsafe { SecKeychainDelete(keychain_ptr(Some(keychain))) })
    }

    fn lock(&self, keychain: Option<RawKeychain>) -> NativeResult<()> {
        check(unsafe { SecKeychainLock(keychain_ptr(keychain)) })
    }

    fn lock_all(&self) -> NativeResult<()> {
        check(unsafe { SecKeychainLockAll() })
    }

    fn unlock(&self, keychain: Option<RawKeychain>, password: &[u8]) -> NativeResult<()> {
        check(unsafe {
            SecKeychainUnlock(
                keychain_ptr(keychain),
                password_len(password)?,
                password.as_ptr() as *const c_void,
                1,
            )
        })
    }

    fn copy_settings(&self, keychain: Option<RawKeychain>, settings: &mut SettingsRecord) -> NativeResult<()> {
        check(unsafe { SecKeychainCopySettings(keychain_ptr(keychain), settings) })
    }

    fn set_settings(&self, keychain: Option<RawKeychain>, settings: &SettingsRecord) -> NativeResult<()> {
        check(unsafe { SecKeychainSetSettings(keychain_ptr(keychain), settings) })
    }

    fn set_default(&self, keychain: RawKeychain) -> NativeResult<()> {
        check(unsafe { SecKeychainSetDefault(keychain_ptr(Some(keychain))) })
    }

    fn set_domain_default(&self, domain: PreferenceDomain, keychain: RawKeychain) -> NativeResult<()> {
        check(unsafe { SecKeychainSetDomainDefault(domain.raw(), keychain_ptr(Some(keychain))) })
    }

    fn copy_default(&self) -> NativeResult<RawKeychain> {
        let mut keychain: SecKeychainRef = ptr::null_mut();
        check(unsafe { SecKeychainCopyDefault(&mut keychain) })?;
        Ok(RawKeychain::from_raw(keychain as usize))
    }

    fn copy_domain_default(&self, domain: PreferenceDomain) -> NativeResult<RawKeychain> {
        let mut keychain: SecKeychainRef = ptr::null_mut();
        check(unsafe { SecKeychainCopyDomainDefault(domain.raw(), &mut keychain) })?;
        Ok(RawKeychain::from_raw(keychain as usize))
    }

    fn get_path(&self, keychain: RawKeychain, buffer: &mut [u8]) -> NativeResult<usize> {
        let mut length = u32::try_from(buffer.len()).map_err(|_| ERR_SEC_PARAM)?;
        check(unsafe {
            SecKeychainGetPath(
                keychain_ptr(Some(keychain)),
                &mut length,
                buffer.as_mut_ptr() as *mut c_char,
            )
        })?;
        Ok((length as usize).min(buffer.len()))
    }

    fn get_status(&self, keychain: Option<RawKeychain>) -> NativeResult<u32> {
        let mut status: SecKeychainStatus = 0;
        check(unsafe { SecKeychainGetStatus(keychain_ptr(keychain), &mut status) })?;
        Ok(status)
    }

    fn set_search_list(&self, list: &CfKeychainList) -> NativeResult<()> {
        check(unsafe { SecKeychainSetSearchList(list.array as CFArrayRef) })
    }

    fn set_domain_search_list(&self, domain: PreferenceDomain, list: &CfKeychainList) -> NativeResult<()> {
        check(unsafe { SecKeychainSetDomainSearchList(domain.raw(), list.array as CFArrayRef) })
    }

    fn copy_search_list(&self) -> NativeResult<CfKeychainList> {
        let mut array: CFArrayRef = ptr::null();
        check(unsafe { SecKeychainCopySearchList(&mut array) })?;
        Ok(unsafe { CfKeychainList::from_copied(array) })
    }

    fn copy_domain_search_list(&self, domain: PreferenceDomain) -> NativeResult<CfKeychainList> {
        let mut array: CFArrayRef = ptr::null();
        check(unsafe { SecKeychainCopyDomainSearchList(domain.raw(), &mut array) })?;
        Ok(unsafe { CfKeychainList::from_copied(array) })
    }

    fn get_preference_domain(&self) -> NativeResult<PreferenceDomain> {
        let mut domain: SecPreferencesDomain = 0;
        check(unsafe { SecKeychainGetPreferenceDomain(&mut domain) })?;
        Ok(PreferenceDomain::new(domain))
    }

    fn set_preference_domain(&self, domain: PreferenceDomain) -> NativeResult<()> {
        check(unsafe { SecKeychainSetPreferenceDomain(domain.raw()) })
    }

    fn retain(&self, keychain: RawKeychain) {
        debug!(?keychain, "CFRetain");
        unsafe {
            CFRetain(keychain.as_raw() as *const c_void);
        }
    }

    fn release(&self, keychain: RawKeychain) {
        debug!(?keychain, "CFRelease");
        unsafe { CFRelease(keychain.as_raw() as *const c_void) }
    }

    fn error_message(&self, status: OsStatus) -> Option<String> {
        // SecCopyErrorMessageString; the CFString is decoded into an owned
        // buffer when it has no direct UTF-8 storage
        security_framework::base::Error::from_code(status).message()
    }
}
