// In-process keychain service for tests
//
// Implements the same contract as Security.framework closely enough to
// exercise the bridge anywhere: keychains addressed by path, CF-style
// retain counts on every handle, lists that retain their elements, per
// domain defaults and search lists, and `errSecBufferTooSmall` semantics
// for path retrieval. Failures can be queued per operation.

use super::{KeychainList, NativeResult, RawKeychain, SecurityApi};
use crate::settings::{SettingsRecord, NO_TIMEOUT, SETTINGS_VERSION};
use crate::status::{
    KeychainStatus, OsStatus, PreferenceDomain, ERR_SEC_ALLOCATE, ERR_SEC_AUTH_FAILED,
    ERR_SEC_BUFFER_TOO_SMALL, ERR_SEC_DUPLICATE_KEYCHAIN, ERR_SEC_INVALID_KEYCHAIN,
    ERR_SEC_INVALID_PREFS_DOMAIN, ERR_SEC_NOT_AVAILABLE, ERR_SEC_NO_DEFAULT_KEYCHAIN,
    ERR_SEC_NO_SUCH_KEYCHAIN, ERR_SEC_PARAM,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

const FIRST_RAW_HANDLE: usize = 0x1000;
const RAW_HANDLE_STRIDE: usize = 0x10;

/// Native operations that can have failures queued against them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeOp {
    Create,
    Open,
    Delete,
    Lock,
    LockAll,
    Unlock,
    CopySettings,
    SetSettings,
    SetDefault,
    CopyDefault,
    GetPath,
    GetStatus,
    SetSearchList,
    CopySearchList,
    GetPreferenceDomain,
    SetPreferenceDomain,
}

#[derive(Debug)]
struct StoredKeychain {
    password: Vec<u8>,
    locked: bool,
    settings: SettingsRecord,
}

#[derive(Debug)]
struct HandleEntry {
    path: String,
    retain_count: u32,
}

#[derive(Debug)]
struct State {
    keychains: HashMap<String, StoredKeychain>,
    handles: HashMap<usize, HandleEntry>,
    next_raw: usize,
    defaults: HashMap<i32, String>,
    search_lists: HashMap<i32, Vec<String>>,
    preference_domain: PreferenceDomain,
    faults: HashMap<NativeOp, VecDeque<OsStatus>>,
}

impl State {
    fn new() -> Self {
        Self {
            keychains: HashMap::new(),
            handles: HashMap::new(),
            next_raw: FIRST_RAW_HANDLE,
            defaults: HashMap::new(),
            search_lists: HashMap::new(),
            preference_domain: PreferenceDomain::USER,
            faults: HashMap::new(),
        }
    }

    fn take_fault(&mut self, op: NativeOp) -> NativeResult<()> {
        match self.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(status) => {
                debug!(?op, status, "injected native failure");
                Err(status)
            }
            None => Ok(()),
        }
    }

    /// New handle with a retain count of one
    fn new_handle(&mut self, path: &str) -> RawKeychain {
        let raw = self.next_raw;
        self.next_raw += RAW_HANDLE_STRIDE;
        self.handles.insert(
            raw,
            HandleEntry {
                path: path.to_string(),
                retain_count: 1,
            },
        );
        RawKeychain::from_raw(raw)
    }

    fn path_of(&self, keychain: RawKeychain) -> NativeResult<String> {
        self.handles
            .get(&keychain.as_raw())
            .map(|entry| entry.path.clone())
            .ok_or(ERR_SEC_INVALID_KEYCHAIN)
    }

    fn target(&self, keychain: Option<RawKeychain>) -> NativeResult<String> {
        match keychain {
            Some(keychain) => self.path_of(keychain),
            None => self
                .defaults
                .get(&self.preference_domain.raw())
                .cloned()
                .ok_or(ERR_SEC_NO_DEFAULT_KEYCHAIN),
        }
    }

    fn store_mut(&mut self, path: &str) -> NativeResult<&mut StoredKeychain> {
        self.keychains.get_mut(path).ok_or(ERR_SEC_NO_SUCH_KEYCHAIN)
    }

    fn retain(&mut self, keychain: RawKeychain) {
        match self.handles.get_mut(&keychain.as_raw()) {
            Some(entry) => entry.retain_count += 1,
            None => warn!(?keychain, "retain of unknown keychain handle"),
        }
    }

    fn release(&mut self, keychain: RawKeychain) {
        let raw = keychain.as_raw();
        let remove = match self.handles.get_mut(&raw) {
            Some(entry) => {
                entry.retain_count -= 1;
                entry.retain_count == 0
            }
            None => {
                warn!(?keychain, "release of unknown keychain handle");
                false
            }
        };
        if remove {
            self.handles.remove(&raw);
        }
    }

    fn set_default(&mut self, domain: PreferenceDomain, keychain: RawKeychain) -> NativeResult<()> {
        let path = self.path_of(keychain)?;
        if !self.keychains.contains_key(&path) {
            return Err(ERR_SEC_NO_SUCH_KEYCHAIN);
        }
        self.defaults.insert(domain.raw(), path);
        Ok(())
    }

    fn copy_default(&mut self, domain: PreferenceDomain) -> NativeResult<RawKeychain> {
        let path = self
            .defaults
            .get(&domain.raw())
            .cloned()
            .ok_or(ERR_SEC_NO_DEFAULT_KEYCHAIN)?;
        Ok(self.new_handle(&path))
    }

    fn set_search_list(&mut self, domain: PreferenceDomain, items: &[RawKeychain]) -> NativeResult<()> {
        let paths = items
            .iter()
            .map(|raw| self.path_of(*raw))
            .collect::<NativeResult<Vec<_>>>()?;
        self.search_lists.insert(domain.raw(), paths);
        Ok(())
    }

    fn copy_search_list(&mut self, domain: PreferenceDomain) -> Vec<RawKeychain> {
        let paths = self.search_lists.get(&domain.raw()).cloned().unwrap_or_default();
        paths.iter().map(|path| self.new_handle(path)).collect()
    }
}

fn check_domain(domain: PreferenceDomain) -> NativeResult<PreferenceDomain> {
    if domain.is_known() {
        Ok(domain)
    } else {
        Err(ERR_SEC_INVALID_PREFS_DOMAIN)
    }
}

fn check_version(settings: &SettingsRecord) -> NativeResult<()> {
    if settings.version == SETTINGS_VERSION {
        Ok(())
    } else {
        Err(ERR_SEC_PARAM)
    }
}

fn lock_state(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Keychain service held entirely in memory
#[derive(Debug, Clone)]
pub struct MemorySecurity {
    state: Arc<Mutex<State>>,
}

impl Default for MemorySecurity {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySecurity {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::new())),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock_state(&self.state)
    }

    /// Fail the next call of `op` with `status`
    pub fn fail_next(&self, op: NativeOp, status: OsStatus) {
        self.fail_times(op, status, 1);
    }

    /// Fail the next `times` calls of `op` with `status`
    pub fn fail_times(&self, op: NativeOp, status: OsStatus, times: usize) {
        let mut state = self.state();
        let queue = state.faults.entry(op).or_default();
        queue.extend(std::iter::repeat(status).take(times));
    }

    /// Retain count of a live handle, `None` once fully released
    pub fn retain_count(&self, keychain: RawKeychain) -> Option<u32> {
        self.state()
            .handles
            .get(&keychain.as_raw())
            .map(|entry| entry.retain_count)
    }

    /// Number of native handles with a non-zero retain count
    pub fn live_handle_count(&self) -> usize {
        self.state().handles.len()
    }

    pub fn keychain_exists(&self, path: &str) -> bool {
        self.state().keychains.contains_key(path)
    }

    pub fn is_locked(&self, path: &str) -> Option<bool> {
        self.state().keychains.get(path).map(|keychain| keychain.locked)
    }
}

/// List handed out by `MemorySecurity`; retains its elements
#[derive(Debug)]
pub struct MemoryList {
    items: Vec<RawKeychain>,
    state: Arc<Mutex<State>>,
}

impl KeychainList for MemoryList {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn get(&self, index: usize) -> Option<RawKeychain> {
        self.items.get(index).copied()
    }

    fn push(&mut self, keychain: RawKeychain) {
        lock_state(&self.state).retain(keychain);
        self.items.push(keychain);
    }
}

impl Drop for MemoryList {
    fn drop(&mut self) {
        let mut state = lock_state(&self.state);
        for keychain in self.items.drain(..) {
            state.release(keychain);
        }
    }
}

impl SecurityApi for MemorySecurity {
    type List = MemoryList;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn new_list(&self, capacity: usize) -> MemoryList {
        MemoryList {
            items: Vec::with_capacity(capacity),
            state: Arc::clone(&self.state),
        }
    }

    fn create(&self, path: &str, password: &[u8]) -> NativeResult<RawKeychain> {
        let mut state = self.state();
        state.take_fault(NativeOp::Create)?;
        if path.is_empty() {
            return Err(ERR_SEC_PARAM);
        }
        if state.keychains.contains_key(path) {
            return Err(ERR_SEC_DUPLICATE_KEYCHAIN);
        }
        state.keychains.insert(
            path.to_string(),
            StoredKeychain {
                password: password.to_vec(),
                locked: false,
                settings: SettingsRecord {
                    version: SETTINGS_VERSION,
                    lock_on_sleep: 0,
                    use_lock_interval: 0,
                    lock_interval: NO_TIMEOUT as u32,
                },
            },
        );
        Ok(state.new_handle(path))
    }

    fn open(&self, path: &str) -> NativeResult<RawKeychain> {
        let mut state = self.state();
        state.take_fault(NativeOp::Open)?;
        if path.is_empty() {
            return Err(ERR_SEC_PARAM);
        }
        // Opening never checks existence; later calls report it
        Ok(state.new_handle(path))
    }

    fn delete(&self, keychain: RawKeychain) -> NativeResult<()> {
        let mut state = self.state();
        state.take_fault(NativeOp::Delete)?;
        let path = state.path_of(keychain)?;
        state.keychains.remove(&path).ok_or(ERR_SEC_NO_SUCH_KEYCHAIN)?;
        state.defaults.retain(|_, default| *default != path);
        for list in state.search_lists.values_mut() {
            list.retain(|entry| *entry != path);
        }
        Ok(())
    }

    fn lock(&self, keychain: Option<RawKeychain>) -> NativeResult<()> {
        let mut state = self.state();
        state.take_fault(NativeOp::Lock)?;
        let path = state.target(keychain)?;
        state.store_mut(&path)?.locked = true;
        Ok(())
    }

    fn lock_all(&self) -> NativeResult<()> {
        let mut state = self.state();
        state.take_fault(NativeOp::LockAll)?;
        for keychain in state.keychains.values_mut() {
            keychain.locked = true;
        }
        Ok(())
    }

    fn unlock(&self, keychain: Option<RawKeychain>, password: &[u8]) -> NativeResult<()> {
        let mut state = self.state();
        state.take_fault(NativeOp::Unlock)?;
        let path = state.target(keychain)?;
        let stored = state.store_mut(&path)?;
        if stored.password != password {
            return Err(ERR_SEC_AUTH_FAILED);
        }
        stored.locked = false;
        Ok(())
    }

    fn copy_settings(&self, keychain: Option<RawKeychain>, settings: &mut SettingsRecord) -> NativeResult<()> {
        let mut state = self.state();
        state.take_fault(NativeOp::CopySettings)?;
        check_version(settings)?;
        let path = state.target(keychain)?;
        *settings = state.store_mut(&path)?.settings;
        Ok(())
    }

    fn set_settings(&self, keychain: Option<RawKeychain>, settings: &SettingsRecord) -> NativeResult<()> {
        let mut state = self.state();
        state.take_fault(NativeOp::SetSettings)?;
        check_version(settings)?;
        let path = state.target(keychain)?;
        state.store_mut(&path)?.settings = *settings;
        Ok(())
    }

    fn set_default(&self, keychain: RawKeychain) -> NativeResult<()> {
        let mut state = self.state();
        state.take_fault(NativeOp::SetDefault)?;
        let domain = state.preference_domain;
        state.set_default(domain, keychain)
    }

    fn set_domain_default(&self, domain: PreferenceDomain, keychain: RawKeychain) -> NativeResult<()> {
        let mut state = self.state();
        state.take_fault(NativeOp::SetDefault)?;
        state.set_default(check_domain(domain)?, keychain)
    }

    fn copy_default(&self) -> NativeResult<RawKeychain> {
        let mut state = self.state();
        state.take_fault(NativeOp::CopyDefault)?;
        let domain = state.preference_domain;
        state.copy_default(domain)
    }

    fn copy_domain_default(&self, domain: PreferenceDomain) -> NativeResult<RawKeychain> {
        let mut state = self.state();
        state.take_fault(NativeOp::CopyDefault)?;
        state.copy_default(check_domain(domain)?)
    }

    fn get_path(&self, keychain: RawKeychain, buffer: &mut [u8]) -> NativeResult<usize> {
        let mut state = self.state();
        state.take_fault(NativeOp::GetPath)?;
        let path = state.path_of(keychain)?;
        let bytes = path.as_bytes();
        if bytes.len() + 1 > buffer.len() {
            return Err(ERR_SEC_BUFFER_TOO_SMALL);
        }
        buffer[..bytes.len()].copy_from_slice(bytes);
        buffer[bytes.len()] = 0;
        Ok(bytes.len())
    }

    fn get_status(&self, keychain: Option<RawKeychain>) -> NativeResult<u32> {
        let mut state = self.state();
        state.take_fault(NativeOp::GetStatus)?;
        let path = state.target(keychain)?;
        let stored = state.store_mut(&path)?;
        let mut status = KeychainStatus::READABLE | KeychainStatus::WRITEABLE;
        if !stored.locked {
            status |= KeychainStatus::UNLOCKED;
        }
        Ok(status)
    }

    fn set_search_list(&self, list: &MemoryList) -> NativeResult<()> {
        let mut state = self.state();
        state.take_fault(NativeOp::SetSearchList)?;
        let domain = state.preference_domain;
        state.set_search_list(domain, &list.items)
    }

    fn set_domain_search_list(&self, domain: PreferenceDomain, list: &MemoryList) -> NativeResult<()> {
        let mut state = self.state();
        state.take_fault(NativeOp::SetSearchList)?;
        state.set_search_list(check_domain(domain)?, &list.items)
    }

    fn copy_search_list(&self) -> NativeResult<MemoryList> {
        let items = {
            let mut state = self.state();
            state.take_fault(NativeOp::CopySearchList)?;
            let domain = state.preference_domain;
            state.copy_search_list(domain)
        };
        Ok(MemoryList {
            items,
            state: Arc::clone(&self.state),
        })
    }

    fn copy_domain_search_list(&self, domain: PreferenceDomain) -> NativeResult<MemoryList> {
        let items = {
            let mut state = self.state();
            state.take_fault(NativeOp::CopySearchList)?;
            state.copy_search_list(check_domain(domain)?)
        };
        Ok(MemoryList {
            items,
            state: Arc::clone(&self.state),
        })
    }

    fn get_preference_domain(&self) -> NativeResult<PreferenceDomain> {
        let mut state = self.state();
        state.take_fault(NativeOp::GetPreferenceDomain)?;
        Ok(state.preference_domain)
    }

    fn set_preference_domain(&self, domain: PreferenceDomain) -> NativeResult<()> {
        let mut state = self.state();
        state.take_fault(NativeOp::SetPreferenceDomain)?;
        state.preference_domain = check_domain(domain)?;
        Ok(())
    }

    fn retain(&self, keychain: RawKeychain) {
        self.state().retain(keychain);
    }

    fn release(&self, keychain: RawKeychain) {
        self.state().release(keychain);
    }

    fn error_message(&self, status: OsStatus) -> Option<String> {
        let message = match status {
            ERR_SEC_PARAM => "One or more parameters passed to a function were not valid.",
            ERR_SEC_ALLOCATE => "Failed to allocate memory.",
            ERR_SEC_NOT_AVAILABLE => "No keychain is available. You may need to restart your computer.",
            ERR_SEC_AUTH_FAILED => "The user name or passphrase you entered is not correct.",
            ERR_SEC_NO_SUCH_KEYCHAIN => "The specified keychain could not be found.",
            ERR_SEC_INVALID_KEYCHAIN => "The specified keychain is not a valid keychain file.",
            ERR_SEC_DUPLICATE_KEYCHAIN => "A keychain with the same name already exists.",
            ERR_SEC_BUFFER_TOO_SMALL => "There is not enough memory available to use the specified item.",
            ERR_SEC_NO_DEFAULT_KEYCHAIN => "A default keychain could not be found.",
            ERR_SEC_INVALID_PREFS_DOMAIN => "The specified preferences domain is not valid.",
            _ => return None,
        };
        Some(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_duplicate() {
        let api = MemorySecurity::new();
        let raw = api.create("/tmp/a.keychain", b"pw").unwrap();
        assert_eq!(api.retain_count(raw), Some(1));
        assert_eq!(api.create("/tmp/a.keychain", b"pw"), Err(ERR_SEC_DUPLICATE_KEYCHAIN));
    }

    #[test]
    fn test_open_missing_keychain_defers_failure() {
        let api = MemorySecurity::new();
        let raw = api.open("/tmp/missing.keychain").unwrap();
        assert_eq!(api.get_status(Some(raw)), Err(ERR_SEC_NO_SUCH_KEYCHAIN));
    }

    #[test]
    fn test_lock_unlock_status() {
        let api = MemorySecurity::new();
        let raw = api.create("/tmp/a.keychain", b"pw").unwrap();
        assert_eq!(api.get_status(Some(raw)), Ok(7));

        api.lock(Some(raw)).unwrap();
        assert_eq!(api.get_status(Some(raw)), Ok(6));
        assert_eq!(api.unlock(Some(raw), b"nope"), Err(ERR_SEC_AUTH_FAILED));
        api.unlock(Some(raw), b"pw").unwrap();
        assert_eq!(api.is_locked("/tmp/a.keychain"), Some(false));
    }

    #[test]
    fn test_default_follows_preference_domain() {
        let api = MemorySecurity::new();
        assert_eq!(api.lock(None), Err(ERR_SEC_NO_DEFAULT_KEYCHAIN));

        let raw = api.create("/tmp/a.keychain", b"pw").unwrap();
        api.set_domain_default(PreferenceDomain::SYSTEM, raw).unwrap();
        assert_eq!(api.copy_default(), Err(ERR_SEC_NO_DEFAULT_KEYCHAIN));

        api.set_preference_domain(PreferenceDomain::SYSTEM).unwrap();
        let copied = api.copy_default().unwrap();
        assert_ne!(copied, raw);
        assert_eq!(api.retain_count(copied), Some(1));
        assert_eq!(
            api.set_preference_domain(PreferenceDomain::new(17)),
            Err(ERR_SEC_INVALID_PREFS_DOMAIN)
        );
    }

    #[test]
    fn test_copied_list_owns_its_elements() {
        let api = MemorySecurity::new();
        let raw = api.create("/tmp/a.keychain", b"pw").unwrap();
        let mut list = api.new_list(1);
        list.push(raw);
        api.set_search_list(&list).unwrap();
        drop(list);
        assert_eq!(api.retain_count(raw), Some(1));

        let before = api.live_handle_count();
        let copied = api.copy_search_list().unwrap();
        assert_eq!(copied.len(), 1);
        assert_eq!(api.live_handle_count(), before + 1);
        drop(copied);
        assert_eq!(api.live_handle_count(), before);
    }

    #[test]
    fn test_get_path_buffer_too_small() {
        let api = MemorySecurity::new();
        let raw = api.create("/tmp/a.keychain", b"pw").unwrap();

        let mut small = [0u8; 4];
        assert_eq!(api.get_path(raw, &mut small), Err(ERR_SEC_BUFFER_TOO_SMALL));

        let mut buffer = [0u8; 64];
        let len = api.get_path(raw, &mut buffer).unwrap();
        assert_eq!(&buffer[..len], b"/tmp/a.keychain");
        assert_eq!(buffer[len], 0);
    }

    #[test]
    fn test_fault_injection_is_consumed() {
        let api = MemorySecurity::new();
        api.fail_times(NativeOp::LockAll, ERR_SEC_NOT_AVAILABLE, 2);
        assert_eq!(api.lock_all(), Err(ERR_SEC_NOT_AVAILABLE));
        assert_eq!(api.lock_all(), Err(ERR_SEC_NOT_AVAILABLE));
        assert_eq!(api.lock_all(), Ok(()));
    }

    #[test]
    fn test_settings_version_checked() {
        let api = MemorySecurity::new();
        let raw = api.create("/tmp/a.keychain", b"pw").unwrap();
        let mut record = SettingsRecord::query_template();
        record.version = 2;
        assert_eq!(api.copy_settings(Some(raw), &mut record), Err(ERR_SEC_PARAM));
    }
}
