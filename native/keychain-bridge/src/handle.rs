/**
 * Keychain references and the handle table behind them
 *
 * The managed side never sees a native pointer. It gets an integer token
 * that indexes this table. Released tokens leave the table.
 */

use crate::error::{BridgeErrorCode, BridgeResult, KeychainError};
use crate::native::RawKeychain;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use tracing::{debug, warn};

/// Token type handed to the managed side
pub type KeychainHandle = i64;

/// Boundary typing of a reference; both flavors behave identically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefFlavor {
    Plain,
    Default,
}

/// Managed reference to a native keychain
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KeychainRef {
    handle: KeychainHandle,
    flavor: RefFlavor,
}

impl KeychainRef {
    pub fn new(handle: KeychainHandle, flavor: RefFlavor) -> Self {
        Self { handle, flavor }
    }

    pub fn handle(&self) -> KeychainHandle {
        self.handle
    }

    pub fn flavor(&self) -> RefFlavor {
        self.flavor
    }
}

impl PartialEq for KeychainRef {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for KeychainRef {}

impl Hash for KeychainRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

/// Table of the handles the bridge has issued and not yet released.
///
/// Tokens are never reused, so a token below the next one to be issued that
/// has no entry is known to have been released.
#[derive(Debug)]
pub struct HandleRegistry {
    entries: RwLock<HashMap<KeychainHandle, RawKeychain>>,
    next_handle: AtomicI64,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_handle: AtomicI64::new(1),
        }
    }

    /// Issue a reference for a native handle the caller already owns.
    /// No retain is performed.
    pub fn wrap(&self, raw: RawKeychain, flavor: RefFlavor) -> KeychainRef {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let handle = self.next_handle.fetch_add(1, Ordering::AcqRel);
        entries.insert(handle, raw);
        debug!(handle, ?raw, ?flavor, "wrapped keychain handle");
        KeychainRef::new(handle, flavor)
    }

    fn was_issued(&self, handle: KeychainHandle) -> bool {
        handle >= 1 && handle < self.next_handle.load(Ordering::Acquire)
    }

    fn missing(&self, handle: KeychainHandle) -> KeychainError {
        if self.was_issued(handle) {
            KeychainError::released_handle(handle)
        } else {
            KeychainError::unknown_handle(handle)
        }
    }

    /// Native handle behind a reference; absent references are a null argument
    pub fn unwrap(&self, reference: Option<&KeychainRef>) -> BridgeResult<RawKeychain> {
        let reference = reference.ok_or_else(|| KeychainError::null_argument("keychain"))?;
        self.resolve(reference.handle())
    }

    pub fn resolve(&self, handle: KeychainHandle) -> BridgeResult<RawKeychain> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&handle).copied().ok_or_else(|| self.missing(handle))
    }

    /// Remove a handle and hand back the native handle to release.
    /// A handle can be released once; later calls fail.
    pub fn release(&self, handle: KeychainHandle) -> BridgeResult<RawKeychain> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.remove(&handle) {
            Some(raw) => {
                debug!(handle, ?raw, "released keychain handle");
                Ok(raw)
            }
            None => {
                let error = self.missing(handle);
                if error.code() == BridgeErrorCode::ReleasedHandle {
                    warn!(handle, "attempted to release keychain handle twice");
                }
                Err(error)
            }
        }
    }

    /// Release every live handle, returning the native handles to release
    pub fn drain_live(&self) -> Vec<RawKeychain> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let mut live: Vec<(KeychainHandle, RawKeychain)> = entries.drain().collect();
        live.sort_by_key(|(handle, _)| *handle);
        live.into_iter().map(|(_, raw)| raw).collect()
    }

    pub fn live_count(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_released(&self, handle: KeychainHandle) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        !entries.contains_key(&handle) && self.was_issued(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_unwrap_round_trip() {
        let registry = HandleRegistry::new();
        let raw = RawKeychain::from_raw(0xdead_beef);
        let reference = registry.wrap(raw, RefFlavor::Plain);

        assert_eq!(registry.unwrap(Some(&reference)).unwrap(), raw);
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn test_unwrap_absent_reference() {
        let registry = HandleRegistry::new();
        let error = registry.unwrap(None).unwrap_err();
        assert_eq!(error.code(), BridgeErrorCode::NullArgument);
    }

    #[test]
    fn test_distinct_tokens_for_same_native_handle() {
        let registry = HandleRegistry::new();
        let raw = RawKeychain::from_raw(42);
        let first = registry.wrap(raw, RefFlavor::Plain);
        let second = registry.wrap(raw, RefFlavor::Default);

        assert_ne!(first, second);
        assert_eq!(registry.resolve(first.handle()).unwrap(), raw);
        assert_eq!(registry.resolve(second.handle()).unwrap(), raw);
    }

    #[test]
    fn test_equality_is_handle_equality() {
        let plain = KeychainRef::new(7, RefFlavor::Plain);
        let default = KeychainRef::new(7, RefFlavor::Default);
        assert_eq!(plain, default);
        assert_ne!(plain, KeychainRef::new(8, RefFlavor::Plain));
    }

    #[test]
    fn test_release_exactly_once() {
        let registry = HandleRegistry::new();
        let raw = RawKeychain::from_raw(99);
        let reference = registry.wrap(raw, RefFlavor::Plain);

        assert_eq!(registry.release(reference.handle()).unwrap(), raw);
        assert!(registry.is_released(reference.handle()));

        let error = registry.release(reference.handle()).unwrap_err();
        assert_eq!(error.code(), BridgeErrorCode::ReleasedHandle);

        let error = registry.unwrap(Some(&reference)).unwrap_err();
        assert_eq!(error.code(), BridgeErrorCode::ReleasedHandle);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_unknown_handle() {
        let registry = HandleRegistry::new();
        let error = registry.release(12345).unwrap_err();
        assert_eq!(error.code(), BridgeErrorCode::UnknownHandle);
    }

    #[test]
    fn test_released_entries_leave_the_table() {
        let registry = HandleRegistry::new();
        let refs: Vec<_> = (0..10_000)
            .map(|i| registry.wrap(RawKeychain::from_raw(i), RefFlavor::Plain))
            .collect();
        assert_eq!(registry.entries.read().unwrap().len(), 10_000);

        for reference in &refs {
            registry.release(reference.handle()).unwrap();
        }
        assert_eq!(registry.entries.read().unwrap().len(), 0);

        // still distinguishable from tokens never issued
        let last = refs[refs.len() - 1].handle();
        assert_eq!(
            registry.resolve(last).unwrap_err().code(),
            BridgeErrorCode::ReleasedHandle
        );
        assert_eq!(
            registry.resolve(last + 1).unwrap_err().code(),
            BridgeErrorCode::UnknownHandle
        );
        assert_eq!(registry.resolve(0).unwrap_err().code(), BridgeErrorCode::UnknownHandle);
        assert!(registry.is_released(last));
        assert!(!registry.is_released(last + 1));
    }

    #[test]
    fn test_drain_live_skips_released() {
        let registry = HandleRegistry::new();
        let a = registry.wrap(RawKeychain::from_raw(1), RefFlavor::Plain);
        let _b = registry.wrap(RawKeychain::from_raw(2), RefFlavor::Plain);
        let _c = registry.wrap(RawKeychain::from_raw(3), RefFlavor::Default);
        registry.release(a.handle()).unwrap();

        let drained = registry.drain_live();
        assert_eq!(drained, vec![RawKeychain::from_raw(2), RawKeychain::from_raw(3)]);
        assert_eq!(registry.live_count(), 0);
        assert!(registry.drain_live().is_empty());
    }
}
