// Bridge lifecycle
//
// The host registers the bridge once when the library is loaded and tears it
// down when it is unloaded. Entry points reached outside that window fail
// with `NotInitialized` instead of touching the native layer.

use crate::bridge::KeychainBridge;
use crate::config::BridgeConfig;
use crate::error::{BridgeErrorCode, BridgeResult, KeychainError};
use crate::native::SecurityApi;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

const UNINITIALIZED: u8 = 0;
const READY: u8 = 1;
const TORN_DOWN: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Uninitialized,
    Ready,
    TornDown,
}

/// Process-wide holder of the active bridge
pub struct BridgeRuntime<A: SecurityApi> {
    state: AtomicU8,
    bridge: RwLock<Option<Arc<KeychainBridge<A>>>>,
}

impl<A: SecurityApi> Default for BridgeRuntime<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: SecurityApi> BridgeRuntime<A> {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINITIALIZED),
            bridge: RwLock::new(None),
        }
    }

    pub fn state(&self) -> RuntimeState {
        match self.state.load(Ordering::Acquire) {
            UNINITIALIZED => RuntimeState::Uninitialized,
            READY => RuntimeState::Ready,
            _ => RuntimeState::TornDown,
        }
    }

    /// Register the bridge; valid once per runtime
    pub fn initialize(&self, api: A, config: BridgeConfig) -> BridgeResult<()> {
        config.validate()?;

        let mut slot = self.bridge.write().unwrap_or_else(|e| e.into_inner());
        if self.state.load(Ordering::Acquire) != UNINITIALIZED {
            warn!(state = ?self.state(), "keychain bridge initialized twice");
            return Err(KeychainError::new(
                BridgeErrorCode::AlreadyInitialized,
                "Keychain bridge has already been initialized",
            ));
        }

        info!(
            backend = api.name(),
            delete_convention = ?config.delete_convention,
            "keychain bridge initialized"
        );
        *slot = Some(Arc::new(KeychainBridge::new(api, config)));
        self.state.store(READY, Ordering::Release);
        Ok(())
    }

    pub fn bridge(&self) -> BridgeResult<Arc<KeychainBridge<A>>> {
        let slot = self.bridge.read().unwrap_or_else(|e| e.into_inner());
        match (self.state.load(Ordering::Acquire), slot.as_ref()) {
            (READY, Some(bridge)) => Ok(Arc::clone(bridge)),
            _ => Err(KeychainError::not_initialized()),
        }
    }

    /// Release every outstanding handle and refuse further calls.
    ///
    /// Returns the number of handles the managed side never released.
    pub fn teardown(&self) -> BridgeResult<usize> {
        let mut slot = self.bridge.write().unwrap_or_else(|e| e.into_inner());
        let bridge = match (self.state.load(Ordering::Acquire), slot.take()) {
            (READY, Some(bridge)) => bridge,
            _ => return Err(KeychainError::not_initialized()),
        };
        self.state.store(TORN_DOWN, Ordering::Release);

        let leaked = bridge.release_all();
        if leaked > 0 {
            warn!(leaked, "released keychain handles still held at teardown");
        }
        info!("keychain bridge torn down");
        Ok(leaked)
    }
}
