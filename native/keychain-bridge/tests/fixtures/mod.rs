// Shared setup for bridge integration tests

#![allow(dead_code)]

use keychain_bridge::{BridgeConfig, KeychainBridge, KeychainRef, MemorySecurity};
use std::sync::Once;

static TRACING: Once = Once::new();

pub const PASSWORD: &str = "correct horse";

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// Bridge over a fresh in-memory backend, plus a handle on that backend
pub fn bridge_with(config: BridgeConfig) -> (MemorySecurity, KeychainBridge<MemorySecurity>) {
    init_tracing();
    let api = MemorySecurity::new();
    (api.clone(), KeychainBridge::new(api, config))
}

pub fn bridge() -> (MemorySecurity, KeychainBridge<MemorySecurity>) {
    bridge_with(BridgeConfig::default())
}

pub fn create(bridge: &KeychainBridge<MemorySecurity>, path: &str) -> KeychainRef {
    bridge
        .create(Some(path), Some(PASSWORD))
        .expect("keychain should be created")
}

/// Keychain path exactly `len` bytes long
pub fn long_path(len: usize) -> String {
    let fixed = "/tmp/".len() + ".keychain".len();
    format!("/tmp/{}.keychain", "k".repeat(len.saturating_sub(fixed)))
}
