//! macOS keychain native module
//!
//! napi-rs bindings that expose the keychain services API to Node.js
//! through the `keychain-bridge` crate. On hosts without Security.framework
//! the module still loads, but every keychain call throws.

#![deny(clippy::all)]

mod error;
mod security;
mod types;

pub use error::JsException;
pub use security::*;
pub use types::*;

use keychain_bridge::{BridgeConfig, BridgeErrorCode, BridgeRuntime, PlatformSecurity, SecurityApi};
use napi::{Env, Error, JsObject, Result, Status};
use napi_derive::{module_exports, napi};
use once_cell::sync::Lazy;
use tracing::{info, warn};

pub(crate) static RUNTIME: BridgeRuntime<PlatformSecurity> = BridgeRuntime::new();

/// Configuration read once from the environment; installs logging on first use
static INIT: Lazy<BridgeConfig> = Lazy::new(|| {
    let config = BridgeConfig::from_env();
    let level = config
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
    info!("Keychain native module initialized");
    config
});

#[module_exports]
fn init(_exports: JsObject, env: Env) -> Result<()> {
    let config = Lazy::force(&INIT).clone();

    match RUNTIME.initialize(PlatformSecurity::new(), config) {
        Ok(()) => {}
        Err(e) if e.code() == BridgeErrorCode::AlreadyInitialized => {
            // another environment in this process owns the bridge
            warn!("{}", e);
            return Ok(());
        }
        Err(e) => return Err(Error::new(Status::GenericFailure, e.to_string())),
    }

    let mut env = env;
    env.add_env_cleanup_hook((), |_| {
        if let Ok(released) = RUNTIME.teardown() {
            info!(released, "keychain bridge released on environment cleanup");
        }
    })?;
    Ok(())
}

/// Name of the keychain backend in use
#[napi]
pub fn get_platform_info() -> String {
    PlatformSecurity::new().name().to_string()
}
