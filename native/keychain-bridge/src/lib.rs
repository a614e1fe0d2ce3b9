//! Keychain bridge
//!
//! Handle management, value marshalling and native status translation
//! between a managed runtime and the macOS keychain services API. The
//! `napi` addon in the parent crate exposes [`KeychainBridge`] to
//! JavaScript. Off macOS the platform backend reports every keychain call
//! as unavailable; the in-memory backend is there for tests.

pub mod bridge;
pub mod collection;
pub mod config;
pub mod error;
pub mod fourcc;
pub mod handle;
pub mod native;
pub mod runtime;
pub mod settings;
pub mod status;
pub mod translate;

pub use bridge::KeychainBridge;
pub use config::{BridgeConfig, DeleteConvention};
pub use error::{BridgeErrorCode, BridgeResult, ErrorCategory, ErrorContext, ErrorInfo, KeychainError};
pub use fourcc::four_char_code;
pub use handle::{HandleRegistry, KeychainHandle, KeychainRef, RefFlavor};
pub use native::{
    KeychainList, MemorySecurity, NativeOp, PlatformSecurity, RawKeychain, SecurityApi, UnavailableSecurity,
};
pub use runtime::{BridgeRuntime, RuntimeState};
pub use settings::{KeychainSettings, DEFAULT_TIMEOUT, NO_TIMEOUT};
pub use status::{KeychainStatus, OsStatus, PreferenceDomain};
