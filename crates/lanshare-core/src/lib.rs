//! lanshare core - shared types, configuration, and identity derivation
//!
//! This crate contains the foundational pieces used by every lanshare component:
//! the error taxonomy, the TOML configuration, deterministic device naming,
//! client address derivation, and the event frame encoding pushed to streams.
//! It has no dependencies on networking or async runtimes.

pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod net;

pub use config::{Config, ConfigError, PresenceConfig, RateLimitConfig, ServerConfig, SignalConfig};
pub use device::{Device, DeviceClass};
pub use error::*;
pub use event::{EventFrame, EventKind};
pub use net::ClientAddr;

/// Maximum device identifier length in bytes
pub const MAX_DEVICE_ID_LEN: usize = 128;

/// Maximum display name length in characters
pub const MAX_DISPLAY_NAME_LEN: usize = 64;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8080;
