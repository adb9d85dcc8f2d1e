//! # vibeplot-settings
//!
//! Layered configuration for the vibeplot bridge.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`BridgeSettings::default()`]
//! 2. **User file**: `~/.vibeplot/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `VIBEPLOT_*` overrides (highest priority)
//!
//! There is no global instance; callers load a [`BridgeSettings`] value and
//! pass it to the connection manager they construct.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{BridgeSettings, DEFAULT_HOST, DEFAULT_PORT, LogFormat};
