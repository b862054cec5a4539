//! # chime-settings
//!
//! Startup configuration for the chime server and client.
//!
//! Settings are resolved once, in priority order:
//! 1. **Compiled defaults**: [`ChimeSettings::default()`]
//! 2. **Settings file**: `~/.chime/settings.json` or an explicit path, deep-merged over defaults
//! 3. **Environment variables**: `CHIME_*` overrides
//!
//! Command-line flags are layered on top by the binary. Nothing is reloaded
//! after startup.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::{ChimeSettings, ClientSettings, CommandSpec, LoggingSettings, ServerSettings};
