//! # nal2-settings
//!
//! Layered configuration for the NAL2 host, in priority order:
//! 1. **Compiled defaults** ([`Nal2Settings::default()`])
//! 2. **User file** `~/.nal2/settings.json`, deep-merged over defaults
//! 3. **Environment variables** `NAL2_*` (highest priority)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{LoggingSettings, Nal2Settings, ServerSettings};
