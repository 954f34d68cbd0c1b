//! # snkweb-settings
//!
//! Configuration for the snkweb search client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`SnkSettings::default()`]
//! 2. **User file** — `~/.snkweb/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `SNK_*` overrides (highest priority)
//!
//! Login credentials are kept out of the file; see [`LoginCredentials`].

#![deny(unsafe_code)]

pub mod credentials;
pub mod errors;
pub mod loader;
pub mod types;

pub use credentials::LoginCredentials;
pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
