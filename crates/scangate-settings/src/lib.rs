//! # scangate-settings
//!
//! Layered configuration for the gateway.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`GatewaySettings::default()`]
//! 2. **Settings file**: `~/.scangate/settings.json` or an explicit path,
//!    deep-merged over the defaults
//! 3. **Environment variables**: `SCANGATE_*` overrides
//!
//! The binary applies CLI flags on top. Request-scoped overrides are a
//! separate [`RequestOverlay`] and never touch the loaded settings.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod overlay;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use overlay::RequestOverlay;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = GatewaySettings::default();
        let _overlay = RequestOverlay::default();
        assert!(settings_path().ends_with(".scangate/settings.json"));
    }
}
