//! Construction-time configuration for the vending machine. See spec §6
//! "Configuration".
//!
//! Plain `serde(Deserialize)` struct, no `config`-crate layering — a caller
//! that wants TOML/YAML loading can `toml::from_str`/`serde_yaml::from_str`
//! this directly. Matches the teacher's posture of no implicit config magic.
//! Durations are expressed in whole seconds rather than pulling in a
//! humantime-style (de)serializer for three fields.

use std::time::Duration;

use serde::Deserialize;

const fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn default_login_token_duration_secs() -> u64 {
    24 * 3600
}

fn default_reaper_tick_interval_secs() -> u64 {
    60
}

/// Bounds and timing the vending machine enforces. See spec §6.
#[derive(Debug, Clone, Deserialize)]
pub struct VendingConfig {
    /// Upper bound, in seconds, on any issued token's lifetime. `Issue`
    /// rejects a requested duration exceeding this with
    /// `DurationExceedsMaxAllowed`.
    pub max_token_duration_secs: u64,

    /// Lifetime, in seconds, of the token `Exchange` issues.
    #[serde(default = "default_login_token_duration_secs")]
    pub login_token_duration_secs: u64,

    /// How often, in seconds, the background reaper calls
    /// `delete_expired_tokens`.
    #[serde(default = "default_reaper_tick_interval_secs")]
    pub reaper_tick_interval_secs: u64,
}

impl VendingConfig {
    pub fn max_token_duration(&self) -> Duration {
        secs(self.max_token_duration_secs)
    }

    pub fn login_token_duration(&self) -> Duration {
        secs(self.login_token_duration_secs)
    }

    pub fn reaper_tick_interval(&self) -> Duration {
        secs(self.reaper_tick_interval_secs)
    }
}

impl Default for VendingConfig {
    fn default() -> Self {
        Self {
            max_token_duration_secs: 365 * 24 * 3600,
            login_token_duration_secs: default_login_token_duration_secs(),
            reaper_tick_interval_secs: default_reaper_tick_interval_secs(),
        }
    }
}
