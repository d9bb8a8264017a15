//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for droid-login, supporting:
//! - Environment variables for the device transport and delays
//! - Poll budgets for every bounded wait in the login flow
//! - The fixed element layout of the target login screens
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DROID_LOGIN_ADB` | adb binary | `adb` |
//! | `DROID_LOGIN_SERIAL` | Device serial or `host:port` | adb default device |
//! | `DROID_LOGIN_PORTAL_AUTHORITY` | Accessibility portal content authority | `com.droidrun.portal` |
//! | `DROID_LOGIN_SETTLE_SECS` | Delay after taps that change screens | `3` |
//! | `DROID_LOGIN_FINAL_SETTLE_SECS` | Delay before final classification | `10` |
//! | `DROID_LOGIN_RUN_DEADLINE_SECS` | Overall run deadline (0 = none) | `0` |
//! | `DROID_LOGIN_LAYOUT` | Layout overrides, e.g. `username=4,password=5` | built-in layout |
//!
//! # Example
//!
//! ```bash
//! export DROID_LOGIN_SERIAL="192.168.1.20:5555"
//! export DROID_LOGIN_LAYOUT="error_slot=2,two_factor=14"
//! ```

use std::env;
use std::sync::OnceLock;
use std::time::Duration;

// ============================================================================
// Default Values
// ============================================================================

/// Default adb binary
pub const DEFAULT_ADB_BINARY: &str = "adb";

/// Default content-provider authority of the accessibility portal
pub const DEFAULT_PORTAL_AUTHORITY: &str = "com.droidrun.portal";

/// Default settle delay after a transition tap (seconds)
pub const DEFAULT_SETTLE_SECS: u64 = 3;

/// Default settle delay before the final classification (seconds)
pub const DEFAULT_FINAL_SETTLE_SECS: u64 = 10;

/// Default run deadline (seconds, 0 disables it)
pub const DEFAULT_RUN_DEADLINE_SECS: u64 = 0;

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_ADB_BINARY: &str = "DROID_LOGIN_ADB";
pub const ENV_SERIAL: &str = "DROID_LOGIN_SERIAL";
pub const ENV_PORTAL_AUTHORITY: &str = "DROID_LOGIN_PORTAL_AUTHORITY";
pub const ENV_SETTLE_SECS: &str = "DROID_LOGIN_SETTLE_SECS";
pub const ENV_FINAL_SETTLE_SECS: &str = "DROID_LOGIN_FINAL_SETTLE_SECS";
pub const ENV_RUN_DEADLINE_SECS: &str = "DROID_LOGIN_RUN_DEADLINE_SECS";
pub const ENV_LAYOUT: &str = "DROID_LOGIN_LAYOUT";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for droid-login
#[derive(Debug, Clone)]
pub struct Config {
    /// Device transport settings
    pub adb: AdbSettings,
    /// Engine settings for one login run
    pub engine: EngineSettings,
}

/// Settings for the adb-backed device client
#[derive(Debug, Clone)]
pub struct AdbSettings {
    /// adb executable
    pub binary: String,
    /// Device serial, `None` lets adb pick its default device
    pub serial: Option<String>,
    /// Authority of the portal's content provider
    pub portal_authority: String,
}

/// Everything the login state machine needs besides credentials
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub timings: Timings,
    pub layout: LoginLayout,
    /// Whole-run deadline enforced by the execution shell
    pub run_deadline: Option<Duration>,
}

/// A bounded poll: at most `max_attempts` snapshots, `interval` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub const fn new(max_attempts: u32, interval_secs: u64) -> Self {
        Self {
            max_attempts,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// Longest time this policy can spend sleeping between attempts
    pub fn max_wait(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

/// Poll budgets and settle delays for each step of the flow
#[derive(Debug, Clone, PartialEq)]
pub struct Timings {
    /// Wait for the username field after launching the app
    pub username_field: PollPolicy,
    /// Short look for an inline error right after submitting
    pub error_slot: PollPolicy,
    /// Wait for either the two-factor affordance or the home screen
    pub branch_decision: PollPolicy,
    /// Wait for each intermediate two-factor navigation control
    pub two_factor_control: PollPolicy,
    /// Re-check a submit control on a fresh snapshot before tapping it
    pub submit_control: PollPolicy,
    /// Wait for the one-time-code input field
    pub otp_field: PollPolicy,
    /// Retries for the final snapshot
    pub final_snapshot: PollPolicy,
    /// Pause after a tap that triggers a screen transition
    pub settle: Duration,
    /// Pause before the final snapshot is classified
    pub final_settle: Duration,
}

/// Element indices of the pre-agreed login layout.
///
/// Indices are screen-local: each one is only meaningful on the screen the
/// flow expects to be showing when it is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginLayout {
    pub username_field: u32,
    pub password_field: u32,
    pub login_button: u32,
    pub error_slot: u32,
    pub two_factor_affordance: u32,
    pub otp_method_selector: u32,
    pub continue_control: u32,
    pub otp_field: u32,
    pub otp_submit: u32,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            adb: AdbSettings::from_env(),
            engine: EngineSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            adb: AdbSettings::defaults(),
            engine: EngineSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl AdbSettings {
    pub fn from_env() -> Self {
        Self {
            binary: env::var(ENV_ADB_BINARY).unwrap_or_else(|_| DEFAULT_ADB_BINARY.to_string()),
            serial: env::var(ENV_SERIAL).ok().filter(|s| !s.trim().is_empty()),
            portal_authority: env::var(ENV_PORTAL_AUTHORITY)
                .unwrap_or_else(|_| DEFAULT_PORTAL_AUTHORITY.to_string()),
        }
    }

    pub fn defaults() -> Self {
        Self {
            binary: DEFAULT_ADB_BINARY.to_string(),
            serial: None,
            portal_authority: DEFAULT_PORTAL_AUTHORITY.to_string(),
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> Self {
        let mut timings = Timings::default();
        timings.settle = Duration::from_secs(env_u64(ENV_SETTLE_SECS).unwrap_or(DEFAULT_SETTLE_SECS));
        timings.final_settle =
            Duration::from_secs(env_u64(ENV_FINAL_SETTLE_SECS).unwrap_or(DEFAULT_FINAL_SETTLE_SECS));

        let layout = match env::var(ENV_LAYOUT) {
            Ok(overrides) => LoginLayout::default().with_overrides(&overrides).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring {}", ENV_LAYOUT);
                LoginLayout::default()
            }),
            Err(_) => LoginLayout::default(),
        };

        Self {
            timings,
            layout,
            run_deadline: deadline_from_secs(
                env_u64(ENV_RUN_DEADLINE_SECS).unwrap_or(DEFAULT_RUN_DEADLINE_SECS),
            ),
        }
    }

    pub fn defaults() -> Self {
        Self {
            timings: Timings::default(),
            layout: LoginLayout::default(),
            run_deadline: deadline_from_secs(DEFAULT_RUN_DEADLINE_SECS),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            username_field: PollPolicy::new(15, 2),
            error_slot: PollPolicy::new(3, 1),
            branch_decision: PollPolicy::new(10, 2),
            two_factor_control: PollPolicy::new(3, 1),
            submit_control: PollPolicy::new(3, 1),
            otp_field: PollPolicy::new(10, 2),
            final_snapshot: PollPolicy::new(3, 1),
            settle: Duration::from_secs(DEFAULT_SETTLE_SECS),
            final_settle: Duration::from_secs(DEFAULT_FINAL_SETTLE_SECS),
        }
    }
}

impl Default for LoginLayout {
    fn default() -> Self {
        Self {
            username_field: 4,
            password_field: 5,
            login_button: 6,
            error_slot: 3,
            two_factor_affordance: 9,
            otp_method_selector: 2,
            continue_control: 7,
            otp_field: 3,
            otp_submit: 5,
        }
    }
}

impl LoginLayout {
    /// Apply `key=index` overrides separated by commas
    pub fn with_overrides(mut self, overrides: &str) -> Result<Self, String> {
        for pair in overrides.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected key=index, got '{}'", pair))?;
            let index: u32 = value
                .trim()
                .parse()
                .map_err(|_| format!("invalid index '{}' for '{}'", value.trim(), key.trim()))?;
            let slot = match key.trim() {
                "username" => &mut self.username_field,
                "password" => &mut self.password_field,
                "login" => &mut self.login_button,
                "error_slot" => &mut self.error_slot,
                "two_factor" => &mut self.two_factor_affordance,
                "otp_method" => &mut self.otp_method_selector,
                "continue" => &mut self.continue_control,
                "otp_field" => &mut self.otp_field,
                "otp_submit" => &mut self.otp_submit,
                other => return Err(format!("unknown layout key '{}'", other)),
            };
            *slot = index;
        }
        Ok(self)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn deadline_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_overrides() {
        let layout = LoginLayout::default()
            .with_overrides("username=11, otp_field=20")
            .unwrap();
        assert_eq!(layout.username_field, 11);
        assert_eq!(layout.otp_field, 20);
        assert_eq!(layout.password_field, LoginLayout::default().password_field);
    }

    #[test]
    fn test_layout_overrides_invalid() {
        assert!(LoginLayout::default().with_overrides("username").is_err());
        assert!(LoginLayout::default().with_overrides("username=abc").is_err());
        assert!(LoginLayout::default().with_overrides("avatar=3").is_err());
    }

    #[test]
    fn test_poll_policy_max_wait() {
        assert_eq!(PollPolicy::new(5, 2).max_wait(), Duration::from_secs(8));
        assert_eq!(PollPolicy::new(0, 2).max_wait(), Duration::ZERO);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert_eq!(config.adb.binary, DEFAULT_ADB_BINARY);
        assert_eq!(config.adb.portal_authority, DEFAULT_PORTAL_AUTHORITY);
        assert_eq!(config.engine.run_deadline, None);
        assert_eq!(config.engine.timings.final_settle, Duration::from_secs(10));
    }
}
