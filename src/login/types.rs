use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::device::DeviceError;

/// Inputs for one login run. Never mutated after construction.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account identifier typed into the username field
    pub identifier: String,
    pub passphrase: String,
    /// Base32 shared secret for one-time codes
    pub otp_secret: String,
    /// Package id of the app to log into
    pub target_package: String,
}

impl Credentials {
    pub fn new(
        identifier: impl Into<String>,
        passphrase: impl Into<String>,
        otp_secret: impl Into<String>,
        target_package: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            passphrase: passphrase.into(),
            otp_secret: otp_secret.into(),
            target_package: target_package.into(),
        }
    }
}

// secrets stay out of logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("passphrase", &"<redacted>")
            .field("otp_secret", &"<redacted>")
            .field("target_package", &self.target_package)
            .finish()
    }
}

/// States of the login flow, in the order a full run visits them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginState {
    Launch,
    UsernameEntry,
    PasswordEntry,
    Submit,
    ErrorCheck,
    BranchDecision,
    TwoFactor,
    FinalClassification,
}

impl std::fmt::Display for LoginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoginState::Launch => "launch",
            LoginState::UsernameEntry => "username_entry",
            LoginState::PasswordEntry => "password_entry",
            LoginState::Submit => "submit",
            LoginState::ErrorCheck => "error_check",
            LoginState::BranchDecision => "branch_decision",
            LoginState::TwoFactor => "two_factor",
            LoginState::FinalClassification => "final_classification",
        };
        f.write_str(name)
    }
}

/// Result type for login operations
pub type LoginResult<T> = Result<T, LoginError>;

/// Failures that end a login run with an `Error` result
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// The device could not be reached before the first action
    #[error("could not connect to device: {0}")]
    Connect(#[source] DeviceError),

    /// An action against the device failed
    #[error("device action failed during {state}: {source}")]
    Device {
        state: LoginState,
        #[source]
        source: DeviceError,
    },

    #[error("username field {index} did not appear after {attempts} attempts")]
    UsernameFieldTimeout { index: u32, attempts: u32 },

    #[error("element {index} is not on screen during {state}")]
    ElementMissing { index: u32, state: LoginState },

    #[error("no one-time code could be generated from the shared secret")]
    EmptyOneTimeCode,

    #[error("no final snapshot after {attempts} attempts")]
    FinalSnapshotUnavailable { attempts: u32 },

    #[error("run exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),

    #[error("login run panicked: {0}")]
    Panicked(String),
}

impl LoginError {
    /// Wrap a device error with the state it happened in
    pub fn device(state: LoginState) -> impl FnOnce(DeviceError) -> LoginError {
        move |source| LoginError::Device { state, source }
    }
}
