//! droid-login - Deterministic app login driven through an accessibility snapshot.
//!
//! This crate provides:
//! - A login state machine (launch, credentials, submit, two-factor, classification)
//! - A bounded polling primitive that re-reads the screen until it settles
//! - Time-based one-time code generation for two-factor challenges
//! - Ordered keyword classification of the final screen
//! - An adb-backed device client and a scripted device for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use droid_login::{AdbDevice, Credentials, config, execute};
//!
//! # async fn demo() {
//! let cfg = config::get();
//! let device = AdbDevice::new(cfg.adb.clone());
//! let creds = Credentials::new("user@example.com", "password", "JBSWY3DPEHPK3PXP", "com.example.app");
//! let report = execute(&device, &creds, &cfg.engine).await;
//! println!("{}", report.outcome);
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod device;
pub mod logging;
pub mod login;
pub mod otp;
pub mod runner;
pub mod wait;

// Re-export runner types
pub use runner::{RunReport, RunResult, execute};

// Re-export login types
pub use login::{Credentials, LoginError, LoginMachine, LoginResult, LoginState};

// Re-export device types and clients
pub use device::{
    AdbDevice, Device, DeviceAction, DeviceError, DeviceResult, ScriptedDevice, Snapshot, UiElement,
};

// Re-export the polling primitive and classifier
pub use classify::classify;
pub use config::{EngineSettings, LoginLayout, PollPolicy, Timings};
pub use wait::{WaitOutcome, wait_until};
