//! Run results and the execution shell around one login attempt.
//!
//! [`execute`] always returns a report with exactly one [`RunResult`]:
//! engine errors, panics inside the run and deadline overruns all become
//! `RunResult::Error` instead of escaping to the caller.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;

use crate::config::EngineSettings;
use crate::device::Device;
use crate::login::{Credentials, LoginError, LoginMachine, LoginState};

/// Terminal outcome of a login run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum RunResult {
    Success,
    Restricted,
    Checkpoint,
    /// Screen matched no known phrase; needs manual review
    Unknown,
    Error(String),
}

impl RunResult {
    pub fn is_error(&self) -> bool {
        matches!(self, RunResult::Error(_))
    }
}

impl std::fmt::Display for RunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunResult::Success => write!(f, "Success: logged in"),
            RunResult::Restricted => write!(f, "Restricted: account flagged"),
            RunResult::Checkpoint => write!(f, "Checkpoint: identity or credential issue"),
            RunResult::Unknown => write!(f, "Unknown: manual review required"),
            RunResult::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}

/// Result of a complete login run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Account the run logged into
    pub identifier: String,

    pub outcome: RunResult,

    /// States entered, in order
    pub states: Vec<LoginState>,

    pub started_at: DateTime<Utc>,

    pub elapsed_ms: u64,
}

/// Run the login flow once and contain every failure.
pub async fn execute<D>(device: &D, credentials: &Credentials, settings: &EngineSettings) -> RunReport
where
    D: Device + ?Sized,
{
    let started_at = Utc::now();
    let clock = tokio::time::Instant::now();
    tracing::info!(identifier = %credentials.identifier, "starting login run");

    let mut machine = LoginMachine::new(device, credentials, settings);
    let run = AssertUnwindSafe(machine.run()).catch_unwind();

    let finished = match settings.run_deadline {
        Some(limit) => match tokio::time::timeout(limit, run).await {
            Ok(finished) => finished,
            Err(_) => Ok(Err(LoginError::DeadlineExceeded(limit))),
        },
        None => run.await,
    };

    let outcome = match finished {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "login run failed");
            RunResult::Error(e.to_string())
        }
        Err(panic) => {
            let e = LoginError::Panicked(panic_message(panic.as_ref()));
            tracing::error!(error = %e, "login run aborted");
            RunResult::Error(e.to_string())
        }
    };

    let report = RunReport {
        identifier: credentials.identifier.clone(),
        outcome,
        states: machine.visited().to_vec(),
        started_at,
        elapsed_ms: clock.elapsed().as_millis() as u64,
    };
    tracing::info!(outcome = %report.outcome, elapsed_ms = report.elapsed_ms, "login run finished");
    report
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceResult, Snapshot, UiElement};
    use async_trait::async_trait;

    struct PanickingDevice;

    #[async_trait]
    impl Device for PanickingDevice {
        async fn connect(&self) -> DeviceResult<()> {
            Ok(())
        }
        async fn snapshot(&self) -> DeviceResult<Snapshot> {
            panic!("portal crashed")
        }
        async fn tap(&self, _element: &UiElement) -> DeviceResult<()> {
            Ok(())
        }
        async fn type_text(&self, _text: &str) -> DeviceResult<()> {
            Ok(())
        }
        async fn press_key(&self, _code: u32) -> DeviceResult<()> {
            Ok(())
        }
        async fn start_app(&self, _package: &str) -> DeviceResult<()> {
            Ok(())
        }
    }

    fn creds() -> Credentials {
        Credentials::new("alice", "pw", "JBSWY3DPEHPK3PXP", "com.example.app")
    }

    #[test]
    fn test_result_serialization() {
        let json = serde_json::to_value(RunResult::Error("boom".into())).unwrap();
        assert_eq!(json, serde_json::json!({"status": "error", "message": "boom"}));
        let json = serde_json::to_value(RunResult::Success).unwrap();
        assert_eq!(json, serde_json::json!({"status": "success"}));
    }

    #[test]
    fn test_result_lines() {
        assert_eq!(RunResult::Unknown.to_string(), "Unknown: manual review required");
        assert_eq!(RunResult::Error("x".into()).to_string(), "Error: x");
        assert!(RunResult::Error("x".into()).is_error());
        assert!(!RunResult::Checkpoint.is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_becomes_error() {
        let settings = EngineSettings::defaults();
        let report = execute(&PanickingDevice, &creds(), &settings).await;
        assert_eq!(
            report.outcome,
            RunResult::Error("login run panicked: portal crashed".to_string())
        );
        assert_eq!(report.states, vec![LoginState::Launch, LoginState::UsernameEntry]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_becomes_error() {
        let mut settings = EngineSettings::defaults();
        settings.run_deadline = Some(std::time::Duration::from_secs(5));
        let device = crate::device::ScriptedDevice::single(Snapshot::from_elements(
            vec![],
            serde_json::Value::Null,
        ));

        let report = execute(&device, &creds(), &settings).await;
        assert!(report.outcome.is_error());
        assert!(matches!(&report.outcome, RunResult::Error(msg) if msg.contains("deadline")));
    }
}
