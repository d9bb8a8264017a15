//! The login state machine.
//!
//! Each state is a variant of [`Stage`], carrying the snapshot its action is
//! allowed to use. A handler performs the state's entry action and returns
//! either the next stage or a terminal [`RunResult`]. Indices are only ever
//! resolved against the snapshot that was just inspected. Text entry can
//! re-render a screen, so submit controls are looked up again on a fresh
//! snapshot after typing.
//!
//! Waits at the branch point and inside the two-factor flow are best-effort:
//! when they run out the flow moves on to the final classification instead of
//! failing, since the screen text settles the outcome either way. Only the
//! username-field wait is fatal.

use tracing::{debug, info, warn};

use super::types::{Credentials, LoginError, LoginResult, LoginState};
use crate::classify;
use crate::config::EngineSettings;
use crate::device::{Device, KEYCODE_HOME, Snapshot, UiElement};
use crate::otp;
use crate::runner::RunResult;
use crate::wait::{wait_for_clickable, wait_until};

/// Inline error texts that mean the submit was rejected outright
pub const LOGIN_FAILURE_PHRASES: &[&str] = &["check your email", "need help finding your account"];

/// Texts that accompany the two-factor affordance
pub const TWO_FACTOR_PHRASES: &[&str] = &[
    "two-factor",
    "authentication",
    "try another way",
    "login code",
    "check your notifications",
];

/// A state plus the data its entry action needs
#[derive(Debug)]
pub enum Stage {
    Launch,
    UsernameEntry,
    /// Login form as captured when the username field appeared
    PasswordEntry(Snapshot),
    Submit,
    ErrorCheck,
    BranchDecision,
    /// Screen showing the two-factor affordance
    TwoFactor(Snapshot),
    FinalClassification,
}

impl Stage {
    pub fn state(&self) -> LoginState {
        match self {
            Stage::Launch => LoginState::Launch,
            Stage::UsernameEntry => LoginState::UsernameEntry,
            Stage::PasswordEntry(_) => LoginState::PasswordEntry,
            Stage::Submit => LoginState::Submit,
            Stage::ErrorCheck => LoginState::ErrorCheck,
            Stage::BranchDecision => LoginState::BranchDecision,
            Stage::TwoFactor(_) => LoginState::TwoFactor,
            Stage::FinalClassification => LoginState::FinalClassification,
        }
    }
}

/// What a handler decided
#[derive(Debug)]
pub enum Transition {
    Next(Stage),
    Finish(RunResult),
}

/// Which way the flow went after submitting credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    TwoFactor,
    Home,
    Undecided,
}

/// Decide the branch shown by one snapshot
pub fn detect_branch(snapshot: &Snapshot, two_factor_affordance: u32) -> Branch {
    let text = snapshot.text_lower();
    if snapshot.has_clickable(two_factor_affordance)
        && TWO_FACTOR_PHRASES.iter().any(|p| text.contains(p))
    {
        Branch::TwoFactor
    } else if classify::shows_home(&snapshot.formatted_text) {
        Branch::Home
    } else {
        Branch::Undecided
    }
}

/// Text of the error slot when it holds a known failure phrase
pub fn login_failure_text(snapshot: &Snapshot, error_slot: u32) -> Option<&str> {
    snapshot
        .clickable(error_slot)
        .map(|el| el.text.as_str())
        .filter(|text| {
            let lower = text.to_lowercase();
            LOGIN_FAILURE_PHRASES.iter().any(|p| lower.contains(p))
        })
}

/// Drives one login attempt against one device
pub struct LoginMachine<'a, D: Device + ?Sized> {
    device: &'a D,
    credentials: &'a Credentials,
    settings: &'a EngineSettings,
    visited: Vec<LoginState>,
}

impl<'a, D: Device + ?Sized> LoginMachine<'a, D> {
    pub fn new(device: &'a D, credentials: &'a Credentials, settings: &'a EngineSettings) -> Self {
        Self {
            device,
            credentials,
            settings,
            visited: Vec::new(),
        }
    }

    /// States entered so far, in order
    pub fn visited(&self) -> &[LoginState] {
        &self.visited
    }

    /// Run from `Launch` until a terminal result
    pub async fn run(&mut self) -> LoginResult<RunResult> {
        let mut stage = Stage::Launch;
        loop {
            let state = stage.state();
            self.visited.push(state);
            info!(%state, "entering state");

            match self.step(stage).await? {
                Transition::Next(next) => stage = next,
                Transition::Finish(result) => return Ok(result),
            }
        }
    }

    /// Perform one state's entry action
    pub async fn step(&mut self, stage: Stage) -> LoginResult<Transition> {
        match stage {
            Stage::Launch => self.launch().await,
            Stage::UsernameEntry => self.username_entry().await,
            Stage::PasswordEntry(form) => self.password_entry(form).await,
            Stage::Submit => self.submit().await,
            Stage::ErrorCheck => self.error_check().await,
            Stage::BranchDecision => self.branch_decision().await,
            Stage::TwoFactor(screen) => self.two_factor(screen).await,
            Stage::FinalClassification => self.final_classification().await,
        }
    }

    async fn launch(&mut self) -> LoginResult<Transition> {
        self.device.connect().await.map_err(LoginError::Connect)?;

        let on_err = || LoginError::device(LoginState::Launch);
        self.device.press_key(KEYCODE_HOME).await.map_err(on_err())?;
        self.device
            .start_app(&self.credentials.target_package)
            .await
            .map_err(on_err())?;
        info!(package = %self.credentials.target_package, "app started");

        Ok(Transition::Next(Stage::UsernameEntry))
    }

    async fn username_entry(&mut self) -> LoginResult<Transition> {
        let index = self.settings.layout.username_field;
        let outcome =
            wait_for_clickable(self.device, self.settings.timings.username_field, index).await;
        let Some(form) = outcome.snapshot else {
            return Err(LoginError::UsernameFieldTimeout {
                index,
                attempts: outcome.attempts,
            });
        };
        debug!(attempts = outcome.attempts, "username field visible");

        let field = require(&form, index, LoginState::UsernameEntry)?;
        self.tap_and_type(field, &self.credentials.identifier, LoginState::UsernameEntry)
            .await?;

        Ok(Transition::Next(Stage::PasswordEntry(form)))
    }

    async fn password_entry(&mut self, form: Snapshot) -> LoginResult<Transition> {
        // rendered together with the username field, so no wait
        let field = require(&form, self.settings.layout.password_field, LoginState::PasswordEntry)?;
        self.tap_and_type(field, &self.credentials.passphrase, LoginState::PasswordEntry)
            .await?;

        Ok(Transition::Next(Stage::Submit))
    }

    async fn submit(&mut self) -> LoginResult<Transition> {
        let index = self.settings.layout.login_button;
        let outcome =
            wait_for_clickable(self.device, self.settings.timings.submit_control, index).await;
        let Some(form) = outcome.snapshot else {
            return Err(LoginError::ElementMissing {
                index,
                state: LoginState::Submit,
            });
        };

        let button = require(&form, index, LoginState::Submit)?;
        self.device
            .tap(button)
            .await
            .map_err(LoginError::device(LoginState::Submit))?;
        self.settle().await;

        Ok(Transition::Next(Stage::ErrorCheck))
    }

    async fn error_check(&mut self) -> LoginResult<Transition> {
        let slot = self.settings.layout.error_slot;
        let outcome = wait_until(self.device, self.settings.timings.error_slot, |snap| {
            login_failure_text(snap, slot).is_some()
        })
        .await;

        let Some(text) = outcome
            .snapshot
            .as_ref()
            .and_then(|snap| login_failure_text(snap, slot))
        else {
            debug!(attempts = outcome.attempts, "no inline login error");
            return Ok(Transition::Next(Stage::BranchDecision));
        };

        // a failure phrase the classifier cannot place is still a credential problem
        let result = match classify::classify(text) {
            RunResult::Unknown => RunResult::Checkpoint,
            other => other,
        };
        warn!(%result, "login rejected on submit");
        Ok(Transition::Finish(result))
    }

    async fn branch_decision(&mut self) -> LoginResult<Transition> {
        let affordance = self.settings.layout.two_factor_affordance;
        let outcome = wait_until(self.device, self.settings.timings.branch_decision, |snap| {
            detect_branch(snap, affordance) != Branch::Undecided
        })
        .await;

        let next = match outcome.snapshot {
            Some(screen) => match detect_branch(&screen, affordance) {
                Branch::TwoFactor => {
                    info!("two-factor challenge detected");
                    Stage::TwoFactor(screen)
                }
                _ => {
                    info!("home screen detected");
                    Stage::FinalClassification
                }
            },
            None => {
                warn!(
                    attempts = outcome.attempts,
                    "neither two-factor nor home screen appeared, classifying anyway"
                );
                Stage::FinalClassification
            }
        };
        Ok(Transition::Next(next))
    }

    async fn two_factor(&mut self, screen: Snapshot) -> LoginResult<Transition> {
        let layout = self.settings.layout;
        let timings = &self.settings.timings;
        let on_err = || LoginError::device(LoginState::TwoFactor);

        let affordance = require(&screen, layout.two_factor_affordance, LoginState::TwoFactor)?;
        self.device.tap(affordance).await.map_err(on_err())?;
        self.settle().await;

        for index in [layout.otp_method_selector, layout.continue_control] {
            let outcome = wait_for_clickable(self.device, timings.two_factor_control, index).await;
            match outcome.snapshot.as_ref().and_then(|snap| snap.clickable(index)) {
                Some(control) => {
                    self.device.tap(control).await.map_err(on_err())?;
                    if index == layout.continue_control {
                        self.settle().await;
                    }
                }
                None => warn!(index, "two-factor control not found, continuing"),
            }
        }

        let outcome = wait_for_clickable(self.device, timings.otp_field, layout.otp_field).await;
        let Some(code_screen) = outcome.snapshot else {
            warn!(attempts = outcome.attempts, "one-time code field never appeared");
            return Ok(Transition::Next(Stage::FinalClassification));
        };

        let code = otp::generate(&self.credentials.otp_secret);
        if code.is_empty() {
            return Err(LoginError::EmptyOneTimeCode);
        }

        let field = require(&code_screen, layout.otp_field, LoginState::TwoFactor)?;
        self.tap_and_type(field, &code, LoginState::TwoFactor).await?;

        let outcome = wait_for_clickable(self.device, timings.submit_control, layout.otp_submit).await;
        match outcome.snapshot.as_ref().and_then(|snap| snap.clickable(layout.otp_submit)) {
            Some(submit) => {
                self.device.tap(submit).await.map_err(on_err())?;
                self.settle().await;
            }
            None => warn!(index = layout.otp_submit, "code submit control not found"),
        }

        Ok(Transition::Next(Stage::FinalClassification))
    }

    async fn final_classification(&mut self) -> LoginResult<Transition> {
        tokio::time::sleep(self.settings.timings.final_settle).await;

        let outcome = wait_until(self.device, self.settings.timings.final_snapshot, |_| true).await;
        let Some(screen) = outcome.snapshot else {
            return Err(LoginError::FinalSnapshotUnavailable {
                attempts: outcome.attempts,
            });
        };

        let result = classify::classify(&screen.formatted_text);
        info!(%result, "final screen classified");
        Ok(Transition::Finish(result))
    }

    async fn tap_and_type(&self, field: &UiElement, text: &str, state: LoginState) -> LoginResult<()> {
        self.device
            .tap(field)
            .await
            .map_err(LoginError::device(state))?;
        self.device
            .type_text(text)
            .await
            .map_err(LoginError::device(state))?;
        debug!(index = field.index, chars = text.chars().count(), "typed into field");
        Ok(())
    }

    async fn settle(&self) {
        tokio::time::sleep(self.settings.timings.settle).await;
    }
}

fn require(snapshot: &Snapshot, index: u32, state: LoginState) -> LoginResult<&UiElement> {
    snapshot
        .clickable(index)
        .ok_or(LoginError::ElementMissing { index, state })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceAction, ScriptedDevice};
    use pretty_assertions::assert_eq;

    fn screen(elements: Vec<UiElement>) -> Snapshot {
        Snapshot::from_elements(elements, serde_json::Value::Null)
    }

    fn creds() -> Credentials {
        Credentials::new("alice", "s3cret", "JBSWY3DPEHPK3PXP", "com.example.app")
    }

    #[test]
    fn test_detect_branch() {
        let two_factor = screen(vec![
            UiElement::new(1, "Check your notifications on another device"),
            UiElement::new(9, "Try another way"),
        ]);
        assert_eq!(detect_branch(&two_factor, 9), Branch::TwoFactor);
        // phrase without the affordance is not enough
        assert_eq!(detect_branch(&two_factor, 10), Branch::Undecided);

        let home = screen(vec![UiElement::new(1, "What's on your mind?")]);
        assert_eq!(detect_branch(&home, 9), Branch::Home);

        let loading = screen(vec![UiElement::new(1, "Logging in…")]);
        assert_eq!(detect_branch(&loading, 9), Branch::Undecided);
    }

    #[test]
    fn test_login_failure_text() {
        let rejected = screen(vec![UiElement::new(3, "Need help finding your account?")]);
        assert_eq!(
            login_failure_text(&rejected, 3),
            Some("Need help finding your account?")
        );
        assert_eq!(login_failure_text(&rejected, 4), None);

        let other = screen(vec![UiElement::new(3, "Welcome back")]);
        assert_eq!(login_failure_text(&other, 3), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_presses_home_then_starts_app() {
        let device = ScriptedDevice::single(screen(vec![]));
        let settings = EngineSettings::defaults();
        let creds = creds();
        let mut machine = LoginMachine::new(&device, &creds, &settings);

        let next = machine.step(Stage::Launch).await.unwrap();
        assert!(matches!(next, Transition::Next(Stage::UsernameEntry)));
        assert_eq!(
            device.actions(),
            vec![
                DeviceAction::Connect,
                DeviceAction::PressKey(KEYCODE_HOME),
                DeviceAction::StartApp("com.example.app".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_username_timeout_is_fatal() {
        let device = ScriptedDevice::single(screen(vec![UiElement::new(1, "Loading")]));
        let settings = EngineSettings::defaults();
        let creds = creds();
        let mut machine = LoginMachine::new(&device, &creds, &settings);

        let err = machine.step(Stage::UsernameEntry).await.unwrap_err();
        assert!(matches!(err, LoginError::UsernameFieldTimeout { attempts: 15, .. }));
        assert!(device.taps().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_password_entry_requires_field_on_form() {
        let settings = EngineSettings::defaults();
        let form = screen(vec![UiElement::new(settings.layout.username_field, "")]);
        let device = ScriptedDevice::single(form.clone());
        let creds = creds();
        let mut machine = LoginMachine::new(&device, &creds, &settings);

        let err = machine.step(Stage::PasswordEntry(form)).await.unwrap_err();
        assert!(matches!(
            err,
            LoginError::ElementMissing {
                state: LoginState::PasswordEntry,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_relocates_button_after_typing() {
        let settings = EngineSettings::defaults();
        let device = ScriptedDevice::builder()
            .screen("typing", screen(vec![UiElement::new(4, ""), UiElement::new(5, "")]))
            .build();
        let creds = creds();
        let mut machine = LoginMachine::new(&device, &creds, &settings);

        let err = machine.step(Stage::Submit).await.unwrap_err();
        assert!(matches!(
            err,
            LoginError::ElementMissing {
                index: 6,
                state: LoginState::Submit,
            }
        ));
        assert_eq!(device.snapshot_calls(), settings.timings.submit_control.max_attempts);
        assert!(device.taps().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_failure_phrase_is_checkpoint() {
        let settings = EngineSettings::defaults();
        let device = ScriptedDevice::single(screen(vec![UiElement::new(
            settings.layout.error_slot,
            "Check your email for a login link",
        )]));
        let creds = creds();
        let mut machine = LoginMachine::new(&device, &creds, &settings);

        let next = machine.step(Stage::ErrorCheck).await.unwrap();
        assert!(matches!(next, Transition::Finish(RunResult::Checkpoint)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_branch_timeout_falls_through_to_classification() {
        let settings = EngineSettings::defaults();
        let device = ScriptedDevice::single(screen(vec![UiElement::new(1, "Please wait")]));
        let creds = creds();
        let mut machine = LoginMachine::new(&device, &creds, &settings);

        let next = machine.step(Stage::BranchDecision).await.unwrap();
        assert!(matches!(next, Transition::Next(Stage::FinalClassification)));
        assert_eq!(device.snapshot_calls(), settings.timings.branch_decision.max_attempts);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_code_field_is_best_effort() {
        let settings = EngineSettings::defaults();
        let layout = settings.layout;
        let challenge = screen(vec![UiElement::new(layout.two_factor_affordance, "Try another way")]);
        let device = ScriptedDevice::single(challenge.clone());
        let creds = creds();
        let mut machine = LoginMachine::new(&device, &creds, &settings);

        let next = machine.step(Stage::TwoFactor(challenge)).await.unwrap();
        assert!(matches!(next, Transition::Next(Stage::FinalClassification)));
        assert_eq!(device.taps(), vec![layout.two_factor_affordance]);
        assert!(device.typed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_code_submit_is_best_effort() {
        let settings = EngineSettings::defaults();
        let layout = settings.layout;
        let challenge = screen(vec![
            UiElement::new(layout.two_factor_affordance, "Try another way"),
            UiElement::new(layout.otp_field, ""),
        ]);
        let device = ScriptedDevice::single(challenge.clone());
        let creds = creds();
        let mut machine = LoginMachine::new(&device, &creds, &settings);

        let next = machine.step(Stage::TwoFactor(challenge)).await.unwrap();
        assert!(matches!(next, Transition::Next(Stage::FinalClassification)));
        assert_eq!(device.taps(), vec![layout.two_factor_affordance, layout.otp_field]);
        assert_eq!(device.typed().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_secret_never_submits_a_code() {
        let settings = EngineSettings::defaults();
        let layout = settings.layout;
        let challenge = screen(vec![
            UiElement::new(layout.two_factor_affordance, "Try another way"),
            UiElement::new(layout.otp_field, ""),
            UiElement::new(layout.otp_submit, "Continue"),
        ]);
        let device = ScriptedDevice::single(challenge.clone());
        let creds = Credentials::new("alice", "s3cret", "!!not base32!!", "com.example.app");
        let mut machine = LoginMachine::new(&device, &creds, &settings);

        let err = machine.step(Stage::TwoFactor(challenge)).await.unwrap_err();
        assert!(matches!(err, LoginError::EmptyOneTimeCode));
        assert!(!device.taps().contains(&layout.otp_submit));
        assert!(device.typed().is_empty());
    }
}
