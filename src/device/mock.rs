//! Scripted device for tests and dry runs.
//!
//! A `ScriptedDevice` holds a set of named screens and the taps that move
//! between them:
//! - `screen()` registers a snapshot under a name (the first one is shown first)
//! - `transition()` moves to another screen when an index is tapped
//! - `transition_delayed()` does the same but keeps answering with the old
//!   screen for a few snapshot calls, like a slow render
//! - `fail_snapshots()` / `refuse_connect()` inject transport failures
//!
//! Every action is recorded so tests can assert on what the engine did.
//! Tapping an index the showing screen does not have is a transport error
//! and is not recorded.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::Device;
use super::types::{DeviceAction, DeviceError, DeviceResult, Snapshot, UiElement};

#[derive(Debug, Clone)]
struct Transition {
    to: String,
    delay_polls: u32,
}

#[derive(Debug)]
struct ScriptState {
    current: String,
    pending: Option<(String, u32)>,
    failing_snapshots: u32,
    snapshot_calls: u32,
    actions: Vec<DeviceAction>,
}

/// Builder for [`ScriptedDevice`]
#[derive(Debug, Default)]
pub struct ScriptedDeviceBuilder {
    screens: HashMap<String, Snapshot>,
    first: Option<String>,
    transitions: HashMap<(String, u32), Transition>,
    failing_snapshots: u32,
    connect_error: Option<String>,
}

impl ScriptedDeviceBuilder {
    /// Register a screen. The first registered screen is the initial one.
    pub fn screen(mut self, name: &str, snapshot: Snapshot) -> Self {
        if self.first.is_none() {
            self.first = Some(name.to_string());
        }
        self.screens.insert(name.to_string(), snapshot);
        self
    }

    /// Tapping `index` while `from` is showing switches to `to`
    pub fn transition(self, from: &str, index: u32, to: &str) -> Self {
        self.transition_delayed(from, index, to, 0)
    }

    /// Like `transition`, but the next `delay_polls` snapshots still show `from`
    pub fn transition_delayed(mut self, from: &str, index: u32, to: &str, delay_polls: u32) -> Self {
        self.transitions.insert(
            (from.to_string(), index),
            Transition {
                to: to.to_string(),
                delay_polls,
            },
        );
        self
    }

    /// The first `count` snapshot calls fail with a transport error
    pub fn fail_snapshots(mut self, count: u32) -> Self {
        self.failing_snapshots = count;
        self
    }

    /// Every `connect` call fails
    pub fn refuse_connect(mut self, reason: &str) -> Self {
        self.connect_error = Some(reason.to_string());
        self
    }

    pub fn build(self) -> ScriptedDevice {
        let current = self.first.unwrap_or_default();
        ScriptedDevice {
            screens: self.screens,
            transitions: self.transitions,
            connect_error: self.connect_error,
            state: Mutex::new(ScriptState {
                current,
                pending: None,
                failing_snapshots: self.failing_snapshots,
                snapshot_calls: 0,
                actions: Vec::new(),
            }),
        }
    }
}

/// Device that replays scripted screens and records every action
#[derive(Debug)]
pub struct ScriptedDevice {
    screens: HashMap<String, Snapshot>,
    transitions: HashMap<(String, u32), Transition>,
    connect_error: Option<String>,
    state: Mutex<ScriptState>,
}

impl ScriptedDevice {
    pub fn builder() -> ScriptedDeviceBuilder {
        ScriptedDeviceBuilder::default()
    }

    /// A device that always shows the same screen
    pub fn single(snapshot: Snapshot) -> Self {
        Self::builder().screen("only", snapshot).build()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Everything the device was asked to do, in order
    pub fn actions(&self) -> Vec<DeviceAction> {
        self.lock().actions.clone()
    }

    /// Indices of every tap, in order
    pub fn taps(&self) -> Vec<u32> {
        self.lock()
            .actions
            .iter()
            .filter_map(|a| match a {
                DeviceAction::Tap(index) => Some(*index),
                _ => None,
            })
            .collect()
    }

    /// Text typed so far, in order
    pub fn typed(&self) -> Vec<String> {
        self.lock()
            .actions
            .iter()
            .filter_map(|a| match a {
                DeviceAction::TypeText(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of snapshot requests, failed ones included
    pub fn snapshot_calls(&self) -> u32 {
        self.lock().snapshot_calls
    }

    /// Name of the screen currently showing
    pub fn current_screen(&self) -> String {
        self.lock().current.clone()
    }
}

#[async_trait]
impl Device for ScriptedDevice {
    async fn connect(&self) -> DeviceResult<()> {
        self.lock().actions.push(DeviceAction::Connect);
        match &self.connect_error {
            Some(reason) => Err(DeviceError::Connection(reason.clone())),
            None => Ok(()),
        }
    }

    async fn snapshot(&self) -> DeviceResult<Snapshot> {
        let mut state = self.lock();
        state.snapshot_calls += 1;

        if state.failing_snapshots > 0 {
            state.failing_snapshots -= 1;
            return Err(DeviceError::Transport("scripted snapshot failure".to_string()));
        }

        if let Some((to, remaining)) = state.pending.take() {
            if remaining == 0 {
                state.current = to;
            } else {
                state.pending = Some((to, remaining - 1));
            }
        }

        self.screens
            .get(&state.current)
            .cloned()
            .ok_or_else(|| DeviceError::Transport(format!("no screen named '{}'", state.current)))
    }

    async fn tap(&self, element: &UiElement) -> DeviceResult<()> {
        let mut state = self.lock();
        let on_screen = self
            .screens
            .get(&state.current)
            .is_some_and(|snap| snap.has_clickable(element.index));
        if !on_screen {
            return Err(DeviceError::Transport(format!(
                "element {} is not on screen '{}'",
                element.index, state.current
            )));
        }
        state.actions.push(DeviceAction::Tap(element.index));

        let key = (state.current.clone(), element.index);
        if let Some(transition) = self.transitions.get(&key) {
            if transition.delay_polls == 0 {
                state.current = transition.to.clone();
                state.pending = None;
            } else {
                state.pending = Some((transition.to.clone(), transition.delay_polls));
            }
        }
        Ok(())
    }

    async fn type_text(&self, text: &str) -> DeviceResult<()> {
        self.lock().actions.push(DeviceAction::TypeText(text.to_string()));
        Ok(())
    }

    async fn press_key(&self, code: u32) -> DeviceResult<()> {
        self.lock().actions.push(DeviceAction::PressKey(code));
        Ok(())
    }

    async fn start_app(&self, package: &str) -> DeviceResult<()> {
        self.lock().actions.push(DeviceAction::StartApp(package.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen(text: &str, indices: &[u32]) -> Snapshot {
        Snapshot::from_elements(
            indices.iter().map(|i| UiElement::new(*i, text)).collect(),
            serde_json::Value::Null,
        )
    }

    #[tokio::test]
    async fn test_transition_on_tap() {
        let device = ScriptedDevice::builder()
            .screen("a", screen("first", &[1]))
            .screen("b", screen("second", &[2]))
            .transition("a", 1, "b")
            .build();

        assert!(device.snapshot().await.unwrap().has_clickable(1));
        device.tap(&UiElement::new(1, "")).await.unwrap();
        assert!(device.snapshot().await.unwrap().has_clickable(2));
        assert_eq!(device.current_screen(), "b");
        assert_eq!(device.taps(), vec![1]);
    }

    #[tokio::test]
    async fn test_delayed_transition() {
        let device = ScriptedDevice::builder()
            .screen("a", screen("first", &[1]))
            .screen("b", screen("second", &[2]))
            .transition_delayed("a", 1, "b", 2)
            .build();

        device.tap(&UiElement::new(1, "")).await.unwrap();
        assert!(device.snapshot().await.unwrap().has_clickable(1));
        assert!(device.snapshot().await.unwrap().has_clickable(1));
        assert!(device.snapshot().await.unwrap().has_clickable(2));
    }

    #[tokio::test]
    async fn test_tap_off_screen_is_rejected() {
        let device = ScriptedDevice::builder()
            .screen("a", screen("first", &[1]))
            .screen("b", screen("second", &[2]))
            .transition("a", 1, "b")
            .build();

        device.tap(&UiElement::new(1, "")).await.unwrap();
        let err = device.tap(&UiElement::new(1, "")).await.unwrap_err();
        assert!(matches!(err, DeviceError::Transport(msg) if msg.contains("'b'")));
        assert_eq!(device.taps(), vec![1]);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let device = ScriptedDevice::builder()
            .screen("a", screen("first", &[1]))
            .fail_snapshots(1)
            .refuse_connect("offline")
            .build();

        assert!(matches!(device.connect().await, Err(DeviceError::Connection(_))));
        assert!(device.snapshot().await.is_err());
        assert!(device.snapshot().await.is_ok());
        assert_eq!(device.snapshot_calls(), 2);
    }
}
