//! adb-backed device client.
//!
//! Screen state comes from an accessibility portal app installed on the
//! handset, which exposes the interactive element tree through a content
//! provider (`content://<authority>/state`). Input goes through `adb shell`:
//! - taps land on the centre of the element's bounds (`input tap`)
//! - text is base64-encoded and broadcast to the portal keyboard
//! - keys use `input keyevent`, apps start through `monkey`

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;

use super::Device;
use super::types::{Bounds, DeviceError, DeviceResult, Snapshot, UiElement};
use crate::config::AdbSettings;

/// Device reached through the adb command-line client
#[derive(Debug)]
pub struct AdbDevice {
    settings: AdbSettings,
    connected: AtomicBool,
}

impl AdbDevice {
    pub fn new(settings: AdbSettings) -> Self {
        Self {
            settings,
            connected: AtomicBool::new(false),
        }
    }

    pub fn serial(&self) -> Option<&str> {
        self.settings.serial.as_deref()
    }

    async fn adb(&self, args: &[&str]) -> DeviceResult<String> {
        let mut cmd = Command::new(&self.settings.binary);
        if let Some(serial) = &self.settings.serial {
            cmd.args(["-s", serial.as_str()]);
        }
        let output = cmd.args(args).kill_on_drop(true).output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeviceError::Transport(format!(
                "adb {} exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn shell(&self, args: &[&str]) -> DeviceResult<String> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("shell");
        full.extend_from_slice(args);
        self.adb(&full).await
    }
}

#[async_trait]
impl Device for AdbDevice {
    async fn connect(&self) -> DeviceResult<()> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }

        // network serials must be attached before they answer get-state
        if let Some(serial) = self.serial().filter(|s| s.contains(':')) {
            let out = Command::new(&self.settings.binary)
                .args(["connect", serial])
                .output()
                .await
                .map_err(|e| DeviceError::Connection(e.to_string()))?;
            let stdout = String::from_utf8_lossy(&out.stdout).to_lowercase();
            if !out.status.success() || stdout.contains("failed") || stdout.contains("unable") {
                return Err(DeviceError::Connection(format!(
                    "adb connect {}: {}",
                    serial,
                    stdout.trim()
                )));
            }
        }

        let state = self
            .adb(&["get-state"])
            .await
            .map_err(|e| DeviceError::Connection(e.to_string()))?;
        if state.trim() != "device" {
            return Err(DeviceError::Connection(format!(
                "device {} is in state '{}'",
                self.serial().unwrap_or("<default>"),
                state.trim()
            )));
        }

        self.connected.store(true, Ordering::Release);
        tracing::debug!(serial = ?self.serial(), "adb device connected");
        Ok(())
    }

    async fn snapshot(&self) -> DeviceResult<Snapshot> {
        let uri = format!("content://{}/state", self.settings.portal_authority);
        let raw = self.shell(&["content", "query", "--uri", &uri]).await?;
        parse_portal_state(&raw)
    }

    async fn tap(&self, element: &UiElement) -> DeviceResult<()> {
        let bounds = element.bounds.ok_or_else(|| {
            DeviceError::Transport(format!("element {} has no bounds to tap", element.index))
        })?;
        let (x, y) = bounds.center();
        self.shell(&["input", "tap", &x.to_string(), &y.to_string()])
            .await
            .map(|_| ())
    }

    async fn type_text(&self, text: &str) -> DeviceResult<()> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(text.as_bytes());
        let action = format!("{}.DROIDRUN_INPUT_B64", self.settings.portal_authority);
        self.shell(&["am", "broadcast", "-a", &action, "--es", "msg", &encoded])
            .await
            .map(|_| ())
    }

    async fn press_key(&self, code: u32) -> DeviceResult<()> {
        self.shell(&["input", "keyevent", &code.to_string()])
            .await
            .map(|_| ())
    }

    async fn start_app(&self, package: &str) -> DeviceResult<()> {
        let out = self
            .shell(&["monkey", "-p", package, "-c", "android.intent.category.LAUNCHER", "1"])
            .await?;
        if out.contains("No activities found") {
            return Err(DeviceError::Transport(format!("no launchable activity in {}", package)));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct PortalElement {
    index: u32,
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "resourceId")]
    resource_id: Option<String>,
    #[serde(default, rename = "className")]
    class_name: Option<String>,
    #[serde(default)]
    bounds: Option<String>,
    #[serde(default)]
    children: Vec<PortalElement>,
}

impl From<PortalElement> for UiElement {
    fn from(el: PortalElement) -> Self {
        UiElement {
            index: el.index,
            text: el.text.unwrap_or_default(),
            resource_id: el.resource_id.unwrap_or_default(),
            class_name: el.class_name.unwrap_or_default(),
            bounds: el.bounds.as_deref().and_then(Bounds::parse),
            children: el.children.into_iter().map(UiElement::from).collect(),
        }
    }
}

/// Parse `content query` output from the portal into a snapshot.
///
/// The provider answers `Row: 0 result=<json>`; the JSON either carries the
/// state directly or wraps it as a string under `data`.
pub fn parse_portal_state(raw: &str) -> DeviceResult<Snapshot> {
    let json_start = raw
        .find("result=")
        .map(|i| i + "result=".len())
        .or_else(|| raw.find('{'))
        .ok_or_else(|| DeviceError::Parse(format!("no portal payload in '{}'", raw.trim())))?;
    let envelope: serde_json::Value = serde_json::from_str(raw[json_start..].trim())?;

    if let Some(status) = envelope.get("status").and_then(|s| s.as_str()) {
        if status != "success" {
            let message = envelope
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or(status);
            return Err(DeviceError::Transport(format!("portal error: {}", message)));
        }
    }

    let payload = match envelope.get("data").cloned() {
        Some(serde_json::Value::String(inner)) => serde_json::from_str(&inner)?,
        Some(data @ serde_json::Value::Object(_)) => data,
        _ => envelope,
    };

    let tree = payload
        .get("a11y_tree")
        .cloned()
        .ok_or_else(|| DeviceError::Parse("portal state has no a11y_tree".to_string()))?;
    let elements: Vec<PortalElement> = serde_json::from_value(tree)?;
    let device_state = payload
        .get("phone_state")
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    Ok(Snapshot::from_elements(
        elements.into_iter().map(UiElement::from).collect(),
        device_state,
    ))
}
