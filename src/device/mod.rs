//! Device client abstraction.
//!
//! The login engine only ever talks to a [`Device`]:
//! - `AdbDevice` drives a real handset through adb and an accessibility portal
//! - `ScriptedDevice` replays scripted screens for tests and dry runs

pub mod adb;
pub mod mock;
pub mod types;

use async_trait::async_trait;

pub use adb::AdbDevice;
pub use mock::{ScriptedDevice, ScriptedDeviceBuilder};
pub use types::{Bounds, DeviceAction, DeviceError, DeviceResult, KEYCODE_HOME, Snapshot, UiElement};

/// Capabilities the login engine consumes from a device.
///
/// Every call is a suspension point. Implementations own their connection
/// state; there is no shared element cache, so taps take the element from
/// the snapshot the caller decided on.
#[async_trait]
pub trait Device: Send + Sync {
    /// Reach the device. Calling it again once connected is a no-op.
    async fn connect(&self) -> DeviceResult<()>;

    /// Capture the current screen
    async fn snapshot(&self) -> DeviceResult<Snapshot>;

    /// Tap an element taken from a snapshot
    async fn tap(&self, element: &UiElement) -> DeviceResult<()>;

    /// Type into the focused field
    async fn type_text(&self, text: &str) -> DeviceResult<()>;

    /// Press an Android key code
    async fn press_key(&self, code: u32) -> DeviceResult<()>;

    /// Launch an installed package
    async fn start_app(&self, package: &str) -> DeviceResult<()>;
}
