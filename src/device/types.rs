// Core types shared by every device client

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Screen rectangle of an element in device pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Centre point, where taps land
    pub fn center(&self) -> (i32, i32) {
        ((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }

    /// Parse the portal's `"left, top, right, bottom"` form
    pub fn parse(raw: &str) -> Option<Self> {
        let parts: Vec<i32> = raw
            .split(',')
            .map(|p| p.trim().parse().ok())
            .collect::<Option<Vec<_>>>()?;
        match parts.as_slice() {
            [l, t, r, b] => Some(Self::new(*l, *t, *r, *b)),
            _ => None,
        }
    }
}

/// One node of the accessibility tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UiElement {
    /// Screen-local identifier; only valid against the snapshot it came from
    pub index: u32,

    /// Rendered text, possibly empty
    #[serde(default)]
    pub text: String,

    /// Platform resource id, possibly empty
    #[serde(default)]
    pub resource_id: String,

    /// Widget class name, possibly empty
    #[serde(default)]
    pub class_name: String,

    #[serde(default)]
    pub bounds: Option<Bounds>,

    #[serde(default)]
    pub children: Vec<UiElement>,
}

impl UiElement {
    pub fn new(index: u32, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = resource_id.into();
        self
    }

    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_children(mut self, children: Vec<UiElement>) -> Self {
        self.children = children;
        self
    }

    /// Depth-first walk over this element's descendants (not itself)
    pub fn descendants(&self) -> Vec<&UiElement> {
        let mut out = Vec::new();
        let mut stack: Vec<&UiElement> = self.children.iter().rev().collect();
        while let Some(el) = stack.pop() {
            out.push(el);
            stack.extend(el.children.iter().rev());
        }
        out
    }
}

/// One point-in-time capture of the device UI.
///
/// Snapshots are never compared with each other. Each one is inspected on its
/// own and discarded once the next one is taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Flattened, human-readable rendering of the whole tree
    pub formatted_text: String,

    /// Synthetic root holding the top-level elements
    pub root: UiElement,

    /// Index-addressable elements that can receive taps. Mirrors what the
    /// portal exposes (interactive nodes only); no further filtering is done.
    pub clickable: Vec<UiElement>,

    /// Opaque device metadata (current app, keyboard state, ...)
    pub device_state: serde_json::Value,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Build a snapshot from top-level elements, deriving the rendered text
    /// and clickable set from the tree. Every descendant lands in the
    /// clickable set, since the portal only reports interactive nodes.
    pub fn from_elements(elements: Vec<UiElement>, device_state: serde_json::Value) -> Self {
        let root = UiElement::new(0, "").with_children(elements);
        let clickable: Vec<UiElement> = root
            .descendants()
            .into_iter()
            .map(|el| UiElement {
                children: Vec::new(),
                ..el.clone()
            })
            .collect();
        let formatted_text = render_tree(&root);

        Self {
            formatted_text,
            root,
            clickable,
            device_state,
            captured_at: Utc::now(),
        }
    }

    /// Clickable element with the given index, if present on this screen
    pub fn clickable(&self, index: u32) -> Option<&UiElement> {
        self.clickable.iter().find(|el| el.index == index)
    }

    pub fn has_clickable(&self, index: u32) -> bool {
        self.clickable(index).is_some()
    }

    /// Lower-cased rendered text, for phrase matching
    pub fn text_lower(&self) -> String {
        self.formatted_text.to_lowercase()
    }
}

fn render_tree(root: &UiElement) -> String {
    fn walk(out: &mut String, el: &UiElement, depth: usize) {
        let _ = writeln!(
            out,
            "{}{}. {}: \"{}\", \"{}\"",
            "  ".repeat(depth),
            el.index,
            el.class_name,
            el.resource_id,
            el.text
        );
        for child in &el.children {
            walk(out, child, depth + 1);
        }
    }

    let mut out = String::new();
    for child in &root.children {
        walk(&mut out, child, 0);
    }
    out
}

/// An action sent to the device, as recorded by clients that keep a log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceAction {
    Connect,
    PressKey(u32),
    StartApp(String),
    Tap(u32),
    /// Text is kept only by test doubles; it may hold secrets
    TypeText(String),
}

/// Android key code for HOME
pub const KEYCODE_HOME: u32 = 3;

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Error types for device operations
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The addressed device could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// A query or action failed in transit
    #[error("Transport error: {0}")]
    Transport(String),

    /// The device answered with something we could not understand
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
