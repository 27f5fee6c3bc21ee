//! Device backend contract: the perception getters and action primitives the
//! agent loop drives, plus the selector-request shapes they accept.

mod http;
pub mod tools;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use http::{HttpDeviceBackend, DEFAULT_DEVICE_BASE_URL};
pub use tools::{dispatch_tool_call, format_tools_list, ToolOutcome, DEVICE_TOOLS,
    SCREENSHOT_TOOL, UI_MUTATING_TOOLS};

/// Device layer errors. Only perception getters raise these; action
/// primitives report failures as strings so the loop can feed them back to
/// the model instead of aborting.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("device request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("device returned malformed payload: {0}")]
    Malformed(String),
    #[error("invalid selector request: {0}")]
    InvalidSelector(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// One screen snapshot: base64 PNG plus the UI hierarchy and dimensions.
#[derive(Debug, Clone, Default)]
pub struct ScreenData {
    pub base64: String,
    /// UI hierarchy as reported by the automation server (tree or flat list).
    pub elements: Value,
    pub width: u32,
    pub height: u32,
}

/// How to address a UI element. The variant is decided by explicit field
/// presence; see [`SelectorRequest::from_value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectorRequest {
    Text { text: String },
    Id { id: String },
    IdWithText { id: String, text: String },
    Coordinates { x: i64, y: i64 },
    Percentages { x_pct: f64, y_pct: f64 },
}

impl SelectorRequest {
    /// Decide the selector variant from which keys are present in a raw
    /// parameter object. `id` together with `text` selects the combined
    /// variant; a lone `text`, `id`, `coordinates` ([x, y] pixels) or
    /// `percentages` ([x, y] in 0..=1) selects the matching variant. When
    /// keys are ambiguous, text wins.
    pub fn from_value(value: &Value) -> Result<Self, DeviceError> {
        let text = value.get("text").and_then(Value::as_str);
        let id = value.get("id").and_then(Value::as_str);

        match (id, text) {
            (Some(id), Some(text)) => {
                return Ok(SelectorRequest::IdWithText {
                    id: id.to_string(),
                    text: text.to_string(),
                })
            }
            (None, Some(text)) => {
                return Ok(SelectorRequest::Text {
                    text: text.to_string(),
                })
            }
            (Some(id), None) => return Ok(SelectorRequest::Id { id: id.to_string() }),
            (None, None) => {}
        }

        if let Some(pair) = value.get("coordinates").and_then(Value::as_array) {
            if let (Some(x), Some(y)) = (
                pair.first().and_then(Value::as_i64),
                pair.get(1).and_then(Value::as_i64),
            ) {
                return Ok(SelectorRequest::Coordinates { x, y });
            }
        }

        if let Some(pair) = value.get("percentages").and_then(Value::as_array) {
            if let (Some(x), Some(y)) = (
                pair.first().and_then(Value::as_f64),
                pair.get(1).and_then(Value::as_f64),
            ) {
                return Ok(SelectorRequest::Percentages { x_pct: x, y_pct: y });
            }
        }

        Err(DeviceError::InvalidSelector(format!(
            "no recognized selector keys in {value}"
        )))
    }
}

impl fmt::Display for SelectorRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorRequest::Text { text } => write!(f, "text={text:?}"),
            SelectorRequest::Id { id } => write!(f, "id={id:?}"),
            SelectorRequest::IdWithText { id, text } => write!(f, "id={id:?} text={text:?}"),
            SelectorRequest::Coordinates { x, y } => write!(f, "coordinates=({x}, {y})"),
            SelectorRequest::Percentages { x_pct, y_pct } => {
                write!(f, "percentages=({x_pct}, {y_pct})")
            }
        }
    }
}

/// A swipe gesture, either directional or between explicit coordinates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwipeRequest {
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub start_coordinate: Option<[i64; 2]>,
    #[serde(default)]
    pub end_coordinate: Option<[i64; 2]>,
}

/// Hardware keys the backend can press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Key {
    Home,
    Back,
    Menu,
    Power,
    Enter,
    VolumeUp,
    VolumeDown,
}

impl Key {
    pub fn as_str(&self) -> &'static str {
        match self {
            Key::Home => "HOME",
            Key::Back => "BACK",
            Key::Menu => "MENU",
            Key::Power => "POWER",
            Key::Enter => "ENTER",
            Key::VolumeUp => "VOLUME_UP",
            Key::VolumeDown => "VOLUME_DOWN",
        }
    }
}

impl FromStr for Key {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HOME" => Ok(Key::Home),
            "BACK" => Ok(Key::Back),
            "MENU" => Ok(Key::Menu),
            "POWER" => Ok(Key::Power),
            "ENTER" => Ok(Key::Enter),
            "VOLUME_UP" => Ok(Key::VolumeUp),
            "VOLUME_DOWN" => Ok(Key::VolumeDown),
            other => Err(DeviceError::InvalidKey(other.to_string())),
        }
    }
}

/// Outcome of an action primitive: `None` on success, `Some(description)`
/// when the backend rejected or failed the action. Implementations fold
/// transport errors into the description — action failures are feedback for
/// the model, never fatal.
pub type ActionOutcome = Option<String>;

/// The device automation collaborator. One exclusively-owned instance per
/// run; the loop never issues concurrent calls against it.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    async fn get_screen_data(&self) -> Result<ScreenData, DeviceError>;
    async fn get_focused_app(&self) -> Result<Option<String>, DeviceError>;
    async fn get_device_date(&self) -> Result<String, DeviceError>;

    async fn tap(&self, selector: &SelectorRequest) -> ActionOutcome;
    async fn long_press(&self, selector: &SelectorRequest) -> ActionOutcome;
    async fn swipe(&self, request: &SwipeRequest) -> ActionOutcome;
    async fn input_text(&self, text: &str) -> ActionOutcome;
    async fn copy_text(&self, selector: &SelectorRequest) -> ActionOutcome;
    async fn paste_text(&self) -> ActionOutcome;
    async fn erase_chars(&self, count: u32) -> ActionOutcome;
    async fn launch_app(&self, package_name: &str) -> ActionOutcome;
    async fn stop_app(&self, package_name: Option<&str>) -> ActionOutcome;
    async fn open_link(&self, url: &str) -> ActionOutcome;
    async fn back(&self) -> ActionOutcome;
    async fn press_key(&self, key: Key) -> ActionOutcome;
    async fn wait_for_animation(&self, timeout_secs: f64) -> ActionOutcome;
    async fn take_screenshot(&self) -> ActionOutcome;
}
