//! Device tool catalog: definitions handed to the executor model, the
//! UI-mutating subset the contextor watches for, and the dispatcher that
//! turns a model tool call into a backend invocation.

use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::str::FromStr;

use crate::model::{ToolCallRequest, ToolDefinition};

use super::{DeviceBackend, Key, SelectorRequest, SwipeRequest};

/// Tool name that requests a fresh screen capture.
pub const SCREENSHOT_TOOL: &str = "screenshot";

/// Tools whose execution mutates the UI; after one of these ran last, the
/// contextor keeps the next screenshot in the prompt.
pub static UI_MUTATING_TOOLS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from(["tap", "swipe", "press_key", "input_text", "erase_chars"])
});

fn selector_schema() -> Value {
    json!({
        "type": "object",
        "description": "Element selector: text, id, id+text, coordinates [x, y], or percentages [x, y]",
        "properties": {
            "text": {"type": "string"},
            "id": {"type": "string"},
            "coordinates": {"type": "array", "items": {"type": "integer"}},
            "percentages": {"type": "array", "items": {"type": "number"}}
        }
    })
}

/// All device action tools, in the form the executor binds to its model call.
pub static DEVICE_TOOLS: Lazy<Vec<ToolDefinition>> = Lazy::new(|| {
    vec![
        ToolDefinition {
            name: "tap".into(),
            description: "Tap on a UI element".into(),
            parameters: json!({
                "type": "object",
                "properties": {"selector_request": selector_schema()},
                "required": ["selector_request"]
            }),
        },
        ToolDefinition {
            name: "long_press".into(),
            description: "Long press on a UI element".into(),
            parameters: json!({
                "type": "object",
                "properties": {"selector_request": selector_schema()},
                "required": ["selector_request"]
            }),
        },
        ToolDefinition {
            name: "swipe".into(),
            description: "Swipe gesture, directional or between coordinates".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "swipe_request": {
                        "type": "object",
                        "properties": {
                            "direction": {"type": "string", "enum": ["up", "down", "left", "right"]},
                            "start_coordinate": {"type": "array", "items": {"type": "integer"}},
                            "end_coordinate": {"type": "array", "items": {"type": "integer"}}
                        }
                    }
                },
                "required": ["swipe_request"]
            }),
        },
        ToolDefinition {
            name: "input_text".into(),
            description: "Type text into the focused input field".into(),
            parameters: json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }),
        },
        ToolDefinition {
            name: "copy_text".into(),
            description: "Copy text from a UI element".into(),
            parameters: json!({
                "type": "object",
                "properties": {"selector_request": selector_schema()},
                "required": ["selector_request"]
            }),
        },
        ToolDefinition {
            name: "paste_text".into(),
            description: "Paste previously copied text".into(),
            parameters: json!({"type": "object", "properties": {}}),
        },
        ToolDefinition {
            name: "erase_chars".into(),
            description: "Delete characters from the focused input field".into(),
            parameters: json!({
                "type": "object",
                "properties": {"nb_chars": {"type": "integer", "minimum": 1}}
            }),
        },
        ToolDefinition {
            name: "launch_app".into(),
            description: "Launch an app by package name".into(),
            parameters: json!({
                "type": "object",
                "properties": {"package_name": {"type": "string"}},
                "required": ["package_name"]
            }),
        },
        ToolDefinition {
            name: "stop_app".into(),
            description: "Stop an app (current app when no package is given)".into(),
            parameters: json!({
                "type": "object",
                "properties": {"package_name": {"type": "string"}}
            }),
        },
        ToolDefinition {
            name: "open_link".into(),
            description: "Open a URL".into(),
            parameters: json!({
                "type": "object",
                "properties": {"url": {"type": "string"}},
                "required": ["url"]
            }),
        },
        ToolDefinition {
            name: "back".into(),
            description: "Press the back button".into(),
            parameters: json!({"type": "object", "properties": {}}),
        },
        ToolDefinition {
            name: "press_key".into(),
            description: "Press a hardware key (HOME, BACK, MENU, POWER, ENTER, VOLUME_UP, VOLUME_DOWN)".into(),
            parameters: json!({
                "type": "object",
                "properties": {"key": {"type": "string"}},
                "required": ["key"]
            }),
        },
        ToolDefinition {
            name: "wait_for_animation".into(),
            description: "Wait for screen animations to settle".into(),
            parameters: json!({
                "type": "object",
                "properties": {"timeout": {"type": "number"}}
            }),
        },
        ToolDefinition {
            name: SCREENSHOT_TOOL.into(),
            description: "Request a fresh screenshot for the next decision".into(),
            parameters: json!({"type": "object", "properties": {}}),
        },
    ]
});

/// Render the tool catalog for a system prompt.
pub fn format_tools_list() -> String {
    DEVICE_TOOLS
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result of dispatching one tool call.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub tool_name: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    fn ok(tool_name: &str, content: String) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            content,
            is_error: false,
        }
    }

    fn err(tool_name: &str, content: String) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            content,
            is_error: true,
        }
    }
}

fn selector_from(params: &Value) -> Result<SelectorRequest, String> {
    let raw = params.get("selector_request").unwrap_or(params);
    SelectorRequest::from_value(raw).map_err(|e| e.to_string())
}

/// Dispatch one model-requested tool call to the device backend and turn the
/// outcome into a tool-result message body. An unrecognized tool name is a
/// reported no-op failure, never a fatal error.
pub async fn dispatch_tool_call(
    backend: &dyn DeviceBackend,
    call: &ToolCallRequest,
) -> ToolOutcome {
    let name = call.name.as_str();
    let params = &call.parameters;

    tracing::debug!(tool = name, "dispatching device tool call");

    let result = match name {
        "tap" => match selector_from(params) {
            Ok(selector) => match backend.tap(&selector).await {
                None => ToolOutcome::ok(name, format!("Tapped element with {selector}")),
                Some(e) => ToolOutcome::err(name, format!("Failed to tap: {e}")),
            },
            Err(e) => ToolOutcome::err(name, e),
        },
        "long_press" => match selector_from(params) {
            Ok(selector) => match backend.long_press(&selector).await {
                None => ToolOutcome::ok(name, format!("Long pressed element with {selector}")),
                Some(e) => ToolOutcome::err(name, format!("Failed to long press: {e}")),
            },
            Err(e) => ToolOutcome::err(name, e),
        },
        "swipe" => {
            let request: SwipeRequest = params
                .get("swipe_request")
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .unwrap_or_default()
                .unwrap_or_default();
            match backend.swipe(&request).await {
                None => ToolOutcome::ok(name, "Swiped".to_string()),
                Some(e) => ToolOutcome::err(name, format!("Failed to swipe: {e}")),
            }
        }
        "input_text" => {
            let text = params.get("text").and_then(Value::as_str).unwrap_or("");
            match backend.input_text(text).await {
                None => ToolOutcome::ok(name, format!("Typed {text:?}")),
                Some(e) => ToolOutcome::err(name, format!("Failed to input text {text:?}: {e}")),
            }
        }
        "copy_text" => match selector_from(params) {
            Ok(selector) => match backend.copy_text(&selector).await {
                None => ToolOutcome::ok(name, format!("Copied text from element with {selector}")),
                Some(e) => ToolOutcome::err(name, format!("Failed to copy text: {e}")),
            },
            Err(e) => ToolOutcome::err(name, e),
        },
        "paste_text" => match backend.paste_text().await {
            None => ToolOutcome::ok(name, "Pasted text".to_string()),
            Some(e) => ToolOutcome::err(name, format!("Failed to paste text: {e}")),
        },
        "erase_chars" => {
            let count = params
                .get("nb_chars")
                .and_then(Value::as_u64)
                .unwrap_or(1) as u32;
            match backend.erase_chars(count).await {
                None => ToolOutcome::ok(name, format!("Erased {count} character(s)")),
                Some(e) => ToolOutcome::err(name, format!("Failed to erase characters: {e}")),
            }
        }
        "launch_app" => {
            let package = params
                .get("package_name")
                .and_then(Value::as_str)
                .unwrap_or("");
            match backend.launch_app(package).await {
                None => ToolOutcome::ok(name, format!("Launched app: {package}")),
                Some(e) => ToolOutcome::err(name, format!("Failed to launch app {package}: {e}")),
            }
        }
        "stop_app" => {
            let package = params.get("package_name").and_then(Value::as_str);
            match backend.stop_app(package).await {
                None => ToolOutcome::ok(
                    name,
                    format!("Stopped app: {}", package.unwrap_or("current")),
                ),
                Some(e) => ToolOutcome::err(name, format!("Failed to stop app: {e}")),
            }
        }
        "open_link" => {
            let url = params.get("url").and_then(Value::as_str).unwrap_or("");
            match backend.open_link(url).await {
                None => ToolOutcome::ok(name, format!("Opened link: {url}")),
                Some(e) => ToolOutcome::err(name, format!("Failed to open link {url}: {e}")),
            }
        }
        "back" => match backend.back().await {
            None => ToolOutcome::ok(name, "Pressed back".to_string()),
            Some(e) => ToolOutcome::err(name, format!("Failed to press back: {e}")),
        },
        "press_key" => {
            let key_name = params.get("key").and_then(Value::as_str).unwrap_or("");
            match Key::from_str(key_name) {
                Ok(key) => match backend.press_key(key).await {
                    None => ToolOutcome::ok(name, format!("Pressed key: {}", key.as_str())),
                    Some(e) => ToolOutcome::err(name, format!("Failed to press key: {e}")),
                },
                Err(e) => ToolOutcome::err(name, e.to_string()),
            }
        }
        "wait_for_animation" => {
            let timeout = params
                .get("timeout")
                .and_then(Value::as_f64)
                .unwrap_or(10.0);
            match backend.wait_for_animation(timeout).await {
                None => ToolOutcome::ok(name, format!("Waited for animations (timeout {timeout}s)")),
                Some(e) => ToolOutcome::err(name, format!("Wait for animation failed: {e}")),
            }
        }
        SCREENSHOT_TOOL => match backend.take_screenshot().await {
            None => ToolOutcome::ok(name, "Screenshot requested".to_string()),
            Some(e) => ToolOutcome::err(name, format!("Failed to take screenshot: {e}")),
        },
        unknown => ToolOutcome::err(
            unknown,
            format!("Unknown tool {unknown:?}; no action taken"),
        ),
    };

    if result.is_error {
        tracing::warn!(tool = name, "tool call failed: {}", result.content);
    }
    result
}
