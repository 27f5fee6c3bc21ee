//! Test doubles: a scripted inference backend and a recording device
//! backend, shared by the node and loop tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent::AgentContext;
use crate::config::{AgentRole, ToolCalling};
use crate::device::{ActionOutcome, DeviceBackend, DeviceError, Key, ScreenData, SelectorRequest,
    SwipeRequest};
use crate::model::{ChatOptions, ChatResponse, Inference, InferenceGateway, ModelError,
    RoleBinding};

/// Shared call counter handle.
#[derive(Clone)]
pub struct CallCount(Arc<AtomicUsize>);

impl CallCount {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// An [`Inference`] double that replays queued responses, or always fails.
pub struct ScriptedInference {
    replies: Mutex<VecDeque<ChatResponse>>,
    always_fail: bool,
    calls: Arc<AtomicUsize>,
}

impl ScriptedInference {
    /// Queue plain text replies, consumed in order.
    pub fn with_replies(replies: Vec<&str>) -> Self {
        Self::with_responses(
            replies
                .into_iter()
                .map(|content| ChatResponse {
                    content: content.to_string(),
                    tool_calls: vec![],
                })
                .collect(),
        )
    }

    /// Queue full responses (for native tool-call scripts).
    pub fn with_responses(responses: Vec<ChatResponse>) -> Self {
        Self {
            replies: Mutex::new(responses.into()),
            always_fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A backend whose every call raises an API error.
    pub fn always_failing() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            always_fail: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> CallCount {
        CallCount(self.calls.clone())
    }
}

#[async_trait]
impl Inference for ScriptedInference {
    async fn chat(
        &self,
        _messages: &[Value],
        _options: &ChatOptions,
    ) -> Result<ChatResponse, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.always_fail {
            return Err(ModelError::ApiError("scripted failure".to_string()));
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::ApiError("script exhausted".to_string()))
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// A [`DeviceBackend`] double that serves canned perception data and records
/// every action call.
pub struct RecordingBackend {
    calls: Mutex<Vec<String>>,
    failing: HashSet<String>,
    pub screen: ScreenData,
    pub focused_app: Option<String>,
    pub device_date: String,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: HashSet::new(),
            screen: ScreenData {
                base64: "c2NyZWVuc2hvdA==".to_string(),
                elements: json!([{"id": "home", "text": "Home screen"}]),
                width: 1080,
                height: 2400,
            },
            focused_app: Some("com.android.launcher".to_string()),
            device_date: "2025-06-01T10:00:00".to_string(),
        }
    }

    /// Make the named action report a failure.
    pub fn failing_on(mut self, tool: &str) -> Self {
        self.failing.insert(tool.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, tool: &str, detail: String) -> ActionOutcome {
        self.calls.lock().unwrap().push(format!("{tool}({detail})"));
        if self.failing.contains(tool) {
            Some("injected failure".to_string())
        } else {
            None
        }
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceBackend for RecordingBackend {
    async fn get_screen_data(&self) -> Result<ScreenData, DeviceError> {
        Ok(self.screen.clone())
    }

    async fn get_focused_app(&self) -> Result<Option<String>, DeviceError> {
        Ok(self.focused_app.clone())
    }

    async fn get_device_date(&self) -> Result<String, DeviceError> {
        Ok(self.device_date.clone())
    }

    async fn tap(&self, selector: &SelectorRequest) -> ActionOutcome {
        self.record("tap", selector.to_string())
    }

    async fn long_press(&self, selector: &SelectorRequest) -> ActionOutcome {
        self.record("long_press", selector.to_string())
    }

    async fn swipe(&self, request: &SwipeRequest) -> ActionOutcome {
        self.record(
            "swipe",
            request.direction.clone().unwrap_or_else(|| "custom".into()),
        )
    }

    async fn input_text(&self, text: &str) -> ActionOutcome {
        self.record("input_text", format!("{text:?}"))
    }

    async fn copy_text(&self, selector: &SelectorRequest) -> ActionOutcome {
        self.record("copy_text", selector.to_string())
    }

    async fn paste_text(&self) -> ActionOutcome {
        self.record("paste_text", String::new())
    }

    async fn erase_chars(&self, count: u32) -> ActionOutcome {
        self.record("erase_chars", count.to_string())
    }

    async fn launch_app(&self, package_name: &str) -> ActionOutcome {
        self.record("launch_app", package_name.to_string())
    }

    async fn stop_app(&self, package_name: Option<&str>) -> ActionOutcome {
        self.record("stop_app", package_name.unwrap_or("current").to_string())
    }

    async fn open_link(&self, url: &str) -> ActionOutcome {
        self.record("open_link", url.to_string())
    }

    async fn back(&self) -> ActionOutcome {
        self.record("back", String::new())
    }

    async fn press_key(&self, key: Key) -> ActionOutcome {
        self.record("press_key", key.as_str().to_string())
    }

    async fn wait_for_animation(&self, timeout_secs: f64) -> ActionOutcome {
        self.record("wait_for_animation", timeout_secs.to_string())
    }

    async fn take_screenshot(&self) -> ActionOutcome {
        self.record("screenshot", String::new())
    }
}

/// Build a role binding around scripted primaries for gateway construction.
pub fn scripted_binding(
    primary: ScriptedInference,
    fallback: Option<ScriptedInference>,
    tool_calling: ToolCalling,
) -> RoleBinding {
    RoleBinding {
        primary: Arc::new(primary),
        fallback: fallback.map(|f| Arc::new(f) as Arc<dyn Inference>),
        tool_calling,
        temperature: 1.0,
    }
}

/// An [`AgentContext`] with one scripted role and a fresh recording backend.
pub fn scripted_context(
    role: AgentRole,
    inference: ScriptedInference,
    tool_calling: ToolCalling,
) -> AgentContext {
    let gateway =
        InferenceGateway::with_bindings([(role, scripted_binding(inference, None, tool_calling))]);
    AgentContext::new(gateway, Arc::new(RecordingBackend::new()))
}

/// An [`AgentContext`] over explicit bindings and a shared backend.
pub fn context_with(
    bindings: Vec<(AgentRole, RoleBinding)>,
    device: Arc<dyn DeviceBackend>,
) -> AgentContext {
    AgentContext::new(InferenceGateway::with_bindings(bindings), device)
}
