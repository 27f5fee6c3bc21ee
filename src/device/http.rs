//! HTTP implementation of the device backend, speaking to the automation
//! server that owns the actual device session.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{ActionOutcome, DeviceBackend, DeviceError, Key, ScreenData, SelectorRequest,
    SwipeRequest};

/// Default base URL of the device automation server.
pub const DEFAULT_DEVICE_BASE_URL: &str = "http://localhost:9998";

#[derive(Debug, Deserialize)]
struct ScreenInfo {
    #[serde(default)]
    elements: Value,
    width: u32,
    height: u32,
}

/// Device backend over the automation server's HTTP surface.
///
/// Perception getters surface transport errors as [`DeviceError`]; action
/// primitives fold every failure into the returned description so the loop
/// can keep going.
pub struct HttpDeviceBackend {
    base_url: String,
    client: Client,
}

impl HttpDeviceBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// POST an action and normalize the outcome: 2xx with empty body means
    /// success, anything else becomes the failure description.
    async fn post_action(&self, path: &str, body: Value) -> ActionOutcome {
        let result = self.client.post(self.url(path)).json(&body).send().await;
        match result {
            Ok(response) if response.status().is_success() => {
                let text = response.text().await.unwrap_or_default();
                if text.trim().is_empty() || text.trim() == "null" {
                    None
                } else {
                    Some(text)
                }
            }
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                Some(format!("{status}: {text}"))
            }
            Err(e) => Some(format!("device request failed: {e}")),
        }
    }
}

#[async_trait]
impl DeviceBackend for HttpDeviceBackend {
    async fn get_screen_data(&self) -> Result<ScreenData, DeviceError> {
        let info: ScreenInfo = self
            .client
            .get(self.url("screen-info"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let png = self
            .client
            .get(self.url("screenshot"))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        if png.is_empty() {
            return Err(DeviceError::Malformed("empty screenshot payload".into()));
        }

        Ok(ScreenData {
            base64: STANDARD.encode(&png),
            elements: info.elements,
            width: info.width,
            height: info.height,
        })
    }

    async fn get_focused_app(&self) -> Result<Option<String>, DeviceError> {
        let response = self
            .client
            .get(self.url("focused-app"))
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "null" {
            Ok(None)
        } else {
            Ok(Some(trimmed.to_string()))
        }
    }

    async fn get_device_date(&self) -> Result<String, DeviceError> {
        let response = self
            .client
            .get(self.url("device-date"))
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;
        Ok(text.trim().to_string())
    }

    async fn tap(&self, selector: &SelectorRequest) -> ActionOutcome {
        self.post_action("tap", json!({"selector": selector})).await
    }

    async fn long_press(&self, selector: &SelectorRequest) -> ActionOutcome {
        self.post_action("long-press", json!({"selector": selector}))
            .await
    }

    async fn swipe(&self, request: &SwipeRequest) -> ActionOutcome {
        self.post_action("swipe", json!(request)).await
    }

    async fn input_text(&self, text: &str) -> ActionOutcome {
        self.post_action("input-text", json!({"text": text})).await
    }

    async fn copy_text(&self, selector: &SelectorRequest) -> ActionOutcome {
        self.post_action("copy-text", json!({"selector": selector}))
            .await
    }

    async fn paste_text(&self) -> ActionOutcome {
        self.post_action("paste-text", json!({})).await
    }

    async fn erase_chars(&self, count: u32) -> ActionOutcome {
        self.post_action("erase-chars", json!({"count": count})).await
    }

    async fn launch_app(&self, package_name: &str) -> ActionOutcome {
        self.post_action("launch-app", json!({"package_name": package_name}))
            .await
    }

    async fn stop_app(&self, package_name: Option<&str>) -> ActionOutcome {
        self.post_action("stop-app", json!({"package_name": package_name}))
            .await
    }

    async fn open_link(&self, url: &str) -> ActionOutcome {
        self.post_action("open-link", json!({"url": url})).await
    }

    async fn back(&self) -> ActionOutcome {
        self.post_action("back", json!({})).await
    }

    async fn press_key(&self, key: Key) -> ActionOutcome {
        self.post_action("press-key", json!({"key": key.as_str()}))
            .await
    }

    async fn wait_for_animation(&self, timeout_secs: f64) -> ActionOutcome {
        self.post_action("wait-for-animation", json!({"timeout": timeout_secs}))
            .await
    }

    async fn take_screenshot(&self) -> ActionOutcome {
        self.post_action("screenshot", json!({})).await
    }
}
