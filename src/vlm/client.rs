//! HTTP client for OpenAI-compatible chat-completions endpoints.

use base64::Engine;
use std::time::Duration;
use tracing::debug;

use super::{InferenceService, VlmError, VlmResult};
use crate::config::VlmSettings;

/// Blocking chat-completions client.
///
/// Must be constructed and dropped outside of an async context.
#[derive(Debug)]
pub struct VlmClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    timeout: Duration,
}

impl VlmClient {
    pub fn new(settings: &VlmSettings) -> VlmResult<Self> {
        let timeout = Duration::from_secs(settings.timeout);
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(settings.timeout.min(10)))
            .build()
            .map_err(|e| VlmError::ConnectionFailed(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            max_tokens: settings.max_tokens,
            timeout,
        })
    }

    fn request_body(&self, image: Option<&[u8]>, prompt: &str, temperature: f32) -> serde_json::Value {
        let mut content = Vec::with_capacity(2);
        if let Some(png) = image {
            let img_base64 = base64::engine::general_purpose::STANDARD.encode(png);
            content.push(serde_json::json!({
                "type": "image_url",
                "image_url": { "url": format!("data:image/png;base64,{}", img_base64) }
            }));
        }
        content.push(serde_json::json!({ "type": "text", "text": prompt }));

        serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": content }],
            "max_tokens": self.max_tokens,
            "temperature": temperature,
            "stream": false
        })
    }
}

/// Pull the reply text out of a chat-completions response body
fn extract_content(response: &serde_json::Value) -> VlmResult<String> {
    let choice = response
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| VlmError::InvalidResponse("missing choices".to_string()))?;

    if choice["finish_reason"].as_str() == Some("content_filter") {
        return Err(VlmError::Blocked("content_filter".to_string()));
    }

    let message = &choice["message"];
    let text = match &message["content"] {
        serde_json::Value::String(s) => s.clone(),
        // Some providers return content as a list of typed parts
        serde_json::Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    };

    let text = text.trim();
    if text.is_empty() {
        if let Some(refusal) = message["refusal"].as_str() {
            return Err(VlmError::Blocked(refusal.to_string()));
        }
        return Err(VlmError::EmptyResponse);
    }
    Ok(text.to_string())
}

impl InferenceService for VlmClient {
    fn infer(&self, image: Option<&[u8]>, prompt: &str, temperature: f32) -> VlmResult<String> {
        let body = self.request_body(image, prompt, temperature);
        debug!(endpoint = %self.endpoint, with_image = image.is_some(), temperature, "inference request");

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                VlmError::Timeout(self.timeout)
            } else {
                VlmError::ConnectionFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(VlmError::Http {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let json: serde_json::Value = response
            .json()
            .map_err(|e| VlmError::InvalidResponse(e.to_string()))?;
        extract_content(&json)
    }
}

/// Check whether an inference endpoint accepts connections.
///
/// Any HTTP answer (even 4xx/5xx) counts as reachable; only connection
/// failures report `false`.
pub fn check_health(endpoint: &str, timeout_secs: u64) -> bool {
    let client = match reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
    {
        Ok(client) => client,
        Err(_) => return false,
    };
    client.head(endpoint).send().is_ok()
}
