//! Oracle boundary - the external language model.
//!
//! `invoke(prompt) -> reply text`, blocking and fallible. Replies are not
//! deterministic even at temperature 0, so callers must not assume two calls
//! with the same prompt agree.
//!
//! Supports an OpenAI-compatible chat completions backend and Ollama's
//! generate API, plus a scripted fake for tests and offline runs.

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Sampling parameters sent with every call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleParams {
    pub model: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
}

impl Default for OracleParams {
    fn default() -> Self {
        Self {
            model: "gpt-4.1".to_string(),
            temperature: 0.0,
            max_output_tokens: 2048,
        }
    }
}

/// Oracle errors. All of them are retryable from the orchestrator's view.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OracleError {
    #[error("API key not set (expected in ${0})")]
    MissingApiKey(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("HTTP {status} from {backend}: {body}")]
    Status {
        backend: &'static str,
        status: u16,
        body: String,
    },

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Unreadable response: {0}")]
    InvalidResponse(String),

    #[error("Oracle returned empty response")]
    EmptyResponse,
}

/// Anything that turns a prompt into reply text.
pub trait Oracle: Send + Sync {
    fn invoke(&self, prompt: &str, params: &OracleParams) -> Result<String, OracleError>;
}

/// Wire protocol spoken by the HTTP oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OracleBackend {
    #[default]
    OpenAi,
    Ollama,
}

impl OracleBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            OracleBackend::OpenAi => "openai",
            OracleBackend::Ollama => "ollama",
        }
    }
}

/// Blocking HTTP oracle.
pub struct HttpOracle {
    backend: OracleBackend,
    endpoint: String,
    api_key: Option<String>,
    api_key_env: String,
    timeout_secs: u64,
    client: reqwest::blocking::Client,
}

impl HttpOracle {
    pub fn new(
        backend: OracleBackend,
        endpoint: &str,
        api_key: Option<String>,
        api_key_env: &str,
        timeout_secs: u64,
    ) -> Result<Self, OracleError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| OracleError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            backend,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            api_key_env: api_key_env.to_string(),
            timeout_secs,
            client,
        })
    }

    /// Configured key, else the environment variable, read at call time.
    fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.is_empty())
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<serde_json::Value, OracleError> {
        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                OracleError::Timeout(self.timeout_secs)
            } else {
                OracleError::Http(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(OracleError::Status {
                backend: self.backend.as_str(),
                status: status.as_u16(),
                body: truncate(&body, 300),
            });
        }

        response
            .json()
            .map_err(|e| OracleError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    fn call_openai_compatible(&self, prompt: &str, params: &OracleParams) -> Result<String, OracleError> {
        let api_key = self
            .api_key()
            .ok_or_else(|| OracleError::MissingApiKey(self.api_key_env.clone()))?;
        let url = format!("{}/v1/chat/completions", self.endpoint);

        let body = serde_json::json!({
            "model": params.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": params.temperature,
            "max_tokens": params.max_output_tokens,
        });

        let response_json = self.send(self.client.post(&url).bearer_auth(api_key).json(&body))?;

        response_json
            .get("choices")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("message"))
            .and_then(|v| v.get("content"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or(OracleError::EmptyResponse)
    }

    fn call_ollama(&self, prompt: &str, params: &OracleParams) -> Result<String, OracleError> {
        let url = format!("{}/api/generate", self.endpoint);

        let body = serde_json::json!({
            "model": params.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": params.temperature,
                "num_predict": params.max_output_tokens,
            },
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(api_key) = self.api_key() {
            request = request.bearer_auth(api_key);
        }
        let response_json = self.send(request)?;

        response_json
            .get("response")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or(OracleError::EmptyResponse)
    }
}

impl Oracle for HttpOracle {
    fn invoke(&self, prompt: &str, params: &OracleParams) -> Result<String, OracleError> {
        debug!(
            "Invoking {} oracle model={} ({} prompt chars)",
            self.backend.as_str(),
            params.model,
            prompt.len()
        );
        let text = match self.backend {
            OracleBackend::OpenAi => self.call_openai_compatible(prompt, params)?,
            OracleBackend::Ollama => self.call_ollama(prompt, params)?,
        };
        if text.trim().is_empty() {
            return Err(OracleError::EmptyResponse);
        }
        Ok(text)
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Fake oracle for testing
///
/// Replies are handed out in order; the last one repeats forever.
pub struct FakeOracle {
    replies: Mutex<Vec<Result<String, OracleError>>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeOracle {
    /// Create a fake oracle with pre-defined replies
    pub fn new(replies: Vec<Result<String, OracleError>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Create a fake oracle that always returns the same text
    pub fn always(reply: impl Into<String>) -> Self {
        Self::new(vec![Ok(reply.into())])
    }

    /// Create a fake oracle that always fails
    pub fn always_error(error: OracleError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Get the number of calls made
    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Oracle for FakeOracle {
    fn invoke(&self, prompt: &str, _params: &OracleParams) -> Result<String, OracleError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let mut replies = self
            .replies
            .lock()
            .map_err(|_| OracleError::Http("fake oracle poisoned".to_string()))?;
        match replies.len() {
            0 => Err(OracleError::EmptyResponse),
            1 => replies[0].clone(),
            _ => replies.remove(0),
        }
    }
}
