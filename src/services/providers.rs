// AI Provider Service
// OpenAI-compatible chat completions and Gemini generateContent calls

use crate::models::{ClauseCategory, ProviderErrorKind};
use crate::services::config_store::{AppConfig, ProviderConfig, ProxyConfig};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

pub const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const GEMINI_DEFAULT_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Body excerpt kept in error messages.
const ERROR_BODY_CHARS: usize = 300;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Request timed out")]
    Timeout,
    #[error("Quota exceeded: {message}")]
    QuotaExceeded { message: String },
    #[error("Authentication failed: {message}")]
    Auth { message: String },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Provider unavailable ({status:?}): {message}")]
    Unavailable { status: Option<u16>, message: String },
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            Self::Timeout => ProviderErrorKind::Timeout,
            Self::QuotaExceeded { .. } => ProviderErrorKind::QuotaExceeded,
            Self::Auth { .. } => ProviderErrorKind::Auth,
            Self::MalformedResponse(_) => ProviderErrorKind::MalformedResponse,
            Self::Unavailable { .. } => ProviderErrorKind::Unavailable,
        }
    }

    /// Map a non-success HTTP status onto the provider error taxonomy.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message: String = body.chars().take(ERROR_BODY_CHARS).collect();
        match status.as_u16() {
            401 | 403 => Self::Auth { message },
            429 => Self::QuotaExceeded { message },
            408 | 504 => Self::Timeout,
            code => Self::Unavailable {
                status: Some(code),
                message,
            },
        }
    }

    pub fn missing_key(provider: &str) -> Self {
        Self::Auth {
            message: format!("API key not configured for {}", provider),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else {
            Self::Unavailable {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub name: String,
    pub model: String,
}

/// Parse `name:model`; a bare name leaves the model empty.
pub fn parse_provider(spec: &str) -> ProviderSpec {
    let parts: Vec<&str> = spec.splitn(2, ':').collect();
    if parts.len() == 2 {
        ProviderSpec {
            name: parts[0].to_string(),
            model: parts[1].to_string(),
        }
    } else {
        ProviderSpec {
            name: spec.to_string(),
            model: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: i32,
    temperature: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageResponse>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResult {
    pub content: String,
    pub latency_ms: i64,
}

/// A resolved provider: which API, which model, where, with which key.
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    pub name: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl ProviderEndpoint {
    /// Resolve model defaults and the API key (env first, then config).
    pub fn resolve(provider: &ProviderConfig, config: &AppConfig) -> Self {
        let spec = parse_provider(provider.provider.trim());
        let name = spec.name.trim().to_lowercase();
        let model = provider
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| Some(spec.model).filter(|m| !m.trim().is_empty()))
            .unwrap_or_else(|| default_model(&name).to_string());
        Self {
            api_key: resolve_api_key(&name, config),
            base_url: provider.base_url.clone(),
            model,
            name,
        }
    }
}

pub fn default_model(provider: &str) -> &'static str {
    match provider {
        "gemini" | "google" => GEMINI_DEFAULT_MODEL,
        _ => OPENAI_DEFAULT_MODEL,
    }
}

pub struct ProviderClient {
    client: Client,
    openai_url: String,
    gemini_url: String,
}

impl Default for ProviderClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl ProviderClient {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self::with_client(client)
    }

    pub fn with_proxy(proxy_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let proxy = reqwest::Proxy::all(proxy_url)?;
        let client = Client::builder().timeout(timeout).proxy(proxy).build()?;
        Ok(Self::with_client(client))
    }

    /// Client honoring the optional proxy section of the config.
    pub fn from_proxy_config(proxy: Option<&ProxyConfig>, timeout: Duration) -> Result<Self, ProviderError> {
        match proxy.filter(|p| p.enabled) {
            Some(p) => match p.https.as_deref().or(p.http.as_deref()) {
                Some(url) => Self::with_proxy(url, timeout),
                None => Ok(Self::new(timeout)),
            },
            None => Ok(Self::new(timeout)),
        }
    }

    fn with_client(client: Client) -> Self {
        let openai_url = env::var("OPENAI_API_URL").unwrap_or_else(|_| OPENAI_DEFAULT_URL.to_string());
        let gemini_url = env::var("GEMINI_API_URL").unwrap_or_else(|_| GEMINI_DEFAULT_URL.to_string());
        Self {
            client,
            openai_url,
            gemini_url,
        }
    }

    /// Dispatch a system/user prompt pair to the endpoint's API.
    pub async fn complete(
        &self,
        endpoint: &ProviderEndpoint,
        system: &str,
        user: &str,
        max_tokens: i32,
    ) -> Result<ChatResult, ProviderError> {
        let api_key = endpoint
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::missing_key(&endpoint.name))?;

        match endpoint.name.as_str() {
            "gemini" | "google" => {
                let url = endpoint.base_url.as_deref().unwrap_or(&self.gemini_url);
                self.call_gemini_api(url, &endpoint.model, api_key, system, user, max_tokens)
                    .await
            }
            _ => {
                let url = endpoint.base_url.as_deref().unwrap_or(&self.openai_url);
                self.call_chat_api(url, &endpoint.model, api_key, system, user, max_tokens)
                    .await
            }
        }
    }

    async fn call_chat_api(
        &self,
        url: &str,
        model: &str,
        api_key: &str,
        system: &str,
        user: &str,
        max_tokens: i32,
    ) -> Result<ChatResult, ProviderError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens,
            temperature: 0.2,
        };

        let start = Instant::now();

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis() as i64;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let content = data
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::MalformedResponse("missing message content".to_string()))?;

        Ok(ChatResult { content, latency_ms })
    }

    async fn call_gemini_api(
        &self,
        base_url: &str,
        model: &str,
        api_key: &str,
        system: &str,
        user: &str,
        max_tokens: i32,
    ) -> Result<ChatResult, ProviderError> {
        let url = format!("{}/{}:generateContent", base_url.trim_end_matches('/'), model);
        let request = serde_json::json!({
            "systemInstruction": { "parts": [{ "text": system }] },
            "contents": [{ "role": "user", "parts": [{ "text": user }] }],
            "generationConfig": { "temperature": 0.1, "maxOutputTokens": max_tokens }
        });

        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis() as i64;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        // {"candidates": [{"content": {"parts": [{"text": "..."}]}}]}
        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let content = data["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::MalformedResponse("missing candidate text".to_string()))?;

        Ok(ChatResult { content, latency_ms })
    }
}

// ============ Backends ============

/// External plain-language rewriting service.
#[async_trait]
pub trait SimplificationBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn simplify(&self, text: &str, category: ClauseCategory) -> Result<String, ProviderError>;
}

/// External translation service.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// `language` is a validated code from the supported-language table.
    async fn translate(&self, text: &str, language: &str) -> Result<String, ProviderError>;
}

const SIMPLIFY_SYSTEM_PROMPT: &str = "You are a legal expert who explains complex legal language in the simplest terms possible. \
Use only simple, everyday words. Keep it as short as possible while keeping the meaning. \
Explain what the person must do or what happens to them, and use \"you\" instead of \"the party\". \
Provide only the simplified version, nothing else.";

const TRANSLATE_SYSTEM_PROMPT: &str = "You are a professional legal translator. Maintain legal accuracy and meaning, \
keep the translation clear and understandable for common people, and return only the translated text.";

/// Strip wrapper text models like to add around the answer.
pub fn clean_model_output(raw: &str) -> String {
    let mut s = raw.trim();
    for prefix in ["Simplified version:", "Simplified:", "Translation:"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.trim_start();
        }
    }
    let s = s.trim_matches(|c| c == '"' || c == '\'' || c == '`');
    s.trim().to_string()
}

pub struct RemoteSimplifier {
    client: Arc<ProviderClient>,
    endpoint: ProviderEndpoint,
}

impl RemoteSimplifier {
    pub fn new(client: Arc<ProviderClient>, endpoint: ProviderEndpoint) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl SimplificationBackend for RemoteSimplifier {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn simplify(&self, text: &str, category: ClauseCategory) -> Result<String, ProviderError> {
        let user = format!(
            "Simplify this {} legal clause into plain language anyone can understand.\n\nLegal clause:\n{}",
            category, text
        );
        let result = self
            .client
            .complete(&self.endpoint, SIMPLIFY_SYSTEM_PROMPT, &user, 512)
            .await?;
        debug!(
            "[providers] {} simplify latency={}ms",
            self.endpoint.name, result.latency_ms
        );
        let cleaned = clean_model_output(&result.content);
        if cleaned.is_empty() {
            return Err(ProviderError::MalformedResponse("empty simplification".to_string()));
        }
        Ok(cleaned)
    }
}

pub struct RemoteTranslator {
    client: Arc<ProviderClient>,
    endpoint: ProviderEndpoint,
}

impl RemoteTranslator {
    pub fn new(client: Arc<ProviderClient>, endpoint: ProviderEndpoint) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl TranslationBackend for RemoteTranslator {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn translate(&self, text: &str, language: &str) -> Result<String, ProviderError> {
        let target = crate::services::translation::find_language(language)
            .map(|l| format!("{} ({})", l.name, l.native_name))
            .unwrap_or_else(|| language.to_string());
        let user = format!(
            "Translate the following English legal text to {}.\n\nText:\n{}",
            target, text
        );
        let result = self
            .client
            .complete(&self.endpoint, TRANSLATE_SYSTEM_PROMPT, &user, 2048)
            .await?;
        debug!(
            "[providers] {} translate lang={} latency={}ms",
            self.endpoint.name, language, result.latency_ms
        );
        let cleaned = clean_model_output(&result.content);
        if cleaned.is_empty() {
            return Err(ProviderError::MalformedResponse("empty translation".to_string()));
        }
        Ok(cleaned)
    }
}

// ============ API keys ============

fn env_key_names(provider: &str) -> &'static [&'static str] {
    match provider {
        "openai" => &["OPENAI_API_KEY", "SIGNSAFE_OPENAI_API_KEY"],
        "gemini" | "google" => &["GEMINI_API_KEY", "GOOGLE_API_KEY", "SIGNSAFE_GEMINI_API_KEY"],
        "omnidimension" => &["OMNIDIMENSION_API_KEY"],
        _ => &[],
    }
}

fn env_api_key(provider: &str) -> Option<String> {
    env_key_names(provider).iter().find_map(|key| {
        env::var(key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

/// API key from the environment, then from an already loaded config.
pub fn resolve_api_key(provider: &str, config: &AppConfig) -> Option<String> {
    env_api_key(provider).or_else(|| {
        config
            .api_keys
            .get(provider)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    })
}
