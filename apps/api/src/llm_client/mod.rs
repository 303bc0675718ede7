/// LLM Client — the single point of entry for all completion calls in the pitch service.
///
/// ARCHITECTURAL RULE: No other module may call the completion API directly.
/// The generator only sees the `CompletionClient` trait; `LlmClient` is the
/// production implementation over the OpenAI Chat Completions API.
///
/// One call here is one attempt. Retrying is the generator's job.
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const TEMPERATURE: f32 = 0.7;
/// Error code the API uses for a rejected key, whatever the HTTP status.
const INVALID_API_KEY_CODE: &str = "invalid_api_key";

// ────────────────────────────────────────────────────────────────────────────
// Errors and outcomes
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API key is not configured")]
    MissingCredentials,

    #[error("API key is malformed: {0}")]
    MalformedCredentials(&'static str),

    #[error("Credentials rejected (status {status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("LLM output contained no recognizable section")]
    MalformedOutput,
}

impl LlmError {
    /// Fatal failures are never retried: configuration problems and
    /// credentials rejected by the service.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LlmError::MissingCredentials
                | LlmError::MalformedCredentials(_)
                | LlmError::Unauthorized { .. }
        )
    }

    /// Configuration problems are detected before any request is sent.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LlmError::MissingCredentials | LlmError::MalformedCredentials(_)
        )
    }
}

/// Result of a single completion attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(String),
    RetryableFailure(LlmError),
    FatalFailure(LlmError),
}

impl From<Result<String, LlmError>> for AttemptOutcome {
    fn from(result: Result<String, LlmError>) -> Self {
        match result {
            Ok(text) => AttemptOutcome::Success(text),
            Err(e) if e.is_fatal() => AttemptOutcome::FatalFailure(e),
            Err(e) => AttemptOutcome::RetryableFailure(e),
        }
    }
}

/// The adapter seam between the generator and the completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Pre-condition check run before any attempt. Fails when credentials
    /// are missing or malformed.
    fn check_credentials(&self) -> Result<(), LlmError>;

    /// Performs one completion bounded by `timeout` and classifies the result.
    async fn complete(&self, system: &str, user: &str, timeout: Duration) -> AttemptOutcome;
}

// ────────────────────────────────────────────────────────────────────────────
// Credentials
// ────────────────────────────────────────────────────────────────────────────

/// A syntactically valid API key. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn parse(raw: Option<&str>) -> Result<Self, LlmError> {
        let raw = raw.map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Err(LlmError::MissingCredentials);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(LlmError::MalformedCredentials("contains whitespace"));
        }
        if !raw.is_ascii() {
            return Err(LlmError::MalformedCredentials("contains non-ASCII characters"));
        }
        Ok(Self(raw.to_string()))
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Credential state captured at construction; cheap to clone and compare.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Credentials {
    Valid(ApiKey),
    Missing,
    Malformed(&'static str),
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatResponse {
    /// Text of the first choice, if it has any non-blank content.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// Maps a non-success response to a structured error.
fn api_error(status: StatusCode, body: String) -> LlmError {
    let (message, code) = match serde_json::from_str::<ApiErrorEnvelope>(&body) {
        Ok(envelope) => (envelope.error.message, envelope.error.code),
        Err(_) => (body, None),
    };

    let rejected_key = code.as_deref() == Some(INVALID_API_KEY_CODE);
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN || rejected_key {
        return LlmError::Unauthorized {
            status: status.as_u16(),
            message,
        };
    }
    LlmError::Api {
        status: status.as_u16(),
        message,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// Production completion client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    model: String,
    credentials: Credentials,
}

impl LlmClient {
    /// Builds the client. Missing or malformed keys do not fail construction;
    /// they surface through `check_credentials` on every generation.
    pub fn new(api_key: Option<&str>, base_url: &str, model: &str) -> Result<Self, LlmError> {
        let credentials = match ApiKey::parse(api_key) {
            Ok(key) => Credentials::Valid(key),
            Err(LlmError::MalformedCredentials(reason)) => Credentials::Malformed(reason),
            Err(_) => Credentials::Missing,
        };

        Ok(Self {
            client: Client::builder().build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            credentials,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn api_key(&self) -> Result<&ApiKey, LlmError> {
        match &self.credentials {
            Credentials::Valid(key) => Ok(key),
            Credentials::Missing => Err(LlmError::MissingCredentials),
            Credentials::Malformed(reason) => Err(LlmError::MalformedCredentials(reason)),
        }
    }

    /// Makes one raw call to the chat completions endpoint and returns the text.
    pub async fn call(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let api_key = self.api_key()?;

        let request_body = ChatRequest {
            model: &self.model,
            temperature: TEMPERATURE,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key.expose())
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, body));
        }

        let body = response.text().await?;
        let chat: ChatResponse = serde_json::from_str(&body)?;

        if let Some(usage) = &chat.usage {
            debug!(
                "Completion succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }
        debug!("Completion returned {} choice(s)", chat.choices.len());

        chat.text()
            .map(str::to_string)
            .ok_or(LlmError::EmptyContent)
    }
}

#[async_trait]
impl CompletionClient for LlmClient {
    fn check_credentials(&self) -> Result<(), LlmError> {
        self.api_key().map(|_| ())
    }

    async fn complete(&self, system: &str, user: &str, timeout: Duration) -> AttemptOutcome {
        let result = match tokio::time::timeout(timeout, self.call(system, user)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(timeout)),
        };

        if let Err(e) = &result {
            match e {
                LlmError::Http(err) if err.is_connect() => {
                    warn!("Network error reaching the completion service: {e}")
                }
                e if e.is_fatal() => warn!("Authentication failure, check OPENAI_API_KEY: {e}"),
                e => warn!("Completion failed: {e}"),
            }
        }
        result.into()
    }
}
