//! Oracle backends
//!
//! `OracleClient` is the seam between the gateway and whatever produces
//! completion text: an Ollama server, an OpenAI-compatible endpoint, or the
//! offline heuristic.

use super::prompts::OracleRequest;
use super::retry::{unavailable, RetryPolicy};
use crate::errors::{HealError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default model
pub const DEFAULT_MODEL: &str = "qwen2.5:7b-instruct";

#[async_trait]
pub trait OracleClient: Send + Sync {
    /// Model identifier recorded in audit traces
    fn model(&self) -> &str;

    /// Raw completion text for one request
    async fn complete(&self, request: &OracleRequest) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleProvider {
    Heuristic,
    Ollama,
    Openai,
}

impl fmt::Display for OracleProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OracleProvider::Heuristic => "heuristic",
            OracleProvider::Ollama => "ollama",
            OracleProvider::Openai => "openai",
        })
    }
}

impl FromStr for OracleProvider {
    type Err = HealError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "heuristic" | "offline" => Ok(OracleProvider::Heuristic),
            "ollama" => Ok(OracleProvider::Ollama),
            "openai" | "nim" => Ok(OracleProvider::Openai),
            other => Err(HealError::Config(format!("Unknown oracle provider: {}", other))),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP oracle for Ollama or OpenAI-compatible servers
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: Client,
    provider: OracleProvider,
    base_url: String,
    model: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl HttpOracle {
    pub fn new(
        provider: OracleProvider,
        base_url: &str,
        model: &str,
        request_timeout: Duration,
    ) -> Result<Self> {
        if provider == OracleProvider::Heuristic {
            return Err(HealError::Config("heuristic oracle is not an HTTP backend".to_string()));
        }
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(HealError::Http)?;

        Ok(Self {
            client,
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.filter(|k| !k.is_empty());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider(&self) -> OracleProvider {
        self.provider
    }

    async fn send_once(&self, request: &OracleRequest) -> Result<String> {
        let response = match self.provider {
            OracleProvider::Ollama => {
                let url = format!("{}/api/generate", self.base_url);
                let body = GenerateRequest {
                    model: &self.model,
                    prompt: &request.prompt,
                    system: &request.system,
                    stream: false,
                    options: GenerateOptions {
                        temperature: request.temperature,
                    },
                };
                self.client.post(&url).json(&body).send().await?
            }
            OracleProvider::Openai | OracleProvider::Heuristic => {
                let url = format!("{}/chat/completions", self.base_url);
                let body = ChatRequest {
                    model: &self.model,
                    messages: vec![
                        ChatMessage {
                            role: "system",
                            content: &request.system,
                        },
                        ChatMessage {
                            role: "user",
                            content: &request.prompt,
                        },
                    ],
                    temperature: request.temperature,
                };
                let mut builder = self.client.post(&url).json(&body);
                if let Some(key) = &self.api_key {
                    builder = builder.bearer_auth(key);
                }
                builder.send().await?
            }
        };

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(classify_status(status, &text));
        }
        self.extract_text(&text)
    }

    fn extract_text(&self, body: &str) -> Result<String> {
        let parsed = match self.provider {
            OracleProvider::Ollama => serde_json::from_str::<GenerateResponse>(body).map(|r| Some(r.response)),
            _ => serde_json::from_str::<ChatResponse>(body)
                .map(|r| r.choices.into_iter().next().and_then(|c| c.message.content)),
        };
        match parsed {
            Ok(Some(text)) => Ok(text),
            Ok(None) => Err(HealError::OracleParse {
                reason: "response carried no completion".to_string(),
                raw: body.to_string(),
            }),
            Err(e) => Err(HealError::OracleParse {
                reason: format!("unexpected response envelope: {}", e),
                raw: body.to_string(),
            }),
        }
    }
}

fn classify_status(status: StatusCode, body: &str) -> HealError {
    let snippet: String = body.chars().take(200).collect();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        unavailable(format!("HTTP {}: {}", status, snippet))
    } else {
        HealError::Config(format!("oracle rejected request with HTTP {}: {}", status, snippet))
    }
}

#[async_trait]
impl OracleClient for HttpOracle {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &OracleRequest) -> Result<String> {
        self.retry.run(|| self.send_once(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle(provider: OracleProvider) -> HttpOracle {
        HttpOracle::new(provider, "http://localhost:11434/", "test-model", Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("ollama".parse::<OracleProvider>().unwrap(), OracleProvider::Ollama);
        assert_eq!("OpenAI".parse::<OracleProvider>().unwrap(), OracleProvider::Openai);
        assert_eq!("offline".parse::<OracleProvider>().unwrap(), OracleProvider::Heuristic);
        assert!("gpt".parse::<OracleProvider>().is_err());
    }

    #[test]
    fn test_heuristic_is_not_http() {
        assert!(HttpOracle::new(OracleProvider::Heuristic, DEFAULT_OLLAMA_URL, DEFAULT_MODEL, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        assert_eq!(oracle(OracleProvider::Ollama).base_url, "http://localhost:11434");
    }

    #[test]
    fn test_extract_ollama_text() {
        let o = oracle(OracleProvider::Ollama);
        assert_eq!(o.extract_text(r#"{"response": "hi", "done": true}"#).unwrap(), "hi");
        assert!(matches!(o.extract_text("<html>"), Err(HealError::OracleParse { .. })));
    }

    #[test]
    fn test_extract_chat_text() {
        let o = oracle(OracleProvider::Openai);
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "{}"}}]}"#;
        assert_eq!(o.extract_text(body).unwrap(), "{}");
        assert!(o.extract_text(r#"{"choices": []}"#).is_err());
    }

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(!classify_status(StatusCode::UNAUTHORIZED, "").is_transient());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let o = HttpOracle::new(OracleProvider::Ollama, "http://127.0.0.1:9", "m", Duration::from_millis(200))
            .unwrap()
            .with_retry(RetryPolicy::immediate(1));
        let err = o
            .complete(&OracleRequest::new(super::super::prompts::AgentTag::Detection, "hi".into()))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
