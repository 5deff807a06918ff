//! OpenAI-compatible HTTP backend.
//!
//! Speaks the `/embeddings` and `/chat/completions` wire format shared
//! by OpenAI, OpenRouter, and Ollama. Generation streams arrive as SSE
//! `data:` lines and are decoded incrementally.

use std::collections::HashMap;

use ragforge_core::config::{EmbeddingConfig, LlmConfig};
use ragforge_core::{Error, ProviderKind, Result};
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::types::{GenerationChunk, GenerationStream, TokenUsage};
use crate::LanguageBackend;

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Backend for providers exposing the OpenAI-compatible REST surface.
#[derive(Debug)]
pub struct OpenAiCompatBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    default_headers: HashMap<String, String>,
    embed_model: String,
    chat_model: String,
    temperature: f64,
    max_tokens: usize,
}

/// Default base URL per provider family, where the family speaks the
/// OpenAI-compatible format.
fn default_base_url(kind: ProviderKind) -> Option<&'static str> {
    match kind {
        ProviderKind::OpenAi => Some("https://api.openai.com/v1"),
        ProviderKind::OpenRouter => Some("https://openrouter.ai/api/v1"),
        ProviderKind::Ollama => Some("http://localhost:11434/v1"),
        _ => None,
    }
}

impl OpenAiCompatBackend {
    /// Build from the embedding and generation sections of the config.
    /// Providers with a different wire format are rejected here.
    pub fn from_config(embedding: &EmbeddingConfig, llm: &LlmConfig) -> Result<Self> {
        let base_url = llm
            .base_url
            .clone()
            .or_else(|| default_base_url(llm.provider).map(str::to_string))
            .ok_or_else(|| {
                Error::invalid_config(
                    "llm.provider",
                    format!(
                        "provider `{}` is not OpenAI-compatible; set llm.base_url or plug in \
                         a dedicated LanguageBackend",
                        llm.provider
                    ),
                )
            })?;

        let api_key = llm
            .api_key
            .clone()
            .or_else(|| embedding.api_key.clone())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::provider_fatal(format!("http client init failed: {}", e), None))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            default_headers: llm.default_headers.clone().unwrap_or_default(),
            embed_model: embedding.model.clone(),
            chat_model: llm.model.clone(),
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
        })
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        for (name, value) in &self.default_headers {
            req = req.header(name, value);
        }
        req
    }

    fn chat_body(&self, prompt: &str, system: Option<&str>, stream: bool) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": prompt}));
        json!({
            "model": self.chat_model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": stream,
        })
    }
}

/// Map an HTTP error response to the retryability the retry policy
/// expects: 429 and 5xx are transient, other client errors are not.
async fn response_error(response: reqwest::Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = format!("API error {}: {}", status, body);
    if status.as_u16() == 429 || status.is_server_error() {
        Error::provider_retryable(message, Some(status.as_u16()))
    } else {
        Error::provider_fatal(message, Some(status.as_u16()))
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    Error::provider_retryable(format!("request failed: {}", e), None)
}

fn parse_usage(value: &serde_json::Value) -> Option<TokenUsage> {
    let usage = value.get("usage")?;
    Some(TokenUsage {
        prompt_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as usize,
        completion_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as usize,
    })
}

#[async_trait::async_trait]
impl LanguageBackend for OpenAiCompatBackend {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({"model": self.embed_model, "input": texts});
        let response = self
            .request("/embeddings")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(response_error(response).await);
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::provider_fatal(format!("malformed embed response: {}", e), None))?;
        let data = payload["data"]
            .as_array()
            .ok_or_else(|| Error::provider_fatal("embed response missing data array", None))?;

        // Order by the reported index so output matches input order.
        let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
        for (pos, item) in data.iter().enumerate() {
            let idx = item["index"].as_u64().map(|i| i as usize).unwrap_or(pos);
            let vector = item["embedding"]
                .as_array()
                .ok_or_else(|| Error::provider_fatal("embed response missing embedding", None))?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            indexed.push((idx, vector));
        }
        indexed.sort_by_key(|(idx, _)| *idx);

        if indexed.len() != texts.len() {
            return Err(Error::provider_fatal(
                format!(
                    "embed response count mismatch: sent {}, got {}",
                    texts.len(),
                    indexed.len()
                ),
                None,
            ));
        }
        Ok(indexed.into_iter().map(|(_, v)| v).collect())
    }

    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let body = self.chat_body(prompt, system, false);
        debug!("generate via {} model {}", self.base_url, self.chat_model);
        let response = self
            .request("/chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(response_error(response).await);
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::provider_fatal(format!("malformed chat response: {}", e), None))?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::provider_fatal("chat response missing content", None))
    }

    fn generate_stream(&self, prompt: &str, system: Option<&str>) -> GenerationStream {
        let request = self.request("/chat/completions");
        let body = self.chat_body(prompt, system, true);
        let base_url = self.base_url.clone();
        let model = self.chat_model.clone();

        Box::pin(async_stream::stream! {
            debug!("streaming via {} model {}", base_url, model);

            let response = match request.json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    yield Err(transport_error(e));
                    return;
                }
            };
            if !response.status().is_success() {
                yield Err(response_error(response).await);
                return;
            }

            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(piece) = bytes.next().await {
                let piece = match piece {
                    Ok(b) => b,
                    Err(e) => {
                        yield Err(Error::provider_retryable(
                            format!("stream read error: {}", e),
                            None,
                        ));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&piece));

                // Process complete SSE lines.
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data.trim() == "[DONE]" {
                        return;
                    }

                    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(data) else {
                        continue;
                    };
                    let choice = &parsed["choices"][0];
                    let delta = choice["delta"]["content"].as_str().unwrap_or_default();
                    let finish_reason = choice["finish_reason"].as_str().map(str::to_string);
                    let usage = parse_usage(&parsed);

                    if !delta.is_empty() || finish_reason.is_some() || usage.is_some() {
                        yield Ok(GenerationChunk {
                            delta: delta.to_string(),
                            finish_reason,
                            usage,
                        });
                    }
                }
            }
        })
    }
}
