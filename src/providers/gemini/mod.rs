use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

use crate::config::GeminiConfig;
use crate::errors::WarblerError;
use crate::providers::base::{AiProvider, ProviderMetrics, RetryConfig, backoff_delay};
use crate::providers::errors::ProviderErrorHandler;
use crate::providers::prompts;
use crate::session::ChatTurn;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 60;

const CHAT_TEMPERATURE: f64 = 0.7;
const CHAT_MAX_TOKENS: u32 = 1000;
const ANALYSIS_TEMPERATURE: f64 = 0.3;
const ANALYSIS_MAX_TOKENS: u32 = 1500;

pub struct GeminiProvider {
    api_key: String,
    chat_model: String,
    analysis_model: String,
    base_url: String,
    bot_name: String,
    client: Client,
    retry: RetryConfig,
    metrics: Arc<Mutex<ProviderMetrics>>,
}

impl GeminiProvider {
    pub fn new(config: &GeminiConfig, bot_name: &str) -> Self {
        Self {
            api_key: config.api_key.clone(),
            chat_model: config.chat_model.clone(),
            analysis_model: config.analysis_model.clone(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
            bot_name: bot_name.to_string(),
            client: Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap_or_else(|_| Client::new()),
            retry: RetryConfig::default(),
            metrics: Arc::new(Mutex::new(ProviderMetrics::default())),
        }
    }

    #[cfg(test)]
    fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn generate(&self, model: &str, payload: &Value) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let mut last_error = None;
        for attempt in 0..=self.retry.max_retries {
            match self.try_generate(&url, payload).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    // Plain transport errors carry no typed info; treat them
                    // as transient like the retryable API statuses.
                    let retryable = e
                        .downcast_ref::<WarblerError>()
                        .is_none_or(WarblerError::is_retryable);
                    if !retryable {
                        return Err(e);
                    }
                    last_error = Some(e);
                    if attempt < self.retry.max_retries {
                        let delay = backoff_delay(&self.retry, attempt);
                        warn!(
                            "Gemini call failed (attempt {}/{}), retrying in {:?}",
                            attempt + 1,
                            self.retry.max_retries + 1,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("All Gemini attempts failed")))
    }

    async fn try_generate(&self, url: &str, payload: &Value) -> Result<String> {
        let resp = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .context("Failed to send request to Gemini API")?;

        let json = ProviderErrorHandler::check_response(resp, "Gemini", &self.metrics).await?;

        {
            if let Ok(mut metrics) = self.metrics.lock() {
                metrics.request_count += 1;
                if let Some(tokens) = json
                    .get("usageMetadata")
                    .and_then(|u| u.get("totalTokenCount"))
                    .and_then(Value::as_u64)
                {
                    metrics.token_count += tokens;
                }
            }
        }

        Self::parse_text(&json)
    }

    fn parse_text(json: &Value) -> Result<String> {
        let candidate = json["candidates"]
            .as_array()
            .and_then(|arr| arr.first())
            .context("No candidates in Gemini response")?;

        let text = candidate["content"]["parts"]
            .as_array()
            .and_then(|parts| parts.iter().find_map(|p| p["text"].as_str()))
            .context("No text part in Gemini response")?;

        Ok(text.trim().to_string())
    }

    fn generation_config(temperature: f64, max_tokens: u32) -> Value {
        json!({
            "temperature": temperature,
            "maxOutputTokens": max_tokens,
        })
    }
}

#[async_trait]
impl AiProvider for GeminiProvider {
    async fn chat(&self, prompt: &str, history: &[ChatTurn]) -> Result<String> {
        let mut contents: Vec<Value> = history
            .iter()
            .map(|turn| {
                json!({
                    "role": turn.role,
                    "parts": [{"text": turn.content}]
                })
            })
            .collect();
        contents.push(json!({
            "role": "user",
            "parts": [{"text": prompt}]
        }));

        let payload = json!({
            "contents": contents,
            "systemInstruction": {
                "parts": [{"text": prompts::chat_system_instruction(&self.bot_name)}]
            },
            "generationConfig": Self::generation_config(CHAT_TEMPERATURE, CHAT_MAX_TOKENS),
        });

        self.generate(&self.chat_model, &payload).await
    }

    async fn analyze_text(
        &self,
        content: &str,
        filename: &str,
        file_type: &str,
    ) -> Result<String> {
        let prompt = format!("File: {filename}\nType: {file_type}\nContent:\n{content}");
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt}]
            }],
            "systemInstruction": {
                "parts": [{"text": prompts::FILE_ANALYSIS_INSTRUCTION}]
            },
            "generationConfig": Self::generation_config(ANALYSIS_TEMPERATURE, ANALYSIS_MAX_TOKENS),
        });

        self.generate(&self.analysis_model, &payload).await
    }

    async fn analyze_image(&self, bytes: &[u8], mime: &str) -> Result<String> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {"inline_data": {"mime_type": mime, "data": encoded}},
                    {"text": "Analyze this image in detail."}
                ]
            }],
            "systemInstruction": {
                "parts": [{"text": prompts::IMAGE_ANALYSIS_INSTRUCTION}]
            },
            "generationConfig": Self::generation_config(ANALYSIS_TEMPERATURE, ANALYSIS_MAX_TOKENS),
        });

        self.generate(&self.analysis_model, &payload).await
    }
}
