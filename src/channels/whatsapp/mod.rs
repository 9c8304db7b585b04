use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

use crate::channels::{
    MediaDownload, MediaFetcher, OutboundSender, WHATSAPP_TEXT_LIMIT, split_message,
};
use crate::config::WhatsAppConfig;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// WhatsApp Cloud API client (Graph API). One instance serves both outbound
/// text delivery and media retrieval.
pub struct CloudApi {
    api_base: String,
    phone_number_id: String,
    access_token: String,
    max_media_bytes: u64,
    client: Client,
}

impl CloudApi {
    pub fn new(config: &WhatsAppConfig, max_media_bytes: u64) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            phone_number_id: config.phone_number_id.clone(),
            access_token: config.access_token.clone(),
            max_media_bytes,
            client: Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    async fn post_text(&self, to: &str, body: &str) -> Result<()> {
        let url = format!("{}/{}/messages", self.api_base, self.phone_number_id);
        let payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": {"preview_url": false, "body": body}
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .context("Failed to send WhatsApp message")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            bail!("WhatsApp send failed ({status}): {text}");
        }
        Ok(())
    }
}

#[async_trait]
impl OutboundSender for CloudApi {
    async fn send_text(&self, to: &str, body: &str) -> Result<()> {
        let chunks = split_message(body, WHATSAPP_TEXT_LIMIT);
        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            debug!(
                "WhatsApp send to {}: chunk {}/{} ({} bytes)",
                to,
                i + 1,
                total,
                chunk.len()
            );
            self.post_text(to, chunk).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MediaFetcher for CloudApi {
    async fn fetch(&self, media_id: &str) -> Result<MediaDownload> {
        // Step 1: resolve the media id to a short-lived download URL
        let meta_url = format!("{}/{}", self.api_base, media_id);
        let resp = self
            .client
            .get(&meta_url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("Failed to resolve WhatsApp media id")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            bail!("WhatsApp media lookup failed ({status}): {text}");
        }

        let meta: Value = resp
            .json()
            .await
            .context("Failed to parse WhatsApp media metadata")?;
        let url = meta
            .get("url")
            .and_then(Value::as_str)
            .context("Media metadata has no download URL")?;
        let mime = meta
            .get("mime_type")
            .and_then(Value::as_str)
            .unwrap_or("application/octet-stream")
            .to_string();

        if let Some(size) = meta.get("file_size").and_then(file_size_of)
            && size > self.max_media_bytes
        {
            bail!("media is {} bytes, limit is {}", size, self.max_media_bytes);
        }

        // Step 2: download the bytes; the URL wants the same bearer token
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("Failed to download WhatsApp media")?;
        if !resp.status().is_success() {
            bail!("WhatsApp media download failed ({})", resp.status());
        }
        let bytes = resp.bytes().await.context("Failed to read media body")?;

        // Metadata sizes are advisory; enforce the cap on what actually arrived
        if bytes.len() as u64 > self.max_media_bytes {
            bail!(
                "media is {} bytes, limit is {}",
                bytes.len(),
                self.max_media_bytes
            );
        }

        info!(
            "WhatsApp media fetched: {} ({} bytes, {})",
            media_id,
            bytes.len(),
            mime
        );
        Ok(MediaDownload {
            bytes: bytes.to_vec(),
            mime,
        })
    }
}

/// The Graph API has returned file_size both as a number and as a string.
fn file_size_of(v: &Value) -> Option<u64> {
    v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests;
