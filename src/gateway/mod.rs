//! WhatsApp Cloud API webhook server.
//!
//! Hosts the verification handshake (`GET /webhook`), the event receiver
//! (`POST /webhook`) and a liveness probe (`GET /healthz`). Inbound batches
//! are validated, normalized into [`InboundEvent`]s and enqueued for the
//! dispatch loop; the HTTP layer never touches the router directly.

use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bus::{EventPayload, EventQueue, InboundEvent};
use crate::config::WhatsAppConfig;
use crate::utils::normalize_phone;

type HmacSha256 = Hmac<Sha256>;

/// Max webhook payload size: 1 MiB.
const WEBHOOK_MAX_BODY: usize = 1_048_576;

/// Shared state between the webhook handlers.
#[derive(Clone)]
pub struct GatewayState {
    queue: EventQueue,
    verify_token: Arc<String>,
    /// When unset, signature validation is skipped entirely.
    app_secret: Option<Arc<String>>,
}

/// Query parameters of the Cloud API subscription handshake.
#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/webhook", get(verify_handler).post(receive_handler))
        .route("/healthz", get(health_handler))
        .with_state(state)
}

/// GET /webhook — subscription handshake. Echoes `hub.challenge` only when
/// the mode is `subscribe` and the verify token matches.
async fn verify_handler(
    State(state): State<GatewayState>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    if let (Some(mode), Some(token), Some(challenge)) =
        (&params.mode, &params.verify_token, &params.challenge)
        && mode == "subscribe"
        && token.as_str() == state.verify_token.as_str()
    {
        info!("webhook verification handshake accepted");
        return (StatusCode::OK, challenge.clone()).into_response();
    }
    warn!("webhook verification handshake rejected");
    StatusCode::FORBIDDEN.into_response()
}

/// POST /webhook — receive an event batch, normalize it and enqueue.
async fn receive_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if body.len() > WEBHOOK_MAX_BODY {
        warn!("webhook payload too large ({} bytes)", body.len());
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    if let Some(secret) = &state.app_secret {
        let signature = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok());
        let Some(signature) = signature else {
            warn!("webhook: missing X-Hub-Signature-256 header");
            return StatusCode::FORBIDDEN.into_response();
        };
        if !validate_webhook_signature(secret, signature, &body) {
            warn!("webhook: invalid signature");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let batch: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            // A malformed body never becomes parseable; ack it so the
            // platform stops redelivering.
            warn!("webhook: dropping unparseable body: {}", e);
            return StatusCode::OK.into_response();
        }
    };

    let events = parse_webhook_batch(&batch);
    debug!("webhook batch normalized into {} event(s)", events.len());
    for event in events {
        if let Err(e) = state.queue.publish(event).await {
            error!("failed to enqueue inbound event: {}", e);
        }
    }

    StatusCode::OK.into_response()
}

/// GET /healthz — liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}

/// Validate HMAC-SHA256 signature against the raw request body.
pub(crate) fn validate_webhook_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    // The platform sends "sha256=<hex>"; tolerate the raw hex too.
    let sig = signature.strip_prefix("sha256=").unwrap_or(signature);
    expected.as_bytes().ct_eq(sig.as_bytes()).into()
}

/// Flatten a Cloud API batch into normalized events.
///
/// Batches nest messages under `entry[].changes[].value`. A value carries
/// `messages` (inbound traffic) and/or `statuses` (delivery receipts the bot
/// does not act on). Entries we cannot make sense of are skipped, never
/// rejected: the whole batch is acked regardless.
pub(crate) fn parse_webhook_batch(batch: &serde_json::Value) -> Vec<InboundEvent> {
    let mut events = Vec::new();
    for entry in batch["entry"].as_array().into_iter().flatten() {
        for change in entry["changes"].as_array().into_iter().flatten() {
            let value = &change["value"];
            if let Some(statuses) = value["statuses"].as_array() {
                debug!("webhook: {} delivery status update(s) dropped", statuses.len());
            }
            for message in value["messages"].as_array().into_iter().flatten() {
                if let Some(event) = normalize_message(message, &value["contacts"]) {
                    events.push(event);
                }
            }
        }
    }
    events
}

fn normalize_message(
    message: &serde_json::Value,
    contacts: &serde_json::Value,
) -> Option<InboundEvent> {
    let raw_from = message["from"].as_str().unwrap_or_default();
    let sender = normalize_phone(raw_from);
    if sender.is_empty() {
        warn!("webhook: message without a usable sender dropped");
        return None;
    }

    // Redeliveries reuse the platform id, which is what dedup keys on. A
    // synthesized id can never collide, so id-less messages always pass.
    let message_id = match message["id"].as_str() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!("gen-{}", Uuid::new_v4()),
    };

    let timestamp = message["timestamp"]
        .as_str()
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    let sender_name = contacts
        .as_array()
        .and_then(|list| list.iter().find(|c| c["wa_id"].as_str() == Some(raw_from)))
        .and_then(|c| c["profile"]["name"].as_str())
        .map(str::to_string);

    let kind = message["type"].as_str().unwrap_or("unknown");
    let payload = match kind {
        "text" => EventPayload::Text {
            body: message["text"]["body"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
        },
        "document" => {
            let doc = &message["document"];
            let media_id = doc["id"].as_str().unwrap_or_default().to_string();
            if media_id.is_empty() {
                warn!("webhook: document message without a media id dropped");
                return None;
            }
            EventPayload::Document {
                media_id,
                filename: doc["filename"].as_str().map(str::to_string),
                mime_type: doc["mime_type"].as_str().map(str::to_string),
                declared_bytes: doc["file_size"].as_u64(),
                caption: doc["caption"].as_str().map(str::to_string),
            }
        }
        "image" => {
            let img = &message["image"];
            let media_id = img["id"].as_str().unwrap_or_default().to_string();
            if media_id.is_empty() {
                warn!("webhook: image message without a media id dropped");
                return None;
            }
            EventPayload::Image {
                media_id,
                mime_type: img["mime_type"].as_str().map(str::to_string),
                declared_bytes: img["file_size"].as_u64(),
                caption: img["caption"].as_str().map(str::to_string),
            }
        }
        other => EventPayload::Other {
            kind: other.to_string(),
        },
    };

    Some(InboundEvent {
        message_id,
        sender,
        sender_name,
        group_id: None,
        timestamp,
        payload,
    })
}

/// Start the webhook server. Returns the server task handle.
pub async fn start(
    host: &str,
    port: u16,
    queue: EventQueue,
    whatsapp: &WhatsAppConfig,
) -> Result<tokio::task::JoinHandle<()>> {
    let app_secret = whatsapp.app_secret.trim();
    if app_secret.is_empty() {
        warn!("no app secret configured, webhook signature validation disabled");
    }
    let state = GatewayState {
        queue,
        verify_token: Arc::new(whatsapp.verify_token.clone()),
        app_secret: (!app_secret.is_empty()).then(|| Arc::new(app_secret.to_string())),
    };

    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("webhook gateway listening on {}", addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("webhook gateway server error: {}", e);
        }
    });

    Ok(handle)
}

#[cfg(test)]
mod tests;
