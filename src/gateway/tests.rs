use super::*;

fn make_state(secret: Option<&str>) -> (GatewayState, tokio::sync::mpsc::Receiver<InboundEvent>) {
    let (queue, rx) = EventQueue::new(16);
    let state = GatewayState {
        queue,
        verify_token: Arc::new("hunter2".to_string()),
        app_secret: secret.map(|s| Arc::new(s.to_string())),
    };
    (state, rx)
}

fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn sample_batch() -> serde_json::Value {
    serde_json::json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "102290129340398",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": "15550104400",
                        "phone_number_id": "106540352242922"
                    },
                    "contacts": [{
                        "profile": {"name": "Ada"},
                        "wa_id": "15550104477"
                    }],
                    "messages": [{
                        "from": "15550104477",
                        "id": "wamid.HBgLMTU1NTAxMDQ0NzcVAgAS",
                        "timestamp": "1724668800",
                        "type": "text",
                        "text": {"body": "hello there"}
                    }]
                }
            }]
        }]
    })
}

#[tokio::test]
async fn handshake_echoes_challenge() {
    use axum::http::Request;
    use tower::ServiceExt;

    let (state, _rx) = make_state(None);
    let app = build_router(state);

    let req = Request::builder()
        .method("GET")
        .uri("/webhook?hub.mode=subscribe&hub.verify_token=hunter2&hub.challenge=1158201444")
        .body(axum::body::Body::empty())
        .unwrap();

    let resp: axum::http::Response<_> = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = axum::body::to_bytes(resp.into_body(), 4096).await.unwrap();
    assert_eq!(&body[..], b"1158201444");
}

#[tokio::test]
async fn handshake_rejects_bad_token_and_missing_params() {
    use axum::http::Request;
    use tower::ServiceExt;

    let (state, _rx) = make_state(None);

    for uri in [
        "/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=1",
        "/webhook?hub.mode=unsubscribe&hub.verify_token=hunter2&hub.challenge=1",
        "/webhook?hub.mode=subscribe",
        "/webhook",
    ] {
        let app = build_router(state.clone());
        let req = Request::builder()
            .method("GET")
            .uri(uri)
            .body(axum::body::Body::empty())
            .unwrap();
        let resp: axum::http::Response<_> = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "uri {} should be rejected", uri);
    }
}

#[tokio::test]
async fn healthz_reports_version() {
    use axum::http::Request;
    use tower::ServiceExt;

    let (state, _rx) = make_state(None);
    let app = build_router(state);

    let req = Request::builder()
        .method("GET")
        .uri("/healthz")
        .body(axum::body::Body::empty())
        .unwrap();

    let resp: axum::http::Response<_> = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = axum::body::to_bytes(resp.into_body(), 4096).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], crate::VERSION);
}

#[tokio::test]
async fn signed_batch_is_accepted_and_enqueued() {
    use axum::http::Request;
    use tower::ServiceExt;

    let (state, mut rx) = make_state(Some("secret123"));
    let app = build_router(state);

    let body = serde_json::to_vec(&sample_batch()).unwrap();
    let sig = format!("sha256={}", sign_body("secret123", &body));
    let req = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("X-Hub-Signature-256", &sig)
        .body(axum::body::Body::from(body))
        .unwrap();

    let resp: axum::http::Response<_> = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let event = rx.try_recv().unwrap();
    assert_eq!(event.message_id, "wamid.HBgLMTU1NTAxMDQ0NzcVAgAS");
    assert_eq!(event.sender, "15550104477");
    assert_eq!(event.sender_name.as_deref(), Some("Ada"));
    assert_eq!(
        event.timestamp,
        DateTime::from_timestamp(1_724_668_800, 0).unwrap()
    );
    match &event.payload {
        EventPayload::Text { body } => assert_eq!(body, "hello there"),
        other => panic!("expected text payload, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_signature_is_forbidden() {
    use axum::http::Request;
    use tower::ServiceExt;

    let (state, mut rx) = make_state(Some("secret123"));
    let app = build_router(state);

    let body = serde_json::to_vec(&sample_batch()).unwrap();
    let req = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("X-Hub-Signature-256", "sha256=deadbeef")
        .body(axum::body::Body::from(body))
        .unwrap();

    let resp: axum::http::Response<_> = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn missing_signature_is_forbidden() {
    use axum::http::Request;
    use tower::ServiceExt;

    let (state, _rx) = make_state(Some("secret123"));
    let app = build_router(state);

    let body = serde_json::to_vec(&sample_batch()).unwrap();
    let req = Request::builder()
        .method("POST")
        .uri("/webhook")
        .body(axum::body::Body::from(body))
        .unwrap();

    let resp: axum::http::Response<_> = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn signature_check_is_skipped_when_unconfigured() {
    use axum::http::Request;
    use tower::ServiceExt;

    let (state, mut rx) = make_state(None);
    let app = build_router(state);

    let body = serde_json::to_vec(&sample_batch()).unwrap();
    let req = Request::builder()
        .method("POST")
        .uri("/webhook")
        .body(axum::body::Body::from(body))
        .unwrap();

    let resp: axum::http::Response<_> = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(rx.try_recv().is_ok());
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    use axum::http::Request;
    use tower::ServiceExt;

    let (state, _rx) = make_state(None);
    let app = build_router(state);

    let oversized = vec![b'x'; WEBHOOK_MAX_BODY + 1];
    let req = Request::builder()
        .method("POST")
        .uri("/webhook")
        .body(axum::body::Body::from(oversized))
        .unwrap();

    let resp: axum::http::Response<_> = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn malformed_body_is_acked_and_dropped() {
    use axum::http::Request;
    use tower::ServiceExt;

    let (state, mut rx) = make_state(None);
    let app = build_router(state);

    let req = Request::builder()
        .method("POST")
        .uri("/webhook")
        .body(axum::body::Body::from("this is not json"))
        .unwrap();

    let resp: axum::http::Response<_> = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(rx.try_recv().is_err());
}

#[test]
fn signature_accepts_raw_hex_and_prefixed() {
    let body = b"payload";
    let raw = sign_body("secret123", body);
    assert!(validate_webhook_signature("secret123", &raw, body));
    assert!(validate_webhook_signature(
        "secret123",
        &format!("sha256={raw}"),
        body
    ));
}

#[test]
fn signature_rejects_wrong_secret() {
    let body = b"payload";
    let sig = sign_body("secret123", body);
    assert!(!validate_webhook_signature("other-secret", &sig, body));
    assert!(!validate_webhook_signature("secret123", "not-hex", body));
}

#[test]
fn statuses_only_batch_yields_nothing() {
    let batch = serde_json::json!({
        "entry": [{
            "changes": [{
                "value": {
                    "statuses": [{
                        "id": "wamid.out1",
                        "status": "delivered",
                        "recipient_id": "15550104477"
                    }]
                }
            }]
        }]
    });
    assert!(parse_webhook_batch(&batch).is_empty());
}

#[test]
fn media_payloads_carry_declared_metadata() {
    let batch = serde_json::json!({
        "entry": [{
            "changes": [{
                "value": {
                    "contacts": [{"profile": {"name": "Grace"}, "wa_id": "447700900123"}],
                    "messages": [
                        {
                            "from": "447700900123",
                            "id": "wamid.doc1",
                            "timestamp": "1724668800",
                            "type": "document",
                            "document": {
                                "id": "media-900",
                                "filename": "report.txt",
                                "mime_type": "text/plain",
                                "file_size": 2048,
                                "caption": "quarterly numbers"
                            }
                        },
                        {
                            "from": "447700900123",
                            "id": "wamid.img1",
                            "timestamp": "1724668801",
                            "type": "image",
                            "image": {"id": "media-901", "mime_type": "image/jpeg"}
                        }
                    ]
                }
            }]
        }]
    });

    let events = parse_webhook_batch(&batch);
    assert_eq!(events.len(), 2);

    match &events[0].payload {
        EventPayload::Document {
            media_id,
            filename,
            mime_type,
            declared_bytes,
            caption,
        } => {
            assert_eq!(media_id, "media-900");
            assert_eq!(filename.as_deref(), Some("report.txt"));
            assert_eq!(mime_type.as_deref(), Some("text/plain"));
            assert_eq!(*declared_bytes, Some(2048));
            assert_eq!(caption.as_deref(), Some("quarterly numbers"));
        }
        other => panic!("expected document payload, got {other:?}"),
    }

    match &events[1].payload {
        EventPayload::Image {
            media_id,
            mime_type,
            declared_bytes,
            caption,
        } => {
            assert_eq!(media_id, "media-901");
            assert_eq!(mime_type.as_deref(), Some("image/jpeg"));
            assert_eq!(*declared_bytes, None);
            assert_eq!(*caption, None);
        }
        other => panic!("expected image payload, got {other:?}"),
    }
}

#[test]
fn missing_message_id_is_synthesized() {
    let batch = serde_json::json!({
        "entry": [{
            "changes": [{
                "value": {
                    "messages": [{
                        "from": "15550104477",
                        "timestamp": "1724668800",
                        "type": "text",
                        "text": {"body": "no id on this one"}
                    }]
                }
            }]
        }]
    });

    let events = parse_webhook_batch(&batch);
    assert_eq!(events.len(), 1);
    assert!(events[0].message_id.starts_with("gen-"));
}

#[test]
fn unknown_kinds_map_to_other() {
    let batch = serde_json::json!({
        "entry": [{
            "changes": [{
                "value": {
                    "messages": [{
                        "from": "15550104477",
                        "id": "wamid.audio1",
                        "timestamp": "1724668800",
                        "type": "audio",
                        "audio": {"id": "media-77", "mime_type": "audio/ogg"}
                    }]
                }
            }]
        }]
    });

    let events = parse_webhook_batch(&batch);
    assert_eq!(events.len(), 1);
    match &events[0].payload {
        EventPayload::Other { kind } => assert_eq!(kind, "audio"),
        other => panic!("expected other payload, got {other:?}"),
    }
}

#[test]
fn senderless_messages_are_dropped() {
    let batch = serde_json::json!({
        "entry": [{
            "changes": [{
                "value": {
                    "messages": [{
                        "id": "wamid.orphan",
                        "timestamp": "1724668800",
                        "type": "text",
                        "text": {"body": "who sent this"}
                    }]
                }
            }]
        }]
    });
    assert!(parse_webhook_batch(&batch).is_empty());
}
