use super::*;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_api(server_uri: &str, max_media_bytes: u64) -> CloudApi {
    let config = WhatsAppConfig {
        phone_number_id: "1098765".to_string(),
        access_token: "test-token".to_string(),
        verify_token: "verify".to_string(),
        app_secret: String::new(),
        api_base: server_uri.to_string(),
    };
    CloudApi::new(&config, max_media_bytes)
}

#[tokio::test]
async fn send_text_posts_to_the_messages_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1098765/messages"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(serde_json::json!({
            "messaging_product": "whatsapp",
            "to": "15550104477",
            "type": "text",
            "text": {"body": "hello there"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "messages": [{"id": "wamid.out.1"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = test_api(&server.uri(), 1024);
    api.send_text("15550104477", "hello there").await.unwrap();
}

#[tokio::test]
async fn long_replies_are_sent_in_chunks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1098765/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "messages": [{"id": "wamid.out.2"}]
        })))
        .expect(3)
        .mount(&server)
        .await;

    let api = test_api(&server.uri(), 1024);
    // 9000 ascii bytes > 2 * 4000: three chunks
    let body = "x".repeat(9000);
    api.send_text("15550104477", &body).await.unwrap();
}

#[tokio::test]
async fn send_text_surfaces_api_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1098765/messages"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {"message": "Invalid recipient", "code": 131026}
        })))
        .mount(&server)
        .await;

    let api = test_api(&server.uri(), 1024);
    let err = api.send_text("not-a-number", "hi").await.unwrap_err();
    assert!(err.to_string().contains("WhatsApp send failed"));
}

#[tokio::test]
async fn fetch_resolves_then_downloads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media-42"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "url": format!("{}/lookaside/media-42", server.uri()),
            "mime_type": "image/png",
            "file_size": 4,
            "id": "media-42"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/lookaside/media-42"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3, 4]))
        .mount(&server)
        .await;

    let api = test_api(&server.uri(), 1024);
    let download = api.fetch("media-42").await.unwrap();
    assert_eq!(download.bytes, vec![1, 2, 3, 4]);
    assert_eq!(download.mime, "image/png");
}

#[tokio::test]
async fn fetch_rejects_oversized_declared_media_without_downloading() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media-43"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "url": format!("{}/lookaside/media-43", server.uri()),
            "mime_type": "image/jpeg",
            "file_size": 999_999,
            "id": "media-43"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/lookaside/media-43"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let api = test_api(&server.uri(), 1024);
    let err = api.fetch("media-43").await.unwrap_err();
    assert!(err.to_string().contains("limit is 1024"));
}

#[tokio::test]
async fn fetch_rejects_oversized_actual_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media-44"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "url": format!("{}/lookaside/media-44", server.uri()),
            "mime_type": "image/png",
            "file_size": 10,
            "id": "media-44"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/lookaside/media-44"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 2000]))
        .mount(&server)
        .await;

    let api = test_api(&server.uri(), 1024);
    let err = api.fetch("media-44").await.unwrap_err();
    assert!(err.to_string().contains("limit is 1024"));
}

#[tokio::test]
async fn fetch_surfaces_lookup_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media-45"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": {"message": "Unknown media id"}
        })))
        .mount(&server)
        .await;

    let api = test_api(&server.uri(), 1024);
    let err = api.fetch("media-45").await.unwrap_err();
    assert!(err.to_string().contains("media lookup failed"));
}
