use shared::capabilities::ImageFormat;
use shared::testing::ScriptedImageSource;
use shared::{
    CameraOutput, CaptureError, ClientConfig, CorrectionField, CredentialKey, FlowState,
    ImageHandle, InMemoryCredentialStore, ReqwestTransport, SessionClient, SourceKind,
    UploadOrchestrator,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

type Orchestrator =
    UploadOrchestrator<InMemoryCredentialStore, ReqwestTransport, ScriptedImageSource>;

/// Byte-level body search. Upload bodies carry raw JPEG data, so they are
/// not UTF-8 and `body_string_contains` never sees them.
struct BodyHas(&'static [u8]);

impl Match for BodyHas {
    fn matches(&self, request: &Request) -> bool {
        request.body.windows(self.0.len()).any(|w| w == self.0)
    }
}

fn jpeg(tag: u8) -> ImageHandle {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01];
    data.extend([tag; 64]);
    ImageHandle::from_bytes(data, ImageFormat::Jpeg).unwrap()
}

fn orchestrator(
    config: ClientConfig,
    access: &str,
    images: Vec<ImageHandle>,
) -> (Orchestrator, Arc<InMemoryCredentialStore>) {
    let store = Arc::new(InMemoryCredentialStore::with_tokens(access, "r1"));
    let session = SessionClient::new(
        store.clone(),
        Arc::new(ReqwestTransport::new().unwrap()),
        config,
    )
    .unwrap();
    let images = Arc::new(ScriptedImageSource::photos(images));
    (UploadOrchestrator::new(session, images), store)
}

async fn capture_both(orchestrator: &Orchestrator) {
    orchestrator.capture_front(SourceKind::Camera).await.unwrap();
    orchestrator.capture_back(SourceKind::Camera).await.unwrap();
}

#[tokio::test]
async fn refresh_and_retry_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/upload/"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "detail": "Given token not valid for any token type",
            "code": "token_not_valid",
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .and(body_string_contains("\"refresh\":\"r1\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"access": "fresh"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/upload/"))
        .and(header("authorization", "Bearer fresh"))
        .and(BodyHas(b"name=\"card_front_image\""))
        .and(BodyHas(b"name=\"card_back_image\""))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": 42,
            "name": "Charizard",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (orchestrator, store) = orchestrator(
        ClientConfig::new(server.uri()),
        "stale",
        vec![jpeg(1), jpeg(2)],
    );
    capture_both(&orchestrator).await;

    assert_eq!(orchestrator.submit().await.unwrap(), FlowState::Done);
    assert_eq!(store.peek(CredentialKey::AccessToken).await.as_deref(), Some("fresh"));
}

#[tokio::test]
async fn correction_fields_are_sent_as_multipart() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/upload/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "manual",
            "extracted_name": "Pikachu",
            "extracted_number": "25",
            "image_id": 17,
            "card_company": "Pokemon",
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/upload/manual/"))
        .and(header("authorization", "Bearer a1"))
        .and(body_string_contains("25a"))
        .and(body_string_contains("name=\"image_id\""))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 5})))
        .expect(1)
        .mount(&server)
        .await;

    let (orchestrator, _) = orchestrator(ClientConfig::new(server.uri()), "a1", vec![jpeg(1), jpeg(2)]);
    capture_both(&orchestrator).await;

    assert_eq!(orchestrator.submit().await.unwrap(), FlowState::AwaitingCorrection);
    orchestrator
        .edit_field(CorrectionField::Number, "25a")
        .await
        .unwrap();
    assert_eq!(orchestrator.confirm().await.unwrap(), FlowState::Done);
}

#[tokio::test]
async fn file_backed_images_are_read_from_disk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload/"))
        .and(BodyHas(b"filename=\"front.jpg\""))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 3})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = std::env::temp_dir();
    let front = dir.join(format!("cardscan-front-{}.jpg", std::process::id()));
    let back = dir.join(format!("cardscan-back-{}.jpg", std::process::id()));
    std::fs::write(&front, [0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3]).unwrap();
    std::fs::write(&back, [0xFF, 0xD8, 0xFF, 0xE0, 4, 5, 6]).unwrap();

    let (orchestrator, _) = orchestrator(
        ClientConfig::new(server.uri()),
        "a1",
        vec![
            ImageHandle::local_uri(format!("file://{}", front.display())).unwrap(),
            ImageHandle::local_uri(back.display().to_string()).unwrap(),
        ],
    );
    capture_both(&orchestrator).await;
    let state = orchestrator.submit().await.unwrap();

    let _ = std::fs::remove_file(front);
    let _ = std::fs::remove_file(back);
    assert_eq!(state, FlowState::Done);

    let sent = server.received_requests().await.unwrap();
    assert_eq!(sent.len(), 1);
    assert!(BodyHas(&[0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3]).matches(&sent[0]));
    assert!(BodyHas(&[0xFF, 0xD8, 0xFF, 0xE0, 4, 5, 6]).matches(&sent[0]));
}

#[tokio::test]
async fn slow_server_times_out_into_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload/"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(serde_json::json!({"id": 1}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let mut config = ClientConfig::new(server.uri());
    config.upload_timeout_ms = 200;
    let (orchestrator, _) = orchestrator(config, "a1", vec![jpeg(1), jpeg(2)]);
    capture_both(&orchestrator).await;

    assert_eq!(orchestrator.submit().await.unwrap(), FlowState::Failed);
    let error = orchestrator.view().await.error.unwrap();
    assert_eq!(error.error_code, "TIMEOUT");
    assert!(error.is_retryable);
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let (orchestrator, _) = orchestrator(
        ClientConfig::new("http://127.0.0.1:9/"),
        "a1",
        vec![jpeg(1), jpeg(2)],
    );
    capture_both(&orchestrator).await;

    assert_eq!(orchestrator.submit().await.unwrap(), FlowState::Failed);
    assert_eq!(orchestrator.view().await.error.unwrap().error_code, "NETWORK_ERROR");
}

#[tokio::test]
async fn cancelled_picker_never_touches_the_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryCredentialStore::with_tokens("a1", "r1"));
    let session = SessionClient::new(
        store,
        Arc::new(ReqwestTransport::new().unwrap()),
        ClientConfig::new(server.uri()),
    )
    .unwrap();
    let images = Arc::new(ScriptedImageSource::new(vec![Ok(CameraOutput::Cancelled)]));
    let orchestrator = UploadOrchestrator::new(session, images);

    assert_eq!(
        orchestrator.capture_front(SourceKind::Gallery).await.unwrap(),
        FlowState::Empty
    );
    assert!(matches!(
        orchestrator.submit().await,
        Err(CaptureError::Validation(_))
    ));
}
