//! Request builders and response decoders for the card backend.
//!
//! Everything here is pure: it turns domain values into [`HttpRequest`]s and
//! [`HttpResponse`]s back into domain values. Sending, token handling and
//! retries live in [`crate::session`].

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::capabilities::{FormPart, HttpError, HttpRequest, HttpResponse};
use crate::config::{ClientConfig, Endpoint};
use crate::error::CaptureError;
use crate::model::{
    CardId, CorrectionOutcome, ImageReferenceId, ImageSlot, ManualCorrection, RecognitionVerdict,
    TokenPair, UnrecognizedCard, UploadRequest,
};

pub const TOKEN_NOT_VALID: &str = "token_not_valid";
const MANUAL_STATUS: &str = "manual";

// --- Wire types ---

/// Some deployments send ids and card numbers as JSON numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireScalar {
    Number(u64),
    Text(String),
}

impl WireScalar {
    fn into_string(self) -> String {
        match self {
            WireScalar::Number(n) => n.to_string(),
            WireScalar::Text(s) => s,
        }
    }
}

#[derive(Deserialize)]
struct UploadReply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    extracted_name: Option<WireScalar>,
    #[serde(default)]
    extracted_number: Option<WireScalar>,
    #[serde(default)]
    image_id: Option<WireScalar>,
    #[serde(default)]
    card_company: Option<String>,
}

impl UploadReply {
    fn is_manual(&self) -> bool {
        self.status.as_deref() == Some(MANUAL_STATUS)
    }
}

#[derive(Deserialize)]
struct ErrorReply {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct RefreshReply {
    access: String,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginReply {
    access: String,
    refresh: String,
}

// --- Requests ---

pub fn upload_request(config: &ClientConfig, upload: &UploadRequest) -> Result<HttpRequest, HttpError> {
    let parts = [ImageSlot::Front, ImageSlot::Back]
        .into_iter()
        .map(|slot| {
            let image = upload.image(slot);
            FormPart::file(slot.field_name(), image.file_name(slot.stem()), image.clone())
        })
        .collect();

    HttpRequest::post(config.endpoint(Endpoint::Upload)?)
        .with_multipart(parts)
        .with_timeout(config.timeout(Endpoint::Upload))
}

pub fn correction_request(
    config: &ClientConfig,
    correction: &ManualCorrection,
) -> Result<HttpRequest, HttpError> {
    let parts = vec![
        FormPart::text("name", correction.name.trim()),
        FormPart::text("number", correction.number.trim()),
        FormPart::text("image_id", correction.image_reference_id.as_str()),
        FormPart::text("card_company", correction.card_company.trim()),
    ];

    HttpRequest::post(config.endpoint(Endpoint::Correction)?)
        .with_multipart(parts)
        .with_timeout(config.timeout(Endpoint::Correction))
}

pub fn refresh_request(config: &ClientConfig, refresh: &SecretString) -> Result<HttpRequest, HttpError> {
    HttpRequest::post(config.endpoint(Endpoint::TokenRefresh)?)
        .with_json(&RefreshBody {
            refresh: refresh.expose_secret(),
        })?
        .with_timeout(config.timeout(Endpoint::TokenRefresh))
}

pub fn login_request(
    config: &ClientConfig,
    username: &str,
    password: &SecretString,
) -> Result<HttpRequest, HttpError> {
    HttpRequest::post(config.endpoint(Endpoint::Login)?)
        .with_json(&LoginBody {
            username,
            password: password.expose_secret(),
        })?
        .with_timeout(config.timeout(Endpoint::Login))
}

// --- Responses ---

/// A 401 whose error code says the bearer token itself is bad. A 401 with no
/// parseable code is treated the same way.
pub fn is_auth_failure(response: &HttpResponse) -> bool {
    if response.status() != 401 {
        return false;
    }
    match serde_json::from_slice::<ErrorReply>(response.body()) {
        Ok(reply) => reply.code.as_deref().map_or(true, |code| code == TOKEN_NOT_VALID),
        Err(_) => true,
    }
}

/// Maps a non-2xx response that is not an auth failure.
pub fn error_for_status(response: &HttpResponse) -> CaptureError {
    let detail = serde_json::from_slice::<ErrorReply>(response.body())
        .ok()
        .and_then(|reply| reply.detail.or(reply.code));

    if response.status() == 401 {
        return CaptureError::session_expired(
            detail.unwrap_or_else(|| "credentials rejected".to_string()),
        );
    }

    CaptureError::Server {
        status: response.status(),
        message: detail.unwrap_or_else(|| format!("HTTP {}", response.status())),
    }
}

fn decode<T: serde::de::DeserializeOwned>(response: &HttpResponse) -> Result<T, CaptureError> {
    response.json().map_err(|e| match e {
        HttpError::InvalidResponse { reason, .. } => CaptureError::InvalidResponse { reason },
        other => CaptureError::Network(other),
    })
}

fn invalid(reason: &str) -> CaptureError {
    CaptureError::InvalidResponse {
        reason: reason.to_string(),
    }
}

pub fn parse_verdict(response: &HttpResponse) -> Result<RecognitionVerdict, CaptureError> {
    let reply: UploadReply = decode(response)?;

    if reply.is_manual() {
        let image_reference_id = reply
            .image_id
            .map(WireScalar::into_string)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| invalid("manual verdict without image_id"))?;

        return Ok(RecognitionVerdict::Unrecognized(UnrecognizedCard {
            extracted_name: reply.extracted_name.map(WireScalar::into_string).unwrap_or_default(),
            extracted_number: reply
                .extracted_number
                .map(WireScalar::into_string)
                .unwrap_or_default(),
            image_reference_id: ImageReferenceId::new(image_reference_id),
            card_company: reply.card_company.unwrap_or_default(),
        }));
    }

    let id = reply
        .id
        .ok_or_else(|| invalid("recognized card without id"))?;
    Ok(RecognitionVerdict::Recognized { card_id: CardId(id) })
}

pub fn parse_correction(response: &HttpResponse) -> Result<CorrectionOutcome, CaptureError> {
    if response.body().iter().all(u8::is_ascii_whitespace) {
        return Ok(CorrectionOutcome::Accepted { card_id: None });
    }

    let reply: UploadReply = decode(response)?;
    if reply.is_manual() {
        Ok(CorrectionOutcome::Rejected)
    } else {
        Ok(CorrectionOutcome::Accepted {
            card_id: reply.id.map(CardId),
        })
    }
}

pub fn parse_refresh(response: &HttpResponse) -> Result<SecretString, CaptureError> {
    let reply: RefreshReply = decode(response)?;
    if reply.access.trim().is_empty() {
        return Err(invalid("refresh returned an empty access token"));
    }
    Ok(SecretString::new(reply.access))
}

pub fn parse_login(response: &HttpResponse) -> Result<TokenPair, CaptureError> {
    let reply: LoginReply = decode(response)?;
    if reply.access.trim().is_empty() || reply.refresh.trim().is_empty() {
        return Err(invalid("login returned an empty token"));
    }
    Ok(TokenPair {
        access: SecretString::new(reply.access),
        refresh: SecretString::new(reply.refresh),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{ImageHandle, RequestBody};

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse::new(status, body.as_bytes().to_vec(), "req-1".to_string(), 5)
    }

    fn config() -> ClientConfig {
        ClientConfig::new("https://cards.example.com/")
    }

    #[test]
    fn test_recognized_payload_yields_card_id() {
        let verdict =
            parse_verdict(&response(201, r#"{"id": 42, "name": "Charizard", "number": "4"}"#))
                .unwrap();
        assert_eq!(verdict, RecognitionVerdict::Recognized { card_id: CardId(42) });
    }

    #[test]
    fn test_manual_payload_yields_seed_values() {
        let body = r#"{"status": "manual", "extracted_name": "Pikachu",
            "extracted_number": 25, "image_id": "ref_1", "card_company": "Pokemon"}"#;
        let RecognitionVerdict::Unrecognized(seed) = parse_verdict(&response(200, body)).unwrap()
        else {
            panic!("expected unrecognized verdict");
        };
        assert_eq!(seed.extracted_name, "Pikachu");
        assert_eq!(seed.extracted_number, "25");
        assert_eq!(seed.image_reference_id.as_str(), "ref_1");
        assert_eq!(seed.card_company, "Pokemon");
    }

    #[test]
    fn test_numeric_image_id_is_accepted() {
        let body = r#"{"status": "manual", "image_id": 17, "extracted_name": null}"#;
        let RecognitionVerdict::Unrecognized(seed) = parse_verdict(&response(200, body)).unwrap()
        else {
            panic!("expected unrecognized verdict");
        };
        assert_eq!(seed.image_reference_id.as_str(), "17");
        assert_eq!(seed.extracted_name, "");
    }

    #[test]
    fn test_manual_payload_without_image_id_is_invalid() {
        let result = parse_verdict(&response(200, r#"{"status": "manual", "extracted_name": "X"}"#));
        assert!(matches!(result, Err(CaptureError::InvalidResponse { .. })));
    }

    #[test]
    fn test_garbage_body_is_invalid_response() {
        assert!(matches!(
            parse_verdict(&response(200, "<html>")),
            Err(CaptureError::InvalidResponse { .. })
        ));
        assert!(matches!(
            parse_verdict(&response(200, r#"{"name": "no id"}"#)),
            Err(CaptureError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_auth_failure_detection() {
        let stale = response(
            401,
            r#"{"detail": "Given token not valid for any token type", "code": "token_not_valid"}"#,
        );
        assert!(is_auth_failure(&stale));
        assert!(is_auth_failure(&response(401, "")));
        assert!(!is_auth_failure(&response(401, r#"{"code": "user_inactive"}"#)));
        assert!(!is_auth_failure(&response(403, r#"{"code": "token_not_valid"}"#)));
        assert!(!is_auth_failure(&response(500, "")));
    }

    #[test]
    fn test_status_errors_map_to_capture_errors() {
        assert!(matches!(
            error_for_status(&response(401, r#"{"code": "user_inactive", "detail": "inactive"}"#)),
            CaptureError::SessionExpired { .. }
        ));
        assert_eq!(
            error_for_status(&response(500, "")),
            CaptureError::Server {
                status: 500,
                message: "HTTP 500".into()
            }
        );
    }

    #[test]
    fn test_correction_outcomes() {
        assert_eq!(
            parse_correction(&response(200, r#"{"status": "manual"}"#)).unwrap(),
            CorrectionOutcome::Rejected
        );
        assert_eq!(
            parse_correction(&response(201, r#"{"id": 7, "name": "Pikachu"}"#)).unwrap(),
            CorrectionOutcome::Accepted {
                card_id: Some(CardId(7))
            }
        );
        assert_eq!(
            parse_correction(&response(204, "")).unwrap(),
            CorrectionOutcome::Accepted { card_id: None }
        );
    }

    #[test]
    fn test_refresh_and_login_replies() {
        let access = parse_refresh(&response(200, r#"{"access": "new-a"}"#)).unwrap();
        assert_eq!(access.expose_secret(), "new-a");
        assert!(parse_refresh(&response(200, r#"{"access": ""}"#)).is_err());

        let pair = parse_login(&response(200, r#"{"access": "a", "refresh": "r"}"#)).unwrap();
        assert_eq!(pair.refresh.expose_secret(), "r");
        assert!(parse_login(&response(200, r#"{"access": "a"}"#)).is_err());
    }

    #[test]
    fn test_upload_request_carries_both_images() {
        let upload = UploadRequest::new(
            Some(ImageHandle::local_uri("file:///tmp/img_a.jpg").unwrap()),
            Some(ImageHandle::local_uri("file:///tmp/img_b.png").unwrap()),
        )
        .unwrap();
        let request = upload_request(&config(), &upload).unwrap();

        assert_eq!(request.url().as_str(), "https://cards.example.com/api/upload/");
        assert_eq!(request.timeout_ms(), 120_000);
        let RequestBody::Multipart(parts) = request.body() else {
            panic!("expected multipart body");
        };
        let names: Vec<&str> = parts.iter().map(FormPart::name).collect();
        assert_eq!(names, ["card_front_image", "card_back_image"]);
        assert!(matches!(
            &parts[1],
            FormPart::File { file_name, .. } if file_name == "back.png"
        ));
    }

    #[test]
    fn test_correction_request_fields() {
        let correction = ManualCorrection {
            name: " Pikachu ".into(),
            number: "25a".into(),
            image_reference_id: ImageReferenceId::new("ref_1"),
            card_company: "Pokemon".into(),
        };
        let request = correction_request(&config(), &correction).unwrap();
        assert_eq!(request.url().path(), "/api/upload/manual/");
        assert_eq!(
            request.body(),
            &RequestBody::Multipart(vec![
                FormPart::text("name", "Pikachu"),
                FormPart::text("number", "25a"),
                FormPart::text("image_id", "ref_1"),
                FormPart::text("card_company", "Pokemon"),
            ])
        );
    }

    #[test]
    fn test_refresh_request_posts_json() {
        let request = refresh_request(&config(), &SecretString::new("r1".into())).unwrap();
        assert_eq!(request.url().path(), "/api/token/refresh/");
        assert_eq!(request.headers().get("content-type"), Some("application/json"));
        assert_eq!(request.body(), &RequestBody::Json(br#"{"refresh":"r1"}"#.to_vec()));
        assert_eq!(request.timeout_ms(), 30_000);
    }
}
