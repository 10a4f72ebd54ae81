use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

use super::http::{
    FormPart, HttpError, HttpRequest, HttpResponse, HttpResult, HttpTransport, RequestBody,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// [`HttpTransport`] backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| HttpError::InvalidRequest {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn multipart_form(parts: Vec<FormPart>) -> Result<Form, HttpError> {
        let mut form = Form::new();
        for part in parts {
            form = match part {
                FormPart::Text { name, value } => form.text(name, value),
                FormPart::File {
                    name,
                    file_name,
                    image,
                } => {
                    let data = image.contents().await.map_err(|e| HttpError::InvalidRequest {
                        reason: format!("cannot attach '{name}': {e}"),
                    })?;
                    let file = Part::bytes(data)
                        .file_name(file_name)
                        .mime_str(image.mime_type())
                        .map_err(|e| HttpError::InvalidRequest {
                            reason: format!("invalid mime type for '{name}': {e}"),
                        })?;
                    form.part(name, file)
                }
            };
        }
        Ok(form)
    }

    fn map_send_error(error: &reqwest::Error, request: &HttpRequest) -> HttpError {
        if error.is_timeout() {
            HttpError::Timeout {
                timeout_ms: request.timeout_ms(),
                request_id: request.request_id().to_string(),
            }
        } else {
            HttpError::ConnectionError {
                host: request.url().host().to_string(),
                message: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[instrument(
        skip(self, request),
        fields(request_id = %request.request_id(), path = request.url().path())
    )]
    async fn execute(&self, request: HttpRequest) -> HttpResult {
        let mut builder = self
            .client
            .post(request.url().as_str())
            .timeout(request.timeout());

        for (name, value) in request.headers().iter() {
            builder = builder.header(name, value);
        }

        builder = match request.body().clone() {
            RequestBody::Empty => builder,
            RequestBody::Json(bytes) => builder.body(bytes),
            RequestBody::Multipart(parts) => builder.multipart(Self::multipart_form(parts).await?),
        };

        let started = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_send_error(&e, &request))?;

        let status = response.status().as_u16();

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::map_send_error(&e, &request))?;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        debug!(status, duration_ms, bytes = body.len(), "response received");

        Ok(HttpResponse::new(
            status,
            body.to_vec(),
            request.request_id().to_string(),
            duration_ms,
        ))
    }
}
