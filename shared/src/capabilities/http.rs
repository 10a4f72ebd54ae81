use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::camera::ImageHandle;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const MAX_TIMEOUT_MS: u64 = 300_000;

const URL_LIMIT: usize = 2048;
const HEADER_VALUE_LIMIT: usize = 8192;
const JSON_BODY_LIMIT: usize = 1024 * 1024;
const SENSITIVE: [&str; 3] = ["authorization", "cookie", "set-cookie"];
const TRANSPORT_OWNED: [&str; 3] = ["host", "content-length", "transfer-encoding"];

/// An absolute `http(s)` URL with a host and no embedded userinfo.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedUrl(Url);

impl ValidatedUrl {
    pub fn new(raw: impl Into<String>) -> Result<Self, HttpError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(invalid_url(&raw, "empty"));
        }
        if raw.len() > URL_LIMIT {
            return Err(invalid_url(&raw, format!("longer than {URL_LIMIT} bytes")));
        }
        let parsed = Url::parse(raw.trim()).map_err(|e| invalid_url(&raw, e.to_string()))?;
        Self::from_url(&parsed)
    }

    pub fn from_url(url: &Url) -> Result<Self, HttpError> {
        let problem = match url.scheme() {
            "http" | "https" if url.host_str().is_none() => Some("no host"),
            "http" | "https" if !url.username().is_empty() || url.password().is_some() => {
                Some("userinfo is not allowed")
            }
            "http" | "https" => None,
            _ => Some("scheme must be http or https"),
        };
        match problem {
            Some(reason) => Err(invalid_url(url.as_str(), reason)),
            None => Ok(Self(url.clone())),
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }
}

impl fmt::Display for ValidatedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn invalid_url(raw: &str, reason: impl Into<String>) -> HttpError {
    let mut shown: String = raw.chars().take(80).collect();
    if shown.len() < raw.len() {
        shown.push_str("...");
    }
    HttpError::InvalidUrl {
        url: shown,
        reason: reason.into(),
    }
}

/// Ordered header list with case-insensitive lookup. `Debug` never prints
/// bearer tokens or cookies.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct HttpHeaders(Vec<(String, String)>);

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name`, replacing any earlier value under the same name.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), HttpError> {
        let (name, value) = (name.into(), value.into());
        check_header(&name, &value)?;
        self.0.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.0.push((name, value));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn check_header(name: &str, value: &str) -> Result<(), HttpError> {
    let reject = |reason: &str| {
        Err(HttpError::InvalidHeader {
            name: name.chars().take(64).collect(),
            reason: reason.to_string(),
        })
    };
    let token_char = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';

    if name.is_empty() || !name.chars().all(token_char) {
        return reject("name must be a non-empty token");
    }
    if TRANSPORT_OWNED.iter().any(|h| h.eq_ignore_ascii_case(name)) {
        return reject("set by the transport");
    }
    if value.len() > HEADER_VALUE_LIMIT {
        return reject("value too long");
    }
    if value.contains(['\r', '\n', '\0']) {
        return reject("value contains a line break or NUL");
    }
    Ok(())
}

impl fmt::Debug for HttpHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(name, value)| {
                let hidden = SENSITIVE.iter().any(|s| s.eq_ignore_ascii_case(name));
                (name, if hidden { "[REDACTED]" } else { value.as_str() })
            }))
            .finish()
    }
}

/// One part of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        image: ImageHandle,
    },
}

impl FormPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        FormPart::Text {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn file(name: impl Into<String>, file_name: impl Into<String>, image: ImageHandle) -> Self {
        FormPart::File {
            name: name.into(),
            file_name: file_name.into(),
            image,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FormPart::Text { name, .. } | FormPart::File { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Vec<u8>),
    Multipart(Vec<FormPart>),
}

/// A POST to the card backend, as the session layer sees it. Cloning keeps
/// `request_id`, so a retried call logs under the same id as the attempt it
/// replaces.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    url: ValidatedUrl,
    headers: HttpHeaders,
    body: RequestBody,
    timeout: Duration,
    request_id: String,
}

impl HttpRequest {
    pub fn post(url: ValidatedUrl) -> Self {
        Self {
            url,
            headers: HttpHeaders::new(),
            body: RequestBody::Empty,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, HttpError> {
        self.headers.insert(name, value)?;
        Ok(self)
    }

    /// Attaches `Authorization: Bearer <token>`, replacing any previous token.
    pub fn with_bearer(self, token: &str) -> Result<Self, HttpError> {
        self.with_header("Authorization", format!("Bearer {token}"))
    }

    pub fn with_json<T: Serialize>(self, value: &T) -> Result<Self, HttpError> {
        let bytes = serde_json::to_vec(value).map_err(|e| HttpError::InvalidRequest {
            reason: format!("cannot encode JSON body: {e}"),
        })?;
        if bytes.len() > JSON_BODY_LIMIT {
            return Err(HttpError::InvalidRequest {
                reason: format!("JSON body of {} bytes is too large", bytes.len()),
            });
        }
        let mut request = self.with_header("Content-Type", "application/json")?;
        request.body = RequestBody::Json(bytes);
        Ok(request)
    }

    /// The transport sets the multipart content type and boundary itself.
    #[must_use]
    pub fn with_multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, HttpError> {
        if timeout.is_zero() || timeout > Duration::from_millis(MAX_TIMEOUT_MS) {
            return Err(HttpError::InvalidRequest {
                reason: format!("timeout {timeout:?} outside 1ms..={MAX_TIMEOUT_MS}ms"),
            });
        }
        self.timeout = timeout;
        Ok(self)
    }

    pub fn url(&self) -> &ValidatedUrl {
        &self.url
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(MAX_TIMEOUT_MS)
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum HttpError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("cannot reach {host}: {message}")]
    ConnectionError { host: String, message: String },

    #[error("no response within {timeout_ms}ms")]
    Timeout { timeout_ms: u64, request_id: String },

    #[error("unreadable response: {reason}")]
    InvalidResponse { reason: String, request_id: String },
}

impl HttpError {
    /// Failures of the network itself, as opposed to a request we refused to build.
    pub fn is_transport(&self) -> bool {
        !matches!(
            self,
            HttpError::InvalidUrl { .. }
                | HttpError::InvalidHeader { .. }
                | HttpError::InvalidRequest { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, HttpError::Timeout { .. })
    }

    pub fn request_id(&self) -> Option<&str> {
        if let HttpError::Timeout { request_id, .. } | HttpError::InvalidResponse { request_id, .. } =
            self
        {
            Some(request_id)
        } else {
            None
        }
    }
}

/// A completed exchange. Any status counts; interpreting it is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: u16,
    body: Vec<u8>,
    request_id: String,
    duration_ms: u64,
}

impl HttpResponse {
    pub fn new(status: u16, body: Vec<u8>, request_id: String, duration_ms: u64) -> Self {
        Self {
            status,
            body,
            request_id,
            duration_ms,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status / 100 == 2
    }

    pub fn is_client_error(&self) -> bool {
        self.status / 100 == 4
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.body).map_err(|e| HttpError::InvalidResponse {
            reason: format!("{} body is not the expected JSON: {e}", self.status),
            request_id: self.request_id.clone(),
        })
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }
}

pub type HttpResult = Result<HttpResponse, HttpError>;

/// Executes one HTTP exchange. Implementations do not retry and do not
/// interpret status codes; that is the session layer's job.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> HttpResult;
}
