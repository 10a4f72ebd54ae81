//! Scripted doubles for the capability ports.
//!
//! Used by the crate's own tests and by shells that want to preview the
//! capture flow without a backend or a camera.

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::capabilities::{
    CameraError, CameraOutput, CameraResult, CaptureConfig, CredentialKey, CredentialStore,
    HttpError, HttpRequest, HttpResponse, HttpResult, HttpTransport, ImageHandle,
    ImageSource, InMemoryCredentialStore, KvError, SourceKind,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared, ordered record of side effects across doubles.
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        lock(&self.entries).push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.entries).clone()
    }
}

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Respond { status: u16, body: String },
    Fail(HttpError),
    /// Never completes; exercises caller-side timeouts.
    Hang,
    Delayed {
        after: Duration,
        reply: Box<ScriptedReply>,
    },
}

impl ScriptedReply {
    pub fn json(status: u16, body: Value) -> Self {
        Self::Respond {
            status,
            body: body.to_string(),
        }
    }

    /// The backend's answer to an expired or malformed bearer token.
    pub fn auth_failure() -> Self {
        Self::json(
            401,
            serde_json::json!({
                "detail": "Given token not valid for any token type",
                "code": "token_not_valid",
            }),
        )
    }

    pub fn delayed(after: Duration, reply: ScriptedReply) -> Self {
        Self::Delayed {
            after,
            reply: Box::new(reply),
        }
    }
}

/// Replays a fixed list of replies in order and records every request.
/// Running past the end of the script is a connection error.
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<HttpRequest>>,
    journal: Option<Journal>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> HttpResult {
        if let Some(journal) = &self.journal {
            journal.record(format!("POST {}", request.url().path()));
        }
        let request_id = request.request_id().to_string();
        let host = request.url().host().to_string();
        lock(&self.requests).push(request);

        let mut reply = lock(&self.replies).pop_front();
        loop {
            return match reply {
                Some(ScriptedReply::Respond { status, body }) => Ok(HttpResponse::new(
                    status,
                    body.into_bytes(),
                    request_id,
                    1,
                )),
                Some(ScriptedReply::Fail(error)) => Err(error),
                Some(ScriptedReply::Hang) => std::future::pending().await,
                Some(ScriptedReply::Delayed { after, reply: next }) => {
                    tokio::time::sleep(after).await;
                    reply = Some(*next);
                    continue;
                }
                None => Err(HttpError::ConnectionError {
                    host,
                    message: "no scripted reply left".to_string(),
                }),
            };
        }
    }
}

/// Hands out queued picker results and records which source was asked for.
pub struct ScriptedImageSource {
    results: Mutex<VecDeque<CameraResult>>,
    sources: Mutex<Vec<SourceKind>>,
}

impl ScriptedImageSource {
    pub fn new(results: impl IntoIterator<Item = CameraResult>) -> Self {
        Self {
            results: Mutex::new(results.into_iter().collect()),
            sources: Mutex::new(Vec::new()),
        }
    }

    /// One photo per handle, in order.
    pub fn photos(images: impl IntoIterator<Item = ImageHandle>) -> Self {
        Self::new(images.into_iter().map(|image| Ok(CameraOutput::Photo(image))))
    }

    pub fn sources(&self) -> Vec<SourceKind> {
        lock(&self.sources).clone()
    }
}

#[async_trait]
impl ImageSource for ScriptedImageSource {
    async fn acquire(&self, source: SourceKind, _config: &CaptureConfig) -> CameraResult {
        lock(&self.sources).push(source);
        lock(&self.results)
            .pop_front()
            .unwrap_or_else(|| {
                Err(CameraError::Unavailable {
                    reason: "no scripted image left".to_string(),
                })
            })
    }
}

/// Credential store that journals writes, to observe ordering against requests.
pub struct JournaledStore {
    inner: InMemoryCredentialStore,
    journal: Journal,
}

impl JournaledStore {
    pub fn new(inner: InMemoryCredentialStore, journal: Journal) -> Self {
        Self { inner, journal }
    }

    pub async fn peek(&self, key: CredentialKey) -> Option<String> {
        self.inner.peek(key).await
    }
}

#[async_trait]
impl CredentialStore for JournaledStore {
    async fn get(&self, key: CredentialKey) -> Result<Option<SecretString>, KvError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: CredentialKey, value: SecretString) -> Result<(), KvError> {
        self.inner.set(key, value).await?;
        self.journal.record(format!("set {key}"));
        Ok(())
    }

    async fn remove(&self, key: CredentialKey) -> Result<(), KvError> {
        self.inner.remove(key).await?;
        self.journal.record(format!("remove {key}"));
        Ok(())
    }
}

/// A file-backed handle that only scripted transports can "send".
pub fn sample_image(name: &str) -> ImageHandle {
    ImageHandle::LocalUri(format!("file:///tmp/{name}.jpg"))
}
