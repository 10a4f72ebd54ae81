use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::api;
use crate::capabilities::{CredentialKey, CredentialStore, HttpError, HttpRequest, HttpResponse, HttpTransport};
use crate::config::{ClientConfig, ConfigError};
use crate::error::{CaptureError, CaptureResult};

/// Authenticated access to the card backend.
///
/// Every outbound call goes through [`SessionClient::call`], which attaches the
/// stored access token and recovers from a rejected token by refreshing it
/// once. The refreshed token is written to the store before the request is
/// re-issued, and the retry reads it back from there.
pub struct SessionClient<S, T> {
    store: Arc<S>,
    transport: Arc<T>,
    config: ClientConfig,
}

impl<S, T> SessionClient<S, T>
where
    S: CredentialStore,
    T: HttpTransport,
{
    pub fn new(store: Arc<S>, transport: Arc<T>, config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            transport,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends `request` with the current access token. On [`CaptureError::AuthFailure`]
    /// refreshes once and re-sends the same request; a second rejection is
    /// reported as [`CaptureError::SessionExpired`].
    #[instrument(
        skip(self, request),
        fields(request_id = %request.request_id(), path = request.url().path())
    )]
    pub async fn call(&self, request: HttpRequest) -> CaptureResult<HttpResponse> {
        match self.send_authorized(request.clone()).await {
            Err(CaptureError::AuthFailure) => {}
            other => return other,
        }

        info!("access token rejected, refreshing");
        self.refresh().await?;

        match self.send_authorized(request).await {
            Err(CaptureError::AuthFailure) => {
                warn!("access token rejected again after refresh");
                Err(CaptureError::session_expired(
                    "access token rejected after refresh",
                ))
            }
            other => other,
        }
    }

    /// Exchanges the stored refresh token for a new access token and stores it.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> CaptureResult<()> {
        let refresh = self
            .store
            .get(CredentialKey::RefreshToken)
            .await?
            .ok_or_else(|| CaptureError::session_expired("no refresh token stored"))?;

        let request = api::refresh_request(&self.config, &refresh)?;
        let response = self.execute(request).await?;

        if response.is_client_error() {
            warn!(status = response.status(), "refresh token rejected");
            return Err(CaptureError::session_expired(format!(
                "refresh rejected with status {}",
                response.status()
            )));
        }
        if !response.is_success() {
            return Err(api::error_for_status(&response));
        }

        let access = api::parse_refresh(&response)?;
        self.store.set(CredentialKey::AccessToken, access).await?;
        info!("access token refreshed");
        Ok(())
    }

    /// Obtains and stores a fresh token pair.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &SecretString) -> CaptureResult<()> {
        let request = api::login_request(&self.config, username, password)?;
        let response = self.execute(request).await?;

        if matches!(response.status(), 400 | 401) {
            warn!(status = response.status(), "login rejected");
            return Err(CaptureError::InvalidCredentials);
        }
        if !response.is_success() {
            return Err(api::error_for_status(&response));
        }

        let tokens = api::parse_login(&response)?;
        self.store.set(CredentialKey::AccessToken, tokens.access).await?;
        self.store.set(CredentialKey::RefreshToken, tokens.refresh).await?;
        info!("logged in");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn logout(&self) -> CaptureResult<()> {
        for key in CredentialKey::ALL {
            self.store.remove(key).await?;
        }
        info!("logged out");
        Ok(())
    }

    pub async fn has_session(&self) -> CaptureResult<bool> {
        Ok(self.store.get(CredentialKey::AccessToken).await?.is_some())
    }

    async fn send_authorized(&self, request: HttpRequest) -> CaptureResult<HttpResponse> {
        let token = self
            .store
            .get(CredentialKey::AccessToken)
            .await?
            .ok_or_else(|| CaptureError::session_expired("no access token stored"))?;

        let request = request.with_bearer(token.expose_secret())?;
        let response = self.execute(request).await?;

        if api::is_auth_failure(&response) {
            return Err(CaptureError::AuthFailure);
        }
        if !response.is_success() {
            return Err(api::error_for_status(&response));
        }
        Ok(response)
    }

    async fn execute(&self, request: HttpRequest) -> CaptureResult<HttpResponse> {
        let timeout = request.timeout();
        let timeout_ms = request.timeout_ms();
        let request_id = request.request_id().to_string();

        match tokio::time::timeout(timeout, self.transport.execute(request)).await {
            Ok(Ok(response)) => {
                debug!(status = response.status(), duration_ms = response.duration_ms(), "response");
                Ok(response)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "request failed");
                Err(e.into())
            }
            Err(_) => {
                warn!(timeout_ms, "request timed out");
                Err(HttpError::Timeout {
                    timeout_ms,
                    request_id,
                }
                .into())
            }
        }
    }
}
