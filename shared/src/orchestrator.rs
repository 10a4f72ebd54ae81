use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::api;
use crate::capabilities::{CameraOutput, CaptureConfig, CredentialStore, HttpTransport, ImageSource, SourceKind};
use crate::error::CaptureResult;
use crate::event::Event;
use crate::flow::{CaptureFlow, CaptureView, FlowState};
use crate::model::{CorrectionField, CorrectionOutcome, ImageSlot, ManualCorrection, RecognitionVerdict, UploadRequest};
use crate::session::SessionClient;

/// Drives one card through capture, upload and the fallback form.
///
/// The flow lock is taken only to run a transition, never across the image
/// picker or a network call, so `view()` stays responsive and a second
/// `submit()` during an upload is rejected with [`crate::CaptureError::Busy`]
/// instead of queuing.
pub struct UploadOrchestrator<S, T, I> {
    flow: Mutex<CaptureFlow>,
    session: SessionClient<S, T>,
    images: Arc<I>,
    capture_config: CaptureConfig,
}

impl<S, T, I> UploadOrchestrator<S, T, I>
where
    S: CredentialStore,
    T: HttpTransport,
    I: ImageSource,
{
    pub fn new(session: SessionClient<S, T>, images: Arc<I>) -> Self {
        Self {
            flow: Mutex::new(CaptureFlow::new()),
            session,
            images,
            capture_config: CaptureConfig::default(),
        }
    }

    pub fn with_capture_config(mut self, config: CaptureConfig) -> Self {
        self.capture_config = config.clamped();
        self
    }

    pub fn session(&self) -> &SessionClient<S, T> {
        &self.session
    }

    /// Applies one user intent and returns the state it left the flow in.
    /// Each event maps onto the matching method below.
    #[instrument(skip(self), fields(remote = event.is_remote()))]
    pub async fn update(&self, event: Event) -> CaptureResult<FlowState> {
        match event {
            Event::CaptureRequested { slot, source } => self.capture(slot, source).await,
            Event::SubmitRequested => self.submit().await,
            Event::FieldEdited { field, value } => {
                self.edit_field(field, value).await?;
                Ok(self.state().await)
            }
            Event::CorrectionConfirmed => self.confirm().await,
            Event::CorrectionCancelled => self.cancel().await,
            Event::ResetRequested => {
                self.reset().await?;
                Ok(self.state().await)
            }
        }
    }

    pub async fn capture_front(&self, source: SourceKind) -> CaptureResult<FlowState> {
        self.capture(ImageSlot::Front, source).await
    }

    pub async fn capture_back(&self, source: SourceKind) -> CaptureResult<FlowState> {
        self.capture(ImageSlot::Back, source).await
    }

    /// Asks the shell for a photo and stores it in `slot`. A cancelled
    /// picker leaves the flow as it was.
    #[instrument(skip(self))]
    pub async fn capture(&self, slot: ImageSlot, source: SourceKind) -> CaptureResult<FlowState> {
        self.flow.lock().await.ensure_can_capture()?;

        let output = self.images.acquire(source, &self.capture_config).await?;

        let mut flow = self.flow.lock().await;
        match output {
            CameraOutput::Photo(image) => {
                let state = flow.place_image(slot, image)?;
                info!(%state, "image captured");
                Ok(state)
            }
            CameraOutput::Cancelled => {
                info!("capture cancelled");
                Ok(flow.state())
            }
        }
    }

    /// Uploads the captured pair. Returns `Err` only when the flow refused
    /// to start (busy, missing image, wrong state); network and server
    /// failures land in [`FlowState::Failed`] with the error retained.
    #[instrument(skip(self))]
    pub async fn submit(&self) -> CaptureResult<FlowState> {
        let upload = self.flow.lock().await.begin_upload()?;
        info!("uploading card images");

        let outcome = self.send_upload(&upload).await;
        if let Err(e) = &outcome {
            warn!(error = %e, "upload failed");
        }

        let state = self.flow.lock().await.complete_upload(outcome)?;
        info!(%state, "upload finished");
        Ok(state)
    }

    pub async fn edit_field(&self, field: CorrectionField, value: impl Into<String>) -> CaptureResult<()> {
        self.flow.lock().await.edit_field(field, value)
    }

    /// Sends the corrected metadata. Blank name/number is rejected without
    /// touching the network.
    #[instrument(skip(self))]
    pub async fn confirm(&self) -> CaptureResult<FlowState> {
        let correction = self.flow.lock().await.begin_correction()?;
        info!(image_id = %correction.image_reference_id, "submitting correction");

        let outcome = self.send_correction(&correction).await;
        match &outcome {
            Ok(CorrectionOutcome::Rejected) => warn!("correction not matched"),
            Err(e) => warn!(error = %e, "correction failed"),
            Ok(CorrectionOutcome::Accepted { .. }) => {}
        }

        let state = self.flow.lock().await.complete_correction(outcome)?;
        info!(%state, "correction finished");
        Ok(state)
    }

    pub async fn cancel(&self) -> CaptureResult<FlowState> {
        self.flow.lock().await.cancel_correction()
    }

    pub async fn reset(&self) -> CaptureResult<()> {
        self.flow.lock().await.reset()
    }

    pub async fn state(&self) -> FlowState {
        self.flow.lock().await.state()
    }

    pub async fn view(&self) -> CaptureView {
        self.flow.lock().await.view()
    }

    async fn send_upload(&self, upload: &UploadRequest) -> CaptureResult<RecognitionVerdict> {
        let request = api::upload_request(self.session.config(), upload)?;
        let response = self.session.call(request).await?;
        api::parse_verdict(&response)
    }

    async fn send_correction(&self, correction: &ManualCorrection) -> CaptureResult<CorrectionOutcome> {
        let request = api::correction_request(self.session.config(), correction)?;
        let response = self.session.call(request).await?;
        api::parse_correction(&response)
    }
}
