#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

//! Card capture and upload core.
//!
//! Shells provide three ports ([`CredentialStore`], [`ImageSource`],
//! [`HttpTransport`]) and feed [`Event`]s to an [`UploadOrchestrator`]; everything else,
//! including the one-shot token refresh, lives here.

pub mod api;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod event;
pub mod flow;
pub mod model;
pub mod orchestrator;
pub mod session;
pub mod testing;

pub use capabilities::{
    CameraError, CameraOutput, CaptureConfig, CredentialKey, CredentialStore, HttpError,
    HttpTransport, ImageHandle, ImageSource, InMemoryCredentialStore, KvError, ReqwestTransport,
    SourceKind,
};
pub use config::{ClientConfig, ConfigError, Endpoint};
pub use error::{CaptureError, CaptureResult, ErrorKind, ErrorSeverity, UserFacingError, ValidationError};
pub use event::Event;
pub use flow::{CaptureFlow, CaptureView, Completion, CorrectionForm, FlowState};
pub use model::{
    CardId, CorrectionField, CorrectionOutcome, ImageReferenceId, ImageSlot, ManualCorrection,
    RecognitionVerdict, TokenPair, UnrecognizedCard, UploadRequest,
};
pub use orchestrator::UploadOrchestrator;
pub use session::SessionClient;
