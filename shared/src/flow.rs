//! The capture/upload/correction state machine.
//!
//! [`CaptureFlow`] holds no I/O. Each network round trip is split into a
//! `begin_*` transition that hands out the request payload and a
//! `complete_*` transition that consumes the outcome, so the async driver can
//! release its lock while the request is in flight.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::capabilities::ImageHandle;
use crate::error::{CaptureError, CaptureResult, UserFacingError};
use crate::model::{
    CardId, CorrectionField, CorrectionOutcome, ManualCorrection, RecognitionVerdict, ImageSlot,
    UploadRequest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    #[default]
    Empty,
    FrontCaptured,
    BackCaptured,
    BothCaptured,
    Uploading,
    AwaitingCorrection,
    Submitting,
    Done,
    Failed,
    Abandoned,
}

impl FlowState {
    pub fn is_in_flight(self) -> bool {
        matches!(self, FlowState::Uploading | FlowState::Submitting)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FlowState::Done | FlowState::Abandoned)
    }

    fn accepts_images(self) -> bool {
        matches!(
            self,
            FlowState::Empty
                | FlowState::FrontCaptured
                | FlowState::BackCaptured
                | FlowState::BothCaptured
                | FlowState::Failed
        )
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlowState::Empty => "empty",
            FlowState::FrontCaptured => "front captured",
            FlowState::BackCaptured => "back captured",
            FlowState::BothCaptured => "both captured",
            FlowState::Uploading => "uploading",
            FlowState::AwaitingCorrection => "awaiting correction",
            FlowState::Submitting => "submitting",
            FlowState::Done => "done",
            FlowState::Failed => "failed",
            FlowState::Abandoned => "abandoned",
        })
    }
}

/// How a finished flow got to `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "via")]
pub enum Completion {
    Recognized { card_id: CardId },
    Corrected { card_id: Option<CardId> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionForm {
    pub name: String,
    pub number: String,
    pub card_company: String,
    pub editable: bool,
}

/// Snapshot for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureView {
    pub state: FlowState,
    pub front_captured: bool,
    pub back_captured: bool,
    pub can_submit: bool,
    pub is_busy: bool,
    pub form: Option<CorrectionForm>,
    pub completion: Option<Completion>,
    pub error: Option<UserFacingError>,
}

#[derive(Debug, Clone, Default)]
pub struct CaptureFlow {
    state: FlowState,
    front: Option<ImageHandle>,
    back: Option<ImageHandle>,
    correction: Option<ManualCorrection>,
    completion: Option<Completion>,
    last_error: Option<CaptureError>,
}

impl CaptureFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn image(&self, slot: ImageSlot) -> Option<&ImageHandle> {
        match slot {
            ImageSlot::Front => self.front.as_ref(),
            ImageSlot::Back => self.back.as_ref(),
        }
    }

    /// The fallback form's current values, present only while it is shown.
    pub fn correction(&self) -> Option<&ManualCorrection> {
        self.correction.as_ref()
    }

    pub fn completion(&self) -> Option<Completion> {
        self.completion
    }

    pub fn last_error(&self) -> Option<&CaptureError> {
        self.last_error.as_ref()
    }

    fn reject(&self, action: &str) -> CaptureError {
        if self.state.is_in_flight() {
            CaptureError::Busy
        } else {
            CaptureError::invalid_state(self.state, action)
        }
    }

    /// Checked before asking the shell for a photo, so a picker is never
    /// opened for an image that could not be stored.
    pub fn ensure_can_capture(&self) -> CaptureResult<()> {
        if self.state.accepts_images() {
            Ok(())
        } else {
            Err(self.reject("capture an image"))
        }
    }

    /// Fills or replaces one side. Leaves `Failed` for the matching captured
    /// state, dropping the stale error.
    pub fn place_image(&mut self, slot: ImageSlot, image: ImageHandle) -> CaptureResult<FlowState> {
        self.ensure_can_capture()?;

        match slot {
            ImageSlot::Front => self.front = Some(image),
            ImageSlot::Back => self.back = Some(image),
        }
        self.state = match (&self.front, &self.back) {
            (Some(_), Some(_)) => FlowState::BothCaptured,
            (Some(_), None) => FlowState::FrontCaptured,
            (None, Some(_)) => FlowState::BackCaptured,
            (None, None) => FlowState::Empty,
        };
        self.last_error = None;
        Ok(self.state)
    }

    /// Moves to `Uploading` and returns the pair to send. Allowed from
    /// `BothCaptured`, or from `Failed` to retry the same pair.
    pub fn begin_upload(&mut self) -> CaptureResult<UploadRequest> {
        match self.state {
            FlowState::Empty
            | FlowState::FrontCaptured
            | FlowState::BackCaptured
            | FlowState::BothCaptured
            | FlowState::Failed => {}
            _ => return Err(self.reject("submit")),
        }

        let request = UploadRequest::new(self.front.clone(), self.back.clone())?;
        self.state = FlowState::Uploading;
        self.last_error = None;
        Ok(request)
    }

    pub fn complete_upload(
        &mut self,
        outcome: CaptureResult<RecognitionVerdict>,
    ) -> CaptureResult<FlowState> {
        if self.state != FlowState::Uploading {
            return Err(CaptureError::invalid_state(self.state, "finish an upload"));
        }

        self.state = match outcome {
            Ok(RecognitionVerdict::Recognized { card_id }) => {
                self.completion = Some(Completion::Recognized { card_id });
                FlowState::Done
            }
            Ok(RecognitionVerdict::Unrecognized(seed)) => {
                self.correction = Some(ManualCorrection::from_seed(&seed));
                FlowState::AwaitingCorrection
            }
            Err(error) => {
                self.last_error = Some(error);
                FlowState::Failed
            }
        };
        Ok(self.state)
    }

    pub fn edit_field(&mut self, field: CorrectionField, value: impl Into<String>) -> CaptureResult<()> {
        if self.state != FlowState::AwaitingCorrection {
            return Err(self.reject("edit the correction form"));
        }
        match self.correction.as_mut() {
            Some(correction) => {
                correction.set_field(field, value);
                Ok(())
            }
            None => Err(CaptureError::invalid_state(self.state, "edit the correction form")),
        }
    }

    /// Validates the form and moves to `Submitting`. A blank name or number
    /// is rejected with no state change.
    pub fn begin_correction(&mut self) -> CaptureResult<ManualCorrection> {
        let correction = match (self.state, self.correction.as_ref()) {
            (FlowState::AwaitingCorrection, Some(correction)) => correction.clone(),
            _ => return Err(self.reject("confirm the correction")),
        };

        correction.validate()?;
        self.state = FlowState::Submitting;
        self.last_error = None;
        Ok(correction)
    }

    /// Failures return to the form with the user's edits intact and the
    /// error retained for display.
    pub fn complete_correction(
        &mut self,
        outcome: CaptureResult<CorrectionOutcome>,
    ) -> CaptureResult<FlowState> {
        if self.state != FlowState::Submitting {
            return Err(CaptureError::invalid_state(self.state, "finish a correction"));
        }

        self.state = match outcome {
            Ok(CorrectionOutcome::Accepted { card_id }) => {
                self.correction = None;
                self.completion = Some(Completion::Corrected { card_id });
                FlowState::Done
            }
            Ok(CorrectionOutcome::Rejected) => {
                self.last_error = Some(CaptureError::ServerRejection);
                FlowState::AwaitingCorrection
            }
            Err(error) => {
                self.last_error = Some(error);
                FlowState::AwaitingCorrection
            }
        };
        Ok(self.state)
    }

    pub fn cancel_correction(&mut self) -> CaptureResult<FlowState> {
        if self.state != FlowState::AwaitingCorrection {
            return Err(self.reject("cancel the correction"));
        }
        self.correction = None;
        self.last_error = None;
        self.state = FlowState::Abandoned;
        Ok(self.state)
    }

    /// Starts over with a new card. Not allowed while a request is in flight.
    pub fn reset(&mut self) -> CaptureResult<()> {
        if self.state.is_in_flight() {
            return Err(CaptureError::Busy);
        }
        *self = Self::default();
        Ok(())
    }

    pub fn view(&self) -> CaptureView {
        let form = match self.state {
            FlowState::AwaitingCorrection | FlowState::Submitting => {
                self.correction.as_ref().map(|c| CorrectionForm {
                    name: c.name.clone(),
                    number: c.number.clone(),
                    card_company: c.card_company.clone(),
                    editable: self.state == FlowState::AwaitingCorrection,
                })
            }
            _ => None,
        };

        CaptureView {
            state: self.state,
            front_captured: self.front.is_some(),
            back_captured: self.back.is_some(),
            can_submit: matches!(self.state, FlowState::BothCaptured | FlowState::Failed)
                && self.front.is_some()
                && self.back.is_some(),
            is_busy: self.state.is_in_flight(),
            form,
            completion: self.completion,
            error: self.last_error.as_ref().map(UserFacingError::from),
        }
    }
}
