use serde::{Deserialize, Serialize};

use crate::capabilities::SourceKind;
use crate::model::{CorrectionField, ImageSlot};

/// User intents a shell forwards to [`crate::UploadOrchestrator::update`].
///
/// Picker results and network replies are not events; the orchestrator
/// awaits its ports directly and folds their outcome into the flow.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Capture
    CaptureRequested { slot: ImageSlot, source: SourceKind },

    // Upload
    SubmitRequested,

    // Fallback form
    FieldEdited { field: CorrectionField, value: String },
    CorrectionConfirmed,
    CorrectionCancelled,

    ResetRequested,
}

impl Event {
    /// True for events that may reach the network.
    pub fn is_remote(&self) -> bool {
        matches!(self, Event::SubmitRequested | Event::CorrectionConfirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event: Event = serde_json::from_str(
            r#"{"type": "capture_requested", "slot": "back", "source": "gallery"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            Event::CaptureRequested {
                slot: ImageSlot::Back,
                source: SourceKind::Gallery
            }
        );

        let edited = serde_json::to_value(Event::FieldEdited {
            field: CorrectionField::CardCompany,
            value: "Pokemon".into(),
        })
        .unwrap();
        assert_eq!(edited["type"], "field_edited");
        assert_eq!(edited["field"], "card_company");
    }

    #[test]
    fn test_only_submit_and_confirm_are_remote() {
        assert!(Event::SubmitRequested.is_remote());
        assert!(Event::CorrectionConfirmed.is_remote());
        assert!(!Event::ResetRequested.is_remote());
        assert!(!Event::CorrectionCancelled.is_remote());
    }
}
