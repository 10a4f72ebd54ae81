use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::capabilities::ImageHandle;
use crate::error::ValidationError;

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

// Server-assigned handle for an uploaded image pair. Only ever built from a
// verdict, then echoed back on the correction request.
typed_id!(ImageReferenceId);

/// Catalog id of a recognized card.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CardId(pub u64);

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ImageSlot {
    Front,
    Back,
}

impl ImageSlot {
    /// Multipart field name on the upload endpoint.
    pub fn field_name(self) -> &'static str {
        match self {
            ImageSlot::Front => "card_front_image",
            ImageSlot::Back => "card_back_image",
        }
    }

    pub fn stem(self) -> &'static str {
        match self {
            ImageSlot::Front => "front",
            ImageSlot::Back => "back",
        }
    }
}

impl fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}

/// A complete front/back pair. There is no way to build a half-filled one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadRequest {
    front: ImageHandle,
    back: ImageHandle,
}

impl UploadRequest {
    pub fn new(front: Option<ImageHandle>, back: Option<ImageHandle>) -> Result<Self, ValidationError> {
        let front = front.ok_or(ValidationError::MissingImage {
            slot: ImageSlot::Front,
        })?;
        let back = back.ok_or(ValidationError::MissingImage {
            slot: ImageSlot::Back,
        })?;
        Ok(Self { front, back })
    }

    pub fn front(&self) -> &ImageHandle {
        &self.front
    }

    pub fn back(&self) -> &ImageHandle {
        &self.back
    }

    pub fn image(&self, slot: ImageSlot) -> &ImageHandle {
        match slot {
            ImageSlot::Front => &self.front,
            ImageSlot::Back => &self.back,
        }
    }
}

/// What the recognizer managed to read off a card it could not match.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UnrecognizedCard {
    pub extracted_name: String,
    pub extracted_number: String,
    pub image_reference_id: ImageReferenceId,
    pub card_company: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum RecognitionVerdict {
    Recognized { card_id: CardId },
    Unrecognized(UnrecognizedCard),
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionField {
    Name,
    Number,
    CardCompany,
}

impl fmt::Display for CorrectionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CorrectionField::Name => "name",
            CorrectionField::Number => "number",
            CorrectionField::CardCompany => "card company",
        })
    }
}

/// User-edited metadata for an unrecognized card.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ManualCorrection {
    pub name: String,
    pub number: String,
    pub image_reference_id: ImageReferenceId,
    pub card_company: String,
}

impl ManualCorrection {
    pub fn from_seed(seed: &UnrecognizedCard) -> Self {
        Self {
            name: seed.extracted_name.clone(),
            number: seed.extracted_number.clone(),
            image_reference_id: seed.image_reference_id.clone(),
            card_company: seed.card_company.clone(),
        }
    }

    pub fn field(&self, field: CorrectionField) -> &str {
        match field {
            CorrectionField::Name => &self.name,
            CorrectionField::Number => &self.number,
            CorrectionField::CardCompany => &self.card_company,
        }
    }

    pub fn set_field(&mut self, field: CorrectionField, value: impl Into<String>) {
        let value = value.into();
        match field {
            CorrectionField::Name => self.name = value,
            CorrectionField::Number => self.number = value,
            CorrectionField::CardCompany => self.card_company = value,
        }
    }

    /// Name and number must be non-blank; the company may be empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for field in [CorrectionField::Name, CorrectionField::Number] {
            if self.field(field).trim().is_empty() {
                return Err(ValidationError::EmptyField { field });
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CorrectionOutcome {
    /// The server usually answers with the created card; older deployments
    /// reply with a bare acknowledgement.
    Accepted { card_id: Option<CardId> },
    /// `{"status": "manual"}` again: the server still could not match it.
    Rejected,
}

/// Tokens issued by the login endpoint.
#[derive(Clone, Debug)]
pub struct TokenPair {
    pub access: SecretString,
    pub refresh: SecretString,
}
