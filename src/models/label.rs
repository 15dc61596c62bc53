use garde::Validate;
use serde::{Deserialize, Serialize};

/// Fields extracted from a label image by the vision-model OCR backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ExtractedLabelFields {
    #[garde(length(max = 200))]
    pub brand_name: String,

    #[garde(length(max = 200))]
    pub class_type: String,

    #[garde(range(min = 0.0, max = 100.0))]
    pub abv: f64,

    #[garde(length(max = 100))]
    pub net_contents: String,

    #[garde(skip)]
    pub country_of_origin: Option<String>,

    #[garde(skip)]
    pub government_warning: Option<String>,
}

/// Expected label fields supplied by the submitter. All optional; an image
/// with no ground truth still gets structural validation.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GroundTruth {
    #[garde(length(min = 1, max = 200))]
    pub brand_name: Option<String>,

    #[garde(length(min = 1, max = 200))]
    pub class_type: Option<String>,

    #[garde(range(min = 0.0, max = 100.0))]
    pub abv: Option<f64>,

    #[garde(length(min = 1, max = 100))]
    pub net_contents: Option<String>,
}

impl GroundTruth {
    pub fn is_empty(&self) -> bool {
        self.brand_name.is_none()
            && self.class_type.is_none()
            && self.abv.is_none()
            && self.net_contents.is_none()
    }
}

/// Overall compliance verdict for one label.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
    PartialValidation,
}

/// Which validation tiers ran: structural only, or structural + accuracy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationLevel {
    StructuralOnly,
    FullValidation,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationTier {
    Structural,
    Accuracy,
}

/// One rule the label violates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    #[serde(rename = "type")]
    pub tier: ValidationTier,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

/// Full verification result for one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub status: ComplianceStatus,
    pub validation_level: ValidationLevel,
    pub extracted_fields: ExtractedLabelFields,
    pub violations: Vec<Violation>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
    pub processing_time_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}
