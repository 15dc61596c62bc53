use std::time::Duration;
use strsim::jaro_winkler;

use crate::models::label::{
    ComplianceStatus, ExtractedLabelFields, GroundTruth, ValidationLevel, ValidationTier,
    VerifyOutcome, Violation,
};

/// Threshold for fuzzy string matching (0.0 - 1.0).
const MATCH_THRESHOLD: f64 = 0.85;

/// TTB-mandated ABV tolerance: ±0.3 percentage points per 27 CFR.
const ABV_TOLERANCE: f64 = 0.3;

/// Evaluate extracted label fields in two tiers.
///
/// Tier 1 (structural) always runs: mandatory fields must be present and
/// well-formed. Tier 2 (accuracy) runs only when ground truth is provided
/// and fuzzy-matches extracted values against the expected ones.
pub fn evaluate(
    extracted: &ExtractedLabelFields,
    ground_truth: Option<&GroundTruth>,
    processing_time: Duration,
    image_path: Option<String>,
) -> VerifyOutcome {
    let mut violations = structural_violations(extracted);
    let mut warnings = Vec::new();

    let validation_level = match ground_truth {
        Some(gt) if !gt.is_empty() => {
            violations.extend(accuracy_violations(extracted, gt));
            ValidationLevel::FullValidation
        }
        _ => {
            warnings.push(
                "No ground truth provided - only structural validation performed. \
                 Provide ground truth data to enable full accuracy validation."
                    .to_string(),
            );
            ValidationLevel::StructuralOnly
        }
    };

    let status = determine_status(&violations, validation_level);

    VerifyOutcome {
        status,
        validation_level,
        extracted_fields: extracted.clone(),
        violations,
        warnings,
        processing_time_seconds: processing_time.as_secs_f64(),
        image_path,
    }
}

fn determine_status(violations: &[Violation], level: ValidationLevel) -> ComplianceStatus {
    if violations.is_empty() {
        return ComplianceStatus::Compliant;
    }
    if level == ValidationLevel::FullValidation {
        return ComplianceStatus::NonCompliant;
    }
    // Without ground truth, structural violations are conclusive; anything
    // else only shows the label could not be fully checked.
    let has_structural = violations
        .iter()
        .any(|v| v.tier == ValidationTier::Structural);
    if has_structural {
        ComplianceStatus::NonCompliant
    } else {
        ComplianceStatus::PartialValidation
    }
}

/// Tier 1: presence and basic format of mandatory label fields (27 CFR).
fn structural_violations(extracted: &ExtractedLabelFields) -> Vec<Violation> {
    let mut violations = Vec::new();

    if extracted.brand_name.trim().is_empty() {
        require(&mut violations, "brand_name", "Brand name is required on the label");
    }
    if extracted.class_type.trim().is_empty() {
        require(
            &mut violations,
            "class_type",
            "Class/type designation is required on the label",
        );
    }
    if extracted
        .government_warning
        .as_deref()
        .map(str::trim)
        .unwrap_or("")
        .is_empty()
    {
        require(
            &mut violations,
            "government_warning",
            "Government warning statement is required on the label",
        );
    }

    if extracted.abv <= 0.0 {
        violations.push(Violation {
            field: "abv".to_string(),
            tier: ValidationTier::Structural,
            message: "Alcohol content statement is required (> 0%)".to_string(),
            expected: Some("> 0%".to_string()),
            actual: Some(format!("{:.1}%", extracted.abv)),
        });
    }

    if extracted.net_contents.trim().is_empty() {
        require(
            &mut violations,
            "net_contents",
            "Net contents statement is required on the label",
        );
    } else if !net_contents_is_plausible(&extracted.net_contents) {
        violations.push(Violation {
            field: "net_contents".to_string(),
            tier: ValidationTier::Structural,
            message: "Net contents must state a volume with a unit".to_string(),
            expected: Some("volume with unit (e.g. 750 mL)".to_string()),
            actual: Some(extracted.net_contents.clone()),
        });
    }

    violations
}

fn require(violations: &mut Vec<Violation>, field: &str, message: &str) {
    violations.push(Violation {
        field: field.to_string(),
        tier: ValidationTier::Structural,
        message: message.to_string(),
        expected: Some("present".to_string()),
        actual: None,
    });
}

/// A digit plus a recognizable volume unit is enough for the structural tier.
fn net_contents_is_plausible(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    let has_digit = lower.chars().any(|c| c.is_ascii_digit());
    let has_unit = ["ml", "l", "liter", "litre", "oz", "gal"]
        .iter()
        .any(|unit| lower.contains(unit));
    has_digit && has_unit
}

/// Tier 2: fuzzy-match extracted values against the supplied ground truth.
fn accuracy_violations(extracted: &ExtractedLabelFields, gt: &GroundTruth) -> Vec<Violation> {
    let mut violations = Vec::new();

    if let Some(expected) = gt.brand_name.as_deref() {
        check_text(&mut violations, "brand_name", expected, &extracted.brand_name);
    }
    if let Some(expected) = gt.class_type.as_deref() {
        check_text(&mut violations, "class_type", expected, &extracted.class_type);
    }
    if let Some(expected) = gt.net_contents.as_deref() {
        if normalize(expected) != normalize(&extracted.net_contents) {
            check_text(
                &mut violations,
                "net_contents",
                expected,
                &extracted.net_contents,
            );
        }
    }

    if let Some(expected_abv) = gt.abv {
        let diff = (extracted.abv - expected_abv).abs();
        if diff > ABV_TOLERANCE {
            violations.push(Violation {
                field: "abv".to_string(),
                tier: ValidationTier::Accuracy,
                message: format!(
                    "ABV differs from expected value by {diff:.1} points (tolerance ±{ABV_TOLERANCE})"
                ),
                expected: Some(format!("{expected_abv:.1}%")),
                actual: Some(format!("{:.1}%", extracted.abv)),
            });
        }
    }

    violations
}

fn check_text(violations: &mut Vec<Violation>, field: &str, expected: &str, actual: &str) {
    let score = jaro_winkler(&actual.to_lowercase(), &expected.to_lowercase());
    if score < MATCH_THRESHOLD {
        violations.push(Violation {
            field: field.to_string(),
            tier: ValidationTier::Accuracy,
            message: format!("Extracted value does not match expected (similarity {score:.2})"),
            expected: Some(expected.to_string()),
            actual: Some(actual.to_string()),
        });
    }
}

fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}
