use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

pub const UNKNOWN_DISEASE: &str = "Unknown condition";
pub const UNKNOWN_DISEASE_ML: &str = "അജ്ഞാത അവസ്ഥ";
pub const DEFAULT_TREATMENT: &str = "Consult local agricultural extension officer";
pub const DEFAULT_TREATMENT_ML: &str = "പ്രാദേശിക കൃഷി വിപുലീകരണ ഉദ്യോഗസ്ഥനെ സമീപിക്കുക";

const FAILED_DISEASE: &str = "Analysis Failed";
const FAILED_DISEASE_ML: &str = "വിശകലനം പരാജയപ്പെട്ടു";
const FAILED_TREATMENT: &str =
    "Please try again with a clearer photo, or consult your local agricultural extension officer.";
const FAILED_TREATMENT_ML: &str = "വ്യക്തമായ ഫോട്ടോ ഉപയോഗിച്ച് വീണ്ടും ശ്രമിക്കുക, അല്ലെങ്കിൽ പ്രാദേശിക കൃഷി ഓഫീസറെ സമീപിക്കുക.";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Mild,
    #[default]
    Moderate,
    Severe,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    /// Allowed values joined with `|`, as written into the model instructions.
    pub fn choices() -> String {
        joined_choices::<Self>()
    }
}

impl Urgency {
    pub fn choices() -> String {
        joined_choices::<Self>()
    }
}

fn joined_choices<E>() -> String
where
    E: IntoEnumIterator + Into<&'static str>,
{
    E::iter().map(Into::into).collect::<Vec<&str>>().join("|")
}

/// A bilingual diagnosis. Every value of this type is schema-valid: build it from
/// untrusted model output only through [`DetectionResult::sanitize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub disease: String,
    pub malayalam_label: String,
    pub confidence: u8,
    pub severity: Severity,
    pub treatment: String,
    pub malayalam_treatment: String,
    pub prevention_tips: Vec<String>,
    pub urgency: Urgency,
}

impl DetectionResult {
    /// Validates each field of an upstream object on its own and falls back to the
    /// documented default for anything missing or malformed. Extra fields are dropped.
    /// Total over every JSON value, including non-objects.
    pub fn sanitize(raw: &Value) -> Self {
        Self {
            disease: sanitize_text(raw, &["disease"], UNKNOWN_DISEASE),
            malayalam_label: sanitize_text(
                raw,
                &["malayalamLabel", "malayalam"],
                UNKNOWN_DISEASE_ML,
            ),
            confidence: sanitize_confidence(raw.get("confidence")),
            severity: sanitize_choice(raw.get("severity")),
            treatment: sanitize_text(raw, &["treatment"], DEFAULT_TREATMENT),
            malayalam_treatment: sanitize_text(
                raw,
                &["malayalamTreatment"],
                DEFAULT_TREATMENT_ML,
            ),
            prevention_tips: sanitize_tips(raw.get("preventionTips")),
            urgency: sanitize_choice(raw.get("urgency")),
        }
    }

    /// The placeholder shown whenever an accepted image could not be analysed.
    pub fn analysis_failed() -> Self {
        Self {
            disease: FAILED_DISEASE.to_string(),
            malayalam_label: FAILED_DISEASE_ML.to_string(),
            confidence: 0,
            severity: Severity::Moderate,
            treatment: FAILED_TREATMENT.to_string(),
            malayalam_treatment: FAILED_TREATMENT_ML.to_string(),
            prevention_tips: Vec::new(),
            urgency: Urgency::Medium,
        }
    }
}

/// First non-blank string among `keys`, otherwise `fallback`.
fn sanitize_text(raw: &Value, keys: &[&str], fallback: &str) -> String {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|text| !text.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

fn sanitize_confidence(value: Option<&Value>) -> u8 {
    let score = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    match score {
        Some(score) if score.is_finite() => score.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    }
}

fn sanitize_choice<T>(value: Option<&Value>) -> T
where
    T: FromStr + Default,
{
    value
        .and_then(Value::as_str)
        .and_then(|text| text.trim().to_ascii_lowercase().parse().ok())
        .unwrap_or_default()
}

fn sanitize_tips(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|tip| !tip.is_empty())
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}

/// Persisted form of a detection, owned by the user who submitted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRecord {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub image_path: String,
    #[serde(flatten)]
    pub result: DetectionResult,
    pub created_at: DateTime<Utc>,
}
