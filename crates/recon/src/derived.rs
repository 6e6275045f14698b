//! Derived fields computed from member payloads.
//!
//! Currently one derivation: how laden a vessel looks on arrival, from its reported draft
//! against its maximum draft. Failures are typed and counted, never swallowed.

use std::fmt;

use indexmap::IndexMap;

use crate::config::DerivedConfig;

/// Draft ratio above which a vessel is forecast to discharge.
const DISCHARGE_ABOVE_PCT: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Load,
    Discharge,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load => write!(f, "LOAD"),
            Self::Discharge => write!(f, "DISCHARGE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DraftAssessment {
    pub pct_of_max: f64,
    pub activity: Activity,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DerivationError {
    /// The maximum draft is absent or blank.
    MissingMaxDraft,
    /// A field holds text that is not a number.
    NotNumeric { field: String, value: String },
    /// Reported or maximum draft is zero or negative.
    NonPositive { field: String },
}

impl fmt::Display for DerivationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingMaxDraft => write!(f, "maximum draft is missing"),
            Self::NotNumeric { field, value } => {
                write!(f, "field '{field}' is not numeric: '{value}'")
            }
            Self::NonPositive { field } => write!(f, "field '{field}' must be positive"),
        }
    }
}

impl std::error::Error for DerivationError {}

fn parse(field: &str, raw: Option<&str>) -> Result<Option<f64>, DerivationError> {
    let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    text.parse::<f64>()
        .map(Some)
        .map_err(|_| DerivationError::NotNumeric {
            field: field.to_string(),
            value: text.to_string(),
        })
}

/// Reported draft (feet + inches / 12) as a share of the vessel's maximum draft.
///
/// Blank feet or inches count as zero; a blank maximum cannot be assessed.
pub fn assess_draft(
    draft_ft: Option<&str>,
    draft_in: Option<&str>,
    max_draft_ft: Option<&str>,
) -> Result<DraftAssessment, DerivationError> {
    let feet = parse("draft_ft", draft_ft)?.unwrap_or(0.0);
    let inches = parse("draft_in", draft_in)?.unwrap_or(0.0);
    let max = parse("max_draft_ft", max_draft_ft)?.ok_or(DerivationError::MissingMaxDraft)?;

    let actual = feet + inches / 12.0;
    if max <= 0.0 {
        return Err(DerivationError::NonPositive {
            field: "max_draft_ft".into(),
        });
    }
    if actual <= 0.0 {
        return Err(DerivationError::NonPositive {
            field: "draft_ft".into(),
        });
    }

    let pct_of_max = actual / max * 100.0;
    let activity = if pct_of_max > DISCHARGE_ABOVE_PCT {
        Activity::Discharge
    } else {
        Activity::Load
    };
    Ok(DraftAssessment {
        pct_of_max,
        activity,
    })
}

/// Run [`assess_draft`] on the payload fields named by `config`.
pub fn assess_payload(
    payload: &IndexMap<String, String>,
    config: &DerivedConfig,
) -> Result<DraftAssessment, DerivationError> {
    let field = |name: &str| payload.get(name).map(String::as_str);
    assess_draft(
        field(&config.draft_ft),
        field(&config.draft_in),
        field(&config.max_draft_ft),
    )
}
