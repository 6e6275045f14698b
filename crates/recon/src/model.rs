use std::collections::{BTreeMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ReconError;

pub type RecordId = String;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Which half of a movement a record describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Start of a visit (arrival / entrance).
    Opening,
    /// End of a visit (departure / clearance).
    Closing,
    #[default]
    Unassigned,
}

/// Input population a record belongs to. Record ids are only unique within one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Left,
    Right,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// A single normalized vessel movement.
///
/// Keys are expected to be normalized already (see [`crate::normalize`]). An empty
/// `location_key` marks the record as malformed: it is never indexed for matching but
/// still appears in the output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementRecord {
    pub record_id: RecordId,
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub secondary_key: String,
    #[serde(default)]
    pub location_key: String,
    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
    #[serde(default)]
    pub role: Role,
    /// Vessel-type description, used to assign tower/towed legs.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub payload: IndexMap<String, String>,
}

impl MovementRecord {
    pub fn new(record_id: impl Into<RecordId>, role: Role) -> Self {
        Self {
            record_id: record_id.into(),
            primary_key: None,
            secondary_key: String::new(),
            location_key: String::new(),
            timestamp: None,
            role,
            category: None,
            payload: IndexMap::new(),
        }
    }

    /// Primary key, treating blank values as absent.
    pub fn primary(&self) -> Option<&str> {
        self.primary_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Secondary key, treating blank values as absent.
    pub fn secondary(&self) -> Option<&str> {
        Some(self.secondary_key.trim()).filter(|k| !k.is_empty())
    }

    /// Identity used for co-occurrence counting: the name key, else the registry key.
    pub fn identity(&self) -> Option<&str> {
        self.secondary().or_else(|| self.primary())
    }

    pub fn location(&self) -> Option<&str> {
        Some(self.location_key.as_str()).filter(|k| !k.is_empty())
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.timestamp.map(|ts| ts.date())
    }

    pub fn has_identity(&self) -> bool {
        self.primary().is_some() || self.secondary().is_some()
    }
}

/// Pre-loaded records for one run.
///
/// In `port_call` mode `left` holds openings and `right` closings; in `cross_dataset`
/// mode they are datasets A and B.
#[derive(Debug, Clone, Default)]
pub struct ReconInput {
    pub left: Vec<MovementRecord>,
    pub right: Vec<MovementRecord>,
}

impl ReconInput {
    pub fn new(left: Vec<MovementRecord>, right: Vec<MovementRecord>) -> Self {
        Self { left, right }
    }

    /// Split one sequence into openings (left) and closings (right) by role.
    pub fn from_roles(records: Vec<MovementRecord>) -> Result<Self, ReconError> {
        let mut input = Self::default();
        for record in records {
            match record.role {
                Role::Opening => input.left.push(record),
                Role::Closing => input.right.push(record),
                Role::Unassigned => {
                    return Err(ReconError::UnassignedRole {
                        record_id: record.record_id,
                    })
                }
            }
        }
        Ok(input)
    }

    pub fn records(&self, source: Source) -> &[MovementRecord] {
        match source {
            Source::Left => &self.left,
            Source::Right => &self.right,
        }
    }

    pub fn len(&self) -> usize {
        self.left.len() + self.right.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty()
    }

    /// Reject populations with repeated record ids; claims are keyed by id.
    pub fn validate(&self) -> Result<(), ReconError> {
        for source in [Source::Left, Source::Right] {
            let mut seen = HashSet::new();
            for record in self.records(source) {
                if !seen.insert(record.record_id.as_str()) {
                    return Err(ReconError::DuplicateRecordId {
                        source,
                        record_id: record.record_id.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchMethod {
    PrimaryKey,
    SecondaryKey,
    CoOccurrence,
    None,
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrimaryKey => write!(f, "PRIMARY_KEY"),
            Self::SecondaryKey => write!(f, "SECONDARY_KEY"),
            Self::CoOccurrence => write!(f, "CO_OCCURRENCE"),
            Self::None => write!(f, "NONE"),
        }
    }
}

/// Confidence of a claim: an ordinal tier, or a frequency-derived score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Confidence {
    High,
    Medium,
    Low,
    /// Only one candidate existed.
    Single,
    /// Chosen by co-occurrence count.
    Historical(u32),
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
            Self::Single => write!(f, "SINGLE"),
            Self::Historical(count) => write!(f, "HIST_{count}X"),
        }
    }
}

impl Confidence {
    /// Numeric score of a tier: 1.0 / 0.8 / 0.5. Count-based confidences have none.
    pub fn score(&self) -> Option<f64> {
        match self {
            Self::High => Some(1.0),
            Self::Medium => Some(0.8),
            Self::Low => Some(0.5),
            Self::Single | Self::Historical(_) => None,
        }
    }
}

impl Serialize for Confidence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A resolved linkage held by the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub result_id: usize,
    pub member_ids: Vec<RecordId>,
    pub method: MatchMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_number: Option<u32>,
    pub confidence: Confidence,
    pub gap: f64,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputTag {
    Both,
    OpeningOnly,
    ClosingOnly,
    Paired,
    AOnly,
    BOnly,
}

impl OutputTag {
    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Both | Self::Paired)
    }
}

impl std::fmt::Display for OutputTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Both => write!(f, "BOTH"),
            Self::OpeningOnly => write!(f, "OPENING_ONLY"),
            Self::ClosingOnly => write!(f, "CLOSING_ONLY"),
            Self::Paired => write!(f, "PAIRED"),
            Self::AOnly => write!(f, "A_ONLY"),
            Self::BOnly => write!(f, "B_ONLY"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnmatchedReason {
    NoDate,
    NoIdentity,
    NoCandidate,
    Ambiguous,
    Malformed,
}

impl std::fmt::Display for UnmatchedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoDate => write!(f, "NO_DATE"),
            Self::NoIdentity => write!(f, "NO_IDENTITY"),
            Self::NoCandidate => write!(f, "NO_CANDIDATE"),
            Self::Ambiguous => write!(f, "AMBIGUOUS"),
            Self::Malformed => write!(f, "MALFORMED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputMember {
    pub source: Source,
    pub record_id: RecordId,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputRecord {
    pub output_id: String,
    pub tag: OutputTag,
    pub method: MatchMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_id: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap: Option<f64>,
    /// Whole days of a genesis visit, truncated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stay_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnmatchedReason>,
    pub members: Vec<OutputMember>,
    pub payload: IndexMap<String, String>,
}

impl OutputRecord {
    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.record_id.as_str())
    }
}

// ---------------------------------------------------------------------------
// Summary + Result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct GapStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconSummary {
    pub total_records: usize,
    pub total_outputs: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub by_tag: BTreeMap<String, usize>,
    pub by_method: BTreeMap<String, usize>,
    pub by_pass: BTreeMap<u32, usize>,
    pub by_confidence: BTreeMap<String, usize>,
    pub by_reason: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap: Option<GapStats>,
    pub derivations_not_computable: usize,
}

/// Row counts of the B population before and after grouping.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GroupingStats {
    pub rows: usize,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub mode: String,
    pub engine_version: String,
    pub run_at: String,
    pub partitions: usize,
    pub parallel: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grouping: Option<GroupingStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub summary: ReconSummary,
    pub records: Vec<OutputRecord>,
    pub matches: Vec<MatchResult>,
}

impl ReconResult {
    /// Pretty JSON of the record section only. Stable across runs on identical input.
    pub fn records_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.records)
    }
}
