use std::fmt;

use crate::model::Source;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad pass list, overlapping vocabularies, etc.).
    ConfigValidation(String),
    /// Two input records in the same population share a record id.
    DuplicateRecordId { source: Source, record_id: String },
    /// A record handed to `ReconInput::from_roles` has no opening/closing role.
    UnassignedRole { record_id: String },
    /// A record was claimed twice. Internal fault: matchers only claim free records.
    DoubleClaim { source: Source, record_id: String },
    /// An outcome points at a match result the ledger does not hold. Internal fault.
    UnknownResult { index: usize },
    /// Assembled output does not cover every input record exactly once. Internal fault.
    Incomplete { missing: usize, duplicated: usize },
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::DuplicateRecordId { source, record_id } => {
                write!(f, "{source} population: duplicate record id '{record_id}'")
            }
            Self::UnassignedRole { record_id } => {
                write!(f, "record '{record_id}': role must be opening or closing")
            }
            Self::DoubleClaim { source, record_id } => {
                write!(f, "internal fault: {source} record '{record_id}' claimed twice")
            }
            Self::UnknownResult { index } => {
                write!(f, "internal fault: no match result at ledger index {index}")
            }
            Self::Incomplete { missing, duplicated } => write!(
                f,
                "internal fault: output lost {missing} record(s) and repeated {duplicated} record(s)"
            ),
        }
    }
}

impl std::error::Error for ReconError {}
