//! Job files: the engine config plus where to load the two record populations from.
//!
//! ```toml
//! name = "USACE 2023 port calls"
//! mode = "port_call"
//!
//! [sources.left]
//! file = "entrance.csv"
//! date_format = "mmydd"
//!
//! [sources.left.columns]
//! record_id = "ENTRANCE_ID"
//! vessel = "VESSEL_NAME"
//! primary_key = "IMO"
//! location = "PORT_NAME"
//! date = "ARRIVAL_DATE"
//! category = "VESSEL_TYPE"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use portcall_recon::{ReconConfig, ReconError};

#[derive(Debug)]
pub enum JobError {
    Parse(String),
    Validation(String),
    Engine(ReconError),
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "job parse error: {msg}"),
            Self::Validation(msg) => write!(f, "job validation error: {msg}"),
            Self::Engine(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for JobError {}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Sources {
    pub left: SourceConfig,
    pub right: SourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub file: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    pub columns: ColumnMapping,
}

fn default_delimiter() -> char {
    ','
}

fn default_date_format() -> String {
    "%Y-%m-%d".into()
}

/// CSV header names for each record field.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnMapping {
    pub record_id: String,
    /// Vessel name column, normalized into the secondary key.
    pub vessel: String,
    #[serde(default)]
    pub primary_key: Option<String>,
    pub location: String,
    pub date: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// How date cells are written in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateFormat {
    /// A `chrono` format string. Date-only formats load as midnight.
    Chrono(String),
    /// Five digits `MMYDD`, where the year is 2020 plus `Y`.
    Mmydd,
}

impl SourceConfig {
    pub fn date_format(&self) -> DateFormat {
        if self.date_format.eq_ignore_ascii_case("mmydd") {
            DateFormat::Mmydd
        } else {
            DateFormat::Chrono(self.date_format.clone())
        }
    }

    fn validate(&self, side: &str) -> Result<(), JobError> {
        if self.file.trim().is_empty() {
            return Err(JobError::Validation(format!("sources.{side}.file must not be empty")));
        }
        if !self.delimiter.is_ascii() {
            return Err(JobError::Validation(format!(
                "sources.{side}.delimiter must be a single ASCII character"
            )));
        }
        if self.date_format.trim().is_empty() {
            return Err(JobError::Validation(format!(
                "sources.{side}.date_format must not be empty"
            )));
        }
        let c = &self.columns;
        for (name, value) in [
            ("record_id", &c.record_id),
            ("vessel", &c.vessel),
            ("location", &c.location),
            ("date", &c.date),
        ] {
            if value.trim().is_empty() {
                return Err(JobError::Validation(format!(
                    "sources.{side}.columns.{name} must not be empty"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct JobConfig {
    pub engine: ReconConfig,
    pub sources: Sources,
}

impl JobConfig {
    /// Parse a job file. Engine settings live at the top level next to `[sources]`.
    pub fn from_toml(input: &str) -> Result<Self, JobError> {
        #[derive(Deserialize)]
        struct SourcesSection {
            sources: Sources,
        }

        let engine = ReconConfig::from_toml(input).map_err(|err| match err {
            ReconError::ConfigParse(msg) => JobError::Parse(msg),
            other => JobError::Engine(other),
        })?;
        let sections: SourcesSection =
            toml::from_str(input).map_err(|e| JobError::Parse(e.to_string()))?;

        let job = Self {
            engine,
            sources: sections.sources,
        };
        job.validate()?;
        Ok(job)
    }

    pub fn validate(&self) -> Result<(), JobError> {
        self.sources.left.validate("left")?;
        self.sources.right.validate("right")?;
        Ok(())
    }

    /// Source file paths, resolved against the job file's directory.
    pub fn source_paths(&self, job_path: &Path) -> (PathBuf, PathBuf) {
        let base = job_path.parent().unwrap_or_else(|| Path::new("."));
        (
            base.join(&self.sources.left.file),
            base.join(&self.sources.right.file),
        )
    }
}
