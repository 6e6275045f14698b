//! CSV sources → normalized movement records.
//!
//! Every column lands in the record payload unchanged. Key columns are normalized;
//! a date that does not parse loads as an absent timestamp instead of failing the load.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;

use portcall_recon::{normalize, KeyKind, MovementRecord, Role};

use crate::job::{DateFormat, SourceConfig};

#[derive(Debug)]
pub enum IngestError {
    Csv(String),
    MissingColumn { source: String, column: String },
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv(msg) => write!(f, "CSV error: {msg}"),
            Self::MissingColumn { source, column } => {
                write!(f, "{source}: missing column '{column}'")
            }
        }
    }
}

impl std::error::Error for IngestError {}

/// Load one population from CSV text.
pub fn load_records(
    source_name: &str,
    csv_data: &str,
    config: &SourceConfig,
    role: Role,
) -> Result<Vec<MovementRecord>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(config.delimiter as u8)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| IngestError::Csv(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let idx = |name: &str| -> Result<usize, IngestError> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| IngestError::MissingColumn {
                source: source_name.into(),
                column: name.into(),
            })
    };

    let col = &config.columns;
    let record_id_idx = idx(&col.record_id)?;
    let vessel_idx = idx(&col.vessel)?;
    let location_idx = idx(&col.location)?;
    let date_idx = idx(&col.date)?;
    let primary_idx = col.primary_key.as_deref().map(|name| idx(name)).transpose()?;
    let category_idx = col.category.as_deref().map(|name| idx(name)).transpose()?;

    let date_format = config.date_format();
    let mut records = Vec::new();
    let mut undated = 0usize;

    for row in reader.records() {
        let row = row.map_err(|e| IngestError::Csv(e.to_string()))?;
        let cell = |i: usize| row.get(i).unwrap_or("");

        let mut record = MovementRecord::new(cell(record_id_idx).trim(), role);
        record.secondary_key = normalize(Some(cell(vessel_idx)), KeyKind::VesselName);
        record.location_key = normalize(Some(cell(location_idx)), KeyKind::LocationName);
        record.primary_key = primary_idx
            .map(|i| cell(i).trim().to_string())
            .filter(|k| !k.is_empty());
        record.category = category_idx
            .map(|i| cell(i).trim().to_string())
            .filter(|c| !c.is_empty());
        record.timestamp = parse_timestamp(cell(date_idx), &date_format);
        if record.timestamp.is_none() {
            undated += 1;
        }

        let mut payload = IndexMap::with_capacity(headers.len());
        for (i, header) in headers.iter().enumerate() {
            payload.insert(header.clone(), cell(i).to_string());
        }
        record.payload = payload;
        records.push(record);
    }

    tracing::info!(source = source_name, records = records.len(), undated, "loaded source");
    Ok(records)
}

/// Parse one date cell. Blank or unparseable cells yield `None`.
pub fn parse_timestamp(raw: &str, format: &DateFormat) -> Option<NaiveDateTime> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    match format {
        DateFormat::Mmydd => parse_mmydd(text).map(|d| d.and_time(NaiveTime::MIN)),
        DateFormat::Chrono(fmt) => NaiveDateTime::parse_from_str(text, fmt)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(text, fmt)
                    .ok()
                    .map(|d| d.and_time(NaiveTime::MIN))
            }),
    }
}

/// `MMYDD` with leading zeros possibly dropped (`8329` is 2023-08-29). Spreadsheet
/// exports sometimes write the value as a float, so a `.0` suffix is accepted.
fn parse_mmydd(text: &str) -> Option<NaiveDate> {
    let digits = text.strip_suffix(".0").unwrap_or(text);
    if digits.is_empty() || digits.len() > 5 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let padded = format!("{digits:0>5}");
    let month: u32 = padded[..2].parse().ok()?;
    let year_digit: i32 = padded[2..3].parse().ok()?;
    let day: u32 = padded[3..].parse().ok()?;
    NaiveDate::from_ymd_opt(2020 + year_digit, month, day)
}
