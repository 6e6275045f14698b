//! Flat CSV export of output records.
//!
//! Fixed columns first, then every payload column in first-seen order. Records without a
//! given payload column leave it blank.

use std::io::Write;

use indexmap::IndexSet;

use portcall_recon::OutputRecord;

const FIXED_COLUMNS: [&str; 11] = [
    "output_id",
    "tag",
    "method",
    "result_id",
    "pass_number",
    "confidence",
    "gap",
    "stay_days",
    "match_score",
    "reason",
    "member_ids",
];

pub fn write_records_csv<W: Write>(records: &[OutputRecord], out: W) -> Result<(), csv::Error> {
    let mut payload_columns: IndexSet<&str> = IndexSet::new();
    for record in records {
        payload_columns.extend(record.payload.keys().map(String::as_str));
    }

    let mut writer = csv::Writer::from_writer(out);
    let header = FIXED_COLUMNS
        .iter()
        .copied()
        .chain(payload_columns.iter().copied());
    writer.write_record(header)?;

    for record in records {
        let opt = |v: Option<String>| v.unwrap_or_default();
        let mut row: Vec<String> = vec![
            record.output_id.clone(),
            record.tag.to_string(),
            record.method.to_string(),
            opt(record.result_id.map(|v| v.to_string())),
            opt(record.pass_number.map(|v| v.to_string())),
            opt(record.confidence.map(|v| v.to_string())),
            opt(record.gap.map(|v| v.to_string())),
            opt(record.stay_days.map(|v| v.to_string())),
            opt(record.match_score.map(|v| v.to_string())),
            opt(record.reason.map(|v| v.to_string())),
            record.member_ids().collect::<Vec<_>>().join(";"),
        ];
        for column in &payload_columns {
            row.push(record.payload.get(*column).cloned().unwrap_or_default());
        }
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}
