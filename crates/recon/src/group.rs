//! Collapse of B rows into one record per call before cross-dataset matching.
//!
//! Trade datasets carry one row per shipment, so a single vessel call shows up many times.
//! Rows sharing vessel name, location, calendar date and the configured key fields become
//! one record with id `{prefix}_{n:07}`, numbered in first-seen order. The merged record
//! keeps the first row's fields and payload and adds the member ids, per-field totals and
//! distinct-value lists. Rows that cannot be keyed (no location, date or name) pass
//! through unchanged after the groups.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use indexmap::IndexMap;

use crate::config::GroupingConfig;
use crate::model::MovementRecord;

/// Payload field listing the ids of the rows merged into a group, `;`-separated.
pub const MEMBER_IDS_FIELD: &str = "member_ids";
pub const MEMBER_COUNT_FIELD: &str = "member_count";

type GroupKey<'a> = (&'a str, &'a str, NaiveDate, Vec<&'a str>);

fn group_key<'a>(record: &'a MovementRecord, config: &GroupingConfig) -> Option<GroupKey<'a>> {
    let extra = config
        .key_fields
        .iter()
        .map(|field| record.payload.get(field).map(|v| v.trim()).unwrap_or(""))
        .collect();
    Some((record.secondary()?, record.location()?, record.date()?, extra))
}

/// Collapse `records` per `config`. Returns groups in first-seen order, then the rows
/// that could not be keyed.
pub fn collapse(records: &[MovementRecord], config: &GroupingConfig) -> Vec<MovementRecord> {
    let mut groups: IndexMap<GroupKey<'_>, Vec<&MovementRecord>> = IndexMap::new();
    let mut loose: Vec<&MovementRecord> = Vec::new();
    for record in records {
        match group_key(record, config) {
            Some(key) => groups.entry(key).or_default().push(record),
            None => loose.push(record),
        }
    }

    let mut out: Vec<MovementRecord> = groups
        .values()
        .enumerate()
        .map(|(i, members)| merge(format!("{}_{:07}", config.id_prefix, i + 1), members, config))
        .collect();
    out.extend(loose.into_iter().cloned());

    tracing::info!(
        rows = records.len(),
        groups = groups.len(),
        ungrouped = out.len() - groups.len(),
        "grouping complete"
    );
    out
}

fn merge(id: String, members: &[&MovementRecord], config: &GroupingConfig) -> MovementRecord {
    let first = members[0];
    let mut record = first.clone();
    record.record_id = id;
    record.timestamp = members.iter().filter_map(|m| m.timestamp).min();
    if record.primary().is_none() {
        record.primary_key = members.iter().find_map(|m| m.primary()).map(String::from);
    }

    for field in &config.sum_fields {
        record
            .payload
            .insert(format!("{field}_total"), format_total(sum_field(members, field)));
    }
    for field in &config.concat_fields {
        let values: BTreeSet<&str> = members
            .iter()
            .filter_map(|m| m.payload.get(field))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .collect();
        record
            .payload
            .insert(format!("{field}_concat"), values.into_iter().collect::<Vec<_>>().join(", "));
    }

    let ids: Vec<&str> = members.iter().map(|m| m.record_id.as_str()).collect();
    record.payload.insert(MEMBER_IDS_FIELD.into(), ids.join(";"));
    record
        .payload
        .insert(MEMBER_COUNT_FIELD.into(), members.len().to_string());
    record
}

/// Sum of the numeric values of `field`. Blank and non-numeric values count as zero.
fn sum_field(members: &[&MovementRecord], field: &str) -> f64 {
    let mut total = 0.0;
    for member in members {
        let Some(raw) = member.payload.get(field).map(|v| v.trim()) else {
            continue;
        };
        if raw.is_empty() {
            continue;
        }
        match raw.replace(',', "").parse::<f64>() {
            Ok(v) if v.is_finite() => total += v,
            _ => tracing::debug!(record_id = %member.record_id, field, value = raw, "not a number, skipped"),
        }
    }
    total
}

fn format_total(total: f64) -> String {
    let rounded = (total * 1e6).round() / 1e6;
    rounded.to_string()
}
