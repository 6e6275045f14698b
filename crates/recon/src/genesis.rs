//! Sequential genesis matching: each opening takes the next strictly-later closing of the
//! same vessel at the same location.
//!
//! Openings are visited in `(primary_key, timestamp, record_id)` order with absent values
//! last. The primary key is tried first; when it is absent, or finds nothing, the secondary
//! key gets a turn. Closings left over once every opening has been visited become
//! `CLOSING_ONLY` residuals.

use std::cmp::Ordering;

use crate::config::GenesisConfig;
use crate::error::ReconError;
use crate::ledger::{Member, Outcome, Shard};
use crate::model::{Confidence, MatchMethod, MovementRecord, Source, UnmatchedReason};
use crate::store::{KeyField, Partition};

/// Tier for an opening → closing gap, in days.
pub fn confidence_for_gap(gap_days: f64, config: &GenesisConfig) -> Confidence {
    if gap_days <= config.high_max_days {
        Confidence::High
    } else if gap_days <= config.medium_max_days {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Why a record that found no partner stayed alone.
pub fn residual_reason(record: &MovementRecord) -> UnmatchedReason {
    if record.timestamp.is_none() {
        UnmatchedReason::NoDate
    } else if !record.has_identity() {
        UnmatchedReason::NoIdentity
    } else {
        UnmatchedReason::NoCandidate
    }
}

fn opening_order(a: &MovementRecord, b: &MovementRecord) -> Ordering {
    (a.primary().is_none(), a.primary(), a.timestamp.is_none(), a.timestamp, &a.record_id).cmp(&(
        b.primary().is_none(),
        b.primary(),
        b.timestamp.is_none(),
        b.timestamp,
        &b.record_id,
    ))
}

/// Run genesis over one location. Either side may be missing when the location only
/// appears in one population.
pub fn match_location<'a>(
    openings: Option<&Partition<'a>>,
    closings: Option<&Partition<'a>>,
    config: &GenesisConfig,
) -> Result<Shard<'a>, ReconError> {
    let mut shard = Shard::default();

    let mut ordered: Vec<&'a MovementRecord> = openings
        .map(|p| p.records().to_vec())
        .unwrap_or_default();
    ordered.sort_by(|a, b| opening_order(a, b));

    for opening in ordered {
        let Some(opened_at) = opening.timestamp else {
            shard.outcomes.push(Outcome::Unmatched {
                member: Member::new(Source::Left, opening),
                reason: UnmatchedReason::NoDate,
            });
            continue;
        };

        let found = closings.and_then(|pool| {
            let ledger = &shard.ledger;
            let is_free = |r: &MovementRecord| !ledger.is_claimed(Source::Right, &r.record_id);
            [
                (KeyField::Primary, MatchMethod::PrimaryKey),
                (KeyField::Secondary, MatchMethod::SecondaryKey),
            ]
            .into_iter()
            .find_map(|(field, method)| {
                let key = field.of(opening)?;
                pool.first_after(field, key, opened_at, is_free)
                    .map(|closing| (closing, method))
            })
        });

        match found {
            Some((closing, method)) => {
                let gap = closing
                    .timestamp
                    .map_or(0.0, |ts| (ts - opened_at).num_seconds() as f64 / 86_400.0);
                let members = [
                    Member::new(Source::Left, opening),
                    Member::new(Source::Right, closing),
                ];
                let result = shard.ledger.claim(
                    members,
                    method,
                    None,
                    confidence_for_gap(gap, config),
                    gap,
                )?;
                shard.outcomes.push(Outcome::Matched { members, result });
            }
            None => shard.outcomes.push(Outcome::Unmatched {
                member: Member::new(Source::Left, opening),
                reason: residual_reason(opening),
            }),
        }
    }

    if let Some(pool) = closings {
        for &closing in pool.records() {
            if shard.ledger.is_claimed(Source::Right, &closing.record_id) {
                continue;
            }
            shard.outcomes.push(Outcome::Unmatched {
                member: Member::new(Source::Right, closing),
                reason: residual_reason(closing),
            });
        }
    }

    Ok(shard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::store::RecordStore;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn day(n: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::days(n)
    }

    fn rec(id: &str, role: Role, pk: Option<&str>, name: &str, ts: Option<NaiveDateTime>) -> MovementRecord {
        let mut r = MovementRecord::new(id, role);
        r.primary_key = pk.map(String::from);
        r.secondary_key = name.into();
        r.location_key = "PORTX".into();
        r.timestamp = ts;
        r
    }

    type Pair = (String, String, MatchMethod, Confidence, f64);
    type Residual = (Source, String, UnmatchedReason);

    fn run(openings: &[MovementRecord], closings: &[MovementRecord]) -> (Vec<Pair>, Vec<Residual>) {
        let o = RecordStore::build(openings);
        let c = RecordStore::build(closings);
        let shard =
            match_location(o.partition("PORTX"), c.partition("PORTX"), &GenesisConfig::default())
                .unwrap();

        let mut pairs = Vec::new();
        let mut residuals = Vec::new();
        for outcome in &shard.outcomes {
            match outcome {
                Outcome::Matched { members, result } => {
                    let r = shard.ledger.result(*result).unwrap();
                    pairs.push((
                        members[0].record.record_id.clone(),
                        members[1].record.record_id.clone(),
                        r.method,
                        r.confidence,
                        r.gap,
                    ));
                }
                Outcome::Unmatched { member, reason } => {
                    residuals.push((member.source, member.record.record_id.clone(), *reason));
                }
            }
        }
        (pairs, residuals)
    }

    #[test]
    fn opening_takes_nearest_later_closing() {
        let openings = vec![rec("E1", Role::Opening, Some("IMO123"), "alpha", Some(day(0)))];
        let closings = vec![
            rec("C2", Role::Closing, Some("IMO123"), "alpha", Some(day(20))),
            rec("C1", Role::Closing, Some("IMO123"), "alpha", Some(day(10))),
        ];
        let (pairs, residuals) = run(&openings, &closings);
        assert_eq!(
            pairs,
            vec![("E1".into(), "C1".into(), MatchMethod::PrimaryKey, Confidence::High, 10.0)]
        );
        assert_eq!(
            residuals,
            vec![(Source::Right, "C2".into(), UnmatchedReason::NoCandidate)]
        );
    }

    #[test]
    fn closing_at_same_instant_is_not_eligible() {
        let openings = vec![rec("E1", Role::Opening, Some("IMO1"), "", Some(day(3)))];
        let closings = vec![rec("C1", Role::Closing, Some("IMO1"), "", Some(day(3)))];
        let (pairs, residuals) = run(&openings, &closings);
        assert!(pairs.is_empty());
        assert_eq!(
            residuals,
            vec![
                (Source::Left, "E1".into(), UnmatchedReason::NoCandidate),
                (Source::Right, "C1".into(), UnmatchedReason::NoCandidate),
            ]
        );
    }

    #[test]
    fn falls_back_to_secondary_key() {
        let openings = vec![rec("E1", Role::Opening, Some("IMO1"), "alpha", Some(day(0)))];
        let closings = vec![rec("C1", Role::Closing, Some("IMO9"), "alpha", Some(day(30)))];
        let (pairs, _) = run(&openings, &closings);
        assert_eq!(
            pairs,
            vec![("E1".into(), "C1".into(), MatchMethod::SecondaryKey, Confidence::Medium, 30.0)]
        );
    }

    #[test]
    fn earlier_opening_claims_first() {
        let openings = vec![
            rec("E2", Role::Opening, Some("IMO1"), "", Some(day(5))),
            rec("E1", Role::Opening, Some("IMO1"), "", Some(day(0))),
        ];
        let closings = vec![
            rec("C1", Role::Closing, Some("IMO1"), "", Some(day(6))),
            rec("C2", Role::Closing, Some("IMO1"), "", Some(day(60))),
        ];
        let (pairs, _) = run(&openings, &closings);
        assert_eq!(pairs[0].0, "E1");
        assert_eq!(pairs[0].1, "C1");
        assert_eq!(pairs[1].0, "E2");
        assert_eq!(pairs[1].1, "C2");
        assert_eq!(pairs[1].3, Confidence::Low);
    }

    #[test]
    fn identical_openings_resolve_by_record_id() {
        let openings = vec![
            rec("E9", Role::Opening, Some("IMO1"), "", Some(day(0))),
            rec("E1", Role::Opening, Some("IMO1"), "", Some(day(0))),
        ];
        let closings = vec![rec("C1", Role::Closing, Some("IMO1"), "", Some(day(1)))];
        let (pairs, residuals) = run(&openings, &closings);
        assert_eq!(pairs[0].0, "E1");
        assert_eq!(
            residuals,
            vec![(Source::Left, "E9".into(), UnmatchedReason::NoCandidate)]
        );
    }

    #[test]
    fn missing_date_or_identity_is_reported() {
        let openings = vec![
            rec("E1", Role::Opening, Some("IMO1"), "alpha", None),
            rec("E2", Role::Opening, None, "", Some(day(0))),
        ];
        let closings = vec![rec("C1", Role::Closing, Some("IMO1"), "alpha", Some(day(2)))];
        let (pairs, reasons) = run(&openings, &closings);
        assert!(pairs.is_empty());
        assert!(reasons.contains(&(Source::Left, "E1".into(), UnmatchedReason::NoDate)));
        assert!(reasons.contains(&(Source::Left, "E2".into(), UnmatchedReason::NoIdentity)));
    }

    #[test]
    fn fractional_gap_and_thresholds() {
        let cfg = GenesisConfig::default();
        assert_eq!(confidence_for_gap(15.0, &cfg), Confidence::High);
        assert_eq!(confidence_for_gap(15.5, &cfg), Confidence::Medium);
        assert_eq!(confidence_for_gap(45.0, &cfg), Confidence::Medium);
        assert_eq!(confidence_for_gap(45.01, &cfg), Confidence::Low);

        let openings = vec![rec("E1", Role::Opening, Some("IMO1"), "", Some(day(0)))];
        let closings = vec![rec(
            "C1",
            Role::Closing,
            Some("IMO1"),
            "",
            Some(day(15) + Duration::hours(12)),
        )];
        let (pairs, _) = run(&openings, &closings);
        assert_eq!(pairs[0].4, 15.5);
        assert_eq!(pairs[0].3, Confidence::Medium);
    }

    #[test]
    fn opening_without_closing_partition() {
        let openings = vec![rec("E1", Role::Opening, Some("IMO1"), "", Some(day(0)))];
        let (_, residuals) = run(&openings, &[]);
        assert_eq!(
            residuals,
            vec![(Source::Left, "E1".into(), UnmatchedReason::NoCandidate)]
        );
    }

    #[test]
    fn openings_order_by_key_then_time_with_absent_last() {
        let mut openings = vec![
            rec("E5", Role::Opening, None, "alpha", Some(day(0))),
            rec("E4", Role::Opening, Some("IMO2"), "", None),
            rec("E3", Role::Opening, Some("IMO2"), "", Some(day(3))),
            rec("E2", Role::Opening, Some("IMO1"), "", Some(day(9))),
            rec("E1", Role::Opening, Some("IMO2"), "", Some(day(3))),
        ];
        openings.sort_by(opening_order);
        let ids: Vec<_> = openings.iter().map(|r| r.record_id.as_str()).collect();
        assert_eq!(ids, vec!["E2", "E1", "E3", "E4", "E5"]);
    }
}
