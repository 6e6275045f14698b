//! Cross-dataset linkage over widening date tolerances.
//!
//! Passes are the outer loop: every free A record is tried at pass 1 before anything is
//! tried at pass 2, so a claim made at pass `k` means no free candidate existed within
//! any earlier tolerance when that record's turn came.

use std::collections::HashMap;

use crate::error::ReconError;
use crate::genesis::residual_reason;
use crate::ledger::{Member, Outcome, Shard};
use crate::model::{Confidence, MatchMethod, MovementRecord, Source, UnmatchedReason};
use crate::store::Partition;

/// Tier for a 1-based pass number.
pub fn confidence_for_pass(pass_number: u32) -> Confidence {
    match pass_number {
        1 => Confidence::High,
        2 => Confidence::Medium,
        _ => Confidence::Low,
    }
}

fn unlinked_reason(record: &MovementRecord) -> UnmatchedReason {
    // Only the name key links datasets.
    if record.timestamp.is_some() && record.secondary().is_none() {
        UnmatchedReason::NoIdentity
    } else {
        residual_reason(record)
    }
}

/// Run every pass over one location. `passes` holds the maximum absolute day offset of
/// each pass, widening.
pub fn match_location<'a>(
    a: Option<&Partition<'a>>,
    b: Option<&Partition<'a>>,
    passes: &[i64],
) -> Result<Shard<'a>, ReconError> {
    let mut shard = Shard::default();
    let a_records: &[&'a MovementRecord] = a.map(|p| p.records()).unwrap_or_default();
    let mut links: HashMap<&'a str, (&'a MovementRecord, usize)> = HashMap::new();

    if let Some(pool) = b {
        for (idx, &tolerance) in passes.iter().enumerate() {
            let pass_number = idx as u32 + 1;
            let mut claimed = 0usize;

            for &record in a_records {
                if shard.ledger.is_claimed(Source::Left, &record.record_id) {
                    continue;
                }
                let (Some(date), Some(key)) = (record.date(), record.secondary()) else {
                    continue;
                };

                let ledger = &shard.ledger;
                let hit = pool.nearest_within(key, date, tolerance, |r| {
                    !ledger.is_claimed(Source::Right, &r.record_id)
                });
                let Some((candidate, offset)) = hit else {
                    continue;
                };

                let result = shard.ledger.claim(
                    [
                        Member::new(Source::Left, record),
                        Member::new(Source::Right, candidate),
                    ],
                    MatchMethod::SecondaryKey,
                    Some(pass_number),
                    confidence_for_pass(pass_number),
                    offset.abs() as f64,
                )?;
                links.insert(record.record_id.as_str(), (candidate, result));
                claimed += 1;
            }

            tracing::debug!(
                location = pool.location,
                pass = pass_number,
                tolerance_days = tolerance,
                claimed,
                "tolerance pass complete"
            );
        }
    }

    for &record in a_records {
        let outcome = match links.get(record.record_id.as_str()) {
            Some(&(partner, result)) => Outcome::Matched {
                members: [
                    Member::new(Source::Left, record),
                    Member::new(Source::Right, partner),
                ],
                result,
            },
            None => Outcome::Unmatched {
                member: Member::new(Source::Left, record),
                reason: unlinked_reason(record),
            },
        };
        shard.outcomes.push(outcome);
    }

    if let Some(pool) = b {
        for &record in pool.records() {
            if !shard.ledger.is_claimed(Source::Right, &record.record_id) {
                shard.outcomes.push(Outcome::Unmatched {
                    member: Member::new(Source::Right, record),
                    reason: unlinked_reason(record),
                });
            }
        }
    }

    Ok(shard)
}
