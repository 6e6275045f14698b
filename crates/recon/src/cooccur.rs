//! Co-occurrence disambiguation of tower / towed legs.
//!
//! A tug and the barge it moves are reported as two records with no shared key. The
//! disambiguator learns how often each (tower, towed) identity pair shows up at the same
//! place on the same day, then pairs each tower with the nearby towed record it has been
//! seen with most. Ties and all-zero counts are never resolved arbitrarily.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::config::{CooccurrenceConfig, Leg};
use crate::error::ReconError;
use crate::ledger::{Member, Outcome, Shard};
use crate::model::{Confidence, MatchMethod, MovementRecord, Source, UnmatchedReason};
use crate::store::Partition;

/// Split a residual population into tower and towed legs by category. Records whose
/// category is in neither vocabulary are left out.
pub fn split_legs<'a>(
    records: impl IntoIterator<Item = &'a MovementRecord>,
    config: &CooccurrenceConfig,
) -> (Vec<&'a MovementRecord>, Vec<&'a MovementRecord>) {
    let mut towers = Vec::new();
    let mut towed = Vec::new();
    for record in records {
        match config.leg_of(record.category.as_deref()) {
            Some(Leg::Tower) => towers.push(record),
            Some(Leg::Towed) => towed.push(record),
            None => {}
        }
    }
    (towers, towed)
}

/// How many times each (tower identity, towed identity) pair shared a location and day.
#[derive(Debug, Default, Clone)]
pub struct CooccurrenceTable {
    counts: HashMap<(String, String), u32>,
}

impl CooccurrenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every cross pair per (location, date) over the given legs. Records without a
    /// location, date or identity do not contribute.
    pub fn from_legs(towers: &[&MovementRecord], towed: &[&MovementRecord]) -> Self {
        let mut days: BTreeMap<(&str, NaiveDate), (Vec<&str>, Vec<&str>)> = BTreeMap::new();
        for record in towers {
            if let Some((place, id)) = sighting(record) {
                days.entry(place).or_default().0.push(id);
            }
        }
        for record in towed {
            if let Some((place, id)) = sighting(record) {
                days.entry(place).or_default().1.push(id);
            }
        }

        let mut table = Self::new();
        for (tower_ids, towed_ids) in days.values() {
            for tower in tower_ids {
                for unit in towed_ids {
                    table.add(tower, unit, 1);
                }
            }
        }
        table
    }

    pub fn add(&mut self, tower: &str, towed: &str, n: u32) {
        *self
            .counts
            .entry((tower.to_string(), towed.to_string()))
            .or_insert(0) += n;
    }

    pub fn count(&self, tower: &str, towed: &str) -> u32 {
        self.counts
            .get(&(tower.to_string(), towed.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Number of distinct identity pairs seen.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

fn sighting(record: &MovementRecord) -> Option<((&str, NaiveDate), &str)> {
    Some(((record.location()?, record.date()?), record.identity()?))
}

enum Pick<'a> {
    Chosen(&'a MovementRecord, Confidence),
    Ambiguous,
    Nothing,
}

fn pick<'a>(
    tower: &MovementRecord,
    candidates: &[&'a MovementRecord],
    table: &CooccurrenceTable,
) -> Pick<'a> {
    match candidates {
        [] => Pick::Nothing,
        [only] => Pick::Chosen(*only, Confidence::Single),
        _ => {
            let count_of = |c: &MovementRecord| match (tower.identity(), c.identity()) {
                (Some(t), Some(g)) => table.count(t, g),
                _ => 0,
            };
            let best = candidates.iter().map(|c| count_of(*c)).max().unwrap_or(0);
            let mut leaders = candidates.iter().filter(|c| count_of(**c) == best);
            match (leaders.next(), leaders.next()) {
                (Some(winner), None) if best > 0 => {
                    Pick::Chosen(*winner, Confidence::Historical(best))
                }
                _ => Pick::Ambiguous,
            }
        }
    }
}

/// Pair the towers of one location against that location's towed records.
///
/// Both legs come from the same population, so every member carries `source`. The shard
/// holds a `Matched` outcome per pair and an `Unmatched { Ambiguous }` outcome per tower
/// whose candidates could not be told apart; other towers produce nothing.
pub fn pair_location<'a>(
    towers: &[&'a MovementRecord],
    towed: Option<&Partition<'a>>,
    source: Source,
    table: &CooccurrenceTable,
    window_days: i64,
) -> Result<Shard<'a>, ReconError> {
    let mut shard = Shard::default();
    let Some(pool) = towed else {
        return Ok(shard);
    };

    let mut ordered = towers.to_vec();
    ordered.sort_by(|a, b| {
        (a.timestamp.is_none(), a.timestamp, &a.record_id).cmp(&(
            b.timestamp.is_none(),
            b.timestamp,
            &b.record_id,
        ))
    });

    for tower in ordered {
        let Some(date) = tower.date() else {
            continue;
        };
        let ledger = &shard.ledger;
        let candidates =
            pool.within_days(date, window_days, |r| !ledger.is_claimed(source, &r.record_id));

        match pick(tower, &candidates, table) {
            Pick::Chosen(unit, confidence) => {
                let gap = unit
                    .date()
                    .map_or(0.0, |d| (d - date).num_days().abs() as f64);
                let members = [Member::new(source, tower), Member::new(source, unit)];
                let result =
                    shard
                        .ledger
                        .claim(members, MatchMethod::CoOccurrence, None, confidence, gap)?;
                shard.outcomes.push(Outcome::Matched { members, result });
            }
            Pick::Ambiguous => {
                tracing::warn!(
                    location = pool.location,
                    tower = %tower.record_id,
                    candidates = candidates.len(),
                    "co-occurrence tie, tower left unpaired"
                );
                shard.outcomes.push(Outcome::Unmatched {
                    member: Member::new(source, tower),
                    reason: UnmatchedReason::Ambiguous,
                });
            }
            Pick::Nothing => {}
        }
    }

    Ok(shard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::store::RecordStore;
    use chrono::{Duration, NaiveDateTime};

    fn day(n: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 6, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
            + Duration::days(n)
    }

    fn leg(id: &str, name: &str, category: &str, loc: &str, ts: Option<NaiveDateTime>) -> MovementRecord {
        let mut r = MovementRecord::new(id, Role::Opening);
        r.secondary_key = name.into();
        r.location_key = loc.into();
        r.timestamp = ts;
        r.category = Some(category.into());
        r
    }

    /// (tower, towed, confidence) pairs and ambiguous towers.
    fn run(
        towers: &[MovementRecord],
        towed: &[MovementRecord],
        table: &CooccurrenceTable,
    ) -> (Vec<(String, String, Confidence)>, Vec<String>) {
        let tower_refs: Vec<&MovementRecord> = towers.iter().collect();
        let store = RecordStore::build(towed);
        let shard =
            pair_location(&tower_refs, store.partition("PORTZ"), Source::Left, table, 1).unwrap();

        let mut pairs = Vec::new();
        let mut ambiguous = Vec::new();
        for outcome in &shard.outcomes {
            match outcome {
                Outcome::Matched { members, result } => {
                    let r = shard.ledger.result(*result).unwrap();
                    assert_eq!(r.method, MatchMethod::CoOccurrence);
                    pairs.push((
                        members[0].record.record_id.clone(),
                        members[1].record.record_id.clone(),
                        r.confidence,
                    ));
                }
                Outcome::Unmatched { member, reason } => {
                    assert_eq!(*reason, UnmatchedReason::Ambiguous);
                    ambiguous.push(member.record.record_id.clone());
                }
            }
        }
        (pairs, ambiguous)
    }

    #[test]
    fn highest_count_wins() {
        let towers = vec![leg("T1", "tug one", "TUG", "PORTZ", Some(day(1)))];
        let towed = vec![
            leg("G1", "barge one", "DECK BARGE", "PORTZ", Some(day(1))),
            leg("G2", "barge two", "DECK BARGE", "PORTZ", Some(day(2))),
        ];
        let mut table = CooccurrenceTable::new();
        table.add("tug one", "barge one", 3);

        let (pairs, ambiguous) = run(&towers, &towed, &table);
        assert_eq!(pairs, vec![("T1".into(), "G1".into(), Confidence::Historical(3))]);
        assert!(ambiguous.is_empty());
    }

    #[test]
    fn all_zero_counts_are_ambiguous() {
        let towers = vec![leg("T1", "tug one", "TUG", "PORTZ", Some(day(1)))];
        let towed = vec![
            leg("G1", "barge one", "DECK BARGE", "PORTZ", Some(day(1))),
            leg("G2", "barge two", "DECK BARGE", "PORTZ", Some(day(2))),
        ];
        let (pairs, ambiguous) = run(&towers, &towed, &CooccurrenceTable::new());
        assert!(pairs.is_empty());
        assert_eq!(ambiguous, vec!["T1"]);
    }

    #[test]
    fn tied_best_count_is_ambiguous() {
        let towers = vec![leg("T1", "tug one", "TUG", "PORTZ", Some(day(1)))];
        let towed = vec![
            leg("G1", "barge one", "DECK BARGE", "PORTZ", Some(day(1))),
            leg("G2", "barge two", "DECK BARGE", "PORTZ", Some(day(0))),
        ];
        let mut table = CooccurrenceTable::new();
        table.add("tug one", "barge one", 2);
        table.add("tug one", "barge two", 2);
        let (pairs, ambiguous) = run(&towers, &towed, &table);
        assert!(pairs.is_empty());
        assert_eq!(ambiguous, vec!["T1"]);
    }

    #[test]
    fn single_candidate_needs_no_history() {
        let towers = vec![
            leg("T1", "tug one", "TUG", "PORTZ", Some(day(1))),
            leg("T2", "tug two", "TUG", "PORTZ", None),
        ];
        let towed = vec![
            leg("G1", "barge one", "DECK BARGE", "PORTZ", Some(day(2))),
            leg("G9", "barge nine", "DECK BARGE", "PORTZ", Some(day(5))),
        ];
        let (pairs, ambiguous) = run(&towers, &towed, &CooccurrenceTable::new());
        assert_eq!(pairs, vec![("T1".into(), "G1".into(), Confidence::Single)]);
        assert!(ambiguous.is_empty());
    }

    #[test]
    fn claimed_units_are_not_offered_again() {
        let towers = vec![
            leg("T1", "tug one", "TUG", "PORTZ", Some(day(1))),
            leg("T2", "tug two", "TUG", "PORTZ", Some(day(1))),
        ];
        let towed = vec![leg("G1", "barge one", "DECK BARGE", "PORTZ", Some(day(1)))];
        let (pairs, ambiguous) = run(&towers, &towed, &CooccurrenceTable::new());
        assert_eq!(pairs, vec![("T1".into(), "G1".into(), Confidence::Single)]);
        assert!(ambiguous.is_empty());
    }

    #[test]
    fn table_counts_same_day_cross_pairs() {
        let towers = vec![
            leg("T1", "tug one", "TUG", "PORTZ", Some(day(1))),
            leg("T2", "tug one", "TUG", "PORTZ", Some(day(4))),
            leg("T3", "tug one", "TUG", "OTHER", Some(day(1))),
        ];
        let towed = vec![
            leg("G1", "barge one", "DECK BARGE", "PORTZ", Some(day(1))),
            leg("G2", "barge two", "DECK BARGE", "PORTZ", Some(day(1))),
            leg("G3", "barge one", "DECK BARGE", "PORTZ", Some(day(4))),
            leg("G4", "barge one", "DECK BARGE", "PORTZ", None),
        ];
        let t: Vec<&MovementRecord> = towers.iter().collect();
        let g: Vec<&MovementRecord> = towed.iter().collect();
        let table = CooccurrenceTable::from_legs(&t, &g);
        assert_eq!(table.count("tug one", "barge one"), 2);
        assert_eq!(table.count("tug one", "barge two"), 1);
        assert_eq!(table.count("barge one", "tug one"), 0);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn legs_split_by_category() {
        let records = vec![
            leg("T1", "tug one", "Tug", "PORTZ", Some(day(1))),
            leg("G1", "barge one", "deck barge", "PORTZ", Some(day(1))),
            leg("X1", "bulker", "BULK CARRIER", "PORTZ", Some(day(1))),
        ];
        let (towers, towed) = split_legs(&records, &CooccurrenceConfig::default());
        assert_eq!(towers.len(), 1);
        assert_eq!(towed.len(), 1);
        assert_eq!(towers[0].record_id, "T1");
        assert_eq!(towed[0].record_id, "G1");
    }
}
