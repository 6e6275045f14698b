//! Indexed, read-only view over a population of movement records.
//!
//! Records are partitioned by location key. Inside a partition, timestamped records are
//! indexed by primary key, by secondary key, and by calendar date; every index list is
//! ordered by `(timestamp, record_id)` so the first free hit of a scan is the answer.
//! Claimed records are never removed: callers pass an `is_free` predicate backed by the
//! ledger and the store skips records it rejects.

use std::collections::{BTreeMap, HashMap};

use chrono::{Days, NaiveDate, NaiveDateTime};

use crate::model::MovementRecord;

/// Which identity key an index lookup uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyField {
    Primary,
    Secondary,
}

impl KeyField {
    pub fn of<'r>(&self, record: &'r MovementRecord) -> Option<&'r str> {
        match self {
            Self::Primary => record.primary(),
            Self::Secondary => record.secondary(),
        }
    }
}

#[derive(Debug)]
pub struct RecordStore<'a> {
    partitions: BTreeMap<&'a str, Partition<'a>>,
    malformed: Vec<&'a MovementRecord>,
}

impl<'a> RecordStore<'a> {
    pub fn build(records: &'a [MovementRecord]) -> Self {
        Self::from_refs(records.iter())
    }

    pub fn from_refs(records: impl IntoIterator<Item = &'a MovementRecord>) -> Self {
        let mut grouped: BTreeMap<&'a str, Vec<&'a MovementRecord>> = BTreeMap::new();
        let mut malformed = Vec::new();
        for record in records {
            match record.location() {
                Some(loc) => grouped.entry(loc).or_default().push(record),
                None => malformed.push(record),
            }
        }
        malformed.sort_by(|a, b| a.record_id.cmp(&b.record_id));

        let partitions = grouped
            .into_iter()
            .map(|(loc, recs)| (loc, Partition::new(loc, recs)))
            .collect();

        Self {
            partitions,
            malformed,
        }
    }

    /// Location keys in ascending order.
    pub fn locations(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.partitions.keys().copied()
    }

    pub fn partition(&self, location: &str) -> Option<&Partition<'a>> {
        self.partitions.get(location)
    }

    /// Records with an empty location key, by record id. Never indexed.
    pub fn malformed(&self) -> &[&'a MovementRecord] {
        &self.malformed
    }
}

/// All records of one population at one location.
#[derive(Debug)]
pub struct Partition<'a> {
    pub location: &'a str,
    /// Every record, ordered by timestamp (absent last), then record id.
    records: Vec<&'a MovementRecord>,
    by_primary: HashMap<&'a str, Vec<usize>>,
    by_secondary: HashMap<&'a str, Vec<usize>>,
    by_date: BTreeMap<NaiveDate, Vec<usize>>,
}

impl<'a> Partition<'a> {
    fn new(location: &'a str, mut records: Vec<&'a MovementRecord>) -> Self {
        records.sort_by(|a, b| {
            (a.timestamp.is_none(), a.timestamp, &a.record_id).cmp(&(
                b.timestamp.is_none(),
                b.timestamp,
                &b.record_id,
            ))
        });

        let mut by_primary: HashMap<&'a str, Vec<usize>> = HashMap::new();
        let mut by_secondary: HashMap<&'a str, Vec<usize>> = HashMap::new();
        let mut by_date: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();

        // Sorted order is preserved by pushing in sequence.
        for (idx, record) in records.iter().enumerate() {
            let Some(ts) = record.timestamp else {
                continue;
            };
            if let Some(key) = record.primary() {
                by_primary.entry(key).or_default().push(idx);
            }
            if let Some(key) = record.secondary() {
                by_secondary.entry(key).or_default().push(idx);
            }
            by_date.entry(ts.date()).or_default().push(idx);
        }

        Self {
            location,
            records,
            by_primary,
            by_secondary,
            by_date,
        }
    }

    pub fn records(&self) -> &[&'a MovementRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn index(&self, field: KeyField) -> &HashMap<&'a str, Vec<usize>> {
        match field {
            KeyField::Primary => &self.by_primary,
            KeyField::Secondary => &self.by_secondary,
        }
    }

    /// Earliest free record with `field == key` and a timestamp strictly after `after`.
    /// Ties on timestamp go to the smaller record id.
    pub fn first_after(
        &self,
        field: KeyField,
        key: &str,
        after: NaiveDateTime,
        is_free: impl Fn(&MovementRecord) -> bool,
    ) -> Option<&'a MovementRecord> {
        let list = self.index(field).get(key)?;
        let start = list.partition_point(|&i| self.records[i].timestamp <= Some(after));
        list[start..]
            .iter()
            .map(|&i| self.records[i])
            .find(|r| is_free(r))
    }

    /// Free record with `secondary == key` whose date lies within `tolerance` days of
    /// `date`. Picks the smallest absolute offset, then the smaller record id. Returns the
    /// record and its signed day offset from `date`.
    pub fn nearest_within(
        &self,
        key: &str,
        date: NaiveDate,
        tolerance: i64,
        is_free: impl Fn(&MovementRecord) -> bool,
    ) -> Option<(&'a MovementRecord, i64)> {
        let list = self.by_secondary.get(key)?;
        let (lo, hi) = day_bounds(date, tolerance);
        let start = list.partition_point(|&i| self.date_of(i) < lo);

        let mut best: Option<(&'a MovementRecord, i64)> = None;
        for &i in &list[start..] {
            let record = self.records[i];
            let d = self.date_of(i);
            if d > hi {
                break;
            }
            if !is_free(record) {
                continue;
            }
            let offset = (d - date).num_days();
            let better = match best {
                None => true,
                Some((current, current_offset)) => {
                    (offset.abs(), &record.record_id) < (current_offset.abs(), &current.record_id)
                }
            };
            if better {
                best = Some((record, offset));
            }
        }
        best
    }

    /// Free timestamped records whose date lies within `window` days of `date`, in
    /// `(timestamp, record_id)` order.
    pub fn within_days(
        &self,
        date: NaiveDate,
        window: i64,
        is_free: impl Fn(&MovementRecord) -> bool,
    ) -> Vec<&'a MovementRecord> {
        let (lo, hi) = day_bounds(date, window);
        let mut hits: Vec<&'a MovementRecord> = self
            .by_date
            .range(lo..=hi)
            .flat_map(|(_, idxs)| idxs.iter().map(|&i| self.records[i]))
            .filter(|r| is_free(r))
            .collect();
        hits.sort_by(|a, b| (a.timestamp, &a.record_id).cmp(&(b.timestamp, &b.record_id)));
        hits
    }

    fn date_of(&self, idx: usize) -> NaiveDate {
        // Only timestamped records are indexed.
        self.records[idx]
            .timestamp
            .map(|ts| ts.date())
            .unwrap_or(NaiveDate::MIN)
    }
}

/// Inclusive `[date - days, date + days]`, clamped to the representable calendar.
fn day_bounds(date: NaiveDate, days: i64) -> (NaiveDate, NaiveDate) {
    let span = Days::new(u64::try_from(days).unwrap_or(0));
    let lo = date.checked_sub_days(span).unwrap_or(NaiveDate::MIN);
    let hi = date.checked_add_days(span).unwrap_or(NaiveDate::MAX);
    (lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn rec(id: &str, pk: Option<&str>, name: &str, loc: &str, ts: Option<&str>) -> MovementRecord {
        let mut r = MovementRecord::new(id, Role::Closing);
        r.primary_key = pk.map(String::from);
        r.secondary_key = name.into();
        r.location_key = loc.into();
        r.timestamp = ts.map(|s| {
            NaiveDateTime::parse_from_str(&format!("{s} 00:00:00"), "%Y-%m-%d %H:%M:%S").unwrap()
        });
        r
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{s} 00:00:00"), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn partitions_by_location_and_sets_aside_malformed() {
        let records = vec![
            rec("c2", None, "alpha", "PORTY", Some("2023-01-02")),
            rec("c1", None, "alpha", "PORTX", Some("2023-01-01")),
            rec("c3", None, "alpha", "", Some("2023-01-01")),
        ];
        let store = RecordStore::build(&records);
        assert_eq!(store.locations().collect::<Vec<_>>(), vec!["PORTX", "PORTY"]);
        assert_eq!(store.malformed().len(), 1);
        assert_eq!(store.malformed()[0].record_id, "c3");
        assert!(store.partition("PORTZ").is_none());
    }

    #[test]
    fn partition_orders_by_timestamp_then_id_with_undated_last() {
        let records = vec![
            rec("b", None, "alpha", "P", None),
            rec("c", None, "alpha", "P", Some("2023-01-02")),
            rec("a", None, "alpha", "P", Some("2023-01-02")),
            rec("d", None, "alpha", "P", Some("2023-01-01")),
        ];
        let store = RecordStore::build(&records);
        let ids: Vec<_> = store.partition("P").unwrap().records().iter().map(|r| r.record_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "a", "c", "b"]);
    }

    #[test]
    fn first_after_is_strict_and_skips_claimed() {
        let records = vec![
            rec("c0", Some("IMO1"), "alpha", "P", Some("2023-01-01")),
            rec("c1", Some("IMO1"), "alpha", "P", Some("2023-01-11")),
            rec("c2", Some("IMO1"), "alpha", "P", Some("2023-01-21")),
            rec("c3", Some("IMO2"), "beta", "P", Some("2023-01-05")),
        ];
        let store = RecordStore::build(&records);
        let part = store.partition("P").unwrap();

        let hit = part.first_after(KeyField::Primary, "IMO1", ts("2023-01-01"), |_| true);
        assert_eq!(hit.unwrap().record_id, "c1");

        let hit = part.first_after(KeyField::Primary, "IMO1", ts("2023-01-01"), |r| r.record_id != "c1");
        assert_eq!(hit.unwrap().record_id, "c2");

        let hit = part.first_after(KeyField::Secondary, "beta", ts("2023-01-05"), |_| true);
        assert!(hit.is_none());
        assert!(part.first_after(KeyField::Primary, "IMO9", ts("2023-01-01"), |_| true).is_none());
    }

    #[test]
    fn nearest_within_prefers_smallest_offset_then_id() {
        let records = vec![
            rec("b1", None, "mv alpha", "P", Some("2023-01-06")),
            rec("b2", None, "mv alpha", "P", Some("2023-01-08")),
            rec("b0", None, "mv alpha", "P", Some("2023-01-04")),
            rec("b9", None, "mv alpha", "P", Some("2023-01-20")),
        ];
        let store = RecordStore::build(&records);
        let part = store.partition("P").unwrap();

        // b0 and b1 are both one day away; b0 has the smaller id.
        let (hit, offset) = part.nearest_within("mv alpha", date("2023-01-05"), 2, |_| true).unwrap();
        assert_eq!((hit.record_id.as_str(), offset), ("b0", -1));

        let (hit, offset) = part
            .nearest_within("mv alpha", date("2023-01-05"), 2, |r| r.record_id != "b0")
            .unwrap();
        assert_eq!((hit.record_id.as_str(), offset), ("b1", 1));

        assert!(part
            .nearest_within("mv alpha", date("2023-01-12"), 2, |_| true)
            .is_none());
    }

    #[test]
    fn within_days_is_inclusive() {
        let records = vec![
            rec("g1", None, "barge one", "P", Some("2023-01-01")),
            rec("g2", None, "barge two", "P", Some("2023-01-02")),
            rec("g3", None, "barge three", "P", Some("2023-01-04")),
            rec("g4", None, "barge four", "P", None),
        ];
        let store = RecordStore::build(&records);
        let part = store.partition("P").unwrap();
        let ids: Vec<_> = part
            .within_days(date("2023-01-01"), 1, |_| true)
            .iter()
            .map(|r| r.record_id.clone())
            .collect();
        assert_eq!(ids, vec!["g1", "g2"]);
    }

    #[test]
    fn huge_windows_saturate_instead_of_overflowing() {
        let records = vec![
            rec("b1", None, "mv alpha", "P", Some("2023-01-06")),
            rec("g1", None, "barge one", "P", Some("1901-03-01")),
        ];
        let store = RecordStore::build(&records);
        let part = store.partition("P").unwrap();

        let (hit, offset) = part
            .nearest_within("mv alpha", date("2023-01-05"), i64::MAX / 2, |_| true)
            .unwrap();
        assert_eq!((hit.record_id.as_str(), offset), ("b1", 1));

        let ids: Vec<_> = part
            .within_days(date("2023-01-05"), 100_000_000, |_| true)
            .iter()
            .map(|r| r.record_id.clone())
            .collect();
        assert_eq!(ids, vec!["g1", "b1"]);

        let (lo, hi) = day_bounds(date("2023-01-05"), i64::MAX);
        assert_eq!((lo, hi), (NaiveDate::MIN, NaiveDate::MAX));
    }
}
