//! Claim ledger: which records have been matched, and the results that matched them.
//!
//! A ledger is created per run (or per location shard) and never shared between runs.
//! Shards are absorbed into the run ledger in location order, which renumbers their
//! results so ids read the same whether partitions ran in parallel or not.

use std::collections::HashSet;

use crate::error::ReconError;
use crate::model::{
    Confidence, MatchMethod, MatchResult, MovementRecord, RecordId, Source, UnmatchedReason,
};

#[derive(Debug, Default)]
pub struct Ledger {
    left: HashSet<RecordId>,
    right: HashSet<RecordId>,
    results: Vec<MatchResult>,
}

/// What a matcher decided about one record (or pair of records).
#[derive(Debug, Clone, Copy)]
pub struct Member<'a> {
    pub source: Source,
    pub record: &'a MovementRecord,
}

impl<'a> Member<'a> {
    pub fn new(source: Source, record: &'a MovementRecord) -> Self {
        Self { source, record }
    }

    pub fn key(&self) -> (Source, &'a str) {
        (self.source, self.record.record_id.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum Outcome<'a> {
    /// Two records joined by the ledger result at `result` (an index into the ledger).
    Matched { members: [Member<'a>; 2], result: usize },
    Unmatched { member: Member<'a>, reason: UnmatchedReason },
}

impl<'a> Outcome<'a> {
    /// Shift the result index after the owning shard was absorbed at `offset`.
    pub fn rebase(mut self, offset: usize) -> Self {
        if let Self::Matched { result, .. } = &mut self {
            *result += offset;
        }
        self
    }
}

/// A ledger shard together with the outcomes produced against it.
#[derive(Debug, Default)]
pub struct Shard<'a> {
    pub ledger: Ledger,
    pub outcomes: Vec<Outcome<'a>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    fn claims(&self, source: Source) -> &HashSet<RecordId> {
        match source {
            Source::Left => &self.left,
            Source::Right => &self.right,
        }
    }

    fn claims_mut(&mut self, source: Source) -> &mut HashSet<RecordId> {
        match source {
            Source::Left => &mut self.left,
            Source::Right => &mut self.right,
        }
    }

    pub fn is_claimed(&self, source: Source, record_id: &str) -> bool {
        self.claims(source).contains(record_id)
    }

    /// Record a two-member match. Fails without side effects if either member is
    /// already claimed.
    pub fn claim(
        &mut self,
        members: [Member<'_>; 2],
        method: MatchMethod,
        pass_number: Option<u32>,
        confidence: Confidence,
        gap: f64,
    ) -> Result<usize, ReconError> {
        for m in &members {
            if self.is_claimed(m.source, &m.record.record_id) {
                return Err(ReconError::DoubleClaim {
                    source: m.source,
                    record_id: m.record.record_id.clone(),
                });
            }
        }

        let idx = self.results.len();
        for m in &members {
            self.claims_mut(m.source)
                .insert(m.record.record_id.clone());
        }
        self.results.push(MatchResult {
            result_id: idx + 1,
            member_ids: members.iter().map(|m| m.record.record_id.clone()).collect(),
            method,
            pass_number,
            confidence,
            gap,
        });
        tracing::trace!(
            result_id = idx + 1,
            method = %method,
            confidence = %confidence,
            gap,
            "claimed {} + {}",
            members[0].record.record_id,
            members[1].record.record_id
        );
        Ok(idx)
    }

    /// Move every claim of `shard` into this ledger. Returns the offset to add to the
    /// shard's result indices.
    pub fn absorb(&mut self, shard: Ledger) -> Result<usize, ReconError> {
        let offset = self.results.len();
        let Ledger {
            left,
            right,
            results,
        } = shard;
        for (source, claims) in [(Source::Left, left), (Source::Right, right)] {
            for record_id in claims {
                if self.is_claimed(source, &record_id) {
                    return Err(ReconError::DoubleClaim { source, record_id });
                }
                self.claims_mut(source).insert(record_id);
            }
        }
        self.results.extend(results.into_iter().map(|mut r| {
            r.result_id += offset;
            r
        }));
        Ok(offset)
    }

    pub fn result(&self, idx: usize) -> Option<&MatchResult> {
        self.results.get(idx)
    }

    pub fn into_results(self) -> Vec<MatchResult> {
        self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
