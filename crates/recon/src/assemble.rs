//! Result assembly: turns matcher outcomes into numbered output records and checks that
//! every input record landed in exactly one of them.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::config::DerivedConfig;
use crate::derived;
use crate::error::ReconError;
use crate::ledger::{Ledger, Member, Outcome};
use crate::model::{
    MatchMethod, OutputMember, OutputRecord, OutputTag, ReconInput, Source, UnmatchedReason,
};

/// Tags and member labels used for one matcher's outcomes.
#[derive(Debug, Clone, Copy)]
pub struct Stage {
    pub matched: OutputTag,
    pub left_only: OutputTag,
    pub right_only: OutputTag,
    /// Labels of the first and second member of a match.
    pub matched_labels: [&'static str; 2],
    /// Labels of a lone left / right record.
    pub source_labels: [&'static str; 2],
    /// Matched gaps are visit lengths: emit `stay_days` and `match_score`.
    pub visit_fields: bool,
}

impl Stage {
    pub const GENESIS: Stage = Stage {
        matched: OutputTag::Both,
        left_only: OutputTag::OpeningOnly,
        right_only: OutputTag::ClosingOnly,
        matched_labels: ["opening", "closing"],
        source_labels: ["opening", "closing"],
        visit_fields: true,
    };

    /// Tower/towed pairs. Lone legs keep their genesis tags.
    pub const PAIRING: Stage = Stage {
        matched: OutputTag::Paired,
        left_only: OutputTag::OpeningOnly,
        right_only: OutputTag::ClosingOnly,
        matched_labels: ["tower", "towed"],
        source_labels: ["opening", "closing"],
        visit_fields: false,
    };

    pub const CROSS: Stage = Stage {
        matched: OutputTag::Both,
        left_only: OutputTag::AOnly,
        right_only: OutputTag::BOnly,
        matched_labels: ["a", "b"],
        source_labels: ["a", "b"],
        visit_fields: false,
    };

    fn residual_tag(&self, source: Source) -> OutputTag {
        match source {
            Source::Left => self.left_only,
            Source::Right => self.right_only,
        }
    }

    fn residual_label(&self, source: Source) -> &'static str {
        match source {
            Source::Left => self.source_labels[0],
            Source::Right => self.source_labels[1],
        }
    }
}

#[derive(Debug)]
pub struct Assembled {
    pub records: Vec<OutputRecord>,
    pub derivations_not_computable: usize,
}

pub struct Assembler<'c> {
    id_prefix: &'c str,
    derived: Option<&'c DerivedConfig>,
    records: Vec<OutputRecord>,
    derivations_not_computable: usize,
}

impl<'c> Assembler<'c> {
    pub fn new(id_prefix: &'c str, derived: Option<&'c DerivedConfig>) -> Self {
        Self {
            id_prefix,
            derived,
            records: Vec::new(),
            derivations_not_computable: 0,
        }
    }

    fn next_id(&self) -> String {
        format!("{}_{:06}", self.id_prefix, self.records.len() + 1)
    }

    fn merge_payload(&mut self, payload: &mut IndexMap<String, String>, label: &str, member: &Member<'_>) {
        for (key, value) in &member.record.payload {
            payload.insert(format!("{label}.{key}"), value.clone());
        }
        let Some(config) = self.derived else {
            return;
        };
        match derived::assess_payload(&member.record.payload, config) {
            Ok(assessment) => {
                payload.insert(
                    format!("{label}.draft_pct_of_max"),
                    format!("{:.1}", assessment.pct_of_max),
                );
                payload.insert(
                    format!("{label}.forecasted_activity"),
                    assessment.activity.to_string(),
                );
            }
            Err(err) => {
                tracing::trace!(record_id = %member.record.record_id, "draft not computable: {err}");
                self.derivations_not_computable += 1;
            }
        }
    }

    /// Append one outcome. Matched outcomes look their result up in `ledger`.
    pub fn push(&mut self, stage: &Stage, outcome: &Outcome<'_>, ledger: &Ledger) -> Result<(), ReconError> {
        let output_id = self.next_id();
        let mut payload = IndexMap::new();

        let record = match outcome {
            Outcome::Matched { members, result } => {
                let result = ledger
                    .result(*result)
                    .ok_or(ReconError::UnknownResult { index: *result })?;
                let mut out_members = Vec::with_capacity(2);
                for (member, label) in members.iter().zip(stage.matched_labels) {
                    self.merge_payload(&mut payload, label, member);
                    out_members.push(OutputMember {
                        source: member.source,
                        record_id: member.record.record_id.clone(),
                        label: label.to_string(),
                    });
                }
                OutputRecord {
                    output_id,
                    tag: stage.matched,
                    method: result.method,
                    result_id: Some(result.result_id),
                    pass_number: result.pass_number,
                    confidence: Some(result.confidence),
                    gap: Some(result.gap),
                    stay_days: stage.visit_fields.then(|| result.gap.trunc() as i64),
                    match_score: stage.visit_fields.then(|| result.confidence.score()).flatten(),
                    reason: None,
                    members: out_members,
                    payload,
                }
            }
            Outcome::Unmatched { member, reason } => {
                let label = stage.residual_label(member.source);
                self.merge_payload(&mut payload, label, member);
                OutputRecord {
                    output_id,
                    tag: stage.residual_tag(member.source),
                    method: MatchMethod::None,
                    result_id: None,
                    pass_number: None,
                    confidence: None,
                    gap: None,
                    stay_days: None,
                    match_score: None,
                    reason: Some(*reason),
                    members: vec![OutputMember {
                        source: member.source,
                        record_id: member.record.record_id.clone(),
                        label: label.to_string(),
                    }],
                    payload,
                }
            }
        };

        self.records.push(record);
        Ok(())
    }

    /// Verify every input record appears in exactly one output record.
    pub fn finish(self, input: &ReconInput) -> Result<Assembled, ReconError> {
        let mut seen: HashMap<(Source, &str), usize> = HashMap::new();
        for record in &self.records {
            for m in &record.members {
                *seen.entry((m.source, m.record_id.as_str())).or_insert(0) += 1;
            }
        }

        let mut missing = 0;
        let mut expected = 0;
        for source in [Source::Left, Source::Right] {
            for record in input.records(source) {
                expected += 1;
                if !seen.contains_key(&(source, record.record_id.as_str())) {
                    missing += 1;
                }
            }
        }
        let emitted: usize = seen.values().sum();
        let duplicated = seen.values().map(|&n| n.saturating_sub(1)).sum::<usize>()
            + (seen.len() + missing).saturating_sub(expected);

        if missing > 0 || duplicated > 0 {
            tracing::error!(missing, duplicated, emitted, expected, "output is not complete");
            return Err(ReconError::Incomplete { missing, duplicated });
        }

        Ok(Assembled {
            records: self.records,
            derivations_not_computable: self.derivations_not_computable,
        })
    }
}

/// Outcome for a record without a location key.
pub fn malformed<'a>(member: Member<'a>) -> Outcome<'a> {
    Outcome::Unmatched {
        member,
        reason: UnmatchedReason::Malformed,
    }
}
