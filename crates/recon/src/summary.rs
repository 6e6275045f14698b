use std::collections::BTreeMap;

use crate::model::{GapStats, OutputRecord, OutputTag, ReconSummary};

/// Compute summary counters from assembled output records. Gap statistics cover `BOTH`
/// records only.
pub fn compute_summary(
    records: &[OutputRecord],
    total_records: usize,
    derivations_not_computable: usize,
) -> ReconSummary {
    let mut by_tag: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_method: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_pass: BTreeMap<u32, usize> = BTreeMap::new();
    let mut by_confidence: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_reason: BTreeMap<String, usize> = BTreeMap::new();
    let mut gaps: Vec<f64> = Vec::new();
    let mut matched = 0;
    let mut unmatched = 0;

    for r in records {
        *by_tag.entry(r.tag.to_string()).or_insert(0) += 1;
        *by_method.entry(r.method.to_string()).or_insert(0) += 1;

        if r.tag.is_matched() {
            matched += 1;
        } else {
            unmatched += 1;
        }
        if let Some(pass) = r.pass_number {
            *by_pass.entry(pass).or_insert(0) += 1;
        }
        if let Some(confidence) = r.confidence {
            *by_confidence.entry(confidence.to_string()).or_insert(0) += 1;
        }
        if let Some(reason) = r.reason {
            *by_reason.entry(reason.to_string()).or_insert(0) += 1;
        }
        if r.tag == OutputTag::Both {
            if let Some(gap) = r.gap {
                gaps.push(gap);
            }
        }
    }

    ReconSummary {
        total_records,
        total_outputs: records.len(),
        matched,
        unmatched,
        by_tag,
        by_method,
        by_pass,
        by_confidence,
        by_reason,
        gap: gap_stats(gaps),
        derivations_not_computable,
    }
}

fn gap_stats(mut gaps: Vec<f64>) -> Option<GapStats> {
    if gaps.is_empty() {
        return None;
    }
    gaps.sort_by(f64::total_cmp);
    let count = gaps.len();
    let mean = gaps.iter().sum::<f64>() / count as f64;
    let median = if count % 2 == 1 {
        gaps[count / 2]
    } else {
        (gaps[count / 2 - 1] + gaps[count / 2]) / 2.0
    };
    Some(GapStats {
        count,
        mean,
        median,
        min: gaps[0],
        max: gaps[count - 1],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Confidence, MatchMethod, UnmatchedReason};
    use indexmap::IndexMap;

    fn output(tag: OutputTag, method: MatchMethod) -> OutputRecord {
        OutputRecord {
            output_id: "PC_000001".into(),
            tag,
            method,
            result_id: None,
            pass_number: None,
            confidence: None,
            gap: None,
            stay_days: None,
            match_score: None,
            reason: None,
            members: Vec::new(),
            payload: IndexMap::new(),
        }
    }

    fn matched(gap: f64, confidence: Confidence, pass: Option<u32>) -> OutputRecord {
        let mut r = output(OutputTag::Both, MatchMethod::SecondaryKey);
        r.gap = Some(gap);
        r.confidence = Some(confidence);
        r.pass_number = pass;
        r
    }

    fn lone(tag: OutputTag, reason: UnmatchedReason) -> OutputRecord {
        let mut r = output(tag, MatchMethod::None);
        r.reason = Some(reason);
        r
    }

    #[test]
    fn summary_counts() {
        let mut paired = output(OutputTag::Paired, MatchMethod::CoOccurrence);
        paired.confidence = Some(Confidence::Historical(3));
        paired.gap = Some(1.0);

        let records = vec![
            matched(1.0, Confidence::High, Some(1)),
            matched(3.0, Confidence::Medium, Some(2)),
            matched(8.0, Confidence::High, Some(1)),
            paired,
            lone(OutputTag::AOnly, UnmatchedReason::NoCandidate),
            lone(OutputTag::BOnly, UnmatchedReason::NoDate),
            lone(OutputTag::BOnly, UnmatchedReason::NoCandidate),
        ];
        let summary = compute_summary(&records, 11, 2);
        assert_eq!(summary.total_records, 11);
        assert_eq!(summary.total_outputs, 7);
        assert_eq!(summary.matched, 4);
        assert_eq!(summary.unmatched, 3);
        assert_eq!(summary.by_tag["BOTH"], 3);
        assert_eq!(summary.by_tag["B_ONLY"], 2);
        assert_eq!(summary.by_method["CO_OCCURRENCE"], 1);
        assert_eq!(summary.by_method["NONE"], 3);
        assert_eq!(summary.by_pass[&1], 2);
        assert_eq!(summary.by_pass[&2], 1);
        assert_eq!(summary.by_confidence["HIGH"], 2);
        assert_eq!(summary.by_confidence["HIST_3X"], 1);
        assert_eq!(summary.by_reason["NO_CANDIDATE"], 2);
        assert_eq!(summary.derivations_not_computable, 2);

        let gap = summary.gap.unwrap();
        assert_eq!(gap.count, 3);
        assert_eq!(gap.mean, 4.0);
        assert_eq!(gap.median, 3.0);
        assert_eq!(gap.min, 1.0);
        assert_eq!(gap.max, 8.0);
    }

    #[test]
    fn no_matches_means_no_gap_stats() {
        let records = vec![lone(OutputTag::OpeningOnly, UnmatchedReason::NoDate)];
        let summary = compute_summary(&records, 1, 0);
        assert!(summary.gap.is_none());
        assert_eq!(summary.matched, 0);
        assert!(summary.by_pass.is_empty());
    }

    #[test]
    fn even_count_median_is_midpoint() {
        let stats = gap_stats(vec![4.0, 1.0, 2.0, 10.0]).unwrap();
        assert_eq!(stats.median, 3.0);
        assert_eq!(stats.mean, 4.25);
    }
}
