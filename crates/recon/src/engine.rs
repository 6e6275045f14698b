use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};

use rayon::prelude::*;

use crate::assemble::{self, Assembler, Stage};
use crate::config::{Mode, ReconConfig};
use crate::cooccur::{self, CooccurrenceTable};
use crate::error::ReconError;
use crate::genesis;
use crate::group;
use crate::ledger::{Ledger, Member, Outcome, Shard};
use crate::model::{
    GroupingStats, MovementRecord, ReconInput, ReconMeta, ReconResult, Source, UnmatchedReason,
};
use crate::store::RecordStore;
use crate::summary::compute_summary;
use crate::tolerance;

/// Run reconciliation per config. Returns tagged output records, the match ledger and a
/// summary.
pub fn run(config: &ReconConfig, input: &ReconInput) -> Result<ReconResult, ReconError> {
    config.validate()?;
    input.validate()?;

    tracing::info!(
        name = %config.name,
        mode = %config.mode,
        left = input.left.len(),
        right = input.right.len(),
        parallel = config.parallel,
        "reconciliation started"
    );

    let mut grouping = None;
    let input: Cow<'_, ReconInput> = match &config.grouping {
        Some(g) => {
            let grouped = ReconInput::new(input.left.clone(), group::collapse(&input.right, g));
            grouped.validate()?;
            grouping = Some(GroupingStats {
                rows: input.right.len(),
                records: grouped.right.len(),
            });
            Cow::Owned(grouped)
        }
        None => Cow::Borrowed(input),
    };

    let left = RecordStore::build(&input.left);
    let right = RecordStore::build(&input.right);
    let locations: Vec<&str> = left
        .locations()
        .chain(right.locations())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut ledger = Ledger::new();
    let mut asm = Assembler::new(&config.id_prefix, config.derived.as_ref());

    match config.mode {
        Mode::PortCall => run_port_call(config, &left, &right, &locations, &mut ledger, &mut asm)?,
        Mode::CrossDataset => run_cross_dataset(config, &left, &right, &locations, &mut ledger, &mut asm)?,
    }

    let assembled = asm.finish(&input)?;
    let summary = compute_summary(
        &assembled.records,
        input.len(),
        assembled.derivations_not_computable,
    );

    tracing::info!(
        outputs = summary.total_outputs,
        matched = summary.matched,
        unmatched = summary.unmatched,
        "reconciliation complete"
    );

    Ok(ReconResult {
        meta: ReconMeta {
            config_name: config.name.clone(),
            mode: config.mode.to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            partitions: locations.len(),
            parallel: config.parallel,
            grouping,
        },
        summary,
        records: assembled.records,
        matches: ledger.into_results(),
    })
}

/// Apply `f` to every location, in parallel or not. Results come back in location order
/// either way.
fn for_each_location<'a, T, F>(
    locations: &[&'a str],
    parallel: bool,
    f: F,
) -> Result<Vec<T>, ReconError>
where
    T: Send,
    F: Fn(&'a str) -> Result<T, ReconError> + Sync,
{
    if parallel {
        locations.par_iter().map(|&loc| f(loc)).collect()
    } else {
        locations.iter().map(|&loc| f(loc)).collect()
    }
}

/// Fold shards into the run ledger in order, rebasing their outcomes.
fn absorb<'a>(ledger: &mut Ledger, shards: Vec<Shard<'a>>) -> Result<Vec<Outcome<'a>>, ReconError> {
    let mut outcomes = Vec::new();
    for shard in shards {
        let offset = ledger.absorb(shard.ledger)?;
        outcomes.extend(shard.outcomes.into_iter().map(|o| o.rebase(offset)));
    }
    Ok(outcomes)
}

fn push_malformed<'a>(
    asm: &mut Assembler<'_>,
    stage: &Stage,
    left: &RecordStore<'a>,
    right: &RecordStore<'a>,
    ledger: &Ledger,
) -> Result<(), ReconError> {
    let lone = left
        .malformed()
        .iter()
        .map(|r| Member::new(Source::Left, r))
        .chain(right.malformed().iter().map(|r| Member::new(Source::Right, r)));
    let mut count = 0usize;
    for member in lone {
        asm.push(stage, &assemble::malformed(member), ledger)?;
        count += 1;
    }
    if count > 0 {
        tracing::warn!(count, "records without a location key passed through as MALFORMED");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Port-call mode: genesis, then co-occurrence over the residuals
// ---------------------------------------------------------------------------

fn run_port_call<'a>(
    config: &ReconConfig,
    left: &RecordStore<'a>,
    right: &RecordStore<'a>,
    locations: &[&'a str],
    ledger: &mut Ledger,
    asm: &mut Assembler<'_>,
) -> Result<(), ReconError> {
    let shards = for_each_location(locations, config.parallel, |loc| {
        let shard = genesis::match_location(left.partition(loc), right.partition(loc), &config.genesis)?;
        tracing::debug!(location = loc, claims = shard.ledger.len(), "genesis partition done");
        Ok(shard)
    })?;
    let genesis_outcomes = absorb(ledger, shards)?;
    tracing::info!(pairs = ledger.len(), "genesis complete");

    let mut pair_outcomes: Vec<Outcome<'a>> = Vec::new();
    if config.cooccurrence.enabled {
        for source in [Source::Left, Source::Right] {
            let residuals = genesis_outcomes.iter().filter_map(|o| match o {
                Outcome::Unmatched { member, .. } if member.source == source => Some(member.record),
                _ => None,
            });
            pair_outcomes.extend(pair_residuals(config, residuals, source, ledger)?);
        }
    }

    let mut paired: HashSet<(Source, &str)> = HashSet::new();
    let mut ambiguous: HashSet<(Source, &str)> = HashSet::new();
    for outcome in &pair_outcomes {
        match outcome {
            Outcome::Matched { members, .. } => paired.extend(members.iter().map(|m| m.key())),
            Outcome::Unmatched { member, .. } => {
                ambiguous.insert(member.key());
            }
        }
    }

    for outcome in &genesis_outcomes {
        match outcome {
            Outcome::Unmatched { member, .. } if paired.contains(&member.key()) => continue,
            Outcome::Unmatched { member, .. } if ambiguous.contains(&member.key()) => {
                let retagged = Outcome::Unmatched {
                    member: *member,
                    reason: UnmatchedReason::Ambiguous,
                };
                asm.push(&Stage::GENESIS, &retagged, ledger)?;
            }
            _ => asm.push(&Stage::GENESIS, outcome, ledger)?,
        }
    }

    push_malformed(asm, &Stage::GENESIS, left, right, ledger)?;

    for outcome in &pair_outcomes {
        if let Outcome::Matched { .. } = outcome {
            asm.push(&Stage::PAIRING, outcome, ledger)?;
        }
    }

    Ok(())
}

/// Co-occurrence over one population's genesis residuals.
fn pair_residuals<'a>(
    config: &ReconConfig,
    residuals: impl IntoIterator<Item = &'a MovementRecord>,
    source: Source,
    ledger: &mut Ledger,
) -> Result<Vec<Outcome<'a>>, ReconError> {
    let co = &config.cooccurrence;
    let (towers, towed) = cooccur::split_legs(residuals, co);
    if towers.is_empty() || towed.is_empty() {
        return Ok(Vec::new());
    }

    let table = CooccurrenceTable::from_legs(&towers, &towed);
    let tower_store = RecordStore::from_refs(towers.iter().copied());
    let towed_store = RecordStore::from_refs(towed.iter().copied());
    let locations: Vec<&'a str> = tower_store.locations().collect();

    let shards = for_each_location(&locations, config.parallel, |loc| {
        let legs = tower_store
            .partition(loc)
            .map(|p| p.records())
            .unwrap_or_default();
        cooccur::pair_location(legs, towed_store.partition(loc), source, &table, co.window_days)
    })?;

    let before = ledger.len();
    let outcomes = absorb(ledger, shards)?;
    tracing::info!(
        population = %source,
        towers = towers.len(),
        towed = towed.len(),
        table_pairs = table.len(),
        paired = ledger.len() - before,
        "co-occurrence complete"
    );
    Ok(outcomes)
}

// ---------------------------------------------------------------------------
// Cross-dataset mode
// ---------------------------------------------------------------------------

fn run_cross_dataset<'a>(
    config: &ReconConfig,
    left: &RecordStore<'a>,
    right: &RecordStore<'a>,
    locations: &[&'a str],
    ledger: &mut Ledger,
    asm: &mut Assembler<'_>,
) -> Result<(), ReconError> {
    let passes = &config.tolerance.passes;
    let shards = for_each_location(locations, config.parallel, |loc| {
        let shard = tolerance::match_location(left.partition(loc), right.partition(loc), passes)?;
        tracing::debug!(location = loc, claims = shard.ledger.len(), "tolerance partition done");
        Ok(shard)
    })?;
    let outcomes = absorb(ledger, shards)?;
    tracing::info!(links = ledger.len(), passes = passes.len(), "tolerance matching complete");

    for outcome in &outcomes {
        asm.push(&Stage::CROSS, outcome, ledger)?;
    }
    push_malformed(asm, &Stage::CROSS, left, right, ledger)
}
