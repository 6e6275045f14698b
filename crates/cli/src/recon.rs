//! `pcrecon run` / `pcrecon validate`: job-file driven record linkage.

use std::path::{Path, PathBuf};

use clap::Subcommand;

use portcall_recon::{Mode, MovementRecord, ReconInput, ReconResult, Role};

use crate::exit_codes::{EXIT_RECON_INVALID_CONFIG, EXIT_RECON_RUNTIME, EXIT_USAGE};
use crate::export::write_records_csv;
use crate::ingest::load_records;
use crate::job::{JobConfig, SourceConfig};
use crate::CliError;

#[derive(Subcommand)]
pub enum ReconCommands {
    /// Run record linkage from a TOML job file
    #[command(after_help = "\
Examples:
  pcrecon run portcalls.toml
  pcrecon run portcalls.toml --json
  pcrecon run portcalls.toml --output result.json --csv portcalls.csv")]
    Run {
        /// Path to the job file
        job: PathBuf,

        /// Output JSON to stdout instead of the human summary only
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write output records as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Validate a job file without running
    #[command(after_help = "\
Examples:
  pcrecon validate portcalls.toml")]
    Validate {
        /// Path to the job file
        job: PathBuf,
    },
}

pub fn cmd_recon(cmd: ReconCommands) -> Result<(), CliError> {
    match cmd {
        ReconCommands::Run { job, json, output, csv } => cmd_recon_run(&job, json, output, csv),
        ReconCommands::Validate { job } => cmd_recon_validate(&job),
    }
}

fn recon_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

fn load_job(job_path: &Path) -> Result<JobConfig, CliError> {
    let text = std::fs::read_to_string(job_path).map_err(|e| {
        recon_err(EXIT_USAGE, format!("cannot read job file {}: {e}", job_path.display()))
    })?;
    JobConfig::from_toml(&text).map_err(|e| {
        recon_err(EXIT_RECON_INVALID_CONFIG, e.to_string())
            .with_hint("run `pcrecon validate <job.toml>` after editing")
    })
}

fn load_source(name: &str, path: &Path, config: &SourceConfig, role: Role) -> Result<Vec<MovementRecord>, CliError> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot read {}: {e}", path.display())))?;
    load_records(name, &data, config, role).map_err(|e| recon_err(EXIT_RECON_RUNTIME, e.to_string()))
}

fn cmd_recon_run(
    job_path: &Path,
    json_output: bool,
    output_file: Option<PathBuf>,
    csv_file: Option<PathBuf>,
) -> Result<(), CliError> {
    let job = load_job(job_path)?;
    let (left_path, right_path) = job.source_paths(job_path);

    let (left_role, right_role) = match job.engine.mode {
        Mode::PortCall => (Role::Opening, Role::Closing),
        Mode::CrossDataset => (Role::Unassigned, Role::Unassigned),
    };
    let left = load_source("left", &left_path, &job.sources.left, left_role)?;
    let right = load_source("right", &right_path, &job.sources.right, right_role)?;
    let input = ReconInput::new(left, right);

    let result = portcall_recon::run(&job.engine, &input)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, e.to_string()))?;

    let json_str = serde_json::to_string_pretty(&result)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = output_file {
        std::fs::write(path, &json_str)
            .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if let Some(ref path) = csv_file {
        let file = std::fs::File::create(path)
            .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot create {}: {e}", path.display())))?;
        write_records_csv(&result.records, std::io::BufWriter::new(file))
            .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot write CSV: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{json_str}");
    }

    eprintln!("{}", summary_line(&result));
    Ok(())
}

/// One-line human summary printed to stderr after a run.
fn summary_line(result: &ReconResult) -> String {
    let s = &result.summary;
    let mut line = format!(
        "{} recon: {} records -> {} outputs ({} matched, {} unmatched) across {} locations",
        result.meta.mode, s.total_records, s.total_outputs, s.matched, s.unmatched, result.meta.partitions,
    );
    if let Some(ref gap) = s.gap {
        line.push_str(&format!("; median gap {:.1}", gap.median));
    }
    if let Some(g) = result.meta.grouping {
        line.push_str(&format!("; {} right rows grouped into {}", g.rows, g.records));
    }
    if s.derivations_not_computable > 0 {
        line.push_str(&format!("; {} derivations not computable", s.derivations_not_computable));
    }
    line
}

fn cmd_recon_validate(job_path: &Path) -> Result<(), CliError> {
    let job = load_job(job_path)?;
    let (left, right) = job.source_paths(job_path);

    eprintln!("valid: {} ({})", job.engine.name, job.engine.mode);
    eprintln!("  left:  {}", left.display());
    eprintln!("  right: {}", right.display());
    match job.engine.mode {
        Mode::PortCall => eprintln!(
            "  genesis: HIGH <= {} days, MEDIUM <= {} days; co-occurrence {}",
            job.engine.genesis.high_max_days,
            job.engine.genesis.medium_max_days,
            if job.engine.cooccurrence.enabled { "on" } else { "off" },
        ),
        Mode::CrossDataset => eprintln!("  tolerance passes: {:?} days", job.engine.tolerance.passes),
    }
    if let Some(ref g) = job.engine.grouping {
        eprintln!(
            "  grouping: {}_NNNNNNN by vessel, location, date{}",
            g.id_prefix,
            g.key_fields.iter().map(|f| format!(", {f}")).collect::<String>(),
        );
    }
    Ok(())
}
