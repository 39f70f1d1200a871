//! ntloop CLI

mod algorithm;
mod job;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use nl_core::{KeyColumns, LoopMode, RecordSource, StreamKind};
use nl_io::{ColumnBinder, ParquetSource};
use nl_loop::{CorrespondenceTable, Job};

use algorithm::DileptonSummary;

#[derive(Parser)]
#[command(name = "ntloop")]
#[command(about = "ntloop - event loop over reco/particle-level ntuples")]
#[command(version)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dilepton summary over the inputs of a job config
    Run {
        /// Job config (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Override the config's loop mode
        #[arg(long)]
        loop_mode: Option<LoopMode>,

        /// Output file for the JSON report (overrides the config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build the reco/particle correspondence table and print its summary
    Index {
        #[arg(long)]
        reco: PathBuf,

        #[arg(long)]
        particle: PathBuf,

        /// Key events by randomRunNumber
        #[arg(long)]
        random_run_number: bool,

        /// Include every paired and unmatched entry
        #[arg(long)]
        full: bool,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the schema version and columns of a Parquet ntuple
    Inspect {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Run { config, loop_mode, output } => cmd_run(&config, loop_mode, output.as_ref()),
        Commands::Index { reco, particle, random_run_number, full, output } => {
            cmd_index(&reco, &particle, random_run_number, full, output.as_ref())
        }
        Commands::Inspect { input, output } => cmd_inspect(&input, output.as_ref()),
    }
}

fn cmd_run(config: &Path, loop_mode: Option<LoopMode>, output: Option<&PathBuf>) -> Result<()> {
    let cfg = job::read_job_config(config)?;
    let mut streams = cfg.open_streams()?;
    let binder = ColumnBinder::with_catalog(cfg.catalog()?);

    let runner = Job::new()
        .loop_mode(loop_mode.unwrap_or(cfg.loop_mode))
        .progress(cfg.progress)
        .progress_step(cfg.progress_step_percent);

    let mut alg = DileptonSummary::new();
    runner.run(&mut streams, &binder, &mut alg).with_context(|| format!("job {} failed", config.display()))?;
    let report = alg.report().context("algorithm produced no report")?;

    let output = output.cloned().or_else(|| cfg.output_path());
    write_json(output.as_ref(), serde_json::to_value(report)?)
}

fn cmd_index(
    reco: &Path,
    particle: &Path,
    random_run_number: bool,
    full: bool,
    output: Option<&PathBuf>,
) -> Result<()> {
    let keys = if random_run_number { KeyColumns::default().with_random_run_number() } else { KeyColumns::default() };
    let reco = job::open_stream(StreamKind::Reco, reco, None, keys.clone())?;
    let particle = job::open_stream(StreamKind::Particle, particle, None, keys)?;
    let table = CorrespondenceTable::correlate(&reco, &particle)?;

    let mut out = serde_json::json!({
        "reco_entries": table.n_reco(),
        "particle_entries": table.n_particle(),
        "summary": table.summary(),
    });
    if full {
        out["paired"] = serde_json::to_value(table.paired())?;
        out["reco_only"] = serde_json::to_value(table.reco_only())?;
        out["particle_only"] = serde_json::to_value(table.particle_only())?;
    }
    write_json(output, out)
}

fn cmd_inspect(input: &Path, output: Option<&PathBuf>) -> Result<()> {
    let source = ParquetSource::open(input).with_context(|| format!("failed to open {}", input.display()))?;
    let columns: Vec<serde_json::Value> = source
        .column_names()
        .into_iter()
        .filter_map(|name| {
            let ty = source.physical_type(&name)?;
            Some(serde_json::json!({ "name": name, "type": ty.to_string() }))
        })
        .collect();
    let out = serde_json::json!({
        "input": input.display().to_string(),
        "entries": source.n_entries(),
        "schema_version": source.schema_version().0,
        "columns": columns,
    });
    write_json(output, out)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    let s = serde_json::to_string_pretty(&value)?;
    if let Some(path) = output {
        std::fs::write(path, s).with_context(|| format!("failed to write {}", path.display()))?;
    } else {
        println!("{}", s);
    }
    Ok(())
}
