use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use camino::Utf8PathBuf;
use chrono::Utc;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_protein_enricher::alphafold::AlphaFoldDirectory;
use kira_protein_enricher::artifact::StructureFileFetcher;
use kira_protein_enricher::config::{ConfigLoader, EndIndex, RunConfig, RunOverrides};
use kira_protein_enricher::console::{ConsoleRunner, log_writer};
use kira_protein_enricher::domain::ProteinRecord;
use kira_protein_enricher::enricher::RecordEnricher;
use kira_protein_enricher::error::EnrichError;
use kira_protein_enricher::fasta::read_fasta;
use kira_protein_enricher::http::RetryPolicy;
use kira_protein_enricher::ncbi::NcbiProteinDirectory;
use kira_protein_enricher::pipeline::{BatchPipeline, CancellationToken};
use kira_protein_enricher::report::{ReportAssembler, RunSummary, render_json};

#[derive(Parser)]
#[command(name = "kira-enrich")]
#[command(about = "Enrich protein FASTA records with NCBI and AlphaFold DB annotations")]
#[command(version, author)]
struct Cli {
    /// Protein FASTA file.
    input: PathBuf,

    #[arg(long, short)]
    output: Option<Utf8PathBuf>,

    /// First record to process (1-based).
    #[arg(long)]
    start: Option<usize>,

    /// Last record to process (1-based, inclusive) or `all`.
    #[arg(long)]
    end: Option<EndIndex>,

    /// Seconds to wait between records.
    #[arg(long)]
    delay: Option<f64>,

    #[arg(long)]
    max_retries: Option<u32>,

    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the JSON report to stdout.
    #[arg(long)]
    json: bool,

    #[arg(long)]
    non_interactive: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<EnrichError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &EnrichError) -> u8 {
    match error {
        EnrichError::InvalidRange { .. }
        | EnrichError::InvalidConfig(_)
        | EnrichError::ConfigRead(_)
        | EnrichError::ConfigParse(_)
        | EnrichError::InvalidIdentifier(_)
        | EnrichError::InvalidRecord(_)
        | EnrichError::Fasta(_) => 2,
        EnrichError::HttpClient { .. }
        | EnrichError::Transport { .. }
        | EnrichError::RetriesExhausted { .. }
        | EnrichError::RemoteStatus { .. }
        | EnrichError::MalformedResponse { .. }
        | EnrichError::TransferInterrupted { .. } => 3,
        _ => 1,
    }
}

/// Reads the FASTA file and checks the record range against it. Runs before
/// any network client exists.
fn load_batch(
    input: &Path,
    run_config: &RunConfig,
) -> Result<(Vec<ProteinRecord>, usize), EnrichError> {
    let records = read_fasta(input)?;
    let (start, end) = run_config.bounds(records.len())?;
    Ok((records, end - start + 1))
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(log_writer)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::load(cli.config.as_deref())?;
    let run_config = config.run_config(RunOverrides {
        start_index: cli.start,
        end_index: cli.end,
        inter_request_delay_seconds: cli.delay,
        max_retries: cli.max_retries,
        output_directory: cli.output,
    })?;

    let (records, selected) = load_batch(&cli.input, &run_config)?;

    let policy = RetryPolicy::from_settings(run_config.max_retries, &config.retry);
    let primary = NcbiProteinDirectory::from_settings(&config.ncbi, policy)?;
    let structure = AlphaFoldDirectory::from_settings(&config.alphafold, policy)?;
    let artifacts = StructureFileFetcher::from_settings(&config.alphafold, policy)?;
    let pipeline = BatchPipeline::new(RecordEnricher::new(primary, structure, artifacts));

    let cancel = CancellationToken::new();
    let runner = ConsoleRunner::new(cli.non_interactive);
    let started_at = Utc::now();
    let worker_cancel = cancel.clone();
    let worker_config = run_config.clone();
    let results = runner.run(&cancel, move |progress| {
        pipeline.run(&records, &worker_config, &progress, &worker_cancel)
    })?;
    let finished_at = Utc::now();

    let summary = RunSummary::new(
        cli.input.display().to_string(),
        started_at,
        finished_at,
        selected,
        &results,
    );
    let paths =
        ReportAssembler::new(run_config.output_directory.clone()).write(&summary, &results)?;

    eprintln!(
        "processed {}/{} records: {} success, {} partial, {} failed{}",
        summary.completed,
        summary.selected,
        summary.counts.success,
        summary.counts.partial_success,
        summary.counts.failed,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    eprintln!("report: {}", paths.csv);

    if cli.json {
        let document = render_json(&summary, &results)?;
        std::io::stdout().write_all(&document).into_diagnostic()?;
    }
    Ok(())
}
