//! Report rendering for a finished (or cancelled) batch.
//!
//! One CSV row per result in index order, plus a JSON document carrying the
//! run summary and every result. Both files are written through a temp file
//! in the output directory and renamed into place.

use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::domain::{EnrichmentResult, EnrichmentStatus};
use crate::error::EnrichError;

pub const REPORT_BASENAME: &str = "analysis_results";

/// Report header. The `D.*` (DALI) and `M.*` columns, `Interpro` and
/// `PDB E.value` are filled in by hand after the run.
pub const COLUMNS: [&str; 22] = [
    "Folder",
    "Protein ID",
    "Gene ID",
    "Uniport ID",
    "AA",
    "PLDDT",
    "D.ID",
    "D.Z SCORE",
    "D.RMSD",
    "D.NAME",
    "M.ID",
    "M.IM",
    "M.RSMD",
    "M.NAME",
    "Interpro",
    "NCBI",
    "PDB E.value",
    "Species",
    "Alpha missense",
    "Structure file",
    "Status",
    "Errors",
];

const INTERPRO_PLACEHOLDER: &str = "MANUAL ENTRY: Run InterProScan and summarize results here.";
const PDB_EVALUE_PLACEHOLDER: &str = "MANUAL ENTRY: From AlphaFold website.";
const NOT_FOUND: &str = "Not Found";
const NOT_AVAILABLE: &str = "N/A";
const MANUAL_COLUMNS: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub success: usize,
    pub partial_success: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub input: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub selected: usize,
    pub completed: usize,
    pub cancelled: bool,
    pub counts: StatusCounts,
}

impl RunSummary {
    pub fn new(
        input: impl Into<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        selected: usize,
        results: &[EnrichmentResult],
    ) -> Self {
        let mut counts = StatusCounts::default();
        for result in results {
            match result.status() {
                EnrichmentStatus::Success => counts.success += 1,
                EnrichmentStatus::PartialSuccess => counts.partial_success += 1,
                EnrichmentStatus::Failed => counts.failed += 1,
            }
        }
        Self {
            input: input.into(),
            started_at,
            finished_at,
            selected,
            completed: results.len(),
            cancelled: results.len() < selected,
            counts,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportDocument<'a> {
    pub summary: &'a RunSummary,
    pub results: &'a [EnrichmentResult],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub csv: Utf8PathBuf,
    pub json: Utf8PathBuf,
}

pub struct ReportAssembler {
    output_dir: Utf8PathBuf,
}

impl ReportAssembler {
    pub fn new(output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn paths(&self) -> ReportPaths {
        ReportPaths {
            csv: self.output_dir.join(format!("{REPORT_BASENAME}.csv")),
            json: self.output_dir.join(format!("{REPORT_BASENAME}.json")),
        }
    }

    pub fn write(
        &self,
        summary: &RunSummary,
        results: &[EnrichmentResult],
    ) -> Result<ReportPaths, EnrichError> {
        fs::create_dir_all(self.output_dir.as_std_path()).map_err(|err| {
            EnrichError::Report(format!("create {}: {err}", self.output_dir))
        })?;
        let paths = self.paths();
        write_atomic(&paths.csv, &render_csv(results)?)?;
        write_atomic(&paths.json, &render_json(summary, results)?)?;
        info!(csv = %paths.csv, json = %paths.json, "report written");
        Ok(paths)
    }
}

pub fn render_json(summary: &RunSummary, results: &[EnrichmentResult]) -> Result<Vec<u8>, EnrichError> {
    let mut bytes = serde_json::to_vec_pretty(&ReportDocument { summary, results })
        .map_err(|err| EnrichError::Report(err.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn render_csv(results: &[EnrichmentResult]) -> Result<Vec<u8>, EnrichError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(COLUMNS)
        .map_err(|err| EnrichError::Report(err.to_string()))?;
    for result in results {
        writer
            .write_record(row(result))
            .map_err(|err| EnrichError::Report(err.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|err| EnrichError::Report(err.to_string()))
}

fn row(result: &EnrichmentResult) -> Vec<String> {
    let record = result.record();
    let errors = result
        .errors()
        .iter()
        .map(|detail| detail.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    let mut row = Vec::with_capacity(COLUMNS.len());
    row.extend([
        record.index().to_string(),
        record.identifier().to_string(),
        or_not_found(result.locus_tag().map(|tag| tag.to_string())),
        or_not_found(result.accession_id().map(|acc| acc.to_string())),
        or_not_available(result.sequence_length().map(|len| len.to_string())),
        or_not_available(result.confidence_score().map(|score| format!("{score:.2}"))),
    ]);
    row.extend(std::iter::repeat_n(String::new(), MANUAL_COLUMNS));
    row.extend([
        INTERPRO_PLACEHOLDER.to_string(),
        or_not_found(result.description().map(str::to_string)),
        PDB_EVALUE_PLACEHOLDER.to_string(),
        result
            .species()
            .map(|species| species.to_string())
            .unwrap_or_default(),
        if result.has_alpha_missense() { "Yes" } else { "" }.to_string(),
        result
            .artifact_path()
            .map(|path| path.to_string())
            .unwrap_or_default(),
        result.status().to_string(),
        errors,
    ]);
    row
}

fn or_not_found(value: Option<String>) -> String {
    value.unwrap_or_else(|| NOT_FOUND.to_string())
}

fn or_not_available(value: Option<String>) -> String {
    value.unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), EnrichError> {
    let parent = path
        .parent()
        .ok_or_else(|| EnrichError::Report(format!("invalid report path {path}")))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".kira-report")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| EnrichError::Report(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| EnrichError::Report(format!("write {path}: {err}")))?;
    temp.persist(path.as_std_path())
        .map_err(|err| EnrichError::Report(format!("persist {path}: {}", err.error)))?;
    Ok(())
}
