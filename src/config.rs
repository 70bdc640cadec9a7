use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::ProteinRecord;
use crate::error::EnrichError;

pub const DEFAULT_CONFIG_FILE: &str = "kira-enrich.json";
pub const DEFAULT_OUTPUT_DIRECTORY: &str = "kira-enrich-output";
pub const DEFAULT_REQUEST_DELAY_SECONDS: f64 = 1.0;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub const NCBI_EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";
pub const ALPHAFOLD_SEARCH_URL: &str = "https://alphafold.ebi.ac.uk/api/search";
pub const ALPHAFOLD_PREDICTION_URL: &str = "https://alphafold.ebi.ac.uk/api/prediction";
pub const ALPHAFOLD_CLUSTER_URL: &str = "https://alphafold.ebi.ac.uk/api/cluster/members";
pub const ALPHAFOLD_FILE_URL_TEMPLATE: &str =
    "https://alphafold.ebi.ac.uk/files/AF-{accession}-F1-model_v4.pdb";

/// Last record of a run: a concrete 1-based index or the end of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndIndex {
    All,
    At(usize),
}

impl fmt::Display for EndIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndIndex::All => write!(f, "all"),
            EndIndex::At(index) => write!(f, "{index}"),
        }
    }
}

impl FromStr for EndIndex {
    type Err = EnrichError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(EndIndex::All);
        }
        trimmed
            .parse::<usize>()
            .map(EndIndex::At)
            .map_err(|_| EnrichError::InvalidConfig(format!("invalid end index: {value:?}")))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EndIndexEntry {
    Index(usize),
    Keyword(String),
}

impl EndIndexEntry {
    fn resolve(&self) -> Result<EndIndex, EnrichError> {
        match self {
            EndIndexEntry::Index(index) => Ok(EndIndex::At(*index)),
            EndIndexEntry::Keyword(value) => value.parse(),
        }
    }
}

/// Parameters of one batch run. Validated on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub start_index: usize,
    pub end_index: EndIndex,
    pub inter_request_delay: Duration,
    pub output_directory: Utf8PathBuf,
    pub max_retries: u32,
}

impl RunConfig {
    pub fn new(
        start_index: usize,
        end_index: EndIndex,
        inter_request_delay_seconds: f64,
        output_directory: Utf8PathBuf,
        max_retries: u32,
    ) -> Result<Self, EnrichError> {
        if start_index < 1 {
            return Err(EnrichError::InvalidConfig(
                "start index must be at least 1".to_string(),
            ));
        }
        if let EndIndex::At(end) = end_index {
            if end < start_index {
                return Err(EnrichError::InvalidConfig(format!(
                    "end index {end} is before start index {start_index}"
                )));
            }
        }
        let inter_request_delay =
            Duration::try_from_secs_f64(inter_request_delay_seconds).map_err(|_| {
                EnrichError::InvalidConfig(format!(
                    "inter-request delay must be a non-negative number of seconds, got {inter_request_delay_seconds}"
                ))
            })?;
        Ok(Self {
            start_index,
            end_index,
            inter_request_delay,
            output_directory,
            max_retries,
        })
    }

    /// Inclusive `[start, end]` bounds resolved against `total` records.
    pub fn bounds(&self, total: usize) -> Result<(usize, usize), EnrichError> {
        let end = match self.end_index {
            EndIndex::All => total,
            EndIndex::At(end) => end,
        };
        let start = self.start_index;
        if start < 1 || start > total || end < 1 || end > total || start > end {
            return Err(EnrichError::InvalidRange { start, end, total });
        }
        Ok((start, end))
    }

    /// The records this run covers, in input order.
    pub fn select<'a>(
        &self,
        records: &'a [ProteinRecord],
    ) -> Result<&'a [ProteinRecord], EnrichError> {
        let (start, end) = self.bounds(records.len())?;
        Ok(&records[start - 1..end])
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub ncbi: NcbiSettings,
    #[serde(default)]
    pub alphafold: AlphaFoldSettings,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RunSection {
    #[serde(default)]
    pub start_index: Option<usize>,
    #[serde(default)]
    pub end_index: Option<EndIndexEntry>,
    #[serde(default)]
    pub inter_request_delay_seconds: Option<f64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub output_directory: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NcbiSettings {
    pub efetch_url: String,
    pub timeout_seconds: u64,
    pub min_interval_ms: u64,
    pub api_key: Option<String>,
}

impl Default for NcbiSettings {
    fn default() -> Self {
        Self {
            efetch_url: NCBI_EFETCH_URL.to_string(),
            timeout_seconds: 30,
            min_interval_ms: 340,
            api_key: None,
        }
    }
}

impl NcbiSettings {
    /// Configured key, falling back to `NCBI_API_KEY`.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("NCBI_API_KEY").ok())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlphaFoldSettings {
    pub search_url: String,
    pub prediction_url: String,
    pub cluster_url: String,
    pub file_url_template: String,
    pub cluster_flag: String,
    pub timeout_seconds: u64,
    pub min_interval_ms: u64,
    pub general_species_threshold: u64,
    pub specific_species_threshold: u64,
}

impl Default for AlphaFoldSettings {
    fn default() -> Self {
        Self {
            search_url: ALPHAFOLD_SEARCH_URL.to_string(),
            prediction_url: ALPHAFOLD_PREDICTION_URL.to_string(),
            cluster_url: ALPHAFOLD_CLUSTER_URL.to_string(),
            file_url_template: ALPHAFOLD_FILE_URL_TEMPLATE.to_string(),
            cluster_flag: "AFDB50/MMseqs2".to_string(),
            timeout_seconds: 30,
            min_interval_ms: 200,
            general_species_threshold: 100,
            specific_species_threshold: 10,
        }
    }
}

/// Values given on the command line; they win over the config file.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub start_index: Option<usize>,
    pub end_index: Option<EndIndex>,
    pub inter_request_delay_seconds: Option<f64>,
    pub max_retries: Option<u32>,
    pub output_directory: Option<Utf8PathBuf>,
}

impl Config {
    pub fn run_config(&self, overrides: RunOverrides) -> Result<RunConfig, EnrichError> {
        let end_index = match overrides.end_index {
            Some(end) => end,
            None => match &self.run.end_index {
                Some(entry) => entry.resolve()?,
                None => EndIndex::All,
            },
        };
        RunConfig::new(
            overrides
                .start_index
                .or(self.run.start_index)
                .unwrap_or(1),
            end_index,
            overrides
                .inter_request_delay_seconds
                .or(self.run.inter_request_delay_seconds)
                .unwrap_or(DEFAULT_REQUEST_DELAY_SECONDS),
            overrides
                .output_directory
                .or_else(|| self.run.output_directory.clone())
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_OUTPUT_DIRECTORY)),
            overrides
                .max_retries
                .or(self.run.max_retries)
                .unwrap_or(DEFAULT_MAX_RETRIES),
        )
    }

    pub fn validate(&self) -> Result<(), EnrichError> {
        let alphafold = &self.alphafold;
        if alphafold.specific_species_threshold > alphafold.general_species_threshold {
            return Err(EnrichError::InvalidConfig(format!(
                "specific species threshold ({}) exceeds general threshold ({})",
                alphafold.specific_species_threshold, alphafold.general_species_threshold
            )));
        }
        if !alphafold.file_url_template.contains("{accession}") {
            return Err(EnrichError::InvalidConfig(
                "alphafold.file_url_template must contain {accession}".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(EnrichError::InvalidConfig(
                "retry.base_delay_ms exceeds retry.max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `kira-enrich.json` when present. No file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Config, EnrichError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| EnrichError::ConfigRead(config_path.clone()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Config, EnrichError> {
        let config: Config = serde_json::from_str(content)
            .map_err(|err| EnrichError::ConfigParse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
