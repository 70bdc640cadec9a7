use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::config::AlphaFoldSettings;
use crate::domain::{AccessionId, LocusTag, SpeciesSpecificity};
use crate::error::EnrichError;
use crate::http::{HttpRequest, ReqwestTransport, RetryPolicy, RetryingHttpClient, Transport};
use crate::lookup::{LookupOutcome, LookupService, StructureEntry};

pub const SERVICE: &str = "AlphaFold";

const SEARCH_ROWS: &str = "20";

/// Cluster-size boundaries for [`SpeciesSpecificity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeciesThresholds {
    pub general_at_least: u64,
    pub specific_below: u64,
}

impl Default for SpeciesThresholds {
    fn default() -> Self {
        Self {
            general_at_least: 100,
            specific_below: 10,
        }
    }
}

impl SpeciesThresholds {
    pub fn from_settings(settings: &AlphaFoldSettings) -> Self {
        Self {
            general_at_least: settings.general_species_threshold,
            specific_below: settings.specific_species_threshold,
        }
    }

    /// Counts between the two thresholds stay unclassified.
    pub fn classify(&self, cluster_size: u64) -> Option<SpeciesSpecificity> {
        if cluster_size >= self.general_at_least {
            Some(SpeciesSpecificity::General)
        } else if cluster_size < self.specific_below {
            Some(SpeciesSpecificity::Specific)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionSummary {
    pub confidence_score: Option<f64>,
    pub sequence_length: Option<u64>,
    pub structure_url: Option<String>,
    pub has_alpha_missense: bool,
}

/// Structure directory backed by the AlphaFold DB public API.
pub struct AlphaFoldDirectory<T: Transport> {
    http: RetryingHttpClient<T>,
    search_url: String,
    prediction_url: String,
    cluster_url: String,
    cluster_flag: String,
    thresholds: SpeciesThresholds,
}

impl AlphaFoldDirectory<ReqwestTransport> {
    pub fn from_settings(
        settings: &AlphaFoldSettings,
        policy: RetryPolicy,
    ) -> Result<Self, EnrichError> {
        let transport =
            ReqwestTransport::new(SERVICE, Duration::from_secs(settings.timeout_seconds))?;
        let http = RetryingHttpClient::new(
            SERVICE,
            transport,
            policy,
            Duration::from_millis(settings.min_interval_ms),
        );
        Ok(Self::new(http, settings))
    }
}

impl<T: Transport> AlphaFoldDirectory<T> {
    pub fn new(http: RetryingHttpClient<T>, settings: &AlphaFoldSettings) -> Self {
        Self {
            http,
            search_url: settings.search_url.clone(),
            prediction_url: settings.prediction_url.trim_end_matches('/').to_string(),
            cluster_url: settings.cluster_url.trim_end_matches('/').to_string(),
            cluster_flag: settings.cluster_flag.clone(),
            thresholds: SpeciesThresholds::from_settings(settings),
        }
    }

    pub fn http(&self) -> &RetryingHttpClient<T> {
        &self.http
    }

    fn get_json(&self, request: &HttpRequest) -> Result<Value, EnrichError> {
        let body = self
            .http
            .execute(request)?
            .text()
            .map_err(|err| EnrichError::TransferInterrupted {
                service: SERVICE.to_string(),
                message: err.to_string(),
            })?;
        serde_json::from_str(&body).map_err(|err| EnrichError::MalformedResponse {
            service: SERVICE.to_string(),
            message: err.to_string(),
        })
    }

    fn search_accession(&self, locus_tag: &LocusTag) -> Result<Option<AccessionId>, EnrichError> {
        let tag = locus_tag.as_str();
        let request = HttpRequest::get(&self.search_url)
            .query("q", format!("(text:*{tag} OR text:{tag}*)"))
            .query("type", "main")
            .query("start", "0")
            .query("rows", SEARCH_ROWS);
        parse_search(&self.get_json(&request)?)
    }

    fn prediction(&self, accession: &AccessionId) -> Result<Option<PredictionSummary>, EnrichError> {
        let request = HttpRequest::get(format!("{}/{}", self.prediction_url, accession));
        match self.get_json(&request) {
            Ok(value) => Ok(parse_prediction(&value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn cluster_size(&self, accession: &AccessionId) -> Result<Option<u64>, EnrichError> {
        let request = HttpRequest::get(format!("{}/{}", self.cluster_url, accession))
            .query("cluster_flag", &self.cluster_flag)
            .query("records", "5")
            .query("start", "0")
            .query("sort_direction", "DESC")
            .query("sort_column", "averagePlddt");
        match self.get_json(&request) {
            Ok(value) => Ok(parse_cluster_total(&value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn resolve(&self, locus_tag: &LocusTag) -> Result<Option<StructureEntry>, EnrichError> {
        let Some(accession) = self.search_accession(locus_tag)? else {
            info!(%locus_tag, "no AlphaFold entry for locus tag");
            return Ok(None);
        };
        info!(%locus_tag, %accession, "AlphaFold accession resolved");

        let mut entry = StructureEntry::accession_only(accession);
        match self.prediction(&entry.accession_id)? {
            Some(prediction) => {
                entry.confidence_score = prediction.confidence_score;
                entry.sequence_length = prediction.sequence_length;
                entry.structure_url = prediction.structure_url;
                entry.has_alpha_missense = prediction.has_alpha_missense;
            }
            None => info!(accession = %entry.accession_id, "no AlphaFold prediction data"),
        }

        // Species breadth is informational; losing it does not fail the stage.
        match self.cluster_size(&entry.accession_id) {
            Ok(Some(count)) => entry.species = self.thresholds.classify(count),
            Ok(None) => {}
            Err(err) => warn!(accession = %entry.accession_id, "cluster lookup failed: {err}"),
        }
        Ok(Some(entry))
    }
}

impl<T: Transport> LookupService for AlphaFoldDirectory<T> {
    type Key = LocusTag;
    type Value = StructureEntry;

    fn lookup(&self, locus_tag: &LocusTag) -> LookupOutcome<StructureEntry> {
        let outcome = self.resolve(locus_tag);
        if let Err(err) = &outcome {
            warn!(%locus_tag, "AlphaFold lookup failed: {err}");
        }
        outcome.into()
    }
}

/// First search hit's UniProt accession.
pub fn parse_search(value: &Value) -> Result<Option<AccessionId>, EnrichError> {
    let Some(first) = value
        .get("docs")
        .and_then(|docs| docs.as_array())
        .and_then(|docs| docs.first())
    else {
        return Ok(None);
    };
    match first.get("uniprotAccession").and_then(|v| v.as_str()) {
        Some(accession) => Ok(Some(accession.parse()?)),
        None => Err(EnrichError::MalformedResponse {
            service: SERVICE.to_string(),
            message: "search hit without uniprotAccession".to_string(),
        }),
    }
}

/// Reads the first model of a prediction response. An empty list is `None`.
pub fn parse_prediction(value: &Value) -> Option<PredictionSummary> {
    let model = match value {
        Value::Array(items) => items.first()?,
        Value::Object(_) => value,
        _ => return None,
    };
    let confidence_score = model
        .get("globalMetricValue")
        .and_then(|v| v.as_f64())
        .filter(|score| (0.0..=100.0).contains(score));
    let sequence_length = model.get("sequenceEnd").and_then(|v| v.as_u64());
    let structure_url = model
        .get("pdbUrl")
        .and_then(|v| v.as_str())
        .filter(|url| !url.is_empty())
        .map(|url| url.to_string());
    let has_alpha_missense = match model.get("amAnnotationsUrl") {
        Some(Value::String(url)) => !url.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        _ => false,
    };
    Some(PredictionSummary {
        confidence_score,
        sequence_length,
        structure_url,
        has_alpha_missense,
    })
}

pub fn parse_cluster_total(value: &Value) -> Option<u64> {
    value.get("clusterTotal").and_then(|v| v.as_u64())
}
