use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{info, warn};

use crate::config::NcbiSettings;
use crate::error::EnrichError;
use crate::http::{HttpRequest, ReqwestTransport, RetryPolicy, RetryingHttpClient, Transport};
use crate::lookup::{LookupOutcome, LookupService, PrimaryEntry};

pub const SERVICE: &str = "NCBI";

static LOCUS_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"/locus_tag="([^"]+)""#).unwrap());

/// Primary directory backed by NCBI E-utilities `efetch` in GenBank text mode.
pub struct NcbiProteinDirectory<T: Transport> {
    http: RetryingHttpClient<T>,
    efetch_url: String,
    api_key: Option<String>,
}

impl NcbiProteinDirectory<ReqwestTransport> {
    pub fn from_settings(settings: &NcbiSettings, policy: RetryPolicy) -> Result<Self, EnrichError> {
        let transport =
            ReqwestTransport::new(SERVICE, Duration::from_secs(settings.timeout_seconds))?;
        let http = RetryingHttpClient::new(
            SERVICE,
            transport,
            policy,
            Duration::from_millis(settings.min_interval_ms),
        );
        Ok(Self::new(
            http,
            settings.efetch_url.clone(),
            settings.resolved_api_key(),
        ))
    }
}

impl<T: Transport> NcbiProteinDirectory<T> {
    pub fn new(http: RetryingHttpClient<T>, efetch_url: String, api_key: Option<String>) -> Self {
        Self {
            http,
            efetch_url,
            api_key,
        }
    }

    pub fn http(&self) -> &RetryingHttpClient<T> {
        &self.http
    }

    fn request(&self, identifier: &str) -> HttpRequest {
        let request = HttpRequest::get(&self.efetch_url)
            .query("db", "protein")
            .query("id", identifier)
            .query("rettype", "gb")
            .query("retmode", "text");
        match &self.api_key {
            Some(key) => request.query("api_key", key),
            None => request,
        }
    }

    fn fetch_genbank(&self, identifier: &str) -> Result<Option<String>, EnrichError> {
        let response = match self.http.execute(&self.request(identifier)) {
            Ok(response) => response,
            // efetch answers unknown ids with 400 "Failed to understand id".
            Err(EnrichError::RemoteStatus {
                status: 400 | 404, ..
            }) => return Ok(None),
            Err(err) => return Err(err),
        };
        let text = response
            .text()
            .map_err(|err| EnrichError::TransferInterrupted {
                service: SERVICE.to_string(),
                message: err.to_string(),
            })?;
        Ok(Some(text))
    }
}

impl<T: Transport> LookupService for NcbiProteinDirectory<T> {
    type Key = str;
    type Value = PrimaryEntry;

    fn lookup(&self, identifier: &str) -> LookupOutcome<PrimaryEntry> {
        info!(identifier, "querying NCBI");
        let outcome = self
            .fetch_genbank(identifier)
            .and_then(|text| match text {
                Some(text) => parse_genbank(&text),
                None => Ok(None),
            });
        match &outcome {
            Ok(Some(entry)) => info!(identifier, locus_tag = %entry.locus_tag, "NCBI record resolved"),
            Ok(None) => info!(identifier, "no NCBI record"),
            Err(err) => warn!(identifier, "NCBI lookup failed: {err}"),
        }
        outcome.into()
    }
}

/// Extracts the locus tag and definition from a GenBank flat-file record.
///
/// `Ok(None)` means NCBI had nothing usable: an empty or error body, or a
/// record without a `/locus_tag` qualifier.
pub fn parse_genbank(content: &str) -> Result<Option<PrimaryEntry>, EnrichError> {
    let trimmed = content.trim_start();
    if trimmed.is_empty() || trimmed.starts_with("Error") {
        return Ok(None);
    }
    if !trimmed.starts_with("LOCUS") {
        return Err(EnrichError::MalformedResponse {
            service: SERVICE.to_string(),
            message: "expected a GenBank record starting with LOCUS".to_string(),
        });
    }

    let Some(captures) = LOCUS_TAG_RE.captures(content) else {
        return Ok(None);
    };
    let locus_tag = captures[1].parse()?;

    Ok(Some(PrimaryEntry {
        locus_tag,
        description: parse_definition(content),
    }))
}

fn parse_definition(content: &str) -> Option<String> {
    let mut lines = content.lines();
    let first = lines
        .by_ref()
        .find_map(|line| line.strip_prefix("DEFINITION"))?;
    let mut parts = vec![first.trim().to_string()];
    // Continuation lines are indented; the next keyword starts in column 0.
    for line in lines {
        if !line.starts_with(' ') || line.trim().is_empty() {
            break;
        }
        parts.push(line.trim().to_string());
    }
    let definition = parts.join(" ").trim().to_string();
    (!definition.is_empty()).then_some(definition)
}
