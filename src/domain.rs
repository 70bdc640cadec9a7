use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::EnrichError;

/// One input protein, as read from the FASTA boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProteinRecord {
    index: usize,
    identifier: String,
    sequence: String,
}

impl ProteinRecord {
    pub fn new(
        index: usize,
        identifier: impl Into<String>,
        sequence: impl Into<String>,
    ) -> Result<Self, EnrichError> {
        let identifier = identifier.into().trim().to_string();
        if index == 0 {
            return Err(EnrichError::InvalidRecord(format!(
                "record {identifier:?} has index 0; indices are 1-based"
            )));
        }
        if identifier.is_empty() {
            return Err(EnrichError::InvalidIdentifier(identifier));
        }
        Ok(Self {
            index,
            identifier,
            sequence: sequence.into(),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocusTag(String);

impl LocusTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocusTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocusTag {
    type Err = EnrichError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && !normalized.chars().any(|ch| ch.is_whitespace() || ch == '"');
        if !is_valid {
            return Err(EnrichError::InvalidLocusTag(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// UniProt accession as used by AlphaFold DB, e.g. `Q8WZ42` or `A0A023GPI8`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessionId(String);

impl AccessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccessionId {
    type Err = EnrichError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let (base, isoform) = match normalized.split_once('-') {
            Some((base, isoform)) => (base, Some(isoform)),
            None => (normalized.as_str(), None),
        };
        let base_ok = matches!(base.len(), 6 | 10)
            && base.chars().all(|ch| ch.is_ascii_alphanumeric());
        let isoform_ok = isoform
            .map(|iso| !iso.is_empty() && iso.chars().all(|ch| ch.is_ascii_digit()))
            .unwrap_or(true);
        if !base_ok || !isoform_ok {
            return Err(EnrichError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// How broadly a structure's cluster is populated across species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeciesSpecificity {
    General,
    Specific,
}

impl fmt::Display for SpeciesSpecificity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeciesSpecificity::General => write!(f, "General"),
            SpeciesSpecificity::Specific => write!(f, "Specific"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PrimaryLookup,
    StructureLookup,
    ArtifactDownload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::PrimaryLookup => write!(f, "primary lookup"),
            Stage::StructureLookup => write!(f, "structure lookup"),
            Stage::ArtifactDownload => write!(f, "artifact download"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrichmentStatus::Success => write!(f, "success"),
            EnrichmentStatus::PartialSuccess => write!(f, "partial"),
            EnrichmentStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub stage: Stage,
    pub message: String,
    pub retriable: bool,
}

impl FailureDetail {
    pub fn new(stage: Stage, message: impl Into<String>, retriable: bool) -> Self {
        Self {
            stage,
            message: message.into(),
            retriable,
        }
    }

    pub fn from_error(stage: Stage, error: &EnrichError) -> Self {
        Self::new(stage, error.to_string(), error.is_retriable())
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)?;
        if self.retriable {
            write!(f, " (retriable)")?;
        }
        Ok(())
    }
}

/// Everything learned about one record. Produced once by the enricher and
/// only readable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichmentResult {
    record: ProteinRecord,
    locus_tag: Option<LocusTag>,
    description: Option<String>,
    accession_id: Option<AccessionId>,
    confidence_score: Option<f64>,
    sequence_length: Option<u64>,
    species: Option<SpeciesSpecificity>,
    has_alpha_missense: bool,
    artifact_path: Option<Utf8PathBuf>,
    status: EnrichmentStatus,
    errors: Vec<FailureDetail>,
}

impl EnrichmentResult {
    pub fn record(&self) -> &ProteinRecord {
        &self.record
    }

    pub fn locus_tag(&self) -> Option<&LocusTag> {
        self.locus_tag.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn accession_id(&self) -> Option<&AccessionId> {
        self.accession_id.as_ref()
    }

    pub fn confidence_score(&self) -> Option<f64> {
        self.confidence_score
    }

    pub fn sequence_length(&self) -> Option<u64> {
        self.sequence_length
    }

    pub fn species(&self) -> Option<SpeciesSpecificity> {
        self.species
    }

    pub fn has_alpha_missense(&self) -> bool {
        self.has_alpha_missense
    }

    pub fn artifact_path(&self) -> Option<&Utf8PathBuf> {
        self.artifact_path.as_ref()
    }

    pub fn status(&self) -> EnrichmentStatus {
        self.status
    }

    pub fn errors(&self) -> &[FailureDetail] {
        &self.errors
    }
}

/// Mutable form of [`EnrichmentResult`] used while the stages run.
#[derive(Debug)]
pub(crate) struct EnrichmentDraft {
    inner: EnrichmentResult,
}

impl EnrichmentDraft {
    pub(crate) fn new(record: ProteinRecord) -> Self {
        Self {
            inner: EnrichmentResult {
                record,
                locus_tag: None,
                description: None,
                accession_id: None,
                confidence_score: None,
                sequence_length: None,
                species: None,
                has_alpha_missense: false,
                artifact_path: None,
                status: EnrichmentStatus::Failed,
                errors: Vec::new(),
            },
        }
    }

    pub(crate) fn primary(&mut self, locus_tag: LocusTag, description: Option<String>) {
        self.inner.locus_tag = Some(locus_tag);
        self.inner.description = description;
    }

    pub(crate) fn structure(
        &mut self,
        accession_id: AccessionId,
        confidence_score: Option<f64>,
        sequence_length: Option<u64>,
        species: Option<SpeciesSpecificity>,
        has_alpha_missense: bool,
    ) {
        self.inner.accession_id = Some(accession_id);
        self.inner.confidence_score = confidence_score;
        self.inner.sequence_length = sequence_length;
        self.inner.species = species;
        self.inner.has_alpha_missense = has_alpha_missense;
    }

    pub(crate) fn artifact(&mut self, path: Utf8PathBuf) {
        self.inner.artifact_path = Some(path);
    }

    pub(crate) fn failure(&mut self, detail: FailureDetail) {
        self.inner.errors.push(detail);
    }

    pub(crate) fn finish(mut self, status: EnrichmentStatus) -> EnrichmentResult {
        self.inner.status = status;
        self.inner
    }
}

/// Snapshot sent after every finished record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
    pub current_identifier: String,
}

impl ProgressEvent {
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.completed as f64 / self.total as f64 * 100.0).min(100.0)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn accession_accepts_isoforms() {
        let acc: AccessionId = "p69905-2".parse().unwrap();
        assert_eq!(acc.as_str(), "P69905-2");
    }

    #[test]
    fn accession_rejects_paths() {
        let err = "../../etc".parse::<AccessionId>().unwrap_err();
        assert_matches!(err, EnrichError::InvalidAccession(_));
    }

    #[test]
    fn draft_keeps_data_on_partial() {
        let record = ProteinRecord::new(3, "WP_000001.1", "MKV").unwrap();
        let mut draft = EnrichmentDraft::new(record);
        draft.primary("b0001".parse().unwrap(), Some("thr operon leader".to_string()));
        draft.failure(FailureDetail::new(Stage::StructureLookup, "timeout", true));
        let result = draft.finish(EnrichmentStatus::PartialSuccess);

        assert_eq!(result.locus_tag().map(LocusTag::as_str), Some("b0001"));
        assert_eq!(result.errors().len(), 1);
        assert!(result.accession_id().is_none());
    }

    #[test]
    fn progress_percentage() {
        let event = ProgressEvent {
            completed: 1,
            total: 4,
            current_identifier: "P1".to_string(),
        };
        assert_eq!(event.percentage(), 25.0);
    }
}
