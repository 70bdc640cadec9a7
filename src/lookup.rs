use crate::domain::{AccessionId, LocusTag, SpeciesSpecificity};
use crate::error::EnrichError;

/// Result of asking one external directory about one key.
///
/// `NotFound` is a valid answer, not an error: the database simply has no
/// entry for the key.
#[derive(Debug)]
pub enum LookupOutcome<T> {
    Found(T),
    NotFound,
    Failed(EnrichError),
}

impl<T> LookupOutcome<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, LookupOutcome::Found(_))
    }

    pub fn found(&self) -> Option<&T> {
        match self {
            LookupOutcome::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> LookupOutcome<U> {
        match self {
            LookupOutcome::Found(value) => LookupOutcome::Found(f(value)),
            LookupOutcome::NotFound => LookupOutcome::NotFound,
            LookupOutcome::Failed(err) => LookupOutcome::Failed(err),
        }
    }
}

impl<T> From<Result<Option<T>, EnrichError>> for LookupOutcome<T> {
    fn from(value: Result<Option<T>, EnrichError>) -> Self {
        match value {
            Ok(Some(value)) => LookupOutcome::Found(value),
            Ok(None) => LookupOutcome::NotFound,
            Err(err) => LookupOutcome::Failed(err),
        }
    }
}

pub trait LookupService: Send + Sync {
    type Key: ?Sized;
    type Value;

    fn lookup(&self, key: &Self::Key) -> LookupOutcome<Self::Value>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryEntry {
    pub locus_tag: LocusTag,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructureEntry {
    pub accession_id: AccessionId,
    pub confidence_score: Option<f64>,
    pub sequence_length: Option<u64>,
    pub species: Option<SpeciesSpecificity>,
    pub structure_url: Option<String>,
    pub has_alpha_missense: bool,
}

impl StructureEntry {
    pub fn accession_only(accession_id: AccessionId) -> Self {
        Self {
            accession_id,
            confidence_score: None,
            sequence_length: None,
            species: None,
            structure_url: None,
            has_alpha_missense: false,
        }
    }
}

/// Protein identifier -> locus tag and description.
pub trait PrimaryDirectory: LookupService<Key = str, Value = PrimaryEntry> {}

impl<T> PrimaryDirectory for T where T: LookupService<Key = str, Value = PrimaryEntry> + ?Sized {}

/// Locus tag -> structural accession, confidence and species breadth.
pub trait StructureDirectory: LookupService<Key = LocusTag, Value = StructureEntry> {}

impl<T> StructureDirectory for T where
    T: LookupService<Key = LocusTag, Value = StructureEntry> + ?Sized
{
}
