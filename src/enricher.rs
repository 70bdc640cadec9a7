use camino::Utf8Path;
use tracing::{info, warn};

use crate::artifact::ArtifactFetcher;
use crate::domain::{
    EnrichmentDraft, EnrichmentResult, EnrichmentStatus, FailureDetail, ProteinRecord, Stage,
};
use crate::lookup::{LookupOutcome, PrimaryDirectory, StructureDirectory};

/// Runs the three per-record stages. Each stage only starts when the previous
/// one produced data; whatever was learned before a failure is kept.
pub struct RecordEnricher<P, S, A> {
    primary: P,
    structure: S,
    artifacts: A,
}

impl<P, S, A> RecordEnricher<P, S, A>
where
    P: PrimaryDirectory,
    S: StructureDirectory,
    A: ArtifactFetcher,
{
    pub fn new(primary: P, structure: S, artifacts: A) -> Self {
        Self {
            primary,
            structure,
            artifacts,
        }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn structure(&self) -> &S {
        &self.structure
    }

    pub fn artifacts(&self) -> &A {
        &self.artifacts
    }

    /// Artifacts land in `output_root/<record index>/`.
    pub fn enrich(&self, record: &ProteinRecord, output_root: &Utf8Path) -> EnrichmentResult {
        let identifier = record.identifier();
        let mut draft = EnrichmentDraft::new(record.clone());

        let primary = match self.primary.lookup(identifier) {
            LookupOutcome::Found(entry) => entry,
            LookupOutcome::NotFound => {
                draft.failure(FailureDetail::new(
                    Stage::PrimaryLookup,
                    format!("no primary record with a locus tag for {identifier}"),
                    false,
                ));
                return draft.finish(EnrichmentStatus::Failed);
            }
            LookupOutcome::Failed(err) => {
                draft.failure(FailureDetail::from_error(Stage::PrimaryLookup, &err));
                return draft.finish(EnrichmentStatus::Failed);
            }
        };
        let locus_tag = primary.locus_tag.clone();
        draft.primary(primary.locus_tag, primary.description);

        let structure = match self.structure.lookup(&locus_tag) {
            LookupOutcome::Found(entry) => entry,
            LookupOutcome::NotFound => {
                info!(identifier, %locus_tag, "no structure entry");
                return draft.finish(EnrichmentStatus::PartialSuccess);
            }
            LookupOutcome::Failed(err) => {
                draft.failure(FailureDetail::from_error(Stage::StructureLookup, &err));
                return draft.finish(EnrichmentStatus::PartialSuccess);
            }
        };
        let accession = structure.accession_id.clone();
        draft.structure(
            structure.accession_id,
            structure.confidence_score,
            structure.sequence_length,
            structure.species,
            structure.has_alpha_missense,
        );

        let destination = output_root.join(record.index().to_string());
        match self.artifacts.fetch(
            &accession,
            structure.structure_url.as_deref(),
            &destination,
        ) {
            Ok(path) => {
                draft.artifact(path);
                draft.finish(EnrichmentStatus::Success)
            }
            Err(err) => {
                warn!(identifier, %accession, "structure download failed: {err}");
                draft.failure(FailureDetail::from_error(Stage::ArtifactDownload, &err));
                draft.finish(EnrichmentStatus::PartialSuccess)
            }
        }
    }
}
