use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use tracing::{debug, info};

use crate::artifact::ArtifactFetcher;
use crate::config::RunConfig;
use crate::domain::{EnrichmentResult, ProgressEvent, ProteinRecord};
use crate::enricher::RecordEnricher;
use crate::error::EnrichError;
use crate::lookup::{PrimaryDirectory, StructureDirectory};
use crate::rate_limit::{Clock, RateLimiter, SystemClock};

/// Cooperative stop flag, checked between records.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub trait ProgressSink {
    fn progress(&self, event: ProgressEvent);
}

/// Discards progress events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn progress(&self, _event: ProgressEvent) {}
}

impl ProgressSink for Sender<ProgressEvent> {
    fn progress(&self, event: ProgressEvent) {
        // A closed receiver only means nobody is watching any more.
        let _ = self.send(event);
    }
}

pub struct BatchPipeline<P, S, A> {
    enricher: RecordEnricher<P, S, A>,
    clock: Arc<dyn Clock>,
}

impl<P, S, A> BatchPipeline<P, S, A>
where
    P: PrimaryDirectory,
    S: StructureDirectory,
    A: ArtifactFetcher,
{
    pub fn new(enricher: RecordEnricher<P, S, A>) -> Self {
        Self::with_clock(enricher, Arc::new(SystemClock))
    }

    pub fn with_clock(enricher: RecordEnricher<P, S, A>, clock: Arc<dyn Clock>) -> Self {
        Self { enricher, clock }
    }

    pub fn enricher(&self) -> &RecordEnricher<P, S, A> {
        &self.enricher
    }

    /// Enriches the configured slice of `records` in index order.
    ///
    /// Only a bad range is an error, and it is reported before any lookup.
    /// A cancelled run returns the results finished so far.
    pub fn run(
        &self,
        records: &[ProteinRecord],
        config: &RunConfig,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Vec<EnrichmentResult>, EnrichError> {
        let selected = config.select(records)?;
        let total = selected.len();
        let limiter = RateLimiter::with_clock(config.inter_request_delay, self.clock.clone());
        let mut results = Vec::with_capacity(total);

        info!(total, start = config.start_index, end = %config.end_index, "starting batch");
        for record in selected {
            if cancel.is_cancelled() {
                info!(completed = results.len(), total, "batch cancelled");
                break;
            }
            limiter.wait();
            debug!(index = record.index(), identifier = record.identifier(), "enriching record");
            let result = self.enricher.enrich(record, &config.output_directory);
            info!(
                index = record.index(),
                identifier = record.identifier(),
                status = %result.status(),
                "record finished"
            );
            results.push(result);
            progress.progress(ProgressEvent {
                completed: results.len(),
                total,
                current_identifier: record.identifier().to_string(),
            });
        }
        Ok(results)
    }
}
