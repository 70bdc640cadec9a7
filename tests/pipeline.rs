mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use common::{
    Answer, CancelAfter, ManualClock, MockArtifacts, MockPrimary, MockStructure, RecordingSink,
    records,
};
use kira_protein_enricher::config::{EndIndex, RunConfig};
use kira_protein_enricher::domain::{EnrichmentStatus, Stage};
use kira_protein_enricher::enricher::RecordEnricher;
use kira_protein_enricher::error::EnrichError;
use kira_protein_enricher::pipeline::{BatchPipeline, CancellationToken, NoProgress};

type Pipeline = BatchPipeline<MockPrimary, MockStructure, MockArtifacts>;

fn pipeline(primary: MockPrimary, clock: &Arc<ManualClock>) -> Pipeline {
    BatchPipeline::with_clock(
        RecordEnricher::new(primary, MockStructure::default(), MockArtifacts::default()),
        clock.clone(),
    )
}

fn run_config(start: usize, end: EndIndex, delay: f64) -> RunConfig {
    RunConfig::new(start, end, delay, Utf8PathBuf::from("out"), 3).unwrap()
}

fn all_found(identifiers: &[&str]) -> MockPrimary {
    identifiers.iter().fold(MockPrimary::default(), |mock, id| {
        mock.answer(id, Answer::Found(("L1", None)))
    })
}

#[test]
fn example_run_with_one_missing_record() {
    let clock = ManualClock::new();
    let primary = MockPrimary::default().answer("P1", Answer::Found(("L1", None)));
    let pipeline = BatchPipeline::with_clock(
        RecordEnricher::new(
            primary,
            MockStructure::default().answer("L1", Answer::Found(("P00561", Some(80.0)))),
            MockArtifacts::default(),
        ),
        clock.clone(),
    );
    let sink = RecordingSink::default();

    let results = pipeline
        .run(
            &records(&["P1", "P2"]),
            &run_config(1, EndIndex::At(2), 0.0),
            &sink,
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].status(), EnrichmentStatus::Success);
    assert_eq!(results[1].status(), EnrichmentStatus::Failed);
    assert_eq!(results[1].errors().len(), 1);
    assert_eq!(results[1].errors()[0].stage, Stage::PrimaryLookup);
    assert_eq!(pipeline.enricher().structure().calls(), vec!["L1".to_string()]);
    assert_eq!(pipeline.enricher().artifacts().calls().len(), 1);

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!((events[1].completed, events[1].total), (2, 2));
    assert_eq!(events[1].current_identifier, "P2");
}

#[test]
fn selects_inclusive_range_in_order() {
    let clock = ManualClock::new();
    let ids = ["A", "B", "C", "D", "E"];
    let pipeline = pipeline(all_found(&ids), &clock);

    let results = pipeline
        .run(
            &records(&ids),
            &run_config(2, EndIndex::At(4), 0.0),
            &NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();

    let visited: Vec<_> = results.iter().map(|r| r.record().index()).collect();
    assert_eq!(visited, vec![2, 3, 4]);
    assert_eq!(pipeline.enricher().primary().calls(), vec!["B", "C", "D"]);
}

#[test]
fn end_all_runs_to_last_record() {
    let clock = ManualClock::new();
    let ids = ["A", "B", "C"];
    let pipeline = pipeline(all_found(&ids), &clock);

    let results = pipeline
        .run(
            &records(&ids),
            &run_config(3, EndIndex::All, 0.0),
            &NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record().identifier(), "C");
}

#[test]
fn invalid_range_fails_before_any_lookup() {
    let clock = ManualClock::new();
    let pipeline = pipeline(all_found(&["A"]), &clock);
    let sink = RecordingSink::default();

    let err = pipeline
        .run(
            &records(&["A", "B"]),
            &run_config(2, EndIndex::At(5), 0.0),
            &sink,
            &CancellationToken::new(),
        )
        .unwrap_err();

    assert_matches!(err, EnrichError::InvalidRange { start: 2, end: 5, total: 2 });
    assert!(pipeline.enricher().primary().calls().is_empty());
    assert!(sink.events().is_empty());
}

#[test]
fn start_past_end_of_input_is_rejected() {
    let clock = ManualClock::new();
    let pipeline = pipeline(MockPrimary::default(), &clock);

    let err = pipeline
        .run(
            &records(&["A"]),
            &run_config(2, EndIndex::All, 0.0),
            &NoProgress,
            &CancellationToken::new(),
        )
        .unwrap_err();

    assert_matches!(err, EnrichError::InvalidRange { .. });
}

#[test]
fn cancellation_after_k_records_returns_k_results() {
    let clock = ManualClock::new();
    let ids = ["A", "B", "C", "D"];
    let pipeline = pipeline(all_found(&ids), &clock);
    let token = CancellationToken::new();
    let sink = CancelAfter {
        token: token.clone(),
        after: 2,
    };

    let results = pipeline
        .run(&records(&ids), &run_config(1, EndIndex::All, 0.0), &sink, &token)
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].record().identifier(), "A");
    assert_eq!(results[1].record().identifier(), "B");
    assert_eq!(pipeline.enricher().primary().calls(), vec!["A", "B"]);
}

#[test]
fn cancelled_before_start_returns_nothing() {
    let clock = ManualClock::new();
    let pipeline = pipeline(all_found(&["A"]), &clock);
    let token = CancellationToken::new();
    token.cancel();

    let results = pipeline
        .run(&records(&["A"]), &run_config(1, EndIndex::All, 0.0), &NoProgress, &token)
        .unwrap();

    assert!(results.is_empty());
}

#[test]
fn records_are_paced_by_run_delay() {
    let clock = ManualClock::new();
    let ids = ["A", "B", "C"];
    let pipeline = pipeline(all_found(&ids), &clock);

    pipeline
        .run(
            &records(&ids),
            &run_config(1, EndIndex::All, 1.5),
            &NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_millis(1500), Duration::from_millis(1500)]
    );
}

#[test]
fn progress_reaches_channel() {
    let clock = ManualClock::new();
    let pipeline = pipeline(MockPrimary::default(), &clock);
    let (tx, rx) = std::sync::mpsc::channel();

    pipeline
        .run(
            &records(&["A", "B"]),
            &run_config(1, EndIndex::All, 0.0),
            &tx,
            &CancellationToken::new(),
        )
        .unwrap();
    drop(tx);

    let events: Vec<_> = rx.iter().collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].percentage(), 50.0);
}
