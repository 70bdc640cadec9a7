mod common;

use assert_matches::assert_matches;

use common::{ManualClock, client, ok, status};
use kira_protein_enricher::error::EnrichError;
use kira_protein_enricher::lookup::{LookupOutcome, LookupService};
use kira_protein_enricher::ncbi::{NcbiProteinDirectory, parse_genbank};

const RECORD: &str = include_str!("fixtures/ncbi_protein.gb");
const EFETCH: &str = "https://example.test/efetch.fcgi";

#[test]
fn parses_locus_tag_and_multiline_definition() {
    let entry = parse_genbank(RECORD).unwrap().unwrap();
    assert_eq!(entry.locus_tag.as_str(), "b0002");
    assert_eq!(
        entry.description.as_deref(),
        Some("bifunctional aspartate kinase/homoserine dehydrogenase I [Enterobacteriaceae].")
    );
}

#[test]
fn record_without_locus_tag_is_not_found() {
    let content = RECORD
        .lines()
        .filter(|line| !line.contains("/locus_tag"))
        .collect::<Vec<_>>()
        .join("\n");
    assert_eq!(parse_genbank(&content).unwrap(), None);
}

#[test]
fn error_and_empty_bodies_are_not_found() {
    assert_eq!(parse_genbank("").unwrap(), None);
    assert_eq!(parse_genbank("\n  \n").unwrap(), None);
    assert_eq!(
        parse_genbank("Error: ID list is empty! Possibly it has no correct IDs.").unwrap(),
        None
    );
}

#[test]
fn html_body_is_malformed() {
    let err = parse_genbank("<html><body>maintenance</body></html>").unwrap_err();
    assert_matches!(err, EnrichError::MalformedResponse { .. });
}

#[test]
fn lookup_sends_efetch_parameters() {
    let clock = ManualClock::new();
    let directory = NcbiProteinDirectory::new(
        client("NCBI", vec![ok(RECORD)], 0, &clock),
        EFETCH.to_string(),
        Some("secret".to_string()),
    );

    let outcome = directory.lookup("WP_000184067.1");

    assert_matches!(outcome, LookupOutcome::Found(ref entry) if entry.locus_tag.as_str() == "b0002");
    let requests = directory.http().transport().requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url(), EFETCH);
    assert_eq!(requests[0].query_value("db"), Some("protein"));
    assert_eq!(requests[0].query_value("id"), Some("WP_000184067.1"));
    assert_eq!(requests[0].query_value("rettype"), Some("gb"));
    assert_eq!(requests[0].query_value("retmode"), Some("text"));
    assert_eq!(requests[0].query_value("api_key"), Some("secret"));
}

#[test]
fn unknown_identifier_is_not_found() {
    let clock = ManualClock::new();
    let directory = NcbiProteinDirectory::new(
        client("NCBI", vec![status(400, "Failed to understand id")], 3, &clock),
        EFETCH.to_string(),
        None,
    );

    assert_matches!(directory.lookup("nonsense"), LookupOutcome::NotFound);
    assert_eq!(directory.http().transport().calls(), 1);
    assert_eq!(directory.http().transport().requests()[0].query_value("api_key"), None);
}

#[test]
fn persistent_outage_is_a_retriable_failure() {
    let clock = ManualClock::new();
    let directory = NcbiProteinDirectory::new(
        client(
            "NCBI",
            vec![status(503, ""), status(503, ""), status(503, "")],
            2,
            &clock,
        ),
        EFETCH.to_string(),
        None,
    );

    let outcome = directory.lookup("WP_000184067.1");

    assert_matches!(outcome, LookupOutcome::Failed(ref err) if err.is_retriable());
    assert_eq!(directory.http().transport().calls(), 3);
}
