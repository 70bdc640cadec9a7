#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};

use kira_protein_enricher::artifact::ArtifactFetcher;
use kira_protein_enricher::domain::{AccessionId, LocusTag, ProgressEvent, ProteinRecord};
use kira_protein_enricher::error::EnrichError;
use kira_protein_enricher::http::{
    HttpRequest, HttpResponse, RetryPolicy, RetryingHttpClient, Transport, TransportError,
    TransportErrorKind,
};
use kira_protein_enricher::lookup::{LookupOutcome, LookupService, PrimaryEntry, StructureEntry};
use kira_protein_enricher::pipeline::{CancellationToken, ProgressSink};
use kira_protein_enricher::rate_limit::Clock;

pub type Scripted = Result<HttpResponse, TransportError>;

/// Replays canned responses in order and remembers every request.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(TransportError::new(
                TransportErrorKind::Other,
                format!("no scripted response for {}", request.url()),
            ))
        })
    }
}

pub fn ok(body: &str) -> Scripted {
    Ok(HttpResponse::from_bytes(200, body.as_bytes().to_vec()))
}

pub fn status(code: u16, body: &str) -> Scripted {
    Ok(HttpResponse::from_bytes(code, body.as_bytes().to_vec()))
}

pub fn timeout() -> Scripted {
    Err(TransportError::new(TransportErrorKind::Timeout, "operation timed out"))
}

/// Body that yields `prefix` and then fails, like a dropped connection.
pub struct BrokenBody {
    prefix: Vec<u8>,
    sent: bool,
}

impl Read for BrokenBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.sent {
            self.sent = true;
            let len = self.prefix.len().min(buf.len());
            buf[..len].copy_from_slice(&self.prefix[..len]);
            return Ok(len);
        }
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer"))
    }
}

pub fn broken(prefix: &str) -> Scripted {
    Ok(HttpResponse::new(
        200,
        None,
        Box::new(BrokenBody {
            prefix: prefix.as_bytes().to_vec(),
            sent: false,
        }),
    ))
}

/// Clock that only moves when something sleeps on it.
pub struct ManualClock {
    now: Mutex<Instant>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Instant::now()),
            sleeps: Mutex::new(Vec::new()),
        })
    }

    pub fn advance(&self, duration: Duration) {
        *self.now.lock().unwrap() += duration;
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
    }
}

pub fn client(
    service: &str,
    script: Vec<Scripted>,
    max_retries: u32,
    clock: &Arc<ManualClock>,
) -> RetryingHttpClient<ScriptedTransport> {
    RetryingHttpClient::with_clock(
        service,
        ScriptedTransport::new(script),
        RetryPolicy::new(max_retries, Duration::from_millis(100), Duration::from_secs(1)),
        Duration::ZERO,
        clock.clone(),
    )
}

pub fn records(identifiers: &[&str]) -> Vec<ProteinRecord> {
    identifiers
        .iter()
        .enumerate()
        .map(|(i, id)| ProteinRecord::new(i + 1, *id, "MKV").unwrap())
        .collect()
}

fn unreachable(service: &str) -> EnrichError {
    EnrichError::RetriesExhausted {
        service: service.to_string(),
        attempts: 4,
        message: "status 503".to_string(),
    }
}

#[derive(Debug, Clone)]
pub enum Answer<T> {
    Found(T),
    NotFound,
    Unreachable,
}

#[derive(Default)]
pub struct MockPrimary {
    answers: HashMap<String, Answer<(&'static str, Option<&'static str>)>>,
    calls: Mutex<Vec<String>>,
}

impl MockPrimary {
    pub fn answer(
        mut self,
        identifier: &str,
        answer: Answer<(&'static str, Option<&'static str>)>,
    ) -> Self {
        self.answers.insert(identifier.to_string(), answer);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl LookupService for MockPrimary {
    type Key = str;
    type Value = PrimaryEntry;

    fn lookup(&self, identifier: &str) -> LookupOutcome<PrimaryEntry> {
        self.calls.lock().unwrap().push(identifier.to_string());
        match self.answers.get(identifier) {
            Some(Answer::Found((tag, description))) => LookupOutcome::Found(PrimaryEntry {
                locus_tag: tag.parse().unwrap(),
                description: description.map(str::to_string),
            }),
            Some(Answer::Unreachable) => LookupOutcome::Failed(unreachable("NCBI")),
            Some(Answer::NotFound) | None => LookupOutcome::NotFound,
        }
    }
}

#[derive(Default)]
pub struct MockStructure {
    answers: HashMap<String, Answer<(&'static str, Option<f64>)>>,
    calls: Mutex<Vec<String>>,
}

impl MockStructure {
    pub fn answer(mut self, locus_tag: &str, answer: Answer<(&'static str, Option<f64>)>) -> Self {
        self.answers.insert(locus_tag.to_string(), answer);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl LookupService for MockStructure {
    type Key = LocusTag;
    type Value = StructureEntry;

    fn lookup(&self, locus_tag: &LocusTag) -> LookupOutcome<StructureEntry> {
        self.calls.lock().unwrap().push(locus_tag.to_string());
        match self.answers.get(locus_tag.as_str()) {
            Some(Answer::Found((accession, confidence))) => {
                let mut entry = StructureEntry::accession_only(accession.parse().unwrap());
                entry.confidence_score = *confidence;
                LookupOutcome::Found(entry)
            }
            Some(Answer::Unreachable) => LookupOutcome::Failed(unreachable("AlphaFold")),
            Some(Answer::NotFound) | None => LookupOutcome::NotFound,
        }
    }
}

/// Pretends to download; records the destination instead of touching disk.
#[derive(Default)]
pub struct MockArtifacts {
    fail: bool,
    calls: Mutex<Vec<(String, Utf8PathBuf)>>,
}

impl MockArtifacts {
    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, Utf8PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ArtifactFetcher for MockArtifacts {
    fn fetch(
        &self,
        accession: &AccessionId,
        _source_url: Option<&str>,
        destination_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, EnrichError> {
        self.calls
            .lock()
            .unwrap()
            .push((accession.to_string(), destination_dir.to_path_buf()));
        if self.fail {
            return Err(EnrichError::Filesystem("disk full".to_string()));
        }
        Ok(destination_dir.join(format!("{accession}.pdb")))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn progress(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Requests cancellation once `after` records have completed.
pub struct CancelAfter {
    pub token: CancellationToken,
    pub after: usize,
}

impl ProgressSink for CancelAfter {
    fn progress(&self, event: ProgressEvent) {
        if event.completed >= self.after {
            self.token.cancel();
        }
    }
}
