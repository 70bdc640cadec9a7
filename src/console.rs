use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tracing::{info, warn};

use crate::domain::ProgressEvent;
use crate::error::EnrichError;
use crate::pipeline::CancellationToken;

const TICK: Duration = Duration::from_millis(120);

static RAW_MODE: AtomicBool = AtomicBool::new(false);

/// Drives a batch on a worker thread and reports its progress on stderr.
///
/// The worker gets the sending half of the progress channel; the calling
/// thread prints each event and, when attached to a terminal, turns `q`,
/// `Esc` or `Ctrl-C` into a cancellation request. A terminal that refuses
/// raw mode or key polling only costs the cancel keys: the worker is always
/// drained and joined.
pub struct ConsoleRunner {
    interactive: bool,
}

impl ConsoleRunner {
    pub fn new(non_interactive: bool) -> Self {
        Self {
            interactive: !non_interactive && io::stdin().is_terminal() && io::stderr().is_terminal(),
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn run<F, R>(&self, cancel: &CancellationToken, job: F) -> Result<R, EnrichError>
    where
        F: FnOnce(Sender<ProgressEvent>) -> Result<R, EnrichError> + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || job(tx));

        let raw_mode = if self.interactive {
            match RawModeGuard::enable() {
                Ok(guard) => {
                    eprint!("press q or Esc to stop after the current record\r\n");
                    Some(guard)
                }
                Err(err) => {
                    warn!(error = %err, "keyboard cancellation unavailable");
                    None
                }
            }
        } else {
            None
        };
        let newline = if raw_mode.is_some() { "\r\n" } else { "\n" };
        let mut watch_keys = raw_mode.is_some();

        loop {
            match rx.recv_timeout(TICK) {
                Ok(event) => print_progress(&event, newline),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if !watch_keys {
                continue;
            }
            match poll_cancel_key() {
                Ok(false) => {}
                Ok(true) => {
                    watch_keys = false;
                    cancel.cancel();
                    info!("cancellation requested");
                    let _ = write!(
                        io::stderr(),
                        "stopping after the current record...{newline}"
                    );
                }
                Err(err) => {
                    watch_keys = false;
                    warn!(error = %err, "stopped watching for cancel keys");
                }
            }
        }
        drop(raw_mode);

        handle
            .join()
            .map_err(|_| EnrichError::Console("worker thread panicked".to_string()))?
    }
}

/// `tracing` writer for stderr that keeps log lines aligned while the
/// terminal is in raw mode.
pub fn log_writer() -> ConsoleLog {
    ConsoleLog
}

pub struct ConsoleLog;

impl Write for ConsoleLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut stderr = io::stderr().lock();
        if RAW_MODE.load(Ordering::SeqCst) {
            stderr.write_all(&raw_line_endings(buf))?;
        } else {
            stderr.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

fn raw_line_endings(buf: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.len() + 8);
    let mut previous = None;
    for &byte in buf {
        if byte == b'\n' && previous != Some(b'\r') {
            out.push(b'\r');
        }
        out.push(byte);
        previous = Some(byte);
    }
    out
}

fn print_progress(event: &ProgressEvent, newline: &str) {
    let _ = write!(
        io::stderr(),
        "[{}/{}] {:>5.1}% {}{newline}",
        event.completed,
        event.total,
        event.percentage(),
        event.current_identifier
    );
}

fn poll_cancel_key() -> Result<bool, EnrichError> {
    while event::poll(Duration::ZERO).map_err(|err| EnrichError::Console(err.to_string()))? {
        if let Event::Key(key) = event::read().map_err(|err| EnrichError::Console(err.to_string()))? {
            if is_cancel_key(&key) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

pub fn is_cancel_key(key: &KeyEvent) -> bool {
    if key.kind == KeyEventKind::Release {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self, EnrichError> {
        enable_raw_mode().map_err(|err| EnrichError::Console(err.to_string()))?;
        RAW_MODE.store(true, Ordering::SeqCst);
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        RAW_MODE.store(false, Ordering::SeqCst);
        let _ = disable_raw_mode();
    }
}
