//! Client side of the Go Text Protocol, talking to an engine subprocess.
//!
//! ## Framing
//!
//! Every command produces one block on stdout: a header line starting with
//! `=` (success) or `?` (failure), optional continuation lines, and a blank
//! line. Commands may be pipelined: sending several newline-separated
//! commands at once yields their blocks in issue order.
//!
//! The engine writes diagnostics to stderr. One of those lines carries the
//! readiness marker; until it appears no command is sent.
//!
//! ## Threads
//!
//! Two reader threads own the child's stdout and stderr and forward lines
//! over channels. All calls on [`EngineSession`] block on those channels,
//! bounded by the configured response timeout.
//!
//! ## Analysis
//!
//! `kata-analyze` streams `info` lines until any input line arrives.
//! [`EngineSession::stream_analysis`] collects samples until it has enough
//! or a [`PressureSignal`] asks it to stop, then cancels with a blank line
//! and waits briefly for the stream terminator so the session stays usable.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::config::EngineConfig;
use crate::constants::{ANALYSIS_SETTLE, FAILURE_PREFIX, STDERR_TAIL_LINES, SUCCESS_PREFIX};
use crate::coord::Color;
use crate::pressure::PressureSignal;

/// Session-fatal failures. After any of these the session should be closed.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start engine {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("engine did not report ready within {0:?}")]
    StartupTimeout(Duration),
    #[error("no framed response within {0:?}")]
    ResponseTimeout(Duration),
    #[error("engine exited")]
    Exited,
    #[error("engine refused {command:?}: {message}")]
    Refused { command: String, message: String },
    #[error("engine i/o: {0}")]
    Io(#[from] io::Error),
}

/// One response block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Header was `=` rather than `?`.
    pub ok: bool,
    /// Header text after the sentinel and optional id, then any
    /// continuation lines joined by newlines.
    pub text: String,
}

impl Reply {
    /// Parse a header line. `None` if it is not one.
    fn header(line: &str) -> Option<Self> {
        let ok = match line.chars().next()? {
            SUCCESS_PREFIX => true,
            FAILURE_PREFIX => false,
            _ => return None,
        };
        let rest = line[1..].trim_start_matches(|c: char| c.is_ascii_digit());
        Some(Self {
            ok,
            text: rest.trim().to_string(),
        })
    }
}

/// The blocks answering one pipelined batch, in issue order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub replies: Vec<Reply>,
}

impl Response {
    /// All block texts joined by newlines.
    pub fn body(&self) -> String {
        self.replies
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn all_ok(&self) -> bool {
        self.replies.iter().all(|r| r.ok)
    }

    /// Text of the last block, the usual place for a single answer.
    pub fn last_text(&self) -> &str {
        self.replies.last().map(|r| r.text.as_str()).unwrap_or("")
    }
}

/// One `info` line of streamed analysis, first candidate only.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSample {
    pub mv: String,
    pub visits: u64,
    pub winrate: Option<f64>,
}

impl AnalysisSample {
    /// `info move <m> visits <n> edgeVisits <e> utility <u> winrate <w> ...`
    pub fn parse(line: &str) -> Option<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.first() != Some(&"info") || tokens.get(1) != Some(&"move") {
            return None;
        }
        Some(Self {
            mv: tokens.get(2)?.to_string(),
            visits: tokens.get(4)?.parse().ok()?,
            winrate: tokens.get(10).and_then(|w| w.parse().ok()),
        })
    }
}

/// The last `cap` lines of engine stderr.
#[derive(Debug)]
struct StderrTail {
    lines: VecDeque<String>,
    cap: usize,
}

impl StderrTail {
    fn new(cap: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(cap),
            cap,
        }
    }

    fn push(&mut self, line: String) {
        if self.cap == 0 {
            return;
        }
        if self.lines.len() == self.cap {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }
}

/// A running engine subprocess.
pub struct EngineSession {
    name: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Receiver<String>,
    stderr_tail: Arc<Mutex<StderrTail>>,
    readers: Vec<JoinHandle<()>>,
    response_timeout: Option<Duration>,
    analysis_interval: u32,
    closed: bool,
}

fn spawn_reader<R: Read + Send + 'static>(
    stream: R,
    mut on_line: impl FnMut(String) -> bool + Send + 'static,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            let Ok(line) = line else { break };
            if !on_line(line) {
                break;
            }
        }
    })
}

impl EngineSession {
    /// Spawn the engine and wait for the readiness marker on stderr.
    pub fn start(config: &EngineConfig) -> Result<Self, EngineError> {
        let started = Instant::now();
        let name = config.display_name();
        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }
        let mut child = command.spawn().map_err(|source| EngineError::Spawn {
            program: config.program.display().to_string(),
            source,
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(EngineError::Exited);
        };

        let (line_tx, line_rx) = crossbeam_channel::unbounded::<String>();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<()>(1);
        let stderr_tail = Arc::new(Mutex::new(StderrTail::new(STDERR_TAIL_LINES)));

        let stdout_reader = spawn_reader(stdout, move |line| line_tx.send(line).is_ok());
        let stderr_reader = {
            let tail = Arc::clone(&stderr_tail);
            let marker = config.ready_marker.clone();
            let name = name.clone();
            let mut ready_tx: Option<Sender<()>> = Some(ready_tx);
            spawn_reader(stderr, move |line| {
                debug!(engine = %name, "stderr: {line}");
                if line.contains(&marker) {
                    if let Some(tx) = ready_tx.take() {
                        let _ = tx.send(());
                    }
                }
                if let Ok(mut tail) = tail.lock() {
                    tail.push(line);
                }
                true
            })
        };

        let mut session = Self {
            name,
            child,
            stdin: Some(stdin),
            stdout: line_rx,
            stderr_tail,
            readers: vec![stdout_reader, stderr_reader],
            response_timeout: config.response_timeout,
            analysis_interval: config.analysis_interval,
            closed: false,
        };

        match ready_rx.recv_timeout(config.startup_timeout) {
            Ok(()) => {
                info!(engine = %session.name, elapsed = ?started.elapsed(), "engine ready");
                Ok(session)
            }
            Err(RecvTimeoutError::Timeout) => {
                session.close();
                session.report_tail("engine never reported ready");
                Err(EngineError::StartupTimeout(config.startup_timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                session.close();
                session.report_tail("engine exited during startup");
                Err(EngineError::Exited)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The most recent lines the engine wrote to stderr.
    pub fn diagnostics(&self) -> Vec<String> {
        self.stderr_tail
            .lock()
            .map(|tail| tail.lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn report_tail(&self, what: &str) {
        let tail = self.diagnostics();
        if tail.is_empty() {
            warn!(engine = %self.name, "{what}, no stderr output");
        } else {
            warn!(engine = %self.name, "{what}, last stderr lines:\n{}", tail.join("\n"));
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.response_timeout.map(|t| Instant::now() + t)
    }

    fn recv_line(&self, deadline: Option<Instant>) -> Result<String, EngineError> {
        match deadline {
            Some(d) => self.stdout.recv_deadline(d).map_err(|e| match e {
                RecvTimeoutError::Timeout => {
                    EngineError::ResponseTimeout(self.response_timeout.unwrap_or_default())
                }
                RecvTimeoutError::Disconnected => EngineError::Exited,
            }),
            None => self.stdout.recv().map_err(|_| EngineError::Exited),
        }
    }

    /// Discard output left over from an earlier exchange.
    fn drain_stale(&self) -> Result<(), EngineError> {
        loop {
            match self.stdout.try_recv() {
                Ok(line) if line.trim().is_empty() => {}
                Ok(line) => warn!(engine = %self.name, "stale output: {line}"),
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => return Err(EngineError::Exited),
            }
        }
    }

    fn write_line(&mut self, text: &str) -> Result<(), EngineError> {
        let stdin = self.stdin.as_mut().ok_or(EngineError::Exited)?;
        stdin.write_all(text.as_bytes())?;
        if !text.ends_with('\n') {
            stdin.write_all(b"\n")?;
        }
        stdin.flush()?;
        Ok(())
    }

    /// Wait for the next header line, skipping anything that is not one.
    fn next_header(&self, deadline: Option<Instant>) -> Result<Reply, EngineError> {
        loop {
            let line = self.recv_line(deadline)?;
            if let Some(reply) = Reply::header(&line) {
                return Ok(reply);
            }
            if !line.trim().is_empty() {
                debug!(engine = %self.name, "skipping unframed output: {line}");
            }
        }
    }

    /// Send one command, or several separated by newlines, and collect
    /// `expected_blocks` response blocks.
    pub fn send_command(
        &mut self,
        command: &str,
        expected_blocks: usize,
    ) -> Result<Response, EngineError> {
        self.drain_stale()?;
        trace!(engine = %self.name, "> {}", command.trim_end());
        self.write_line(command)?;

        let deadline = self.deadline();
        let mut replies = Vec::with_capacity(expected_blocks);
        while replies.len() < expected_blocks {
            let mut reply = self.next_header(deadline)?;
            loop {
                let line = self.recv_line(deadline)?;
                if line.trim().is_empty() {
                    break;
                }
                reply.text.push('\n');
                reply.text.push_str(line.trim_end());
            }
            trace!(engine = %self.name, ok = reply.ok, "< {}", reply.text);
            replies.push(reply);
        }
        Ok(Response { replies })
    }

    /// Stream `kata-analyze` for `color` until `target` samples arrive or
    /// `pressure` is asserted, whichever comes first.
    pub fn stream_analysis(
        &mut self,
        color: Color,
        target: usize,
        pressure: &dyn PressureSignal,
    ) -> Result<Vec<AnalysisSample>, EngineError> {
        self.drain_stale()?;
        let command = format!("kata-analyze {} {}", color.gtp(), self.analysis_interval);
        self.write_line(&command)?;

        let header = self.next_header(self.deadline())?;
        if !header.ok {
            return Err(EngineError::Refused {
                command,
                message: header.text,
            });
        }

        let mut samples = Vec::new();
        if let Some(sample) = AnalysisSample::parse(&header.text) {
            samples.push(sample);
        }
        while samples.len() < target {
            let line = self.recv_line(self.deadline())?;
            if line.trim().is_empty() {
                // Engine ended the stream on its own.
                return Ok(samples);
            }
            let Some(sample) = AnalysisSample::parse(&line) else {
                debug!(engine = %self.name, "skipping analysis line: {line}");
                continue;
            };
            samples.push(sample);
            if pressure.asserted() {
                info!(engine = %self.name, samples = samples.len(), "analysis cancelled under pressure");
                break;
            }
        }

        self.write_line("")?;
        self.settle()?;
        Ok(samples)
    }

    /// After cancelling analysis, consume lines up to the terminating blank
    /// line, giving up quietly after a short wait.
    fn settle(&self) -> Result<(), EngineError> {
        let deadline = Instant::now() + ANALYSIS_SETTLE;
        loop {
            match self.stdout.recv_deadline(deadline) {
                Ok(line) if line.trim().is_empty() => return Ok(()),
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) => {
                    debug!(engine = %self.name, "analysis stream did not terminate");
                    return Ok(());
                }
                Err(RecvTimeoutError::Disconnected) => return Err(EngineError::Exited),
            }
        }
    }

    /// Kill the engine and join the readers. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        drop(self.stdin.take());
        if let Err(e) = self.child.kill() {
            debug!(engine = %self.name, "kill: {e}");
        }
        let _ = self.child.wait();
        for handle in self.readers.drain(..) {
            let _ = handle.join();
        }
        debug!(engine = %self.name, "engine closed");
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_parsing() {
        assert_eq!(
            Reply::header("= C3"),
            Some(Reply {
                ok: true,
                text: "C3".into()
            })
        );
        assert_eq!(
            Reply::header("?12 illegal move"),
            Some(Reply {
                ok: false,
                text: "illegal move".into()
            })
        );
        assert_eq!(Reply::header("="), Some(Reply { ok: true, text: String::new() }));
        assert_eq!(Reply::header("info move C3"), None);
        assert_eq!(Reply::header(""), None);
    }

    #[test]
    fn test_response_body() {
        let r = Response {
            replies: vec![
                Reply {
                    ok: true,
                    text: String::new(),
                },
                Reply {
                    ok: false,
                    text: "bad".into(),
                },
                Reply {
                    ok: true,
                    text: "D4".into(),
                },
            ],
        };
        assert_eq!(r.body(), "\nbad\nD4");
        assert!(!r.all_ok());
        assert_eq!(r.last_text(), "D4");
        assert_eq!(Response::default().last_text(), "");
    }

    #[test]
    fn test_analysis_sample() {
        let line = "info move R16 visits 56 edgeVisits 56 utility -0.29 winrate 0.36 \
                    scoreMean -0.8 order 0 pv R16 D16";
        let s = AnalysisSample::parse(line).unwrap();
        assert_eq!(s.mv, "R16");
        assert_eq!(s.visits, 56);
        assert_eq!(s.winrate, Some(0.36));
        assert!(AnalysisSample::parse("= ").is_none());
        assert!(AnalysisSample::parse("info move R16 visits many").is_none());
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let config = EngineConfig::new("/nonexistent/tsumego-engine", Vec::new());
        assert!(matches!(
            EngineSession::start(&config),
            Err(EngineError::Spawn { .. })
        ));
    }

    #[test]
    fn test_stderr_tail_keeps_latest_lines() {
        let mut tail = StderrTail::new(3);
        for i in 0..10 {
            tail.push(format!("line {i}"));
        }
        assert_eq!(tail.lines, ["line 7", "line 8", "line 9"]);

        let mut none = StderrTail::new(0);
        none.push("dropped".into());
        assert!(none.lines.is_empty());
    }
}
