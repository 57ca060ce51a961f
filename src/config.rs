//! Engine launch settings and the version label verdicts are keyed by.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    ANALYSIS_INTERVAL_CS, READY_MARKER, RESPONSE_TIMEOUT, STARTUP_TIMEOUT,
};

/// How to start one engine subprocess and how long to wait on it.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Substring of an stderr line that means the engine accepts commands.
    pub ready_marker: String,
    pub startup_timeout: Duration,
    /// `None` waits for a response indefinitely.
    pub response_timeout: Option<Duration>,
    /// Analysis reporting interval in centiseconds.
    pub analysis_interval: u32,
}

impl EngineConfig {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            ready_marker: READY_MARKER.to_string(),
            startup_timeout: STARTUP_TIMEOUT,
            response_timeout: Some(RESPONSE_TIMEOUT),
            analysis_interval: ANALYSIS_INTERVAL_CS,
        }
    }

    /// A short name for logs.
    pub fn display_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// Read `key = value` lines, ignoring blanks and `#` comments, including
/// trailing ones.
pub fn parse_key_values(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(|l| l.split('#').next().unwrap_or("").trim())
        .filter_map(|l| l.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// `<weights>-p<maxPlayouts>`, or just `<weights>` when the config does not
/// set a playout limit.
pub fn version_label(weights: &str, config_text: &str) -> String {
    let playouts = parse_key_values(config_text)
        .into_iter()
        .rev()
        .find(|(k, _)| k == "maxPlayouts")
        .map(|(_, v)| v);
    match playouts {
        Some(p) => format!("{weights}-p{p}"),
        None => weights.to_string(),
    }
}

/// [`version_label`] from a config file on disk.
pub fn engine_version(weights: &str, config_path: &Path) -> io::Result<String> {
    let text = fs::read_to_string(config_path)?;
    Ok(version_label(weights, &text))
}
