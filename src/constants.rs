//! Constants for board geometry, protocol framing, and solver defaults.
//!
//! Board sizes are a run-time property of each problem, bounded by the
//! 19-letter coordinate alphabets. Everything else here is a default that
//! the CLI can override.

use std::time::Duration;

// =============================================================================
// Board Geometry
// =============================================================================

/// Largest board any coordinate alphabet can address.
pub const MAX_SIZE: usize = 19;

/// Board size assumed when a problem does not declare one.
pub const DEFAULT_SIZE: usize = 19;

/// Storage alphabet: one letter per line, nothing skipped.
pub const STORAGE_LETTERS: &[u8; MAX_SIZE] = b"abcdefghijklmnopqrs";

/// Protocol and display column letters. `I` is skipped (Go convention to
/// avoid confusion with `J`).
pub const VERTEX_LETTERS: &[u8; MAX_SIZE] = b"ABCDEFGHJKLMNOPQRST";

// =============================================================================
// Problem Transformer
// =============================================================================

/// A bounding-box side closer than this to the board edge counts as
/// adjacent to it.
pub const EDGE_ADJACENCY: usize = 3;

/// Symmetric fallback fill applies only when the problem touches at most
/// this many edges.
pub const MAX_EDGES_FOR_MIRROR: usize = 2;

/// Komi used when the transformer does not derive one from padding.
pub const DEFAULT_KOMI: f32 = 7.5;

// =============================================================================
// Engine Protocol
// =============================================================================

/// Substring the engine writes to stderr once it accepts commands.
pub const READY_MARKER: &str = "GTP ready";

/// How long to wait for the ready marker.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(120);

/// How long to wait for a framed response before giving up on the session.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(600);

/// How long to wait for the stream terminator after cancelling analysis.
pub const ANALYSIS_SETTLE: Duration = Duration::from_secs(2);

/// Reporting interval for streamed analysis, in centiseconds.
pub const ANALYSIS_INTERVAL_CS: u32 = 100;

/// Most recent engine stderr lines kept for error reports.
pub const STDERR_TAIL_LINES: usize = 64;

/// Success sentinel at the start of a response block.
pub const SUCCESS_PREFIX: char = '=';

/// Failure sentinel at the start of a response block.
pub const FAILURE_PREFIX: char = '?';

// =============================================================================
// Backpressure
// =============================================================================

/// Temperature (°C) above which a running analysis is cancelled.
pub const ANALYSIS_TEMP_LIMIT: f64 = 75.0;

/// Temperature (°C) above which the batch driver cools down before the next
/// attempt.
pub const COOLDOWN_TEMP_LIMIT: f64 = 60.0;

/// Cooldown sleep per degree above the limit.
pub const COOLDOWN_PER_DEGREE: Duration = Duration::from_secs(5);

// =============================================================================
// Batch Driver
// =============================================================================

/// Verdicts buffered before the store is flushed.
pub const VERDICT_BATCH: usize = 10;
