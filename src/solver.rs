//! Asking an engine to solve a problem, and judging its answer.
//!
//! One attempt is a fixed cycle:
//!
//! 1. **Setup**: `boardsize`, `clear_board`, `komi` and every preset stone,
//!    sent as one pipelined batch.
//! 2. **AwaitMove**: `genmove` for the side to move.
//! 3. **Verdict**: the move is correct when it (or, on a mirrored board,
//!    its point reflection) opens an eligible answer line.
//!
//! Which attempts to make is decided up front by [`ladder`] from the
//! problem's [`Enclosure`]. Attempts share nothing but the engine process;
//! `clear_board` resets it each time.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::coord::{Color, Point, Vertex};
use crate::problem::{Problem, ProblemError};
use crate::session::{EngineError, EngineSession, Response};
use crate::transform::{Edges, Rect, TransformedProblem, pad, pad_symmetric, reduce};

/// The protocol surface the orchestrator needs. Implemented by
/// [`EngineSession`]; tests substitute a scripted engine.
pub trait Gtp {
    fn send_command(&mut self, command: &str, expected_blocks: usize)
    -> Result<Response, EngineError>;
}

impl Gtp for EngineSession {
    fn send_command(
        &mut self,
        command: &str,
        expected_blocks: usize,
    ) -> Result<Response, EngineError> {
        EngineSession::send_command(self, command, expected_blocks)
    }
}

/// One rung of the retry ladder.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Strategy {
    /// Exchange black and white before transforming.
    pub swap_colors: bool,
    /// Add the point-reflected copy of the problem.
    pub symmetric: bool,
}

impl Strategy {
    pub const PLAIN: Strategy = Strategy {
        swap_colors: false,
        symmetric: false,
    };
    pub const PLAIN_SYMMETRIC: Strategy = Strategy {
        swap_colors: false,
        symmetric: true,
    };
    pub const SWAPPED: Strategy = Strategy {
        swap_colors: true,
        symmetric: false,
    };
    pub const SWAPPED_SYMMETRIC: Strategy = Strategy {
        swap_colors: true,
        symmetric: true,
    };

    /// Persisted orientation code: tens digit 1 plain / 2 swapped, units
    /// digit 1 when symmetric.
    pub fn code(self) -> u8 {
        let base = if self.swap_colors { 20 } else { 10 };
        base + u8::from(self.symmetric)
    }
}

impl TryFrom<u8> for Strategy {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            10 => Ok(Strategy::PLAIN),
            11 => Ok(Strategy::PLAIN_SYMMETRIC),
            20 => Ok(Strategy::SWAPPED),
            21 => Ok(Strategy::SWAPPED_SYMMETRIC),
            other => Err(format!("unknown strategy code {other}")),
        }
    }
}

impl From<Strategy> for u8 {
    fn from(s: Strategy) -> Self {
        s.code()
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let colors = if self.swap_colors { "swapped" } else { "plain" };
        if self.symmetric {
            write!(f, "{colors}+symmetric")
        } else {
            f.write_str(colors)
        }
    }
}

/// Which side surrounds the other in a problem.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Enclosure {
    Black,
    White,
    Ambiguous,
}

/// Attempts to make, in order, for a given enclosure. Padding always fills
/// with black, so the surrounding side should be black when the engine
/// sees it.
pub fn ladder(enclosure: Enclosure) -> &'static [Strategy] {
    match enclosure {
        Enclosure::Black => &[Strategy::PLAIN, Strategy::PLAIN_SYMMETRIC],
        Enclosure::White => &[Strategy::SWAPPED, Strategy::SWAPPED_SYMMETRIC],
        Enclosure::Ambiguous => &[
            Strategy::PLAIN,
            Strategy::PLAIN_SYMMETRIC,
            Strategy::SWAPPED,
            Strategy::SWAPPED_SYMMETRIC,
        ],
    }
}

/// Decides which side surrounds the other.
pub trait EnclosureClassifier {
    fn classify(&self, problem: &Problem) -> Enclosure;
}

/// Looks at the problem from every open side of its bounding box: along
/// each row or column, the first stone met from outside votes for its
/// color. A color with at least `majority` of the votes surrounds.
#[derive(Debug, Clone, Copy)]
pub struct BoundaryClassifier {
    pub majority: f64,
}

impl Default for BoundaryClassifier {
    fn default() -> Self {
        Self { majority: 2.0 / 3.0 }
    }
}

impl EnclosureClassifier for BoundaryClassifier {
    fn classify(&self, problem: &Problem) -> Enclosure {
        if problem.validate().is_err() {
            return Enclosure::Ambiguous;
        }
        let size = problem.size;
        let Some(bbox) = Rect::of(problem.placement.stones().map(|(_, p)| p)) else {
            return Enclosure::Ambiguous;
        };
        let edges = Edges::of(&bbox, size);
        let mut grid = vec![None; size * size];
        for (color, p) in problem.placement.stones() {
            if p.on_board(size) {
                grid[p.y * size + p.x] = Some(color);
            }
        }
        let at = |x: usize, y: usize| grid[y * size + x];

        let mut votes = [0usize; 2];
        let mut vote = |c: Option<Color>| {
            if let Some(c) = c {
                votes[c as usize] += 1;
            }
        };
        let xs = bbox.min_x..=bbox.max_x;
        let ys = bbox.min_y..=bbox.max_y;
        for y in ys.clone() {
            if !edges.left {
                vote(xs.clone().find_map(|x| at(x, y)));
            }
            if !edges.right {
                vote(xs.clone().rev().find_map(|x| at(x, y)));
            }
        }
        for x in xs {
            if !edges.top {
                vote(ys.clone().find_map(|y| at(x, y)));
            }
            if !edges.bottom {
                vote(ys.clone().rev().find_map(|y| at(x, y)));
            }
        }

        let total = votes[0] + votes[1];
        if total == 0 {
            return Enclosure::Ambiguous;
        }
        let share = |n: usize| n as f64 / total as f64;
        if share(votes[Color::Black as usize]) >= self.majority {
            Enclosure::Black
        } else if share(votes[Color::White as usize]) >= self.majority {
            Enclosure::White
        } else {
            Enclosure::Ambiguous
        }
    }
}

/// How the board is prepared for the engine.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Layout {
    /// Keep the board size and pad around the problem.
    #[default]
    Padded,
    /// Shrink the board to the problem's corner. Symmetric strategies
    /// still pad, since a mirror needs the whole board.
    Reduced,
}

/// The engine's answer to one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineMove {
    Play(Point),
    Pass,
    Resign,
    /// Not a vertex on this board; kept verbatim.
    Invalid(String),
}

/// Outcome of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub strategy: Strategy,
    pub color: Color,
    /// The raw token the engine returned.
    pub answer: String,
    pub engine_move: EngineMove,
    pub solved: bool,
}

/// Outcome of a whole ladder: the last attempt made, and whether any
/// attempt succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub public_id: u64,
    pub attempts: Vec<Verdict>,
}

impl SolveReport {
    pub fn solved(&self) -> bool {
        self.attempts.last().is_some_and(|v| v.solved)
    }

    pub fn last(&self) -> Option<&Verdict> {
        self.attempts.last()
    }
}

/// Build the board an attempt is played on.
pub fn prepare(
    problem: &Problem,
    strategy: Strategy,
    layout: Layout,
) -> Result<TransformedProblem, ProblemError> {
    let oriented = if strategy.swap_colors {
        problem.swapped()
    } else {
        problem.clone()
    };
    match (strategy.symmetric, layout) {
        (true, _) => pad_symmetric(&oriented),
        (false, Layout::Padded) => pad(&oriented),
        (false, Layout::Reduced) => reduce(&oriented),
    }
}

/// The Setup batch: `(commands, expected blocks)`.
pub fn setup_commands(t: &TransformedProblem) -> (String, usize) {
    let mut lines = vec![
        format!("boardsize {}", t.size),
        "clear_board".to_string(),
        format!("komi {}", t.komi),
    ];
    for (color, p) in t.placement.stones() {
        lines.push(format!("play {} {}", color.gtp(), p.label(t.size)));
    }
    let n = lines.len();
    let mut batch = lines.join("\n");
    batch.push('\n');
    (batch, n)
}

/// Read a `genmove` token on a board of `size`.
pub fn parse_engine_move(token: &str, size: usize) -> EngineMove {
    match Vertex::parse(token, size) {
        Ok(Vertex::Play(p)) => EngineMove::Play(p),
        Ok(Vertex::Pass) => EngineMove::Pass,
        Ok(Vertex::Resign) => EngineMove::Resign,
        Err(_) => EngineMove::Invalid(token.to_string()),
    }
}

/// Whether the engine's move opens an eligible line. On a mirrored board
/// the reflected move counts too.
pub fn judge(t: &TransformedProblem, mv: &EngineMove) -> bool {
    let EngineMove::Play(p) = *mv else {
        return false;
    };
    t.opens_a_line(p) || (t.mirrored && t.opens_a_line(p.mirrored(t.size)))
}

/// Errors that end a solve: bad problem data or a broken session.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error(transparent)]
    Problem(#[from] ProblemError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Runs attempts against one engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct Solver {
    pub layout: Layout,
}

impl Solver {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// One Setup → AwaitMove → Verdict cycle.
    pub fn solve_once(
        &self,
        engine: &mut dyn Gtp,
        problem: &Problem,
        strategy: Strategy,
    ) -> Result<Verdict, SolveError> {
        let started = Instant::now();
        let t = prepare(problem, strategy, self.layout)?;

        let (batch, blocks) = setup_commands(&t);
        let setup = engine.send_command(&batch, blocks)?;
        if !setup.all_ok() {
            let refused: Vec<&str> = setup
                .replies
                .iter()
                .filter(|r| !r.ok)
                .map(|r| r.text.as_str())
                .collect();
            warn!(publicid = problem.public_id, %strategy, ?refused, "engine refused setup commands");
        }

        let color = t.to_move;
        let reply = engine.send_command(&format!("genmove {}", color.gtp()), 1)?;
        let answer = reply.last_text().trim().to_string();
        let engine_move = parse_engine_move(&answer, t.size);
        if let EngineMove::Invalid(token) = &engine_move {
            warn!(publicid = problem.public_id, %strategy, "invalid engine move {token:?}");
        }
        let solved = judge(&t, &engine_move);

        debug!(
            publicid = problem.public_id,
            %strategy,
            %color,
            answer = %answer,
            solved,
            elapsed = ?started.elapsed(),
            "attempt finished"
        );
        Ok(Verdict {
            strategy,
            color,
            answer,
            engine_move,
            solved,
        })
    }

    /// Walk the strategies in order, stopping at the first success.
    pub fn run_ladder(
        &self,
        engine: &mut dyn Gtp,
        problem: &Problem,
        strategies: &[Strategy],
    ) -> Result<SolveReport, SolveError> {
        let mut report = SolveReport {
            public_id: problem.public_id,
            attempts: Vec::new(),
        };
        for &strategy in strategies {
            let verdict = self.solve_once(engine, problem, strategy)?;
            let solved = verdict.solved;
            report.attempts.push(verdict);
            if solved {
                break;
            }
        }
        if let Some(last) = report.last() {
            info!(
                publicid = problem.public_id,
                strategy = last.strategy.code(),
                answer = %last.answer,
                solved = last.solved,
                "problem done"
            );
        }
        Ok(report)
    }

    /// Classify, pick the ladder, run it.
    pub fn solve(
        &self,
        engine: &mut dyn Gtp,
        problem: &Problem,
        classifier: &dyn EnclosureClassifier,
    ) -> Result<SolveReport, SolveError> {
        problem.validate()?;
        let enclosure = classifier.classify(problem);
        debug!(publicid = problem.public_id, ?enclosure, "enclosure");
        self.run_ladder(engine, problem, ladder(enclosure))
    }
}
