//! Problems as stored: setup stones, the side to move, and the recorded
//! answer lines.
//!
//! Field names on the wire follow the problem documents (`publicid`,
//! `prepos`, `answers[].ty/st/p`), so existing collections load unchanged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::{BoardState, IllegalMove};
use crate::constants::{DEFAULT_SIZE, MAX_SIZE};
use crate::coord::{Color, Point};

/// Data-integrity failures. Logged and skipped by the batch driver, never
/// fatal to a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProblemError {
    #[error("problem {public_id} has no eligible answer line")]
    NoEligibleLine { public_id: u64 },
    #[error("problem {public_id}: unsupported board size {size}")]
    BoardSize { public_id: u64, size: usize },
    #[error("problem {public_id}: {point} is off a {size}x{size} board")]
    OffBoard {
        public_id: u64,
        point: Point,
        size: usize,
    },
    #[error("problem {public_id}: more than one stone at {point}")]
    Overlap { public_id: u64, point: Point },
    #[error("problem {public_id} has no setup stones")]
    NoStones { public_id: u64 },
    #[error("problem {public_id}: setup stones rejected: {reason}")]
    Setup { public_id: u64, reason: IllegalMove },
}

/// What a recorded line represents.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LineKind {
    /// A correct solution.
    Primary,
    Variation,
    Failure,
    Pruned,
}

impl TryFrom<u8> for LineKind {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(LineKind::Primary),
            2 => Ok(LineKind::Variation),
            3 => Ok(LineKind::Failure),
            4 => Ok(LineKind::Pruned),
            other => Err(format!("unknown answer line type {other}")),
        }
    }
}

impl From<LineKind> for u8 {
    fn from(k: LineKind) -> Self {
        match k {
            LineKind::Primary => 1,
            LineKind::Variation => 2,
            LineKind::Failure => 3,
            LineKind::Pruned => 4,
        }
    }
}

/// Editorial state of a line. Only status 2 means approved.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Review {
    Pending,
    Approved,
}

impl From<u8> for Review {
    fn from(v: u8) -> Self {
        if v == 2 {
            Review::Approved
        } else {
            Review::Pending
        }
    }
}

impl From<Review> for u8 {
    fn from(r: Review) -> Self {
        match r {
            Review::Pending => 1,
            Review::Approved => 2,
        }
    }
}

/// Setup stones, split by color.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Placement {
    #[serde(rename = "b", default)]
    pub black: Vec<Point>,
    #[serde(rename = "w", default)]
    pub white: Vec<Point>,
}

impl Placement {
    pub fn stones(&self) -> impl Iterator<Item = (Color, Point)> + '_ {
        self.black
            .iter()
            .map(|&p| (Color::Black, p))
            .chain(self.white.iter().map(|&p| (Color::White, p)))
    }

    pub fn len(&self) -> usize {
        self.black.len() + self.white.len()
    }

    pub fn is_empty(&self) -> bool {
        self.black.is_empty() && self.white.is_empty()
    }

    pub fn color_at(&self, p: Point) -> Option<Color> {
        if self.black.contains(&p) {
            Some(Color::Black)
        } else if self.white.contains(&p) {
            Some(Color::White)
        } else {
            None
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        self.color_at(p).is_some()
    }

    pub fn push(&mut self, color: Color, p: Point) {
        match color {
            Color::Black => self.black.push(p),
            Color::White => self.white.push(p),
        }
    }

    /// The same stones with colors exchanged.
    pub fn swapped(&self) -> Self {
        Self {
            black: self.white.clone(),
            white: self.black.clone(),
        }
    }

    pub fn map_points(&self, f: impl Fn(Point) -> Point) -> Self {
        Self {
            black: self.black.iter().map(|&p| f(p)).collect(),
            white: self.white.iter().map(|&p| f(p)).collect(),
        }
    }
}

/// One recorded continuation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerLine {
    #[serde(rename = "ty")]
    pub kind: LineKind,
    #[serde(rename = "st")]
    pub review: Review,
    #[serde(rename = "p", default)]
    pub moves: Vec<Point>,
}

impl AnswerLine {
    pub fn primary(moves: Vec<Point>) -> Self {
        Self {
            kind: LineKind::Primary,
            review: Review::Approved,
            moves,
        }
    }
}

fn default_size() -> usize {
    DEFAULT_SIZE
}

fn default_black_first() -> bool {
    true
}

/// A life-and-death problem. Immutable once an attempt starts; transforms
/// produce new values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "publicid")]
    pub public_id: u64,
    #[serde(default = "default_size")]
    pub size: usize,
    #[serde(rename = "blackfirst", default = "default_black_first")]
    pub black_first: bool,
    #[serde(rename = "prepos", default)]
    pub placement: Placement,
    #[serde(rename = "answers", default)]
    pub answers: Vec<AnswerLine>,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub qtype: String,
}

impl Problem {
    pub fn to_move(&self) -> Color {
        if self.black_first {
            Color::Black
        } else {
            Color::White
        }
    }

    /// The lines a solution is judged against: approved primary lines, or
    /// pending primary lines when none are approved yet. Empty lines never
    /// qualify.
    pub fn eligible_lines(&self) -> Result<Vec<&AnswerLine>, ProblemError> {
        let primary = |review: Review| {
            self.answers
                .iter()
                .filter(move |a| {
                    a.kind == LineKind::Primary && a.review == review && !a.moves.is_empty()
                })
                .collect::<Vec<_>>()
        };
        let approved = primary(Review::Approved);
        if !approved.is_empty() {
            return Ok(approved);
        }
        let pending = primary(Review::Pending);
        if !pending.is_empty() {
            return Ok(pending);
        }
        Err(ProblemError::NoEligibleLine {
            public_id: self.public_id,
        })
    }

    /// Check size, stone overlap, and that every stone and answer move is on
    /// the board.
    pub fn validate(&self) -> Result<(), ProblemError> {
        let public_id = self.public_id;
        let size = self.size;
        if size == 0 || size > MAX_SIZE {
            return Err(ProblemError::BoardSize { public_id, size });
        }
        let mut seen = vec![false; size * size];
        for (_, point) in self.placement.stones() {
            if !point.on_board(size) {
                return Err(ProblemError::OffBoard {
                    public_id,
                    point,
                    size,
                });
            }
            let i = point.y * size + point.x;
            if seen[i] {
                return Err(ProblemError::Overlap { public_id, point });
            }
            seen[i] = true;
        }
        for line in &self.answers {
            if let Some(&point) = line.moves.iter().find(|p| !p.on_board(size)) {
                return Err(ProblemError::OffBoard {
                    public_id,
                    point,
                    size,
                });
            }
        }
        Ok(())
    }

    /// A fresh board holding the setup stones.
    pub fn initial_board(&self) -> Result<BoardState, ProblemError> {
        self.validate()?;
        BoardState::setup(self.size, self.placement.stones()).map_err(|reason| {
            ProblemError::Setup {
                public_id: self.public_id,
                reason,
            }
        })
    }

    /// Black and white exchanged, stones and side to move alike. Answer
    /// coordinates are unchanged: the same points are still correct.
    pub fn swapped(&self) -> Self {
        Self {
            placement: self.placement.swapped(),
            black_first: !self.black_first,
            ..self.clone()
        }
    }
}
