//! Stone colors, board points, and the text encodings of a point.
//!
//! A [`Point`] is a plain `(x, y)` pair: `x` is the column counted from the
//! left, `y` the row counted from the top. It crosses a text boundary in
//! exactly one of two forms, and only through the functions below:
//!
//! - **storage** (`"qd"`): two letters from `a..s`, column then row, no
//!   letter skipped. This is how problems and answer lines are persisted.
//! - **vertex** (`"Q16"`): the Go Text Protocol form. Columns use
//!   `ABCDEFGHJKLMNOPQRST` (no `I`), rows are numbered `1..=N` from the
//!   bottom edge, so the text depends on the board size. Board labels shown
//!   to a human use the same form.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{MAX_SIZE, STORAGE_LETTERS, VERTEX_LETTERS};

/// A stone color. Black sorts before white, which the canonical ordering
/// relies on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Color {
    #[serde(rename = "b")]
    Black,
    #[serde(rename = "w")]
    White,
}

impl Color {
    pub fn opponent(self) -> Self {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    /// Single-letter storage key (`b` / `w`).
    pub fn key(self) -> char {
        match self {
            Color::Black => 'b',
            Color::White => 'w',
        }
    }

    /// Color argument as sent to the engine.
    pub fn gtp(self) -> &'static str {
        match self {
            Color::Black => "B",
            Color::White => "W",
        }
    }

    /// Parse a protocol color argument (`b`, `black`, `W`, ...).
    pub fn parse_gtp(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "b" | "black" => Some(Color::Black),
            "w" | "white" => Some(Color::White),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Black => write!(f, "Black"),
            Color::White => write!(f, "White"),
        }
    }
}

/// Failure to read a point from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordError {
    #[error("invalid storage coordinate {0:?}")]
    Storage(String),
    #[error("invalid vertex {0:?}")]
    Vertex(String),
    #[error("vertex {vertex:?} is outside a {size}x{size} board")]
    OffBoard { vertex: String, size: usize },
}

/// A board intersection, `x` from the left and `y` from the top.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Point {
    pub x: usize,
    pub y: usize,
}

impl Point {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Parse the two-letter storage form.
    pub fn from_sgf(s: &str) -> Result<Self, CoordError> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err(CoordError::Storage(s.to_string()));
        }
        let index = |b: u8| STORAGE_LETTERS.iter().position(|&l| l == b);
        match (index(bytes[0]), index(bytes[1])) {
            (Some(x), Some(y)) => Ok(Self { x, y }),
            _ => Err(CoordError::Storage(s.to_string())),
        }
    }

    /// Two-letter storage form.
    pub fn to_sgf(self) -> String {
        debug_assert!(self.x < MAX_SIZE && self.y < MAX_SIZE);
        let mut s = String::with_capacity(2);
        s.push(STORAGE_LETTERS[self.x] as char);
        s.push(STORAGE_LETTERS[self.y] as char);
        s
    }

    /// Human-facing label on a board of `size`, e.g. `D4`.
    pub fn label(self, size: usize) -> String {
        let col = VERTEX_LETTERS[self.x] as char;
        format!("{col}{}", size - self.y)
    }

    pub fn on_board(self, size: usize) -> bool {
        self.x < size && self.y < size
    }

    /// Point reflection through the board center.
    pub fn mirrored(self, size: usize) -> Self {
        Self {
            x: size - 1 - self.x,
            y: size - 1 - self.y,
        }
    }
}

impl TryFrom<String> for Point {
    type Error = CoordError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Point::from_sgf(&s)
    }
}

impl From<Point> for String {
    fn from(p: Point) -> Self {
        p.to_sgf()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sgf())
    }
}

/// A move token on the protocol boundary.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Vertex {
    Play(Point),
    Pass,
    Resign,
}

impl Vertex {
    /// Parse a protocol vertex on a board of `size`. Case-insensitive, as
    /// engines differ in what they emit.
    pub fn parse(s: &str, size: usize) -> Result<Self, CoordError> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("pass") {
            return Ok(Vertex::Pass);
        }
        if s.eq_ignore_ascii_case("resign") {
            return Ok(Vertex::Resign);
        }

        let mut chars = s.chars();
        let col_char = chars
            .next()
            .ok_or_else(|| CoordError::Vertex(s.to_string()))?
            .to_ascii_uppercase();
        let x = VERTEX_LETTERS
            .iter()
            .position(|&l| l as char == col_char)
            .ok_or_else(|| CoordError::Vertex(s.to_string()))?;

        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoordError::Vertex(s.to_string()));
        }
        let row: usize = digits
            .parse()
            .map_err(|_| CoordError::Vertex(s.to_string()))?;

        if x >= size || row == 0 || row > size {
            return Err(CoordError::OffBoard {
                vertex: s.to_string(),
                size,
            });
        }
        Ok(Vertex::Play(Point::new(x, size - row)))
    }

    /// Protocol text on a board of `size`.
    pub fn to_gtp(self, size: usize) -> String {
        match self {
            Vertex::Play(p) => p.label(size),
            Vertex::Pass => "pass".into(),
            Vertex::Resign => "resign".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_roundtrip() {
        for x in 0..MAX_SIZE {
            for y in 0..MAX_SIZE {
                let p = Point::new(x, y);
                assert_eq!(Point::from_sgf(&p.to_sgf()), Ok(p));
            }
        }
    }

    #[test]
    fn test_storage_does_not_skip_i() {
        assert_eq!(Point::from_sgf("ia"), Ok(Point::new(8, 0)));
        assert_eq!(Point::from_sgf("sa"), Ok(Point::new(18, 0)));
        assert!(Point::from_sgf("ta").is_err());
        assert!(Point::from_sgf("a").is_err());
        assert!(Point::from_sgf("abc").is_err());
    }

    #[test]
    fn test_vertex_skips_i() {
        let h = Vertex::parse("H5", 19).unwrap();
        let j = Vertex::parse("J5", 19).unwrap();
        match (h, j) {
            (Vertex::Play(h), Vertex::Play(j)) => assert_eq!(j.x - h.x, 1),
            _ => panic!("expected moves"),
        }
        assert!(Vertex::parse("I5", 19).is_err());
    }

    #[test]
    fn test_vertex_rows_depend_on_size() {
        assert_eq!(Vertex::parse("A1", 19), Ok(Vertex::Play(Point::new(0, 18))));
        assert_eq!(Vertex::parse("A1", 9), Ok(Vertex::Play(Point::new(0, 8))));
        assert_eq!(Vertex::parse("q16", 19), Ok(Vertex::Play(Point::new(15, 3))));
        assert_eq!(Vertex::Play(Point::new(15, 3)).to_gtp(19), "Q16");
    }

    #[test]
    fn test_storage_and_vertex_disagree_on_the_same_text() {
        // Storage keeps `i`, vertices skip it: storage column `q` is vertex column `R`.
        let p = Point::from_sgf("qd").unwrap();
        assert_eq!(p.label(19), "R16");
        let t = Point::from_sgf("ta");
        assert!(t.is_err());
        assert_eq!(Vertex::parse("T19", 19), Ok(Vertex::Play(Point::new(18, 0))));
    }

    #[test]
    fn test_vertex_roundtrip_all_sizes() {
        for size in 1..=MAX_SIZE {
            for x in 0..size {
                for y in 0..size {
                    let v = Vertex::Play(Point::new(x, y));
                    assert_eq!(Vertex::parse(&v.to_gtp(size), size), Ok(v));
                }
            }
        }
    }

    #[test]
    fn test_vertex_specials_and_errors() {
        assert_eq!(Vertex::parse("PASS", 19), Ok(Vertex::Pass));
        assert_eq!(Vertex::parse("resign", 9), Ok(Vertex::Resign));
        assert!(matches!(
            Vertex::parse("K10", 9),
            Err(CoordError::OffBoard { .. })
        ));
        assert!(Vertex::parse("A0", 9).is_err());
        assert!(Vertex::parse("", 9).is_err());
        assert!(Vertex::parse("A1x", 9).is_err());
    }

    #[test]
    fn test_point_serde_uses_storage_form() {
        let p = Point::new(16, 3);
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"qd\"");
        let back: Point = serde_json::from_str("\"qd\"").unwrap();
        assert_eq!(back, p);
        assert!(serde_json::from_str::<Point>("\"Q16\"").is_err());
    }

    #[test]
    fn test_mirror_is_involution() {
        let p = Point::new(2, 5);
        assert_eq!(p.mirrored(19), Point::new(16, 13));
        assert_eq!(p.mirrored(19).mirrored(19), p);
    }
}
