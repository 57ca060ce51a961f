//! The rules engine: an N×N grid with stone placement, capture, and suicide
//! rejection.
//!
//! There is deliberately no ko or superko rule. Problems are verified
//! against curated answer lines, and the only illegal moves are occupied
//! points and suicide.

use std::fmt;

use thiserror::Error;

use crate::coord::{Color, Point};

/// Why a move was refused. The board is unchanged after any of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IllegalMove {
    #[error("illegal move: point outside the board")]
    OffBoard,
    #[error("illegal move: point not empty")]
    Occupied,
    #[error("illegal move: suicide")]
    Suicide,
}

/// A stone on the board. Preset stones carry move number 0.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Stone {
    pub color: Color,
    pub move_number: u32,
}

/// Outcome of an accepted move.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Placed {
    /// Opponent stones removed by the move.
    pub captured: Vec<Point>,
}

/// Board contents for one attempt. Cloning is the snapshot mechanism: a new
/// attempt starts from a fresh board, and a rejected answer restores a clone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoardState {
    size: usize,
    cells: Vec<Option<Stone>>,
    moves: u32,
    captures: [usize; 2],
}

impl BoardState {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![None; size * size],
            moves: 0,
            captures: [0, 0],
        }
    }

    /// A board holding the given preset stones. Presets are placed verbatim,
    /// without capture resolution.
    pub fn setup<I>(size: usize, stones: I) -> Result<Self, IllegalMove>
    where
        I: IntoIterator<Item = (Color, Point)>,
    {
        let mut board = Self::new(size);
        for (color, p) in stones {
            if !p.on_board(size) {
                return Err(IllegalMove::OffBoard);
            }
            let idx = board.idx(p);
            if board.cells[idx].is_some() {
                return Err(IllegalMove::Occupied);
            }
            board.cells[idx] = Some(Stone {
                color,
                move_number: 0,
            });
        }
        Ok(board)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn idx(&self, p: Point) -> usize {
        p.y * self.size + p.x
    }

    pub fn get(&self, p: Point) -> Option<Stone> {
        if !p.on_board(self.size) {
            return None;
        }
        self.cells[self.idx(p)]
    }

    pub fn color_at(&self, p: Point) -> Option<Color> {
        self.get(p).map(|s| s.color)
    }

    /// Number of moves accepted by [`place_stone`](Self::place_stone).
    pub fn moves_played(&self) -> u32 {
        self.moves
    }

    /// Stones captured so far *by* `color`.
    pub fn captures(&self, color: Color) -> usize {
        self.captures[color as usize]
    }

    pub fn count(&self, color: Color) -> usize {
        self.cells
            .iter()
            .filter(|c| c.map(|s| s.color) == Some(color))
            .count()
    }

    pub fn is_empty_at(&self, p: Point) -> bool {
        p.on_board(self.size) && self.cells[self.idx(p)].is_none()
    }

    /// All empty points, row by row.
    pub fn empty_points(&self) -> impl Iterator<Item = Point> + '_ {
        let size = self.size;
        (0..size * size)
            .filter(|&i| self.cells[i].is_none())
            .map(move |i| Point::new(i % size, i / size))
    }

    pub fn neighbors(&self, p: Point) -> impl Iterator<Item = Point> + use<> {
        let s = self.size;
        let mut v = Vec::with_capacity(4);
        if p.x > 0 {
            v.push(Point::new(p.x - 1, p.y));
        }
        if p.x + 1 < s {
            v.push(Point::new(p.x + 1, p.y));
        }
        if p.y > 0 {
            v.push(Point::new(p.x, p.y - 1));
        }
        if p.y + 1 < s {
            v.push(Point::new(p.x, p.y + 1));
        }
        v.into_iter()
    }

    /// Play `color` at `p`, resolving captures. Neighboring opponent groups
    /// left without liberties are removed first; if the mover's own group
    /// then has none, the move is suicide and is undone.
    pub fn place_stone(&mut self, p: Point, color: Color) -> Result<Placed, IllegalMove> {
        if !p.on_board(self.size) {
            return Err(IllegalMove::OffBoard);
        }
        let idx = self.idx(p);
        if self.cells[idx].is_some() {
            return Err(IllegalMove::Occupied);
        }
        self.cells[idx] = Some(Stone {
            color,
            move_number: self.moves + 1,
        });

        let opp = color.opponent();
        let mut captured = Vec::new();
        for n in self.neighbors(p) {
            // A group already removed through another neighbor reads as empty here.
            if self.color_at(n) == Some(opp) && self.liberties(n) == 0 {
                let group = self.group(n);
                for &g in &group {
                    let gi = self.idx(g);
                    self.cells[gi] = None;
                }
                captured.extend(group);
            }
        }

        if self.liberties(p) == 0 {
            // Captures imply a liberty, so nothing needs restoring.
            debug_assert!(captured.is_empty());
            self.cells[idx] = None;
            return Err(IllegalMove::Suicide);
        }

        self.moves += 1;
        self.captures[color as usize] += captured.len();
        Ok(Placed { captured })
    }

    /// The maximal 4-connected same-colored group containing `p`. Empty for
    /// an empty point.
    pub fn group(&self, p: Point) -> Vec<Point> {
        let Some(color) = self.color_at(p) else {
            return Vec::new();
        };
        let mut stack = vec![p];
        let mut visited = vec![false; self.size * self.size];
        let mut out = Vec::new();
        while let Some(c) = stack.pop() {
            let i = self.idx(c);
            if visited[i] {
                continue;
            }
            visited[i] = true;
            out.push(c);
            for n in self.neighbors(c) {
                if !visited[self.idx(n)] && self.color_at(n) == Some(color) {
                    stack.push(n);
                }
            }
        }
        out
    }

    /// Distinct empty points adjacent to the group containing `p`.
    pub fn liberties(&self, p: Point) -> usize {
        let mut seen = vec![false; self.size * self.size];
        let mut libs = 0;
        for g in self.group(p) {
            for n in self.neighbors(g) {
                let ni = self.idx(n);
                if self.cells[ni].is_none() && !seen[ni] {
                    seen[ni] = true;
                    libs += 1;
                }
            }
        }
        libs
    }
}

impl fmt::Display for BoardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in 0..self.size {
            write!(f, "{:>2} ", self.size - y)?;
            for x in 0..self.size {
                let ch = match self.color_at(Point::new(x, y)) {
                    Some(Color::Black) => 'X',
                    Some(Color::White) => 'O',
                    None => '.',
                };
                write!(f, "{ch} ")?;
            }
            writeln!(f)?;
        }
        write!(f, "   ")?;
        for x in 0..self.size {
            let label = Point::new(x, 0).label(self.size);
            write!(f, "{} ", &label[..1])?;
        }
        writeln!(f)
    }
}
