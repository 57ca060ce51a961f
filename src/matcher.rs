//! Matching a move sequence against the eligible answer lines.
//!
//! The lines form an implicit tree: every line sharing the moves played so
//! far is still alive, and the union of their next moves is what the player
//! may play now. No move is preferred over another.

use crate::coord::Point;
use crate::problem::{Problem, ProblemError};

/// Result of submitting one move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Not an expected move. History is unchanged; any board mutation the
    /// caller made for this move must be rolled back.
    Rejected,
    /// Accepted; the sequence continues with any of `hints`.
    Continue { hints: Vec<Point> },
    /// Accepted, and the history now equals a complete line.
    Solved,
}

#[derive(Debug, Clone)]
pub struct AnswerMatcher {
    lines: Vec<Vec<Point>>,
    history: Vec<Point>,
}

impl AnswerMatcher {
    pub fn new(lines: Vec<Vec<Point>>) -> Self {
        Self {
            lines,
            history: Vec::new(),
        }
    }

    /// A matcher over the problem's eligible lines.
    pub fn for_problem(problem: &Problem) -> Result<Self, ProblemError> {
        let lines = problem
            .eligible_lines()?
            .into_iter()
            .map(|l| l.moves.clone())
            .collect();
        Ok(Self::new(lines))
    }

    pub fn history(&self) -> &[Point] {
        &self.history
    }

    pub fn lines(&self) -> &[Vec<Point>] {
        &self.lines
    }

    /// Union of the `k`-th moves (1-based) of the lines whose first `k - 1`
    /// moves equal the history's first `k - 1` moves.
    pub fn expected_at(&self, k: usize) -> Vec<Point> {
        if k == 0 || k - 1 > self.history.len() {
            return Vec::new();
        }
        let prefix = &self.history[..k - 1];
        let mut out: Vec<Point> = Vec::new();
        for line in &self.lines {
            if line.len() >= k && line[..k - 1] == *prefix {
                let mv = line[k - 1];
                if !out.contains(&mv) {
                    out.push(mv);
                }
            }
        }
        out
    }

    /// Moves accepted next.
    pub fn expected_next(&self) -> Vec<Point> {
        self.expected_at(self.history.len() + 1)
    }

    /// Whether `p` opens any line.
    pub fn is_first_move(&self, p: Point) -> bool {
        self.lines.iter().any(|l| l.first() == Some(&p))
    }

    pub fn submit(&mut self, p: Point) -> Step {
        if !self.expected_next().contains(&p) {
            return Step::Rejected;
        }
        self.history.push(p);
        if self.lines.iter().any(|l| *l == self.history) {
            return Step::Solved;
        }
        Step::Continue {
            hints: self.expected_next(),
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(codes: &[&str]) -> Vec<Point> {
        codes.iter().map(|c| Point::from_sgf(c).unwrap()).collect()
    }

    fn p(code: &str) -> Point {
        Point::from_sgf(code).unwrap()
    }

    fn tree() -> AnswerMatcher {
        AnswerMatcher::new(vec![
            pts(&["aa", "bb", "cc"]),
            pts(&["aa", "bb", "dd"]),
            pts(&["aa", "ee"]),
            pts(&["ff"]),
        ])
    }

    #[test]
    fn test_first_moves_are_union() {
        let m = tree();
        let mut first = m.expected_next();
        first.sort();
        assert_eq!(first, pts(&["aa", "ff"]));
        assert!(m.is_first_move(p("ff")));
        assert!(!m.is_first_move(p("bb")));
    }

    #[test]
    fn test_branching_hints() {
        let mut m = tree();
        let step = m.submit(p("aa"));
        let Step::Continue { mut hints } = step else {
            panic!("expected continue, got {step:?}");
        };
        hints.sort();
        assert_eq!(hints, pts(&["bb", "ee"]));

        assert_eq!(
            m.submit(p("bb")),
            Step::Continue {
                hints: pts(&["cc", "dd"])
            }
        );
        assert_eq!(m.submit(p("dd")), Step::Solved);
    }

    #[test]
    fn test_reject_keeps_history() {
        let mut m = tree();
        m.submit(p("aa"));
        assert_eq!(m.submit(p("cc")), Step::Rejected);
        assert_eq!(m.history(), pts(&["aa"]).as_slice());
        assert_eq!(m.submit(p("ee")), Step::Solved);
    }

    #[test]
    fn test_single_move_line_solves_immediately() {
        let mut m = tree();
        assert_eq!(m.submit(p("ff")), Step::Solved);
    }

    #[test]
    fn test_expected_at_earlier_depth() {
        let mut m = tree();
        m.submit(p("aa"));
        m.submit(p("bb"));
        let mut second = m.expected_at(2);
        second.sort();
        assert_eq!(second, pts(&["bb", "ee"]));
        assert!(m.expected_at(5).is_empty());
        assert!(m.expected_at(0).is_empty());
    }

    #[test]
    fn test_reset() {
        let mut m = tree();
        m.submit(p("aa"));
        m.reset();
        assert!(m.history().is_empty());
        assert_eq!(m.submit(p("ff")), Step::Solved);
    }
}
