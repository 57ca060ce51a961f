//! Interactive verification: a human plays both sides of an answer line,
//! every move checked first by the rules engine and then by the matcher.

use tracing::{debug, warn};

use crate::board::{BoardState, IllegalMove};
use crate::coord::{Color, Point};
use crate::matcher::{AnswerMatcher, Step};
use crate::problem::{Problem, ProblemError};

/// What the player sees after a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The rules engine refused the move; nothing changed.
    Ignored(IllegalMove),
    /// Legal but not on any line. The board is back where it was.
    Incorrect,
    Continue { hints: Vec<Point> },
    Solved,
}

/// One attempt at one problem. Owns its board; [`reset`](Self::reset)
/// starts again from a fresh copy of the setup position.
pub struct PracticeSession {
    problem: Problem,
    start: BoardState,
    board: BoardState,
    matcher: AnswerMatcher,
    to_move: Color,
}

impl PracticeSession {
    pub fn new(problem: Problem) -> Result<Self, ProblemError> {
        let start = problem.initial_board()?;
        let matcher = AnswerMatcher::for_problem(&problem)?;
        Ok(Self {
            board: start.clone(),
            to_move: problem.to_move(),
            start,
            matcher,
            problem,
        })
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn board(&self) -> &BoardState {
        &self.board
    }

    pub fn to_move(&self) -> Color {
        self.to_move
    }

    pub fn hints(&self) -> Vec<Point> {
        self.matcher.expected_next()
    }

    pub fn play(&mut self, p: Point) -> Outcome {
        let snapshot = self.board.clone();
        if let Err(e) = self.board.place_stone(p, self.to_move) {
            debug!(point = %p, "move ignored: {e}");
            return Outcome::Ignored(e);
        }
        match self.matcher.submit(p) {
            Step::Rejected => {
                self.board = snapshot;
                Outcome::Incorrect
            }
            Step::Continue { hints } => {
                self.to_move = self.to_move.opponent();
                Outcome::Continue { hints }
            }
            Step::Solved => {
                self.to_move = self.to_move.opponent();
                Outcome::Solved
            }
        }
    }

    pub fn reset(&mut self) {
        self.board = self.start.clone();
        self.matcher.reset();
        self.to_move = self.problem.to_move();
    }
}

/// Pick a problem by id, or at random when no id is given.
pub fn choose(problems: &[Problem], public_id: Option<u64>) -> Option<&Problem> {
    match public_id {
        Some(id) => problems.iter().find(|p| p.public_id == id),
        None if problems.is_empty() => None,
        None => problems.get(fastrand::usize(..problems.len())),
    }
}

/// A session on the next problem after `public_id` in collection order.
/// Problems that cannot be practised are logged and passed over; `None`
/// once the collection is exhausted.
pub fn next_session(problems: &[Problem], public_id: u64) -> Option<PracticeSession> {
    let current = problems.iter().position(|p| p.public_id == public_id)?;
    problems[current + 1..]
        .iter()
        .find_map(|p| match PracticeSession::new(p.clone()) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(publicid = p.public_id, "skipping problem: {e}");
                None
            }
        })
}
