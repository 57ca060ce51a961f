//! Turning a stored problem into a position an engine can be asked about.
//!
//! A bare life-and-death shape in a corner is not a whole-board game: an
//! engine would happily play elsewhere. Two reductions fix that:
//!
//! - [`reduce`] shrinks the board to just fit the problem, anchored in the
//!   nearest corner.
//! - [`pad`] keeps the board and fills everything away from the problem with
//!   a black checkerboard, so the only open area is the problem itself.
//!   Komi is the count of board cells outside the problem's zone.
//!
//! [`pad_symmetric`] additionally mirrors the problem through the board
//! center. The second copy acts as a supply of threats, which keeps an
//! automated opponent from settling the position through an endlessly
//! repeated capture. This is a heuristic, not a ko rule.

use std::fmt::Write as _;

use crate::constants::{DEFAULT_KOMI, EDGE_ADJACENCY, MAX_EDGES_FOR_MIRROR};
use crate::coord::{Color, Point};
use crate::problem::{Placement, Problem, ProblemError};

/// The corner a reduced problem is anchored to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    /// Tie-break order for equally close corners.
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    pub fn point(self, size: usize) -> Point {
        let far = size - 1;
        match self {
            Corner::TopLeft => Point::new(0, 0),
            Corner::TopRight => Point::new(far, 0),
            Corner::BottomLeft => Point::new(0, far),
            Corner::BottomRight => Point::new(far, far),
        }
    }

    /// Mirror `p` on an `size`-board so this corner lands on the origin.
    /// Applying it twice gives `p` back.
    pub fn remap(self, p: Point, size: usize) -> Point {
        let far = size - 1;
        match self {
            Corner::TopLeft => p,
            Corner::TopRight => Point::new(far - p.x, p.y),
            Corner::BottomLeft => Point::new(p.x, far - p.y),
            Corner::BottomRight => Point::new(far - p.x, far - p.y),
        }
    }

    fn distance(self, p: Point, size: usize) -> usize {
        let c = self.point(size);
        p.x.abs_diff(c.x).max(p.y.abs_diff(c.y))
    }
}

/// Inclusive bounding box.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Rect {
    pub min_x: usize,
    pub max_x: usize,
    pub min_y: usize,
    pub max_y: usize,
}

impl Rect {
    pub fn of(points: impl IntoIterator<Item = Point>) -> Option<Self> {
        let mut it = points.into_iter();
        let first = it.next()?;
        let mut r = Rect {
            min_x: first.x,
            max_x: first.x,
            min_y: first.y,
            max_y: first.y,
        };
        for p in it {
            r.min_x = r.min_x.min(p.x);
            r.max_x = r.max_x.max(p.x);
            r.min_y = r.min_y.min(p.y);
            r.max_y = r.max_y.max(p.y);
        }
        Some(r)
    }

    pub fn contains(&self, p: Point) -> bool {
        (self.min_x..=self.max_x).contains(&p.x) && (self.min_y..=self.max_y).contains(&p.y)
    }

    fn mirrored(&self, size: usize) -> Self {
        let far = size - 1;
        Rect {
            min_x: far - self.max_x,
            max_x: far - self.min_x,
            min_y: far - self.max_y,
            max_y: far - self.min_y,
        }
    }
}

/// Which board edges a bounding box is close to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Edges {
    pub left: bool,
    pub right: bool,
    pub top: bool,
    pub bottom: bool,
}

impl Edges {
    /// A box reaching past the board counts as touching that edge.
    pub fn of(bbox: &Rect, size: usize) -> Self {
        let far = size.saturating_sub(1);
        Edges {
            left: bbox.min_x < EDGE_ADJACENCY,
            right: far.saturating_sub(bbox.max_x) < EDGE_ADJACENCY,
            top: bbox.min_y < EDGE_ADJACENCY,
            bottom: far.saturating_sub(bbox.max_y) < EDGE_ADJACENCY,
        }
    }

    pub fn count(&self) -> usize {
        [self.left, self.right, self.top, self.bottom]
            .into_iter()
            .filter(|&e| e)
            .count()
    }
}

/// The no-padding zone: the bounding box grown by one on open sides and
/// pushed to the edge on adjacent sides.
fn exclusion(bbox: &Rect, edges: Edges, size: usize) -> Rect {
    let far = size - 1;
    Rect {
        min_x: if edges.left { 0 } else { bbox.min_x.saturating_sub(1) },
        max_x: if edges.right { far } else { (bbox.max_x + 1).min(far) },
        min_y: if edges.top { 0 } else { bbox.min_y.saturating_sub(1) },
        max_y: if edges.bottom { far } else { (bbox.max_y + 1).min(far) },
    }
}

/// Cells outside the komi zone: the bounding box shrunk by one on open
/// sides and pushed to the edge on adjacent ones. The outermost ring of
/// surrounding stones counts toward komi.
fn komi_for(bbox: &Rect, edges: Edges, size: usize) -> f32 {
    let far = size as isize - 1;
    let lo_x = if edges.left { 0 } else { bbox.min_x as isize + 1 };
    let hi_x = if edges.right { far } else { bbox.max_x as isize - 1 };
    let lo_y = if edges.top { 0 } else { bbox.min_y as isize + 1 };
    let hi_y = if edges.bottom { far } else { bbox.max_y as isize - 1 };
    let width = (hi_x - lo_x + 1).max(0) as usize;
    let height = (hi_y - lo_y + 1).max(0) as usize;
    (size * size - width * height) as f32
}

/// Fill every free, non-excluded cell of a fixed checkerboard with black.
/// Even columns take rows `N-1, N-3, ...`, odd columns `N-2, N-4, ...`.
fn fill_checkerboard(placement: &mut Placement, size: usize, excluded: impl Fn(Point) -> bool) {
    let mut occupied = vec![false; size * size];
    for (_, p) in placement.stones() {
        occupied[p.y * size + p.x] = true;
    }
    for x in 0..size {
        let Some(start) = (size - 1).checked_sub(x % 2) else {
            continue;
        };
        for y in (0..=start).rev().step_by(2) {
            let p = Point::new(x, y);
            if !occupied[y * size + x] && !excluded(p) {
                placement.black.push(p);
                occupied[y * size + x] = true;
            }
        }
    }
}

/// A problem prepared for one solve attempt. Discarded after the verdict.
#[derive(Clone, Debug, PartialEq)]
pub struct TransformedProblem {
    pub public_id: u64,
    pub size: usize,
    pub to_move: Color,
    pub placement: Placement,
    /// Eligible answer lines in this board's coordinates.
    pub answers: Vec<Vec<Point>>,
    /// Anchor corner when the board was reduced.
    pub corner: Option<Corner>,
    pub komi: f32,
    /// A point-reflected copy of the problem was added.
    pub mirrored: bool,
}

impl TransformedProblem {
    pub fn opens_a_line(&self, p: Point) -> bool {
        self.answers.iter().any(|l| l.first() == Some(&p))
    }

    /// SGF text of the position, optionally with the answer lines as
    /// variations.
    pub fn to_sgf(&self, with_answers: bool) -> String {
        let mut sgf = format!(
            "(;FF[4]GM[1]SZ[{}]KM[{}]C[publicid: {}]PL[{}]\n",
            self.size,
            self.komi,
            self.public_id,
            self.to_move.gtp()
        );
        for (tag, stones) in [("AB", &self.placement.black), ("AW", &self.placement.white)] {
            if !stones.is_empty() {
                sgf.push_str(tag);
                for p in stones {
                    let _ = write!(sgf, "[{p}]");
                }
                sgf.push('\n');
            }
        }
        if with_answers {
            for line in &self.answers {
                sgf.push('(');
                let mut color = self.to_move;
                for p in line {
                    let _ = write!(sgf, ";{}[{p}]", color.gtp());
                    color = color.opponent();
                }
                sgf.push_str(")\n");
            }
        }
        sgf.push_str(")\n");
        sgf
    }
}

fn eligible_moves(problem: &Problem) -> Result<Vec<Vec<Point>>, ProblemError> {
    Ok(problem
        .eligible_lines()?
        .into_iter()
        .map(|l| l.moves.clone())
        .collect())
}

fn stone_box(problem: &Problem) -> Result<Rect, ProblemError> {
    Rect::of(problem.placement.stones().map(|(_, p)| p)).ok_or(ProblemError::NoStones {
        public_id: problem.public_id,
    })
}

/// Anchor corner and board size of the smallest board holding the problem.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MinimalBoard {
    pub corner: Corner,
    pub size: usize,
}

/// Pick the corner whose farthest used point (stones and eligible answer
/// moves) is nearest, by Chebyshev distance. The reduced size is that
/// distance plus two, rounded up to odd and capped at the original size.
pub fn minimal_board(problem: &Problem) -> Result<MinimalBoard, ProblemError> {
    problem.validate()?;
    let mut used: Vec<Point> = problem.placement.stones().map(|(_, p)| p).collect();
    for line in problem.eligible_lines()? {
        used.extend(line.moves.iter().copied());
    }
    if used.is_empty() {
        return Err(ProblemError::NoStones {
            public_id: problem.public_id,
        });
    }

    let reach = |corner: Corner| {
        used.iter()
            .map(|&p| corner.distance(p, problem.size))
            .max()
            .unwrap_or(0)
    };
    let mut corner = Corner::TopLeft;
    let mut best = reach(corner);
    for c in Corner::ALL.into_iter().skip(1) {
        let d = reach(c);
        if d < best {
            corner = c;
            best = d;
        }
    }

    let mut size = best + 2;
    if size % 2 == 0 {
        size += 1;
    }
    Ok(MinimalBoard {
        corner,
        size: size.min(problem.size),
    })
}

/// Mirror the whole problem (stones and every answer line) so `corner`
/// becomes the origin. Applying the same corner again restores the input.
pub fn remap(problem: &Problem, corner: Corner) -> Problem {
    let size = problem.size;
    let f = |p: Point| corner.remap(p, size);
    let mut out = problem.clone();
    out.placement = problem.placement.map_points(f);
    for line in &mut out.answers {
        for p in &mut line.moves {
            *p = f(*p);
        }
    }
    out
}

/// Shrink the board to the problem, anchored at its nearest corner.
pub fn reduce(problem: &Problem) -> Result<TransformedProblem, ProblemError> {
    let minimal = minimal_board(problem)?;
    let moved = remap(problem, minimal.corner);
    Ok(TransformedProblem {
        public_id: problem.public_id,
        size: minimal.size,
        to_move: problem.to_move(),
        placement: moved.placement.clone(),
        answers: eligible_moves(&moved)?,
        corner: Some(minimal.corner),
        komi: DEFAULT_KOMI,
        mirrored: false,
    })
}

/// Keep the board and pad everything outside the problem's zone.
pub fn pad(problem: &Problem) -> Result<TransformedProblem, ProblemError> {
    problem.validate()?;
    let size = problem.size;
    let bbox = stone_box(problem)?;
    let edges = Edges::of(&bbox, size);
    let excluded = exclusion(&bbox, edges, size);

    let mut placement = problem.placement.clone();
    fill_checkerboard(&mut placement, size, |p| excluded.contains(p));

    Ok(TransformedProblem {
        public_id: problem.public_id,
        size,
        to_move: problem.to_move(),
        placement,
        answers: eligible_moves(problem)?,
        corner: None,
        komi: komi_for(&bbox, edges, size),
        mirrored: false,
    })
}

/// [`pad`], plus a point-reflected copy of the problem when it touches at
/// most two edges. Komi stays that of the plain padding.
pub fn pad_symmetric(problem: &Problem) -> Result<TransformedProblem, ProblemError> {
    problem.validate()?;
    let size = problem.size;
    let bbox = stone_box(problem)?;
    let edges = Edges::of(&bbox, size);
    let original = exclusion(&bbox, edges, size);

    let mut placement = problem.placement.clone();
    let mut reflected_zone = None;
    if edges.count() <= MAX_EDGES_FOR_MIRROR {
        for (color, p) in problem.placement.stones() {
            let q = p.mirrored(size);
            if !placement.contains(q) {
                placement.push(color, q);
            }
        }
        let rbox = bbox.mirrored(size);
        reflected_zone = Some(exclusion(&rbox, Edges::of(&rbox, size), size));
    }

    fill_checkerboard(&mut placement, size, |p| {
        original.contains(p) || reflected_zone.is_some_and(|z| z.contains(p))
    });

    Ok(TransformedProblem {
        public_id: problem.public_id,
        size,
        to_move: problem.to_move(),
        placement,
        answers: eligible_moves(problem)?,
        corner: None,
        komi: komi_for(&bbox, edges, size),
        mirrored: reflected_zone.is_some(),
    })
}
