//! Dihedral-group normalization of stone placements.
//!
//! A placement and its 7 rotations/reflections describe the same problem.
//! The canonical form is the lexicographically smallest of the 8 sorted
//! `(color, x, y)` lists, with coordinates 1-indexed so every transform is
//! an affine map pivoting on `N + 1`.
//!
//! Canonical forms serve two consumers:
//! - duplicate detection, where equal forms mean the same problem, and
//! - partial-pattern search, where each problem stores `color-x-y` keys of
//!   its canonical form and a query asks for problems holding all its keys.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::coord::{Color, Point};
use crate::problem::{Placement, Problem};

/// A 1-indexed stone.
pub type Stone = (Color, usize, usize);

/// An affine map on 1-indexed coordinates of an `n`-board.
pub type Transform = fn(n: usize, x: usize, y: usize) -> (usize, usize);

fn identity(_n: usize, x: usize, y: usize) -> (usize, usize) {
    (x, y)
}

fn rotate90(n: usize, x: usize, y: usize) -> (usize, usize) {
    (n + 1 - y, x)
}

fn rotate180(n: usize, x: usize, y: usize) -> (usize, usize) {
    (n + 1 - x, n + 1 - y)
}

fn rotate270(n: usize, x: usize, y: usize) -> (usize, usize) {
    (y, n + 1 - x)
}

fn reflect_x(n: usize, x: usize, y: usize) -> (usize, usize) {
    (x, n + 1 - y)
}

fn reflect_y(n: usize, x: usize, y: usize) -> (usize, usize) {
    (n + 1 - x, y)
}

fn reflect_main_diagonal(_n: usize, x: usize, y: usize) -> (usize, usize) {
    (y, x)
}

fn reflect_anti_diagonal(n: usize, x: usize, y: usize) -> (usize, usize) {
    (n + 1 - y, n + 1 - x)
}

/// The eight symmetries of the square.
pub const TRANSFORMS: [Transform; 8] = [
    identity,
    rotate90,
    rotate180,
    rotate270,
    reflect_x,
    reflect_y,
    reflect_main_diagonal,
    reflect_anti_diagonal,
];

/// Sorted 1-indexed stones of the minimal transform. Hashable; equal forms
/// mean equal placements up to symmetry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalForm(Vec<Stone>);

impl CanonicalForm {
    pub fn stones(&self) -> &[Stone] {
        &self.0
    }

    /// Back to a 0-indexed placement, in canonical orientation.
    pub fn to_placement(&self) -> Placement {
        let mut placement = Placement::default();
        for &(color, x, y) in &self.0 {
            placement.push(color, Point::new(x - 1, y - 1));
        }
        placement
    }

    /// Search-index keys, one `color-x-y` string per stone.
    pub fn keys(&self) -> Vec<String> {
        stone_keys(&self.0)
    }
}

fn one_indexed(placement: &Placement) -> Vec<Stone> {
    placement
        .stones()
        .map(|(c, p)| (c, p.x + 1, p.y + 1))
        .collect()
}

fn stone_keys(stones: &[Stone]) -> Vec<String> {
    stones
        .iter()
        .map(|&(c, x, y)| format!("{}-{x}-{y}", c.key()))
        .collect()
}

/// Apply one transform to a 0-indexed placement.
pub fn transform_placement(placement: &Placement, size: usize, t: Transform) -> Placement {
    placement.map_points(|p| {
        let (x, y) = t(size, p.x + 1, p.y + 1);
        Point::new(x - 1, y - 1)
    })
}

/// The canonical form of a placement on an `size`-board.
pub fn canonicalize(placement: &Placement, size: usize) -> CanonicalForm {
    let stones = one_indexed(placement);
    let best = TRANSFORMS
        .iter()
        .map(|t| {
            let mut moved: Vec<Stone> = stones
                .iter()
                .map(|&(c, x, y)| {
                    let (tx, ty) = t(size, x, y);
                    (c, tx, ty)
                })
                .collect();
            moved.sort();
            moved
        })
        .min()
        .unwrap_or_default();
    CanonicalForm(best)
}

/// Whether a problem's stones can be transformed at all. Bad documents are
/// logged and left out.
fn indexable(problem: &Problem) -> bool {
    match problem.validate() {
        Ok(()) => !problem.placement.is_empty(),
        Err(e) => {
            warn!(publicid = problem.public_id, "skipping problem: {e}");
            false
        }
    }
}

/// Groups of problems identical up to symmetry, each listing public ids in
/// input order. Only groups with more than one member are returned.
pub fn duplicate_groups(problems: &[Problem]) -> Vec<Vec<u64>> {
    let mut order: Vec<(usize, CanonicalForm)> = Vec::new();
    let mut groups: HashMap<(usize, CanonicalForm), Vec<u64>> = HashMap::new();
    for problem in problems.iter().filter(|p| indexable(p)) {
        let key = (problem.size, canonicalize(&problem.placement, problem.size));
        let entry = groups.entry(key.clone()).or_default();
        if entry.is_empty() {
            order.push(key);
        }
        entry.push(problem.public_id);
    }
    order
        .into_iter()
        .filter_map(|k| groups.remove(&k))
        .filter(|ids| ids.len() > 1)
        .collect()
}

/// One problem found by a pattern query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchHit {
    pub public_id: u64,
    /// Matched only after exchanging the query's colors.
    pub colors_swapped: bool,
}

#[derive(Debug)]
struct IndexEntry {
    public_id: u64,
    size: usize,
    keys: HashSet<String>,
}

/// Canonical keys of every problem, queried with "all keys present".
#[derive(Debug, Default)]
pub struct CanonicalIndex {
    entries: Vec<IndexEntry>,
}

impl CanonicalIndex {
    pub fn build(problems: &[Problem]) -> Self {
        let entries = problems
            .iter()
            .filter(|p| indexable(p))
            .map(|p| IndexEntry {
                public_id: p.public_id,
                size: p.size,
                keys: canonicalize(&p.placement, p.size).keys().into_iter().collect(),
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of problems holding every key, on any board size.
    pub fn containing_all(&self, keys: &[String]) -> Vec<u64> {
        self.matching(keys, None)
    }

    fn matching(&self, keys: &[String], size: Option<usize>) -> Vec<u64> {
        self.entries
            .iter()
            .filter(|e| size.is_none_or(|s| s == e.size))
            .filter(|e| keys.iter().all(|k| e.keys.contains(k)))
            .map(|e| e.public_id)
            .collect()
    }

    /// Look up a partial placement given in canonical orientation on a
    /// `size`-board: once as entered, once with colors swapped.
    pub fn search(&self, query: &Placement, size: usize) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .matching(&query_keys(query), Some(size))
            .into_iter()
            .map(|public_id| SearchHit {
                public_id,
                colors_swapped: false,
            })
            .collect();
        for public_id in self.matching(&query_keys(&query.swapped()), Some(size)) {
            if !hits.iter().any(|h| h.public_id == public_id) {
                hits.push(SearchHit {
                    public_id,
                    colors_swapped: true,
                });
            }
        }
        hits
    }
}

/// Index keys for a query placement, as entered.
pub fn query_keys(placement: &Placement) -> Vec<String> {
    stone_keys(&one_indexed(placement))
}
