//! Tsumego: verification engine for Go life-and-death problems.
//!
//! A problem is a starting placement, the side to move, and recorded
//! answer lines. This crate checks moves against those lines, normalizes
//! placements for duplicate detection and pattern search, and drives an
//! external GTP engine to find out whether it solves each problem.
//!
//! ## Modules
//!
//! - [`constants`] - Protocol markers, thresholds and defaults
//! - [`coord`] - Colors, points, storage and vertex coordinates
//! - [`board`] - Rules engine (placement, capture, suicide)
//! - [`problem`] - Problem documents and answer-line eligibility
//! - [`matcher`] - Answer-tree matching of a move sequence
//! - [`practice`] - Interactive verification on top of board and matcher
//! - [`symmetry`] - Canonical forms, duplicate groups, pattern index
//! - [`transform`] - Reduced and padded boards for engine analysis
//! - [`session`] - GTP client over a subprocess
//! - [`pressure`] - Temperature-driven cancellation and cooldown
//! - [`solver`] - Solve attempts and the retry ladder
//! - [`store`] - Problem and verdict storage
//! - [`batch`] - Solving a collection with backpressure
//! - [`config`] - Engine launch settings and version labels
//! - [`gtp`] - A reference GTP engine for tests and smoke runs
//!
//! ## Example
//!
//! ```
//! use tsumego::board::BoardState;
//! use tsumego::coord::{Color, Point};
//!
//! let mut board = BoardState::new(9);
//! board.place_stone(Point::new(1, 0), Color::White).unwrap();
//! board.place_stone(Point::new(0, 0), Color::Black).unwrap();
//! board.place_stone(Point::new(2, 0), Color::Black).unwrap();
//!
//! // Filling the last liberty captures the white stone.
//! let placed = board.place_stone(Point::new(1, 1), Color::Black).unwrap();
//! assert_eq!(placed.captured, vec![Point::new(1, 0)]);
//! assert_eq!(board.captures(Color::Black), 1);
//! ```

pub mod batch;
pub mod board;
pub mod config;
pub mod constants;
pub mod coord;
pub mod gtp;
pub mod matcher;
pub mod practice;
pub mod pressure;
pub mod problem;
pub mod session;
pub mod solver;
pub mod store;
pub mod symmetry;
pub mod transform;
