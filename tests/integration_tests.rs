//! Integration tests for tsumego
//!
//! The property sections draw placements from seeded `fastrand` generators
//! so failures reproduce. The engine sections drive the built binary's
//! reference engine (`tsumego engine`) as a real GTP subprocess.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tsumego::batch::BatchDriver;
use tsumego::board::BoardState;
use tsumego::config::EngineConfig;
use tsumego::coord::{Color, Point};
use tsumego::matcher::{AnswerMatcher, Step};
use tsumego::problem::{AnswerLine, Placement, Problem};
use tsumego::session::{EngineError, EngineSession};
use tsumego::solver::{BoundaryClassifier, Layout, Solver, Strategy};
use tsumego::store::{JsonStore, ProblemFilter, ProblemStore};
use tsumego::symmetry::{TRANSFORMS, canonicalize, transform_placement};
use tsumego::transform::{Corner, remap};

// =============================================================================
// Helpers
// =============================================================================

fn pts(codes: &[&str]) -> Vec<Point> {
    codes.iter().map(|c| Point::from_sgf(c).unwrap()).collect()
}

/// Up to `max` distinct stones of random colors on a `size`-board.
fn random_placement(rng: &mut fastrand::Rng, size: usize, max: usize) -> Placement {
    let mut placement = Placement::default();
    for _ in 0..rng.usize(1..=max) {
        let p = Point::new(rng.usize(0..size), rng.usize(0..size));
        if placement.contains(p) {
            continue;
        }
        let color = if rng.bool() { Color::Black } else { Color::White };
        placement.push(color, p);
    }
    placement
}

/// Top-left corner: white eye shape inside a black wall, answer `aa`.
fn corner_problem(public_id: u64) -> Problem {
    Problem {
        public_id,
        size: 19,
        black_first: true,
        placement: Placement {
            black: pts(&["ac", "bc", "cc", "cb", "ca"]),
            white: pts(&["ab", "bb", "ba"]),
        },
        answers: vec![AnswerLine::primary(pts(&["aa"]))],
        level: "8K".into(),
        qtype: String::new(),
    }
}

fn reference_engine() -> EngineConfig {
    let mut config = EngineConfig::new(
        env!("CARGO_BIN_EXE_tsumego"),
        vec!["engine".to_string(), "--chatty".to_string()],
    );
    config.startup_timeout = Duration::from_secs(30);
    config.response_timeout = Some(Duration::from_secs(30));
    config.analysis_interval = 5;
    config
}

// =============================================================================
// Symmetry
// =============================================================================

#[test]
fn test_canonical_form_is_invariant_under_all_symmetries() {
    let mut rng = fastrand::Rng::with_seed(7);
    for _ in 0..200 {
        let size = [9, 13, 19][rng.usize(0..3)];
        let placement = random_placement(&mut rng, size, 12);
        let form = canonicalize(&placement, size);
        for t in TRANSFORMS {
            let moved = transform_placement(&placement, size, t);
            assert_eq!(canonicalize(&moved, size), form);
        }
    }
}

#[test]
fn test_canonicalize_is_idempotent() {
    let mut rng = fastrand::Rng::with_seed(11);
    for _ in 0..200 {
        let placement = random_placement(&mut rng, 19, 10);
        let form = canonicalize(&placement, 19);
        assert_eq!(canonicalize(&form.to_placement(), 19), form);
    }
}

#[test]
fn test_opposite_corners_rotated_are_equal() {
    // Black at 1-1 and white at 19-19, against the same pair turned 180°.
    let a = Placement {
        black: pts(&["aa"]),
        white: pts(&["ss"]),
    };
    let b = Placement {
        black: pts(&["ss"]),
        white: pts(&["aa"]),
    };
    assert_eq!(canonicalize(&a, 19), canonicalize(&b, 19));
    // Exchanging colors is a different problem.
    let c = Placement {
        black: pts(&["aa", "ba"]),
        white: pts(&["ss"]),
    };
    assert_ne!(canonicalize(&c, 19), canonicalize(&c.swapped(), 19));
}

// =============================================================================
// Rules engine
// =============================================================================

#[test]
fn test_capture_last_liberty() {
    // White at pc with black on three sides; black closes the fourth.
    let mut board = BoardState::new(19);
    for code in ["pd", "oc", "pb"] {
        board.place_stone(Point::from_sgf(code).unwrap(), Color::Black).unwrap();
    }
    board.place_stone(Point::from_sgf("pc").unwrap(), Color::White).unwrap();
    assert_eq!(board.liberties(Point::from_sgf("pc").unwrap()), 1);

    let placed = board.place_stone(Point::from_sgf("qc").unwrap(), Color::Black).unwrap();
    assert_eq!(placed.captured, pts(&["pc"]));
    assert_eq!(board.captures(Color::Black), 1);
    assert!(board.is_empty_at(Point::from_sgf("pc").unwrap()));
}

#[test]
fn test_random_games_keep_stone_accounting() {
    let mut rng = fastrand::Rng::with_seed(3);
    for _ in 0..20 {
        let size = 9;
        let mut board = BoardState::new(size);
        let mut color = Color::Black;
        let mut placed = 0usize;
        for _ in 0..150 {
            let p = Point::new(rng.usize(0..size), rng.usize(0..size));
            let before = (board.captures(Color::Black), board.captures(Color::White));
            if board.place_stone(p, color).is_ok() {
                placed += 1;
                color = color.opponent();
            }
            let after = (board.captures(Color::Black), board.captures(Color::White));
            assert!(after.0 >= before.0 && after.1 >= before.1);
            let captured = after.0 + after.1;
            assert_eq!(
                board.count(Color::Black) + board.count(Color::White),
                placed - captured
            );
        }
    }
}

#[test]
fn test_every_group_on_board_has_a_liberty() {
    let mut rng = fastrand::Rng::with_seed(5);
    let size = 9;
    let mut board = BoardState::new(size);
    for i in 0..300 {
        let color = if i % 2 == 0 { Color::Black } else { Color::White };
        let _ = board.place_stone(Point::new(rng.usize(0..size), rng.usize(0..size)), color);
    }
    for y in 0..size {
        for x in 0..size {
            let p = Point::new(x, y);
            if !board.is_empty_at(p) {
                assert!(board.liberties(p) > 0, "dead group left at {p}");
            }
        }
    }
}

// =============================================================================
// Answer matching and transforms
// =============================================================================

#[test]
fn test_matcher_solves_exactly_at_line_length() {
    let mut rng = fastrand::Rng::with_seed(13);
    for _ in 0..50 {
        let len = rng.usize(1..=6);
        let mut lines: Vec<Vec<Point>> = Vec::new();
        for _ in 0..rng.usize(1..=4) {
            let line: Vec<Point> = (0..len)
                .map(|_| Point::new(rng.usize(0..19), rng.usize(0..19)))
                .collect();
            if !lines.contains(&line) {
                lines.push(line);
            }
        }
        let chosen = lines[rng.usize(0..lines.len())].clone();
        let mut matcher = AnswerMatcher::new(lines);
        for (k, &p) in chosen.iter().enumerate() {
            match matcher.submit(p) {
                Step::Solved => assert_eq!(k + 1, len),
                Step::Continue { hints } => {
                    assert!(k + 1 < len);
                    assert!(hints.contains(&chosen[k + 1]));
                }
                Step::Rejected => panic!("move {k} of its own line rejected"),
            }
        }
        assert_eq!(matcher.history(), chosen.as_slice());
    }
}

#[test]
fn test_remap_twice_restores_problem() {
    let mut rng = fastrand::Rng::with_seed(17);
    for _ in 0..50 {
        let placement = random_placement(&mut rng, 19, 8);
        let first = placement.stones().next().map(|(_, p)| p).unwrap();
        let problem = Problem {
            placement,
            answers: vec![AnswerLine::primary(vec![first])],
            ..corner_problem(1)
        };
        for corner in Corner::ALL {
            assert_eq!(remap(&remap(&problem, corner), corner), problem);
        }
    }
}

// =============================================================================
// Engine sessions against the reference engine
// =============================================================================

#[test]
fn test_pipelined_batch_returns_blocks_in_order() {
    let mut session = EngineSession::start(&reference_engine()).unwrap();
    let response = session
        .send_command("name\nprotocol_version\nboardsize 99", 3)
        .unwrap();
    assert_eq!(response.replies.len(), 3);
    assert_eq!(response.replies[0].text, "tsumego");
    assert_eq!(response.replies[1].text, "2");
    assert!(!response.replies[2].ok);
    assert!(!response.all_ok());
    session.close();
}

#[test]
fn test_analysis_cancelled_by_pressure() {
    let mut session = EngineSession::start(&reference_engine()).unwrap();
    let calls = AtomicUsize::new(0);
    let pressure = || calls.fetch_add(1, Ordering::SeqCst) + 1 >= 2;

    let samples = session.stream_analysis(Color::Black, 5, &pressure).unwrap();
    assert_eq!(samples.len(), 2);
    assert!(samples.iter().all(|s| s.visits > 0));

    let response = session.send_command("name", 1).unwrap();
    assert_eq!(response.last_text(), "tsumego");
    session.close();
}

#[test]
fn test_startup_times_out_without_ready_marker() {
    let mut config = reference_engine();
    config.ready_marker = "marker this engine never prints".to_string();
    config.startup_timeout = Duration::from_millis(500);

    let started = Instant::now();
    let err = EngineSession::start(&config).err().unwrap();
    assert!(matches!(err, EngineError::StartupTimeout(_)));
    // The child was killed and its readers joined before returning.
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn test_unterminated_response_times_out() {
    let mut config = reference_engine();
    config.response_timeout = Some(Duration::from_millis(500));
    let mut session = EngineSession::start(&config).unwrap();

    // Analysis streams until interrupted, so its block never ends.
    let err = session.send_command("kata-analyze B 5", 1).unwrap_err();
    assert!(matches!(err, EngineError::ResponseTimeout(_)));

    let closing = Instant::now();
    session.close();
    session.close();
    assert!(closing.elapsed() < Duration::from_secs(10));
}

#[test]
fn test_solve_corner_problem_end_to_end() {
    let mut session = EngineSession::start(&reference_engine()).unwrap();
    let report = Solver::new(Layout::Padded)
        .solve(&mut session, &corner_problem(21), &BoundaryClassifier::default())
        .unwrap();
    assert!(report.solved());
    let last = report.last().unwrap();
    assert_eq!(last.strategy, Strategy::PLAIN);
    assert_eq!(last.answer, "A19");
    session.close();
}

#[test]
fn test_batch_against_reference_engine() {
    let mut unsolvable = corner_problem(30);
    // The symmetric retry mirrors A19 onto T1, so the wrong answer must be
    // neither corner.
    unsolvable.answers = vec![AnswerLine::primary(pts(&["dd"]))];
    let mut store = JsonStore::in_memory(vec![corner_problem(21), unsolvable]);

    let classifier = BoundaryClassifier::default();
    let driver = BatchDriver::new(&classifier, "reference-p1");
    let config = reference_engine();
    let summary = driver
        .run(&mut store, &ProblemFilter::default(), || {
            EngineSession::start(&config)
        })
        .unwrap();
    assert_eq!(summary.solved, 1);
    assert_eq!(summary.failed, 1);

    let solved = store.find_verdict(21, "reference-p1").unwrap().unwrap();
    assert!(solved.solved);
    assert_eq!(solved.answer, "A19");
    let failed = store.find_verdict(30, "reference-p1").unwrap().unwrap();
    assert!(!failed.solved);
    assert_eq!(failed.strategy, Strategy::PLAIN_SYMMETRIC);
}
