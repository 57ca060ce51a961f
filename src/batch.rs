//! Solving a whole collection, one problem at a time.
//!
//! For each problem the driver skips it if this engine version already
//! solved it, cools down while the machine is hot, then runs the solver's
//! ladder. Verdicts are buffered and written in batches.
//!
//! Failures stay local to one problem. Bad problem data is logged and
//! skipped. A broken engine session is dropped (which closes it) and a
//! fresh one is spawned for the next problem.

use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::constants::VERDICT_BATCH;
use crate::pressure::{Cooldown, TemperatureSource};
use crate::session::EngineError;
use crate::solver::{EnclosureClassifier, Gtp, SolveError, Solver};
use crate::store::{ProblemFilter, ProblemStore, StoreError, VerdictRecord};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("could not start engine: {0}")]
    Spawn(#[source] EngineError),
}

/// Counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub solved: usize,
    pub failed: usize,
    pub skipped: usize,
    pub data_errors: usize,
    pub engine_errors: usize,
}

impl BatchSummary {
    pub fn attempted(&self) -> usize {
        self.solved + self.failed
    }
}

pub struct BatchDriver<'a> {
    pub solver: Solver,
    pub classifier: &'a dyn EnclosureClassifier,
    /// Verdicts are keyed by this label.
    pub version: String,
    pub skip_solved: bool,
    pub batch_size: usize,
    pub thermal: Option<&'a dyn TemperatureSource>,
    pub cooldown: Cooldown,
    /// How the cooldown sleeps.
    pub pause: fn(Duration),
}

impl<'a> BatchDriver<'a> {
    pub fn new(classifier: &'a dyn EnclosureClassifier, version: impl Into<String>) -> Self {
        Self {
            solver: Solver::default(),
            classifier,
            version: version.into(),
            skip_solved: true,
            batch_size: VERDICT_BATCH,
            thermal: None,
            cooldown: Cooldown::default(),
            pause: std::thread::sleep,
        }
    }

    fn already_solved(&self, store: &dyn ProblemStore, public_id: u64) -> Result<bool, StoreError> {
        if !self.skip_solved {
            return Ok(false);
        }
        Ok(store
            .find_verdict(public_id, &self.version)?
            .is_some_and(|v| v.solved))
    }

    fn cool_down(&self) {
        if let Some(source) = self.thermal {
            self.cooldown.wait_with(source, self.pause);
        }
    }

    /// Solve every problem matching `filter`. `spawn` starts an engine; it
    /// is called lazily, and again after a session fails.
    pub fn run<G: Gtp>(
        &self,
        store: &mut dyn ProblemStore,
        filter: &ProblemFilter,
        mut spawn: impl FnMut() -> Result<G, EngineError>,
    ) -> Result<BatchSummary, BatchError> {
        let problems = store.find_problems(filter)?;
        info!(problems = problems.len(), version = %self.version, "batch started");

        let mut summary = BatchSummary::default();
        let mut pending: Vec<VerdictRecord> = Vec::new();
        let mut engine: Option<G> = None;

        for problem in &problems {
            let public_id = problem.public_id;
            if self.already_solved(&*store, public_id)? {
                summary.skipped += 1;
                continue;
            }

            self.cool_down();

            let mut session = match engine.take() {
                Some(e) => e,
                None => match spawn() {
                    Ok(e) => e,
                    Err(e) => {
                        store.upsert_verdicts(&pending)?;
                        return Err(BatchError::Spawn(e));
                    }
                },
            };

            match self.solver.solve(&mut session, problem, self.classifier) {
                Ok(report) => {
                    engine = Some(session);
                    let Some(last) = report.last() else {
                        continue;
                    };
                    if last.solved {
                        summary.solved += 1;
                    } else {
                        summary.failed += 1;
                    }
                    pending.push(VerdictRecord {
                        public_id,
                        version: self.version.clone(),
                        strategy: last.strategy,
                        solved: last.solved,
                        answer: last.answer.clone(),
                        level: problem.level.clone(),
                    });
                }
                Err(SolveError::Problem(e)) => {
                    engine = Some(session);
                    warn!(publicid = public_id, "skipping problem: {e}");
                    summary.data_errors += 1;
                }
                Err(SolveError::Engine(e)) => {
                    error!(publicid = public_id, "engine session failed: {e}");
                    summary.engine_errors += 1;
                    drop(session);
                }
            }

            if pending.len() >= self.batch_size {
                store.upsert_verdicts(&pending)?;
                pending.clear();
            }
        }

        if !pending.is_empty() {
            store.upsert_verdicts(&pending)?;
        }
        info!(
            solved = summary.solved,
            failed = summary.failed,
            skipped = summary.skipped,
            data_errors = summary.data_errors,
            engine_errors = summary.engine_errors,
            "batch finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{AnswerLine, Placement, Problem};
    use crate::session::{Reply, Response};
    use crate::solver::{BoundaryClassifier, Strategy};
    use crate::store::JsonStore;
    use crate::coord::Point;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Plays a fixed vertex for every genmove; fails after `budget`
    /// genmoves when set.
    struct FixedEngine {
        vertex: &'static str,
        budget: Option<usize>,
        genmoves: Rc<Cell<usize>>,
    }

    impl Gtp for FixedEngine {
        fn send_command(
            &mut self,
            command: &str,
            expected_blocks: usize,
        ) -> Result<Response, EngineError> {
            let text = if command.starts_with("genmove") {
                if self.budget == Some(0) {
                    return Err(EngineError::Exited);
                }
                self.budget = self.budget.map(|b| b - 1);
                self.genmoves.set(self.genmoves.get() + 1);
                self.vertex.to_string()
            } else {
                String::new()
            };
            Ok(Response {
                replies: vec![Reply { ok: true, text }; expected_blocks],
            })
        }
    }

    fn corner_problem(id: u64) -> Problem {
        let pts = |codes: &[&str]| -> Vec<Point> {
            codes.iter().map(|c| Point::from_sgf(c).unwrap()).collect()
        };
        Problem {
            public_id: id,
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

    fn driver(classifier: &BoundaryClassifier) -> BatchDriver<'_> {
        let mut d = BatchDriver::new(classifier, "b18-p10");
        d.pause = |_| {};
        d
    }

    #[test]
    fn test_run_records_verdicts() {
        let classifier = BoundaryClassifier::default();
        let mut store = JsonStore::in_memory((1..=3).map(corner_problem).collect());
        let genmoves = Rc::new(Cell::new(0));
        let spawns = Cell::new(0);
        let summary = driver(&classifier)
            .run(&mut store, &ProblemFilter::default(), || {
                spawns.set(spawns.get() + 1);
                Ok(FixedEngine {
                    vertex: "A19",
                    budget: None,
                    genmoves: Rc::clone(&genmoves),
                })
            })
            .unwrap();
        assert_eq!(summary.solved, 3);
        assert_eq!(spawns.get(), 1);
        assert_eq!(genmoves.get(), 3);
        assert_eq!(store.verdicts().len(), 3);
        assert!(store.verdicts().iter().all(|v| v.strategy == Strategy::PLAIN));
    }

    #[test]
    fn test_solved_problems_are_skipped() {
        let classifier = BoundaryClassifier::default();
        let mut store = JsonStore::in_memory(vec![corner_problem(1), corner_problem(2)]);
        let genmoves = Rc::new(Cell::new(0));
        let d = driver(&classifier);
        let spawn = || {
            Ok(FixedEngine {
                vertex: "A19",
                budget: None,
                genmoves: Rc::clone(&genmoves),
            })
        };
        d.run(&mut store, &ProblemFilter::default(), spawn).unwrap();
        let summary = d.run(&mut store, &ProblemFilter::default(), spawn).unwrap();
        assert_eq!(summary.skipped, 2);
        assert_eq!(genmoves.get(), 2);
    }

    #[test]
    fn test_failures_are_retried_next_run() {
        let classifier = BoundaryClassifier::default();
        let mut store = JsonStore::in_memory(vec![corner_problem(1)]);
        let genmoves = Rc::new(Cell::new(0));
        let d = driver(&classifier);
        let spawn = || {
            Ok(FixedEngine {
                vertex: "D4",
                budget: None,
                genmoves: Rc::clone(&genmoves),
            })
        };
        let first = d.run(&mut store, &ProblemFilter::default(), spawn).unwrap();
        assert_eq!(first.failed, 1);
        // Black ladder: plain then symmetric.
        assert_eq!(genmoves.get(), 2);
        assert_eq!(store.verdicts()[0].strategy, Strategy::PLAIN_SYMMETRIC);
        let second = d.run(&mut store, &ProblemFilter::default(), spawn).unwrap();
        assert_eq!(second.failed, 1);
        assert_eq!(store.verdicts().len(), 1);
    }

    #[test]
    fn test_engine_failure_respawns() {
        let classifier = BoundaryClassifier::default();
        let mut store = JsonStore::in_memory((1..=3).map(corner_problem).collect());
        let genmoves = Rc::new(Cell::new(0));
        let spawns = Cell::new(0);
        let summary = driver(&classifier)
            .run(&mut store, &ProblemFilter::default(), || {
                spawns.set(spawns.get() + 1);
                // The first session dies on its second genmove.
                let budget = (spawns.get() == 1).then_some(1);
                Ok(FixedEngine {
                    vertex: "A19",
                    budget,
                    genmoves: Rc::clone(&genmoves),
                })
            })
            .unwrap();
        assert_eq!(summary.engine_errors, 1);
        assert_eq!(summary.solved, 2);
        assert_eq!(spawns.get(), 2);
        let mut ids: Vec<u64> = store.verdicts().iter().map(|v| v.public_id).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_data_errors_do_not_stop_the_run() {
        let classifier = BoundaryClassifier::default();
        let mut broken = corner_problem(2);
        broken.answers.clear();
        let mut store = JsonStore::in_memory(vec![corner_problem(1), broken, corner_problem(3)]);
        let genmoves = Rc::new(Cell::new(0));
        let summary = driver(&classifier)
            .run(&mut store, &ProblemFilter::default(), || {
                Ok(FixedEngine {
                    vertex: "A19",
                    budget: None,
                    genmoves: Rc::clone(&genmoves),
                })
            })
            .unwrap();
        assert_eq!(summary.data_errors, 1);
        assert_eq!(summary.solved, 2);
    }

    #[test]
    fn test_malformed_documents_are_skipped() {
        let classifier = BoundaryClassifier::default();
        let mut off_board = corner_problem(2);
        off_board.size = 9;
        off_board.placement.black.push(Point::from_sgf("qd").unwrap());
        let mut no_board = corner_problem(3);
        no_board.size = 0;
        let mut store = JsonStore::in_memory(vec![
            corner_problem(1),
            off_board,
            no_board,
            corner_problem(4),
        ]);
        let genmoves = Rc::new(Cell::new(0));
        let summary = driver(&classifier)
            .run(&mut store, &ProblemFilter::default(), || {
                Ok(FixedEngine {
                    vertex: "A19",
                    budget: None,
                    genmoves: Rc::clone(&genmoves),
                })
            })
            .unwrap();
        assert_eq!(summary.data_errors, 2);
        assert_eq!(summary.solved, 2);
        assert_eq!(genmoves.get(), 2);
        assert_eq!(store.index().len(), 2);
    }

    #[test]
    fn test_spawn_failure_flushes_and_stops() {
        let classifier = BoundaryClassifier::default();
        let mut store = JsonStore::in_memory(vec![corner_problem(1)]);
        let result = driver(&classifier).run::<FixedEngine>(
            &mut store,
            &ProblemFilter::default(),
            || Err(EngineError::StartupTimeout(Duration::from_secs(1))),
        );
        assert!(matches!(result, Err(BatchError::Spawn(_))));
        assert!(store.verdicts().is_empty());
    }

    #[test]
    fn test_cooldown_runs_before_each_attempt() {
        struct Hot(RefCell<Vec<f64>>);
        impl TemperatureSource for Hot {
            fn hottest(&self) -> Option<f64> {
                self.0.borrow_mut().pop()
            }
        }
        // Popped from the back: 61 (sleep), 50 (go), 50 (go).
        let source = Hot(RefCell::new(vec![50.0, 50.0, 61.0]));
        let classifier = BoundaryClassifier::default();
        let mut d = driver(&classifier);
        d.thermal = Some(&source);
        let mut store = JsonStore::in_memory(vec![corner_problem(1), corner_problem(2)]);
        let genmoves = Rc::new(Cell::new(0));
        d.run(&mut store, &ProblemFilter::default(), || {
            Ok(FixedEngine {
                vertex: "A19",
                budget: None,
                genmoves: Rc::clone(&genmoves),
            })
        })
        .unwrap();
        assert!(source.0.borrow().is_empty());
    }
}
