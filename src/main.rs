//! Tsumego: verify Go life-and-death problems with a GTP engine.
//!
//! ## Usage
//!
//! - `tsumego solve` - Solve every matching problem and store verdicts
//! - `tsumego analyze` - Stream engine analysis for one problem
//! - `tsumego export` - Print a prepared problem as SGF
//! - `tsumego dedup` - List problems identical up to symmetry
//! - `tsumego search` - Find problems containing a stone pattern
//! - `tsumego practice` - Play the answer lines in the terminal
//! - `tsumego engine` - Run the built-in reference GTP engine

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tsumego::batch::BatchDriver;
use tsumego::config::{EngineConfig, engine_version};
use tsumego::constants::{
    ANALYSIS_INTERVAL_CS, ANALYSIS_TEMP_LIMIT, COOLDOWN_TEMP_LIMIT, DEFAULT_SIZE, READY_MARKER,
    RESPONSE_TIMEOUT, STARTUP_TIMEOUT, VERDICT_BATCH,
};
use tsumego::coord::{Point, Vertex};
use tsumego::gtp::GtpEngine;
use tsumego::practice::{self, Outcome, PracticeSession};
use tsumego::pressure::{
    Cooldown, NoPressure, PressureSignal, TemperatureSource, ThermalZones, ThresholdSignal,
};
use tsumego::problem::{Placement, Problem};
use tsumego::session::EngineSession;
use tsumego::solver::{BoundaryClassifier, Layout, Solver, Strategy, prepare, setup_commands};
use tsumego::store::{JsonStore, ProblemFilter};
use tsumego::symmetry::{CanonicalIndex, duplicate_groups};

/// Tsumego: life-and-death problem verification
#[derive(Parser)]
#[command(name = "tsumego")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve every matching problem with an engine and upsert verdicts
    Solve {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        thermal: ThermalArgs,
        /// Weights name used in the version label
        #[arg(long, default_value = "engine")]
        weights: String,
        /// Engine config file to read maxPlayouts from
        #[arg(long)]
        engine_config: Option<PathBuf>,
        /// Use the smallest board around the problem instead of padding
        #[arg(long)]
        reduce: bool,
        /// Re-solve problems that already have a successful verdict
        #[arg(long)]
        redo: bool,
        /// Verdicts buffered per store write
        #[arg(long, default_value_t = VERDICT_BATCH)]
        batch_size: usize,
    },
    /// Set up one problem and stream engine analysis
    Analyze {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        thermal: ThermalArgs,
        /// Problem public id
        #[arg(long)]
        id: u64,
        /// Strategy code: 10, 11, 20 or 21
        #[arg(long, default_value_t = 10)]
        strategy: u8,
        /// Samples to collect before cancelling
        #[arg(long, default_value_t = 3)]
        samples: usize,
    },
    /// Print a prepared problem as SGF
    Export {
        #[command(flatten)]
        store: StoreArgs,
        #[arg(long)]
        id: u64,
        #[arg(long, default_value_t = 10)]
        strategy: u8,
        #[arg(long)]
        reduce: bool,
        /// Include answer lines as variations
        #[arg(long)]
        answers: bool,
    },
    /// List groups of problems that are the same up to rotation and reflection
    Dedup {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Find problems whose canonical form contains the given stones
    Search {
        #[command(flatten)]
        store: StoreArgs,
        /// Black stones in storage form, e.g. `aa`
        #[arg(long = "black", short = 'b')]
        black: Vec<String>,
        /// White stones in storage form
        #[arg(long = "white", short = 'w')]
        white: Vec<String>,
        /// Only problems on this board size
        #[arg(long, default_value_t = DEFAULT_SIZE)]
        size: usize,
    },
    /// Play a problem's answer lines in the terminal
    Practice {
        #[command(flatten)]
        store: StoreArgs,
        /// Problem public id; random when omitted
        #[arg(long)]
        id: Option<u64>,
    },
    /// Run the built-in reference GTP engine on stdin/stdout
    Engine {
        /// Echo each command to stderr
        #[arg(long)]
        chatty: bool,
    },
}

#[derive(Args)]
struct StoreArgs {
    /// JSON array of problem documents
    #[arg(long, default_value = "problems.json")]
    problems: PathBuf,
    /// JSON array of verdict records
    #[arg(long, default_value = "verdicts.json")]
    verdicts: PathBuf,
}

impl StoreArgs {
    fn open(&self) -> Result<JsonStore> {
        JsonStore::open(&self.problems, Some(&self.verdicts))
            .with_context(|| format!("opening store {}", self.problems.display()))
    }

    fn problem(&self, id: u64) -> Result<Problem> {
        let store = self.open()?;
        store
            .problems()
            .iter()
            .find(|p| p.public_id == id)
            .cloned()
            .ok_or_else(|| anyhow!("no problem with publicid {id}"))
    }
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    level: Option<String>,
    #[arg(long)]
    qtype: Option<String>,
    #[arg(long)]
    size: Option<usize>,
    /// Restrict to these public ids
    #[arg(long = "only", value_delimiter = ',')]
    ids: Vec<u64>,
}

impl From<FilterArgs> for ProblemFilter {
    fn from(a: FilterArgs) -> Self {
        ProblemFilter {
            level: a.level,
            qtype: a.qtype,
            size: a.size,
            ids: a.ids,
        }
    }
}

#[derive(Args)]
struct EngineArgs {
    /// Engine executable
    #[arg(long)]
    engine: PathBuf,
    /// Argument passed to the engine; repeat for several
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    engine_args: Vec<String>,
    #[arg(long, default_value = READY_MARKER)]
    ready_marker: String,
    /// Seconds to wait for the ready marker
    #[arg(long, default_value_t = STARTUP_TIMEOUT.as_secs())]
    startup_timeout: u64,
    /// Seconds to wait for a response; 0 waits forever
    #[arg(long, default_value_t = RESPONSE_TIMEOUT.as_secs())]
    response_timeout: u64,
    /// Analysis report interval in centiseconds
    #[arg(long, default_value_t = ANALYSIS_INTERVAL_CS)]
    analysis_interval: u32,
}

impl EngineArgs {
    fn config(&self) -> EngineConfig {
        let mut c = EngineConfig::new(&self.engine, self.engine_args.clone());
        c.ready_marker = self.ready_marker.clone();
        c.startup_timeout = Duration::from_secs(self.startup_timeout);
        c.response_timeout =
            (self.response_timeout > 0).then(|| Duration::from_secs(self.response_timeout));
        c.analysis_interval = self.analysis_interval;
        c
    }
}

#[derive(Args)]
struct ThermalArgs {
    /// Directory holding thermal_zone*/temp files
    #[arg(long, default_value = "/sys/class/thermal")]
    thermal_root: PathBuf,
    /// Ignore temperatures entirely
    #[arg(long)]
    no_thermal: bool,
    /// °C above which analysis is cancelled
    #[arg(long, default_value_t = ANALYSIS_TEMP_LIMIT)]
    analysis_limit: f64,
    /// °C above which the batch waits before the next problem
    #[arg(long, default_value_t = COOLDOWN_TEMP_LIMIT)]
    cooldown_limit: f64,
}

impl ThermalArgs {
    fn zones(&self) -> Option<ThermalZones> {
        (!self.no_thermal).then(|| ThermalZones::new(&self.thermal_root))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Solve {
            store,
            filter,
            engine,
            thermal,
            weights,
            engine_config,
            reduce,
            redo,
            batch_size,
        } => {
            let version = match &engine_config {
                Some(path) => engine_version(&weights, path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => weights,
            };
            let mut db = store.open()?;
            let classifier = BoundaryClassifier::default();
            let zones = thermal.zones();

            let mut driver = BatchDriver::new(&classifier, version);
            driver.solver = Solver::new(if reduce { Layout::Reduced } else { Layout::Padded });
            driver.skip_solved = !redo;
            driver.batch_size = batch_size.max(1);
            driver.thermal = zones.as_ref().map(|z| z as &dyn TemperatureSource);
            driver.cooldown = Cooldown {
                limit: thermal.cooldown_limit,
                ..Cooldown::default()
            };

            let config = engine.config();
            let summary = driver.run(&mut db, &filter.into(), || EngineSession::start(&config))?;
            println!(
                "solved {} failed {} skipped {} data errors {} engine errors {}",
                summary.solved,
                summary.failed,
                summary.skipped,
                summary.data_errors,
                summary.engine_errors
            );
        }

        Commands::Analyze {
            store,
            engine,
            thermal,
            id,
            strategy,
            samples,
        } => {
            let problem = store.problem(id)?;
            let strategy = Strategy::try_from(strategy).map_err(|e| anyhow!(e))?;
            let t = prepare(&problem, strategy, Layout::Padded)?;
            let mut session = EngineSession::start(&engine.config())?;
            let (batch, blocks) = setup_commands(&t);
            session.send_command(&batch, blocks)?;

            let zones = thermal.zones();
            let threshold = zones
                .as_ref()
                .map(|z| ThresholdSignal::new(z, thermal.analysis_limit));
            let pressure: &dyn PressureSignal = match &threshold {
                Some(s) => s,
                None => &NoPressure,
            };
            let stream = session.stream_analysis(t.to_move, samples, pressure)?;
            for s in &stream {
                let winrate = s.winrate.map(|w| format!("{w:.3}")).unwrap_or_default();
                println!("{:>6} visits {:>6} winrate {winrate}", s.mv, s.visits);
            }
            session.close();
        }

        Commands::Export {
            store,
            id,
            strategy,
            reduce,
            answers,
        } => {
            let problem = store.problem(id)?;
            let strategy = Strategy::try_from(strategy).map_err(|e| anyhow!(e))?;
            let layout = if reduce { Layout::Reduced } else { Layout::Padded };
            print!("{}", prepare(&problem, strategy, layout)?.to_sgf(answers));
        }

        Commands::Dedup { store } => {
            let db = store.open()?;
            let groups = duplicate_groups(db.problems());
            for group in &groups {
                let ids: Vec<String> = group.iter().map(u64::to_string).collect();
                println!("{}", ids.join(" "));
            }
            info!(groups = groups.len(), "dedup finished");
        }

        Commands::Search {
            store,
            black,
            white,
            size,
        } => {
            let db = store.open()?;
            let parse = |codes: &[String]| -> Result<Vec<Point>> {
                codes
                    .iter()
                    .map(|c| Point::from_sgf(c).with_context(|| format!("stone {c:?}")))
                    .collect()
            };
            let query = Placement {
                black: parse(&black)?,
                white: parse(&white)?,
            };
            if query.is_empty() {
                bail!("search needs at least one stone");
            }
            let index: &CanonicalIndex = db.index();
            for hit in index.search(&query, size) {
                let note = if hit.colors_swapped { " (colors swapped)" } else { "" };
                println!("{}{note}", hit.public_id);
            }
        }

        Commands::Practice { store, id } => {
            let db = store.open()?;
            let problem = practice::choose(db.problems(), id)
                .cloned()
                .ok_or_else(|| anyhow!("no matching problem"))?;
            run_practice(db.problems(), problem)?;
        }

        Commands::Engine { chatty } => {
            let mut engine = GtpEngine::new().chatty(chatty);
            let stdin = io::BufReader::new(io::stdin());
            engine.run(stdin, &mut io::stdout())?;
        }
    }

    Ok(())
}

fn announce(session: &PracticeSession) {
    let problem = session.problem();
    println!(
        "problem {} ({}), {} to play",
        problem.public_id,
        problem.level,
        session.to_move()
    );
    print!("{}", session.board());
}

/// Terminal loop: moves as vertices (`C17`), or `hint`, `reset`, `quit`.
/// A solved problem moves on to the next one in the collection.
fn run_practice(problems: &[Problem], first: Problem) -> Result<()> {
    let mut session = PracticeSession::new(first)?;
    let mut stdout = io::stdout();
    announce(&session);

    for line in io::stdin().lock().lines() {
        let line = line?;
        let input = line.trim();
        let size = session.problem().size;
        match input {
            "" => continue,
            "quit" | "q" => break,
            "reset" => {
                session.reset();
                print!("{}", session.board());
                continue;
            }
            "hint" => {
                let hints: Vec<String> = session.hints().iter().map(|p| p.label(size)).collect();
                println!("try: {}", hints.join(" "));
                continue;
            }
            _ => {}
        }

        let p = match Vertex::parse(input, size) {
            Ok(Vertex::Play(p)) => p,
            Ok(_) => {
                println!("play a point");
                continue;
            }
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        match session.play(p) {
            Outcome::Ignored(reason) => println!("illegal: {reason}"),
            Outcome::Incorrect => println!("incorrect, try again"),
            Outcome::Continue { hints } => {
                print!("{}", session.board());
                let next: Vec<String> = hints.iter().map(|p| p.label(size)).collect();
                println!("{} to play ({} continuations)", session.to_move(), next.len());
            }
            Outcome::Solved => {
                print!("{}", session.board());
                println!("solved");
                match practice::next_session(problems, session.problem().public_id) {
                    Some(next) => {
                        session = next;
                        announce(&session);
                    }
                    None => {
                        println!("no more problems");
                        break;
                    }
                }
            }
        }
        stdout.flush()?;
    }
    Ok(())
}
