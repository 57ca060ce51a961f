//! A small Go Text Protocol (GTP) engine backed by the rules engine.
//!
//! It exists so the protocol client, the orchestrator and the batch driver
//! can be exercised end to end without an external engine. Move choice is
//! a fixed, deterministic policy, not search:
//!
//! 1. the legal move capturing the most stones;
//! 2. otherwise a liberty of the opponent group with the fewest liberties;
//! 3. otherwise the first legal point, or `pass`.
//!
//! ## Supported Commands
//!
//! - `name`, `version`, `protocol_version`, `list_commands`,
//!   `known_command <cmd>`, `quit`
//! - `boardsize <size>` - any size from 1 to 19
//! - `clear_board`, `komi <value>`
//! - `play <color> <vertex>` - checked by the rules engine
//! - `genmove <color>` - choose, play and print a move
//! - `showboard` - text diagram followed by the komi
//! - `kata-analyze [color] [interval]` - stream `info` lines every
//!   `interval` centiseconds until any input line arrives
//!
//! On start the engine writes `GTP ready` to stderr.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::debug;

use crate::board::BoardState;
use crate::constants::{ANALYSIS_INTERVAL_CS, DEFAULT_KOMI, DEFAULT_SIZE, MAX_SIZE, READY_MARKER};
use crate::coord::{Color, Point, Vertex};

/// The list of known GTP commands.
const KNOWN_COMMANDS: &[&str] = &[
    "boardsize",
    "clear_board",
    "genmove",
    "kata-analyze",
    "known_command",
    "komi",
    "list_commands",
    "name",
    "play",
    "protocol_version",
    "quit",
    "showboard",
    "version",
];

/// Visits added per reported analysis line.
const VISITS_PER_REPORT: u64 = 8;

/// GTP engine state.
pub struct GtpEngine {
    board: BoardState,
    komi: f32,
    /// Echo every command to stderr, interleaved with responses.
    chatty: bool,
}

impl Default for GtpEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GtpEngine {
    pub fn new() -> Self {
        Self {
            board: BoardState::new(DEFAULT_SIZE),
            komi: DEFAULT_KOMI,
            chatty: false,
        }
    }

    /// Write a stderr line for every command received.
    pub fn chatty(mut self, on: bool) -> Self {
        self.chatty = on;
        self
    }

    pub fn board(&self) -> &BoardState {
        &self.board
    }

    /// Run the command loop until `quit` or end of input.
    pub fn run<R, W>(&mut self, input: R, output: &mut W) -> io::Result<()>
    where
        R: BufRead + Send + 'static,
        W: Write,
    {
        let (tx, rx) = crossbeam_channel::unbounded::<String>();
        thread::spawn(move || {
            for line in input.lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        eprintln!("tsumego reference engine {}", env!("CARGO_PKG_VERSION"));
        eprintln!("{READY_MARKER}");

        let mut pending: VecDeque<String> = VecDeque::new();
        loop {
            let line = match pending.pop_front() {
                Some(l) => l,
                None => match rx.recv() {
                    Ok(l) => l,
                    Err(_) => break,
                },
            };

            // Skip empty lines and comments
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if self.chatty {
                eprintln!("engine: handling {line:?}");
            }

            let (id, command_line) = Self::parse_id(line);
            let parts: Vec<&str> = command_line.split_whitespace().collect();
            let Some(first) = parts.first() else {
                continue;
            };
            let command = first.to_lowercase();
            let args = &parts[1..];
            let id_str = id.map(|i| i.to_string()).unwrap_or_default();

            if command == "kata-analyze" {
                self.analyze(&id_str, args, &rx, output, &mut pending)?;
                continue;
            }

            let (success, message) = self.execute(&command, args);
            let prefix = if success { '=' } else { '?' };
            write!(output, "{prefix}{id_str} {message}\n\n")?;
            output.flush()?;

            if command == "quit" {
                break;
            }
        }
        Ok(())
    }

    /// Parse an optional numeric command ID from the beginning of the line.
    fn parse_id(line: &str) -> (Option<u32>, &str) {
        let trimmed = line.trim();
        let end = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        if end > 0 {
            if let Ok(id) = trimmed[..end].parse::<u32>() {
                return (Some(id), trimmed[end..].trim());
            }
        }
        (None, trimmed)
    }

    /// Stream analysis lines until input arrives. A non-empty line that
    /// stopped the stream is queued as the next command.
    fn analyze<W: Write>(
        &mut self,
        id: &str,
        args: &[&str],
        rx: &Receiver<String>,
        output: &mut W,
        pending: &mut VecDeque<String>,
    ) -> io::Result<()> {
        let mut color = self.next_color();
        let mut interval_cs = ANALYSIS_INTERVAL_CS;
        for arg in args {
            if let Some(c) = Color::parse_gtp(arg) {
                color = c;
            } else if let Ok(cs) = arg.parse::<u32>() {
                interval_cs = cs;
            } else {
                write!(output, "?{id} invalid argument {arg}\n\n")?;
                return output.flush();
            }
        }
        let interval = Duration::from_millis(u64::from(interval_cs.max(1)) * 10);

        writeln!(output, "={id}")?;
        output.flush()?;

        let label = self
            .choose_move(color)
            .map(|p| p.label(self.board.size()))
            .unwrap_or_else(|| "pass".to_string());
        let mut visits = 0u64;
        loop {
            visits += VISITS_PER_REPORT;
            writeln!(
                output,
                "info move {label} visits {visits} edgeVisits {visits} utility 0.0 \
                 winrate 0.500000 scoreMean 0.0 order 0 pv {label}"
            )?;
            output.flush()?;
            match rx.recv_timeout(interval) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        pending.push_back(line);
                    }
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!(visits, "analysis stopped");
        writeln!(output)?;
        output.flush()
    }

    /// White when black has more stones on the board, else black.
    fn next_color(&self) -> Color {
        if self.board.count(Color::Black) > self.board.count(Color::White) {
            Color::White
        } else {
            Color::Black
        }
    }

    fn legal_moves(&self, color: Color) -> Vec<(Point, usize)> {
        self.board
            .empty_points()
            .filter_map(|p| {
                let mut trial = self.board.clone();
                trial
                    .place_stone(p, color)
                    .ok()
                    .map(|placed| (p, placed.captured.len()))
            })
            .collect()
    }

    /// The deterministic move policy.
    pub fn choose_move(&self, color: Color) -> Option<Point> {
        let legal = self.legal_moves(color);
        let mut best_capture: Option<(Point, usize)> = None;
        for &(p, n) in &legal {
            if n > 0 && best_capture.is_none_or(|(_, b)| n > b) {
                best_capture = Some((p, n));
            }
        }
        if let Some((p, _)) = best_capture {
            return Some(p);
        }

        let is_legal = |p: Point| legal.iter().any(|&(q, _)| q == p);
        let opponent = color.opponent();
        let mut weakest: Option<(usize, Point)> = None;
        let mut seen = vec![false; self.board.size() * self.board.size()];
        for y in 0..self.board.size() {
            for x in 0..self.board.size() {
                let p = Point::new(x, y);
                if seen[y * self.board.size() + x] || self.board.color_at(p) != Some(opponent) {
                    continue;
                }
                let group = self.board.group(p);
                for q in &group {
                    seen[q.y * self.board.size() + q.x] = true;
                }
                let mut liberties: Vec<Point> = group
                    .iter()
                    .flat_map(|&q| self.board.neighbors(q))
                    .filter(|&q| self.board.is_empty_at(q))
                    .collect();
                liberties.sort_by_key(|q| (q.y, q.x));
                liberties.dedup();
                let Some(&target) = liberties.iter().find(|&&q| is_legal(q)) else {
                    continue;
                };
                if weakest.is_none_or(|(n, _)| liberties.len() < n) {
                    weakest = Some((liberties.len(), target));
                }
            }
        }
        if let Some((_, p)) = weakest {
            return Some(p);
        }

        legal.first().map(|&(p, _)| p)
    }

    fn parse_color(arg: Option<&&str>) -> Result<Color, String> {
        let arg = arg.ok_or("missing argument")?;
        Color::parse_gtp(arg).ok_or_else(|| format!("invalid color {arg}"))
    }

    /// Execute a GTP command and return (success, response).
    fn execute(&mut self, command: &str, args: &[&str]) -> (bool, String) {
        match self.dispatch(command, args) {
            Ok(message) => (true, message),
            Err(message) => (false, message),
        }
    }

    fn dispatch(&mut self, command: &str, args: &[&str]) -> Result<String, String> {
        match command {
            "name" => Ok("tsumego".to_string()),
            "version" => Ok(env!("CARGO_PKG_VERSION").to_string()),
            "protocol_version" => Ok("2".to_string()),
            "list_commands" => Ok(KNOWN_COMMANDS.join("\n")),
            "known_command" => {
                let cmd = args.first().ok_or("missing argument")?;
                let known = KNOWN_COMMANDS.contains(&cmd.to_lowercase().as_str());
                Ok(known.to_string())
            }
            "quit" => Ok(String::new()),

            "boardsize" => {
                let arg = args.first().ok_or("missing argument")?;
                match arg.parse::<usize>() {
                    Ok(size) if (1..=MAX_SIZE).contains(&size) => {
                        self.board = BoardState::new(size);
                        Ok(String::new())
                    }
                    Ok(_) => Err("unacceptable size".to_string()),
                    Err(_) => Err("invalid size".to_string()),
                }
            }

            "clear_board" => {
                self.board = BoardState::new(self.board.size());
                Ok(String::new())
            }

            "komi" => {
                let arg = args.first().ok_or("missing argument")?;
                self.komi = arg.parse().map_err(|_| "invalid komi".to_string())?;
                Ok(String::new())
            }

            "play" => {
                let color = Self::parse_color(args.first())?;
                let vertex = args.get(1).ok_or("missing arguments")?;
                let size = self.board.size();
                match Vertex::parse(vertex, size).map_err(|e| e.to_string())? {
                    Vertex::Play(p) => self
                        .board
                        .place_stone(p, color)
                        .map(|_| String::new())
                        .map_err(|e| format!("illegal move: {e}")),
                    Vertex::Pass | Vertex::Resign => Ok(String::new()),
                }
            }

            "genmove" => {
                let color = Self::parse_color(args.first())?;
                match self.choose_move(color) {
                    Some(p) => {
                        self.board
                            .place_stone(p, color)
                            .map_err(|e| format!("policy chose an illegal move: {e}"))?;
                        Ok(p.label(self.board.size()))
                    }
                    None => Ok("pass".to_string()),
                }
            }

            "showboard" => Ok(format!("\n{}komi {}", self.board, self.komi)),

            _ => Err(format!("unknown command: {command}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(engine: &mut GtpEngine, color: &str, vertex: &str) {
        let (ok, msg) = engine.execute("play", &[color, vertex]);
        assert!(ok, "play {color} {vertex}: {msg}");
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(GtpEngine::parse_id("7 play B D4"), (Some(7), "play B D4"));
        assert_eq!(GtpEngine::parse_id("  kata-analyze B 10"), (None, "kata-analyze B 10"));
    }

    #[test]
    fn test_identity_and_commands() {
        let mut engine = GtpEngine::new();
        assert_eq!(engine.execute("name", &[]), (true, "tsumego".to_string()));
        assert_eq!(engine.execute("protocol_version", &[]), (true, "2".to_string()));
        let (_, listed) = engine.execute("list_commands", &[]);
        assert!(listed.lines().any(|c| c == "kata-analyze"));
        assert_eq!(engine.execute("known_command", &["genmove"]).1, "true");
        assert_eq!(engine.execute("known_command", &["undo"]).1, "false");
    }

    #[test]
    fn test_ids_echo_on_play_and_analysis() {
        let input = io::Cursor::new("3 play B D4\n4 kata-analyze W 1\n\n5 genmove W\nquit\n");
        let mut out = Vec::new();
        GtpEngine::new().run(input, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        let blocks: Vec<&str> = out.split("\n\n").filter(|b| !b.is_empty()).collect();
        assert_eq!(blocks[0], "=3 ");
        assert!(blocks[1].starts_with("=4\ninfo move "));
        assert!(blocks[2].starts_with("=5 "));
        assert_ne!(blocks[2], "=5 pass");
    }

    #[test]
    fn test_boardsize() {
        let mut engine = GtpEngine::new();
        assert!(engine.execute("boardsize", &["9"]).0);
        assert_eq!(engine.board().size(), 9);
        assert!(!engine.execute("boardsize", &["20"]).0);
        assert!(!engine.execute("boardsize", &["x"]).0);
    }

    #[test]
    fn test_play_uses_rules_engine() {
        let mut engine = GtpEngine::new();
        play(&mut engine, "B", "D4");
        let (ok, msg) = engine.execute("play", &["W", "D4"]);
        assert!(!ok);
        assert!(msg.starts_with("illegal move"));
        assert!(!engine.execute("play", &["green", "D5"]).0);
        assert!(engine.execute("play", &["W", "pass"]).0);

        assert!(engine.execute("clear_board", &[]).0);
        assert_eq!(engine.board().count(Color::Black), 0);
    }

    #[test]
    fn test_genmove_prefers_capture() {
        let mut engine = GtpEngine::new();
        engine.execute("boardsize", &["5"]);
        // White A5 in atari from B5; black captures at A4.
        play(&mut engine, "W", "A5");
        play(&mut engine, "B", "B5");
        let (ok, mv) = engine.execute("genmove", &["B"]);
        assert!(ok);
        assert_eq!(mv, "A4");
        assert_eq!(engine.board().captures(Color::Black), 1);
    }

    #[test]
    fn test_genmove_attacks_weakest_group() {
        let mut engine = GtpEngine::new();
        engine.execute("boardsize", &["5"]);
        play(&mut engine, "W", "C3");
        play(&mut engine, "B", "C4");
        play(&mut engine, "B", "B3");
        // Remaining liberties of C3: D3 and C2, in scan order.
        let (_, mv) = engine.execute("genmove", &["black"]);
        assert_eq!(mv, "D3");
    }

    #[test]
    fn test_genmove_passes_on_full_board() {
        let mut engine = GtpEngine::new();
        engine.execute("boardsize", &["1"]);
        let (ok, mv) = engine.execute("genmove", &["B"]);
        assert!(ok);
        assert_eq!(mv, "pass");
    }

    #[test]
    fn test_showboard_has_no_blank_lines() {
        let mut engine = GtpEngine::new();
        engine.execute("boardsize", &["3"]);
        play(&mut engine, "B", "B2");
        let (ok, text) = engine.execute("showboard", &[]);
        assert!(ok);
        assert!(text.starts_with('\n'));
        assert!(text[1..].lines().all(|l| !l.trim().is_empty()));
        assert!(text.contains('X'));
    }

    #[test]
    fn test_run_frames_responses() {
        let input = io::Cursor::new("1 name\nboardsize 9\nplay B Z1\nquit\n");
        let mut out = Vec::new();
        GtpEngine::new().run(input, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        let blocks: Vec<&str> = out.split("\n\n").filter(|b| !b.is_empty()).collect();
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0], "=1 tsumego");
        assert_eq!(blocks[1], "= ");
        assert!(blocks[2].starts_with('?'));
    }

    #[test]
    fn test_analysis_stops_on_input() {
        let input = io::Cursor::new("kata-analyze B 1\nname\n");
        let mut out = Vec::new();
        GtpEngine::new().run(input, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("="));
        let info = lines.next().unwrap();
        assert!(info.starts_with("info move "));
        assert!(out.contains("\n\n= tsumego\n\n"));
    }
}
