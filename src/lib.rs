//! condsh: the interpretive core of a restricted interactive shell.
//!
//! One input line is split into words, parsed into a small AST of
//! commands joined by `&&`, `||`, and `if ... do ... done` blocks, and
//! evaluated by running each command as a child process. A trailing `&`
//! runs the whole tree in a background process; terminal stops are
//! forwarded to the foreground job.
//!
//! # Architecture
//!
//! - **[`parse`]**: Word splitting, the AST types, and the recursive-descent parser.
//! - **[`eval`]**: The [`Launcher`](eval::Launcher) seam and the short-circuit tree walk.
//! - **[`jobs`]**: Process launcher, signal handlers, background jobs.
//! - **[`session`]**: One-line driver used by the REPL.
//! - **[`config`]**: Configuration loading: embedded defaults + user overlay merge.
//! - **[`logging`]**: `simplelog` setup: stderr plus `~/.local/share/condsh/condsh.log`.

/// Configuration types, loading, and overlay merge logic.
pub mod config;
/// Expression evaluation over a pluggable command launcher.
pub mod eval;
/// Process creation, job-control signals, and background execution.
pub mod jobs;
/// Logger initialisation.
pub mod logging;
/// Word splitting, AST types, and the parser.
pub mod parse;
/// Per-line orchestration: exit words, background marker, parse, evaluate.
pub mod session;

use eval::Evaluator;
use jobs::ProcessLauncher;
use parse::{Expression, ParseError};

/// Split and parse a line without running anything.
pub fn parse_line(line: &str) -> Result<Expression, ParseError> {
    parse::parse(&parse::split_words(line))
}

/// Parse a line and run it in the foreground with default settings.
///
/// This is the main entry point for tests and simple usage.
/// For interactive use, build a [`session::Session`] from loaded config.
pub fn evaluate(line: &str) -> Result<bool, ParseError> {
    let tree = parse_line(line)?;
    Ok(Evaluator::new(ProcessLauncher::default()).eval(&tree))
}
