//! One-line driver between the REPL and the interpretive core.

use log::{debug, error, info};
use nix::unistd::Pid;

use crate::config::Config;
use crate::eval::{Evaluator, Launcher};
use crate::jobs::{self, ProcessLauncher};
use crate::parse::{self, ParseError};

/// What happened to one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Blank line (or a lone background marker); nothing ran.
    Skipped,
    /// An exit word; the caller should end the session.
    Exit,
    /// The tree ran in the foreground with this overall result.
    Completed(bool),
    /// The tree was handed to a background process.
    Background(Pid),
    /// The line did not parse; nothing ran.
    Rejected(ParseError),
}

impl LineOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            LineOutcome::Skipped => "skipped",
            LineOutcome::Exit => "exit",
            LineOutcome::Completed(true) => "success",
            LineOutcome::Completed(false) => "failure",
            LineOutcome::Background(_) => "background",
            LineOutcome::Rejected(_) => "rejected",
        }
    }
}

/// Holds the configuration and the launcher for a shell session.
pub struct Session<L = ProcessLauncher> {
    config: Config,
    evaluator: Evaluator<L>,
}

impl Session<ProcessLauncher> {
    pub fn new(config: Config) -> Self {
        let launcher = ProcessLauncher::from_config(&config.jobs);
        Self::with_launcher(config, launcher)
    }
}

impl<L: Launcher> Session<L> {
    pub fn with_launcher(config: Config, launcher: L) -> Self {
        Self {
            config,
            evaluator: Evaluator::new(launcher),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Tokenize, parse, and run one line.
    ///
    /// The tree and the words are dropped before this returns, including
    /// for background lines, whose child process has its own copy.
    pub fn run_line(&self, line: &str) -> LineOutcome {
        let mut words = parse::split_words(line);
        let Some(first) = words.first() else {
            return LineOutcome::Skipped;
        };
        if self.config.is_exit_word(first) {
            return LineOutcome::Exit;
        }

        let background = parse::strip_background(&mut words);
        if words.is_empty() {
            return LineOutcome::Skipped;
        }

        let tree = match parse::parse(&words) {
            Ok(tree) => tree,
            Err(e) => {
                error!("cannot execute your command: {e}");
                return self.record(line, LineOutcome::Rejected(e));
            }
        };

        debug!("{} command(s) in tree", tree.command_count());
        let outcome = if background {
            match jobs::run_background(&tree, self.evaluator.launcher()) {
                Ok(pid) => LineOutcome::Background(pid),
                Err(e) => {
                    error!("cannot start background job: {e}");
                    LineOutcome::Completed(false)
                }
            }
        } else {
            LineOutcome::Completed(self.evaluator.eval(&tree))
        };
        self.record(line, outcome)
    }

    fn record(&self, line: &str, outcome: LineOutcome) -> LineOutcome {
        let shown: String = line.trim().chars().take(200).collect();
        match &outcome {
            LineOutcome::Background(pid) => info!("{shown}\t{}\t[{pid}]", outcome.label()),
            _ => info!("{shown}\t{}", outcome.label()),
        }
        outcome
    }
}
