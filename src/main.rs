//! condsh: restricted interactive shell.
//!
//! Reads one line at a time and runs it:
//!   - Chaining: `&&`, `||` (one precedence, leftmost operator is the root)
//!   - Blocks: `if <cond> do <body> done` (a failing condition succeeds)
//!   - Output redirection: trailing `> file`
//!   - Background jobs: trailing `&`
//!   - Ctrl-Z stops the foreground job, not the shell

use std::borrow::Cow;
use std::io::{BufRead, ErrorKind, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, warn};

use condsh::config::Config;
use condsh::session::{LineOutcome, Session};
use condsh::{jobs, logging};

#[derive(Debug, Parser)]
#[command(name = "condsh", version, about = "Restricted shell with if/do/done, && and ||")]
struct Cli {
    /// Run a single line and exit with its result.
    #[arg(short = 'c', value_name = "LINE")]
    command: Option<String>,

    /// Overlay file to merge over the defaults (instead of ~/.config/condsh/config.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the merged configuration and exit.
    #[arg(long)]
    dump_config: bool,

    /// With -c: print the parsed tree as JSON instead of running it.
    #[arg(long, requires = "command")]
    dump_ast: bool,

    /// Do not write the log file.
    #[arg(long)]
    no_log_file: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match Config::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("condsh: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => Config::load(),
    };

    if cli.dump_config {
        return match toml::to_string_pretty(&config) {
            Ok(text) => {
                print!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("condsh: {e}");
                ExitCode::FAILURE
            }
        };
    }

    if cli.dump_ast {
        let mut words = condsh::parse::split_words(cli.command.as_deref().unwrap_or_default());
        condsh::parse::strip_background(&mut words);
        return match condsh::parse::parse(&words) {
            Ok(tree) => match serde_json::to_string_pretty(&tree) {
                Ok(json) => {
                    println!("{json}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("condsh: {e}");
                    ExitCode::FAILURE
                }
            },
            Err(e) => {
                eprintln!("condsh: {e}");
                ExitCode::FAILURE
            }
        };
    }

    logging::init(&config.logging, !cli.no_log_file);
    if let Err(e) = jobs::install_handlers() {
        error!("{e}");
    }

    let session = Session::new(config);
    match cli.command {
        Some(line) => match session.run_line(&line) {
            LineOutcome::Completed(false) | LineOutcome::Rejected(_) => ExitCode::FAILURE,
            _ => ExitCode::SUCCESS,
        },
        None => {
            repl(&session);
            ExitCode::SUCCESS
        }
    }
}

/// Prompt, read, run, until an exit word or end of input.
fn repl(session: &Session) {
    let shell = &session.config().shell;
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let _ = write!(stdout, "{}", shell.greeting);

    let mut buf = Vec::new();
    loop {
        let _ = write!(stdout, "{}", shell.prompt);
        let _ = stdout.flush();

        buf.clear();
        match stdin.lock().read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("cannot read input: {e}");
                break;
            }
        }

        let line = String::from_utf8_lossy(&buf);
        if let Cow::Owned(_) = line {
            warn!("input is not valid UTF-8, invalid bytes replaced");
        }
        if session.run_line(&line) == LineOutcome::Exit {
            break;
        }
    }

    let _ = writeln!(stdout, "{}", shell.farewell);
}
