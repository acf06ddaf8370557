use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::jobs::launcher::{DEFAULT_EXEC_FAILURE_STATUS, DEFAULT_REDIRECT_MODE};

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

/// Location of the user overlay, relative to `$HOME`.
const USER_CONFIG: &str = ".config/condsh/config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

// ── Final (merged) config types ──

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct ShellConfig {
    /// Printed once before the first prompt.
    #[serde(default)]
    pub greeting: String,
    #[serde(default)]
    pub prompt: String,
    /// Printed when the session ends.
    #[serde(default)]
    pub farewell: String,
    /// First words that end the session.
    #[serde(default)]
    pub exit_words: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct JobsConfig {
    /// Exit status a child reports when exec failed.
    #[serde(default = "default_exec_failure_status")]
    pub exec_failure_status: i32,
    /// Permission bits for created redirect targets (umask still applies).
    #[serde(default = "default_redirect_mode")]
    pub redirect_mode: u32,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            exec_failure_status: DEFAULT_EXEC_FAILURE_STATUS,
            redirect_mode: DEFAULT_REDIRECT_MODE,
        }
    }
}

fn default_exec_failure_status() -> i32 {
    DEFAULT_EXEC_FAILURE_STATUS
}

fn default_redirect_mode() -> u32 {
    DEFAULT_REDIRECT_MODE
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct LoggingConfig {
    /// Level for messages on stderr (`off`, `error`, `warn`, `info`, `debug`, `trace`).
    #[serde(default)]
    pub terminal_level: String,
    /// Level for messages in the log file.
    #[serde(default)]
    pub file_level: String,
    /// Log file path; `~` is expanded. Empty disables the file log.
    #[serde(default)]
    pub file: String,
}

// ── Overlay types (user config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
struct ConfigOverlay {
    #[serde(default)]
    shell: ShellOverlay,
    #[serde(default)]
    jobs: JobsOverlay,
    #[serde(default)]
    logging: LoggingOverlay,
}

#[derive(Debug, Deserialize, Default)]
struct ShellOverlay {
    greeting: Option<String>,
    prompt: Option<String>,
    farewell: Option<String>,
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    exit_words: Vec<String>,
    #[serde(default)]
    remove_exit_words: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct JobsOverlay {
    exec_failure_status: Option<i32>,
    redirect_mode: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct LoggingOverlay {
    terminal_level: Option<String>,
    file_level: Option<String>,
    file: Option<String>,
}

// ── Merge logic ──

/// Merge a user list into a default list.
/// In replace mode: user list replaces default entirely.
/// In merge mode: remove items first, then extend with additions (deduped).
fn merge_list(base: &mut Vec<String>, add: Vec<String>, remove: &[String], replace: bool) {
    if replace {
        *base = add;
    } else {
        base.retain(|item| !remove.contains(item));
        for item in add {
            if !base.contains(&item) {
                base.push(item);
            }
        }
    }
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Load configuration with resolution order:
    /// 1. Start with embedded defaults
    /// 2. Merge user overlay from ~/.config/condsh/config.toml (if exists)
    ///
    /// A broken user overlay is reported and skipped.
    pub fn load() -> Self {
        let mut config = Self::default_config();
        if let Some(overlay) = Self::load_user_overlay() {
            config.apply_overlay(overlay);
        }
        config
    }

    /// Load defaults plus an explicitly named overlay file, which must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let overlay = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::default_config();
        config.apply_overlay(overlay);
        Ok(config)
    }

    fn load_user_overlay() -> Option<ConfigOverlay> {
        let home = std::env::var_os("HOME")?;
        let path = Path::new(&home).join(USER_CONFIG);
        let content = std::fs::read_to_string(&path).ok()?;
        match toml::from_str(&content) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                eprintln!("condsh: config parse error in {}: {e}", path.display());
                None
            }
        }
    }

    /// Apply an overlay on top of this config (merge semantics).
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        let s = overlay.shell;
        if let Some(v) = s.greeting {
            self.shell.greeting = v;
        }
        if let Some(v) = s.prompt {
            self.shell.prompt = v;
        }
        if let Some(v) = s.farewell {
            self.shell.farewell = v;
        }
        merge_list(
            &mut self.shell.exit_words,
            s.exit_words,
            &s.remove_exit_words,
            s.replace,
        );

        if let Some(v) = overlay.jobs.exec_failure_status {
            self.jobs.exec_failure_status = v;
        }
        if let Some(v) = overlay.jobs.redirect_mode {
            self.jobs.redirect_mode = v;
        }

        let l = overlay.logging;
        if let Some(v) = l.terminal_level {
            self.logging.terminal_level = v;
        }
        if let Some(v) = l.file_level {
            self.logging.file_level = v;
        }
        if let Some(v) = l.file {
            self.logging.file = v;
        }
    }

    /// Whether `word` ends the session when it starts a line.
    pub fn is_exit_word(&self, word: &str) -> bool {
        self.shell.exit_words.iter().any(|w| w == word)
    }

    /// Apply an overlay from a TOML string. Used for testing.
    #[cfg(test)]
    fn apply_overlay_str(&mut self, toml_str: &str) {
        let overlay: ConfigOverlay = toml::from_str(toml_str).unwrap();
        self.apply_overlay(overlay);
    }
}
