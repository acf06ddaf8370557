use std::fs::OpenOptions;
use std::path::PathBuf;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};

use crate::config::LoggingConfig;

/// Parse a level name from config, falling back to `default` on anything unknown.
pub fn level_from_str(name: &str, default: LevelFilter) -> LevelFilter {
    name.trim().parse().unwrap_or(default)
}

/// Expand `~` in the configured log path. Empty means no file log.
pub fn log_file_path(config: &LoggingConfig) -> Option<PathBuf> {
    if config.file.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(shellexpand::tilde(config.file.trim()).into_owned()))
}

/// Install the global logger: warnings and errors on stderr, plus an
/// append-only file log when the file can be opened.
///
/// Best-effort: any failure leaves the shell running with whatever
/// logging could be set up.
pub fn init(config: &LoggingConfig, with_file: bool) {
    let term_config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .build();
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level_from_str(&config.terminal_level, LevelFilter::Warn),
        term_config,
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    if with_file && let Some(path) = log_file_path(config) {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        if let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) {
            loggers.push(WriteLogger::new(
                level_from_str(&config.file_level, LevelFilter::Info),
                simplelog::Config::default(),
                file,
            ));
        }
    }

    let _ = CombinedLogger::init(loggers);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_levels() {
        assert_eq!(level_from_str("debug", LevelFilter::Warn), LevelFilter::Debug);
        assert_eq!(level_from_str("OFF", LevelFilter::Warn), LevelFilter::Off);
        assert_eq!(level_from_str(" info ", LevelFilter::Warn), LevelFilter::Info);
    }

    #[test]
    fn unknown_level_falls_back() {
        assert_eq!(level_from_str("loud", LevelFilter::Warn), LevelFilter::Warn);
        assert_eq!(level_from_str("", LevelFilter::Info), LevelFilter::Info);
    }

    #[test]
    fn empty_path_disables_file() {
        let config = LoggingConfig::default();
        assert_eq!(log_file_path(&config), None);
    }

    #[test]
    fn tilde_expanded() {
        let config = LoggingConfig {
            file: "~/condsh.log".into(),
            ..Default::default()
        };
        let path = log_file_path(&config).unwrap();
        assert!(!path.to_string_lossy().starts_with('~') || std::env::var_os("HOME").is_none());
        assert!(path.ends_with("condsh.log"));
    }
}
