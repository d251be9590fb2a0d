//! Log destination and subscriber setup.
//!
//! Resolved once at startup and immutable thereafter. Files are opened in
//! append mode and shared across all concurrent callers; an unusable
//! path (a directory, a permission failure) produces one warning on the
//! default stream and a fallback to that stream rather than a crash.

use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

#[derive(Debug, PartialEq, Eq)]
pub enum LogDestination {
    DefaultStream,
    File(PathBuf),
}

pub struct ResolvedLogging {
    pub destination: LogDestination,
    /// Set when a configured file could not be used.
    pub fallback_warning: Option<String>,
}

pub fn resolve_destination(config: &LoggingConfig) -> ResolvedLogging {
    let Some(path) = &config.file else {
        return ResolvedLogging {
            destination: LogDestination::DefaultStream,
            fallback_warning: None,
        };
    };

    if path.is_dir() {
        return ResolvedLogging {
            destination: LogDestination::DefaultStream,
            fallback_warning: Some(format!(
                "log file '{}' is a directory; logging to default stream",
                path.display()
            )),
        };
    }

    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(_) => ResolvedLogging {
            destination: LogDestination::File(path.clone()),
            fallback_warning: None,
        },
        Err(e) => ResolvedLogging {
            destination: LogDestination::DefaultStream,
            fallback_warning: Some(format!(
                "cannot open log file '{}': {e}; logging to default stream",
                path.display()
            )),
        },
    }
}

/// Installs the global subscriber from the startup configuration.
///
/// Returns the appender guard when writing to a file; dropping it
/// flushes buffered records. Safe to call when a subscriber is already
/// installed (tests), in which case the existing one is kept.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let resolved = resolve_destination(config);
    let filter = EnvFilter::try_new(&config.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file = match &resolved.destination {
        LogDestination::File(path) => OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok(),
        LogDestination::DefaultStream => None,
    };

    let guard = match file {
        Some(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            match config.format {
                LogFormat::Json => {
                    let _ = tracing_subscriber::fmt()
                        .json()
                        .with_env_filter(filter)
                        .with_writer(writer)
                        .try_init();
                }
                LogFormat::Text => {
                    let _ = tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_writer(writer)
                        .with_ansi(false)
                        .try_init();
                }
            }
            Some(guard)
        }
        None => {
            match config.format {
                LogFormat::Json => {
                    let _ = tracing_subscriber::fmt()
                        .json()
                        .with_env_filter(filter)
                        .with_writer(std::io::stderr)
                        .try_init();
                }
                LogFormat::Text => {
                    let _ = tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_writer(std::io::stderr)
                        .try_init();
                }
            }
            None
        }
    };

    if let Some(message) = resolved.fallback_warning {
        warn!("{message}");
    } else if matches!(resolved.destination, LogDestination::File(_)) && guard.is_none() {
        warn!("log file became unopenable; logging to default stream");
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn no_file_means_default_stream() {
        let resolved = resolve_destination(&LoggingConfig::default());
        assert_eq!(resolved.destination, LogDestination::DefaultStream);
        assert!(resolved.fallback_warning.is_none());
    }

    #[test]
    fn directory_path_falls_back_with_warning() {
        let dir = TempDir::new().unwrap();
        let config = LoggingConfig {
            file: Some(dir.path().to_path_buf()),
            ..LoggingConfig::default()
        };
        let resolved = resolve_destination(&config);
        assert_eq!(resolved.destination, LogDestination::DefaultStream);
        let warning = resolved.fallback_warning.expect("warning");
        assert!(warning.contains("directory"));
    }

    #[test]
    fn writable_file_is_used() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plugin.log");
        let config = LoggingConfig {
            file: Some(path.clone()),
            ..LoggingConfig::default()
        };
        let resolved = resolve_destination(&config);
        assert_eq!(resolved.destination, LogDestination::File(path));
        assert!(resolved.fallback_warning.is_none());
    }

    #[test]
    fn unwritable_path_falls_back_with_warning() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-parent").join("plugin.log");
        let config = LoggingConfig {
            file: Some(path),
            ..LoggingConfig::default()
        };
        let resolved = resolve_destination(&config);
        assert_eq!(resolved.destination, LogDestination::DefaultStream);
        assert!(resolved.fallback_warning.is_some());
    }
}
