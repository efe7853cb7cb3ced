// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, fmt::writer::BoxMakeWriter, layer::SubscriberExt,
};

#[derive(Debug, Deserialize, Clone)]
struct LoggerFile {
    logger: LogSettings,
}

#[derive(Debug, Deserialize, Clone)]
struct LogSettings {
    #[serde(default = "default_level")]
    level: String,
    #[serde(default)]
    sink: LogSink,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            sink: LogSink::default(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

/// Where log lines end up. The default sink is a plain `server.log` next to
/// the working directory.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "lowercase", tag = "kind")]
enum LogSink {
    Stdout,
    Stderr,
    File {
        path: PathBuf,
        #[serde(default)]
        roll: RollPeriod,
    },
}

impl Default for LogSink {
    fn default() -> Self {
        Self::File {
            path: PathBuf::from("server.log"),
            roll: RollPeriod::Never,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
enum RollPeriod {
    Minutely,
    Hourly,
    Daily,
    #[default]
    Never,
}

impl RollPeriod {
    fn rotation(self) -> Rotation {
        match self {
            Self::Minutely => Rotation::MINUTELY,
            Self::Hourly => Rotation::HOURLY,
            Self::Daily => Rotation::DAILY,
            Self::Never => Rotation::NEVER,
        }
    }
}

impl LogSink {
    /// Wraps the sink in a non-blocking writer. The guard flushes buffered
    /// lines on drop and must outlive the process' logging.
    fn non_blocking(&self) -> (BoxMakeWriter, WorkerGuard) {
        match self {
            Self::Stdout => {
                let (writer, guard) = tracing_appender::non_blocking(io::stdout());
                (BoxMakeWriter::new(writer), guard)
            },
            Self::Stderr => {
                let (writer, guard) = tracing_appender::non_blocking(io::stderr());
                (BoxMakeWriter::new(writer), guard)
            },
            Self::File { path, roll } => {
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                let name = path
                    .file_name()
                    .map(ToOwned::to_owned)
                    .unwrap_or_else(|| "server.log".into());
                let appender = RollingFileAppender::new(roll.rotation(), dir, name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                (BoxMakeWriter::new(writer), guard)
            },
        }
    }
}

/// Installs the global subscriber. Without a config file the server logs at
/// info level into `server.log`. `RUST_LOG` wins over the configured level.
pub fn init_logger(config_path: Option<&Path>) -> Result<WorkerGuard> {
    let settings = match config_path {
        Some(path) => read_settings(path)?,
        None => LogSettings::default(),
    };

    let (writer, guard) = settings.sink.non_blocking();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .context("no usable log filter in env or config")?;

    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true),
    );
    tracing::subscriber::set_global_default(subscriber)
        .context("a global subscriber is already installed")?;

    Ok(guard)
}

fn read_settings(path: &Path) -> Result<LogSettings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("cannot read logger config {}", path.display()))?;
    let file: LoggerFile = serde_yaml::from_str(&raw)
        .with_context(|| format!("cannot parse logger config {}", path.display()))?;
    Ok(file.logger)
}
