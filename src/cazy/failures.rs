//! Operator-facing failure channels.
//!
//! Connection, persistence and format failures each get their own channel so
//! remote outages, local storage problems and layout drift can be told apart.
//! Every line is emitted as a `warn!` event under the channel's target;
//! [`channel_layers`] routes each target to its own file.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use chrono::{DateTime, Local};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};
use thiserror::Error;
use tracing::{warn, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, Layer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Channel {
    Connection,
    Persistence,
    Format,
}

impl Channel {
    pub fn target(&self) -> &'static str {
        match self {
            Channel::Connection => "cazy::connection",
            Channel::Persistence => "cazy::persistence",
            Channel::Format => "cazy::format",
        }
    }

    pub fn file_name(&self, started: &DateTime<Local>) -> String {
        let stem = match self {
            Channel::Connection => "cazy_connection_failures",
            Channel::Persistence => "cazy_sql_errors",
            Channel::Format => "cazy_format_errors",
        };
        format!("{}_{}.log", stem, started.format("%Y-%m-%d--%H-%M-%S"))
    }
}

#[derive(Error, Debug)]
pub enum ChannelLogError {
    #[error("Cannot create failure log directory: {0}")]
    Directory(#[from] io::Error),

    #[error("Cannot open failure log file: {0}")]
    Appender(#[from] InitError),
}

pub type ChannelLayers<S> = (Vec<Box<dyn Layer<S> + Send + Sync>>, Vec<WorkerGuard>);

/// One file layer per channel under `dir`, each accepting only its channel's
/// target. The guards flush the files when dropped.
pub fn channel_layers<S>(dir: &Path, started: &DateTime<Local>) -> Result<ChannelLayers<S>, ChannelLogError>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    std::fs::create_dir_all(dir)?;

    let mut layers = Vec::new();
    let mut guards = Vec::new();
    for channel in Channel::iter() {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(channel.file_name(started))
            .build(dir)?;
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(false)
            .with_level(false)
            .without_time()
            .with_filter(Targets::new().with_target(channel.target(), Level::WARN))
            .boxed();
        layers.push(layer);
        guards.push(guard);
    }
    Ok((layers, guards))
}

/// Lines recorded per channel during a run.
#[derive(Debug, Default)]
pub struct FailureLog {
    lines: HashMap<Channel, Vec<String>>,
}

impl FailureLog {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn record(&mut self, channel: Channel, message: impl Into<String>) {
        let message = message.into();

        match channel {
            Channel::Connection => warn!(target: "cazy::connection", "{}", message),
            Channel::Persistence => warn!(target: "cazy::persistence", "{}", message),
            Channel::Format => warn!(target: "cazy::format", "{}", message),
        }

        self.lines.entry(channel).or_default().push(message);
    }

    pub fn connection(&mut self, message: impl Into<String>) {
        self.record(Channel::Connection, message)
    }

    pub fn persistence(&mut self, message: impl Into<String>) {
        self.record(Channel::Persistence, message)
    }

    pub fn format(&mut self, message: impl Into<String>) {
        self.record(Channel::Format, message)
    }

    pub fn lines(&self, channel: Channel) -> &[String] {
        self.lines.get(&channel).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn count(&self, channel: Channel) -> usize {
        self.lines(channel).len()
    }
}
