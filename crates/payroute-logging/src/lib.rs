//! Structured logging for payroute nodes and simulations
//!
//! Every engine in the workspace logs through `tracing`. This crate wires up
//! the subscriber:
//!
//! - **JSONL output** to the console (default) or to rotating files
//! - **Node context**: [`NodeContextGuard`] tags every event with the node
//!   that emitted it, which matters when dozens of simulated nodes share a
//!   thread
//! - **Payment correlation**: [`PaymentTrace`] links one payment's log lines
//!   across the nodes on its path
//! - **Capture**: [`LogCapture`] buffers events in memory for tests and
//!   scenario reports
//!
//! # Quick Start
//!
//! ```ignore
//! use payroute_logging::{LogConfig, PayrouteSubscriberBuilder};
//!
//! // JSONL to stdout at `info`
//! PayrouteSubscriberBuilder::new().init()?;
//!
//! // Human-readable, with route discovery at `trace`
//! let _guard = PayrouteSubscriberBuilder::new()
//!     .with_config(LogConfig::development().with_target("payroute_routing", "trace"))
//!     .init()?;
//! ```

pub mod config;
pub mod context;
pub mod correlation;
pub mod layers;

pub use config::{
    ConsoleConfig, ConsoleFormat, FileConfig, JsonlConfig, LogConfig, PROTOCOL_TARGETS,
    RotationStrategy,
};
pub use context::{NodeContextData, NodeContextGuard};
pub use correlation::{PaymentTrace, fields};
pub use layers::{CaptureLayer, CapturedEvent, LogCapture, jsonl_layer};

use std::fs::{self, File};

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid filter directive: {0}")]
    Filter(#[from] ParseError),

    #[error("log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("rolling appender: {0}")]
    Appender(#[from] InitError),

    #[error("global subscriber already set: {0}")]
    AlreadySet(#[from] TryInitError),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Builder for configuring and installing the global subscriber
pub struct PayrouteSubscriberBuilder {
    config: LogConfig,
    capture: Option<LogCapture>,
}

impl PayrouteSubscriberBuilder {
    /// JSONL console output at `info`
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
            capture: None,
        }
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Also append every event to `capture`
    pub fn with_capture(mut self, capture: LogCapture) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Install as the global default
    ///
    /// The returned guard flushes file output on drop; keep it alive for
    /// the life of the program.
    pub fn init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(self.config.filter_directives())?,
        };

        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        let console = &self.config.console;
        if console.enabled {
            let layer: BoxedLayer = match console.format {
                ConsoleFormat::Pretty => tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_ansi(console.ansi)
                    .boxed(),
                ConsoleFormat::Compact => tracing_subscriber::fmt::layer()
                    .compact()
                    .with_ansi(console.ansi)
                    .boxed(),
                ConsoleFormat::Jsonl => jsonl_layer(std::io::stdout, &self.config.jsonl).boxed(),
            };
            layers.push(layer);
        }

        if let Some(file_config) = &self.config.file {
            let (writer, worker) = file_writer(file_config)?;
            layers.push(jsonl_layer(writer, &self.config.jsonl).boxed());
            guard = Some(worker);
        }

        if let Some(capture) = &self.capture {
            layers.push(capture.layer().boxed());
        }

        Registry::default().with(layers).with(filter).try_init()?;
        Ok(guard)
    }
}

impl Default for PayrouteSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-blocking writer for `config`; `Never` truncates a single file
fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let rotation = match config.rotation {
        RotationStrategy::Never => {
            fs::create_dir_all(&config.directory)?;
            let path = config.directory.join(format!("{}.jsonl", config.prefix));
            return Ok(tracing_appender::non_blocking(File::create(path)?));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(config.prefix.as_str())
        .filename_suffix("jsonl");
    if let Some(max) = config.max_files {
        builder = builder.max_log_files(max);
    }
    let appender = builder.build(&config.directory)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// JSONL to the console at `info`
pub fn init_default() -> Result<(), LoggingError> {
    PayrouteSubscriberBuilder::new().init().map(|_| ())
}

/// Pretty colored console output at `debug`
pub fn init_development() -> Result<(), LoggingError> {
    PayrouteSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
        .map(|_| ())
}

/// Warnings only; a no-op when a subscriber is already installed, so every
/// test may call it
pub fn init_testing() {
    let _ = PayrouteSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_to_jsonl() {
        let builder = PayrouteSubscriberBuilder::new();
        assert_eq!(builder.config().default_level, "info");
        assert!(builder.config().console.is_jsonl());
        assert!(builder.capture.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let builder = PayrouteSubscriberBuilder::new()
            .with_config(LogConfig::development())
            .with_level("trace")
            .with_console(false)
            .with_capture(LogCapture::new());
        assert_eq!(builder.config().default_level, "trace");
        assert!(!builder.config().console.enabled);
        assert!(builder.capture.is_some());
    }

    #[test]
    fn test_single_file_writer_creates_file() {
        let dir = std::env::temp_dir().join(format!("payroute-log-{}", uuid::Uuid::new_v4()));
        let config = FileConfig::single(dir.clone(), "run");
        let (_writer, _guard) = file_writer(&config).unwrap();
        assert!(dir.join("run.jsonl").exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_init_testing_is_idempotent() {
        init_testing();
        init_testing();
    }
}
