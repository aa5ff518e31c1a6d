//! Subscriber settings
//!
//! A [`LogConfig`] is plain data: it can be built in code, loaded from JSON,
//! or taken from one of the presets and adjusted with the `with_*` setters.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Targets the protocol crates log under
pub const PROTOCOL_TARGETS: [&str; 4] = [
    "payroute_ledger",
    "payroute_routing",
    "payroute_payment",
    "payroute_node",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Level for every target without its own directive. `RUST_LOG` wins
    /// over the whole filter when it is set.
    pub default_level: String,
    pub console: ConsoleConfig,
    /// JSONL file sink; `None` disables it
    pub file: Option<FileConfig>,
    /// Shape of JSONL records on any sink that writes them
    pub jsonl: JsonlConfig,
    /// Per-target levels, keyed by target
    pub targets: BTreeMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".into(),
            console: ConsoleConfig::default(),
            file: None,
            jsonl: JsonlConfig::default(),
            targets: BTreeMap::new(),
        }
    }
}

impl LogConfig {
    /// Pretty colored console at `debug`
    pub fn development() -> Self {
        Self {
            default_level: "debug".into(),
            console: ConsoleConfig::pretty(),
            ..Self::default()
        }
    }

    /// Daily-rotated JSONL under `log_dir` and nothing on the console
    pub fn production(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            console: ConsoleConfig::disabled(),
            file: Some(FileConfig::daily(log_dir).keep(30)),
            ..Self::default()
        }
    }

    /// Compact uncolored console at `warn`, so test output stays readable
    pub fn testing() -> Self {
        Self {
            default_level: "warn".into(),
            console: ConsoleConfig {
                enabled: true,
                format: ConsoleFormat::Compact,
                ansi: false,
            },
            ..Self::default()
        }
    }

    /// One simulator run: pretty console plus a single `<name>.jsonl` with
    /// every protocol crate at `debug`
    pub fn simulation(run_dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        let mut config = Self {
            console: ConsoleConfig::pretty(),
            file: Some(FileConfig::single(run_dir, name)),
            ..Self::default()
        };
        for target in PROTOCOL_TARGETS {
            config.targets.insert(target.into(), "debug".into());
        }
        config
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.targets.insert(target.into(), level.into());
        self
    }

    pub fn with_console_format(mut self, format: ConsoleFormat) -> Self {
        self.console.format = format;
        self
    }

    pub fn with_file(mut self, file: FileConfig) -> Self {
        self.file = Some(file);
        self
    }

    /// `EnvFilter` directives: the default level first, then one
    /// `target=level` per override
    pub fn filter_directives(&self) -> String {
        self.targets
            .iter()
            .fold(self.default_level.clone(), |mut acc, (target, level)| {
                acc.push(',');
                acc.push_str(target);
                acc.push('=');
                acc.push_str(level);
                acc
            })
    }
}

/// How console lines are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleFormat {
    /// Multi-line, with span context under each event
    Pretty,
    /// One line per event
    Compact,
    /// Machine-readable, same records as the file sink
    #[default]
    Jsonl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: ConsoleFormat,
    pub ansi: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: ConsoleFormat::Jsonl,
            ansi: false,
        }
    }
}

impl ConsoleConfig {
    pub fn pretty() -> Self {
        Self {
            enabled: true,
            format: ConsoleFormat::Pretty,
            ansi: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether this sink writes JSONL records
    pub fn is_jsonl(&self) -> bool {
        self.format == ConsoleFormat::Jsonl
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub directory: PathBuf,
    /// File name stem; rotated files get a date suffix
    pub prefix: String,
    pub rotation: RotationStrategy,
    /// Rotated files to keep; `None` keeps all
    pub max_files: Option<usize>,
}

impl FileConfig {
    pub fn daily(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            prefix: "payroute".into(),
            rotation: RotationStrategy::Daily,
            max_files: Some(7),
        }
    }

    /// A single `<prefix>.jsonl`, truncated when opened
    pub fn single(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
            rotation: RotationStrategy::Never,
            max_files: None,
        }
    }

    pub fn keep(mut self, max_files: usize) -> Self {
        self.max_files = Some(max_files);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// Which parts of an event end up in a JSONL record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonlConfig {
    /// Event fields at the top level of the record
    pub flatten_events: bool,
    /// The full span stack, outermost first
    pub span_list: bool,
    /// The innermost span (the `node` or `payment` span, usually)
    pub current_span: bool,
    /// Source file and line
    pub source_location: bool,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            flatten_events: true,
            span_list: true,
            current_span: true,
            source_location: false,
        }
    }
}
