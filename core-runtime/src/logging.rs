//! # Catalog Logging
//!
//! Installs the process-wide `tracing` subscriber for the catalog core.
//!
//! One fmt layer writes to stdout in the selected [`LogFormat`]. A second
//! layer mirrors every event that passes the filter into the host's
//! [`LoggerSink`], so mobile and desktop shells see the same lines in their
//! native log pipeline.
//!
//! ```ignore
//! use bridge_traits::log::LogLevel;
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//!
//! init_logging(
//!     LoggingConfig::default()
//!         .with_format(LogFormat::Compact)
//!         .with_directive("core_catalog::controller", LogLevel::Trace),
//! )?;
//! ```
//!
//! Field values that identify a user must pass through
//! [`redact_if_sensitive`] before they reach a log macro.

use crate::error::{Error, Result};

use bridge_traits::log::{LogEntry, LogLevel, LoggerSink};

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::format::FmtSpan,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer,
};

/// Crates whose level follows [`LoggingConfig::level`]. Everything else
/// logs at `warn`.
const WORKSPACE_TARGETS: &[&str] = &[
    "catalog_workspace",
    "core_catalog",
    "core_runtime",
    "bridge_traits",
];

/// Stdout rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, colored, for terminals
    Pretty,
    /// One JSON object per line
    Json,
    /// One plain line per event
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(Error::Config(format!("Unknown log format '{}'", other))),
        }
    }
}

#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level applied to [`WORKSPACE_TARGETS`]
    pub level: LogLevel,
    /// Extra `target=level` directives layered over the defaults
    pub directives: Vec<String>,
    /// Replaces the generated filter entirely when set
    pub filter: Option<String>,
    pub sink: Option<Arc<dyn LoggerSink>>,
    /// Log span open/close (pretty format only)
    pub span_events: bool,
    pub show_target: bool,
    pub show_threads: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            directives: Vec::new(),
            filter: None,
            sink: None,
            span_events: false,
            show_target: true,
            show_threads: false,
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("directives", &self.directives)
            .field("filter", &self.filter)
            .field("sink", &self.sink.is_some())
            .field("span_events", &self.span_events)
            .field("show_target", &self.show_target)
            .field("show_threads", &self.show_threads)
            .finish()
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Override one target's level, e.g. `core_catalog::source` at trace.
    pub fn with_directive(mut self, target: impl AsRef<str>, level: LogLevel) -> Self {
        self.directives
            .push(format!("{}={}", target.as_ref(), level.as_str()));
        self
    }

    /// Use `filter` verbatim as the `EnvFilter` directive string.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn with_threads(mut self, show: bool) -> Self {
        self.show_threads = show;
        self
    }

    fn directive_string(&self) -> String {
        if let Some(filter) = &self.filter {
            return filter.clone();
        }

        let level = self.level.as_str();
        std::iter::once("warn".to_string())
            .chain(
                WORKSPACE_TARGETS
                    .iter()
                    .map(|target| format!("{}={}", target, level)),
            )
            .chain(self.directives.iter().cloned())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Install the global subscriber.
///
/// Fails with `Error::Config` on a malformed filter, or when a subscriber
/// was already installed in this process.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer(&config))
        .with(SinkForwarder {
            sink: config.sink.clone(),
        })
        .try_init()
        .map_err(|e| Error::Config(format!("Logging already initialized: {}", e)))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directives = config.directive_string();
    EnvFilter::try_new(&directives)
        .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directives, e)))
}

fn stdout_layer<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let base = tracing_subscriber::fmt::layer()
        .with_target(config.show_target)
        .with_thread_ids(config.show_threads)
        .with_thread_names(config.show_threads)
        .with_writer(io::stdout);

    match config.format {
        LogFormat::Pretty => {
            let spans = if config.span_events {
                FmtSpan::ACTIVE
            } else {
                FmtSpan::NONE
            };
            base.pretty().with_span_events(spans).boxed()
        }
        LogFormat::Json => base
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Compact => base.compact().boxed(),
    }
}

/// Mirrors filtered events into a [`LoggerSink`].
struct SinkForwarder {
    sink: Option<Arc<dyn LoggerSink>>,
}

impl<S> Layer<S> for SinkForwarder
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(sink) = &self.sink else {
            return;
        };

        let metadata = event.metadata();
        let level = sink_level(metadata.level());
        if level < sink.min_level() {
            return;
        }

        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let message = fields
            .message
            .take()
            .unwrap_or_else(|| metadata.name().to_string());
        let mut entry = LogEntry::new(level, metadata.target(), message);
        entry.fields = fields.values;
        if let Some(span) = ctx.event_span(event) {
            entry = entry.with_span(span.name());
        }

        // A failing sink must not take logging down with it
        if let Err(err) = sink.log(entry) {
            eprintln!("log sink rejected entry: {}", err);
        }
    }
}

/// Collects event fields as strings. Numeric and bool fields reach
/// `record_debug` through the default `Visit` methods.
#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    values: BTreeMap<String, String>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name => {
                self.values.insert(name.to_owned(), value);
            }
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{:?}", value));
    }
}

fn sink_level(level: &Level) -> LogLevel {
    if *level == Level::ERROR {
        LogLevel::Error
    } else if *level == Level::WARN {
        LogLevel::Warn
    } else if *level == Level::INFO {
        LogLevel::Info
    } else if *level == Level::DEBUG {
        LogLevel::Debug
    } else {
        LogLevel::Trace
    }
}

/// How a log field must be treated before it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensitivity {
    /// Credentials; never logged
    Secret,
    /// User identifiers; logged as a short prefix
    Identifier,
    Plain,
}

const SECRET_MARKERS: &[&str] = &["token", "password", "secret", "api_key", "apikey", "authorization"];
const IDENTIFIER_MARKERS: &[&str] = &["user_id", "scope", "email"];
const IDENTIFIER_PREFIX: usize = 4;

/// Classify a field by substring match on its lower-cased name.
pub fn classify_field(field_name: &str) -> Sensitivity {
    let name = field_name.to_ascii_lowercase();
    let contains_any = |markers: &[&str]| markers.iter().any(|marker| name.contains(marker));

    if contains_any(SECRET_MARKERS) {
        Sensitivity::Secret
    } else if contains_any(IDENTIFIER_MARKERS) {
        Sensitivity::Identifier
    } else {
        Sensitivity::Plain
    }
}

/// Value of `field_name` as it may appear in a log line.
///
/// ```
/// use core_runtime::logging::redact_if_sensitive;
///
/// assert_eq!(redact_if_sensitive("api_key", "abc"), "[REDACTED]");
/// assert_eq!(redact_if_sensitive("user_id", "5f1c9a2e-77"), "5f1c***");
/// assert_eq!(redact_if_sensitive("offset", "40"), "40");
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    match classify_field(field_name) {
        Sensitivity::Secret => "[REDACTED]".to_owned(),
        Sensitivity::Identifier => {
            let mut shown: String = value.chars().take(IDENTIFIER_PREFIX).collect();
            shown.push_str("***");
            shown
        }
        Sensitivity::Plain => value.to_owned(),
    }
}
