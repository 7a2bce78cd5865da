//! Tracing setup for the harness-agent binary.
//!
//! [`subscriber`] builds the layered subscriber; [`init_tracing`] installs it
//! globally. Installation happens at most once per process, so later calls
//! are no-ops.

use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Shape of emitted log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    /// Newline-delimited JSON objects.
    Json,
}

impl LogFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Build a subscriber writing to `writer`.
///
/// `RUST_LOG` wins over `level` when set.
pub fn subscriber<W>(format: LogFormat, level: Level, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let layer = fmt::layer().with_target(false).with_writer(writer);

    match format {
        LogFormat::Text => Box::new(tracing_subscriber::registry().with(filter).with(layer)),
        LogFormat::Json => Box::new(
            tracing_subscriber::registry()
                .with(filter)
                .with(layer.json()),
        ),
    }
}

/// Install the global subscriber. The CLI passes `std::io::stderr` so stdout
/// stays free for run output and reports.
pub fn init_tracing<W>(format: LogFormat, level: Level, writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing::subscriber::set_global_default(subscriber(format, level, writer)).ok();
}
