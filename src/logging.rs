//! Structured logging to stderr.
//!
//! `RUST_LOG` takes precedence over `[logging] level`:
//!
//! ```bash
//! RUST_LOG=ingest_files=debug ingest-files serve
//! ```

use std::sync::Once;

use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// HH:MM:SS.mmm in local time.
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Install the global subscriber. Only the first call has any effect.
pub fn init(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info")),
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_timer(CompactTime)
            .with_filter(filter);

        // A subscriber installed elsewhere (e.g. by a test harness) wins.
        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}
