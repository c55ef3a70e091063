//! Logging setup for the bridge daemon.
//!
//! The daemon calls [`init_journald_or_stdout`] once at startup. Everything
//! else does `use crate::tracing::prelude::*` for the level macros.

use std::env;
use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

const SYSLOG_IDENTIFIER: &str = "mutebridged";

/// Install the global subscriber.
///
/// Under systemd (`JOURNAL_STREAM` set) events go to journald, tagged with
/// the daemon name. Otherwise they go to stdout.
pub fn init_journald_or_stdout() {
    if env::var("JOURNAL_STREAM").is_ok() {
        match tracing_journald::layer() {
            Ok(layer) => {
                let layer = layer.with_syslog_identifier(SYSLOG_IDENTIFIER.to_string());
                tracing_subscriber::registry()
                    .with(env_filter())
                    .with(layer)
                    .init();
            }
            Err(e) => {
                use_stdout();
                error!(error = %e, "Failed to initialize journald logging, using stdout.");
            }
        }
    } else {
        use_stdout();
    }
}

// RUST_LOG wins; without it we log at INFO.
fn env_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy()
}

fn use_stdout() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_timer(LocalTimer),
        )
        .init();
}

// Local wall-clock time to the second. Serial chatter is slow enough that
// sub-second stamps are noise.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let stamp = now
            .format(time::macros::format_description!("[hour]:[minute]:[second]"))
            .map_err(|_| std::fmt::Error)?;
        write!(w, "{stamp}")
    }
}
