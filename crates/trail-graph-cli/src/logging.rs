/*!
Logging and profiling setup for the command line front end.

- always: a `fmt` layer filtered by `RUST_LOG` (defaulting to `info`).
- `feature = "profiling"`: additionally a `tracing-chrome` layer that writes a
  Chrome/Perfetto trace file, flushed when the returned guard is dropped.
*/

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Keeps the profiling output alive until dropped at the end of `main`
pub struct LoggingGuard {
    #[cfg(feature = "profiling")]
    _chrome: tracing_chrome::FlushGuard,
}

fn set_default_filter() {
    if std::env::var("RUST_LOG").is_err() {
        // Safety: single-threaded at startup
        unsafe {
            if cfg!(debug_assertions) {
                std::env::set_var("RUST_LOG", "info,trail_graph_lib=debug");
            } else {
                std::env::set_var("RUST_LOG", "info");
            }
        }
    }
}

#[cfg(feature = "profiling")]
pub fn setup_logging_and_profiling() -> LoggingGuard {
    set_default_filter();

    let fmt_layer = fmt::layer().with_filter(EnvFilter::from_default_env());
    let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new().build();
    tracing_subscriber::registry().with(chrome_layer).with(fmt_layer).init();

    tracing::info!("Tracing initialized with chrome profiling layer");
    LoggingGuard { _chrome: guard }
}

#[cfg(not(feature = "profiling"))]
pub fn setup_logging_and_profiling() -> LoggingGuard {
    set_default_filter();

    let fmt_layer = fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(fmt_layer).init();

    tracing::debug!("Logging initialized (profiling disabled in this build)");
    LoggingGuard {}
}
