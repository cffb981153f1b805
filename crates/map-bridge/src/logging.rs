/*!
Logging setup for the replay tool.

Log lines go to stderr so that stdout only carries replay records. `RUST_LOG` wins when set;
otherwise debug builds log the bridge at `debug` and release builds at `info`.

With the `profiling` feature, `profiling::scope!` blocks in the library are emitted as tracing
spans and show up in the same output.
*/

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

fn default_directives() -> &'static str {
    if cfg!(debug_assertions) {
        "info,map_bridge_lib=debug,map_bridge=debug"
    } else {
        "info"
    }
}

/// Build the filter from `RUST_LOG`, falling back to the defaults above
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives()))
}

/// Install the global subscriber; later calls are ignored
pub fn setup_logging() {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter());
    if tracing_subscriber::registry().with(fmt_layer).try_init().is_err() {
        return;
    }

    #[cfg(feature = "profiling")]
    tracing::info!("Logging initialized with profiling scopes as spans");
    #[cfg(not(feature = "profiling"))]
    tracing::debug!("Logging initialized (profiling disabled in this build)");
}
