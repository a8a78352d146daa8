//! Logging bootstrap for embedding applications.

use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber.
///
/// Honors `RUST_LOG` when set; otherwise defaults to debug output for the
/// Symposium crates and warnings for everything else.  Safe to call more
/// than once (subsequent calls are no-ops), so tests can call it freely.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("symposium_chat=debug,symposium_collab=debug,symposium_store=info,warn")
    });

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok();
    if installed {
        debug!("Tracing subscriber installed");
    }
}
