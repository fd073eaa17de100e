use std::sync::Once;

use tracing_subscriber::{prelude::*, EnvFilter};

/// Initialize tracing, honoring `RUST_LOG`.
///
/// Will only initialize once, so tests may call this.
pub fn init() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(filter))
            .init();
    });
}
