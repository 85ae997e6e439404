//! Tracing initialization. No OTEL branch here — that stack isn't part of
//! this workspace, so `RUST_LOG` is the only knob, defaulting to `info`.

use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
