use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{warn, Level};
use tracing_subscriber::EnvFilter;

/// Structured logging. `RUST_LOG` narrows or widens the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());
    // a second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Install the global metrics recorder. The handle renders `/metrics`; no listener is started.
pub fn install_prometheus() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!(error = %err, "failed to install prometheus recorder");
            None
        }
    }
}
