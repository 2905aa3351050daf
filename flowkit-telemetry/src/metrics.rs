use std::sync::{Mutex, PoisonError};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

// Global cache for the Prometheus handle used by [`init_metrics_handle`].
//
// A [`Mutex`] is used instead of [`std::sync::OnceLock`] because the initialization code is
// fallible and `OnceLock::get_or_try_init` is unstable.
//
// [`PrometheusBuilder::install_recorder`] installs a global metrics recorder and any later call
// fails, so every caller after the first one receives a clone of the cached handle.
static PROMETHEUS_HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

/// Installs the process-wide Prometheus recorder once and returns a handle for rendering.
///
/// No HTTP listener is started; callers render the exposition text themselves with
/// [`PrometheusHandle::render`].
pub fn init_metrics_handle() -> Result<PrometheusHandle, BuildError> {
    let mut prometheus_handle = PROMETHEUS_HANDLE
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    if let Some(handle) = &*prometheus_handle {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    *prometheus_handle = Some(handle.clone());

    debug!("prometheus recorder installed");

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_returns_the_same_recorder() {
        let first = init_metrics_handle().unwrap();
        let second = init_metrics_handle().unwrap();

        metrics::counter!("flowkit_telemetry_test_total").increment(3);

        let rendered = second.render();
        assert!(rendered.contains("flowkit_telemetry_test_total 3"));
        assert_eq!(first.render(), rendered);
    }
}
