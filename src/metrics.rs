use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::RpcProxyError;

/// Installs the global Prometheus recorder and returns a handle whose
/// `render()` backs the `/metrics` endpoint. Call once at startup.
pub fn install() -> Result<PrometheusHandle, RpcProxyError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| RpcProxyError::Config(format!("failed to install metrics recorder: {e}")))
}
