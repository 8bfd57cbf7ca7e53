//! Prometheus exporter and business counters.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use service_core::error::AppError;
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder. Calling it again is a no-op.
pub fn init_metrics() -> Result<(), AppError> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        AppError::InternalError(anyhow::anyhow!(
            "Failed to install Prometheus recorder: {}",
            e
        ))
    })?;

    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

/// Current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized".to_string())
}

pub fn record_invoice_created(final_total: f64) {
    metrics::counter!("invoices_created_total").increment(1);
    metrics::histogram!("invoice_final_total").record(final_total);
}

pub fn record_payment(target: &'static str, method: &'static str, amount: f64) {
    metrics::counter!("payments_recorded_total", "target" => target, "method" => method)
        .increment(1);
    metrics::histogram!("payment_amount", "target" => target).record(amount);
}

pub fn record_login(outcome: &'static str) {
    metrics::counter!("login_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_conflict(resource: &'static str) {
    metrics::counter!("write_conflicts_total", "resource" => resource).increment(1);
}
