use std::net::SocketAddr;

use clap::Parser;
use display_json::DebugAsJson;

use crate::infra::metrics::Metric;
use crate::infra::metrics::metrics_for_relay_checkpoint;
use crate::infra::metrics::metrics_for_relay_source;
use crate::infra::metrics::metrics_for_relay_transfer;
use crate::infra::metrics::metrics_for_rpc_client;

#[derive(DebugAsJson, Clone, Parser, serde::Serialize)]
pub struct MetricsConfig {
    /// Metrics exporter binding address.
    #[arg(long = "metrics-exporter-address", env = "METRICS_EXPORTER_ADDRESS", default_value = "0.0.0.0:9000")]
    pub metrics_exporter_address: SocketAddr,
}

impl MetricsConfig {
    /// Inits application global metrics exporter.
    pub fn init(&self) -> anyhow::Result<()> {
        tracing::info!(address = %self.metrics_exporter_address, "creating metrics exporter");

        // get metric definitions
        let mut metrics = Vec::new();
        metrics.extend(metrics_for_relay_source());
        metrics.extend(metrics_for_relay_transfer());
        metrics.extend(metrics_for_relay_checkpoint());
        metrics.extend(metrics_for_rpc_client());

        // init metric exporter
        init_metrics_exporter(self.metrics_exporter_address, &metrics);

        // init metric description (always after provider started)
        for metric in &metrics {
            metric.register_description();
        }

        Ok(())
    }
}

#[cfg(feature = "metrics")]
fn init_metrics_exporter(address: SocketAddr, metrics: &[Metric]) {
    use metrics_exporter_prometheus::Matcher;
    use metrics_exporter_prometheus::PrometheusBuilder;

    tracing::info!(%address, "creating prometheus metrics exporter");
    let mut builder = PrometheusBuilder::new()
        .add_global_label("service", crate::infra::build_info::service_name())
        .add_global_label("version", crate::infra::build_info::version())
        .with_http_listener(address);

    for metric in metrics.iter().filter(|metric| metric.has_custom_buckets()) {
        builder = match builder.set_buckets_for_metric(Matcher::Full(metric.name.to_owned()), &metric.buckets) {
            Ok(builder) => builder,
            Err(e) => {
                tracing::error!(reason = ?e, metric = %metric.name, "failed to set metric buckets");
                return;
            }
        };
    }

    if let Err(e) = builder.install() {
        tracing::error!(reason = ?e, %address, "failed to create metrics exporter");
    }
}

#[cfg(not(feature = "metrics"))]
fn init_metrics_exporter(_: SocketAddr, _: &[Metric]) {
    tracing::info!("creating noop metrics exporter");
}
