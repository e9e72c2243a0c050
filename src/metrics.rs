//! Pipeline counters.
//!
//! Recording is a no-op unless a recorder is installed; `init_metrics`
//! installs the Prometheus exporter when `ANS_ETL_METRICS_PORT` is set.

use std::net::SocketAddr;

pub fn init_metrics() {
    let Some(port) = std::env::var("ANS_ETL_METRICS_PORT")
        .ok()
        .and_then(|s| s.trim().parse::<u16>().ok())
    else {
        return;
    };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => tracing::info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => tracing::warn!("Prometheus exporter install failed: {}", e),
    }
}

pub struct PipelineMetrics;

impl PipelineMetrics {
    pub fn record_archive_downloaded(bytes: usize) {
        ::metrics::counter!("ans_etl_archives_downloaded_total").increment(1);
        ::metrics::histogram!("ans_etl_archive_bytes").record(bytes as f64);
    }

    pub fn record_archive_already_present() {
        ::metrics::counter!("ans_etl_archives_skipped_total").increment(1);
    }

    pub fn record_download_error() {
        ::metrics::counter!("ans_etl_download_errors_total").increment(1);
    }

    pub fn record_entries_extracted(count: usize) {
        ::metrics::counter!("ans_etl_entries_extracted_total").increment(count as u64);
    }

    pub fn record_archive_error() {
        ::metrics::counter!("ans_etl_archive_errors_total").increment(1);
    }

    pub fn record_expenses_consolidated(count: usize) {
        ::metrics::counter!("ans_etl_expense_records_total").increment(count as u64);
    }

    pub fn record_enriched(valid: usize, invalid: usize, unmatched: usize) {
        ::metrics::counter!("ans_etl_enriched_valid_tax_id_total").increment(valid as u64);
        ::metrics::counter!("ans_etl_enriched_invalid_tax_id_total").increment(invalid as u64);
        ::metrics::counter!("ans_etl_enriched_unmatched_total").increment(unmatched as u64);
    }

    pub fn record_groups_aggregated(count: usize) {
        ::metrics::gauge!("ans_etl_aggregated_groups").set(count as f64);
    }

    pub fn record_stage_duration(stage: &'static str, secs: f64) {
        ::metrics::histogram!("ans_etl_stage_duration_seconds", "stage" => stage).record(secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn recorded_counters_reach_the_prometheus_exporter() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            PipelineMetrics::record_download_error();
            PipelineMetrics::record_download_error();
            PipelineMetrics::record_enriched(3, 1, 2);
        });

        let rendered = handle.render();
        assert!(rendered
            .lines()
            .any(|l| l.starts_with("ans_etl_download_errors_total") && l.ends_with(" 2")));
        assert!(rendered
            .lines()
            .any(|l| l.starts_with("ans_etl_enriched_valid_tax_id_total") && l.ends_with(" 3")));
    }
}
