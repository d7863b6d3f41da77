// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric descriptions and process gauges.

use metrics::{describe_counter, describe_gauge};

/// Counters recorded by the queue, ingestion, and nudge paths.
pub const COUNTERS: &[(&str, &str)] = &[
    ("relay_messages_ingested_total", "Inbound chat messages stored"),
    ("relay_deliveries_created_total", "Deliveries queued for a backend"),
    ("relay_deliveries_leased_total", "Deliveries handed out under a lease"),
    ("relay_deliveries_acked_total", "Deliveries acknowledged by their backend"),
    ("relay_deliveries_nacked_total", "Deliveries released early by their backend"),
    ("relay_leases_reaped_total", "Expired leases returned to pending"),
    ("relay_ack_rejections_total", "Ack or nack ids rejected, by reason"),
    ("relay_nudges_total", "Webhook nudges finished, by outcome"),
];

/// Register all relay metric descriptions.
///
/// Called once after the recorder is installed.
pub fn register_metrics() {
    for (name, help) in COUNTERS {
        describe_counter!(*name, *help);
    }
    describe_gauge!("relay_memory_heap_bytes", "Bytes allocated by the heap allocator");
    describe_gauge!("relay_memory_resident_bytes", "Resident bytes held by the heap allocator");
    describe_gauge!("relay_memory_rss_bytes", "Process resident set size");
}

pub fn set_memory_heap(bytes: f64) {
    metrics::gauge!("relay_memory_heap_bytes").set(bytes);
}

pub fn set_memory_resident(bytes: f64) {
    metrics::gauge!("relay_memory_resident_bytes").set(bytes);
}

pub fn set_memory_rss(bytes: f64) {
    metrics::gauge!("relay_memory_rss_bytes").set(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn described_counters_render_with_help_text() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            register_metrics();
            metrics::counter!("relay_deliveries_acked_total").increment(2);
            metrics::counter!("relay_ack_rejections_total", "reason" => "lease_expired")
                .increment(1);
            set_memory_rss(4096.0);
        });

        let out = handle.render();
        assert!(out.contains("# HELP relay_deliveries_acked_total"));
        assert!(out.contains("relay_deliveries_acked_total 2"));
        assert!(out.contains(r#"relay_ack_rejections_total{reason="lease_expired"} 1"#));
        assert!(out.contains("relay_memory_rss_bytes 4096"));
    }

    #[test]
    fn counter_names_follow_prometheus_conventions() {
        for (name, _) in COUNTERS {
            assert!(name.starts_with("relay_"));
            assert!(name.ends_with("_total"));
        }
    }
}
