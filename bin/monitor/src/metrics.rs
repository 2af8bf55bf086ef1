//! Prometheus metrics for the withdrawal monitor.
//!
//! All metrics are aggregated in the [`Metrics`] struct and share the
//! `faultproof_withdrawals_` namespace. Node connection counters are recorded
//! by the proxies themselves.
//!
//! Gauges not written for [`gauge_idle_timeout`] are dropped by the exporter.
//! Open incidents are rewritten every cycle, so only series of closed
//! incidents or stale label sets expire.

use detector::{Bucket, MonitorState, Transition};
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Label,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use metrics_util::MetricKindMask;
use std::{collections::HashMap, time::Duration};
use withdrawal::{EnrichedWithdrawalEvent, IncidentKey};

/// Aggregated metrics for the monitor.
///
/// Remembers the label set of every open incident so the matching info gauge
/// can be zeroed when the incident changes or leaves its bucket.
#[derive(Debug, Default)]
pub struct Metrics {
    open_incidents: HashMap<(Bucket, IncidentKey), Vec<Label>>,
}

impl Metrics {
    /// Create a new metrics instance and register all metric descriptions.
    pub fn new() -> Self {
        Self::register_descriptions();
        Self::default()
    }

    fn register_descriptions() {
        // Cycle metrics
        describe_counter!(
            "faultproof_withdrawals_cycles_total",
            "Total number of monitor cycles by result"
        );
        describe_histogram!(
            "faultproof_withdrawals_cycle_duration_seconds",
            "Duration of each monitor cycle in seconds"
        );

        // Scan progress
        describe_gauge!(
            "faultproof_withdrawals_initial_l1_height",
            "L1 height the monitor started scanning from"
        );
        describe_gauge!(
            "faultproof_withdrawals_next_l1_height",
            "Next L1 height to scan"
        );
        describe_gauge!(
            "faultproof_withdrawals_latest_l1_height",
            "Latest observed L1 height"
        );
        describe_gauge!(
            "faultproof_withdrawals_latest_l2_height",
            "Latest observed L2 height"
        );
        describe_counter!(
            "faultproof_withdrawals_events_processed_total",
            "Total number of withdrawal proven events scanned"
        );
        describe_counter!(
            "faultproof_withdrawals_withdrawals_processed_total",
            "Total number of withdrawals that reached a final outcome"
        );

        // Node connections
        describe_counter!(
            "faultproof_withdrawals_node_connections_total",
            "Total number of node requests by layer and operation"
        );
        describe_counter!(
            "faultproof_withdrawals_l1_node_connection_failures_total",
            "Total number of failed L1 node requests"
        );
        describe_counter!(
            "faultproof_withdrawals_l2_node_connection_failures_total",
            "Total number of failed L2 node requests"
        );

        // Incident buckets
        for bucket in BUCKETS {
            describe_gauge!(count_metric(bucket), "Number of incidents in the bucket");
            describe_gauge!(
                info_metric(bucket),
                "1 while the labelled incident is in the bucket, 0 after it left"
            );
        }
    }

    /// Record a completed cycle.
    pub fn record_cycle(&self, success: bool, duration: Duration) {
        let result = if success { "success" } else { "failure" };
        counter!("faultproof_withdrawals_cycles_total", "result" => result).increment(1);
        histogram!("faultproof_withdrawals_cycle_duration_seconds").record(duration.as_secs_f64());
    }

    /// Mirror the state's heights, totals and bucket sizes.
    pub fn update_from_state(&self, state: &MonitorState) {
        gauge!("faultproof_withdrawals_initial_l1_height").set(state.initial_l1_height as f64);
        gauge!("faultproof_withdrawals_next_l1_height").set(state.next_l1_height as f64);
        gauge!("faultproof_withdrawals_latest_l1_height").set(state.latest_l1_height as f64);
        gauge!("faultproof_withdrawals_latest_l2_height").set(state.latest_l2_height as f64);
        counter!("faultproof_withdrawals_events_processed_total").absolute(state.events_processed);
        counter!("faultproof_withdrawals_withdrawals_processed_total")
            .absolute(state.withdrawals_processed);

        for bucket in BUCKETS {
            gauge!(count_metric(bucket)).set(state.bucket_len(bucket) as f64);
        }
        for ((bucket, _), labels) in &self.open_incidents {
            gauge!(info_metric(*bucket), labels.clone()).set(1.0);
        }
    }

    /// Update the per-incident info gauges after a state transition.
    pub fn record_transition(&mut self, transition: &Transition) {
        for (bucket, event) in &transition.removed {
            self.close(*bucket, event);
        }

        if let Some(bucket) = transition.stored_in {
            let labels = incident_labels(&transition.event);
            let key = (bucket, transition.event.key());
            if let Some(previous) = self.open_incidents.get(&key) {
                if *previous == labels {
                    return;
                }
                gauge!(info_metric(bucket), previous.clone()).set(0.0);
            }
            gauge!(info_metric(bucket), labels.clone()).set(1.0);
            self.open_incidents.insert(key, labels);
        }
    }

    fn close(&mut self, bucket: Bucket, event: &EnrichedWithdrawalEvent) {
        let labels = self
            .open_incidents
            .remove(&(bucket, event.key()))
            .unwrap_or_else(|| incident_labels(event));
        gauge!(info_metric(bucket), labels).set(0.0);
    }

    pub fn open_incidents(&self) -> usize {
        self.open_incidents.len()
    }
}

const BUCKETS: [Bucket; 3] = [
    Bucket::PotentialAttackOnDefenderWinsGames,
    Bucket::PotentialAttackOnInProgressGames,
    Bucket::SuspiciousEventsOnChallengerWinsGames,
];

const fn count_metric(bucket: Bucket) -> &'static str {
    match bucket {
        Bucket::PotentialAttackOnDefenderWinsGames => {
            "faultproof_withdrawals_potential_attack_on_defender_wins_games_count"
        }
        Bucket::PotentialAttackOnInProgressGames => {
            "faultproof_withdrawals_potential_attack_on_in_progress_games_count"
        }
        Bucket::SuspiciousEventsOnChallengerWinsGames => {
            "faultproof_withdrawals_suspicious_events_on_challenger_wins_games_count"
        }
    }
}

const fn info_metric(bucket: Bucket) -> &'static str {
    match bucket {
        Bucket::PotentialAttackOnDefenderWinsGames => {
            "faultproof_withdrawals_potential_attack_on_defender_wins_games_info"
        }
        Bucket::PotentialAttackOnInProgressGames => {
            "faultproof_withdrawals_potential_attack_on_in_progress_games_info"
        }
        Bucket::SuspiciousEventsOnChallengerWinsGames => {
            "faultproof_withdrawals_suspicious_events_on_challenger_wins_games_info"
        }
    }
}

fn incident_labels(event: &EnrichedWithdrawalEvent) -> Vec<Label> {
    vec![
        Label::new("withdrawal_hash", event.event.withdrawal_hash.to_string()),
        Label::new("proof_submitter", event.event.proof_submitter.to_string()),
        Label::new("status", event.dispute_game.status.as_str()),
        Label::new("blacklisted", event.blacklisted.to_string()),
        Label::new(
            "withdrawal_hash_present",
            event.withdrawal_hash_present_on_l2.to_string(),
        ),
        Label::new("enriched", event.enriched.to_string()),
        Label::new("event_block_number", event.event.block_number.to_string()),
        Label::new("event_tx_hash", event.event.tx_hash.to_string()),
    ]
}

/// Minimum time a gauge survives without being written.
const MIN_GAUGE_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Idle timeout for gauges, ten polling intervals but never under ten minutes.
pub fn gauge_idle_timeout(poll_interval: Duration) -> Duration {
    poll_interval.saturating_mul(10).max(MIN_GAUGE_IDLE_TIMEOUT)
}

fn prometheus_builder(gauge_idle_timeout: Duration) -> PrometheusBuilder {
    PrometheusBuilder::new().idle_timeout(MetricKindMask::GAUGE, Some(gauge_idle_timeout))
}

/// Install the Prometheus metrics exporter and start the HTTP server.
///
/// Returns an error if the server fails to bind to the specified port.
pub fn install_prometheus_exporter(port: u16, gauge_idle_timeout: Duration) -> eyre::Result<()> {
    use std::net::SocketAddr;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    prometheus_builder(gauge_idle_timeout)
        .with_http_listener(addr)
        .install()
        .map_err(|e| eyre::eyre!("Failed to install Prometheus exporter: {}", e))?;

    Ok(())
}
