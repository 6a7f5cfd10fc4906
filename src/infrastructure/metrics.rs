//! Call bridge metrics
//!
//! Recorded through the `metrics` facade; without an installed recorder every
//! call here is a no-op.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const ACTIVE_CALLS: &str = "callbridge_active_calls";
pub const ACTIONS_TOTAL: &str = "callbridge_actions_total";
pub const INCOMING_REPORTS_TOTAL: &str = "callbridge_incoming_reports_total";
pub const TRANSACTIONS_TOTAL: &str = "callbridge_transactions_total";

/// Install the Prometheus recorder and describe every metric
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(handle)
}

pub fn describe_metrics() {
    describe_gauge!(ACTIVE_CALLS, "Number of calls currently in the registry");
    describe_counter!(
        ACTIONS_TOTAL,
        "Authority actions handled, by action kind and outcome"
    );
    describe_counter!(
        INCOMING_REPORTS_TOTAL,
        "Incoming call reports, by outcome"
    );
    describe_counter!(
        TRANSACTIONS_TOTAL,
        "Transactions requested from the authority, by outcome"
    );
}

pub fn update_active_calls(count: usize) {
    gauge!(ACTIVE_CALLS).set(count as f64);
}

pub fn record_action(kind: &'static str, outcome: &'static str) {
    counter!(ACTIONS_TOTAL, "action" => kind, "outcome" => outcome).increment(1);
}

pub fn record_incoming_report(accepted: bool) {
    let outcome = if accepted { "accepted" } else { "denied" };
    counter!(INCOMING_REPORTS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_transaction(accepted: bool) {
    let outcome = if accepted { "accepted" } else { "rejected" };
    counter!(TRANSACTIONS_TOTAL, "outcome" => outcome).increment(1);
}
