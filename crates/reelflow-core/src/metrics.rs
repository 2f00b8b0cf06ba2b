//! Orchestration metrics.
//!
//! Provides counters for:
//! - Job transitions and ignored advances
//! - Webhook delivery fan-out and outcomes
//! - Guard decisions (rate limit rejections, idempotent replays)
//! - Live subscribers falling behind

use metrics::counter;

// =============================================================================
// Metric Names
// =============================================================================

pub mod names {
    /// Applied job transitions by job type and new status.
    pub const JOB_TRANSITIONS_TOTAL: &str = "reelflow_job_transitions_total";

    /// Worker advances ignored because the job was terminal.
    pub const JOB_NOOP_ADVANCES_TOTAL: &str = "reelflow_job_noop_advances_total";

    /// Failed hand-offs to the task queue.
    pub const ENQUEUE_FAILURES_TOTAL: &str = "reelflow_enqueue_failures_total";

    /// Pending deliveries created by event type.
    pub const WEBHOOK_DELIVERIES_CREATED_TOTAL: &str = "reelflow_webhook_deliveries_created_total";

    /// Reported delivery outcomes by status.
    pub const WEBHOOK_DELIVERY_RESULTS_TOTAL: &str = "reelflow_webhook_delivery_results_total";

    /// Requests rejected by a rate limit policy.
    pub const RATE_LIMIT_REJECTIONS_TOTAL: &str = "reelflow_rate_limit_rejections_total";

    /// Responses replayed from an idempotency record.
    pub const IDEMPOTENCY_REPLAYS_TOTAL: &str = "reelflow_idempotency_replays_total";

    /// Snapshots skipped by lagging live subscribers.
    pub const BROKER_LAGGED_TOTAL: &str = "reelflow_broker_lagged_total";
}

// =============================================================================
// Recording Functions
// =============================================================================

pub fn record_transition(job_type: &str, status: &str) {
    counter!(
        names::JOB_TRANSITIONS_TOTAL,
        "job_type" => job_type.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_noop_advance(job_type: &str) {
    counter!(names::JOB_NOOP_ADVANCES_TOTAL, "job_type" => job_type.to_string()).increment(1);
}

pub fn record_enqueue_failure(task_name: &str) {
    counter!(names::ENQUEUE_FAILURES_TOTAL, "task" => task_name.to_string()).increment(1);
}

pub fn record_deliveries_created(event_type: &str, count: usize) {
    counter!(
        names::WEBHOOK_DELIVERIES_CREATED_TOTAL,
        "event_type" => event_type.to_string()
    )
    .increment(count as u64);
}

pub fn record_delivery_result(status: &str) {
    counter!(names::WEBHOOK_DELIVERY_RESULTS_TOTAL, "status" => status.to_string()).increment(1);
}

pub fn record_rate_limit_rejection(scope: &str) {
    counter!(names::RATE_LIMIT_REJECTIONS_TOTAL, "scope" => scope.to_string()).increment(1);
}

pub fn record_idempotency_replay() {
    counter!(names::IDEMPOTENCY_REPLAYS_TOTAL).increment(1);
}

pub fn record_broker_lagged(skipped: u64) {
    counter!(names::BROKER_LAGGED_TOTAL).increment(skipped);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in [
            names::JOB_TRANSITIONS_TOTAL,
            names::JOB_NOOP_ADVANCES_TOTAL,
            names::ENQUEUE_FAILURES_TOTAL,
            names::WEBHOOK_DELIVERIES_CREATED_TOTAL,
            names::WEBHOOK_DELIVERY_RESULTS_TOTAL,
            names::RATE_LIMIT_REJECTIONS_TOTAL,
            names::IDEMPOTENCY_REPLAYS_TOTAL,
            names::BROKER_LAGGED_TOTAL,
        ] {
            assert!(name.starts_with("reelflow_"));
            assert!(name.ends_with("_total"));
        }
    }
}
