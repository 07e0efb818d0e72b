// =============================================================================
// METRICS MODULE
// =============================================================================
// Prometheus metrics for the order service.
//
// METRIC TYPES USED:
// - Counter: requests, orders created, verifications, redemptions
// - Histogram: HTTP, database, Redis and gateway latency
// =============================================================================

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// METRIC NAMES
// =============================================================================

/// Labels: method, endpoint, status
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";

/// Labels: method, endpoint
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

/// Labels: payment_mode (COD/PREPAID)
pub const ORDERS_CREATED_TOTAL: &str = "orders_created_total";

/// Labels: outcome (paid/already_paid/rejected)
pub const PAYMENT_VERIFICATIONS_TOTAL: &str = "payment_verifications_total";

/// Labels: outcome (redeemed/skipped)
pub const COUPON_REDEMPTIONS_TOTAL: &str = "coupon_redemptions_total";

/// Labels: status
pub const ORDER_STATUS_UPDATES_TOTAL: &str = "order_status_updates_total";

/// Labels: operation
pub const GATEWAY_REQUEST_DURATION_SECONDS: &str = "gateway_request_duration_seconds";

/// Labels: operation (select/insert/update)
pub const DB_QUERY_DURATION_SECONDS: &str = "db_query_duration_seconds";

/// Labels: operation (get/set/delete)
pub const REDIS_OPERATION_DURATION_SECONDS: &str = "redis_operation_duration_seconds";

// =============================================================================
// SETUP FUNCTION
// =============================================================================
/// Install the Prometheus recorder and return the handle used by `/metrics`.
pub fn setup_metrics() -> Result<PrometheusHandle> {
    let latency_buckets = &[
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(HTTP_REQUEST_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Full(DB_QUERY_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Full(REDIS_OPERATION_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Full(GATEWAY_REQUEST_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .install_recorder()?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request latency in seconds");
    describe_counter!(ORDERS_CREATED_TOTAL, "Orders persisted, by payment mode");
    describe_counter!(
        PAYMENT_VERIFICATIONS_TOTAL,
        "Payment verification attempts, by outcome"
    );
    describe_counter!(
        COUPON_REDEMPTIONS_TOTAL,
        "Coupon redemption attempts, by outcome"
    );
    describe_counter!(ORDER_STATUS_UPDATES_TOTAL, "Order status changes, by new status");
    describe_histogram!(
        GATEWAY_REQUEST_DURATION_SECONDS,
        "Payment gateway call latency in seconds"
    );
    describe_histogram!(DB_QUERY_DURATION_SECONDS, "Database query latency in seconds");
    describe_histogram!(
        REDIS_OPERATION_DURATION_SECONDS,
        "Redis operation latency in seconds"
    );

    Ok(handle)
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Record an HTTP request
///
/// # Arguments
/// * `method` - HTTP method (GET, POST, etc.)
/// * `endpoint` - Route pattern (/api/orders/:orderId)
/// * `status` - Response status code
/// * `duration_secs` - Request duration in seconds
pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(duration_secs);
}

pub fn record_order_created(payment_mode: &str) {
    counter!(ORDERS_CREATED_TOTAL, "payment_mode" => payment_mode.to_string()).increment(1);
}

pub fn record_payment_verification(outcome: &'static str) {
    counter!(PAYMENT_VERIFICATIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_coupon_redemption(redeemed: bool) {
    let outcome = if redeemed { "redeemed" } else { "skipped" };
    counter!(COUPON_REDEMPTIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_status_update(status: &'static str) {
    counter!(ORDER_STATUS_UPDATES_TOTAL, "status" => status).increment(1);
}

pub fn record_gateway_call(operation: &'static str, duration_secs: f64) {
    histogram!(GATEWAY_REQUEST_DURATION_SECONDS, "operation" => operation).record(duration_secs);
}

pub fn record_db_query(operation: &str, duration_secs: f64) {
    histogram!(
        DB_QUERY_DURATION_SECONDS,
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

pub fn record_redis_operation(operation: &str, duration_secs: f64) {
    histogram!(
        REDIS_OPERATION_DURATION_SECONDS,
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}
