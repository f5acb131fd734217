//! Pool metrics: connections in use / idle, acquire latency, acquire failures

use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec,
    IntCounterVec, IntGaugeVec,
};
use sqlx::{pool::PoolConnection, PgPool, Postgres};
use std::time::Instant;

lazy_static::lazy_static! {
    static ref POOL_CONNECTIONS: IntGaugeVec = register_int_gauge_vec!(
        "db_pool_connections",
        "Open pool connections by state",
        &["service", "state"]
    ).expect("db_pool_connections registers once");

    static ref ACQUIRE_SECONDS: HistogramVec = register_histogram_vec!(
        "db_pool_acquire_duration_seconds",
        "Wait for a pooled connection",
        &["service"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).expect("db_pool_acquire_duration_seconds registers once");

    static ref ACQUIRE_FAILURES: IntCounterVec = register_int_counter_vec!(
        "db_pool_acquire_failures_total",
        "Failed pool acquisitions by cause",
        &["service", "cause"]
    ).expect("db_pool_acquire_failures_total registers once");
}

pub(crate) fn update_pool_metrics(pool: &PgPool, service: &str) {
    let idle = pool.num_idle() as i64;
    let in_use = (pool.size() as i64 - idle).max(0);

    POOL_CONNECTIONS
        .with_label_values(&[service, "idle"])
        .set(idle);
    POOL_CONNECTIONS
        .with_label_values(&[service, "in_use"])
        .set(in_use);
}

fn failure_cause(err: &sqlx::Error) -> &'static str {
    match err {
        sqlx::Error::PoolTimedOut => "timeout",
        sqlx::Error::PoolClosed => "closed",
        _ => "other",
    }
}

/// Take one connection from the pool, timing the wait.
///
/// The connection goes back to the pool when the guard drops.
pub async fn acquire_with_metrics(
    pool: &PgPool,
    service: &str,
) -> Result<PoolConnection<Postgres>, sqlx::Error> {
    let start = Instant::now();
    let result = pool.acquire().await;

    ACQUIRE_SECONDS
        .with_label_values(&[service])
        .observe(start.elapsed().as_secs_f64());

    if let Err(e) = &result {
        ACQUIRE_FAILURES
            .with_label_values(&[service, failure_cause(e)])
            .inc();
    }

    result
}
