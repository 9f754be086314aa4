use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservations successfully booked.
pub const BOOKINGS_TOTAL: &str = "hotdesk_bookings_total";

/// Counter: booking attempts rejected because the dates were taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "hotdesk_booking_conflicts_total";

/// Counter: booking attempts that timed out waiting for the office lock.
pub const BOOKING_LOCK_TIMEOUTS_TOTAL: &str = "hotdesk_booking_lock_timeouts_total";

/// Counter: reservations cancelled.
pub const CANCELLATIONS_TOTAL: &str = "hotdesk_cancellations_total";

/// Counter: notices delivered to subscribed users.
pub const NOTICES_SENT_TOTAL: &str = "hotdesk_notices_sent_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: offices currently listed.
pub const OFFICES_ACTIVE: &str = "hotdesk_offices_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "hotdesk_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "hotdesk_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
