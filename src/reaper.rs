use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::info;

use crate::engine::Engine;
use crate::notify::{Notice, NoticeKind};

/// Background task that tells guests and hosts about stays starting today.
/// The sweep runs once per calendar day; the tick only checks for a date
/// rollover.
pub async fn run_due_notifier(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    let mut last_swept: Option<NaiveDate> = None;
    loop {
        interval.tick().await;
        let today = chrono::Utc::now().date_naive();
        if last_swept == Some(today) {
            continue;
        }
        last_swept = Some(today);
        for (reservation, host_id) in engine.collect_due_reservations(today) {
            engine.notify.send(
                reservation.user_id,
                Notice::for_reservation(NoticeKind::GuestReservationStarting, &reservation),
            );
            engine.notify.send(
                host_id,
                Notice::for_reservation(NoticeKind::HostReservationStarting, &reservation),
            );
            info!("sent start-of-stay notices for reservation {}", reservation.id);
        }
    }
}

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        if engine.wal_appends_since_compact().await >= threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("WAL compacted"),
                Err(e) => tracing::warn!("WAL compaction failed: {e}"),
            }
        }
    }
}
