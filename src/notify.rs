use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Reservation;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeKind {
    /// Sent to the user who booked.
    GuestReservationBooked,
    /// Sent to the office owner when their office is booked.
    HostReservationBooked,
    /// Sent to the guest the day their stay starts.
    GuestReservationStarting,
    /// Sent to the host the day a stay on their office starts.
    HostReservationStarting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub reservation_id: Ulid,
    pub office_id: Ulid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Notice {
    pub fn for_reservation(kind: NoticeKind, reservation: &Reservation) -> Self {
        Self {
            kind,
            reservation_id: reservation.id,
            office_id: reservation.office_id,
            start_date: reservation.range.start,
            end_date: reservation.range.end,
        }
    }
}

/// Broadcast hub for per-user notices. Fire-and-forget: a send with nobody
/// listening is a no-op and never affects the operation that produced it.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Notice>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notices for a user. Creates the channel if needed.
    pub fn subscribe(&self, user_id: Ulid) -> broadcast::Receiver<Notice> {
        let sender = self
            .channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Deliver a notice. No-op if nobody is listening.
    pub fn send(&self, user_id: Ulid, notice: Notice) {
        if let Some(sender) = self.channels.get(&user_id) {
            if sender.send(notice).is_ok() {
                metrics::counter!(crate::observability::NOTICES_SENT_TOTAL).increment(1);
            }
        }
    }

    /// Remove a user's channel.
    #[allow(dead_code)]
    pub fn remove(&self, user_id: &Ulid) {
        self.channels.remove(user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DateRange, ReservationStatus};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn reservation() -> Reservation {
        Reservation {
            id: Ulid::new(),
            user_id: Ulid::new(),
            office_id: Ulid::new(),
            range: DateRange::new(d("2026-09-01"), d("2026-09-05")),
            status: ReservationStatus::Active,
            price: 4000,
            wifi_password: "aaaabbbbccccdddd".into(),
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let r = reservation();
        let mut rx = hub.subscribe(r.user_id);

        let notice = Notice::for_reservation(NoticeKind::GuestReservationBooked, &r);
        hub.send(r.user_id, notice.clone());

        let received = rx.recv().await.unwrap();
        assert_eq!(received, notice);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let r = reservation();
        // No subscriber — should not panic
        hub.send(
            r.user_id,
            Notice::for_reservation(NoticeKind::HostReservationBooked, &r),
        );
    }

    #[tokio::test]
    async fn guest_and_host_channels_are_independent() {
        let hub = NotifyHub::new();
        let r = reservation();
        let host = Ulid::new();

        let mut guest_rx = hub.subscribe(r.user_id);
        let mut host_rx = hub.subscribe(host);

        hub.send(
            r.user_id,
            Notice::for_reservation(NoticeKind::GuestReservationBooked, &r),
        );
        hub.send(
            host,
            Notice::for_reservation(NoticeKind::HostReservationBooked, &r),
        );

        assert_eq!(
            guest_rx.recv().await.unwrap().kind,
            NoticeKind::GuestReservationBooked
        );
        assert_eq!(
            host_rx.recv().await.unwrap().kind,
            NoticeKind::HostReservationBooked
        );
        assert!(guest_rx.try_recv().is_err());
        assert!(host_rx.try_recv().is_err());
    }
}
