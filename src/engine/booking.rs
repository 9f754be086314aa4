use chrono::NaiveDate;
use rand::Rng;
use rand::distributions::Alphanumeric;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::{Notice, NoticeKind};
use crate::observability;

use super::conflict::{check_no_conflict, now_ms, today, validate_dates};
use super::{BookingError, Engine, pricing};

/// Random access credential stored with the stay.
fn wifi_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(WIFI_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

impl Engine {
    /// Book an office for a user.
    ///
    /// Preconditions are checked in order: office exists, dates are valid,
    /// then — under the office's write lock, acquired with a bounded wait —
    /// office is bookable, requester is not the host, no Active reservation
    /// overlaps the requested range, and the stay is at least the minimum
    /// number of nights. The conflict scan and the insert both run under the
    /// same lock, so among concurrent attempts on one office exactly one can
    /// observe an empty conflict set and commit.
    pub async fn create_reservation(
        &self,
        user_id: Ulid,
        office_id: Ulid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Reservation, BookingError> {
        let os = self
            .get_office(&office_id)
            .ok_or(BookingError::OfficeNotFound(office_id))?;

        let range = validate_dates(start, end, today())?;

        let mut guard = match tokio::time::timeout(BOOKING_LOCK_WAIT, os.write_owned()).await {
            Ok(guard) => guard,
            Err(_) => {
                metrics::counter!(observability::BOOKING_LOCK_TIMEOUTS_TOTAL).increment(1);
                return Err(BookingError::Busy);
            }
        };

        if !guard.office.is_bookable() {
            return Err(BookingError::OfficeNotBookable(office_id));
        }
        if guard.office.owner_id == user_id {
            return Err(BookingError::SelfBookingForbidden);
        }
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_OFFICE {
            return Err(BookingError::LimitExceeded("too many reservations on office"));
        }

        if let Err(e) = check_no_conflict(&guard, &range) {
            metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let nights = pricing::nights(range.start, range.end);
        if nights < MIN_STAY_NIGHTS {
            return Err(BookingError::MinimumStayViolation(MIN_STAY_NIGHTS));
        }
        let price = pricing::quote(
            nights,
            guard.office.price_per_day,
            guard.office.monthly_discount,
        );

        let reservation = Reservation {
            id: Ulid::new(),
            user_id,
            office_id,
            range,
            status: ReservationStatus::Active,
            price,
            wifi_password: wifi_password(),
            created_at: now_ms(),
        };
        let event = Event::ReservationBooked {
            reservation: reservation.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        let host_id = guard.office.owner_id;
        drop(guard);

        // Post-lock, best-effort: a failed delivery never rolls back the booking.
        self.notify.send(
            user_id,
            Notice::for_reservation(NoticeKind::GuestReservationBooked, &reservation),
        );
        self.notify.send(
            host_id,
            Notice::for_reservation(NoticeKind::HostReservationBooked, &reservation),
        );
        metrics::counter!(observability::BOOKINGS_TOTAL).increment(1);

        Ok(reservation)
    }

    /// Cancel a reservation. Single-row Active → Cancelled transition; no
    /// cross-reservation invariant to protect, so no bounded-wait lock.
    pub async fn cancel_reservation(
        &self,
        user_id: Ulid,
        reservation_id: Ulid,
    ) -> Result<Reservation, BookingError> {
        let office_id = self
            .office_for_reservation(&reservation_id)
            .ok_or(BookingError::ReservationNotFound(reservation_id))?;
        let os = self
            .get_office(&office_id)
            .ok_or(BookingError::ReservationNotFound(reservation_id))?;
        let mut guard = os.write_owned().await;

        let reservation = guard
            .reservation(&reservation_id)
            .ok_or(BookingError::ReservationNotFound(reservation_id))?;
        if reservation.user_id != user_id {
            return Err(BookingError::NotOwner);
        }
        if reservation.status == ReservationStatus::Cancelled {
            return Err(BookingError::AlreadyCancelled);
        }
        if reservation.range.start <= today() {
            return Err(BookingError::TooLateToCancel);
        }

        let mut cancelled = reservation.clone();
        let event = Event::ReservationCancelled {
            id: reservation_id,
            office_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        drop(guard);

        cancelled.status = ReservationStatus::Cancelled;
        metrics::counter!(observability::CANCELLATIONS_TOTAL).increment(1);
        Ok(cancelled)
    }

    /// Active reservations starting on `day`, paired with the office owner.
    /// Offices currently mid-booking are skipped and picked up on the next
    /// sweep.
    pub fn collect_due_reservations(&self, day: NaiveDate) -> Vec<(Reservation, Ulid)> {
        let mut due = Vec::new();
        for entry in self.state.iter() {
            let os = entry.value().clone();
            if let Ok(guard) = os.try_read() {
                for r in &guard.reservations {
                    if r.is_active() && r.range.start == day {
                        due.push((r.clone(), guard.office.owner_id));
                    }
                }
            }
        }
        due
    }
}
