use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — used for record timestamps only; booking math is
/// calendar days.
pub type Ms = i64;

/// Calendar-date range of a stay. `start` is check-in, `end` is check-out,
/// `start < end`. Overlap is inclusive at both boundaries: two stays that
/// share even a single calendar day conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start < end, "DateRange start must be before end");
        Self { start, end }
    }

    /// Calendar-day difference, start-of-day to start-of-day.
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Active,
    Cancelled,
}

impl ReservationStatus {
    /// Wire representation: 1 = Active, 2 = Cancelled.
    pub fn as_wire(self) -> u8 {
        match self {
            ReservationStatus::Active => 1,
            ReservationStatus::Cancelled => 2,
        }
    }

    pub fn from_wire(v: u8) -> Option<Self> {
        match v {
            1 => Some(ReservationStatus::Active),
            2 => Some(ReservationStatus::Cancelled),
            _ => None,
        }
    }
}

/// A stay booked by a user on an office. Created only by the booking
/// orchestrator; the only mutation ever applied is Active → Cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub user_id: Ulid,
    pub office_id: Ulid,
    pub range: DateRange,
    pub status: ReservationStatus,
    /// Fixed at creation; cancellation never recomputes it.
    pub price: i64,
    /// Opaque access credential generated per stay.
    pub wifi_password: String,
    pub created_at: Ms,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalStatus {
    Pending,
    Approved,
}

impl ApprovalStatus {
    /// Wire representation: 1 = Pending, 2 = Approved.
    pub fn as_wire(self) -> u8 {
        match self {
            ApprovalStatus::Pending => 1,
            ApprovalStatus::Approved => 2,
        }
    }
}

/// An office listing. Bookable iff approved and not hidden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Office {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub name: String,
    /// Smallest currency unit per night.
    pub price_per_day: i64,
    /// Percentage (0–100) applied to stays of 28+ nights.
    pub monthly_discount: Option<u8>,
    pub approval: ApprovalStatus,
    pub hidden: bool,
}

impl Office {
    pub fn is_bookable(&self) -> bool {
        self.approval == ApprovalStatus::Approved && !self.hidden
    }
}

/// An office plus its reservations, sorted by `range.start`.
#[derive(Debug, Clone)]
pub struct OfficeState {
    pub office: Office,
    pub reservations: Vec<Reservation>,
}

impl OfficeState {
    pub fn new(office: Office) -> Self {
        Self {
            office,
            reservations: Vec::new(),
        }
    }

    /// Insert a reservation maintaining sort order by range.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.range.start, |r| r.range.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn reservation(&self, id: &Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| &r.id == id)
    }

    pub fn reservation_mut(&mut self, id: &Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| &r.id == id)
    }

    /// Return only reservations whose range overlaps the query window,
    /// regardless of status. Binary search skips reservations starting after
    /// `query.end` (inclusive boundaries).
    pub fn overlapping(&self, query: &DateRange) -> impl Iterator<Item = &Reservation> {
        // Everything at index >= right_bound starts after query.end → can't overlap.
        let right_bound = self
            .reservations
            .partition_point(|r| r.range.start <= query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.range.end >= query.start)
    }

    pub fn has_active_reservations(&self) -> bool {
        self.reservations.iter().any(|r| r.is_active())
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    OfficeRegistered {
        office: Office,
    },
    OfficeUpdated {
        id: Ulid,
        name: String,
        price_per_day: i64,
        monthly_discount: Option<u8>,
        approval: ApprovalStatus,
        hidden: bool,
    },
    OfficeDelisted {
        id: Ulid,
    },
    ReservationBooked {
        reservation: Reservation,
    },
    ReservationCancelled {
        id: Ulid,
        office_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfficeSummary {
    pub office: Office,
    /// Count of Active reservations, any dates.
    pub active_reservations: usize,
}
