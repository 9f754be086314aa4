use std::time::Duration;

pub const MAX_OFFICES: usize = 100_000;
pub const MAX_RESERVATIONS_PER_OFFICE: usize = 10_000;
pub const MAX_NAME_LEN: usize = 140;

/// Longest a booking request waits for the per-office lock before failing Busy.
pub const BOOKING_LOCK_WAIT: Duration = Duration::from_secs(3);

pub const MIN_STAY_NIGHTS: i64 = 3;
/// Stays at least this long qualify for the office's monthly discount.
pub const MONTHLY_DISCOUNT_MIN_NIGHTS: i64 = 28;

pub const WIFI_PASSWORD_LEN: usize = 16;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;
