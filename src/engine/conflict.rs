use chrono::NaiveDate;

use crate::model::{DateRange, OfficeState};

use super::BookingError;

pub(crate) fn now_ms() -> crate::model::Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as crate::model::Ms
}

/// "Today" at the moment of the request, UTC calendar date.
pub(crate) fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

/// Booking preconditions on the requested dates: start strictly after today,
/// end strictly after start.
pub(crate) fn validate_dates(
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
) -> Result<DateRange, BookingError> {
    if start <= today || end <= start {
        return Err(BookingError::InvalidDates);
    }
    Ok(DateRange::new(start, end))
}

/// The conflict check of the critical section: any Active reservation
/// overlapping the candidate range rejects the booking. Caller must hold the
/// office's write lock so the scan and the following insert are atomic.
pub(crate) fn check_no_conflict(os: &OfficeState, range: &DateRange) -> Result<(), BookingError> {
    for existing in os.overlapping(range) {
        if existing.is_active() {
            return Err(BookingError::DateConflict(existing.id));
        }
    }
    Ok(())
}
