use ulid::Ulid;

/// Request-rejection errors of the booking engine. None of these crash the
/// serving process; the HTTP layer turns each into a field-scoped rejection.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("invalid office id: {0}")]
    OfficeNotFound(Ulid),

    #[error("you cannot make a reservation on this office")]
    OfficeNotBookable(Ulid),

    #[error("you cannot make a reservation on your own office")]
    SelfBookingForbidden,

    #[error("start date must be after today and end date after the start date")]
    InvalidDates,

    #[error("you cannot make a reservation during this time")]
    DateConflict(Ulid),

    #[error("you cannot make a reservation for less than {0} nights")]
    MinimumStayViolation(i64),

    #[error("office is handling another booking, retry shortly")]
    Busy,

    #[error("invalid reservation id: {0}")]
    ReservationNotFound(Ulid),

    #[error("reservation belongs to another user")]
    NotOwner,

    #[error("reservation is already cancelled")]
    AlreadyCancelled,

    #[error("reservation has already started or starts today")]
    TooLateToCancel,

    #[error("office already exists: {0}")]
    AlreadyExists(Ulid),

    #[error("this office cannot be delisted while it has active reservations")]
    HasActiveReservations(Ulid),

    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    #[error("WAL error: {0}")]
    WalError(String),
}
