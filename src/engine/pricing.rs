use chrono::NaiveDate;

use crate::limits::MONTHLY_DISCOUNT_MIN_NIGHTS;

// ── Pricing ──────────────────────────────────────────────────────

/// Calendar-day difference, start-of-day to start-of-day.
pub fn nights(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days()
}

/// Total price for a stay: nights × daily rate, minus the monthly discount
/// tier for stays of 28+ nights. Integer arithmetic throughout; the discount
/// truncates toward zero. Deterministic, no I/O.
pub fn quote(nights: i64, price_per_day: i64, monthly_discount: Option<u8>) -> i64 {
    let mut price = nights * price_per_day;
    if nights >= MONTHLY_DISCOUNT_MIN_NIGHTS
        && let Some(pct) = monthly_discount
        && pct > 0
    {
        price -= price * pct as i64 / 100;
    }
    price
}
