use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;
use super::store::BranchState;

/// Half-open overlap on wall-clock bounds. An end at or before its start is
/// read as past midnight.
pub fn overlaps(a_start: NaiveTime, a_end: NaiveTime, b_start: NaiveTime, b_end: NaiveTime) -> bool {
    Window::from_times(a_start, a_end).overlaps(&Window::from_times(b_start, b_end))
}

/// First reservation holding `table_id` on `date` during `window`, skipping
/// `exclude` (the reservation being moved).
pub(crate) fn find_conflict<'a>(
    state: &'a BranchState,
    table_id: Ulid,
    date: NaiveDate,
    window: &Window,
    exclude: Option<Ulid>,
) -> Option<&'a Reservation> {
    state
        .table_bookings(table_id, date)
        .filter(|r| Some(r.id) != exclude)
        .find(|r| r.status.occupies_table() && r.window().overlaps(window))
}

pub(crate) fn check_no_conflict(
    state: &BranchState,
    table_id: Ulid,
    date: NaiveDate,
    window: &Window,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match find_conflict(state, table_id, date, window, exclude) {
        Some(existing) => Err(EngineError::Conflict {
            table_id,
            reservation_id: existing.id,
        }),
        None => Ok(()),
    }
}

// ── Input validation ─────────────────────────────────────────────

pub(crate) fn validate_guests(guests: u32) -> Result<(), EngineError> {
    if !(MIN_PARTY_SIZE..=MAX_PARTY_SIZE).contains(&guests) {
        return Err(EngineError::validation(
            "guests",
            format!("party size must be between {MIN_PARTY_SIZE} and {MAX_PARTY_SIZE}"),
        ));
    }
    Ok(())
}

pub(crate) fn validate_date_not_past(date: NaiveDate, now: NaiveDateTime) -> Result<(), EngineError> {
    if date < now.date() {
        return Err(EngineError::validation("date", "cannot book reservations for past dates"));
    }
    Ok(())
}

/// Same-day bookings must start strictly after now.
pub(crate) fn validate_time_not_past(
    date: NaiveDate,
    time: NaiveTime,
    now: NaiveDateTime,
) -> Result<(), EngineError> {
    if date == now.date() && time <= now.time() {
        return Err(EngineError::validation("time", "cannot book reservations for past times"));
    }
    Ok(())
}

pub(crate) fn validate_text(
    field: &'static str,
    value: &str,
    max_len: usize,
    required: bool,
) -> Result<(), EngineError> {
    if required && value.trim().is_empty() {
        return Err(EngineError::validation(field, "must not be empty"));
    }
    if value.chars().count() > max_len {
        return Err(EngineError::validation(
            field,
            format!("must be at most {max_len} characters"),
        ));
    }
    Ok(())
}

pub(crate) fn validate_customer(customer: &Customer) -> Result<(), EngineError> {
    validate_text("customer_name", &customer.name, MAX_NAME_LEN, true)?;
    validate_text("phone", &customer.phone, MAX_PHONE_LEN, true)?;
    if let Some(email) = &customer.email {
        validate_text("email", email, MAX_EMAIL_LEN, true)?;
        if !email.contains('@') {
            return Err(EngineError::validation("email", "not an email address"));
        }
    }
    Ok(())
}

/// The table must be on the branch, active, and big enough.
pub(crate) fn validate_table_for<'a>(
    state: &'a BranchState,
    table_id: Ulid,
    guests: u32,
) -> Result<&'a Table, EngineError> {
    let table = state
        .tables
        .get(&table_id)
        .ok_or_else(|| EngineError::not_found("table", table_id))?;
    if table.status != TableStatus::Active {
        return Err(EngineError::validation(
            "table_id",
            format!("table {} is {}", table.label, table.status.as_str()),
        ));
    }
    if guests > table.seats {
        return Err(EngineError::validation(
            "guests",
            format!("table {} seats at most {}", table.label, table.seats),
        ));
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn at(date: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
        date.and_time(t(h, m))
    }

    #[test]
    fn touching_windows_do_not_overlap() {
        assert!(!overlaps(t(10, 0), t(11, 0), t(11, 0), t(12, 0)));
        assert!(!overlaps(t(11, 0), t(12, 0), t(10, 0), t(11, 0)));
    }

    #[test]
    fn partial_and_nested_windows_overlap() {
        assert!(overlaps(t(10, 0), t(11, 30), t(11, 0), t(12, 0)));
        assert!(overlaps(t(10, 0), t(14, 0), t(11, 0), t(12, 0)));
    }

    #[test]
    fn windows_past_midnight_overlap_late_evening() {
        assert!(overlaps(t(23, 30), t(1, 0), t(23, 0), t(23, 45)));
        assert!(!overlaps(t(23, 30), t(1, 0), t(21, 0), t(23, 30)));
    }

    #[test]
    fn party_size_bounds() {
        assert!(validate_guests(0).is_err());
        assert!(validate_guests(1).is_ok());
        assert!(validate_guests(20).is_ok());
        assert!(matches!(
            validate_guests(21),
            Err(EngineError::Validation { field: "guests", .. })
        ));
    }

    #[test]
    fn past_date_and_time() {
        let today = NaiveDate::from_ymd_opt(2030, 3, 1).unwrap();
        let now = at(today, 18, 0);
        assert!(validate_date_not_past(today.pred_opt().unwrap(), now).is_err());
        assert!(validate_date_not_past(today, now).is_ok());

        assert!(validate_time_not_past(today, t(18, 0), now).is_err());
        assert!(validate_time_not_past(today, t(17, 30), now).is_err());
        assert!(validate_time_not_past(today, t(18, 30), now).is_ok());
        // earlier clock time on a later date is fine
        assert!(validate_time_not_past(today.succ_opt().unwrap(), t(9, 0), now).is_ok());
    }

    #[test]
    fn customer_fields() {
        let mut customer = Customer {
            name: "Layla".into(),
            phone: "+97150000000".into(),
            email: Some("layla@example.com".into()),
        };
        assert!(validate_customer(&customer).is_ok());

        customer.email = Some("not-an-email".into());
        assert!(validate_customer(&customer).is_err());

        customer.email = None;
        customer.name = "   ".into();
        assert!(matches!(
            validate_customer(&customer),
            Err(EngineError::Validation { field: "customer_name", .. })
        ));
    }

    #[test]
    fn text_length_counts_chars() {
        assert!(validate_text("note", "ééé", 3, false).is_ok());
        assert!(validate_text("note", "éééé", 3, false).is_err());
        assert!(validate_text("note", "", 3, false).is_ok());
    }
}
