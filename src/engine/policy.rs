use chrono::{NaiveTime, TimeDelta, Timelike};

use crate::model::{MINUTES_PER_DAY, Minutes, Window, minute_of_day};

/// Ends before this hour may run past closing (late service rolling into the
/// early morning).
pub const EARLY_MORNING_ROLLOVER_HOUR: u32 = 6;

/// Table occupancy for a party. Sizes above 20 map to the top step; range
/// checks happen before this is called.
pub fn duration_for(party_size: u32) -> Minutes {
    match party_size {
        0..=2 => 60,
        3..=4 => 90,
        5..=8 => 120,
        _ => 150,
    }
}

/// Wall-clock end of a booking, wrapping past midnight.
pub fn end_time(start: NaiveTime, duration: Minutes) -> NaiveTime {
    start
        .overflowing_add_signed(TimeDelta::minutes(i64::from(duration)))
        .0
}

/// Whether a booking ending at `end` is past closing. An end in the early
/// morning is let through.
pub fn ends_after_closing(end: NaiveTime, closing: NaiveTime) -> bool {
    end > closing && end.hour() >= EARLY_MORNING_ROLLOVER_HOUR
}

/// Closing-time check for a booking on a day with the given hours. Days that
/// close at or after midnight are compared on the un-wrapped timeline; the
/// early-morning allowance applies on both paths.
pub fn runs_past_closing(
    start: NaiveTime,
    duration: Minutes,
    opening: NaiveTime,
    closing: NaiveTime,
) -> bool {
    let end = end_time(start, duration);
    if closing > opening {
        return ends_after_closing(end, closing);
    }
    let close = minute_of_day(closing) + MINUTES_PER_DAY;
    Window::starting_at(start, duration).end > close && end.hour() >= EARLY_MORNING_ROLLOVER_HOUR
}
