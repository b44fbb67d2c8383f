use chrono::NaiveTime;

use crate::model::*;

/// Lunch runs until 14:30, afternoon until 17:00, dinner after.
pub const AFTERNOON_START: Minutes = 14 * 60 + 30;
pub const DINNER_START: Minutes = 17 * 60;

pub fn meal_period(start: Minutes) -> MealPeriod {
    if start < AFTERNOON_START {
        MealPeriod::Lunch
    } else if start < DINNER_START {
        MealPeriod::Afternoon
    } else {
        MealPeriod::Dinner
    }
}

/// 12-hour clock, e.g. `11:30 AM`, `12:00 PM`, `7:05 PM`.
pub fn display_time(t: NaiveTime) -> String {
    t.format("%-I:%M %p").to_string()
}

fn time_of(minutes: Minutes) -> NaiveTime {
    let m = minutes % MINUTES_PER_DAY;
    NaiveTime::from_hms_opt(m / 60, m % 60, 0).unwrap_or(NaiveTime::MIN)
}

/// Enumerate bookable starts for one day.
///
/// Starts step from opening by `interval` while the whole `duration` fits
/// before closing. Capacity is counted in aggregate: every booked window that
/// overlaps a candidate takes one table off `eligible_tables`, whichever
/// table it sits on. Slots with nothing left are left out, so a fully booked
/// day is an open listing with empty buckets.
///
/// Hours closing at or before opening run past midnight; starts stop at
/// midnight.
pub fn generate_slots(
    hours: &DayHours,
    interval: Minutes,
    duration: Minutes,
    eligible_tables: u32,
    booked: &[Window],
) -> SlotListing {
    let (true, Some(opening), Some(closing)) = (hours.is_open, hours.opening, hours.closing) else {
        return SlotListing::Closed {
            note: hours.note.clone().unwrap_or_default(),
        };
    };

    let open = minute_of_day(opening);
    let mut close = minute_of_day(closing);
    if close <= open {
        close += MINUTES_PER_DAY;
    }
    let step = interval.max(1);

    let mut slots = SlotBuckets::default();
    let mut current = open;
    while current + duration <= close && current < MINUTES_PER_DAY {
        let candidate = Window::new(current, current + duration);
        let taken = booked.iter().filter(|w| w.overlaps(&candidate)).count();
        let remaining = (eligible_tables as usize).saturating_sub(taken) as u32;
        if remaining > 0 {
            let time = time_of(current);
            slots.push(
                meal_period(current),
                Slot {
                    time,
                    display: display_time(time),
                    available_tables: remaining,
                    duration_minutes: duration,
                },
            );
        }
        current += step;
    }

    SlotListing::Open {
        opening,
        closing,
        duration_minutes: duration,
        note: hours.note.clone(),
        slots,
    }
}
