//! Effective opening hours for a branch on a date.
//!
//! Three tiers, tried in order, first match wins: a special date for the exact
//! day, the weekly row for its weekday, the branch defaults. Tiers never merge.

use chrono::{Datelike, NaiveDate};

use crate::model::DayHours;

use super::store::BranchState;

pub const DEFAULT_CLOSED_NOTE: &str = "Closed";
pub const WEEKLY_CLOSED_NOTE: &str = "Closed on this day";

type Resolver = fn(&BranchState, NaiveDate) -> Option<DayHours>;

const CHAIN: [Resolver; 3] = [special_date, weekly_hours, branch_default];

pub fn resolve(state: &BranchState, date: NaiveDate) -> DayHours {
    CHAIN
        .iter()
        .find_map(|tier| tier(state, date))
        .unwrap_or_else(|| DayHours::closed(DEFAULT_CLOSED_NOTE))
}

/// Monday = 0 .. Sunday = 6.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

fn special_date(state: &BranchState, date: NaiveDate) -> Option<DayHours> {
    let special = state.special_dates.get(&date)?;
    if special.is_closed {
        let note = if special.note.is_empty() {
            DEFAULT_CLOSED_NOTE.to_string()
        } else {
            special.note.clone()
        };
        return Some(DayHours::closed(note));
    }
    let note = Some(special.note.clone()).filter(|n| !n.is_empty());
    match (special.opening_time, special.closing_time) {
        (Some(opening), Some(closing)) => Some(DayHours::open(opening, closing, note)),
        // stored rows always carry both; a partial row falls through
        _ => None,
    }
}

fn weekly_hours(state: &BranchState, date: NaiveDate) -> Option<DayHours> {
    let hours = state.weekly_hours.get(&day_of_week(date))?;
    if hours.is_closed {
        Some(DayHours::closed(WEEKLY_CLOSED_NOTE))
    } else {
        Some(DayHours::open(hours.opening_time, hours.closing_time, None))
    }
}

fn branch_default(state: &BranchState, _date: NaiveDate) -> Option<DayHours> {
    Some(DayHours::open(
        state.branch.opening_time,
        state.branch.closing_time,
        None,
    ))
}
