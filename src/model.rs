use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minutes since midnight of the reservation date.
pub type Minutes = u32;

pub const MINUTES_PER_DAY: Minutes = 24 * 60;

pub fn minute_of_day(t: NaiveTime) -> Minutes {
    t.hour() * 60 + t.minute()
}

/// Half-open interval `[start, end)`. `end` may pass `MINUTES_PER_DAY` when a
/// booking runs past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: Minutes,
    pub end: Minutes,
}

impl Window {
    pub fn new(start: Minutes, end: Minutes) -> Self {
        debug_assert!(start < end, "Window start must be before end");
        Self { start, end }
    }

    pub fn starting_at(start: NaiveTime, duration: Minutes) -> Self {
        let start = minute_of_day(start);
        Self::new(start, start + duration)
    }

    /// Build a window from wall-clock bounds. An end at or before the start is
    /// read as the next day.
    pub fn from_times(start: NaiveTime, end: NaiveTime) -> Self {
        let start = minute_of_day(start);
        let mut end = minute_of_day(end);
        if end <= start {
            end += MINUTES_PER_DAY;
        }
        Self::new(start, end)
    }

    pub fn duration(&self) -> Minutes {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Window) -> bool {
        self.start < other.end && other.start < self.end
    }
}

// ── Branch and its hours ─────────────────────────────────────────

pub const DEFAULT_SLOT_INTERVAL: Minutes = 30;
pub const DEFAULT_RESERVATION_DURATION: Minutes = 90;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: Ulid,
    pub name: String,
    /// Default hours, used when no weekly or special-date row applies.
    pub opening_time: NaiveTime,
    pub closing_time: NaiveTime,
    /// Step between generated slot start times, in minutes.
    pub slot_interval: Minutes,
    pub default_duration: Minutes,
}

impl Branch {
    /// A branch open 11:00 to 22:00 with 30-minute slots.
    pub fn new(id: Ulid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            opening_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap_or_default(),
            closing_time: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default(),
            slot_interval: DEFAULT_SLOT_INTERVAL,
            default_duration: DEFAULT_RESERVATION_DURATION,
        }
    }
}

/// Weekly hours for one day. `day_of_week` runs Monday = 0 .. Sunday = 6.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingHours {
    pub day_of_week: u8,
    pub opening_time: NaiveTime,
    pub closing_time: NaiveTime,
    pub is_closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpecialDateKind {
    Holiday,
    Ramadan,
    Event,
    Maintenance,
    #[default]
    Special,
}

impl SpecialDateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialDateKind::Holiday => "holiday",
            SpecialDateKind::Ramadan => "ramadan",
            SpecialDateKind::Event => "event",
            SpecialDateKind::Maintenance => "maintenance",
            SpecialDateKind::Special => "special",
        }
    }
}

impl FromStr for SpecialDateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "holiday" => Ok(SpecialDateKind::Holiday),
            "ramadan" => Ok(SpecialDateKind::Ramadan),
            "event" => Ok(SpecialDateKind::Event),
            "maintenance" => Ok(SpecialDateKind::Maintenance),
            "special" => Ok(SpecialDateKind::Special),
            other => Err(format!("unknown special date type: {other}")),
        }
    }
}

/// A one-off override for a calendar date (holiday closure, event hours, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialDate {
    pub id: Ulid,
    pub date: NaiveDate,
    pub kind: SpecialDateKind,
    pub is_closed: bool,
    pub opening_time: Option<NaiveTime>,
    pub closing_time: Option<NaiveTime>,
    pub note: String,
}

// ── Tables ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TableStatus {
    #[default]
    Active,
    Inactive,
    Maintenance,
}

impl TableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Active => "active",
            TableStatus::Inactive => "inactive",
            TableStatus::Maintenance => "maintenance",
        }
    }
}

impl FromStr for TableStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(TableStatus::Active),
            "inactive" => Ok(TableStatus::Inactive),
            "maintenance" => Ok(TableStatus::Maintenance),
            other => Err(format!("unknown table status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: Ulid,
    pub branch_id: Ulid,
    /// Short code unique within the branch, e.g. `T1` or `P2`.
    pub label: String,
    pub name: String,
    pub location: Option<String>,
    pub seats: u32,
    pub status: TableStatus,
}

impl Table {
    /// Active and large enough for the party.
    pub fn can_seat(&self, guests: u32) -> bool {
        self.status == TableStatus::Active && self.seats >= guests
    }
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
            ReservationStatus::NoShow => "no_show",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Cancelled | ReservationStatus::Completed | ReservationStatus::NoShow
        )
    }

    /// Whether a reservation in this status still holds its table.
    pub fn occupies_table(&self) -> bool {
        !matches!(self, ReservationStatus::Cancelled)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ReservationStatus::Pending),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "cancelled" | "canceled" => Ok(ReservationStatus::Cancelled),
            "completed" => Ok(ReservationStatus::Completed),
            "no_show" | "noshow" => Ok(ReservationStatus::NoShow),
            other => Err(format!("unknown reservation status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    /// Public token, assigned once at creation.
    pub confirmation_id: String,
    pub branch_id: Ulid,
    /// Soft link: cleared when the table is deleted.
    pub table_id: Option<Ulid>,
    pub customer: Customer,
    pub date: NaiveDate,
    pub time: NaiveTime,
    /// Wall-clock end, may wrap past midnight. `None` on rows written
    /// before end times were stored.
    pub end_time: Option<NaiveTime>,
    pub duration_minutes: Minutes,
    pub guests: u32,
    pub status: ReservationStatus,
    pub special_requests: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Reservation {
    /// Occupied window on `date`. Falls back to `time + duration` when no end
    /// time is stored.
    pub fn window(&self) -> Window {
        match self.end_time {
            Some(end) => Window::from_times(self.time, end),
            None => Window::starting_at(self.time, self.duration_minutes),
        }
    }
}

/// One per mutation. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BranchCreated {
        branch: Branch,
    },
    OperatingHoursSet {
        branch_id: Ulid,
        hours: OperatingHours,
    },
    OperatingHoursCleared {
        branch_id: Ulid,
        day_of_week: u8,
    },
    SpecialDateSet {
        branch_id: Ulid,
        special: SpecialDate,
    },
    SpecialDateRemoved {
        branch_id: Ulid,
        id: Ulid,
    },
    TableAdded {
        table: Table,
    },
    TableStatusChanged {
        branch_id: Ulid,
        table_id: Ulid,
        status: TableStatus,
    },
    TableDeleted {
        branch_id: Ulid,
        table_id: Ulid,
    },
    ReservationCreated {
        reservation: Reservation,
    },
    ReservationUpdated {
        reservation: Reservation,
    },
    ReservationStatusChanged {
        branch_id: Ulid,
        id: Ulid,
        status: ReservationStatus,
        at: NaiveDateTime,
    },
}

impl Event {
    pub fn branch_id(&self) -> Ulid {
        match self {
            Event::BranchCreated { branch } => branch.id,
            Event::TableAdded { table } => table.branch_id,
            Event::ReservationCreated { reservation } | Event::ReservationUpdated { reservation } => {
                reservation.branch_id
            }
            Event::OperatingHoursSet { branch_id, .. }
            | Event::OperatingHoursCleared { branch_id, .. }
            | Event::SpecialDateSet { branch_id, .. }
            | Event::SpecialDateRemoved { branch_id, .. }
            | Event::TableStatusChanged { branch_id, .. }
            | Event::TableDeleted { branch_id, .. }
            | Event::ReservationStatusChanged { branch_id, .. } => *branch_id,
        }
    }
}

// ── Requests ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub branch_id: Ulid,
    pub table_id: Option<Ulid>,
    pub customer: Customer,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub guests: u32,
    pub special_requests: Option<String>,
}

/// Partial edit of a reservation. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationPatch {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub guests: Option<u32>,
    pub table_id: Option<Ulid>,
    pub customer_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub special_requests: Option<String>,
}

impl ReservationPatch {
    pub fn touches_schedule(&self) -> bool {
        self.date.is_some() || self.time.is_some() || self.guests.is_some() || self.table_id.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationFilter {
    pub branch_id: Option<Ulid>,
    pub date: Option<NaiveDate>,
    pub status: Option<ReservationStatus>,
}

impl ReservationFilter {
    pub fn matches(&self, r: &Reservation) -> bool {
        self.branch_id.is_none_or(|b| r.branch_id == b)
            && self.date.is_none_or(|d| r.date == d)
            && self.status.is_none_or(|s| r.status == s)
    }
}

// ── Query result types ───────────────────────────────────────────

/// Effective hours of a branch on one calendar date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayHours {
    pub is_open: bool,
    pub opening: Option<NaiveTime>,
    pub closing: Option<NaiveTime>,
    pub note: Option<String>,
}

impl DayHours {
    pub fn open(opening: NaiveTime, closing: NaiveTime, note: Option<String>) -> Self {
        Self {
            is_open: true,
            opening: Some(opening),
            closing: Some(closing),
            note,
        }
    }

    pub fn closed(note: impl Into<String>) -> Self {
        Self {
            is_open: false,
            opening: None,
            closing: None,
            note: Some(note.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MealPeriod {
    Lunch,
    Afternoon,
    Dinner,
}

impl MealPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MealPeriod::Lunch => "lunch",
            MealPeriod::Afternoon => "afternoon",
            MealPeriod::Dinner => "dinner",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub time: NaiveTime,
    /// 12-hour rendering, e.g. `7:30 PM`.
    pub display: String,
    pub available_tables: u32,
    pub duration_minutes: Minutes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotBuckets {
    pub lunch: Vec<Slot>,
    pub afternoon: Vec<Slot>,
    pub dinner: Vec<Slot>,
}

impl SlotBuckets {
    pub fn push(&mut self, period: MealPeriod, slot: Slot) {
        match period {
            MealPeriod::Lunch => self.lunch.push(slot),
            MealPeriod::Afternoon => self.afternoon.push(slot),
            MealPeriod::Dinner => self.dinner.push(slot),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lunch.is_empty() && self.afternoon.is_empty() && self.dinner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lunch.len() + self.afternoon.len() + self.dinner.len()
    }

    /// All slots in start order, tagged with their period.
    pub fn iter(&self) -> impl Iterator<Item = (MealPeriod, &Slot)> {
        self.lunch
            .iter()
            .map(|s| (MealPeriod::Lunch, s))
            .chain(self.afternoon.iter().map(|s| (MealPeriod::Afternoon, s)))
            .chain(self.dinner.iter().map(|s| (MealPeriod::Dinner, s)))
    }
}

/// Outcome of a slot query. A fully booked day is `Open` with empty buckets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotListing {
    Closed {
        note: String,
    },
    Open {
        opening: NaiveTime,
        closing: NaiveTime,
        duration_minutes: Minutes,
        note: Option<String>,
        slots: SlotBuckets,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationStats {
    /// Non-cancelled reservations dated today.
    pub today: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub completed_this_week: usize,
    pub no_shows_this_week: usize,
    /// Pending or confirmed, dated today or later.
    pub upcoming: usize,
    /// Every reservation counted by status name; absent statuses are left out.
    pub by_status: BTreeMap<&'static str, usize>,
}
