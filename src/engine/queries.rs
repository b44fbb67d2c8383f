use chrono::{NaiveDate, NaiveTime, TimeDelta};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::generate_slots;
use super::conflict::{find_conflict, validate_date_not_past, validate_guests, validate_time_not_past};
use super::{Engine, EngineError, SharedBranchState, hours, policy};

/// Window for "this week" in the dashboard stats.
const STATS_WEEK_DAYS: i64 = 7;

fn by_schedule(a: &Reservation, b: &Reservation) -> std::cmp::Ordering {
    (a.date, a.time, a.id).cmp(&(b.date, b.time, b.id))
}

impl Engine {
    fn branch_handles(&self) -> Vec<SharedBranchState> {
        let mut handles: Vec<(Ulid, SharedBranchState)> = self
            .state
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        handles.sort_by_key(|(id, _)| *id);
        handles.into_iter().map(|(_, s)| s).collect()
    }

    // ── Branches and hours ───────────────────────────────────

    pub async fn list_branches(&self) -> Vec<Branch> {
        let mut branches = Vec::new();
        for shared in self.branch_handles() {
            branches.push(shared.read().await.branch.clone());
        }
        branches
    }

    pub async fn get_branch(&self, id: Ulid) -> Result<Branch, EngineError> {
        Ok(self.branch_state(id)?.read().await.branch.clone())
    }

    pub async fn list_operating_hours(&self, branch_id: Ulid) -> Result<Vec<OperatingHours>, EngineError> {
        let shared = self.branch_state(branch_id)?;
        let guard = shared.read().await;
        Ok(guard.weekly_hours.values().cloned().collect())
    }

    pub async fn list_special_dates(&self, branch_id: Ulid) -> Result<Vec<SpecialDate>, EngineError> {
        let shared = self.branch_state(branch_id)?;
        let guard = shared.read().await;
        Ok(guard.special_dates.values().cloned().collect())
    }

    pub async fn resolve_hours(&self, branch_id: Ulid, date: NaiveDate) -> Result<DayHours, EngineError> {
        let shared = self.branch_state(branch_id)?;
        let guard = shared.read().await;
        Ok(hours::resolve(&guard, date))
    }

    // ── Tables and availability ──────────────────────────────

    pub async fn list_tables(&self, branch_id: Ulid) -> Result<Vec<Table>, EngineError> {
        let shared = self.branch_state(branch_id)?;
        let guard = shared.read().await;
        let mut tables: Vec<Table> = guard.tables.values().cloned().collect();
        tables.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(tables)
    }

    /// Bookable start times for a party on a date. Closed days come back as
    /// `SlotListing::Closed`; a branch with no table big enough is
    /// `NoSuitableTables`.
    pub async fn available_slots(
        &self,
        branch_id: Ulid,
        date: NaiveDate,
        guests: u32,
    ) -> Result<SlotListing, EngineError> {
        validate_guests(guests)?;
        let shared = self.branch_state(branch_id)?;
        let guard = shared.read().await;

        let day = hours::resolve(&guard, date);
        let duration = policy::duration_for(guests);
        let interval = guard.branch.slot_interval;
        if !day.is_open {
            return Ok(generate_slots(&day, interval, duration, 0, &[]));
        }

        let eligible = guard.tables.values().filter(|t| t.can_seat(guests)).count() as u32;
        if eligible == 0 {
            return Err(EngineError::NoSuitableTables { guests });
        }
        let booked: Vec<Window> = guard
            .reservations_on(date)
            .filter(|r| r.status.occupies_table())
            .map(|r| r.window())
            .collect();
        Ok(generate_slots(&day, interval, duration, eligible, &booked))
    }

    /// Active tables big enough for the party with nothing overlapping the
    /// window starting at `time`. Empty on a closed day; a time already past
    /// is refused.
    pub async fn available_tables(
        &self,
        branch_id: Ulid,
        date: NaiveDate,
        time: NaiveTime,
        guests: u32,
    ) -> Result<Vec<Table>, EngineError> {
        validate_guests(guests)?;
        let now = self.clock.now();
        validate_date_not_past(date, now)?;
        validate_time_not_past(date, time, now)?;
        let shared = self.branch_state(branch_id)?;
        let guard = shared.read().await;
        if !hours::resolve(&guard, date).is_open {
            return Ok(Vec::new());
        }

        let window = Window::starting_at(time, policy::duration_for(guests));
        let mut free: Vec<Table> = guard
            .tables
            .values()
            .filter(|t| t.can_seat(guests))
            .filter(|t| find_conflict(&guard, t.id, date, &window, None).is_none())
            .cloned()
            .collect();
        free.sort_by(|a, b| (a.seats, &a.label).cmp(&(b.seats, &b.label)));
        Ok(free)
    }

    // ── Reservations ─────────────────────────────────────────

    pub async fn get_by_confirmation(&self, confirmation_id: &str) -> Result<Reservation, EngineError> {
        let (branch_id, id) = self.lookup_confirmation(confirmation_id)?;
        let shared = self.branch_state(branch_id)?;
        let guard = shared.read().await;
        guard
            .reservations
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("reservation", confirmation_id))
    }

    /// Reservations matching the filter, in schedule order.
    pub async fn list_reservations(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, EngineError> {
        let handles = match filter.branch_id {
            Some(id) => vec![self.branch_state(id)?],
            None => self.branch_handles(),
        };
        let mut out = Vec::new();
        for shared in handles {
            let guard = shared.read().await;
            match filter.date {
                Some(date) => out.extend(guard.reservations_on(date).filter(|r| filter.matches(r)).cloned()),
                None => out.extend(guard.reservations.values().filter(|r| filter.matches(r)).cloned()),
            }
        }
        out.sort_by(by_schedule);
        Ok(out)
    }

    /// A customer's reservations by email (case-insensitive) or phone, most
    /// recent first.
    pub async fn customer_reservations(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Vec<Reservation>, EngineError> {
        let email = email.map(str::trim).filter(|e| !e.is_empty());
        let phone = phone.map(str::trim).filter(|p| !p.is_empty());
        if email.is_none() && phone.is_none() {
            return Err(EngineError::validation("email", "email or phone is required"));
        }

        let mut out = Vec::new();
        for shared in self.branch_handles() {
            let guard = shared.read().await;
            out.extend(
                guard
                    .reservations
                    .values()
                    .filter(|r| {
                        let by_email = email.is_some_and(|e| {
                            r.customer
                                .email
                                .as_deref()
                                .is_some_and(|mine| mine.eq_ignore_ascii_case(e))
                        });
                        let by_phone = phone.is_some_and(|p| r.customer.phone == p);
                        by_email || by_phone
                    })
                    .cloned(),
            );
        }
        out.sort_by(|a, b| by_schedule(b, a));
        out.truncate(MAX_CUSTOMER_LOOKUP_ROWS);
        Ok(out)
    }

    /// Non-cancelled reservations for today, by time.
    pub async fn todays_reservations(&self, branch_id: Ulid) -> Result<Vec<Reservation>, EngineError> {
        let today = self.clock.now().date();
        let shared = self.branch_state(branch_id)?;
        let guard = shared.read().await;
        let mut out: Vec<Reservation> = guard
            .reservations_on(today)
            .filter(|r| r.status.occupies_table())
            .cloned()
            .collect();
        out.sort_by(by_schedule);
        Ok(out)
    }

    /// Dashboard counters for one branch, or all branches.
    pub async fn stats(&self, branch_id: Option<Ulid>) -> Result<ReservationStats, EngineError> {
        let handles = match branch_id {
            Some(id) => vec![self.branch_state(id)?],
            None => self.branch_handles(),
        };
        let today = self.clock.now().date();
        let week_start = today - TimeDelta::days(STATS_WEEK_DAYS);

        let mut stats = ReservationStats::default();
        for shared in handles {
            let guard = shared.read().await;
            for r in guard.reservations.values() {
                *stats.by_status.entry(r.status.as_str()).or_default() += 1;
                if r.date == today && r.status.occupies_table() {
                    stats.today += 1;
                }
                match r.status {
                    ReservationStatus::Pending => stats.pending += 1,
                    ReservationStatus::Confirmed => stats.confirmed += 1,
                    ReservationStatus::Completed if r.date >= week_start => {
                        stats.completed_this_week += 1
                    }
                    ReservationStatus::NoShow if r.date >= week_start => stats.no_shows_this_week += 1,
                    _ => {}
                }
                if r.date >= today && !r.status.is_terminal() {
                    stats.upcoming += 1;
                }
            }
        }
        Ok(stats)
    }
}
