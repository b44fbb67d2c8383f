use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use dashmap::mapref::entry::Entry;
use tokio::sync::{RwLock, oneshot};
use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{
    check_no_conflict, validate_customer, validate_date_not_past, validate_guests,
    validate_table_for, validate_text, validate_time_not_past,
};
use super::lifecycle::{self, Transition};
use super::{BranchState, Engine, EngineError, WalCommand, hours, policy};

/// The date must be open and the booking must end by closing.
fn check_bookable(
    state: &BranchState,
    date: NaiveDate,
    time: NaiveTime,
    duration: Minutes,
) -> Result<(), EngineError> {
    let day = hours::resolve(state, date);
    let (true, Some(opening), Some(closing)) = (day.is_open, day.opening, day.closing) else {
        let note = day.note.unwrap_or_else(|| hours::DEFAULT_CLOSED_NOTE.into());
        return Err(EngineError::validation(
            "date",
            format!("branch is closed on {date}: {note}"),
        ));
    };
    if policy::runs_past_closing(time, duration, opening, closing) {
        return Err(EngineError::validation(
            "time",
            format!(
                "reservation would extend past closing time ({})",
                closing.format("%H:%M")
            ),
        ));
    }
    Ok(())
}

fn count_conflict(result: Result<(), EngineError>) -> Result<(), EngineError> {
    if matches!(result, Err(EngineError::Conflict { .. })) {
        metrics::counter!(crate::observability::RESERVATION_CONFLICTS_TOTAL).increment(1);
    }
    result
}

impl Engine {
    // ── Branches and hours ───────────────────────────────────

    pub async fn create_branch(&self, branch: Branch) -> Result<(), EngineError> {
        validate_text("name", &branch.name, MAX_NAME_LEN, true)?;
        if !(MIN_SLOT_INTERVAL..=MAX_SLOT_INTERVAL).contains(&branch.slot_interval) {
            return Err(EngineError::validation(
                "slot_interval",
                format!("must be between {MIN_SLOT_INTERVAL} and {MAX_SLOT_INTERVAL} minutes"),
            ));
        }
        if !(MIN_DEFAULT_DURATION..=MAX_DEFAULT_DURATION).contains(&branch.default_duration) {
            return Err(EngineError::validation(
                "default_duration",
                format!(
                    "must be between {MIN_DEFAULT_DURATION} and {MAX_DEFAULT_DURATION} minutes"
                ),
            ));
        }
        if branch.opening_time == branch.closing_time {
            return Err(EngineError::validation(
                "closing_time",
                "must differ from opening_time",
            ));
        }

        let _catalog = self.catalog.read().await;
        if self.state.len() >= MAX_BRANCHES {
            return Err(EngineError::LimitExceeded("too many branches"));
        }
        if self.state.contains_key(&branch.id) {
            return Err(EngineError::AlreadyExists(branch.id));
        }

        let event = Event::BranchCreated {
            branch: branch.clone(),
        };
        self.wal_append(&event).await?;
        info!("branch {} created ({})", branch.id, branch.name);
        self.state
            .insert(branch.id, Arc::new(RwLock::new(BranchState::new(branch))));
        Ok(())
    }

    /// Upsert the weekly row for `hours.day_of_week`.
    pub async fn set_operating_hours(
        &self,
        branch_id: Ulid,
        hours: OperatingHours,
    ) -> Result<(), EngineError> {
        if hours.day_of_week > 6 {
            return Err(EngineError::validation(
                "day_of_week",
                "must be 0 (Monday) to 6 (Sunday)",
            ));
        }
        if !hours.is_closed && hours.opening_time == hours.closing_time {
            return Err(EngineError::validation(
                "closing_time",
                "must differ from opening_time",
            ));
        }
        let mut guard = self.branch_write(branch_id).await?;
        let event = Event::OperatingHoursSet { branch_id, hours };
        self.persist_and_apply(&mut guard, &event).await
    }

    pub async fn clear_operating_hours(&self, branch_id: Ulid, day_of_week: u8) -> Result<(), EngineError> {
        let mut guard = self.branch_write(branch_id).await?;
        if !guard.weekly_hours.contains_key(&day_of_week) {
            return Err(EngineError::not_found(
                "operating hours",
                format!("{branch_id}/{day_of_week}"),
            ));
        }
        let event = Event::OperatingHoursCleared {
            branch_id,
            day_of_week,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Upsert the override for `special.date`. An existing row on that date
    /// keeps its id. Returns the stored row.
    pub async fn set_special_date(
        &self,
        branch_id: Ulid,
        mut special: SpecialDate,
    ) -> Result<SpecialDate, EngineError> {
        validate_text("note", &special.note, MAX_NOTE_LEN, false)?;
        if !special.is_closed {
            let (Some(opening), Some(closing)) = (special.opening_time, special.closing_time) else {
                let field = if special.opening_time.is_none() {
                    "opening_time"
                } else {
                    "closing_time"
                };
                return Err(EngineError::validation(
                    field,
                    "required when the date is not closed",
                ));
            };
            if opening == closing {
                return Err(EngineError::validation(
                    "closing_time",
                    "must differ from opening_time",
                ));
            }
        }

        let mut guard = self.branch_write(branch_id).await?;
        match guard.special_dates.get(&special.date) {
            Some(existing) => special.id = existing.id,
            None if self.entity_to_branch.contains_key(&special.id) => {
                return Err(EngineError::AlreadyExists(special.id));
            }
            None => {}
        }
        let event = Event::SpecialDateSet {
            branch_id,
            special: special.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(special)
    }

    pub async fn remove_special_date(&self, id: Ulid) -> Result<(), EngineError> {
        let mut guard = self.entity_write("special date", id).await?;
        if guard.special_date_by_id(id).is_none() {
            return Err(EngineError::not_found("special date", id));
        }
        let event = Event::SpecialDateRemoved {
            branch_id: guard.id(),
            id,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    // ── Tables ───────────────────────────────────────────────

    pub async fn add_table(&self, table: Table) -> Result<(), EngineError> {
        validate_text("label", &table.label, MAX_LABEL_LEN, true)?;
        validate_text("name", &table.name, MAX_NAME_LEN, false)?;
        if let Some(location) = &table.location {
            validate_text("location", location, MAX_NAME_LEN, false)?;
        }
        if !(1..=MAX_TABLE_SEATS).contains(&table.seats) {
            return Err(EngineError::validation(
                "seats",
                format!("must be between 1 and {MAX_TABLE_SEATS}"),
            ));
        }
        if self.entity_to_branch.contains_key(&table.id) {
            return Err(EngineError::AlreadyExists(table.id));
        }

        let mut guard = self.branch_write(table.branch_id).await?;
        if guard.tables.len() >= MAX_TABLES_PER_BRANCH {
            return Err(EngineError::LimitExceeded("too many tables on branch"));
        }
        if guard.table_by_label(&table.label).is_some() {
            return Err(EngineError::validation(
                "label",
                format!("{} is already used on this branch", table.label),
            ));
        }
        let event = Event::TableAdded { table };
        self.persist_and_apply(&mut guard, &event).await
    }

    pub async fn set_table_status(&self, table_id: Ulid, status: TableStatus) -> Result<(), EngineError> {
        let mut guard = self.entity_write("table", table_id).await?;
        let event = Event::TableStatusChanged {
            branch_id: guard.id(),
            table_id,
            status,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Remove a table. Its reservations stay, unassigned.
    pub async fn delete_table(&self, table_id: Ulid) -> Result<(), EngineError> {
        let mut guard = self.entity_write("table", table_id).await?;
        let event = Event::TableDeleted {
            branch_id: guard.id(),
            table_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("table {table_id} deleted");
        Ok(())
    }

    // ── Reservations ─────────────────────────────────────────

    pub async fn create_reservation(&self, req: NewReservation) -> Result<Reservation, EngineError> {
        validate_guests(req.guests)?;
        validate_customer(&req.customer)?;
        let special_requests = req.special_requests.unwrap_or_default();
        validate_text(
            "special_requests",
            &special_requests,
            MAX_SPECIAL_REQUESTS_LEN,
            false,
        )?;
        let now = self.clock.now();
        validate_date_not_past(req.date, now)?;
        validate_time_not_past(req.date, req.time, now)?;

        let mut guard = self.branch_write(req.branch_id).await?;
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_BRANCH {
            return Err(EngineError::LimitExceeded("too many reservations on branch"));
        }
        if let Some(table_id) = req.table_id {
            validate_table_for(&guard, table_id, req.guests)?;
        }

        let duration = policy::duration_for(req.guests);
        check_bookable(&guard, req.date, req.time, duration)?;
        if let Some(table_id) = req.table_id {
            let window = Window::starting_at(req.time, duration);
            count_conflict(check_no_conflict(&guard, table_id, req.date, &window, None))?;
        }

        let id = Ulid::new();
        let confirmation_id = self.reserve_confirmation(req.branch_id, id)?;
        let reservation = Reservation {
            id,
            confirmation_id: confirmation_id.clone(),
            branch_id: req.branch_id,
            table_id: req.table_id,
            customer: req.customer,
            date: req.date,
            time: req.time,
            end_time: Some(policy::end_time(req.time, duration)),
            duration_minutes: duration,
            guests: req.guests,
            status: ReservationStatus::Pending,
            special_requests,
            created_at: now,
            updated_at: now,
        };

        let event = Event::ReservationCreated {
            reservation: reservation.clone(),
        };
        if let Err(e) = count_conflict(self.persist_and_apply(&mut guard, &event).await) {
            self.confirmations.remove(&confirmation_id);
            return Err(e);
        }
        drop(guard);

        metrics::counter!(crate::observability::RESERVATIONS_CREATED_TOTAL).increment(1);
        info!(
            "reservation {} created: {} guests on {} at {}",
            reservation.confirmation_id,
            reservation.guests,
            reservation.date,
            reservation.time.format("%H:%M")
        );
        self.notifier.dispatch(reservation.clone());
        Ok(reservation)
    }

    /// Claim an unused confirmation id for a reservation.
    fn reserve_confirmation(&self, branch_id: Ulid, reservation_id: Ulid) -> Result<String, EngineError> {
        for _ in 0..MAX_CONFIRMATION_ATTEMPTS {
            let candidate = self.ids.generate();
            if let Entry::Vacant(slot) = self.confirmations.entry(candidate.clone()) {
                slot.insert((branch_id, reservation_id));
                return Ok(candidate);
            }
            warn!("confirmation id collision on {candidate}, retrying");
        }
        Err(EngineError::Internal(format!(
            "no unused confirmation id after {MAX_CONFIRMATION_ATTEMPTS} attempts"
        )))
    }

    pub async fn update_reservation(
        &self,
        confirmation_id: &str,
        patch: ReservationPatch,
    ) -> Result<Reservation, EngineError> {
        let (branch_id, id) = self.lookup_confirmation(confirmation_id)?;
        let mut guard = self.branch_write(branch_id).await?;
        let current = guard
            .reservations
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("reservation", confirmation_id))?;

        if patch.touches_schedule() && current.status.is_terminal() {
            return Err(EngineError::validation(
                "status",
                format!("cannot reschedule a {} reservation", current.status),
            ));
        }

        let now = self.clock.now();
        let mut next = current.clone();

        if let Some(name) = patch.customer_name {
            next.customer.name = name;
        }
        if let Some(phone) = patch.phone {
            next.customer.phone = phone;
        }
        if let Some(email) = patch.email {
            next.customer.email = Some(email).filter(|e| !e.trim().is_empty());
        }
        validate_customer(&next.customer)?;
        if let Some(requests) = patch.special_requests {
            validate_text("special_requests", &requests, MAX_SPECIAL_REQUESTS_LEN, false)?;
            next.special_requests = requests;
        }

        if let Some(date) = patch.date {
            next.date = date;
        }
        if let Some(time) = patch.time {
            next.time = time;
        }
        if let Some(guests) = patch.guests {
            validate_guests(guests)?;
            next.guests = guests;
        }
        if let Some(table_id) = patch.table_id {
            next.table_id = Some(table_id);
        }

        let date_changed = next.date != current.date;
        let time_changed = next.time != current.time;
        if date_changed {
            validate_date_not_past(next.date, now)?;
        }
        if date_changed || time_changed {
            validate_time_not_past(next.date, next.time, now)?;
        }
        let table_changed = next.table_id != current.table_id;
        if let Some(table_id) = next.table_id
            && (table_changed || next.guests != current.guests)
        {
            validate_table_for(&guard, table_id, next.guests)?;
        }

        next.end_time = Some(policy::end_time(next.time, next.duration_minutes));
        if date_changed || time_changed || table_changed {
            check_bookable(&guard, next.date, next.time, next.duration_minutes)?;
            if let Some(table_id) = next.table_id {
                count_conflict(check_no_conflict(
                    &guard,
                    table_id,
                    next.date,
                    &next.window(),
                    Some(id),
                ))?;
            }
        }
        next.updated_at = now;

        let event = Event::ReservationUpdated {
            reservation: next.clone(),
        };
        count_conflict(self.persist_and_apply(&mut guard, &event).await)?;
        info!("reservation {} updated", next.confirmation_id);
        Ok(next)
    }

    /// Apply a lifecycle transition. Terminal moves skip every date and time
    /// check.
    pub async fn transition(
        &self,
        confirmation_id: &str,
        transition: Transition,
    ) -> Result<Reservation, EngineError> {
        let (branch_id, id) = self.lookup_confirmation(confirmation_id)?;
        let mut guard = self.branch_write(branch_id).await?;
        let current = guard
            .reservations
            .get(&id)
            .ok_or_else(|| EngineError::not_found("reservation", confirmation_id))?;
        let status = lifecycle::advance(current.status, transition)?;

        let event = Event::ReservationStatusChanged {
            branch_id,
            id,
            status,
            at: self.clock.now(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("reservation {confirmation_id} is now {status}");
        guard
            .reservations
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::Internal(format!("reservation {id} vanished")))
    }

    pub async fn confirm(&self, confirmation_id: &str) -> Result<Reservation, EngineError> {
        self.transition(confirmation_id, Transition::Confirm).await
    }

    pub async fn cancel(&self, confirmation_id: &str) -> Result<Reservation, EngineError> {
        self.transition(confirmation_id, Transition::Cancel).await
    }

    pub async fn complete(&self, confirmation_id: &str) -> Result<Reservation, EngineError> {
        self.transition(confirmation_id, Transition::Complete).await
    }

    pub async fn mark_no_show(&self, confirmation_id: &str) -> Result<Reservation, EngineError> {
        self.transition(confirmation_id, Transition::NoShow).await
    }

    /// Move to `status` through the matching transition.
    pub async fn set_status(
        &self,
        confirmation_id: &str,
        status: ReservationStatus,
    ) -> Result<Reservation, EngineError> {
        let transition = Transition::into_status(status).ok_or_else(|| {
            EngineError::validation("status", "reservations cannot return to pending")
        })?;
        self.transition(confirmation_id, transition).await
    }

    // ── Maintenance ──────────────────────────────────────────

    /// Rewrite the WAL as the minimal event set for the current state. Writes
    /// wait until the new log is in place.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _catalog = self.catalog.write().await;

        let mut branches: Vec<_> = self
            .state
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        branches.sort_by_key(|(id, _)| *id);

        let mut guards = Vec::with_capacity(branches.len());
        let mut events = Vec::new();
        for (_, shared) in branches {
            let guard = shared.read_owned().await;
            events.extend(guard.snapshot());
            guards.push(guard);
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
