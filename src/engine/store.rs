use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::EngineError;
use super::conflict::check_no_conflict;

/// Everything the engine knows about one branch. Lives behind the branch's
/// `RwLock`; all writes go through `apply_event`.
#[derive(Debug, Clone)]
pub struct BranchState {
    pub branch: Branch,
    /// Keyed by day of week, Monday = 0.
    pub weekly_hours: BTreeMap<u8, OperatingHours>,
    pub special_dates: BTreeMap<NaiveDate, SpecialDate>,
    pub tables: BTreeMap<Ulid, Table>,
    pub reservations: HashMap<Ulid, Reservation>,
    /// Every reservation on a date, any status.
    by_date: HashMap<NaiveDate, Vec<Ulid>>,
    /// Reservations holding a table on a date (cancelled ones drop out).
    bookings: HashMap<(Ulid, NaiveDate), Vec<Ulid>>,
}

impl BranchState {
    pub fn new(branch: Branch) -> Self {
        Self {
            branch,
            weekly_hours: BTreeMap::new(),
            special_dates: BTreeMap::new(),
            tables: BTreeMap::new(),
            reservations: HashMap::new(),
            by_date: HashMap::new(),
            bookings: HashMap::new(),
        }
    }

    pub fn id(&self) -> Ulid {
        self.branch.id
    }

    pub fn reservations_on(&self, date: NaiveDate) -> impl Iterator<Item = &Reservation> {
        self.by_date
            .get(&date)
            .into_iter()
            .flatten()
            .filter_map(|id| self.reservations.get(id))
    }

    pub fn table_bookings(&self, table_id: Ulid, date: NaiveDate) -> impl Iterator<Item = &Reservation> {
        self.bookings
            .get(&(table_id, date))
            .into_iter()
            .flatten()
            .filter_map(|id| self.reservations.get(id))
    }

    pub fn table_by_label(&self, label: &str) -> Option<&Table> {
        self.tables.values().find(|t| t.label.eq_ignore_ascii_case(label))
    }

    pub fn special_date_by_id(&self, id: Ulid) -> Option<&SpecialDate> {
        self.special_dates.values().find(|s| s.id == id)
    }

    /// Store-level constraints an event must satisfy before it is logged.
    /// A reservation that would overlap another on the same table and date
    /// is refused here even when the caller never pre-checked.
    pub fn admit(&self, event: &Event) -> Result<(), EngineError> {
        match event {
            Event::ReservationCreated { reservation } | Event::ReservationUpdated { reservation } => {
                self.check_occupancy(reservation)
            }
            Event::ReservationStatusChanged { id, status, .. } if status.occupies_table() => {
                match self.reservations.get(id) {
                    Some(r) if !r.status.occupies_table() => {
                        let mut revived = r.clone();
                        revived.status = *status;
                        self.check_occupancy(&revived)
                    }
                    _ => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    fn check_occupancy(&self, r: &Reservation) -> Result<(), EngineError> {
        match r.table_id {
            Some(table_id) if r.status.occupies_table() => {
                check_no_conflict(self, table_id, r.date, &r.window(), Some(r.id))
            }
            _ => Ok(()),
        }
    }

    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::OperatingHoursSet { hours, .. } => {
                self.weekly_hours.insert(hours.day_of_week, hours.clone());
            }
            Event::OperatingHoursCleared { day_of_week, .. } => {
                self.weekly_hours.remove(day_of_week);
            }
            Event::SpecialDateSet { special, .. } => {
                self.special_dates.insert(special.date, special.clone());
            }
            Event::SpecialDateRemoved { id, .. } => {
                self.special_dates.retain(|_, s| s.id != *id);
            }
            Event::TableAdded { table } => {
                self.tables.insert(table.id, table.clone());
            }
            Event::TableStatusChanged { table_id, status, .. } => {
                if let Some(table) = self.tables.get_mut(table_id) {
                    table.status = *status;
                }
            }
            Event::TableDeleted { table_id, .. } => {
                self.tables.remove(table_id);
                self.bookings.retain(|(t, _), _| t != table_id);
                for r in self.reservations.values_mut() {
                    if r.table_id == Some(*table_id) {
                        r.table_id = None;
                    }
                }
            }
            Event::ReservationCreated { reservation } => {
                self.by_date
                    .entry(reservation.date)
                    .or_default()
                    .push(reservation.id);
                self.occupy(reservation);
                self.reservations.insert(reservation.id, reservation.clone());
            }
            Event::ReservationUpdated { reservation } => {
                if let Some(old) = self.reservations.remove(&reservation.id) {
                    self.release(&old);
                    if old.date != reservation.date {
                        remove_id(&mut self.by_date, &old.date, old.id);
                        self.by_date
                            .entry(reservation.date)
                            .or_default()
                            .push(reservation.id);
                    }
                }
                self.occupy(reservation);
                self.reservations.insert(reservation.id, reservation.clone());
            }
            Event::ReservationStatusChanged { id, status, at, .. } => {
                let Some(mut r) = self.reservations.remove(id) else {
                    return;
                };
                self.release(&r);
                r.status = *status;
                r.updated_at = *at;
                self.occupy(&r);
                self.reservations.insert(r.id, r);
            }
            // BranchCreated is handled at the DashMap level
            Event::BranchCreated { .. } => {}
        }
    }

    fn occupy(&mut self, r: &Reservation) {
        if let Some(table_id) = r.table_id
            && r.status.occupies_table()
        {
            self.bookings.entry((table_id, r.date)).or_default().push(r.id);
        }
    }

    fn release(&mut self, r: &Reservation) {
        if let Some(table_id) = r.table_id {
            remove_id(&mut self.bookings, &(table_id, r.date), r.id);
        }
    }

    /// Minimal event list that rebuilds this branch, used by compaction.
    pub fn snapshot(&self) -> Vec<Event> {
        let branch_id = self.id();
        let mut events = vec![Event::BranchCreated {
            branch: self.branch.clone(),
        }];
        events.extend(self.weekly_hours.values().map(|hours| Event::OperatingHoursSet {
            branch_id,
            hours: hours.clone(),
        }));
        events.extend(self.special_dates.values().map(|special| Event::SpecialDateSet {
            branch_id,
            special: special.clone(),
        }));
        events.extend(self.tables.values().map(|table| Event::TableAdded {
            table: table.clone(),
        }));
        let mut reservations: Vec<&Reservation> = self.reservations.values().collect();
        reservations.sort_by_key(|r| r.id);
        events.extend(reservations.into_iter().map(|r| Event::ReservationCreated {
            reservation: r.clone(),
        }));
        events
    }
}

fn remove_id<K: std::hash::Hash + Eq>(index: &mut HashMap<K, Vec<Ulid>>, key: &K, id: Ulid) {
    if let Some(ids) = index.get_mut(key) {
        ids.retain(|x| *x != id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}
