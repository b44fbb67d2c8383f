mod availability;
mod conflict;
mod error;
pub mod hours;
pub mod lifecycle;
mod mutations;
pub mod policy;
mod queries;
mod store;

pub use availability::{display_time, generate_slots, meal_period};
pub use conflict::overlaps;
pub use error::EngineError;
pub use lifecycle::Transition;
pub use store::BranchState;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use tracing::warn;
use ulid::Ulid;

use crate::clock::{Clock, SystemClock};
use crate::confirmation::{ConfirmationIds, UlidConfirmationIds};
use crate::model::*;
use crate::notify::{ConfirmationSender, Notifier, NotifyHub};
use crate::wal::Wal;

pub type SharedBranchState = Arc<RwLock<BranchState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that arrive together share one fsync: take the first,
/// drain whatever else is already queued, flush once, answer everyone.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let first = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![first];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let appended = batch.iter().try_for_each(|(event, _)| wal.append_buffered(event));
    // flush even after a failed append so stray bytes don't join the next batch
    let flushed = wal.flush_sync();
    let result = appended.and(flushed);

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    for (_, tx) in batch {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => commit_batch(wal, vec![(event, response)]),
    }
}

/// Injectable dependencies of the engine.
#[derive(Clone)]
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn ConfirmationIds>,
    pub notifier: Notifier,
}

impl Collaborators {
    /// System clock, ULID-backed confirmation ids, the given sender.
    pub fn new(sender: Arc<dyn ConfirmationSender>, notify_attempts: u32) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            ids: Arc::new(UlidConfirmationIds),
            notifier: Notifier::new(sender, notify_attempts),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn ConfirmationIds>) -> Self {
        self.ids = ids;
        self
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::new(Arc::new(NotifyHub::new()), 3)
    }
}

pub struct Engine {
    pub state: DashMap<Ulid, SharedBranchState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Confirmation id → (branch id, reservation id), across all branches.
    pub(super) confirmations: DashMap<String, (Ulid, Ulid)>,
    /// Table or special date id → owning branch.
    pub(super) entity_to_branch: DashMap<Ulid, Ulid>,
    /// Branch creation takes this shared, compaction exclusive.
    pub(super) catalog: RwLock<()>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) ids: Arc<dyn ConfirmationIds>,
    pub(super) notifier: Notifier,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start the writer task. Needs a Tokio
    /// runtime.
    pub fn new(wal_path: PathBuf, collaborators: Collaborators) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            confirmations: DashMap::new(),
            entity_to_branch: DashMap::new(),
            catalog: RwLock::new(()),
            clock: collaborators.clock,
            ids: collaborators.ids,
            notifier: collaborators.notifier,
        };

        // Sole owner of every lock here, so try_write always succeeds.
        for event in &events {
            if let Event::BranchCreated { branch } = event {
                engine
                    .state
                    .insert(branch.id, Arc::new(RwLock::new(BranchState::new(branch.clone()))));
                continue;
            }
            let Some(entry) = engine.state.get(&event.branch_id()) else {
                warn!("replay: event for unknown branch {}", event.branch_id());
                continue;
            };
            let shared = entry.value().clone();
            drop(entry);
            match shared.try_write() {
                Ok(mut guard) => {
                    guard.apply_event(event);
                    engine.track(event);
                }
                Err(_) => warn!("replay: branch {} locked", event.branch_id()),
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_branch_state(&self, id: &Ulid) -> Option<SharedBranchState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub(super) fn branch_state(&self, id: Ulid) -> Result<SharedBranchState, EngineError> {
        self.get_branch_state(&id)
            .ok_or_else(|| EngineError::not_found("branch", id))
    }

    pub(super) async fn branch_write(
        &self,
        id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<BranchState>, EngineError> {
        Ok(self.branch_state(id)?.write_owned().await)
    }

    /// Owning branch of a table or special date, write-locked.
    pub(super) async fn entity_write(
        &self,
        kind: &str,
        entity_id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<BranchState>, EngineError> {
        let branch_id = self
            .entity_to_branch
            .get(&entity_id)
            .map(|e| *e.value())
            .ok_or_else(|| EngineError::not_found(kind, entity_id))?;
        self.branch_write(branch_id).await
    }

    pub(super) fn lookup_confirmation(&self, confirmation_id: &str) -> Result<(Ulid, Ulid), EngineError> {
        self.confirmations
            .get(&confirmation_id.to_ascii_uppercase())
            .map(|e| *e.value())
            .ok_or_else(|| EngineError::not_found("reservation", confirmation_id))
    }

    /// Store constraints, then WAL, then memory. Nothing is applied unless
    /// the event is durable.
    pub(super) async fn persist_and_apply(
        &self,
        state: &mut BranchState,
        event: &Event,
    ) -> Result<(), EngineError> {
        state.admit(event)?;
        self.wal_append(event).await?;
        state.apply_event(event);
        self.track(event);
        Ok(())
    }

    /// Keep the cross-branch indexes in step with an applied event.
    fn track(&self, event: &Event) {
        let branch_id = event.branch_id();
        match event {
            Event::TableAdded { table } => {
                self.entity_to_branch.insert(table.id, branch_id);
            }
            Event::TableDeleted { table_id, .. } => {
                self.entity_to_branch.remove(table_id);
            }
            Event::SpecialDateSet { special, .. } => {
                self.entity_to_branch.insert(special.id, branch_id);
            }
            Event::SpecialDateRemoved { id, .. } => {
                self.entity_to_branch.remove(id);
            }
            Event::ReservationCreated { reservation } => {
                self.confirmations.insert(
                    reservation.confirmation_id.clone(),
                    (branch_id, reservation.id),
                );
            }
            _ => {}
        }
    }
}
