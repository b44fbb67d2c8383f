use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};
use ulid::Ulid;

use crate::model::Reservation;

const CHANNEL_CAPACITY: usize = 256;

/// First retry delay; doubles per attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug)]
pub enum NotifyError {
    /// Every subscriber of the branch channel has gone away.
    Closed(Ulid),
    Encode(String),
    Transport(String),
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyError::Closed(branch) => write!(f, "no live subscribers for branch {branch}"),
            NotifyError::Encode(e) => write!(f, "encode error: {e}"),
            NotifyError::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl std::error::Error for NotifyError {}

/// Outbound confirmation channel (email gateway, SMS, message bus, ...).
#[async_trait]
pub trait ConfirmationSender: Send + Sync {
    async fn send_confirmation(&self, reservation: &Reservation) -> Result<(), NotifyError>;
}

/// What a subscriber receives for each new reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationNotice {
    pub confirmation_id: String,
    pub branch_id: Ulid,
    pub table_id: Option<Ulid>,
    pub customer_name: String,
    pub email: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub guests: u32,
    pub status: &'static str,
}

impl From<&Reservation> for ConfirmationNotice {
    fn from(r: &Reservation) -> Self {
        Self {
            confirmation_id: r.confirmation_id.clone(),
            branch_id: r.branch_id,
            table_id: r.table_id,
            customer_name: r.customer.name.clone(),
            email: r.customer.email.clone(),
            date: r.date,
            time: r.time,
            guests: r.guests,
            status: r.status.as_str(),
        }
    }
}

/// In-process broadcast hub: one channel per branch carrying JSON notices.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<String>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to confirmations for a branch. Creates the channel if needed.
    pub fn subscribe(&self, branch_id: Ulid) -> broadcast::Receiver<String> {
        let sender = self
            .channels
            .entry(branch_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }
}

#[async_trait]
impl ConfirmationSender for NotifyHub {
    /// No-op if nobody ever subscribed to the branch.
    async fn send_confirmation(&self, reservation: &Reservation) -> Result<(), NotifyError> {
        let Some(sender) = self.channels.get(&reservation.branch_id) else {
            return Ok(());
        };
        let payload = serde_json::to_string(&ConfirmationNotice::from(reservation))
            .map_err(|e| NotifyError::Encode(e.to_string()))?;
        sender
            .send(payload)
            .map(|_| ())
            .map_err(|_| NotifyError::Closed(reservation.branch_id))
    }
}

/// Hands confirmations to a sender off the booking path.
#[derive(Clone)]
pub struct Notifier {
    sender: Arc<dyn ConfirmationSender>,
    attempts: u32,
}

impl Notifier {
    pub fn new(sender: Arc<dyn ConfirmationSender>, attempts: u32) -> Self {
        Self {
            sender,
            attempts: attempts.max(1),
        }
    }

    /// Fire-and-forget: the booking is already committed, so failures are
    /// only logged and counted.
    pub fn dispatch(&self, reservation: Reservation) -> tokio::task::JoinHandle<bool> {
        let sender = self.sender.clone();
        let attempts = self.attempts;
        tokio::spawn(async move { deliver(sender.as_ref(), &reservation, attempts).await })
    }
}

async fn deliver(sender: &dyn ConfirmationSender, reservation: &Reservation, attempts: u32) -> bool {
    let mut delay = RETRY_BASE_DELAY;
    for attempt in 1..=attempts {
        match sender.send_confirmation(reservation).await {
            Ok(()) => {
                info!("confirmation sent for {}", reservation.confirmation_id);
                return true;
            }
            Err(e) if attempt < attempts => {
                warn!(
                    "confirmation for {} failed (attempt {attempt}/{attempts}): {e}",
                    reservation.confirmation_id
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => {
                warn!(
                    "giving up on confirmation for {}: {e}",
                    reservation.confirmation_id
                );
            }
        }
    }
    metrics::counter!(crate::observability::NOTIFICATIONS_FAILED_TOTAL).increment(1);
    false
}
