use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Bad input on a named field (party size, past date, seats, ...).
    Validation {
        field: &'static str,
        message: String,
    },
    /// The table already holds an overlapping booking.
    Conflict {
        table_id: Ulid,
        reservation_id: Ulid,
    },
    NotFound(String),
    /// No active table on the branch seats a party this large.
    NoSuitableTables {
        guests: u32,
    },
    AlreadyExists(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
    Internal(String),
}

impl EngineError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        EngineError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(kind: &str, key: impl std::fmt::Display) -> Self {
        EngineError::NotFound(format!("{kind} {key}"))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation { field, message } => write!(f, "invalid {field}: {message}"),
            EngineError::Conflict {
                table_id,
                reservation_id,
            } => write!(
                f,
                "table {table_id} is already booked for that time (reservation {reservation_id})"
            ),
            EngineError::NotFound(what) => write!(f, "not found: {what}"),
            EngineError::NoSuitableTables { guests } => {
                write!(f, "no suitable tables found for a party of {guests}")
            }
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
            EngineError::Internal(e) => write!(f, "internal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
