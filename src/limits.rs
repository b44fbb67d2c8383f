//! Hard bounds enforced by the engine and the SQL front end.

pub const MIN_PARTY_SIZE: u32 = 1;
pub const MAX_PARTY_SIZE: u32 = 20;

/// Slot interval bounds in minutes.
pub const MIN_SLOT_INTERVAL: u32 = 15;
pub const MAX_SLOT_INTERVAL: u32 = 60;

/// Default reservation duration bounds in minutes.
pub const MIN_DEFAULT_DURATION: u32 = 30;
pub const MAX_DEFAULT_DURATION: u32 = 180;

pub const MAX_TABLE_SEATS: u32 = 100;

pub const MAX_BRANCHES: usize = 10_000;
pub const MAX_TABLES_PER_BRANCH: usize = 1_000;
pub const MAX_RESERVATIONS_PER_BRANCH: usize = 1_000_000;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_LABEL_LEN: usize = 10;
pub const MAX_PHONE_LEN: usize = 15;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_NOTE_LEN: usize = 200;
pub const MAX_SPECIAL_REQUESTS_LEN: usize = 2_000;

/// Attempts at drawing an unused confirmation id before giving up.
pub const MAX_CONFIRMATION_ATTEMPTS: usize = 8;

/// Rows returned by a customer lookup (email / phone).
pub const MAX_CUSTOMER_LOOKUP_ROWS: usize = 20;
