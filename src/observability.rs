use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "covers_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "covers_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "covers_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "covers_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "covers_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "covers_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "covers_wal_flush_batch_size";

// ── Domain counters ─────────────────────────────────────────────

/// Counter: reservations committed.
pub const RESERVATIONS_CREATED_TOTAL: &str = "covers_reservations_created_total";

/// Counter: bookings refused because the table was taken.
pub const RESERVATION_CONFLICTS_TOTAL: &str = "covers_reservation_conflicts_total";

/// Counter: confirmations dropped after all delivery attempts.
pub const NOTIFICATIONS_FAILED_TOTAL: &str = "covers_notifications_failed_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::warn!("metrics exporter not installed: {e}"),
    }
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertBranch { .. } => "insert_branch",
        Command::UpsertOperatingHours { .. } => "upsert_operating_hours",
        Command::DeleteOperatingHours { .. } => "delete_operating_hours",
        Command::UpsertSpecialDate { .. } => "upsert_special_date",
        Command::DeleteSpecialDate { .. } => "delete_special_date",
        Command::InsertTable { .. } => "insert_table",
        Command::SetTableStatus { .. } => "set_table_status",
        Command::DeleteTable { .. } => "delete_table",
        Command::InsertReservation { .. } => "insert_reservation",
        Command::ChangeReservationStatus { .. } => "change_reservation_status",
        Command::ChangeReservation { .. } => "change_reservation",
        Command::SelectBranches => "select_branches",
        Command::SelectTables { .. } => "select_tables",
        Command::SelectOperatingHours { .. } => "select_operating_hours",
        Command::SelectSpecialDates { .. } => "select_special_dates",
        Command::SelectHours { .. } => "select_hours",
        Command::SelectSlots { .. } => "select_slots",
        Command::SelectAvailableTables { .. } => "select_available_tables",
        Command::SelectReservations { .. } => "select_reservations",
        Command::SelectReservationStats { .. } => "select_reservation_stats",
    }
}
