use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::CoversAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command, ReservationQuery};

pub struct CoversHandler {
    engine: Arc<Engine>,
    query_parser: Arc<CoversQueryParser>,
}

impl CoversHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(CoversQueryParser),
        }
    }

    /// Parse, execute, and record RED metrics for one statement.
    async fn run(&self, query: &str) -> PgWireResult<Vec<Response>> {
        let cmd = match sql::parse_sql(query) {
            Ok(cmd) => cmd,
            Err(e) => {
                metrics::counter!(observability::QUERIES_TOTAL, "command" => "parse", "status" => "error")
                    .increment(1);
                return Err(sql_err(e));
            }
        };
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, cmd: Command) -> PgWireResult<Vec<Response>> {
        let engine = &self.engine;
        match cmd {
            Command::InsertBranch { branch } => {
                engine.create_branch(branch).await.map_err(engine_err)?;
                Ok(vec![inserted(1)])
            }
            Command::UpsertOperatingHours { branch_id, hours } => {
                engine
                    .set_operating_hours(branch_id, hours)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![inserted(1)])
            }
            Command::DeleteOperatingHours {
                branch_id,
                day_of_week,
            } => {
                engine
                    .clear_operating_hours(branch_id, day_of_week)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![deleted(1)])
            }
            Command::UpsertSpecialDate { branch_id, special } => {
                engine
                    .set_special_date(branch_id, special)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![inserted(1)])
            }
            Command::DeleteSpecialDate { id } => {
                engine.remove_special_date(id).await.map_err(engine_err)?;
                Ok(vec![deleted(1)])
            }
            Command::InsertTable { table } => {
                engine.add_table(table).await.map_err(engine_err)?;
                Ok(vec![inserted(1)])
            }
            Command::SetTableStatus { table_id, status } => {
                engine
                    .set_table_status(table_id, status)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![inserted(1)])
            }
            Command::DeleteTable { id } => {
                engine.delete_table(id).await.map_err(engine_err)?;
                Ok(vec![deleted(1)])
            }
            Command::InsertReservation { request } => {
                let r = engine.create_reservation(request).await.map_err(engine_err)?;
                let row = vec![
                    Cell::text(&r.confirmation_id),
                    Cell::text(r.status.as_str()),
                    Cell::date(r.date),
                    Cell::time(r.time),
                    Cell::opt_time(r.end_time),
                    Cell::int(r.duration_minutes),
                ];
                Ok(vec![rows_response(schema(CREATED), vec![row])?])
            }
            Command::ChangeReservationStatus {
                confirmation_id,
                status,
            } => {
                engine
                    .set_status(&confirmation_id, status)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![inserted(1)])
            }
            Command::ChangeReservation {
                confirmation_id,
                patch,
            } => {
                engine
                    .update_reservation(&confirmation_id, patch)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![inserted(1)])
            }
            Command::SelectBranches => {
                let rows = engine.list_branches().await.iter().map(branch_row).collect();
                Ok(vec![rows_response(schema(BRANCHES), rows)?])
            }
            Command::SelectTables { branch_id } => {
                let tables = engine.list_tables(branch_id).await.map_err(engine_err)?;
                let rows = tables.iter().map(table_row).collect();
                Ok(vec![rows_response(schema(TABLES), rows)?])
            }
            Command::SelectOperatingHours { branch_id } => {
                let hours = engine
                    .list_operating_hours(branch_id)
                    .await
                    .map_err(engine_err)?;
                let rows = hours
                    .iter()
                    .map(|h| {
                        vec![
                            Cell::text(branch_id.to_string()),
                            Cell::int(h.day_of_week),
                            Cell::time(h.opening_time),
                            Cell::time(h.closing_time),
                            Cell::Bool(h.is_closed),
                        ]
                    })
                    .collect();
                Ok(vec![rows_response(schema(OPERATING_HOURS), rows)?])
            }
            Command::SelectSpecialDates { branch_id } => {
                let specials = engine
                    .list_special_dates(branch_id)
                    .await
                    .map_err(engine_err)?;
                let rows = specials
                    .iter()
                    .map(|s| {
                        vec![
                            Cell::text(s.id.to_string()),
                            Cell::text(branch_id.to_string()),
                            Cell::date(s.date),
                            Cell::text(s.kind.as_str()),
                            Cell::Bool(s.is_closed),
                            Cell::opt_time(s.opening_time),
                            Cell::opt_time(s.closing_time),
                            Cell::text(&s.note),
                        ]
                    })
                    .collect();
                Ok(vec![rows_response(schema(SPECIAL_DATES), rows)?])
            }
            Command::SelectHours { branch_id, date } => {
                let day = engine
                    .resolve_hours(branch_id, date)
                    .await
                    .map_err(engine_err)?;
                let row = vec![
                    Cell::Bool(day.is_open),
                    Cell::opt_time(day.opening),
                    Cell::opt_time(day.closing),
                    Cell::Text(day.note),
                ];
                Ok(vec![rows_response(schema(HOURS), vec![row])?])
            }
            Command::SelectSlots {
                branch_id,
                date,
                guests,
            } => {
                let listing = engine
                    .available_slots(branch_id, date, guests)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![rows_response(schema(SLOTS), slot_rows(&listing))?])
            }
            Command::SelectAvailableTables {
                branch_id,
                date,
                time,
                guests,
            } => {
                let tables = engine
                    .available_tables(branch_id, date, time, guests)
                    .await
                    .map_err(engine_err)?;
                let rows = tables.iter().map(table_row).collect();
                Ok(vec![rows_response(schema(TABLES), rows)?])
            }
            Command::SelectReservations { query } => {
                let found = match query {
                    ReservationQuery::ByConfirmation(id) => {
                        match engine.get_by_confirmation(&id).await {
                            Ok(r) => vec![r],
                            Err(EngineError::NotFound(_)) => Vec::new(),
                            Err(e) => return Err(engine_err(e)),
                        }
                    }
                    ReservationQuery::Customer { email, phone } => engine
                        .customer_reservations(email.as_deref(), phone.as_deref())
                        .await
                        .map_err(engine_err)?,
                    ReservationQuery::Filter(filter) => engine
                        .list_reservations(&filter)
                        .await
                        .map_err(engine_err)?,
                };
                let rows = found.iter().map(reservation_row).collect();
                Ok(vec![rows_response(schema(RESERVATIONS), rows)?])
            }
            Command::SelectReservationStats { branch_id } => {
                let s = engine.stats(branch_id).await.map_err(engine_err)?;
                let row = vec![
                    Cell::count(s.today),
                    Cell::count(s.pending),
                    Cell::count(s.confirmed),
                    Cell::count(s.completed_this_week),
                    Cell::count(s.no_shows_this_week),
                    Cell::count(s.upcoming),
                    Cell::text(
                        serde_json::to_string(&s.by_status)
                            .map_err(|e| engine_err(EngineError::Internal(e.to_string())))?,
                    ),
                ];
                Ok(vec![rows_response(schema(STATS), vec![row])?])
            }
        }
    }
}

fn inserted(rows: usize) -> Response {
    Response::Execution(Tag::new("INSERT").with_rows(rows))
}

fn deleted(rows: usize) -> Response {
    Response::Execution(Tag::new("DELETE").with_rows(rows))
}

// ── Rows ─────────────────────────────────────────────────────────

/// One output value: INT8, BOOL, or text.
enum Cell {
    Text(Option<String>),
    Int(i64),
    Bool(bool),
}

impl Cell {
    fn text(s: impl Into<String>) -> Self {
        Cell::Text(Some(s.into()))
    }

    fn int(n: impl Into<i64>) -> Self {
        Cell::Int(n.into())
    }

    fn count(n: usize) -> Self {
        Cell::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }

    fn date(d: NaiveDate) -> Self {
        Cell::text(d.format("%Y-%m-%d").to_string())
    }

    fn time(t: NaiveTime) -> Self {
        Cell::text(t.format("%H:%M").to_string())
    }

    fn opt_time(t: Option<NaiveTime>) -> Self {
        Cell::Text(t.map(|t| t.format("%H:%M").to_string()))
    }

    fn timestamp(ts: NaiveDateTime) -> Self {
        Cell::text(ts.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

fn rows_response(schema: Vec<FieldInfo>, rows: Vec<Vec<Cell>>) -> PgWireResult<Response> {
    let schema = Arc::new(schema);
    let encoded: Vec<PgWireResult<_>> = rows
        .into_iter()
        .map(|row| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            for cell in row {
                match cell {
                    Cell::Text(v) => encoder.encode_field(&v)?,
                    Cell::Int(n) => encoder.encode_field(&n)?,
                    Cell::Bool(b) => encoder.encode_field(&b)?,
                }
            }
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(encoded))))
}

fn branch_row(b: &Branch) -> Vec<Cell> {
    vec![
        Cell::text(b.id.to_string()),
        Cell::text(&b.name),
        Cell::time(b.opening_time),
        Cell::time(b.closing_time),
        Cell::int(b.slot_interval),
        Cell::int(b.default_duration),
    ]
}

fn table_row(t: &Table) -> Vec<Cell> {
    vec![
        Cell::text(t.id.to_string()),
        Cell::text(t.branch_id.to_string()),
        Cell::text(&t.label),
        Cell::text(&t.name),
        Cell::Text(t.location.clone()),
        Cell::int(t.seats),
        Cell::text(t.status.as_str()),
    ]
}

fn reservation_row(r: &Reservation) -> Vec<Cell> {
    vec![
        Cell::text(&r.confirmation_id),
        Cell::text(r.branch_id.to_string()),
        Cell::Text(r.table_id.map(|t| t.to_string())),
        Cell::text(&r.customer.name),
        Cell::text(&r.customer.phone),
        Cell::Text(r.customer.email.clone()),
        Cell::date(r.date),
        Cell::time(r.time),
        Cell::opt_time(r.end_time),
        Cell::int(r.duration_minutes),
        Cell::int(r.guests),
        Cell::text(r.status.as_str()),
        Cell::text(&r.special_requests),
        Cell::timestamp(r.created_at),
        Cell::timestamp(r.updated_at),
    ]
}

/// A closed day is one row with period `closed` and the reason.
fn slot_rows(listing: &SlotListing) -> Vec<Vec<Cell>> {
    match listing {
        SlotListing::Closed { note } => vec![vec![
            Cell::text("closed"),
            Cell::Text(None),
            Cell::Text(None),
            Cell::int(0u32),
            Cell::Int(0),
            Cell::text(note),
        ]],
        SlotListing::Open { note, slots, .. } => slots
            .iter()
            .map(|(period, slot)| {
                vec![
                    Cell::text(period.as_str()),
                    Cell::time(slot.time),
                    Cell::text(&slot.display),
                    Cell::int(slot.available_tables),
                    Cell::int(slot.duration_minutes),
                    Cell::Text(note.clone()),
                ]
            })
            .collect(),
    }
}

// ── Schemas ──────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Col {
    Text,
    Int,
    Bool,
}

type Columns = &'static [(&'static str, Col)];

const CREATED: Columns = &[
    ("confirmation_id", Col::Text),
    ("status", Col::Text),
    ("date", Col::Text),
    ("time", Col::Text),
    ("end_time", Col::Text),
    ("duration_minutes", Col::Int),
];

const BRANCHES: Columns = &[
    ("id", Col::Text),
    ("name", Col::Text),
    ("opening_time", Col::Text),
    ("closing_time", Col::Text),
    ("slot_interval", Col::Int),
    ("default_duration", Col::Int),
];

const TABLES: Columns = &[
    ("id", Col::Text),
    ("branch_id", Col::Text),
    ("label", Col::Text),
    ("name", Col::Text),
    ("location", Col::Text),
    ("seats", Col::Int),
    ("status", Col::Text),
];

const OPERATING_HOURS: Columns = &[
    ("branch_id", Col::Text),
    ("day_of_week", Col::Int),
    ("opening_time", Col::Text),
    ("closing_time", Col::Text),
    ("is_closed", Col::Bool),
];

const SPECIAL_DATES: Columns = &[
    ("id", Col::Text),
    ("branch_id", Col::Text),
    ("date", Col::Text),
    ("kind", Col::Text),
    ("is_closed", Col::Bool),
    ("opening_time", Col::Text),
    ("closing_time", Col::Text),
    ("note", Col::Text),
];

const HOURS: Columns = &[
    ("is_open", Col::Bool),
    ("opening_time", Col::Text),
    ("closing_time", Col::Text),
    ("note", Col::Text),
];

const SLOTS: Columns = &[
    ("period", Col::Text),
    ("time", Col::Text),
    ("display", Col::Text),
    ("available_tables", Col::Int),
    ("duration_minutes", Col::Int),
    ("note", Col::Text),
];

const RESERVATIONS: Columns = &[
    ("confirmation_id", Col::Text),
    ("branch_id", Col::Text),
    ("table_id", Col::Text),
    ("customer_name", Col::Text),
    ("phone", Col::Text),
    ("email", Col::Text),
    ("date", Col::Text),
    ("time", Col::Text),
    ("end_time", Col::Text),
    ("duration_minutes", Col::Int),
    ("guests", Col::Int),
    ("status", Col::Text),
    ("special_requests", Col::Text),
    ("created_at", Col::Text),
    ("updated_at", Col::Text),
];

const STATS: Columns = &[
    ("today", Col::Int),
    ("pending", Col::Int),
    ("confirmed", Col::Int),
    ("completed_this_week", Col::Int),
    ("no_shows_this_week", Col::Int),
    ("upcoming", Col::Int),
    ("by_status", Col::Text),
];

fn schema(columns: Columns) -> Vec<FieldInfo> {
    columns
        .iter()
        .map(|(name, col)| {
            let ty = match col {
                Col::Text => Type::VARCHAR,
                Col::Int => Type::INT8,
                Col::Bool => Type::BOOL,
            };
            FieldInfo::new((*name).into(), None, None, ty, FieldFormat::Text)
        })
        .collect()
}

/// Result columns a statement will produce, judged from its text alone so
/// it works before parameters are bound.
fn statement_columns(sql: &str) -> Columns {
    let lower = sql.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .filter(|w| !w.is_empty())
        .collect();
    let after = |keyword: &str| {
        words
            .iter()
            .position(|w| *w == keyword)
            .and_then(|i| words.get(i + 1))
            .copied()
    };
    match words.first().copied() {
        Some("select") => match after("from") {
            Some("branches") => BRANCHES,
            Some("tables") | Some("available_tables") => TABLES,
            Some("operating_hours") => OPERATING_HOURS,
            Some("special_dates") => SPECIAL_DATES,
            Some("hours") => HOURS,
            Some("slots") => SLOTS,
            Some("reservations") => RESERVATIONS,
            Some("reservation_stats") => STATS,
            _ => &[],
        },
        Some("insert") if after("into") == Some("reservations") => CREATED,
        _ => &[],
    }
}

#[async_trait]
impl SimpleQueryHandler for CoversHandler {
    async fn do_query<C>(&self, _client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        self.run(query).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct CoversQueryParser;

#[async_trait]
impl QueryParser for CoversQueryParser {
    type Statement = String;

    async fn parse_sql<C>(&self, _client: &C, sql: &str, _types: &[Option<Type>]) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(schema(statement_columns(stmt)))
    }
}

#[async_trait]
impl ExtendedQueryHandler for CoversHandler {
    type Statement = String;
    type QueryParser = CoversQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        let mut responses = self.run(&sql).await?;
        if responses.is_empty() {
            return Ok(Response::EmptyQuery);
        }
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            schema(statement_columns(&target.statement)),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(schema(statement_columns(
            &target.statement.statement,
        ))))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if let Ok(n) = sql[start..i].parse::<usize>() {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text
/// format). Highest index first so `$1` never clobbers `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    let params: Vec<Option<String>> = portal
        .parameters
        .iter()
        .map(|p| p.as_ref().map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
        .collect();
    substitute(&portal.statement.statement, &params)
}

fn substitute(sql: &str, params: &[Option<String>]) -> String {
    let mut result = sql.to_string();
    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(text) => format!("'{}'", text.replace('\'', "''")),
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct CoversFactory {
    handler: Arc<CoversHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<CoversAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl CoversFactory {
    pub fn new(engine: Arc<Engine>, password: String) -> Self {
        let auth_source = CoversAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(CoversHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for CoversFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = Arc::new(CoversFactory::new(engine, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

pub fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::Validation { .. } => "22023",
        EngineError::Conflict { .. } => "23P01",
        EngineError::NotFound(_) => "02000",
        EngineError::NoSuitableTables { .. } => "53400",
        EngineError::AlreadyExists(_) => "23505",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::WalError(_) | EngineError::Internal(_) => "XX000",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        sqlstate(&e).into(),
        e.to_string(),
    )))
}

fn sql_err(e: sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn sqlstates_are_distinct_per_error_kind() {
        let id = Ulid::new();
        let codes = [
            sqlstate(&EngineError::validation("guests", "too many")),
            sqlstate(&EngineError::Conflict {
                table_id: id,
                reservation_id: id,
            }),
            sqlstate(&EngineError::not_found("table", id)),
            sqlstate(&EngineError::NoSuitableTables { guests: 9 }),
            sqlstate(&EngineError::AlreadyExists(id)),
            sqlstate(&EngineError::LimitExceeded("too many branches")),
            sqlstate(&EngineError::Internal("boom".into())),
        ];
        assert_eq!(codes, ["22023", "23P01", "02000", "53400", "23505", "54000", "XX000"]);
    }

    #[test]
    fn count_params_finds_highest() {
        assert_eq!(count_params("SELECT * FROM branches"), 0);
        assert_eq!(
            count_params("SELECT * FROM slots WHERE branch_id = $1 AND date = $2 AND guests = $3"),
            3
        );
        assert_eq!(count_params("INSERT INTO t VALUES ($2, $10, $1)"), 10);
    }

    #[test]
    fn substitute_quotes_and_nulls() {
        let sql = "INSERT INTO reservation_changes (confirmation_id, phone, email) VALUES ($1, $2, $3)";
        let out = substitute(
            sql,
            &[Some("CI0123456789AB".into()), Some("O'Brien".into()), None],
        );
        assert_eq!(
            out,
            "INSERT INTO reservation_changes (confirmation_id, phone, email) VALUES ('CI0123456789AB', 'O''Brien', NULL)"
        );
    }

    #[test]
    fn substitute_handles_two_digit_placeholders() {
        let params: Vec<Option<String>> = (1..=10).map(|i| Some(i.to_string())).collect();
        assert_eq!(substitute("$1 $10", &params), "'1' '10'");
    }

    #[test]
    fn schema_follows_statement_text() {
        let names = |sql: &str| -> Vec<&str> {
            statement_columns(sql).iter().map(|(name, _)| *name).collect()
        };
        assert_eq!(
            names("SELECT * FROM slots WHERE branch_id = $1"),
            ["period", "time", "display", "available_tables", "duration_minutes", "note"]
        );
        assert_eq!(
            names("insert into reservations(branch_id) values ($1)")[0],
            "confirmation_id"
        );
        assert_eq!(names("SELECT * FROM reservation_stats").len(), 7);
        assert!(names("INSERT INTO tables (id) VALUES ($1)").is_empty());
        assert!(names("DELETE FROM tables WHERE id = $1").is_empty());
    }

    #[test]
    fn row_widths_match_their_schemas() {
        let rows = slot_rows(&SlotListing::Closed { note: "Eid".into() });
        assert_eq!(rows[0].len(), SLOTS.len());
        let mut branch = Branch::new(Ulid::new(), "Marina");
        branch.slot_interval = 15;
        assert_eq!(branch_row(&branch).len(), BRANCHES.len());
    }

    #[test]
    fn closed_day_is_single_row() {
        let rows = slot_rows(&SlotListing::Closed {
            note: "Eid".into(),
        });
        assert_eq!(rows.len(), 1);
        assert!(matches!(&rows[0][0], Cell::Text(Some(p)) if p == "closed"));
        assert!(matches!(&rows[0][5], Cell::Text(Some(n)) if n == "Eid"));
    }
}
