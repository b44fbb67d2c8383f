use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use sqlparser::ast::{
    self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertBranch {
        branch: Branch,
    },
    UpsertOperatingHours {
        branch_id: Ulid,
        hours: OperatingHours,
    },
    DeleteOperatingHours {
        branch_id: Ulid,
        day_of_week: u8,
    },
    UpsertSpecialDate {
        branch_id: Ulid,
        special: SpecialDate,
    },
    DeleteSpecialDate {
        id: Ulid,
    },
    InsertTable {
        table: Table,
    },
    SetTableStatus {
        table_id: Ulid,
        status: TableStatus,
    },
    DeleteTable {
        id: Ulid,
    },
    InsertReservation {
        request: NewReservation,
    },
    ChangeReservationStatus {
        confirmation_id: String,
        status: ReservationStatus,
    },
    ChangeReservation {
        confirmation_id: String,
        patch: ReservationPatch,
    },
    SelectBranches,
    SelectTables {
        branch_id: Ulid,
    },
    SelectOperatingHours {
        branch_id: Ulid,
    },
    SelectSpecialDates {
        branch_id: Ulid,
    },
    SelectHours {
        branch_id: Ulid,
        date: NaiveDate,
    },
    SelectSlots {
        branch_id: Ulid,
        date: NaiveDate,
        guests: u32,
    },
    SelectAvailableTables {
        branch_id: Ulid,
        date: NaiveDate,
        time: NaiveTime,
        guests: u32,
    },
    SelectReservations {
        query: ReservationQuery,
    },
    SelectReservationStats {
        branch_id: Option<Ulid>,
    },
}

/// The three shapes of `SELECT ... FROM reservations`.
#[derive(Debug, PartialEq)]
pub enum ReservationQuery {
    ByConfirmation(String),
    Customer {
        email: Option<String>,
        phone: Option<String>,
    },
    Filter(ReservationFilter),
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(first) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match first {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

// ── INSERT ────────────────────────────────────────────────────

/// Positional VALUES row. Trailing values may be left off; `opt_*` getters
/// read a missing value or NULL as `None`.
struct Row<'a> {
    table: &'static str,
    values: &'a [Expr],
}

impl<'a> Row<'a> {
    fn new(table: &'static str, values: &'a [Expr], required: usize) -> Result<Self, SqlError> {
        if values.len() < required {
            return Err(SqlError::WrongArity(table, required, values.len()));
        }
        Ok(Self { table, values })
    }

    fn get(&self, i: usize) -> Option<&'a Expr> {
        self.values.get(i).filter(|e| !is_null(e))
    }

    fn req(&self, i: usize, col: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(i)
            .ok_or_else(|| SqlError::Parse(format!("{}: {col} must not be NULL", self.table)))
    }

    fn ulid(&self, i: usize, col: &'static str) -> Result<Ulid, SqlError> {
        parse_ulid(self.req(i, col)?)
    }

    fn opt_ulid(&self, i: usize) -> Result<Option<Ulid>, SqlError> {
        self.get(i).map(parse_ulid).transpose()
    }

    fn text(&self, i: usize, col: &'static str) -> Result<String, SqlError> {
        parse_text(self.req(i, col)?)
    }

    fn opt_text(&self, i: usize) -> Result<Option<String>, SqlError> {
        self.get(i).map(parse_text).transpose()
    }

    fn date(&self, i: usize, col: &'static str) -> Result<NaiveDate, SqlError> {
        parse_date(self.req(i, col)?)
    }

    fn opt_date(&self, i: usize) -> Result<Option<NaiveDate>, SqlError> {
        self.get(i).map(parse_date).transpose()
    }

    fn opt_time(&self, i: usize) -> Result<Option<NaiveTime>, SqlError> {
        self.get(i).map(parse_time).transpose()
    }

    fn time(&self, i: usize, col: &'static str) -> Result<NaiveTime, SqlError> {
        parse_time(self.req(i, col)?)
    }

    fn u32(&self, i: usize, col: &'static str) -> Result<u32, SqlError> {
        parse_u32(self.req(i, col)?)
    }

    fn opt_u32(&self, i: usize) -> Result<Option<u32>, SqlError> {
        self.get(i).map(parse_u32).transpose()
    }

    fn opt_bool(&self, i: usize) -> Result<Option<bool>, SqlError> {
        self.get(i).map(parse_bool).transpose()
    }

    fn opt_enum<T: FromStr<Err = String>>(&self, i: usize) -> Result<Option<T>, SqlError> {
        self.get(i).map(parse_enum).transpose()
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "branches" => {
            let row = Row::new("branches", &values, 2)?;
            let mut branch = Branch::new(row.ulid(0, "id")?, row.text(1, "name")?);
            if let Some(opening) = row.opt_time(2)? {
                branch.opening_time = opening;
            }
            if let Some(closing) = row.opt_time(3)? {
                branch.closing_time = closing;
            }
            if let Some(interval) = row.opt_u32(4)? {
                branch.slot_interval = interval;
            }
            if let Some(duration) = row.opt_u32(5)? {
                branch.default_duration = duration;
            }
            Ok(Command::InsertBranch { branch })
        }
        "operating_hours" => {
            let row = Row::new("operating_hours", &values, 2)?;
            let is_closed = row.opt_bool(4)?.unwrap_or(false);
            let (opening_time, closing_time) = if is_closed {
                (
                    row.opt_time(2)?.unwrap_or(NaiveTime::MIN),
                    row.opt_time(3)?.unwrap_or(NaiveTime::MIN),
                )
            } else {
                (row.time(2, "opening_time")?, row.time(3, "closing_time")?)
            };
            Ok(Command::UpsertOperatingHours {
                branch_id: row.ulid(0, "branch_id")?,
                hours: OperatingHours {
                    day_of_week: parse_day_of_week(row.req(1, "day_of_week")?)?,
                    opening_time,
                    closing_time,
                    is_closed,
                },
            })
        }
        "special_dates" => {
            let row = Row::new("special_dates", &values, 3)?;
            Ok(Command::UpsertSpecialDate {
                branch_id: row.ulid(1, "branch_id")?,
                special: SpecialDate {
                    id: row.ulid(0, "id")?,
                    date: row.date(2, "date")?,
                    kind: row.opt_enum(3)?.unwrap_or_default(),
                    is_closed: row.opt_bool(4)?.unwrap_or(false),
                    opening_time: row.opt_time(5)?,
                    closing_time: row.opt_time(6)?,
                    note: row.opt_text(7)?.unwrap_or_default(),
                },
            })
        }
        "tables" => {
            let row = Row::new("tables", &values, 4)?;
            let label = row.text(2, "label")?;
            Ok(Command::InsertTable {
                table: Table {
                    id: row.ulid(0, "id")?,
                    branch_id: row.ulid(1, "branch_id")?,
                    seats: row.u32(3, "seats")?,
                    status: row.opt_enum(4)?.unwrap_or_default(),
                    name: row.opt_text(5)?.unwrap_or_else(|| label.clone()),
                    location: row.opt_text(6)?,
                    label,
                },
            })
        }
        "table_status" => {
            let row = Row::new("table_status", &values, 2)?;
            Ok(Command::SetTableStatus {
                table_id: row.ulid(0, "table_id")?,
                status: parse_enum(row.req(1, "status")?)?,
            })
        }
        "reservations" => {
            let row = Row::new("reservations", &values, 8)?;
            Ok(Command::InsertReservation {
                request: NewReservation {
                    branch_id: row.ulid(0, "branch_id")?,
                    table_id: row.opt_ulid(1)?,
                    customer: Customer {
                        name: row.text(2, "customer_name")?,
                        phone: row.text(3, "phone")?,
                        email: row.opt_text(4)?.filter(|e| !e.is_empty()),
                    },
                    date: row.date(5, "date")?,
                    time: row.time(6, "time")?,
                    guests: row.u32(7, "guests")?,
                    special_requests: row.opt_text(8)?,
                },
            })
        }
        "reservation_status" => {
            let row = Row::new("reservation_status", &values, 2)?;
            Ok(Command::ChangeReservationStatus {
                confirmation_id: row.text(0, "confirmation_id")?,
                status: parse_enum(row.req(1, "status")?)?,
            })
        }
        "reservation_changes" => {
            let row = Row::new("reservation_changes", &values, 1)?;
            Ok(Command::ChangeReservation {
                confirmation_id: row.text(0, "confirmation_id")?,
                patch: ReservationPatch {
                    date: row.opt_date(1)?,
                    time: row.opt_time(2)?,
                    guests: row.opt_u32(3)?,
                    table_id: row.opt_ulid(4)?,
                    customer_name: row.opt_text(5)?,
                    phone: row.opt_text(6)?,
                    email: row.opt_text(7)?,
                    special_requests: row.opt_text(8)?,
                },
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let filters = Filters::from_selection(delete.selection.as_ref())?;

    match table.as_str() {
        "tables" => Ok(Command::DeleteTable {
            id: parse_ulid(filters.require("id")?)?,
        }),
        "special_dates" => Ok(Command::DeleteSpecialDate {
            id: parse_ulid(filters.require("id")?)?,
        }),
        "operating_hours" => Ok(Command::DeleteOperatingHours {
            branch_id: parse_ulid(filters.require("branch_id")?)?,
            day_of_week: parse_day_of_week(filters.require("day_of_week")?)?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── SELECT ────────────────────────────────────────────────────

/// `col = value` pairs from a WHERE clause joined by AND.
struct Filters<'a>(Vec<(String, &'a Expr)>);

impl<'a> Filters<'a> {
    fn from_selection(selection: Option<&'a Expr>) -> Result<Self, SqlError> {
        let mut pairs = Vec::new();
        if let Some(expr) = selection {
            collect_equalities(expr, &mut pairs)?;
        }
        Ok(Self(pairs))
    }

    fn get(&self, col: &str) -> Option<&'a Expr> {
        self.0
            .iter()
            .find(|(c, _)| c == col)
            .map(|(_, e)| *e)
            .filter(|e| !is_null(e))
    }

    fn require(&self, col: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(col).ok_or(SqlError::MissingFilter(col))
    }

    fn ulid(&self, col: &'static str) -> Result<Ulid, SqlError> {
        parse_ulid(self.require(col)?)
    }

    fn date(&self, col: &'static str) -> Result<NaiveDate, SqlError> {
        parse_date(self.require(col)?)
    }
}

fn collect_equalities<'a>(expr: &'a Expr, out: &mut Vec<(String, &'a Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_equalities(left, out)?;
            collect_equalities(right, out)
        }
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            let col = expr_column_name(left)
                .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
            out.push((col, right.as_ref()));
            Ok(())
        }
        Expr::Nested(inner) => collect_equalities(inner, out),
        other => Err(SqlError::Unsupported(format!("filter {other}"))),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;
    let filters = Filters::from_selection(select.selection.as_ref())?;

    match table.as_str() {
        "branches" => Ok(Command::SelectBranches),
        "tables" => Ok(Command::SelectTables {
            branch_id: filters.ulid("branch_id")?,
        }),
        "operating_hours" => Ok(Command::SelectOperatingHours {
            branch_id: filters.ulid("branch_id")?,
        }),
        "special_dates" => Ok(Command::SelectSpecialDates {
            branch_id: filters.ulid("branch_id")?,
        }),
        "hours" => Ok(Command::SelectHours {
            branch_id: filters.ulid("branch_id")?,
            date: filters.date("date")?,
        }),
        "slots" => Ok(Command::SelectSlots {
            branch_id: filters.ulid("branch_id")?,
            date: filters.date("date")?,
            guests: parse_u32(filters.require("guests")?)?,
        }),
        "available_tables" => Ok(Command::SelectAvailableTables {
            branch_id: filters.ulid("branch_id")?,
            date: filters.date("date")?,
            time: parse_time(filters.require("time")?)?,
            guests: parse_u32(filters.require("guests")?)?,
        }),
        "reservations" => Ok(Command::SelectReservations {
            query: reservation_query(&filters)?,
        }),
        "reservation_stats" => Ok(Command::SelectReservationStats {
            branch_id: filters.get("branch_id").map(parse_ulid).transpose()?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn reservation_query(filters: &Filters<'_>) -> Result<ReservationQuery, SqlError> {
    if let Some(expr) = filters.get("confirmation_id") {
        return Ok(ReservationQuery::ByConfirmation(parse_text(expr)?));
    }
    let email = filters.get("email").map(parse_text).transpose()?;
    let phone = filters.get("phone").map(parse_text).transpose()?;
    if email.is_some() || phone.is_some() {
        return Ok(ReservationQuery::Customer { email, phone });
    }
    Ok(ReservationQuery::Filter(ReservationFilter {
        branch_id: filters.get("branch_id").map(parse_ulid).transpose()?,
        date: filters.get("date").map(parse_date).transpose()?,
        status: filters.get("status").map(parse_enum).transpose()?,
    }))
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [row] => Ok(row.clone()),
            [] => Err(SqlError::Parse("empty VALUES".into())),
            _ => Err(SqlError::Unsupported("multi-row VALUES".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

/// Literal behind an expression, looking through casts like `'19:00'::time`
/// and parentheses.
fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        Expr::Cast { expr, .. } | Expr::Nested(expr) => extract_value(expr),
        _ => None,
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

/// String or number literal as text.
fn literal_text(expr: &Expr) -> Result<&str, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => Ok(s.as_str()),
        Some(other) => Err(SqlError::Parse(format!("expected string, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_text(expr: &Expr) -> Result<String, SqlError> {
    literal_text(expr).map(str::to_string)
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = literal_text(expr)?;
    Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID {s}: {e}")))
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = literal_text(expr)?;
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| SqlError::Parse(format!("bad date {s}: {e}")))
}

/// `HH:MM` or `HH:MM:SS`.
fn parse_time(expr: &Expr) -> Result<NaiveTime, SqlError> {
    let s = literal_text(expr)?.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|e| SqlError::Parse(format!("bad time {s}: {e}")))
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_i64(expr)?);
    }
    let s = literal_text(expr)?;
    s.trim()
        .parse()
        .map_err(|e| SqlError::Parse(format!("bad integer {s}: {e}")))
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of range")))
}

fn parse_day_of_week(expr: &Expr) -> Result<u8, SqlError> {
    let v = parse_i64(expr)?;
    u8::try_from(v).map_err(|_| SqlError::Parse(format!("day_of_week {v} out of range")))
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    match extract_value(expr) {
        Some(Value::Boolean(b)) => Ok(*b),
        Some(Value::SingleQuotedString(s)) => match s.to_lowercase().as_str() {
            "true" | "t" | "1" => Ok(true),
            "false" | "f" | "0" => Ok(false),
            _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
        },
        Some(Value::Number(n, _)) => Ok(n != "0"),
        Some(other) => Err(SqlError::Parse(format!("expected bool, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_enum<T: FromStr<Err = String>>(expr: &Expr) -> Result<T, SqlError> {
    literal_text(expr)?.parse().map_err(SqlError::Parse)
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected at least {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const OTHER: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";

    fn id() -> Ulid {
        Ulid::from_string(ID).unwrap()
    }

    fn other() -> Ulid {
        Ulid::from_string(OTHER).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn insert_branch_with_defaults() {
        let cmd = parse_sql(&format!("INSERT INTO branches (id, name) VALUES ('{ID}', 'Marina')")).unwrap();
        assert_eq!(
            cmd,
            Command::InsertBranch {
                branch: Branch::new(id(), "Marina")
            }
        );
    }

    #[test]
    fn insert_branch_full() {
        let sql = format!(
            "INSERT INTO branches (id, name, opening_time, closing_time, slot_interval, default_duration) \
             VALUES ('{ID}', 'Marina', '12:00', '23:30:00', 15, 120)"
        );
        let Command::InsertBranch { branch } = parse_sql(&sql).unwrap() else {
            panic!("expected InsertBranch");
        };
        assert_eq!(branch.opening_time, t(12, 0));
        assert_eq!(branch.closing_time, t(23, 30));
        assert_eq!(branch.slot_interval, 15);
        assert_eq!(branch.default_duration, 120);
    }

    #[test]
    fn upsert_operating_hours() {
        let sql = format!(
            "INSERT INTO operating_hours (branch_id, day_of_week, opening_time, closing_time, is_closed) \
             VALUES ('{ID}', 4, '10:00', '23:00', false)"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::UpsertOperatingHours {
                branch_id: id(),
                hours: OperatingHours {
                    day_of_week: 4,
                    opening_time: t(10, 0),
                    closing_time: t(23, 0),
                    is_closed: false,
                },
            }
        );
    }

    #[test]
    fn closed_weekday_needs_no_times() {
        let sql = format!(
            "INSERT INTO operating_hours (branch_id, day_of_week, opening_time, closing_time, is_closed) \
             VALUES ('{ID}', 6, NULL, NULL, true)"
        );
        let Command::UpsertOperatingHours { hours, .. } = parse_sql(&sql).unwrap() else {
            panic!("expected UpsertOperatingHours");
        };
        assert!(hours.is_closed);
        assert_eq!(hours.day_of_week, 6);
    }

    #[test]
    fn open_weekday_needs_times() {
        let sql = format!("INSERT INTO operating_hours (branch_id, day_of_week) VALUES ('{ID}', 2)");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn delete_operating_hours() {
        let sql = format!("DELETE FROM operating_hours WHERE branch_id = '{ID}' AND day_of_week = 3");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::DeleteOperatingHours {
                branch_id: id(),
                day_of_week: 3
            }
        );
    }

    #[test]
    fn upsert_special_date() {
        let sql = format!(
            "INSERT INTO special_dates (id, branch_id, date, kind, is_closed, opening_time, closing_time, note) \
             VALUES ('{ID}', '{OTHER}', '2030-03-15', 'ramadan', false, '19:00', '02:00', 'Iftar hours')"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::UpsertSpecialDate {
                branch_id: other(),
                special: SpecialDate {
                    id: id(),
                    date: d(2030, 3, 15),
                    kind: SpecialDateKind::Ramadan,
                    is_closed: false,
                    opening_time: Some(t(19, 0)),
                    closing_time: Some(t(2, 0)),
                    note: "Iftar hours".into(),
                },
            }
        );
    }

    #[test]
    fn closed_special_date_short_form() {
        let sql = format!(
            "INSERT INTO special_dates (id, branch_id, date, kind, is_closed) \
             VALUES ('{ID}', '{OTHER}', '2030-12-02'::date, 'holiday', 't')"
        );
        let Command::UpsertSpecialDate { special, .. } = parse_sql(&sql).unwrap() else {
            panic!("expected UpsertSpecialDate");
        };
        assert!(special.is_closed);
        assert_eq!(special.kind, SpecialDateKind::Holiday);
        assert_eq!(special.opening_time, None);
        assert_eq!(special.note, "");
    }

    #[test]
    fn delete_special_date() {
        let sql = format!("DELETE FROM special_dates WHERE id = '{ID}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::DeleteSpecialDate { id: id() });
    }

    #[test]
    fn insert_table() {
        let sql = format!(
            "INSERT INTO tables (id, branch_id, label, seats, status, name, location) \
             VALUES ('{ID}', '{OTHER}', 'T4', 6, 'maintenance', 'Window four', 'terrace')"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertTable {
                table: Table {
                    id: id(),
                    branch_id: other(),
                    label: "T4".into(),
                    name: "Window four".into(),
                    location: Some("terrace".into()),
                    seats: 6,
                    status: TableStatus::Maintenance,
                },
            }
        );
    }

    #[test]
    fn insert_table_minimal() {
        let sql = format!("INSERT INTO tables (id, branch_id, label, seats) VALUES ('{ID}', '{OTHER}', 'T1', '4')");
        let Command::InsertTable { table } = parse_sql(&sql).unwrap() else {
            panic!("expected InsertTable");
        };
        assert_eq!(table.name, "T1");
        assert_eq!(table.seats, 4);
        assert_eq!(table.status, TableStatus::Active);
    }

    #[test]
    fn table_status_and_delete() {
        let sql = format!("INSERT INTO table_status (table_id, status) VALUES ('{ID}', 'inactive')");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SetTableStatus {
                table_id: id(),
                status: TableStatus::Inactive
            }
        );
        let sql = format!("DELETE FROM tables WHERE id = '{ID}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::DeleteTable { id: id() });
    }

    #[test]
    fn bad_enum_value_errors() {
        let sql = format!("INSERT INTO table_status (table_id, status) VALUES ('{ID}', 'broken')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn insert_reservation() {
        let sql = format!(
            "INSERT INTO reservations (branch_id, table_id, customer_name, phone, email, date, time, guests, special_requests) \
             VALUES ('{ID}', '{OTHER}', 'Noor', '+971500000001', 'noor@example.com', '2030-06-11', '19:00', 4, 'birthday')"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertReservation {
                request: NewReservation {
                    branch_id: id(),
                    table_id: Some(other()),
                    customer: Customer {
                        name: "Noor".into(),
                        phone: "+971500000001".into(),
                        email: Some("noor@example.com".into()),
                    },
                    date: d(2030, 6, 11),
                    time: t(19, 0),
                    guests: 4,
                    special_requests: Some("birthday".into()),
                },
            }
        );
    }

    #[test]
    fn insert_reservation_without_table_or_email() {
        let sql = format!(
            "INSERT INTO reservations (branch_id, table_id, customer_name, phone, email, date, time, guests) \
             VALUES ('{ID}', NULL, 'Sam', '555', NULL, '2030-06-11', '12:30', 2)"
        );
        let Command::InsertReservation { request } = parse_sql(&sql).unwrap() else {
            panic!("expected InsertReservation");
        };
        assert_eq!(request.table_id, None);
        assert_eq!(request.customer.email, None);
        assert_eq!(request.special_requests, None);
    }

    #[test]
    fn insert_reservation_too_few_values() {
        let sql = format!("INSERT INTO reservations (branch_id, table_id) VALUES ('{ID}', NULL)");
        assert_eq!(parse_sql(&sql), Err(SqlError::WrongArity("reservations", 8, 2)));
    }

    #[test]
    fn reservation_status_change() {
        let sql = "INSERT INTO reservation_status (confirmation_id, status) VALUES ('CI0123456789AB', 'no_show')";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::ChangeReservationStatus {
                confirmation_id: "CI0123456789AB".into(),
                status: ReservationStatus::NoShow
            }
        );
    }

    #[test]
    fn reservation_changes_null_means_unchanged() {
        let sql = "INSERT INTO reservation_changes (confirmation_id, date, time, guests, table_id, customer_name, phone, email, special_requests) \
                   VALUES ('CI0123456789AB', NULL, '20:00', NULL, NULL, NULL, '+15550100', NULL, NULL)";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::ChangeReservation {
                confirmation_id: "CI0123456789AB".into(),
                patch: ReservationPatch {
                    time: Some(t(20, 0)),
                    phone: Some("+15550100".into()),
                    ..Default::default()
                },
            }
        );
    }

    #[test]
    fn select_catalog_views() {
        assert_eq!(parse_sql("SELECT * FROM branches").unwrap(), Command::SelectBranches);
        assert_eq!(
            parse_sql(&format!("SELECT * FROM tables WHERE branch_id = '{ID}'")).unwrap(),
            Command::SelectTables { branch_id: id() }
        );
        assert_eq!(
            parse_sql(&format!("SELECT * FROM operating_hours WHERE branch_id = '{ID}'")).unwrap(),
            Command::SelectOperatingHours { branch_id: id() }
        );
        assert_eq!(
            parse_sql(&format!("SELECT * FROM special_dates WHERE branch_id = '{ID}'")).unwrap(),
            Command::SelectSpecialDates { branch_id: id() }
        );
    }

    #[test]
    fn select_hours_and_slots() {
        assert_eq!(
            parse_sql(&format!("SELECT * FROM hours WHERE branch_id = '{ID}' AND date = '2030-06-11'")).unwrap(),
            Command::SelectHours {
                branch_id: id(),
                date: d(2030, 6, 11)
            }
        );
        assert_eq!(
            parse_sql(&format!(
                "SELECT * FROM slots WHERE branch_id = '{ID}' AND date = '2030-06-11' AND guests = 4"
            ))
            .unwrap(),
            Command::SelectSlots {
                branch_id: id(),
                date: d(2030, 6, 11),
                guests: 4
            }
        );
    }

    #[test]
    fn select_slots_missing_guests() {
        let sql = format!("SELECT * FROM slots WHERE branch_id = '{ID}' AND date = '2030-06-11'");
        assert_eq!(parse_sql(&sql), Err(SqlError::MissingFilter("guests")));
    }

    #[test]
    fn select_available_tables() {
        let sql = format!(
            "SELECT * FROM available_tables WHERE branch_id = '{ID}' AND date = '2030-06-11' AND time = '19:30' AND guests = '2'"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectAvailableTables {
                branch_id: id(),
                date: d(2030, 6, 11),
                time: t(19, 30),
                guests: 2
            }
        );
    }

    #[test]
    fn select_reservations_three_ways() {
        assert_eq!(
            parse_sql("SELECT * FROM reservations WHERE confirmation_id = 'CI0123456789AB'").unwrap(),
            Command::SelectReservations {
                query: ReservationQuery::ByConfirmation("CI0123456789AB".into())
            }
        );
        assert_eq!(
            parse_sql("SELECT * FROM reservations WHERE email = 'noor@example.com'").unwrap(),
            Command::SelectReservations {
                query: ReservationQuery::Customer {
                    email: Some("noor@example.com".into()),
                    phone: None
                }
            }
        );
        assert_eq!(
            parse_sql(&format!(
                "SELECT * FROM reservations WHERE branch_id = '{ID}' AND date = '2030-06-11' AND status = 'confirmed'"
            ))
            .unwrap(),
            Command::SelectReservations {
                query: ReservationQuery::Filter(ReservationFilter {
                    branch_id: Some(id()),
                    date: Some(d(2030, 6, 11)),
                    status: Some(ReservationStatus::Confirmed),
                })
            }
        );
    }

    #[test]
    fn select_stats_with_and_without_branch() {
        assert_eq!(
            parse_sql("SELECT * FROM reservation_stats").unwrap(),
            Command::SelectReservationStats { branch_id: None }
        );
        assert_eq!(
            parse_sql(&format!("SELECT * FROM reservation_stats WHERE branch_id = '{ID}'")).unwrap(),
            Command::SelectReservationStats {
                branch_id: Some(id())
            }
        );
    }

    #[test]
    fn non_equality_filter_is_unsupported() {
        let sql = format!("SELECT * FROM tables WHERE branch_id = '{ID}' OR seats = 4");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn unknown_table_errors() {
        assert_eq!(
            parse_sql(&format!("INSERT INTO foobar (id) VALUES ('{ID}')")),
            Err(SqlError::UnknownTable("foobar".into()))
        );
        assert!(matches!(
            parse_sql("SELECT * FROM waitlist"),
            Err(SqlError::UnknownTable(_))
        ));
    }

    #[test]
    fn bad_values_error() {
        let sql = format!("SELECT * FROM hours WHERE branch_id = '{ID}' AND date = '11/06/2030'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
        let sql = "SELECT * FROM tables WHERE branch_id = 'not-a-ulid'";
        assert!(matches!(parse_sql(sql), Err(SqlError::Parse(_))));
        let sql = format!("DELETE FROM operating_hours WHERE branch_id = '{ID}' AND day_of_week = -1");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn multi_row_insert_unsupported() {
        let sql = format!("INSERT INTO table_status (table_id, status) VALUES ('{ID}', 'active'), ('{OTHER}', 'active')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert_eq!(parse_sql(""), Err(SqlError::Empty));
    }
}
