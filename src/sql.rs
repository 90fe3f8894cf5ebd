use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, OrderByKind, SetExpr, Statement,
    TableFactor, TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::dates::parse_timestamp;
use crate::model::*;

/// Parsed command from SQL input. Every field is typed and validated here;
/// the engine never sees raw SQL values.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertHall(HallSettings),
    UpdateHall {
        id: Ulid,
        changes: HallChanges,
    },
    DeleteHall {
        id: Ulid,
    },
    SelectHalls,
    InsertReservation {
        id: Ulid,
        hall_id: Ulid,
        start: Ms,
        end: Ms,
        requester: Requester,
    },
    UpdateReservation {
        id: Ulid,
        start: Option<Ms>,
        end: Option<Ms>,
    },
    DeleteReservation {
        id: Ulid,
    },
    SelectReservations(ReservationFilter),
    SelectSuggestions {
        hall_id: Ulid,
        start: Ms,
        end: Ms,
    },
    SelectUtilization {
        hall_id: Ulid,
        window: Option<(Ms, Ms)>,
    },
    SelectSummary,
}

const HALL_COLUMNS: &[&str] = &["id", "name", "capacity", "rate_per_day", "available_from", "available_to"];
const RESERVATION_COLUMNS: &[&str] = &["id", "hall_id", "start", "end", "name", "company"];

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let stmt = match stmts.as_slice() {
        [] => return Err(SqlError::Empty),
        [stmt] => stmt,
        _ => return Err(SqlError::Unsupported("multiple statements".into())),
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

// ── INSERT ────────────────────────────────────────────────────

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    match table.as_str() {
        "halls" => {
            let row = insert_row(insert, "halls", HALL_COLUMNS)?;
            Ok(Command::InsertHall(HallSettings {
                id: parse_ulid(row.required("id")?)?,
                name: row.get("name").map(parse_string_or_null).transpose()?.flatten(),
                capacity: row.get("capacity").map(parse_u32).transpose()?.unwrap_or(1),
                rate_per_day: parse_f64(row.required("rate_per_day")?)?,
                available_from: row.get("available_from").map(parse_ts_or_null).transpose()?.flatten(),
                available_to: row.get("available_to").map(parse_ts_or_null).transpose()?.flatten(),
            }))
        }
        "reservations" => {
            let row = insert_row(insert, "reservations", RESERVATION_COLUMNS)?;
            let text = |col| -> Result<String, SqlError> {
                Ok(row
                    .get(col)
                    .map(parse_string_or_null)
                    .transpose()?
                    .flatten()
                    .unwrap_or_default())
            };
            Ok(Command::InsertReservation {
                id: parse_ulid(row.required("id")?)?,
                hall_id: parse_ulid(row.required("hall_id")?)?,
                start: parse_ts(row.required("start")?)?,
                end: parse_ts(row.required("end")?)?,
                requester: Requester::new(text("name")?, text("company")?),
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// One `VALUES` row keyed by column name.
struct Row {
    cells: Vec<(String, Expr)>,
}

impl Row {
    fn get(&self, col: &str) -> Option<&Expr> {
        self.cells.iter().find(|(c, _)| c == col).map(|(_, e)| e)
    }

    fn required(&self, col: &'static str) -> Result<&Expr, SqlError> {
        self.get(col).ok_or(SqlError::MissingColumn(col))
    }
}

/// Pair the single `VALUES` row with its column list, or with `default_columns`
/// when the statement names none.
fn insert_row(insert: &ast::Insert, table: &'static str, default_columns: &[&str]) -> Result<Row, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    let values = match body.body.as_ref() {
        SetExpr::Values(values) => &values.rows,
        _ => return Err(SqlError::Parse("expected VALUES".into())),
    };
    let row = match values.as_slice() {
        [] => return Err(SqlError::Parse("empty VALUES".into())),
        [row] => row,
        _ => return Err(SqlError::Unsupported(format!("multi-row INSERT into {table}"))),
    };

    let columns: Vec<String> = if insert.columns.is_empty() {
        default_columns.iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if row.len() != columns.len() && !(insert.columns.is_empty() && row.len() < columns.len()) {
        return Err(SqlError::WrongArity(table, columns.len(), row.len()));
    }
    let mut cells = Vec::with_capacity(row.len());
    for (col, expr) in columns.into_iter().zip(row.iter().cloned()) {
        if !default_columns.contains(&col.as_str()) {
            return Err(SqlError::UnknownColumn(col));
        }
        cells.push((col, expr));
    }
    Ok(Row { cells })
}

// ── UPDATE ────────────────────────────────────────────────────

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let name = table_factor_name(&table.relation)?;
    let id = extract_where_id(selection)?;

    let mut sets = Vec::with_capacity(assignments.len());
    for a in assignments {
        let col = match &a.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            AssignmentTarget::Tuple(_) => None,
        }
        .ok_or_else(|| SqlError::Unsupported("tuple assignment".into()))?;
        sets.push((col, &a.value));
    }

    match name.as_str() {
        "halls" => {
            let mut changes = HallChanges::default();
            for (col, value) in sets {
                match col.as_str() {
                    "name" => changes.name = Some(parse_string_or_null(value)?),
                    "capacity" => changes.capacity = Some(parse_u32(value)?),
                    "rate_per_day" => changes.rate_per_day = Some(parse_f64(value)?),
                    "available_from" => changes.available_from = Some(parse_ts_or_null(value)?),
                    "available_to" => changes.available_to = Some(parse_ts_or_null(value)?),
                    _ => return Err(SqlError::UnknownColumn(col)),
                }
            }
            if changes == HallChanges::default() {
                return Err(SqlError::Parse("UPDATE halls sets nothing".into()));
            }
            Ok(Command::UpdateHall { id, changes })
        }
        "reservations" => {
            let (mut start, mut end) = (None, None);
            for (col, value) in sets {
                match col.as_str() {
                    "start" => start = Some(parse_ts(value)?),
                    "end" => end = Some(parse_ts(value)?),
                    _ => return Err(SqlError::UnknownColumn(col)),
                }
            }
            if start.is_none() && end.is_none() {
                return Err(SqlError::MissingColumn("start"));
            }
            Ok(Command::UpdateReservation { id, start, end })
        }
        _ => Err(SqlError::UnknownTable(name)),
    }
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "halls" => Ok(Command::DeleteHall { id }),
        "reservations" => Ok(Command::DeleteReservation { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut filters = Vec::new();
    if let Some(selection) = &select.selection {
        collect_eq_filters(selection, &mut filters)?;
    }
    let filter = |col: &str| filters.iter().find(|(c, _)| c == col).map(|(_, e)| *e);
    let allow_only = |allowed: &[&str]| -> Result<(), SqlError> {
        match filters.iter().find(|(c, _)| !allowed.contains(&c.as_str())) {
            Some((c, _)) => Err(SqlError::UnknownColumn(c.clone())),
            None => Ok(()),
        }
    };

    match table.as_str() {
        "halls" => {
            allow_only(&[])?;
            Ok(Command::SelectHalls)
        }
        "reservations" => {
            allow_only(&["hall_id", "company", "covers", "status"])?;
            let (sort_by, descending) = parse_order_by(query)?;
            Ok(Command::SelectReservations(ReservationFilter {
                hall_id: filter("hall_id").map(parse_ulid).transpose()?,
                company: filter("company").map(parse_string).transpose()?,
                covers: filter("covers").map(parse_ts).transpose()?,
                status: filter("status").map(parse_status).transpose()?,
                sort_by,
                descending,
            }))
        }
        "suggestions" => {
            allow_only(&["hall_id", "start", "end"])?;
            Ok(Command::SelectSuggestions {
                hall_id: parse_ulid(filter("hall_id").ok_or(SqlError::MissingFilter("hall_id"))?)?,
                start: parse_ts(filter("start").ok_or(SqlError::MissingFilter("start"))?)?,
                end: parse_ts(filter("end").ok_or(SqlError::MissingFilter("end"))?)?,
            })
        }
        "utilization" => {
            allow_only(&["hall_id", "start", "end"])?;
            let hall_id = parse_ulid(filter("hall_id").ok_or(SqlError::MissingFilter("hall_id"))?)?;
            let window = match (filter("start"), filter("end")) {
                (Some(s), Some(e)) => Some((parse_ts(s)?, parse_ts(e)?)),
                (None, None) => None,
                (Some(_), None) => return Err(SqlError::MissingFilter("end")),
                (None, Some(_)) => return Err(SqlError::MissingFilter("start")),
            };
            Ok(Command::SelectUtilization { hall_id, window })
        }
        "summary" => {
            allow_only(&[])?;
            Ok(Command::SelectSummary)
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Flatten `a = 1 AND (b = 2 AND c = 3)` into column/value pairs.
fn collect_eq_filters<'a>(expr: &'a Expr, out: &mut Vec<(String, &'a Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_eq_filters(inner, out),
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_eq_filters(left, out)?;
            collect_eq_filters(right, out)
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
        other => Err(SqlError::Unsupported(format!("filter {other}"))),
    }
}

fn parse_order_by(query: &ast::Query) -> Result<(SortKey, bool), SqlError> {
    let Some(order_by) = &query.order_by else {
        return Ok((SortKey::default(), false));
    };
    let exprs = match &order_by.kind {
        OrderByKind::Expressions(exprs) => exprs,
        OrderByKind::All(_) => return Err(SqlError::Unsupported("ORDER BY ALL".into())),
    };
    let Some(first) = exprs.first() else {
        return Ok((SortKey::default(), false));
    };
    let col = expr_column_name(&first.expr)
        .ok_or_else(|| SqlError::Unsupported(format!("ORDER BY {}", first.expr)))?;
    let key = match col.as_str() {
        "start" => SortKey::Start,
        "end" => SortKey::End,
        "company" => SortKey::Company,
        "hall_id" => SortKey::HallId,
        _ => return Err(SqlError::UnknownColumn(col)),
    };
    Ok((key, first.options.asc == Some(false)))
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

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    match selection {
        Some(Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        }) if expr_column_name(left).as_deref() == Some("id") => parse_ulid(right),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => {
            Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID {s}: {e}")))
        }
        Some(value) => Err(SqlError::Parse(format!("expected ULID string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_status(expr: &Expr) -> Result<ReservationStatus, SqlError> {
    let s = parse_string(expr)?;
    match s.to_ascii_lowercase().as_str() {
        "past" => Ok(ReservationStatus::Past),
        "current" => Ok(ReservationStatus::Current),
        "upcoming" => Ok(ReservationStatus::Upcoming),
        _ => Err(SqlError::Parse(format!("unknown status '{s}'"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    if is_null(expr) {
        Ok(None)
    } else {
        parse_string(expr).map(Some)
    }
}

/// Numeric literal text, accepting quoted numbers and a leading minus.
fn number_text(expr: &Expr) -> Result<String, SqlError> {
    match expr {
        Expr::UnaryOp {
            op: ast::UnaryOperator::Minus,
            expr,
        } => Ok(format!("-{}", number_text(expr)?)),
        _ => match extract_value(expr) {
            Some(Value::Number(s, _)) | Some(Value::SingleQuotedString(s)) => Ok(s.trim().to_string()),
            Some(value) => Err(SqlError::Parse(format!("expected number, got {value}"))),
            None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
        },
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let s = number_text(expr)?;
    s.parse().map_err(|_| SqlError::Parse(format!("{s} is not a valid u32")))
}

fn parse_f64(expr: &Expr) -> Result<f64, SqlError> {
    let s = number_text(expr)?;
    s.parse().map_err(|_| SqlError::Parse(format!("{s} is not a number")))
}

/// Unix milliseconds or a `'YYYY-MM-DD'` date.
fn parse_ts(expr: &Expr) -> Result<Ms, SqlError> {
    let s = number_text(expr)?;
    parse_timestamp(&s).ok_or_else(|| SqlError::Parse(format!("bad timestamp: {s}")))
}

fn parse_ts_or_null(expr: &Expr) -> Result<Option<Ms>, SqlError> {
    if is_null(expr) {
        Ok(None)
    } else {
        parse_ts(expr).map(Some)
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::ymd;

    const ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const HALL: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";

    fn id() -> Ulid {
        Ulid::from_string(ID).unwrap()
    }

    fn hall() -> Ulid {
        Ulid::from_string(HALL).unwrap()
    }

    #[test]
    fn insert_hall_with_all_columns() {
        let sql = format!(
            "INSERT INTO halls (id, name, capacity, rate_per_day, available_from, available_to) \
             VALUES ('{HALL}', 'Ballroom', 300, 125.5, '2025-01-01', NULL)"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertHall(HallSettings {
                id: hall(),
                name: Some("Ballroom".into()),
                capacity: 300,
                rate_per_day: 125.5,
                available_from: ymd(2025, 1, 1),
                available_to: None,
            })
        );
    }

    #[test]
    fn insert_hall_defaults_and_column_order() {
        let sql = format!("INSERT INTO halls (rate_per_day, id) VALUES (50, '{HALL}')");
        match parse_sql(&sql).unwrap() {
            Command::InsertHall(settings) => {
                assert_eq!(settings.id, hall());
                assert_eq!(settings.rate_per_day, 50.0);
                assert_eq!(settings.capacity, 1);
                assert_eq!(settings.name, None);
            }
            other => panic!("expected InsertHall, got {other:?}"),
        }
    }

    #[test]
    fn insert_hall_without_rate_fails() {
        let sql = format!("INSERT INTO halls (id) VALUES ('{HALL}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingColumn("rate_per_day"))));
    }

    #[test]
    fn insert_reservation_with_dates() {
        let sql = format!(
            r#"INSERT INTO reservations (id, hall_id, start, "end", name, company) VALUES ('{ID}', '{HALL}', '2025-06-01', '2025-06-04', 'Ana', 'Acme')"#
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertReservation {
                id: id(),
                hall_id: hall(),
                start: ymd(2025, 6, 1).unwrap(),
                end: ymd(2025, 6, 4).unwrap(),
                requester: Requester::new("Ana", "Acme"),
            }
        );
    }

    #[test]
    fn insert_reservation_with_millis_and_no_requester() {
        let sql = format!(r#"INSERT INTO reservations (id, hall_id, start, "end") VALUES ('{ID}', '{HALL}', 1000, '2000')"#);
        match parse_sql(&sql).unwrap() {
            Command::InsertReservation { start, end, requester, .. } => {
                assert_eq!((start, end), (1000, 2000));
                assert_eq!(requester, Requester::default());
            }
            other => panic!("expected InsertReservation, got {other:?}"),
        }
    }

    #[test]
    fn insert_positional_values_use_canonical_order() {
        let sql = format!("INSERT INTO reservations VALUES ('{ID}', '{HALL}', 1000, 2000)");
        assert!(matches!(parse_sql(&sql).unwrap(), Command::InsertReservation { .. }));
    }

    #[test]
    fn insert_rejects_unknown_columns_and_multi_row() {
        let sql = format!("INSERT INTO halls (id, rate_per_day, colour) VALUES ('{HALL}', 5, 'red')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownColumn(_))));
        let sql = format!(
            r#"INSERT INTO reservations (id, hall_id, start, "end") VALUES ('{ID}', '{HALL}', 1, 2), ('{ID}', '{HALL}', 3, 4)"#
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
        let sql = format!(r#"INSERT INTO reservations (id, hall_id, start, "end") VALUES ('{ID}', '{HALL}', 1)"#);
        assert!(matches!(parse_sql(&sql), Err(SqlError::WrongArity("reservations", 4, 3))));
    }

    #[test]
    fn bad_values_are_parse_errors() {
        let sql = r#"INSERT INTO reservations (id, hall_id, start, "end") VALUES ('nope', 'nope', 1, 2)"#;
        assert!(matches!(parse_sql(sql), Err(SqlError::Parse(_))));
        let sql = format!(r#"INSERT INTO reservations (id, hall_id, start, "end") VALUES ('{ID}', '{HALL}', '06/01/2025', 2)"#);
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
        let sql = format!("INSERT INTO halls (id, rate_per_day, capacity) VALUES ('{HALL}', 5, -1)");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn update_hall_partial() {
        let sql = format!("UPDATE halls SET rate_per_day = 80, name = NULL WHERE id = '{HALL}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::UpdateHall {
                id: hall(),
                changes: HallChanges {
                    name: Some(None),
                    rate_per_day: Some(80.0),
                    ..Default::default()
                },
            }
        );
    }

    #[test]
    fn update_reservation_dates() {
        let sql = format!(r#"UPDATE reservations SET start = '2025-06-02', "end" = '2025-06-05' WHERE id = '{ID}'"#);
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::UpdateReservation {
                id: id(),
                start: ymd(2025, 6, 2),
                end: ymd(2025, 6, 5),
            }
        );
        let sql = format!("UPDATE reservations SET company = 'x' WHERE id = '{ID}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownColumn(_))));
        let sql = "UPDATE reservations SET start = 5";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn delete_by_id() {
        let sql = format!("DELETE FROM reservations WHERE id = '{ID}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::DeleteReservation { id: id() });
        let sql = format!("DELETE FROM halls WHERE id = '{HALL}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::DeleteHall { id: hall() });
        assert!(matches!(parse_sql("DELETE FROM halls"), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn select_reservations_with_filters_and_order() {
        let sql = format!(
            "SELECT * FROM reservations WHERE hall_id = '{HALL}' AND (company = 'Acme' AND covers = '2025-06-02') ORDER BY company DESC"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectReservations(ReservationFilter {
                hall_id: Some(hall()),
                company: Some("Acme".into()),
                covers: ymd(2025, 6, 2),
                status: None,
                sort_by: SortKey::Company,
                descending: true,
            })
        );
        assert_eq!(
            parse_sql("SELECT * FROM reservations").unwrap(),
            Command::SelectReservations(ReservationFilter::default())
        );
        assert!(matches!(
            parse_sql(r#"SELECT * FROM reservations ORDER BY "end""#).unwrap(),
            Command::SelectReservations(ReservationFilter { sort_by: SortKey::End, descending: false, .. })
        ));
    }

    #[test]
    fn select_reservations_by_status() {
        assert_eq!(
            parse_sql("SELECT * FROM reservations WHERE status = 'upcoming'").unwrap(),
            Command::SelectReservations(ReservationFilter {
                status: Some(ReservationStatus::Upcoming),
                ..Default::default()
            })
        );
        assert!(matches!(
            parse_sql("SELECT * FROM reservations WHERE status = 'Past'").unwrap(),
            Command::SelectReservations(ReservationFilter {
                status: Some(ReservationStatus::Past),
                ..
            })
        ));
        assert!(matches!(
            parse_sql("SELECT * FROM reservations WHERE status = 'someday'"),
            Err(SqlError::Parse(_))
        ));
    }

    #[test]
    fn select_reservations_rejects_unknown_filter() {
        assert!(matches!(
            parse_sql("SELECT * FROM reservations WHERE colour = 'red'"),
            Err(SqlError::UnknownColumn(_))
        ));
        assert!(matches!(
            parse_sql("SELECT * FROM reservations WHERE start > 5"),
            Err(SqlError::Unsupported(_))
        ));
    }

    #[test]
    fn select_suggestions() {
        let sql = format!(
            r#"SELECT * FROM suggestions WHERE hall_id = '{HALL}' AND start = '2025-06-03' AND "end" = '2025-06-05'"#
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectSuggestions {
                hall_id: hall(),
                start: ymd(2025, 6, 3).unwrap(),
                end: ymd(2025, 6, 5).unwrap(),
            }
        );
        let sql = format!("SELECT * FROM suggestions WHERE hall_id = '{HALL}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingFilter("start"))));
    }

    #[test]
    fn select_utilization_window_optional() {
        let sql = format!("SELECT * FROM utilization WHERE hall_id = '{HALL}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectUtilization { hall_id: hall(), window: None }
        );
        let sql = format!(
            r#"SELECT * FROM utilization WHERE hall_id = '{HALL}' AND start = '2025-06-01' AND "end" = '2025-06-30'"#
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectUtilization {
                hall_id: hall(),
                window: Some((ymd(2025, 6, 1).unwrap(), ymd(2025, 6, 30).unwrap())),
            }
        );
        let sql = format!("SELECT * FROM utilization WHERE hall_id = '{HALL}' AND start = 5");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingFilter("end"))));
    }

    #[test]
    fn select_halls_and_summary() {
        assert_eq!(parse_sql("SELECT * FROM halls").unwrap(), Command::SelectHalls);
        assert_eq!(parse_sql("select * from SUMMARY;").unwrap(), Command::SelectSummary);
    }

    #[test]
    fn unknown_tables_and_statements() {
        assert!(matches!(parse_sql("SELECT * FROM bookings"), Err(SqlError::UnknownTable(_))));
        assert!(matches!(parse_sql("DROP TABLE halls"), Err(SqlError::Unsupported(_))));
        assert!(matches!(parse_sql("SELECT 1; SELECT 2"), Err(SqlError::Unsupported(_))));
        assert!(matches!(parse_sql("INSERT INTO"), Err(SqlError::Parse(_))));
    }

    #[test]
    fn empty_input() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
