use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::StartupHandler;
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
use tokio::net::TcpStream;
use tracing::debug;

use crate::engine::{Engine, EngineError};
use crate::observability;
use crate::sql::{self, Command, SqlError};

pub struct HallbookHandler {
    engine: Arc<Engine>,
    query_parser: Arc<HallbookQueryParser>,
}

impl HallbookHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(HallbookQueryParser),
        }
    }

    /// Parse, execute and record metrics for one statement.
    async fn run(&self, sql: &str) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(sql).map_err(sql_err)?;
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(cmd).await;
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        result
    }

    async fn execute_command(&self, cmd: Command) -> PgWireResult<Response> {
        let engine = &self.engine;
        match cmd {
            Command::InsertHall(settings) => {
                engine.create_hall(settings).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::UpdateHall { id, changes } => {
                engine
                    .update_hall_with(id, changes)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeleteHall { id } => {
                engine.delete_hall(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectHalls => {
                let halls = engine.list_halls().await;
                let schema = Arc::new(halls_schema());
                let rows: Vec<PgWireResult<_>> = halls
                    .into_iter()
                    .map(|h| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&h.id.to_string())?;
                        encoder.encode_field(&h.name)?;
                        encoder.encode_field(&(h.capacity as i64))?;
                        encoder.encode_field(&h.rate_per_day)?;
                        encoder.encode_field(&h.available_from)?;
                        encoder.encode_field(&h.available_to)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::InsertReservation {
                id,
                hall_id,
                start,
                end,
                requester,
            } => {
                let r = engine
                    .submit_booking(id, hall_id, start, end, requester)
                    .await
                    .map_err(engine_err)?;
                debug!("booked {} for {:.2}", r.id, r.total_cost);
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::UpdateReservation { id, start, end } => {
                engine
                    .reschedule_booking(id, start, end)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeleteReservation { id } => {
                engine.cancel_booking(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectReservations(filter) => {
                let reservations = engine.list_reservations(&filter).await.map_err(engine_err)?;
                let schema = Arc::new(reservations_schema());
                let rows: Vec<PgWireResult<_>> = reservations
                    .into_iter()
                    .map(|r| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&r.id.to_string())?;
                        encoder.encode_field(&r.hall_id.to_string())?;
                        encoder.encode_field(&r.span.start)?;
                        encoder.encode_field(&r.span.end)?;
                        encoder.encode_field(&r.requester.name)?;
                        encoder.encode_field(&r.requester.company)?;
                        encoder.encode_field(&r.duration_days())?;
                        encoder.encode_field(&r.total_cost)?;
                        encoder.encode_field(&r.effective_daily_cost())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectSuggestions { hall_id, start, end } => {
                let windows = engine.suggest(hall_id, start, end).await.map_err(engine_err)?;
                let schema = Arc::new(suggestions_schema());
                let hall = hall_id.to_string();
                let rows: Vec<PgWireResult<_>> = windows
                    .into_iter()
                    .map(|w| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&hall)?;
                        encoder.encode_field(&w.start)?;
                        encoder.encode_field(&w.end)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectUtilization { hall_id, window } => {
                let report = engine
                    .get_utilization(hall_id, window)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(utilization_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&report.hall_id.to_string())?;
                encoder.encode_field(&report.window_start)?;
                encoder.encode_field(&report.window_end)?;
                encoder.encode_field(&report.booked_days)?;
                encoder.encode_field(&report.total_days)?;
                encoder.encode_field(&report.rate)?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectSummary => {
                let s = engine.reservation_summary().await;
                let schema = Arc::new(summary_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&(s.total as i64))?;
                encoder.encode_field(&(s.past as i64))?;
                encoder.encode_field(&(s.current as i64))?;
                encoder.encode_field(&(s.upcoming as i64))?;
                encoder.encode_field(&s.revenue)?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
        }
    }
}

// ── Result schemas ───────────────────────────────────────────────

fn field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn halls_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("capacity", Type::INT8),
        field("rate_per_day", Type::FLOAT8),
        field("available_from", Type::INT8),
        field("available_to", Type::INT8),
    ]
}

fn reservations_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("hall_id", Type::VARCHAR),
        field("start", Type::INT8),
        field("end", Type::INT8),
        field("name", Type::VARCHAR),
        field("company", Type::VARCHAR),
        field("days", Type::INT8),
        field("total_cost", Type::FLOAT8),
        field("cost_per_day", Type::FLOAT8),
    ]
}

fn suggestions_schema() -> Vec<FieldInfo> {
    vec![
        field("hall_id", Type::VARCHAR),
        field("start", Type::INT8),
        field("end", Type::INT8),
    ]
}

fn utilization_schema() -> Vec<FieldInfo> {
    vec![
        field("hall_id", Type::VARCHAR),
        field("window_start", Type::INT8),
        field("window_end", Type::INT8),
        field("booked_days", Type::INT8),
        field("total_days", Type::INT8),
        field("rate", Type::FLOAT8),
    ]
}

fn summary_schema() -> Vec<FieldInfo> {
    vec![
        field("total", Type::INT8),
        field("past", Type::INT8),
        field("current", Type::INT8),
        field("upcoming", Type::INT8),
        field("revenue", Type::FLOAT8),
    ]
}

/// Row description for a statement that may still contain `$N` placeholders.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    if !upper.trim_start().starts_with("SELECT") {
        return vec![];
    }
    if upper.contains("SUMMARY") {
        summary_schema()
    } else if upper.contains("UTILIZATION") {
        utilization_schema()
    } else if upper.contains("SUGGESTIONS") {
        suggestions_schema()
    } else if upper.contains("RESERVATIONS") {
        reservations_schema()
    } else if upper.contains("HALLS") {
        halls_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for HallbookHandler {
    async fn do_query<C>(
        &self,
        _client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(vec![self.run(query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct HallbookQueryParser;

#[async_trait]
impl QueryParser for HallbookQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
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
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for HallbookHandler {
    type Statement = String;
    type QueryParser = HallbookQueryParser;

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
        self.run(&sql).await
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
            result_schema(&target.statement),
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
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
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
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
            {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... with bound text parameters as quoted literals.
/// Goes from the highest index down so `$1` never clobbers `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    let mut result = portal.statement.statement.to_string();
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct HallbookFactory {
    handler: Arc<HallbookHandler>,
    noop: Arc<NoopHandler>,
}

impl HallbookFactory {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            handler: Arc::new(HallbookHandler::new(engine)),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for HallbookFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.noop.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(socket: TcpStream, engine: Arc<Engine>) -> std::io::Result<()> {
    let factory = Arc::new(HallbookFactory::new(engine));
    pgwire::tokio::process_socket(socket, None, factory).await
}

// ── Error mapping ────────────────────────────────────────────────

/// SQLSTATE for an engine error.
fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::Conflict { .. } => "23P01",
        EngineError::AlreadyExists(_) => "23505",
        EngineError::HasReservations(_) => "23503",
        EngineError::HallNotFound(_) | EngineError::ReservationNotFound(_) => "P0002",
        EngineError::StorageUnavailable(_) => "58030",
        EngineError::InvalidWindow { .. } => "22023",
        e if e.is_validation() => "22023",
        _ => "P0001",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        sqlstate(&e).into(),
        e.to_string(),
    )))
}

fn sql_err(e: SqlError) -> PgWireError {
    let code = match e {
        SqlError::UnknownTable(_) => "42P01",
        SqlError::UnknownColumn(_) => "42703",
        _ => "42601",
    };
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        e.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn count_params_takes_highest_index() {
        assert_eq!(count_params("SELECT * FROM halls"), 0);
        assert_eq!(count_params("SELECT * FROM suggestions WHERE hall_id = $1 AND start = $3 AND \"end\" = $2"), 3);
        assert_eq!(count_params("UPDATE halls SET rate_per_day = $12 WHERE id = $1"), 12);
        assert_eq!(count_params("SELECT '$'"), 0);
    }

    #[test]
    fn result_schema_follows_table() {
        let names = |sql: &str| -> Vec<String> {
            result_schema(sql).iter().map(|f| f.name().to_string()).collect()
        };
        assert_eq!(names("SELECT * FROM summary"), ["total", "past", "current", "upcoming", "revenue"]);
        assert_eq!(names("select * from halls")[0], "id");
        assert_eq!(names("SELECT * FROM reservations WHERE hall_id = $1").len(), 9);
        assert_eq!(names("SELECT * FROM utilization WHERE hall_id = $1")[3], "booked_days");
        assert!(names("DELETE FROM reservations WHERE id = $1").is_empty());
        assert!(names("INSERT INTO halls (id, rate_per_day) VALUES ($1, $2)").is_empty());
    }

    #[test]
    fn engine_errors_map_to_sqlstates() {
        let id = Ulid::new();
        let conflict = EngineError::Conflict { with: id, suggestions: vec![] };
        assert_eq!(sqlstate(&conflict), "23P01");
        assert_eq!(sqlstate(&EngineError::HallNotFound(id)), "P0002");
        assert_eq!(sqlstate(&EngineError::ReservationNotFound(id)), "P0002");
        assert_eq!(sqlstate(&EngineError::InvalidSpan { start: 2, end: 1 }), "22023");
        assert_eq!(sqlstate(&EngineError::StartInPast { start: 0, now: 1 }), "22023");
        assert_eq!(sqlstate(&EngineError::InvalidWindow { start: 2, end: 1 }), "22023");
        assert_eq!(sqlstate(&EngineError::HasReservations(id)), "23503");
        assert_eq!(sqlstate(&EngineError::AlreadyExists(id)), "23505");
        assert_eq!(sqlstate(&EngineError::StorageUnavailable("disk".into())), "58030");
    }
}
