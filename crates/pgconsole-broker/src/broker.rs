//! Request orchestration.

use crate::active::{ActiveQueryEntry, ActiveQueryTable};
use crate::compose::{compose_sql, search_path_statement};
use crate::format::format_db_error;
use crate::frame::{ColumnMeta, Frame};
use futures::Stream;
use pgconsole_adapter_pg::{
    application_name_tag, introspect, sessions, ClientFactory, ConnectionInfo,
    ConnectionInfoCache, PgClient,
};
use pgconsole_auth::Principal;
use pgconsole_audit::{AuditRecord, AuditSink};
use pgconsole_core::license::Feature;
use pgconsole_core::{ConnectionConfig, GatewayError, Permission, Plan, Policy};
use pgconsole_iam::IamEvaluator;
use pgconsole_sqlguard::{splitter, SqlAnalyzer};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_postgres::types::Oid;
use tokio_postgres::SimpleQueryMessage;

/// Outcome of a cancellation request.
#[derive(Debug, Clone, Serialize)]
pub struct CancelResult {
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Orchestrates authorize → execute → stream → audit for every query.
pub struct QueryBroker {
    policy: Arc<Policy>,
    iam: IamEvaluator,
    plan: Plan,
    analyzer: SqlAnalyzer,
    factory: Arc<ClientFactory>,
    active: Arc<ActiveQueryTable>,
    info_cache: Arc<ConnectionInfoCache>,
    audit: Arc<dyn AuditSink>,
}

impl QueryBroker {
    pub fn new(
        policy: Arc<Policy>,
        iam: IamEvaluator,
        plan: Plan,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            policy,
            iam,
            plan,
            analyzer: SqlAnalyzer::new(),
            factory: Arc::new(ClientFactory::new()),
            active: Arc::new(ActiveQueryTable::new()),
            info_cache: Arc::new(ConnectionInfoCache::new()),
            audit,
        }
    }

    pub fn iam(&self) -> &IamEvaluator {
        &self.iam
    }

    /// Probe one configured connection without a principal, warming the
    /// version cache. Used at startup for non-lazy connections.
    pub async fn probe_connection(&self, conn: &ConnectionConfig) -> Result<ConnectionInfo, GatewayError> {
        let client = self
            .factory
            .connect(conn, "system")
            .await
            .map_err(|err| GatewayError::unavailable(err.to_string()))?;
        self.info_cache
            .probe(&conn.id, &client)
            .await
            .map_err(|err| GatewayError::unavailable(err.to_string()))
    }

    /// Resolve a connection the caller holds at least one permission on.
    ///
    /// A connection without grants reports exactly like a missing one.
    pub fn accessible_connection(
        &self,
        principal: Option<&Principal>,
        connection_id: &str,
    ) -> Result<ConnectionConfig, GatewayError> {
        self.iam.require_any_permission(principal, connection_id)?;
        self.policy
            .get_connection_by_id(connection_id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found(format!("connection '{connection_id}'")))
    }

    /// Open a client on an accessible connection, tagged with the caller.
    pub async fn client_for(
        &self,
        principal: &Principal,
        connection_id: &str,
    ) -> Result<(ConnectionConfig, PgClient), GatewayError> {
        let conn = self.accessible_connection(Some(principal), connection_id)?;
        let client = self
            .factory
            .connect(&conn, &principal.email)
            .await
            .map_err(|err| GatewayError::unavailable(err.to_string()))?;
        Ok((conn, client))
    }

    /// Probe a connection and cache its server version.
    pub async fn test_connection(
        &self,
        principal: Option<&Principal>,
        connection_id: &str,
    ) -> Result<ConnectionInfo, GatewayError> {
        let principal = principal.ok_or_else(GatewayError::unauthenticated)?;
        let (_, client) = self.client_for(principal, connection_id).await?;
        let info = self
            .info_cache
            .probe(connection_id, &client)
            .await
            .map_err(|err| GatewayError::unavailable(err.to_string()))?;
        Ok(info)
    }

    /// Execute SQL and stream result frames.
    ///
    /// Everything that can be rejected is rejected before the stream exists:
    /// argument validation, principal resolution, analysis and IAM. The
    /// returned stream then emits the pid-only frame followed by one data or
    /// error frame; database-side failures never surface as RPC errors.
    pub async fn execute_sql(
        &self,
        principal: Option<&Principal>,
        connection_id: &str,
        sql: &str,
        query_id: &str,
        search_path: Option<&str>,
    ) -> Result<impl Stream<Item = Frame> + Send + 'static, GatewayError> {
        if connection_id.is_empty() {
            return Err(GatewayError::invalid_argument("connection_id is required"));
        }
        if sql.trim().is_empty() {
            return Err(GatewayError::invalid_argument("sql must not be empty"));
        }
        let principal = principal.ok_or_else(GatewayError::unauthenticated)?;

        let conn = self
            .policy
            .get_connection_by_id(connection_id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found(format!("connection '{connection_id}'")))?;

        let analysis = self.analyzer.analyze(sql);
        self.iam
            .require_permissions(Some(principal), connection_id, &analysis.permissions)?;

        tracing::debug!(
            connection = connection_id,
            email = %principal.email,
            statements = analysis.statement_count,
            "query authorized"
        );

        let client = self
            .factory
            .connect(&conn, &principal.email)
            .await
            .map_err(|err| GatewayError::unavailable(err.to_string()))?;
        let backend_pid = client
            .backend_pid()
            .await
            .map_err(|err| GatewayError::unavailable(err.to_string()))?;

        let guard = (!query_id.is_empty()).then(|| {
            self.active.register(
                query_id,
                ActiveQueryEntry {
                    backend_pid,
                    connection_id: conn.id.clone(),
                    email: principal.email.clone(),
                },
            )
        });

        let email = principal.email.clone();
        let sql = sql.to_string();
        let search_path = search_path.map(str::to_string);
        let audit = Arc::clone(&self.audit);

        Ok(async_stream::stream! {
            // Entry removal and client teardown happen when these leave
            // scope, on every path out of the stream.
            let _guard = guard;
            let client = client;

            yield Frame::pid(backend_pid);

            let started = Instant::now();

            if let Some(search_path) = &search_path {
                let statement = search_path_statement(search_path);
                if let Err(err) = client.batch_execute(&statement).await {
                    let elapsed = started.elapsed().as_millis() as u64;
                    let text = format_db_error(&statement, &err);
                    append_audit(
                        &audit,
                        AuditRecord::sql(&email, &conn.id, &conn.database, &sql)
                            .failed(elapsed, &text),
                    )
                    .await;
                    yield Frame::error(backend_pid, text, elapsed);
                    return;
                }
            }

            let final_sql = compose_sql(&sql, &analysis);
            match client.simple_query(&final_sql).await {
                Ok(messages) => {
                    let elapsed = started.elapsed().as_millis() as u64;
                    let (names, rows, command_rows) = last_result_set(messages);
                    let columns =
                        resolve_columns(&client, &sql, &analysis, names).await;
                    let row_count = if rows.is_empty() { command_rows } else { rows.len() as u64 };
                    append_audit(
                        &audit,
                        AuditRecord::sql(&email, &conn.id, &conn.database, &sql)
                            .succeeded(elapsed, row_count),
                    )
                    .await;
                    let mut frame = Frame::data(backend_pid, columns, rows, elapsed);
                    frame.row_count = row_count;
                    yield frame;
                }
                Err(err) => {
                    let elapsed = started.elapsed().as_millis() as u64;
                    let text = format_db_error(&final_sql, &err);
                    append_audit(
                        &audit,
                        AuditRecord::sql(&email, &conn.id, &conn.database, &sql)
                            .failed(elapsed, &text),
                    )
                    .await;
                    yield Frame::error(backend_pid, text, elapsed);
                }
            }
        })
    }

    /// Cancel a running query by its client-supplied id.
    ///
    /// Allowed for the query's owner and for holders of `admin` on the
    /// connection. The cancel signal travels over a separate client; the
    /// executing stream observes the database error and finishes normally.
    pub async fn cancel_query(
        &self,
        principal: Option<&Principal>,
        connection_id: &str,
        query_id: &str,
    ) -> Result<CancelResult, GatewayError> {
        let principal = principal.ok_or_else(GatewayError::unauthenticated)?;
        if connection_id.is_empty() || query_id.is_empty() {
            return Err(GatewayError::invalid_argument(
                "connection_id and query_id are required",
            ));
        }

        let Some(entry) = self.active.get(query_id) else {
            return Ok(CancelResult {
                cancelled: false,
                error: Some("Query not found or already completed".to_string()),
            });
        };
        if entry.connection_id != connection_id {
            return Ok(CancelResult {
                cancelled: false,
                error: Some("Query not found or already completed".to_string()),
            });
        }

        if entry.email != principal.email {
            self.iam
                .require_permission(Some(principal), connection_id, Permission::Admin)?;
        }

        let (_, client) = self.client_for(principal, connection_id).await?;
        let accepted = sessions::cancel_backend(&client, entry.backend_pid)
            .await
            .map_err(|err| GatewayError::unavailable(err.to_string()))?;
        Ok(CancelResult {
            cancelled: accepted,
            error: (!accepted).then(|| "Backend did not accept the cancel request".to_string()),
        })
    }

    /// List backends on the connection's database.
    ///
    /// Admins see every backend; everyone else sees only the backends
    /// carrying their own application-name tag.
    pub async fn active_sessions(
        &self,
        principal: Option<&Principal>,
        connection_id: &str,
    ) -> Result<Vec<sessions::SessionRow>, GatewayError> {
        let held = self.iam.require_any_permission(principal, connection_id)?;
        let principal = principal.ok_or_else(GatewayError::unauthenticated)?;
        let (conn, client) = self.client_for(principal, connection_id).await?;

        let tag = application_name_tag(&principal.email);
        let filter = (!held.contains(Permission::Admin)).then_some(tag.as_str());
        sessions::active_sessions(&client, &conn.database, filter)
            .await
            .map_err(|err| GatewayError::unavailable(err.to_string()))
    }

    /// Terminate a backend outright. Requires `admin`.
    pub async fn terminate_session(
        &self,
        principal: Option<&Principal>,
        connection_id: &str,
        pid: i32,
    ) -> Result<bool, GatewayError> {
        self.iam
            .require_permission(principal, connection_id, Permission::Admin)?;
        let principal = principal.ok_or_else(GatewayError::unauthenticated)?;
        let (_, client) = self.client_for(principal, connection_id).await?;
        sessions::terminate_backend(&client, pid)
            .await
            .map_err(|err| GatewayError::unavailable(err.to_string()))
    }

    /// Record a result export. Requires the `export` permission and a plan
    /// that includes exports.
    pub async fn audit_export(
        &self,
        principal: Option<&Principal>,
        connection_id: &str,
    ) -> Result<(), GatewayError> {
        self.iam
            .require_permission(principal, connection_id, Permission::Export)?;
        if !self.plan.permits(Feature::AuditExport) {
            return Err(GatewayError::new(
                pgconsole_core::ErrorCode::PermissionDenied,
                format!(
                    "exports require the {} plan",
                    Feature::AuditExport.minimum_plan().as_str()
                ),
            ));
        }
        let principal = principal.ok_or_else(GatewayError::unauthenticated)?;
        let conn = self.accessible_connection(Some(principal), connection_id)?;
        append_audit(
            &self.audit,
            AuditRecord::export(&principal.email, &conn.id, &conn.database),
        )
        .await;
        Ok(())
    }
}

async fn append_audit(audit: &Arc<dyn AuditSink>, record: AuditRecord) {
    if let Err(err) = audit.append(record).await {
        tracing::warn!(%err, "failed to append audit record");
    }
}

/// Reduce a simple-query response to the last result set: column names,
/// rows rendered as text (NULL becomes empty), and the last command tag's
/// row count.
fn last_result_set(
    messages: Vec<SimpleQueryMessage>,
) -> (Vec<String>, Vec<Vec<String>>, u64) {
    let mut names: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut command_rows = 0;

    for message in messages {
        match message {
            SimpleQueryMessage::RowDescription(columns) => {
                names = columns.iter().map(|c| c.name().to_string()).collect();
                rows.clear();
            }
            SimpleQueryMessage::Row(row) => {
                let mut values = Vec::with_capacity(row.len());
                for index in 0..row.len() {
                    values.push(row.get(index).unwrap_or_default().to_string());
                }
                rows.push(values);
            }
            SimpleQueryMessage::CommandComplete(count) => {
                command_rows = count;
            }
            _ => {}
        }
    }
    (names, rows, command_rows)
}

/// Build column metadata for the final frame.
///
/// Single-statement batches are re-described on the same client to recover
/// type and table oids, which a catalog lookup turns into table, schema,
/// primary-key, nullability and default facts. Anything that does not line
/// up degrades to name-only metadata.
async fn resolve_columns(
    client: &PgClient,
    sql: &str,
    analysis: &pgconsole_sqlguard::SqlAnalysis,
    names: Vec<String>,
) -> Vec<ColumnMeta> {
    if names.is_empty() {
        return Vec::new();
    }
    let fallback = || {
        names
            .iter()
            .map(|name| ColumnMeta::named(name.as_str()))
            .collect::<Vec<_>>()
    };

    if analysis.statement_count != 1 {
        return fallback();
    }
    let Ok(pieces) = splitter::split_statements(sql) else {
        return fallback();
    };
    let Some(piece) = pieces.first() else {
        return fallback();
    };
    let Ok(statement) = client.prepare(piece).await else {
        return fallback();
    };
    let described = statement.columns();
    if described.len() != names.len()
        || described.iter().zip(&names).any(|(c, n)| c.name() != n)
    {
        return fallback();
    }

    let keys: Vec<(Oid, i16)> = described
        .iter()
        .filter_map(|c| Some((c.table_oid()?, c.column_id()?)))
        .collect();
    let attributes = introspect::column_attributes(client, &keys)
        .await
        .unwrap_or_default();

    described
        .iter()
        .map(|column| {
            let mut meta = ColumnMeta::named(column.name());
            meta.type_name = column.type_().name().to_string();
            if let (Some(oid), Some(attnum)) = (column.table_oid(), column.column_id()) {
                if let Some(attrs) = attributes.get(&(oid, attnum)) {
                    meta.table = Some(attrs.table.clone());
                    meta.schema = Some(attrs.schema.clone());
                    meta.is_primary_key = attrs.is_primary_key;
                    meta.nullable = !attrs.not_null;
                    meta.has_default = attrs.has_default;
                }
            }
            meta
        })
        .collect()
}
