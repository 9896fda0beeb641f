//! PostgreSQL sink using parameterised multi-row INSERTs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use serde::{Deserialize, Serialize};
use tokio_postgres::{types::ToSql, Client, Config as PgConfig, NoTls};
use tracing::{debug, info};

use crate::config::{TargetConfig, PG_MAX_BIND_PARAMS};
use crate::core::{Row, SqlNullType, SqlValue};
use crate::error::{MigrateError, Result};
use crate::writer::BatchSink;

/// Writes batches into PostgreSQL tables.
///
/// Every batch runs in one transaction, so a single rejected row rolls back
/// the whole batch. Consecutive rows with the same table and column list
/// share one INSERT statement; one bind parameter is one mutation.
///
/// Each value is cast to the declared type of its target column, looked up
/// once per table from `information_schema.columns` and cached.
pub struct PgSink {
    pool: Pool,
    schema: String,
    column_types: Mutex<HashMap<String, Arc<ColumnTypes>>>,
}

/// Qualified type name of each column, keyed by column name.
type ColumnTypes = HashMap<String, String>;

/// Result of a target connectivity check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Whether `SELECT 1` succeeded.
    pub connected: bool,
    /// Round-trip latency in milliseconds.
    pub latency_ms: u64,
    /// Error message when the check failed.
    pub error: Option<String>,
}

impl PgSink {
    /// Create a sink with a pool of at most `max_conns` connections.
    pub async fn new(config: &TargetConfig, max_conns: usize) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(max_conns.max(1))
            .build()
            .map_err(|e| MigrateError::pool(e.to_string(), "creating PostgreSQL pool"))?;

        let sink = Self {
            pool,
            schema: config.schema.clone(),
            column_types: Mutex::new(HashMap::new()),
        };

        // Test connection
        let client = sink
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e.to_string(), "connecting to PostgreSQL"))?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL: {}:{}/{} (schema {})",
            config.host, config.port, config.database, config.schema
        );

        Ok(sink)
    }

    /// Run `SELECT 1` and measure its latency.
    pub async fn health_check(&self) -> HealthCheck {
        let start = Instant::now();
        let result = match self.pool.get().await {
            Ok(client) => client
                .simple_query("SELECT 1")
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        HealthCheck {
            connected: result.is_ok(),
            latency_ms: start.elapsed().as_millis() as u64,
            error: result.err(),
        }
    }

    /// Declared column types of `table`, cached after the first lookup.
    ///
    /// A table with no visible columns is not cached, so one created later is
    /// picked up on the next batch.
    async fn column_types(&self, client: &Client, table: &str) -> Result<Arc<ColumnTypes>> {
        let cached = self.cached_types().get(table).cloned();
        if let Some(types) = cached {
            return Ok(types);
        }

        let rows = client
            .query(
                "SELECT column_name::text, udt_schema::text, udt_name::text \
                 FROM information_schema.columns \
                 WHERE table_schema::text = $1 AND table_name::text = $2",
                &[&self.schema, &table],
            )
            .await?;

        let mut types = ColumnTypes::with_capacity(rows.len());
        for row in &rows {
            let column: String = row.try_get(0)?;
            let udt_schema: String = row.try_get(1)?;
            let udt_name: String = row.try_get(2)?;
            types.insert(
                column,
                format!("{}.{}", quote_ident(&udt_schema), quote_ident(&udt_name)),
            );
        }
        let types = Arc::new(types);

        if types.is_empty() {
            debug!("No column types found for {}.{}", self.schema, table);
        } else {
            debug!("Cached {} column types for {}.{}", types.len(), self.schema, table);
            self.cached_types().insert(table.to_string(), Arc::clone(&types));
        }
        Ok(types)
    }

    fn cached_types(&self) -> MutexGuard<'_, HashMap<String, Arc<ColumnTypes>>> {
        self.column_types.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BatchSink for PgSink {
    async fn write(&self, rows: &[Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e.to_string(), "acquiring connection for batch write"))?;

        let groups = group_rows(rows);
        let mut group_types = Vec::with_capacity(groups.len());
        for group in &groups {
            group_types.push(self.column_types(&client, group[0].table()).await?);
        }

        let tx = client.transaction().await?;

        for (group, types) in groups.into_iter().zip(group_types) {
            let (sql, params) = build_insert_sql(&self.schema, group, &types);
            let param_refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
            tx.execute(sql.as_str(), &param_refs)
                .await
                .map_err(|e| MigrateError::write(group[0].table(), e.to_string()))?;
        }

        tx.commit().await?;
        debug!("Committed batch of {} rows", rows.len());
        Ok(())
    }
}

/// Split a batch into runs of consecutive rows that can share one INSERT:
/// same table, same columns, and within the bind parameter limit.
fn group_rows(rows: &[Row]) -> Vec<&[Row]> {
    let mut groups = Vec::new();
    let mut start = 0;

    for i in 1..=rows.len() {
        let split = i == rows.len() || {
            let head = &rows[start];
            let row = &rows[i];
            let params = (i - start + 1) * head.mutation_count();
            row.table() != head.table()
                || row.columns() != head.columns()
                || params > PG_MAX_BIND_PARAMS
        };
        if split {
            groups.push(&rows[start..i]);
            start = i;
        }
    }

    groups
}

/// Quote a PostgreSQL identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Cast suffix for every column of a group of rows sharing a column list.
///
/// The declared column type wins. Without one, the first non-NULL value in
/// the column decides, then the NULL type hint of the first row.
fn column_casts(rows: &[Row], types: &ColumnTypes) -> Vec<String> {
    let head = &rows[0];
    head.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| match types.get(column) {
            Some(ty) => format!("::{}", ty),
            None => rows
                .iter()
                .filter_map(|r| r.values().get(idx))
                .find(|v| !v.is_null())
                .or_else(|| head.values().get(idx))
                .map_or("::text", sql_cast_for_value)
                .to_string(),
        })
        .collect()
}

/// Build INSERT SQL with parameters for rows sharing a table and column list.
///
/// Values are bound as text and cast server-side to the types from
/// [`column_casts`]. Each placeholder is declared `text` first so the
/// parameter type stays text whatever the column type is.
fn build_insert_sql(
    schema: &str,
    rows: &[Row],
    types: &ColumnTypes,
) -> (String, Vec<Option<String>>) {
    let head = &rows[0];
    let col_list = head
        .columns()
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let col_casts = column_casts(rows, types);

    let mut placeholders = Vec::with_capacity(rows.len());
    let mut params = Vec::with_capacity(rows.len() * col_casts.len());
    let mut idx = 1;

    for row in rows {
        let row_placeholders: Vec<String> = row
            .values()
            .iter()
            .enumerate()
            .map(|(col_idx, value)| {
                let cast = col_casts
                    .get(col_idx)
                    .map(String::as_str)
                    .unwrap_or_else(|| sql_cast_for_value(value));
                let p = format!("${}::text{}", idx, cast);
                idx += 1;
                p
            })
            .collect();
        placeholders.push(format!("({})", row_placeholders.join(", ")));
        params.extend(row.values().iter().map(sql_value_to_param));
    }

    let sql = format!(
        "INSERT INTO {}.{} ({}) VALUES {}",
        quote_ident(schema),
        quote_ident(head.table()),
        col_list,
        placeholders.join(", ")
    );

    (sql, params)
}

/// Get SQL cast suffix for a SqlValue type.
fn sql_cast_for_value(value: &SqlValue) -> &'static str {
    match value.null_type() {
        SqlNullType::Bool => "::boolean",
        SqlNullType::I16 => "::smallint",
        SqlNullType::I32 => "::integer",
        SqlNullType::I64 => "::bigint",
        SqlNullType::F32 => "::real",
        SqlNullType::F64 => "::double precision",
        SqlNullType::Text => "::text",
        SqlNullType::Bytes => "::bytea",
        SqlNullType::Uuid => "::uuid",
        SqlNullType::Decimal => "::numeric",
        SqlNullType::DateTime => "::timestamp",
        SqlNullType::DateTimeOffset => "::timestamptz",
        SqlNullType::Date => "::date",
        SqlNullType::Time => "::time",
        SqlNullType::Json => "::jsonb",
    }
}

/// Text form of a value for binding; PostgreSQL applies the cast.
fn sql_value_to_param(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Null(_) => None,
        SqlValue::Bool(b) => Some(if *b { "t" } else { "f" }.to_string()),
        other => Some(other.to_string()),
    }
}
