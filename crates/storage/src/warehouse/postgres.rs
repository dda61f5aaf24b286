//! PostgreSQL warehouse backend.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ocean_common::{GridRow, Measurement, SourceKind, TimeKey};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder, Row, Transaction};
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{
    check_rows, insert_prefix, schema_statements, scope_predicate, select_sql, AuditSink,
    Dialect, PartitionScope, TableNames, Warehouse, INSERT_CHUNK_ROWS,
};
use crate::audit::{RunRecord, RunStatus};
use crate::error::{StorageError, StorageResult};

fn db_err(context: &str) -> impl Fn(sqlx::Error) -> StorageError + '_ {
    move |e| StorageError::Database(format!("{}: {}", context, e))
}

/// Warehouse backed by a PostgreSQL connection pool.
pub struct PgWarehouse {
    pool: PgPool,
    tables: TableNames,
}

impl PgWarehouse {
    /// Create a new warehouse connection from database URL.
    pub async fn connect(database_url: &str, tables: TableNames) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(db_err("Connection failed"))?;

        Ok(Self { pool, tables })
    }

    pub fn from_pool(pool: PgPool, tables: TableNames) -> Self {
        Self { pool, tables }
    }

    /// Create destination and audit tables if they do not exist.
    pub async fn migrate(&self) -> StorageResult<()> {
        for statement in schema_statements(Dialect::Postgres, &self.tables) {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(db_err("Migration failed"))?;
        }
        Ok(())
    }
}

async fn write_partition(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    scope: &PartitionScope,
    rows: &[GridRow],
) -> StorageResult<(u64, u64)> {
    let deleted = sqlx::query(&format!(
        "DELETE FROM {} WHERE {}",
        table,
        scope_predicate(Dialect::Postgres, scope.source)
    ))
    .bind(&scope.region_id)
    .bind(scope.period.start)
    .bind(scope.period.end)
    .execute(&mut **tx)
    .await
    .map_err(db_err("Delete failed"))?
    .rows_affected();

    let mut written = 0u64;
    for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(insert_prefix(table, scope.source));
        builder.push_values(chunk, |mut b, row| {
            match row.time {
                TimeKey::Daily(date) => {
                    b.push_bind(date);
                }
                TimeKey::Composite {
                    period_start_date,
                    period_end_date,
                } => {
                    b.push_bind(period_start_date).push_bind(period_end_date);
                }
            }
            b.push_bind(row.region_id.clone())
                .push_bind(row.lat)
                .push_bind(row.lon);
            for (_, value) in row.measurement.columns() {
                b.push_bind(value);
            }
            b.push_bind(row.source.clone()).push_bind(row.ingested_at);
        });

        written += builder
            .build()
            .execute(&mut **tx)
            .await
            .map_err(db_err("Insert failed"))?
            .rows_affected();
    }

    Ok((deleted, written))
}

#[async_trait]
impl Warehouse for PgWarehouse {
    #[instrument(skip(self, rows), fields(source = %scope.source, region = %scope.region_id, period = %scope.period, rows = rows.len()))]
    async fn replace_partition(
        &self,
        scope: &PartitionScope,
        rows: &[GridRow],
        write_timeout: Duration,
    ) -> StorageResult<u64> {
        check_rows(scope, rows)?;
        let table = self.tables.for_source(scope.source);

        let mut tx = self.pool.begin().await.map_err(db_err("Begin failed"))?;

        // Dropping `tx` on timeout rolls the writes back.
        let (deleted, written) =
            tokio::time::timeout(write_timeout, write_partition(&mut tx, table, scope, rows))
                .await
                .map_err(|_| StorageError::Timeout(write_timeout))??;

        tx.commit().await.map_err(db_err("Commit failed"))?;

        debug!(deleted, written, table, "Replaced partition");
        Ok(written)
    }

    async fn count_partition(&self, scope: &PartitionScope) -> StorageResult<u64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            self.tables.for_source(scope.source),
            scope_predicate(Dialect::Postgres, scope.source)
        ))
        .bind(&scope.region_id)
        .bind(scope.period.start)
        .bind(scope.period.end)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("Count failed"))?;

        Ok(count as u64)
    }

    async fn fetch_partition(&self, scope: &PartitionScope) -> StorageResult<Vec<GridRow>> {
        let rows = sqlx::query(&select_sql(
            Dialect::Postgres,
            self.tables.for_source(scope.source),
            scope.source,
        ))
        .bind(&scope.region_id)
        .bind(scope.period.start)
        .bind(scope.period.end)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Query failed"))?;

        rows.iter()
            .map(|row| decode_row(row, scope.source))
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(db_err("Decode failed"))
    }
}

fn decode_row(row: &sqlx::postgres::PgRow, source: SourceKind) -> Result<GridRow, sqlx::Error> {
    let time = match source {
        SourceKind::Chl => TimeKey::Composite {
            period_start_date: row.try_get::<NaiveDate, _>("period_start_date")?,
            period_end_date: row.try_get::<NaiveDate, _>("period_end_date")?,
        },
        SourceKind::Sst | SourceKind::Waves => TimeKey::Daily(row.try_get::<NaiveDate, _>("date")?),
    };
    let measurement = match source {
        SourceKind::Sst => Measurement::Sst {
            sst_c: row.try_get("sst_c")?,
        },
        SourceKind::Chl => Measurement::Chl {
            chl_mg_m3: row.try_get("chl_mg_m3")?,
        },
        SourceKind::Waves => Measurement::Waves {
            swh_m: row.try_get("swh_m")?,
            peak_period_s: row.try_get("peak_period_s")?,
        },
    };
    Ok(GridRow {
        time,
        region_id: row.try_get("region_id")?,
        lat: row.try_get("lat")?,
        lon: row.try_get("lon")?,
        measurement,
        source: row.try_get("source")?,
        ingested_at: row.try_get::<DateTime<Utc>, _>("ingested_at")?,
    })
}

#[async_trait]
impl AuditSink for PgWarehouse {
    async fn append_run(&self, record: &RunRecord) -> StorageResult<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (run_id, job_name, start_ts, end_ts, status, rows_written, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            self.tables.runs
        ))
        .bind(record.run_id)
        .bind(&record.job_name)
        .bind(record.start_ts)
        .bind(record.end_ts)
        .bind(record.status.as_str())
        .bind(record.rows_written as i64)
        .bind(&record.notes)
        .execute(&self.pool)
        .await
        .map_err(db_err("Insert failed"))?;

        Ok(())
    }

    async fn recent_runs(&self, limit: u32) -> StorageResult<Vec<RunRecord>> {
        let rows = sqlx::query_as::<_, (Uuid, String, DateTime<Utc>, DateTime<Utc>, String, i64, String)>(
            &format!(
                "SELECT run_id, job_name, start_ts, end_ts, status, rows_written, notes \
                 FROM {} ORDER BY start_ts DESC LIMIT $1",
                self.tables.runs
            ),
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Query failed"))?;

        rows.into_iter()
            .map(|r| {
                Ok(RunRecord {
                    run_id: r.0,
                    job_name: r.1,
                    start_ts: r.2,
                    end_ts: r.3,
                    status: r.4.parse::<RunStatus>().map_err(StorageError::Database)?,
                    rows_written: r.5 as u64,
                    notes: r.6,
                })
            })
            .collect()
    }
}
