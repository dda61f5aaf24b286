//! SQLite warehouse backend for local runs and tests.
//!
//! Dates are stored as `YYYY-MM-DD` text and timestamps as RFC 3339 text, so
//! range predicates compare lexically.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use ocean_common::{GridRow, Measurement, SourceKind, TimeKey};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, Transaction};
use std::path::Path;
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

fn ts_text(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Database(format!("Bad timestamp '{}': {}", s, e)))
}

fn parse_date(s: &str) -> StorageResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| StorageError::Database(format!("Bad date '{}': {}", s, e)))
}

/// Warehouse stored in a SQLite database file (or memory).
pub struct SqliteWarehouse {
    pool: SqlitePool,
    tables: TableNames,
}

impl SqliteWarehouse {
    /// Open or create the database at the given path and create tables.
    pub async fn open(path: &Path, tables: TableNames) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::Config(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_err("Failed to open SQLite database"))?;

        let warehouse = Self { pool, tables };
        warehouse.migrate().await?;
        Ok(warehouse)
    }

    /// Open an in-memory database (for testing).
    pub async fn open_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        // One connection: every connection to :memory: is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(db_err("Failed to open SQLite database"))?;

        let warehouse = Self {
            pool,
            tables: TableNames::default(),
        };
        warehouse.migrate().await?;
        Ok(warehouse)
    }

    pub async fn migrate(&self) -> StorageResult<()> {
        for statement in schema_statements(Dialect::Sqlite, &self.tables) {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(db_err("Migration failed"))?;
        }
        Ok(())
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }
}

/// Delete `scope` and insert `rows` inside `tx`. Returns (deleted, written).
async fn write_partition(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    scope: &PartitionScope,
    rows: &[GridRow],
) -> StorageResult<(u64, u64)> {
    let deleted = sqlx::query(&format!(
        "DELETE FROM {} WHERE {}",
        table,
        scope_predicate(Dialect::Sqlite, scope.source)
    ))
    .bind(&scope.region_id)
    .bind(scope.period.start.to_string())
    .bind(scope.period.end.to_string())
    .execute(&mut **tx)
    .await
    .map_err(db_err("Delete failed"))?
    .rows_affected();

    let mut written = 0u64;
    for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(insert_prefix(table, scope.source));
        builder.push_values(chunk, |mut b, row| {
            match row.time {
                TimeKey::Daily(date) => {
                    b.push_bind(date.to_string());
                }
                TimeKey::Composite {
                    period_start_date,
                    period_end_date,
                } => {
                    b.push_bind(period_start_date.to_string())
                        .push_bind(period_end_date.to_string());
                }
            }
            b.push_bind(row.region_id.clone())
                .push_bind(row.lat)
                .push_bind(row.lon);
            for (_, value) in row.measurement.columns() {
                b.push_bind(value);
            }
            b.push_bind(row.source.clone())
                .push_bind(ts_text(row.ingested_at));
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
impl Warehouse for SqliteWarehouse {
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
            scope_predicate(Dialect::Sqlite, scope.source)
        ))
        .bind(&scope.region_id)
        .bind(scope.period.start.to_string())
        .bind(scope.period.end.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("Count failed"))?;

        Ok(count as u64)
    }

    async fn fetch_partition(&self, scope: &PartitionScope) -> StorageResult<Vec<GridRow>> {
        let rows = sqlx::query(&select_sql(
            Dialect::Sqlite,
            self.tables.for_source(scope.source),
            scope.source,
        ))
        .bind(&scope.region_id)
        .bind(scope.period.start.to_string())
        .bind(scope.period.end.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Query failed"))?;

        rows.iter().map(|row| decode_row(row, scope.source)).collect()
    }
}

fn decode_row(row: &SqliteRow, source: SourceKind) -> StorageResult<GridRow> {
    let get_date = |col: &str| -> StorageResult<NaiveDate> {
        let text: String = row.try_get(col).map_err(db_err("Decode failed"))?;
        parse_date(&text)
    };
    let get_f64 = |col: &str| -> StorageResult<Option<f64>> {
        row.try_get(col).map_err(db_err("Decode failed"))
    };

    let time = match source {
        SourceKind::Chl => TimeKey::Composite {
            period_start_date: get_date("period_start_date")?,
            period_end_date: get_date("period_end_date")?,
        },
        SourceKind::Sst | SourceKind::Waves => TimeKey::Daily(get_date("date")?),
    };
    let measurement = match source {
        SourceKind::Sst => Measurement::Sst {
            sst_c: get_f64("sst_c")?,
        },
        SourceKind::Chl => Measurement::Chl {
            chl_mg_m3: get_f64("chl_mg_m3")?,
        },
        SourceKind::Waves => Measurement::Waves {
            swh_m: get_f64("swh_m")?,
            peak_period_s: get_f64("peak_period_s")?,
        },
    };
    let ingested_at: String = row.try_get("ingested_at").map_err(db_err("Decode failed"))?;

    Ok(GridRow {
        time,
        region_id: row.try_get("region_id").map_err(db_err("Decode failed"))?,
        lat: row.try_get("lat").map_err(db_err("Decode failed"))?,
        lon: row.try_get("lon").map_err(db_err("Decode failed"))?,
        measurement,
        source: row.try_get("source").map_err(db_err("Decode failed"))?,
        ingested_at: parse_ts(&ingested_at)?,
    })
}

#[async_trait]
impl AuditSink for SqliteWarehouse {
    async fn append_run(&self, record: &RunRecord) -> StorageResult<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (run_id, job_name, start_ts, end_ts, status, rows_written, notes) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            self.tables.runs
        ))
        .bind(record.run_id.to_string())
        .bind(&record.job_name)
        .bind(ts_text(record.start_ts))
        .bind(ts_text(record.end_ts))
        .bind(record.status.as_str())
        .bind(record.rows_written as i64)
        .bind(&record.notes)
        .execute(&self.pool)
        .await
        .map_err(db_err("Insert failed"))?;

        Ok(())
    }

    async fn recent_runs(&self, limit: u32) -> StorageResult<Vec<RunRecord>> {
        let rows = sqlx::query_as::<_, (String, String, String, String, String, i64, String)>(
            &format!(
                "SELECT run_id, job_name, start_ts, end_ts, status, rows_written, notes \
                 FROM {} ORDER BY start_ts DESC LIMIT ?",
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
                    run_id: Uuid::parse_str(&r.0)
                        .map_err(|e| StorageError::Database(format!("Bad run_id '{}': {}", r.0, e)))?,
                    job_name: r.1,
                    start_ts: parse_ts(&r.2)?,
                    end_ts: parse_ts(&r.3)?,
                    status: r.4.parse::<RunStatus>().map_err(StorageError::Database)?,
                    rows_written: r.5 as u64,
                    notes: r.6,
                })
            })
            .collect()
    }
}
