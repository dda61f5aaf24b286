//! Analytical warehouse: partitioned destination tables plus the run audit
//! table.
//!
//! A partition is the set of rows of one source for one region inside one
//! period. Loads replace a partition wholesale: delete the scope, insert the
//! new rows, commit. Two SQL backends share the statements built here.

mod postgres;
mod sqlite;

pub use postgres::PgWarehouse;
pub use sqlite::SqliteWarehouse;

use async_trait::async_trait;
use ocean_common::{measurement_columns, Granularity, GridRow, Period, SourceKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audit::RunRecord;
use crate::error::{StorageError, StorageResult};

/// Rows per INSERT statement. Keeps bind counts under SQLite's limit.
pub(crate) const INSERT_CHUNK_ROWS: usize = 500;

/// The rows one load replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionScope {
    pub source: SourceKind,
    pub region_id: String,
    pub period: Period,
}

impl PartitionScope {
    pub fn new(source: SourceKind, region_id: impl Into<String>, period: Period) -> Self {
        Self {
            source,
            region_id: region_id.into(),
            period,
        }
    }
}

/// Destination table names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub sst: String,
    pub chl: String,
    pub waves: String,
    pub runs: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            sst: "sst_daily".to_string(),
            chl: "chl_8day".to_string(),
            waves: "waves_daily".to_string(),
            runs: "ingest_runs".to_string(),
        }
    }
}

impl TableNames {
    pub fn for_source(&self, source: SourceKind) -> &str {
        match source {
            SourceKind::Sst => &self.sst,
            SourceKind::Chl => &self.chl,
            SourceKind::Waves => &self.waves,
        }
    }
}

/// Partition-replace destination for standardized rows.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Atomically delete `scope` and insert `rows`. Returns rows inserted.
    ///
    /// `write_timeout` bounds the delete and inserts. On expiry the
    /// transaction rolls back and `StorageError::Timeout` is returned. The
    /// commit itself is never cut short, so a reported timeout always means
    /// nothing changed.
    async fn replace_partition(
        &self,
        scope: &PartitionScope,
        rows: &[GridRow],
        write_timeout: Duration,
    ) -> StorageResult<u64>;

    /// Rows currently stored in `scope`.
    async fn count_partition(&self, scope: &PartitionScope) -> StorageResult<u64>;

    /// Read back the rows in `scope`, ordered by time, lat, lon.
    async fn fetch_partition(&self, scope: &PartitionScope) -> StorageResult<Vec<GridRow>>;
}

/// Append-only sink for run records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append_run(&self, record: &RunRecord) -> StorageResult<()>;

    /// Most recent runs first.
    async fn recent_runs(&self, limit: u32) -> StorageResult<Vec<RunRecord>>;
}

/// SQL flavor differences between the backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            Dialect::Sqlite => format!("?{}", n),
        }
    }

    fn date_type(&self) -> &'static str {
        match self {
            Dialect::Postgres => "DATE",
            Dialect::Sqlite => "TEXT",
        }
    }

    fn float_type(&self) -> &'static str {
        match self {
            Dialect::Postgres => "DOUBLE PRECISION",
            Dialect::Sqlite => "REAL",
        }
    }

    fn timestamp_type(&self) -> &'static str {
        match self {
            Dialect::Postgres => "TIMESTAMPTZ",
            Dialect::Sqlite => "TEXT",
        }
    }

    fn uuid_type(&self) -> &'static str {
        match self {
            Dialect::Postgres => "UUID",
            Dialect::Sqlite => "TEXT",
        }
    }

    fn bigint_type(&self) -> &'static str {
        match self {
            Dialect::Postgres => "BIGINT",
            Dialect::Sqlite => "INTEGER",
        }
    }
}

fn time_columns(source: SourceKind) -> &'static [&'static str] {
    match source.granularity() {
        Granularity::Daily => &["date"],
        Granularity::Composite { .. } => &["period_start_date", "period_end_date"],
    }
}

/// All columns of a destination table, in insert order.
pub(crate) fn table_columns(source: SourceKind) -> Vec<&'static str> {
    let mut cols: Vec<&'static str> = time_columns(source).to_vec();
    cols.extend(["region_id", "lat", "lon"]);
    cols.extend(measurement_columns(source));
    cols.extend(["source", "ingested_at"]);
    cols
}

/// Statements creating every table, one per element.
pub(crate) fn schema_statements(dialect: Dialect, tables: &TableNames) -> Vec<String> {
    let mut statements = Vec::new();

    for source in SourceKind::ALL {
        let time_cols = time_columns(source);
        let mut defs: Vec<String> = time_cols
            .iter()
            .map(|c| format!("{} {} NOT NULL", c, dialect.date_type()))
            .collect();
        defs.push("region_id TEXT NOT NULL".to_string());
        defs.push(format!("lat {} NOT NULL", dialect.float_type()));
        defs.push(format!("lon {} NOT NULL", dialect.float_type()));
        for col in measurement_columns(source) {
            defs.push(format!("{} {}", col, dialect.float_type()));
        }
        defs.push("source TEXT NOT NULL".to_string());
        defs.push(format!("ingested_at {} NOT NULL", dialect.timestamp_type()));

        let mut key = vec!["region_id"];
        key.extend(time_cols);
        key.extend(["lat", "lon"]);
        defs.push(format!("PRIMARY KEY ({})", key.join(", ")));

        let table = tables.for_source(source);
        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            table,
            defs.join(",\n    ")
        ));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_region_time ON {} (region_id, {})",
            table,
            table,
            time_cols[0]
        ));
    }

    statements.push(format!(
        "CREATE TABLE IF NOT EXISTS {} (
    run_id {} PRIMARY KEY,
    job_name TEXT NOT NULL,
    start_ts {ts} NOT NULL,
    end_ts {ts} NOT NULL,
    status TEXT NOT NULL,
    rows_written {} NOT NULL,
    notes TEXT NOT NULL
)",
        tables.runs,
        dialect.uuid_type(),
        dialect.bigint_type(),
        ts = dialect.timestamp_type(),
    ));

    statements
}

/// WHERE clause selecting a partition. Binds: region_id, start, end.
pub(crate) fn scope_predicate(dialect: Dialect, source: SourceKind) -> String {
    let (p1, p2, p3) = (dialect.placeholder(1), dialect.placeholder(2), dialect.placeholder(3));
    match source.granularity() {
        Granularity::Daily => format!("region_id = {} AND date BETWEEN {} AND {}", p1, p2, p3),
        Granularity::Composite { .. } => format!(
            "region_id = {} AND period_start_date <= {} AND period_end_date >= {}",
            p1, p3, p2
        ),
    }
}

pub(crate) fn insert_prefix(table: &str, source: SourceKind) -> String {
    format!("INSERT INTO {} ({}) ", table, table_columns(source).join(", "))
}

pub(crate) fn select_sql(dialect: Dialect, table: &str, source: SourceKind) -> String {
    let order = match source.granularity() {
        Granularity::Daily => "date",
        Granularity::Composite { .. } => "period_start_date",
    };
    format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {}, lat, lon",
        table_columns(source).join(", "),
        table,
        scope_predicate(dialect, source),
        order
    )
}

/// Reject rows that cannot go into the scope's table.
pub(crate) fn check_rows(scope: &PartitionScope, rows: &[GridRow]) -> StorageResult<()> {
    let composite = matches!(scope.source.granularity(), Granularity::Composite { .. });
    for row in rows {
        if row.measurement.source_kind() != scope.source {
            return Err(StorageError::Schema(format!(
                "{} row in {} load",
                row.measurement.source_kind(),
                scope.source
            )));
        }
        if row.time.is_composite() != composite {
            return Err(StorageError::Schema(format!(
                "time key {:?} does not fit {} table",
                row.time, scope.source
            )));
        }
        if row.region_id != scope.region_id {
            return Err(StorageError::Schema(format!(
                "row for region {} in load for {}",
                row.region_id, scope.region_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_columns() {
        assert_eq!(
            table_columns(SourceKind::Chl),
            vec![
                "period_start_date",
                "period_end_date",
                "region_id",
                "lat",
                "lon",
                "chl_mg_m3",
                "source",
                "ingested_at"
            ]
        );
    }

    #[test]
    fn test_scope_predicates() {
        assert_eq!(
            scope_predicate(Dialect::Postgres, SourceKind::Sst),
            "region_id = $1 AND date BETWEEN $2 AND $3"
        );
        assert_eq!(
            scope_predicate(Dialect::Sqlite, SourceKind::Chl),
            "region_id = ?1 AND period_start_date <= ?3 AND period_end_date >= ?2"
        );
    }

    #[test]
    fn test_schema_covers_all_tables() {
        let statements = schema_statements(Dialect::Sqlite, &TableNames::default());
        let joined = statements.join(";\n");
        for table in ["sst_daily", "chl_8day", "waves_daily", "ingest_runs"] {
            assert!(joined.contains(&format!("CREATE TABLE IF NOT EXISTS {} (", table)));
        }
        assert!(joined.contains("PRIMARY KEY (region_id, period_start_date, period_end_date, lat, lon)"));
    }
}
