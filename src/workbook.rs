// 🗄️ Workbook Store - SQLite tables shared by import, analysis and the dashboards
//
// Tables:
//   ceo_comp         raw compensation records (unique on sha256(ein|year))
//   financials       financial metrics per (ein, year)
//   cleaned_records  latest analysed record table (replaced on every run)
//   comparison_rows  per-institution comparison rows, one set per (run, mode)
//   significance     one test outcome per (run, mode)
//   events           audit trail of imports and analysis runs

use crate::comparison::{ComparisonMode, ComparisonResult};
use crate::entities::{group_by_institution, normalize_institution_name, Institution};
use crate::pipeline::{AnalysisReport, ComparisonReport};
use crate::records::{
    join_financials, key_hash, FinancialMetrics, FinancialRecord, Metric, RawCompensationRow, RawFinancialRow,
    YearRecord,
};
use crate::significance::TestOutcome;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

// ============================================================================
// AUDIT EVENTS
// ============================================================================

/// Audit trail entry: every import and analysis run leaves one
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl AuditEvent {
    pub fn new(event_type: &str, entity_type: &str, entity_id: &str, data: serde_json::Value, actor: &str) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// SETUP
// ============================================================================

pub fn setup_workbook(conn: &Connection) -> Result<()> {
    // WAL for crash recovery (no-op for in-memory databases)
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS ceo_comp (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key_hash TEXT UNIQUE NOT NULL,
            ein TEXT NOT NULL,
            institution_name TEXT NOT NULL,
            year INTEGER NOT NULL,
            executive_name TEXT NOT NULL,
            compensation REAL NOT NULL,
            other_compensation REAL NOT NULL,
            total_compensation REAL NOT NULL,
            source_file TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS financials (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key_hash TEXT UNIQUE NOT NULL,
            ein TEXT NOT NULL,
            institution_name TEXT NOT NULL,
            year INTEGER NOT NULL,
            total_assets REAL,
            total_liabilities REAL,
            total_revenue REAL,
            total_expenses REAL,
            net_income REAL,
            investment_income REAL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS cleaned_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            ein TEXT NOT NULL,
            institution_name TEXT NOT NULL,
            year INTEGER NOT NULL,
            raw_executive_name TEXT NOT NULL,
            canonical_executive_name TEXT NOT NULL,
            compensation REAL NOT NULL,
            other_compensation REAL NOT NULL,
            total_compensation REAL NOT NULL,
            identity_changed INTEGER NOT NULL,
            is_event_year INTEGER NOT NULL,
            pct_increase REAL,
            financials TEXT
        );

        CREATE TABLE IF NOT EXISTS comparison_rows (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            mode TEXT NOT NULL,
            ein TEXT NOT NULL,
            institution_name TEXT NOT NULL,
            event_year INTEGER,
            treatment_mean REAL,
            treatment_count INTEGER NOT NULL,
            baseline_mean REAL,
            baseline_count INTEGER NOT NULL,
            difference REAL,
            exclusion TEXT
        );

        CREATE TABLE IF NOT EXISTS significance (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            mode TEXT NOT NULL,
            metric TEXT NOT NULL,
            generated_at TEXT NOT NULL,
            sample_size INTEGER,
            t_statistic REAL,
            p_value REAL,
            outcome TEXT NOT NULL,
            UNIQUE (run_id, mode)
        );

        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_ceo_comp_ein ON ceo_comp(ein, year);
        CREATE INDEX IF NOT EXISTS idx_cleaned_ein ON cleaned_records(ein, year);
        CREATE INDEX IF NOT EXISTS idx_comparison_run ON comparison_rows(run_id, mode);
        CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
        CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);",
    )?;

    Ok(())
}

// ============================================================================
// CSV IMPORT
// ============================================================================

/// Rows read from a CSV file, after validation
#[derive(Debug, Clone)]
pub struct CsvLoad<T> {
    pub rows: Vec<T>,
    /// Rows rejected by validation (missing compensation, bad ein or year)
    pub dropped: usize,
}

/// Load CEO compensation rows; invalid rows are dropped and logged
pub fn load_ceo_csv(csv_path: &Path) -> Result<CsvLoad<YearRecord>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CEO compensation CSV {}", csv_path.display()))?;

    let mut rows = Vec::new();
    let mut dropped = 0;

    for (line, result) in rdr.deserialize::<RawCompensationRow>().enumerate() {
        let raw = result.with_context(|| format!("Failed to parse CEO compensation row {}", line + 2))?;
        match YearRecord::try_from(raw) {
            Ok(record) => rows.push(record),
            Err(e) => {
                warn!(line = line + 2, error = %e, "dropping compensation row");
                dropped += 1;
            }
        }
    }

    info!(path = %csv_path.display(), rows = rows.len(), dropped, "loaded CEO compensation CSV");
    Ok(CsvLoad { rows, dropped })
}

pub fn load_financials_csv(csv_path: &Path) -> Result<CsvLoad<FinancialRecord>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open financials CSV {}", csv_path.display()))?;

    let mut rows = Vec::new();
    let mut dropped = 0;

    for (line, result) in rdr.deserialize::<RawFinancialRow>().enumerate() {
        let raw = result.with_context(|| format!("Failed to parse financials row {}", line + 2))?;
        match FinancialRecord::try_from(raw) {
            Ok(record) => rows.push(record),
            Err(e) => {
                warn!(line = line + 2, error = %e, "dropping financials row");
                dropped += 1;
            }
        }
    }

    info!(path = %csv_path.display(), rows = rows.len(), dropped, "loaded financials CSV");
    Ok(CsvLoad { rows, dropped })
}

// ============================================================================
// RAW RECORDS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsertSummary {
    pub inserted: usize,
    pub duplicates: usize,
}

/// Insert raw records; an (ein, year) already stored is skipped (first wins)
pub fn insert_records(conn: &Connection, records: &[YearRecord], source_file: &str) -> Result<InsertSummary> {
    let mut summary = InsertSummary::default();

    for record in records {
        let hash = record.key_hash();

        let result = conn.execute(
            "INSERT INTO ceo_comp (
                key_hash, ein, institution_name, year, executive_name,
                compensation, other_compensation, total_compensation, source_file
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                hash,
                record.ein,
                record.institution_name,
                record.year,
                record.raw_executive_name,
                record.compensation,
                record.other_compensation,
                record.total_compensation,
                source_file,
            ],
        );

        match result {
            Ok(_) => summary.inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
                debug!(ein = %record.ein, year = record.year, "duplicate compensation record");
                summary.duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    let event = AuditEvent::new(
        "records_imported",
        "ceo_comp",
        source_file,
        serde_json::json!({
            "inserted": summary.inserted,
            "duplicates": summary.duplicates,
        }),
        "csv_importer",
    );
    insert_event(conn, &event)?;

    Ok(summary)
}

/// Raw records as imported, in (ein, year) order
pub fn list_records(conn: &Connection) -> Result<Vec<YearRecord>> {
    let mut stmt = conn.prepare(
        "SELECT ein, institution_name, year, executive_name,
                compensation, other_compensation, total_compensation
         FROM ceo_comp
         ORDER BY ein, year",
    )?;

    let records = stmt
        .query_map([], |row| {
            let executive: String = row.get(3)?;
            Ok(YearRecord {
                ein: row.get(0)?,
                institution_name: row.get(1)?,
                year: row.get(2)?,
                raw_executive_name: executive.clone(),
                compensation: row.get(4)?,
                other_compensation: row.get(5)?,
                total_compensation: row.get(6)?,
                canonical_executive_name: executive,
                identity_changed: false,
                is_event_year: false,
                pct_increase: None,
                financials: None,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

pub fn count_records(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM ceo_comp", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// FINANCIALS
// ============================================================================

pub fn insert_financials(conn: &Connection, financials: &[FinancialRecord]) -> Result<InsertSummary> {
    let mut summary = InsertSummary::default();

    for record in financials {
        let m = &record.metrics;
        let result = conn.execute(
            "INSERT INTO financials (
                key_hash, ein, institution_name, year, total_assets, total_liabilities,
                total_revenue, total_expenses, net_income, investment_income
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                key_hash(&record.ein, record.year),
                record.ein,
                record.institution_name,
                record.year,
                m.total_assets,
                m.total_liabilities,
                m.total_revenue,
                m.total_expenses,
                m.net_income,
                m.investment_income,
            ],
        );

        match result {
            Ok(_) => summary.inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
                summary.duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(summary)
}

pub fn list_financials(conn: &Connection) -> Result<Vec<FinancialRecord>> {
    let mut stmt = conn.prepare(
        "SELECT ein, institution_name, year, total_assets, total_liabilities,
                total_revenue, total_expenses, net_income, investment_income
         FROM financials
         ORDER BY ein, year",
    )?;

    let financials = stmt
        .query_map([], |row| {
            Ok(FinancialRecord {
                ein: row.get(0)?,
                institution_name: row.get(1)?,
                year: row.get(2)?,
                metrics: FinancialMetrics {
                    total_assets: row.get(3)?,
                    total_liabilities: row.get(4)?,
                    total_revenue: row.get(5)?,
                    total_expenses: row.get(6)?,
                    net_income: row.get(7)?,
                    investment_income: row.get(8)?,
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(financials)
}

/// Raw records with financial metrics left-joined on (ein, year)
pub fn load_analysis_input(conn: &Connection) -> Result<Vec<YearRecord>> {
    let mut records = list_records(conn)?;
    let financials = list_financials(conn)?;
    let joined = join_financials(&mut records, &financials);
    debug!(records = records.len(), joined, "analysis input loaded");
    Ok(records)
}

// ============================================================================
// ANALYSIS RESULTS
// ============================================================================

/// Persist one analysis run: the cleaned table is replaced, comparison rows
/// and significance outcomes are appended under the run id.
pub fn save_report(conn: &Connection, report: &AnalysisReport) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute("DELETE FROM cleaned_records", [])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO cleaned_records (
                run_id, ein, institution_name, year, raw_executive_name, canonical_executive_name,
                compensation, other_compensation, total_compensation,
                identity_changed, is_event_year, pct_increase, financials
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;

        for r in report.cleaned_records() {
            let financials_json = r.financials.as_ref().map(serde_json::to_string).transpose()?;
            stmt.execute(params![
                report.run_id,
                r.ein,
                r.institution_name,
                r.year,
                r.raw_executive_name,
                r.canonical_executive_name,
                r.compensation,
                r.other_compensation,
                r.total_compensation,
                r.identity_changed,
                r.is_event_year,
                r.pct_increase,
                financials_json,
            ])?;
        }
    }

    for comparison in [&report.flag_split, &report.windowed] {
        save_comparison(&tx, &report.run_id, report.generated_at, comparison)?;
    }

    let event = AuditEvent::new(
        "analysis_run",
        "report",
        &report.run_id,
        serde_json::json!({
            "metric": report.settings.metric.as_str(),
            "window_radius": report.settings.window_radius,
            "institutions": report.institutions.len(),
            "flag_split": report.flag_split.outcome.summary(),
            "windowed": report.windowed.outcome.summary(),
        }),
        "analyzer",
    );
    insert_event(&tx, &event)?;

    tx.commit().context("Failed to commit analysis run")?;
    info!(run_id = %report.run_id, "analysis run saved");
    Ok(())
}

fn save_comparison(conn: &Connection, run_id: &str, generated_at: DateTime<Utc>, comparison: &ComparisonReport) -> Result<()> {
    let mode = comparison.mode.as_str();

    {
        let mut stmt = conn.prepare(
            "INSERT INTO comparison_rows (
                run_id, mode, ein, institution_name, event_year, treatment_mean,
                treatment_count, baseline_mean, baseline_count, difference, exclusion
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;
        for row in &comparison.rows {
            stmt.execute(params![
                run_id,
                mode,
                row.ein,
                row.institution_name,
                row.event_year,
                row.treatment_mean,
                row.treatment_count as i64,
                row.baseline_mean,
                row.baseline_count as i64,
                row.difference,
                row.exclusion,
            ])?;
        }
    }

    let computed = comparison.outcome.report();
    conn.execute(
        "INSERT OR REPLACE INTO significance (
            run_id, mode, metric, generated_at, sample_size, t_statistic, p_value, outcome
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            run_id,
            mode,
            comparison.metric.as_str(),
            generated_at.to_rfc3339(),
            computed.map(|r| r.sample_size as i64),
            computed.map(|r| r.t_statistic),
            computed.map(|r| r.p_value),
            serde_json::to_string(&comparison.outcome)?,
        ],
    )?;

    Ok(())
}

/// A comparison report read back from the workbook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredReport {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub report: ComparisonReport,
}

/// Most recent report for a mode, if any analysis has been saved
pub fn latest_report(conn: &Connection, mode: ComparisonMode) -> Result<Option<StoredReport>> {
    let header = conn
        .query_row(
            "SELECT run_id, metric, generated_at, outcome
             FROM significance
             WHERE mode = ?1
             ORDER BY generated_at DESC, id DESC
             LIMIT 1",
            params![mode.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    let Some((run_id, metric, generated_at, outcome_json)) = header else {
        return Ok(None);
    };

    let metric: Metric = serde_json::from_value(serde_json::Value::String(metric.clone()))
        .with_context(|| format!("Unknown metric '{}' in significance table", metric))?;
    let outcome: TestOutcome = serde_json::from_str(&outcome_json).context("Failed to decode stored test outcome")?;
    let generated_at = DateTime::parse_from_rfc3339(&generated_at)
        .context("Failed to parse report timestamp")?
        .with_timezone(&Utc);

    let mut stmt = conn.prepare(
        "SELECT ein, institution_name, event_year, treatment_mean, treatment_count,
                baseline_mean, baseline_count, difference, exclusion
         FROM comparison_rows
         WHERE run_id = ?1 AND mode = ?2
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![run_id, mode.as_str()], |row| {
            Ok(ComparisonResult {
                ein: row.get(0)?,
                institution_name: row.get(1)?,
                mode,
                event_year: row.get(2)?,
                treatment_mean: row.get(3)?,
                treatment_count: row.get::<_, i64>(4)? as usize,
                baseline_mean: row.get(5)?,
                baseline_count: row.get::<_, i64>(6)? as usize,
                difference: row.get(7)?,
                exclusion: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(StoredReport {
        run_id,
        generated_at,
        report: ComparisonReport { mode, metric, rows, outcome },
    }))
}

// ============================================================================
// CLEANED RECORDS & INSTITUTIONS
// ============================================================================

const CLEANED_COLUMNS: &str = "ein, institution_name, year, raw_executive_name, canonical_executive_name,
    compensation, other_compensation, total_compensation, identity_changed, is_event_year,
    pct_increase, financials";

fn cleaned_from_row(row: &Row) -> rusqlite::Result<YearRecord> {
    let financials_json: Option<String> = row.get(11)?;
    let financials = financials_json
        .map(|json| serde_json::from_str::<FinancialMetrics>(&json))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(e)))?;

    Ok(YearRecord {
        ein: row.get(0)?,
        institution_name: row.get(1)?,
        year: row.get(2)?,
        raw_executive_name: row.get(3)?,
        canonical_executive_name: row.get(4)?,
        compensation: row.get(5)?,
        other_compensation: row.get(6)?,
        total_compensation: row.get(7)?,
        identity_changed: row.get(8)?,
        is_event_year: row.get(9)?,
        pct_increase: row.get(10)?,
        financials,
    })
}

pub fn list_cleaned_records(conn: &Connection) -> Result<Vec<YearRecord>> {
    let sql = format!("SELECT {} FROM cleaned_records ORDER BY ein, year", CLEANED_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt.query_map([], cleaned_from_row)?.collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

pub fn cleaned_records_for(conn: &Connection, ein: &str) -> Result<Vec<YearRecord>> {
    let sql = format!("SELECT {} FROM cleaned_records WHERE ein = ?1 ORDER BY year", CLEANED_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params![crate::records::normalize_ein(ein)], cleaned_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Overview line per institution, for selectors and the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionSummary {
    pub ein: String,
    pub name: String,
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
    pub record_count: usize,
    pub ceo_change_years: Vec<i32>,
    pub event_years: Vec<i32>,
}

impl From<&Institution> for InstitutionSummary {
    fn from(inst: &Institution) -> Self {
        let years = inst.years();
        InstitutionSummary {
            ein: inst.ein.clone(),
            name: inst.name.clone(),
            first_year: years.first().copied(),
            last_year: years.last().copied(),
            record_count: inst.records.len(),
            ceo_change_years: inst.ceo_change_years(),
            event_years: inst.event_years(),
        }
    }
}

/// Analysed institutions; falls back to raw records before the first run
pub fn list_institutions(conn: &Connection) -> Result<Vec<Institution>> {
    let mut records = list_cleaned_records(conn)?;
    if records.is_empty() {
        records = list_records(conn)?;
    }
    Ok(group_by_institution(records))
}

/// Case and punctuation insensitive name lookup
pub fn find_institution_by_name(conn: &Connection, name: &str) -> Result<Option<Institution>> {
    let wanted = normalize_institution_name(name);
    Ok(list_institutions(conn)?.into_iter().find(|inst| {
        normalize_institution_name(&inst.name) == wanted
            || inst.records.iter().any(|r| normalize_institution_name(&r.institution_name) == wanted)
    }))
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

pub fn insert_event(conn: &Connection, event: &AuditEvent) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Most recent events first
pub fn list_events(conn: &Connection, limit: usize) -> Result<Vec<AuditEvent>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         ORDER BY timestamp DESC, id DESC
         LIMIT ?1",
    )?;

    let events = stmt
        .query_map(params![limit as i64], |row| {
            let timestamp: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(AuditEvent {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CalendarEntry, EventCalendar};
    use crate::pipeline::{AnalysisPipeline, AnalysisSettings};
    use std::io::Write;

    fn workbook() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_workbook(&conn).unwrap();
        conn
    }

    fn record(ein: &str, year: i32, ceo: &str, comp: f64) -> YearRecord {
        YearRecord::new(ein, "Advia Credit Union", year, ceo, Some(comp), Some(1000.0)).unwrap()
    }

    #[test]
    fn test_idempotency_import_twice() {
        let conn = workbook();
        let records = vec![
            record("381686050", 2015, "Jane Doe", 100_000.0),
            record("381686050", 2016, "Jane Doe", 110_000.0),
            record("381686050", 2017, "John Roe", 120_000.0),
        ];

        let first = insert_records(&conn, &records, "ceo.csv").unwrap();
        let second = insert_records(&conn, &records, "ceo.csv").unwrap();

        assert_eq!(first, InsertSummary { inserted: 3, duplicates: 0 });
        assert_eq!(second, InsertSummary { inserted: 0, duplicates: 3 });
        assert_eq!(count_records(&conn).unwrap(), 3);

        println!("✅ Idempotency: second import inserted nothing");
    }

    #[test]
    fn test_first_duplicate_wins() {
        let conn = workbook();
        insert_records(&conn, &[record("1", 2015, "First Person", 1.0), record("1", 2015, "Second Person", 2.0)], "x.csv")
            .unwrap();

        let stored = list_records(&conn).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].raw_executive_name, "First Person");
        assert_eq!(stored[0].total_compensation, 1001.0);
    }

    #[test]
    fn test_load_ceo_csv_drops_missing_compensation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name,ein,year,ceo_name,compensation,other").unwrap();
        writeln!(file, "Advia Credit Union,38-1686050,2015,Jane Doe,\"$250,000\",").unwrap();
        writeln!(file, "Advia Credit Union,38-1686050,2016,Jane Doe,,5000").unwrap();
        writeln!(file, "Advia Credit Union,38-1686050,2017,Jane Doe,260000,\"$12,500\"").unwrap();
        file.flush().unwrap();

        let load = load_ceo_csv(file.path()).unwrap();

        assert_eq!(load.rows.len(), 2);
        assert_eq!(load.dropped, 1);
        assert_eq!(load.rows[0].ein, "381686050");
        assert_eq!(load.rows[0].other_compensation, 0.0);
        assert_eq!(load.rows[1].total_compensation, 272_500.0);
    }

    #[test]
    fn test_financials_joined_by_key() {
        let conn = workbook();
        insert_records(&conn, &[record("1", 2015, "A B", 1.0), record("1", 2016, "A B", 2.0)], "x.csv").unwrap();

        let financial = FinancialRecord {
            ein: "1".to_string(),
            institution_name: "Advia Credit Union".to_string(),
            year: 2016,
            metrics: FinancialMetrics {
                total_assets: Some(5.0e9),
                ..Default::default()
            },
        };
        let summary = insert_financials(&conn, &[financial.clone(), financial]).unwrap();
        assert_eq!(summary, InsertSummary { inserted: 1, duplicates: 1 });

        let input = load_analysis_input(&conn).unwrap();
        assert!(input[0].financials.is_none());
        assert_eq!(input[1].financials.as_ref().unwrap().total_assets, Some(5.0e9));
    }

    #[test]
    fn test_save_and_read_latest_report() {
        let conn = workbook();
        let records = vec![
            record("1", 2015, "Jane Doe", 100.0),
            record("1", 2016, "Jane Doe", 120.0),
            record("1", 2017, "John Roe", 150.0),
        ];
        insert_records(&conn, &records, "x.csv").unwrap();

        let calendar = EventCalendar::from_entries(vec![CalendarEntry::new("Advia Credit Union", &[2016])]);
        let report = AnalysisPipeline::new(&calendar, AnalysisSettings::default()).run(load_analysis_input(&conn).unwrap());
        save_report(&conn, &report).unwrap();

        let cleaned = list_cleaned_records(&conn).unwrap();
        assert_eq!(cleaned.len(), 3);
        assert!(cleaned[2].identity_changed);
        assert!(cleaned[1].is_event_year);

        let stored = latest_report(&conn, ComparisonMode::FlagSplit).unwrap().unwrap();
        assert_eq!(stored.run_id, report.run_id);
        assert_eq!(stored.report.rows, report.flag_split.rows);
        assert_eq!(stored.report.outcome, report.flag_split.outcome);

        let events = list_events(&conn, 10).unwrap();
        assert!(events.iter().any(|e| e.event_type == "analysis_run" && e.entity_id == report.run_id));
    }

    #[test]
    fn test_latest_report_empty_workbook() {
        let conn = workbook();
        assert!(latest_report(&conn, ComparisonMode::Windowed).unwrap().is_none());
        assert!(list_institutions(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_find_institution_by_name() {
        let conn = workbook();
        insert_records(&conn, &[record("1", 2015, "A B", 1.0)], "x.csv").unwrap();

        let found = find_institution_by_name(&conn, "ADVIA credit union.").unwrap().unwrap();
        assert_eq!(found.ein, "1");
        assert!(find_institution_by_name(&conn, "Nobody CU").unwrap().is_none());

        let summary = InstitutionSummary::from(&found);
        assert_eq!(summary.first_year, Some(2015));
        assert_eq!(summary.record_count, 1);
    }
}
