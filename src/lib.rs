// Credit Union CEO Compensation Analysis - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod records;
pub mod entities;
pub mod name_resolution;   // Executive name clustering
pub mod change_detection;  // CEO turnover flags
pub mod events;            // M&A calendar alignment
pub mod windowing;         // ±N year window gate
pub mod comparison;        // Flag-split and windowed comparisons
pub mod significance;      // One-sample t-test
pub mod pipeline;
pub mod workbook;          // SQLite store
pub mod config;
pub mod logging;
pub mod export;

// Re-export commonly used types
pub use error::{AnalysisIssue, RecordError};
pub use records::{
    FinancialMetrics, FinancialRecord, Metric, RawCompensationRow, RawFinancialRow, YearRecord,
    join_financials, key_hash, normalize_ein, parse_money,
};
pub use entities::{group_by_institution, normalize_institution_name, Institution};
pub use name_resolution::{NameCluster, NameResolution, NameResolver};
pub use change_detection::ChangeDetector;
pub use events::{CalendarEntry, EventAligner, EventCalendar};
pub use windowing::{Period, WindowSelector, WindowStatus, DEFAULT_WINDOW_RADIUS};
pub use comparison::{compute_pct_changes, ComparisonMode, ComparisonResult, PeriodComparator};
pub use significance::{SignificanceReport, SignificanceTester, TestOutcome};
pub use pipeline::{AnalysisPipeline, AnalysisReport, AnalysisSettings, ComparisonReport, InstitutionAnalysis};
pub use workbook::{
    AuditEvent, CsvLoad, InsertSummary, InstitutionSummary, StoredReport,
    setup_workbook, load_ceo_csv, load_financials_csv,
    insert_records, list_records, count_records, insert_financials, list_financials, load_analysis_input,
    save_report, latest_report, list_cleaned_records, cleaned_records_for,
    list_institutions, find_institution_by_name, insert_event, list_events,
};
pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
