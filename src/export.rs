// 📤 Report Export - cleaned table and comparison reports as CSV files

use crate::pipeline::ComparisonReport;
use crate::records::YearRecord;
use crate::significance::TestOutcome;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Serialize)]
struct CleanedRow<'a> {
    ein: &'a str,
    name: &'a str,
    year: i32,
    ceo_name: &'a str,
    canonical_ceo_name: &'a str,
    compensation: f64,
    other: f64,
    total: f64,
    ceo_change: bool,
    m_or_a: bool,
    pct_increase: Option<f64>,
    total_assets: Option<f64>,
    total_revenue: Option<f64>,
    net_income: Option<f64>,
}

impl<'a> From<&'a YearRecord> for CleanedRow<'a> {
    fn from(r: &'a YearRecord) -> Self {
        let financials = r.financials.as_ref();
        CleanedRow {
            ein: &r.ein,
            name: &r.institution_name,
            year: r.year,
            ceo_name: &r.raw_executive_name,
            canonical_ceo_name: &r.canonical_executive_name,
            compensation: r.compensation,
            other: r.other_compensation,
            total: r.total_compensation,
            ceo_change: r.identity_changed,
            m_or_a: r.is_event_year,
            pct_increase: r.pct_increase,
            total_assets: financials.and_then(|f| f.total_assets),
            total_revenue: financials.and_then(|f| f.total_revenue),
            net_income: financials.and_then(|f| f.net_income),
        }
    }
}

#[derive(Debug, Serialize)]
struct SignificanceRow<'a> {
    mode: &'a str,
    metric: &'a str,
    included: usize,
    excluded: usize,
    sample_size: Option<usize>,
    mean_difference: Option<f64>,
    t_statistic: Option<f64>,
    p_value: Option<f64>,
    note: Option<String>,
}

impl<'a> From<&'a ComparisonReport> for SignificanceRow<'a> {
    fn from(report: &'a ComparisonReport) -> Self {
        let computed = report.outcome.report();
        SignificanceRow {
            mode: report.mode.as_str(),
            metric: report.metric.as_str(),
            included: report.included().count(),
            excluded: report.excluded().count(),
            sample_size: computed.map(|r| r.sample_size),
            mean_difference: computed.map(|r| r.mean),
            t_statistic: computed.map(|r| r.t_statistic),
            p_value: computed.map(|r| r.p_value),
            note: match &report.outcome {
                TestOutcome::Computed(_) => None,
                TestOutcome::NotComputable(issue) => Some(issue.to_string()),
            },
        }
    }
}

pub fn write_cleaned_records(path: &Path, records: &[YearRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))?;
    for record in records {
        wtr.serialize(CleanedRow::from(record))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_comparison(path: &Path, report: &ComparisonReport) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))?;
    for row in &report.rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_significance(path: &Path, reports: &[&ComparisonReport]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))?;
    for report in reports {
        wtr.serialize(SignificanceRow::from(*report))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write every table into `dir`; returns the written paths
pub fn export_all(
    dir: &Path,
    records: &[YearRecord],
    flag_split: &ComparisonReport,
    windowed: &ComparisonReport,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create export dir {}", dir.display()))?;

    let cleaned = dir.join("cleaned_records.csv");
    let flag = dir.join("flag_split.csv");
    let window = dir.join("windowed.csv");
    let significance = dir.join("significance.csv");

    write_cleaned_records(&cleaned, records)?;
    write_comparison(&flag, flag_split)?;
    write_comparison(&window, windowed)?;
    write_significance(&significance, &[flag_split, windowed])?;

    info!(dir = %dir.display(), records = records.len(), "report exported");
    Ok(vec![cleaned, flag, window, significance])
}
