// 📄 Records - Typed rows for compensation and financial filings
//
// Imported rows arrive loosely typed (money as text, blanks, "N/A").
// They are validated ONCE here; everything downstream works on YearRecord
// with explicit Option values instead of absent keys.

use crate::error::RecordError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// RAW ROWS (as exported by the filing fetcher)
// ============================================================================

/// One CEO compensation row as it appears in the CEO_Comp sheet export
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawCompensationRow {
    #[serde(rename = "name")]
    pub institution_name: String,

    pub ein: String,

    pub year: i32,

    #[serde(default)]
    pub ceo_name: Option<String>,

    #[serde(default)]
    pub compensation: Option<String>,

    #[serde(default, alias = "other_comp")]
    pub other: Option<String>,
}

/// One financial-metrics row (Form 990 summary values)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawFinancialRow {
    #[serde(rename = "name", default)]
    pub institution_name: String,

    pub ein: String,

    #[serde(alias = "Year", alias = "tax_prd_yr")]
    pub year: i32,

    #[serde(default, alias = "Total Assets")]
    pub total_assets: Option<String>,

    #[serde(default, alias = "Total Liabilities")]
    pub total_liabilities: Option<String>,

    #[serde(default, alias = "Total Revenue")]
    pub total_revenue: Option<String>,

    #[serde(default, alias = "Total Expenses")]
    pub total_expenses: Option<String>,

    #[serde(default, alias = "Net Income")]
    pub net_income: Option<String>,

    #[serde(default, alias = "Investment Income")]
    pub investment_income: Option<String>,
}

/// Parse a money cell: "$1,234", "(500)" → -500, "-", "N/A" or blank → None.
/// A sign is only accepted in leading position ("-$1,234", "$-1,234").
pub fn parse_money(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "-" || trimmed.eq_ignore_ascii_case("n/a") || trimmed.eq_ignore_ascii_case("nan") {
        return None;
    }

    let (in_parens, body) = match trimmed.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        Some(inner) => (true, inner.trim()),
        None => (false, trimmed),
    };

    let body = body.strip_prefix('$').unwrap_or(body).trim_start();
    let (has_minus, body) = match body.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, body.strip_prefix('+').unwrap_or(body)),
    };
    let body = body.strip_prefix('$').unwrap_or(body);

    let cleaned: String = body.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    if !cleaned.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }

    let value: f64 = cleaned.parse().ok().filter(|v: &f64| v.is_finite())?;
    Some(if in_parens || has_minus { -value } else { value })
}

fn parse_cell(cell: &Option<String>) -> Option<f64> {
    cell.as_deref().and_then(parse_money)
}

// ============================================================================
// FINANCIAL METRICS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialMetrics {
    pub total_assets: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub total_revenue: Option<f64>,
    pub total_expenses: Option<f64>,
    pub net_income: Option<f64>,
    pub investment_income: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialRecord {
    pub ein: String,
    pub institution_name: String,
    pub year: i32,
    pub metrics: FinancialMetrics,
}

impl TryFrom<RawFinancialRow> for FinancialRecord {
    type Error = RecordError;

    fn try_from(row: RawFinancialRow) -> Result<Self, Self::Error> {
        let ein = normalize_ein(&row.ein);
        if ein.is_empty() {
            return Err(RecordError::MissingEin(row.institution_name));
        }
        validate_year(row.year)?;

        let total_revenue = parse_cell(&row.total_revenue);
        let total_expenses = parse_cell(&row.total_expenses);

        // Net income is revenue minus expenses when the filing omits it
        let net_income = parse_cell(&row.net_income).or(match (total_revenue, total_expenses) {
            (Some(rev), Some(exp)) => Some(rev - exp),
            _ => None,
        });

        Ok(FinancialRecord {
            ein,
            institution_name: row.institution_name.trim().to_string(),
            year: row.year,
            metrics: FinancialMetrics {
                total_assets: parse_cell(&row.total_assets),
                total_liabilities: parse_cell(&row.total_liabilities),
                total_revenue,
                total_expenses,
                net_income,
                investment_income: parse_cell(&row.investment_income),
            },
        })
    }
}

// ============================================================================
// YEAR RECORD
// ============================================================================

/// One (institution, year) observation plus the fields derived by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearRecord {
    pub ein: String,
    pub institution_name: String,
    pub year: i32,
    pub raw_executive_name: String,
    pub compensation: f64,
    pub other_compensation: f64,
    pub total_compensation: f64,

    // ========================================================================
    // DERIVED
    // ========================================================================
    /// Executive name after cluster resolution (raw name until resolved)
    pub canonical_executive_name: String,

    pub identity_changed: bool,

    pub is_event_year: bool,

    /// Year-over-year percent change of the analysed metric
    pub pct_increase: Option<f64>,

    #[serde(default)]
    pub financials: Option<FinancialMetrics>,
}

impl YearRecord {
    /// Build a validated record. Missing compensation is an error (the row is
    /// dropped on import), missing other compensation counts as zero.
    pub fn new(
        ein: &str,
        institution_name: &str,
        year: i32,
        executive_name: &str,
        compensation: Option<f64>,
        other_compensation: Option<f64>,
    ) -> Result<Self, RecordError> {
        let ein = normalize_ein(ein);
        if ein.is_empty() {
            return Err(RecordError::MissingEin(institution_name.to_string()));
        }
        validate_year(year)?;

        let compensation = compensation.ok_or_else(|| RecordError::MissingCompensation {
            ein: ein.clone(),
            year,
        })?;
        let other_compensation = other_compensation.unwrap_or(0.0);
        let executive = executive_name.trim().to_string();

        Ok(YearRecord {
            ein,
            institution_name: institution_name.trim().to_string(),
            year,
            raw_executive_name: executive.clone(),
            compensation,
            other_compensation,
            total_compensation: compensation + other_compensation,
            canonical_executive_name: executive,
            identity_changed: false,
            is_event_year: false,
            pct_increase: None,
            financials: None,
        })
    }

    /// Idempotency hash over the (ein, year) key
    pub fn key_hash(&self) -> String {
        key_hash(&self.ein, self.year)
    }
}

impl TryFrom<RawCompensationRow> for YearRecord {
    type Error = RecordError;

    fn try_from(row: RawCompensationRow) -> Result<Self, Self::Error> {
        YearRecord::new(
            &row.ein,
            &row.institution_name,
            row.year,
            row.ceo_name.as_deref().unwrap_or(""),
            parse_cell(&row.compensation),
            parse_cell(&row.other),
        )
    }
}

/// SHA-256 of "ein|year", used as the unique key in the workbook tables
pub fn key_hash(ein: &str, year: i32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}", ein, year));
    format!("{:x}", hasher.finalize())
}

/// EINs come through spreadsheets as numbers or text ("38-1686050", "381686050.0")
pub fn normalize_ein(ein: &str) -> String {
    let trimmed = ein.trim();
    let without_decimal = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    without_decimal.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn validate_year(year: i32) -> Result<(), RecordError> {
    if (1900..=2100).contains(&year) {
        Ok(())
    } else {
        Err(RecordError::YearOutOfRange(year))
    }
}

/// Attach financial metrics to the matching (ein, year) records.
/// Returns how many records received metrics.
pub fn join_financials(records: &mut [YearRecord], financials: &[FinancialRecord]) -> usize {
    let by_key: std::collections::HashMap<(&str, i32), &FinancialMetrics> = financials
        .iter()
        .map(|f| ((f.ein.as_str(), f.year), &f.metrics))
        .collect();

    let mut joined = 0;
    for record in records.iter_mut() {
        if let Some(metrics) = by_key.get(&(record.ein.as_str(), record.year)) {
            record.financials = Some((*metrics).clone());
            joined += 1;
        }
    }
    joined
}

// ============================================================================
// METRIC SELECTION
// ============================================================================

/// Which value the percent-change comparison runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    TotalCompensation,
    Compensation,
    OtherCompensation,
    TotalAssets,
    TotalRevenue,
    NetIncome,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::TotalCompensation => "total_compensation",
            Metric::Compensation => "compensation",
            Metric::OtherCompensation => "other_compensation",
            Metric::TotalAssets => "total_assets",
            Metric::TotalRevenue => "total_revenue",
            Metric::NetIncome => "net_income",
        }
    }

    /// Value of this metric for a record (None = data gap)
    pub fn value(&self, record: &YearRecord) -> Option<f64> {
        match self {
            Metric::TotalCompensation => Some(record.total_compensation),
            Metric::Compensation => Some(record.compensation),
            Metric::OtherCompensation => Some(record.other_compensation),
            Metric::TotalAssets => record.financials.as_ref().and_then(|f| f.total_assets),
            Metric::TotalRevenue => record.financials.as_ref().and_then(|f| f.total_revenue),
            Metric::NetIncome => record.financials.as_ref().and_then(|f| f.net_income),
        }
    }
}

impl Default for Metric {
    fn default() -> Self {
        Metric::TotalCompensation
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_row(ein: &str, year: i32, comp: Option<&str>, other: Option<&str>) -> RawCompensationRow {
        RawCompensationRow {
            institution_name: "Advia Credit Union".to_string(),
            ein: ein.to_string(),
            year,
            ceo_name: Some("Richard Brandsma".to_string()),
            compensation: comp.map(|s| s.to_string()),
            other: other.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_parse_money_formats() {
        assert_eq!(parse_money("$1,234"), Some(1234.0));
        assert_eq!(parse_money("(500)"), Some(-500.0));
        assert_eq!(parse_money("-250.5"), Some(-250.5));
        assert_eq!(parse_money("0"), Some(0.0));
        assert_eq!(parse_money("N/A"), None);
        assert_eq!(parse_money("-"), None);
        assert_eq!(parse_money("   "), None);
        assert_eq!(parse_money("abc"), None);
    }

    #[test]
    fn test_parse_money_sign_only_leading() {
        assert_eq!(parse_money("-$1,234"), Some(-1234.0));
        assert_eq!(parse_money("$-1,234"), Some(-1234.0));
        assert_eq!(parse_money("+75"), Some(75.0));
        assert_eq!(parse_money("$1,234.50"), Some(1234.5));
        assert_eq!(parse_money("($2,000)"), Some(-2000.0));
        assert_eq!(parse_money("12-34"), None);
        assert_eq!(parse_money("1,000-"), None);
        assert_eq!(parse_money("--5"), None);
        assert_eq!(parse_money("inf"), None);
    }

    #[test]
    fn test_record_total_compensation() {
        let record: YearRecord = raw_row("381686050", 2018, Some("$400,000"), Some("25,000"))
            .try_into()
            .unwrap();

        assert_eq!(record.total_compensation, 425_000.0);
        assert_eq!(record.canonical_executive_name, "Richard Brandsma");
        assert!(!record.identity_changed);
        assert!(record.pct_increase.is_none());
    }

    #[test]
    fn test_missing_other_counts_as_zero() {
        let record: YearRecord = raw_row("381686050", 2018, Some("400000"), None).try_into().unwrap();
        assert_eq!(record.other_compensation, 0.0);
        assert_eq!(record.total_compensation, 400_000.0);
    }

    #[test]
    fn test_missing_compensation_rejected() {
        let result: Result<YearRecord, _> = raw_row("381686050", 2018, None, Some("10")).try_into();
        assert_eq!(
            result.unwrap_err(),
            RecordError::MissingCompensation { ein: "381686050".to_string(), year: 2018 }
        );
    }

    #[test]
    fn test_invalid_ein_and_year() {
        let no_ein: Result<YearRecord, _> = raw_row("  ", 2018, Some("1"), None).try_into();
        assert!(matches!(no_ein, Err(RecordError::MissingEin(_))));

        let bad_year: Result<YearRecord, _> = raw_row("381686050", 18, Some("1"), None).try_into();
        assert_eq!(bad_year.unwrap_err(), RecordError::YearOutOfRange(18));
    }

    #[test]
    fn test_normalize_ein() {
        assert_eq!(normalize_ein("38-1686050"), "381686050");
        assert_eq!(normalize_ein("381686050.0"), "381686050");
        assert_eq!(normalize_ein(" 381686050 "), "381686050");
    }

    #[test]
    fn test_key_hash_stable() {
        assert_eq!(key_hash("381686050", 2018), key_hash("381686050", 2018));
        assert_ne!(key_hash("381686050", 2018), key_hash("381686050", 2019));
        assert_eq!(key_hash("381686050", 2018).len(), 64);
    }

    #[test]
    fn test_financial_net_income_derived() {
        let row = RawFinancialRow {
            institution_name: "Advia Credit Union".to_string(),
            ein: "381686050".to_string(),
            year: 2019,
            total_assets: Some("2,000,000".to_string()),
            total_liabilities: None,
            total_revenue: Some("900".to_string()),
            total_expenses: Some("700".to_string()),
            net_income: None,
            investment_income: Some("N/A".to_string()),
        };

        let record = FinancialRecord::try_from(row).unwrap();
        assert_eq!(record.metrics.net_income, Some(200.0));
        assert_eq!(record.metrics.total_assets, Some(2_000_000.0));
        assert_eq!(record.metrics.investment_income, None);
    }

    #[test]
    fn test_join_financials_by_key() {
        let mut records = vec![
            YearRecord::new("1", "A", 2018, "X Y", Some(1.0), None).unwrap(),
            YearRecord::new("1", "A", 2019, "X Y", Some(1.0), None).unwrap(),
        ];
        let financials = vec![FinancialRecord {
            ein: "1".to_string(),
            institution_name: "A".to_string(),
            year: 2019,
            metrics: FinancialMetrics { total_assets: Some(10.0), ..Default::default() },
        }];

        assert_eq!(join_financials(&mut records, &financials), 1);
        assert!(records[0].financials.is_none());
        assert_eq!(Metric::TotalAssets.value(&records[1]), Some(10.0));
        assert_eq!(Metric::TotalAssets.value(&records[0]), None);
    }
}
