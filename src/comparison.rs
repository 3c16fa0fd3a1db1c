// ⚖️ Period Comparison - Mean percent change inside vs. outside the event periods
//
// Two modes, one row per institution, signed difference:
//   FlagSplit: mean(event years) − mean(non-event years), all years
//   Windowed:  mean(post) − mean(pre), ±radius around the FIRST event year,
//              only for institutions whose window is complete
//
// An empty partition gives a MISSING difference with a reason, never zero.

use crate::entities::Institution;
use crate::error::AnalysisIssue;
use crate::records::{Metric, YearRecord};
use crate::windowing::{Period, WindowSelector};
use serde::{Deserialize, Serialize};

// ============================================================================
// PERCENT CHANGE
// ============================================================================

/// Year-over-year percent change of `metric`, written to `pct_increase`.
///
/// Compared against the previous OBSERVED record (gaps are skipped over).
/// Undefined for the first record, a missing value on either side, or a
/// zero prior value. Returns how many records got a defined value.
pub fn compute_pct_changes(records: &mut [YearRecord], metric: Metric) -> usize {
    records.sort_by_key(|r| r.year);

    let mut defined = 0;
    let mut previous: Option<f64> = None;

    for record in records.iter_mut() {
        let current = metric.value(record);

        record.pct_increase = match (previous, current) {
            (Some(prev), Some(curr)) if prev != 0.0 => Some((curr - prev) / prev * 100.0),
            _ => None,
        };
        if record.pct_increase.is_some() {
            defined += 1;
        }

        previous = current;
    }

    defined
}

// ============================================================================
// COMPARISON MODE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    FlagSplit,
    Windowed,
}

impl ComparisonMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonMode::FlagSplit => "flag_split",
            ComparisonMode::Windowed => "windowed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "flag_split" => Some(ComparisonMode::FlagSplit),
            "windowed" => Some(ComparisonMode::Windowed),
            _ => None,
        }
    }

    /// (treatment label, baseline label)
    pub fn labels(&self) -> (&'static str, &'static str) {
        match self {
            ComparisonMode::FlagSplit => ("event", "non_event"),
            ComparisonMode::Windowed => ("post", "pre"),
        }
    }
}

// ============================================================================
// COMPARISON RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub ein: String,
    pub institution_name: String,
    pub mode: ComparisonMode,

    /// First event year (windowed mode reference; informational in flag-split)
    pub event_year: Option<i32>,

    /// Mean pct change over event years (flag-split) or post years (windowed)
    pub treatment_mean: Option<f64>,
    pub treatment_count: usize,

    /// Mean pct change over non-event years (flag-split) or pre years (windowed)
    pub baseline_mean: Option<f64>,
    pub baseline_count: usize,

    /// treatment_mean − baseline_mean
    pub difference: Option<f64>,

    /// Why the institution is excluded from the significance test
    pub exclusion: Option<String>,
}

impl ComparisonResult {
    fn new(institution: &Institution, mode: ComparisonMode) -> Self {
        ComparisonResult {
            ein: institution.ein.clone(),
            institution_name: institution.name.clone(),
            mode,
            event_year: institution.first_event_year(),
            treatment_mean: None,
            treatment_count: 0,
            baseline_mean: None,
            baseline_count: 0,
            difference: None,
            exclusion: None,
        }
    }

    fn excluded(mut self, issue: AnalysisIssue) -> Self {
        self.difference = None;
        self.exclusion = Some(issue.to_string());
        self
    }

    fn with_partitions(mut self, treatment: &[f64], baseline: &[f64]) -> Self {
        self.treatment_mean = mean(treatment);
        self.treatment_count = treatment.len();
        self.baseline_mean = mean(baseline);
        self.baseline_count = baseline.len();

        let (treatment_label, baseline_label) = self.mode.labels();
        match (self.treatment_mean, self.baseline_mean) {
            (Some(t), Some(b)) => {
                self.difference = Some(t - b);
                self
            }
            (None, _) => self.excluded(AnalysisIssue::DataGap(format!("no {} pct change", treatment_label))),
            (_, None) => self.excluded(AnalysisIssue::DataGap(format!("no {} pct change", baseline_label))),
        }
    }

    pub fn is_included(&self) -> bool {
        self.difference.is_some()
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

// ============================================================================
// PERIOD COMPARATOR
// ============================================================================

pub struct PeriodComparator {
    pub window: WindowSelector,
}

impl PeriodComparator {
    pub fn new() -> Self {
        PeriodComparator { window: WindowSelector::new() }
    }

    pub fn with_window(window: WindowSelector) -> Self {
        PeriodComparator { window }
    }

    pub fn compare(&self, institution: &Institution, mode: ComparisonMode) -> ComparisonResult {
        match mode {
            ComparisonMode::FlagSplit => self.flag_split(institution),
            ComparisonMode::Windowed => self.windowed(institution),
        }
    }

    /// All defined pct changes, split by `is_event_year`
    pub fn flag_split(&self, institution: &Institution) -> ComparisonResult {
        let (event, non_event): (Vec<&YearRecord>, Vec<&YearRecord>) =
            institution.records.iter().partition(|r| r.is_event_year);

        let treatment: Vec<f64> = event.iter().filter_map(|r| r.pct_increase).collect();
        let baseline: Vec<f64> = non_event.iter().filter_map(|r| r.pct_increase).collect();

        ComparisonResult::new(institution, ComparisonMode::FlagSplit).with_partitions(&treatment, &baseline)
    }

    /// Pre/post pct changes around the first event year, gated on a complete window
    pub fn windowed(&self, institution: &Institution) -> ComparisonResult {
        let result = ComparisonResult::new(institution, ComparisonMode::Windowed);

        let Some(event_year) = institution.first_event_year() else {
            return result.excluded(AnalysisIssue::NotInCalendar);
        };

        let status = self.window.select(event_year, &institution.years());
        if let Some(issue) = status.issue() {
            return result.excluded(issue);
        }

        let mut pre = Vec::new();
        let mut post = Vec::new();
        for record in &institution.records {
            let Some(pct) = record.pct_increase else { continue };
            match self.window.label(event_year, record.year) {
                Some(Period::Pre) => pre.push(pct),
                Some(Period::Post) => post.push(pct),
                None => {}
            }
        }

        result.with_partitions(&post, &pre)
    }
}

impl Default for PeriodComparator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Institution with total compensation per year and the given event years
    fn institution(values: &[(i32, f64)], events: &[i32]) -> Institution {
        let mut inst = Institution::new("381686050", "Advia Credit Union");
        inst.records = values
            .iter()
            .map(|&(year, comp)| {
                let mut r = YearRecord::new("381686050", "Advia Credit Union", year, "Jane Doe", Some(comp), None).unwrap();
                r.is_event_year = events.contains(&year);
                r
            })
            .collect();
        compute_pct_changes(&mut inst.records, Metric::TotalCompensation);
        inst
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "{} != {}", actual, expected);
    }

    #[test]
    fn test_pct_change_basic() {
        let inst = institution(&[(2015, 100.0), (2016, 110.0), (2017, 99.0)], &[]);

        assert_eq!(inst.records[0].pct_increase, None);
        assert_close(inst.records[1].pct_increase.unwrap(), 10.0);
        assert_close(inst.records[2].pct_increase.unwrap(), -10.0);
    }

    #[test]
    fn test_pct_change_zero_prior_undefined() {
        let inst = institution(&[(2015, 0.0), (2016, 50.0), (2017, 100.0)], &[]);

        assert_eq!(inst.records[1].pct_increase, None);
        assert_close(inst.records[2].pct_increase.unwrap(), 100.0);
    }

    #[test]
    fn test_pct_change_missing_metric_value() {
        let mut records = vec![
            YearRecord::new("1", "A", 2015, "X", Some(1.0), None).unwrap(),
            YearRecord::new("1", "A", 2016, "X", Some(1.0), None).unwrap(),
        ];
        // No financials joined: total assets missing everywhere
        assert_eq!(compute_pct_changes(&mut records, Metric::TotalAssets), 0);
    }

    #[test]
    fn test_pct_change_skips_gap() {
        let inst = institution(&[(2015, 100.0), (2018, 150.0)], &[]);
        assert_close(inst.records[1].pct_increase.unwrap(), 50.0);
    }

    #[test]
    fn test_flag_split_difference() {
        // pct: 2016 +10 (event), 2017 +0, 2018 +20 (event), 2019 -10
        let inst = institution(
            &[(2015, 100.0), (2016, 110.0), (2017, 110.0), (2018, 132.0), (2019, 118.8)],
            &[2016, 2018],
        );

        let result = PeriodComparator::new().flag_split(&inst);

        assert_close(result.treatment_mean.unwrap(), 15.0);
        assert_close(result.baseline_mean.unwrap(), -5.0);
        assert_close(result.difference.unwrap(), 20.0);
        assert_eq!(result.treatment_count, 2);
        assert_eq!(result.baseline_count, 2);
        assert!(result.exclusion.is_none());
    }

    #[test]
    fn test_flag_split_empty_partition_is_missing() {
        let inst = institution(&[(2015, 100.0), (2016, 110.0)], &[]);

        let result = PeriodComparator::new().flag_split(&inst);

        assert!(result.difference.is_none());
        assert!(!result.is_included());
        assert_eq!(result.exclusion.as_deref(), Some("data gap: no event pct change"));
    }

    #[test]
    fn test_flag_split_event_in_first_year_has_no_pct() {
        // Event year is the first observed year: its pct change is undefined
        let inst = institution(&[(2015, 100.0), (2016, 110.0)], &[2015]);
        let result = PeriodComparator::new().flag_split(&inst);
        assert!(result.difference.is_none());
    }

    #[test]
    fn test_windowed_complete() {
        // Event 2017; pre pct (2014..2016) = 10 each from 2013 base; post = 0, 0, 30
        let inst = institution(
            &[
                (2013, 100.0),
                (2014, 110.0),
                (2015, 121.0),
                (2016, 133.1),
                (2017, 200.0),
                (2018, 200.0),
                (2019, 200.0),
                (2020, 260.0),
            ],
            &[2017, 2019],
        );

        let result = PeriodComparator::new().windowed(&inst);

        assert_eq!(result.event_year, Some(2017));
        assert_close(result.baseline_mean.unwrap(), 10.0);
        assert_close(result.treatment_mean.unwrap(), 10.0);
        assert_close(result.difference.unwrap(), 0.0);
        assert_eq!(result.baseline_count, 3);
        assert_eq!(result.treatment_count, 3);
    }

    #[test]
    fn test_windowed_anchored_on_unobserved_first_event() {
        // M&A in 2014 (no filing) and 2015; the window centres on 2014
        let mut inst = institution(
            &[
                (2010, 100.0),
                (2011, 110.0),
                (2012, 121.0),
                (2013, 133.1),
                (2015, 133.1),
                (2016, 133.1),
                (2017, 133.1),
                (2018, 140.0),
            ],
            &[2015],
        );
        inst.calendar_years = vec![2014, 2015];

        let result = PeriodComparator::new().windowed(&inst);

        assert_eq!(result.event_year, Some(2014));
        assert!(result.exclusion.is_none(), "{:?}", result.exclusion);
        assert_close(result.baseline_mean.unwrap(), 10.0);
        assert_close(result.treatment_mean.unwrap(), 0.0);
        assert_eq!(result.treatment_count, 3);
    }

    #[test]
    fn test_windowed_incomplete_excluded_with_reason() {
        let inst = institution(&[(2016, 100.0), (2017, 110.0), (2018, 120.0), (2019, 130.0)], &[2017]);

        let result = PeriodComparator::new().windowed(&inst);

        assert!(result.difference.is_none());
        let reason = result.exclusion.unwrap();
        assert!(reason.contains("[2014, 2015]"), "{}", reason);
        assert!(reason.contains("[2020]"), "{}", reason);
    }

    #[test]
    fn test_windowed_empty_partition_is_missing_not_zero() {
        // Window complete, but every pre year has a zero prior value → no pre pct
        let inst = institution(
            &[
                (2013, 0.0),
                (2014, 0.0),
                (2015, 0.0),
                (2016, 0.0),
                (2017, 100.0),
                (2018, 110.0),
                (2019, 121.0),
                (2020, 133.1),
            ],
            &[2017],
        );

        let result = PeriodComparator::new().windowed(&inst);

        assert!(result.treatment_mean.is_some());
        assert!(result.baseline_mean.is_none());
        assert_eq!(result.difference, None);
        assert_eq!(result.exclusion.as_deref(), Some("data gap: no pre pct change"));
    }

    #[test]
    fn test_windowed_without_events() {
        let inst = institution(&[(2015, 100.0), (2016, 110.0)], &[]);
        let result = PeriodComparator::new().compare(&inst, ComparisonMode::Windowed);

        assert_eq!(result.exclusion.as_deref(), Some("no event year in calendar"));
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(ComparisonMode::parse("flag-split"), Some(ComparisonMode::FlagSplit));
        assert_eq!(ComparisonMode::parse("Windowed"), Some(ComparisonMode::Windowed));
        assert_eq!(ComparisonMode::parse("other"), None);
    }
}
