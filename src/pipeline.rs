// 🔗 Analysis Pipeline - raw records → cleaned table + two comparison reports
//
//   records ─▶ group by EIN ─▶ NameResolver ─▶ ChangeDetector ─▶ EventAligner
//           ─▶ pct change ─▶ PeriodComparator (flag-split, windowed)
//           ─▶ SignificanceTester
//
// Each institution is analysed by a pure function; the caller folds the
// per-institution results into one report. Nothing is shared or mutated
// across institutions except the read-only calendar.

use crate::change_detection::ChangeDetector;
use crate::comparison::{compute_pct_changes, ComparisonMode, ComparisonResult, PeriodComparator};
use crate::entities::{group_by_institution, Institution};
use crate::error::AnalysisIssue;
use crate::events::{EventAligner, EventCalendar};
use crate::name_resolution::{NameResolution, NameResolver};
use crate::records::{Metric, YearRecord};
use crate::significance::{SignificanceTester, TestOutcome};
use crate::windowing::{WindowSelector, WindowStatus, DEFAULT_WINDOW_RADIUS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    pub metric: Metric,
    pub window_radius: i32,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            metric: Metric::TotalCompensation,
            window_radius: DEFAULT_WINDOW_RADIUS,
        }
    }
}

// ============================================================================
// PER-INSTITUTION RESULT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstitutionAnalysis {
    /// Institution with all derived record fields filled in
    pub institution: Institution,
    pub resolution: NameResolution,
    pub ceo_changes: usize,
    pub event_years: Vec<i32>,
    /// None when the institution has no event year
    pub window: Option<WindowStatus>,
    pub flag_split: ComparisonResult,
    pub windowed: ComparisonResult,
}

// ============================================================================
// COMPARISON REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub mode: ComparisonMode,
    pub metric: Metric,
    pub rows: Vec<ComparisonResult>,
    pub outcome: TestOutcome,
}

impl ComparisonReport {
    /// Build the report and run the test over the included rows
    pub fn from_rows(mode: ComparisonMode, metric: Metric, rows: Vec<ComparisonResult>, tester: &SignificanceTester) -> Self {
        let differences: Vec<f64> = rows.iter().filter_map(|r| r.difference).collect();
        let outcome = tester.test(&differences);
        ComparisonReport { mode, metric, rows, outcome }
    }

    pub fn included(&self) -> impl Iterator<Item = &ComparisonResult> {
        self.rows.iter().filter(|r| r.is_included())
    }

    pub fn excluded(&self) -> impl Iterator<Item = &ComparisonResult> {
        self.rows.iter().filter(|r| !r.is_included())
    }

    pub fn differences(&self) -> Vec<f64> {
        self.rows.iter().filter_map(|r| r.difference).collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} on {} pct change: {} included, {} excluded | {}",
            self.mode.as_str(),
            self.metric.as_str(),
            self.included().count(),
            self.excluded().count(),
            self.outcome.summary()
        )
    }
}

// ============================================================================
// ANALYSIS REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub settings: AnalysisSettings,
    pub institutions: Vec<InstitutionAnalysis>,
    pub flag_split: ComparisonReport,
    pub windowed: ComparisonReport,
}

impl AnalysisReport {
    /// Cleaned record table: every record with identity_changed,
    /// is_event_year and pct_increase filled in
    pub fn cleaned_records(&self) -> Vec<YearRecord> {
        self.institutions
            .iter()
            .flat_map(|a| a.institution.records.iter().cloned())
            .collect()
    }

    pub fn report_for(&self, mode: ComparisonMode) -> &ComparisonReport {
        match mode {
            ComparisonMode::FlagSplit => &self.flag_split,
            ComparisonMode::Windowed => &self.windowed,
        }
    }

    /// Resolution ties across all institutions
    pub fn ambiguities(&self) -> Vec<&AnalysisIssue> {
        self.institutions
            .iter()
            .flat_map(|a| a.resolution.ambiguities.iter())
            .collect()
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct AnalysisPipeline<'a> {
    calendar: &'a EventCalendar,
    settings: AnalysisSettings,
    resolver: NameResolver,
    detector: ChangeDetector,
    comparator: PeriodComparator,
    tester: SignificanceTester,
}

impl<'a> AnalysisPipeline<'a> {
    pub fn new(calendar: &'a EventCalendar, settings: AnalysisSettings) -> Self {
        AnalysisPipeline {
            calendar,
            settings,
            resolver: NameResolver::new(),
            detector: ChangeDetector::new(),
            comparator: PeriodComparator::with_window(WindowSelector::with_radius(settings.window_radius)),
            tester: SignificanceTester::new(),
        }
    }

    /// Analyse one institution in isolation
    pub fn analyze_institution(&self, mut institution: Institution) -> InstitutionAnalysis {
        let resolution = self.resolver.resolve_institution(&mut institution);
        let ceo_changes = self.detector.detect_institution(&mut institution);
        let event_years = EventAligner::new(self.calendar).align(&mut institution);
        compute_pct_changes(&mut institution.records, self.settings.metric);

        let window = institution
            .first_event_year()
            .map(|event_year| self.comparator.window.select(event_year, &institution.years()));

        let flag_split = self.comparator.flag_split(&institution);
        let windowed = self.comparator.windowed(&institution);

        debug!(
            ein = %institution.ein,
            ceo_changes,
            ?event_years,
            flag_split = ?flag_split.difference,
            windowed = ?windowed.difference,
            "institution analysed"
        );

        InstitutionAnalysis {
            institution,
            resolution,
            ceo_changes,
            event_years,
            window,
            flag_split,
            windowed,
        }
    }

    /// Run the whole pass over a flat record table
    pub fn run(&self, records: Vec<YearRecord>) -> AnalysisReport {
        let institutions: Vec<InstitutionAnalysis> = group_by_institution(records)
            .into_iter()
            .map(|inst| self.analyze_institution(inst))
            .collect();

        let flag_rows = institutions.iter().map(|a| a.flag_split.clone()).collect();
        let window_rows = institutions.iter().map(|a| a.windowed.clone()).collect();

        let flag_split = ComparisonReport::from_rows(ComparisonMode::FlagSplit, self.settings.metric, flag_rows, &self.tester);
        let windowed = ComparisonReport::from_rows(ComparisonMode::Windowed, self.settings.metric, window_rows, &self.tester);

        info!(institutions = institutions.len(), "{}", flag_split.summary());
        info!(institutions = institutions.len(), "{}", windowed.summary());

        AnalysisReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            settings: self.settings,
            institutions,
            flag_split,
            windowed,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CalendarEntry;

    fn rows(ein: &str, name: &str, data: &[(i32, &str, f64)]) -> Vec<YearRecord> {
        data.iter()
            .map(|&(year, ceo, comp)| YearRecord::new(ein, name, year, ceo, Some(comp), None).unwrap())
            .collect()
    }

    #[test]
    fn test_institution_end_to_end() {
        let calendar = EventCalendar::from_entries(vec![CalendarEntry::new("Alpha CU", &[2017, 2019])]);
        let pipeline = AnalysisPipeline::new(&calendar, AnalysisSettings::default());

        let records = rows(
            "1",
            "Alpha CU",
            &[
                (2020, "Bob Kim", 150.0),
                (2014, "Richard Brandsma", 100.0),
                (2015, "Richard Brandsma", 110.0),
                (2016, "Rick Brandsma", 121.0),
                (2017, "Richard Brandsma", 121.0),
                (2018, "Bob Kim", 130.0),
                (2019, "Bob Kim", 140.0),
            ],
        );

        let report = pipeline.run(records);
        let analysis = &report.institutions[0];

        // Rick folded into Richard, so only the 2018 handover is a change
        assert_eq!(analysis.institution.ceo_change_years(), vec![2018]);
        assert_eq!(analysis.event_years, vec![2017, 2019]);
        assert!(analysis.window.as_ref().unwrap().is_complete());
        assert!(analysis.windowed.difference.is_some());
        assert!(analysis.flag_split.difference.is_some());

        let cleaned = report.cleaned_records();
        assert_eq!(cleaned.len(), 7);
        assert_eq!(cleaned[0].year, 2014);
        assert!(cleaned[0].pct_increase.is_none());
    }

    #[test]
    fn test_single_institution_not_computable() {
        let calendar = EventCalendar::from_entries(vec![CalendarEntry::new("Alpha CU", &[2016])]);
        let pipeline = AnalysisPipeline::new(&calendar, AnalysisSettings::default());

        let report = pipeline.run(rows("1", "Alpha CU", &[(2015, "A B", 100.0), (2016, "A B", 120.0), (2017, "A B", 90.0)]));

        assert_eq!(report.flag_split.differences().len(), 1);
        assert!(matches!(report.flag_split.outcome, TestOutcome::NotComputable(_)));
        // Window around 2016 is incomplete → excluded with reason
        assert_eq!(report.windowed.included().count(), 0);
        assert!(report.windowed.rows[0].exclusion.as_deref().unwrap().contains("incomplete window"));
    }

    #[test]
    fn test_institutions_analysed_independently() {
        let calendar = EventCalendar::from_entries(vec![
            CalendarEntry::new("Alpha CU", &[2016]),
            CalendarEntry::new("Beta CU", &[2017]),
        ]);
        let pipeline = AnalysisPipeline::new(&calendar, AnalysisSettings::default());

        let mut records = rows("1", "Alpha CU", &[(2015, "Ann Lee", 100.0), (2016, "Ann Lee", 120.0), (2017, "Ann Lee", 120.0)]);
        records.extend(rows("2", "Beta CU", &[(2015, "Bob Kim", 100.0), (2016, "Ann Lee", 90.0), (2017, "Ann Lee", 108.0)]));

        let report = pipeline.run(records);

        // Alpha's last CEO never leaks into Beta's first record
        let beta = &report.institutions[1].institution;
        assert!(!beta.records[0].identity_changed);
        assert!(beta.records[1].identity_changed);

        // Alpha: 20 - 0, Beta: 20 - (-10)
        let expected = [20.0, 30.0];
        let actual = report.flag_split.differences();
        assert_eq!(actual.len(), 2);
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-9);
        }
        assert!(report.flag_split.outcome.report().is_some());
    }

    #[test]
    fn test_window_centres_on_first_calendar_year() {
        let calendar = EventCalendar::from_entries(vec![CalendarEntry::new("Five Star CU", &[2014, 2015])]);
        let pipeline = AnalysisPipeline::new(&calendar, AnalysisSettings::default());

        let data: Vec<(i32, &str, f64)> = [2010, 2011, 2012, 2013, 2015, 2016, 2017, 2018]
            .iter()
            .map(|&y| (y, "Ann Lee", 100.0 + f64::from(y - 2010) * 10.0))
            .collect();
        let report = pipeline.run(rows("5", "Five Star CU", &data));
        let analysis = &report.institutions[0];

        assert_eq!(analysis.event_years, vec![2015]);
        assert_eq!(
            analysis.window,
            Some(WindowStatus::Complete {
                event_year: 2014,
                pre_years: vec![2011, 2012, 2013],
                post_years: vec![2015, 2016, 2017],
            })
        );
        assert_eq!(analysis.windowed.event_year, Some(2014));
        assert!(analysis.windowed.is_included());
        println!("✅ Window centred on 2014: {:?}", analysis.windowed.difference);
    }
}
