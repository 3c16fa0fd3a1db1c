// 📊 Significance Test - One-sample two-sided t-test of differences vs. zero
//
// H0: the population mean of per-institution differences is 0.
// Fewer than 2 differences (or zero spread) is NOT computable and is
// surfaced as such; no statistic is invented for it.

use crate::error::AnalysisIssue;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use tracing::warn;

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceReport {
    pub sample_size: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub t_statistic: f64,
    pub degrees_of_freedom: f64,
    pub p_value: f64,
}

impl SignificanceReport {
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TestOutcome {
    Computed(SignificanceReport),
    NotComputable(AnalysisIssue),
}

impl TestOutcome {
    pub fn report(&self) -> Option<&SignificanceReport> {
        match self {
            TestOutcome::Computed(report) => Some(report),
            TestOutcome::NotComputable(_) => None,
        }
    }

    /// One line for the analyst
    pub fn summary(&self) -> String {
        match self {
            TestOutcome::Computed(r) => format!(
                "n = {}, mean difference = {:.2}%, t = {:.4}, p = {:.4}",
                r.sample_size, r.mean, r.t_statistic, r.p_value
            ),
            TestOutcome::NotComputable(issue) => issue.to_string(),
        }
    }
}

// ============================================================================
// SIGNIFICANCE TESTER
// ============================================================================

pub struct SignificanceTester {
    /// Mean under the null hypothesis (default: 0.0)
    pub hypothesized_mean: f64,
}

impl SignificanceTester {
    pub fn new() -> Self {
        SignificanceTester { hypothesized_mean: 0.0 }
    }

    /// Run the test over differences with missing values already dropped.
    /// Non-finite values are ignored.
    pub fn test(&self, differences: &[f64]) -> TestOutcome {
        let values: Vec<f64> = differences.iter().copied().filter(|v| v.is_finite()).collect();
        let n = values.len();

        if n < 2 {
            return not_computable(n, "fewer than 2 valid differences");
        }

        let mean = values.iter().sum::<f64>() / n as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        let std_dev = variance.sqrt();

        if std_dev == 0.0 {
            return not_computable(n, "zero variance in differences");
        }

        let standard_error = std_dev / (n as f64).sqrt();
        let t_statistic = (mean - self.hypothesized_mean) / standard_error;
        let degrees_of_freedom = (n - 1) as f64;

        let dist = match StudentsT::new(0.0, 1.0, degrees_of_freedom) {
            Ok(dist) => dist,
            Err(e) => return not_computable(n, &format!("invalid t distribution: {}", e)),
        };
        let p_value = (2.0 * dist.sf(t_statistic.abs())).clamp(0.0, 1.0);

        TestOutcome::Computed(SignificanceReport {
            sample_size: n,
            mean,
            std_dev,
            t_statistic,
            degrees_of_freedom,
            p_value,
        })
    }
}

impl Default for SignificanceTester {
    fn default() -> Self {
        Self::new()
    }
}

fn not_computable(sample_size: usize, reason: &str) -> TestOutcome {
    let issue = AnalysisIssue::InsufficientSample {
        sample_size,
        reason: reason.to_string(),
    };
    warn!(%issue, "significance test skipped");
    TestOutcome::NotComputable(issue)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        // scipy.stats.ttest_1samp([1, 2, 3, 4, 5], 0) → t = 4.2426, p = 0.01324
        let outcome = SignificanceTester::new().test(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let report = outcome.report().unwrap();

        assert_eq!(report.sample_size, 5);
        assert!((report.mean - 3.0).abs() < 1e-12);
        assert!((report.t_statistic - 4.242_640_687).abs() < 1e-6);
        assert!((report.p_value - 0.013_236).abs() < 1e-4);
        assert_eq!(report.degrees_of_freedom, 4.0);
        assert!(report.is_significant(0.05));
    }

    #[test]
    fn test_tiny_p_value_keeps_precision() {
        // t ≈ 28284 with 4 df: the upper tail is far below f64 epsilon
        let outcome = SignificanceTester::new().test(&[1000.0, 1000.1, 999.9, 1000.05, 999.95]);
        let report = outcome.report().unwrap();

        assert!(report.t_statistic > 20_000.0);
        assert!(report.p_value > 0.0, "p rounded to zero");
        assert!(report.p_value < 1e-15, "{}", report.p_value);
    }

    #[test]
    fn test_zero_mean_symmetric() {
        let report = SignificanceTester::new().test(&[-2.0, -1.0, 1.0, 2.0]).report().cloned().unwrap();

        assert!(report.t_statistic.abs() < 1e-12);
        assert!((report.p_value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_mirrored_samples_same_p_value() {
        let tester = SignificanceTester::new();
        let positive = tester.test(&[3.0, 5.0, 1.0, 7.0]).report().cloned().unwrap();
        let negative = tester.test(&[-3.0, -5.0, -1.0, -7.0]).report().cloned().unwrap();

        assert!((positive.t_statistic + negative.t_statistic).abs() < 1e-12);
        assert!((positive.p_value - negative.p_value).abs() < 1e-12);
    }

    #[test]
    fn test_insufficient_sample() {
        let tester = SignificanceTester::new();

        for sample in [&[][..], &[4.2][..]] {
            match tester.test(sample) {
                TestOutcome::NotComputable(AnalysisIssue::InsufficientSample { sample_size, .. }) => {
                    assert_eq!(sample_size, sample.len());
                }
                other => panic!("expected not computable, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_non_finite_values_dropped() {
        let outcome = SignificanceTester::new().test(&[f64::NAN, 1.0, f64::INFINITY]);
        assert!(outcome.report().is_none());
        assert!(outcome.summary().contains("n = 1"));
    }

    #[test]
    fn test_zero_variance_not_computable() {
        let outcome = SignificanceTester::new().test(&[2.0, 2.0, 2.0]);
        assert!(matches!(outcome, TestOutcome::NotComputable(_)));
        assert!(outcome.summary().contains("zero variance"));
    }
}
