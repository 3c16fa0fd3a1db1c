// 🪟 Window Selection - Is there a complete ±N year window around the event?
//
// For first event year E and radius 3:
//   pre  = {E-3, E-2, E-1}
//   post = {E+1, E+2, E+3}      (E itself belongs to neither side)
//
// Hard gate: any missing year on either side excludes the institution from
// the windowed test. Missing years are reported, never imputed.

use crate::error::AnalysisIssue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DEFAULT_WINDOW_RADIUS: i32 = 3;

// ============================================================================
// WINDOW STATUS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WindowStatus {
    Complete {
        event_year: i32,
        pre_years: Vec<i32>,
        post_years: Vec<i32>,
    },

    Incomplete {
        event_year: i32,
        missing_pre: Vec<i32>,
        missing_post: Vec<i32>,
    },
}

impl WindowStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, WindowStatus::Complete { .. })
    }

    pub fn event_year(&self) -> i32 {
        match self {
            WindowStatus::Complete { event_year, .. } | WindowStatus::Incomplete { event_year, .. } => *event_year,
        }
    }

    /// Exclusion reason for incomplete windows
    pub fn issue(&self) -> Option<AnalysisIssue> {
        match self {
            WindowStatus::Complete { .. } => None,
            WindowStatus::Incomplete { event_year, missing_pre, missing_post } => Some(AnalysisIssue::WindowIncomplete {
                event_year: *event_year,
                missing_pre: missing_pre.clone(),
                missing_post: missing_post.clone(),
            }),
        }
    }
}

/// Position of a year relative to the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    Pre,
    Post,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Pre => "pre",
            Period::Post => "post",
        }
    }
}

// ============================================================================
// WINDOW SELECTOR
// ============================================================================

pub struct WindowSelector {
    /// Years required on each side of the event (default: 3)
    pub radius: i32,
}

impl WindowSelector {
    pub fn new() -> Self {
        WindowSelector { radius: DEFAULT_WINDOW_RADIUS }
    }

    pub fn with_radius(radius: i32) -> Self {
        WindowSelector { radius: radius.max(1) }
    }

    pub fn pre_years(&self, event_year: i32) -> Vec<i32> {
        (event_year - self.radius..event_year).collect()
    }

    pub fn post_years(&self, event_year: i32) -> Vec<i32> {
        (event_year + 1..=event_year + self.radius).collect()
    }

    /// Check both sides of the window against the observed years
    pub fn select(&self, event_year: i32, observed: &BTreeSet<i32>) -> WindowStatus {
        let pre_years = self.pre_years(event_year);
        let post_years = self.post_years(event_year);

        let missing_pre: Vec<i32> = pre_years.iter().copied().filter(|y| !observed.contains(y)).collect();
        let missing_post: Vec<i32> = post_years.iter().copied().filter(|y| !observed.contains(y)).collect();

        if missing_pre.is_empty() && missing_post.is_empty() {
            WindowStatus::Complete { event_year, pre_years, post_years }
        } else {
            WindowStatus::Incomplete { event_year, missing_pre, missing_post }
        }
    }

    /// Label a year as pre/post relative to the event; None outside the window
    /// and for the event year itself
    pub fn label(&self, event_year: i32, year: i32) -> Option<Period> {
        let offset = year - event_year;
        if (-self.radius..0).contains(&offset) {
            Some(Period::Pre)
        } else if (1..=self.radius).contains(&offset) {
            Some(Period::Post)
        } else {
            None
        }
    }
}

impl Default for WindowSelector {
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

    fn years(list: &[i32]) -> BTreeSet<i32> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_complete_window() {
        let selector = WindowSelector::new();
        let status = selector.select(2017, &years(&[2014, 2015, 2016, 2017, 2018, 2019, 2020]));

        assert_eq!(
            status,
            WindowStatus::Complete {
                event_year: 2017,
                pre_years: vec![2014, 2015, 2016],
                post_years: vec![2018, 2019, 2020],
            }
        );
        assert!(status.issue().is_none());
    }

    #[test]
    fn test_event_year_itself_not_required() {
        let status = WindowSelector::new().select(2017, &years(&[2014, 2015, 2016, 2018, 2019, 2020]));
        assert!(status.is_complete());
    }

    #[test]
    fn test_partial_pre_window_missing() {
        // Only 2016 present before the event; post side only partially present
        let status = WindowSelector::new().select(2017, &years(&[2016, 2017, 2018, 2019]));

        assert_eq!(
            status,
            WindowStatus::Incomplete {
                event_year: 2017,
                missing_pre: vec![2014, 2015],
                missing_post: vec![2020],
            }
        );
    }

    #[test]
    fn test_missing_only_post_side() {
        let status = WindowSelector::new().select(2017, &years(&[2014, 2015, 2016, 2017, 2018, 2019]));

        match status.issue() {
            Some(AnalysisIssue::WindowIncomplete { missing_pre, missing_post, .. }) => {
                assert!(missing_pre.is_empty());
                assert_eq!(missing_post, vec![2020]);
            }
            other => panic!("expected incomplete window, got {:?}", other),
        }
    }

    #[test]
    fn test_labels() {
        let selector = WindowSelector::new();
        assert_eq!(selector.label(2017, 2014), Some(Period::Pre));
        assert_eq!(selector.label(2017, 2016), Some(Period::Pre));
        assert_eq!(selector.label(2017, 2017), None);
        assert_eq!(selector.label(2017, 2020), Some(Period::Post));
        assert_eq!(selector.label(2017, 2013), None);
        assert_eq!(selector.label(2017, 2021), None);
    }

    #[test]
    fn test_custom_radius() {
        let selector = WindowSelector::with_radius(2);
        assert_eq!(selector.pre_years(2020), vec![2018, 2019]);
        assert_eq!(selector.post_years(2020), vec![2021, 2022]);
        assert!(selector.select(2020, &years(&[2018, 2019, 2021, 2022])).is_complete());
    }
}
