// ⚠️ Analysis Issues - Recoverable conditions that exclude data, never abort
//
// Every failure inside the core degrades to "exclude this institution/year
// with a reason". The Display text of each variant IS the reason stored in
// the report tables, so keep it readable for the analyst.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ANALYSIS ISSUES (recoverable)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum AnalysisIssue {
    /// A year or metric value is absent
    #[error("data gap: {0}")]
    DataGap(String),

    /// Two or more names tied for canonical; first-seen wins
    #[error("ambiguous canonical name: {candidates:?} tied at {count} occurrences, kept '{chosen}'")]
    ResolutionAmbiguity {
        candidates: Vec<String>,
        count: usize,
        chosen: String,
    },

    /// Insufficient history around the first event
    #[error("incomplete window around {event_year}: missing pre {missing_pre:?}, missing post {missing_post:?}")]
    WindowIncomplete {
        event_year: i32,
        missing_pre: Vec<i32>,
        missing_post: Vec<i32>,
    },

    /// Fewer than 2 usable differences (or zero variance)
    #[error("not computable: {reason} (n = {sample_size})")]
    InsufficientSample { sample_size: usize, reason: String },

    /// Institution has no event years in the calendar
    #[error("no event year in calendar")]
    NotInCalendar,
}

// ============================================================================
// RECORD VALIDATION ERRORS
// ============================================================================

/// Raised while turning an imported row into a typed record
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("missing ein for '{0}'")]
    MissingEin(String),

    #[error("year {0} out of range")]
    YearOutOfRange(i32),

    #[error("missing compensation for ein {ein} in {year}")]
    MissingCompensation { ein: String, year: i32 },
}
