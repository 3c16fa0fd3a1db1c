// 🏛️ Institution Entity - EIN identity + chronological year records
//
// "The EIN is IDENTITY (never changes), the display name is a VALUE"
//
// Problem solved:
// - "FAIRWINDS Credit Union", "Fairwinds Credit Union." → same institution
// - Rows arrive in arbitrary order; analysis needs them chronological

use crate::records::YearRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

// ============================================================================
// INSTITUTION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Institution {
    /// Stable identity (tax id)
    pub ein: String,

    /// Display name (latest spelling seen)
    pub name: String,

    /// Records sorted ascending by year, one per year
    pub records: Vec<YearRecord>,

    /// Every calendar M&A year for this institution, ascending, whether or
    /// not a record exists for it. Empty until aligned.
    #[serde(default)]
    pub calendar_years: Vec<i32>,
}

impl Institution {
    pub fn new(ein: &str, name: &str) -> Self {
        Institution {
            ein: ein.to_string(),
            name: name.to_string(),
            records: Vec::new(),
            calendar_years: Vec::new(),
        }
    }

    /// Observed years (gaps are simply absent)
    pub fn years(&self) -> BTreeSet<i32> {
        self.records.iter().map(|r| r.year).collect()
    }

    /// Years flagged as M&A events, ascending
    pub fn event_years(&self) -> Vec<i32> {
        self.records
            .iter()
            .filter(|r| r.is_event_year)
            .map(|r| r.year)
            .collect()
    }

    /// First M&A year (E). Taken from the calendar even when that year has no
    /// record; falls back to the flagged records for unaligned institutions.
    pub fn first_event_year(&self) -> Option<i32> {
        self.calendar_years
            .first()
            .copied()
            .or_else(|| self.event_years().into_iter().min())
    }

    /// Years where the canonical executive changed
    pub fn ceo_change_years(&self) -> Vec<i32> {
        self.records
            .iter()
            .filter(|r| r.identity_changed)
            .map(|r| r.year)
            .collect()
    }

    /// Re-establish chronological order (stable for equal years)
    pub fn sort_chronologically(&mut self) {
        self.records.sort_by_key(|r| r.year);
    }
}

// ============================================================================
// GROUPING
// ============================================================================

/// Split a flat record table into institutions keyed by EIN.
///
/// Output is ordered by EIN; each institution's records are chronological.
/// A second row for an already-seen (ein, year) is dropped with a warning.
pub fn group_by_institution(records: Vec<YearRecord>) -> Vec<Institution> {
    let mut grouped: BTreeMap<String, Vec<YearRecord>> = BTreeMap::new();

    for record in records {
        grouped.entry(record.ein.clone()).or_default().push(record);
    }

    grouped
        .into_iter()
        .map(|(ein, mut rows)| {
            rows.sort_by_key(|r| r.year);

            let mut seen = BTreeSet::new();
            rows.retain(|r| {
                let fresh = seen.insert(r.year);
                if !fresh {
                    warn!(ein = %r.ein, year = r.year, "duplicate year dropped");
                }
                fresh
            });

            let name = rows
                .last()
                .map(|r| r.institution_name.clone())
                .unwrap_or_default();

            Institution {
                ein,
                name,
                records: rows,
                calendar_years: Vec::new(),
            }
        })
        .collect()
}

/// Normalize an institution name for matching: case, surrounding and repeated
/// whitespace, trailing punctuation.
///
/// Example: "  FAIRWINDS  Credit Union. " → "fairwinds credit union"
pub fn normalize_institution_name(name: &str) -> String {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_lowercase()
}

// ============================================================================
// TESTS
// ============================================================================
