// 📅 Event Calendar - M&A years per institution, aligned onto year records
//
// The calendar is static configuration (read-only for a run).
// Lookup order: EIN when the entry carries one, else normalized name.
// Institutions absent from the calendar simply have no event years.

use crate::entities::{normalize_institution_name, Institution};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

// ============================================================================
// CALENDAR ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEntry {
    /// Institution name as the analyst wrote it
    pub name: String,

    /// Optional EIN; preferred over the name when present
    #[serde(default)]
    pub ein: Option<String>,

    /// Years with a merger or acquisition
    pub years: Vec<i32>,
}

impl CalendarEntry {
    pub fn new(name: &str, years: &[i32]) -> Self {
        CalendarEntry {
            name: name.to_string(),
            ein: None,
            years: years.to_vec(),
        }
    }

    pub fn with_ein(mut self, ein: &str) -> Self {
        self.ein = Some(crate::records::normalize_ein(ein));
        self
    }
}

// ============================================================================
// EVENT CALENDAR
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct EventCalendar {
    entries: Vec<CalendarEntry>,
    by_name: HashMap<String, BTreeSet<i32>>,
    by_ein: HashMap<String, BTreeSet<i32>>,
}

impl EventCalendar {
    /// Build from entries; repeated institutions have their years merged
    pub fn from_entries(entries: Vec<CalendarEntry>) -> Self {
        let mut by_name: HashMap<String, BTreeSet<i32>> = HashMap::new();
        let mut by_ein: HashMap<String, BTreeSet<i32>> = HashMap::new();

        for entry in &entries {
            by_name
                .entry(normalize_institution_name(&entry.name))
                .or_default()
                .extend(entry.years.iter().copied());

            if let Some(ein) = entry.ein.as_deref().filter(|e| !e.is_empty()) {
                by_ein.entry(ein.to_string()).or_default().extend(entry.years.iter().copied());
            }
        }

        EventCalendar { entries, by_name, by_ein }
    }

    /// M&A calendar of the 21 studied institutions
    pub fn builtin() -> Self {
        EventCalendar::from_entries(vec![
            CalendarEntry::new("Advia Credit Union", &[2016, 2017, 2019]),
            CalendarEntry::new("Five Star Credit Union", &[2014, 2015]),
            CalendarEntry::new("Greenstate Credit Union", &[2020, 2022]),
            CalendarEntry::new("Wings Financial Credit Union", &[2020, 2021, 2023]),
            CalendarEntry::new("Achieva Credit Union", &[2015, 2018]),
            CalendarEntry::new("Alabama One Credit Union", &[2021, 2023]),
            CalendarEntry::new("Avadian Credit Union", &[2016, 2022]),
            CalendarEntry::new("Crane Credit Union", &[2020, 2021]),
            CalendarEntry::new("Dfcu Financial", &[2023]),
            CalendarEntry::new("Fairwinds Credit Union", &[2019, 2022]),
            CalendarEntry::new("First Commerce Credit Union", &[2014, 2020]),
            CalendarEntry::new("Georgias Own Credit Union", &[2018, 2022]),
            CalendarEntry::new("Harborstone Credit Union", &[2024]),
            CalendarEntry::new("Lake Michigan Credit Union", &[2018, 2021]),
            CalendarEntry::new("Land Of Lincoln Credit Union", &[2023]),
            CalendarEntry::new("Lge Community Credit Union", &[2018, 2023]),
            CalendarEntry::new("Midflorida Credit Union", &[2019]),
            CalendarEntry::new("Numark Credit Union", &[2021, 2023]),
            CalendarEntry::new("Royal Credit Union", &[2016, 2022]),
            CalendarEntry::new("Sound Credit Union", &[2019]),
            CalendarEntry::new("Vystar Credit Union", &[2019, 2022]),
        ])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Event years by EIN first, then by normalized name
    pub fn years_for(&self, ein: &str, name: &str) -> Option<&BTreeSet<i32>> {
        self.by_ein
            .get(ein)
            .or_else(|| self.by_name.get(&normalize_institution_name(name)))
    }
}

// ============================================================================
// EVENT ALIGNER
// ============================================================================

pub struct EventAligner<'a> {
    calendar: &'a EventCalendar,
}

impl<'a> EventAligner<'a> {
    pub fn new(calendar: &'a EventCalendar) -> Self {
        EventAligner { calendar }
    }

    /// Calendar years for an institution, trying its EIN, display name and
    /// every spelling seen on its records
    fn lookup(&self, institution: &Institution) -> Option<&'a BTreeSet<i32>> {
        std::iter::once(institution.name.as_str())
            .chain(institution.records.iter().map(|r| r.institution_name.as_str()))
            .find_map(|name| self.calendar.years_for(&institution.ein, name))
    }

    /// Set `is_event_year` on exactly the records whose year is in the
    /// calendar entry and store the full calendar years on the institution.
    /// Returns the matched years, ascending.
    pub fn align(&self, institution: &mut Institution) -> Vec<i32> {
        let Some(years) = self.lookup(institution) else {
            info!(ein = %institution.ein, name = %institution.name, "not in event calendar");
            for record in institution.records.iter_mut() {
                record.is_event_year = false;
            }
            institution.calendar_years.clear();
            return Vec::new();
        };
        institution.calendar_years = years.iter().copied().collect();

        let mut matched = Vec::new();
        for record in institution.records.iter_mut() {
            record.is_event_year = years.contains(&record.year);
            if record.is_event_year {
                matched.push(record.year);
            }
        }
        matched.sort_unstable();

        let observed = institution.years();
        let unobserved: Vec<i32> = years.iter().copied().filter(|y| !observed.contains(y)).collect();
        if !unobserved.is_empty() {
            debug!(ein = %institution.ein, ?unobserved, "event years without a record");
        }

        matched
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::YearRecord;

    fn institution(ein: &str, name: &str, years: &[i32]) -> Institution {
        let mut inst = Institution::new(ein, name);
        inst.records = years
            .iter()
            .map(|&y| YearRecord::new(ein, name, y, "Jane Doe", Some(1.0), None).unwrap())
            .collect();
        inst
    }

    #[test]
    fn test_builtin_calendar() {
        let calendar = EventCalendar::builtin();
        assert_eq!(calendar.len(), 21);

        let years = calendar.years_for("000", "Advia Credit Union").unwrap();
        assert_eq!(years.iter().copied().collect::<Vec<_>>(), vec![2016, 2017, 2019]);
    }

    #[test]
    fn test_align_marks_intersection_only() {
        let calendar = EventCalendar::builtin();
        let mut inst = institution("381686050", "Advia Credit Union", &[2015, 2016, 2018, 2019, 2020]);

        let matched = EventAligner::new(&calendar).align(&mut inst);

        // 2017 is in the calendar but has no record
        assert_eq!(matched, vec![2016, 2019]);
        assert_eq!(inst.event_years(), vec![2016, 2019]);
        assert_eq!(inst.calendar_years, vec![2016, 2017, 2019]);
    }

    #[test]
    fn test_first_event_year_without_record() {
        let calendar = EventCalendar::from_entries(vec![CalendarEntry::new("Five Star Credit Union", &[2014, 2015])]);
        let mut inst = institution(
            "5",
            "Five Star Credit Union",
            &[2010, 2011, 2012, 2013, 2015, 2016, 2017, 2018],
        );

        let matched = EventAligner::new(&calendar).align(&mut inst);

        assert_eq!(matched, vec![2015]);
        assert_eq!(inst.first_event_year(), Some(2014));
    }

    #[test]
    fn test_name_normalization() {
        let calendar = EventCalendar::builtin();
        let mut inst = institution("1", "FAIRWINDS Credit Union.", &[2019, 2020]);

        assert_eq!(EventAligner::new(&calendar).align(&mut inst), vec![2019]);
    }

    #[test]
    fn test_absent_institution_has_no_events() {
        let calendar = EventCalendar::builtin();
        let mut inst = institution("1", "Unknown Credit Union", &[2019, 2020]);
        inst.records[0].is_event_year = true;

        inst.calendar_years = vec![2019];

        assert!(EventAligner::new(&calendar).align(&mut inst).is_empty());
        assert!(inst.records.iter().all(|r| !r.is_event_year));
        assert_eq!(inst.first_event_year(), None);
    }

    #[test]
    fn test_ein_preferred_over_name() {
        let calendar = EventCalendar::from_entries(vec![
            CalendarEntry::new("Old Name CU", &[2018]).with_ein("38-1686050"),
            CalendarEntry::new("Renamed CU", &[2020]),
        ]);
        let mut inst = institution("381686050", "Renamed CU", &[2018, 2020]);

        assert_eq!(EventAligner::new(&calendar).align(&mut inst), vec![2018]);
    }

    #[test]
    fn test_record_spelling_fallback() {
        let calendar = EventCalendar::from_entries(vec![CalendarEntry::new("Sound Credit Union", &[2019])]);
        let mut inst = institution("9", "Sound CU", &[2019]);
        inst.records[0].institution_name = "Sound Credit Union".to_string();

        assert_eq!(EventAligner::new(&calendar).align(&mut inst), vec![2019]);
    }

    #[test]
    fn test_duplicate_entries_merge_years() {
        let calendar = EventCalendar::from_entries(vec![
            CalendarEntry::new("Royal Credit Union", &[2016]),
            CalendarEntry::new("royal credit union", &[2022]),
        ]);
        let years = calendar.years_for("", "Royal Credit Union").unwrap();
        assert_eq!(years.len(), 2);
    }
}
