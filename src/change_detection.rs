// 🔄 Change Detection - Flag years where the CEO changed
//
// Compares each record's canonical executive with the closest EARLIER record
// actually present (gaps do not suppress the comparison). The first record
// of an institution is never flagged.

use crate::entities::Institution;
use crate::records::YearRecord;
use tracing::debug;

pub struct ChangeDetector;

impl ChangeDetector {
    pub fn new() -> Self {
        ChangeDetector
    }

    /// Flag identity changes on one institution's records.
    ///
    /// Records are sorted by year first, so row order in the input does not
    /// matter. Returns the number of flagged records.
    pub fn detect(&self, records: &mut [YearRecord]) -> usize {
        records.sort_by_key(|r| r.year);

        let mut flagged = 0;
        let mut previous: Option<String> = None;

        for record in records.iter_mut() {
            record.identity_changed = match &previous {
                Some(prev) => *prev != record.canonical_executive_name,
                None => false,
            };

            if record.identity_changed {
                flagged += 1;
                debug!(ein = %record.ein, year = record.year, ceo = %record.canonical_executive_name, "CEO change");
            }

            previous = Some(record.canonical_executive_name.clone());
        }

        flagged
    }

    pub fn detect_institution(&self, institution: &mut Institution) -> usize {
        self.detect(&mut institution.records)
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}
