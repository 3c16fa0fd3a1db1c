// 🏛️ Entity Models
// Institutions are keyed by EIN (identity); display names are values that drift

pub mod institution;

pub use institution::{group_by_institution, normalize_institution_name, Institution};
