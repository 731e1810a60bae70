//! "Not measured" markers and the reductions that respect them.
//!
//! Unknown values are never zero: a zero means "measured, nothing used". Any negative value is
//! treated as unknown when reducing.

pub const UNKNOWN_I64: i64 = -1;
pub const UNKNOWN_I32: i32 = -1;
pub const UNKNOWN_F64: f64 = -1.0;
pub const UNKNOWN_STR: &str = "N/A";

pub fn is_known_i64(value: i64) -> bool {
    value >= 0
}

pub fn is_known_f64(value: f64) -> bool {
    value >= 0.0
}

/// Sum of the known values, or [`UNKNOWN_F64`] when none is known.
pub fn sum_known_f64<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    values.into_iter().filter(|v| is_known_f64(*v)).fold(None, |acc: Option<f64>, v| Some(acc.unwrap_or(0.0) + v)).unwrap_or(UNKNOWN_F64)
}

/// Sum of the known values, or [`UNKNOWN_I64`] when none is known.
pub fn sum_known_i64<I: IntoIterator<Item = i64>>(values: I) -> i64 {
    values.into_iter().filter(|v| is_known_i64(*v)).fold(None, |acc: Option<i64>, v| Some(acc.unwrap_or(0).saturating_add(v))).unwrap_or(UNKNOWN_I64)
}

/// Adds two optional measurements; the result is unknown only when both are.
pub fn add_optional(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
    }
}
