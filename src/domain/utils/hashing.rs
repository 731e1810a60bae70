/// Deterministic 32-bit string hash (`h = 31 * h + c` over UTF-16 code units, wrapping).
///
/// Used to turn user names and executor identities into numeric trace ids that are stable
/// across runs and hosts.
pub fn stable_hash(value: &str) -> i32 {
    value.encode_utf16().fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
}

/// Non-negative variant of [`stable_hash`]. `i32::MIN` maps to `i32::MAX`.
pub fn stable_id(value: &str) -> i32 {
    stable_hash(value).checked_abs().unwrap_or(i32::MAX)
}
