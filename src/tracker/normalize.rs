/// Canonical form of a trip identifier: ASCII alphanumerics only,
/// uppercased. Static and realtime sources disagree on separators and
/// casing, so every identifier passes through here before it is used
/// as a key.
pub fn normalize_trip_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
