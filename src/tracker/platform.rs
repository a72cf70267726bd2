use std::sync::OnceLock;

use regex::Regex;

/// Sentinel shown when a vehicle label carries no platform code.
pub const NO_PLATFORM: &str = "N/A";

fn trailing_platform() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\((\d+)\)$").expect("valid platform pattern"))
}

/// Pulls the platform number out of a free-text vehicle label. The
/// code is only recognized as a trailing parenthesized integer, e.g.
/// "C1-23562-PLATF.(2)" carries platform "2".
pub fn platform_from_label(label: Option<&str>) -> String {
    label
        .and_then(|label| trailing_platform().captures(label))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| NO_PLATFORM.to_string())
}
