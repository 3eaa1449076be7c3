//! Static report code tables.

use lazy_static::lazy_static;
use std::collections::HashMap;

/// Report codes the decoder family covers.
pub const SUPPORTED_REPORTS: [&str; 19] = [
    "S01", "S02", "S04", "S05", "S06", "S09", "S12", "S13", "S14", "S15", "S17", "S18", "S21",
    "S23", "S24", "S27", "S42", "S52", "S53",
];

pub fn is_supported(report_code: &str) -> bool {
    SUPPORTED_REPORTS.contains(&report_code)
}

lazy_static! {
    // Event group codes (`Et` attribute) of the spontaneous event reports.
    static ref EVENT_GROUPS: HashMap<u8, &'static str> = HashMap::from([
        (1, "Standard events"),
        (2, "Power contract control"),
        (3, "Power quality and fraud detection"),
        (4, "Demand side management"),
        (5, "Common events"),
        (6, "Firmware update"),
        (7, "Communications"),
    ]);
}

/// Human-readable description of an event group code, when known.
pub fn event_group_description(group: u8) -> Option<&'static str> {
    EVENT_GROUPS.get(&group).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_supported() {
        assert!(is_supported("S02"));
        assert!(is_supported("S53"));
        assert!(!is_supported("S26"));
        assert!(!is_supported("B03"));
    }

    #[test]
    fn test_event_group_description() {
        assert_eq!(event_group_description(1), Some("Standard events"));
        assert_eq!(event_group_description(99), None);
    }
}
