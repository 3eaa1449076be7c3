//! Octet-string and datetime conversions for the PRIME STG-DC wire format.
//!
//! Dates, calendar names and bitfields travel as fixed-width hexadecimal
//! "octet strings", sometimes with `FF` wildcard components. Concentrators of
//! different vendors disagree on whether date components are hex- or
//! decimal-encoded, so [`octet_to_date`] carries the disambiguation
//! heuristics the fleet actually needs.

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Europe::Madrid;
use chrono_tz::OffsetComponents;
use log::debug;
use thiserror::Error;

/// Timestamp every known vendor "no value" marker is normalized to.
pub const SENTINEL_DATE: &str = "1901-01-01 00:00:00";

/// Raw date fields (season letter stripped) that mean "no value", besides
/// the all-`F` pattern SAGECOM concentrators emit when a period does not
/// affect the contracted tariff.
pub const BAD_TIMESTAMPS: [&str; 1] = ["00000000000000"];

#[derive(Error, Debug, PartialEq)]
pub enum OctetError {
    #[error("octet string too short: {0}")]
    TooShort(String),
    #[error("invalid hexadecimal octet: {0}")]
    InvalidHex(String),
    #[error("date out of range: {0}")]
    DateOutOfRange(String),
    #[error("empty timestamp")]
    EmptyTimestamp,
}

/// Encodes a calendar name as a 12-hex-digit octet string: the text is
/// right-justified to 6 characters with spaces, then each character becomes
/// two uppercase hex digits.
pub fn name_to_octet(txt: &str) -> String {
    let padded = format!("{:>6}", txt);
    hex::encode_upper(padded.as_bytes())
}

/// Decodes an octet string back into text, stopping at the first
/// non-printable character (used by the wire format as padding).
pub fn octet_to_name(octet: &str) -> Result<String, OctetError> {
    let bytes = hex::decode(octet).map_err(|_| OctetError::InvalidHex(octet.to_string()))?;
    let name = bytes
        .iter()
        .take_while(|value| (0x20..0x7F).contains(*value))
        .map(|&value| value as char)
        .collect();
    Ok(name)
}

/// Plain base-16 parse of an octet string.
pub fn octet_to_number(octet: &str) -> Result<u64, OctetError> {
    u64::from_str_radix(octet.trim(), 16)
        .map_err(|_| OctetError::InvalidHex(octet.to_string()))
}

fn component(field: &str, decimal: bool) -> Option<u32> {
    if decimal {
        field.parse().ok()
    } else {
        u32::from_str_radix(field, 16).ok()
    }
}

/// Decodes the 14-character date portion of an octet string into a naive
/// datetime.
///
/// The year field decides the interpretation of the rest:
/// - `FFFF` is a wildcard year: it maps to 9999 and the remaining
///   components are read as decimal digits;
/// - a hex-decoded year above 3000 (or exactly 0) means the field was never
///   hex-encoded in the first place; every component is re-read as decimal.
///
/// Months outside 1-12 and days outside 1-31 fall back to 1; an `FF`
/// hour/minute/second byte decodes to 0. Anything that still cannot form a
/// calendar date after those fallbacks is a [`OctetError::DateOutOfRange`].
pub fn octet_to_date(text: &str) -> Result<NaiveDateTime, OctetError> {
    let date = text
        .get(0..14)
        .ok_or_else(|| OctetError::TooShort(text.to_string()))?;
    // The fixed-width component slices below assume single-byte characters.
    if !date.is_ascii() {
        return Err(OctetError::InvalidHex(text.to_string()));
    }

    let year_raw = &date[0..4];
    let mut decimal = false;
    let year: i32;
    if year_raw.eq_ignore_ascii_case("FFFF") {
        // Wildcard year, the rest of the field is plain digits.
        year = 9999;
        decimal = true;
    } else {
        let hex_year = i32::from_str_radix(year_raw, 16)
            .map_err(|_| OctetError::InvalidHex(text.to_string()))?;
        if hex_year > 3000 || hex_year == 0 {
            decimal = true;
            year = year_raw
                .parse()
                .map_err(|_| OctetError::DateOutOfRange(text.to_string()))?;
        } else {
            year = hex_year;
        }
    }

    let month = match component(&date[4..6], decimal) {
        Some(m) if (1..=12).contains(&m) => m,
        _ => 1,
    };
    let day = match component(&date[6..8], decimal) {
        Some(d) if (1..=31).contains(&d) => d,
        _ => 1,
    };

    let mut clock = [0u32; 3];
    for (slot, range) in [(0, 8..10), (1, 10..12), (2, 12..14)] {
        let field = &date[range];
        if field.eq_ignore_ascii_case("FF") {
            clock[slot] = 0;
        } else {
            clock[slot] = component(field, decimal)
                .ok_or_else(|| OctetError::DateOutOfRange(text.to_string()))?;
        }
    }

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(clock[0], clock[1], clock[2]))
        .ok_or_else(|| OctetError::DateOutOfRange(text.to_string()))
}

/// Encodes a calendar date as `YYYYMMDD` with every component in uppercase
/// hex, the form DLMS activation-date payloads expect.
pub fn date_to_octet_hex(date: NaiveDate) -> String {
    format!(
        "{:04X}{:02X}{:02X}",
        date.year(),
        date.month(),
        date.day()
    )
}

/// Formats a naive datetime as a PRIME wire timestamp
/// (`YYYYMMDDHHMMSS000S`/`...W`), localizing to Madrid civil time and
/// deriving the season suffix from the zone's own DST rule.
pub fn timestamp_to_wire(dt: NaiveDateTime) -> String {
    let localized = match Madrid.from_local_datetime(&dt) {
        chrono::LocalResult::Single(l) => l,
        // Fall-back hour: prefer the standard-time reading.
        chrono::LocalResult::Ambiguous(_, standard) => standard,
        // Spring-forward gap: the wall clock skips ahead one hour.
        chrono::LocalResult::None => {
            debug!("timestamp {dt} falls in a DST gap, shifting forward");
            Madrid
                .from_utc_datetime(&(dt - Madrid.offset_from_utc_datetime(&dt).base_utc_offset()))
        }
    };
    let season = if localized.offset().dst_offset().is_zero() {
        'W'
    } else {
        'S'
    };
    format!("{}000{}", localized.format("%Y%m%d%H%M%S"), season)
}

/// Same as [`timestamp_to_wire`] but for an already-zoned datetime, which is
/// first converted to Madrid civil time.
pub fn timestamp_to_wire_zoned<Tz: TimeZone>(dt: &chrono::DateTime<Tz>) -> String {
    let madrid = dt.with_timezone(&Madrid);
    let season = if madrid.offset().dst_offset().is_zero() {
        'W'
    } else {
        'S'
    };
    format!("{}000{}", madrid.format("%Y%m%d%H%M%S"), season)
}

/// Decodes a report timestamp attribute into its datetime and season letter.
///
/// Handles the padded 17/19-character form (`YYYYMMDDHHMMSS000S`) by keeping
/// the first 14 characters plus the trailing season marker, and normalizes
/// the known vendor "no value" literals to [`SENTINEL_DATE`] instead of
/// failing.
pub fn parse_timestamp(raw: &str) -> Result<(NaiveDateTime, char), OctetError> {
    if raw.is_empty() {
        return Err(OctetError::EmptyTimestamp);
    }
    let compact: String = if raw.len() > 15 {
        let head = raw
            .get(0..14)
            .ok_or_else(|| OctetError::TooShort(raw.to_string()))?;
        let mut s = head.to_string();
        s.push(raw.chars().last().unwrap_or('W'));
        s
    } else {
        raw.to_string()
    };

    let (date_part, season) = match compact.chars().last() {
        Some(c) if c.is_ascii_alphabetic() && !c.is_ascii_hexdigit() => {
            (&compact[..compact.len() - 1], c)
        }
        _ => (compact.as_str(), 'W'),
    };

    let all_wildcard = date_part
        .chars()
        .all(|c| c.eq_ignore_ascii_case(&'f'));
    if all_wildcard
        || BAD_TIMESTAMPS
            .iter()
            .any(|bad| date_part.eq_ignore_ascii_case(bad))
    {
        let sentinel = NaiveDate::from_ymd_opt(1901, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("sentinel date is valid");
        return Ok((sentinel, 'W'));
    }

    let dt = octet_to_date(date_part)?;
    Ok((dt, season))
}

/// Current moment as a PRIME wire timestamp. Handy when stamping orders.
pub fn now_to_wire() -> String {
    timestamp_to_wire_zoned(&Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_name_octet_round_trip() {
        assert_eq!(name_to_octet("2.0TDA"), "322E30544441");
        assert_eq!(octet_to_name("322E30544441").unwrap(), "2.0TDA");
        // Shorter names come back space-padded to 6 characters.
        assert_eq!(name_to_octet("ABC"), "202020414243");
        assert_eq!(octet_to_name("202020414243").unwrap(), "   ABC");
    }

    #[test]
    fn test_octet_to_name_stops_at_padding() {
        // 0x00 terminates the readable part.
        assert_eq!(octet_to_name("414200434445").unwrap(), "AB");
    }

    #[test]
    fn test_octet_to_number() {
        assert_eq!(octet_to_number("0E").unwrap(), 14);
        assert_eq!(octet_to_number("FF").unwrap(), 255);
        assert!(octet_to_number("ZZ").is_err());
    }

    #[test]
    fn test_octet_to_date_decimal_heuristic() {
        // "2015" hex-decodes above 3000, so the field is decimal.
        let dt = octet_to_date("20150831020000").unwrap();
        assert_eq!(dt.to_string(), "2015-08-31 02:00:00");
    }

    #[test]
    fn test_octet_to_date_hex_mode() {
        // 0x07DF = 2015
        let dt = octet_to_date("07DF08150B1E00").unwrap();
        assert_eq!(dt.to_string(), "2015-08-21 11:30:00");
    }

    #[test]
    fn test_octet_to_date_wildcard_year() {
        let dt = octet_to_date("FFFF0101FF0000").unwrap();
        assert_eq!(dt.date().year(), 9999);
        assert_eq!(dt.date().month(), 1);
        assert_eq!(dt.time().hour(), 0);
    }

    #[test]
    fn test_octet_to_date_component_fallbacks() {
        // Month 0x2A = 42 is out of range, both fall back to 1.
        let dt = octet_to_date("07DF2A4000FF00").unwrap();
        assert_eq!(dt.to_string(), "2015-01-01 00:00:00");
    }

    #[test]
    fn test_octet_to_date_rejects_garbage_clock() {
        assert!(matches!(
            octet_to_date("20159999999999"),
            Err(OctetError::DateOutOfRange(_))
        ));
    }

    #[test]
    fn test_date_to_octet_hex() {
        let d = NaiveDate::from_ymd_opt(2021, 4, 1).unwrap();
        assert_eq!(date_to_octet_hex(d), "07E50401");
    }

    #[test]
    fn test_date_octet_round_trip() {
        let d = NaiveDate::from_ymd_opt(2019, 12, 25).unwrap();
        let wire = format!("{}{}", date_to_octet_hex(d), "000000");
        let decoded = octet_to_date(&wire).unwrap();
        assert_eq!(decoded.date(), d);
    }

    #[test]
    fn test_timestamp_to_wire_seasons() {
        let summer = NaiveDate::from_ymd_opt(2021, 7, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(timestamp_to_wire(summer), "20210715120000000S");

        let winter = NaiveDate::from_ymd_opt(2021, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(timestamp_to_wire(winter), "20210115120000000W");
    }

    #[test]
    fn test_parse_timestamp_padded_form() {
        let (dt, season) = parse_timestamp("20150831020000000S").unwrap();
        assert_eq!(dt.to_string(), "2015-08-31 02:00:00");
        assert_eq!(season, 'S');
    }

    #[test]
    fn test_parse_timestamp_multibyte_garbage_is_error() {
        // 16 bytes with a character straddling the 14-byte cut.
        assert!(matches!(
            parse_timestamp("1234567890123\u{20ac}"),
            Err(OctetError::TooShort(_))
        ));
        // Multi-byte garbage inside the date window.
        assert!(matches!(
            parse_timestamp("12\u{20ac}4567890123000W"),
            Err(OctetError::InvalidHex(_))
        ));
        assert!(parse_timestamp("\u{20ac}").is_err());
    }

    #[test]
    fn test_parse_timestamp_sentinel() {
        let (dt, season) = parse_timestamp("FFFFFFFFFFFFFFW").unwrap();
        assert_eq!(dt.to_string(), SENTINEL_DATE);
        assert_eq!(season, 'W');
    }
}
