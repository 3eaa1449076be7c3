//! Built-in contract (tariff calendar) templates.
//!
//! Each template describes a time-of-use billing calendar: seasons pointing
//! at week profiles, week profiles naming a day schedule per weekday, day
//! schedules listing the hour/tariff-period change points, and optional
//! special-day overrides. Season start strings use the wildcarded octet
//! date syntax understood by the concentrator firmware.

use super::{ChangeDef, ContractTemplate, DayDef, SeasonDef, SpecialDayDef, WeekDef};

fn season(name: &str, start: &str, week: &str) -> SeasonDef {
    SeasonDef {
        name: name.to_string(),
        start: start.to_string(),
        week: week.to_string(),
    }
}

fn week(name: &str, days: &str) -> WeekDef {
    WeekDef {
        name: name.to_string(),
        week: days.to_string(),
    }
}

fn day(id: &str, changes: &[(u8, u8)]) -> DayDef {
    DayDef {
        id: id.to_string(),
        changes: changes
            .iter()
            .map(|&(hour, period)| ChangeDef { hour, period })
            .collect(),
    }
}

fn special_day(datetime: &str, year_wildcard: bool, day_id: &str) -> SpecialDayDef {
    SpecialDayDef {
        datetime: datetime.to_string(),
        year_wildcard,
        day_id: day_id.to_string(),
    }
}

/// National holidays shared by the TD calendars, always on the cheapest day
/// schedule with the year wildcarded.
fn td_special_days(day_id: &str) -> Vec<SpecialDayDef> {
    [
        ("FFFF0101000000000W", true),
        ("FFFF0106000000000W", true),
        ("FFFF0501000000000S", true),
        ("FFFF0815000000000S", true),
        ("FFFF1012000000000S", true),
        ("FFFF1101000000000W", true),
        ("FFFF1206000000000W", true),
        ("FFFF1208000000000W", true),
        ("FFFF1225000000000W", true),
    ]
    .iter()
    .map(|&(dt, card)| special_day(dt, card, day_id))
    .collect()
}

pub(super) fn simple_tariff() -> ContractTemplate {
    ContractTemplate {
        name: "2.0_ST".to_string(),
        description: "2.x 1 period contracts (Simple Tariff)".to_string(),
        origin: "library".to_string(),
        kind: "01".to_string(),
        seasons: vec![season("01", "FFFFFEFFFFFFFF0000800080", "01")],
        weeks: vec![week("01", "01010101010101")],
        days: vec![day("01", &[(1, 1)])],
        special_days: vec![],
    }
}

pub(super) fn double_tariff() -> ContractTemplate {
    ContractTemplate {
        name: "DHA_IT".to_string(),
        description: "2.xDHA 2 period contracts (Double Tariff)".to_string(),
        origin: "library".to_string(),
        kind: "01".to_string(),
        seasons: vec![
            season("01", "FFFFFEFFFFFFFF0000800080", "01"),
            season("02", "FFFFFDFFFFFFFF0000800000", "02"),
        ],
        weeks: vec![week("01", "01010101010101"), week("02", "02020202020202")],
        days: vec![
            day("01", &[(13, 1), (23, 2)]),
            day("02", &[(12, 1), (22, 2)]),
        ],
        special_days: vec![],
    }
}

pub(super) fn triple_tariff() -> ContractTemplate {
    ContractTemplate {
        name: "DHS_IT".to_string(),
        description: "2.xDHS 3 period contracts (Triple Tariff)".to_string(),
        origin: "library".to_string(),
        kind: "01".to_string(),
        seasons: vec![
            season("01", "FFFFFEFFFFFFFF0000800080", "01"),
            season("02", "FFFFFDFFFFFFFF0000800000", "02"),
        ],
        weeks: vec![week("01", "01010101010101"), week("02", "02020202020202")],
        days: vec![
            day("01", &[(1, 3), (7, 2), (13, 1)]),
            day("02", &[(1, 3), (7, 2), (13, 1)]),
        ],
        special_days: vec![],
    }
}

pub(super) fn td_20() -> ContractTemplate {
    ContractTemplate {
        name: "2.0TDA".to_string(),
        description: "2.0TDA 3 periods and special days".to_string(),
        origin: "library".to_string(),
        kind: "01".to_string(),
        seasons: vec![season("01", "FFFF0101FF00000000800000", "01")],
        weeks: vec![week("01", "01010101010202")],
        days: vec![
            day(
                "01",
                &[(0, 3), (8, 2), (9, 1), (14, 2), (18, 1), (22, 2)],
            ),
            day("02", &[(0, 3)]),
        ],
        special_days: td_special_days("03"),
    }
}

pub(super) fn td_30() -> ContractTemplate {
    ContractTemplate {
        name: "3.0TDA".to_string(),
        description: "3.0TDA with seasons and special days".to_string(),
        origin: "library".to_string(),
        kind: "01".to_string(),
        seasons: vec![
            season("01", "FFFF0101FF00000000800000", "01"),
            season("02", "FFFF0301FF00000000800000", "02"),
            season("03", "FFFF0401FF00000000800000", "03"),
            season("04", "FFFF0601FF00000000800000", "04"),
            season("05", "FFFF0701FF00000000800000", "01"),
            season("06", "FFFF0801FF00000000800000", "04"),
            season("07", "FFFF0A01FF00000000800000", "03"),
            season("08", "FFFF0B01FF00000000800000", "02"),
            season("09", "FFFF0C01FF00000000800000", "01"),
        ],
        weeks: vec![
            week("01", "01010101010505"),
            week("02", "02020202020505"),
            week("03", "04040404040505"),
            week("04", "03030303030505"),
        ],
        days: vec![
            day(
                "01",
                &[(0, 6), (8, 2), (9, 1), (14, 2), (18, 1), (22, 2)],
            ),
            day(
                "02",
                &[(0, 6), (8, 3), (9, 2), (14, 3), (18, 2), (22, 3)],
            ),
            day(
                "03",
                &[(0, 6), (8, 4), (9, 3), (14, 4), (18, 3), (22, 4)],
            ),
            day(
                "04",
                &[(0, 6), (8, 5), (9, 4), (14, 5), (18, 4), (22, 5)],
            ),
            day("05", &[(0, 6)]),
        ],
        special_days: td_special_days("05"),
    }
}

pub(super) fn all() -> Vec<ContractTemplate> {
    vec![
        simple_tariff(),
        double_tariff(),
        triple_tariff(),
        td_20(),
        td_30(),
    ]
}
