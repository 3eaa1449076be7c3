//! Tariff-calendar and raw-DLMS template engine.
//!
//! Templates are static, process-wide data: contract templates describe the
//! Season/Week/Day/SpecialDays calendar tree a B04 order installs, DLMS
//! templates describe the parameterized `Set`/`Get` lines a B12 order sends.
//! Both tables are built once and never mutated.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use std::collections::HashMap;
use thiserror::Error;

use crate::octet::date_to_octet_hex;

pub mod contract_defs;
pub mod dlms_defs;

#[derive(Error, Debug, PartialEq)]
pub enum TemplateError {
    #[error("template not available: {0}")]
    NotAvailable(String),
    #[error("missing template parameter: {0}")]
    MissingParameter(String),
}

/// One season entry of a contract template. `start` keeps the wildcarded
/// octet date string verbatim, as the concentrator expects it.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonDef {
    pub name: String,
    pub start: String,
    pub week: String,
}

/// One week profile: seven 2-character day-schedule ids, Monday first.
#[derive(Debug, Clone, PartialEq)]
pub struct WeekDef {
    pub name: String,
    pub week: String,
}

/// A tariff-period change point inside a day schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeDef {
    /// Hour of day, 0-23.
    pub hour: u8,
    /// Tariff period, 1-6.
    pub period: u8,
}

/// A day schedule: ordered change points under a 2-character id.
#[derive(Debug, Clone, PartialEq)]
pub struct DayDef {
    pub id: String,
    pub changes: Vec<ChangeDef>,
}

/// A special-day override pointing a calendar date at a day schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecialDayDef {
    /// Wildcarded octet datetime, e.g. `FFFF0101000000000W`.
    pub datetime: String,
    /// Whether the year component is a wildcard (`DTCard="Y"`).
    pub year_wildcard: bool,
    pub day_id: String,
}

/// A complete tariff calendar definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractTemplate {
    pub name: String,
    pub description: String,
    pub origin: String,
    /// Calendar type code, `01` for season calendars.
    pub kind: String,
    pub seasons: Vec<SeasonDef>,
    pub weeks: Vec<WeekDef>,
    /// Day schedules in ascending id order.
    pub days: Vec<DayDef>,
    pub special_days: Vec<SpecialDayDef>,
}

/// One raw DLMS operation of a template: a write when `data` is present, a
/// read otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct DlmsLine {
    pub obis: String,
    pub class_id: String,
    pub element: String,
    pub data: Option<String>,
}

/// A named, ordered list of raw DLMS operations.
#[derive(Debug, Clone, PartialEq)]
pub struct DlmsTemplate {
    pub name: String,
    pub description: String,
    pub origin: String,
    /// `contract`, `powers`, ...
    pub category: String,
    pub lines: Vec<DlmsLine>,
}

/// A DLMS line with its placeholders resolved, ready for the order encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct DlmsOperation {
    pub obis: String,
    pub class_id: String,
    pub element: String,
    pub data: Option<String>,
}

lazy_static! {
    static ref CONTRACT_TEMPLATES: HashMap<String, ContractTemplate> = contract_defs::all()
        .into_iter()
        .map(|t| (t.name.clone(), t))
        .collect();
    static ref DLMS_TEMPLATES: HashMap<String, DlmsTemplate> = dlms_defs::all()
        .into_iter()
        .map(|t| (t.name.clone(), t))
        .collect();
}

/// Looks up a contract template by name.
pub fn contract_template(name: &str) -> Result<&'static ContractTemplate, TemplateError> {
    CONTRACT_TEMPLATES
        .get(name)
        .ok_or_else(|| TemplateError::NotAvailable(name.to_string()))
}

/// Looks up a DLMS template by name.
pub fn dlms_template(name: &str) -> Result<&'static DlmsTemplate, TemplateError> {
    DLMS_TEMPLATES
        .get(name)
        .ok_or_else(|| TemplateError::NotAvailable(name.to_string()))
}

/// Lists contract templates as `(name, description, origin)`, optionally
/// filtered by origin, in ascending name order.
pub fn list_contract_templates(origin: Option<&str>) -> Vec<(String, String, String)> {
    let mut listed: Vec<_> = CONTRACT_TEMPLATES
        .values()
        .filter(|t| origin.is_none_or(|o| t.origin == o))
        .map(|t| (t.name.clone(), t.description.clone(), t.origin.clone()))
        .collect();
    listed.sort();
    listed
}

/// Lists DLMS templates as `(name, description, origin)`, optionally
/// filtered by origin and/or category, in ascending name order.
pub fn list_dlms_templates(
    origin: Option<&str>,
    category: Option<&str>,
) -> Vec<(String, String, String)> {
    let mut listed: Vec<_> = DLMS_TEMPLATES
        .values()
        .filter(|t| origin.is_none_or(|o| t.origin == o))
        .filter(|t| category.is_none_or(|c| t.category == c))
        .map(|t| (t.name.clone(), t.description.clone(), t.origin.clone()))
        .collect();
    listed.sort();
    listed
}

/// Renders a contracted power value the way DLMS data payloads carry it:
/// 8 uppercase hex digits, big-endian.
pub fn power_to_hex(power: u32) -> String {
    format!("{:08X}", power)
}

/// Resolves a DLMS template's placeholders.
///
/// `powers` feeds `{p1}`..`{p6}`, `date` feeds `{date}` (via
/// [`date_to_octet_hex`]). A placeholder left unresolved after substitution
/// is a [`TemplateError::MissingParameter`], since sending a literal
/// placeholder to a meter would brick the write.
pub fn fill_dlms_template(
    template: &DlmsTemplate,
    powers: Option<&[u32; 6]>,
    date: Option<NaiveDate>,
) -> Result<Vec<DlmsOperation>, TemplateError> {
    let mut operations = Vec::with_capacity(template.lines.len());
    for line in &template.lines {
        let data = match &line.data {
            Some(tpl) => {
                let mut data = tpl.clone();
                if let Some(powers) = powers {
                    for (index, power) in powers.iter().enumerate() {
                        data = data.replace(&format!("{{p{}}}", index + 1), &power_to_hex(*power));
                    }
                }
                if let Some(date) = date {
                    data = data.replace("{date}", &date_to_octet_hex(date));
                }
                for param in ["{p1}", "{p2}", "{p3}", "{p4}", "{p5}", "{p6}", "{date}"] {
                    if data.contains(param) {
                        return Err(TemplateError::MissingParameter(param.to_string()));
                    }
                }
                Some(data)
            }
            None => None,
        };
        operations.push(DlmsOperation {
            obis: line.obis.clone(),
            class_id: line.class_id.clone(),
            element: line.element.clone(),
            data,
        });
    }
    Ok(operations)
}
