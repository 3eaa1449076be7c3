//! Order encoding.
//!
//! Orders travel in the opposite direction of reports: the head end builds
//! an XML document rooted at `Order` and drops it on the concentrator. The
//! payload element depends on the order code (B02 contracted powers, B03
//! cutoff, B04 tariff calendar, B07/B07_ip concentrator configuration, B09
//! meter parameters, B11 control command, B12 raw DLMS).
//!
//! The emitted XML matches the concentrator firmware's expectations byte
//! for byte: two-space indentation, alphabetically ordered attributes, no
//! XML declaration, trailing newline.

use chrono::{NaiveDate, NaiveDateTime};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use thiserror::Error;

use crate::octet::{name_to_octet, timestamp_to_wire};
use crate::templates::{contract_template, dlms_template, fill_dlms_template, TemplateError};

/// Order codes the encoder covers. `B07_ip` and `B12` are buildable but
/// undocumented in the DC spec, so they stay off the advertised list.
pub const SUPPORTED_ORDERS: [&str; 6] = ["B02", "B03", "B04", "B07", "B09", "B11"];

pub fn is_supported(order_code: &str) -> bool {
    SUPPORTED_ORDERS.contains(&order_code)
}

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("order type not implemented: {0}")]
    NotImplemented(String),
    #[error("order {code} does not accept this payload")]
    PayloadMismatch { code: String },
    #[error("order {0} requires a meter id")]
    MissingMeter(String),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("xml write failed: {0}")]
    Write(String),
}

/// Envelope fields common to every order.
#[derive(Debug, Clone)]
pub struct OrderFields {
    pub petition_id: String,
    pub concentrator: String,
    pub meter: Option<String>,
    pub version: String,
}

impl OrderFields {
    pub fn new(petition_id: impl Into<String>, concentrator: impl Into<String>) -> OrderFields {
        OrderFields {
            petition_id: petition_id.into(),
            concentrator: concentrator.into(),
            meter: None,
            version: "3.1.c".to_string(),
        }
    }

    pub fn meter(mut self, meter: impl Into<String>) -> OrderFields {
        self.meter = Some(meter.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> OrderFields {
        self.version = version.into();
        self
    }
}

/// One of the three mutually exclusive B07_ip settings.
#[derive(Debug, Clone)]
pub enum IpSetting {
    Ftp(String),
    Ntp(String),
    Stg(String),
}

/// A scheduled task definition for the B07 general form.
#[derive(Debug, Clone, Default)]
pub struct TaskDef {
    pub attributes: Vec<(String, String)>,
    pub requests: Vec<TaskRequest>,
}

/// A `TpPro` sub-request of a B07 task. `extra` entries become child
/// elements carrying their value as text.
#[derive(Debug, Clone, Default)]
pub struct TaskRequest {
    pub attributes: Vec<(String, String)>,
    pub extra: Vec<(String, String)>,
}

/// Typed payload per order code.
#[derive(Debug, Clone)]
pub enum OrderPayload {
    /// B02: contracted powers in W for the six tariff periods.
    ContractedPowers {
        powers: [u32; 6],
        activation_date: NaiveDateTime,
    },
    /// B03: cutoff/reconnect. `order_param` is `0` open, `1` close,
    /// `2` close and reconnect.
    Cutoff {
        order_param: String,
        date_from: String,
        date_to: String,
    },
    /// B04: install a tariff calendar from a contract template.
    TariffCalendar {
        contract: u8,
        template: String,
        activation_date: NaiveDateTime,
    },
    /// B07: concentrator reconfiguration with optional scheduled tasks.
    ConcentratorConfig {
        attributes: Vec<(String, String)>,
        tasks: Vec<TaskDef>,
    },
    /// B07_ip: set exactly one of the FTP/NTP/STG server addresses.
    ConcentratorIp(IpSetting),
    /// B09: meter parameters, sparse (empty values are omitted).
    MeterParameters { attributes: Vec<(String, String)> },
    /// B11: concentrator control command `T01`..`T07`.
    ConcentratorControl {
        command: String,
        date_from: String,
        date_to: String,
    },
    /// B12: raw DLMS set/get lines from a named template.
    RawDlms {
        template: String,
        powers: Option<[u32; 6]>,
        date: Option<NaiveDate>,
        date_from: String,
        date_to: String,
    },
}

/// Builds the XML string for an order. The code selects the payload
/// element; a payload of the wrong variant for the code is an error.
pub fn build_order(
    order_code: &str,
    fields: &OrderFields,
    payload: &OrderPayload,
) -> Result<String, OrderError> {
    let mut xml = XmlBuilder::new();
    // B07_ip shares the B07 request code on the wire.
    let request_code = if order_code == "B07_ip" { "B07" } else { order_code };
    xml.start("Order", &[
        ("IdPet", fields.petition_id.as_str()),
        ("IdReq", request_code),
        ("Version", fields.version.as_str()),
    ])?;
    xml.start("Cnc", &[("Id", fields.concentrator.as_str())])?;

    match (order_code, payload) {
        ("B02", OrderPayload::ContractedPowers { powers, activation_date }) => {
            with_meter(&mut xml, order_code, fields, |xml| {
                let act_date = timestamp_to_wire(*activation_date);
                xml.start("B02", &[("ActDate", act_date.as_str())])?;
                let powers: Vec<(String, String)> = powers
                    .iter()
                    .enumerate()
                    .map(|(index, power)| (format!("TR{}", index + 1), power.to_string()))
                    .collect();
                xml.empty_owned("Contrato1", &powers)?;
                xml.end("B02")
            })?;
        }
        ("B03", OrderPayload::Cutoff { order_param, date_from, date_to }) => {
            with_meter(&mut xml, order_code, fields, |xml| {
                xml.empty("B03", &[
                    ("Order", order_param),
                    ("Fini", date_from),
                    ("Ffin", date_to),
                ])
            })?;
        }
        ("B04", OrderPayload::TariffCalendar { contract, template, activation_date }) => {
            let tmpl = contract_template(template)?;
            with_meter(&mut xml, order_code, fields, |xml| {
                xml.start("B04", &[])?;
                let contract_id = contract.to_string();
                let calendar_name = name_to_octet(&tmpl.name);
                let act_date = timestamp_to_wire(*activation_date);
                xml.start("Contract", &[
                    ("c", contract_id.as_str()),
                    ("CalendarType", tmpl.kind.as_str()),
                    ("CalendarName", calendar_name.as_str()),
                    ("ActDate", act_date.as_str()),
                ])?;
                for season in &tmpl.seasons {
                    xml.empty("Season", &[
                        ("Name", &season.name),
                        ("Start", &season.start),
                        ("Week", &season.week),
                    ])?;
                }
                for week in &tmpl.weeks {
                    xml.empty("Week", &[("Name", &week.name), ("Week", &week.week)])?;
                }
                for day in &tmpl.days {
                    xml.start("Day", &[("id", &day.id)])?;
                    for change in &day.changes {
                        let hour = format!("{:02X}000000", change.hour);
                        let period = format!("{:04}", change.period);
                        xml.empty("Change", &[
                            ("Hour", hour.as_str()),
                            ("TariffRate", period.as_str()),
                        ])?;
                    }
                    xml.end("Day")?;
                }
                for special_day in &tmpl.special_days {
                    let card = if special_day.year_wildcard { "Y" } else { "N" };
                    xml.empty("SpecialDays", &[
                        ("DT", &special_day.datetime),
                        ("DTCard", card),
                        ("DayID", &special_day.day_id),
                    ])?;
                }
                xml.end("Contract")?;
                xml.end("B04")
            })?;
        }
        ("B07", OrderPayload::ConcentratorConfig { attributes, tasks }) => {
            if tasks.is_empty() {
                xml.empty_owned("B07", attributes)?;
            } else {
                xml.start_owned("B07", attributes)?;
                for task in tasks {
                    if task.requests.is_empty() {
                        xml.empty_owned("TP", &task.attributes)?;
                        continue;
                    }
                    xml.start_owned("TP", &task.attributes)?;
                    for request in &task.requests {
                        if request.extra.is_empty() {
                            xml.empty_owned("TpPro", &request.attributes)?;
                            continue;
                        }
                        xml.start_owned("TpPro", &request.attributes)?;
                        for (key, value) in &request.extra {
                            xml.text_element(key, value)?;
                        }
                        xml.end("TpPro")?;
                    }
                    xml.end("TP")?;
                }
                xml.end("B07")?;
            }
        }
        ("B07_ip", OrderPayload::ConcentratorIp(setting)) => {
            let (key, value) = match setting {
                IpSetting::Ftp(address) => ("IPftp", address),
                IpSetting::Ntp(address) => ("IPNTP", address),
                IpSetting::Stg(address) => ("IPstg", address),
            };
            xml.empty("B07", &[(key, value)])?;
        }
        ("B09", OrderPayload::MeterParameters { attributes }) => {
            let sparse: Vec<(String, String)> = attributes
                .iter()
                .filter(|(_, value)| !value.is_empty())
                .cloned()
                .collect();
            with_meter(&mut xml, order_code, fields, |xml| {
                xml.empty_owned("B09", &sparse)
            })?;
        }
        ("B11", OrderPayload::ConcentratorControl { command, date_from, date_to }) => {
            xml.empty("B11", &[
                ("Order", command),
                ("Args", ""),
                ("Fini", date_from),
                ("Ffin", date_to),
            ])?;
        }
        ("B12", OrderPayload::RawDlms { template, powers, date, date_from, date_to }) => {
            let tmpl = dlms_template(template)?;
            let operations = fill_dlms_template(tmpl, powers.as_ref(), *date)?;
            with_meter(&mut xml, order_code, fields, |xml| {
                xml.start("B12", &[("Fini", date_from), ("Ffin", date_to)])?;
                for operation in &operations {
                    match &operation.data {
                        Some(data) => xml.empty("set", &[
                            ("obis", &operation.obis),
                            ("class", &operation.class_id),
                            ("element", &operation.element),
                            ("data", data),
                        ])?,
                        None => xml.empty("get", &[
                            ("obis", &operation.obis),
                            ("class", &operation.class_id),
                            ("element", &operation.element),
                        ])?,
                    }
                }
                xml.end("B12")
            })?;
        }
        ("B02" | "B03" | "B04" | "B07" | "B07_ip" | "B09" | "B11" | "B12", _) => {
            return Err(OrderError::PayloadMismatch {
                code: order_code.to_string(),
            });
        }
        _ => return Err(OrderError::NotImplemented(order_code.to_string())),
    }

    xml.end("Cnc")?;
    xml.end("Order")?;
    xml.finish()
}

/// Wraps a meter-directed payload in the `Cnt` element.
fn with_meter<F>(
    xml: &mut XmlBuilder,
    order_code: &str,
    fields: &OrderFields,
    body: F,
) -> Result<(), OrderError>
where
    F: FnOnce(&mut XmlBuilder) -> Result<(), OrderError>,
{
    let meter = fields
        .meter
        .as_deref()
        .ok_or_else(|| OrderError::MissingMeter(order_code.to_string()))?;
    xml.start("Cnt", &[("Id", meter)])?;
    body(xml)?;
    xml.end("Cnt")
}

/// Thin wrapper over the indenting writer. Attributes are sorted by name
/// before emission, matching the concentrator-side canonical form.
struct XmlBuilder {
    writer: Writer<Vec<u8>>,
}

impl XmlBuilder {
    fn new() -> XmlBuilder {
        XmlBuilder {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn element<'a>(tag: &'a str, attributes: &'a [(&'a str, &'a str)]) -> BytesStart<'a> {
        let mut sorted = attributes.to_vec();
        sorted.sort_by_key(|(key, _)| *key);
        let mut element = BytesStart::new(tag);
        for (key, value) in sorted {
            element.push_attribute((key, value));
        }
        element
    }

    fn start(&mut self, tag: &str, attributes: &[(&str, &str)]) -> Result<(), OrderError> {
        self.writer
            .write_event(Event::Start(Self::element(tag, attributes)))
            .map_err(|e| OrderError::Write(e.to_string()))
    }

    fn empty(&mut self, tag: &str, attributes: &[(&str, &str)]) -> Result<(), OrderError> {
        self.writer
            .write_event(Event::Empty(Self::element(tag, attributes)))
            .map_err(|e| OrderError::Write(e.to_string()))
    }

    fn start_owned(&mut self, tag: &str, attributes: &[(String, String)]) -> Result<(), OrderError> {
        let borrowed: Vec<(&str, &str)> = attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        self.start(tag, &borrowed)
    }

    fn empty_owned(&mut self, tag: &str, attributes: &[(String, String)]) -> Result<(), OrderError> {
        let borrowed: Vec<(&str, &str)> = attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        self.empty(tag, &borrowed)
    }

    fn text_element(&mut self, tag: &str, text: &str) -> Result<(), OrderError> {
        self.start(tag, &[])?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(|e| OrderError::Write(e.to_string()))?;
        self.end(tag)
    }

    fn end(&mut self, tag: &str) -> Result<(), OrderError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(tag)))
            .map_err(|e| OrderError::Write(e.to_string()))
    }

    fn finish(self) -> Result<String, OrderError> {
        let mut bytes = self.writer.into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes).map_err(|e| OrderError::Write(e.to_string()))
    }
}
