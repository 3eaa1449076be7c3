//! Report decoding.
//!
//! A report is one XML document sent by a concentrator: a `Report` root
//! carrying `Cnc` (concentrator) elements, which carry `Cnt` (meter)
//! elements, which carry one element per record (`S02`, `S04`, ...). The
//! supervision reports S52/S53 use an `Rtu` / `LVSLine` hierarchy instead.
//!
//! Decoding is isolate-and-continue: a record that fails to convert is
//! dropped and replaced by a warning string on its owning concentrator,
//! and every sibling record and sibling entity still decodes. Only an
//! unknown report code is a hard error.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::message::{self, MessageError, Node};
use crate::octet::{self, OctetError};

pub mod measures;
pub mod parameters;
pub mod tables;

pub use tables::{is_supported, SUPPORTED_REPORTS};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("report type not implemented: {0}")]
    NotImplemented(String),
    #[error(transparent)]
    Message(#[from] MessageError),
}

/// A single failed attribute conversion. Never escapes a decode call as an
/// error; the walkers turn it into a warning on the owning entity.
#[derive(Error, Debug)]
pub enum FieldError {
    #[error("missing attribute {0}")]
    MissingAttr(String),
    #[error("invalid integer {name}=\"{value}\"")]
    BadInt { name: String, value: String },
    #[error("invalid float {name}=\"{value}\"")]
    BadFloat { name: String, value: String },
    #[error(transparent)]
    Octet(#[from] OctetError),
}

pub(crate) fn req_attr<'a>(node: &'a Node, name: &str) -> Result<&'a str, FieldError> {
    node.attr(name)
        .ok_or_else(|| FieldError::MissingAttr(name.to_string()))
}

/// Strict integer attribute.
pub(crate) fn int_attr(node: &Node, name: &str) -> Result<i64, FieldError> {
    let raw = req_attr(node, name)?;
    raw.trim().parse().map_err(|_| FieldError::BadInt {
        name: name.to_string(),
        value: raw.to_string(),
    })
}

/// Integer attribute that must be present but tolerates garbage values,
/// decoding them as 0. Concentrators routinely pad these fields.
pub(crate) fn lenient_int(node: &Node, name: &str) -> Result<i64, FieldError> {
    Ok(req_attr(node, name)?.trim().parse().unwrap_or(0))
}

pub(crate) fn lenient_float(node: &Node, name: &str) -> Result<f64, FieldError> {
    Ok(req_attr(node, name)?.trim().parse().unwrap_or(0.0))
}

/// Fully optional integer: absent or unparsable decodes to 0.
pub(crate) fn opt_int(node: &Node, name: &str) -> i64 {
    node.attr(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

/// Absent decodes to 0, a present value must parse.
pub(crate) fn to_integer(node: &Node, name: &str) -> Result<i64, FieldError> {
    match node.attr(name) {
        None => Ok(0),
        Some(raw) => raw.trim().parse().map_err(|_| FieldError::BadInt {
            name: name.to_string(),
            value: raw.to_string(),
        }),
    }
}

/// `Y` is true, anything else (including absent) is false.
pub(crate) fn bool_attr(node: &Node, name: &str) -> bool {
    node.attr(name) == Some("Y")
}

/// String attribute, `null` when absent.
pub(crate) fn str_attr(node: &Node, name: &str) -> Value {
    match node.attr(name) {
        Some(value) => Value::from(value),
        None => Value::Null,
    }
}

/// Wire timestamp attribute, normalized to `%Y-%m-%d %H:%M:%S`.
pub(crate) fn timestamp_attr(node: &Node, name: &str) -> Result<String, FieldError> {
    let (datetime, _) = octet::parse_timestamp(req_attr(node, name)?)?;
    Ok(datetime.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Season flag: the trailing character of a wire timestamp attribute.
pub(crate) fn season_attr(node: &Node, name: &str) -> Result<String, FieldError> {
    let raw = req_attr(node, name)?;
    Ok(raw.chars().last().map(String::from).unwrap_or_default())
}

/// Decoded records and warnings of one concentrator (or, for S52/S53, one
/// remote terminal unit).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConcentratorRecords {
    pub name: String,
    pub values: Vec<Value>,
    pub warnings: Vec<String>,
}

type MeasureDecoder = fn(&Node) -> Result<Vec<measures::Record>, FieldError>;

/// A decoded report document.
pub struct Report {
    root: Node,
}

impl Report {
    /// Parses a raw payload (plain or gzip compressed XML) into a report.
    pub fn from_bytes(raw: &[u8]) -> Result<Report, ReportError> {
        Ok(Report::from_node(message::parse(raw)?))
    }

    pub fn from_node(root: Node) -> Report {
        Report { root }
    }

    /// The report code (`IdRpt` attribute).
    pub fn report_type(&self) -> &str {
        self.root.attr("IdRpt").unwrap_or("")
    }

    /// The STG-DC protocol version (`Version` attribute).
    pub fn report_version(&self) -> &str {
        self.root.attr("Version").unwrap_or("")
    }

    /// The request this report answers (`IdPet` attribute).
    pub fn request_id(&self) -> &str {
        self.root.attr("IdPet").unwrap_or("")
    }

    pub fn supported(&self) -> bool {
        tables::is_supported(self.report_type())
    }

    /// Decodes every concentrator (or remote terminal unit) of the report.
    pub fn concentrators(&self) -> Result<Vec<ConcentratorRecords>, ReportError> {
        match self.report_type() {
            "S01" => Ok(self.meter_measures(true, measures::s01)),
            "S02" => Ok(self.meter_measures(true, measures::s02)),
            "S04" => Ok(self.meter_measures(true, measures::s04)),
            "S05" => Ok(self.meter_measures(true, measures::s05)),
            "S06" => Ok(self.meter_configurations()),
            "S09" | "S13" => Ok(self.meter_measures(false, measures::event)),
            "S12" => Ok(self.concentrator_configurations()),
            "S14" => Ok(self.meter_measures(false, measures::s14)),
            "S15" | "S17" => Ok(self.concentrator_events()),
            "S18" => Ok(self.meter_measures(true, measures::s18)),
            "S21" => Ok(self.meter_measures(true, measures::s21)),
            "S23" => Ok(self.meter_calendars()),
            "S24" => Ok(self.meter_availability()),
            "S27" => Ok(self.meter_measures(true, measures::s27)),
            "S42" => Ok(self.meter_measures(false, measures::s42)),
            "S52" => Ok(self.line_supervisors(measures::s52)),
            "S53" => Ok(self.line_supervisors(measures::s53)),
            other => Err(ReportError::NotImplemented(other.to_string())),
        }
    }

    /// All decoded records of the report, flattened across entities.
    pub fn values(&self) -> Result<Vec<Value>, ReportError> {
        Ok(self
            .concentrators()?
            .into_iter()
            .flat_map(|c| c.values)
            .collect())
    }

    /// All warnings of the report, flattened across entities.
    pub fn warnings(&self) -> Result<Vec<String>, ReportError> {
        Ok(self
            .concentrators()?
            .into_iter()
            .flat_map(|c| c.warnings)
            .collect())
    }

    /// Meter walk shared by the measure style reports. Records are tagged
    /// with the meter and concentrator names, and with the meter's `Magn`
    /// scale when the report carries one.
    fn meter_measures(&self, with_magnitude: bool, decode: MeasureDecoder) -> Vec<ConcentratorRecords> {
        let tag = self.report_type();
        let mut out = Vec::new();
        for cnc in self.root.children_named("Cnc") {
            let cnc_name = cnc.attr("Id").unwrap_or_default().to_string();
            let mut records = ConcentratorRecords {
                name: cnc_name.clone(),
                ..ConcentratorRecords::default()
            };
            for meter in cnc.children_named("Cnt") {
                let meter_name = meter.attr("Id").unwrap_or_default();
                // A device-reported fault replaces the measures; not a
                // decode failure, so no warning either.
                if meter.attr("ErrCat").is_some() {
                    continue;
                }
                let magnitude = if with_magnitude {
                    match int_attr(meter, "Magn") {
                        Ok(magnitude) => Some(magnitude),
                        Err(err) => {
                            records.warnings.push(meter_warning(&cnc_name, meter_name, &err));
                            continue;
                        }
                    }
                } else {
                    None
                };
                for node in meter.children_named(tag) {
                    match decode(node) {
                        Ok(decoded) => {
                            for mut record in decoded {
                                record.insert("name".into(), Value::from(meter_name));
                                record.insert("cnc_name".into(), Value::from(cnc_name.as_str()));
                                if let Some(magnitude) = magnitude {
                                    record.insert("magn".into(), Value::from(magnitude));
                                }
                                records.values.push(Value::Object(record));
                            }
                        }
                        Err(err) => records
                            .warnings
                            .push(meter_warning(&cnc_name, meter_name, &err)),
                    }
                }
            }
            out.push(records);
        }
        out
    }

    fn meter_configurations(&self) -> Vec<ConcentratorRecords> {
        let mut out = Vec::new();
        for cnc in self.root.children_named("Cnc") {
            let cnc_name = cnc.attr("Id").unwrap_or_default().to_string();
            let mut records = ConcentratorRecords {
                name: cnc_name.clone(),
                ..ConcentratorRecords::default()
            };
            for meter in cnc.children_named("Cnt") {
                let meter_name = meter.attr("Id").unwrap_or_default();
                if meter.attr("ErrCat").is_some() {
                    continue;
                }
                for node in meter.children_named("S06") {
                    match parameters::s06(node) {
                        Ok(mut record) => {
                            record.insert("request_id".into(), Value::from(self.request_id()));
                            record.insert("version".into(), Value::from(self.report_version()));
                            record.insert("concentrator".into(), Value::from(cnc_name.as_str()));
                            record.insert("meter".into(), Value::from(meter_name));
                            records.values.push(Value::Object(record));
                        }
                        Err(err) => records
                            .warnings
                            .push(meter_warning(&cnc_name, meter_name, &err)),
                    }
                }
            }
            out.push(records);
        }
        out
    }

    fn meter_calendars(&self) -> Vec<ConcentratorRecords> {
        let mut out = Vec::new();
        for cnc in self.root.children_named("Cnc") {
            let cnc_name = cnc.attr("Id").unwrap_or_default().to_string();
            let mut records = ConcentratorRecords {
                name: cnc_name.clone(),
                ..ConcentratorRecords::default()
            };
            for meter in cnc.children_named("Cnt") {
                let meter_name = meter.attr("Id").unwrap_or_default();
                if meter.attr("ErrCat").is_some() {
                    continue;
                }
                for node in meter.children_named("S23") {
                    match parameters::s23(node) {
                        Ok(record) => records.values.push(Value::Object(record)),
                        Err(err) => records
                            .warnings
                            .push(meter_warning(&cnc_name, meter_name, &err)),
                    }
                }
            }
            out.push(records);
        }
        out
    }

    fn concentrator_configurations(&self) -> Vec<ConcentratorRecords> {
        let version = self.report_version();
        self.concentrator_walk("S12", |node| parameters::s12(node, version))
    }

    fn meter_availability(&self) -> Vec<ConcentratorRecords> {
        self.concentrator_walk("S24", parameters::s24)
    }

    fn concentrator_events(&self) -> Vec<ConcentratorRecords> {
        self.concentrator_walk(self.report_type(), |node| {
            measures::event(node).map(|mut decoded| decoded.pop().unwrap_or_default())
        })
    }

    /// Walk for reports whose records hang directly off the concentrator.
    /// The concentrator name is patched into the record after decode.
    fn concentrator_walk<F>(&self, tag: &str, decode: F) -> Vec<ConcentratorRecords>
    where
        F: Fn(&Node) -> Result<parameters::Record, FieldError>,
    {
        let mut out = Vec::new();
        for cnc in self.root.children_named("Cnc") {
            let cnc_name = cnc.attr("Id").unwrap_or_default().to_string();
            let mut records = ConcentratorRecords {
                name: cnc_name.clone(),
                ..ConcentratorRecords::default()
            };
            for node in cnc.children_named(tag) {
                match decode(node) {
                    Ok(mut record) => {
                        match tag {
                            "S24" => {
                                record.insert("cnc_name".into(), Value::from(cnc_name.as_str()));
                            }
                            "S15" | "S17" => {
                                record.insert("name".into(), Value::from(cnc_name.as_str()));
                            }
                            _ => {}
                        }
                        records.values.push(Value::Object(record));
                    }
                    Err(err) => records
                        .warnings
                        .push(format!("ERROR: Cnc({}): {}", cnc_name, err)),
                }
            }
            out.push(records);
        }
        out
    }

    /// Rtu / LVSLine walk for the supervision reports.
    fn line_supervisors(&self, decode: MeasureDecoder) -> Vec<ConcentratorRecords> {
        let tag = self.report_type();
        let mut out = Vec::new();
        for rtu in self.root.children_named("Rtu") {
            let rtu_name = rtu.attr("Id").unwrap_or_default().to_string();
            let mut records = ConcentratorRecords {
                name: rtu_name.clone(),
                ..ConcentratorRecords::default()
            };
            for line in rtu.children_named("LVSLine") {
                let line_name = line.attr("Id").unwrap_or_default();
                let magnitude = match int_attr(line, "Magn") {
                    Ok(magnitude) => magnitude,
                    Err(err) => {
                        records
                            .warnings
                            .push(line_warning(&rtu_name, line_name, &err));
                        continue;
                    }
                };
                for node in line.children_named(tag) {
                    match decode(node) {
                        Ok(decoded) => {
                            for mut record in decoded {
                                record.insert("name".into(), Value::from(line_name));
                                record
                                    .insert("rt_unit_name".into(), Value::from(rtu_name.as_str()));
                                record.insert("magn".into(), Value::from(magnitude));
                                records.values.push(Value::Object(record));
                            }
                        }
                        Err(err) => records
                            .warnings
                            .push(line_warning(&rtu_name, line_name, &err)),
                    }
                }
            }
            out.push(records);
        }
        out
    }
}

fn meter_warning(cnc_name: &str, meter_name: &str, err: &FieldError) -> String {
    format!("ERROR: Cnc({}), Meter({}): {}", cnc_name, meter_name, err)
}

fn line_warning(rtu_name: &str, line_name: &str, err: &FieldError) -> String {
    format!("ERROR: Rtu({}), Line({}): {}", rtu_name, line_name, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    const S02_SAMPLE: &str = concat!(
        "<?xml version='1.0' encoding='UTF-8'?>\n",
        "<Report IdRpt=\"S02\" IdPet=\"0\" Version=\"3.1c\">",
        "<Cnc Id=\"ZIV0000035605\">",
        "<Cnt Id=\"ZIV0036301516\" Magn=\"1\">",
        "<S02 Fh=\"20150831020000000S\" Bc=\"00\" AI=\"19\" AE=\"0\" ",
        "R1=\"11\" R2=\"0\" R3=\"0\" R4=\"0\"/>",
        "<S02 Fh=\"20150831030000000S\" Bc=\"00\" AI=\"23\" AE=\"0\" ",
        "R1=\"9\" R2=\"0\" R3=\"0\" R4=\"0\"/>",
        "</Cnt>",
        "</Cnc>",
        "</Report>"
    );

    #[test]
    fn test_s02_first_record() {
        let report = Report::from_bytes(S02_SAMPLE.as_bytes()).unwrap();
        assert_eq!(report.report_type(), "S02");
        assert_eq!(report.report_version(), "3.1c");
        assert_eq!(report.request_id(), "0");
        assert!(report.supported());

        let values = report.values().unwrap();
        assert_eq!(values.len(), 2);
        let first = &values[0];
        assert_eq!(first["ai"], 19.0);
        assert_eq!(first["ae"], 0.0);
        assert_eq!(first["r1"], 11.0);
        assert_eq!(first["r2"], 0.0);
        assert_eq!(first["r3"], 0.0);
        assert_eq!(first["r4"], 0.0);
        assert_eq!(first["season"], "S");
        assert_eq!(first["bc"], "00");
        assert_eq!(first["magn"], 1);
        assert_eq!(first["timestamp"], "2015-08-31 02:00:00");
        assert_eq!(first["name"], "ZIV0036301516");
        assert_eq!(first["cnc_name"], "ZIV0000035605");
    }

    #[test]
    fn test_one_bad_meter_yields_one_warning() {
        let xml = concat!(
            "<Report IdRpt=\"S02\" IdPet=\"0\" Version=\"3.1c\">",
            "<Cnc Id=\"CNC1\">",
            "<Cnt Id=\"GOOD\" Magn=\"1\">",
            "<S02 Fh=\"20150831020000000S\" Bc=\"00\" AI=\"19\" AE=\"0\" ",
            "R1=\"11\" R2=\"0\" R3=\"0\" R4=\"0\"/>",
            "</Cnt>",
            "<Cnt Id=\"BAD\" Magn=\"1\">",
            "<S02 Fh=\"20150831020000000S\" Bc=\"00\" AI=\"junk\" AE=\"0\" ",
            "R1=\"0\" R2=\"0\" R3=\"0\" R4=\"0\"/>",
            "</Cnt>",
            "</Cnc>",
            "</Report>"
        );
        let report = Report::from_bytes(xml.as_bytes()).unwrap();
        let concentrators = report.concentrators().unwrap();
        assert_eq!(concentrators.len(), 1);
        assert_eq!(concentrators[0].values.len(), 1);
        assert_eq!(concentrators[0].warnings.len(), 1);
        assert!(concentrators[0].warnings[0].contains("Meter(BAD)"));
        assert_eq!(concentrators[0].values[0]["name"], "GOOD");
    }

    #[test]
    fn test_multibyte_timestamp_garbage_yields_warning() {
        let xml = concat!(
            "<Report IdRpt=\"S02\" IdPet=\"0\" Version=\"3.1c\">",
            "<Cnc Id=\"CNC1\">",
            "<Cnt Id=\"MTR1\" Magn=\"1\">",
            "<S02 Fh=\"1234567890123\u{20ac}\" Bc=\"00\" AI=\"19\" AE=\"0\" ",
            "R1=\"11\" R2=\"0\" R3=\"0\" R4=\"0\"/>",
            "</Cnt>",
            "</Cnc>",
            "</Report>"
        );
        let report = Report::from_bytes(xml.as_bytes()).unwrap();
        let concentrators = report.concentrators().unwrap();
        assert!(concentrators[0].values.is_empty());
        assert_eq!(concentrators[0].warnings.len(), 1);
        assert!(concentrators[0].warnings[0].contains("Meter(MTR1)"));
    }

    #[test]
    fn test_meter_with_device_error_yields_nothing() {
        let xml = concat!(
            "<Report IdRpt=\"S02\" IdPet=\"0\" Version=\"3.1c\">",
            "<Cnc Id=\"CNC1\">",
            "<Cnt Id=\"FAULTY\" ErrCat=\"2\" ErrCode=\"7\"/>",
            "</Cnc>",
            "</Report>"
        );
        let report = Report::from_bytes(xml.as_bytes()).unwrap();
        let concentrators = report.concentrators().unwrap();
        assert!(concentrators[0].values.is_empty());
        assert!(concentrators[0].warnings.is_empty());
    }

    #[test]
    fn test_unsupported_report_type() {
        let report = Report::from_bytes(b"<Report IdRpt=\"S99\" IdPet=\"0\"/>").unwrap();
        assert!(!report.supported());
        assert!(matches!(
            report.concentrators(),
            Err(ReportError::NotImplemented(code)) if code == "S99"
        ));
    }

    #[test]
    fn test_s52_remote_terminal_unit_walk() {
        let xml = concat!(
            "<Report IdRpt=\"S52\" IdPet=\"0\" Version=\"3.1c\">",
            "<Rtu Id=\"RTU001\">",
            "<LVSLine Id=\"LINE1\" Magn=\"1\">",
            "<S52 Fh=\"20220301020000000W\" Bc=\"00\" AI=\"7.5\" AE=\"0\" ",
            "R1=\"0\" R2=\"0\" R3=\"0\" R4=\"0\"/>",
            "</LVSLine>",
            "</Rtu>",
            "</Report>"
        );
        let report = Report::from_bytes(xml.as_bytes()).unwrap();
        let units = report.concentrators().unwrap();
        assert_eq!(units[0].name, "RTU001");
        let record = &units[0].values[0];
        assert_eq!(record["name"], "LINE1");
        assert_eq!(record["rt_unit_name"], "RTU001");
        assert_eq!(record["magn"], 1);
        assert_eq!(record["ai"], 7.5);
    }

    #[test]
    fn test_s17_concentrator_events() {
        let xml = concat!(
            "<Report IdRpt=\"S17\" IdPet=\"5\" Version=\"3.1c\">",
            "<Cnc Id=\"CNC1\">",
            "<S17 Fh=\"20220301113000000W\" Et=\"5\" C=\"3\"><D1>restart</D1></S17>",
            "<S17 Fh=\"20220301120000000W\" Et=\"bad\" C=\"3\"/>",
            "</Cnc>",
            "</Report>"
        );
        let report = Report::from_bytes(xml.as_bytes()).unwrap();
        let concentrators = report.concentrators().unwrap();
        assert_eq!(concentrators[0].values.len(), 1);
        assert_eq!(concentrators[0].warnings.len(), 1);
        let record = &concentrators[0].values[0];
        assert_eq!(record["name"], "CNC1");
        assert_eq!(record["event_group"], 5);
        assert_eq!(record["event_group_description"], "Common events");
        assert_eq!(record["data"], "D1: restart");
    }

    #[test]
    fn test_s24_gets_concentrator_name() {
        let xml = concat!(
            "<Report IdRpt=\"S24\" IdPet=\"0\" Version=\"3.1c\">",
            "<Cnc Id=\"CNC1\">",
            "<S24 Fh=\"20220301113000000W\">",
            "<Meter Id=\"MTR1\" O=\"Y\"/>",
            "</S24>",
            "</Cnc>",
            "</Report>"
        );
        let report = Report::from_bytes(xml.as_bytes()).unwrap();
        let record = &report.values().unwrap()[0];
        assert_eq!(record["cnc_name"], "CNC1");
        assert_eq!(record["meters"][0]["name"], "MTR1");
    }

    #[test]
    fn test_s06_context_fields() {
        let xml = concat!(
            "<Report IdRpt=\"S06\" IdPet=\"42\" Version=\"3.1c\">",
            "<Cnc Id=\"CNC1\">",
            "<Cnt Id=\"MTR1\">",
            "<S06 Fh=\"20220301113000000W\" NS=\"MTR1\" Af=\"2015\" Tp=\"1\" Ts=\"1\" ",
            "Ip=\"1\" Is=\"1\" Usag=\"0\" Uswell=\"0\" Per=\"3600\" Vr=\"230\" Ut=\"0\" ",
            "ScrollDispTime=\"5\"/>",
            "</Cnt>",
            "</Cnc>",
            "</Report>"
        );
        let report = Report::from_bytes(xml.as_bytes()).unwrap();
        let record = &report.values().unwrap()[0];
        assert_eq!(record["request_id"], "42");
        assert_eq!(record["version"], "3.1c");
        assert_eq!(record["concentrator"], "CNC1");
        assert_eq!(record["meter"], "MTR1");
    }
}
