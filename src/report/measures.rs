//! Per-record decoders for the measure style reports.
//!
//! Each decoder reads one report element (one `S01`, `S02`, ... node) and
//! returns the normalized records it yields. A failed attribute conversion
//! abandons the whole record; the caller turns the error into a warning on
//! the owning entity and moves on to the next sibling.

use serde_json::{Map, Value};

use super::{
    int_attr, lenient_float, lenient_int, req_attr, season_attr, str_attr, tables, timestamp_attr,
    FieldError,
};
use crate::message::Node;

pub(super) type Record = Map<String, Value>;

/// Active/reactive energy registers, strict integers. `suffix` selects the
/// attribute family: `a` for absolute, `i` for incremental, empty for the
/// plain load-profile form.
fn active_reactive(node: &Node, suffix: &str) -> Result<Record, FieldError> {
    let mut record = Record::new();
    for (key, attr) in [
        ("ai", "AI"),
        ("ae", "AE"),
        ("r1", "R1"),
        ("r2", "R2"),
        ("r3", "R3"),
        ("r4", "R4"),
    ] {
        let value = int_attr(node, &format!("{}{}", attr, suffix))?;
        record.insert(key.to_string(), Value::from(value));
    }
    Ok(record)
}

/// Float variant of the register block, used by the load profiles (S02,
/// S52, S53) where concentrators report fractional kWh.
fn active_reactive_float(node: &Node, suffix: &str) -> Result<Record, FieldError> {
    let mut record = Record::new();
    for (key, attr) in [
        ("ai", "AI"),
        ("ae", "AE"),
        ("r1", "R1"),
        ("r2", "R2"),
        ("r3", "R3"),
        ("r4", "R4"),
    ] {
        let name = format!("{}{}", attr, suffix);
        let raw = req_attr(node, &name)?;
        let value = raw.parse::<f64>().map_err(|_| FieldError::BadFloat {
            name,
            value: raw.to_string(),
        })?;
        record.insert(key.to_string(), Value::from(value));
    }
    Ok(record)
}

fn phase_presence(node: &Node) -> Result<Value, FieldError> {
    let raw = req_attr(node, "PP")?;
    let phases: Vec<Value> = raw
        .split(',')
        .map(|p| Value::from(p.trim().parse::<i64>().unwrap_or(0)))
        .collect();
    Ok(Value::Array(phases))
}

pub(super) fn s01(node: &Node) -> Result<Vec<Record>, FieldError> {
    let mut record = active_reactive(node, "a")?;
    record.insert("timestamp".into(), Value::from(timestamp_attr(node, "Fh")?));
    record.insert("voltage".into(), Value::from(lenient_int(node, "L1v")?));
    record.insert("current".into(), Value::from(lenient_float(node, "L1i")?));
    record.insert(
        "active_power_import".into(),
        Value::from(lenient_int(node, "Pimp")?),
    );
    record.insert(
        "active_power_export".into(),
        Value::from(lenient_int(node, "Pexp")?),
    );
    record.insert(
        "reactive_power_import".into(),
        Value::from(lenient_int(node, "Qimp")?),
    );
    record.insert(
        "reactive_power_export".into(),
        Value::from(lenient_int(node, "Qexp")?),
    );
    record.insert("power_factor".into(), Value::from(lenient_float(node, "PF")?));
    record.insert("active_quadrant".into(), Value::from(lenient_int(node, "Ca")?));
    record.insert("phase_presence".into(), phase_presence(node)?);
    record.insert("meter_phase".into(), Value::from(lenient_int(node, "Fc")?));
    record.insert(
        "current_switch_state".into(),
        Value::from(lenient_int(node, "Eacti")?),
    );
    record.insert(
        "previous_switch_state".into(),
        Value::from(lenient_int(node, "Eanti")?),
    );
    Ok(vec![record])
}

pub(super) fn s21(node: &Node) -> Result<Vec<Record>, FieldError> {
    let mut record = active_reactive(node, "a")?;
    record.insert("timestamp".into(), Value::from(timestamp_attr(node, "Fh")?));
    record.insert("active_quadrant".into(), Value::from(lenient_int(node, "Ca")?));
    record.insert(
        "current_sum_3_phases".into(),
        Value::from(lenient_float(node, "I3")?),
    );
    for phase in 1..=3 {
        record.insert(
            format!("voltage{}", phase),
            Value::from(lenient_int(node, &format!("L{}v", phase))?),
        );
        record.insert(
            format!("current{}", phase),
            Value::from(lenient_float(node, &format!("L{}i", phase))?),
        );
        record.insert(
            format!("active_power_import{}", phase),
            Value::from(lenient_int(node, &format!("Pimp{}", phase))?),
        );
        record.insert(
            format!("active_power_export{}", phase),
            Value::from(lenient_int(node, &format!("Pexp{}", phase))?),
        );
        record.insert(
            format!("reactive_power_import{}", phase),
            Value::from(lenient_int(node, &format!("Qimp{}", phase))?),
        );
        record.insert(
            format!("reactive_power_export{}", phase),
            Value::from(lenient_int(node, &format!("Qexp{}", phase))?),
        );
        record.insert(
            format!("power_factor{}", phase),
            Value::from(lenient_float(node, &format!("PF{}", phase))?),
        );
        record.insert(
            format!("active_quadrant_phase{}", phase),
            Value::from(lenient_int(node, &format!("Ca{}", phase))?),
        );
    }
    record.insert("phase_presence".into(), phase_presence(node)?);
    record.insert("meter_phase".into(), Value::from(lenient_int(node, "Fc")?));
    record.insert(
        "current_switch_state".into(),
        Value::from(lenient_int(node, "Eacti")?),
    );
    record.insert(
        "previous_switch_state".into(),
        Value::from(lenient_int(node, "Eanti")?),
    );
    Ok(vec![record])
}

pub(super) fn s02(node: &Node) -> Result<Vec<Record>, FieldError> {
    let mut record = active_reactive_float(node, "")?;
    record.insert("timestamp".into(), Value::from(timestamp_attr(node, "Fh")?));
    record.insert("season".into(), Value::from(season_attr(node, "Fh")?));
    record.insert("bc".into(), str_attr(node, "Bc"));
    Ok(vec![record])
}

pub(super) fn s04(node: &Node) -> Result<Vec<Record>, FieldError> {
    let mut common = Record::new();
    common.insert("type".into(), Value::from("month"));
    common.insert("date_begin".into(), Value::from(timestamp_attr(node, "Fhi")?));
    common.insert("date_end".into(), Value::from(timestamp_attr(node, "Fhf")?));
    common.insert("contract".into(), Value::from(int_attr(node, "Ctr")?));
    common.insert("period".into(), Value::from(int_attr(node, "Pt")?));
    common.insert("max".into(), Value::from(int_attr(node, "Mx")?));
    common.insert("date_max".into(), Value::from(timestamp_attr(node, "Fx")?));

    let mut records = Vec::new();
    for value_node in node.children_named("Value") {
        // Absolute registers when present, incremental otherwise.
        let measure_type = if value_node.attr("AIa").is_some() { "a" } else { "i" };
        let mut record = common.clone();
        record.append(&mut active_reactive(value_node, measure_type)?);
        record.insert("value".into(), Value::from(measure_type));
        records.push(record);
    }
    Ok(records)
}

pub(super) fn s05(node: &Node) -> Result<Vec<Record>, FieldError> {
    let timestamp = timestamp_attr(node, "Fh")?;
    let mut common = Record::new();
    common.insert("type".into(), Value::from("day"));
    common.insert("value".into(), Value::from("a"));
    common.insert("date_begin".into(), Value::from(timestamp.clone()));
    common.insert("date_end".into(), Value::from(timestamp));
    common.insert("contract".into(), Value::from(int_attr(node, "Ctr")?));
    common.insert("period".into(), Value::from(int_attr(node, "Pt")?));

    let mut records = Vec::new();
    for value_node in node.children_named("Value") {
        let mut record = common.clone();
        record.append(&mut active_reactive(value_node, "a")?);
        records.push(record);
    }
    Ok(records)
}

pub(super) fn s27(node: &Node) -> Result<Vec<Record>, FieldError> {
    let timestamp = timestamp_attr(node, "Fh")?;
    let mut common = Record::new();
    common.insert("type".into(), Value::from("manual"));
    common.insert("value".into(), Value::from("a"));
    common.insert("date_begin".into(), Value::from(timestamp.clone()));
    common.insert("date_end".into(), Value::from(timestamp));
    common.insert("contract".into(), Value::from(int_attr(node, "Ctr")?));
    common.insert("period".into(), Value::from(int_attr(node, "Pt")?));
    common.insert("max".into(), Value::from(int_attr(node, "Mx")?));
    common.insert("date_max".into(), Value::from(timestamp_attr(node, "Fx")?));

    let mut records = Vec::new();
    for value_node in node.children_named("Value") {
        let mut record = common.clone();
        record.append(&mut active_reactive(value_node, "a")?);
        records.push(record);
    }
    Ok(records)
}

pub(super) fn s14(node: &Node) -> Result<Vec<Record>, FieldError> {
    let mut record = Record::new();
    for phase in 1..=3 {
        record.insert(
            format!("voltage{}", phase),
            Value::from(lenient_int(node, &format!("L{}v", phase))?),
        );
        record.insert(
            format!("current{}", phase),
            Value::from(lenient_float(node, &format!("L{}i", phase))?),
        );
    }
    record.insert("timestamp".into(), Value::from(timestamp_attr(node, "Fh")?));
    record.insert("season".into(), Value::from(season_attr(node, "Fh")?));
    record.insert("bc".into(), str_attr(node, "Bc"));
    record.insert("simp".into(), Value::from(int_attr(node, "Simp")?));
    record.insert("sexp".into(), Value::from(int_attr(node, "Sexp")?));
    Ok(vec![record])
}

pub(super) fn s18(node: &Node) -> Result<Vec<Record>, FieldError> {
    let mut record = Record::new();
    record.insert(
        "order_datetime".into(),
        Value::from(timestamp_attr(node, "Fh")?),
    );
    record.insert("orden".into(), Value::from(lenient_int(node, "Orden")?));
    Ok(vec![record])
}

/// Spontaneous event record, shared by the meter (S09, S13) and
/// concentrator (S15, S17) event reports.
pub(super) fn event(node: &Node) -> Result<Vec<Record>, FieldError> {
    let mut record = Record::new();
    record.insert("timestamp".into(), Value::from(timestamp_attr(node, "Fh")?));
    let group = int_attr(node, "Et")?;
    record.insert("event_group".into(), Value::from(group));
    if let Some(description) = u8::try_from(group)
        .ok()
        .and_then(tables::event_group_description)
    {
        record.insert("event_group_description".into(), Value::from(description));
    }
    record.insert("season".into(), Value::from(season_attr(node, "Fh")?));
    record.insert("event_code".into(), Value::from(int_attr(node, "C")?));

    let mut data: Vec<String> = node
        .children_named("D1")
        .map(|d| format!("D1: {}", d.text))
        .collect();
    data.extend(node.children_named("D2").map(|d| format!("D2: {}", d.text)));
    if !data.is_empty() {
        record.insert("data".into(), Value::from(data.join("\n")));
    }
    Ok(vec![record])
}

pub(super) fn s42(node: &Node) -> Result<Vec<Record>, FieldError> {
    let mut record = Record::new();
    record.insert("Fh".into(), Value::from(timestamp_attr(node, "Fh")?));
    record.insert("Operation".into(), str_attr(node, "Operation"));
    record.insert("obis".into(), str_attr(node, "obis"));
    record.insert("class".into(), str_attr(node, "class"));
    record.insert("element".into(), str_attr(node, "element"));
    record.insert("data".into(), str_attr(node, "data"));
    record.insert("result".into(), str_attr(node, "result"));
    Ok(vec![record])
}

pub(super) fn s52(node: &Node) -> Result<Vec<Record>, FieldError> {
    let mut record = active_reactive_float(node, "")?;
    record.insert("timestamp".into(), Value::from(timestamp_attr(node, "Fh")?));
    record.insert("bc".into(), str_attr(node, "Bc"));
    Ok(vec![record])
}

pub(super) fn s53(node: &Node) -> Result<Vec<Record>, FieldError> {
    let mut record = active_reactive_float(node, "")?;
    record.insert("timestamp".into(), Value::from(timestamp_attr(node, "Fh")?));
    record.insert("season".into(), Value::from(season_attr(node, "Fh")?));
    record.insert("bc".into(), str_attr(node, "Bc"));
    Ok(vec![record])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message;

    fn node(xml: &str) -> Node {
        message::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn test_s01_record() {
        let n = node(concat!(
            "<S01 Fh=\"20220301113000000W\" AIa=\"1500\" AEa=\"0\" R1a=\"20\" R2a=\"0\" ",
            "R3a=\"5\" R4a=\"0\" L1v=\"230\" L1i=\"1.5\" Pimp=\"350\" Pexp=\"0\" ",
            "Qimp=\"12\" Qexp=\"0\" PF=\"0.98\" Ca=\"1\" PP=\"1,0,0\" Fc=\"1\" ",
            "Eacti=\"1\" Eanti=\"0\"/>"
        ));
        let records = s01(&n).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r["ai"], 1500);
        assert_eq!(r["timestamp"], "2022-03-01 11:30:00");
        assert_eq!(r["voltage"], 230);
        assert_eq!(r["current"], 1.5);
        assert_eq!(r["power_factor"], 0.98);
        assert_eq!(r["phase_presence"], serde_json::json!([1, 0, 0]));
        assert_eq!(r["current_switch_state"], 1);
    }

    #[test]
    fn test_s01_unparsable_numeric_defaults_to_zero() {
        let n = node(concat!(
            "<S01 Fh=\"20220301113000000W\" AIa=\"1\" AEa=\"0\" R1a=\"0\" R2a=\"0\" ",
            "R3a=\"0\" R4a=\"0\" L1v=\"n/a\" L1i=\"\" Pimp=\"0\" Pexp=\"0\" Qimp=\"0\" ",
            "Qexp=\"0\" PF=\"0\" Ca=\"0\" PP=\"1\" Fc=\"0\" Eacti=\"0\" Eanti=\"0\"/>"
        ));
        let r = &s01(&n).unwrap()[0];
        assert_eq!(r["voltage"], 0);
        assert_eq!(r["current"], 0.0);
    }

    #[test]
    fn test_s01_bad_register_abandons_record() {
        let n = node(concat!(
            "<S01 Fh=\"20220301113000000W\" AIa=\"x\" AEa=\"0\" R1a=\"0\" R2a=\"0\" ",
            "R3a=\"0\" R4a=\"0\"/>"
        ));
        assert!(s01(&n).is_err());
    }

    #[test]
    fn test_s02_record() {
        let n = node(
            "<S02 Fh=\"20150831020000000S\" Bc=\"00\" AI=\"19\" AE=\"0\" \
             R1=\"11\" R2=\"0\" R3=\"0\" R4=\"0\"/>",
        );
        let r = &s02(&n).unwrap()[0];
        assert_eq!(r["ai"], 19.0);
        assert_eq!(r["r1"], 11.0);
        assert_eq!(r["timestamp"], "2015-08-31 02:00:00");
        assert_eq!(r["season"], "S");
        assert_eq!(r["bc"], "00");
    }

    #[test]
    fn test_s04_splits_absolute_and_incremental() {
        let n = node(concat!(
            "<S04 Fhi=\"20220201000000000W\" Fhf=\"20220301000000000W\" ",
            "Fx=\"20220215113000000W\" Ctr=\"1\" Pt=\"1\" Mx=\"4600\">",
            "<Value AIa=\"1000\" AEa=\"0\" R1a=\"5\" R2a=\"0\" R3a=\"0\" R4a=\"0\"/>",
            "<Value AIi=\"300\" AEi=\"0\" R1i=\"2\" R2i=\"0\" R3i=\"0\" R4i=\"0\"/>",
            "</S04>"
        ));
        let records = s04(&n).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["value"], "a");
        assert_eq!(records[0]["ai"], 1000);
        assert_eq!(records[0]["type"], "month");
        assert_eq!(records[0]["date_begin"], "2022-02-01 00:00:00");
        assert_eq!(records[1]["value"], "i");
        assert_eq!(records[1]["ai"], 300);
    }

    #[test]
    fn test_s05_day_billing() {
        let n = node(concat!(
            "<S05 Fh=\"20220301000000000W\" Ctr=\"1\" Pt=\"2\">",
            "<Value AIa=\"500\" AEa=\"0\" R1a=\"1\" R2a=\"0\" R3a=\"0\" R4a=\"0\"/>",
            "</S05>"
        ));
        let r = &s05(&n).unwrap()[0];
        assert_eq!(r["type"], "day");
        assert_eq!(r["value"], "a");
        assert_eq!(r["date_begin"], r["date_end"]);
        assert_eq!(r["period"], 2);
        assert_eq!(r["ai"], 500);
    }

    #[test]
    fn test_event_with_data_lines() {
        let n = node(concat!(
            "<S09 Fh=\"20220301113000000W\" Et=\"1\" C=\"34\">",
            "<D1>breaker open</D1><D2>phase 1</D2>",
            "</S09>"
        ));
        let r = &event(&n).unwrap()[0];
        assert_eq!(r["event_group"], 1);
        assert_eq!(r["event_group_description"], "Standard events");
        assert_eq!(r["event_code"], 34);
        assert_eq!(r["season"], "W");
        assert_eq!(r["data"], "D1: breaker open\nD2: phase 1");
    }

    #[test]
    fn test_event_without_data_omits_key() {
        let n = node("<S13 Fh=\"20220301113000000W\" Et=\"2\" C=\"1\"/>");
        let r = &event(&n).unwrap()[0];
        assert!(!r.contains_key("data"));
    }

    #[test]
    fn test_event_unknown_group_has_no_description() {
        let n = node("<S13 Fh=\"20220301113000000W\" Et=\"99\" C=\"1\"/>");
        let r = &event(&n).unwrap()[0];
        assert!(!r.contains_key("event_group_description"));
    }

    #[test]
    fn test_s42_operation_trace() {
        let n = node(concat!(
            "<S42 Fh=\"20220301113000000W\" Operation=\"SET\" obis=\"0.1.94.34.11.255\" ",
            "class=\"3\" element=\"2\" data=\"raw{060000141E}\" result=\"OK\"/>"
        ));
        let r = &s42(&n).unwrap()[0];
        assert_eq!(r["Fh"], "2022-03-01 11:30:00");
        assert_eq!(r["Operation"], "SET");
        assert_eq!(r["result"], "OK");
    }

    #[test]
    fn test_s52_and_s53_records() {
        let xml = "<S52 Fh=\"20220301020000000W\" Bc=\"00\" AI=\"7.5\" AE=\"0\" \
                   R1=\"0\" R2=\"0\" R3=\"0\" R4=\"0\"/>";
        let r = &s52(&node(xml)).unwrap()[0];
        assert_eq!(r["ai"], 7.5);
        assert!(!r.contains_key("season"));

        let xml = xml.replace("S52", "S53");
        let r = &s53(&node(&xml)).unwrap()[0];
        assert_eq!(r["season"], "W");
    }

    #[test]
    fn test_s14_average_profile() {
        let n = node(concat!(
            "<S14 Fh=\"20220301020000000W\" Bc=\"00\" Simp=\"10\" Sexp=\"0\" ",
            "L1v=\"231\" L1i=\"1.2\" L2v=\"229\" L2i=\"1.1\" L3v=\"230\" L3i=\"0.9\"/>"
        ));
        let r = &s14(&n).unwrap()[0];
        assert_eq!(r["voltage2"], 229);
        assert_eq!(r["current3"], 0.9);
        assert_eq!(r["simp"], 10);
    }

    #[test]
    fn test_s18_order_report() {
        let n = node("<S18 Fh=\"20220301113000000W\" Orden=\"3\"/>");
        let r = &s18(&n).unwrap()[0];
        assert_eq!(r["order_datetime"], "2022-03-01 11:30:00");
        assert_eq!(r["orden"], 3);
    }
}
