//! Per-record decoders for the parameter style reports (S06, S12, S23,
//! S24): configuration snapshots rather than measure series.

use serde_json::{Map, Value};

use super::{
    bool_attr, int_attr, lenient_int, opt_int, req_attr, season_attr, str_attr, timestamp_attr,
    to_integer, FieldError,
};
use crate::message::Node;
use crate::octet::{octet_to_name, octet_to_number};

pub(super) type Record = Map<String, Value>;

/// Meter configuration snapshot. The caller injects the request id, report
/// version and the concentrator/meter names.
pub(super) fn s06(node: &Node) -> Result<Record, FieldError> {
    let mut record = Record::new();
    record.insert("timestamp".into(), Value::from(timestamp_attr(node, "Fh")?));
    record.insert("season".into(), Value::from(season_attr(node, "Fh")?));
    record.insert("serial_number".into(), str_attr(node, "NS"));
    record.insert("manufacturer".into(), str_attr(node, "Fab"));
    record.insert("model_type".into(), str_attr(node, "Mod"));
    record.insert(
        "manufacturing_year".into(),
        Value::from(lenient_int(node, "Af")?),
    );
    record.insert("equipment_type".into(), str_attr(node, "Te"));
    record.insert("firmware_version".into(), str_attr(node, "Vf"));
    record.insert("prime_firmware_version".into(), str_attr(node, "VPrime"));
    record.insert("protocol".into(), str_attr(node, "Pro"));
    record.insert("id_multicast".into(), str_attr(node, "Idm"));
    record.insert("mac".into(), str_attr(node, "Mac"));
    record.insert("primary_voltage".into(), Value::from(lenient_int(node, "Tp")?));
    record.insert(
        "secondary_voltage".into(),
        Value::from(lenient_int(node, "Ts")?),
    );
    record.insert("primary_current".into(), Value::from(lenient_int(node, "Ip")?));
    record.insert(
        "secondary_current".into(),
        Value::from(lenient_int(node, "Is")?),
    );
    record.insert(
        "time_threshold_voltage_sags".into(),
        Value::from(lenient_int(node, "Usag")?),
    );
    record.insert(
        "time_threshold_voltage_swells".into(),
        Value::from(lenient_int(node, "Uswell")?),
    );
    record.insert(
        "load_profile_period".into(),
        Value::from(lenient_int(node, "Per")?),
    );
    record.insert("demand_close_contracted_power".into(), str_attr(node, "Dctcp"));
    record.insert(
        "reference_voltage".into(),
        Value::from(lenient_int(node, "Vr")?),
    );
    record.insert(
        "long_power_failure_threshold".into(),
        Value::from(lenient_int(node, "Ut")?),
    );
    record.insert("voltage_sag_threshold".into(), str_attr(node, "UsubT"));
    record.insert("voltage_swell_threshold".into(), str_attr(node, "UsobT"));
    record.insert("voltage_cut-off_threshold".into(), str_attr(node, "UcorteT"));
    record.insert(
        "automatic_monthly_billing".into(),
        Value::from(bool_attr(node, "AutMothBill")),
    );
    record.insert("scroll_display_mode".into(), str_attr(node, "ScrollDispMode"));
    record.insert(
        "time_scroll_display".into(),
        Value::from(lenient_int(node, "ScrollDispTime")?),
    );
    Ok(record)
}

/// Concentrator configuration snapshot, the widest record of the family.
pub(super) fn s12(node: &Node, report_version: &str) -> Result<Record, FieldError> {
    // Key renamed between STG-DC 3.1 and 3.1c firmwares.
    let fwmtup_timeout_key = if report_version == "3.1c" {
        "TimeOutMeterFwU"
    } else {
        "TimeOutPrimeFwU"
    };
    // Ormazabal concentrators report IPftp1 instead of IPftp.
    let rpt_ftp_ip_key = if node.attr("IPftp").is_some() {
        "IPftp"
    } else {
        "IPftp1"
    };

    let mut record = Record::new();
    record.insert("date".into(), Value::from(timestamp_attr(node, "Fh")?));
    record.insert("model".into(), str_attr(node, "Mod"));
    record.insert("mf_year".into(), str_attr(node, "Af"));
    record.insert("type".into(), str_attr(node, "Te"));
    record.insert("w_password".into(), str_attr(node, "DCPwdAdm"));
    record.insert("r_password".into(), str_attr(node, "DCPwdRead"));
    record.insert("fw_version".into(), str_attr(node, "Vf"));
    record.insert("fw_comm_version".into(), str_attr(node, "VfComm"));
    record.insert("protocol".into(), str_attr(node, "Pro"));
    record.insert("communication".into(), str_attr(node, "Com"));
    record.insert("battery_mon".into(), str_attr(node, "Bat"));
    record.insert("ip_address".into(), str_attr(node, "ipCom"));
    record.insert("dc_ws_port".into(), str_attr(node, "PortWS"));
    record.insert("ip_mask".into(), str_attr(node, "ipMask"));
    record.insert("ip_gtw".into(), str_attr(node, "ipGtw"));
    record.insert("dhcp".into(), Value::from(bool_attr(node, "ipDhcp")));
    record.insert("slave1".into(), str_attr(node, "Slave1"));
    record.insert("slave2".into(), str_attr(node, "Slave2"));
    record.insert("slave3".into(), str_attr(node, "Slave3"));
    record.insert("local_ip_address".into(), str_attr(node, "ipLoc"));
    record.insert("local_ip_mask".into(), str_attr(node, "ipMaskLoc"));
    record.insert("plc_mac".into(), str_attr(node, "Macplc"));
    record.insert("serial_port_speed".into(), str_attr(node, "Pse"));
    record.insert("priority".into(), Value::from(bool_attr(node, "Priority")));
    record.insert("stg_ws_ip_address".into(), str_attr(node, "IPstg"));
    record.insert("stg_ws_password".into(), str_attr(node, "stgPwd"));
    record.insert("ntp_ip_address".into(), str_attr(node, "IPNTP"));
    record.insert("rpt_ftp_ip_address".into(), str_attr(node, rpt_ftp_ip_key));
    record.insert("rpt_ftp_user".into(), str_attr(node, "FTPUserReport"));
    record.insert("rpt_ftp_password".into(), str_attr(node, "FTPPwdReport"));
    record.insert("fwdcup_ftp_ip_address".into(), str_attr(node, "IPftpDCUpg"));
    record.insert("fwdcup_ftp_user".into(), str_attr(node, "UserftpDCUpg"));
    record.insert("fwdcup_ftp_password".into(), str_attr(node, "PwdftpDCUpg"));
    record.insert("fwmtup_ftp_ip_address".into(), str_attr(node, "IPftpMeterUpg"));
    record.insert("fwmtup_ftp_user".into(), str_attr(node, "UserftpMeterUpg"));
    record.insert("fwmtup_ftp_password".into(), str_attr(node, "PwdftpMeterUpg"));
    record.insert("retries".into(), Value::from(int_attr(node, "RetryFtp")?));
    record.insert(
        "time_btw_retries".into(),
        Value::from(int_attr(node, "TimeBetwFtp")?),
    );
    record.insert("cycle_ftp_ip_address".into(), str_attr(node, "IPftpCycles"));
    record.insert("cycle_ftp_user".into(), str_attr(node, "UserftpCycles"));
    record.insert("cycle_ftp_password".into(), str_attr(node, "PwdftpCycles"));
    record.insert("cycle_ftp_dir".into(), str_attr(node, "DestDirCycles"));
    record.insert("sync_meter".into(), Value::from(bool_attr(node, "SyncMeter")));
    record.insert(
        "fwmtup_timeout".into(),
        Value::from(to_integer(node, fwmtup_timeout_key)?),
    );
    record.insert(
        "max_time_deviation".into(),
        Value::from(int_attr(node, "TimeDevOver")?),
    );
    record.insert(
        "min_time_deviation".into(),
        Value::from(int_attr(node, "TimeDev")?),
    );
    record.insert("reset_msg".into(), Value::from(bool_attr(node, "ResetMsg")));
    record.insert(
        "rpt_meter_limit".into(),
        Value::from(int_attr(node, "NumMeters")?),
    );
    record.insert(
        "rpt_time_limit".into(),
        Value::from(int_attr(node, "TimeSendReq")?),
    );
    record.insert(
        "disconn_time".into(),
        Value::from(int_attr(node, "TimeDisconMeter")?),
    );
    record.insert(
        "disconn_retries".into(),
        Value::from(int_attr(node, "RetryDisconMeter")?),
    );
    record.insert(
        "disconn_retry_interval".into(),
        Value::from(int_attr(node, "TimeRetryInterval")?),
    );
    record.insert("meter_reg_data".into(), str_attr(node, "MeterRegData"));
    record.insert("report_format".into(), str_attr(node, "ReportFormat"));
    record.insert("s26_content".into(), str_attr(node, "S26Content"));
    record.insert(
        "values_check_delay".into(),
        Value::from(int_attr(node, "ValuesCheckDelay")?),
    );
    record.insert(
        "max_order_outdate".into(),
        Value::from(to_integer(node, "MaxOrderOutdate")?),
    );
    record.insert(
        "restart_delay".into(),
        Value::from(to_integer(node, "TimeDelayRestart")?),
    );
    record.insert(
        "ntp_max_deviation".into(),
        Value::from(opt_int(node, "NTPMaxDeviation")),
    );
    record.insert(
        "session_timeout".into(),
        Value::from(opt_int(node, "AccInacTimeout")),
    );
    record.insert(
        "max_sessions".into(),
        Value::from(opt_int(node, "AccSimulMax")),
    );
    record.insert("tasks".into(), Value::Array(tasks(node)?));
    Ok(record)
}

fn tasks(node: &Node) -> Result<Vec<Value>, FieldError> {
    let mut tasks = Vec::new();
    for task_node in node.children_named("TP") {
        let mut task = Record::new();
        task.insert("name".into(), str_attr(task_node, "TpTar"));
        task.insert("priority".into(), Value::from(int_attr(task_node, "TpPrio")?));
        task.insert(
            "date_from".into(),
            Value::from(timestamp_attr(task_node, "TpHi")?),
        );
        task.insert("periodicity".into(), str_attr(task_node, "TpPer"));
        task.insert("complete".into(), Value::from(bool_attr(task_node, "TpCompl")));
        task.insert("meters".into(), str_attr(task_node, "TpMet"));

        let mut task_data = Vec::new();
        for data_node in task_node.children_named("TpPro") {
            let mut item = Record::new();
            item.insert("request".into(), str_attr(data_node, "TpReq"));
            item.insert("stg_send".into(), Value::from(bool_attr(data_node, "TpSend")));
            item.insert("store".into(), Value::from(bool_attr(data_node, "TpStore")));
            item.insert("attributes".into(), str_attr(data_node, "TpAttr"));
            task_data.push(Value::Object(item));
        }
        task.insert("task_data".into(), Value::Array(task_data));
        tasks.push(Value::Object(task));
    }
    Ok(tasks)
}

/// Contracted powers and calendar snapshot.
pub(super) fn s23(node: &Node) -> Result<Record, FieldError> {
    let mut record = Record::new();
    record.insert("date".into(), Value::from(timestamp_attr(node, "Fh")?));
    match node.child("PCact") {
        Some(pc) => record.insert("pc_act".into(), Value::Object(contracted_powers(pc)?)),
        // A line supervisor has no contracted powers of its own.
        None => record.insert("pc_act".into(), Value::from("supervisor")),
    };
    match node.child("PCLatent") {
        Some(pc) => record.insert("pc_latent".into(), Value::Object(contracted_powers(pc)?)),
        None => record.insert("pc_latent".into(), Value::from("supervisor")),
    };
    match node.child("ActiveCalendars") {
        Some(cal) => record.insert(
            "active_calendars".into(),
            Value::Object(calendars(cal, true)?),
        ),
        None => record.insert("active_calendars".into(), Value::Array(Vec::new())),
    };
    match node.child("LatentCalendars") {
        Some(cal) => record.insert(
            "latent_calendars".into(),
            Value::Object(calendars(cal, false)?),
        ),
        None => record.insert("latent_calendars".into(), Value::Array(Vec::new())),
    };
    Ok(record)
}

fn tariff_registers(node: &Node) -> Result<Record, FieldError> {
    let mut registers = Record::new();
    for tr in 1..=6 {
        registers.insert(
            format!("tr{}", tr),
            Value::from(int_attr(node, &format!("TR{}", tr))?),
        );
    }
    Ok(registers)
}

fn contracted_powers(node: &Node) -> Result<Record, FieldError> {
    let mut values = Record::new();
    if node.attr("ActDate").is_some() {
        values.insert(
            "act_date".into(),
            Value::from(timestamp_attr(node, "ActDate")?),
        );
    }
    if let Some(contract) = node.child("Contrato1") {
        values.insert("contrato1".into(), Value::Object(tariff_registers(contract)?));
    }
    if let Some(residual) = node.child("PResidual") {
        values.insert("presidual".into(), Value::Object(tariff_registers(residual)?));
    }
    Ok(values)
}

fn calendars(node: &Node, is_active_calendar: bool) -> Result<Record, FieldError> {
    let mut values = Record::new();
    let mut contracts = Vec::new();
    for contract_node in node.children_named("Contract") {
        let mut contract = Record::new();
        contract.insert("c".into(), str_attr(contract_node, "c"));
        contract.insert("calendar_type".into(), str_attr(contract_node, "CalendarType"));
        contract.insert(
            "calendar_name".into(),
            Value::from(octet_to_name(req_attr(contract_node, "CalendarName")?)?),
        );
        contract.insert(
            "act_date".into(),
            Value::from(timestamp_attr(contract_node, "ActDate")?),
        );
        contract.insert(
            "is_active_calendar".into(),
            Value::from(is_active_calendar),
        );

        if contract_node.has_child("Season") {
            let seasons: Vec<Value> = contract_node
                .children_named("Season")
                .map(|s| {
                    let mut season = Record::new();
                    season.insert("name".into(), str_attr(s, "Name"));
                    season.insert("start".into(), str_attr(s, "Start"));
                    season.insert("week".into(), str_attr(s, "Week"));
                    Value::Object(season)
                })
                .collect();
            contract.insert("seasons".into(), Value::Array(seasons));
        }
        if contract_node.has_child("Week") {
            let mut weeks = Vec::new();
            for (index, w) in contract_node.children_named("Week").enumerate() {
                let mut week = Record::new();
                week.insert("name".into(), str_attr(w, "Name"));
                week.insert("week".into(), str_attr(w, "Week"));
                week.insert("index".into(), Value::from(index));
                // Seven 2-character day schedule ids, Monday first.
                let day_ids = w.attr("Week").unwrap_or("");
                for (day, chunk) in day_ids.as_bytes().chunks(2).enumerate() {
                    week.insert(
                        format!("day{}", day),
                        Value::from(String::from_utf8_lossy(chunk).into_owned()),
                    );
                }
                weeks.push(Value::Object(week));
            }
            contract.insert("weeks".into(), Value::Array(weeks));
        }
        if contract_node.has_child("SpecialDays") {
            let mut special_days = Vec::new();
            for sd in contract_node.children_named("SpecialDays") {
                let mut special_day = Record::new();
                special_day.insert("dt".into(), Value::from(timestamp_attr(sd, "DT")?));
                special_day.insert(
                    "dt_card".into(),
                    Value::from(sd.attr("DTCard").unwrap_or("N") != "N"),
                );
                special_day.insert("day_id".into(), str_attr(sd, "DayID"));
                special_days.push(Value::Object(special_day));
            }
            contract.insert("special_days".into(), Value::Array(special_days));
        }
        if contract_node.has_child("Day") {
            let mut days = Vec::new();
            for day_node in contract_node.children_named("Day") {
                let mut day = Record::new();
                day.insert("day_id".into(), str_attr(day_node, "id"));
                if day_node.has_child("Change") {
                    let mut changes = Vec::new();
                    for change in day_node.children_named("Change") {
                        let hour_octet = change.attr("Hour").unwrap_or("00");
                        // Non-boundary cuts fall through to the full value,
                        // which then fails the hex parse.
                        let hour_prefix = hour_octet.get(..2).unwrap_or(hour_octet);
                        let hour = octet_to_number(hour_prefix)?;
                        let mut entry = Record::new();
                        entry.insert("hour".into(), Value::from(hour));
                        entry.insert("tariffrate".into(), str_attr(change, "TariffRate"));
                        changes.push(Value::Object(entry));
                    }
                    day.insert("changes".into(), Value::Array(changes));
                }
                days.push(Value::Object(day));
            }
            contract.insert("days".into(), Value::Array(days));
        }
        contracts.push(Value::Object(contract));
    }
    values.insert("contracts".into(), Value::Array(contracts));
    Ok(values)
}

/// Meter availability roll call. The caller injects `cnc_name`.
pub(super) fn s24(node: &Node) -> Result<Record, FieldError> {
    let mut record = Record::new();
    record.insert("timestamp".into(), Value::from(timestamp_attr(node, "Fh")?));
    record.insert("season".into(), Value::from(season_attr(node, "Fh")?));

    let mut meters = Vec::new();
    for meter_node in node.children_named("Meter") {
        let mut meter = Record::new();
        meter.insert("name".into(), str_attr(meter_node, "Id"));
        meter.insert(
            "in_service".into(),
            Value::from(bool_attr(meter_node, "O")),
        );
        if meter_node.attr("Fh").is_some() {
            meter.insert(
                "last_communication".into(),
                Value::from(timestamp_attr(meter_node, "Fh")?),
            );
        }
        meters.push(Value::Object(meter));
    }
    record.insert("meters".into(), Value::Array(meters));
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message;

    fn node(xml: &str) -> Node {
        message::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn test_s06_meter_configuration() {
        let n = node(concat!(
            "<S06 Fh=\"20220301113000000W\" NS=\"ZIV0036301516\" Fab=\"ZIV\" Af=\"2015\" ",
            "Te=\"RF\" Vf=\"3.4.8\" Pro=\"DLMS\" Tp=\"1\" Ts=\"1\" Ip=\"1\" Is=\"1\" ",
            "Usag=\"180\" Uswell=\"180\" Per=\"3600\" Vr=\"230\" Ut=\"180\" ",
            "AutMothBill=\"Y\" ScrollDispMode=\"0\" ScrollDispTime=\"5\"/>"
        ));
        let r = s06(&n).unwrap();
        assert_eq!(r["serial_number"], "ZIV0036301516");
        assert_eq!(r["manufacturing_year"], 2015);
        assert_eq!(r["automatic_monthly_billing"], true);
        assert_eq!(r["load_profile_period"], 3600);
        // Absent optional strings decode to null.
        assert_eq!(r["mac"], Value::Null);
    }

    #[test]
    fn test_s12_version_dependent_timeout_key() {
        let xml = concat!(
            "<S12 Fh=\"20220301113000000W\" Mod=\"CIR\" IPftp=\"10.1.5.206\" ",
            "RetryFtp=\"3\" TimeBetwFtp=\"60\" TimeOutMeterFwU=\"120\" ",
            "TimeOutPrimeFwU=\"240\" TimeDevOver=\"300\" TimeDev=\"60\" NumMeters=\"500\" ",
            "TimeSendReq=\"30\" TimeDisconMeter=\"120\" RetryDisconMeter=\"3\" ",
            "TimeRetryInterval=\"3600\" ValuesCheckDelay=\"30\"/>"
        );
        let n = node(xml);
        let r = s12(&n, "3.1c").unwrap();
        assert_eq!(r["fwmtup_timeout"], 120);
        assert_eq!(r["rpt_ftp_ip_address"], "10.1.5.206");

        let r = s12(&n, "3.1").unwrap();
        assert_eq!(r["fwmtup_timeout"], 240);
    }

    #[test]
    fn test_s12_tasks() {
        let n = node(concat!(
            "<S12 Fh=\"20220301113000000W\" RetryFtp=\"3\" TimeBetwFtp=\"60\" ",
            "TimeDevOver=\"300\" TimeDev=\"60\" NumMeters=\"500\" TimeSendReq=\"30\" ",
            "TimeDisconMeter=\"120\" RetryDisconMeter=\"3\" TimeRetryInterval=\"3600\" ",
            "ValuesCheckDelay=\"30\">",
            "<TP TpTar=\"S02\" TpPrio=\"1\" TpHi=\"20220301000000000W\" TpPer=\"86400\" ",
            "TpCompl=\"Y\" TpMet=\"ALL\">",
            "<TpPro TpReq=\"S02\" TpSend=\"Y\" TpStore=\"N\" TpAttr=\"\"/>",
            "</TP>",
            "</S12>"
        ));
        let r = s12(&n, "3.1c").unwrap();
        let tasks = r["tasks"].as_array().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0]["name"], "S02");
        assert_eq!(tasks[0]["complete"], true);
        assert_eq!(tasks[0]["date_from"], "2022-03-01 00:00:00");
        let task_data = tasks[0]["task_data"].as_array().unwrap();
        assert_eq!(task_data[0]["stg_send"], true);
        assert_eq!(task_data[0]["store"], false);
    }

    #[test]
    fn test_s23_contracted_powers_and_calendar() {
        let n = node(concat!(
            "<S23 Fh=\"20220301113000000W\">",
            "<PCact ActDate=\"20210601000000000S\">",
            "<Contrato1 TR1=\"4600\" TR2=\"4600\" TR3=\"4600\" TR4=\"0\" TR5=\"0\" TR6=\"0\"/>",
            "</PCact>",
            "<ActiveCalendars>",
            "<Contract c=\"1\" CalendarType=\"01\" CalendarName=\"322E30544441\" ",
            "ActDate=\"20210601000000000S\">",
            "<Season Name=\"01\" Start=\"FFFF0101FF00000000800000\" Week=\"01\"/>",
            "<Week Name=\"01\" Week=\"01010101010202\"/>",
            "<SpecialDays DT=\"FFFF0101000000000W\" DTCard=\"Y\" DayID=\"03\"/>",
            "<Day id=\"01\"><Change Hour=\"08000000\" TariffRate=\"0002\"/></Day>",
            "</Contract>",
            "</ActiveCalendars>",
            "</S23>"
        ));
        let r = s23(&n).unwrap();
        assert_eq!(r["date"], "2022-03-01 11:30:00");
        assert_eq!(r["pc_act"]["contrato1"]["tr1"], 4600);
        assert_eq!(r["pc_latent"], "supervisor");
        assert_eq!(r["latent_calendars"], serde_json::json!([]));

        let contract = &r["active_calendars"]["contracts"][0];
        assert_eq!(contract["calendar_name"], "2.0TDA");
        assert_eq!(contract["is_active_calendar"], true);
        assert_eq!(contract["weeks"][0]["day0"], "01");
        assert_eq!(contract["weeks"][0]["day5"], "02");
        assert_eq!(contract["special_days"][0]["dt_card"], true);
        assert_eq!(contract["days"][0]["changes"][0]["hour"], 8);
        assert_eq!(contract["days"][0]["changes"][0]["tariffrate"], "0002");
    }

    #[test]
    fn test_s23_multibyte_hour_is_error_not_panic() {
        let n = node(concat!(
            "<S23 Fh=\"20220301113000000W\">",
            "<ActiveCalendars>",
            "<Contract c=\"1\" CalendarType=\"01\" CalendarName=\"322E30544441\" ",
            "ActDate=\"20210601000000000S\">",
            "<Day id=\"01\"><Change Hour=\"\u{20ac}400\" TariffRate=\"0001\"/></Day>",
            "</Contract>",
            "</ActiveCalendars>",
            "</S23>"
        ));
        assert!(s23(&n).is_err());
    }

    #[test]
    fn test_s24_meter_availability() {
        let n = node(concat!(
            "<S24 Fh=\"20220301113000000W\">",
            "<Meter Id=\"ZIV0036301516\" O=\"Y\" Fh=\"20220301110000000W\"/>",
            "<Meter Id=\"ZIV0036301517\" O=\"N\"/>",
            "</S24>"
        ));
        let r = s24(&n).unwrap();
        let meters = r["meters"].as_array().unwrap();
        assert_eq!(meters.len(), 2);
        assert_eq!(meters[0]["in_service"], true);
        assert_eq!(meters[0]["last_communication"], "2022-03-01 11:00:00");
        assert_eq!(meters[1]["in_service"], false);
        assert!(meters[1].get("last_communication").is_none());
    }
}
