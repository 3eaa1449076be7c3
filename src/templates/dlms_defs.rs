//! Built-in raw DLMS write templates.
//!
//! Every template is an ordered list of OBIS object writes (or reads, when
//! no data is attached). Data strings are the literal `raw{..}` payloads the
//! concentrator forwards to the meter, with `{p1}`..`{p6}` and `{date}`
//! placeholders filled in at order-build time.

use super::{DlmsLine, DlmsTemplate};

fn set(obis: &str, class_id: &str, element: &str, data: &str) -> DlmsLine {
    DlmsLine {
        obis: obis.to_string(),
        class_id: class_id.to_string(),
        element: element.to_string(),
        data: Some(data.to_string()),
    }
}

pub(super) fn tar_20td() -> DlmsTemplate {
    DlmsTemplate {
        name: "TAR_20TD".to_string(),
        description:
            "3T_TDA - 2.0TD 3 periods and special days. LATENT c1 Activation on selected date"
                .to_string(),
        origin: "library".to_string(),
        category: "contract".to_string(),
        lines: vec![
            set(
                "0.0.13.0.1.255",
                "20",
                "7",
                "raw{01010203090101090cffff0101ff00000000800000090101}",
            ),
            set(
                "0.0.13.0.1.255",
                "20",
                "8",
                "raw{010102080901011101110111011101110111021102}",
            ),
            set(
                "0.0.13.0.1.255",
                "20",
                "9",
                "raw{0102020211010106020309040000000009060100003001ff120003020309040800000009060100003001ff120002020309040a00000009060100003001ff120001020309040e00000009060100003001ff120002020309041200000009060100003001ff120001020309041600000009060100003001ff120002020211020101020309040000000009060100003001ff120003}",
            ),
            set(
                "0.0.11.0.4.255",
                "11",
                "2",
                "raw{010902031200010905FFFF0101FF110202031200080905FFFF0106FF110202031200020905FFFF0501FF110202031200030905FFFF080FFF110202031200040905FFFF0A0CFF110202031200050905FFFF0B01FF110202031200060905FFFF0C06FF110202031200070905FFFF0C08FF110202031200080905FFFF0C19FF1102}",
            ),
            set(
                "0.0.13.0.1.255",
                "20",
                "10",
                "raw{090C{date}FF000000000800FF}",
            ),
            set("0.0.13.0.1.255", "20", "6", "raw{090633545F544441}"),
        ],
    }
}

pub(super) fn tar_30td() -> DlmsTemplate {
    DlmsTemplate {
        name: "TAR_30TD".to_string(),
        description:
            "6T_TDA - 3.0TD with seasons and special days. LATENT c1 Activation on selected date"
                .to_string(),
        origin: "library".to_string(),
        category: "contract".to_string(),
        lines: vec![
            set(
                "0.0.13.0.1.255",
                "20",
                "7",
                "raw{01090203090101090cffff0101ff000000008000000901010203090102090cffff0301ff000000008000000901020203090103090cffff0401ff000000008000000901030203090104090cffff0601ff000000008000000901040203090105090cffff0701ff000000008000000901010203090106090cffff0801ff000000008000000901040203090107090cffff0a01ff000000008000000901030203090108090cffff0b01ff000000008000000901020203090109090cffff0c01ff00000000800000090101}",
            ),
            set(
                "0.0.13.0.1.255",
                "20",
                "8",
                "raw{010402080901011101110111011101110111051105020809010211021102110211021102110511050208090103110411041104110411041105110502080901041103110311031103110311051105}",
            ),
            set(
                "0.0.13.0.1.255",
                "20",
                "9",
                "raw{0105020211010106020309040000000009060100003001ff120006020309040800000009060100003001ff120002020309040900000009060100003001ff120001020309040e00000009060100003001ff120002020309041200000009060100003001ff120001020309041600000009060100003001ff120002020211020106020309040000000009060100003001ff120006020309040800000009060100003001ff120003020309040900000009060100003001ff120002020309040e00000009060100003001ff120003020309041200000009060100003001ff120002020309041600000009060100003001ff120003020211030106020309040000000009060100003001ff120006020309040800000009060100003001ff120004020309040900000009060100003001ff120003020309040e00000009060100003001ff120004020309041200000009060100003001ff120003020309041600000009060100003001ff120004020211040106020309040000000009060100003001ff120006020309040800000009060100003001ff120005020309040900000009060100003001ff120004020309040e00000009060100003001ff120005020309041200000009060100003001ff120004020309041600000009060100003001ff120005020211050101020309040000000009060100003001ff120006}",
            ),
            set(
                "0.0.11.0.4.255",
                "11",
                "2",
                "raw{010902031200010905FFFF0101FF110502031200080905FFFF0106FF110502031200020905FFFF0501FF110502031200030905FFFF080FFF110502031200040905FFFF0A0CFF110502031200050905FFFF0B01FF110502031200060905FFFF0C06FF110502031200070905FFFF0C08FF110502031200080905FFFF0C19FF1105}",
            ),
            set(
                "0.0.13.0.1.255",
                "20",
                "10",
                "raw{090C{date}FF000000000800FF}",
            ),
            set("0.0.13.0.1.255", "20", "6", "raw{090636545F544441}"),
        ],
    }
}

/// The six contracted-power registers, periods 1 to 6 in OBIS order.
fn power_lines() -> Vec<DlmsLine> {
    (1..=6)
        .map(|period| {
            set(
                &format!("0.1.94.34.1{}.255", period),
                "3",
                "2",
                &format!("raw{{06{{p{}}}}}", period),
            )
        })
        .collect()
}

pub(super) fn c1_lat_powers() -> DlmsTemplate {
    let mut lines = power_lines();
    lines.push(set(
        "0.0.13.0.1.255",
        "20",
        "10",
        "raw{090C{date}FF000000000800FF}",
    ));
    DlmsTemplate {
        name: "C1_LAT_POWERS".to_string(),
        description: "Set powers on LATENT c1. Ordered power list p1,p2,p3,p4,p5,p6 and date."
            .to_string(),
        origin: "library".to_string(),
        category: "powers".to_string(),
        lines,
    }
}

pub(super) fn c1_act_powers() -> DlmsTemplate {
    let mut lines = power_lines();
    lines.push(set(
        "0.0.13.0.1.255",
        "20",
        "10",
        "raw{090C07D10101FF000000000800FF}",
    ));
    DlmsTemplate {
        name: "C1_ACT_POWERS".to_string(),
        description: "Set powers on ACTUAL c1. Ordered power list p1,p2,p3,p4,p5,p6".to_string(),
        origin: "library".to_string(),
        category: "powers".to_string(),
        lines,
    }
}

pub(super) fn all() -> Vec<DlmsTemplate> {
    vec![tar_20td(), tar_30td(), c1_lat_powers(), c1_act_powers()]
}
