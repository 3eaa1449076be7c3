//! PRIME STG-DC codec for smart-metering data concentrators.
//!
//! Decodes the XML reports a concentrator pushes upstream (instantaneous
//! values, load profiles, billings, events, configuration dumps, line
//! supervisor profiles) into JSON-shaped records, and encodes the order
//! documents the head end sends back down (contracted powers, cutoffs,
//! tariff calendars, configuration changes, raw DLMS).
//!
//! Decoding isolates failures per record: a malformed meter entry turns
//! into a warning on its concentrator instead of aborting the document.

pub mod message;
pub mod octet;
pub mod order;
pub mod report;
pub mod templates;

pub use message::{MessageError, Node};
pub use order::{build_order, IpSetting, OrderError, OrderFields, OrderPayload};
pub use report::{ConcentratorRecords, Report, ReportError};
pub use templates::{
    contract_template, dlms_template, fill_dlms_template, list_contract_templates,
    list_dlms_templates, TemplateError,
};
