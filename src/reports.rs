//! Typed rows for tenant usage reports.
//!
//! The reporting services emit the same logical rows in three wire formats,
//! and the columns are dictated by the service, not designed here:
//!
//! - **CSV** with human-facing display headers ("Report Refresh Date",
//!   "Audio/Video", …). Parsed with the `csv` crate; serde aliases map the
//!   display headers onto the field names.
//! - **JSON** with camelCase property names, rows wrapped in an OData-style
//!   `{ "value": [...] }` collection.
//! - **XML** from the legacy reporting web service, read per row element
//!   with the same literal-tag scan used for the digest envelope. Missing
//!   numeric elements default to zero, matching the lenient parsing the
//!   feed has always received.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::scrape;

/// OData collection wrapper returned by the JSON report endpoints.
#[derive(Debug, Deserialize)]
pub struct ODataCollection<T> {
    /// The array of report rows.
    pub value: Vec<T>,
}

/// Parses a JSON report payload (`{ "value": [...] }`) into typed rows.
///
/// # Errors
///
/// `OperationError::Parse` when the payload is not valid JSON for the row
/// type.
pub fn parse_json_report<T: DeserializeOwned>(payload: &str) -> Result<Vec<T>> {
    let collection: ODataCollection<T> = serde_json::from_str(payload)?;
    Ok(collection.value)
}

/// Parses a CSV report payload into typed rows using its header row.
///
/// # Errors
///
/// `OperationError::Report` when a record cannot be deserialized into the
/// row type.
pub fn parse_csv_report<T: DeserializeOwned>(payload: &str) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(payload.as_bytes());
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Usage trends for conference session participation, by session type.
///
/// Served as both CSV (display headers) and JSON (camelCase); the serde
/// aliases carry the CSV header mapping. Count columns are optional because
/// the service omits them for days with no recorded activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkypeForBusinessParticipantActivityCounts {
    /// Date the report data was last refreshed by the service.
    #[serde(alias = "Report Refresh Date")]
    pub report_refresh_date: NaiveDate,

    /// The day this row covers; absent on period-aggregate rows.
    #[serde(default, alias = "Report Date")]
    pub report_date: Option<NaiveDate>,

    /// Reporting period length in days.
    #[serde(alias = "Report Period")]
    pub report_period: i64,

    /// Instant-messaging sessions.
    #[serde(default, alias = "IM")]
    pub im: Option<i64>,

    /// Audio/video sessions.
    #[serde(default, alias = "Audio/Video")]
    pub audio_video: Option<i64>,

    /// Application-sharing sessions.
    #[serde(default, alias = "App Sharing")]
    pub app_sharing: Option<i64>,

    /// Web conference sessions.
    #[serde(default, alias = "Web")]
    pub web: Option<i64>,

    /// Dial-in/out sessions through third-party audio conferencing.
    #[serde(default, alias = "Dial-in/out 3rd Party")]
    pub dial_in_out_3rd_party: Option<i64>,
}

/// Mailbox staleness buckets from the legacy XML reporting service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaleMailbox {
    /// Timestamp of the observation, verbatim from the feed.
    pub date: Option<String>,
    /// Mailboxes active within the last 30 days.
    pub active_mailboxes: i64,
    /// Mailboxes inactive for 31–60 days.
    pub inactive_mailboxes_31_to_60_days: i64,
    /// Mailboxes inactive for 61–90 days.
    pub inactive_mailboxes_61_to_90_days: i64,
    /// Mailboxes inactive for 91–1460 days.
    pub inactive_mailboxes_91_to_1460_days: i64,
}

impl StaleMailbox {
    /// Reads one row out of its XML element.
    ///
    /// Never fails: missing numeric elements default to zero and a missing
    /// date stays `None`, matching how the feed has always been consumed.
    pub fn from_xml(node: &str) -> Self {
        StaleMailbox {
            date: scrape::element_text(node, "Date").map(str::to_owned),
            active_mailboxes: int_element(node, "ActiveMailboxes"),
            inactive_mailboxes_31_to_60_days: int_element(node, "InactiveMailboxes31To60Days"),
            inactive_mailboxes_61_to_90_days: int_element(node, "InactiveMailboxes61To90Days"),
            inactive_mailboxes_91_to_1460_days: int_element(node, "InactiveMailboxes91To1460Days"),
        }
    }
}

/// Integer element text, defaulting to 0 when absent or unparseable.
fn int_element(xml: &str, tag: &str) -> i64 {
    scrape::element_text(xml, tag)
        .and_then(|text| text.trim().parse().ok())
        .unwrap_or(0)
}
