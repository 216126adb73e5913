use crate::models::AlertRecord;
use chrono::{Local, NaiveDateTime};
use std::fmt;

/// Format of the `timestamp` column in the audit table.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What the pipeline did in response to an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentAction {
    /// A new drop rule was inserted for the source.
    IpBlocked,
    /// The firewall already dropped the source; nothing was inserted.
    AlreadyBlocked,
    /// Inserting the drop rule failed.
    BlockFailed,
    /// The source is in a protected range and was left alone.
    BlockSkipped,
    /// The signature is not critical; the alert is only recorded.
    AlertOnly,
}

impl IncidentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentAction::IpBlocked => "IP_BLOCKED",
            IncidentAction::AlreadyBlocked => "ALREADY_BLOCKED",
            IncidentAction::BlockFailed => "BLOCK_FAILED",
            IncidentAction::BlockSkipped => "BLOCK_SKIPPED",
            IncidentAction::AlertOnly => "ALERT_ONLY",
        }
    }

    /// Parse the label stored in the `action_taken` column.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "IP_BLOCKED" => Some(IncidentAction::IpBlocked),
            "ALREADY_BLOCKED" => Some(IncidentAction::AlreadyBlocked),
            "BLOCK_FAILED" => Some(IncidentAction::BlockFailed),
            "BLOCK_SKIPPED" => Some(IncidentAction::BlockSkipped),
            "ALERT_ONLY" => Some(IncidentAction::AlertOnly),
            _ => None,
        }
    }
}

impl fmt::Display for IncidentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit row: an alert folded together with the action taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incident {
    pub timestamp: String,
    pub source_address: String,
    pub signature: String,
    pub action: IncidentAction,
}

impl Incident {
    /// Build an incident stamped with the current local time.
    pub fn new(record: &AlertRecord, action: IncidentAction) -> Self {
        Self::at(Local::now().naive_local(), record, action)
    }

    pub fn at(time: NaiveDateTime, record: &AlertRecord, action: IncidentAction) -> Self {
        Incident {
            timestamp: time.format(TIMESTAMP_FORMAT).to_string(),
            source_address: record.source_address.clone(),
            signature: record.signature.clone(),
            action,
        }
    }
}

/// An incident read back from the audit store, with its row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredIncident {
    pub id: i64,
    pub incident: Incident,
}
