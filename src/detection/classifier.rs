//! Alert classification
//!
//! Turns a raw EVE line into an [`AlertRecord`] and decides whether the
//! record's signature calls for enforcement.

use crate::models::{AlertRecord, EveEvent};
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors raised for lines that are not well-formed alert records
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record is not a JSON object")]
    NotAnObject,
}

/// Verdict for a single alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockDecision {
    Block,
    Allow,
}

/// Signature identifiers that trigger enforcement.
///
/// Built once at startup and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    critical_sids: BTreeSet<i64>,
}

impl RuleSet {
    pub fn new<I: IntoIterator<Item = i64>>(sids: I) -> Self {
        RuleSet {
            critical_sids: sids.into_iter().collect(),
        }
    }

    pub fn contains(&self, signature_id: i64) -> bool {
        self.critical_sids.contains(&signature_id)
    }

    pub fn len(&self) -> usize {
        self.critical_sids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.critical_sids.is_empty()
    }
}

/// Parse one raw line into an alert record.
///
/// Absent fields take their defaults and a signature id that is not an
/// integer becomes [`NO_SIGNATURE_ID`](crate::models::NO_SIGNATURE_ID). Anything that is not a JSON object,
/// or whose other modelled fields have the wrong type, is a [`ParseError`].
pub fn classify(raw: &str) -> Result<AlertRecord, ParseError> {
    let value: serde_json::Value = serde_json::from_str(raw.trim())?;
    if !value.is_object() {
        return Err(ParseError::NotAnObject);
    }
    let event: EveEvent = serde_json::from_value(value)?;
    Ok(AlertRecord::from(event))
}

/// Decide whether an alert warrants blocking its source.
pub fn decide(record: &AlertRecord, rules: &RuleSet) -> BlockDecision {
    if rules.contains(record.signature_id) {
        BlockDecision::Block
    } else {
        BlockDecision::Allow
    }
}
