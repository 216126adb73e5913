use serde::Deserialize;
use serde_json::Value;

/// Sentinel used for textual fields missing from an alert.
pub const UNKNOWN: &str = "UNKNOWN";

/// Event type that marks a record as an alert.
pub const ALERT_EVENT_TYPE: &str = "alert";

/// Signature id given to alerts whose id is absent or not an integer.
pub const NO_SIGNATURE_ID: i64 = 0;

/// One line of the detection engine's EVE JSON output, as it sits on disk.
///
/// Only the fields the pipeline looks at are modelled; everything else in
/// the record is ignored during deserialization.
#[derive(Debug, Default, Deserialize)]
pub struct EveEvent {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub src_ip: Option<String>,
    #[serde(default)]
    pub alert: Option<EveAlert>,
}

/// Nested `alert` object of an EVE record.
#[derive(Debug, Default, Deserialize)]
pub struct EveAlert {
    #[serde(default)]
    pub signature: Option<String>,
    /// Kept as raw JSON so that odd ids (negative, `1e3`, quoted) still
    /// yield a record instead of failing the whole line.
    #[serde(default)]
    pub signature_id: Option<Value>,
}

/// A parsed alert with defaults applied to absent fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRecord {
    pub event_type: String,
    pub source_address: String,
    pub signature: String,
    pub signature_id: i64,
}

impl AlertRecord {
    /// True when the record is an alert; every other event type is ignored.
    pub fn is_alert(&self) -> bool {
        self.event_type == ALERT_EVENT_TYPE
    }
}

impl From<EveEvent> for AlertRecord {
    fn from(event: EveEvent) -> Self {
        let alert = event.alert.unwrap_or_default();
        AlertRecord {
            event_type: event.event_type.unwrap_or_default(),
            source_address: event.src_ip.unwrap_or_else(|| UNKNOWN.to_string()),
            signature: alert.signature.unwrap_or_else(|| UNKNOWN.to_string()),
            signature_id: alert
                .signature_id
                .as_ref()
                .and_then(integral_id)
                .unwrap_or(NO_SIGNATURE_ID),
        }
    }
}

/// Integer value of a JSON number, accepting floats with no fractional part.
fn integral_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_empty_event() {
        let record = AlertRecord::from(EveEvent::default());
        assert_eq!(record.event_type, "");
        assert_eq!(record.source_address, UNKNOWN);
        assert_eq!(record.signature, UNKNOWN);
        assert_eq!(record.signature_id, 0);
        assert!(!record.is_alert());
    }

    #[test]
    fn test_unmodelled_fields_are_ignored() {
        let line = r#"{"timestamp":"2024-01-01T00:00:00","event_type":"alert","src_ip":"10.0.0.1","dest_port":22,"alert":{"signature":"SSH scan","signature_id":2001219,"severity":2}}"#;
        let event: EveEvent = serde_json::from_str(line).unwrap();
        let record = AlertRecord::from(event);
        assert!(record.is_alert());
        assert_eq!(record.source_address, "10.0.0.1");
        assert_eq!(record.signature, "SSH scan");
        assert_eq!(record.signature_id, 2001219);
    }

    fn record_for_id(id: &str) -> AlertRecord {
        let line = format!(r#"{{"event_type":"alert","alert":{{"signature_id":{}}}}}"#, id);
        AlertRecord::from(serde_json::from_str::<EveEvent>(&line).unwrap())
    }

    #[test]
    fn test_signature_id_forms() {
        assert_eq!(record_for_id("-1").signature_id, -1);
        assert_eq!(record_for_id("1e3").signature_id, 1000);
        assert_eq!(record_for_id("1000001.0").signature_id, 1000001);
        assert_eq!(record_for_id("2.5").signature_id, NO_SIGNATURE_ID);
        assert_eq!(record_for_id("18446744073709551615").signature_id, NO_SIGNATURE_ID);
        assert_eq!(record_for_id(r#""1000001""#).signature_id, NO_SIGNATURE_ID);
        assert_eq!(record_for_id("null").signature_id, NO_SIGNATURE_ID);
        assert_eq!(record_for_id("true").signature_id, NO_SIGNATURE_ID);
    }
}
