pub mod alert;
pub mod incident;

pub use alert::{AlertRecord, EveEvent, NO_SIGNATURE_ID, UNKNOWN};
pub use incident::{Incident, IncidentAction, StoredIncident, TIMESTAMP_FORMAT};
