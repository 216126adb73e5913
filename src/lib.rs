pub mod config;
pub mod detection;
pub mod enforcement;
pub mod exit;
pub mod input;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod signal;
pub mod sleeper;

// Re-export commonly used types
pub use config::Config;
pub use detection::{BlockDecision, RuleSet};
pub use enforcement::{EnforcementGate, EnforcementOutcome, Firewall, IptablesFirewall};
pub use models::{AlertRecord, Incident, IncidentAction};
pub use persistence::{AuditStore, SqliteAuditStore};
pub use pipeline::{run_pipeline, ActiveDefense, PipelineError, PipelineState, PipelineStats};
