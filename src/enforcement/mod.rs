//! Enforcement against the host firewall
//!
//! The firewall's own rule table is the source of truth for what is
//! blocked. The mirror file is an advisory copy and is never consulted
//! when deciding whether an address is already blocked.

pub mod firewall;
pub mod gate;
pub mod mirror;

pub use firewall::{Firewall, FirewallError, IptablesFirewall};
pub use gate::{is_protected_address, EnforcementGate, EnforcementOutcome};
pub use mirror::{BlockedMirror, MirrorError};
