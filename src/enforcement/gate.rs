use super::firewall::{Firewall, FirewallError};
use super::mirror::BlockedMirror;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Result of asking the gate to block an address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementOutcome {
    /// A new drop rule was inserted
    BlockedNew,
    /// The firewall already drops the address; nothing was changed
    AlreadyBlocked,
    /// The drop rule could not be inserted
    BlockFailed,
    /// The address is in a protected range and was not touched
    Exempt,
    /// The alert did not call for enforcement
    NotAttempted,
}

/// Idempotent front door to the firewall.
///
/// Every call to [`EnforcementGate::block`] re-queries the live rule table
/// right before mutating it, so rules added by other actors are respected
/// and repeated alerts never stack duplicate rules.
pub struct EnforcementGate<F: Firewall> {
    firewall: F,
    mirror: BlockedMirror,
    protect_private_ranges: bool,
}

impl<F: Firewall> EnforcementGate<F> {
    pub fn new(firewall: F, mirror: BlockedMirror) -> Self {
        EnforcementGate {
            firewall,
            mirror,
            protect_private_ranges: false,
        }
    }

    /// Refuse to block loopback, private, link-local and unique-local sources
    pub fn with_private_range_protection(mut self, enabled: bool) -> Self {
        self.protect_private_ranges = enabled;
        self
    }

    pub fn firewall(&self) -> &F {
        &self.firewall
    }

    pub fn mirror(&self) -> &BlockedMirror {
        &self.mirror
    }

    /// Whether the live rule table already drops `address`
    pub fn is_blocked(&self, address: &str) -> Result<bool, FirewallError> {
        self.firewall.has_drop_rule(address)
    }

    /// Insert a drop rule for `address` unless one is already in place
    pub fn block(&mut self, address: &str) -> EnforcementOutcome {
        if self.protect_private_ranges && is_protected_address(address) {
            log::warn!("Skipping protected address: {}", address);
            return EnforcementOutcome::Exempt;
        }

        match self.is_blocked(address) {
            Ok(true) => {
                log::info!("IP already blocked: {}", address);
                return EnforcementOutcome::AlreadyBlocked;
            }
            Ok(false) => {}
            // An unconfirmed block is treated as absent; the insert below decides
            Err(e) => log::warn!("Failed to check firewall for {}: {}", address, e),
        }

        if let Err(e) = self.firewall.insert_drop_rule(address) {
            log::error!("Failed to block IP {}: {}", address, e);
            return EnforcementOutcome::BlockFailed;
        }
        log::info!("IP BLOCKED: {}", address);

        if let Err(e) = self.mirror.record(address) {
            log::warn!("Blocked {} but could not update mirror file: {}", address, e);
        }
        EnforcementOutcome::BlockedNew
    }
}

/// True for addresses a host should never cut itself off from
pub fn is_protected_address(address: &str) -> bool {
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => is_protected_v4(&v4),
        Ok(IpAddr::V6(v6)) => is_protected_v6(&v6),
        Err(_) => false,
    }
}

fn is_protected_v4(address: &Ipv4Addr) -> bool {
    address.is_loopback()
        || address.is_private()
        || address.is_link_local()
        || address.is_unspecified()
        || address.is_broadcast()
}

fn is_protected_v6(address: &Ipv6Addr) -> bool {
    let head = address.segments()[0];
    address.is_loopback()
        || address.is_unspecified()
        || (head & 0xfe00) == 0xfc00 // unique local fc00::/7
        || (head & 0xffc0) == 0xfe80 // link local fe80::/10
        || address.to_ipv4_mapped().map_or(false, |v4| is_protected_v4(&v4))
}
