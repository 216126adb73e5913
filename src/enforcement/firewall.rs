//! iptables-backed firewall access

use crate::config::EnforcementConfig;
use std::net::IpAddr;
use std::process::Command;
use thiserror::Error;

/// Errors raised when the firewall tool cannot be run or reports failure
#[derive(Error, Debug)]
pub enum FirewallError {
    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Read and write access to source-address drop rules
pub trait Firewall {
    /// Query the live rule table for a drop rule matching `address`
    fn has_drop_rule(&self, address: &str) -> Result<bool, FirewallError>;

    /// Append a rule dropping all traffic from `address`
    fn insert_drop_rule(&mut self, address: &str) -> Result<(), FirewallError>;
}

/// Firewall driven through the `iptables` command line tool
#[derive(Debug, Clone)]
pub struct IptablesFirewall {
    program: String,
    program_args: Vec<String>,
    use_sudo: bool,
    chain: String,
}

impl IptablesFirewall {
    /// `command` may carry leading arguments, e.g. `"iptables -w"`.
    pub fn new(command: &str, use_sudo: bool, chain: &str) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_else(|| "iptables".to_string());
        IptablesFirewall {
            program,
            program_args: parts.collect(),
            use_sudo,
            chain: chain.to_string(),
        }
    }

    pub fn from_config(config: &EnforcementConfig) -> Self {
        Self::new(&config.firewall_command, config.use_sudo, &config.chain)
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    /// List the chain's rules, verbose and numeric
    pub fn list_rules(&self) -> Result<String, FirewallError> {
        self.run(&["-L", self.chain.as_str(), "-v", "-n"])
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = if self.use_sudo {
            // -n: fail instead of prompting for a password
            let mut sudo = Command::new("sudo");
            sudo.arg("-n").arg(&self.program);
            sudo
        } else {
            Command::new(&self.program)
        };
        command.args(&self.program_args).args(args);
        command
    }

    fn describe(&self, args: &[&str]) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if self.use_sudo {
            parts.extend(["sudo", "-n"]);
        }
        parts.push(&self.program);
        parts.extend(self.program_args.iter().map(String::as_str));
        parts.extend(args);
        parts.join(" ")
    }

    fn run(&self, args: &[&str]) -> Result<String, FirewallError> {
        let output = self
            .command(args)
            .output()
            .map_err(|source| FirewallError::Spawn {
                command: self.describe(args),
                source,
            })?;

        if !output.status.success() {
            return Err(FirewallError::CommandFailed {
                command: self.describe(args),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Firewall for IptablesFirewall {
    fn has_drop_rule(&self, address: &str) -> Result<bool, FirewallError> {
        let listing = self.list_rules()?;
        Ok(listing_has_drop_rule(&listing, address))
    }

    fn insert_drop_rule(&mut self, address: &str) -> Result<(), FirewallError> {
        self.run(&["-A", self.chain.as_str(), "-s", address, "-j", "DROP"])?;
        Ok(())
    }
}

/// Scan `iptables -L <chain> -v -n` output for a DROP rule whose source is
/// exactly `address` as a single host (bare, `/32` or `/128`).
///
/// Addresses are compared parsed, so `2001:DB8::1` matches the listed
/// `2001:db8::1/128`. Anything that is not an IP address never matches.
pub fn listing_has_drop_rule(listing: &str, address: &str) -> bool {
    let address = match address.parse::<IpAddr>() {
        Ok(address) => address,
        Err(_) => return false,
    };

    listing
        .lines()
        .filter_map(drop_rule_source)
        .filter_map(host_source)
        .any(|source| source == address)
}

/// Source column of a DROP rule line, if the line is one.
///
/// Columns: pkts bytes target prot opt in out source destination. The
/// `opt` column is blank on some iptables versions, so the source is taken
/// as the first address-shaped token after the target.
fn drop_rule_source(line: &str) -> Option<&str> {
    let mut tokens = line.split_whitespace();
    if tokens.nth(2)? != "DROP" {
        return None;
    }
    tokens.find(|token| is_network(token))
}

fn is_network(token: &str) -> bool {
    let host = token.split('/').next().unwrap_or(token);
    host.parse::<IpAddr>().is_ok()
}

/// The address of a source token naming one host; `None` for wider networks.
fn host_source(token: &str) -> Option<IpAddr> {
    let (host, prefix) = match token.split_once('/') {
        Some((host, prefix)) => (host, Some(prefix)),
        None => (token, None),
    };
    let host = host.parse::<IpAddr>().ok()?;
    let full = match host {
        IpAddr::V4(_) => "32",
        IpAddr::V6(_) => "128",
    };
    match prefix {
        None => Some(host),
        Some(prefix) if prefix == full => Some(host),
        Some(_) => None,
    }
}
