use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use structopt::StructOpt;

use vigil::config::Config;
use vigil::detection::{classify, decide, BlockDecision};
use vigil::enforcement::BlockedMirror;
use vigil::persistence::{AuditStore, SqliteAuditStore};

/// Active defense command line interface
#[derive(StructOpt, Debug)]
#[structopt(name = "vigil", about = "Active defense CLI")]
pub enum Cli {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
    /// Show the most recent incidents from the audit database
    Incidents {
        /// Path to the audit database
        #[structopt(short, long, default_value = "defense_log.db")]
        database: PathBuf,
        /// Number of incidents to show
        #[structopt(short, long, default_value = "20")]
        limit: usize,
    },
    /// List addresses recorded in the blocked-IP mirror file
    Blocked {
        /// Path to the mirror file
        #[structopt(short, long, default_value = "blocked_ips.txt")]
        mirror: PathBuf,
    },
    /// Classify every line of an EVE log without touching firewall or database
    Check {
        /// Path to an EVE JSON log
        #[structopt(short, long)]
        file: PathBuf,
        /// Configuration providing the critical SIDs
        #[structopt(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::from_args();

    match cli {
        Cli::Config { output } => {
            let config = Config::default();
            config.to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Cli::Incidents { database, limit } => {
            if !database.exists() {
                eprintln!("Database not found: {:?}", database);
                std::process::exit(1);
            }
            let store = SqliteAuditStore::open(&database)?;
            let incidents = store.recent(limit)?;
            println!("{} incident(s) stored, showing {}:\n", store.count()?, incidents.len());
            for row in incidents {
                println!(
                    "  #{:<6} {}  {:<40} {:<15} {}",
                    row.id,
                    row.incident.timestamp,
                    row.incident.source_address,
                    row.incident.action,
                    row.incident.signature
                );
            }
        }
        Cli::Blocked { mirror } => {
            let entries = BlockedMirror::new(mirror).entries()?;
            println!("{} blocked address(es):", entries.len());
            for address in entries {
                println!("  {}", address);
            }
        }
        Cli::Check { file, config } => {
            if !file.exists() {
                eprintln!("File not found: {:?}", file);
                std::process::exit(1);
            }
            let config = match config {
                Some(path) => Config::from_file(&path)?,
                None => Config::default(),
            };
            let rules = config.rule_set();

            let reader = BufReader::new(std::fs::File::open(&file)?);
            let (mut alerts, mut critical, mut malformed) = (0usize, 0usize, 0usize);
            for line in reader.lines() {
                let record = match classify(&line?) {
                    Ok(record) => record,
                    Err(_) => {
                        malformed += 1;
                        continue;
                    }
                };
                if !record.is_alert() {
                    continue;
                }
                alerts += 1;
                let verdict = match decide(&record, &rules) {
                    BlockDecision::Block => {
                        critical += 1;
                        "BLOCK"
                    }
                    BlockDecision::Allow => "ALLOW",
                };
                println!(
                    "  {:<5} SID {:<10} {:<40} {}",
                    verdict, record.signature_id, record.source_address, record.signature
                );
            }
            println!(
                "\n{} alert(s), {} would be blocked, {} malformed line(s)",
                alerts, critical, malformed
            );
        }
    }

    Ok(())
}
