use std::env;
use std::path::PathBuf;
use std::process;

use vigil::config::Config;
use vigil::enforcement::IptablesFirewall;
use vigil::exit::{codes, exit_code};
use vigil::persistence::SqliteAuditStore;
use vigil::pipeline::{run_pipeline, PipelineError, StartupError};
use vigil::signal::ShutdownFlag;
use vigil::sleeper::RealSleeper;

/// Active defense daemon: Suricata alerts in, iptables drop rules out
fn main() {
    vigil::logging::init(log::LevelFilter::Info);

    let code = match run() {
        Ok(()) => codes::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            exit_code(&e)
        }
    };
    process::exit(code);
}

fn run() -> Result<(), PipelineError> {
    let config = load_config()?;

    log::info!("{}", "=".repeat(60));
    log::info!(" ACTIVE DEFENSE SYSTEM - STARTED");
    log::info!("{}", "=".repeat(60));
    log::info!("Monitoring: {:?}", config.input.alert_log);
    log::info!("Database: {:?}", config.persistence.database_path);
    log::info!("Blocked IP mirror: {:?}", config.enforcement.mirror_file);
    log::info!("Critical SIDs: {:?}", config.detection.critical_sids);
    if !config.enforcement.protect_private_ranges {
        log::warn!("Private and loopback sources are NOT protected from blocking");
    }
    log::info!("Press Ctrl+C to stop");

    let shutdown = ShutdownFlag::install().map_err(StartupError::from)?;
    let firewall = IptablesFirewall::from_config(&config.enforcement);
    let database_path = config.persistence.database_path.clone();

    run_pipeline(
        &config,
        firewall,
        || SqliteAuditStore::open(&database_path),
        &RealSleeper,
        &shutdown,
    )?;

    log::info!("Goodbye!");
    Ok(())
}

/// Load `config.toml` (or the path given as first argument), then apply
/// environment overrides
fn load_config() -> Result<Config, StartupError> {
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let mut config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        log::warn!("Config file {:?} not found, using defaults", config_path);
        Config::default()
    };
    config.apply_env_overrides()?;
    Ok(config)
}
