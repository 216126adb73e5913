//! Alert-to-enforcement pipeline
//!
//! Wires the stream reader, classifier, enforcement gate and audit store
//! into one sequential loop. For every alert, classification precedes
//! enforcement and enforcement precedes the audit write; alerts are handled
//! strictly one after another.

use crate::config::Config;
use crate::detection::{classify, decide, BlockDecision, RuleSet};
use crate::enforcement::{BlockedMirror, EnforcementGate, EnforcementOutcome, Firewall};
use crate::input::{FileTailer, TailError};
use crate::models::{AlertRecord, Incident, IncidentAction};
use crate::persistence::{AuditStore, PersistenceError};
use crate::signal::ShutdownCheck;
use crate::sleeper::Sleeper;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions detected before the loop starts
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Log file not found: {0:?}")]
    AlertSourceMissing(PathBuf),

    #[error("Cannot open alert log: {0}")]
    AlertSource(#[source] TailError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Audit store unavailable: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Cannot install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

impl From<TailError> for StartupError {
    fn from(error: TailError) -> Self {
        match error {
            TailError::NotFound(path) => StartupError::AlertSourceMissing(path),
            other => StartupError::AlertSource(other),
        }
    }
}

/// Errors that end the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Startup failed: {0}")]
    Startup(#[from] StartupError),

    #[error("Alert stream failed: {0}")]
    Runtime(#[source] TailError),
}

/// Lifecycle of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Running,
    ShuttingDown,
    Stopped,
}

/// What became of a single input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Not well-formed; skipped without an audit row
    Malformed,
    /// Well-formed but not an alert event
    Ignored,
    /// Alert handled; the incident is what was (or should have been) stored
    Handled(Incident),
}

/// Counters reported when the loop stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub lines: u64,
    pub malformed: u64,
    pub ignored: u64,
    pub blocked: u64,
    pub already_blocked: u64,
    pub block_failed: u64,
    pub exempt: u64,
    pub alert_only: u64,
    pub persist_failures: u64,
}

impl PipelineStats {
    fn record(&mut self, outcome: EnforcementOutcome) {
        match outcome {
            EnforcementOutcome::BlockedNew => self.blocked += 1,
            EnforcementOutcome::AlreadyBlocked => self.already_blocked += 1,
            EnforcementOutcome::BlockFailed => self.block_failed += 1,
            EnforcementOutcome::Exempt => self.exempt += 1,
            EnforcementOutcome::NotAttempted => self.alert_only += 1,
        }
    }

    pub fn alerts(&self) -> u64 {
        self.blocked + self.already_blocked + self.block_failed + self.exempt + self.alert_only
    }
}

/// Audit label for an enforcement outcome
pub fn action_for(outcome: EnforcementOutcome) -> IncidentAction {
    match outcome {
        EnforcementOutcome::BlockedNew => IncidentAction::IpBlocked,
        EnforcementOutcome::AlreadyBlocked => IncidentAction::AlreadyBlocked,
        EnforcementOutcome::BlockFailed => IncidentAction::BlockFailed,
        EnforcementOutcome::Exempt => IncidentAction::BlockSkipped,
        EnforcementOutcome::NotAttempted => IncidentAction::AlertOnly,
    }
}

/// The active defense loop
pub struct ActiveDefense<F: Firewall, S: AuditStore> {
    rules: RuleSet,
    gate: EnforcementGate<F>,
    store: S,
    state: PipelineState,
    stats: PipelineStats,
}

impl<F: Firewall, S: AuditStore> ActiveDefense<F, S> {
    pub fn new(rules: RuleSet, gate: EnforcementGate<F>, store: S) -> Self {
        ActiveDefense {
            rules,
            gate,
            store,
            state: PipelineState::Init,
            stats: PipelineStats::default(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn gate(&self) -> &EnforcementGate<F> {
        &self.gate
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Make sure the audit table exists and enter the running state
    pub fn start(&mut self) -> Result<(), StartupError> {
        self.store.init()?;
        self.state = PipelineState::Running;
        Ok(())
    }

    /// Consume lines until the source ends (shutdown) or fails.
    ///
    /// Stream errors are the only thing that stop the loop early; parse,
    /// firewall and storage failures are logged and the next line is read.
    pub fn run<I>(&mut self, lines: I) -> Result<PipelineStats, PipelineError>
    where
        I: IntoIterator<Item = Result<String, TailError>>,
    {
        if self.state == PipelineState::Init {
            self.start()?;
        }

        for line in lines {
            match line {
                Ok(line) => {
                    self.process_line(&line);
                }
                Err(e) => {
                    log::error!("CRITICAL ERROR: {}", e);
                    self.state = PipelineState::Stopped;
                    return Err(PipelineError::Runtime(e));
                }
            }
        }

        self.state = PipelineState::ShuttingDown;
        log::info!("Shutting down active defense...");
        log::info!(
            "Processed {} line(s): {} alert(s), {} blocked, {} already blocked, {} failed, {} skipped, {} alert-only, {} malformed, {} ignored",
            self.stats.lines,
            self.stats.alerts(),
            self.stats.blocked,
            self.stats.already_blocked,
            self.stats.block_failed,
            self.stats.exempt,
            self.stats.alert_only,
            self.stats.malformed,
            self.stats.ignored
        );
        if self.stats.persist_failures > 0 {
            log::warn!("{} incident(s) could not be written to the audit store", self.stats.persist_failures);
        }
        self.state = PipelineState::Stopped;
        Ok(self.stats.clone())
    }

    /// Classify one raw line and act on it
    pub fn process_line(&mut self, raw: &str) -> LineOutcome {
        self.stats.lines += 1;

        let record = match classify(raw) {
            Ok(record) => record,
            Err(e) => {
                self.stats.malformed += 1;
                log::debug!("Skipping malformed line: {}", e);
                return LineOutcome::Malformed;
            }
        };

        if !record.is_alert() {
            self.stats.ignored += 1;
            return LineOutcome::Ignored;
        }

        LineOutcome::Handled(self.handle_alert(&record))
    }

    /// Decide, enforce and record a single alert
    pub fn handle_alert(&mut self, record: &AlertRecord) -> Incident {
        log::info!(
            "ALERT Detected: {} | Source IP: {} | SID: {}",
            record.signature,
            record.source_address,
            record.signature_id
        );

        let outcome = match decide(record, &self.rules) {
            BlockDecision::Block => {
                log::info!("Critical SID detected - initiating block...");
                self.gate.block(&record.source_address)
            }
            BlockDecision::Allow => {
                log::info!("Alert logged but not critical (SID: {})", record.signature_id);
                EnforcementOutcome::NotAttempted
            }
        };
        self.stats.record(outcome);

        let incident = Incident::new(record, action_for(outcome));
        match self.store.append(&incident) {
            Ok(id) => log::info!(
                "Incident #{} logged: {} | {} | {}",
                id,
                incident.source_address,
                incident.signature,
                incident.action
            ),
            Err(e) => {
                self.stats.persist_failures += 1;
                log::error!("Database error: {}", e);
            }
        }
        incident
    }
}

/// Start the pipeline from configuration and run it until shutdown.
///
/// The alert source is checked before the audit store is opened, so a
/// missing log never creates a database. `open_store` is only called once
/// the source is known to exist.
pub fn run_pipeline<F, S, O>(
    config: &Config,
    firewall: F,
    open_store: O,
    sleeper: &dyn Sleeper,
    shutdown: &dyn ShutdownCheck,
) -> Result<PipelineStats, PipelineError>
where
    F: Firewall,
    S: AuditStore,
    O: FnOnce() -> Result<S, PersistenceError>,
{
    config.validate().map_err(StartupError::from)?;

    let tailer = FileTailer::open(&config.input.alert_log)
        .map_err(StartupError::from)?
        .with_rotation(config.input.follow_rotation);
    let store = open_store().map_err(StartupError::from)?;
    log::info!("Database initialized");

    let gate = EnforcementGate::new(firewall, BlockedMirror::new(&config.enforcement.mirror_file))
        .with_private_range_protection(config.enforcement.protect_private_ranges);
    let mut defense = ActiveDefense::new(config.rule_set(), gate, store);
    defense.start()?;

    log::info!("Monitoring: {:?}", tailer.path());
    defense.run(tailer.follow(config.poll_interval(), sleeper, shutdown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enforcement::FirewallError;
    use crate::models::{StoredIncident, UNKNOWN};
    use crate::persistence::SqliteAuditStore;

    #[derive(Default)]
    struct TableFirewall {
        rules: Vec<String>,
        inserts: usize,
        broken: bool,
    }

    impl Firewall for TableFirewall {
        fn has_drop_rule(&self, address: &str) -> Result<bool, FirewallError> {
            Ok(self.rules.iter().any(|rule| rule == address))
        }

        fn insert_drop_rule(&mut self, address: &str) -> Result<(), FirewallError> {
            self.inserts += 1;
            if self.broken || address == UNKNOWN {
                return Err(FirewallError::CommandFailed {
                    command: format!("iptables -A INPUT -s {} -j DROP", address),
                    status: "exit status: 2".to_string(),
                    stderr: "host/network not found".to_string(),
                });
            }
            self.rules.push(address.to_string());
            Ok(())
        }
    }

    fn new_defense(
        dir: &tempfile::TempDir,
        firewall: TableFirewall,
    ) -> ActiveDefense<TableFirewall, SqliteAuditStore> {
        let gate = EnforcementGate::new(firewall, BlockedMirror::new(dir.path().join("blocked_ips.txt")));
        let store = SqliteAuditStore::in_memory().unwrap();
        ActiveDefense::new(RuleSet::new([1000001, 1000002, 1000003]), gate, store)
    }

    fn alert(src_ip: &str, signature_id: i64) -> String {
        format!(
            r#"{{"event_type":"alert","src_ip":"{}","alert":{{"signature":"Test Rule","signature_id":{}}}}}"#,
            src_ip, signature_id
        )
    }

    #[test]
    fn test_critical_alert_blocks_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let mut defense = new_defense(&dir, TableFirewall::default());

        match defense.process_line(&alert("203.0.113.7", 1000001)) {
            LineOutcome::Handled(incident) => assert_eq!(incident.action, IncidentAction::IpBlocked),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(defense.gate().firewall().rules, vec!["203.0.113.7"]);

        let rows = defense.store().recent(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].incident.source_address, "203.0.113.7");
        assert_eq!(rows[0].incident.signature, "Test Rule");
        assert_eq!(rows[0].incident.action, IncidentAction::IpBlocked);
    }

    #[test]
    fn test_non_critical_alert_is_alert_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut defense = new_defense(&dir, TableFirewall::default());

        defense.process_line(&alert("203.0.113.7", 9999999));
        assert_eq!(defense.gate().firewall().inserts, 0);

        let rows = defense.store().recent(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].incident.action, IncidentAction::AlertOnly);
    }

    #[test]
    fn test_repeated_alert_is_already_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let mut defense = new_defense(&dir, TableFirewall::default());

        defense.process_line(&alert("203.0.113.7", 1000002));
        defense.process_line(&alert("203.0.113.7", 1000003));

        assert_eq!(defense.gate().firewall().inserts, 1);
        let actions: Vec<IncidentAction> = defense
            .store()
            .recent(10)
            .unwrap()
            .into_iter()
            .map(|row| row.incident.action)
            .collect();
        assert_eq!(actions, vec![IncidentAction::AlreadyBlocked, IncidentAction::IpBlocked]);
        assert_eq!(defense.stats().blocked, 1);
        assert_eq!(defense.stats().already_blocked, 1);
    }

    #[test]
    fn test_failed_block_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let firewall = TableFirewall {
            broken: true,
            ..Default::default()
        };
        let mut defense = new_defense(&dir, firewall);

        defense.process_line(&alert("203.0.113.7", 1000001));
        let rows = defense.store().recent(10).unwrap();
        assert_eq!(rows[0].incident.action, IncidentAction::BlockFailed);
        assert_eq!(defense.stats().block_failed, 1);
    }

    /// Store whose table exists but never accepts a row.
    struct FullDiskStore;

    impl AuditStore for FullDiskStore {
        fn init(&self) -> Result<(), PersistenceError> {
            Ok(())
        }

        fn append(&self, _incident: &Incident) -> Result<i64, PersistenceError> {
            Err(PersistenceError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_FULL),
                Some("database or disk is full".to_string()),
            )))
        }

        fn recent(&self, _limit: usize) -> Result<Vec<StoredIncident>, PersistenceError> {
            Ok(Vec::new())
        }

        fn count(&self) -> Result<usize, PersistenceError> {
            Ok(0)
        }
    }

    #[test]
    fn test_audit_failure_does_not_stop_enforcement() {
        let dir = tempfile::tempdir().unwrap();
        let gate = EnforcementGate::new(
            TableFirewall::default(),
            BlockedMirror::new(dir.path().join("blocked_ips.txt")),
        );
        let mut defense = ActiveDefense::new(RuleSet::new([1000001]), gate, FullDiskStore);

        let lines = vec![
            Ok(alert("203.0.113.7", 1000001)),
            Ok(alert("203.0.113.8", 1000001)),
        ];
        let stats = defense.run(lines).unwrap();

        assert_eq!(stats.persist_failures, 2);
        assert_eq!(stats.blocked, 2);
        assert_eq!(defense.gate().firewall().inserts, 2);
        assert_eq!(defense.gate().firewall().rules, vec!["203.0.113.7", "203.0.113.8"]);
        assert_eq!(defense.state(), PipelineState::Stopped);
    }

    #[test]
    fn test_unusual_signature_id_is_recorded_as_alert_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut defense = new_defense(&dir, TableFirewall::default());

        for id in ["-1", "1e3", r#""1000001""#] {
            let line = format!(
                r#"{{"event_type":"alert","src_ip":"203.0.113.7","alert":{{"signature":"Odd","signature_id":{}}}}}"#,
                id
            );
            match defense.process_line(&line) {
                LineOutcome::Handled(incident) => assert_eq!(incident.action, IncidentAction::AlertOnly),
                other => panic!("unexpected outcome {:?} for id {}", other, id),
            }
        }

        assert_eq!(defense.gate().firewall().inserts, 0);
        assert_eq!(defense.stats().malformed, 0);
        let rows = defense.store().recent(10).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|row| row.incident.action == IncidentAction::AlertOnly));
    }

    #[test]
    fn test_missing_src_ip_produces_incident() {
        let dir = tempfile::tempdir().unwrap();
        let mut defense = new_defense(&dir, TableFirewall::default());

        let line = r#"{"event_type":"alert","alert":{"signature":"Anonymous","signature_id":1000001}}"#;
        match defense.process_line(line) {
            LineOutcome::Handled(incident) => {
                assert_eq!(incident.source_address, UNKNOWN);
                assert_eq!(incident.action, IncidentAction::BlockFailed);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(defense.store().count().unwrap(), 1);
    }

    #[test]
    fn test_malformed_and_non_alert_lines_leave_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let mut defense = new_defense(&dir, TableFirewall::default());

        assert_eq!(defense.process_line("{not json"), LineOutcome::Malformed);
        assert_eq!(defense.process_line(""), LineOutcome::Malformed);
        assert_eq!(
            defense.process_line(r#"{"event_type":"flow","src_ip":"203.0.113.7"}"#),
            LineOutcome::Ignored
        );

        assert_eq!(defense.store().count().unwrap(), 0);
        assert_eq!(defense.gate().firewall().inserts, 0);
        assert_eq!(defense.stats().malformed, 2);
        assert_eq!(defense.stats().ignored, 1);
    }

    #[test]
    fn test_run_walks_states_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut defense = new_defense(&dir, TableFirewall::default());
        assert_eq!(defense.state(), PipelineState::Init);

        let lines = vec![
            Ok(alert("203.0.113.7", 1000001)),
            Ok("garbage".to_string()),
            Ok(alert("203.0.113.9", 5)),
        ];
        let stats = defense.run(lines).unwrap();

        assert_eq!(defense.state(), PipelineState::Stopped);
        assert_eq!(stats.lines, 3);
        assert_eq!(stats.alerts(), 2);
        assert_eq!(stats.blocked, 1);
        assert_eq!(stats.alert_only, 1);
        assert_eq!(stats.malformed, 1);
    }

    #[test]
    fn test_stream_error_stops_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut defense = new_defense(&dir, TableFirewall::default());

        let lines = vec![
            Ok(alert("203.0.113.7", 9)),
            Err(TailError::Io(std::io::Error::new(std::io::ErrorKind::Other, "device gone"))),
            Ok(alert("203.0.113.8", 9)),
        ];
        let result = defense.run(lines);

        assert!(matches!(result, Err(PipelineError::Runtime(_))));
        assert_eq!(defense.state(), PipelineState::Stopped);
        assert_eq!(defense.store().count().unwrap(), 1);
    }

    #[test]
    fn test_action_mapping() {
        assert_eq!(action_for(EnforcementOutcome::BlockedNew), IncidentAction::IpBlocked);
        assert_eq!(action_for(EnforcementOutcome::AlreadyBlocked), IncidentAction::AlreadyBlocked);
        assert_eq!(action_for(EnforcementOutcome::BlockFailed), IncidentAction::BlockFailed);
        assert_eq!(action_for(EnforcementOutcome::Exempt), IncidentAction::BlockSkipped);
        assert_eq!(action_for(EnforcementOutcome::NotAttempted), IncidentAction::AlertOnly);
    }

    #[test]
    fn test_missing_source_does_not_open_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.input.alert_log = dir.path().join("eve.json");
        config.enforcement.mirror_file = dir.path().join("blocked_ips.txt");

        let mut opened = false;
        let result = run_pipeline(
            &config,
            TableFirewall::default(),
            || {
                opened = true;
                SqliteAuditStore::in_memory()
            },
            &crate::sleeper::MockSleeper,
            &crate::signal::AlwaysShutdown,
        );

        assert!(matches!(
            result,
            Err(PipelineError::Startup(StartupError::AlertSourceMissing(_)))
        ));
        assert!(!opened);
    }
}
