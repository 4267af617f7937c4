/*!
Modular output system: the audit trail and the operator-facing status reporters
*/

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use fs2::FileExt;
use iot_audit_trail::AuditRecord;
use tracing::{error, info, warn};

use crate::core::{
    config::{OutputConfig, OutputPlugin, TerminalFormat, TrailConfig},
    error::AuditorError,
};

/// Trait for output plugins
#[async_trait]
pub trait OutputHandler: Send {
    /// Name of the output handler
    fn name(&self) -> &'static str;

    /// A failing critical handler stops the auditor; other failures are logged
    fn is_critical(&self) -> bool {
        false
    }

    /// Initialize the output handler (open files, print banners, etc.)
    async fn initialize(&mut self) -> Result<(), AuditorError>;

    /// Handle one audit record
    async fn handle_record(&mut self, record: &AuditRecord) -> Result<(), AuditorError>;

    /// Cleanup/finalize the output handler
    async fn finalize(&mut self) -> Result<(), AuditorError>;
}

/// Manages the audit trail and the enabled status reporters.
///
/// Handlers run in registration order and the trail is always registered
/// first, so a verdict is only reported once it has been recorded.
pub struct OutputManager {
    handlers: Vec<Box<dyn OutputHandler>>,
}

impl OutputManager {
    pub fn new(trail: &TrailConfig, configs: &[OutputConfig]) -> Self {
        let mut handlers: Vec<Box<dyn OutputHandler>> = vec![Box::new(AuditTrailHandler::new(trail))];

        for config in configs {
            if !config.enabled {
                continue;
            }

            let handler: Box<dyn OutputHandler> = match config.plugin {
                OutputPlugin::Terminal { format } => Box::new(TerminalOutputHandler::new(format)),
                OutputPlugin::Tracing => Box::new(TracingOutputHandler),
            };

            handlers.push(handler);
        }

        info!("Initialized output manager with {} handlers", handlers.len());
        Self { handlers }
    }

    pub fn with_handlers(handlers: Vec<Box<dyn OutputHandler>>) -> Self {
        Self { handlers }
    }

    /// Initialize all handlers
    pub async fn initialize(&mut self) -> Result<(), AuditorError> {
        for handler in &mut self.handlers {
            match handler.initialize().await {
                Ok(()) => info!("Initialized output handler: {}", handler.name()),
                Err(e) if handler.is_critical() => return Err(e),
                Err(e) => warn!("Output handler {} failed to start: {}", handler.name(), e),
            }
        }
        Ok(())
    }

    /// Send a record to every handler
    pub async fn handle_record(&mut self, record: &AuditRecord) -> Result<(), AuditorError> {
        for handler in &mut self.handlers {
            if let Err(e) = handler.handle_record(record).await {
                if handler.is_critical() {
                    return Err(e);
                }
                error!(
                    "Handler {} failed to process event {}: {}",
                    handler.name(),
                    record.event_id,
                    e
                );
            }
        }
        Ok(())
    }

    /// Finalize all handlers, even if one of them fails
    pub async fn finalize(&mut self) -> Result<(), AuditorError> {
        let mut result = Ok(());
        for handler in &mut self.handlers {
            if let Err(e) = handler.finalize().await {
                if handler.is_critical() && result.is_ok() {
                    result = Err(e);
                } else {
                    warn!("Output handler {} failed to finalize: {}", handler.name(), e);
                }
            }
        }
        result
    }
}

/// Append-only JSONL audit trail
pub struct AuditTrailHandler {
    path: PathBuf,
    sync: bool,
    lock: bool,
    file: Option<File>,
    records_written: u64,
}

impl AuditTrailHandler {
    pub fn new(config: &TrailConfig) -> Self {
        Self {
            path: config.path.clone(),
            sync: config.sync,
            lock: config.lock,
            file: None,
            records_written: 0,
        }
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    fn unavailable(&self, source: std::io::Error) -> AuditorError {
        AuditorError::trail(&self.path, source)
    }
}

#[async_trait]
impl OutputHandler for AuditTrailHandler {
    fn name(&self) -> &'static str {
        "AuditTrail"
    }

    fn is_critical(&self) -> bool {
        true
    }

    async fn initialize(&mut self) -> Result<(), AuditorError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.unavailable(e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.unavailable(e))?;

        if self.lock {
            FileExt::try_lock_exclusive(&file).map_err(|e| {
                self.unavailable(std::io::Error::new(
                    e.kind(),
                    format!("already locked by another writer ({})", e),
                ))
            })?;
        }

        info!("📝 Appending audit records to {:?}", self.path);
        self.file = Some(file);
        Ok(())
    }

    async fn handle_record(&mut self, record: &AuditRecord) -> Result<(), AuditorError> {
        let mut line = record.to_json_line()?;
        line.push('\n');

        let result = match self.file.as_mut() {
            Some(file) => file.write_all(line.as_bytes()).and_then(|()| {
                if self.sync {
                    file.sync_data()
                } else {
                    file.flush()
                }
            }),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "audit trail is not open",
            )),
        };
        result.map_err(|e| self.unavailable(e))?;

        self.records_written += 1;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), AuditorError> {
        if let Some(mut file) = self.file.take() {
            let synced = file.flush().and_then(|()| file.sync_all());
            if self.lock {
                if let Err(e) = FileExt::unlock(&file) {
                    warn!("Failed to unlock audit trail {:?}: {}", self.path, e);
                }
            }
            synced.map_err(|e| self.unavailable(e))?;
            info!(
                "Audit trail {:?} closed after {} records",
                self.path, self.records_written
            );
        }
        Ok(())
    }
}

/// Terminal status reporter, writing to stderr
pub struct TerminalOutputHandler {
    format: TerminalFormat,
}

impl TerminalOutputHandler {
    pub fn new(format: TerminalFormat) -> Self {
        Self { format }
    }

    pub fn format_record(&self, record: &AuditRecord) -> String {
        match self.format {
            TerminalFormat::Plain => format!(
                "event={:03} device={:<10} actual={:<11} reported={:<11} conn={:<45} result={}",
                record.event_id,
                record.device,
                record.actual_state,
                record.reported_state,
                record.network_attempt,
                record.alerts
            ),
            TerminalFormat::Colored => {
                let verdict = if record.is_compliant() {
                    format!("\x1b[32m✅ {}\x1b[0m", record.alerts)
                } else {
                    format!("\x1b[31m🚨 {}\x1b[0m", record.alerts)
                };
                format!(
                    "\x1b[36mevent=\x1b[0m{:03} \x1b[36mdevice=\x1b[0m{:<10} \x1b[36mactual=\x1b[0m{:<11} \x1b[36mreported=\x1b[0m{:<11} \x1b[36mconn=\x1b[0m{:<45} {}",
                    record.event_id,
                    record.device,
                    record.actual_state,
                    record.reported_state,
                    record.network_attempt,
                    verdict
                )
            }
            TerminalFormat::Json => record
                .to_json_line()
                .unwrap_or_else(|_| "JSON serialization failed".to_string()),
        }
    }

    fn emit(&self, line: &str) -> Result<(), AuditorError> {
        let mut stderr = std::io::stderr().lock();
        writeln!(stderr, "{}", line).map_err(|source| AuditorError::Output {
            handler: "Terminal",
            source,
        })
    }
}

#[async_trait]
impl OutputHandler for TerminalOutputHandler {
    fn name(&self) -> &'static str {
        "Terminal"
    }

    async fn initialize(&mut self) -> Result<(), AuditorError> {
        match self.format {
            TerminalFormat::Colored => self.emit("\x1b[32m🛡️  IoT integrity auditor started\x1b[0m"),
            TerminalFormat::Plain => self.emit("[TEE] Auditor running..."),
            TerminalFormat::Json => Ok(()),
        }
    }

    async fn handle_record(&mut self, record: &AuditRecord) -> Result<(), AuditorError> {
        let line = self.format_record(record);
        self.emit(&line)
    }

    async fn finalize(&mut self) -> Result<(), AuditorError> {
        match self.format {
            TerminalFormat::Colored => self.emit("\x1b[33m🏁 IoT integrity auditor stopped\x1b[0m"),
            TerminalFormat::Plain => self.emit("[TEE] Auditor stopped."),
            TerminalFormat::Json => Ok(()),
        }
    }
}

/// Emits each verdict as a structured tracing event
pub struct TracingOutputHandler;

#[async_trait]
impl OutputHandler for TracingOutputHandler {
    fn name(&self) -> &'static str {
        "Tracing"
    }

    async fn initialize(&mut self) -> Result<(), AuditorError> {
        Ok(())
    }

    async fn handle_record(&mut self, record: &AuditRecord) -> Result<(), AuditorError> {
        if record.is_compliant() {
            info!(
                target: "iot_auditor::verdict",
                event_id = record.event_id,
                device = %record.device,
                "compliant"
            );
        } else {
            warn!(
                target: "iot_auditor::verdict",
                event_id = record.event_id,
                device = %record.device,
                alerts = %record.alerts,
                "integrity violation"
            );
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), AuditorError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iot_audit_trail::{AlertSet, Violation, load_trail};

    fn record(event_id: u64, alerts: &[Violation]) -> AuditRecord {
        AuditRecord {
            time_tee: 1_700_000_000.5,
            event_id,
            device: "camera_1".to_string(),
            actual_state: "camera_on".to_string(),
            reported_state: "camera_off".to_string(),
            network_attempt: "http://api.insecure-server.com/data".to_string(),
            alerts: alerts.iter().copied().collect::<AlertSet>(),
        }
    }

    fn trail_config(path: PathBuf) -> TrailConfig {
        TrailConfig {
            path,
            sync: true,
            lock: true,
        }
    }

    #[tokio::test]
    async fn test_trail_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit_log.jsonl");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("{}\n", record(0, &[]).to_json_line().unwrap())).unwrap();

        let mut handler = AuditTrailHandler::new(&trail_config(path.clone()));
        handler.initialize().await.unwrap();
        handler.handle_record(&record(1, &[Violation::Spoofing])).await.unwrap();
        handler.handle_record(&record(2, &[])).await.unwrap();
        handler.finalize().await.unwrap();
        assert_eq!(handler.records_written(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with('\n'));
        assert_eq!(content.lines().count(), 3);

        let snapshot = load_trail(&path).unwrap();
        assert_eq!(snapshot.skipped_lines, 0);
        assert_eq!(snapshot.records[1], record(1, &[Violation::Spoofing]));
    }

    #[tokio::test]
    async fn test_trail_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("trail.jsonl");
        let mut handler = AuditTrailHandler::new(&trail_config(path.clone()));
        handler.initialize().await.unwrap();
        handler.finalize().await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_second_writer_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trail.jsonl");

        let mut first = AuditTrailHandler::new(&trail_config(path.clone()));
        first.initialize().await.unwrap();

        let mut second = AuditTrailHandler::new(&trail_config(path.clone()));
        assert!(matches!(
            second.initialize().await,
            Err(AuditorError::TrailUnavailable { .. })
        ));

        first.finalize().await.unwrap();
        second.initialize().await.unwrap();
        second.finalize().await.unwrap();
    }

    #[tokio::test]
    async fn test_unwritable_trail_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // a directory cannot be opened for appending
        let mut manager = OutputManager::new(&trail_config(dir.path().to_path_buf()), &[]);
        assert!(matches!(
            manager.initialize().await,
            Err(AuditorError::TrailUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_record_before_open_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut handler = AuditTrailHandler::new(&trail_config(dir.path().join("t.jsonl")));
        assert!(matches!(
            handler.handle_record(&record(1, &[])).await,
            Err(AuditorError::TrailUnavailable { .. })
        ));
    }

    #[test]
    fn test_plain_status_line() {
        let handler = TerminalOutputHandler::new(TerminalFormat::Plain);
        let line = handler.format_record(&record(1, &[Violation::Spoofing, Violation::TlsViolation]));
        assert!(line.starts_with("event=001 device=camera_1 "));
        assert!(line.ends_with("result=spoofing, tls_violation"));

        let line = handler.format_record(&record(12, &[]));
        assert!(line.starts_with("event=012 "));
        assert!(line.ends_with("result=OK"));
    }

    #[test]
    fn test_json_status_line() {
        let handler = TerminalOutputHandler::new(TerminalFormat::Json);
        let line = handler.format_record(&record(3, &[Violation::Masking]));
        assert_eq!(AuditRecord::from_json_line(&line).unwrap(), record(3, &[Violation::Masking]));
    }

    #[test]
    fn test_manager_skips_disabled_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = vec![
            OutputConfig {
                plugin: OutputPlugin::Terminal {
                    format: TerminalFormat::Plain,
                },
                enabled: false,
            },
            OutputConfig {
                plugin: OutputPlugin::Tracing,
                enabled: true,
            },
        ];
        let manager = OutputManager::new(&trail_config(dir.path().join("t.jsonl")), &outputs);
        let names: Vec<&str> = manager.handlers.iter().map(|h| h.name()).collect();
        assert_eq!(names, vec!["AuditTrail", "Tracing"]);
    }
}
