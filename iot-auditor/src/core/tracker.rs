/*!
Main async coordinator that orchestrates ingestion, detection and recording
*/

use std::future::Future;

use chrono::{DateTime, Utc};
use iot_audit_trail::{AuditRecord, TrailStats};
use tokio_stream::{Stream, StreamExt};
use tracing::{error, info, warn};

use crate::core::{
    config::AuditorConfig,
    detection_engine::DetectionEngine,
    error::{AuditorError, IngestionErrorKind},
    event_system::{EventProcessor, IngestEvent},
    output_plugins::OutputManager,
};

/// Why the processing loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The input reached end of stream
    EndOfInput,
    /// An external shutdown request arrived
    Interrupted,
    /// A fatal error ended processing
    Failed,
}

/// Statistics about the auditor's operation
#[derive(Debug, Clone)]
pub struct TrackerStats {
    pub records: TrailStats,
    pub malformed_records: u64,
    pub missing_fields: u64,
    pub devices_tracked: usize,
    pub started_at: DateTime<Utc>,
    pub stop_reason: Option<StopReason>,
}

impl TrackerStats {
    fn new() -> Self {
        Self {
            records: TrailStats::default(),
            malformed_records: 0,
            missing_fields: 0,
            devices_tracked: 0,
            started_at: Utc::now(),
            stop_reason: None,
        }
    }

    pub fn rejected_lines(&self) -> u64 {
        self.malformed_records + self.missing_fields
    }
}

/// Main auditor that coordinates all components
pub struct AuditTracker {
    config: AuditorConfig,
    event_processor: EventProcessor,
    detection_engine: DetectionEngine,
    output_manager: OutputManager,
    stats: TrackerStats,
}

impl AuditTracker {
    /// Create the auditor and open its outputs. Fails if the trail cannot be opened.
    pub async fn new(config: AuditorConfig) -> Result<Self, AuditorError> {
        let output_manager = OutputManager::new(&config.trail, &config.outputs);
        Self::with_output_manager(config, output_manager).await
    }

    pub async fn with_output_manager(
        config: AuditorConfig,
        mut output_manager: OutputManager,
    ) -> Result<Self, AuditorError> {
        info!("Initializing IoT integrity auditor...");

        let event_processor = EventProcessor::new(config.input.clone());
        let detection_engine = DetectionEngine::new(&config.detection);

        // Initialize output handlers
        output_manager.initialize().await?;

        Ok(Self {
            config,
            event_processor,
            detection_engine,
            output_manager,
            stats: TrackerStats::new(),
        })
    }

    /// Run over the configured input until it ends or `shutdown` resolves
    pub async fn run<F>(&mut self, shutdown: F) -> Result<TrackerStats, AuditorError>
    where
        F: Future<Output = ()>,
    {
        let stream = match self.event_processor.start().await {
            Ok(stream) => stream,
            Err(e) => {
                self.stats.stop_reason = Some(StopReason::Failed);
                if let Err(finalize_error) = self.output_manager.finalize().await {
                    error!("Failed to close outputs: {}", finalize_error);
                }
                return Err(e);
            }
        };
        self.run_stream(stream, shutdown).await
    }

    /// Run over any ingest stream.
    ///
    /// Shutdown is only observed while waiting for the next item, so an event
    /// that has been read is always fully recorded before the loop exits.
    /// Outputs are finalized on every exit path.
    pub async fn run_stream<S, F>(&mut self, stream: S, shutdown: F) -> Result<TrackerStats, AuditorError>
    where
        S: Stream<Item = IngestEvent>,
        F: Future<Output = ()>,
    {
        info!("🚀 Starting IoT integrity auditor");
        info!("💾 Audit trail: {:?}", self.config.trail.path);
        info!("🔍 Detectors: {:?}", self.detection_engine.detector_names());

        let mut stream = std::pin::pin!(stream);
        let mut shutdown = std::pin::pin!(shutdown);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("🛑 Shutdown requested");
                    self.stats.stop_reason = Some(StopReason::Interrupted);
                    break Ok(());
                }
                next = stream.next() => match next {
                    Some(event) => {
                        if let Err(e) = self.handle_event(event).await {
                            self.stats.stop_reason = Some(StopReason::Failed);
                            break Err(e);
                        }
                    }
                    None => {
                        info!("Input stream closed");
                        self.stats.stop_reason = Some(StopReason::EndOfInput);
                        break Ok(());
                    }
                },
            }
        };

        // Cleanup
        let finalized = self.output_manager.finalize().await;
        self.stats.devices_tracked = self.detection_engine.tracked_devices();
        self.log_summary();

        outcome?;
        finalized?;
        info!("🏁 Auditor stopped gracefully");
        Ok(self.stats.clone())
    }

    /// Handle a single ingest item
    async fn handle_event(&mut self, event: IngestEvent) -> Result<(), AuditorError> {
        match event {
            IngestEvent::Accepted { event, .. } => {
                let alerts = self.detection_engine.classify(&event);
                let record = AuditRecord::from_event(&event, alerts, Utc::now());
                self.output_manager.handle_record(&record).await?;
                self.stats.records.add(&record);
            }
            IngestEvent::Rejected(err) => {
                warn!("⚠️ Skipping {}", err);
                match err.kind {
                    IngestionErrorKind::MalformedRecord(_) => self.stats.malformed_records += 1,
                    IngestionErrorKind::MissingField(_) => self.stats.missing_fields += 1,
                }
            }
            IngestEvent::ReadFailed { line, error } => {
                error!("Reading input failed at line {}: {}", line, error);
                return Err(AuditorError::Input(error));
            }
        }
        Ok(())
    }

    /// Get current auditor statistics
    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }

    fn log_summary(&self) {
        let records = &self.stats.records;
        info!(
            "📈 {} records ({} compliant, {} spoofing, {} masking, {} tls_violation), {} lines rejected, {} devices, running since {}",
            records.total,
            records.compliant,
            records.spoofing,
            records.masking,
            records.tls_violation,
            self.stats.rejected_lines(),
            self.stats.devices_tracked,
            self.stats.started_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}
