/*!
Configuration management for the auditor
*/

use std::path::{Path, PathBuf};

use iot_audit_trail::Violation;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::error::AuditorError;

/// Default insecure transport schemes
pub const DEFAULT_INSECURE_SCHEMES: [&str; 3] = ["http", "mqtt", "ws"];

/// Longest accepted input line, in bytes
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditorConfig {
    /// Where telemetry is read from
    pub input: InputConfig,
    /// Audit trail settings
    pub trail: TrailConfig,
    /// Detection behavior settings
    pub detection: DetectionConfig,
    /// Status reporters
    pub outputs: Vec<OutputConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InputConfig {
    #[serde(flatten)]
    pub source: InputSource,
    /// Lines longer than this are rejected as malformed without being buffered
    pub max_line_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum InputSource {
    Stdin,
    File { path: PathBuf },
    /// Accept a single event-source connection on this address
    Tcp { listen: String },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrailConfig {
    /// Append-only JSONL audit trail
    pub path: PathBuf,
    /// Sync file data to disk after every record
    pub sync: bool,
    /// Hold an exclusive advisory lock so only one auditor appends
    pub lock: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Enabled detectors. Alerts are always emitted in evaluation order,
    /// whatever order is listed here.
    pub detectors: Vec<Violation>,
    pub transport: TransportPolicyConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TransportPolicyConfig {
    /// Flag the listed schemes
    Denylist { schemes: Vec<String> },
    /// Flag everything except the listed schemes
    Allowlist { schemes: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(flatten)]
    pub plugin: OutputPlugin,
    /// Whether this output is enabled
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputPlugin {
    Terminal {
        #[serde(default)]
        format: TerminalFormat,
    },
    /// Verdicts as structured tracing events
    Tracing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalFormat {
    #[default]
    Plain,
    Colored,
    Json,
}

impl std::str::FromStr for TerminalFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(TerminalFormat::Plain),
            "colored" | "color" => Ok(TerminalFormat::Colored),
            "json" => Ok(TerminalFormat::Json),
            other => Err(format!("unknown terminal format `{}`", other)),
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

impl Default for AuditorConfig {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            trail: TrailConfig::default(),
            detection: DetectionConfig::default(),
            outputs: vec![OutputConfig {
                plugin: OutputPlugin::Terminal {
                    format: TerminalFormat::Plain,
                },
                enabled: true,
            }],
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            source: InputSource::Stdin,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("audit_log.jsonl"),
            sync: true,
            lock: true,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            detectors: Violation::ALL.to_vec(),
            transport: TransportPolicyConfig::default(),
        }
    }
}

impl Default for TransportPolicyConfig {
    fn default() -> Self {
        TransportPolicyConfig::Denylist {
            schemes: DEFAULT_INSECURE_SCHEMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AuditorConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, AuditorError> {
        let config: AuditorConfig =
            toml::from_str(content).map_err(|e| AuditorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self, AuditorError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AuditorError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// `<config dir>/iot-auditor/auditor.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("iot-auditor").join("auditor.toml"))
    }

    /// Load the explicit file if given, else the per-user file if it exists,
    /// else built-in defaults
    pub async fn resolve(explicit: Option<&Path>) -> Result<Self, AuditorError> {
        if let Some(path) = explicit {
            return Self::load(path).await;
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path).await,
            _ => {
                debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), AuditorError> {
        if self.trail.path.as_os_str().is_empty() {
            return Err(AuditorError::Config("trail.path must not be empty".to_string()));
        }
        if self.input.max_line_bytes == 0 {
            return Err(AuditorError::Config("input.max_line_bytes must be positive".to_string()));
        }
        let schemes = match &self.detection.transport {
            TransportPolicyConfig::Denylist { schemes } | TransportPolicyConfig::Allowlist { schemes } => schemes,
        };
        if schemes.iter().any(|s| normalize_scheme(s).is_empty()) {
            return Err(AuditorError::Config("transport schemes must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn apply(&mut self, overrides: CliOverrides) -> Result<(), AuditorError> {
        if let Some(path) = overrides.input {
            self.input.source = InputSource::File { path };
        }
        if let Some(listen) = overrides.listen {
            self.input.source = InputSource::Tcp { listen };
        }
        if let Some(path) = overrides.trail {
            self.trail.path = path;
        }
        if overrides.no_sync {
            self.trail.sync = false;
        }
        if overrides.no_lock {
            self.trail.lock = false;
        }
        if let Some(format) = overrides.format {
            self.outputs.retain(|o| !matches!(o.plugin, OutputPlugin::Terminal { .. }));
            self.outputs.insert(
                0,
                OutputConfig {
                    plugin: OutputPlugin::Terminal { format },
                    enabled: true,
                },
            );
        }
        if overrides.quiet {
            self.outputs.retain(|o| !matches!(o.plugin, OutputPlugin::Terminal { .. }));
        }
        if !overrides.insecure_schemes.is_empty() {
            self.detection.transport = TransportPolicyConfig::Denylist {
                schemes: overrides.insecure_schemes,
            };
        }
        self.validate()
    }
}

/// Command line settings that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub input: Option<PathBuf>,
    pub listen: Option<String>,
    pub trail: Option<PathBuf>,
    pub format: Option<TerminalFormat>,
    pub quiet: bool,
    pub insecure_schemes: Vec<String>,
    pub no_sync: bool,
    pub no_lock: bool,
}

/// Lower-case a configured scheme and drop an optional `://` suffix
pub fn normalize_scheme(scheme: &str) -> String {
    let scheme = scheme.trim();
    scheme.strip_suffix("://").unwrap_or(scheme).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuditorConfig::default();
        assert_eq!(config.input.source, InputSource::Stdin);
        assert_eq!(config.trail.path, PathBuf::from("audit_log.jsonl"));
        assert!(config.trail.sync && config.trail.lock);
        assert_eq!(config.detection.detectors, Violation::ALL.to_vec());
        assert_eq!(
            config.detection.transport,
            TransportPolicyConfig::Denylist {
                schemes: vec!["http".to_string(), "mqtt".to_string(), "ws".to_string()]
            }
        );
        assert_eq!(config.outputs.len(), 1);
    }

    #[test]
    fn test_parse_full_file() {
        let config = AuditorConfig::from_toml_str(
            r#"
            [input]
            source = "tcp"
            listen = "127.0.0.1:7878"

            [trail]
            path = "/var/lib/auditor/trail.jsonl"
            sync = false

            [detection]
            detectors = ["tls_violation", "spoofing"]

            [detection.transport]
            mode = "allowlist"
            schemes = ["https", "mqtts", "wss"]

            [[outputs]]
            kind = "terminal"
            format = "colored"

            [[outputs]]
            kind = "tracing"
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(
            config.input.source,
            InputSource::Tcp {
                listen: "127.0.0.1:7878".to_string()
            }
        );
        assert_eq!(config.input.max_line_bytes, DEFAULT_MAX_LINE_BYTES);
        assert!(!config.trail.sync);
        assert!(config.trail.lock);
        assert_eq!(
            config.detection.detectors,
            vec![Violation::TlsViolation, Violation::Spoofing]
        );
        assert!(matches!(
            config.detection.transport,
            TransportPolicyConfig::Allowlist { .. }
        ));
        assert_eq!(
            config.outputs[0].plugin,
            OutputPlugin::Terminal {
                format: TerminalFormat::Colored
            }
        );
        assert!(!config.outputs[1].enabled);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AuditorConfig::from_toml_str("[trail]\npath = \"x.jsonl\"\n").unwrap();
        assert_eq!(config.trail.path, PathBuf::from("x.jsonl"));
        assert_eq!(config.input.source, InputSource::Stdin);
        assert_eq!(config.outputs.len(), 1);
    }

    #[test]
    fn test_invalid_file() {
        assert!(matches!(
            AuditorConfig::from_toml_str("[trail]\npath = 5\n"),
            Err(AuditorError::Config(_))
        ));
        assert!(matches!(
            AuditorConfig::from_toml_str("[detection.transport]\nmode = \"denylist\"\nschemes = [\"://\"]\n"),
            Err(AuditorError::Config(_))
        ));
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = AuditorConfig::default();
        config
            .apply(CliOverrides {
                listen: Some("0.0.0.0:9000".to_string()),
                trail: Some(PathBuf::from("other.jsonl")),
                format: Some(TerminalFormat::Json),
                insecure_schemes: vec!["HTTP://".to_string(), "ftp".to_string()],
                no_sync: true,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(
            config.input.source,
            InputSource::Tcp {
                listen: "0.0.0.0:9000".to_string()
            }
        );
        assert_eq!(config.trail.path, PathBuf::from("other.jsonl"));
        assert!(!config.trail.sync);
        assert_eq!(config.outputs.len(), 1);
        assert_eq!(
            config.outputs[0].plugin,
            OutputPlugin::Terminal {
                format: TerminalFormat::Json
            }
        );
        assert!(matches!(
            config.detection.transport,
            TransportPolicyConfig::Denylist { ref schemes } if schemes.len() == 2
        ));
    }

    #[test]
    fn test_quiet_drops_terminal() {
        let mut config = AuditorConfig::default();
        config
            .apply(CliOverrides {
                quiet: true,
                ..Default::default()
            })
            .unwrap();
        assert!(config.outputs.is_empty());
    }

    #[test]
    fn test_normalize_scheme() {
        assert_eq!(normalize_scheme(" MQTT:// "), "mqtt");
        assert_eq!(normalize_scheme("wss"), "wss");
    }
}
