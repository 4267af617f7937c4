/*!
Telemetry record produced by the untrusted device, one JSON object per line
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ContractError;

/// A validated telemetry event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEvent {
    /// Monotonic per source, not unique across devices
    pub event_id: u64,
    /// Producer-side UNIX time in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    pub device: String,
    pub actual_state: String,
    pub reported_state: String,
    pub network_attempt: String,
    /// Set by the producer when it lied on purpose. Informational only; the
    /// auditor never reads it when classifying.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spoof_attempt: Option<bool>,
}

/// Wire shape before validation. Required fields are optional here so that a
/// missing field can be told apart from a syntax error.
#[derive(Debug, Deserialize)]
struct RawEvent {
    event_id: Option<u64>,
    #[serde(default)]
    timestamp: Value,
    device: Option<String>,
    actual_state: Option<String>,
    reported_state: Option<String>,
    network_attempt: Option<String>,
    #[serde(default)]
    spoof_attempt: Value,
}

impl RawEvent {
    fn validate(self) -> Result<DeviceEvent, ContractError> {
        let event_id = self.event_id.ok_or(ContractError::MissingField("event_id"))?;
        let device = self.device.ok_or(ContractError::MissingField("device"))?;
        let actual_state = self
            .actual_state
            .ok_or(ContractError::MissingField("actual_state"))?;
        let reported_state = self
            .reported_state
            .ok_or(ContractError::MissingField("reported_state"))?;
        let network_attempt = self
            .network_attempt
            .ok_or(ContractError::MissingField("network_attempt"))?;

        Ok(DeviceEvent {
            event_id,
            timestamp: self.timestamp.as_f64(),
            device,
            actual_state,
            reported_state,
            network_attempt,
            spoof_attempt: self.spoof_attempt.as_bool(),
        })
    }
}

impl DeviceEvent {
    /// Decode and validate one telemetry line.
    ///
    /// Required fields are checked in the order `event_id`, `device`,
    /// `actual_state`, `reported_state`, `network_attempt`; the first absent
    /// one is reported. `timestamp` and `spoof_attempt` are kept only when they
    /// carry the expected JSON type.
    pub fn from_json_line(line: &str) -> Result<Self, ContractError> {
        let raw: RawEvent = serde_json::from_str(line.trim())
            .map_err(|e| ContractError::Malformed(e.to_string()))?;
        raw.validate()
    }

    /// Serialize as a single line without the trailing newline
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
