/*!
Detection engine classifying each event into zero or more integrity violations
*/

use std::collections::HashSet;

use iot_audit_trail::{AlertSet, DeviceEvent, Violation};
use tracing::{debug, info};

use crate::core::{
    config::{DetectionConfig, TransportPolicyConfig, normalize_scheme},
    state_manager::{DeviceHistory, StateManager},
};

/// Trait for violation detectors
pub trait ViolationDetector: Send + Sync {
    /// Name of the detector
    fn name(&self) -> &'static str;

    /// Tag raised when the detector fires
    fn violation(&self) -> Violation;

    /// `previous` is the history of the event's own device, `None` on the
    /// first event seen for it
    fn detect(&self, event: &DeviceEvent, previous: Option<&DeviceHistory>) -> bool;
}

/// Reported state differs from the physical state
pub struct SpoofingDetector;

impl ViolationDetector for SpoofingDetector {
    fn name(&self) -> &'static str {
        "Spoofing"
    }

    fn violation(&self) -> Violation {
        Violation::Spoofing
    }

    fn detect(&self, event: &DeviceEvent, _previous: Option<&DeviceHistory>) -> bool {
        event.actual_state != event.reported_state
    }
}

/// Physical state changed but the reported state stayed put
pub struct MaskingDetector;

impl ViolationDetector for MaskingDetector {
    fn name(&self) -> &'static str {
        "Masking"
    }

    fn violation(&self) -> Violation {
        Violation::Masking
    }

    fn detect(&self, event: &DeviceEvent, previous: Option<&DeviceHistory>) -> bool {
        match previous {
            // nothing to compare against yet
            None => false,
            Some(prev) => {
                event.actual_state != prev.actual_state && event.reported_state == prev.reported_state
            }
        }
    }
}

/// Which declared transport schemes are acceptable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportPolicy {
    /// Flag only these schemes; unknown schemes pass
    Denylist(HashSet<String>),
    /// Flag everything but these schemes, including URIs without a scheme
    Allowlist(HashSet<String>),
}

impl TransportPolicy {
    pub fn from_config(config: &TransportPolicyConfig) -> Self {
        fn normalize(schemes: &[String]) -> HashSet<String> {
            schemes.iter().map(|s| normalize_scheme(s)).collect()
        }
        match config {
            TransportPolicyConfig::Denylist { schemes } => TransportPolicy::Denylist(normalize(schemes)),
            TransportPolicyConfig::Allowlist { schemes } => TransportPolicy::Allowlist(normalize(schemes)),
        }
    }

    pub fn violates(&self, network_attempt: &str) -> bool {
        let scheme = scheme_of(network_attempt);
        match self {
            TransportPolicy::Denylist(schemes) => scheme.is_some_and(|s| schemes.contains(&s)),
            TransportPolicy::Allowlist(schemes) => !scheme.is_some_and(|s| schemes.contains(&s)),
        }
    }
}

/// Lower-cased text before the first `://`, if any
pub fn scheme_of(uri: &str) -> Option<String> {
    uri.find("://").map(|end| uri[..end].to_lowercase())
}

/// Declared endpoint uses a transport the policy rejects
pub struct TransportPolicyDetector {
    policy: TransportPolicy,
}

impl TransportPolicyDetector {
    pub fn new(policy: TransportPolicy) -> Self {
        Self { policy }
    }
}

impl ViolationDetector for TransportPolicyDetector {
    fn name(&self) -> &'static str {
        "TransportPolicy"
    }

    fn violation(&self) -> Violation {
        Violation::TlsViolation
    }

    fn detect(&self, event: &DeviceEvent, _previous: Option<&DeviceHistory>) -> bool {
        self.policy.violates(&event.network_attempt)
    }
}

/// Runs the detectors in evaluation order and owns the per-device history
pub struct DetectionEngine {
    detectors: Vec<Box<dyn ViolationDetector>>,
    state: StateManager,
}

impl DetectionEngine {
    pub fn new(config: &DetectionConfig) -> Self {
        let mut detectors: Vec<Box<dyn ViolationDetector>> = vec![
            Box::new(SpoofingDetector),
            Box::new(MaskingDetector),
            Box::new(TransportPolicyDetector::new(TransportPolicy::from_config(
                &config.transport,
            ))),
        ];

        // Filter detectors based on configuration
        detectors.retain(|detector| config.detectors.contains(&detector.violation()));

        info!("Initialized detection engine with {} detectors", detectors.len());

        Self {
            detectors,
            state: StateManager::new(),
        }
    }

    /// Classify one event.
    ///
    /// Every detector sees the same pre-event history; the device's history is
    /// then replaced with this event's states whether or not anything fired.
    pub fn classify(&mut self, event: &DeviceEvent) -> AlertSet {
        let previous = self.state.record(&event.device, DeviceHistory::of(event));
        let mut alerts = AlertSet::new();

        for detector in &self.detectors {
            if detector.detect(event, previous.as_ref()) {
                debug!(
                    "{} detector fired for event {} on {}",
                    detector.name(),
                    event.event_id,
                    event.device
                );
                alerts.insert(detector.violation());
            }
        }

        alerts
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn tracked_devices(&self) -> usize {
        self.state.device_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: u64, device: &str, actual: &str, reported: &str, net: &str) -> DeviceEvent {
        DeviceEvent {
            event_id: id,
            timestamp: None,
            device: device.to_string(),
            actual_state: actual.to_string(),
            reported_state: reported.to_string(),
            network_attempt: net.to_string(),
            spoof_attempt: None,
        }
    }

    fn engine() -> DetectionEngine {
        DetectionEngine::new(&DetectionConfig::default())
    }

    #[test]
    fn test_first_event_spoofing_and_tls_but_no_masking() {
        let mut engine = engine();
        let alerts = engine.classify(&event(1, "camera_1", "camera_on", "camera_off", "http://x"));
        assert_eq!(alerts.as_slice(), &[Violation::Spoofing, Violation::TlsViolation]);
    }

    #[test]
    fn test_masking_after_unreported_change() {
        let mut engine = engine();
        engine.classify(&event(1, "camera_1", "camera_on", "camera_off", "http://x"));
        let alerts = engine.classify(&event(2, "camera_1", "camera_off", "camera_off", "https://y"));
        assert_eq!(alerts.as_slice(), &[Violation::Masking]);
    }

    #[test]
    fn test_reported_change_is_not_masking() {
        let mut engine = engine();
        engine.classify(&event(1, "camera_1", "camera_off", "camera_off", "https://y"));
        let alerts = engine.classify(&event(2, "camera_1", "camera_on", "camera_on", "https://y"));
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_history_updates_even_without_alert() {
        let mut engine = engine();
        engine.classify(&event(1, "camera_1", "camera_off", "camera_off", "wss://z"));
        // reported follows the change: no masking, but history moves on
        assert!(engine.classify(&event(2, "camera_1", "camera_on", "camera_on", "wss://z")).is_empty());
        // now the change back is hidden
        let alerts = engine.classify(&event(3, "camera_1", "camera_off", "camera_on", "wss://z"));
        assert_eq!(alerts.as_slice(), &[Violation::Spoofing, Violation::Masking]);
    }

    #[test]
    fn test_devices_do_not_share_history() {
        let mut engine = engine();
        engine.classify(&event(1, "camera_1", "camera_on", "camera_on", "https://y"));
        // first event of camera_2: bootstrap, even though camera_1's state differs
        let alerts = engine.classify(&event(2, "camera_2", "camera_off", "camera_on", "https://y"));
        assert_eq!(alerts.as_slice(), &[Violation::Spoofing]);

        // camera_1 compares against its own event 1, not camera_2's event 2
        let alerts = engine.classify(&event(3, "camera_1", "camera_off", "camera_on", "https://y"));
        assert_eq!(alerts.as_slice(), &[Violation::Spoofing, Violation::Masking]);

        // camera_2 unchanged physically: no masking
        let alerts = engine.classify(&event(4, "camera_2", "camera_off", "camera_off", "https://y"));
        assert!(alerts.is_empty());
        assert_eq!(engine.tracked_devices(), 2);
    }

    #[test]
    fn test_transport_schemes() {
        let policy = TransportPolicy::from_config(&TransportPolicyConfig::default());
        for insecure in ["http://a", "HTTP://a", "mqtt://broker.local/publish", "Ws://stream.local/feed"] {
            assert!(policy.violates(insecure), "{} should violate", insecure);
        }
        for secure in [
            "https://api.secure-server.com/upload",
            "mqtts://broker.secure.net/data",
            "wss://stream.iotcloud.com/feed",
            "coap://sensor",
            "no-scheme-at-all",
            "",
        ] {
            assert!(!policy.violates(secure), "{} should pass", secure);
        }
    }

    #[test]
    fn test_allowlist_policy() {
        let policy = TransportPolicy::from_config(&TransportPolicyConfig::Allowlist {
            schemes: vec!["HTTPS://".to_string(), "wss".to_string()],
        });
        assert!(!policy.violates("https://a"));
        assert!(!policy.violates("WSS://a"));
        assert!(policy.violates("mqtts://a"));
        assert!(policy.violates("no-scheme"));
    }

    #[test]
    fn test_disabled_detectors_never_fire() {
        let mut engine = DetectionEngine::new(&DetectionConfig {
            detectors: vec![Violation::TlsViolation, Violation::Masking],
            ..Default::default()
        });
        assert_eq!(engine.detector_names(), vec!["Masking", "TransportPolicy"]);

        let alerts = engine.classify(&event(1, "camera_1", "camera_on", "camera_off", "http://x"));
        assert_eq!(alerts.as_slice(), &[Violation::TlsViolation]);
        let alerts = engine.classify(&event(2, "camera_1", "camera_off", "camera_off", "http://x"));
        assert_eq!(alerts.as_slice(), &[Violation::Masking, Violation::TlsViolation]);
    }

    #[test]
    fn test_spoofing_iff_states_differ() {
        let mut engine = engine();
        let states = ["camera_on", "camera_off", "unknown"];
        let mut id = 0;
        for actual in states {
            for reported in states {
                id += 1;
                let alerts = engine.classify(&event(id, &format!("dev_{}", id), actual, reported, "https://y"));
                assert_eq!(alerts.contains(Violation::Spoofing), actual != reported);
                assert!(!alerts.contains(Violation::Masking));
            }
        }
    }
}
