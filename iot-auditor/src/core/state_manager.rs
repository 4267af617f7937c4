/*!
Per-device history used by the stateful detectors.

History lives only in memory for the lifetime of the process; a restarted
auditor starts every device from the bootstrap state again.
*/

use std::collections::HashMap;

use iot_audit_trail::DeviceEvent;
use tracing::debug;

/// Last states seen for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHistory {
    pub actual_state: String,
    pub reported_state: String,
}

impl DeviceHistory {
    pub fn of(event: &DeviceEvent) -> Self {
        Self {
            actual_state: event.actual_state.clone(),
            reported_state: event.reported_state.clone(),
        }
    }
}

/// Device-keyed history map. Each device only ever sees its own entry.
#[derive(Debug, Default)]
pub struct StateManager {
    histories: HashMap<String, DeviceHistory>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, device: &str) -> Option<&DeviceHistory> {
        self.histories.get(device)
    }

    /// Replace the device's history, returning the one it had before
    pub fn record(&mut self, device: &str, current: DeviceHistory) -> Option<DeviceHistory> {
        match self.histories.get_mut(device) {
            Some(slot) => Some(std::mem::replace(slot, current)),
            None => {
                debug!("First event seen for device {}", device);
                self.histories.insert(device.to_string(), current);
                None
            }
        }
    }

    pub fn device_count(&self) -> usize {
        self.histories.len()
    }
}
