/*!
Simulated untrusted device emitting telemetry for the auditor to classify.

Each tick one device (round-robin) may flip its physical camera state, may lie
about it while the camera is on, and attempts a connection to a random secure or
insecure endpoint.
*/

use std::time::Duration;

use chrono::Utc;
use iot_audit_trail::{DeviceEvent, unix_seconds};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

pub const SECURE_ENDPOINTS: [&str; 3] = [
    "https://api.secure-server.com/upload",
    "mqtts://broker.secure.net/data",
    "wss://stream.iotcloud.com/feed",
];

pub const INSECURE_ENDPOINTS: [&str; 3] = [
    "http://api.insecure-server.com/data",
    "mqtt://broker.local/publish",
    "ws://stream.local/feed",
];

const CAMERA_ON: &str = "camera_on";
const CAMERA_OFF: &str = "camera_off";

const TOGGLE_PROBABILITY: f64 = 0.25;
const SPOOF_PROBABILITY: f64 = 0.40;
const INSECURE_PROBABILITY: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Devices are named `camera_1..=camera_N`
    pub devices: usize,
    pub interval: Duration,
    /// Stop after this many events; run forever when `None`
    pub count: Option<u64>,
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            devices: 1,
            interval: Duration::from_secs(1),
            count: None,
            seed: None,
        }
    }
}

struct SimulatedDevice {
    name: String,
    physical_on: bool,
}

pub struct DeviceSimulator<R: Rng> {
    rng: R,
    devices: Vec<SimulatedDevice>,
    next_device: usize,
    next_event_id: u64,
}

impl DeviceSimulator<StdRng> {
    pub fn new(config: &SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(rng, config.devices)
    }
}

impl<R: Rng> DeviceSimulator<R> {
    pub fn with_rng(rng: R, devices: usize) -> Self {
        let devices = (1..=devices.max(1))
            .map(|i| SimulatedDevice {
                name: format!("camera_{}", i),
                physical_on: false,
            })
            .collect();
        Self {
            rng,
            devices,
            next_device: 0,
            next_event_id: 1,
        }
    }

    pub fn next_event(&mut self) -> DeviceEvent {
        let event_id = self.next_event_id;
        self.next_event_id += 1;

        let idx = self.next_device;
        self.next_device = (self.next_device + 1) % self.devices.len();

        if self.rng.gen_bool(TOGGLE_PROBABILITY) {
            self.devices[idx].physical_on = !self.devices[idx].physical_on;
        }
        let device = &self.devices[idx];
        let actual = if device.physical_on { CAMERA_ON } else { CAMERA_OFF };

        let spoofed = device.physical_on && self.rng.gen_bool(SPOOF_PROBABILITY);
        let reported = if spoofed { CAMERA_OFF } else { actual };

        let endpoints = if self.rng.gen_bool(INSECURE_PROBABILITY) {
            &INSECURE_ENDPOINTS
        } else {
            &SECURE_ENDPOINTS
        };
        let network_attempt = endpoints.choose(&mut self.rng).copied().unwrap_or(SECURE_ENDPOINTS[0]);

        DeviceEvent {
            event_id,
            timestamp: Some(unix_seconds(Utc::now())),
            device: device.name.clone(),
            actual_state: actual.to_string(),
            reported_state: reported.to_string(),
            network_attempt: network_attempt.to_string(),
            spoof_attempt: Some(spoofed),
        }
    }

    /// Write one JSON line per tick to `out` until the count is reached or
    /// `shutdown` resolves. Returns the number of events written.
    pub async fn run<W, F>(
        &mut self,
        out: &mut W,
        config: &SimulatorConfig,
        shutdown: F,
    ) -> std::io::Result<u64>
    where
        W: AsyncWrite + Unpin,
        F: std::future::Future<Output = ()>,
    {
        info!("Device simulator running with {} device(s)", self.devices.len());
        let mut ticker = tokio::time::interval(config.interval);
        let mut shutdown = std::pin::pin!(shutdown);
        let mut written = 0u64;

        while config.count.is_none_or(|limit| written < limit) {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            let event = self.next_event();
            let mut line = event.to_json_line()?;
            line.push('\n');
            out.write_all(line.as_bytes()).await?;
            out.flush().await?;
            written += 1;

            debug!(
                "event={:03} device={} actual={} reported={} conn={}{}",
                event.event_id,
                event.device,
                event.actual_state,
                event.reported_state,
                event.network_attempt,
                if event.spoof_attempt == Some(true) { "  (spoofing)" } else { "" }
            );
        }

        info!("Device simulator stopped after {} events", written);
        Ok(written)
    }
}
