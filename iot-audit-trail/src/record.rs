/*!
Audit records appended by the trusted auditor
*/

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::DeviceEvent;

/// Integrity violation categories, declared in detector evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    /// Reported state differs from the physical state in the same event
    Spoofing,
    /// A physical state change was not reflected in the reported state
    Masking,
    /// The declared endpoint uses a transport the policy rejects
    TlsViolation,
}

impl Violation {
    pub const ALL: [Violation; 3] = [Violation::Spoofing, Violation::Masking, Violation::TlsViolation];

    pub fn as_str(&self) -> &'static str {
        match self {
            Violation::Spoofing => "spoofing",
            Violation::Masking => "masking",
            Violation::TlsViolation => "tls_violation",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Violation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Violation::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown violation `{}`", s))
    }
}

/// Ordered set of violation tags.
///
/// Each tag appears at most once and tags are always kept in evaluation order
/// (spoofing, masking, tls_violation), whatever order they were inserted in.
/// An empty set means the event was compliant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Violation>", into = "Vec<Violation>")]
pub struct AlertSet(Vec<Violation>);

impl AlertSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the tag was already present
    pub fn insert(&mut self, violation: Violation) -> bool {
        match self.0.binary_search(&violation) {
            Ok(_) => false,
            Err(pos) => {
                self.0.insert(pos, violation);
                true
            }
        }
    }

    pub fn contains(&self, violation: Violation) -> bool {
        self.0.binary_search(&violation).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Violation> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[Violation] {
        &self.0
    }
}

impl From<Vec<Violation>> for AlertSet {
    fn from(tags: Vec<Violation>) -> Self {
        tags.into_iter().collect()
    }
}

impl From<AlertSet> for Vec<Violation> {
    fn from(set: AlertSet) -> Self {
        set.0
    }
}

impl FromIterator<Violation> for AlertSet {
    fn from_iter<I: IntoIterator<Item = Violation>>(iter: I) -> Self {
        let mut set = AlertSet::new();
        for violation in iter {
            set.insert(violation);
        }
        set
    }
}

impl fmt::Display for AlertSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("OK");
        }
        let tags: Vec<&str> = self.0.iter().map(Violation::as_str).collect();
        f.write_str(&tags.join(", "))
    }
}

/// One line of the audit trail. Written once, never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Auditor-side UNIX time in seconds
    pub time_tee: f64,
    pub event_id: u64,
    pub device: String,
    pub actual_state: String,
    pub reported_state: String,
    pub network_attempt: String,
    pub alerts: AlertSet,
}

impl AuditRecord {
    pub fn from_event(event: &DeviceEvent, alerts: AlertSet, recorded_at: DateTime<Utc>) -> Self {
        Self {
            time_tee: unix_seconds(recorded_at),
            event_id: event.event_id,
            device: event.device.clone(),
            actual_state: event.actual_state.clone(),
            reported_state: event.reported_state.clone(),
            network_attempt: event.network_attempt.clone(),
            alerts,
        }
    }

    pub fn is_compliant(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        let micros = (self.time_tee * 1_000_000.0).round() as i64;
        DateTime::from_timestamp_micros(micros)
    }

    /// Serialize as a single trail line without the trailing newline
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

/// Microsecond-precision float seconds, matching the trail's `time_tee` encoding
pub fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}
