/*!
Trusted-world auditor for untrusted IoT telemetry.

Reads device events line by line, classifies each one for state spoofing,
change masking and insecure transport, and appends an audit record per event to
an append-only JSONL trail.
*/

pub mod core;

pub use crate::core::config::AuditorConfig;
pub use crate::core::error::AuditorError;
pub use crate::core::tracker::AuditTracker;
