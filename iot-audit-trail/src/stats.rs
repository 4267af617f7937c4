/*!
Aggregate counts over audit records
*/

use serde::Serialize;

use crate::record::{AuditRecord, Violation};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrailStats {
    pub total: usize,
    /// Records with no alerts
    pub compliant: usize,
    pub spoofing: usize,
    pub masking: usize,
    pub tls_violation: usize,
}

impl TrailStats {
    pub fn from_records(records: &[AuditRecord]) -> Self {
        let mut stats = Self::default();
        for record in records {
            stats.add(record);
        }
        stats
    }

    pub fn add(&mut self, record: &AuditRecord) {
        self.total += 1;
        if record.is_compliant() {
            self.compliant += 1;
        }
        for violation in record.alerts.iter() {
            *self.slot(violation) += 1;
        }
    }

    pub fn count(&self, violation: Violation) -> usize {
        match violation {
            Violation::Spoofing => self.spoofing,
            Violation::Masking => self.masking,
            Violation::TlsViolation => self.tls_violation,
        }
    }

    fn slot(&mut self, violation: Violation) -> &mut usize {
        match violation {
            Violation::Spoofing => &mut self.spoofing,
            Violation::Masking => &mut self.masking,
            Violation::TlsViolation => &mut self.tls_violation,
        }
    }
}
