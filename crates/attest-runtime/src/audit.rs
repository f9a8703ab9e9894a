//! Where audit records go.

use parking_lot::Mutex;

use attest_core::AuditRecord;

/// Receives one record per stage transition, in order.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

/// Emits each record as a structured `tracing` event on the `attest::audit`
/// target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        tracing::info!(
            target: "attest::audit",
            stage = %record.stage,
            next_state = %record.next_state,
            retrieved = record.counts.retrieved,
            extracted = record.counts.extracted,
            verified = record.counts.verified,
            rejected = record.counts.rejected,
            used = record.counts.used,
            latency_ms = record.latency_ms,
            has_sufficient_evidence = ?record.has_sufficient_evidence,
            passes = ?record.passes,
            attempt = ?record.attempt,
            detail = record.detail.as_deref().unwrap_or(""),
            "Stage transition"
        );
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) {
        self.records.lock().push(record.clone());
    }
}
