//! Shared audit event log.
//!
//! The registry, policy engine, pipeline and orchestrator append entries; the
//! compliance aggregator only reads them. Data-access events are additionally
//! broadcast to live subscribers.

use std::io::{BufRead, Write};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::ComplianceError;
use crate::types::{AuditAction, AuditLogEntry, DataAccessEvent, DataKind};

const DATA_ACCESS_CHANNEL_CAPACITY: usize = 1024;

/// Append-only, in-memory audit log.
#[derive(Debug)]
pub struct AuditLog {
    entries: Mutex<Vec<AuditLogEntry>>,
    data_access: broadcast::Sender<DataAccessEvent>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        let (data_access, _) = broadcast::channel(DATA_ACCESS_CHANNEL_CAPACITY);
        Self {
            entries: Mutex::new(Vec::new()),
            data_access,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AuditLogEntry>> {
        // Entries are only ever pushed, so a poisoned log is still consistent.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record(&self, entry: AuditLogEntry) {
        tracing::trace!(subject = %entry.subject, message = %entry.message, "audit");
        self.lock().push(entry);
    }

    /// Record a read of device data and publish it to live monitors.
    pub fn record_data_access(
        &self,
        device_identifier: &str,
        data_kind: DataKind,
        accessor: &str,
    ) -> DataAccessEvent {
        let event = DataAccessEvent::new(device_identifier, data_kind, accessor);
        self.record(
            AuditLogEntry::new(
                AuditAction::DataAccess { data_kind },
                device_identifier,
                format!("{} read by {}", kind_label(data_kind), accessor),
            )
            .at(event.timestamp),
        );
        // No receivers is fine.
        let _ = self.data_access.send(event.clone());
        event
    }

    pub fn subscribe_data_access(&self) -> broadcast::Receiver<DataAccessEvent> {
        self.data_access.subscribe()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of all entries in insertion order.
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.lock().clone()
    }

    pub fn entries_since(&self, since: DateTime<Utc>) -> Vec<AuditLogEntry> {
        self.lock()
            .iter()
            .filter(|e| e.timestamp >= since)
            .cloned()
            .collect()
    }

    pub fn entries_for_deployment(&self, deployment_id: Uuid) -> Vec<AuditLogEntry> {
        self.lock()
            .iter()
            .filter(|e| e.deployment_id == Some(deployment_id))
            .cloned()
            .collect()
    }

    /// Write every entry as one JSON object per line. Returns the count written.
    pub fn export_jsonl<W: Write>(&self, mut writer: W) -> Result<usize, ComplianceError> {
        let entries = self.entries();
        for entry in &entries {
            let line = serde_json::to_string(entry)
                .map_err(|e| ComplianceError::AuditLoggingFailed(e.to_string()))?;
            writeln!(writer, "{}", line)
                .map_err(|e| ComplianceError::AuditLoggingFailed(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| ComplianceError::AuditLoggingFailed(e.to_string()))?;
        Ok(entries.len())
    }

    /// Append entries previously written by [`Self::export_jsonl`].
    /// Blank lines are skipped. Returns the count read.
    pub fn import_jsonl<R: BufRead>(&self, reader: R) -> Result<usize, ComplianceError> {
        let mut imported = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| ComplianceError::AuditLoggingFailed(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditLogEntry = serde_json::from_str(&line).map_err(|e| {
                ComplianceError::AuditLoggingFailed(format!("line {}: {}", index + 1, e))
            })?;
            imported.push(entry);
        }
        let count = imported.len();
        self.lock().extend(imported);
        Ok(count)
    }
}

fn kind_label(kind: DataKind) -> &'static str {
    match kind {
        DataKind::DeviceInfo => "device info",
        DataKind::DeviceHealth => "device health",
        DataKind::PolicySet => "policy set",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn filters_by_time_and_deployment() {
        let log = AuditLog::new();
        let deployment = Uuid::new_v4();
        let old = Utc::now() - Duration::days(3);

        log.record(AuditLogEntry::new(AuditAction::DeviceEnrolled, "d1", "enrolled").at(old));
        log.record(
            AuditLogEntry::new(AuditAction::DeviceDeployed, "d1", "deployed")
                .for_deployment(deployment),
        );

        assert_eq!(log.len(), 2);
        assert_eq!(log.entries_since(Utc::now() - Duration::days(1)).len(), 1);
        assert_eq!(log.entries_for_deployment(deployment).len(), 1);
    }

    #[test]
    fn data_access_is_logged_and_broadcast() {
        let log = AuditLog::new();
        let mut rx = log.subscribe_data_access();

        log.record_data_access("d1", DataKind::DeviceHealth, "registry");

        let event = rx.try_recv().unwrap();
        assert_eq!(event.device_identifier, "d1");
        assert_eq!(event.data_kind, DataKind::DeviceHealth);
        assert!(matches!(
            log.entries()[0].action,
            AuditAction::DataAccess {
                data_kind: DataKind::DeviceHealth
            }
        ));
    }

    #[test]
    fn export_writes_json_lines() {
        let log = AuditLog::new();
        log.record(AuditLogEntry::new(AuditAction::DeviceRemoved, "d1", "removed"));
        log.record(AuditLogEntry::new(AuditAction::AppInstalled, "d2", "installed"));

        let mut out = Vec::new();
        assert_eq!(log.export_jsonl(&mut out).unwrap(), 2);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().all(|l| serde_json::from_str::<AuditLogEntry>(l).is_ok()));
    }

    #[test]
    fn import_reads_back_an_export() {
        let source = AuditLog::new();
        let deployment = Uuid::new_v4();
        source.record(
            AuditLogEntry::new(AuditAction::DeviceDeployed, "d1", "deployed")
                .for_deployment(deployment),
        );
        source.record_data_access("d1", DataKind::PolicySet, "policy-engine");
        let mut out = Vec::new();
        source.export_jsonl(&mut out).unwrap();
        out.extend_from_slice(b"\n");

        let restored = AuditLog::new();
        assert_eq!(restored.import_jsonl(out.as_slice()).unwrap(), 2);
        assert_eq!(restored.entries(), source.entries());
    }

    #[test]
    fn import_rejects_malformed_lines() {
        let log = AuditLog::new();
        let err = log.import_jsonl("{\"not\": \"an entry\"}\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ComplianceError::AuditLoggingFailed(msg) if msg.starts_with("line 1")));
        assert!(log.is_empty());
    }

    #[test]
    fn export_failure_is_audit_logging_failed() {
        let log = AuditLog::new();
        log.record(AuditLogEntry::new(AuditAction::DeviceRemoved, "d1", "removed"));
        let err = log.export_jsonl(BrokenWriter).unwrap_err();
        assert!(matches!(err, ComplianceError::AuditLoggingFailed(_)));
    }
}
