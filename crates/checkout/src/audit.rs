use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event_type: String,
    pub payment_id: String,
    pub descriptor_hash: Option<String>,
    pub tx_hash: Option<String>,
    pub state: String,
    pub error: Option<String>,
    pub merchant: Option<String>,
    pub payer: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: &str, payment_id: &str, state: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event_type: event_type.to_string(),
            payment_id: payment_id.to_string(),
            descriptor_hash: None,
            tx_hash: None,
            state: state.to_string(),
            error: None,
            merchant: None,
            payer: None,
        }
    }

    pub fn with_hash(mut self, hash: String) -> Self {
        self.descriptor_hash = Some(hash);
        self
    }

    pub fn with_tx_hash(mut self, tx_hash: String) -> Self {
        self.tx_hash = Some(tx_hash);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_merchant(mut self, merchant: String) -> Self {
        self.merchant = Some(merchant);
        self
    }

    pub fn with_payer(mut self, payer: String) -> Self {
        self.payer = Some(payer);
        self
    }
}

/// Append-only JSONL audit trail. A log without a path records nothing.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    path: Option<PathBuf>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn write(&self, event: &AuditEvent) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        let json = serde_json::to_string(event)?;
        writeln!(file, "{}", json)?;
        tracing::debug!(event_type=%event.event_type, payment_id=%event.payment_id, "Audit event written");
        Ok(())
    }

    /// Failures are logged and otherwise ignored; the audit trail never blocks a payment.
    pub fn record(&self, event: AuditEvent) {
        if let Err(err) = self.write(&event) {
            tracing::warn!(event_type=%event.event_type, error=%err, "Failed to write audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_json_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::new(&path);

        log.record(AuditEvent::new("link_generated", "p1", "idle").with_hash("abc".into()));
        log.record(
            AuditEvent::new("payment_confirmed", "p1", "success")
                .with_tx_hash("0x01".into())
                .with_payer("0x02".into()),
        );

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<AuditEvent> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].descriptor_hash.as_deref(), Some("abc"));
        assert_eq!(lines[1].state, "success");
        assert_eq!(lines[1].payer.as_deref(), Some("0x02"));
    }

    #[test]
    fn disabled_log_writes_nothing() {
        assert!(AuditLog::disabled()
            .write(&AuditEvent::new("x", "y", "z"))
            .is_ok());
    }
}
