//! Bounded diagnostic usage log.
//!
//! Notable licensing events (validations, issuances, renewals, lockdown
//! transitions) are appended here for later audit display. The log is a
//! pure side channel: nothing in validation or entitlement reads it
//! back, and append failures never fail the caller.

use crate::error::LicenseResult;
use crate::keys;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shopdeck_storage::KeyValueStore;
use std::sync::Arc;
use tracing::warn;

/// One diagnostic event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Short event name, e.g. `license_issued`.
    pub event: String,
    /// When the event was recorded.
    pub at: DateTime<Utc>,
    /// Free-form event detail.
    pub metadata: Value,
}

/// Append-only bounded log persisted through the license store.
pub(crate) struct AuditLog {
    store: Arc<dyn KeyValueStore>,
    capacity: usize,
}

impl AuditLog {
    pub(crate) fn new(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self { store, capacity }
    }

    /// Appends an entry, dropping the oldest entries beyond capacity.
    /// Failures are logged and swallowed.
    pub(crate) fn append(&self, event: &str, metadata: Value) {
        if let Err(err) = self.try_append(event, metadata) {
            warn!(event, %err, "dropping audit entry");
        }
    }

    /// Returns the retained entries, oldest first.
    pub(crate) fn entries(&self) -> LicenseResult<Vec<AuditEntry>> {
        match self.store.get(keys::AUDIT)? {
            None => Ok(Vec::new()),
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        }
    }

    fn try_append(&self, event: &str, metadata: Value) -> LicenseResult<()> {
        // A log that fails to parse is replaced rather than poisoning
        // every later append.
        let mut entries = self.entries().unwrap_or_default();
        entries.push(AuditEntry {
            event: event.to_string(),
            at: Utc::now(),
            metadata,
        });
        if entries.len() > self.capacity {
            let excess = entries.len() - self.capacity;
            entries.drain(..excess);
        }
        let bytes = serde_json::to_vec(&entries)?;
        self.store.set(keys::AUDIT, &bytes)?;
        Ok(())
    }
}
