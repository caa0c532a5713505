//! Persisted outbox for urgent notifications.
//!
//! `send` with `is_urgent` enqueues an entry in the same call that stores
//! the message. Delivery is a separate step: each pending entry is handed
//! to a `Notifier` and removed only once the notifier acknowledges it, so a
//! crash between delivery and save re-delivers instead of dropping.
//! Consumers must tolerate duplicates (at-least-once).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::error::CoordinationError;
use crate::models::{CommunicationRecord, OutboxEntry};
use crate::store::{keys, load_collection, save_collection, KeyValueStore};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// External sink for urgent notifications (pager, push, SMS gateway).
pub trait Notifier: Send + Sync {
    fn notify(&self, entry: &OutboxEntry) -> Result<(), NotifyError>;
}

/// Writes each notification to the log. Default when no gateway is wired.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, entry: &OutboxEntry) -> Result<(), NotifyError> {
        tracing::warn!(
            communication_id = %entry.communication_id,
            patient_id = %entry.patient_id,
            to_provider_id = %entry.to_provider_id,
            message_type = entry.message_type.as_str(),
            subject = %entry.subject,
            "Urgent notification"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
    /// Entries skipped because they reached the attempt limit.
    pub dead_letters: usize,
}

pub struct NotificationOutbox {
    store: Arc<dyn KeyValueStore>,
    max_attempts: u32,
}

impl NotificationOutbox {
    pub fn new(store: Arc<dyn KeyValueStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    fn load(&self) -> Result<Vec<OutboxEntry>, CoordinationError> {
        Ok(load_collection(self.store.as_ref(), keys::NOTIFICATION_OUTBOX)?)
    }

    fn save(&self, entries: &[OutboxEntry]) -> Result<(), CoordinationError> {
        Ok(save_collection(
            self.store.as_ref(),
            keys::NOTIFICATION_OUTBOX,
            &entries,
        )?)
    }

    pub fn enqueue(&self, record: &CommunicationRecord) -> Result<OutboxEntry, CoordinationError> {
        let entry = OutboxEntry {
            id: Uuid::new_v4().to_string(),
            communication_id: record.id.clone(),
            patient_id: record.patient_id.clone(),
            to_provider_id: record.to_provider_id,
            message_type: record.message_type,
            subject: record.subject.clone(),
            enqueued_at: Utc::now(),
            attempts: 0,
            last_error: None,
            last_attempt_at: None,
        };
        let mut entries = self.load()?;
        entries.push(entry.clone());
        self.save(&entries)?;
        tracing::debug!(
            outbox_id = %entry.id,
            communication_id = %entry.communication_id,
            "Urgent notification queued"
        );
        Ok(entry)
    }

    /// Entries still awaiting delivery, oldest first.
    pub fn pending(&self) -> Result<Vec<OutboxEntry>, CoordinationError> {
        self.load()
    }

    /// Entries that reached the attempt limit without being acknowledged.
    pub fn dead_letters(&self) -> Result<Vec<OutboxEntry>, CoordinationError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|e| e.attempts >= self.max_attempts)
            .collect())
    }

    /// Offer every live entry to `notifier` once.
    ///
    /// Outcomes are merged into a fresh load of the queue before saving, so
    /// entries enqueued while the notifier runs survive the pass.
    pub fn deliver_pending(&self, notifier: &dyn Notifier) -> Result<DeliveryReport, CoordinationError> {
        let entries = self.load()?;
        let mut report = DeliveryReport::default();
        let mut acknowledged = HashSet::new();
        let mut failures: HashMap<String, OutboxEntry> = HashMap::new();

        for mut entry in entries {
            if entry.attempts >= self.max_attempts {
                report.dead_letters += 1;
                continue;
            }
            match notifier.notify(&entry) {
                Ok(()) => {
                    report.delivered += 1;
                    acknowledged.insert(entry.id);
                }
                Err(e) => {
                    tracing::warn!(
                        outbox_id = %entry.id,
                        attempts = entry.attempts + 1,
                        "Urgent notification not delivered: {e}"
                    );
                    entry.attempts += 1;
                    entry.last_error = Some(e.to_string());
                    entry.last_attempt_at = Some(Utc::now());
                    report.failed += 1;
                    failures.insert(entry.id.clone(), entry);
                }
            }
        }

        let remaining: Vec<OutboxEntry> = self
            .load()?
            .into_iter()
            .filter(|e| !acknowledged.contains(&e.id))
            .map(|e| failures.remove(&e.id).unwrap_or(e))
            .collect();
        self.save(&remaining)?;

        tracing::info!(
            delivered = report.delivered,
            failed = report.failed,
            dead_letters = report.dead_letters,
            "Outbox delivery pass finished"
        );
        Ok(report)
    }
}
