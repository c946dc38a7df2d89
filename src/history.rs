use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{CycleCorrection, CycleRecord, RawCycleRecord, UserId};

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("no cycle with id {0}")]
    NotFound(Uuid),
    #[error("a cycle already starts on {0}")]
    DuplicateStart(NaiveDate),
    #[error("history store lock poisoned")]
    Poisoned,
}

/// Called with the user's full history, most recent first.
pub type SnapshotCallback = Box<dyn Fn(&[CycleRecord]) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Source of a user's cycle history.
///
/// Subscribers get the current snapshot as soon as they subscribe and a fresh
/// one after every write to that user's history.
pub trait HistoryStore {
    fn history(&self, user: &UserId) -> Result<Vec<CycleRecord>, HistoryError>;

    fn subscribe(
        &self,
        user: &UserId,
        callback: SnapshotCallback,
    ) -> Result<SubscriptionId, HistoryError>;

    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), HistoryError>;
}

/// Turn loosely-shaped records into validated ones, most recent first.
/// Records without a start date are dropped; negative lengths are treated as unknown.
pub fn validate_history(raw: Vec<RawCycleRecord>) -> Vec<CycleRecord> {
    let mut records: Vec<CycleRecord> = raw
        .into_iter()
        .filter_map(|r| {
            let Some(start_date) = r.start_date else {
                warn!(id = ?r.id, "skipping cycle record without a start date");
                return None;
            };
            Some(CycleRecord {
                id: r.id.unwrap_or_else(Uuid::new_v4),
                start_date,
                cycle_length: r.cycle_length.and_then(length_days),
                period_length: r.period_length.and_then(length_days),
                symptoms: r.symptoms.unwrap_or_default(),
                notes: r.notes.unwrap_or_default(),
            })
        })
        .collect();

    sort_most_recent_first(&mut records);
    records
}

fn length_days(value: i64) -> Option<u32> {
    match u32::try_from(value) {
        Ok(days) => Some(days),
        Err(_) => {
            warn!(value, "ignoring out-of-range cycle length");
            None
        }
    }
}

fn sort_most_recent_first(records: &mut [CycleRecord]) {
    records.sort_by(|a, b| b.start_date.cmp(&a.start_date));
}

struct Subscriber {
    id: SubscriptionId,
    user: UserId,
    callback: Arc<dyn Fn(&[CycleRecord]) + Send + Sync>,
}

/// Process-local history store. Writes are serialized per store.
#[derive(Default)]
pub struct MemoryHistoryStore {
    histories: Mutex<HashMap<UserId, Vec<CycleRecord>>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscription: AtomicU64,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a user's whole history, e.g. after loading it from disk.
    pub fn load(&self, user: &UserId, raw: Vec<RawCycleRecord>) -> Result<(), HistoryError> {
        let records = validate_history(raw);
        debug!(%user, records = records.len(), "loaded cycle history");
        self.replace(user, records)
    }

    /// Put back a snapshot taken earlier with [`HistoryStore::history`].
    pub fn replace(&self, user: &UserId, records: Vec<CycleRecord>) -> Result<(), HistoryError> {
        self.write(user, |history| {
            *history = records;
            Ok(())
        })
    }

    /// Record a new period start. The chronologically previous cycle gets its
    /// length back-filled; if a later cycle exists the new one is completed too.
    pub fn log_period_start(
        &self,
        user: &UserId,
        start_date: NaiveDate,
        period_length: Option<u32>,
    ) -> Result<CycleRecord, HistoryError> {
        self.write(user, |history| {
            if history.iter().any(|c| c.start_date == start_date) {
                return Err(HistoryError::DuplicateStart(start_date));
            }

            let mut record = CycleRecord::new(start_date);
            record.period_length = period_length;

            let index = history
                .iter()
                .position(|c| c.start_date < start_date)
                .unwrap_or(history.len());

            if index > 0 {
                let later = &history[index - 1];
                record.cycle_length = days_between(start_date, later.start_date);
            }
            if let Some(earlier) = history.get_mut(index) {
                earlier.cycle_length = days_between(earlier.start_date, start_date);
            }

            history.insert(index, record.clone());
            info!(%user, %start_date, "logged period start");
            Ok(record)
        })
    }

    pub fn update_notes(
        &self,
        user: &UserId,
        id: Uuid,
        notes: impl Into<String>,
    ) -> Result<CycleRecord, HistoryError> {
        let notes = notes.into();
        self.modify(user, id, |record| record.notes = notes)
    }

    pub fn correct(
        &self,
        user: &UserId,
        id: Uuid,
        correction: CycleCorrection,
    ) -> Result<CycleRecord, HistoryError> {
        self.modify(user, id, |record| {
            if let Some(days) = correction.cycle_length {
                record.cycle_length = Some(days);
            }
            if let Some(days) = correction.period_length {
                record.period_length = Some(days);
            }
        })
    }

    /// Remove a single cycle. Neighbouring lengths are left as recorded.
    pub fn delete(&self, user: &UserId, id: Uuid) -> Result<CycleRecord, HistoryError> {
        self.write(user, |history| {
            let index = history
                .iter()
                .position(|c| c.id == id)
                .ok_or(HistoryError::NotFound(id))?;
            info!(%user, %id, "deleted cycle");
            Ok(history.remove(index))
        })
    }

    /// Forget everything held for a user.
    pub fn clear(&self, user: &UserId) -> Result<(), HistoryError> {
        self.write(user, |history| {
            history.clear();
            Ok(())
        })
    }

    fn modify(
        &self,
        user: &UserId,
        id: Uuid,
        change: impl FnOnce(&mut CycleRecord),
    ) -> Result<CycleRecord, HistoryError> {
        self.write(user, |history| {
            let record = history
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or(HistoryError::NotFound(id))?;
            change(record);
            Ok(record.clone())
        })
    }

    /// Apply a write, then notify the user's subscribers outside the locks.
    fn write<T>(
        &self,
        user: &UserId,
        apply: impl FnOnce(&mut Vec<CycleRecord>) -> Result<T, HistoryError>,
    ) -> Result<T, HistoryError> {
        let (result, snapshot) = {
            let mut histories = self.histories.lock().map_err(|_| HistoryError::Poisoned)?;
            let history = histories.entry(user.clone()).or_default();
            let result = apply(history)?;
            (result, history.clone())
        };

        self.notify(user, &snapshot)?;
        Ok(result)
    }

    fn notify(&self, user: &UserId, snapshot: &[CycleRecord]) -> Result<(), HistoryError> {
        let callbacks: Vec<_> = self
            .subscribers
            .lock()
            .map_err(|_| HistoryError::Poisoned)?
            .iter()
            .filter(|s| &s.user == user)
            .map(|s| Arc::clone(&s.callback))
            .collect();

        for callback in callbacks {
            callback(snapshot);
        }
        Ok(())
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn history(&self, user: &UserId) -> Result<Vec<CycleRecord>, HistoryError> {
        let histories = self.histories.lock().map_err(|_| HistoryError::Poisoned)?;
        Ok(histories.get(user).cloned().unwrap_or_default())
    }

    fn subscribe(
        &self,
        user: &UserId,
        callback: SnapshotCallback,
    ) -> Result<SubscriptionId, HistoryError> {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let callback: Arc<dyn Fn(&[CycleRecord]) + Send + Sync> = Arc::from(callback);
        self.subscribers
            .lock()
            .map_err(|_| HistoryError::Poisoned)?
            .push(Subscriber {
                id,
                user: user.clone(),
                callback: Arc::clone(&callback),
            });

        let snapshot = self.history(user)?;
        callback(&snapshot);
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), HistoryError> {
        self.subscribers
            .lock()
            .map_err(|_| HistoryError::Poisoned)?
            .retain(|s| s.id != id);
        Ok(())
    }
}

fn days_between(from: NaiveDate, to: NaiveDate) -> Option<u32> {
    u32::try_from((to - from).num_days()).ok()
}
