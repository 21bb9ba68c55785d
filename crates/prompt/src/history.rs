//! Form History
//!
//! Current form values plus bounded undo/redo stacks.
//!
//! User keystrokes are buffered by a small debounce state machine
//! (`Idle -> Pending -> flushed back to Idle`) and committed as a single
//! `user` entry once the debounce deadline passes. AI-driven batches bypass
//! the buffer: any pending user edits are committed first, then the batch
//! becomes its own entry.
//!
//! Time is passed in explicitly (`*_at` methods) so coalescing and flush
//! ordering can be tested without a UI timer.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::variables::VariableValue;

/// Current values keyed by variable key
pub type FormValues = HashMap<String, VariableValue>;

/// Who produced a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySource {
    User,
    AiFill,
    AiRefine,
    Reset,
}

/// A single field change. `None` means the key had no value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub key: String,
    pub value: Option<VariableValue>,
    pub previous_value: Option<VariableValue>,
}

impl FieldChange {
    fn is_noop(&self) -> bool {
        self.value == self.previous_value
    }
}

/// One undoable unit of change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub changes: Vec<FieldChange>,
    pub source: HistorySource,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    fn new(changes: Vec<FieldChange>, source: HistorySource) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            changes,
            source,
            timestamp: Utc::now(),
        }
    }
}

/// Tunables for the history engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Maximum entries kept on the undo stack
    pub max_history_size: usize,
    /// Quiet period after the last user edit before it is committed
    pub debounce: Duration,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history_size: 50,
            debounce: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
enum DebounceState {
    Idle,
    Pending {
        changes: Vec<FieldChange>,
        deadline: Instant,
    },
}

/// Undo/redo engine over a flat map of form values
#[derive(Debug, Clone)]
pub struct FormHistory {
    values: FormValues,
    past: VecDeque<HistoryEntry>,
    future: Vec<HistoryEntry>,
    pending: DebounceState,
    config: HistoryConfig,
}

impl Default for FormHistory {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl FormHistory {
    /// Create an empty history
    pub fn new(config: HistoryConfig) -> Self {
        Self::with_values(FormValues::new(), config)
    }

    /// Create a history seeded with initial values
    pub fn with_values(values: FormValues, config: HistoryConfig) -> Self {
        Self {
            values,
            past: VecDeque::new(),
            future: Vec::new(),
            pending: DebounceState::Idle,
            config,
        }
    }

    pub fn values(&self) -> &FormValues {
        &self.values
    }

    pub fn value(&self, key: &str) -> Option<&VariableValue> {
        self.values.get(key)
    }

    pub fn config(&self) -> HistoryConfig {
        self.config
    }

    /// Committed undo entries, oldest first
    pub fn past(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.past.iter()
    }

    pub fn past_len(&self) -> usize {
        self.past.len()
    }

    pub fn future_len(&self) -> usize {
        self.future.len()
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty() || self.has_pending_changes()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Keys with buffered, not yet committed user edits
    pub fn pending_keys(&self) -> Vec<&str> {
        match &self.pending {
            DebounceState::Idle => Vec::new(),
            DebounceState::Pending { changes, .. } => {
                changes.iter().map(|c| c.key.as_str()).collect()
            }
        }
    }

    fn has_pending_changes(&self) -> bool {
        match &self.pending {
            DebounceState::Idle => false,
            DebounceState::Pending { changes, .. } => changes.iter().any(|c| !c.is_noop()),
        }
    }

    /// Debounced single-field user edit
    pub fn set_value(&mut self, key: &str, value: VariableValue) {
        self.set_value_at(key, value, Instant::now());
    }

    /// Debounced single-field user edit at an explicit instant.
    ///
    /// The value is applied immediately; the history entry is deferred until
    /// the debounce deadline. Repeated edits to the same key keep the first
    /// previous value and the last new value.
    pub fn set_value_at(&mut self, key: &str, value: VariableValue, now: Instant) {
        self.poll(now);

        let previous = self.values.get(key).cloned();
        if previous.as_ref() == Some(&value) {
            return;
        }
        self.values.insert(key.to_string(), value.clone());

        let deadline = now + self.config.debounce;
        match &mut self.pending {
            DebounceState::Idle => {
                self.pending = DebounceState::Pending {
                    changes: vec![FieldChange {
                        key: key.to_string(),
                        value: Some(value),
                        previous_value: previous,
                    }],
                    deadline,
                };
            }
            DebounceState::Pending {
                changes,
                deadline: pending_deadline,
            } => {
                match changes.iter_mut().find(|c| c.key == key) {
                    Some(change) => change.value = Some(value),
                    None => changes.push(FieldChange {
                        key: key.to_string(),
                        value: Some(value),
                        previous_value: previous,
                    }),
                }
                *pending_deadline = deadline;
            }
        }
    }

    /// Commit buffered user edits whose debounce deadline has passed.
    ///
    /// Returns true when an entry was committed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match &self.pending {
            DebounceState::Pending { deadline, .. } if *deadline <= now => self.flush_pending(),
            _ => false,
        }
    }

    /// Commit buffered user edits immediately.
    ///
    /// Returns true when an entry was committed.
    pub fn flush_pending(&mut self) -> bool {
        let changes = match std::mem::replace(&mut self.pending, DebounceState::Idle) {
            DebounceState::Idle => return false,
            DebounceState::Pending { changes, .. } => changes,
        };

        let changes: Vec<FieldChange> = changes.into_iter().filter(|c| !c.is_noop()).collect();
        if changes.is_empty() {
            return false;
        }
        self.push_entry(HistoryEntry::new(changes, HistorySource::User));
        true
    }

    /// Apply a batch immediately as one entry (AI fill/refine, resets).
    ///
    /// Pending user edits are committed first so they land strictly before
    /// the batch. Returns true when an entry was committed.
    pub fn set_values<I, K>(&mut self, changes: I, source: HistorySource) -> bool
    where
        I: IntoIterator<Item = (K, VariableValue)>,
        K: Into<String>,
    {
        self.flush_pending();

        let mut batch: Vec<FieldChange> = Vec::new();
        for (key, value) in changes {
            let key = key.into();
            match batch.iter_mut().find(|c| c.key == key) {
                Some(change) => change.value = Some(value),
                None => {
                    let previous = self.values.get(&key).cloned();
                    batch.push(FieldChange {
                        key,
                        value: Some(value),
                        previous_value: previous,
                    });
                }
            }
        }

        let batch: Vec<FieldChange> = batch.into_iter().filter(|c| !c.is_noop()).collect();
        if batch.is_empty() {
            return false;
        }

        for change in &batch {
            apply(&mut self.values, &change.key, change.value.clone());
        }
        self.push_entry(HistoryEntry::new(batch, source));
        true
    }

    /// Replace all values and drop history (e.g. another prompt was selected).
    pub fn replace_values(&mut self, values: FormValues) {
        self.values = values;
        self.past.clear();
        self.future.clear();
        self.pending = DebounceState::Idle;
    }

    /// Revert the latest entry. Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        self.flush_pending();

        let Some(entry) = self.past.pop_back() else {
            return false;
        };
        for change in entry.changes.iter().rev() {
            apply(&mut self.values, &change.key, change.previous_value.clone());
        }
        debug!("[History] undo {} ({} changes)", entry.id, entry.changes.len());
        self.future.push(entry);
        true
    }

    /// Re-apply the latest undone entry. Returns false when there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        self.flush_pending();

        let Some(entry) = self.future.pop() else {
            return false;
        };
        for change in &entry.changes {
            apply(&mut self.values, &change.key, change.value.clone());
        }
        debug!("[History] redo {} ({} changes)", entry.id, entry.changes.len());
        self.past.push_back(entry);
        self.evict_overflow();
        true
    }

    /// Drop both stacks and any buffered edits; values are kept.
    pub fn clear_history(&mut self) {
        self.past.clear();
        self.future.clear();
        self.pending = DebounceState::Idle;
    }

    fn push_entry(&mut self, entry: HistoryEntry) {
        debug!(
            "[History] commit {:?} entry with {} changes",
            entry.source,
            entry.changes.len()
        );
        self.past.push_back(entry);
        self.evict_overflow();
        self.future.clear();
    }

    fn evict_overflow(&mut self) {
        while self.past.len() > self.config.max_history_size {
            self.past.pop_front();
        }
    }
}

fn apply(values: &mut FormValues, key: &str, value: Option<VariableValue>) {
    match value {
        Some(v) => {
            values.insert(key.to_string(), v);
        }
        None => {
            values.remove(key);
        }
    }
}
