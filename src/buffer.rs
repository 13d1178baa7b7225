//! Bounded, newest-first record buffer

use crate::record::{Record, RecordId};
use std::collections::HashSet;

/// Result of offering a live record to the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    Inserted,
    Duplicate,
}

/// Records ordered by `created_at` descending, never longer than `capacity`.
#[derive(Debug, Clone)]
pub struct RecordBuffer {
    records: Vec<Record>,
    capacity: usize,
}

impl RecordBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn newest(&self) -> Option<&Record> {
        self.records.first()
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.records.iter().any(|r| r.key() == Some(id))
    }

    /// Replace everything with a fresh snapshot.
    pub fn replace(&mut self, mut snapshot: Vec<Record>) {
        // Stable so equal timestamps keep the store's order
        snapshot.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        snapshot.truncate(self.capacity);
        self.records = snapshot;
    }

    /// Merge one live record, suppressing re-deliveries of a known id.
    pub fn ingest(&mut self, record: Record) -> Ingest {
        if let Some(id) = record.key() {
            if self.contains(id) {
                return Ingest::Duplicate;
            }
        }

        // Live records are almost always the newest, so this is a prepend
        let pos = self
            .records
            .iter()
            .position(|r| r.created_at <= record.created_at)
            .unwrap_or(self.records.len());
        self.records.insert(pos, record);
        self.records.truncate(self.capacity);
        Ingest::Inserted
    }

    /// Ids of the `n` newest records, plus any that tie with the `n`th on
    /// `created_at`
    pub fn window_ids(&self, n: usize) -> HashSet<&RecordId> {
        let Some(cutoff) = n
            .min(self.records.len())
            .checked_sub(1)
            .map(|i| self.records[i].created_at)
        else {
            return HashSet::new();
        };

        self.records
            .iter()
            .take_while(|r| r.created_at >= cutoff)
            .filter_map(Record::key)
            .collect()
    }

    /// True when a poll result names a record the newest entries lack,
    /// meaning the live feed dropped something.
    pub fn missed_any(&self, polled: &[Record]) -> bool {
        if polled.is_empty() {
            return false;
        }
        let known = self.window_ids(polled.len());
        polled
            .iter()
            .any(|r| r.key().map_or(true, |id| !known.contains(id)))
    }
}
