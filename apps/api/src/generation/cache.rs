//! Result Cache — in-process memoization of finished pitches.
//!
//! Keyed by the trimmed project description (case preserved). Reads share the
//! lock; a write holds it exclusively for the single map mutation only. No
//! eviction and no TTL: entries live for the lifetime of the process.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::generation::record::PitchRecord;

#[derive(Debug, Default)]
pub struct ResultCache {
    entries: RwLock<HashMap<String, Arc<PitchRecord>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for a project description.
    pub fn normalize(input: &str) -> &str {
        input.trim()
    }

    pub fn get(&self, input: &str) -> Option<Arc<PitchRecord>> {
        self.entries.read().get(Self::normalize(input)).cloned()
    }

    /// Stores `record` under the normalized `input`, replacing any earlier entry.
    pub fn put(&self, input: &str, record: Arc<PitchRecord>) {
        let key = Self::normalize(input).to_string();
        self.entries.write().insert(key, record);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}
