use crate::canvas::Bitmap;
use crate::log_info;
use crate::pipeline::Composition;

// ============================================================================
// SNAPSHOT - one committed editor state
// ============================================================================

/// Rendered pixels plus everything needed to re-render them. Bitmaps are
/// shared with the session through `Arc`, so consecutive snapshots of an
/// unchanged source cost one copy; [`EditHistory`] charges it once.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub description: String,
    pub bitmap: Bitmap,
    pub source: Bitmap,
    pub composition: Composition,
}

impl Snapshot {
    /// Bytes held by this snapshot on its own.
    pub fn memory_size(&self) -> usize {
        self.bitmap.byte_size() + self.source_bytes()
    }

    /// Source bytes not already covered by the rendered bitmap.
    fn source_bytes(&self) -> usize {
        if self.source.shares_storage(&self.bitmap) {
            0
        } else {
            self.source.byte_size()
        }
    }

    /// Bytes added on top of `prev`, the entry just before this one.
    fn charge_after(&self, prev: Option<&Snapshot>) -> usize {
        match prev {
            Some(p) if p.source.shares_storage(&self.source) => self.bitmap.byte_size(),
            _ => self.memory_size(),
        }
    }
}

struct Entry {
    snapshot: Snapshot,
    /// What this entry added to `total_memory` when it was pushed.
    charged: usize,
}

// ============================================================================
// EDIT HISTORY - linear undo/redo over snapshots
// ============================================================================

/// Ordered snapshots with a cursor at the displayed one. Pushing after an
/// undo drops everything past the cursor.
pub struct EditHistory {
    entries: Vec<Entry>,
    cursor: usize,
    max_history_size: usize,
    max_memory_bytes: Option<usize>,
    /// Running total across all entries, counting shared sources once.
    total_memory: usize,
}

impl Default for EditHistory {
    fn default() -> Self {
        Self::new(50)
    }
}

impl EditHistory {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            max_history_size: max_history_size.max(1),
            max_memory_bytes: Some(512 * 1024 * 1024),
            total_memory: 0,
        }
    }

    pub fn with_memory_limit(mut self, bytes: Option<usize>) -> Self {
        self.max_memory_bytes = bytes;
        self
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        if !self.entries.is_empty() {
            for dropped in self.entries.drain(self.cursor + 1..) {
                self.total_memory = self.total_memory.saturating_sub(dropped.charged);
            }
        }
        let charged = snapshot.charge_after(self.entries.last().map(|e| &e.snapshot));
        self.total_memory += charged;
        self.entries.push(Entry { snapshot, charged });
        self.cursor = self.entries.len() - 1;
        self.prune();
    }

    /// Step back. Returns the snapshot that is now current.
    pub fn undo(&mut self) -> Option<&Snapshot> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.get(self.cursor)
    }

    pub fn redo(&mut self) -> Option<&Snapshot> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.get(self.cursor)
    }

    pub fn can_undo(&self) -> bool {
        !self.entries.is_empty() && self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        !self.entries.is_empty() && self.cursor + 1 < self.entries.len()
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.get(self.cursor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cursor position; `None` while empty.
    pub fn index(&self) -> Option<usize> {
        (!self.entries.is_empty()).then_some(self.cursor)
    }

    pub fn get(&self, index: usize) -> Option<&Snapshot> {
        self.entries.get(index).map(|e| &e.snapshot)
    }

    /// All descriptions, oldest first.
    pub fn descriptions(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.snapshot.description.as_str()).collect()
    }

    pub fn undo_description(&self) -> Option<&str> {
        if self.can_undo() {
            self.get(self.cursor).map(|s| s.description.as_str())
        } else {
            None
        }
    }

    pub fn redo_description(&self) -> Option<&str> {
        if self.can_redo() {
            self.get(self.cursor + 1).map(|s| s.description.as_str())
        } else {
            None
        }
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    /// Drop the oldest entries until both limits hold. The current entry is
    /// never dropped.
    fn prune(&mut self) {
        let mut removed = 0usize;
        while self.entries.len() > self.max_history_size && self.cursor > 0 {
            self.drop_oldest();
            removed += 1;
        }
        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.entries.len() > 1 && self.cursor > 0 {
                self.drop_oldest();
                removed += 1;
            }
        }
        if removed > 0 {
            log_info!(
                "History pruned {} old snapshot(s), {} kept, {} bytes",
                removed,
                self.entries.len(),
                self.total_memory
            );
        }
    }

    /// The new oldest entry takes over the source charge when it shared
    /// the dropped entry's source.
    fn drop_oldest(&mut self) {
        let old = self.entries.remove(0);
        self.total_memory = self.total_memory.saturating_sub(old.charged);
        self.cursor -= 1;
        if let Some(first) = self.entries.first_mut() {
            let full = first.snapshot.memory_size();
            if first.charged < full {
                self.total_memory += full - first.charged;
                first.charged = full;
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
        self.total_memory = 0;
    }
}
