use std::collections::VecDeque;

use crate::canvas::MaskSurface;
use crate::io::EditorError;

/// Number of undo steps kept per image.
pub const MAX_HISTORY: usize = 20;

// ============================================================================
// HISTORY ENTRY: full serialized snapshot of the mask
// ============================================================================

/// PNG snapshot of the surface taken before a mutation.
#[derive(Clone)]
pub struct HistoryEntry {
    png: Vec<u8>,
    width: u32,
    height: u32,
}

impl HistoryEntry {
    pub fn capture(surface: &MaskSurface) -> Result<Self, EditorError> {
        Ok(Self {
            png: surface.serialize()?,
            width: surface.width(),
            height: surface.height(),
        })
    }

    /// Replace the surface content with this snapshot.
    pub fn restore_into(&self, surface: &mut MaskSurface) -> Result<(), EditorError> {
        if surface.dimensions() != (self.width, self.height) {
            surface.resize(self.width, self.height);
        }
        surface.load(&self.png)
    }

    pub fn memory_size(&self) -> usize {
        self.png.len()
    }
}

// ============================================================================
// HISTORY MANAGER: bounded undo log, FIFO eviction
// ============================================================================

/// Undo-only history.  Oldest entries fall off once `max_history_size` is exceeded.
pub struct HistoryManager {
    undo_stack: VecDeque<HistoryEntry>,
    max_history_size: usize,
    /// Running byte total of the stored snapshots.
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(MAX_HISTORY)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            max_history_size: max_history_size.max(1),
            total_memory: 0,
        }
    }

    /// Capture the surface and push it.  Call before every mutation.
    pub fn snapshot(&mut self, surface: &MaskSurface) -> Result<(), EditorError> {
        let entry = HistoryEntry::capture(surface)?;
        self.push(entry);
        Ok(())
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.total_memory += entry.memory_size();
        self.undo_stack.push_back(entry);
        self.prune();
    }

    /// Restore the most recent snapshot.  Returns `Ok(false)` when there is
    /// nothing to undo.
    pub fn undo(&mut self, surface: &mut MaskSurface) -> Result<bool, EditorError> {
        let Some(entry) = self.undo_stack.pop_back() else {
            return Ok(false);
        };
        self.total_memory = self.total_memory.saturating_sub(entry.memory_size());
        entry.restore_into(surface)?;
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    /// Bytes held by the stored snapshots (O(1) via cached total).
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.total_memory = 0;
    }

    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Point;

    #[test]
    fn undo_is_lifo_and_byte_exact() {
        let mut surface = MaskSurface::new(32, 32);
        let mut history = HistoryManager::default();

        history.snapshot(&surface).expect("snapshot");
        surface.clear();
        let after_clear = surface.pixels().as_raw().clone();

        history.snapshot(&surface).expect("snapshot");
        surface.stroke_segment(None, Point::new(8.0, 8.0), 4.0, false);
        history.snapshot(&surface).expect("snapshot");
        surface.stroke_segment(Some(Point::new(8.0, 8.0)), Point::new(24.0, 20.0), 3.0, false);

        assert!(history.undo(&mut surface).expect("undo"));
        assert!(history.undo(&mut surface).expect("undo"));
        assert_eq!(surface.pixels().as_raw(), &after_clear);
    }

    #[test]
    fn capacity_evicts_the_oldest_entries() {
        let mut surface = MaskSurface::new(16, 16);
        let mut history = HistoryManager::default();
        let mut snapshots = Vec::new();
        for i in 0..25 {
            history.snapshot(&surface).expect("snapshot");
            snapshots.push(surface.pixels().as_raw().clone());
            surface.stroke_segment(None, Point::new(i as f32 % 16.0, (i / 2) as f32), 1.0, false);
        }
        assert_eq!(history.undo_count(), MAX_HISTORY);

        // Walking back all the way lands on snapshot #5, not #0.
        while history.undo(&mut surface).expect("undo") {}
        assert_eq!(surface.pixels().as_raw(), &snapshots[5]);
    }

    #[test]
    fn undo_on_empty_history_is_a_no_op() {
        let mut surface = MaskSurface::new(4, 4);
        surface.stroke_segment(None, Point::new(2.0, 2.0), 1.0, false);
        let before = surface.pixels().as_raw().clone();
        let mut history = HistoryManager::new(3);
        assert!(!history.undo(&mut surface).expect("undo"));
        assert_eq!(surface.pixels().as_raw(), &before);
    }

    #[test]
    fn memory_total_tracks_pushes_and_clear() {
        let surface = MaskSurface::new(8, 8);
        let mut history = HistoryManager::new(2);
        for _ in 0..3 {
            history.snapshot(&surface).expect("snapshot");
        }
        assert_eq!(history.undo_count(), 2);
        assert!(history.memory_usage() > 0);
        history.clear();
        assert_eq!(history.memory_usage(), 0);
        assert!(!history.can_undo());
    }
}
