use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;

use crate::canvas::{CanvasError, LayerStack, SurfaceKind};
use crate::log_info;
use crate::ops::flood_fill::FillRegion;

/// Default number of entries kept, including the pristine initial entry.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Default byte budget for stored snapshots.
pub const DEFAULT_HISTORY_MEMORY: usize = 512 * 1024 * 1024;

// ============================================================================
// HISTORY ENTRY
// ============================================================================

/// Which tool produced an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryKind {
    /// The pristine image right after load or reset.
    Initial,
    Fill,
    Pencil,
    Eraser,
}

impl HistoryKind {
    pub fn label(&self) -> &'static str {
        match self {
            HistoryKind::Initial => "Open Image",
            HistoryKind::Fill => "Fill",
            HistoryKind::Pencil => "Pencil Stroke",
            HistoryKind::Eraser => "Eraser Stroke",
        }
    }
}

/// How an entry brings the fill surface back.
#[derive(Clone, Debug)]
pub enum FillRestore {
    /// Full copy of the fill surface pixels.
    Snapshot(Vec<u8>),
    /// Redraw by replaying the entry's region list. Only valid for entries
    /// whose fill surface was an exact replay of those regions.
    LegacyRegions,
}

/// One restorable canvas state.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub kind: HistoryKind,
    pub timestamp: SystemTime,
    /// Interaction-surface pixels.
    pub main_snapshot: Vec<u8>,
    pub fill: FillRestore,
    /// Every fill region that contributed to this state, oldest first.
    pub legacy_regions: Vec<Arc<FillRegion>>,
    /// Whether replaying `legacy_regions` reproduces the fill surface.
    pub regions_exact: bool,
}

impl HistoryEntry {
    pub fn capture(kind: HistoryKind, stack: &LayerStack) -> Self {
        Self {
            kind,
            timestamp: SystemTime::now(),
            main_snapshot: stack.surface(SurfaceKind::Interaction).as_raw().to_vec(),
            fill: FillRestore::Snapshot(stack.surface(SurfaceKind::Fill).as_raw().to_vec()),
            legacy_regions: stack.fill_regions().to_vec(),
            regions_exact: stack.fill_is_exact(),
        }
    }

    /// Write this state back into the stack and resync processing.
    pub fn restore_into(&self, stack: &mut LayerStack) -> Result<(), CanvasError> {
        stack.restore_surface(SurfaceKind::Interaction, &self.main_snapshot)?;
        match &self.fill {
            FillRestore::Snapshot(pixels) => stack.restore_surface(SurfaceKind::Fill, pixels)?,
            FillRestore::LegacyRegions => stack.replay_fill_regions(&self.legacy_regions),
        }
        stack.set_fill_ledger(self.legacy_regions.clone(), self.regions_exact);
        stack.resync_processing()
    }

    pub fn region_count(&self) -> usize {
        self.legacy_regions.len()
    }

    pub fn has_fill_snapshot(&self) -> bool {
        matches!(self.fill, FillRestore::Snapshot(_))
    }

    /// Swap the fill snapshot for region replay if that is lossless.
    /// Returns the bytes released.
    fn compact(&mut self) -> usize {
        if !self.regions_exact {
            return 0;
        }
        match std::mem::replace(&mut self.fill, FillRestore::LegacyRegions) {
            FillRestore::Snapshot(pixels) => pixels.len(),
            FillRestore::LegacyRegions => 0,
        }
    }

    /// Snapshot bytes owned by this entry. Regions are shared with the
    /// stack and later entries so they are not counted.
    pub fn memory_size(&self) -> usize {
        let fill = match &self.fill {
            FillRestore::Snapshot(pixels) => pixels.len(),
            FillRestore::LegacyRegions => 0,
        };
        self.main_snapshot.len() + fill
    }
}

/// Result of a commit request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Recorded,
    /// Skipped as a duplicate of the entry at the pointer.
    Suppressed,
}

// ============================================================================
// HISTORY MANAGER - snapshot list with a moving pointer
// ============================================================================

/// Linear undo/redo history shared by every tool.
///
/// `pointer` always indexes the entry matching the current canvas; it is
/// `-1` only while the history is empty.
pub struct HistoryManager {
    entries: VecDeque<HistoryEntry>,
    pointer: isize,
    max_entries: usize,
    max_memory_bytes: Option<usize>,
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl HistoryManager {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            pointer: -1,
            max_entries: max_entries.max(1),
            max_memory_bytes: Some(DEFAULT_HISTORY_MEMORY),
            total_memory: 0,
        }
    }

    pub fn with_memory_limit(mut self, max_bytes: Option<usize>) -> Self {
        self.max_memory_bytes = max_bytes;
        self
    }

    /// Record the current paint surfaces as a new entry.
    pub fn commit(&mut self, kind: HistoryKind, stack: &LayerStack) -> CommitOutcome {
        if kind == HistoryKind::Fill
            && let Some(current) = self.current()
            && current.kind == HistoryKind::Fill
            && current.region_count() == stack.fill_regions().len()
        {
            return CommitOutcome::Suppressed;
        }

        // Drop the redo tail
        let keep = (self.pointer + 1) as usize;
        while self.entries.len() > keep {
            if let Some(removed) = self.entries.pop_back() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }

        let entry = HistoryEntry::capture(kind, stack);
        self.total_memory += entry.memory_size();
        self.entries.push_back(entry);
        self.pointer = self.entries.len() as isize - 1;

        self.prune();
        CommitOutcome::Recorded
    }

    /// Step back one entry. Returns the kind of the entry that was undone.
    pub fn undo(&mut self, stack: &mut LayerStack) -> Result<Option<HistoryKind>, CanvasError> {
        if !self.can_undo() {
            return Ok(None);
        }
        let undone = self.entries[self.pointer as usize].kind;
        let target = (self.pointer - 1) as usize;
        self.entries[target].restore_into(stack)?;
        self.pointer -= 1;
        Ok(Some(undone))
    }

    /// Step forward one entry. Returns the kind of the entry that was redone.
    pub fn redo(&mut self, stack: &mut LayerStack) -> Result<Option<HistoryKind>, CanvasError> {
        if !self.can_redo() {
            return Ok(None);
        }
        let target = (self.pointer + 1) as usize;
        self.entries[target].restore_into(stack)?;
        self.pointer += 1;
        Ok(Some(self.entries[target].kind))
    }

    /// Forget everything and start over from the stack's current state,
    /// which becomes the single initial entry.
    pub fn reset(&mut self, stack: &LayerStack) {
        self.clear();
        let entry = HistoryEntry::capture(HistoryKind::Initial, stack);
        self.total_memory = entry.memory_size();
        self.entries.push_back(entry);
        self.pointer = 0;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.pointer = -1;
        self.total_memory = 0;
    }

    pub fn can_undo(&self) -> bool {
        self.pointer > 0
    }

    pub fn can_redo(&self) -> bool {
        self.pointer >= 0 && ((self.pointer + 1) as usize) < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pointer(&self) -> isize {
        self.pointer
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        if self.pointer < 0 {
            return None;
        }
        self.entries.get(self.pointer as usize)
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn undo_description(&self) -> Option<&'static str> {
        if self.can_undo() {
            self.current().map(|e| e.kind.label())
        } else {
            None
        }
    }

    pub fn redo_description(&self) -> Option<&'static str> {
        if self.can_redo() {
            self.entries.get((self.pointer + 1) as usize).map(|e| e.kind.label())
        } else {
            None
        }
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    fn prune(&mut self) {
        while self.entries.len() > self.max_entries {
            self.evict_oldest();
        }

        let Some(max_bytes) = self.max_memory_bytes else { return };
        if self.total_memory <= max_bytes {
            return;
        }

        // Cheapest first: replace exact fill snapshots with region replay,
        // keeping the current entry's snapshot for fast undo/redo around it.
        let mut compacted = 0;
        for i in 0..self.entries.len() {
            if self.total_memory <= max_bytes {
                break;
            }
            if i as isize == self.pointer {
                continue;
            }
            let freed = self.entries[i].compact();
            if freed > 0 {
                self.total_memory = self.total_memory.saturating_sub(freed);
                compacted += 1;
            }
        }
        if compacted > 0 {
            log_info!("History over budget: compacted {} fill snapshot(s)", compacted);
        }

        // Never evict the last undo target, even over budget
        let mut evicted = 0;
        while self.total_memory > max_bytes && self.pointer > 1 {
            self.evict_oldest();
            evicted += 1;
        }
        if evicted > 0 {
            log_info!("History over budget: evicted {} oldest entr(ies)", evicted);
        }
    }

    fn evict_oldest(&mut self) {
        if let Some(removed) = self.entries.pop_front() {
            self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            self.pointer = (self.pointer - 1).max(if self.entries.is_empty() { -1 } else { 0 });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{BackgroundKind, PixelRect};
    use crate::components::colors::Rgb;
    use image::{Rgba, RgbaImage};

    fn stack() -> LayerStack {
        let img = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        LayerStack::initialize(&img, BackgroundKind::LineArt, 50, 4096).unwrap()
    }

    fn paint_fill(stack: &mut LayerStack, x: u32, color: Rgb) {
        let region = Arc::new(FillRegion::new(color, vec![(x, 0)], PixelRect::from_point(x, 0)));
        region.paint_onto(stack.surface_mut(SurfaceKind::Fill), 255);
        stack.record_fill(region);
    }

    #[test]
    fn reset_starts_with_single_entry() {
        let s = stack();
        let mut h = HistoryManager::default();
        assert_eq!(h.pointer(), -1);
        assert!(!h.can_undo());
        h.reset(&s);
        assert_eq!(h.len(), 1);
        assert_eq!(h.pointer(), 0);
        assert!(!h.can_undo());
        assert!(!h.can_redo());
        assert_eq!(h.current().unwrap().kind, HistoryKind::Initial);
    }

    #[test]
    fn undo_redo_restores_both_paint_surfaces() {
        let mut s = stack();
        let mut h = HistoryManager::default();
        h.reset(&s);

        paint_fill(&mut s, 1, Rgb::new(255, 0, 0));
        s.surface_mut(SurfaceKind::Interaction).put_pixel(2, 2, [0, 0, 255, 255]);
        assert_eq!(h.commit(HistoryKind::Fill, &s), CommitOutcome::Recorded);
        let painted_fill = s.surface(SurfaceKind::Fill).as_raw().to_vec();
        let painted_main = s.surface(SurfaceKind::Interaction).as_raw().to_vec();

        assert_eq!(h.undo(&mut s).unwrap(), Some(HistoryKind::Fill));
        assert!(s.surface(SurfaceKind::Fill).as_raw().iter().all(|&b| b == 0));
        assert_eq!(s.surface(SurfaceKind::Processing).get_pixel(1, 0), [255, 255, 255, 255]);
        assert!(s.fill_regions().is_empty());
        assert!(h.can_redo());

        assert_eq!(h.redo(&mut s).unwrap(), Some(HistoryKind::Fill));
        assert_eq!(s.surface(SurfaceKind::Fill).as_raw(), &painted_fill[..]);
        assert_eq!(s.surface(SurfaceKind::Interaction).as_raw(), &painted_main[..]);
        assert_eq!(s.surface(SurfaceKind::Processing).get_pixel(1, 0), [255, 0, 0, 255]);
        assert_eq!(s.fill_regions().len(), 1);
    }

    #[test]
    fn undo_and_redo_at_the_ends_are_noops() {
        let mut s = stack();
        let mut h = HistoryManager::default();
        h.reset(&s);
        assert_eq!(h.undo(&mut s).unwrap(), None);
        assert_eq!(h.redo(&mut s).unwrap(), None);
        assert_eq!(h.pointer(), 0);
    }

    #[test]
    fn commit_truncates_redo_tail() {
        let mut s = stack();
        let mut h = HistoryManager::default();
        h.reset(&s);
        paint_fill(&mut s, 0, Rgb::new(1, 1, 1));
        h.commit(HistoryKind::Fill, &s);
        paint_fill(&mut s, 1, Rgb::new(2, 2, 2));
        h.commit(HistoryKind::Fill, &s);
        h.undo(&mut s).unwrap();
        h.undo(&mut s).unwrap();
        assert_eq!(h.len(), 3);

        s.surface_mut(SurfaceKind::Interaction).put_pixel(0, 0, [5, 5, 5, 255]);
        h.commit(HistoryKind::Pencil, &s);
        assert_eq!(h.len(), 2);
        assert_eq!(h.pointer(), 1);
        assert!(!h.can_redo());
    }

    #[test]
    fn duplicate_fill_commit_is_suppressed() {
        let mut s = stack();
        let mut h = HistoryManager::default();
        h.reset(&s);
        paint_fill(&mut s, 0, Rgb::new(9, 9, 9));
        assert_eq!(h.commit(HistoryKind::Fill, &s), CommitOutcome::Recorded);
        assert_eq!(h.commit(HistoryKind::Fill, &s), CommitOutcome::Suppressed);
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn stroke_commits_are_never_suppressed() {
        let s = stack();
        let mut h = HistoryManager::default();
        h.reset(&s);
        assert_eq!(h.commit(HistoryKind::Eraser, &s), CommitOutcome::Recorded);
        assert_eq!(h.commit(HistoryKind::Eraser, &s), CommitOutcome::Recorded);
        assert_eq!(h.commit(HistoryKind::Pencil, &s), CommitOutcome::Recorded);
        assert_eq!(h.len(), 4);
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let s = stack();
        let mut h = HistoryManager::new(5);
        h.reset(&s);
        for _ in 0..10 {
            h.commit(HistoryKind::Pencil, &s);
        }
        assert_eq!(h.len(), 5);
        assert_eq!(h.pointer(), 4);
        assert!(h.entries().all(|e| e.kind == HistoryKind::Pencil));
    }

    #[test]
    fn legacy_regions_redraw_when_snapshot_absent() {
        let mut s = stack();
        let mut h = HistoryManager::default();
        h.reset(&s);
        paint_fill(&mut s, 2, Rgb::new(0, 200, 0));
        h.commit(HistoryKind::Fill, &s);
        let expected = s.surface(SurfaceKind::Fill).as_raw().to_vec();

        h.undo(&mut s).unwrap();
        h.entries[1].fill = FillRestore::LegacyRegions;
        h.redo(&mut s).unwrap();
        assert_eq!(s.surface(SurfaceKind::Fill).as_raw(), &expected[..]);
    }

    #[test]
    fn memory_budget_compacts_exact_entries_first() {
        let mut s = stack();
        // Each snapshot is 64 bytes; two per entry
        let mut h = HistoryManager::new(50).with_memory_limit(Some(128 * 3));
        h.reset(&s);
        for x in 0..3 {
            paint_fill(&mut s, x, Rgb::new(10 * x as u8, 0, 0));
            h.commit(HistoryKind::Fill, &s);
        }
        assert_eq!(h.len(), 4);
        assert!(h.memory_usage() <= 128 * 3);
        assert!(h.entries().any(|e| !e.has_fill_snapshot()));
        assert!(h.current().unwrap().has_fill_snapshot());

        // Compacted entries still restore exactly
        let before = s.surface(SurfaceKind::Fill).as_raw().to_vec();
        while h.can_undo() {
            h.undo(&mut s).unwrap();
        }
        while h.can_redo() {
            h.redo(&mut s).unwrap();
        }
        assert_eq!(s.surface(SurfaceKind::Fill).as_raw(), &before[..]);
    }

    #[test]
    fn inexact_entries_are_evicted_not_compacted() {
        let mut s = stack();
        let mut h = HistoryManager::new(50).with_memory_limit(Some(128 * 2));
        s.mark_fill_inexact();
        h.reset(&s);
        for _ in 0..3 {
            h.commit(HistoryKind::Eraser, &s);
        }
        assert!(h.memory_usage() <= 128 * 2);
        assert!(h.entries().all(|e| e.has_fill_snapshot()));
        assert_eq!(h.pointer() as usize, h.len() - 1);
    }

    #[test]
    fn memory_budget_keeps_one_undo_step() {
        let mut s = stack();
        // Smaller than a single entry
        let mut h = HistoryManager::new(50).with_memory_limit(Some(64));
        s.mark_fill_inexact();
        h.reset(&s);

        s.surface_mut(SurfaceKind::Interaction).put_pixel(0, 0, [1, 2, 3, 255]);
        h.commit(HistoryKind::Eraser, &s);
        assert_eq!(h.len(), 2);
        assert!(h.can_undo());

        s.surface_mut(SurfaceKind::Interaction).put_pixel(1, 0, [1, 2, 3, 255]);
        h.commit(HistoryKind::Pencil, &s);
        assert_eq!(h.len(), 2);
        assert_eq!(h.pointer(), 1);
        assert!(h.can_undo());

        assert_eq!(h.undo(&mut s).unwrap(), Some(HistoryKind::Pencil));
        assert_eq!(s.surface(SurfaceKind::Interaction).get_pixel(1, 0), [0, 0, 0, 0]);
        assert_eq!(s.surface(SurfaceKind::Interaction).get_pixel(0, 0), [1, 2, 3, 255]);
        assert!(!h.can_undo());
        assert!(h.can_redo());
    }
}
