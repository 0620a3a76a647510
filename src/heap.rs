// Series storage for the Cella runtime
//
// Every growable buffer (cell blocks, byte strings, frames) lives in one
// instance-owned arena and is addressed by handle. Two lifecycle regimes:
//
//   manual  - created by default, tracked in a ledger so a trap unwind can
//             free everything allocated since the trap was pushed, freed
//             explicitly with `free`
//   managed - ownership passed to the collector with `manage`; collected
//             once unreachable from roots and guards
//
// The manual -> managed transition is one way. Freeing a managed series,
// double-freeing, or touching a stale handle is an internal defect and
// panics rather than producing a recoverable error.

use crate::cell::{Cell, SeriesId};
use crate::frame::Frame;

pub const SER_MANAGED: u8 = 1 << 0;
pub const SER_FIXED: u8 = 1 << 1;
pub const SER_PROTECTED: u8 = 1 << 2;

/// Failures the memory model reports to user code (routed through the
/// trap machinery by the machine-level wrappers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    OutOfMemory,
    SeriesTooLarge,
    FixedSizeViolation,
    Protected,
}

/// Series payload. Frames are a specialization carrying parallel key and
/// value lists instead of a flat buffer.
pub enum SeriesData {
    Cells(Vec<Cell>),
    Bytes(Vec<u8>),
    Frame(Frame),
}

pub struct Series {
    pub data: SeriesData,
    pub(crate) flags: u8,
    pub(crate) mark: bool,
}

impl Series {
    pub fn is_managed(&self) -> bool {
        self.flags & SER_MANAGED != 0
    }

    pub fn is_fixed(&self) -> bool {
        self.flags & SER_FIXED != 0
    }

    pub fn is_protected(&self) -> bool {
        self.flags & SER_PROTECTED != 0
    }

    pub fn len(&self) -> usize {
        match &self.data {
            SeriesData::Cells(v) => v.len(),
            SeriesData::Bytes(v) => v.len(),
            SeriesData::Frame(f) => f.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct Heap {
    slots: Vec<Option<Series>>,
    free_slots: Vec<u32>,
    /// Ledger of live manual series, in allocation order. Trap points record
    /// its tail; unwind frees everything past the recorded tail.
    manuals: Vec<SeriesId>,
    /// Guarded handles are collector roots. Stack-disciplined; the trap
    /// unwind truncates back to the recorded tail.
    guards: Vec<SeriesId>,
    pub(crate) gc_disabled: u32,
    pub(crate) allocs_since_gc: usize,
    series_capacity_limit: usize,
    max_live_series: usize,
    live: usize,
}

impl Heap {
    pub fn new(series_capacity_limit: usize, max_live_series: usize) -> Self {
        Heap {
            slots: Vec::with_capacity(256),
            free_slots: Vec::new(),
            manuals: Vec::new(),
            guards: Vec::new(),
            gc_disabled: 0,
            allocs_since_gc: 0,
            series_capacity_limit,
            max_live_series,
            live: 0,
        }
    }

    /// Allocate a manual series. The handle is entered into the ledger so a
    /// later trap unwind can reclaim it.
    pub fn alloc(&mut self, data: SeriesData) -> Result<SeriesId, HeapError> {
        if data_len(&data) > self.series_capacity_limit {
            return Err(HeapError::SeriesTooLarge);
        }
        if self.live >= self.max_live_series {
            return Err(HeapError::OutOfMemory);
        }
        self.allocs_since_gc += 1;
        self.live += 1;
        let series = Series {
            data,
            flags: 0,
            mark: false,
        };
        let id = if let Some(slot) = self.free_slots.pop() {
            self.slots[slot as usize] = Some(series);
            SeriesId(slot)
        } else {
            self.slots.push(Some(series));
            SeriesId((self.slots.len() - 1) as u32)
        };
        self.manuals.push(id);
        Ok(id)
    }

    pub fn get(&self, id: SeriesId) -> &Series {
        self.slots[id.0 as usize]
            .as_ref()
            .expect("stale series handle")
    }

    pub fn get_mut(&mut self, id: SeriesId) -> &mut Series {
        self.slots[id.0 as usize]
            .as_mut()
            .expect("stale series handle")
    }

    pub fn contains(&self, id: SeriesId) -> bool {
        self.slots
            .get(id.0 as usize)
            .map_or(false, |slot| slot.is_some())
    }

    pub fn cells(&self, id: SeriesId) -> &[Cell] {
        match &self.get(id).data {
            SeriesData::Cells(v) => v,
            _ => panic!("cell access on non-cell series"),
        }
    }

    pub fn cells_mut(&mut self, id: SeriesId) -> &mut Vec<Cell> {
        match &mut self.get_mut(id).data {
            SeriesData::Cells(v) => v,
            _ => panic!("cell access on non-cell series"),
        }
    }

    pub fn bytes(&self, id: SeriesId) -> &[u8] {
        match &self.get(id).data {
            SeriesData::Bytes(v) => v,
            _ => panic!("byte access on non-byte series"),
        }
    }

    pub fn len(&self, id: SeriesId) -> usize {
        self.get(id).len()
    }

    /// Read one cell by position, or None past the tail.
    pub fn cell_at(&self, id: SeriesId, index: usize) -> Option<Cell> {
        self.cells(id).get(index).copied()
    }

    /// Amortized O(1) append. Fixed-size series reject growth; protected
    /// series reject any write.
    pub fn append_cell(&mut self, id: SeriesId, cell: Cell) -> Result<(), HeapError> {
        self.check_growable(id)?;
        self.cells_mut(id).push(cell);
        Ok(())
    }

    pub fn append_cells(&mut self, id: SeriesId, cells: &[Cell]) -> Result<(), HeapError> {
        self.check_growable(id)?;
        if self.len(id) + cells.len() > self.series_capacity_limit {
            return Err(HeapError::SeriesTooLarge);
        }
        self.cells_mut(id).extend_from_slice(cells);
        Ok(())
    }

    pub fn append_bytes(&mut self, id: SeriesId, bytes: &[u8]) -> Result<(), HeapError> {
        self.check_growable(id)?;
        match &mut self.get_mut(id).data {
            SeriesData::Bytes(v) => v.extend_from_slice(bytes),
            _ => panic!("byte access on non-byte series"),
        }
        Ok(())
    }

    /// Overwrite a cell in place. Honors write protection but not FIXED
    /// (poke does not grow).
    pub fn poke_cell(&mut self, id: SeriesId, index: usize, cell: Cell) -> Result<(), HeapError> {
        if self.get(id).is_protected() {
            return Err(HeapError::Protected);
        }
        let cells = self.cells_mut(id);
        if index >= cells.len() {
            panic!("poke past series tail");
        }
        cells[index] = cell;
        Ok(())
    }

    fn check_growable(&self, id: SeriesId) -> Result<(), HeapError> {
        let series = self.get(id);
        if series.is_protected() {
            return Err(HeapError::Protected);
        }
        if series.is_fixed() {
            return Err(HeapError::FixedSizeViolation);
        }
        if series.len() >= self.series_capacity_limit {
            return Err(HeapError::SeriesTooLarge);
        }
        Ok(())
    }

    /// One-shot manual -> managed transition. The series leaves the ledger;
    /// from here on only the collector may reclaim it.
    pub fn manage(&mut self, id: SeriesId) {
        let series = self.get_mut(id);
        assert!(!series.is_managed(), "manage of already-managed series");
        series.flags |= SER_MANAGED;
        self.ledger_remove(id);
    }

    pub fn is_managed(&self, id: SeriesId) -> bool {
        self.get(id).is_managed()
    }

    pub fn set_fixed(&mut self, id: SeriesId) {
        self.get_mut(id).flags |= SER_FIXED;
    }

    pub fn set_protected(&mut self, id: SeriesId, on: bool) {
        if on {
            self.get_mut(id).flags |= SER_PROTECTED;
        } else {
            self.get_mut(id).flags &= !SER_PROTECTED;
        }
    }

    /// Free a manual series. Valid only while manual; freeing a managed
    /// series or double-freeing is a defect.
    pub fn free(&mut self, id: SeriesId) {
        let series = self.slots[id.0 as usize]
            .as_ref()
            .expect("double free of series");
        assert!(!series.is_managed(), "free of managed series");
        self.ledger_remove(id);
        self.drop_slot(id);
    }

    fn drop_slot(&mut self, id: SeriesId) {
        self.slots[id.0 as usize] = None;
        self.free_slots.push(id.0);
        self.live -= 1;
    }

    /// Reclaim an unreachable managed series (collector sweep only).
    pub(crate) fn reclaim_managed(&mut self, id: SeriesId) {
        debug_assert!(self.get(id).is_managed());
        self.drop_slot(id);
    }

    fn ledger_remove(&mut self, id: SeriesId) {
        // Most removals are of recent allocations, so scan from the tail.
        let pos = self
            .manuals
            .iter()
            .rposition(|m| *m == id)
            .expect("manual series missing from ledger");
        self.manuals.remove(pos);
    }

    pub fn manuals_tail(&self) -> usize {
        self.manuals.len()
    }

    /// Free every manual series allocated after the recorded ledger tail.
    /// Used by trap unwind. Returns how many were freed.
    pub fn free_manuals_after(&mut self, tail: usize) -> usize {
        let mut freed = 0;
        while self.manuals.len() > tail {
            let id = self.manuals[self.manuals.len() - 1];
            self.free(id);
            freed += 1;
        }
        freed
    }

    // --- guards ---

    pub fn guard(&mut self, id: SeriesId) {
        self.guards.push(id);
    }

    pub fn drop_guard(&mut self, id: SeriesId) {
        let top = self.guards.pop().expect("guard stack underflow");
        assert_eq!(top, id, "guards dropped out of order");
    }

    pub fn guards_tail(&self) -> usize {
        self.guards.len()
    }

    pub fn truncate_guards(&mut self, tail: usize) {
        self.guards.truncate(tail);
    }

    pub(crate) fn guarded(&self) -> &[SeriesId] {
        &self.guards
    }

    // --- statistics / collector support ---

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn manual_count(&self) -> usize {
        self.manuals.len()
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn slot(&self, index: usize) -> Option<&Series> {
        self.slots[index].as_ref()
    }

    pub(crate) fn clear_marks(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.mark = false;
        }
    }

    /// Mark a series reachable. Returns true if this is the first visit.
    pub(crate) fn mark(&mut self, id: SeriesId) -> bool {
        let series = self.get_mut(id);
        if series.mark {
            false
        } else {
            series.mark = true;
            true
        }
    }

    pub(crate) fn manuals(&self) -> &[SeriesId] {
        &self.manuals
    }
}

fn data_len(data: &SeriesData) -> usize {
    match data {
        SeriesData::Cells(v) => v.len(),
        SeriesData::Bytes(v) => v.len(),
        SeriesData::Frame(f) => f.len(),
    }
}
