// Frames: ordered key/value contexts
//
// A frame pairs an ordered key list with a parallel value list. Objects,
// error values and closure call frames are all frames; they live in the
// heap's slot space so the ledger, guard stack and collector treat them
// like any other series.
//
// Key order is creation order and is part of the observable contract:
// reflection and the collector both walk slots in that order.

use indexmap::IndexMap;

use crate::cell::{Cell, SymbolId};

/// Key visible to `in`/reflection only when not hidden. Pure locals in
/// function frames are hidden.
pub const KEY_HIDDEN: u8 = 1 << 0;
/// Word-level write protection, distinct from series-level protection.
pub const KEY_LOCKED: u8 = 1 << 1;

#[derive(Debug, Clone)]
pub struct Frame {
    keys: IndexMap<SymbolId, u8>,
    values: Vec<Cell>,
}

impl Frame {
    pub fn new() -> Self {
        Frame {
            keys: IndexMap::new(),
            values: Vec::new(),
        }
    }

    pub fn with_capacity(n: usize) -> Self {
        Frame {
            keys: IndexMap::with_capacity(n),
            values: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Define or overwrite a key. New keys append; redefining keeps the
    /// original slot and order. Returns the slot index.
    pub fn define(&mut self, sym: SymbolId, value: Cell) -> u32 {
        self.define_with_flags(sym, value, 0)
    }

    pub fn define_with_flags(&mut self, sym: SymbolId, value: Cell, flags: u8) -> u32 {
        match self.keys.get_index_of(&sym) {
            Some(slot) => {
                self.values[slot] = value;
                slot as u32
            }
            None => {
                let slot = self.values.len() as u32;
                self.keys.insert(sym, flags);
                self.values.push(value);
                slot
            }
        }
    }

    /// Append a key that must not already exist. Used when materializing
    /// call frames from a paramlist, where duplicates were already rejected.
    pub fn push_key(&mut self, sym: SymbolId, value: Cell, flags: u8) -> u32 {
        let slot = self.values.len() as u32;
        let prior = self.keys.insert(sym, flags);
        debug_assert!(prior.is_none(), "duplicate key in frame");
        self.values.push(value);
        slot
    }

    pub fn slot_of(&self, sym: SymbolId) -> Option<u32> {
        self.keys.get_index_of(&sym).map(|i| i as u32)
    }

    pub fn key_at(&self, slot: u32) -> SymbolId {
        *self
            .keys
            .get_index(slot as usize)
            .expect("frame slot out of range")
            .0
    }

    pub fn flags_at(&self, slot: u32) -> u8 {
        *self
            .keys
            .get_index(slot as usize)
            .expect("frame slot out of range")
            .1
    }

    pub fn is_locked(&self, slot: u32) -> bool {
        self.flags_at(slot) & KEY_LOCKED != 0
    }

    pub fn is_hidden(&self, slot: u32) -> bool {
        self.flags_at(slot) & KEY_HIDDEN != 0
    }

    pub fn set_locked(&mut self, slot: u32, on: bool) {
        let (_, flags) = self
            .keys
            .get_index_mut(slot as usize)
            .expect("frame slot out of range");
        if on {
            *flags |= KEY_LOCKED;
        } else {
            *flags &= !KEY_LOCKED;
        }
    }

    pub fn get(&self, slot: u32) -> Cell {
        self.values[slot as usize]
    }

    pub fn set(&mut self, slot: u32, value: Cell) {
        self.values[slot as usize] = value;
    }

    pub fn get_by_sym(&self, sym: SymbolId) -> Option<Cell> {
        self.slot_of(sym).map(|slot| self.get(slot))
    }

    pub fn keys(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.keys.keys().copied()
    }

    /// Keys visible to reflection (hidden slots skipped), with their values.
    pub fn visible(&self) -> impl Iterator<Item = (SymbolId, Cell)> + '_ {
        self.keys
            .iter()
            .zip(self.values.iter())
            .filter(|((_, flags), _)| **flags & KEY_HIDDEN == 0)
            .map(|((sym, _), value)| (*sym, *value))
    }

    pub fn values(&self) -> &[Cell] {
        &self.values
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}
