// Trap points and unwind recovery
//
// A trap point is a snapshot of the restorable machine state: data stack
// depth, activation depth, guard stack tail, manual ledger tail and the
// GC disable count. Raising transfers control by returning Err(Unwind)
// up through the evaluator; no state is restored along the way. The
// handler that catches the unwind calls `recover`, which truncates the
// stacks, frees every manual series allocated since the trap was pushed
// and restores the GC state.
//
// Halt passes through traps whose `intercept_halt` is false; each one
// still recovers its state before re-raising, so a halt crossing ten
// traps leaves no manual series behind.

use log::trace;

use crate::machine::Machine;

#[derive(Debug, Clone, Copy)]
pub struct TrapPoint {
    pub ds_depth: usize,
    pub call_depth: usize,
    pub guard_tail: usize,
    pub manuals_tail: usize,
    pub gc_disabled: u32,
    pub intercept_halt: bool,
}

pub fn push_trap(m: &mut Machine, intercept_halt: bool) {
    let point = TrapPoint {
        ds_depth: m.ds.len(),
        call_depth: m.calls.len(),
        guard_tail: m.heap.guards_tail(),
        manuals_tail: m.heap.manuals_tail(),
        gc_disabled: m.heap.gc_disabled,
        intercept_halt,
    };
    m.traps.push(point);
}

/// Pop the top trap without restoring anything. Success path: evaluation
/// completed, so the state is already back where it was.
pub fn discard_trap(m: &mut Machine) {
    m.traps.pop().expect("trap stack underflow");
}

/// Pop the top trap and restore the machine to its snapshot. Called at
/// the catch site after an unwind arrived.
pub fn recover(m: &mut Machine) -> TrapPoint {
    let point = m.traps.pop().expect("recover without a trap");
    m.ds.truncate(point.ds_depth);
    m.calls.truncate(point.call_depth);
    m.heap.truncate_guards(point.guard_tail);
    let freed = m.heap.free_manuals_after(point.manuals_tail);
    m.heap.gc_disabled = point.gc_disabled;
    if freed > 0 {
        trace!("trap recovery freed {} manual series", freed);
    }
    point
}
