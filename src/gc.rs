// Mark/sweep collection over managed series
//
// Roots: the global frame, the guard stack, every manual series (manual
// lifetime is explicit, so whatever a manual series references must
// survive), the data stack, activation frames and guarded bodies, and the
// near fragment. Function bodies and specs are rooted through the function
// arena, which never shrinks.
//
// Manual series are never swept; only unmarked managed series are
// reclaimed.

use log::debug;

use crate::cell::SeriesId;
use crate::function::FuncBody;
use crate::heap::{Heap, SeriesData};
use crate::machine::Machine;

pub fn collect(m: &mut Machine) {
    if m.heap.gc_disabled > 0 || !m.config.gc_enabled {
        return;
    }
    m.heap.clear_marks();

    let mut worklist: Vec<SeriesId> = Vec::new();
    worklist.push(m.global.as_series());
    worklist.extend_from_slice(m.heap.guarded());
    worklist.extend_from_slice(m.heap.manuals());
    for f in &m.funcs {
        match f.body {
            FuncBody::User { body } | FuncBody::Closure { body } => worklist.push(body),
            _ => {}
        }
        if let Some(spec) = f.spec {
            worklist.push(spec);
        }
    }
    for cell in &m.ds {
        cell_children(cell, &mut worklist);
    }
    for a in &m.calls {
        if let Some(frame) = a.frame {
            worklist.push(frame.as_series());
        }
        if let Some(body) = a.guarded_body {
            worklist.push(body);
        }
    }
    let near = m.current_near;
    cell_children(&near, &mut worklist);

    while let Some(id) = worklist.pop() {
        // a dangling handle in live data is skipped, not chased
        if !m.heap.contains(id) {
            continue;
        }
        if !m.heap.mark(id) {
            continue;
        }
        push_children(&m.heap, id, &mut worklist);
    }

    let mut swept = 0;
    for i in 0..m.heap.slot_count() {
        let dead = match m.heap.slot(i) {
            Some(s) => s.is_managed() && !s.mark,
            None => false,
        };
        if dead {
            m.heap.reclaim_managed(SeriesId(i as u32));
            swept += 1;
        }
    }
    m.heap.allocs_since_gc = 0;
    debug!("gc: swept {} series, {} live", swept, m.heap.live_count());
}

/// Children of a cell: its series handle, plus the frame a bound word
/// points at. Word bindings keep their frames alive.
fn cell_children(cell: &crate::cell::Cell, out: &mut Vec<SeriesId>) {
    if let Some(id) = cell.series_handle() {
        out.push(id);
    }
    if let Some(w) = cell.as_word() {
        if let crate::cell::Binding::Direct { frame, .. } = w.binding {
            out.push(frame.as_series());
        }
    }
}

fn push_children(heap: &Heap, id: SeriesId, out: &mut Vec<SeriesId>) {
    match &heap.get(id).data {
        SeriesData::Cells(cells) => {
            for cell in cells {
                cell_children(cell, out);
            }
        }
        SeriesData::Bytes(_) => {}
        SeriesData::Frame(frame) => {
            for cell in frame.values() {
                cell_children(cell, out);
            }
        }
    }
}
