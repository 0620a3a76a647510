// Word binding passes
//
// Binding mutates word cells in place inside a series, attaching them to
// storage. Three passes cover the runtime's needs:
//
//   bind_frame_deep     - words that name a frame key become Direct bindings
//                         (globals, objects)
//   bind_relative_deep  - words that name a function param become Relative
//                         bindings, resolved against the innermost live
//                         activation of that function at lookup time
//   copy_rebind_closure - deep-copies a body and turns the function's
//                         Relative bindings into Direct bindings on a fresh
//                         call frame, which is what lets the frame outlive
//                         the call
//
// All passes descend into nested blocks, groups and paths. Words for
// symbols the target does not know keep their prior binding.

use crate::cell::{Binding, Cell, FrameId, FuncId, SeriesId, Word};
use crate::function::Param;
use crate::heap::{Heap, HeapError, SeriesData};

fn rewrite_words(
    heap: &mut Heap,
    target: SeriesId,
    rebind: &mut impl FnMut(Word) -> Option<Binding>,
) {
    for i in 0..heap.len(target) {
        let cell = heap.cells(target)[i];
        match cell {
            Cell::Word(w) | Cell::SetWord(w) | Cell::GetWord(w) | Cell::LitWord(w) => {
                if let Some(binding) = rebind(w) {
                    let bound = Word { sym: w.sym, binding };
                    let new = match cell {
                        Cell::Word(_) => Cell::Word(bound),
                        Cell::SetWord(_) => Cell::SetWord(bound),
                        Cell::GetWord(_) => Cell::GetWord(bound),
                        _ => Cell::LitWord(bound),
                    };
                    heap.cells_mut(target)[i] = new;
                }
            }
            Cell::Block(inner) | Cell::Group(inner) | Cell::Path(inner) => {
                rewrite_words(heap, inner, &mut *rebind);
            }
            _ => {}
        }
    }
}

/// Bind words in `target` (deeply) to the keys of `frame`.
pub fn bind_frame_deep(heap: &mut Heap, target: SeriesId, frame: FrameId) {
    // Snapshot the key list so the rewrite pass can hold the heap mutably.
    let keys: Vec<_> = heap_frame(heap, frame)
        .keys()
        .enumerate()
        .map(|(i, sym)| (sym, i as u32))
        .collect();
    rewrite_words(heap, target, &mut |w: Word| {
        keys.iter()
            .find(|(sym, _)| *sym == w.sym)
            .map(|(_, slot)| Binding::Direct { frame, slot: *slot })
    });
}

/// Bind words in `target` (deeply) that name a parameter of `func` to
/// Relative bindings. Slot indices follow paramlist order.
pub fn bind_relative_deep(heap: &mut Heap, target: SeriesId, func: FuncId, params: &[Param]) {
    let slots: Vec<_> = params.iter().map(|p| p.sym).collect();
    rewrite_words(heap, target, &mut |w: Word| {
        slots
            .iter()
            .position(|sym| *sym == w.sym)
            .map(|slot| Binding::Relative {
                func,
                slot: slot as u32,
            })
    });
}

/// Deep-copy a closure body and retarget the closure's own Relative
/// bindings at `frame`. Nested blocks, groups and paths are copied; other
/// series stay shared. Every new series is managed.
pub fn copy_rebind_closure(
    heap: &mut Heap,
    body: SeriesId,
    func: FuncId,
    frame: FrameId,
) -> Result<SeriesId, HeapError> {
    let copy = copy_deep(heap, body)?;
    rewrite_words(heap, copy, &mut |w: Word| match w.binding {
        Binding::Relative { func: f, slot } if f == func => {
            Some(Binding::Direct { frame, slot })
        }
        _ => None,
    });
    Ok(copy)
}

/// Deep-copy a block-like series; nested blocks, groups and paths are
/// copied, everything else is shared. The copies are managed.
pub fn copy_deep(heap: &mut Heap, source: SeriesId) -> Result<SeriesId, HeapError> {
    let mut cells = heap.cells(source).to_vec();
    for cell in &mut cells {
        let copied = match *cell {
            Cell::Block(inner) => Cell::Block(copy_deep_inner(heap, inner)?),
            Cell::Group(inner) => Cell::Group(copy_deep_inner(heap, inner)?),
            Cell::Path(inner) => Cell::Path(copy_deep_inner(heap, inner)?),
            other => other,
        };
        *cell = copied;
    }
    let id = heap.alloc(SeriesData::Cells(cells))?;
    heap.manage(id);
    Ok(id)
}

fn copy_deep_inner(heap: &mut Heap, source: SeriesId) -> Result<SeriesId, HeapError> {
    copy_deep(heap, source)
}

/// Collect the symbols of all set-words in a block, descending into
/// nested blocks and groups. Used to pre-define keys before a frame bind.
pub fn collect_set_words(heap: &Heap, block: SeriesId, out: &mut Vec<crate::cell::SymbolId>) {
    for cell in heap.cells(block) {
        match cell {
            Cell::SetWord(w) => {
                if !out.contains(&w.sym) {
                    out.push(w.sym);
                }
            }
            Cell::Block(inner) | Cell::Group(inner) => collect_set_words(heap, *inner, out),
            _ => {}
        }
    }
}

fn heap_frame(heap: &Heap, frame: FrameId) -> &crate::frame::Frame {
    match &heap.get(frame.as_series()).data {
        SeriesData::Frame(f) => f,
        _ => panic!("frame handle does not name a frame"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Datatype, SymbolId, TypeSet};
    use crate::frame::Frame;
    use crate::function::ParamClass;

    fn heap() -> Heap {
        Heap::new(1024, 1024)
    }

    fn word_cell(sym: u32) -> Cell {
        Cell::Word(Word::unbound(SymbolId(sym)))
    }

    #[test]
    fn frame_binding_descends_into_nested_blocks() {
        let mut heap = heap();
        let mut frame = Frame::new();
        frame.define(SymbolId(7), Cell::Integer(42));
        let frame_series = heap.alloc(SeriesData::Frame(frame)).unwrap();
        let frame_id = FrameId(frame_series.0);

        let inner = heap
            .alloc(SeriesData::Cells(vec![word_cell(7), word_cell(9)]))
            .unwrap();
        let outer = heap
            .alloc(SeriesData::Cells(vec![word_cell(7), Cell::Block(inner)]))
            .unwrap();

        bind_frame_deep(&mut heap, outer, frame_id);

        let expect = Binding::Direct {
            frame: frame_id,
            slot: 0,
        };
        assert_eq!(heap.cells(outer)[0].as_word().unwrap().binding, expect);
        assert_eq!(heap.cells(inner)[0].as_word().unwrap().binding, expect);
        // unknown words keep their binding
        assert_eq!(
            heap.cells(inner)[1].as_word().unwrap().binding,
            Binding::Unbound
        );
    }

    #[test]
    fn relative_binding_targets_param_slots() {
        let mut heap = heap();
        let params = vec![
            Param {
                sym: SymbolId(1),
                class: ParamClass::Normal,
                types: TypeSet::ANY,
            },
            Param {
                sym: SymbolId(2),
                class: ParamClass::Local,
                types: TypeSet::ANY,
            },
        ];
        let body = heap
            .alloc(SeriesData::Cells(vec![word_cell(2), word_cell(1)]))
            .unwrap();
        bind_relative_deep(&mut heap, body, FuncId(3), &params);
        assert_eq!(
            heap.cells(body)[0].as_word().unwrap().binding,
            Binding::Relative {
                func: FuncId(3),
                slot: 1
            }
        );
        assert_eq!(
            heap.cells(body)[1].as_word().unwrap().binding,
            Binding::Relative {
                func: FuncId(3),
                slot: 0
            }
        );
    }

    #[test]
    fn closure_rebind_copies_and_leaves_original_untouched() {
        let mut heap = heap();
        let func = FuncId(5);
        let params = vec![Param {
            sym: SymbolId(4),
            class: ParamClass::Normal,
            types: TypeSet::ANY,
        }];
        let inner = heap
            .alloc(SeriesData::Cells(vec![word_cell(4)]))
            .unwrap();
        let body = heap
            .alloc(SeriesData::Cells(vec![word_cell(4), Cell::Block(inner)]))
            .unwrap();
        bind_relative_deep(&mut heap, body, func, &params);

        let call_frame_series = heap.alloc(SeriesData::Frame(Frame::new())).unwrap();
        let call_frame = FrameId(call_frame_series.0);
        let copy = copy_rebind_closure(&mut heap, body, func, call_frame).unwrap();

        assert_ne!(copy, body);
        assert!(heap.is_managed(copy));
        let expect = Binding::Direct {
            frame: call_frame,
            slot: 0,
        };
        assert_eq!(heap.cells(copy)[0].as_word().unwrap().binding, expect);
        // nested block was copied, not shared
        let copied_inner = heap.cells(copy)[1].as_block().unwrap();
        assert_ne!(copied_inner, inner);
        assert_eq!(
            heap.cells(copied_inner)[0].as_word().unwrap().binding,
            expect
        );
        // original body still carries relative bindings
        assert_eq!(
            heap.cells(body)[0].as_word().unwrap().binding,
            Binding::Relative { func, slot: 0 }
        );
        assert!(matches!(cell_datatype(&heap, copy), Datatype::Word));
    }

    fn cell_datatype(heap: &Heap, id: SeriesId) -> Datatype {
        heap.cells(id)[0].datatype()
    }

    #[test]
    fn deep_copy_rewrites_nested_series_and_keeps_scalars() {
        let mut heap = heap();
        let group = heap
            .alloc(SeriesData::Cells(vec![Cell::Integer(1)]))
            .unwrap();
        let path = heap
            .alloc(SeriesData::Cells(vec![word_cell(8)]))
            .unwrap();
        let source = heap
            .alloc(SeriesData::Cells(vec![
                Cell::Integer(42),
                Cell::Group(group),
                Cell::Path(path),
                word_cell(9),
            ]))
            .unwrap();

        let copy = copy_deep(&mut heap, source).unwrap();

        assert_ne!(copy, source);
        assert_eq!(heap.cells(copy)[0], Cell::Integer(42));
        assert_eq!(heap.cells(copy)[3], word_cell(9));
        // nested group and path get their own backing series
        match (heap.cells(copy)[1], heap.cells(copy)[2]) {
            (Cell::Group(g), Cell::Path(p)) => {
                assert_ne!(g, group);
                assert_ne!(p, path);
                assert_eq!(heap.cells(g), heap.cells(group));
            }
            other => panic!("nested series not copied: {other:?}"),
        }
    }
}
