// Native functions
//
// Every native reads its type-checked arguments off the data stack at the
// base the dispatcher hands it. Control-flow natives work in terms of
// Outcome: loops intercept break/continue labels, catch matches throw
// labels, try is the only place an unwind is converted back into a value.

use crate::binding::{bind_frame_deep, bind_relative_deep, collect_set_words, copy_deep};
use crate::cell::{Binding, Cell, Datatype, SeriesId, Word};
use crate::error::{ErrorKind, Outcome, RuntimeResult, Thrown, Unwind};
use crate::evaluator::{eval_block, pick};
use crate::frame::Frame;
use crate::function::{assemble_params, FuncBody, Function};
use crate::heap::SeriesData;
use crate::machine::Machine;
use crate::symbol::{SYM_BREAK, SYM_CONTINUE, SYM_EXIT, SYM_HALT, SYM_SELF};
use crate::trap::{discard_trap, push_trap, recover};

pub fn install(m: &mut Machine) {
    // control flow
    let s = spec(m, |b| {
        b.word("condition");
        b.word_typed("body", &[Datatype::Block]);
    });
    register(m, "if", s, native_if);

    let s = spec(m, |b| {
        b.word("condition");
        b.word_typed("true-branch", &[Datatype::Block]);
        b.word_typed("false-branch", &[Datatype::Block]);
    });
    register(m, "either", s, native_either);

    let s = spec(m, |b| {
        b.word_typed("condition", &[Datatype::Block]);
        b.word_typed("body", &[Datatype::Block]);
    });
    register(m, "while", s, native_while);

    let s = spec(m, |b| {
        b.word_typed("count", &[Datatype::Integer]);
        b.word_typed("body", &[Datatype::Block]);
    });
    register(m, "loop", s, native_loop);

    let s = spec(m, |_| {});
    register(m, "break", s, native_break);
    let s = spec(m, |_| {});
    register(m, "continue", s, native_continue);
    let s = spec(m, |_| {});
    register(m, "exit", s, native_exit);
    let s = spec(m, |_| {});
    register(m, "halt", s, native_halt);

    let s = spec(m, |b| {
        b.word_typed("body", &[Datatype::Block]);
        b.refinement("name");
        b.word_typed("word", &[Datatype::Word]);
    });
    register(m, "catch", s, native_catch);

    let s = spec(m, |b| {
        b.word("value");
        b.refinement("name");
        b.word_typed("word", &[Datatype::Word]);
    });
    register(m, "throw", s, native_throw);

    let s = spec(m, |b| {
        b.word_typed("body", &[Datatype::Block]);
        b.refinement("halt");
    });
    register(m, "try", s, native_try);

    let s = spec(m, |b| {
        b.word_typed("body", &[Datatype::Block]);
    });
    register(m, "attempt", s, native_attempt);

    let s = spec(m, |b| {
        b.word("value");
    });
    register(m, "do", s, native_do);

    // function construction
    let s = spec(m, |b| {
        b.word_typed("spec", &[Datatype::Block]);
        b.word_typed("body", &[Datatype::Block]);
    });
    register(m, "func", s, native_func);

    let s = spec(m, |b| {
        b.word_typed("spec", &[Datatype::Block]);
        b.word_typed("body", &[Datatype::Block]);
    });
    register(m, "closure", s, native_closure);

    let s = spec(m, |b| {
        b.word_typed("body", &[Datatype::Block]);
    });
    register(m, "does", s, native_does);

    // objects and words
    let s = spec(m, |b| {
        b.word("type");
        b.word("value");
    });
    register(m, "make", s, native_make);

    let s = spec(m, |b| {
        b.word_typed("object", &[Datatype::Object, Datatype::Error]);
        b.word_typed("word", &[Datatype::Word]);
    });
    register(m, "in", s, native_in);

    let s = spec(m, |b| {
        b.word_typed("word", &[Datatype::Word]);
        b.word("value");
    });
    register(m, "set", s, native_set);

    let s = spec(m, |b| {
        b.word_typed("word", &[Datatype::Word]);
    });
    register(m, "get", s, native_get);

    let s = spec(m, |b| {
        b.word("value");
    });
    register(m, "protect", s, native_protect);
    let s = spec(m, |b| {
        b.word("value");
    });
    register(m, "unprotect", s, native_unprotect);

    let s = spec(m, |b| {
        b.refinement("off");
        b.refinement("on");
    });
    register(m, "recycle", s, native_recycle);

    // series
    let s = spec(m, |b| {
        b.word_typed("series", &[Datatype::Block, Datatype::Text]);
        b.word("value");
        b.refinement("only");
    });
    register(m, "append", s, native_append);

    let s = spec(m, |b| {
        b.word_typed("series", &[Datatype::Block]);
        b.word_typed("index", &[Datatype::Integer]);
    });
    register(m, "pick", s, native_pick);

    let s = spec(m, |b| {
        b.word_typed("series", &[Datatype::Block]);
        b.word_typed("index", &[Datatype::Integer]);
        b.word("value");
    });
    register(m, "poke", s, native_poke);

    let s = spec(m, |b| {
        b.word_typed("series", &[Datatype::Block, Datatype::Text]);
    });
    register(m, "length-of", s, native_length_of);

    let s = spec(m, |b| {
        b.word_typed("value", &[Datatype::Block, Datatype::Text]);
        b.refinement("deep");
    });
    register(m, "copy", s, native_copy);

    // values and comparison
    let s = spec(m, |b| {
        b.word("value");
    });
    register(m, "type-of", s, native_type_of);

    let s = spec(m, |b| {
        b.word("a");
        b.word("b");
    });
    register(m, "equal?", s, native_equal);
    let s = spec(m, |b| {
        b.word("a");
        b.word("b");
    });
    register(m, "same?", s, native_same);
    let s = spec(m, |b| {
        b.word("value");
    });
    register(m, "not", s, native_not);

    // operators
    let num = [Datatype::Integer, Datatype::Decimal];
    for (name, body) in [
        ("+", native_add as crate::function::NativeFn),
        ("-", native_subtract),
        ("*", native_multiply),
        ("/", native_divide),
        ("<", native_lesser),
        (">", native_greater),
    ] {
        let s = spec(m, |b| {
            b.infix();
            b.word_typed("a", &num);
            b.word_typed("b", &num);
        });
        register(m, name, s, body);
    }
    for (name, body) in [
        ("=", native_equal_op as crate::function::NativeFn),
        ("<>", native_unequal_op),
        ("and", native_and),
        ("or", native_or),
    ] {
        let s = spec(m, |b| {
            b.infix();
            b.word("a");
            b.word("b");
        });
        register(m, name, s, body);
    }

    // datatype words
    for t in crate::cell::ALL_DATATYPES {
        m.set_global(t.name(), Cell::Datatype(t));
    }
    m.set_global("none", Cell::None);
    m.set_global("true", Cell::Logic(true));
    m.set_global("false", Cell::Logic(false));
}

// --- spec building ---

struct SpecBuilder<'a> {
    m: &'a mut Machine,
    cells: Vec<Cell>,
}

impl SpecBuilder<'_> {
    fn word(&mut self, name: &str) {
        let sym = self.m.symbols.intern(name);
        self.cells.push(Cell::Word(Word::unbound(sym)));
    }

    fn word_typed(&mut self, name: &str, types: &[Datatype]) {
        self.word(name);
        let cells = types.iter().map(|t| Cell::Datatype(*t)).collect();
        let id = self
            .m
            .heap
            .alloc(SeriesData::Cells(cells))
            .expect("boot allocation failed");
        self.m.heap.manage(id);
        self.cells.push(Cell::Block(id));
    }

    fn refinement(&mut self, name: &str) {
        let sym = self.m.symbols.intern(name);
        self.cells.push(Cell::Refinement(sym));
    }

    fn infix(&mut self) {
        self.word("<infix>");
    }
}

fn spec(m: &mut Machine, build: impl FnOnce(&mut SpecBuilder)) -> SeriesId {
    let mut b = SpecBuilder {
        m,
        cells: Vec::new(),
    };
    build(&mut b);
    let cells = b.cells;
    m.heap
        .alloc(SeriesData::Cells(cells))
        .expect("boot allocation failed")
}

fn register(m: &mut Machine, name: &str, spec: SeriesId, body: crate::function::NativeFn) {
    m.register_native(name, spec, body)
        .expect("boot native spec rejected");
}

// --- argument access (types enforced by the dispatcher) ---

fn arg(m: &Machine, base: usize, i: usize) -> Cell {
    m.ds[base + i]
}

fn block_arg(m: &Machine, base: usize, i: usize) -> SeriesId {
    match m.ds[base + i] {
        Cell::Block(id) => id,
        ref other => unreachable!("type-checked block argument, got {}", other.type_name()),
    }
}

fn int_arg(m: &Machine, base: usize, i: usize) -> i64 {
    match m.ds[base + i] {
        Cell::Integer(n) => n,
        ref other => unreachable!("type-checked integer argument, got {}", other.type_name()),
    }
}

fn word_arg(m: &Machine, base: usize, i: usize) -> Word {
    match m.ds[base + i] {
        Cell::Word(w) => w,
        ref other => unreachable!("type-checked word argument, got {}", other.type_name()),
    }
}

fn refinement_on(m: &Machine, base: usize, i: usize) -> bool {
    m.ds[base + i].is_truthy()
}

// --- control flow ---

fn native_if(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    if arg(m, base, 0).is_truthy() {
        eval_block(m, block_arg(m, base, 1))
    } else {
        Ok(Outcome::Value(Cell::None))
    }
}

fn native_either(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let branch = if arg(m, base, 0).is_truthy() { 1 } else { 2 };
    eval_block(m, block_arg(m, base, branch))
}

/// Loop body outcome: Some(out) means stop the loop and yield it.
fn loop_step(out: Outcome, last: &mut Cell) -> Option<Outcome> {
    match out {
        Outcome::Value(v) => {
            *last = v;
            None
        }
        Outcome::Thrown(t) if t.target.is_none() && t.label == Some(SYM_BREAK) => {
            Some(Outcome::Value(Cell::None))
        }
        Outcome::Thrown(t) if t.target.is_none() && t.label == Some(SYM_CONTINUE) => None,
        thrown => Some(thrown),
    }
}

fn native_while(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let condition = block_arg(m, base, 0);
    let body = block_arg(m, base, 1);
    let mut last = Cell::None;
    loop {
        match eval_block(m, condition)? {
            Outcome::Value(v) if v.is_truthy() => {}
            Outcome::Value(_) => return Ok(Outcome::Value(last)),
            thrown => return Ok(thrown),
        }
        if let Some(out) = loop_step(eval_block(m, body)?, &mut last) {
            return Ok(out);
        }
    }
}

fn native_loop(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let count = int_arg(m, base, 0);
    let body = block_arg(m, base, 1);
    let mut last = Cell::None;
    for _ in 0..count.max(0) {
        if let Some(out) = loop_step(eval_block(m, body)?, &mut last) {
            return Ok(out);
        }
    }
    Ok(Outcome::Value(last))
}

fn native_break(_m: &mut Machine, _base: usize) -> RuntimeResult<Outcome> {
    Ok(Outcome::Thrown(Thrown {
        value: Cell::None,
        label: Some(SYM_BREAK),
        target: None,
    }))
}

fn native_continue(_m: &mut Machine, _base: usize) -> RuntimeResult<Outcome> {
    Ok(Outcome::Thrown(Thrown {
        value: Cell::None,
        label: Some(SYM_CONTINUE),
        target: None,
    }))
}

fn native_exit(_m: &mut Machine, _base: usize) -> RuntimeResult<Outcome> {
    Ok(Outcome::Thrown(Thrown {
        value: Cell::Unset,
        label: Some(SYM_EXIT),
        target: None,
    }))
}

fn native_halt(m: &mut Machine, _base: usize) -> RuntimeResult<Outcome> {
    m.request_halt();
    Ok(Outcome::unset())
}

fn native_catch(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let body = block_arg(m, base, 0);
    let label = if refinement_on(m, base, 1) {
        Some(word_arg(m, base, 2).sym)
    } else {
        None
    };
    match eval_block(m, body)? {
        Outcome::Thrown(t) if t.target.is_none() && t.label == label => {
            Ok(Outcome::Value(t.value))
        }
        other => Ok(other),
    }
}

fn native_throw(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let label = if refinement_on(m, base, 1) {
        Some(word_arg(m, base, 2).sym)
    } else {
        None
    };
    Ok(Outcome::Thrown(Thrown {
        value: arg(m, base, 0),
        label,
        target: None,
    }))
}

fn native_try(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let body = block_arg(m, base, 0);
    let intercept_halt = refinement_on(m, base, 1);
    push_trap(m, intercept_halt);
    match eval_block(m, body) {
        Ok(out) => {
            // a halt requested by the body's last expression has not been
            // polled yet; it must not escape an intercepting handler
            if m.halt_requested {
                m.halt_requested = false;
                let point = recover(m);
                return if point.intercept_halt {
                    Ok(Outcome::Value(Cell::Word(Word::unbound(SYM_HALT))))
                } else {
                    Err(Unwind::Halt)
                };
            }
            discard_trap(m);
            Ok(out)
        }
        Err(Unwind::Error(frame)) => {
            recover(m);
            Ok(Outcome::Value(Cell::Error(frame)))
        }
        Err(Unwind::Halt) => {
            let point = recover(m);
            if point.intercept_halt {
                Ok(Outcome::Value(Cell::Word(Word::unbound(SYM_HALT))))
            } else {
                Err(Unwind::Halt)
            }
        }
    }
}

fn native_attempt(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let body = block_arg(m, base, 0);
    push_trap(m, false);
    match eval_block(m, body) {
        Ok(out) => {
            if m.halt_requested {
                m.halt_requested = false;
                recover(m);
                return Err(Unwind::Halt);
            }
            discard_trap(m);
            Ok(out)
        }
        Err(Unwind::Error(_)) => {
            recover(m);
            Ok(Outcome::Value(Cell::None))
        }
        Err(Unwind::Halt) => {
            recover(m);
            Err(Unwind::Halt)
        }
    }
}

fn native_do(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    match arg(m, base, 0) {
        Cell::Block(body) => eval_block(m, body),
        // doing an error raises it
        Cell::Error(frame) => Err(Unwind::Error(frame)),
        v => Ok(Outcome::Value(v)),
    }
}

// --- function construction ---

fn make_function(m: &mut Machine, base: usize, closure: bool) -> RuntimeResult<Outcome> {
    let spec = block_arg(m, base, 0);
    let body = block_arg(m, base, 1);
    let (params, flags) = assemble_params(&m.heap, &m.symbols, spec).map_err(|k| m.raise(k))?;
    if !m.heap.is_managed(spec) {
        m.heap.manage(spec);
    }
    if !m.heap.is_managed(body) {
        m.heap.manage(body);
    }
    let func_body = if closure {
        FuncBody::Closure { body }
    } else {
        FuncBody::User { body }
    };
    let id = m.add_function(Function {
        name: None,
        params: params.clone(),
        flags,
        body: func_body,
        spec: Some(spec),
    });
    bind_relative_deep(&mut m.heap, body, id, &params);
    Ok(Outcome::Value(Cell::Func(id)))
}

fn native_func(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    make_function(m, base, false)
}

fn native_closure(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    make_function(m, base, true)
}

fn native_does(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let body = block_arg(m, base, 0);
    let spec = m.alloc_cells(Vec::new())?;
    let (params, flags) = assemble_params(&m.heap, &m.symbols, spec).map_err(|k| m.raise(k))?;
    m.heap.manage(spec);
    if !m.heap.is_managed(body) {
        m.heap.manage(body);
    }
    let id = m.add_function(Function {
        name: None,
        params: params.clone(),
        flags,
        body: FuncBody::User { body },
        spec: Some(spec),
    });
    bind_relative_deep(&mut m.heap, body, id, &params);
    Ok(Outcome::Value(Cell::Func(id)))
}

// --- objects and words ---

fn native_make(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    match (arg(m, base, 0), arg(m, base, 1)) {
        (Cell::Datatype(Datatype::Object), Cell::Block(body)) => make_object(m, body, None),
        (Cell::Object(parent), Cell::Block(body)) => make_object(m, body, Some(parent)),
        (Cell::Datatype(Datatype::Error), Cell::Text(msg)) => {
            let text = String::from_utf8_lossy(m.heap.bytes(msg)).into_owned();
            match m.raise(ErrorKind::User(text)) {
                Unwind::Error(frame) => Ok(Outcome::Value(Cell::Error(frame))),
                Unwind::Halt => unreachable!("raise of an error kind produced a halt"),
            }
        }
        (Cell::Datatype(Datatype::Error), _) => Err(m.raise(ErrorKind::BadErrorShape)),
        (what, _) => {
            let actual = what.type_name().to_string();
            Err(m.raise(ErrorKind::TypeMismatch {
                param: "make".to_string(),
                actual,
            }))
        }
    }
}

fn make_object(
    m: &mut Machine,
    body: SeriesId,
    parent: Option<crate::cell::FrameId>,
) -> RuntimeResult<Outcome> {
    let mut frame = match parent {
        Some(p) => m.frame(p).clone(),
        None => Frame::new(),
    };
    frame.define(SYM_SELF, Cell::Unset);
    let mut syms = Vec::new();
    collect_set_words(&m.heap, body, &mut syms);
    for sym in syms {
        if frame.slot_of(sym).is_none() {
            frame.define(sym, Cell::Unset);
        }
    }
    let frame_id = m.alloc_frame(frame)?;
    m.heap.manage(frame_id.as_series());
    m.heap.guard(frame_id.as_series());
    m.frame_mut(frame_id).define(SYM_SELF, Cell::Object(frame_id));
    bind_frame_deep(&mut m.heap, body, frame_id);
    let out = eval_block(m, body);
    if out.is_ok() {
        m.heap.drop_guard(frame_id.as_series());
    }
    match out? {
        Outcome::Value(_) => Ok(Outcome::Value(Cell::Object(frame_id))),
        thrown => Ok(thrown),
    }
}

fn native_in(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let frame = match arg(m, base, 0) {
        Cell::Object(f) | Cell::Error(f) => f,
        ref other => unreachable!("type-checked object argument, got {}", other.type_name()),
    };
    let w = word_arg(m, base, 1);
    match m.frame(frame).slot_of(w.sym) {
        Some(slot) => Ok(Outcome::Value(Cell::Word(Word {
            sym: w.sym,
            binding: Binding::Direct { frame, slot },
        }))),
        None => Ok(Outcome::Value(Cell::None)),
    }
}

fn native_set(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let w = word_arg(m, base, 0);
    let value = arg(m, base, 1);
    if matches!(value, Cell::Unset) {
        let name = m.symbols.name(w.sym).to_string();
        return Err(m.raise(ErrorKind::NeedValue(name)));
    }
    m.set_word(&w, value).map_err(|k| m.raise(k))?;
    Ok(Outcome::Value(value))
}

fn native_get(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let w = word_arg(m, base, 0);
    let value = m.word_value(&w).map_err(|k| m.raise(k))?;
    Ok(Outcome::Value(value))
}

fn native_protect(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    set_protection(m, base, true)
}

fn native_unprotect(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    set_protection(m, base, false)
}

fn set_protection(m: &mut Machine, base: usize, on: bool) -> RuntimeResult<Outcome> {
    let value = arg(m, base, 0);
    match value {
        Cell::Block(id) | Cell::Group(id) | Cell::Path(id) | Cell::Text(id) => {
            m.heap.set_protected(id, on);
            Ok(Outcome::Value(value))
        }
        Cell::Object(f) | Cell::Error(f) => {
            m.heap.set_protected(f.as_series(), on);
            Ok(Outcome::Value(value))
        }
        Cell::Word(w) => match w.binding {
            Binding::Direct { frame, slot } => {
                m.frame_mut(frame).set_locked(slot, on);
                Ok(Outcome::Value(value))
            }
            _ => {
                let name = m.symbols.name(w.sym).to_string();
                Err(m.raise(ErrorKind::UnboundWord(name)))
            }
        },
        other => {
            let actual = other.type_name().to_string();
            Err(m.raise(ErrorKind::TypeMismatch {
                param: "value".to_string(),
                actual,
            }))
        }
    }
}

fn native_recycle(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    if refinement_on(m, base, 0) {
        m.heap.gc_disabled += 1;
    } else if refinement_on(m, base, 1) {
        m.heap.gc_disabled = m.heap.gc_disabled.saturating_sub(1);
    } else {
        crate::gc::collect(m);
    }
    Ok(Outcome::unset())
}

// --- series ---

fn native_append(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let target = arg(m, base, 0);
    let value = arg(m, base, 1);
    let only = refinement_on(m, base, 2);
    match target {
        Cell::Block(id) => {
            let result = match value {
                Cell::Block(src) if !only => {
                    let cells = m.heap.cells(src).to_vec();
                    m.heap.append_cells(id, &cells)
                }
                v => m.heap.append_cell(id, v),
            };
            result.map_err(|e| m.raise(e.into()))?;
            Ok(Outcome::Value(target))
        }
        Cell::Text(id) => match value {
            Cell::Text(src) => {
                let bytes = m.heap.bytes(src).to_vec();
                m.heap.append_bytes(id, &bytes).map_err(|e| m.raise(e.into()))?;
                Ok(Outcome::Value(target))
            }
            other => {
                let actual = other.type_name().to_string();
                Err(m.raise(ErrorKind::TypeMismatch {
                    param: "value".to_string(),
                    actual,
                }))
            }
        },
        ref other => unreachable!("type-checked series argument, got {}", other.type_name()),
    }
}

fn native_pick(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let series = block_arg(m, base, 0);
    let index = int_arg(m, base, 1);
    Ok(Outcome::Value(pick(m, series, index)))
}

fn native_poke(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let series = block_arg(m, base, 0);
    let index = int_arg(m, base, 1);
    let value = arg(m, base, 2);
    if index < 1 || index as usize > m.heap.len(series) {
        return Err(m.raise(ErrorKind::OutOfRange(index)));
    }
    m.heap
        .poke_cell(series, (index - 1) as usize, value)
        .map_err(|e| m.raise(e.into()))?;
    Ok(Outcome::Value(value))
}

fn native_length_of(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let len = match arg(m, base, 0) {
        Cell::Block(id) | Cell::Text(id) => m.heap.len(id),
        ref other => unreachable!("type-checked series argument, got {}", other.type_name()),
    };
    Ok(Outcome::Value(Cell::Integer(len as i64)))
}

fn native_copy(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let deep = refinement_on(m, base, 1);
    match arg(m, base, 0) {
        Cell::Block(id) => {
            let copy = if deep {
                copy_deep(&mut m.heap, id).map_err(|e| m.raise(e.into()))?
            } else {
                let cells = m.heap.cells(id).to_vec();
                let copy = m.alloc_cells(cells)?;
                m.heap.manage(copy);
                copy
            };
            Ok(Outcome::Value(Cell::Block(copy)))
        }
        Cell::Text(id) => {
            let bytes = m.heap.bytes(id).to_vec();
            let copy = m.alloc_bytes(bytes)?;
            m.heap.manage(copy);
            Ok(Outcome::Value(Cell::Text(copy)))
        }
        ref other => unreachable!("type-checked series argument, got {}", other.type_name()),
    }
}

// --- values and comparison ---

fn native_type_of(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    Ok(Outcome::Value(Cell::Datatype(arg(m, base, 0).datatype())))
}

/// Structural equality: series by content, words by spelling, numbers
/// across integer/decimal.
pub fn cells_equal(m: &Machine, a: Cell, b: Cell) -> bool {
    match (a, b) {
        (Cell::Integer(x), Cell::Decimal(y)) | (Cell::Decimal(y), Cell::Integer(x)) => {
            x as f64 == y
        }
        (Cell::Block(x), Cell::Block(y))
        | (Cell::Group(x), Cell::Group(y))
        | (Cell::Path(x), Cell::Path(y)) => series_equal(m, x, y),
        (Cell::Text(x), Cell::Text(y)) => m.heap.bytes(x) == m.heap.bytes(y),
        _ => match (a.as_word(), b.as_word()) {
            (Some(x), Some(y)) if a.datatype() == b.datatype() => x.sym == y.sym,
            _ => a == b,
        },
    }
}

fn series_equal(m: &Machine, x: SeriesId, y: SeriesId) -> bool {
    if x == y {
        return true;
    }
    if m.heap.len(x) != m.heap.len(y) {
        return false;
    }
    (0..m.heap.len(x)).all(|i| cells_equal(m, m.heap.cells(x)[i], m.heap.cells(y)[i]))
}

fn native_equal(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let eq = cells_equal(m, arg(m, base, 0), arg(m, base, 1));
    Ok(Outcome::Value(Cell::Logic(eq)))
}

fn native_same(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    Ok(Outcome::Value(Cell::Logic(arg(m, base, 0) == arg(m, base, 1))))
}

fn native_not(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    Ok(Outcome::Value(Cell::Logic(!arg(m, base, 0).is_truthy())))
}

// --- operators ---

fn native_add(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    math_op(m, base, i64::checked_add, |a, b| a + b)
}

fn native_subtract(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    math_op(m, base, i64::checked_sub, |a, b| a - b)
}

fn native_multiply(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    math_op(m, base, i64::checked_mul, |a, b| a * b)
}

fn math_op(
    m: &mut Machine,
    base: usize,
    int_op: fn(i64, i64) -> Option<i64>,
    dec_op: fn(f64, f64) -> f64,
) -> RuntimeResult<Outcome> {
    let out = match (arg(m, base, 0), arg(m, base, 1)) {
        (Cell::Integer(a), Cell::Integer(b)) => match int_op(a, b) {
            Some(n) => Cell::Integer(n),
            None => return Err(m.raise(ErrorKind::Overflow)),
        },
        (a, b) => Cell::Decimal(dec_op(as_decimal(a), as_decimal(b))),
    };
    Ok(Outcome::Value(out))
}

fn native_divide(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let out = match (arg(m, base, 0), arg(m, base, 1)) {
        (Cell::Integer(_), Cell::Integer(0)) => return Err(m.raise(ErrorKind::DivideByZero)),
        (Cell::Integer(a), Cell::Integer(b)) => {
            if a % b == 0 {
                Cell::Integer(a / b)
            } else {
                Cell::Decimal(a as f64 / b as f64)
            }
        }
        (a, b) => {
            let divisor = as_decimal(b);
            if divisor == 0.0 {
                return Err(m.raise(ErrorKind::DivideByZero));
            }
            Cell::Decimal(as_decimal(a) / divisor)
        }
    };
    Ok(Outcome::Value(out))
}

fn as_decimal(c: Cell) -> f64 {
    match c {
        Cell::Integer(n) => n as f64,
        Cell::Decimal(d) => d,
        ref other => unreachable!("type-checked number argument, got {}", other.type_name()),
    }
}

fn native_lesser(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let lt = as_decimal(arg(m, base, 0)) < as_decimal(arg(m, base, 1));
    Ok(Outcome::Value(Cell::Logic(lt)))
}

fn native_greater(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let gt = as_decimal(arg(m, base, 0)) > as_decimal(arg(m, base, 1));
    Ok(Outcome::Value(Cell::Logic(gt)))
}

fn native_equal_op(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    native_equal(m, base)
}

fn native_unequal_op(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let eq = cells_equal(m, arg(m, base, 0), arg(m, base, 1));
    Ok(Outcome::Value(Cell::Logic(!eq)))
}

fn native_and(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let v = arg(m, base, 0).is_truthy() && arg(m, base, 1).is_truthy();
    Ok(Outcome::Value(Cell::Logic(v)))
}

fn native_or(m: &mut Machine, base: usize) -> RuntimeResult<Outcome> {
    let v = arg(m, base, 0).is_truthy() || arg(m, base, 1).is_truthy();
    Ok(Outcome::Value(Cell::Logic(v)))
}
