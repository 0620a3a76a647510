// Recursive cell-stream evaluation
//
// A block is evaluated one expression at a time. Each step consumes one or
// more cells: literals yield themselves, words resolve through their
// binding, a word naming a function starts a call whose arguments are
// fulfilled from the cells that follow, left to right, in paramlist order.
// After every completed step the next cell is checked for an infix
// function, which takes the step's value as its first argument.
//
// Dispatch never restores machine state on the Err path; the trap that
// catches the unwind does. The Ok(Thrown) path is ordinary propagation and
// cleans up as it goes.

use log::trace;

use crate::cell::{Cell, FuncId, SeriesId, SymbolId};
use crate::error::{ErrorKind, Outcome, RuntimeResult, Thrown, Unwind};
use crate::frame::{Frame, KEY_HIDDEN};
use crate::function::{from_foreign, to_foreign, FuncBody, Param, ParamClass};
use crate::machine::{Activation, Machine};
use crate::symbol::{SYM_EXIT, SYM_RETURN};

/// Evaluate every expression in a block. Yields the last expression's
/// value (unset for an empty block); a thrown outcome short-circuits.
pub fn eval_block(m: &mut Machine, block: SeriesId) -> RuntimeResult<Outcome> {
    let mut idx = 0;
    let mut last = Cell::Unset;
    while idx < m.heap.len(block) {
        let (out, next) = eval_step(m, block, idx)?;
        match out {
            Outcome::Value(v) => {
                last = v;
                idx = next;
            }
            thrown => return Ok(thrown),
        }
    }
    Ok(Outcome::Value(last))
}

/// One expression plus any trailing infix chain.
pub fn eval_step(m: &mut Machine, block: SeriesId, idx: usize) -> RuntimeResult<(Outcome, usize)> {
    let (mut out, mut next) = eval_next(m, block, idx)?;
    loop {
        let left = match out {
            Outcome::Value(v) => v,
            Outcome::Thrown(_) => break,
        };
        let cell = match m.heap.cell_at(block, next) {
            Some(c) => c,
            None => break,
        };
        let w = match cell {
            Cell::Word(w) => w,
            _ => break,
        };
        // peeking must not raise; an unbound word here is the next
        // expression's problem
        let f = match m.word_value(&w) {
            Ok(Cell::Func(f)) => f,
            _ => break,
        };
        if !m.func(f).is_infix() {
            break;
        }
        let (o, n) = apply_core(m, f, Some(w.sym), &[], Some(left), block, next + 1)?;
        out = o;
        next = n;
    }
    Ok((out, next))
}

/// One expression, no infix lookahead.
fn eval_next(m: &mut Machine, block: SeriesId, idx: usize) -> RuntimeResult<(Outcome, usize)> {
    if m.halt_requested {
        m.halt_requested = false;
        return Err(Unwind::Halt);
    }
    m.current_near = Cell::Block(block);
    let cell = match m.heap.cell_at(block, idx) {
        Some(c) => c,
        None => return Ok((Outcome::Value(Cell::Unset), idx)),
    };
    match cell {
        Cell::Word(w) => {
            let value = m.word_value(&w).map_err(|k| m.raise(k))?;
            match value {
                Cell::Func(f) => apply(m, f, Some(w.sym), &[], block, idx + 1),
                Cell::Escape(serial) => apply_escape(m, serial, block, idx + 1),
                Cell::Unset => {
                    let name = m.symbols.name(w.sym).to_string();
                    Err(m.raise(ErrorKind::UnboundWord(name)))
                }
                v => Ok((Outcome::Value(v), idx + 1)),
            }
        }
        Cell::SetWord(w) => {
            if idx + 1 >= m.heap.len(block) {
                let name = m.symbols.name(w.sym).to_string();
                return Err(m.raise(ErrorKind::NeedValue(name)));
            }
            let (out, after) = eval_step(m, block, idx + 1)?;
            match out {
                Outcome::Value(Cell::Unset) => {
                    let name = m.symbols.name(w.sym).to_string();
                    Err(m.raise(ErrorKind::NeedValue(name)))
                }
                Outcome::Value(v) => {
                    // functions pick up the name they are assigned to
                    if let Cell::Func(f) = v {
                        if m.funcs[f.0 as usize].name.is_none() {
                            m.funcs[f.0 as usize].name = Some(w.sym);
                        }
                    }
                    m.set_word(&w, v).map_err(|k| m.raise(k))?;
                    Ok((Outcome::Value(v), after))
                }
                thrown => Ok((thrown, after)),
            }
        }
        Cell::GetWord(w) => {
            // fetch without calling; unset is a legal result here
            let value = m.word_value(&w).map_err(|k| m.raise(k))?;
            Ok((Outcome::Value(value), idx + 1))
        }
        Cell::LitWord(w) => Ok((Outcome::Value(Cell::Word(w)), idx + 1)),
        Cell::Group(inner) => {
            let out = eval_block(m, inner)?;
            Ok((out, idx + 1))
        }
        Cell::Path(path) => eval_path(m, path, block, idx + 1),
        Cell::Func(f) => apply(m, f, None, &[], block, idx + 1),
        Cell::Escape(serial) => apply_escape(m, serial, block, idx + 1),
        // blocks are inert and alias their series
        other => Ok((Outcome::Value(other), idx + 1)),
    }
}

/// Call a function, fulfilling its arguments from `block` starting at
/// `idx`. Returns the outcome and the stream position after the consumed
/// arguments.
pub fn apply(
    m: &mut Machine,
    func: FuncId,
    label: Option<SymbolId>,
    refinements: &[SymbolId],
    block: SeriesId,
    idx: usize,
) -> RuntimeResult<(Outcome, usize)> {
    apply_core(m, func, label, refinements, None, block, idx)
}

fn apply_core(
    m: &mut Machine,
    func: FuncId,
    label: Option<SymbolId>,
    refinements: &[SymbolId],
    mut preset: Option<Cell>,
    block: SeriesId,
    mut idx: usize,
) -> RuntimeResult<(Outcome, usize)> {
    if m.calls.len() >= m.config.max_call_depth {
        return Err(m.raise(ErrorKind::StackOverflow));
    }
    let (params, body, transparent, infix) = {
        let f = m.func(func);
        (f.params.clone(), f.body, f.is_transparent(), f.is_infix())
    };
    for r in refinements {
        let known = params
            .iter()
            .any(|p| p.class == ParamClass::Refinement && p.sym == *r);
        if !known {
            let name = m.symbols.name(*r).to_string();
            return Err(m.raise(ErrorKind::BadRefinement(name)));
        }
    }

    let serial = m.next_serial();
    let args_base = m.ds.len();
    let userish = matches!(body, FuncBody::User { .. } | FuncBody::Closure { .. });

    // Fulfillment walks the paramlist in order, consuming the stream left
    // to right. Params after an inactive refinement are skipped with none.
    let mut active = true;
    for p in &params {
        let mut fulfilled = false;
        let value = match p.class {
            ParamClass::Local => {
                if p.sym == SYM_RETURN && userish && !transparent {
                    Cell::Escape(serial)
                } else {
                    Cell::None
                }
            }
            ParamClass::Refinement => {
                active = refinements.contains(&p.sym);
                if active {
                    Cell::Logic(true)
                } else {
                    Cell::None
                }
            }
            _ if !active => Cell::None,
            class => {
                fulfilled = true;
                if let Some(v) = preset.take() {
                    v
                } else {
                    match fulfill_arg(m, p, class, infix, block, idx, args_base)? {
                        (ArgStep::Value(v), n) => {
                            idx = n;
                            v
                        }
                        (ArgStep::Thrown(t), n) => {
                            m.ds.truncate(args_base);
                            return Ok((Outcome::Thrown(t), n));
                        }
                    }
                }
            }
        };
        if fulfilled && !p.accepts(&value) {
            m.ds.truncate(args_base);
            let param = m.symbols.name(p.sym).to_string();
            let actual = value.type_name().to_string();
            return Err(m.raise(ErrorKind::TypeMismatch { param, actual }));
        }
        m.ds.push(value);
    }

    trace!(
        "call {:?} serial {} args_base {}",
        label.map(|s| m.symbols.name(s).to_string()),
        serial,
        args_base
    );
    m.calls.push(Activation {
        func,
        serial,
        label,
        args_base,
        frame: None,
        guarded_body: None,
    });

    let result = run_body(m, func, &params, body, args_base);

    // Err leaves the activation and args in place for trap recovery.
    let out = result?;
    if m.calls.pop().is_none() {
        panic!("activation stack underflow");
    }
    m.ds.truncate(args_base);

    let out = match out {
        Outcome::Thrown(t) if userish && t.target == Some(serial) => Outcome::Value(t.value),
        Outcome::Thrown(t) if userish && t.target.is_none() && t.label == Some(SYM_EXIT) => {
            Outcome::Value(Cell::Unset)
        }
        other => other,
    };
    Ok((out, idx))
}

enum ArgStep {
    Value(Cell),
    Thrown(Thrown),
}

fn fulfill_arg(
    m: &mut Machine,
    p: &Param,
    class: ParamClass,
    infix: bool,
    block: SeriesId,
    idx: usize,
    args_base: usize,
) -> RuntimeResult<(ArgStep, usize)> {
    if idx >= m.heap.len(block) {
        m.ds.truncate(args_base);
        let name = m.symbols.name(p.sym).to_string();
        return Err(m.raise(ErrorKind::MissingArgument(name)));
    }
    match class {
        ParamClass::Normal => {
            // infix arguments take no trailing lookahead, which is what
            // makes chains associate left to right
            let (out, n) = if infix {
                eval_next(m, block, idx)?
            } else {
                eval_step(m, block, idx)?
            };
            match out {
                Outcome::Value(v) => Ok((ArgStep::Value(v), n)),
                Outcome::Thrown(t) => Ok((ArgStep::Thrown(t), n)),
            }
        }
        ParamClass::Soft => {
            let cell = m.heap.cells(block)[idx];
            if let Cell::Group(inner) = cell {
                match eval_block(m, inner)? {
                    Outcome::Value(v) => Ok((ArgStep::Value(v), idx + 1)),
                    Outcome::Thrown(t) => Ok((ArgStep::Thrown(t), idx + 1)),
                }
            } else {
                Ok((ArgStep::Value(cell), idx + 1))
            }
        }
        ParamClass::Hard => {
            let cell = m.heap.cells(block)[idx];
            Ok((ArgStep::Value(cell), idx + 1))
        }
        _ => unreachable!("fulfill_arg on non-argument param"),
    }
}

fn run_body(
    m: &mut Machine,
    func: FuncId,
    params: &[Param],
    body: FuncBody,
    args_base: usize,
) -> RuntimeResult<Outcome> {
    match body {
        FuncBody::Native(f) => f(m, args_base),
        FuncBody::User { body } => eval_block(m, body),
        FuncBody::Closure { body } => {
            // each call gets its own managed frame; the body copy is
            // rebound to it and guarded while it runs
            let mut frame = Frame::with_capacity(params.len());
            for (i, p) in params.iter().enumerate() {
                let flags = if p.class == ParamClass::Local {
                    KEY_HIDDEN
                } else {
                    0
                };
                frame.push_key(p.sym, m.ds[args_base + i], flags);
            }
            m.ds.truncate(args_base);
            let frame_id = m.alloc_frame(frame)?;
            m.heap.manage(frame_id.as_series());
            if let Some(a) = m.calls.last_mut() {
                a.frame = Some(frame_id);
            }
            let copy = crate::binding::copy_rebind_closure(&mut m.heap, body, func, frame_id)
                .map_err(|e| m.raise(e.into()))?;
            m.heap.guard(copy);
            if let Some(a) = m.calls.last_mut() {
                a.guarded_body = Some(copy);
            }
            let out = eval_block(m, copy);
            if out.is_ok() {
                m.heap.drop_guard(copy);
            }
            out
        }
        FuncBody::Foreign(f) => {
            let mut fargs = Vec::with_capacity(params.len());
            for (i, p) in params.iter().enumerate() {
                if p.class == ParamClass::Local {
                    continue;
                }
                let arg = m.ds[args_base + i];
                let marshalled = to_foreign(&m.heap, &arg).map_err(|k| m.raise(k))?;
                fargs.push(marshalled);
            }
            match f(&fargs) {
                Ok(v) => {
                    let cell = from_foreign(&mut m.heap, v).map_err(|k| m.raise(k))?;
                    Ok(Outcome::Value(cell))
                }
                Err(msg) => Err(m.raise(ErrorKind::Foreign(msg))),
            }
        }
    }
}

/// Invoke a definitional-return escape. Takes one optional evaluated
/// argument and throws it at the activation that issued the escape.
fn apply_escape(
    m: &mut Machine,
    serial: u64,
    block: SeriesId,
    idx: usize,
) -> RuntimeResult<(Outcome, usize)> {
    if !m.calls.iter().any(|a| a.serial == serial) {
        return Err(m.raise(ErrorKind::NotInCall("return".to_string())));
    }
    if idx >= m.heap.len(block) {
        let t = Thrown {
            value: Cell::Unset,
            label: None,
            target: Some(serial),
        };
        return Ok((Outcome::Thrown(t), idx));
    }
    let (out, n) = eval_step(m, block, idx)?;
    match out {
        Outcome::Value(v) => {
            let t = Thrown {
                value: v,
                label: None,
                target: Some(serial),
            };
            Ok((Outcome::Thrown(t), n))
        }
        thrown => Ok((thrown, n)),
    }
}

/// Evaluate a path: navigate objects and blocks segment by segment; a
/// function anywhere along the way is called, with the remaining segments
/// as its refinements.
fn eval_path(
    m: &mut Machine,
    path: SeriesId,
    block: SeriesId,
    idx: usize,
) -> RuntimeResult<(Outcome, usize)> {
    if m.heap.len(path) == 0 {
        return Err(m.raise(ErrorKind::BadPath("empty path".to_string())));
    }
    let head = m.heap.cells(path)[0];
    let label = head.as_word().map(|w| w.sym);
    let mut current = match head {
        Cell::Word(w) => m.word_value(&w).map_err(|k| m.raise(k))?,
        other => other,
    };
    let mut seg = 1;
    while seg < m.heap.len(path) {
        match current {
            Cell::Func(f) => {
                let mut refinements = Vec::new();
                for cell in &m.heap.cells(path)[seg..] {
                    match cell {
                        Cell::Word(w) => refinements.push(w.sym),
                        Cell::Refinement(sym) => refinements.push(*sym),
                        other => {
                            let what = other.type_name().to_string();
                            return Err(m.raise(ErrorKind::BadPath(what)));
                        }
                    }
                }
                return apply(m, f, label, &refinements, block, idx);
            }
            Cell::Object(frame) | Cell::Error(frame) => {
                let segment = m.heap.cells(path)[seg];
                match segment {
                    Cell::Word(w) => {
                        let found = m.frame(frame).get_by_sym(w.sym);
                        current = match found {
                            Some(v) => v,
                            None => {
                                let name = m.symbols.name(w.sym).to_string();
                                return Err(m.raise(ErrorKind::BadPath(name)));
                            }
                        };
                    }
                    other => {
                        let what = other.type_name().to_string();
                        return Err(m.raise(ErrorKind::BadPath(what)));
                    }
                }
                seg += 1;
            }
            Cell::Block(series) => {
                let segment = m.heap.cells(path)[seg];
                match segment {
                    Cell::Integer(n) => {
                        current = pick(m, series, n);
                    }
                    other => {
                        let what = other.type_name().to_string();
                        return Err(m.raise(ErrorKind::BadPath(what)));
                    }
                }
                seg += 1;
            }
            other => {
                let what = other.type_name().to_string();
                return Err(m.raise(ErrorKind::BadPath(what)));
            }
        }
    }
    if let Cell::Func(f) = current {
        return apply(m, f, label, &[], block, idx);
    }
    Ok((Outcome::Value(current), idx))
}

/// One-based pick; out of range yields none.
pub fn pick(m: &Machine, series: SeriesId, index: i64) -> Cell {
    if index < 1 {
        return Cell::None;
    }
    m.heap
        .cell_at(series, (index - 1) as usize)
        .unwrap_or(Cell::None)
}
