// Function values and spec assembly
//
// Every callable is assembled from a spec block into a paramlist: an
// ordered list of typed parameters, one slot per argument the dispatcher
// will fulfill. Four conventions share the paramlist shape and differ only
// in how the body runs:
//
//   native  - a Rust fn reading its fulfilled args off the data stack
//   user    - a body block evaluated with words bound relative to the
//             activation
//   closure - a fresh managed frame per call; the body is deep-copied and
//             rebound to it, so the frame may outlive the call
//   foreign - args marshalled out to a plain data representation and the
//             result marshalled back
//
// Spec notation follows the host language: `word` is an evaluated argument,
// `'word` takes its argument soft-quoted, `:word` hard-quoted, `/word`
// begins a refinement group, `word:` declares a hidden pure local. A block
// after a parameter restricts its accepted types. Tag words switch modes:
// <locals> starts the locals section, <transparent> suppresses the
// definitional return slot, <infix> marks the function for operator
// position.

use crate::cell::{Cell, Datatype, SeriesId, SymbolId, TypeSet};
use crate::error::{ErrorKind, Outcome, RuntimeResult};
use crate::heap::Heap;
use crate::machine::Machine;
use crate::symbol::{SymbolTable, SYM_RETURN};

pub const FUNC_INFIX: u8 = 1 << 0;
pub const FUNC_TRANSPARENT: u8 = 1 << 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamClass {
    /// Evaluated argument.
    Normal,
    /// Soft quote: words and paths arrive unevaluated, groups still
    /// evaluate.
    Soft,
    /// Hard quote: the argument arrives exactly as written.
    Hard,
    /// Optional flag; the following normal params belong to it and are
    /// fulfilled only when the refinement is active.
    Refinement,
    /// Hidden pure local. Never fulfilled from the call site.
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Param {
    pub sym: SymbolId,
    pub class: ParamClass,
    pub types: TypeSet,
}

impl Param {
    pub fn accepts(&self, cell: &Cell) -> bool {
        self.types.contains(cell.datatype())
    }
}

pub type NativeFn = fn(&mut Machine, usize) -> RuntimeResult<Outcome>;

/// Values exchanged with foreign functions. Only flat data crosses the
/// boundary; handles never do.
#[derive(Debug, Clone, PartialEq)]
pub enum ForeignValue {
    None,
    Logic(bool),
    Integer(i64),
    Decimal(f64),
    Text(String),
}

pub type ForeignFn = fn(&[ForeignValue]) -> Result<ForeignValue, String>;

#[derive(Clone, Copy)]
pub enum FuncBody {
    Native(NativeFn),
    User { body: SeriesId },
    Closure { body: SeriesId },
    Foreign(ForeignFn),
}

pub struct Function {
    /// Label used in backtraces; the defining set-word when known.
    pub name: Option<SymbolId>,
    pub params: Vec<Param>,
    pub flags: u8,
    pub body: FuncBody,
    /// The spec block the function was assembled from, kept for
    /// reflection.
    pub spec: Option<SeriesId>,
}

impl Function {
    pub fn is_infix(&self) -> bool {
        self.flags & FUNC_INFIX != 0
    }

    pub fn is_transparent(&self) -> bool {
        self.flags & FUNC_TRANSPARENT != 0
    }

    pub fn param_index(&self, sym: SymbolId) -> Option<usize> {
        self.params.iter().position(|p| p.sym == sym)
    }

    /// Slot of the definitional return param, if the function has one.
    pub fn return_slot(&self) -> Option<usize> {
        if self.is_transparent() {
            None
        } else {
            self.param_index(SYM_RETURN)
        }
    }
}

enum ScanMode {
    Params,
    Locals,
}

/// Assemble a spec block into a paramlist. Rejects malformed specs and
/// duplicate names; appends the hidden definitional-return slot unless the
/// spec is transparent or names `return` itself.
pub fn assemble_params(
    heap: &Heap,
    symbols: &SymbolTable,
    spec: SeriesId,
) -> Result<(Vec<Param>, u8), ErrorKind> {
    let mut params: Vec<Param> = Vec::new();
    let mut flags: u8 = 0;
    let mut mode = ScanMode::Params;

    for cell in heap.cells(spec) {
        match cell {
            // doc strings are ignored
            Cell::Text(_) => {}

            Cell::Word(w) => {
                let name = symbols.name(w.sym);
                if name.starts_with('<') {
                    match name {
                        "<locals>" | "<local>" => mode = ScanMode::Locals,
                        "<transparent>" => flags |= FUNC_TRANSPARENT,
                        "<infix>" => flags |= FUNC_INFIX,
                        _ => return Err(ErrorKind::BadFunctionSpec(name.to_string())),
                    }
                    continue;
                }
                let class = match mode {
                    ScanMode::Params => ParamClass::Normal,
                    ScanMode::Locals => ParamClass::Local,
                };
                push_param(&mut params, symbols, w.sym, class)?;
            }

            Cell::LitWord(w) => push_param(&mut params, symbols, w.sym, ParamClass::Soft)?,
            Cell::GetWord(w) => push_param(&mut params, symbols, w.sym, ParamClass::Hard)?,
            Cell::SetWord(w) => push_param(&mut params, symbols, w.sym, ParamClass::Local)?,

            Cell::Refinement(sym) => {
                // a refinement ends a <locals> run
                mode = ScanMode::Params;
                push_param(&mut params, symbols, *sym, ParamClass::Refinement)?;
            }

            Cell::Block(types) => {
                let last = match params.last_mut() {
                    Some(p) if matches!(
                        p.class,
                        ParamClass::Normal | ParamClass::Soft | ParamClass::Hard
                    ) =>
                    {
                        p
                    }
                    _ => {
                        return Err(ErrorKind::BadFunctionSpec(
                            "type block without a preceding parameter".to_string(),
                        ))
                    }
                };
                last.types = scan_typeset(heap, symbols, *types)?;
            }

            other => {
                return Err(ErrorKind::BadFunctionSpec(other.type_name().to_string()));
            }
        }
    }

    if flags & FUNC_TRANSPARENT == 0 && !params.iter().any(|p| p.sym == SYM_RETURN) {
        params.push(Param {
            sym: SYM_RETURN,
            class: ParamClass::Local,
            types: TypeSet::ANY,
        });
    }

    Ok((params, flags))
}

fn push_param(
    params: &mut Vec<Param>,
    symbols: &SymbolTable,
    sym: SymbolId,
    class: ParamClass,
) -> Result<(), ErrorKind> {
    if params.iter().any(|p| p.sym == sym) {
        return Err(ErrorKind::DuplicateParameter(symbols.name(sym).to_string()));
    }
    let types = match class {
        // active refinements hold true, absent ones none
        ParamClass::Refinement => TypeSet::of(&[Datatype::Logic, Datatype::None]),
        _ => TypeSet::ANY,
    };
    params.push(Param { sym, class, types });
    Ok(())
}

fn scan_typeset(
    heap: &Heap,
    symbols: &SymbolTable,
    types: SeriesId,
) -> Result<TypeSet, ErrorKind> {
    let mut set = TypeSet::NONE;
    for cell in heap.cells(types) {
        let t = match cell {
            Cell::Datatype(t) => *t,
            Cell::Word(w) => Datatype::from_name(symbols.name(w.sym)).ok_or_else(|| {
                ErrorKind::BadFunctionSpec(symbols.name(w.sym).to_string())
            })?,
            other => return Err(ErrorKind::BadFunctionSpec(other.type_name().to_string())),
        };
        set = set.with(t);
    }
    if set.is_empty() {
        return Err(ErrorKind::BadFunctionSpec("empty type block".to_string()));
    }
    Ok(set)
}

/// Marshal a cell across the foreign boundary. Handles are not
/// representable; text is copied out.
pub fn to_foreign(heap: &Heap, cell: &Cell) -> Result<ForeignValue, ErrorKind> {
    Ok(match cell {
        Cell::None | Cell::Unset => ForeignValue::None,
        Cell::Logic(b) => ForeignValue::Logic(*b),
        Cell::Integer(n) => ForeignValue::Integer(*n),
        Cell::Decimal(d) => ForeignValue::Decimal(*d),
        Cell::Text(id) => {
            ForeignValue::Text(String::from_utf8_lossy(heap.bytes(*id)).into_owned())
        }
        other => {
            return Err(ErrorKind::TypeMismatch {
                param: "foreign argument".to_string(),
                actual: other.type_name().to_string(),
            })
        }
    })
}

/// Marshal a foreign result back in. Text allocates a new managed series.
pub fn from_foreign(heap: &mut Heap, value: ForeignValue) -> Result<Cell, ErrorKind> {
    Ok(match value {
        ForeignValue::None => Cell::None,
        ForeignValue::Logic(b) => Cell::Logic(b),
        ForeignValue::Integer(n) => Cell::Integer(n),
        ForeignValue::Decimal(d) => Cell::Decimal(d),
        ForeignValue::Text(s) => {
            let id = heap.alloc(crate::heap::SeriesData::Bytes(s.into_bytes()))?;
            heap.manage(id);
            Cell::Text(id)
        }
    })
}
