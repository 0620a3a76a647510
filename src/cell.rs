// Cell value representation for the Cella runtime
//
// A cell is the fixed-size unit of data: a type tag plus an inline payload.
// Cells are Copy; copying one is a shallow bit-copy, so two cells holding the
// same series handle alias the same backing storage. Mutation through one
// alias is visible through every other. That is a language contract, not an
// implementation detail.

use std::fmt;

/// Interned symbol handle (index into the instance symbol table).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

/// Handle to a series in the instance heap.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeriesId(pub u32);

/// Handle to a frame in the instance heap. Frames are a series
/// specialization and share the heap's slot space with plain series.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

/// Handle to a callable in the instance function arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

impl FrameId {
    /// Frames live in the same slot space as series; this view is what the
    /// ledger, guard stack and collector operate on.
    pub fn as_series(self) -> SeriesId {
        SeriesId(self.0)
    }
}

/// Where a word cell resolves to. Stored inline in the word payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Not attached to any storage; evaluation fails with an unbound-word
    /// error.
    Unbound,
    /// A slot in a frame (global frame, object, closure call frame).
    Direct { frame: FrameId, slot: u32 },
    /// A slot in whichever activation of `func` is innermost on the call
    /// stack at resolution time. Cheap, but only valid while such an
    /// activation is live.
    Relative { func: FuncId, slot: u32 },
}

/// A word payload: spelling plus binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Word {
    pub sym: SymbolId,
    pub binding: Binding,
}

impl Word {
    pub fn unbound(sym: SymbolId) -> Self {
        Word {
            sym,
            binding: Binding::Unbound,
        }
    }
}

/// Runtime datatypes. One tag per cell variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Datatype {
    Unset = 0,
    None,
    Logic,
    Integer,
    Decimal,
    Word,
    SetWord,
    GetWord,
    LitWord,
    Refinement,
    Block,
    Group,
    Path,
    Text,
    Object,
    Error,
    Function,
    Escape,
    Datatype,
}

pub const DATATYPE_COUNT: usize = Datatype::Datatype as usize + 1;

impl Datatype {
    pub fn name(self) -> &'static str {
        match self {
            Datatype::Unset => "unset!",
            Datatype::None => "none!",
            Datatype::Logic => "logic!",
            Datatype::Integer => "integer!",
            Datatype::Decimal => "decimal!",
            Datatype::Word => "word!",
            Datatype::SetWord => "set-word!",
            Datatype::GetWord => "get-word!",
            Datatype::LitWord => "lit-word!",
            Datatype::Refinement => "refinement!",
            Datatype::Block => "block!",
            Datatype::Group => "group!",
            Datatype::Path => "path!",
            Datatype::Text => "text!",
            Datatype::Object => "object!",
            Datatype::Error => "error!",
            Datatype::Function => "function!",
            Datatype::Escape => "escape!",
            Datatype::Datatype => "datatype!",
        }
    }

    pub fn from_name(name: &str) -> Option<Datatype> {
        Some(match name {
            "unset!" => Datatype::Unset,
            "none!" => Datatype::None,
            "logic!" => Datatype::Logic,
            "integer!" => Datatype::Integer,
            "decimal!" => Datatype::Decimal,
            "word!" => Datatype::Word,
            "set-word!" => Datatype::SetWord,
            "get-word!" => Datatype::GetWord,
            "lit-word!" => Datatype::LitWord,
            "refinement!" => Datatype::Refinement,
            "block!" => Datatype::Block,
            "group!" => Datatype::Group,
            "path!" => Datatype::Path,
            "text!" => Datatype::Text,
            "object!" => Datatype::Object,
            "error!" => Datatype::Error,
            "function!" => Datatype::Function,
            "escape!" => Datatype::Escape,
            "datatype!" => Datatype::Datatype,
            _ => return None,
        })
    }
}

/// A set of accepted datatypes, as a bitmask. Used for parameter
/// type restrictions.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TypeSet(pub u32);

impl TypeSet {
    pub const NONE: TypeSet = TypeSet(0);
    /// Accepts every datatype.
    pub const ANY: TypeSet = TypeSet(u32::MAX);

    pub fn of(types: &[Datatype]) -> TypeSet {
        let mut set = TypeSet::NONE;
        for t in types {
            set = set.with(*t);
        }
        set
    }

    pub fn with(self, t: Datatype) -> TypeSet {
        TypeSet(self.0 | (1 << (t as u32)))
    }

    pub fn contains(self, t: Datatype) -> bool {
        self.0 & (1 << (t as u32)) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

pub(crate) const ALL_DATATYPES: [Datatype; DATATYPE_COUNT] = [
    Datatype::Unset,
    Datatype::None,
    Datatype::Logic,
    Datatype::Integer,
    Datatype::Decimal,
    Datatype::Word,
    Datatype::SetWord,
    Datatype::GetWord,
    Datatype::LitWord,
    Datatype::Refinement,
    Datatype::Block,
    Datatype::Group,
    Datatype::Path,
    Datatype::Text,
    Datatype::Object,
    Datatype::Error,
    Datatype::Function,
    Datatype::Escape,
    Datatype::Datatype,
];

impl fmt::Debug for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == TypeSet::ANY {
            return write!(f, "TypeSet(any)");
        }
        write!(f, "TypeSet(")?;
        let mut first = true;
        for t in ALL_DATATYPES {
            if self.contains(t) {
                if !first {
                    write!(f, " ")?;
                }
                write!(f, "{}", t.name())?;
                first = false;
            }
        }
        write!(f, ")")
    }
}

/// The fundamental value cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    Unset,
    None,
    Logic(bool),
    Integer(i64),
    Decimal(f64),
    Word(Word),
    SetWord(Word),
    GetWord(Word),
    LitWord(Word),
    Refinement(SymbolId),
    Block(SeriesId),
    Group(SeriesId),
    Path(SeriesId),
    Text(SeriesId),
    Object(FrameId),
    Error(FrameId),
    Func(FuncId),
    /// Definitional-return escape: completes the activation identified by
    /// the carried serial when invoked.
    Escape(u64),
    Datatype(Datatype),
}

impl Cell {
    pub fn datatype(&self) -> Datatype {
        match self {
            Cell::Unset => Datatype::Unset,
            Cell::None => Datatype::None,
            Cell::Logic(_) => Datatype::Logic,
            Cell::Integer(_) => Datatype::Integer,
            Cell::Decimal(_) => Datatype::Decimal,
            Cell::Word(_) => Datatype::Word,
            Cell::SetWord(_) => Datatype::SetWord,
            Cell::GetWord(_) => Datatype::GetWord,
            Cell::LitWord(_) => Datatype::LitWord,
            Cell::Refinement(_) => Datatype::Refinement,
            Cell::Block(_) => Datatype::Block,
            Cell::Group(_) => Datatype::Group,
            Cell::Path(_) => Datatype::Path,
            Cell::Text(_) => Datatype::Text,
            Cell::Object(_) => Datatype::Object,
            Cell::Error(_) => Datatype::Error,
            Cell::Func(_) => Datatype::Function,
            Cell::Escape(_) => Datatype::Escape,
            Cell::Datatype(_) => Datatype::Datatype,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.datatype().name()
    }

    /// Conditional truth: none, unset and false are falsey, everything else
    /// is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Cell::None | Cell::Unset | Cell::Logic(false))
    }

    pub fn is_word_like(&self) -> bool {
        matches!(
            self,
            Cell::Word(_) | Cell::SetWord(_) | Cell::GetWord(_) | Cell::LitWord(_)
        )
    }

    pub fn as_word(&self) -> Option<Word> {
        match self {
            Cell::Word(w) | Cell::SetWord(w) | Cell::GetWord(w) | Cell::LitWord(w) => Some(*w),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<SeriesId> {
        match self {
            Cell::Block(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<FuncId> {
        match self {
            Cell::Func(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Cell::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// The series handle carried by this cell, if any. Used by the
    /// collector's mark phase and by deep-copy passes.
    pub fn series_handle(&self) -> Option<SeriesId> {
        match self {
            Cell::Block(id) | Cell::Group(id) | Cell::Path(id) | Cell::Text(id) => Some(*id),
            Cell::Object(id) | Cell::Error(id) => Some(id.as_series()),
            _ => None,
        }
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolId({})", self.0)
    }
}

impl fmt::Debug for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeriesId({})", self.0)
    }
}

impl fmt::Debug for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameId({})", self.0)
    }
}

impl fmt::Debug for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FuncId({})", self.0)
    }
}
