// Error taxonomy and structured unwind
//
// Raising is represented as `Err(Unwind)` flowing up through the evaluator.
// Unwind has exactly two colors: Error carries a reified error frame and is
// catchable by any trap; Halt carries nothing and passes through ordinary
// traps to a halt-intercepting one.
//
// A raised error is an ordinary object: a frame with the fixed fields
// code, type, id, message, where, near. Handlers inspect it with the same
// path access as any other object.

use crate::cell::{Cell, FrameId, SymbolId};
use crate::frame::Frame;
use crate::heap::{Heap, HeapError, SeriesData};
use crate::symbol::{SymbolTable, SYM_CODE, SYM_ID, SYM_MESSAGE, SYM_NEAR, SYM_TYPE, SYM_WHERE};

/// What went wrong, before reification into an error frame.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ErrorKind {
    // function assembly
    #[error("invalid function spec: {0}")]
    BadFunctionSpec(String),
    #[error("duplicate parameter: {0}")]
    DuplicateParameter(String),
    #[error("error spec must be a text or an object with an id")]
    BadErrorShape,

    // script
    #[error("{0} has no value")]
    UnboundWord(String),
    #[error("{0} is not bound to an active function call")]
    NotInCall(String),
    #[error("{param} does not accept {actual}")]
    TypeMismatch { param: String, actual: String },
    #[error("missing argument {0}")]
    MissingArgument(String),
    #[error("cannot call a value of type {0}")]
    NotCallable(String),
    #[error("unknown refinement /{0}")]
    BadRefinement(String),
    #[error("invalid path access at {0}")]
    BadPath(String),
    #[error("index {0} is out of range")]
    OutOfRange(i64),
    #[error("{0} needs a value")]
    NeedValue(String),
    #[error("foreign function failed: {0}")]
    Foreign(String),
    #[error("{0}")]
    User(String),

    // math
    #[error("attempt to divide by zero")]
    DivideByZero,
    #[error("integer overflow")]
    Overflow,

    // resource
    #[error("not enough memory")]
    OutOfMemory,
    #[error("series exceeds its maximum capacity")]
    SeriesTooLarge,
    #[error("fixed-size series cannot grow")]
    FixedSizeViolation,
    #[error("protected value cannot be modified")]
    Protected,
    #[error("call stack overflow")]
    StackOverflow,

    // control
    #[error("no catch for throw")]
    NoCatch,
    #[error("halted")]
    Halted,
}

impl ErrorKind {
    /// Stable numeric code stored in the error frame.
    pub fn code(&self) -> i64 {
        match self {
            ErrorKind::BadFunctionSpec(_) => 100,
            ErrorKind::DuplicateParameter(_) => 101,
            ErrorKind::BadErrorShape => 102,
            ErrorKind::UnboundWord(_) => 200,
            ErrorKind::NotInCall(_) => 201,
            ErrorKind::TypeMismatch { .. } => 202,
            ErrorKind::MissingArgument(_) => 203,
            ErrorKind::NotCallable(_) => 204,
            ErrorKind::BadRefinement(_) => 205,
            ErrorKind::BadPath(_) => 206,
            ErrorKind::OutOfRange(_) => 207,
            ErrorKind::NeedValue(_) => 208,
            ErrorKind::Foreign(_) => 209,
            ErrorKind::User(_) => 210,
            ErrorKind::DivideByZero => 300,
            ErrorKind::Overflow => 301,
            ErrorKind::OutOfMemory => 400,
            ErrorKind::SeriesTooLarge => 401,
            ErrorKind::FixedSizeViolation => 402,
            ErrorKind::Protected => 403,
            ErrorKind::StackOverflow => 404,
            ErrorKind::NoCatch => 500,
            ErrorKind::Halted => 501,
        }
    }

    /// Category word for the error frame's `type` field.
    pub fn category(&self) -> &'static str {
        match self.code() {
            100..=199 => "spec",
            200..=299 => "script",
            300..=399 => "math",
            400..=499 => "resource",
            _ => "control",
        }
    }

    /// Identity word for the error frame's `id` field. Handlers dispatch
    /// on this.
    pub fn id(&self) -> &'static str {
        match self {
            ErrorKind::BadFunctionSpec(_) => "bad-func-spec",
            ErrorKind::DuplicateParameter(_) => "dup-param",
            ErrorKind::BadErrorShape => "bad-error-shape",
            ErrorKind::UnboundWord(_) => "no-value",
            ErrorKind::NotInCall(_) => "not-in-call",
            ErrorKind::TypeMismatch { .. } => "expect-arg",
            ErrorKind::MissingArgument(_) => "no-arg",
            ErrorKind::NotCallable(_) => "not-callable",
            ErrorKind::BadRefinement(_) => "no-refine",
            ErrorKind::BadPath(_) => "bad-path",
            ErrorKind::OutOfRange(_) => "out-of-range",
            ErrorKind::NeedValue(_) => "need-value",
            ErrorKind::Foreign(_) => "foreign-error",
            ErrorKind::User(_) => "user-error",
            ErrorKind::DivideByZero => "zero-divide",
            ErrorKind::Overflow => "overflow",
            ErrorKind::OutOfMemory => "no-memory",
            ErrorKind::SeriesTooLarge => "series-overflow",
            ErrorKind::FixedSizeViolation => "locked-size",
            ErrorKind::Protected => "protected",
            ErrorKind::StackOverflow => "stack-overflow",
            ErrorKind::NoCatch => "no-catch",
            ErrorKind::Halted => "halted",
        }
    }
}

impl From<HeapError> for ErrorKind {
    fn from(e: HeapError) -> ErrorKind {
        match e {
            HeapError::OutOfMemory => ErrorKind::OutOfMemory,
            HeapError::SeriesTooLarge => ErrorKind::SeriesTooLarge,
            HeapError::FixedSizeViolation => ErrorKind::FixedSizeViolation,
            HeapError::Protected => ErrorKind::Protected,
        }
    }
}

/// A transfer of control out of the current evaluation. Exactly two colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unwind {
    /// A raised error, reified as an error frame. Catchable by the nearest
    /// trap.
    Error(FrameId),
    /// A halt request. Passes through ordinary traps; only a
    /// halt-intercepting trap stops it.
    Halt,
}

pub type RuntimeResult<T> = Result<T, Unwind>;

/// A value travelling upward as a non-local exit (throw, break, continue,
/// definitional return). Distinct from both ordinary results and unwinds:
/// it is caught by matching on label or target, not by traps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thrown {
    pub value: Cell,
    /// Name given with throw/name; break and continue use canon labels.
    pub label: Option<SymbolId>,
    /// Activation serial for definitional return. Only the activation that
    /// issued the escape may catch it.
    pub target: Option<u64>,
}

/// Result of one dispatch or native invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Value(Cell),
    Thrown(Thrown),
}

impl Outcome {
    pub fn unset() -> Outcome {
        Outcome::Value(Cell::Unset)
    }
}

/// Reify an error kind into an error frame. `where_` is a block of the
/// call labels active at raise time (innermost first); `near` is a block
/// copy of the cells around the raise site, or None.
///
/// The frame and its message text are managed on creation; the error is a
/// value and flows like one.
pub fn build_error_frame(
    heap: &mut Heap,
    symbols: &mut SymbolTable,
    kind: &ErrorKind,
    where_: Cell,
    near: Cell,
) -> Result<FrameId, HeapError> {
    let message = kind.to_string();
    let text_id = heap.alloc(SeriesData::Bytes(message.into_bytes()))?;

    let type_sym = symbols.intern(kind.category());
    let id_sym = symbols.intern(kind.id());

    let mut frame = Frame::with_capacity(6);
    frame.push_key(SYM_CODE, Cell::Integer(kind.code()), 0);
    frame.push_key(SYM_TYPE, Cell::Word(crate::cell::Word::unbound(type_sym)), 0);
    frame.push_key(SYM_ID, Cell::Word(crate::cell::Word::unbound(id_sym)), 0);
    frame.push_key(SYM_MESSAGE, Cell::Text(text_id), 0);
    frame.push_key(SYM_WHERE, where_, 0);
    frame.push_key(SYM_NEAR, near, 0);

    let frame_id = heap.alloc(SeriesData::Frame(frame))?;
    heap.manage(text_id);
    heap.manage(frame_id);
    Ok(FrameId(frame_id.0))
}

/// The `id` field of an error frame, if it is well formed.
pub fn error_id(heap: &Heap, frame: FrameId) -> Option<SymbolId> {
    match &heap.get(frame.as_series()).data {
        SeriesData::Frame(f) => match f.get_by_sym(SYM_ID) {
            Some(Cell::Word(w)) => Some(w.sym),
            _ => None,
        },
        _ => None,
    }
}
