//! Cella runtime core
//!
//! The memory model and evaluation engine for a dynamically typed,
//! homoiconic scripting language: fixed-size value cells over growable
//! series, ordered frames for objects and call records, word binding,
//! function assembly with four calling conventions, recursive block
//! evaluation, and structured error recovery with a two-color unwind
//! (error and halt).
//!
//! Everything hangs off a [`machine::Machine`]: one instance owns its
//! symbol table, heap, function arena and stacks. Code is built as cell
//! series (there is no reader here), bound with
//! [`machine::Machine::bind_to_global`] and evaluated with
//! [`machine::Machine::run`].
//!
//! ```
//! use cella::cell::Cell;
//! use cella::machine::{HostOutcome, Machine, MachineConfig};
//!
//! let mut m = Machine::new(MachineConfig::default());
//! let one_plus_one = {
//!     let plus = m.symbols.intern("+");
//!     let cells = vec![
//!         Cell::Integer(1),
//!         Cell::Word(cella::cell::Word::unbound(plus)),
//!         Cell::Integer(1),
//!     ];
//!     m.alloc_cells(cells).unwrap()
//! };
//! m.bind_to_global(one_plus_one);
//! assert_eq!(m.run(one_plus_one), HostOutcome::Value(Cell::Integer(2)));
//! ```

pub mod binding;
pub mod cell;
pub mod error;
pub mod evaluator;
pub mod frame;
pub mod function;
pub mod gc;
pub mod heap;
pub mod machine;
pub mod stdlib;
pub mod symbol;
pub mod trap;

pub use cell::{Cell, Datatype, FrameId, FuncId, SeriesId, SymbolId, Word};
pub use error::{ErrorKind, Outcome, RuntimeResult, Thrown, Unwind};
pub use machine::{HostOutcome, Machine, MachineConfig};
