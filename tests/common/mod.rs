// Cell-program builders shared by the integration tests. There is no
// reader in this crate, so test programs are assembled cell by cell.

#![allow(dead_code)]

use cella::cell::{Cell, SeriesId, Word};
use cella::machine::{HostOutcome, Machine};

pub fn w(m: &mut Machine, name: &str) -> Cell {
    Cell::Word(Word::unbound(m.symbols.intern(name)))
}

pub fn sw(m: &mut Machine, name: &str) -> Cell {
    Cell::SetWord(Word::unbound(m.symbols.intern(name)))
}

pub fn gw(m: &mut Machine, name: &str) -> Cell {
    Cell::GetWord(Word::unbound(m.symbols.intern(name)))
}

pub fn lw(m: &mut Machine, name: &str) -> Cell {
    Cell::LitWord(Word::unbound(m.symbols.intern(name)))
}

pub fn refi(m: &mut Machine, name: &str) -> Cell {
    Cell::Refinement(m.symbols.intern(name))
}

pub fn int(n: i64) -> Cell {
    Cell::Integer(n)
}

pub fn alloc(m: &mut Machine, cells: Vec<Cell>) -> SeriesId {
    m.alloc_cells(cells).unwrap()
}

pub fn blk(m: &mut Machine, cells: Vec<Cell>) -> Cell {
    Cell::Block(alloc(m, cells))
}

pub fn grp(m: &mut Machine, cells: Vec<Cell>) -> Cell {
    Cell::Group(alloc(m, cells))
}

pub fn pth(m: &mut Machine, cells: Vec<Cell>) -> Cell {
    Cell::Path(alloc(m, cells))
}

pub fn txt(m: &mut Machine, s: &str) -> Cell {
    Cell::Text(m.alloc_bytes(s.as_bytes().to_vec()).unwrap())
}

/// Bind a program to the global frame and run it.
pub fn run(m: &mut Machine, cells: Vec<Cell>) -> HostOutcome {
    let block = alloc(m, cells);
    m.bind_to_global(block);
    m.run(block)
}

pub fn run_value(m: &mut Machine, cells: Vec<Cell>) -> Cell {
    match run(m, cells) {
        HostOutcome::Value(v) => v,
        other => panic!("expected a value, got {other:?}"),
    }
}

/// Run a program expected to end in an error; returns the error's id
/// spelling.
pub fn run_error_id(m: &mut Machine, cells: Vec<Cell>) -> String {
    match run(m, cells) {
        HostOutcome::Error(frame) => error_id_name(m, frame),
        other => panic!("expected an error, got {other:?}"),
    }
}

pub fn error_id_name(m: &Machine, frame: cella::cell::FrameId) -> String {
    let sym = cella::error::error_id(&m.heap, frame).expect("malformed error frame");
    m.symbols.name(sym).to_string()
}
