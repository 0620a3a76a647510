// Structured recovery: try/attempt, catch/throw, halt color, resource
// errors, protection, and state restoration across unwinds.

mod common;

use cella::cell::{Cell, Datatype};
use cella::machine::{HostOutcome, Machine, MachineConfig};
use common::*;
use pretty_assertions::assert_eq;

#[test]
fn try_turns_a_raise_into_an_error_value() {
    let mut m = Machine::default();
    // r: try [1 / 0]  type-of r
    let body = {
        let cells = vec![int(1), w(&mut m, "/"), int(0)];
        blk(&mut m, cells)
    };
    let program = vec![
        sw(&mut m, "r"),
        w(&mut m, "try"),
        body,
        w(&mut m, "type-of"),
        w(&mut m, "r"),
    ];
    assert_eq!(run_value(&mut m, program), Cell::Datatype(Datatype::Error));

    // the error frame is an ordinary object: r/id
    let r_id = {
        let cells = vec![w(&mut m, "r"), w(&mut m, "id")];
        pth(&mut m, cells)
    };
    let program = vec![r_id];
    match run_value(&mut m, program) {
        Cell::Word(word) => assert_eq!(m.symbols.name(word.sym), "zero-divide"),
        other => panic!("expected the id word, got {other:?}"),
    }
}

#[test]
fn uncaught_raise_reaches_the_host() {
    let mut m = Machine::default();
    let program = vec![int(1), w(&mut m, "/"), int(0)];
    assert_eq!(run_error_id(&mut m, program), "zero-divide");
    // the machine stays usable
    let program = vec![int(1), w(&mut m, "+"), int(1)];
    assert_eq!(run_value(&mut m, program), Cell::Integer(2));
}

#[test]
fn attempt_yields_none_on_error() {
    let mut m = Machine::default();
    let body = {
        let cells = vec![int(1), w(&mut m, "/"), int(0)];
        blk(&mut m, cells)
    };
    let program = vec![w(&mut m, "attempt"), body];
    assert_eq!(run_value(&mut m, program), Cell::None);

    let body = blk(&mut m, vec![int(7)]);
    let program = vec![w(&mut m, "attempt"), body];
    assert_eq!(run_value(&mut m, program), Cell::Integer(7));
}

#[test]
fn halt_passes_through_ordinary_traps() {
    let mut m = Machine::default();
    // try/halt [try [halt 99] 77]
    let inner = {
        let cells = vec![w(&mut m, "halt"), int(99)];
        blk(&mut m, cells)
    };
    let outer = {
        let cells = vec![w(&mut m, "try"), inner, int(77)];
        blk(&mut m, cells)
    };
    let try_halt = {
        let cells = vec![w(&mut m, "try"), w(&mut m, "halt")];
        pth(&mut m, cells)
    };
    let program = vec![try_halt, outer];
    match run_value(&mut m, program) {
        Cell::Word(word) => assert_eq!(m.symbols.name(word.sym), "halt"),
        other => panic!("expected the halt marker word, got {other:?}"),
    }
}

#[test]
fn halt_as_the_last_body_expression_is_still_intercepted() {
    let mut m = Machine::default();
    // r: try/halt [halt]  7
    let body = {
        let h = w(&mut m, "halt");
        blk(&mut m, vec![h])
    };
    let try_halt = {
        let cells = vec![w(&mut m, "try"), w(&mut m, "halt")];
        pth(&mut m, cells)
    };
    let program = vec![sw(&mut m, "r"), try_halt, body, int(7)];
    assert_eq!(run_value(&mut m, program), Cell::Integer(7));

    // the handler yielded the halt marker word
    let program = vec![w(&mut m, "r")];
    match run_value(&mut m, program) {
        Cell::Word(word) => assert_eq!(m.symbols.name(word.sym), "halt"),
        other => panic!("expected the halt marker word, got {other:?}"),
    }
}

#[test]
fn halt_without_interception_reaches_the_host() {
    let mut m = Machine::default();
    let body = {
        let cells = vec![w(&mut m, "halt"), int(99)];
        blk(&mut m, cells)
    };
    let program = vec![w(&mut m, "try"), body, int(77)];
    assert_eq!(run(&mut m, program), HostOutcome::Halted);
    // halting leaves a clean machine behind
    let program = vec![int(40), w(&mut m, "+"), int(2)];
    assert_eq!(run_value(&mut m, program), Cell::Integer(42));
}

#[test]
fn errors_bind_to_the_nearest_trap_before_halt_traps() {
    let mut m = Machine::default();
    // try/halt [r: try [1 / 0]  r/id]
    let fail = {
        let cells = vec![int(1), w(&mut m, "/"), int(0)];
        blk(&mut m, cells)
    };
    let r_id = {
        let cells = vec![w(&mut m, "r"), w(&mut m, "id")];
        pth(&mut m, cells)
    };
    let inner = {
        let cells = vec![sw(&mut m, "r"), w(&mut m, "try"), fail, r_id];
        blk(&mut m, cells)
    };
    let try_halt = {
        let cells = vec![w(&mut m, "try"), w(&mut m, "halt")];
        pth(&mut m, cells)
    };
    let program = vec![try_halt, inner];
    match run_value(&mut m, program) {
        Cell::Word(word) => assert_eq!(m.symbols.name(word.sym), "zero-divide"),
        other => panic!("expected the id word, got {other:?}"),
    }
}

#[test]
fn caught_errors_do_not_leak_manual_series() {
    let mut m = Machine::default();
    let body = {
        let cells = vec![int(1), w(&mut m, "/"), int(0)];
        blk(&mut m, cells)
    };
    let program = {
        let cells = vec![w(&mut m, "try"), body, int(42)];
        alloc(&mut m, cells)
    };
    m.bind_to_global(program);
    let manuals_before = m.heap.manual_count();
    assert_eq!(m.run(program), HostOutcome::Value(Cell::Integer(42)));
    assert_eq!(m.heap.manual_count(), manuals_before);
    assert!(m.traps.is_empty());
    assert!(m.calls.is_empty());
    assert!(m.ds.is_empty());
}

#[test]
fn catch_and_throw_match_by_name() {
    let mut m = Machine::default();
    // catch [throw 42 99]
    let body = {
        let cells = vec![w(&mut m, "throw"), int(42), int(99)];
        blk(&mut m, cells)
    };
    let program = vec![w(&mut m, "catch"), body];
    assert_eq!(run_value(&mut m, program), Cell::Integer(42));

    // catch/name [catch [throw/name 5 'deep] 77] 'deep
    let throw_name = {
        let cells = vec![w(&mut m, "throw"), w(&mut m, "name")];
        pth(&mut m, cells)
    };
    let inner_body = {
        let cells = vec![throw_name, int(5), lw(&mut m, "deep")];
        blk(&mut m, cells)
    };
    let outer_body = {
        let cells = vec![w(&mut m, "catch"), inner_body, int(77)];
        blk(&mut m, cells)
    };
    let catch_name = {
        let cells = vec![w(&mut m, "catch"), w(&mut m, "name")];
        pth(&mut m, cells)
    };
    let program = vec![catch_name, outer_body, lw(&mut m, "deep")];
    assert_eq!(run_value(&mut m, program), Cell::Integer(5));
}

#[test]
fn an_uncaught_throw_is_a_no_catch_error() {
    let mut m = Machine::default();
    let program = vec![w(&mut m, "throw"), int(1)];
    assert_eq!(run_error_id(&mut m, program), "no-catch");
}

#[test]
fn stack_overflow_is_raised_and_recoverable() {
    let mut m = Machine::new(MachineConfig {
        max_call_depth: 64,
        ..MachineConfig::default()
    });
    // boom: func [] [boom]  r: try [boom]  r/id
    let spec = blk(&mut m, vec![]);
    let body = {
        let boom = w(&mut m, "boom");
        blk(&mut m, vec![boom])
    };
    let try_body = {
        let boom = w(&mut m, "boom");
        blk(&mut m, vec![boom])
    };
    let r_id = {
        let cells = vec![w(&mut m, "r"), w(&mut m, "id")];
        pth(&mut m, cells)
    };
    let program = vec![
        sw(&mut m, "boom"),
        w(&mut m, "func"),
        spec,
        body,
        sw(&mut m, "r"),
        w(&mut m, "try"),
        try_body,
        r_id,
    ];
    match run_value(&mut m, program) {
        Cell::Word(word) => assert_eq!(m.symbols.name(word.sym), "stack-overflow"),
        other => panic!("expected the id word, got {other:?}"),
    }
    assert!(m.calls.is_empty());
    let program = vec![int(1), w(&mut m, "+"), int(1)];
    assert_eq!(run_value(&mut m, program), Cell::Integer(2));
}

#[test]
fn protect_blocks_mutation_until_unprotect() {
    let mut m = Machine::default();
    // b: [1 2]  protect b  try [append b 3]  length-of b
    let lit = blk(&mut m, vec![int(1), int(2)]);
    let try_body = {
        let cells = vec![w(&mut m, "append"), w(&mut m, "b"), int(3)];
        blk(&mut m, cells)
    };
    let program = vec![
        sw(&mut m, "b"),
        lit,
        w(&mut m, "protect"),
        w(&mut m, "b"),
        sw(&mut m, "r"),
        w(&mut m, "try"),
        try_body,
        w(&mut m, "length-of"),
        w(&mut m, "b"),
    ];
    assert_eq!(run_value(&mut m, program), Cell::Integer(2));

    let r_id = {
        let cells = vec![w(&mut m, "r"), w(&mut m, "id")];
        pth(&mut m, cells)
    };
    let program = vec![r_id];
    match run_value(&mut m, program) {
        Cell::Word(word) => assert_eq!(m.symbols.name(word.sym), "protected"),
        other => panic!("expected the id word, got {other:?}"),
    }

    let program = vec![
        w(&mut m, "unprotect"),
        w(&mut m, "b"),
        w(&mut m, "append"),
        w(&mut m, "b"),
        int(3),
        w(&mut m, "length-of"),
        w(&mut m, "b"),
    ];
    assert_eq!(run_value(&mut m, program), Cell::Integer(3));
}

#[test]
fn user_errors_are_made_and_raised_with_do() {
    let mut m = Machine::default();
    // e: make error! "torn sail"  do e
    let msg = txt(&mut m, "torn sail");
    let program = vec![
        sw(&mut m, "e"),
        w(&mut m, "make"),
        w(&mut m, "error!"),
        msg,
        w(&mut m, "do"),
        w(&mut m, "e"),
    ];
    match run(&mut m, program) {
        HostOutcome::Error(frame) => {
            assert_eq!(error_id_name(&m, frame), "user-error");
            let message = m
                .frame(frame)
                .get_by_sym(m.symbols.lookup("message").unwrap());
            match message {
                Some(Cell::Text(id)) => assert_eq!(m.heap.bytes(id), b"torn sail"),
                other => panic!("bad message field: {other:?}"),
            }
        }
        other => panic!("expected an error, got {other:?}"),
    }
}

#[test]
fn where_field_records_the_call_labels() {
    let mut m = Machine::default();
    // inner: func [] [1 / 0]  outer: func [] [inner]  r: try [outer]  r/where
    let spec_a = blk(&mut m, vec![]);
    let inner_body = {
        let cells = vec![int(1), w(&mut m, "/"), int(0)];
        blk(&mut m, cells)
    };
    let spec_b = blk(&mut m, vec![]);
    let outer_body = {
        let inner = w(&mut m, "inner");
        blk(&mut m, vec![inner])
    };
    let try_body = {
        let outer = w(&mut m, "outer");
        blk(&mut m, vec![outer])
    };
    let r_where = {
        let cells = vec![w(&mut m, "r"), w(&mut m, "where")];
        pth(&mut m, cells)
    };
    let program = vec![
        sw(&mut m, "inner"),
        w(&mut m, "func"),
        spec_a,
        inner_body,
        sw(&mut m, "outer"),
        w(&mut m, "func"),
        spec_b,
        outer_body,
        sw(&mut m, "r"),
        w(&mut m, "try"),
        try_body,
        r_where,
    ];
    match run_value(&mut m, program) {
        Cell::Block(id) => {
            let labels: Vec<_> = m
                .heap
                .cells(id)
                .iter()
                .map(|c| match c {
                    Cell::Word(word) => m.symbols.name(word.sym).to_string(),
                    other => panic!("non-word in backtrace: {other:?}"),
                })
                .collect();
            // innermost first: the failing division sits inside inner,
            // called from outer, called from try
            assert_eq!(labels[0], "/");
            assert!(labels.contains(&"inner".to_string()));
            assert!(labels.contains(&"outer".to_string()));
        }
        other => panic!("expected the where block, got {other:?}"),
    }
}
