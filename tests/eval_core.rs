// Core evaluation: literals, words, infix, aliasing, paths, control flow.

mod common;

use cella::cell::{Cell, Datatype};
use cella::machine::Machine;
use common::*;
use pretty_assertions::assert_eq;

#[test]
fn literals_and_left_to_right_infix() {
    let mut m = Machine::default();
    // infix chains associate left to right: (1 + 2) * 3
    let program = vec![int(1), w(&mut m, "+"), int(2), w(&mut m, "*"), int(3)];
    assert_eq!(run_value(&mut m, program), Cell::Integer(9));
}

#[test]
fn set_words_define_and_words_resolve() {
    let mut m = Machine::default();
    // x: 5  y: x  x + y
    let program = vec![
        sw(&mut m, "x"),
        int(5),
        sw(&mut m, "y"),
        w(&mut m, "x"),
        w(&mut m, "x"),
        w(&mut m, "+"),
        w(&mut m, "y"),
    ];
    assert_eq!(run_value(&mut m, program), Cell::Integer(10));
}

#[test]
fn block_assignment_aliases_the_series() {
    let mut m = Machine::default();
    // a: [1 2]  b: a  append b 3  length-of a
    let lit = blk(&mut m, vec![int(1), int(2)]);
    let program = vec![
        sw(&mut m, "a"),
        lit,
        sw(&mut m, "b"),
        w(&mut m, "a"),
        w(&mut m, "append"),
        w(&mut m, "b"),
        int(3),
        w(&mut m, "length-of"),
        w(&mut m, "a"),
    ];
    assert_eq!(run_value(&mut m, program), Cell::Integer(3));
    // and the mutation is visible through the literal itself
    match lit {
        Cell::Block(id) => assert_eq!(m.heap.len(id), 3),
        _ => unreachable!(),
    }
}

#[test]
fn copy_detaches_from_the_original() {
    let mut m = Machine::default();
    // a: [1 2]  b: copy a  append b 3  length-of a
    let lit = blk(&mut m, vec![int(1), int(2)]);
    let program = vec![
        sw(&mut m, "a"),
        lit,
        sw(&mut m, "b"),
        w(&mut m, "copy"),
        w(&mut m, "a"),
        w(&mut m, "append"),
        w(&mut m, "b"),
        int(3),
        w(&mut m, "length-of"),
        w(&mut m, "a"),
    ];
    assert_eq!(run_value(&mut m, program), Cell::Integer(2));
}

#[test]
fn arguments_evaluate_left_to_right() {
    let mut m = Machine::default();
    // log: copy []
    // note: func [x] [append log x x]
    // f: func [a b c] [a + b + c]
    // f note 1 note 2 note 3
    // log
    let empty = blk(&mut m, vec![]);
    let note_spec = {
        let x = w(&mut m, "x");
        blk(&mut m, vec![x])
    };
    let note_body = {
        let cells = vec![
            w(&mut m, "append"),
            w(&mut m, "log"),
            w(&mut m, "x"),
            w(&mut m, "x"),
        ];
        blk(&mut m, cells)
    };
    let f_spec = {
        let cells = vec![w(&mut m, "a"), w(&mut m, "b"), w(&mut m, "c")];
        blk(&mut m, cells)
    };
    let f_body = {
        let cells = vec![
            w(&mut m, "a"),
            w(&mut m, "+"),
            w(&mut m, "b"),
            w(&mut m, "+"),
            w(&mut m, "c"),
        ];
        blk(&mut m, cells)
    };
    let program = vec![
        sw(&mut m, "log"),
        w(&mut m, "copy"),
        empty,
        sw(&mut m, "note"),
        w(&mut m, "func"),
        note_spec,
        note_body,
        sw(&mut m, "f"),
        w(&mut m, "func"),
        f_spec,
        f_body,
        w(&mut m, "f"),
        w(&mut m, "note"),
        int(1),
        w(&mut m, "note"),
        int(2),
        w(&mut m, "note"),
        int(3),
        w(&mut m, "log"),
    ];
    match run_value(&mut m, program) {
        Cell::Block(id) => {
            assert_eq!(
                m.heap.cells(id),
                &[Cell::Integer(1), Cell::Integer(2), Cell::Integer(3)]
            );
        }
        other => panic!("expected the log block, got {other:?}"),
    }
}

#[test]
fn refinement_arguments_follow_paramlist_order() {
    let mut m = Machine::default();
    // log: copy []
    // note: func [x] [append log x x]
    // g: func [a /with b] [a]
    // g/with note 1 note 2
    // log
    let empty = blk(&mut m, vec![]);
    let note_spec = {
        let x = w(&mut m, "x");
        blk(&mut m, vec![x])
    };
    let note_body = {
        let cells = vec![
            w(&mut m, "append"),
            w(&mut m, "log"),
            w(&mut m, "x"),
            w(&mut m, "x"),
        ];
        blk(&mut m, cells)
    };
    let g_spec = {
        let cells = vec![w(&mut m, "a"), refi(&mut m, "with"), w(&mut m, "b")];
        blk(&mut m, cells)
    };
    let g_body = {
        let a = w(&mut m, "a");
        blk(&mut m, vec![a])
    };
    let g_with = {
        let cells = vec![w(&mut m, "g"), w(&mut m, "with")];
        pth(&mut m, cells)
    };
    let program = vec![
        sw(&mut m, "log"),
        w(&mut m, "copy"),
        empty,
        sw(&mut m, "note"),
        w(&mut m, "func"),
        note_spec,
        note_body,
        sw(&mut m, "g"),
        w(&mut m, "func"),
        g_spec,
        g_body,
        g_with,
        w(&mut m, "note"),
        int(1),
        w(&mut m, "note"),
        int(2),
        w(&mut m, "log"),
    ];
    match run_value(&mut m, program) {
        Cell::Block(id) => {
            assert_eq!(m.heap.cells(id), &[Cell::Integer(1), Cell::Integer(2)]);
        }
        other => panic!("expected the log block, got {other:?}"),
    }
}

#[test]
fn groups_evaluate_inline() {
    let mut m = Machine::default();
    // x: (1 + 2)  x
    let group = {
        let cells = vec![int(1), w(&mut m, "+"), int(2)];
        grp(&mut m, cells)
    };
    let program = vec![sw(&mut m, "x"), group, w(&mut m, "x")];
    assert_eq!(run_value(&mut m, program), Cell::Integer(3));
}

#[test]
fn object_paths_navigate_and_call() {
    let mut m = Machine::default();
    // o: make object! [x: 1 bump: func [] [x: x + 1]]
    // o/bump
    // o/x
    let bump_spec = blk(&mut m, vec![]);
    let bump_body = {
        let cells = vec![
            sw(&mut m, "x"),
            w(&mut m, "x"),
            w(&mut m, "+"),
            int(1),
        ];
        blk(&mut m, cells)
    };
    let obj_body = {
        let cells = vec![
            sw(&mut m, "x"),
            int(1),
            sw(&mut m, "bump"),
            w(&mut m, "func"),
            bump_spec,
            bump_body,
        ];
        blk(&mut m, cells)
    };
    let o_bump = {
        let cells = vec![w(&mut m, "o"), w(&mut m, "bump")];
        pth(&mut m, cells)
    };
    let o_x = {
        let cells = vec![w(&mut m, "o"), w(&mut m, "x")];
        pth(&mut m, cells)
    };
    let program = vec![
        sw(&mut m, "o"),
        w(&mut m, "make"),
        w(&mut m, "object!"),
        obj_body,
        o_bump,
        o_x,
    ];
    assert_eq!(run_value(&mut m, program), Cell::Integer(2));
}

#[test]
fn block_paths_pick_by_index() {
    let mut m = Machine::default();
    // b: [10 20 30]  b/2
    let lit = blk(&mut m, vec![int(10), int(20), int(30)]);
    let b2 = {
        let cells = vec![w(&mut m, "b"), int(2)];
        pth(&mut m, cells)
    };
    let program = vec![sw(&mut m, "b"), lit, b2];
    assert_eq!(run_value(&mut m, program), Cell::Integer(20));
}

#[test]
fn while_and_loop_with_break() {
    let mut m = Machine::default();
    // i: 0  while [i < 5] [i: i + 1]  i
    let cond = {
        let cells = vec![w(&mut m, "i"), w(&mut m, "<"), int(5)];
        blk(&mut m, cells)
    };
    let body = {
        let cells = vec![sw(&mut m, "i"), w(&mut m, "i"), w(&mut m, "+"), int(1)];
        blk(&mut m, cells)
    };
    let program = vec![
        sw(&mut m, "i"),
        int(0),
        w(&mut m, "while"),
        cond,
        body,
        w(&mut m, "i"),
    ];
    assert_eq!(run_value(&mut m, program), Cell::Integer(5));

    // n: 0  loop 10 [n: n + 1  if n > 3 [break]]  n
    let break_blk = {
        let b = w(&mut m, "break");
        blk(&mut m, vec![b])
    };
    let loop_body = {
        let cells = vec![
            sw(&mut m, "n"),
            w(&mut m, "n"),
            w(&mut m, "+"),
            int(1),
            w(&mut m, "if"),
            w(&mut m, "n"),
            w(&mut m, ">"),
            int(3),
            break_blk,
        ];
        blk(&mut m, cells)
    };
    let program = vec![
        sw(&mut m, "n"),
        int(0),
        w(&mut m, "loop"),
        int(10),
        loop_body,
        w(&mut m, "n"),
    ];
    assert_eq!(run_value(&mut m, program), Cell::Integer(4));
}

#[test]
fn unbound_word_raises_no_value() {
    let mut m = Machine::default();
    let program = vec![w(&mut m, "zorp")];
    assert_eq!(run_error_id(&mut m, program), "no-value");
}

#[test]
fn argument_type_restriction_is_enforced() {
    let mut m = Machine::default();
    // f: func [a [integer!]] [a]  f true
    let types = blk(&mut m, vec![Cell::Datatype(Datatype::Integer)]);
    let spec = {
        let a = w(&mut m, "a");
        blk(&mut m, vec![a, types])
    };
    let body = {
        let a = w(&mut m, "a");
        blk(&mut m, vec![a])
    };
    let program = vec![
        sw(&mut m, "f"),
        w(&mut m, "func"),
        spec,
        body,
        w(&mut m, "f"),
        w(&mut m, "true"),
    ];
    assert_eq!(run_error_id(&mut m, program), "expect-arg");
}

#[test]
fn lit_and_get_words() {
    let mut m = Machine::default();
    // x: 7  y: 'x  get y
    let program = vec![
        sw(&mut m, "x"),
        int(7),
        sw(&mut m, "y"),
        lw(&mut m, "x"),
        w(&mut m, "get"),
        w(&mut m, "y"),
    ];
    // y holds the bound word x; get resolves it
    assert_eq!(run_value(&mut m, program), Cell::Integer(7));

    // f: func [] [1]  g: :f  type-of g
    let spec = blk(&mut m, vec![]);
    let body = blk(&mut m, vec![int(1)]);
    let program = vec![
        sw(&mut m, "f"),
        w(&mut m, "func"),
        spec,
        body,
        sw(&mut m, "g"),
        gw(&mut m, "f"),
        w(&mut m, "type-of"),
        gw(&mut m, "g"),
    ];
    assert_eq!(
        run_value(&mut m, program),
        Cell::Datatype(Datatype::Function)
    );
}
