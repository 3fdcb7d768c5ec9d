//! End-to-end scenarios (SPEC_FULL §8 E1-E8): each builds an `ast::Node`
//! tree by hand (there is no lexer/parser in this crate), compiles and runs
//! it to completion, then asserts on the final VM state.

use furlow_core::ast::{BinOp, CmpOp, DeclKind, Node, Param};
use furlow_core::compiler::compile;
use furlow_core::registers::R_X;
use furlow_core::scope::Scope;
use furlow_core::value::FactValue;
use furlow_core::{FactError, Furlow, ProgramStore, VmConfig};

fn decl(name: &str) -> Node {
    Node::DeclNum { name: name.into(), dims: vec![] }
}

fn assign(name: &str, value: Node) -> Node {
    Node::Assign(Box::new(Node::var(name)), Box::new(value))
}

/// Compiles `ast`, runs it to completion on a single thread, and returns
/// that thread's final `R_X` as a `FactValue` (or the uncaught error, if the
/// thread died).
fn run(ast: &Node) -> (Furlow, Result<FactValue, String>) {
    let program = ProgramStore::new();
    let entry = compile(ast, &program).expect("program compiles");
    let mut vm = Furlow::new(program, VmConfig::default());
    let root = Scope::new("global");
    vm.spawn(root, entry);
    vm.run().expect("scheduling itself never fails");
    let thread = vm.thread(0).unwrap();
    let result = match &thread.curr_err {
        Some(e) => Err(e.to_string()),
        None => {
            let mut scratch = Vec::new();
            Ok(thread.registers.read(&mut scratch, 0, R_X).expect("R_X is always written"))
        }
    };
    (vm, result)
}

fn int_str(v: &FactValue) -> String {
    v.as_number().unwrap().borrow().to_display_string()
}

/// E1: `num x = 40; x += 2;` -> 42.
#[test]
fn e1_compound_assignment() {
    let ast = Node::Seq(vec![
        decl("x"),
        assign("x", Node::num("40")),
        Node::CompoundAssign(BinOp::Add, Box::new(Node::var("x")), Box::new(Node::num("2"))),
    ]);
    let (_, result) = run(&ast);
    assert_eq!(int_str(&result.unwrap()), "42");
}

/// E2: `num f(num x){ return x*x; } f(7);` -> 49. Functions are bound to an
/// existing `scope` identifier (`code_addr` lives on `Scope`, not `Number`).
#[test]
fn e2_function_call() {
    let ast = Node::Seq(vec![
        Node::DeclScope { name: "f".into(), dims: vec![] },
        Node::FuncDef {
            target: Box::new(Node::var("f")),
            params: vec![Param { kind: DeclKind::Num, name: "x".into() }],
            body: Box::new(Node::Seq(vec![Node::Return(Box::new(Node::Bin(
                BinOp::Mul,
                Box::new(Node::var("x")),
                Box::new(Node::var("x")),
            )))])),
        },
        Node::Call(Box::new(Node::var("f")), vec![Node::num("7")]),
    ]);
    let (_, result) = run(&ast);
    assert_eq!(int_str(&result.unwrap()), "49");
}

fn idx2(base: &str, i: &str, j: &str) -> Node {
    Node::Index(
        Box::new(Node::Index(Box::new(Node::var(base)), Box::new(Node::num(i)))),
        Box::new(Node::num(j)),
    )
}

/// E3: `num a[3][2]; a[1][0] = 5; a[1][0];` -> 5.
#[test]
fn e3_array_element_read_write() {
    let ast = Node::Seq(vec![
        Node::DeclNum { name: "a".into(), dims: vec![Node::num("3"), Node::num("2")] },
        Node::Assign(Box::new(idx2("a", "1", "0")), Box::new(Node::num("5"))),
        idx2("a", "1", "0"),
    ]);
    let (_, result) = run(&ast);
    assert_eq!(int_str(&result.unwrap()), "5");
}

/// E3 continued: indexing the first dimension out of range throws a
/// `BoundsError` whose message names the valid range.
#[test]
fn e3_array_bounds_error() {
    let ast = Node::Seq(vec![
        Node::DeclNum { name: "a".into(), dims: vec![Node::num("3"), Node::num("2")] },
        idx2("a", "3", "0"),
    ]);
    let (vm, result) = run(&ast);
    let err = result.expect_err("indexing a[3] of a size-3 dimension must throw");
    assert!(err.contains("[0, 3)"), "unexpected message: {}", err);
    assert!(!vm.thread(0).unwrap().is_alive());
}

/// E4: `scope s; num x in s; x = 9; (x in s);` -> 9; `x` is not visible at
/// top level (a read would throw `NameError`).
#[test]
fn e4_in_scope_access() {
    let ast = Node::Seq(vec![
        Node::DeclScope { name: "s".into(), dims: vec![] },
        Node::In(Box::new(Node::var("s")), Box::new(decl("x"))),
        Node::In(Box::new(Node::var("s")), Box::new(assign("x", Node::num("9")))),
        Node::In(Box::new(Node::var("s")), Box::new(Node::var("x"))),
    ]);
    let (_, result) = run(&ast);
    assert_eq!(int_str(&result.unwrap()), "9");

    let top_level_read = Node::Seq(vec![Node::DeclScope { name: "s".into(), dims: vec![] }, Node::var("x")]);
    let (vm, result) = run(&top_level_read);
    assert!(result.is_err(), "'x' must stay undefined outside the 'in s' block");
    assert!(!vm.thread(0).unwrap().is_alive());
}

/// E5: `num i = 0; while (i < 1000) i += 1;` terminates with `i == 1000`.
#[test]
fn e5_while_loop_termination() {
    let ast = Node::Seq(vec![
        decl("i"),
        assign("i", Node::num("0")),
        Node::While {
            cond: Box::new(Node::Cmp(CmpOp::Lt, Box::new(Node::var("i")), Box::new(Node::num("1000")))),
            body: Box::new(Node::CompoundAssign(BinOp::Add, Box::new(Node::var("i")), Box::new(Node::num("1")))),
        },
    ]);
    let program = ProgramStore::new();
    let entry = compile(&ast, &program).unwrap();
    let mut vm = Furlow::new(program, VmConfig::default());
    let root = Scope::new("global");
    vm.spawn(root, entry);
    vm.run().unwrap();
    let thread = vm.thread(0).unwrap();
    assert!(thread.is_alive());
    let i = thread.cstack[0].this.borrow().get_local_num("i").unwrap();
    assert_eq!(i.borrow().to_display_string(), "1000");
    // The `while` body is a single statement (no braced block), so the loop
    // never grows `vstack` across iterations.
    assert!(thread.vstack.len() <= 2);
}

/// E6: `num x = 1; (x == 0) and (1/0);` -> 0, and the division never runs
/// (short-circuit `and`).
#[test]
fn e6_short_circuit_and_skips_division_by_zero() {
    let ast = Node::Seq(vec![
        decl("x"),
        assign("x", Node::num("1")),
        Node::And(
            Box::new(Node::Cmp(CmpOp::Eq, Box::new(Node::var("x")), Box::new(Node::num("0")))),
            Box::new(Node::Bin(BinOp::Div, Box::new(Node::num("1")), Box::new(Node::num("0")))),
        ),
    ]);
    let (vm, result) = run(&ast);
    assert_eq!(int_str(&result.unwrap()), "0");
    assert!(vm.thread(0).unwrap().is_alive());
}

/// E6 variant: `true or e` short-circuits to 1 without evaluating `e`.
#[test]
fn e6_short_circuit_or_skips_division_by_zero() {
    let ast = Node::Seq(vec![Node::Or(
        Box::new(Node::num("1")),
        Box::new(Node::Bin(BinOp::Div, Box::new(Node::num("1")), Box::new(Node::num("0")))),
    )]);
    let (vm, result) = run(&ast);
    assert_eq!(int_str(&result.unwrap()), "1");
    assert!(vm.thread(0).unwrap().is_alive());
}

/// E7 (supplemental): `catch { x = 1/0; } handle { x = 9; } x;` -> 9. The
/// `catch` body is a braced block, so the division-by-zero throw unwinds an
/// in-flight `USE`-pushed temp-scope frame along the way (regression cover
/// for the `cstack`-unwinding fix recorded in DESIGN.md).
#[test]
fn e7_catch_handle_recovers_and_restores_scope() {
    let ast = Node::Seq(vec![
        decl("x"),
        assign("x", Node::num("0")),
        Node::Catch {
            body: Box::new(Node::Block(vec![assign(
                "x",
                Node::Bin(BinOp::Div, Box::new(Node::num("1")), Box::new(Node::num("0"))),
            )])),
            handler: Box::new(Node::Block(vec![assign("x", Node::num("9"))])),
        },
        Node::var("x"),
    ]);
    let (vm, result) = run(&ast);
    assert_eq!(int_str(&result.unwrap()), "9");
    let thread = vm.thread(0).unwrap();
    assert!(thread.is_alive());
    // The handler ran with `this` restored to the top-level scope, not left
    // pointed at the aborted block's temp scope.
    assert_eq!(thread.cstack.len(), 1);
}

/// E8 (supplemental): spawning a thread that increments a shared counter
/// interleaves with the spawning thread instead of starving it; both
/// contributions land in the final count.
#[test]
fn e8_spawned_thread_interleaves_round_robin() {
    let ast = Node::Seq(vec![
        Node::DeclScope { name: "worker".into(), dims: vec![] },
        decl("counter"),
        assign("counter", Node::num("0")),
        Node::FuncDef {
            target: Box::new(Node::var("worker")),
            params: vec![],
            body: Box::new(Node::Seq(vec![
                Node::CompoundAssign(BinOp::Add, Box::new(Node::var("counter")), Box::new(Node::num("1"))),
                Node::CompoundAssign(BinOp::Add, Box::new(Node::var("counter")), Box::new(Node::num("1"))),
                Node::Return(Box::new(Node::num("0"))),
            ])),
        },
        Node::Spawn(Box::new(Node::var("worker"))),
        Node::CompoundAssign(BinOp::Add, Box::new(Node::var("counter")), Box::new(Node::num("1"))),
    ]);
    let program = ProgramStore::new();
    let entry = compile(&ast, &program).unwrap();
    let mut vm = Furlow::new(program, VmConfig::default());
    let root = Scope::new("global");
    vm.spawn(root, entry);
    vm.run().unwrap();
    assert!(vm.thread(0).unwrap().is_alive());
    assert!(vm.thread(1).unwrap().is_alive());
    let counter = vm.thread(0).unwrap().cstack[0].this.borrow().get_local_num("counter").unwrap();
    assert_eq!(counter.borrow().to_display_string(), "3");
}

/// Property 1 (emission determinism): compiling the same tree twice into
/// fresh program stores produces byte-identical output.
#[test]
fn emission_is_deterministic_across_a_realistic_program() {
    let build = || {
        Node::Seq(vec![
            decl("a"),
            assign("a", Node::num("1")),
            Node::If {
                cond: Box::new(Node::Cmp(CmpOp::Eq, Box::new(Node::var("a")), Box::new(Node::num("1")))),
                then: Box::new(assign("a", Node::num("2"))),
                els: Some(Box::new(assign("a", Node::num("3")))),
            },
        ])
    };
    let s1 = ProgramStore::new();
    compile(&build(), &s1).unwrap();
    let s2 = ProgramStore::new();
    compile(&build(), &s2).unwrap();
    assert_eq!(s1.read_bytes(0, s1.len()), s2.read_bytes(0, s2.len()));
}

/// Property 7 (array rectangularity): every leaf of `num a[3][2][2]` has
/// `array_size() == 0`, and every interior node has exactly its declared
/// size.
#[test]
fn declared_array_is_rectangular_at_every_depth() {
    let ast = Node::Seq(vec![Node::DeclNum {
        name: "a".into(),
        dims: vec![Node::num("3"), Node::num("2"), Node::num("2")],
    }]);
    let program = ProgramStore::new();
    let entry = compile(&ast, &program).unwrap();
    let mut vm = Furlow::new(program, VmConfig::default());
    let root = Scope::new("global");
    vm.spawn(root, entry);
    vm.run().unwrap();
    let thread = vm.thread(0).unwrap();
    assert!(thread.is_alive());
    let a = thread.cstack[0].this.borrow().get_local_num("a").unwrap();
    let a = a.borrow();
    assert_eq!(a.array_size(), 3);
    for dim1 in a.array.as_ref().unwrap() {
        assert_eq!(dim1.borrow().array_size(), 2);
        for dim2 in dim1.borrow().array.as_ref().unwrap() {
            assert_eq!(dim2.borrow().array_size(), 2);
            for leaf in dim2.borrow().array.as_ref().unwrap() {
                assert_eq!(leaf.borrow().array_size(), 0);
            }
        }
    }
}

/// Declaring a dimension smaller than 2 is rejected at runtime (SPEC_FULL
/// §3: "dimension sizes are each >= 2 at creation").
#[test]
fn zero_sized_dimension_is_rejected() {
    let ast = Node::Seq(vec![Node::DeclNum { name: "a".into(), dims: vec![Node::num("1")] }]);
    let (vm, result) = run(&ast);
    let err = result.unwrap_err();
    assert!(err.contains("value error") || err.contains("smaller than the minimum"), "{}", err);
    assert!(!vm.thread(0).unwrap().is_alive());
}

/// `break` exits a `for` loop immediately and unwinds any temp scope opened
/// since loop entry.
#[test]
fn break_exits_loop_and_restores_scope() {
    let ast = Node::Seq(vec![
        decl("hits"),
        assign("hits", Node::num("0")),
        Node::For {
            init: Some(Box::new(decl("i"))),
            cond: None,
            step: None,
            body: Box::new(Node::Block(vec![
                Node::CompoundAssign(BinOp::Add, Box::new(Node::var("hits")), Box::new(Node::num("1"))),
                Node::Break,
            ])),
        },
        Node::var("hits"),
    ]);
    let (vm, result) = run(&ast);
    assert_eq!(int_str(&result.unwrap()), "1");
    assert_eq!(vm.thread(0).unwrap().cstack.len(), 1);
}

/// Resolved design note ("braced block as expression"): `({ ...; last })`
/// composes like any other expression, yielding its last statement's value
/// instead of draining it into `R_X`.
#[test]
fn braced_block_as_expression_yields_its_last_value() {
    let ast = Node::Seq(vec![
        decl("result"),
        Node::Assign(Box::new(Node::var("result")), Box::new(Node::Block(vec![Node::num("41")]))),
        Node::CompoundAssign(BinOp::Add, Box::new(Node::var("result")), Box::new(Node::num("1"))),
    ]);
    let (_, result) = run(&ast);
    assert_eq!(int_str(&result.unwrap()), "42");
}

/// A `FactError`'s `Display` never exceeds `MAX_ERR_LEN` bytes (SPEC_FULL
/// §6: "Error messages are at most 100 bytes").
#[test]
fn error_messages_are_length_bounded() {
    let long = "x".repeat(500);
    let err = FactError::runtime(long);
    assert!(err.bounded_message().len() <= furlow_core::error::MAX_ERR_LEN);
}
