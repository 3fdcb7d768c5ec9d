//! A thin demonstration binary for `furlow-core`: since the crate has no
//! lexer or parser (`furlow_core::ast` expects a caller-built tree), this
//! just compiles and runs a small fixed program and prints the value left in
//! `R_X`, the `Var`/`Swap`/... of the VM's scheduler driven end to end.

use clap::{App, Arg};
use tracing_subscriber::EnvFilter;

use furlow_core::ast::{BinOp, Node};
use furlow_core::compiler::compile;
use furlow_core::registers::R_X;
use furlow_core::scope::Scope;
use furlow_core::{Furlow, ProgramStore, VmConfig};

/// `num n; n = 5; num total; total = 1; for (num i = 1; i <= n; i = i + 1)
/// total = total * i;` — a fixed demo computing 5!.
fn demo_program() -> Node {
    Node::Seq(vec![
        Node::DeclNum { name: "n".into(), dims: vec![] },
        Node::Assign(Box::new(Node::var("n")), Box::new(Node::num("5"))),
        Node::DeclNum { name: "total".into(), dims: vec![] },
        Node::Assign(Box::new(Node::var("total")), Box::new(Node::num("1"))),
        Node::For {
            init: Some(Box::new(Node::DeclNum { name: "i".into(), dims: vec![] })),
            cond: Some(Box::new(Node::Cmp(
                furlow_core::ast::CmpOp::Le,
                Box::new(Node::var("i")),
                Box::new(Node::var("n")),
            ))),
            step: Some(Box::new(Node::Assign(
                Box::new(Node::var("i")),
                Box::new(Node::Bin(BinOp::Add, Box::new(Node::var("i")), Box::new(Node::num("1")))),
            ))),
            body: Box::new(Node::Assign(
                Box::new(Node::var("total")),
                Box::new(Node::Bin(BinOp::Mul, Box::new(Node::var("total")), Box::new(Node::var("i")))),
            )),
        },
        Node::var("total"),
    ])
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let matches = App::new("furlow")
        .version("0.1.0")
        .author("Dennis Heinze <dennisjp.heinze@gmail.com>")
        .about("Runs the Furlow VM's built-in demonstration program")
        .arg(
            Arg::with_name("cycles-on-collect")
                .long("cycles-on-collect")
                .takes_value(true)
                .help("ticks between GC cycles"),
        )
        .arg(
            Arg::with_name("max-call-depth")
                .long("max-call-depth")
                .takes_value(true)
                .help("call stack depth before a thread throws instead of recursing further"),
        )
        .get_matches();

    let mut config = VmConfig::default();
    if let Some(v) = matches.value_of("cycles-on-collect") {
        config.cycles_on_collect = v.parse().expect("cycles-on-collect must be a positive integer");
    }
    if let Some(v) = matches.value_of("max-call-depth") {
        config.max_call_depth = v.parse().expect("max-call-depth must be a positive integer");
    }

    let program = ProgramStore::new();
    let entry = compile(&demo_program(), &program).expect("the built-in demo program always compiles");

    let mut vm = Furlow::new(program, config);
    let root = Scope::new("global");
    vm.spawn(root, entry);
    vm.run().expect("scheduling never fails outright; per-thread errors are caught internally");

    match vm.thread(0) {
        Some(thread) if thread.curr_err.is_none() => {
            let mut scratch = Vec::new();
            let result = thread.registers.read(&mut scratch, 0, R_X).expect("R_X holds the last statement's value");
            println!("{}", result.as_number().expect("the demo program's result is a number").borrow().to_display_string());
        }
        Some(thread) => {
            eprintln!("uncaught error: {}", thread.curr_err.as_ref().unwrap());
            std::process::exit(1);
        }
        None => unreachable!("the main thread is always spawned"),
    }
}
