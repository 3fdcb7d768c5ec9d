//! Furlow: a small dynamic scripting language runtime (SPEC_FULL §1) built
//! around a scope tree value model, a binary instruction stream, a compiler
//! lowering a caller-built AST into that stream, and a cooperative
//! round-robin VM scheduler.
//!
//! There is no lexer or parser here: callers build `ast::Node` trees
//! directly (a REPL, a text-format front end, or tests).

pub mod ast;
pub mod compiler;
pub mod config;
pub mod constants;
pub mod error;
pub mod gc;
pub mod number;
pub mod opcode;
pub mod processor;
pub mod program;
pub mod registers;
pub mod scope;
pub mod value;

pub use config::VmConfig;
pub use error::{FactError, ThrownError};
pub use processor::Furlow;
pub use program::ProgramStore;
