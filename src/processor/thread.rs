use crate::error::{FactError, ThrownError};
use crate::registers::RegisterFile;
use crate::scope::ScopeRef;
use crate::value::FactValue;

/// Whether a thread still has work to do (SPEC_FULL §4.4). A thread that hit
/// an uncaught error or ran off the end of the program is `Dead`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunFlag {
    Running,
    Dead,
}

/// One entry of `FactThread::cstack`. `return_ip` distinguishes a scope
/// switch (`USE`, `None`: execution just continues) from an actual function
/// activation (`CALL`, `Some`: `RET` jumps back there).
#[derive(Clone, Debug)]
pub struct CallFrame {
    pub this: ScopeRef,
    pub return_ip: Option<usize>,
}

/// A single cooperative fiber of execution (SPEC_FULL §3 "Thread state").
/// Every thread shares the one `ProgramStore` and `gc::Heap` owned by its
/// `Furlow` scheduler, but owns its own value stack, call stack, registers
/// and trap stack outright.
pub struct FactThread {
    pub id: usize,
    pub ip: usize,
    pub vstack: Vec<FactValue>,
    pub cstack: Vec<CallFrame>,
    pub registers: RegisterFile,
    /// `(handler_ip, vstack_depth_at_push, cstack_depth_at_push)` per
    /// `catch`, innermost last.
    pub traps: Vec<(usize, usize, usize)>,
    pub run_flag: RunFlag,
    pub curr_err: Option<ThrownError>,
}

impl FactThread {
    pub fn new(id: usize, entry_scope: ScopeRef, entry_ip: usize, vstack_cap: usize, cstack_cap: usize) -> FactThread {
        let mut cstack = Vec::with_capacity(cstack_cap);
        cstack.push(CallFrame { this: entry_scope, return_ip: None });
        FactThread {
            id,
            ip: entry_ip,
            vstack: Vec::with_capacity(vstack_cap),
            cstack,
            registers: RegisterFile::new(),
            traps: Vec::new(),
            run_flag: RunFlag::Running,
            curr_err: None,
        }
    }

    pub fn this(&self) -> ScopeRef {
        self.cstack.last().expect("cstack is never empty").this.clone()
    }

    pub fn is_alive(&self) -> bool {
        self.run_flag == RunFlag::Running
    }

    /// Every `FactValue` directly reachable from this thread: its value
    /// stack, call-frame `this` pointers, and registers (`gc::Heap::collect`
    /// root set).
    pub fn roots(&self) -> impl Iterator<Item = &FactValue> + '_ {
        self.vstack
            .iter()
            .chain(self.registers.iter_roots())
    }

    pub fn scope_roots(&self) -> impl Iterator<Item = ScopeRef> + '_ {
        self.cstack.iter().map(|f| f.this.clone())
    }

    /// Dispatches a thrown error to the innermost open trap, unwinding
    /// `vstack` back to its depth when that trap was pushed (SPEC_FULL §1.2
    /// `catch`/`handle`). `cstack` is unwound the same way: a throw from
    /// inside a `Block`/`for`/`in` body opened after the `catch` would
    /// otherwise leave its `USE`-pushed frame stranded once the handler
    /// runs, since the matching `EXIT` never gets a chance to execute. With
    /// no open trap the thread dies.
    pub fn raise(&mut self, error: FactError) {
        let thrown = ThrownError { line: 0, error };
        match self.traps.pop() {
            Some((handler_ip, vdepth, cdepth)) => {
                self.vstack.truncate(vdepth);
                self.cstack.truncate(cdepth.max(1));
                self.curr_err = Some(thrown);
                self.ip = handler_ip;
            }
            None => {
                self.curr_err = Some(thrown);
                self.run_flag = RunFlag::Dead;
            }
        }
    }
}
