use tracing::{trace, warn};

use crate::config::VmConfig;
use crate::error::FactError;
use crate::gc::Heap;
use crate::processor::decode::decode;
use crate::processor::logic::execute;
use crate::processor::thread::{FactThread, RunFlag};
use crate::program::ProgramStore;
use crate::scope::ScopeRef;

/// The cooperative round-robin scheduler (SPEC_FULL §4.4): every tick runs
/// exactly one instruction on each still-running thread in turn, and every
/// `cycles_on_collect` ticks runs a stop-the-world mark-and-sweep over the
/// scope graph.
pub struct Furlow {
    program: ProgramStore,
    threads: Vec<FactThread>,
    heap: Heap,
    config: VmConfig,
    next_thread_id: usize,
    ticks: u64,
}

impl Furlow {
    pub fn new(program: ProgramStore, config: VmConfig) -> Furlow {
        Furlow {
            program,
            threads: Vec::new(),
            heap: Heap::new(),
            config,
            next_thread_id: 0,
            ticks: 0,
        }
    }

    pub fn program(&self) -> &ProgramStore {
        &self.program
    }

    /// Starts a new thread at `entry_ip` with `entry_scope` as its root
    /// `this`, returning the new thread's id.
    pub fn spawn(&mut self, entry_scope: ScopeRef, entry_ip: u32) -> usize {
        let id = self.next_thread_id;
        self.next_thread_id += 1;
        self.heap.track(&entry_scope);
        self.threads.push(FactThread::new(
            id,
            entry_scope,
            entry_ip as usize,
            self.config.initial_vstack_capacity,
            self.config.initial_cstack_capacity,
        ));
        id
    }

    pub fn thread(&self, id: usize) -> Option<&FactThread> {
        self.threads.iter().find(|t| t.id == id)
    }

    pub fn any_alive(&self) -> bool {
        self.threads.iter().any(FactThread::is_alive)
    }

    /// Runs every thread to completion (every thread dead, either finished
    /// or uncaught-errored), round-robin, one instruction per thread per
    /// tick.
    pub fn run(&mut self) -> Result<(), FactError> {
        while self.any_alive() {
            self.tick_all();
        }
        Ok(())
    }

    /// One scheduling round: every live thread executes exactly one
    /// instruction, then a GC cycle runs if due.
    pub fn tick_all(&mut self) {
        let mut spawned: Vec<(ScopeRef, u32)> = Vec::new();
        for i in 0..self.threads.len() {
            if !self.threads[i].is_alive() {
                continue;
            }
            if let Some(scope) = self.tick_one(i) {
                let entry = scope.borrow().code_addr;
                spawned.push((scope, entry));
            }
        }
        for (scope, entry) in spawned {
            self.spawn(scope, entry);
        }
        self.ticks += 1;
        if self.ticks % self.config.cycles_on_collect == 0 {
            self.collect_garbage();
        }
    }

    /// Executes one instruction on `self.threads[i]`. Returns the scope of a
    /// freshly `Spawn`ed thread, if any, since the new `FactThread` can't be
    /// pushed onto `self.threads` while it's mid-iteration over that vector.
    fn tick_one(&mut self, i: usize) -> Option<ScopeRef> {
        let ip = self.threads[i].ip;
        if ip >= self.program.len() {
            // Ran off the end of the program with no trailing `RET`/trap:
            // a normal, error-free way for the main thread (or a `spawn`ed
            // one whose body falls through) to finish.
            self.threads[i].run_flag = RunFlag::Dead;
            return None;
        }
        let (op, args, next_ip) = decode(&self.program, ip);
        trace!(thread = self.threads[i].id, ip, ?op, "tick");
        let result = execute(&mut self.threads[i], &mut self.heap, self.config.max_call_depth, op, &args, next_ip);
        match result {
            Ok(spawned) => spawned,
            Err(e) => {
                let thread = &mut self.threads[i];
                thread.raise(e);
                if !thread.is_alive() {
                    if let Some(err) = &thread.curr_err {
                        warn!(thread = thread.id, %err, "thread died with an uncaught error");
                    }
                }
                None
            }
        }
    }

    fn collect_garbage(&mut self) {
        let mut roots: Vec<crate::value::FactValue> = Vec::new();
        for thread in &self.threads {
            roots.extend(thread.roots().cloned());
            roots.extend(thread.scope_roots().map(crate::value::FactValue::Scope));
        }
        self.heap.collect(roots.iter());
    }
}
