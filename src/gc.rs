//! Stop-the-world mark-and-sweep collector over the scope graph (SPEC_FULL
//! §9 "Cyclic scope graphs"): `up` plus `scope_stack` can form genuine `Rc`
//! cycles (a named child scope's `up` points back at the parent that holds
//! it), so plain reference counting alone would leak every such pair. The
//! `Heap` is a flat registry of every scope ever created; `collect` marks
//! everything reachable from the supplied roots and then severs the parent/
//! child links of everything left unmarked, which drops their refcounts to
//! zero and lets `Rc`'s own drop glue reclaim them.

use std::rc::{Rc, Weak};

use tracing::debug;

use crate::scope::{Scope, ScopeRef};
use crate::value::FactValue;

/// Registry of every scope allocated by the VM, held weakly so the registry
/// itself is never a root.
#[derive(Default)]
pub struct Heap {
    scopes: Vec<Weak<std::cell::RefCell<Scope>>>,
}

impl Heap {
    pub fn new() -> Heap {
        Heap { scopes: Vec::new() }
    }

    /// Register a freshly created scope so the collector can find it.
    pub fn track(&mut self, scope: &ScopeRef) {
        self.scopes.push(Rc::downgrade(scope));
    }

    pub fn live_count(&self) -> usize {
        self.scopes.iter().filter(|w| w.strong_count() > 0).count()
    }

    /// Mark phase: walk every root's reachable scope graph, setting `marked`.
    /// Numbers need no marking; they are owned trees (deep-copied on `STO`),
    /// never shared, so they can't leak via a cycle.
    fn mark(roots: impl Iterator<Item = ScopeRef>) {
        let mut stack: Vec<ScopeRef> = roots.collect();
        while let Some(scope) = stack.pop() {
            let already_marked = scope.borrow().marked;
            if already_marked {
                continue;
            }
            scope.borrow_mut().marked = true;
            let children: Vec<ScopeRef> = scope.borrow().scope_stack.iter().map(|(_, s)| s.clone()).collect();
            if let Some(up) = scope.borrow().up.clone() {
                stack.push(up);
            }
            stack.extend(children);
        }
    }

    /// Sweep phase: drop the registry's weak slots for anything collected
    /// out from under us since the last cycle, then break the `up`/
    /// `scope_stack` edges of everything that stayed alive but wasn't
    /// marked, releasing its refcounts so it can actually be freed.
    fn sweep(&mut self) -> (usize, usize) {
        let mut reachable = 0;
        let mut freed = 0;
        self.scopes.retain(|weak| {
            let Some(scope) = weak.upgrade() else {
                return false;
            };
            let marked = scope.borrow().marked;
            if marked {
                scope.borrow_mut().marked = false;
                reachable += 1;
                true
            } else {
                scope.borrow_mut().up = None;
                scope.borrow_mut().scope_stack.clear();
                scope.borrow_mut().num_stack.clear();
                freed += 1;
                false
            }
        });
        (reachable, freed)
    }

    /// A full collection cycle (SPEC_FULL §4.4 "every `CYCLES_ON_COLLECT`
    /// ticks, run a stop-the-world mark-and-sweep"). `roots` should yield
    /// every scope directly reachable from a thread: its `vstack`, `cstack`
    /// frames, and register file.
    pub fn collect<'a>(&mut self, roots: impl Iterator<Item = &'a FactValue>) {
        let root_scopes: Vec<ScopeRef> = roots.filter_map(FactValue::as_scope).collect();
        Self::mark(root_scopes.into_iter());
        let (reachable, freed) = self.sweep();
        debug!(reachable, freed, "gc cycle");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::{Number, Tag};
    use num_bigint::BigInt;

    #[test]
    fn unreachable_cycle_is_broken_by_sweep() {
        let mut heap = Heap::new();
        let root = Scope::new("root");
        heap.track(&root);

        {
            let child = Scope::new("child");
            heap.track(&child);
            child.borrow_mut().up = Some(root.clone());
            root.borrow_mut().add_scope("child", child.clone()).unwrap();
        }
        // `root` still references `child` via `scope_stack`, and `child`
        // references `root` via `up`: a live cycle, both reachable from
        // `root`.
        heap.collect(std::iter::once(&FactValue::Scope(root.clone())));
        assert_eq!(heap.live_count(), 2);

        // Drop the only external root. Without collection this pair would
        // leak forever (the cycle keeps both refcounts above zero).
        let detached = root.borrow().get_local_scope("child").unwrap();
        root.borrow_mut().scope_stack.clear();
        drop(detached);
        heap.collect(std::iter::empty());
        assert_eq!(heap.live_count(), 0);
    }

    #[test]
    fn reachable_numbers_are_unaffected_by_sweep() {
        let mut heap = Heap::new();
        let root = Scope::new("root");
        heap.track(&root);
        root.borrow_mut()
            .add_num("x", Number::new_ref(Tag::Int(BigInt::from(42))))
            .unwrap();
        heap.collect(std::iter::once(&FactValue::Scope(root.clone())));
        assert_eq!(root.borrow().get_local_num("x").unwrap().borrow().to_display_string(), "42");
    }
}
