use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::error::FactError;
use crate::number::{Number, NumberRef};

pub type ScopeRef = Rc<RefCell<Scope>>;

/// A named container mapping names to Numbers and child Scopes (SPEC_FULL
/// §3). `num_stack`/`scope_stack` are kept sorted by name so lookup is a
/// binary search (§4.3); `up` is the conventional parent link installed at
/// creation. `marked` is the collector's visited bit (`gc`).
#[derive(Debug)]
pub struct Scope {
    pub name: String,
    pub code_addr: u32,
    pub num_stack: Vec<(String, NumberRef)>,
    pub scope_stack: Vec<(String, ScopeRef)>,
    pub up: Option<ScopeRef>,
    pub marked: bool,
}

impl Scope {
    pub fn new(name: impl Into<String>) -> ScopeRef {
        let name = name.into();
        debug!(scope = %name, "scope created");
        Rc::new(RefCell::new(Scope {
            name,
            code_addr: 0,
            num_stack: Vec::new(),
            scope_stack: Vec::new(),
            up: None,
            marked: false,
        }))
    }

    fn name_taken(&self, name: &str) -> bool {
        self.num_stack.binary_search_by(|(n, _)| n.as_str().cmp(name)).is_ok()
            || self.scope_stack.binary_search_by(|(n, _)| n.as_str().cmp(name)).is_ok()
    }

    /// `FACT_add_num`: reject duplicates, insert in sorted position.
    pub fn add_num(&mut self, name: impl Into<String>, n: NumberRef) -> Result<(), FactError> {
        let name = name.into();
        if self.name_taken(&name) {
            return Err(FactError::name(format!("'{}' is already defined", name)));
        }
        let idx = self.num_stack.partition_point(|(n, _)| n.as_str() < name.as_str());
        self.num_stack.insert(idx, (name, n));
        Ok(())
    }

    pub fn add_scope(&mut self, name: impl Into<String>, s: ScopeRef) -> Result<(), FactError> {
        let name = name.into();
        if self.name_taken(&name) {
            return Err(FactError::name(format!("'{}' is already defined", name)));
        }
        let idx = self.scope_stack.partition_point(|(n, _)| n.as_str() < name.as_str());
        self.scope_stack.insert(idx, (name, s));
        Ok(())
    }

    /// `FACT_get_local_num`: binary search of the sorted `num_stack`.
    pub fn get_local_num(&self, name: &str) -> Option<NumberRef> {
        self.num_stack
            .binary_search_by(|(n, _)| n.as_str().cmp(name))
            .ok()
            .map(|i| self.num_stack[i].1.clone())
    }

    pub fn get_local_scope(&self, name: &str) -> Option<ScopeRef> {
        self.scope_stack
            .binary_search_by(|(n, _)| n.as_str().cmp(name))
            .ok()
            .map(|i| self.scope_stack[i].1.clone())
    }
}

/// Resolves `name` against `this`, then `this.up`, recursing until found or
/// the chain is exhausted (§4.3 `VAR`). Numbers are checked before child
/// scopes at each level, matching the instruction table's ordering.
pub fn resolve(this: &ScopeRef, name: &str) -> Result<crate::value::FactValue, FactError> {
    let mut cur = this.clone();
    loop {
        if let Some(n) = cur.borrow().get_local_num(name) {
            return Ok(crate::value::FactValue::Num(n));
        }
        if let Some(s) = cur.borrow().get_local_scope(name) {
            return Ok(crate::value::FactValue::Scope(s));
        }
        let up = cur.borrow().up.clone();
        match up {
            Some(parent) => cur = parent,
            None => return Err(FactError::name(format!("undefined variable {}", name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::Tag;
    use num_bigint::BigInt;

    #[test]
    fn binary_search_agrees_with_linear_scan() {
        let scope = Scope::new("s");
        for name in ["z", "a", "m", "b"] {
            scope
                .borrow_mut()
                .add_num(name, Number::new_ref(Tag::Int(BigInt::from(0))))
                .unwrap();
        }
        let names: Vec<&str> = scope.borrow().num_stack.iter().map(|(n, _)| n.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        for name in ["a", "b", "m", "z"] {
            assert!(scope.borrow().get_local_num(name).is_some());
        }
        assert!(scope.borrow().get_local_num("q").is_none());
    }

    #[test]
    fn duplicate_definition_is_rejected() {
        let scope = Scope::new("s");
        scope.borrow_mut().add_num("x", Number::new_ref(Tag::Int(BigInt::from(0)))).unwrap();
        assert!(scope.borrow_mut().add_num("x", Number::new_ref(Tag::Int(BigInt::from(0)))).is_err());
        assert!(scope.borrow_mut().add_scope("x", Scope::new("x")).is_err());
    }

    #[test]
    fn resolution_walks_up_chain() {
        let parent = Scope::new("parent");
        parent.borrow_mut().add_num("x", Number::new_ref(Tag::Int(BigInt::from(5)))).unwrap();
        let child = Scope::new("child");
        child.borrow_mut().up = Some(parent.clone());
        let resolved = resolve(&child, "x").unwrap();
        assert!(matches!(resolved, crate::value::FactValue::Num(_)));
        assert!(resolve(&child, "missing").is_err());
    }
}
