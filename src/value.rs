use std::cell::RefCell;
use std::rc::Rc;

use crate::number::{Number, NumberRef};
use crate::scope::ScopeRef;

/// The unified "FACT value" (SPEC_FULL §3): every stack slot and register
/// holds one of these, tagged by which kind of runtime object it refers to.
#[derive(Debug, Clone)]
pub enum FactValue {
    Num(NumberRef),
    Scope(ScopeRef),
}

impl FactValue {
    pub fn new_num(n: Number) -> FactValue {
        FactValue::Num(Rc::new(RefCell::new(n)))
    }

    pub fn as_number(&self) -> Option<NumberRef> {
        match self {
            FactValue::Num(n) => Some(n.clone()),
            FactValue::Scope(_) => None,
        }
    }

    pub fn as_scope(&self) -> Option<ScopeRef> {
        match self {
            FactValue::Scope(s) => Some(s.clone()),
            FactValue::Num(_) => None,
        }
    }
}
