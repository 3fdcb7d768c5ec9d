use crate::error::FactError;
use crate::number::{Number, Tag};
use crate::value::FactValue;

pub const R_POP: u8 = 0;
pub const R_TOP: u8 = 1;
pub const R_TID: u8 = 2;
pub const R_I: u8 = 3;
pub const R_J: u8 = 4;
pub const R_K: u8 = 5;
pub const R_A: u8 = 6;
pub const R_X: u8 = 7;

const REGISTER_COUNT: usize = 256;

/// A thread's 256-entry register file (SPEC_FULL §3/§9: `R_POP`/`R_TOP` are
/// not real storage, they're a dispatch over the value stack). `R_TID` is
/// read-only and synthesized from the owning thread's id.
pub struct RegisterFile {
    slots: Vec<Option<FactValue>>,
}

impl RegisterFile {
    pub fn new() -> RegisterFile {
        RegisterFile {
            slots: vec![None; REGISTER_COUNT],
        }
    }

    /// Read a FACT value by reference (arithmetic operands, `REF` source,
    /// `STO` operands, ...).
    pub fn read(&self, vstack: &mut Vec<FactValue>, thread_id: usize, idx: u8) -> Result<FactValue, FactError> {
        match idx {
            R_POP => vstack.pop().ok_or_else(|| FactError::runtime("value stack underflow")),
            R_TOP => vstack.last().cloned().ok_or_else(|| FactError::runtime("value stack is empty")),
            R_TID => Ok(FactValue::new_num(Number::int(thread_id as i64))),
            _ => self.slots[idx as usize]
                .clone()
                .ok_or_else(|| FactError::name(format!("register {} is uninitialized", idx))),
        }
    }

    /// Replace what the register/slot refers to (`REF` destination, `STO`
    /// destination selection, `CALL`'s popped scope, ...).
    pub fn write_ref(&mut self, vstack: &mut Vec<FactValue>, idx: u8, value: FactValue) {
        match idx {
            R_POP => vstack.push(value),
            R_TOP => {
                if let Some(slot) = vstack.last_mut() {
                    *slot = value;
                } else {
                    vstack.push(value);
                }
            }
            R_TID => {}
            _ => self.slots[idx as usize] = Some(value),
        }
    }

    /// Every occupied slot, for the collector's root set (`gc::Heap::collect`).
    pub fn iter_roots(&self) -> impl Iterator<Item = &FactValue> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    /// Mutate, in place, the Number the register/slot currently refers to
    /// (arithmetic/compare/negate result writes). Falls back to allocating a
    /// fresh Number and writing a reference to it if the slot held nothing
    /// addressable yet.
    pub fn write_number(&mut self, vstack: &mut Vec<FactValue>, idx: u8, tag: Tag) -> Result<(), FactError> {
        let target = match idx {
            R_TOP => vstack.last().cloned(),
            R_TID | R_POP => None,
            _ => self.slots[idx as usize].clone(),
        };
        match target {
            Some(FactValue::Num(cell)) => {
                cell.borrow_mut().value = tag;
                Ok(())
            }
            Some(FactValue::Scope(_)) => Err(FactError::ty("cannot write a numeric result over a scope value")),
            None => {
                self.write_ref(vstack, idx, FactValue::new_num(Number::scalar(tag)));
                Ok(())
            }
        }
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        RegisterFile::new()
    }
}
