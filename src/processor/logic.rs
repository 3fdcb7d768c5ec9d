//! Executes one decoded instruction against a thread (SPEC_FULL §4.1/§4.3).

use std::cell::RefCell;
use std::rc::Rc;

use num_traits::ToPrimitive;

use crate::constants::MIN_ARRAY_DIM;
use crate::error::FactError;
use crate::gc::Heap;
use crate::number::{self, Number, Tag};
use crate::opcode::Opcode;
use crate::processor::decode::DecodedArg;
use crate::processor::thread::{CallFrame, FactThread};
use crate::scope::{resolve, Scope, ScopeRef};
use crate::value::FactValue;

fn coerce_usize(v: &FactValue) -> Result<usize, FactError> {
    let n = v.as_number().ok_or_else(|| FactError::ty("expected a number"))?;
    match &n.borrow().value {
        Tag::Int(i) => i.to_usize().ok_or_else(|| FactError::value("count is out of range")),
        Tag::Float(_) => Err(FactError::ty("expected an integer, found a float")),
    }
}

fn as_number(v: &FactValue) -> Result<crate::number::NumberRef, FactError> {
    v.as_number().ok_or_else(|| FactError::ty("expected a number, found a scope"))
}

fn as_scope(v: &FactValue) -> Result<ScopeRef, FactError> {
    v.as_scope().ok_or_else(|| FactError::ty("expected a scope, found a number"))
}

fn pop(thread: &mut FactThread) -> Result<FactValue, FactError> {
    thread.vstack.pop().ok_or_else(|| FactError::runtime("value stack underflow"))
}

/// Runs one instruction. `next_ip` is the address immediately after this
/// instruction's encoding; every opcode except the control-transfer ones
/// (`Jmp`, taken `Jif`/`Jit`, `Call`, `Ret`, a trap dispatch) leaves
/// `thread.ip` there. Returns the scope of a freshly spawned thread, if
/// `Spawn` ran, so the scheduler can register it.
pub fn execute(
    thread: &mut FactThread,
    heap: &mut Heap,
    max_call_depth: usize,
    op: Opcode,
    args: &[DecodedArg],
    next_ip: usize,
) -> Result<Option<ScopeRef>, FactError> {
    thread.ip = next_ip;
    let tid = thread.id;
    let this = thread.this();

    match op {
        Opcode::Const => {
            let n = Number::parse_literal(args[0].as_label())?;
            thread.vstack.push(FactValue::new_num(n));
        }
        Opcode::This => thread.vstack.push(FactValue::Scope(this)),
        Opcode::Var => {
            let v = resolve(&this, args[0].as_label())?;
            thread.vstack.push(v);
        }
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
            exec_binary(thread, op, &args[0], &args[1], &args[2])?;
        }
        Opcode::Neg => {
            let r = args[0].as_reg();
            let v = thread.registers.read(&mut thread.vstack, tid, r)?;
            let n = as_number(&v)?;
            let result = number::neg(&n.borrow().value);
            thread.registers.write_number(&mut thread.vstack, r, result)?;
        }
        Opcode::Ceq | Opcode::Cne | Opcode::Clt | Opcode::Cle | Opcode::Cmt | Opcode::Cme => {
            exec_compare(thread, op, &args[0], &args[1], &args[2])?;
        }
        Opcode::Jmp => thread.ip = args[0].as_addr() as usize,
        Opcode::Jif => {
            let r = args[0].as_reg();
            let v = thread.registers.read(&mut thread.vstack, tid, r)?;
            let n = as_number(&v)?;
            let falsy = !n.borrow().value.is_truthy();
            if falsy {
                thread.ip = args[1].as_addr() as usize;
            }
        }
        Opcode::Jit => {
            let r = args[0].as_reg();
            let v = thread.registers.read(&mut thread.vstack, tid, r)?;
            let n = as_number(&v)?;
            let truthy = n.borrow().value.is_truthy();
            if truthy {
                thread.ip = args[1].as_addr() as usize;
            }
        }
        Opcode::Ref => {
            let src = args[0].as_reg();
            let dst = args[1].as_reg();
            let v = thread.registers.read(&mut thread.vstack, tid, src)?;
            thread.registers.write_ref(&mut thread.vstack, dst, v);
        }
        Opcode::Swap => {
            let len = thread.vstack.len();
            if len < 2 {
                return Err(FactError::runtime("value stack underflow on swap"));
            }
            thread.vstack.swap(len - 1, len - 2);
        }
        Opcode::Drop => {
            pop(thread)?;
        }
        Opcode::NewS => {
            let r = args[0].as_reg();
            let count = coerce_usize(&pop(thread)?)?;
            if count != 0 {
                return Err(FactError::ty("scope arrays are not supported"));
            }
            let scope = Scope::new("");
            scope.borrow_mut().up = Some(this.clone());
            heap.track(&scope);
            thread.registers.write_ref(&mut thread.vstack, r, FactValue::Scope(scope));
        }
        Opcode::DefN => {
            let r = args[0].as_reg();
            let name = args[1].as_label().to_string();
            let count = coerce_usize(&pop(thread)?)?;
            let mut dims = Vec::with_capacity(count);
            for _ in 0..count {
                dims.push(coerce_usize(&pop(thread)?)?);
            }
            dims.reverse();
            for d in &dims {
                if *d < MIN_ARRAY_DIM {
                    return Err(FactError::value(format!(
                        "array dimension {} is smaller than the minimum {}",
                        d, MIN_ARRAY_DIM
                    )));
                }
            }
            let number = if dims.is_empty() { Number::int(0) } else { Number::new_array(&dims) };
            let cell = Rc::new(RefCell::new(number));
            this.borrow_mut().add_num(name, cell.clone())?;
            thread.registers.write_ref(&mut thread.vstack, r, FactValue::Num(cell));
        }
        Opcode::DefS => {
            let r = args[0].as_reg();
            let name = args[1].as_label().to_string();
            let count = coerce_usize(&pop(thread)?)?;
            if count != 0 {
                return Err(FactError::ty("scope arrays are not supported"));
            }
            let scope = Scope::new("");
            scope.borrow_mut().up = Some(this.clone());
            this.borrow_mut().add_scope(name, scope.clone())?;
            heap.track(&scope);
            thread.registers.write_ref(&mut thread.vstack, r, FactValue::Scope(scope));
        }
        Opcode::Sto => {
            let src_idx = args[0].as_reg();
            let dst_idx = args[1].as_reg();
            let src = thread.registers.read(&mut thread.vstack, tid, src_idx)?;
            let dst = thread.registers.read(&mut thread.vstack, tid, dst_idx)?;
            match dst {
                FactValue::Num(cell) => {
                    let src_num = as_number(&src)?;
                    let cloned = src_num.borrow().clone();
                    cell.borrow_mut().assign_from(&cloned);
                }
                FactValue::Scope(_) => {
                    thread.registers.write_ref(&mut thread.vstack, dst_idx, src);
                }
            }
        }
        Opcode::Elem => {
            let a = args[0].as_reg();
            let b = args[1].as_reg();
            let idx_val = thread.registers.read(&mut thread.vstack, tid, a)?;
            let count_val = thread.registers.read(&mut thread.vstack, tid, b)?;
            let count = coerce_usize(&count_val)?;
            if count != 1 {
                return Err(FactError::runtime("multi-dimensional ELEM encoding is not supported"));
            }
            let idx = coerce_usize(&idx_val)?;
            let base = as_number(&pop(thread)?)?;
            let child = {
                let base_ref = base.borrow();
                let size = base_ref.array_size();
                if idx >= size {
                    return Err(FactError::bounds(format!("index {} out of range [0, {})", idx, size)));
                }
                base_ref.array.as_ref().unwrap()[idx].clone()
            };
            thread.vstack.push(FactValue::Num(child));
        }
        Opcode::SetF => {
            let src_idx = args[0].as_reg();
            let dst_idx = args[1].as_reg();
            let src = as_scope(&thread.registers.read(&mut thread.vstack, tid, src_idx)?)?;
            let dst = as_scope(&thread.registers.read(&mut thread.vstack, tid, dst_idx)?)?;
            let addr = src.borrow().code_addr;
            dst.borrow_mut().code_addr = addr;
        }
        Opcode::SetC => {
            let dst_idx = args[0].as_reg();
            let addr = args[1].as_addr();
            let dst = as_scope(&thread.registers.read(&mut thread.vstack, tid, dst_idx)?)?;
            dst.borrow_mut().code_addr = addr;
        }
        Opcode::Use => {
            let r = args[0].as_reg();
            let scope = as_scope(&thread.registers.read(&mut thread.vstack, tid, r)?)?;
            thread.cstack.push(CallFrame { this: scope, return_ip: None });
        }
        Opcode::Exit => {
            if thread.cstack.len() <= 1 {
                return Err(FactError::runtime("cannot exit the outermost scope"));
            }
            thread.cstack.pop();
            let restored = thread.this();
            thread.vstack.push(FactValue::Scope(restored));
        }
        Opcode::Call => {
            let r = args[0].as_reg();
            let scope = as_scope(&thread.registers.read(&mut thread.vstack, tid, r)?)?;
            if thread.cstack.len() >= max_call_depth {
                return Err(FactError::runtime("call stack overflow"));
            }
            let entry = scope.borrow().code_addr;
            thread.cstack.push(CallFrame { this: scope, return_ip: Some(thread.ip) });
            thread.ip = entry as usize;
        }
        Opcode::Ret => {
            if thread.cstack.len() <= 1 {
                // Nothing to resume: this is a `spawn`ed thread's root
                // frame completing (every `FuncDef` body ends with an
                // implicit `CONST 0; RET`, and a spawned thread starts
                // directly at that code address with no caller), or a
                // top-level `return` outside any function. Either way the
                // thread is simply done, not erroring.
                pop(thread)?;
                thread.run_flag = crate::processor::thread::RunFlag::Dead;
                return Ok(None);
            }
            let frame = thread.cstack.pop().expect("checked len() > 1 above");
            let return_ip = frame.return_ip.expect("non-root frames are always pushed by CALL");
            let retval = pop(thread)?;
            thread.ip = return_ip;
            thread.vstack.push(retval);
        }
        Opcode::PushTrap => {
            let addr = args[0].as_addr() as usize;
            thread.traps.push((addr, thread.vstack.len(), thread.cstack.len()));
        }
        Opcode::PopTrap => {
            thread.traps.pop().ok_or_else(|| FactError::runtime("no trap to pop"))?;
        }
        Opcode::Spawn => {
            let r = args[0].as_reg();
            let scope = as_scope(&thread.registers.read(&mut thread.vstack, tid, r)?)?;
            return Ok(Some(scope));
        }
    }
    Ok(None)
}

/// `a`/`b`/`dst` are read in that order: `a` is read (and, if `R_POP`,
/// popped) first, making it the right-hand operand, since the compiler
/// always pushes the left operand before the right one.
fn exec_binary(thread: &mut FactThread, op: Opcode, a: &DecodedArg, b: &DecodedArg, dst: &DecodedArg) -> Result<(), FactError> {
    let tid = thread.id;
    let rhs = as_number(&thread.registers.read(&mut thread.vstack, tid, a.as_reg())?)?;
    let lhs = as_number(&thread.registers.read(&mut thread.vstack, tid, b.as_reg())?)?;
    let lhs_tag = lhs.borrow().value.clone();
    let rhs_tag = rhs.borrow().value.clone();
    let result = match op {
        Opcode::Add => number::add(&lhs_tag, &rhs_tag),
        Opcode::Sub => number::sub(&lhs_tag, &rhs_tag),
        Opcode::Mul => number::mul(&lhs_tag, &rhs_tag),
        Opcode::Div => number::div(&lhs_tag, &rhs_tag)?,
        Opcode::Mod => number::rem(&lhs_tag, &rhs_tag)?,
        _ => unreachable!(),
    };
    thread.registers.write_number(&mut thread.vstack, dst.as_reg(), result)
}

fn exec_compare(thread: &mut FactThread, op: Opcode, a: &DecodedArg, b: &DecodedArg, dst: &DecodedArg) -> Result<(), FactError> {
    let tid = thread.id;
    let rhs = as_number(&thread.registers.read(&mut thread.vstack, tid, a.as_reg())?)?;
    let lhs = as_number(&thread.registers.read(&mut thread.vstack, tid, b.as_reg())?)?;
    let ordering = number::compare(&lhs.borrow().value, &rhs.borrow().value);
    use std::cmp::Ordering::*;
    let truth = match op {
        Opcode::Ceq => ordering == Equal,
        Opcode::Cne => ordering != Equal,
        Opcode::Clt => ordering == Less,
        Opcode::Cle => ordering != Greater,
        Opcode::Cmt => ordering == Greater,
        Opcode::Cme => ordering != Less,
        _ => unreachable!(),
    };
    thread
        .registers
        .write_number(&mut thread.vstack, dst.as_reg(), Tag::Int(num_bigint::BigInt::from(truth as i64)))
}
