use num_derive::{FromPrimitive, ToPrimitive};

/// The VM's instruction set (SPEC_FULL §4.1), plus the §1.2 supplements
/// (traps, spawn) appended at the end so the numeric encoding of the core
/// opcodes matches the table order exactly.
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive, ToPrimitive)]
pub enum Opcode {
    Const,
    This,
    Var,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Ceq,
    Cne,
    Clt,
    Cle,
    Cmt,
    Cme,
    Jmp,
    Jif,
    Jit,
    Ref,
    Swap,
    Drop,
    NewS,
    DefN,
    DefS,
    Sto,
    Elem,
    SetF,
    SetC,
    Use,
    Exit,
    Call,
    Ret,
    PushTrap,
    PopTrap,
    Spawn,
}

/// The typed operand kinds an instruction's bytes decode into (SPEC_FULL
/// §4.1): a register index, an absolute address, or a NUL-terminated label.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OperandKind {
    Reg,
    Addr,
    Label,
}

/// Fixed per-opcode operand schema, shared by the linearizer (to size and
/// emit each instruction) and the VM (to decode one).
///
/// `SetF` deviates from the literal "scope addr" wording in the spec table:
/// binding a lambda's code address to an already-live function value is only
/// possible at runtime (the callee is a variable, not a compile-time label),
/// so `SetF`'s second operand is a register holding the source scope, not a
/// literal address; `SetC` keeps the literal-address form for the
/// compile-time-known case (binding a definition's own body label). See
/// DESIGN.md.
pub fn operand_schema(op: Opcode) -> &'static [OperandKind] {
    use OperandKind::*;
    match op {
        Opcode::Const => &[Label],
        Opcode::This => &[],
        Opcode::Var => &[Label],
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => &[Reg, Reg, Reg],
        Opcode::Neg => &[Reg],
        Opcode::Ceq | Opcode::Cne | Opcode::Clt | Opcode::Cle | Opcode::Cmt | Opcode::Cme => &[Reg, Reg, Reg],
        Opcode::Jmp => &[Addr],
        Opcode::Jif | Opcode::Jit => &[Reg, Addr],
        Opcode::Ref => &[Reg, Reg],
        Opcode::Swap => &[],
        Opcode::Drop => &[],
        Opcode::NewS => &[Reg],
        Opcode::DefN | Opcode::DefS => &[Reg, Label],
        Opcode::Sto => &[Reg, Reg],
        Opcode::Elem => &[Reg, Reg],
        Opcode::SetF => &[Reg, Reg],
        Opcode::SetC => &[Reg, Addr],
        Opcode::Use => &[Reg],
        Opcode::Exit => &[],
        Opcode::Call => &[Reg],
        Opcode::Ret => &[],
        Opcode::PushTrap => &[Addr],
        Opcode::PopTrap => &[],
        Opcode::Spawn => &[Reg],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::{FromPrimitive, ToPrimitive};

    #[test]
    fn round_trips_through_primitive() {
        for op in [Opcode::Const, Opcode::Spawn, Opcode::Sto] {
            let n = op.to_u8().unwrap();
            assert_eq!(Opcode::from_u8(n), Some(op));
        }
    }
}
