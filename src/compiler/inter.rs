use std::collections::HashMap;

use crate::opcode::{operand_schema, OperandKind, Opcode};
use crate::program::ProgramWriter;

/// A single instruction operand as known to the compiler, before addresses
/// are resolved to absolute offsets.
#[derive(Clone, Debug)]
pub enum Arg {
    Reg(u8),
    /// Names a `Mark` elsewhere in the tree; resolved to an absolute byte
    /// offset by `linearize`.
    Addr(String),
    Label(String),
}

impl Arg {
    fn byte_len(&self) -> u32 {
        match self {
            Arg::Reg(_) => 1,
            Arg::Addr(_) => 4,
            Arg::Label(s) => s.len() as u32 + 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct InstrNode {
    pub opcode: Opcode,
    pub args: Vec<Arg>,
}

/// Either a single instruction, an ordered grouping of children (so
/// forward/backward jumps can reference a position by name rather than by
/// raw relative offset), or a zero-width named mark a `Jmp`/`Jif`/... can
/// target (SPEC_FULL §4.2/§9: "prefer a two-pass design (assign offsets,
/// then emit) over the source's recursive subtraction, which is fragile at
/// boundaries" — marks are this crate's realization of that two-pass
/// design, standing in for the original's child-index arithmetic).
#[derive(Clone, Debug)]
pub enum Inter {
    Instr(InstrNode),
    Group(Vec<Inter>),
    Mark(String),
}

impl Inter {
    pub fn instr(opcode: Opcode, args: Vec<Arg>) -> Inter {
        debug_assert_eq!(args.len(), operand_schema(opcode).len(), "operand count mismatch for {:?}", opcode);
        for (a, k) in args.iter().zip(operand_schema(opcode)) {
            let matches = matches!((a, k), (Arg::Reg(_), OperandKind::Reg) | (Arg::Addr(_), OperandKind::Addr) | (Arg::Label(_), OperandKind::Label));
            debug_assert!(matches, "operand kind mismatch for {:?}", opcode);
        }
        Inter::Instr(InstrNode { opcode, args })
    }

    fn byte_size(&self) -> u32 {
        match self {
            Inter::Instr(i) => 1 + i.args.iter().map(Arg::byte_len).sum::<u32>(),
            Inter::Group(children) => children.iter().map(Inter::byte_size).sum(),
            Inter::Mark(_) => 0,
        }
    }

    fn assign_offsets(&self, base: u32, marks: &mut HashMap<String, u32>) {
        match self {
            Inter::Instr(_) => {}
            Inter::Group(children) => {
                let mut off = base;
                for c in children {
                    c.assign_offsets(off, marks);
                    off += c.byte_size();
                }
            }
            Inter::Mark(name) => {
                marks.insert(name.clone(), base);
            }
        }
    }

    fn emit(&self, w: &mut ProgramWriter, marks: &HashMap<String, u32>) {
        match self {
            Inter::Instr(i) => {
                w.emit_byte(num_traits::ToPrimitive::to_u8(&i.opcode).unwrap());
                for arg in &i.args {
                    match arg {
                        Arg::Reg(r) => w.emit_byte(*r),
                        Arg::Addr(label) => {
                            let addr = *marks
                                .get(label)
                                .unwrap_or_else(|| panic!("unresolved label '{}'", label));
                            w.emit_addr(addr);
                        }
                        Arg::Label(s) => w.emit_label(s),
                    }
                }
            }
            Inter::Group(children) => {
                for c in children {
                    c.emit(w, marks);
                }
            }
            Inter::Mark(_) => {}
        }
    }
}

/// Two-pass linearization (SPEC_FULL §4.2/§9): first assign every node its
/// absolute byte offset (recording `Mark` positions), then walk again and
/// emit bytes, resolving each `Arg::Addr` against the recorded marks. The
/// write lock is already held by the caller for the whole emission (see
/// `compiler::mod::compile`).
pub fn linearize(root: &Inter, w: &mut ProgramWriter) {
    let base = w.position() as u32;
    let mut marks = HashMap::new();
    root.assign_offsets(base, &mut marks);
    root.emit(w, &marks);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;
    use crate::program::ProgramStore;

    #[test]
    fn forward_and_backward_jumps_resolve_to_mark_offsets() {
        let tree = Inter::Group(vec![
            Inter::instr(Opcode::Jmp, vec![Arg::Addr("end".into())]),
            Inter::Mark("loop".into()),
            Inter::instr(Opcode::Const, vec![Arg::Label("1".into())]),
            Inter::instr(Opcode::Jmp, vec![Arg::Addr("loop".into())]),
            Inter::Mark("end".into()),
            Inter::instr(Opcode::Drop, vec![]),
        ]);
        let store = ProgramStore::new();
        {
            let mut w = store.writer();
            linearize(&tree, &mut w);
        }
        // JMP end: opcode(1)+addr(4) = 5 bytes; loop mark at offset 5.
        let loop_addr = store.read_bytes(1, 4);
        assert_eq!(u32::from_be_bytes(loop_addr.try_into().unwrap()), 5);
        // CONST "1" at 5: 1 + 2 = 3 bytes -> JMP loop at offset 8, addr bytes at 9.
        let back_addr = store.read_bytes(9, 4);
        assert_eq!(u32::from_be_bytes(back_addr.try_into().unwrap()), 5);
        // end mark at offset 8+5=13
        assert_eq!(store.read_byte(13), num_traits::ToPrimitive::to_u8(&Opcode::Drop).unwrap());
    }

    #[test]
    fn emission_is_deterministic() {
        let build = || {
            Inter::Group(vec![
                Inter::instr(Opcode::Const, vec![Arg::Label("42".into())]),
                Inter::instr(Opcode::Drop, vec![]),
            ])
        };
        let s1 = ProgramStore::new();
        linearize(&build(), &mut s1.writer());
        let s2 = ProgramStore::new();
        linearize(&build(), &mut s2.writer());
        assert_eq!(s1.read_bytes(0, s1.len()), s2.read_bytes(0, s2.len()));
    }
}
