use num_traits::FromPrimitive;

use crate::opcode::{operand_schema, OperandKind, Opcode};
use crate::program::ProgramStore;

/// A single decoded operand, already resolved to its concrete value (a
/// literal register index, an absolute address, or an owned label string).
#[derive(Clone, Debug)]
pub enum DecodedArg {
    Reg(u8),
    Addr(u32),
    Label(String),
}

impl DecodedArg {
    pub fn as_reg(&self) -> u8 {
        match self {
            DecodedArg::Reg(r) => *r,
            _ => panic!("operand schema mismatch: expected a register"),
        }
    }

    pub fn as_addr(&self) -> u32 {
        match self {
            DecodedArg::Addr(a) => *a,
            _ => panic!("operand schema mismatch: expected an address"),
        }
    }

    pub fn as_label(&self) -> &str {
        match self {
            DecodedArg::Label(s) => s,
            _ => panic!("operand schema mismatch: expected a label"),
        }
    }
}

/// Decodes one instruction at `ip`, returning its opcode, operands, and the
/// address of the instruction immediately following it.
pub fn decode(program: &ProgramStore, ip: usize) -> (Opcode, Vec<DecodedArg>, usize) {
    let opbyte = program.read_byte(ip);
    let op = Opcode::from_u8(opbyte).unwrap_or_else(|| panic!("invalid opcode byte {} at address {}", opbyte, ip));
    let mut cursor = ip + 1;
    let mut args = Vec::with_capacity(operand_schema(op).len());
    for kind in operand_schema(op) {
        match kind {
            OperandKind::Reg => {
                args.push(DecodedArg::Reg(program.read_byte(cursor)));
                cursor += 1;
            }
            OperandKind::Addr => {
                let bytes = program.read_bytes(cursor, 4);
                args.push(DecodedArg::Addr(u32::from_be_bytes(bytes.try_into().unwrap())));
                cursor += 4;
            }
            OperandKind::Label => {
                let (s, next) = program.read_label(cursor);
                args.push(DecodedArg::Label(s));
                cursor = next;
            }
        }
    }
    (op, args, cursor)
}
