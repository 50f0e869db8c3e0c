use std::fmt;

use crate::error::ConstantPoolOverflow;
use crate::vm::value::Value;

/// Pool indices below this load through the one-byte `Constant` instruction.
pub const LONG_CONSTANT_THRESHOLD: usize = 255;

/// Largest pool a three-byte `ConstantLong` operand can address.
pub const MAX_CONSTANTS: usize = 1 << 24;

/// A bytecode instruction.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::AsRefStr,
    strum::FromRepr,
    strum::EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum OpCode {
    Constant,
    ConstantLong,
    Nil,
    True,
    False,
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,
    Return,
}

impl OpCode {
    /// Number of operand bytes following the opcode byte.
    pub fn operand_len(self) -> usize {
        match self {
            Self::Constant => 1,
            Self::ConstantLong => 3,
            _ => 0,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("OP_{}", self.as_ref()))
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_repr(byte).ok_or(byte)
    }
}

/// A chunk of bytecode: instructions, a per-byte line table and a constant pool.
///
/// `lines[i]` is the source line of `code[i]`, so both always have the same length.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub lines: Vec<usize>,
    pub constants: Vec<Value>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, byte: u8, line: usize) {
        self.code.push(byte);
        self.lines.push(line);
    }

    pub fn write_op(&mut self, op: OpCode, line: usize) {
        self.write(op as u8, line);
    }

    pub fn add_constant(&mut self, value: Value) -> Result<usize, ConstantPoolOverflow> {
        if self.constants.len() >= MAX_CONSTANTS {
            return Err(ConstantPoolOverflow);
        }
        self.constants.push(value);
        Ok(self.constants.len() - 1)
    }

    /// Add `value` to the pool and emit the narrowest instruction that loads it.
    pub fn write_constant(&mut self, value: Value, line: usize) -> Result<usize, ConstantPoolOverflow> {
        let index = self.add_constant(value)?;
        if index < LONG_CONSTANT_THRESHOLD {
            self.write_op(OpCode::Constant, line);
            self.write(index as u8, line);
        } else {
            self.write_op(OpCode::ConstantLong, line);
            self.write((index >> 16) as u8, line);
            self.write((index >> 8) as u8, line);
            self.write(index as u8, line);
        }
        Ok(index)
    }

    /// Decode a big-endian three-byte operand starting at `offset`.
    pub fn read_u24(&self, offset: usize) -> Option<usize> {
        let bytes = self.code.get(offset..offset.checked_add(3)?)?;
        Some((usize::from(bytes[0]) << 16) | (usize::from(bytes[1]) << 8) | usize::from(bytes[2]))
    }

    /// Decode the constant-pool index operand of `op` starting at `offset`.
    pub fn read_constant_index(&self, op: OpCode, offset: usize) -> Option<usize> {
        match op {
            OpCode::Constant => self.code.get(offset).map(|&b| usize::from(b)),
            OpCode::ConstantLong => self.read_u24(offset),
            _ => None,
        }
    }

    pub fn line_at(&self, offset: usize) -> Option<usize> {
        self.lines.get(offset).copied()
    }

    /// Render every instruction under a `== name ==` header.
    pub fn disassemble(&self, name: &str) -> String {
        let mut out = format!("== {name} ==\n");
        let mut offset = 0;
        while offset < self.code.len() {
            offset = self.disassemble_instruction(offset, &mut out);
        }
        out
    }

    /// Format the instruction at `offset` into `out`, returning the next offset.
    ///
    /// Malformed bytecode is rendered rather than rejected: unknown opcodes
    /// advance by one byte and truncated operands end the listing.
    pub fn disassemble_instruction(&self, offset: usize, out: &mut String) -> usize {
        out.push_str(&format!("{offset:04} "));
        let line = self.line_at(offset);
        if offset > 0 && line.is_some() && line == self.line_at(offset - 1) {
            out.push_str("   | ");
        } else {
            out.push_str(&format!("{:4} ", line.unwrap_or_default()));
        }

        let Some(&byte) = self.code.get(offset) else {
            out.push_str("<end of code>\n");
            return offset + 1;
        };

        match OpCode::try_from(byte) {
            Ok(op @ (OpCode::Constant | OpCode::ConstantLong)) => {
                self.constant_instruction(op, offset, out)
            }
            Ok(op) => {
                out.push_str(&format!("{op}\n"));
                offset + 1
            }
            Err(byte) => {
                out.push_str(&format!("Unknown opcode {byte}\n"));
                offset + 1
            }
        }
    }

    fn constant_instruction(&self, op: OpCode, offset: usize, out: &mut String) -> usize {
        let Some(index) = self.read_constant_index(op, offset + 1) else {
            out.push_str(&format!("{op:<16} <truncated>\n"));
            return self.code.len();
        };
        match self.constants.get(index) {
            Some(value) => out.push_str(&format!("{op:<16} {index:4} '{value}'\n")),
            None => out.push_str(&format!("{op:<16} {index:4} <invalid constant>\n")),
        }
        offset + 1 + op.operand_len()
    }
}
