use std::fmt::{Display, Formatter};

use crate::chip8_vm::config::{PROGRAM_START, REGISTER_COUNT, STACK_START};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    /// V0..VF; VF doubles as the carry, borrow and collision flag.
    pub v: [u8; REGISTER_COUNT],
    pub index: u16,
    pub pc: u16,
    /// Byte offset of the next free stack slot in main memory.
    pub sp: u16,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self {
            v: [0; REGISTER_COUNT],
            index: 0,
            pc: PROGRAM_START as u16,
            sp: STACK_START as u16,
        }
    }
}

impl RegisterFile {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Display for RegisterFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "PC: {:04X}  SP: {:04X}", self.pc, self.sp)?;
        for (index, value) in self.v.iter().enumerate() {
            writeln!(f, "V{index:X}: {value:02X}")?;
        }
        write!(f, "I: {:04X}", self.index)
    }
}
