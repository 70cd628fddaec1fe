use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::chip8_vm::config::{
    FLAG_REGISTER, FONT_GLYPH_SIZE, FONT_START, PROGRAM_START, STACK_END, STACK_START,
};
use crate::chip8_vm::display::{sprite_row, Display, SharedFrameBuffer, SpriteRow};
use crate::chip8_vm::error::Chip8Error;
use crate::chip8_vm::input::{Input, Keypad};
use crate::chip8_vm::memory::Memory;
use crate::chip8_vm::quirks::Chip8Quirks;
use crate::chip8_vm::registers::RegisterFile;
use crate::chip8_vm::timers::TimerUnit;

type Handler = fn(&mut Chip8Vm, u16) -> Result<(), Chip8Error>;

fn x_register_index(opcode: u16) -> usize {
    ((opcode & 0x0F00) >> 8) as usize
}

fn y_register_index(opcode: u16) -> usize {
    ((opcode & 0x00F0) >> 4) as usize
}

fn address_nnn(opcode: u16) -> u16 {
    opcode & 0x0FFF
}

fn byte_nn(opcode: u16) -> u8 {
    (opcode & 0x00FF) as u8
}

fn nibble_n(opcode: u16) -> u8 {
    (opcode & 0x000F) as u8
}

/// Indexed by the top nibble of the instruction.
const PRIMARY_TABLE: [Handler; 16] = [
    Chip8Vm::handle_family_0,
    Chip8Vm::handle_opcode_1nnn_jump,
    Chip8Vm::handle_opcode_2nnn_call,
    Chip8Vm::handle_opcode_3xnn_skip_eq,
    Chip8Vm::handle_opcode_4xnn_skip_neq,
    Chip8Vm::handle_opcode_5xy0_skip_eq_register,
    Chip8Vm::handle_opcode_6xnn_load,
    Chip8Vm::handle_opcode_7xnn_add,
    Chip8Vm::handle_family_8,
    Chip8Vm::handle_opcode_9xy0_skip_neq_register,
    Chip8Vm::handle_opcode_annn_load_index,
    Chip8Vm::handle_opcode_bnnn_jump_offset,
    Chip8Vm::handle_opcode_cxnn_random,
    Chip8Vm::handle_opcode_dxyn_draw,
    Chip8Vm::handle_family_e,
    Chip8Vm::handle_family_f,
];

/// Family `8`, indexed by the low nibble.
const ALU_TABLE: [Option<Handler>; 16] = [
    Some(Chip8Vm::alu_assign as Handler),
    Some(Chip8Vm::alu_or as Handler),
    Some(Chip8Vm::alu_and as Handler),
    Some(Chip8Vm::alu_xor as Handler),
    Some(Chip8Vm::alu_add as Handler),
    Some(Chip8Vm::alu_sub as Handler),
    Some(Chip8Vm::alu_shift_right as Handler),
    Some(Chip8Vm::alu_sub_reversed as Handler),
    None,
    None,
    None,
    None,
    None,
    None,
    Some(Chip8Vm::alu_shift_left as Handler),
    None,
];

/// Family `E`, indexed by the low byte.
static KEY_TABLE: [Option<Handler>; 256] = build_key_table();

/// Family `F`, indexed by the low byte.
static UTILITY_TABLE: [Option<Handler>; 256] = build_utility_table();

const fn build_key_table() -> [Option<Handler>; 256] {
    let mut table: [Option<Handler>; 256] = [None; 256];
    table[0x9E] = Some(Chip8Vm::key_skip_9e as Handler);
    table[0xA1] = Some(Chip8Vm::key_skip_a1 as Handler);
    table
}

const fn build_utility_table() -> [Option<Handler>; 256] {
    let mut table: [Option<Handler>; 256] = [None; 256];
    table[0x07] = Some(Chip8Vm::utility_read_delay as Handler);
    table[0x0A] = Some(Chip8Vm::utility_wait_key as Handler);
    table[0x15] = Some(Chip8Vm::utility_set_delay as Handler);
    table[0x18] = Some(Chip8Vm::utility_set_sound as Handler);
    table[0x1E] = Some(Chip8Vm::utility_add_index as Handler);
    table[0x29] = Some(Chip8Vm::utility_font_glyph as Handler);
    table[0x33] = Some(Chip8Vm::utility_bcd as Handler);
    table[0x55] = Some(Chip8Vm::utility_store_registers as Handler);
    table[0x65] = Some(Chip8Vm::utility_load_registers as Handler);
    table
}

pub struct Chip8Vm {
    pub memory: Memory,
    pub registers: RegisterFile,
    pub timers: TimerUnit,
    pub quirks: Chip8Quirks,
    /// Last instruction dispatched.
    pub op: u16,
    display: Box<dyn Display>,
    input: Arc<dyn Input>,
    rng: Box<dyn RngCore + Send>,
}

impl fmt::Debug for Chip8Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chip8Vm")
            .field("registers", &self.registers)
            .field("timers", &self.timers.snapshot())
            .field("quirks", &self.quirks)
            .field("op", &self.op)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Chip8Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timers = self.timers.snapshot();
        writeln!(f, "OP: {:04X}", self.op)?;
        writeln!(f, "DT: {:02X}  ST: {:02X}", timers.delay, timers.sound)?;
        write!(f, "{}", self.registers)
    }
}

impl Chip8Vm {
    /// Creates a machine with the built-in font loaded and an entropy-seeded random source.
    pub fn new(display: impl Display + 'static, input: Arc<dyn Input>) -> Self {
        Self {
            memory: Memory::with_font(),
            registers: RegisterFile::default(),
            timers: TimerUnit::new(),
            quirks: Chip8Quirks::default(),
            op: 0,
            display: Box::new(display),
            input,
            rng: Box::new(StdRng::from_entropy()),
        }
    }

    /// Machine wired to an in-memory frame buffer and keypad, both returned for inspection.
    pub fn headless() -> (Self, SharedFrameBuffer, Arc<Keypad>) {
        let frame = SharedFrameBuffer::new();
        let keypad = Arc::new(Keypad::new());
        let vm = Self::new(frame.clone(), keypad.clone());
        (vm, frame, keypad)
    }

    pub fn with_quirks(mut self, quirks: Chip8Quirks) -> Self {
        self.quirks = quirks;
        self
    }

    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn load_font(&mut self, font: &[u8]) -> Result<(), Chip8Error> {
        if FONT_START + font.len() > STACK_START {
            warn!(
                "font of {} bytes overlaps the call stack at 0x{STACK_START:03x}",
                font.len()
            );
        }
        self.memory.load(FONT_START, font)
    }

    pub fn load_program(&mut self, program: &[u8]) -> Result<(), Chip8Error> {
        self.memory.load(PROGRAM_START, program)
    }

    pub fn load_font_file(&mut self, path: &Path) -> Result<(), Chip8Error> {
        let font = fs::read(path).map_err(|error| Chip8Error::load(path, error))?;
        self.load_font(&font)?;
        info!("loaded font {} ({} bytes)", path.display(), font.len());
        Ok(())
    }

    pub fn load_rom_file(&mut self, path: &Path) -> Result<(), Chip8Error> {
        let rom = fs::read(path).map_err(|error| Chip8Error::load(path, error))?;
        self.load_program(&rom)?;
        info!("loaded ROM {} ({} bytes)", path.display(), rom.len());
        Ok(())
    }

    /// Fetches the instruction at `pc`, advances `pc` past it and executes it.
    /// Returns the raw instruction.
    pub fn execute_one(&mut self) -> Result<u16, Chip8Error> {
        let pc = self.registers.pc;
        let opcode = self.memory.read_word(pc as usize)?;
        self.registers.pc = pc.wrapping_add(2);

        self.execute_opcode(opcode)?;
        Ok(opcode)
    }

    /// Executes an already fetched instruction; `pc` is expected to point past it.
    pub fn execute_opcode(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        self.op = opcode;
        trace!("0x{:03x}: {opcode:04x}", self.registers.pc.wrapping_sub(2));

        let handler = PRIMARY_TABLE[(opcode >> 12) as usize];
        handler(self, opcode)
    }

    fn unknown_opcode(&self, opcode: u16) -> Chip8Error {
        Chip8Error::UnknownOpcode {
            opcode,
            pc: self.registers.pc.wrapping_sub(2),
        }
    }

    fn skip_next_if(&mut self, condition: bool) {
        if condition {
            self.registers.pc = self.registers.pc.wrapping_add(2);
        }
    }

    fn push_return_address(&mut self) -> Result<(), Chip8Error> {
        let sp = self.registers.sp;
        if (sp as usize) < STACK_START || sp as usize + 2 > STACK_END {
            return Err(Chip8Error::StackOverflow { sp });
        }

        let [high, low] = self.registers.pc.to_be_bytes();
        self.memory.write(sp as usize, low)?;
        self.memory.write(sp as usize + 1, high)?;
        self.registers.sp = sp + 2;
        Ok(())
    }

    fn pop_return_address(&mut self) -> Result<u16, Chip8Error> {
        let sp = self.registers.sp;
        if (sp as usize) < STACK_START + 2 || sp as usize > STACK_END {
            return Err(Chip8Error::StackUnderflow { sp });
        }

        let high = self.memory.read(sp as usize - 1)?;
        let low = self.memory.read(sp as usize - 2)?;
        self.registers.sp = sp - 2;
        Ok(u16::from_be_bytes([high, low]))
    }

    fn handle_family_0(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        match opcode {
            0x00E0 => self.display.clear(),
            0x00EE => {
                self.registers.pc = self.pop_return_address()?;
            }
            // 0nnn: native machine-code routine, not emulated.
            _ => trace!("ignoring machine code call 0x{opcode:04x}"),
        }
        Ok(())
    }

    fn handle_opcode_1nnn_jump(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        self.registers.pc = address_nnn(opcode);
        Ok(())
    }

    fn handle_opcode_2nnn_call(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        self.push_return_address()?;
        self.registers.pc = address_nnn(opcode);
        Ok(())
    }

    fn handle_opcode_3xnn_skip_eq(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        let equal = self.registers.v[x_register_index(opcode)] == byte_nn(opcode);
        self.skip_next_if(equal);
        Ok(())
    }

    fn handle_opcode_4xnn_skip_neq(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        let different = self.registers.v[x_register_index(opcode)] != byte_nn(opcode);
        self.skip_next_if(different);
        Ok(())
    }

    fn handle_opcode_5xy0_skip_eq_register(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        let v = &self.registers.v;
        let equal = v[x_register_index(opcode)] == v[y_register_index(opcode)];
        self.skip_next_if(equal);
        Ok(())
    }

    fn handle_opcode_6xnn_load(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        self.registers.v[x_register_index(opcode)] = byte_nn(opcode);
        Ok(())
    }

    fn handle_opcode_7xnn_add(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        let x_reg = x_register_index(opcode);
        self.registers.v[x_reg] = self.registers.v[x_reg].wrapping_add(byte_nn(opcode));
        Ok(())
    }

    fn handle_family_8(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        match ALU_TABLE[nibble_n(opcode) as usize] {
            Some(handler) => handler(self, opcode),
            None => Err(self.unknown_opcode(opcode)),
        }
    }

    fn handle_opcode_9xy0_skip_neq_register(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        let v = &self.registers.v;
        let different = v[x_register_index(opcode)] != v[y_register_index(opcode)];
        self.skip_next_if(different);
        Ok(())
    }

    fn handle_opcode_annn_load_index(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        self.registers.index = address_nnn(opcode);
        Ok(())
    }

    fn handle_opcode_bnnn_jump_offset(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        let target = address_nnn(opcode) + self.registers.v[0] as u16;
        self.registers.pc = if self.quirks.jump_adds_to_pc {
            self.registers.pc.wrapping_add(target)
        } else {
            target
        };
        Ok(())
    }

    fn handle_opcode_cxnn_random(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        self.registers.v[x_register_index(opcode)] = self.rng.gen::<u8>() & byte_nn(opcode);
        Ok(())
    }

    fn handle_opcode_dxyn_draw(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        let x = self.registers.v[x_register_index(opcode)];
        let y = self.registers.v[y_register_index(opcode)];
        let height = nibble_n(opcode) as usize;

        let rows: Vec<SpriteRow> = self
            .memory
            .range(self.registers.index as usize, height)?
            .iter()
            .map(|byte| sprite_row(*byte))
            .collect();

        self.registers.v[FLAG_REGISTER] = 0;
        let collision = self.display.draw_sprite(&rows, x, y);
        self.registers.v[FLAG_REGISTER] = u8::from(collision);
        Ok(())
    }

    fn handle_family_e(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        match KEY_TABLE[byte_nn(opcode) as usize] {
            Some(handler) => handler(self, opcode),
            None => Err(self.unknown_opcode(opcode)),
        }
    }

    fn handle_family_f(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        match UTILITY_TABLE[byte_nn(opcode) as usize] {
            Some(handler) => handler(self, opcode),
            None => Err(self.unknown_opcode(opcode)),
        }
    }

    fn alu_assign(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        self.registers.v[x_register_index(opcode)] = self.registers.v[y_register_index(opcode)];
        Ok(())
    }

    fn alu_or(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        self.registers.v[x_register_index(opcode)] |= self.registers.v[y_register_index(opcode)];
        Ok(())
    }

    fn alu_and(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        self.registers.v[x_register_index(opcode)] &= self.registers.v[y_register_index(opcode)];
        Ok(())
    }

    fn alu_xor(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        self.registers.v[x_register_index(opcode)] ^= self.registers.v[y_register_index(opcode)];
        Ok(())
    }

    // The flag is written before the result, so `8Fy_` keeps the result in VF.
    fn alu_add(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        let x_reg = x_register_index(opcode);
        let (result, carry) =
            self.registers.v[x_reg].overflowing_add(self.registers.v[y_register_index(opcode)]);
        self.registers.v[FLAG_REGISTER] = u8::from(carry);
        self.registers.v[x_reg] = result;
        Ok(())
    }

    fn alu_sub(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        let x_reg = x_register_index(opcode);
        let (vx, vy) = (self.registers.v[x_reg], self.registers.v[y_register_index(opcode)]);
        self.registers.v[FLAG_REGISTER] = u8::from(vy <= vx);
        self.registers.v[x_reg] = vx.wrapping_sub(vy);
        Ok(())
    }

    fn alu_shift_right(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        let x_reg = x_register_index(opcode);
        let value = self.registers.v[x_reg];
        self.registers.v[FLAG_REGISTER] = value & 0x1;
        self.registers.v[x_reg] = value >> 1;
        Ok(())
    }

    fn alu_sub_reversed(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        let x_reg = x_register_index(opcode);
        let (vx, vy) = (self.registers.v[x_reg], self.registers.v[y_register_index(opcode)]);
        self.registers.v[FLAG_REGISTER] = u8::from(vx <= vy);
        self.registers.v[x_reg] = vy.wrapping_sub(vx);
        Ok(())
    }

    // Unlike the other flag-setting ALU ops, the flag is written last here.
    fn alu_shift_left(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        let x_reg = x_register_index(opcode);
        let value = self.registers.v[x_reg];
        self.registers.v[x_reg] = value.wrapping_shl(1);
        self.registers.v[FLAG_REGISTER] = (value & 0x80) >> 7;
        Ok(())
    }

    fn key_skip_9e(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        let pressed = self.input.is_pressed(self.registers.v[x_register_index(opcode)]);
        self.skip_next_if(pressed != self.quirks.key_skip_inverted);
        Ok(())
    }

    fn key_skip_a1(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        let pressed = self.input.is_pressed(self.registers.v[x_register_index(opcode)]);
        self.skip_next_if(pressed == self.quirks.key_skip_inverted);
        Ok(())
    }

    fn utility_read_delay(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        self.registers.v[x_register_index(opcode)] = self.timers.delay();
        Ok(())
    }

    fn utility_wait_key(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        debug!("waiting for key press");
        let key = self.input.wait_for_key().ok_or(Chip8Error::InputClosed)?;
        debug!("key 0x{key:x} pressed");
        self.registers.v[x_register_index(opcode)] = key;
        Ok(())
    }

    fn utility_set_delay(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        self.timers.set_delay(self.registers.v[x_register_index(opcode)]);
        Ok(())
    }

    fn utility_set_sound(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        self.timers.set_sound(self.registers.v[x_register_index(opcode)]);
        Ok(())
    }

    fn utility_add_index(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        let value = self.registers.v[x_register_index(opcode)] as u16;
        self.registers.index = self.registers.index.wrapping_add(value);
        Ok(())
    }

    fn utility_font_glyph(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        let digit = self.registers.v[x_register_index(opcode)] as usize;
        let offset = if self.quirks.font_glyph_unscaled {
            digit
        } else {
            (digit & 0x0F) * FONT_GLYPH_SIZE
        };
        self.registers.index = (FONT_START + offset) as u16;
        Ok(())
    }

    fn utility_bcd(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        let value = self.registers.v[x_register_index(opcode)];
        let digits = self.memory.range_mut(self.registers.index as usize, 3)?;
        digits.copy_from_slice(&[value / 100, (value % 100) / 10, value % 10]);
        Ok(())
    }

    fn utility_store_registers(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        let count = x_register_index(opcode) + 1;
        let target = self.memory.range_mut(self.registers.index as usize, count)?;
        target.copy_from_slice(&self.registers.v[..count]);
        Ok(())
    }

    fn utility_load_registers(&mut self, opcode: u16) -> Result<(), Chip8Error> {
        let count = x_register_index(opcode) + 1;
        let source = self.memory.range(self.registers.index as usize, count)?;
        self.registers.v[..count].copy_from_slice(source);
        Ok(())
    }
}
