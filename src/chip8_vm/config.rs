pub const MEMORY_SIZE: usize = 4096;
pub const PROGRAM_START: usize = 0x200;

pub const FONT_START: usize = 0x000;
pub const FONT_GLYPH_SIZE: usize = 5;

/// Return addresses live inside main memory, two bytes each, low byte first.
pub const STACK_START: usize = 0x52;
pub const STACK_DEPTH: usize = 16;
pub const STACK_END: usize = STACK_START + STACK_DEPTH * 2;

pub const REGISTER_COUNT: usize = 16;
pub const FLAG_REGISTER: usize = 0xF;
pub const KEY_COUNT: usize = 16;

pub const SCREEN_WIDTH: usize = 64;
pub const SCREEN_HEIGHT: usize = 32;

pub const TIMER_HZ: u64 = 60;
pub const DEFAULT_CYCLE_DELAY_MS: u64 = 10;

pub const PIXEL_OFF: (u8, u8, u8) = (0, 0, 0);
pub const PIXEL_ON: (u8, u8, u8) = (0, 255, 0);

pub const FONT_BYTES: [u8; 80] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];
