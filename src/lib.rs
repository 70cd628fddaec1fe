pub mod chip8_vm;

pub use chip8_vm::app::{cycle_delay_for_hz, run_headless, run_windowed};
pub use chip8_vm::config::{
    FONT_BYTES, FONT_START, MEMORY_SIZE, PROGRAM_START, SCREEN_HEIGHT, SCREEN_WIDTH, STACK_END,
    STACK_START,
};
pub use chip8_vm::cpu::Chip8Vm;
pub use chip8_vm::display::{sprite_row, Display, FrameBuffer, SharedFrameBuffer, SpriteRow};
pub use chip8_vm::error::Chip8Error;
pub use chip8_vm::input::{Input, Keypad};
pub use chip8_vm::memory::Memory;
pub use chip8_vm::quirks::{
    load_quirks_profile, load_quirks_profile_from_env, Chip8Quirks, MODERN_QUIRKS, ORIGINAL_QUIRKS,
};
pub use chip8_vm::registers::RegisterFile;
pub use chip8_vm::timers::{TimerThread, TimerUnit, Timers};
