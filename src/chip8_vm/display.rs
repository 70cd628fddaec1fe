use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::chip8_vm::config::{SCREEN_HEIGHT, SCREEN_WIDTH};

/// One sprite row, most significant bit first.
pub type SpriteRow = [bool; 8];

/// Where the interpreter sends `00E0` and `Dxyn`.
pub trait Display: Send {
    fn clear(&mut self);

    /// XORs `rows` onto the screen with the top-left corner at `(x, y)`,
    /// wrapping at both edges. Returns true if any lit pixel was turned off.
    fn draw_sprite(&mut self, rows: &[SpriteRow], x: u8, y: u8) -> bool;
}

pub fn sprite_row(byte: u8) -> SpriteRow {
    let mut row = [false; 8];
    for (bit, pixel) in row.iter_mut().enumerate() {
        *pixel = (byte >> (7 - bit)) & 0x1 == 1;
    }
    row
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    pixels: [bool; SCREEN_WIDTH * SCREEN_HEIGHT],
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self {
            pixels: [false; SCREEN_WIDTH * SCREEN_HEIGHT],
        }
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pixel(&self, x: usize, y: usize) -> bool {
        self.pixels[(x % SCREEN_WIDTH) + (y % SCREEN_HEIGHT) * SCREEN_WIDTH]
    }

    pub fn pixels(&self) -> &[bool] {
        &self.pixels
    }

    pub fn lit_count(&self) -> usize {
        self.pixels.iter().filter(|pixel| **pixel).count()
    }
}

impl Display for FrameBuffer {
    fn clear(&mut self) {
        self.pixels = [false; SCREEN_WIDTH * SCREEN_HEIGHT];
    }

    fn draw_sprite(&mut self, rows: &[SpriteRow], x: u8, y: u8) -> bool {
        let mut collision = false;

        for (dy, row) in rows.iter().enumerate() {
            let y_pos = (y as usize + dy) % SCREEN_HEIGHT;
            for (dx, bit) in row.iter().enumerate() {
                if !bit {
                    continue;
                }

                let x_pos = (x as usize + dx) % SCREEN_WIDTH;
                let location = x_pos + y_pos * SCREEN_WIDTH;
                collision |= self.pixels[location];
                self.pixels[location] ^= true;
            }
        }

        collision
    }
}

/// A [`FrameBuffer`] that the interpreter draws into while another thread reads it.
#[derive(Debug, Clone, Default)]
pub struct SharedFrameBuffer {
    inner: Arc<Mutex<FrameBuffer>>,
}

impl SharedFrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, FrameBuffer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> FrameBuffer {
        self.lock().clone()
    }
}

impl Display for SharedFrameBuffer {
    fn clear(&mut self) {
        self.lock().clear();
    }

    fn draw_sprite(&mut self, rows: &[SpriteRow], x: u8, y: u8) -> bool {
        self.lock().draw_sprite(rows, x, y)
    }
}
