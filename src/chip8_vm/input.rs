use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::chip8_vm::config::KEY_COUNT;

/// Where the interpreter reads the hexadecimal keypad from.
pub trait Input: Send + Sync {
    fn is_pressed(&self, key: u8) -> bool;

    /// Lowest-numbered key currently held, if any.
    fn current_key(&self) -> Option<u8>;

    /// Blocks the calling thread until a key is pressed. `None` means the
    /// input source has shut down and no key will ever arrive.
    fn wait_for_key(&self) -> Option<u8>;
}

#[derive(Debug, Default)]
struct KeypadState {
    pressed: [bool; KEY_COUNT],
    closed: bool,
}

/// Sixteen-key keypad fed by a front end and read by the interpreter thread.
#[derive(Debug, Default)]
pub struct Keypad {
    state: Mutex<KeypadState>,
    key_down: Condvar,
}

impl Keypad {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, KeypadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn press(&self, key: u8) {
        self.set_key(key, true);
    }

    pub fn release(&self, key: u8) {
        self.set_key(key, false);
    }

    pub fn set_key(&self, key: u8, is_pressed: bool) {
        let index = key as usize;
        if index >= KEY_COUNT {
            return;
        }

        let mut state = self.lock();
        let was_pressed = state.pressed[index];
        state.pressed[index] = is_pressed;
        if is_pressed && !was_pressed {
            self.key_down.notify_all();
        }
    }

    /// Wakes any waiter and makes every later wait return `None`.
    pub fn close(&self) {
        self.lock().closed = true;
        self.key_down.notify_all();
        debug!("keypad closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

fn first_pressed(state: &KeypadState) -> Option<u8> {
    state
        .pressed
        .iter()
        .position(|pressed| *pressed)
        .map(|index| index as u8)
}

impl Input for Keypad {
    fn is_pressed(&self, key: u8) -> bool {
        self.lock()
            .pressed
            .get(key as usize)
            .copied()
            .unwrap_or(false)
    }

    fn current_key(&self) -> Option<u8> {
        first_pressed(&self.lock())
    }

    fn wait_for_key(&self) -> Option<u8> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(key) = first_pressed(&state) {
                return Some(key);
            }
            state = self
                .key_down
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
