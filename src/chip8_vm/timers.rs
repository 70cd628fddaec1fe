use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, trace};

use crate::chip8_vm::error::Chip8Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timers {
    pub delay: u8,
    pub sound: u8,
}

impl Timers {
    /// Counts both timers down by one, stopping at zero. Returns whether the
    /// sound timer was still running.
    pub fn tick(&mut self) -> bool {
        self.delay = self.delay.saturating_sub(1);

        if self.sound > 0 {
            self.sound -= 1;
            return true;
        }
        false
    }
}

/// Handle to the delay/sound counters shared by the interpreter and the tick thread.
#[derive(Debug, Clone, Default)]
pub struct TimerUnit {
    inner: Arc<Mutex<Timers>>,
}

impl TimerUnit {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Timers> {
        // A poisoned lock still guards two plain counters.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn delay(&self) -> u8 {
        self.lock().delay
    }

    pub fn set_delay(&self, value: u8) {
        self.lock().delay = value;
    }

    pub fn sound(&self) -> u8 {
        self.lock().sound
    }

    pub fn set_sound(&self, value: u8) {
        self.lock().sound = value;
    }

    pub fn snapshot(&self) -> Timers {
        *self.lock()
    }

    pub fn tick(&self) -> bool {
        self.lock().tick()
    }
}

/// Background thread decrementing a [`TimerUnit`] at a fixed rate. Stops when dropped.
#[derive(Debug)]
pub struct TimerThread {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TimerThread {
    pub fn spawn(unit: TimerUnit, hz: u64) -> Result<Self, Chip8Error> {
        if hz == 0 {
            return Err(Chip8Error::InvalidArgument("timer hz must be > 0"));
        }

        let period = Duration::from_nanos(1_000_000_000 / hz);
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("chip8-timers".to_owned())
            .spawn(move || {
                debug!("timer thread started at {hz} Hz");
                while flag.load(Ordering::Acquire) {
                    thread::sleep(period);
                    if unit.tick() {
                        trace!("sound timer active");
                    }
                }
                debug!("timer thread stopped");
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TimerThread {
    fn drop(&mut self) {
        self.stop();
    }
}
