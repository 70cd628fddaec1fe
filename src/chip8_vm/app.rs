use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info};

use crate::chip8_vm::config::{PIXEL_OFF, PIXEL_ON, SCREEN_HEIGHT, SCREEN_WIDTH, TIMER_HZ};
use crate::chip8_vm::cpu::Chip8Vm;
use crate::chip8_vm::display::SharedFrameBuffer;
use crate::chip8_vm::error::Chip8Error;
use crate::chip8_vm::input::Keypad;
use crate::chip8_vm::timers::TimerThread;

pub fn cycle_delay_for_hz(cpu_hz: u64) -> Result<Duration, Chip8Error> {
    if cpu_hz == 0 {
        return Err(Chip8Error::InvalidArgument("cpu_hz must be > 0"));
    }
    Ok(Duration::from_nanos(1_000_000_000 / cpu_hz))
}

/// Executes instructions until `max_cycles` is reached, `running` is cleared or
/// the machine faults. Timers tick on their own thread for the duration.
fn run_cycles(
    vm: &mut Chip8Vm,
    max_cycles: Option<usize>,
    cycle_delay: Duration,
    running: &AtomicBool,
) -> Result<usize, Chip8Error> {
    let _timer_thread = TimerThread::spawn(vm.timers.clone(), TIMER_HZ)?;
    let mut cycles = 0;

    while running.load(Ordering::Acquire) && max_cycles.map_or(true, |max| cycles < max) {
        match vm.execute_one() {
            Ok(_) => cycles += 1,
            Err(Chip8Error::InputClosed) if !running.load(Ordering::Acquire) => break,
            Err(err) => {
                error!("interpreter halted after {cycles} cycles: {err}\n{vm}");
                return Err(err);
            }
        }

        if !cycle_delay.is_zero() {
            thread::sleep(cycle_delay);
        }
    }

    Ok(cycles)
}

/// Runs at most `max_cycles` instructions on the calling thread and returns how many ran.
pub fn run_headless(
    vm: &mut Chip8Vm,
    max_cycles: usize,
    cycle_delay: Duration,
) -> Result<usize, Chip8Error> {
    if max_cycles == 0 {
        return Err(Chip8Error::InvalidArgument("max_cycles must be > 0"));
    }

    let running = AtomicBool::new(true);
    let cycles = run_cycles(vm, Some(max_cycles), cycle_delay, &running)?;
    info!("headless run finished after {cycles} cycles");
    Ok(cycles)
}

/// Opens a window and runs `vm` on a worker thread until it faults or the window closes.
/// `frame` and `keypad` must be the adapters `vm` was built with.
pub fn run_windowed(
    vm: Chip8Vm,
    frame: SharedFrameBuffer,
    keypad: Arc<Keypad>,
    scale: usize,
    cycle_delay: Duration,
) -> Result<(), Chip8Error> {
    use raylib::prelude::{Color, KeyboardKey, RaylibDraw};

    if scale == 0 {
        return Err(Chip8Error::InvalidArgument("scale must be > 0"));
    }

    let width = (SCREEN_WIDTH * scale) as i32;
    let height = (SCREEN_HEIGHT * scale) as i32;
    let (mut rl, thread) = raylib::init()
        .size(width, height)
        .title("chip8-vm-rs")
        .build();
    rl.set_target_fps(TIMER_HZ as u32);

    // 1 2 3 C / 4 5 6 D / 7 8 9 E / A 0 B F on the left-hand block of a QWERTY keyboard.
    let key_map = [
        (KeyboardKey::KEY_ONE, 0x1u8),
        (KeyboardKey::KEY_TWO, 0x2),
        (KeyboardKey::KEY_THREE, 0x3),
        (KeyboardKey::KEY_FOUR, 0xC),
        (KeyboardKey::KEY_Q, 0x4),
        (KeyboardKey::KEY_W, 0x5),
        (KeyboardKey::KEY_E, 0x6),
        (KeyboardKey::KEY_R, 0xD),
        (KeyboardKey::KEY_A, 0x7),
        (KeyboardKey::KEY_S, 0x8),
        (KeyboardKey::KEY_D, 0x9),
        (KeyboardKey::KEY_F, 0xE),
        (KeyboardKey::KEY_Z, 0xA),
        (KeyboardKey::KEY_X, 0x0),
        (KeyboardKey::KEY_C, 0xB),
        (KeyboardKey::KEY_V, 0xF),
    ];
    let off_color = Color::new(PIXEL_OFF.0, PIXEL_OFF.1, PIXEL_OFF.2, 255);
    let on_color = Color::new(PIXEL_ON.0, PIXEL_ON.1, PIXEL_ON.2, 255);

    let running = Arc::new(AtomicBool::new(true));
    let worker = {
        let running = Arc::clone(&running);
        let mut vm = vm;
        thread::Builder::new()
            .name("chip8-cpu".to_owned())
            .spawn(move || run_cycles(&mut vm, None, cycle_delay, &running))?
    };

    while !rl.window_should_close() && !worker.is_finished() {
        if rl.is_key_pressed(KeyboardKey::KEY_ESCAPE) {
            break;
        }

        for (key, mapped) in key_map {
            keypad.set_key(mapped, rl.is_key_down(key));
        }

        let front_buffer = frame.snapshot();
        let mut d = rl.begin_drawing(&thread);
        d.clear_background(off_color);
        for (index, lit) in front_buffer.pixels().iter().enumerate() {
            if !lit {
                continue;
            }
            let x = (index % SCREEN_WIDTH) as i32;
            let y = (index / SCREEN_WIDTH) as i32;
            d.draw_rectangle(
                x * scale as i32,
                y * scale as i32,
                scale as i32,
                scale as i32,
                on_color,
            );
        }
    }

    running.store(false, Ordering::Release);
    keypad.close();

    let cycles = worker
        .join()
        .map_err(|_| Chip8Error::ThreadPanicked("interpreter"))??;
    info!("window closed after {cycles} cycles");
    Ok(())
}
