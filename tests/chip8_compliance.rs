use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chip8_vm_rs::{
    Chip8Error, Chip8Vm, Keypad, SharedFrameBuffer, TimerThread, MODERN_QUIRKS, ORIGINAL_QUIRKS,
    PROGRAM_START, SCREEN_WIDTH, STACK_START,
};

fn machine() -> Chip8Vm {
    Chip8Vm::headless().0
}

#[test]
fn six_xnn_then_seven_x00_keeps_value() {
    let mut vm = machine();

    for x in 0..16u16 {
        for kk in [0x00u16, 0x01, 0x7F, 0x80, 0xFF] {
            vm.execute_opcode(0x6000 | (x << 8) | kk).unwrap();
            vm.execute_opcode(0x7000 | (x << 8)).unwrap();

            assert_eq!(vm.registers.v[x as usize], kk as u8);
        }
    }
}

#[test]
fn seven_xnn_wraps_at_8_bits_without_touching_vf() {
    let mut vm = machine();
    vm.registers.v[0] = 0xFF;

    vm.execute_opcode(0x7002).unwrap();

    assert_eq!(vm.registers.v[0], 0x01);
    assert_eq!(vm.registers.v[0xF], 0x00);
}

#[test]
fn eight_xy4_sets_carry_iff_sum_overflows() {
    let mut vm = machine();

    for vx in 0..=255u8 {
        for vy in 0..=255u8 {
            vm.registers.v[1] = vx;
            vm.registers.v[2] = vy;

            vm.execute_opcode(0x8124).unwrap();

            let sum = vx as u16 + vy as u16;
            assert_eq!(vm.registers.v[1] as u16, sum % 256);
            assert_eq!(vm.registers.v[0xF], u8::from(sum > 255));
        }
    }
}

#[test]
fn eight_xy5_and_xy7_clear_vf_on_borrow() {
    let mut vm = machine();

    for vx in 0..=255u8 {
        for vy in 0..=255u8 {
            vm.registers.v[3] = vx;
            vm.registers.v[4] = vy;
            vm.execute_opcode(0x8345).unwrap();

            let expected = if vy > vx {
                (256 + vx as u16 - vy as u16) as u8
            } else {
                vx - vy
            };
            assert_eq!(vm.registers.v[3], expected);
            assert_eq!(vm.registers.v[0xF], u8::from(vy <= vx));

            vm.registers.v[3] = vx;
            vm.registers.v[4] = vy;
            vm.execute_opcode(0x8347).unwrap();

            let expected = if vx > vy {
                (256 + vy as u16 - vx as u16) as u8
            } else {
                vy - vx
            };
            assert_eq!(vm.registers.v[3], expected);
            assert_eq!(vm.registers.v[0xF], u8::from(vx <= vy));
        }
    }
}

#[test]
fn shifts_capture_the_bit_shifted_out() {
    let mut vm = machine();

    for value in 0..=255u8 {
        vm.registers.v[5] = value;
        vm.registers.v[6] = 0xAA;
        vm.execute_opcode(0x8566).unwrap();
        assert_eq!(vm.registers.v[5], value >> 1);
        assert_eq!(vm.registers.v[0xF], value & 0x1);

        vm.registers.v[5] = value;
        vm.execute_opcode(0x856E).unwrap();
        assert_eq!(vm.registers.v[5], ((value as u16) << 1) as u8);
        assert_eq!(vm.registers.v[0xF], value >> 7);
        assert_eq!(vm.registers.v[6], 0xAA);
    }
}

#[test]
fn carry_result_wins_when_vf_is_the_destination() {
    let mut vm = machine();
    vm.registers.v[0xF] = 0xFF;
    vm.registers.v[1] = 0x02;

    vm.execute_opcode(0x8F14).unwrap();

    assert_eq!(vm.registers.v[0xF], 0x01);
}

#[test]
fn shift_left_flag_wins_when_vf_is_the_destination() {
    let mut vm = machine();
    vm.registers.v[0xF] = 0x81;

    vm.execute_opcode(0x8F0E).unwrap();

    assert_eq!(vm.registers.v[0xF], 0x01);
}

#[test]
fn bitwise_ops_combine_registers() {
    let mut vm = machine();
    vm.registers.v[0] = 0b1100;
    vm.registers.v[1] = 0b1010;

    vm.execute_opcode(0x8011).unwrap();
    assert_eq!(vm.registers.v[0], 0b1110);

    vm.execute_opcode(0x8012).unwrap();
    assert_eq!(vm.registers.v[0], 0b1010);

    vm.execute_opcode(0x8013).unwrap();
    assert_eq!(vm.registers.v[0], 0);

    vm.execute_opcode(0x8010).unwrap();
    assert_eq!(vm.registers.v[0], 0b1010);
}

#[test]
fn conditional_skips() {
    let mut vm = machine();
    vm.registers.v[1] = 0x42;
    vm.registers.v[2] = 0x42;
    let start_pc = vm.registers.pc;

    vm.execute_opcode(0x3142).unwrap();
    assert_eq!(vm.registers.pc, start_pc + 2);

    vm.execute_opcode(0x4142).unwrap();
    assert_eq!(vm.registers.pc, start_pc + 2);

    vm.execute_opcode(0x5120).unwrap();
    assert_eq!(vm.registers.pc, start_pc + 4);

    vm.execute_opcode(0x9120).unwrap();
    assert_eq!(vm.registers.pc, start_pc + 4);

    vm.registers.v[2] = 0x00;
    vm.execute_opcode(0x9120).unwrap();
    assert_eq!(vm.registers.pc, start_pc + 6);
}

#[test]
fn fx33_stores_bcd_digits_without_moving_i() {
    let mut vm = machine();
    vm.registers.v[2] = 123;
    vm.registers.index = 0x300;

    vm.execute_opcode(0xF233).unwrap();

    assert_eq!(vm.memory.range(0x300, 3).unwrap(), &[1, 2, 3]);
    assert_eq!(vm.registers.index, 0x300);
}

#[test]
fn fx33_past_end_of_memory_faults_without_writing() {
    let mut vm = machine();
    vm.registers.v[2] = 255;
    vm.registers.index = 0xFFE;

    let result = vm.execute_opcode(0xF233);

    assert!(matches!(result, Err(Chip8Error::MemoryFault { .. })));
    assert_eq!(vm.memory.range(0xFFE, 2).unwrap(), &[0, 0]);
}

#[test]
fn fx55_and_fx65_copy_inclusive_range_and_keep_i() {
    let mut vm = machine();
    vm.registers.index = 0x300;
    vm.registers.v[0..3].copy_from_slice(&[0x11, 0x22, 0x33]);
    vm.registers.v[3] = 0x44;

    vm.execute_opcode(0xF255).unwrap();

    assert_eq!(vm.memory.range(0x300, 4).unwrap(), &[0x11, 0x22, 0x33, 0x00]);
    assert_eq!(vm.registers.index, 0x300);

    vm.memory.range_mut(0x300, 3).unwrap().copy_from_slice(&[0xAA, 0xBB, 0xCC]);
    vm.execute_opcode(0xF265).unwrap();

    assert_eq!(vm.registers.v[0..4], [0xAA, 0xBB, 0xCC, 0x44]);
    assert_eq!(vm.registers.index, 0x300);
}

#[test]
fn fx1e_adds_vx_to_index() {
    let mut vm = machine();
    vm.registers.index = 0x2F0;
    vm.registers.v[7] = 0x20;

    vm.execute_opcode(0xF71E).unwrap();

    assert_eq!(vm.registers.index, 0x310);
}

#[test]
fn timer_opcodes_read_and_write_counters() {
    let mut vm = machine();
    vm.registers.v[1] = 7;
    vm.registers.v[2] = 9;

    vm.execute_opcode(0xF115).unwrap();
    vm.execute_opcode(0xF218).unwrap();
    vm.execute_opcode(0xF307).unwrap();

    assert_eq!(vm.timers.delay(), 7);
    assert_eq!(vm.timers.sound(), 9);
    assert_eq!(vm.registers.v[3], 7);
}

#[test]
fn fx29_font_lookup_follows_quirks() {
    let mut vm = machine().with_quirks(ORIGINAL_QUIRKS);
    vm.registers.v[4] = 0xA;
    vm.execute_opcode(0xF429).unwrap();
    assert_eq!(vm.registers.index, 0xA);

    let mut vm = machine().with_quirks(MODERN_QUIRKS);
    vm.registers.v[4] = 0xA;
    vm.execute_opcode(0xF429).unwrap();
    assert_eq!(vm.registers.index, 0xA * 5);
}

#[test]
fn bnnn_adds_to_advanced_pc_in_original_profile() {
    let mut vm = machine().with_quirks(ORIGINAL_QUIRKS);
    vm.load_program(&[0xB1, 0x23]).unwrap();
    vm.registers.v[0] = 0x05;

    vm.execute_one().unwrap();

    assert_eq!(vm.registers.pc, 0x202 + 0x123 + 0x05);
}

#[test]
fn bnnn_jumps_to_nnn_plus_v0_in_modern_profile() {
    let mut vm = machine().with_quirks(MODERN_QUIRKS);
    vm.load_program(&[0xB1, 0x23]).unwrap();
    vm.registers.v[0] = 0x05;

    vm.execute_one().unwrap();

    assert_eq!(vm.registers.pc, 0x128);
}

#[test]
fn annn_and_1nnn_use_the_low_12_bits() {
    let mut vm = machine();

    vm.execute_opcode(0xA123).unwrap();
    vm.execute_opcode(0x1456).unwrap();

    assert_eq!(vm.registers.index, 0x123);
    assert_eq!(vm.registers.pc, 0x456);
}

#[test]
fn call_then_return_resumes_after_the_call() {
    let mut vm = machine();
    // 0x200: CALL 0x206, 0x202: LD V0, 1, 0x206: RET
    vm.load_program(&[0x22, 0x06, 0x60, 0x01, 0x00, 0x00, 0x00, 0xEE])
        .unwrap();

    assert_eq!(vm.execute_one().unwrap(), 0x2206);
    assert_eq!(vm.registers.pc, 0x206);
    assert_eq!(vm.registers.sp as usize, STACK_START + 2);
    // Return address stored low byte first.
    assert_eq!(vm.memory.range(STACK_START, 2).unwrap(), &[0x02, 0x02]);

    assert_eq!(vm.execute_one().unwrap(), 0x00EE);
    assert_eq!(vm.registers.pc, 0x202);
    assert_eq!(vm.registers.sp as usize, STACK_START);
}

#[test]
fn return_with_empty_stack_underflows() {
    let mut vm = machine();
    vm.load_program(&[0x00, 0xEE]).unwrap();

    let result = vm.execute_one();

    assert!(matches!(result, Err(Chip8Error::StackUnderflow { .. })));
}

#[test]
fn nesting_past_sixteen_calls_overflows() {
    let mut vm = machine();
    // CALL 0x200 forever.
    vm.load_program(&[0x22, 0x00]).unwrap();

    for _ in 0..16 {
        vm.execute_one().unwrap();
    }
    let result = vm.execute_one();

    assert!(matches!(result, Err(Chip8Error::StackOverflow { .. })));
}

#[test]
fn undefined_sub_opcodes_are_reported_with_their_address() {
    for opcode in [0x8008u16, 0x800F, 0xE1FF, 0xE19F, 0xF1FF, 0xF100] {
        let mut vm = machine();
        vm.load_program(&opcode.to_be_bytes()).unwrap();

        let result = vm.execute_one();

        match result {
            Err(Chip8Error::UnknownOpcode { opcode: op, pc }) => {
                assert_eq!(op, opcode);
                assert_eq!(pc as usize, PROGRAM_START);
            }
            other => panic!("expected UnknownOpcode for {opcode:04x}, got {other:?}"),
        }
    }
}

#[test]
fn fetch_past_end_of_memory_faults() {
    let mut vm = machine();
    vm.registers.pc = 0xFFF;

    assert!(matches!(
        vm.execute_one(),
        Err(Chip8Error::MemoryFault { address: 0x1000 })
    ));
}

#[test]
fn machine_code_calls_are_ignored() {
    let mut vm = machine();
    let before = vm.registers.clone();

    vm.execute_opcode(0x0123).unwrap();

    assert_eq!(vm.registers, before);
}

#[test]
fn dxyn_drawn_twice_erases_and_sets_collision() {
    let (vm, frame, _keypad) = Chip8Vm::headless();
    let mut vm = vm;
    vm.registers.v[0] = 2;
    vm.registers.v[1] = 3;
    vm.registers.index = 0x300;
    vm.memory.range_mut(0x300, 2).unwrap().copy_from_slice(&[0xF0, 0x90]);

    vm.execute_opcode(0xD012).unwrap();
    assert_eq!(vm.registers.v[0xF], 0);
    assert!(frame.snapshot().pixel(2, 3));
    assert_eq!(frame.snapshot().lit_count(), 6);

    vm.execute_opcode(0xD012).unwrap();
    assert_eq!(vm.registers.v[0xF], 1);
    assert_eq!(frame.snapshot().lit_count(), 0);
}

#[test]
fn dxyn_wraps_at_right_edge() {
    let (vm, frame, _keypad) = Chip8Vm::headless();
    let mut vm = vm;
    vm.registers.v[0] = (SCREEN_WIDTH - 1) as u8;
    vm.registers.v[1] = 0;
    vm.registers.index = 0x300;
    vm.memory.write(0x300, 0xC0).unwrap();

    vm.execute_opcode(0xD011).unwrap();

    let snapshot = frame.snapshot();
    assert!(snapshot.pixel(SCREEN_WIDTH - 1, 0));
    assert!(snapshot.pixel(0, 0));
}

#[test]
fn dxyn_reading_past_memory_faults() {
    let mut vm = machine();
    vm.registers.index = 0xFFE;

    assert!(matches!(
        vm.execute_opcode(0xD005),
        Err(Chip8Error::MemoryFault { .. })
    ));
}

#[test]
fn zero_zero_e0_clears_display() {
    let (vm, frame, _keypad) = Chip8Vm::headless();
    let mut vm = vm;
    vm.registers.index = 0x0; // glyph "0"
    vm.execute_opcode(0xD005).unwrap();
    assert!(frame.snapshot().lit_count() > 0);

    vm.execute_opcode(0x00E0).unwrap();

    assert_eq!(frame.snapshot().lit_count(), 0);
}

#[test]
fn key_skips_use_inverted_polarity_in_original_profile() {
    let (vm, _frame, keypad) = Chip8Vm::headless();
    let mut vm = vm.with_quirks(ORIGINAL_QUIRKS);
    vm.registers.v[1] = 0xA;
    let start_pc = vm.registers.pc;

    vm.execute_opcode(0xE19E).unwrap();
    assert_eq!(vm.registers.pc, start_pc + 2);

    vm.execute_opcode(0xE1A1).unwrap();
    assert_eq!(vm.registers.pc, start_pc + 2);

    keypad.press(0xA);
    vm.execute_opcode(0xE1A1).unwrap();
    assert_eq!(vm.registers.pc, start_pc + 4);
}

#[test]
fn key_skips_use_canonical_polarity_in_modern_profile() {
    let (vm, _frame, keypad) = Chip8Vm::headless();
    let mut vm = vm.with_quirks(MODERN_QUIRKS);
    vm.registers.v[1] = 0xA;
    let start_pc = vm.registers.pc;
    keypad.press(0xA);

    vm.execute_opcode(0xE19E).unwrap();
    assert_eq!(vm.registers.pc, start_pc + 2);

    vm.execute_opcode(0xE1A1).unwrap();
    assert_eq!(vm.registers.pc, start_pc + 2);
}

#[test]
fn fx0a_blocks_while_timers_keep_ticking() {
    let keypad = Arc::new(Keypad::new());
    let mut vm = Chip8Vm::new(SharedFrameBuffer::new(), keypad.clone());
    let timers = vm.timers.clone();
    timers.set_delay(20);
    vm.load_program(&[0xF3, 0x0A]).unwrap();

    let _ticker = TimerThread::spawn(timers.clone(), 1000).unwrap();
    let worker = thread::spawn(move || {
        vm.execute_one().unwrap();
        vm
    });

    let deadline = Instant::now() + Duration::from_secs(2);
    while timers.delay() > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(timers.delay(), 0);
    assert!(!worker.is_finished());

    keypad.press(0x5);
    let vm = worker.join().unwrap();

    assert_eq!(vm.registers.v[3], 0x5);
    assert_eq!(vm.registers.pc, 0x202);
}

#[test]
fn fx0a_reports_closed_input() {
    let (vm, _frame, keypad) = Chip8Vm::headless();
    let mut vm = vm;
    keypad.close();

    assert!(matches!(
        vm.execute_opcode(0xF00A),
        Err(Chip8Error::InputClosed)
    ));
}

#[test]
fn cxnn_is_deterministic_for_a_seed_and_masked() {
    let mut first = machine().with_seed(7);
    let mut second = machine().with_seed(7);

    for _ in 0..32 {
        first.execute_opcode(0xC50F).unwrap();
        second.execute_opcode(0xC50F).unwrap();
        assert_eq!(first.registers.v[5], second.registers.v[5]);
        assert_eq!(first.registers.v[5] & 0xF0, 0);
    }

    first.execute_opcode(0xC500).unwrap();
    assert_eq!(first.registers.v[5], 0);
}

#[test]
fn two_cycle_program_adds_and_advances_pc() {
    let mut vm = machine();
    vm.load_program(&[0x60, 0x05, 0x70, 0x03]).unwrap();

    assert_eq!(vm.execute_one().unwrap(), 0x6005);
    assert_eq!(vm.execute_one().unwrap(), 0x7003);

    assert_eq!(vm.registers.v[0], 8);
    assert_eq!(vm.registers.pc as usize, PROGRAM_START + 4);
}
