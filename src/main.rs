use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use chip8_vm_rs::{
    cycle_delay_for_hz, load_quirks_profile, load_quirks_profile_from_env, run_headless,
    run_windowed, Chip8Error, Chip8Vm,
};

#[derive(Debug, Parser)]
#[command(name = "chip8-vm-rs")]
#[command(about = "Run a CHIP-8 ROM")]
struct Args {
    /// Path to the ROM image.
    rom: PathBuf,

    /// Raw font image loaded at address 0 instead of the built-in font.
    #[arg(long)]
    font: Option<PathBuf>,

    /// Quirks profile; falls back to CHIP8_QUIRKS, then "original".
    #[arg(long, value_parser = ["original", "modern"])]
    quirks: Option<String>,

    #[arg(long, default_value_t = 16)]
    scale: usize,

    /// Instructions per second.
    #[arg(long, default_value_t = 100)]
    hz: u64,

    #[arg(long, default_value_t = 2000)]
    max_cycles: usize,

    #[arg(long)]
    headless: bool,
}

fn run(args: Args) -> Result<(), Chip8Error> {
    let (profile, quirks) = match args.quirks {
        Some(name) => {
            let quirks = load_quirks_profile(&name)
                .map_err(|_| Chip8Error::InvalidArgument("quirks must be original or modern"))?;
            (name, quirks)
        }
        None => load_quirks_profile_from_env()
            .map_err(|_| Chip8Error::InvalidArgument("CHIP8_QUIRKS must be original or modern"))?,
    };
    info!("using {profile} quirks");

    let cycle_delay = cycle_delay_for_hz(args.hz)?;
    let (vm, frame, keypad) = Chip8Vm::headless();
    let mut vm = vm.with_quirks(quirks);

    if let Some(font) = &args.font {
        vm.load_font_file(font)?;
    }
    vm.load_rom_file(&args.rom)?;

    if args.headless {
        let cycles = run_headless(&mut vm, args.max_cycles, cycle_delay)?;
        println!(
            "headless finished: cycles={cycles} pc=0x{:03x} lit={}",
            vm.registers.pc,
            frame.snapshot().lit_count()
        );
        return Ok(());
    }

    run_windowed(vm, frame, keypad, args.scale, cycle_delay)
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    if !args.rom.exists() {
        eprintln!(
            "Couldn't load ROM at {}! Check your file path and try again.",
            args.rom.display()
        );
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
