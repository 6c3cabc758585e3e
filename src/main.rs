//! Headless CLI driver. There is no window or input layer here (see
//! `DESIGN.md`): the motherboard runs to completion or a frame limit, its
//! framebuffer is discarded, and whatever it writes to the serial port is
//! echoed to stdout, the usual way Game Boy test ROMs report results.

use chipset::gb::cartridge::Cartridge;
use chipset::gb::{CPU_CLOCK_SPEED, DISPLAY_REFRESH_RATE, Rgba};
use chipset::{EmulatorConfig, Motherboard};
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "chipset-cli", version, about = "Headless DMG motherboard driver")]
struct Cli {
    /// Path of the ROM to load
    rom: PathBuf,

    /// Path to a 256-byte boot ROM; falls back to the built-in one if omitted
    /// or unreadable
    #[arg(long)]
    bootrom: Option<PathBuf>,

    /// Four comma-separated RRGGBB colors, lightest shade first
    #[arg(long)]
    palette: Option<String>,

    /// Run as fast as possible instead of pacing to 60 Hz
    #[arg(long)]
    no_fps_limit: bool,

    /// Disable the APU
    #[arg(long)]
    no_sound: bool,

    /// Disable the default interrupt-vector breakpoints
    #[arg(long)]
    no_breakpoints: bool,

    /// Track per-opcode execution counts
    #[arg(long)]
    profiling: bool,

    /// Stop after this many simulated frames instead of running forever
    #[arg(long)]
    frames: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let palette = match &cli.palette {
        Some(spec) => parse_palette(spec)?,
        None => chipset::gb::DEFAULT_PALETTE,
    };

    println!("Loading cartridge {}...", cli.rom.display());
    let cartridge = Cartridge::try_from(cli.rom.as_path())?;
    println!("  -> {cartridge}");

    let config = EmulatorConfig {
        gamerom_path: cli.rom.clone(),
        bootrom_path: cli.bootrom.clone(),
        color_palette: palette,
        disable_renderer: false,
        sound_enabled: !cli.no_sound,
        profiling: cli.profiling,
        breakpoints_enabled: !cli.no_breakpoints,
    };

    let mut mb = Motherboard::new(cartridge, &config);
    mb.load_battery_ram();

    run(&mut mb, &cli);

    mb.stop(true);
    Ok(())
}

fn run(mb: &mut Motherboard, cli: &Cli) {
    let cycles_per_frame = i64::from(CPU_CLOCK_SPEED / DISPLAY_REFRESH_RATE);
    let frame_duration = Duration::from_secs_f64(1.0 / f64::from(DISPLAY_REFRESH_RATE));

    let mut frame = 0u64;
    loop {
        let started = Instant::now();
        mb.tick(cycles_per_frame);

        let serial = mb.get_serial();
        if !serial.is_empty() {
            print!("{serial}");
        }

        if !cli.no_fps_limit {
            spin_sleep::sleep(frame_duration.saturating_sub(started.elapsed()));
        }

        frame += 1;
        if cli.frames.is_some_and(|limit| frame >= limit) {
            break;
        }
    }
}

fn parse_palette(spec: &str) -> Result<[Rgba; 4], String> {
    let parts: Vec<&str> = spec.split(',').collect();
    let [a, b, c, d] = parts.as_slice() else {
        return Err(format!("expected 4 comma-separated RRGGBB colors, got {}", parts.len()));
    };
    let mut shades = [Rgba::default(); 4];
    for (slot, hex) in shades.iter_mut().zip([a, b, c, d]) {
        let packed = u32::from_str_radix(hex.trim(), 16).map_err(|e| format!("invalid color {hex:?}: {e}"))?;
        *slot = Rgba((packed >> 16) as u8, (packed >> 8) as u8, packed as u8, 0xFF);
    }
    Ok(shades)
}
