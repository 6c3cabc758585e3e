pub mod breakpoint;
pub mod cartridge;
pub mod constants;
pub mod cpu;
pub mod joypad;
pub mod lcd;
pub mod motherboard;
pub mod save;
pub mod serial;
pub mod sound;
pub mod timer;

use std::io;
use thiserror::Error;

pub const DISPLAY_REFRESH_RATE: u32 = 60; // TODO: exact refresh rate is 59.7

pub const SCREEN_WIDTH: u8 = 160;
pub const SCREEN_HEIGHT: u8 = 144;
pub const VERTICAL_BLANK_SCAN_LINE_MAX: u8 = 153;

pub const CPU_CLOCK_SPEED: u32 = 1024 * 1024 * 4;

/// Errors raised while constructing or driving a [`motherboard::Motherboard`].
///
/// `BusViolation` and `InvalidWrite` can only occur through the debugger-facing
/// entry points that accept addresses/values wider than the hardware allows
/// (see `DESIGN.md`); the instruction-execution fast path uses `u16`/`u8` and
/// rules both out at the type level.
#[derive(Debug, Error)]
pub enum GBError {
    #[error("bus violation: address {0:#x} is outside the 16-bit address space")]
    BusViolation(u32),

    #[error("invalid write: value {0:#x} does not fit in a byte")]
    InvalidWrite(u16),

    #[error("failed to load cartridge: {0}")]
    CartridgeLoad(String),

    #[error("unsupported controller type {0:#04x}")]
    UnsupportedController(u8),

    #[error("unsupported ROM size byte {0:#04x}")]
    UnsupportedRomSize(u8),

    #[error("unsupported RAM size byte {0:#04x}")]
    UnsupportedRamSize(u8),

    #[error("save state version {0} is not supported by this build")]
    StateVersionMismatch(u32),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type GBResult<T> = Result<T, GBError>;

/// Common interface every bus-addressable peripheral exposes to the
/// [`motherboard::Motherboard`]'s address decoder. Addresses and values are
/// hardware-sized, so out-of-range access is unrepresentable here.
pub trait AddressSpace {
    fn read(&self, address: u16) -> u8;
    fn write(&mut self, address: u16, value: u8);
}

/// A simple 8-bit-per-channel RGBA color, used by the renderer's palette
/// instead of a GUI toolkit's color type (no GUI crate is in scope here).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Rgba(pub u8, pub u8, pub u8, pub u8);

/// The classic DMG four-shade grayscale ramp, used when no palette is given.
pub const DEFAULT_PALETTE: [Rgba; 4] = [
    Rgba(0xFF, 0xFF, 0xFF, 0xFF),
    Rgba(0xAB, 0xAB, 0xAB, 0xFF),
    Rgba(0x55, 0x55, 0x55, 0xFF),
    Rgba(0x00, 0x00, 0x00, 0xFF),
];

/// Construction-time configuration for a [`motherboard::Motherboard`].
#[derive(Clone, Debug)]
pub struct EmulatorConfig {
    pub gamerom_path: std::path::PathBuf,
    pub bootrom_path: Option<std::path::PathBuf>,
    pub color_palette: [Rgba; 4],
    pub disable_renderer: bool,
    pub sound_enabled: bool,
    pub profiling: bool,
    pub breakpoints_enabled: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            gamerom_path: std::path::PathBuf::new(),
            bootrom_path: None,
            color_palette: DEFAULT_PALETTE,
            disable_renderer: false,
            sound_enabled: true,
            profiling: false,
            breakpoints_enabled: true,
        }
    }
}
