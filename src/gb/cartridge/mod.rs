//! Cartridge header parsing and the bank controller it selects.

use crate::gb::GBError;
use crate::gb::GBResult;
use crate::gb::cartridge::controller::BankController;
use std::path::Path;
use std::sync::Arc;
use std::{fmt, fs};

mod controller;

const CARTRIDGE_TITLE_BEGIN: u16 = 0x0134;
const CARTRIDGE_TITLE_END: u16 = 0x0142;
const CARTRIDGE_TYPE: u16 = 0x0147;
const CARTRIDGE_ROM_SIZE: u16 = 0x0148;
const CARTRIDGE_RAM_SIZE: u16 = 0x0149;
const CARTRIDGE_GLOBAL_CHECKSUM1: u16 = 0x014E;
const CARTRIDGE_GLOBAL_CHECKSUM2: u16 = 0x014F;

const ROM_BANK_SIZE: usize = 16384;
const RAM_BANK_SIZE: usize = 8192;

/// The controller family of the cartridge.
/// See <https://gbdev.io/pandocs/The_Cartridge_Header.html#0147--cartridge-type>.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum ControllerType {
    NoMBC,
    MBC1,
    MBC2,
    MBC3,
    MBC5,
    MBC6,
    MBC7,
}

impl ControllerType {
    /// Whether this specific header byte wires up battery-backed RAM.
    fn has_battery(raw: u8) -> bool {
        matches!(raw, 0x03 | 0x06 | 0x09 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E | 0x22)
    }
}

impl TryFrom<u8> for ControllerType {
    type Error = GBError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let mode = match value {
            0x00 | 0x08 | 0x09 => ControllerType::NoMBC,
            0x01..=0x03 => ControllerType::MBC1,
            0x0F..=0x13 => ControllerType::MBC3,
            0x19..=0x1E => ControllerType::MBC5,
            // MBC2, MBC6 and MBC7 are recognized but not implemented.
            _ => return Err(GBError::UnsupportedController(value)),
        };
        Ok(mode)
    }
}

impl fmt::Display for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerType::NoMBC => "NoMBC",
            ControllerType::MBC1 => "MBC1",
            ControllerType::MBC2 => "MBC2",
            ControllerType::MBC3 => "MBC3",
            ControllerType::MBC5 => "MBC5",
            ControllerType::MBC6 => "MBC6",
            ControllerType::MBC7 => "MBC7",
        };
        write!(f, "{name}")
    }
}

/// The controller type together with the ROM/RAM geometry decoded from the
/// cartridge header.
#[derive(Copy, Clone, Debug)]
pub struct CartridgeConfig {
    pub controller: ControllerType,
    pub rom_banks: u16,
    pub ram_banks: u16,
    pub has_battery: bool,
}

impl CartridgeConfig {
    pub fn new(controller_byte: u8, rom_size: u8, ram_size: u8) -> GBResult<Self> {
        let controller = ControllerType::try_from(controller_byte)?;

        let ram_banks = match ram_size {
            0x00 | 0x01 => 0,
            0x02 => 1,
            0x03 => 4,
            0x04 => 16,
            0x05 => 8,
            value => return Err(GBError::UnsupportedRamSize(value)),
        };

        // 32 KiB * (1 << value), expressed here directly in 16 KiB banks.
        let rom_banks = match rom_size {
            0x00 => 2,
            0x01 => 4,
            0x02 => 8,
            0x03 => 16,
            0x04 => 32,
            0x05 => 64,
            0x06 => 128,
            0x07 => 256,
            0x08 => 512,
            value => return Err(GBError::UnsupportedRomSize(value)),
        };

        Ok(Self {
            controller,
            rom_banks,
            ram_banks,
            has_battery: ControllerType::has_battery(controller_byte),
        })
    }

    #[inline(always)]
    pub const fn ram_size(&self) -> usize {
        self.ram_banks as usize * RAM_BANK_SIZE
    }
}

/// Cartridge header information.
/// See <https://gbdev.io/pandocs/The_Cartridge_Header.html>.
#[derive(Clone)]
pub struct CartridgeHeader {
    pub title: String,
    pub config: CartridgeConfig,
}

impl TryFrom<&[u8]> for CartridgeHeader {
    type Error = GBError;
    fn try_from(buf: &[u8]) -> Result<Self, Self::Error> {
        let config = CartridgeConfig::new(
            buf[CARTRIDGE_TYPE as usize],
            buf[CARTRIDGE_ROM_SIZE as usize],
            buf[CARTRIDGE_RAM_SIZE as usize],
        )?;
        let title = CartridgeHeader::parse_title(buf);
        Ok(Self { title, config })
    }
}

impl CartridgeHeader {
    fn parse_title(buf: &[u8]) -> String {
        let title = buf[CARTRIDGE_TITLE_BEGIN as usize..=CARTRIDGE_TITLE_END as usize]
            .iter()
            .filter_map(|b| b.is_ascii_alphanumeric().then_some(char::from(*b)))
            .collect::<String>();
        if title.is_empty() { "Unnamed".to_string() } else { title }
    }
}

impl fmt::Display for CartridgeHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.config.controller)
    }
}

/// A loaded game cartridge: its header plus the bank controller that decodes
/// ROM/RAM accesses for it.
#[derive(Clone)]
pub struct Cartridge {
    pub header: CartridgeHeader,
    controller: BankController,
}

impl TryFrom<Arc<[u8]>> for Cartridge {
    type Error = GBError;

    fn try_from(rom: Arc<[u8]>) -> Result<Self, Self::Error> {
        if let Err(msg) = verify_checksum(rom.as_ref()) {
            eprintln!("WARNING: {msg}");
        }
        let header = CartridgeHeader::try_from(rom.as_ref())?;
        let controller = BankController::new(header.config, rom);
        Ok(Self { header, controller })
    }
}

impl TryFrom<&Path> for Cartridge {
    type Error = GBError;

    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        let rom = fs::read(path).map_err(GBError::Io)?;
        Cartridge::try_from(Arc::from(rom.into_boxed_slice()))
    }
}

impl fmt::Display for Cartridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header)
    }
}

impl Cartridge {
    #[inline]
    pub fn write(&mut self, address: u16, value: u8) {
        self.controller.write(address, value);
    }

    #[inline]
    pub fn read(&self, address: u16) -> u8 {
        self.controller.read(address)
    }

    /// The ROM bank currently mapped into 0x4000-0x7FFF, used to
    /// disambiguate breakpoints set on bank-switched code.
    pub fn selected_rom_bank(&self) -> u16 {
        self.controller.selected_rom_bank()
    }

    /// The RAM bank currently mapped into 0xA000-0xBFFF, or `-1` if none.
    pub fn selected_ram_bank(&self) -> i32 {
        self.controller.selected_ram_bank()
    }

    pub fn load_ram(&mut self, ram: Vec<u8>) {
        self.controller.load_ram(ram);
    }

    pub fn save_ram(&self) -> GBResult<Arc<[u8]>> {
        self.controller.save_ram()
    }
}

/// Validates the global checksum of the given buffer containing the whole cartridge.
fn verify_checksum(buf: &[u8]) -> GBResult<()> {
    if buf.len() < CARTRIDGE_GLOBAL_CHECKSUM2 as usize {
        return Err(GBError::CartridgeLoad(
            "cartridge is too small to calculate the checksum".to_string(),
        ));
    }

    let byte1 = buf[CARTRIDGE_GLOBAL_CHECKSUM1 as usize];
    let byte2 = buf[CARTRIDGE_GLOBAL_CHECKSUM2 as usize];
    let checksum = u16::from(byte1) << 8 | u16::from(byte2);
    let calculated_checksum = calculate_global_checksum(buf);

    if checksum == calculated_checksum {
        return Ok(());
    }

    Err(GBError::CartridgeLoad(format!(
        "global checksum mismatch: expected {calculated_checksum:#06x}, got {checksum:#06x}"
    )))
}

/// Adds every byte of the cartridge ROM except the two checksum bytes
/// themselves.
fn calculate_global_checksum(buf: &[u8]) -> u16 {
    buf.iter()
        .enumerate()
        .fold(0u16, |sum, (address, &byte)| match address as u16 {
            CARTRIDGE_GLOBAL_CHECKSUM1 => sum,
            CARTRIDGE_GLOBAL_CHECKSUM2 => sum,
            _ => sum.wrapping_add(u16::from(byte)),
        })
}

/// Masks a ROM bank register down to the number of banks actually present.
#[inline]
const fn bank_mask(rom_banks: u16) -> u32 {
    let mask = u16::BITS - rom_banks.leading_zeros();
    (1 << mask) - 1
}
