//! Bank-controller model.
//!
//! The bank-switching chip itself is an external collaborator (see
//! `DESIGN.md`): the coordinator only ever calls through `read`/`write` and
//! the two bank-number accessors used to disambiguate breakpoints and to
//! save/load battery RAM. This models just enough of the NoMBC/MBC1/MBC3/MBC5
//! register layouts to route addresses to the right bank; RTC registers,
//! multicart mirroring and the MBC1 advanced-banking-mode ROM split are out
//! of scope and are not modeled.

use crate::gb::GBError;
use crate::gb::GBResult;
use crate::gb::cartridge::{CartridgeConfig, ControllerType, RAM_BANK_SIZE, ROM_BANK_SIZE, bank_mask};
use crate::gb::constants::*;
use std::sync::Arc;

#[derive(Clone)]
pub struct BankController {
    kind: ControllerType,
    has_battery: bool,
    rom: Arc<[u8]>,
    rom_banks: u16,
    ram: Vec<u8>,
    ram_banks: u16,
    ram_enabled: bool,
    rom_bank: u16,
    ram_bank: u8,
}

impl BankController {
    pub fn new(config: CartridgeConfig, rom: Arc<[u8]>) -> Self {
        Self {
            kind: config.controller,
            has_battery: config.has_battery,
            rom,
            rom_banks: config.rom_banks,
            ram: vec![0; config.ram_size()],
            ram_banks: config.ram_banks,
            ram_enabled: false,
            rom_bank: 1,
            ram_bank: 0,
        }
    }

    pub fn read(&self, address: u16) -> u8 {
        match address {
            ROM_LOW_BANK_BEGIN..=ROM_LOW_BANK_END => self.rom[address as usize],
            ROM_HIGH_BANK_BEGIN..=ROM_HIGH_BANK_END => {
                let offset = self.rom_bank_offset() + (address - ROM_HIGH_BANK_BEGIN) as usize;
                self.rom.get(offset).copied().unwrap_or(UNDEFINED_READ)
            }
            CRAM_BANK_BEGIN..=CRAM_BANK_END => {
                if !self.ram_readable() {
                    return UNDEFINED_READ;
                }
                let offset = self.ram_bank_offset() + (address - CRAM_BANK_BEGIN) as usize;
                self.ram.get(offset).copied().unwrap_or(UNDEFINED_READ)
            }
            _ => UNDEFINED_READ,
        }
    }

    pub fn write(&mut self, address: u16, value: u8) {
        match address {
            CRAM_BANK_BEGIN..=CRAM_BANK_END => {
                if self.ram_readable() {
                    let offset = self.ram_bank_offset() + (address - CRAM_BANK_BEGIN) as usize;
                    if let Some(slot) = self.ram.get_mut(offset) {
                        *slot = value;
                    }
                }
                return;
            }
            _ if self.kind == ControllerType::NoMBC => return,
            _ => {}
        }

        match address {
            0x0000..=0x1FFF => self.ram_enabled = value & 0x0F == 0x0A,
            0x2000..=0x3FFF if self.kind != ControllerType::MBC5 => {
                let mask = match self.kind {
                    ControllerType::MBC1 => 0x1F,
                    _ => 0x7F, // MBC3
                };
                self.rom_bank = match value & mask {
                    0 => 1,
                    n => u16::from(n),
                };
            }
            0x2000..=0x2FFF => self.rom_bank = (self.rom_bank & 0x100) | u16::from(value),
            0x3000..=0x3FFF => self.rom_bank = (self.rom_bank & 0x00FF) | (u16::from(value & 0x01) << 8),
            0x4000..=0x5FFF => {
                self.ram_bank = match self.kind {
                    ControllerType::MBC1 => value & 0x03,
                    ControllerType::MBC5 => value & 0x0F,
                    _ => value, // MBC3, including the RTC register selectors 0x08-0x0C
                };
            }
            _ => {}
        }
    }

    fn rom_bank_offset(&self) -> usize {
        let bank = self.rom_bank & bank_mask(self.rom_banks.max(2)) as u16;
        ROM_BANK_SIZE * bank as usize
    }

    fn ram_readable(&self) -> bool {
        self.kind == ControllerType::NoMBC || (self.ram_enabled && self.ram_banks > 0)
    }

    fn ram_bank_offset(&self) -> usize {
        if self.ram_banks == 0 {
            return 0;
        }
        RAM_BANK_SIZE * (self.ram_bank as usize % self.ram_banks as usize)
    }

    /// Currently mapped ROM bank at 0x4000-0x7FFF.
    pub fn selected_rom_bank(&self) -> u16 {
        if self.kind == ControllerType::NoMBC {
            1
        } else {
            self.rom_bank & bank_mask(self.rom_banks.max(2)) as u16
        }
    }

    /// Currently mapped RAM bank at 0xA000-0xBFFF, or `-1` if RAM is
    /// unavailable (no banks, not enabled, or an MBC3 RTC register is
    /// selected instead of a RAM bank).
    pub fn selected_ram_bank(&self) -> i32 {
        if !self.ram_readable() || self.ram_banks == 0 {
            return -1;
        }
        if self.kind == ControllerType::MBC3 && self.ram_bank > 0x03 {
            return -1;
        }
        (self.ram_bank as usize % self.ram_banks as usize) as i32
    }

    pub fn load_ram(&mut self, ram: Vec<u8>) {
        let n = ram.len().min(self.ram.len());
        self.ram[..n].copy_from_slice(&ram[..n]);
    }

    pub fn save_ram(&self) -> GBResult<Arc<[u8]>> {
        if self.ram.is_empty() || !self.has_battery {
            return Err(GBError::CartridgeLoad("cartridge has no battery-backed RAM".into()));
        }
        Ok(self.ram.clone().into())
    }
}
