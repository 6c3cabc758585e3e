//! Owns every peripheral and drives the bus-accurate tick loop.
//!
//! The CPU needs a bus, but nothing may hold a reference back to the motherboard that owns
//! it (see the module docs on [`crate::gb::cpu`]): each tick builds a transient [`Bus`] out
//! of every field *except* `cpu`, via disjoint field borrows, and hands that to `cpu.step`.

use crate::gb::breakpoint::BreakpointList;
use crate::gb::cartridge::Cartridge;
use crate::gb::constants::*;
use crate::gb::cpu::{Cpu, InterruptFlags, StepOutcome};
use crate::gb::joypad::{Button, Interaction};
use crate::gb::lcd::Lcd;
use crate::gb::lcd::renderer::Renderer;
use crate::gb::serial::Serial;
use crate::gb::sound::Sound;
use crate::gb::timer::Timer;
use crate::gb::{AddressSpace, EmulatorConfig, GBError, GBResult};
use std::io::{Read, Write};
use std::path::PathBuf;

/// A bus view over every peripheral except the CPU itself, built fresh for each
/// [`Motherboard::tick`] iteration. Lifetime-bound to the motherboard it borrows from.
struct Bus<'a> {
    boot_rom: &'a [u8; BOOT_SIZE],
    cartridge: &'a mut Cartridge,
    lcd: &'a mut Lcd,
    renderer: &'a mut Renderer,
    timer: &'a mut Timer,
    serial: &'a mut Serial,
    interaction: &'a mut Interaction,
    sound: &'a mut Sound,
    wram: &'a mut [u8; WRAM_SIZE],
    hram: &'a mut [u8; HRAM_SIZE],
    io_mirror: &'a mut [u8; IO_MIRROR_SIZE],
    bootrom_enabled: &'a mut bool,
    interrupt_flag: &'a mut u8,
    interrupt_enable: &'a mut u8,
}

impl AddressSpace for Bus<'_> {
    fn read(&self, address: u16) -> u8 {
        match address {
            BOOT_BEGIN..=BOOT_END if *self.bootrom_enabled => self.boot_rom[address as usize],
            ROM_LOW_BANK_BEGIN..=ROM_HIGH_BANK_END => self.cartridge.read(address),
            VRAM_BEGIN..=VRAM_END => self.lcd.read_vram(address),
            CRAM_BANK_BEGIN..=CRAM_BANK_END => self.cartridge.read(address),
            WRAM_BEGIN..=WRAM_END => self.wram[(address - WRAM_BEGIN) as usize],
            ECHO_BEGIN..=ECHO_END => self.wram[(address - ECHO_BEGIN) as usize],
            OAM_BEGIN..=OAM_END => self.lcd.read_oam(address),
            UNUSED_BEGIN..=UNUSED_END => UNDEFINED_READ,
            SERIAL_TRANSFER_DATA => self.serial.read_data(),
            SERIAL_TRANSFER_CTRL => self.serial.read_ctrl(),
            TIMER_DIVIDER | TIMER_COUNTER | TIMER_MODULO | TIMER_CTRL => self.timer.read(address),
            INTERRUPT_FLAG => *self.interrupt_flag | 0b1110_0000,
            PPU_DMA => UNDEFINED_READ,
            PPU_REGISTER_START..=PPU_REGISTER_END => self.lcd.read_register(address),
            AUDIO_REGISTERS_START..=AUDIO_REGISTERS_END => self.sound.get(address),
            IO_BEGIN..=IO_END => self.io_mirror[(address - IO_BEGIN) as usize],
            HRAM_BEGIN..=HRAM_END => self.hram[(address - HRAM_BEGIN) as usize],
            INTERRUPT_ENABLE => *self.interrupt_enable,
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            ROM_LOW_BANK_BEGIN..=ROM_HIGH_BANK_END => self.cartridge.write(address, value),
            VRAM_BEGIN..=VRAM_END => {
                self.lcd.write_vram(address, value);
                if address < 0x9800 {
                    self.renderer.mark_tile_dirty(address);
                }
            }
            CRAM_BANK_BEGIN..=CRAM_BANK_END => self.cartridge.write(address, value),
            WRAM_BEGIN..=WRAM_END => self.wram[(address - WRAM_BEGIN) as usize] = value,
            ECHO_BEGIN..=ECHO_END => self.wram[(address - ECHO_BEGIN) as usize] = value,
            OAM_BEGIN..=OAM_END => self.lcd.write_oam(address, value),
            UNUSED_BEGIN..=UNUSED_END => {}
            JOYPAD => self.io_mirror[(address - IO_BEGIN) as usize] = self.interaction.pull(value),
            SERIAL_TRANSFER_DATA => self.serial.write_data(value),
            SERIAL_TRANSFER_CTRL => self.serial.write_ctrl(value),
            TIMER_DIVIDER | TIMER_COUNTER | TIMER_MODULO | TIMER_CTRL => self.timer.write(address, value),
            INTERRUPT_FLAG => *self.interrupt_flag = value & InterruptFlags::all().bits(),
            PPU_DMA => self.perform_dma(value),
            PPU_REGISTER_START..=PPU_REGISTER_END => {
                if self.lcd.write_register(address, value) {
                    self.renderer.clearcache = true;
                }
            }
            AUDIO_REGISTERS_START..=AUDIO_REGISTERS_END => self.sound.set(address, value),
            BOOT_ROM_OFF => {
                if value == 1 {
                    *self.bootrom_enabled = false;
                }
                self.io_mirror[(address - IO_BEGIN) as usize] = value;
            }
            IO_BEGIN..=IO_END => self.io_mirror[(address - IO_BEGIN) as usize] = value,
            HRAM_BEGIN..=HRAM_END => self.hram[(address - HRAM_BEGIN) as usize] = value,
            INTERRUPT_ENABLE => *self.interrupt_enable = value,
        }
    }
}

impl Bus<'_> {
    /// Instantaneous 160-byte copy from `src*0x100` into OAM, through the ordinary read
    /// path so DMA transparently sources from ROM, VRAM or work RAM.
    fn perform_dma(&mut self, src: u8) {
        let base = u16::from(src) << 8;
        for offset in 0..u16::try_from(OAM_SIZE).unwrap() {
            let byte = self.read(base.wrapping_add(offset));
            self.lcd.write_oam(OAM_BEGIN + offset, byte);
        }
    }
}

const IO_MIRROR_SIZE: usize = (IO_END - IO_BEGIN + 1) as usize;

/// The full simulated DMG: every peripheral plus the coordinator state (boot-ROM
/// latch, breakpoints, interrupt registers) that has no other natural home.
pub struct Motherboard {
    cpu: Cpu,
    boot_rom: Box<[u8; BOOT_SIZE]>,
    timer: Timer,
    lcd: Lcd,
    renderer: Renderer,
    sound: Sound,
    sound_enabled: bool,
    interaction: Interaction,
    serial: Serial,
    cartridge: Cartridge,
    wram: Box<[u8; WRAM_SIZE]>,
    hram: Box<[u8; HRAM_SIZE]>,
    io_mirror: Box<[u8; IO_MIRROR_SIZE]>,
    bootrom_enabled: bool,
    interrupt_flag: u8,
    interrupt_enable: u8,
    breakpoints: BreakpointList,
    breakpoints_enabled: bool,
    profiling: bool,
    gamerom_path: PathBuf,
}

impl Motherboard {
    pub fn new(cartridge: Cartridge, config: &EmulatorConfig) -> Self {
        Self {
            cpu: Cpu::new(config.profiling),
            boot_rom: Self::load_boot_rom(config.bootrom_path.as_deref()),
            timer: Timer::new(),
            lcd: Lcd::new(),
            renderer: Renderer::new(config.color_palette, config.disable_renderer),
            sound: Sound::new(config.sound_enabled),
            sound_enabled: config.sound_enabled,
            interaction: Interaction::new(),
            serial: Serial::new(),
            cartridge,
            wram: Box::new([0; WRAM_SIZE]),
            hram: Box::new([0; HRAM_SIZE]),
            io_mirror: Box::new([0; IO_MIRROR_SIZE]),
            bootrom_enabled: config.bootrom_path.is_some(),
            interrupt_flag: 0,
            interrupt_enable: 0,
            breakpoints: BreakpointList::new(),
            breakpoints_enabled: config.breakpoints_enabled,
            profiling: config.profiling,
            gamerom_path: config.gamerom_path.clone(),
        }
    }

    /// Reads a custom boot ROM from `path`, falling back to the built-in DMG one (with a
    /// warning) if no path was given or the file can't be read as exactly `BOOT_SIZE` bytes.
    fn load_boot_rom(path: Option<&std::path::Path>) -> Box<[u8; BOOT_SIZE]> {
        let Some(path) = path else {
            return Box::new(BOOT_ROM);
        };
        match std::fs::read(path) {
            Ok(bytes) => match <[u8; BOOT_SIZE]>::try_from(bytes.as_slice()) {
                Ok(array) => Box::new(array),
                Err(_) => {
                    eprintln!(
                        "WARNING: boot ROM at {} is {} bytes, expected {BOOT_SIZE}; falling back to the built-in boot ROM",
                        path.display(),
                        bytes.len()
                    );
                    Box::new(BOOT_ROM)
                }
            },
            Err(err) => {
                eprintln!(
                    "WARNING: failed to read boot ROM at {}: {err}; falling back to the built-in boot ROM",
                    path.display()
                );
                Box::new(BOOT_ROM)
            }
        }
    }

    fn bus(&mut self) -> Bus<'_> {
        Bus {
            boot_rom: &self.boot_rom,
            cartridge: &mut self.cartridge,
            lcd: &mut self.lcd,
            renderer: &mut self.renderer,
            timer: &mut self.timer,
            serial: &mut self.serial,
            interaction: &mut self.interaction,
            sound: &mut self.sound,
            wram: &mut self.wram,
            hram: &mut self.hram,
            io_mirror: &mut self.io_mirror,
            bootrom_enabled: &mut self.bootrom_enabled,
            interrupt_flag: &mut self.interrupt_flag,
            interrupt_enable: &mut self.interrupt_enable,
        }
    }

    /// Advances the simulation by up to `cycles_budget` machine cycles. Returns the
    /// unconsumed remainder: zero or negative on a normal exit, positive only when a
    /// breakpoint interrupted the loop.
    pub fn tick(&mut self, cycles_budget: i64) -> i64 {
        let mut remaining = cycles_budget;

        while remaining > 0 {
            // `self.cpu.step(&mut self.bus())` cannot borrow-check: `bus()` is a method
            // call that would need `&mut self` as a whole, colliding with the `&mut
            // self.cpu` the outer call also needs. Destructuring `self` directly here
            // gives the borrow checker disjoint field borrows instead.
            let Self { cpu, boot_rom, cartridge, lcd, renderer, timer, serial, interaction, sound, wram, hram, io_mirror, bootrom_enabled, interrupt_flag, interrupt_enable, .. } = self;
            let mut bus = Bus {
                boot_rom,
                cartridge,
                lcd,
                renderer,
                timer,
                serial,
                interaction,
                sound,
                wram,
                hram,
                io_mirror,
                bootrom_enabled,
                interrupt_flag,
                interrupt_enable,
            };
            let outcome = cpu.step(&mut bus);

            if self.breakpoints_enabled
                && self.breakpoints.matches(
                    self.cpu.pc,
                    self.bootrom_enabled,
                    self.cartridge.selected_rom_bank(),
                    self.cartridge.selected_ram_bank(),
                )
            {
                return remaining;
            }

            let elapsed: u32 = match outcome {
                StepOutcome::Executed(cycles) => u32::from(cycles),
                StepOutcome::Halted => {
                    let budget_left = i64::from(remaining.max(0) as u32);
                    let timer_event = self.timer.cycles_to_interrupt();
                    let lcd_event = i64::from(self.lcd.cycles_to_interrupt());
                    let to_event = timer_event.min(lcd_event).min(budget_left).max(1);
                    let elapsed = to_event as u32;
                    if self.profiling {
                        self.cpu.hitrate[0x76] += u64::from(elapsed / 4);
                    }
                    elapsed
                }
            };

            if self.sound_enabled {
                self.sound.sync(elapsed as u16);
            }

            if self.timer.step(elapsed as u16) {
                self.interrupt_flag |= InterruptFlags::TIMER.bits();
            }

            let lcd_mask = self.lcd.step(elapsed);
            self.renderer.tick(&self.lcd, lcd_mask);
            self.interrupt_flag |= lcd_mask;

            remaining -= i64::from(elapsed);
        }

        if self.sound_enabled {
            self.sound.sync(0);
        }

        remaining
    }

    /// Records a button transition and raises the joypad interrupt on a high-to-low edge.
    pub fn button_event(&mut self, button: Button, pressed: bool) {
        if self.interaction.key_event(button, pressed) {
            self.interrupt_flag |= InterruptFlags::JOYPAD.bits();
        }
    }

    /// Drains whatever has been written out over the serial port since the last call.
    pub fn get_serial(&mut self) -> String {
        self.serial.get_serial()
    }

    pub fn breakpoints_mut(&mut self) -> &mut BreakpointList {
        &mut self.breakpoints
    }

    /// Commits battery-backed cartridge RAM to disk (if `save` is set and the cartridge
    /// has a battery) and silences sound. Mirrors the teardown order real hardware
    /// power-off would follow: stop generating audio, then persist state.
    pub fn stop(&mut self, save: bool) {
        if self.sound_enabled {
            self.sound.stop();
        }
        if save && self.cartridge.header.config.has_battery {
            if let Ok(ram) = self.cartridge.save_ram() {
                let _ = std::fs::write(self.save_ram_path(), ram.as_ref());
            }
        }
    }

    fn save_ram_path(&self) -> PathBuf {
        self.gamerom_path.with_extension("sav")
    }

    /// Loads a previously-saved external RAM image, if one exists alongside the ROM.
    pub fn load_battery_ram(&mut self) {
        if let Ok(bytes) = std::fs::read(self.save_ram_path()) {
            self.cartridge.load_ram(bytes);
        }
    }

    /// Debugger-facing read: validates the address fits the 16-bit bus before decoding it.
    pub fn read(&mut self, address: u32) -> GBResult<u8> {
        let address = u16::try_from(address).map_err(|_| GBError::BusViolation(address))?;
        Ok(self.bus().read(address))
    }

    /// Debugger-facing write: validates both the address and the byte width.
    pub fn write(&mut self, address: u32, value: u16) -> GBResult<()> {
        let address = u16::try_from(address).map_err(|_| GBError::BusViolation(address))?;
        let value = u8::try_from(value).map_err(|_| GBError::InvalidWrite(value))?;
        self.bus().write(address, value);
        Ok(())
    }

    pub fn framebuffer(&self) -> &[crate::gb::Rgba] {
        self.renderer.framebuffer()
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub(crate) fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub(crate) fn lcd(&self) -> &Lcd {
        &self.lcd
    }

    pub(crate) fn lcd_mut(&mut self) -> &mut Lcd {
        &mut self.lcd
    }

    pub(crate) fn renderer_ref(&self) -> &Renderer {
        &self.renderer
    }

    pub(crate) fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    pub(crate) fn sound_ref(&self) -> &Sound {
        &self.sound
    }

    pub(crate) fn sound_mut(&mut self) -> &mut Sound {
        &mut self.sound
    }

    pub(crate) fn timer_ref(&self) -> &Timer {
        &self.timer
    }

    pub(crate) fn timer_mut(&mut self) -> &mut Timer {
        &mut self.timer
    }

    pub(crate) fn wram_ref(&self) -> &[u8; WRAM_SIZE] {
        &self.wram
    }

    pub(crate) fn hram_ref(&self) -> &[u8; HRAM_SIZE] {
        &self.hram
    }

    /// Forces the renderer to discard its tile cache and repaint from the
    /// LCD's current state, used after a save-state load.
    pub(crate) fn rebuild_framebuffer(&mut self) {
        self.renderer.clearcache = true;
        self.renderer.render_screen(&self.lcd);
    }

    pub(crate) fn cartridge(&self) -> &Cartridge {
        &self.cartridge
    }

    pub(crate) fn bootrom_enabled(&self) -> bool {
        self.bootrom_enabled
    }

    pub(crate) fn set_bootrom_enabled(&mut self, value: bool) {
        self.bootrom_enabled = value;
    }

    pub(crate) fn interrupt_enable(&self) -> u8 {
        self.interrupt_enable
    }

    pub(crate) fn set_interrupt_enable(&mut self, value: u8) {
        self.interrupt_enable = value;
    }

    pub(crate) fn interrupt_flag(&self) -> u8 {
        self.interrupt_flag
    }

    pub(crate) fn set_interrupt_flag(&mut self, value: u8) {
        self.interrupt_flag = value;
    }

    pub(crate) fn wram_mut(&mut self) -> &mut [u8; WRAM_SIZE] {
        &mut self.wram
    }

    pub(crate) fn hram_mut(&mut self) -> &mut [u8; HRAM_SIZE] {
        &mut self.hram
    }

    pub(crate) fn cartridge_mut(&mut self) -> &mut Cartridge {
        &mut self.cartridge
    }

    pub(crate) fn sound_enabled(&self) -> bool {
        self.sound_enabled
    }

    pub fn save(&self, w: &mut dyn Write) -> GBResult<()> {
        crate::gb::save::save(self, w)
    }

    pub fn load(&mut self, r: &mut dyn Read) -> GBResult<()> {
        crate::gb::save::load(self, r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gb::DEFAULT_PALETTE;
    use std::sync::Arc;

    fn cartridge_with_rom(program: &[(usize, u8)]) -> Cartridge {
        let mut rom = vec![0u8; 0x8000];
        for &(offset, byte) in program {
            rom[offset] = byte;
        }
        let checksum = rom
            .iter()
            .enumerate()
            .fold(0u16, |sum, (i, &b)| match i as u16 {
                0x014E | 0x014F => sum,
                _ => sum.wrapping_add(u16::from(b)),
            });
        rom[0x014E] = (checksum >> 8) as u8;
        rom[0x014F] = (checksum & 0xFF) as u8;
        Cartridge::try_from(Arc::from(rom.into_boxed_slice())).unwrap()
    }

    fn blank_cartridge() -> Cartridge {
        cartridge_with_rom(&[])
    }

    fn motherboard_with_rom(program: &[(usize, u8)]) -> Motherboard {
        let config = EmulatorConfig {
            color_palette: DEFAULT_PALETTE,
            bootrom_path: None,
            breakpoints_enabled: true,
            ..EmulatorConfig::default()
        };
        Motherboard::new(cartridge_with_rom(program), &config)
    }

    fn test_motherboard() -> Motherboard {
        motherboard_with_rom(&[])
    }

    #[test]
    fn tick_zero_budget_is_a_no_op() {
        let mut mb = test_motherboard();
        assert_eq!(mb.tick(0), 0);
    }

    #[test]
    fn wram_round_trips_through_the_bus() {
        let mut mb = test_motherboard();
        mb.write(0xC010, 0x42).unwrap();
        assert_eq!(mb.read(0xC010).unwrap(), 0x42);
    }

    #[test]
    fn echo_region_mirrors_work_ram() {
        let mut mb = test_motherboard();
        mb.write(0xC010, 0x7E).unwrap();
        assert_eq!(mb.read(0xE010).unwrap(), 0x7E);
    }

    #[test]
    fn out_of_range_address_is_a_bus_violation() {
        let mut mb = test_motherboard();
        assert!(matches!(mb.read(0x1_0000), Err(GBError::BusViolation(_))));
    }

    #[test]
    fn oversized_write_value_is_rejected() {
        let mut mb = test_motherboard();
        assert!(matches!(mb.write(0xC000, 0x100), Err(GBError::InvalidWrite(_))));
    }

    #[test]
    fn dma_copies_one_sixty_bytes_into_oam() {
        let mut mb = test_motherboard();
        mb.write(0xC000, 0xAB).unwrap();
        mb.write(PPU_DMA as u32, 0xC0).unwrap();
        assert_eq!(mb.read(0xFE00).unwrap(), 0xAB);
    }

    #[test]
    fn tac_write_through_the_bus_masks_to_low_three_bits() {
        let mut mb = test_motherboard();
        mb.write(TIMER_CTRL as u32, 0xFF).unwrap();
        assert_eq!(mb.read(TIMER_CTRL as u32).unwrap() & 0b1111_1000, 0);
    }

    #[test]
    fn button_press_while_row_selected_raises_joypad_interrupt() {
        let mut mb = test_motherboard();
        mb.write(JOYPAD as u32, 0b0010_0000).unwrap(); // select dpad row
        mb.button_event(Button::Up, true);
        assert_ne!(mb.interrupt_flag & InterruptFlags::JOYPAD.bits(), 0);
    }

    #[test]
    fn breakpoint_at_default_vector_halts_tick_with_a_positive_remainder() {
        // JP 0x0040, landing exactly on one of the pre-populated breakpoints.
        let mut mb = motherboard_with_rom(&[(0, 0xC3), (1, 0x40), (2, 0x00)]);
        let remaining = mb.tick(1_000_000);
        assert_eq!(mb.cpu.pc, 0x0040);
        assert!(remaining > 0);
    }

    #[test]
    fn save_load_round_trips_cpu_program_counter() {
        let mut mb = test_motherboard();
        mb.bootrom_enabled = false;
        mb.cpu.pc = 0x1234;
        let mut buf = Vec::new();
        mb.save(&mut buf).unwrap();

        let mut loaded = test_motherboard();
        loaded.load(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded.cpu.pc, 0x1234);
    }
}
