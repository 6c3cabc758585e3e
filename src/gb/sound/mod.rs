//! The APU register file (0xFF10-0xFF3F).
//!
//! Actual audio synthesis is out of scope; this module's job is to keep the
//! register file addressable and consistent with real hardware read masks,
//! and to honor the master sound-disable switch a host can set through
//! [`EmulatorConfig::sound_enabled`](crate::gb::EmulatorConfig).

use crate::gb::constants::{AUDIO_REGISTERS_SIZE, AUDIO_REGISTERS_START};

pub const NR10_SWEEP: u16 = 0xFF10;
pub const NR11_LENGTH_DUTY: u16 = 0xFF11;
pub const NR12_VOLUME: u16 = 0xFF12;
pub const NR13_PERIOD_LOW: u16 = 0xFF13;
pub const NR14_PERIOD_HIGH: u16 = 0xFF14;
pub const NR21_LENGTH_DUTY: u16 = 0xFF16;
pub const NR22_VOLUME: u16 = 0xFF17;
pub const NR23_PERIOD_LOW: u16 = 0xFF18;
pub const NR24_PERIOD_HIGH: u16 = 0xFF19;
pub const NR30_DAC_ENABLE: u16 = 0xFF1A;
pub const NR31_LENGTH: u16 = 0xFF1B;
pub const NR32_VOLUME: u16 = 0xFF1C;
pub const NR33_PERIOD_LOW: u16 = 0xFF1D;
pub const NR34_PERIOD_HIGH: u16 = 0xFF1E;
pub const NR41_LENGTH: u16 = 0xFF20;
pub const NR42_VOLUME: u16 = 0xFF21;
pub const NR43_FREQ: u16 = 0xFF22;
pub const NR44_CONTROL: u16 = 0xFF23;
pub const NR50_MASTER_VOLUME: u16 = 0xFF24;
pub const NR51_PANNING: u16 = 0xFF25;
pub const NR52_MASTER_CONTROL: u16 = 0xFF26;
pub const WAVE_PATTERN_START: u16 = 0xFF30;
pub const WAVE_PATTERN_END: u16 = 0xFF3F;

/// Bits that read back as 1 regardless of what was last written, by
/// register offset from [`AUDIO_REGISTERS_START`].
fn undocumented_read_mask(address: u16) -> u8 {
    match address {
        NR10_SWEEP => 0b1000_0000,
        0xFF15 => 0xFF,
        NR30_DAC_ENABLE => 0b0111_1111,
        NR32_VOLUME => 0b1001_1111,
        0xFF1F => 0xFF,
        NR41_LENGTH => 0b1100_0000,
        NR44_CONTROL => 0b0011_1111,
        NR52_MASTER_CONTROL => 0b0111_1111,
        0xFF27..=0xFF2F => 0xFF,
        _ => 0,
    }
}

/// The APU's register file plus a running clock used by a future mixer;
/// synthesis itself is not implemented.
#[derive(Clone)]
pub struct Sound {
    registers: [u8; AUDIO_REGISTERS_SIZE],
    clock: u64,
    enabled: bool,
}

impl Sound {
    pub fn new(enabled: bool) -> Self {
        Self {
            registers: [0; AUDIO_REGISTERS_SIZE],
            clock: 0,
            enabled,
        }
    }

    /// Advances the APU's internal clock. A no-op beyond bookkeeping since
    /// no synthesis is performed.
    pub fn sync(&mut self, cycles: u16) {
        self.clock += u64::from(cycles);
    }

    /// Silences all channels and clears the register file, as NR52 does on
    /// real hardware when the master switch is turned off.
    pub fn stop(&mut self) {
        self.registers = [0; AUDIO_REGISTERS_SIZE];
    }

    pub fn get(&self, address: u16) -> u8 {
        if !self.enabled {
            return 0;
        }
        let offset = (address - AUDIO_REGISTERS_START) as usize;
        self.registers[offset] | undocumented_read_mask(address)
    }

    pub fn set(&mut self, address: u16, value: u8) {
        if !self.enabled {
            return;
        }
        let offset = (address - AUDIO_REGISTERS_START) as usize;
        self.registers[offset] = value;
        if address == NR52_MASTER_CONTROL && value & 0b1000_0000 == 0 {
            self.stop();
        }
    }

    pub fn save(&self, w: &mut dyn std::io::Write) -> std::io::Result<()> {
        w.write_all(&self.registers)
    }

    pub fn load(&mut self, r: &mut dyn std::io::Read) -> std::io::Result<()> {
        r.read_exact(&mut self.registers)
    }
}
