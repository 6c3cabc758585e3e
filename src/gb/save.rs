//! Save-state byte format.
//!
//! The stream is a fixed sequence of fields: version, boot-ROM flag, CPU,
//! LCD, an optional sound block, renderer, RAM, timer, cartridge RAM. `load`
//! branches on the version byte to stay compatible with every layout this
//! format has shipped; `save` always writes the current one. New fields are
//! appended, never inserted, so old saves keep decoding correctly.

use crate::gb::motherboard::Motherboard;
use crate::gb::{GBError, GBResult};
use std::io::{Read, Write};

/// Bumped whenever the on-disk layout gains a field. Versions below 2 predate
/// an explicit version byte entirely (see `load`); versions below 5 predate
/// the timer block; versions below 6 predate the sound block.
const STATE_VERSION: u8 = 6;

pub fn save(mb: &Motherboard, w: &mut dyn Write) -> GBResult<()> {
    w.write_all(&[STATE_VERSION, mb.bootrom_enabled() as u8])?;

    mb.cpu().save(w)?;
    w.write_all(&[mb.interrupt_flag(), mb.interrupt_enable()])?;

    mb.lcd().save(w)?;
    if mb.sound_enabled() {
        mb.sound_ref().save(w)?;
    }
    mb.renderer_ref().save(w)?;

    w.write_all(mb.wram_ref())?;
    w.write_all(mb.hram_ref())?;

    mb.timer_ref().save(w)?;

    let ram = mb.cartridge().save_ram()?;
    w.write_all(&(ram.len() as u32).to_le_bytes())?;
    w.write_all(&ram)?;
    Ok(())
}

pub fn load(mb: &mut Motherboard, r: &mut dyn Read) -> GBResult<()> {
    let mut marker = [0u8; 1];
    r.read_exact(&mut marker)?;
    let (version, bootrom_enabled) = if marker[0] < 2 {
        (u32::from(marker[0]), marker[0] != 0)
    } else {
        let mut flag = [0u8; 1];
        r.read_exact(&mut flag)?;
        (u32::from(marker[0]), flag[0] != 0)
    };
    if version > u32::from(STATE_VERSION) {
        return Err(GBError::StateVersionMismatch(version));
    }
    mb.set_bootrom_enabled(bootrom_enabled);

    mb.cpu_mut().load(r)?;
    let mut interrupts = [0u8; 2];
    if version >= 5 {
        r.read_exact(&mut interrupts)?;
    } else {
        r.read_exact(&mut interrupts[..1])?;
    }
    mb.set_interrupt_flag(interrupts[0]);
    if version >= 5 {
        mb.set_interrupt_enable(interrupts[1]);
    }

    mb.lcd_mut().load(r)?;
    if version >= 6 && mb.sound_enabled() {
        mb.sound_mut().load(r)?;
    }
    if version >= 2 {
        mb.renderer_mut().load(r)?;
    }

    r.read_exact(mb.wram_mut())?;
    r.read_exact(mb.hram_mut())?;

    if version < 5 {
        let mut ie = [0u8; 1];
        r.read_exact(&mut ie)?;
        mb.set_interrupt_enable(ie[0]);
    } else {
        mb.timer_mut().load(r)?;
    }

    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let mut ram = vec![0u8; u32::from_le_bytes(len_buf) as usize];
    r.read_exact(&mut ram)?;
    mb.cartridge_mut().load_ram(ram);

    mb.rebuild_framebuffer();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gb::EmulatorConfig;
    use crate::gb::cartridge::Cartridge;
    use std::sync::Arc;

    fn blank_cartridge() -> Cartridge {
        let mut rom = vec![0u8; 0x8000];
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

    #[test]
    fn round_trips_cpu_and_ram_state() {
        let mut mb = Motherboard::new(blank_cartridge(), &EmulatorConfig::default());
        mb.cpu_mut().pc = 0xBEEF;
        mb.write(0xC123, 0x42).unwrap();

        let mut buf = Vec::new();
        save(&mb, &mut buf).unwrap();

        let mut loaded = Motherboard::new(blank_cartridge(), &EmulatorConfig::default());
        load(&mut loaded, &mut buf.as_slice()).unwrap();

        assert_eq!(loaded.cpu().pc, 0xBEEF);
        assert_eq!(loaded.read(0xC123).unwrap(), 0x42);
    }

    #[test]
    fn rejects_a_version_newer_than_this_build_understands() {
        let mut loaded = Motherboard::new(blank_cartridge(), &EmulatorConfig::default());
        let mut stream = vec![STATE_VERSION + 1, 0];
        stream.resize(64, 0);
        assert!(matches!(
            load(&mut loaded, &mut stream.as_slice()),
            Err(GBError::StateVersionMismatch(_))
        ));
    }

    #[test]
    fn legacy_v0_stream_reads_the_first_byte_as_both_version_and_bootrom_flag() {
        // v0 layout: bootrom flag, CPU (10 bytes), IF, LCD, renderer absent,
        // RAM, IE trailer, cartridge RAM length + bytes. No timer, no sound.
        let mut mb = Motherboard::new(blank_cartridge(), &EmulatorConfig::default());
        let mut buf = Vec::new();
        buf.push(1u8); // bootrom flag doubling as version 1
        mb.cpu().save(&mut buf).unwrap();
        buf.push(0); // IF
        mb.lcd().save(&mut buf).unwrap();
        buf.extend_from_slice(mb.wram_ref());
        buf.extend_from_slice(mb.hram_ref());
        buf.push(0x1F); // trailing IE byte
        buf.extend_from_slice(&0u32.to_le_bytes()); // empty cartridge RAM

        let mut loaded = Motherboard::new(blank_cartridge(), &EmulatorConfig::default());
        load(&mut loaded, &mut buf.as_slice()).unwrap();
        assert!(loaded.bootrom_enabled());
        assert_eq!(loaded.interrupt_enable(), 0x1F);
    }
}
