//! Breakpoint bank/PC matching.
//!
//! A breakpoint is a `(bank, pc)` pair. `bank` disambiguates which memory
//! window `pc` currently refers to, since the same 16-bit address means a
//! different physical byte depending on which ROM/RAM bank is switched in.

/// Sentinel bank value meaning "the boot ROM", used only for addresses
/// below 0x0100 while the boot ROM shadow is still active.
pub const BOOT_ROM_BANK: i32 = -1;

/// Pre-populated at construction with the three interrupt service entry
/// points a debugger session would almost always want to stop at.
const DEFAULT_BREAKPOINTS: [(i32, u16); 3] = [(0, 0x0040), (0, 0x0048), (0, 0x0050)];

#[derive(Clone, Debug, Default)]
pub struct BreakpointList {
    entries: Vec<(i32, u16)>,
}

impl BreakpointList {
    pub fn new() -> Self {
        Self { entries: DEFAULT_BREAKPOINTS.to_vec() }
    }

    pub fn add(&mut self, bank: i32, pc: u16) {
        self.entries.push((bank, pc));
    }

    pub fn remove(&mut self, index: usize) {
        if index < self.entries.len() {
            self.entries.remove(index);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(i32, u16)> {
        self.entries.iter()
    }

    /// Whether `pc`, executing under the given bank/boot-ROM context,
    /// matches any registered breakpoint.
    pub fn matches(&self, pc: u16, bootrom_enabled: bool, rom_bank: u16, ram_bank: i32) -> bool {
        self.entries.iter().any(|&(bank, bp_pc)| {
            if bp_pc != pc {
                return false;
            }
            if pc < 0x4000 {
                (bank == 0 && !bootrom_enabled) || (bank == BOOT_ROM_BANK && bootrom_enabled && pc < 0x0100)
            } else if (0x4000..0x8000).contains(&pc) {
                bank == i32::from(rom_bank)
            } else if (0xA000..0xC000).contains(&pc) {
                bank == ram_bank
            } else {
                false
            }
        })
    }

    pub fn save(&self, w: &mut dyn std::io::Write) -> std::io::Result<()> {
        w.write_all(&(self.entries.len() as u32).to_le_bytes())?;
        for &(bank, pc) in &self.entries {
            w.write_all(&bank.to_le_bytes())?;
            w.write_all(&pc.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn load(&mut self, r: &mut dyn std::io::Read) -> std::io::Result<()> {
        let mut count_buf = [0u8; 4];
        r.read_exact(&mut count_buf)?;
        let count = u32::from_le_bytes(count_buf);
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut bank_buf = [0u8; 4];
            let mut pc_buf = [0u8; 2];
            r.read_exact(&mut bank_buf)?;
            r.read_exact(&mut pc_buf)?;
            entries.push((i32::from_le_bytes(bank_buf), u16::from_le_bytes(pc_buf)));
        }
        self.entries = entries;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_vectors_are_pre_populated() {
        let breakpoints = BreakpointList::new();
        assert!(breakpoints.matches(0x0040, false, 0, -1));
        assert!(breakpoints.matches(0x0048, false, 0, -1));
        assert!(breakpoints.matches(0x0050, false, 0, -1));
    }

    #[test]
    fn low_rom_breakpoint_requires_bootrom_disabled() {
        let mut breakpoints = BreakpointList::new();
        breakpoints.add(0, 0x0010);
        assert!(breakpoints.matches(0x0010, false, 0, -1));
        assert!(!breakpoints.matches(0x0010, true, 0, -1));
    }

    #[test]
    fn bootrom_sentinel_only_matches_below_0x100_while_enabled() {
        let mut breakpoints = BreakpointList::new();
        breakpoints.add(BOOT_ROM_BANK, 0x0050);
        // 0x0050 is already a default breakpoint at bank 0, so pick an address
        // that is only reachable through the boot-ROM sentinel.
        breakpoints.add(BOOT_ROM_BANK, 0x0020);
        assert!(breakpoints.matches(0x0020, true, 0, -1));
        assert!(!breakpoints.matches(0x0020, false, 0, -1));
    }

    #[test]
    fn switchable_bank_breakpoint_matches_the_selected_bank() {
        let mut breakpoints = BreakpointList::new();
        breakpoints.add(3, 0x4100);
        assert!(breakpoints.matches(0x4100, false, 3, -1));
        assert!(!breakpoints.matches(0x4100, false, 4, -1));
    }

    #[test]
    fn cram_breakpoint_matches_the_selected_ram_bank() {
        let mut breakpoints = BreakpointList::new();
        breakpoints.add(1, 0xA050);
        assert!(breakpoints.matches(0xA050, false, 0, 1));
        assert!(!breakpoints.matches(0xA050, false, 0, 0));
    }

    #[test]
    fn remove_deletes_by_list_position() {
        let mut breakpoints = BreakpointList::new();
        breakpoints.remove(0);
        assert!(!breakpoints.matches(0x0040, false, 0, -1));
    }

    #[test]
    fn save_load_round_trips_entries() {
        let mut breakpoints = BreakpointList::new();
        breakpoints.add(2, 0x4500);
        let mut buf = Vec::new();
        breakpoints.save(&mut buf).unwrap();
        let mut loaded = BreakpointList::default();
        loaded.load(&mut buf.as_slice()).unwrap();
        assert!(loaded.matches(0x4500, false, 2, -1));
    }
}
