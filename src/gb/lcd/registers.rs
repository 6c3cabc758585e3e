//! LCDC/STAT bit layouts and the PPU's four-mode state machine.

use bitflags::bitflags;

bitflags! {
    /// PPU_LCDC at 0xFF40.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct LCDControl: u8 {
        const BG_EN    = 0b0000_0001;
        const OBJ_EN   = 0b0000_0010;
        const OBJ_SIZE = 0b0000_0100;
        const BG_MAP   = 0b0000_1000;
        const TILE_SEL = 0b0001_0000;
        const WIN_EN   = 0b0010_0000;
        const WIN_MAP  = 0b0100_0000;
        const LCD_EN   = 0b1000_0000;
    }

    /// PPU_STAT at 0xFF41. The low two bits are the current mode and are
    /// not part of the flag set proper; see [`LCDState::mode`].
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct LCDState: u8 {
        const LYC_STAT    = 0b0000_0100;
        const H_BLANK_INT = 0b0000_1000;
        const V_BLANK_INT = 0b0001_0000;
        const OAM_INT     = 0b0010_0000;
        const LY_INT      = 0b0100_0000;
    }
}

impl LCDControl {
    /// Window tilemap: 0x9C00 when [`LCDControl::WIN_MAP`] is set, else 0x9800.
    #[inline]
    pub const fn window_tile_map_area(&self) -> u16 {
        if self.contains(LCDControl::WIN_MAP) { 0x9C00 } else { 0x9800 }
    }

    /// Background tilemap: 0x9C00 when [`LCDControl::BG_MAP`] is set, else 0x9800.
    #[inline]
    pub const fn bg_tile_map_area(&self) -> u16 {
        if self.contains(LCDControl::BG_MAP) { 0x9C00 } else { 0x9800 }
    }

    /// Tile data base address. Unsigned indexing from 0x8000 when
    /// [`LCDControl::TILE_SEL`] is set, otherwise signed indexing from 0x9000.
    #[inline]
    pub fn tile_data_addr(&self, tile_index: u8) -> u16 {
        if self.contains(LCDControl::TILE_SEL) {
            0x8000 + u16::from(tile_index) * 16
        } else {
            (0x9000_i32 + i32::from(tile_index as i8) * 16) as u16
        }
    }

    #[inline]
    pub const fn obj_height(&self) -> u8 {
        if self.contains(LCDControl::OBJ_SIZE) { 16 } else { 8 }
    }
}

/// The PPU's four raster modes, encoded in the low two bits of PPU_STAT.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum PPUMode {
    HBlank = 0b00,
    VBlank = 0b01,
    OAMScan = 0b10,
    PixelTransfer = 0b11,
}

impl PPUMode {
    #[inline]
    pub const fn cycles(self) -> u32 {
        match self {
            PPUMode::OAMScan => OAM_SCAN_CYCLES,
            PPUMode::PixelTransfer => PIXEL_TRANSFER_CYCLES,
            PPUMode::HBlank => HBLANK_CYCLES,
            PPUMode::VBlank => SCANLINE_CYCLES,
        }
    }
}

impl From<u8> for PPUMode {
    #[inline]
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0b00 => PPUMode::HBlank,
            0b01 => PPUMode::VBlank,
            0b10 => PPUMode::OAMScan,
            _ => PPUMode::PixelTransfer,
        }
    }
}

pub const OAM_SCAN_CYCLES: u32 = 80;
pub const PIXEL_TRANSFER_CYCLES: u32 = 172;
pub const HBLANK_CYCLES: u32 = 204;
pub const SCANLINE_CYCLES: u32 = OAM_SCAN_CYCLES + PIXEL_TRANSFER_CYCLES + HBLANK_CYCLES;
pub const VBLANK_LINE_COUNT: u8 = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_map_area_follows_lcdc_bits() {
        let mut ctrl = LCDControl::empty();
        assert_eq!(ctrl.bg_tile_map_area(), 0x9800);
        ctrl.insert(LCDControl::BG_MAP);
        assert_eq!(ctrl.bg_tile_map_area(), 0x9C00);
    }

    #[test]
    fn tile_data_addressing_is_signed_below_tile_sel() {
        let ctrl = LCDControl::empty();
        assert_eq!(ctrl.tile_data_addr(0), 0x9000);
        assert_eq!(ctrl.tile_data_addr(0x80), 0x8800);
    }

    #[test]
    fn tile_data_addressing_is_unsigned_with_tile_sel() {
        let ctrl = LCDControl::TILE_SEL;
        assert_eq!(ctrl.tile_data_addr(0), 0x8000);
        assert_eq!(ctrl.tile_data_addr(0x80), 0x8800);
    }

    #[test]
    fn mode_decodes_from_low_two_bits() {
        assert_eq!(PPUMode::from(0b10), PPUMode::OAMScan);
        assert_eq!(PPUMode::from(0b11), PPUMode::PixelTransfer);
    }
}
