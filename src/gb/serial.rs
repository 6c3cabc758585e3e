//! Serial transfer data/control registers (0xFF01/0xFF02).
//!
//! Link-cable transfer timing and a peer device are out of scope; a
//! transfer request against the internal clock completes immediately and
//! the byte is appended to an internal buffer instead of shifted out.

use bitflags::bitflags;

bitflags! {
    #[derive(Copy, Clone, Default, Debug)]
    pub struct Control: u8 {
        /// 0 = external clock, 1 = internal clock.
        const CLOCK_SELECT = 0b0000_0001;
        /// CGB-only double-speed serial clock; kept for bit-accuracy, unused.
        const CLOCK_SPEED = 0b0000_0010;
        /// Set while a transfer is requested or in progress.
        const TRANSFER_ENABLE = 0b1000_0000;
    }
}

/// Buffers bytes written out over the serial port so a host can retrieve
/// them with [`Serial::get_serial`].
#[derive(Clone, Default, Debug)]
pub struct Serial {
    control: Control,
    data: u8,
    buffer: String,
}

impl Serial {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn read_data(&self) -> u8 {
        self.data
    }

    pub fn write_data(&mut self, value: u8) {
        self.data = value;
    }

    pub fn read_ctrl(&self) -> u8 {
        // Undocumented bits read back as 1.
        self.control.bits() | 0b0111_1110
    }

    pub fn write_ctrl(&mut self, value: u8) {
        self.control = Control::from_bits_truncate(value);
        if self.control.contains(Control::TRANSFER_ENABLE)
            && self.control.contains(Control::CLOCK_SELECT)
        {
            self.buffer.push(self.data as char);
            self.control.remove(Control::TRANSFER_ENABLE);
        }
    }

    /// Drains and returns everything transferred since the last call.
    pub fn get_serial(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_clock_transfer_buffers_byte_and_clears_enable() {
        let mut serial = Serial::new();
        serial.write_data(b'H');
        serial.write_ctrl(0b1000_0001); // transfer enable + internal clock
        assert_eq!(serial.get_serial(), "H");
        assert_eq!(serial.read_ctrl() & 0b1000_0000, 0);
    }

    #[test]
    fn external_clock_transfer_does_not_complete() {
        let mut serial = Serial::new();
        serial.write_data(b'X');
        serial.write_ctrl(0b1000_0000); // transfer enable, external clock
        assert_eq!(serial.get_serial(), "");
    }

    #[test]
    fn get_serial_drains_buffer() {
        let mut serial = Serial::new();
        serial.write_data(b'A');
        serial.write_ctrl(0b1000_0001);
        serial.write_data(b'B');
        serial.write_ctrl(0b1000_0001);
        assert_eq!(serial.get_serial(), "AB");
        assert_eq!(serial.get_serial(), "");
    }
}
