//! The joypad matrix at 0xFF00.

use crate::utils;

/// The eight physical buttons, arranged as a 2x4 matrix the game selects
/// a row of via bits 4-5 of the register.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Button {
    Right,
    Left,
    Up,
    Down,
    A,
    B,
    Select,
    Start,
}

#[derive(Copy, Clone, Default, Debug)]
struct ButtonState {
    right: bool,
    left: bool,
    up: bool,
    down: bool,
    a: bool,
    b: bool,
    select: bool,
    start: bool,
}

impl ButtonState {
    fn set(&mut self, button: Button, pressed: bool) {
        match button {
            Button::Right => self.right = pressed,
            Button::Left => self.left = pressed,
            Button::Up => self.up = pressed,
            Button::Down => self.down = pressed,
            Button::A => self.a = pressed,
            Button::B => self.b = pressed,
            Button::Select => self.select = pressed,
            Button::Start => self.start = pressed,
        }
    }
}

/// Tracks held buttons and produces the register byte the CPU reads at
/// 0xFF00. A button is "pressed" when its bit reads 0, not 1.
#[derive(Clone, Default, Debug)]
pub struct Interaction {
    state: ButtonState,
    select_dpad: bool,
    select_action: bool,
}

impl Interaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a physical key transition. Returns `true` if this is a
    /// high-to-low transition that should raise the joypad interrupt, i.e.
    /// the button just went down while its row is currently selected.
    pub fn key_event(&mut self, button: Button, pressed: bool) -> bool {
        let was_pressed = self.is_pressed(button);
        self.state.set(button, pressed);
        let row_selected = matches!(
            (button, self.select_dpad, self.select_action),
            (Button::Right | Button::Left | Button::Up | Button::Down, true, _)
                | (Button::A | Button::B | Button::Select | Button::Start, _, true)
        );
        pressed && !was_pressed && row_selected
    }

    fn is_pressed(&self, button: Button) -> bool {
        match button {
            Button::Right => self.state.right,
            Button::Left => self.state.left,
            Button::Up => self.state.up,
            Button::Down => self.state.down,
            Button::A => self.state.a,
            Button::B => self.state.b,
            Button::Select => self.state.select,
            Button::Start => self.state.start,
        }
    }

    /// Latches the row-select bits (4-5) written by the game and returns the
    /// resulting register byte, which the bus mirrors into I/O so reads see
    /// the value as of the last select write rather than a live recompute.
    pub fn pull(&mut self, select_byte: u8) -> u8 {
        self.select_dpad = !utils::bit_at(select_byte, 4);
        self.select_action = !utils::bit_at(select_byte, 5);
        self.effective_byte()
    }

    /// The register value for the currently selected row(s), independent of
    /// any particular select write. Used by tests that probe state directly.
    fn effective_byte(&self) -> u8 {
        let mut value = 0b1100_0000;
        value = utils::set_bit(value, 4, !self.select_dpad);
        value = utils::set_bit(value, 5, !self.select_action);

        let (bit0, bit1, bit2, bit3) = if self.select_dpad {
            (self.state.right, self.state.left, self.state.up, self.state.down)
        } else if self.select_action {
            (self.state.a, self.state.b, self.state.select, self.state.start)
        } else {
            (false, false, false, false)
        };
        value = utils::set_bit(value, 0, !bit0);
        value = utils::set_bit(value, 1, !bit1);
        value = utils::set_bit(value, 2, !bit2);
        value = utils::set_bit(value, 3, !bit3);
        value
    }
}
