use serde::{Deserialize, Serialize};

/// Button bit positions shared by the host-facing mask and KEYINPUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GbaButton {
    A = 1 << 0,
    B = 1 << 1,
    Select = 1 << 2,
    Start = 1 << 3,
    Right = 1 << 4,
    Left = 1 << 5,
    Up = 1 << 6,
    Down = 1 << 7,
    R = 1 << 8,
    L = 1 << 9,
}

#[derive(Serialize, Deserialize)]
pub struct Keypad {
    /// KEYINPUT, 0x04000130. Active low: 0 means pressed. Read-only for
    /// the CPU; produced from the host button mask every frame.
    pub key_input: u16,
    /// KEYCNT, 0x04000132.
    pub key_interrupt_control: u16,
}

impl Default for Keypad {
    fn default() -> Self {
        Self {
            // All ten buttons released.
            key_input: 0x03FF,
            key_interrupt_control: 0,
        }
    }
}

impl Keypad {
    /// Latch the host button mask (bit set = pressed) into the active-low
    /// register.
    pub fn set_buttons(&mut self, mask: u16) {
        self.key_input = !mask & 0x03FF;
    }

    /// Evaluates the KEYCNT interrupt condition against the current state.
    /// Bit 14 enables the interrupt; bit 15 picks AND (all selected keys
    /// down) over OR (any selected key down).
    #[must_use]
    pub fn irq_requested(&self) -> bool {
        let keycnt = self.key_interrupt_control;
        if keycnt & 0x4000 == 0 {
            return false;
        }

        let selected = keycnt & 0x03FF;
        let pressed = !self.key_input & 0x03FF;
        if keycnt & 0x8000 != 0 {
            selected != 0 && pressed & selected == selected
        } else {
            pressed & selected != 0
        }
    }
}
