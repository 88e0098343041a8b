//! ARM7TDMI operating modes.
//!
//! The mode lives in bits 0-4 of the CPSR and selects which banked registers
//! are visible (see [`register_bank`](super::register_bank)). Exception entry
//! switches mode automatically:
//!
//! | Exception          | Mode       | Vector     |
//! |--------------------|------------|------------|
//! | Reset              | Supervisor | 0x00000000 |
//! | Undefined          | Undefined  | 0x00000004 |
//! | Software Interrupt | Supervisor | 0x00000008 |
//! | Prefetch Abort     | Abort      | 0x0000000C |
//! | Data Abort         | Abort      | 0x00000010 |
//! | IRQ                | IRQ        | 0x00000018 |
//! | FIQ                | FIQ        | 0x0000001C |
//!
//! On the GBA games run in System/User mode, SWI handlers in Supervisor and
//! interrupt handlers in IRQ mode. FIQ has no hardware source.

use serde::{Deserialize, Serialize};

/// The CPU operating mode. Only these seven bit patterns are valid; any
/// other value written to the CPSR mode field is masked back to a valid
/// mode by the PSR accessors.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Mode {
    /// Normal program execution, unprivileged.
    User = 0b10000,

    /// Fast interrupt mode. Banks R8-R14. Unused on the GBA.
    Fiq = 0b10001,

    /// Interrupt mode. Entered for VBlank/HBlank/timer/DMA/keypad IRQs.
    Irq = 0b10010,

    /// Privileged mode for Reset and SWI (BIOS calls).
    Supervisor = 0b10011,

    /// Entered after a data or prefetch abort.
    Abort = 0b10111,

    /// Entered on an undefined instruction.
    Undefined = 0b11011,

    /// Privileged mode sharing the User register bank.
    System = 0b11111,
}

impl From<Mode> for u32 {
    fn from(m: Mode) -> Self {
        m as Self
    }
}

impl TryFrom<u32> for Mode {
    type Error = u32;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        match n {
            0b10000 => Ok(Self::User),
            0b10001 => Ok(Self::Fiq),
            0b10010 => Ok(Self::Irq),
            0b10011 => Ok(Self::Supervisor),
            0b10111 => Ok(Self::Abort),
            0b11011 => Ok(Self::Undefined),
            0b11111 => Ok(Self::System),
            _ => Err(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        for mode in [
            Mode::User,
            Mode::Fiq,
            Mode::Irq,
            Mode::Supervisor,
            Mode::Abort,
            Mode::Undefined,
            Mode::System,
        ] {
            assert_eq!(Mode::try_from(mode as u32), Ok(mode));
        }
    }

    #[test]
    fn invalid_bits_rejected() {
        assert_eq!(Mode::try_from(0), Err(0));
        assert_eq!(Mode::try_from(0b00011), Err(0b00011));
    }
}
