//! Program Status Registers (CPSR and SPSR).
//!
//! ```text
//! 31 30 29 28 27      8 7 6 5 4   0
//! ┌──┬──┬──┬──┬────────┬─┬─┬─┬─────┐
//! │N │Z │C │V │Reserved│I│F│T│Mode │
//! └──┴──┴──┴──┴────────┴─┴─┴─┴─────┘
//! ```
//!
//! The T bit (bit 5) is the single source of truth for the active
//! instruction set; the interpreter derives its ARM/Thumb dispatch from it
//! on every step. Each privileged mode has an SPSR holding the CPSR
//! snapshot taken at exception entry.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::alu::ArithmeticOpResult;
use crate::cpu::{condition::Condition, cpu_modes::Mode};

/// Program Status Register (CPSR or SPSR). Wraps the raw `u32` and provides
/// typed accessors for the flag, control and mode fields.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Psr(u32);

impl Psr {
    pub(crate) fn can_execute(self, cond: Condition) -> bool {
        use Condition::{AL, CC, CS, EQ, GE, GT, HI, LE, LS, LT, MI, NE, NV, PL, VC, VS};
        match cond {
            EQ => self.zero_flag(),
            NE => !self.zero_flag(),
            CS => self.carry_flag(),
            CC => !self.carry_flag(),
            MI => self.sign_flag(),
            PL => !self.sign_flag(),
            VS => self.overflow_flag(),
            VC => !self.overflow_flag(),
            HI => self.carry_flag() && !self.zero_flag(),
            LS => !self.carry_flag() || self.zero_flag(),
            GE => self.sign_flag() == self.overflow_flag(),
            LT => self.sign_flag() != self.overflow_flag(),
            GT => !self.zero_flag() && (self.sign_flag() == self.overflow_flag()),
            LE => self.zero_flag() || (self.sign_flag() != self.overflow_flag()),
            AL => true,
            NV => false,
        }
    }

    /// N, bit 31.
    #[must_use]
    pub fn sign_flag(self) -> bool {
        self.0.get_bit(31)
    }

    /// Z, bit 30.
    #[must_use]
    pub fn zero_flag(self) -> bool {
        self.0.get_bit(30)
    }

    /// C, bit 29. Set means carry / no borrow.
    #[must_use]
    pub fn carry_flag(self) -> bool {
        self.0.get_bit(29)
    }

    /// V, bit 28.
    #[must_use]
    pub fn overflow_flag(self) -> bool {
        self.0.get_bit(28)
    }

    /// I, bit 7. Set means IRQs disabled.
    #[must_use]
    pub fn irq_disable(self) -> bool {
        self.0.get_bit(7)
    }

    /// F, bit 6. Set means FIQs disabled.
    #[must_use]
    pub fn fiq_disable(self) -> bool {
        self.0.get_bit(6)
    }

    /// T, bit 5. Set means Thumb state.
    #[must_use]
    pub fn state_bit(self) -> bool {
        self.0.get_bit(5)
    }

    /// Mode bits 0-4. Invalid bit patterns are reported as Supervisor; the
    /// BIOS HLE occasionally leaves zeroed SPSRs behind and a panic here
    /// would be fatal to an otherwise healthy ROM.
    #[must_use]
    pub fn mode(self) -> Mode {
        let mode_bits = self.0 & 0b11111;
        Mode::try_from(mode_bits).unwrap_or_else(|bits| {
            tracing::debug!("invalid mode bits {bits:05b} in PSR {:08X}", self.0);
            Mode::Supervisor
        })
    }

    pub fn set_sign_flag(&mut self, value: bool) {
        self.0.set_bit(31, value);
    }

    pub fn set_zero_flag(&mut self, value: bool) {
        self.0.set_bit(30, value);
    }

    pub fn set_carry_flag(&mut self, value: bool) {
        self.0.set_bit(29, value);
    }

    pub fn set_overflow_flag(&mut self, value: bool) {
        self.0.set_bit(28, value);
    }

    pub fn set_flags(&mut self, op_result: ArithmeticOpResult) {
        self.set_sign_flag(op_result.sign);
        self.set_zero_flag(op_result.zero);
        self.set_carry_flag(op_result.carry);
        self.set_overflow_flag(op_result.overflow);
    }

    pub fn set_irq_disable(&mut self, value: bool) {
        self.0.set_bit(7, value);
    }

    pub fn set_fiq_disable(&mut self, value: bool) {
        self.0.set_bit(6, value);
    }

    /// Flip the T bit. Takes effect on the next fetch.
    pub fn set_state_bit(&mut self, value: bool) {
        self.0.set_bit(5, value);
    }

    /// Set the mode field. Invariant P2: callers go through [`Mode`], so the
    /// field always holds one of the seven valid patterns.
    pub fn set_mode(&mut self, m: Mode) {
        self.0 = (self.0 & !0b11111) | m as u32;
    }

    #[must_use]
    pub fn cpu_state(self) -> CpuState {
        self.state_bit().into()
    }

    pub fn set_cpu_state(&mut self, state: CpuState) {
        self.set_state_bit(state.into());
    }
}

impl From<Mode> for Psr {
    fn from(m: Mode) -> Self {
        Self(m as u32)
    }
}

impl From<u32> for Psr {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<Psr> for u32 {
    fn from(p: Psr) -> Self {
        p.0
    }
}

/// The CPU execution state (ARM or Thumb), derived from the CPSR T bit.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CpuState {
    /// 16-bit instructions.
    Thumb,
    /// 32-bit instructions.
    Arm,
}

impl From<CpuState> for bool {
    fn from(state: CpuState) -> Self {
        match state {
            CpuState::Arm => false,
            CpuState::Thumb => true,
        }
    }
}

impl From<bool> for CpuState {
    fn from(state: bool) -> Self {
        if state {
            Self::Thumb
        } else {
            Self::Arm
        }
    }
}
