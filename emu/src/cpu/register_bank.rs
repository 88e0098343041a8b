//! Banked register storage for the exception modes.
//!
//! R0-R7 and R15 are never banked. FIQ banks R8-R14 (the `_old` fields hold
//! the non-FIQ copies while FIQ is active); every other exception mode banks
//! R13-R14 only. Each exception mode also owns an SPSR that captures the
//! CPSR at exception entry. [`Arm7tdmi::swap_mode`](super::arm7tdmi::Arm7tdmi)
//! shuffles values between this bank and the live register file.

use serde::{Deserialize, Serialize};

use crate::cpu::psr::Psr;

#[derive(Default, Serialize, Deserialize)]
pub struct RegisterBank {
    /// R8-R14 as seen outside FIQ mode, saved while FIQ is active.
    pub r8_old: u32,
    pub r9_old: u32,
    pub r10_old: u32,
    pub r11_old: u32,
    pub r12_old: u32,
    pub r13_old: u32,
    pub r14_old: u32,

    // FIQ bank
    pub r8_fiq: u32,
    pub r9_fiq: u32,
    pub r10_fiq: u32,
    pub r11_fiq: u32,
    pub r12_fiq: u32,
    pub r13_fiq: u32,
    pub r14_fiq: u32,

    // Supervisor bank (SWI handler stack and return address)
    pub r13_svc: u32,
    pub r14_svc: u32,

    // Abort bank
    pub r13_abt: u32,
    pub r14_abt: u32,

    // IRQ bank
    pub r13_irq: u32,
    pub r14_irq: u32,

    // Undefined bank
    pub r13_und: u32,
    pub r14_und: u32,

    // Saved status registers, one per exception mode
    pub spsr_fiq: Psr,
    pub spsr_svc: Psr,
    pub spsr_abt: Psr,
    pub spsr_irq: Psr,
    pub spsr_und: Psr,
}
