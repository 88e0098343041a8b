//! ARM7TDMI emulation.
//!
//! The processor runs one of two instruction sets, selected by the CPSR T
//! bit: 32-bit ARM (every instruction conditional, word aligned) and 16-bit
//! Thumb (tighter encodings, halfword aligned). `BX` switches between them.
//!
//! The three stage pipeline (fetch, decode, execute) leaks into the
//! programming model: reading R15 during execution yields the instruction
//! address + 8 in ARM state and + 4 in Thumb state. The interpreter keeps
//! R15 pre-advanced to make that invariant hold for free; see
//! [`arm7tdmi`].
//!
//! | Module          | Contents                                          |
//! |-----------------|---------------------------------------------------|
//! | [`arm7tdmi`]    | CPU state, step loop, mode switching, IRQ entry   |
//! | [`arm`]         | ARM decode and execution                          |
//! | [`thumb`]       | Thumb decode and execution                        |
//! | [`alu`]         | Barrel shifter and flag arithmetic                |
//! | [`bios`]        | High-level BIOS services                          |
//! | [`hardware`]    | Bus-owned peripherals (LCD, DMA, timers, ...)     |

pub mod alu;
pub mod arm;
pub mod arm7tdmi;
pub mod bios;
pub mod condition;
pub mod cpu_modes;
pub mod flags;
pub mod hardware;
pub mod psr;
pub mod register_bank;
pub mod registers;
pub mod thumb;
