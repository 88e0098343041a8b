//! The ARM7TDMI interpreter.
//!
//! `step` fetches, decodes and executes one instruction against the bus and
//! returns an approximate cycle count that drives the frame schedule.
//!
//! ## R15 and the pipeline
//!
//! R15 is kept pre-advanced so that a plain register read during execution
//! observes `instruction address + 8` in ARM state and `+ 4` in Thumb state
//! (the three stage pipeline). The fetch address is therefore
//! `R15 - prefetch_offset`, and every branch goes through [`Arm7tdmi::jump_to`],
//! which re-establishes the invariant for the target.
//!
//! ## BIOS
//!
//! The BIOS region is high-level emulated: SWIs are serviced directly (see
//! [`bios`](super::bios)) and a program counter that lands in BIOS space is
//! either the HLE IRQ trampoline return stub or a stray branch, which falls
//! back to a return through LR. No machine code is ever fetched from the
//! region.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::bus::Bus;
use crate::cpu::arm::instructions::ArmModeInstruction;
use crate::cpu::arm::{ARM_PC_OFFSET, SIZE_OF_ARM_INSTRUCTION};
use crate::cpu::cpu_modes::Mode;
use crate::cpu::psr::{CpuState, Psr};
use crate::cpu::register_bank::RegisterBank;
use crate::cpu::registers::{Registers, REG_LR, REG_SP};
use crate::cpu::thumb::instructions::ThumbModeInstruction;
use crate::cpu::thumb::{SIZE_OF_THUMB_INSTRUCTION, THUMB_PC_OFFSET};

/// Word in IWRAM holding the game's interrupt handler pointer.
pub const IRQ_HANDLER_POINTER: u32 = 0x0300_7FFC;

/// BIOS address the HLE IRQ trampoline links back to. Re-entering the BIOS
/// at (or just before, after a `SUBS PC, LR, #4`) this address pops the
/// trampoline frame and resumes the interrupted code.
pub const BIOS_IRQ_RETURN: u32 = 0x0000_0138;

/// Default stack pointers installed by the BIOS.
const SP_USER: u32 = 0x0300_7F00;
const SP_IRQ: u32 = 0x0300_7FA0;
const SP_SVC: u32 = 0x0300_7FE0;

#[derive(Serialize, Deserialize)]
pub struct Arm7tdmi {
    pub cpsr: Psr,
    /// SPSR of the current mode; meaningless in User/System.
    pub spsr: Psr,
    pub registers: Registers,
    pub register_bank: RegisterBank,

    /// Monotonic executed-cycle counter.
    pub cycles: u64,
    /// Set by Halt-family SWIs and HALTCNT; cleared when an interrupt is
    /// delivered.
    pub halted: bool,

    /// True while the executing instruction has written the PC.
    #[serde(skip)]
    branched: bool,
}

impl Default for Arm7tdmi {
    fn default() -> Self {
        let mut cpu = Self {
            cpsr: Psr::from(Mode::System),
            spsr: Psr::default(),
            registers: Registers::default(),
            register_bank: RegisterBank::default(),
            cycles: 0,
            halted: false,
            branched: false,
        };
        cpu.reset();
        cpu
    }
}

impl Arm7tdmi {
    /// Post-BIOS boot state: System mode, ARM state, stacks set up, PC at
    /// the cartridge entry point.
    pub fn reset(&mut self) {
        self.cpsr = Psr::from(Mode::System);
        self.spsr = Psr::default();
        self.registers = Registers::default();
        self.register_bank = RegisterBank::default();
        self.cycles = 0;
        self.halted = false;
        self.branched = false;

        self.registers.set_register_at(REG_SP, SP_USER);
        self.register_bank.r13_irq = SP_IRQ;
        self.register_bank.r13_svc = SP_SVC;
        self.registers.set_program_counter(0x0800_0000 + ARM_PC_OFFSET);
    }

    /// Execute one instruction. Returns the consumed cycles (≥ 1).
    pub fn step(&mut self, bus: &mut Bus) -> u32 {
        if self.halted {
            return 1;
        }

        let cycles = match self.cpsr.cpu_state() {
            CpuState::Arm => {
                let pc = self
                    .registers
                    .program_counter()
                    .wrapping_sub(ARM_PC_OFFSET);
                if pc < 0x0000_4000 {
                    self.step_bios(bus, pc)
                } else {
                    let op_code = bus.read_word(pc & !3);
                    let instruction = ArmModeInstruction::from(op_code);
                    if self.cpsr.can_execute(instruction.condition()) {
                        self.branched = false;
                        let cycles = self.execute_arm(bus, instruction);
                        if !self.branched {
                            self.registers
                                .advance_program_counter(SIZE_OF_ARM_INSTRUCTION);
                        }
                        cycles
                    } else {
                        self.registers
                            .advance_program_counter(SIZE_OF_ARM_INSTRUCTION);
                        1
                    }
                }
            }
            CpuState::Thumb => {
                let pc = self
                    .registers
                    .program_counter()
                    .wrapping_sub(THUMB_PC_OFFSET);
                if pc < 0x0000_4000 {
                    self.step_bios(bus, pc)
                } else {
                    let op_code = bus.read_half_word(pc & !1);
                    let instruction = ThumbModeInstruction::from(op_code);
                    self.branched = false;
                    let cycles = self.execute_thumb(bus, instruction);
                    if !self.branched {
                        self.registers
                            .advance_program_counter(SIZE_OF_THUMB_INSTRUCTION);
                    }
                    cycles
                }
            }
        };

        self.cycles += u64::from(cycles);
        cycles
    }

    /// Address of the instruction currently at the fetch stage, without the
    /// pipeline offset.
    #[must_use]
    pub fn logical_pc(&self) -> u32 {
        let offset = match self.cpsr.cpu_state() {
            CpuState::Arm => ARM_PC_OFFSET,
            CpuState::Thumb => THUMB_PC_OFFSET,
        };
        self.registers.program_counter().wrapping_sub(offset)
    }

    /// A branch target the CPU could plausibly execute from.
    fn is_executable(address: u32) -> bool {
        matches!(
            address >> 24,
            0x00..=0x03 | 0x06 | 0x08..=0x0D
        )
    }

    /// Redirect execution to `address`, re-establishing the R15 pipeline
    /// invariant. A target outside every executable region is skipped: the
    /// write is dropped, the instruction completes as a no-op and a
    /// diagnostic is counted.
    pub(crate) fn jump_to(&mut self, bus: &mut Bus, address: u32) {
        if !Self::is_executable(address) {
            #[cfg(feature = "strict-pc")]
            panic!("branch to unmapped address {address:#010X}");

            #[cfg(not(feature = "strict-pc"))]
            {
                bus.diagnostics.note_invalid_pc_write(address);
                return;
            }
        }

        match self.cpsr.cpu_state() {
            CpuState::Arm => self
                .registers
                .set_program_counter((address & !3).wrapping_add(ARM_PC_OFFSET)),
            CpuState::Thumb => self
                .registers
                .set_program_counter((address & !1).wrapping_add(THUMB_PC_OFFSET)),
        }
        self.branched = true;
    }

    /// BX-style jump: bit 0 of the target selects the Thumb state.
    pub(crate) fn branch_and_exchange(&mut self, bus: &mut Bus, address: u32) {
        if !Self::is_executable(address & !1) {
            #[cfg(feature = "strict-pc")]
            panic!("branch-and-exchange to unmapped address {address:#010X}");

            #[cfg(not(feature = "strict-pc"))]
            {
                bus.diagnostics.note_invalid_pc_write(address);
                return;
            }
        }

        self.cpsr.set_cpu_state(address.get_bit(0).into());
        self.jump_to(bus, address & !1);
    }

    // ------------------------------------------------------------------
    // Mode switching
    // ------------------------------------------------------------------

    /// Switch the operating mode, shuffling the banked registers and SPSR.
    pub fn swap_mode(&mut self, new_mode: Mode) {
        if self.cpsr.mode() == new_mode {
            return;
        }

        // Park the outgoing mode's banked registers.
        match self.cpsr.mode() {
            Mode::Fiq => {
                self.register_bank.r8_fiq = self.registers.register_at(8);
                self.register_bank.r9_fiq = self.registers.register_at(9);
                self.register_bank.r10_fiq = self.registers.register_at(10);
                self.register_bank.r11_fiq = self.registers.register_at(11);
                self.register_bank.r12_fiq = self.registers.register_at(12);
                self.register_bank.r13_fiq = self.registers.register_at(13);
                self.register_bank.r14_fiq = self.registers.register_at(14);
                self.register_bank.spsr_fiq = self.spsr;

                self.registers.set_register_at(8, self.register_bank.r8_old);
                self.registers.set_register_at(9, self.register_bank.r9_old);
                self.registers
                    .set_register_at(10, self.register_bank.r10_old);
                self.registers
                    .set_register_at(11, self.register_bank.r11_old);
                self.registers
                    .set_register_at(12, self.register_bank.r12_old);
            }
            Mode::User | Mode::System => {
                self.register_bank.r13_old = self.registers.register_at(13);
                self.register_bank.r14_old = self.registers.register_at(14);
            }
            Mode::Supervisor => {
                self.register_bank.r13_svc = self.registers.register_at(13);
                self.register_bank.r14_svc = self.registers.register_at(14);
                self.register_bank.spsr_svc = self.spsr;
            }
            Mode::Abort => {
                self.register_bank.r13_abt = self.registers.register_at(13);
                self.register_bank.r14_abt = self.registers.register_at(14);
                self.register_bank.spsr_abt = self.spsr;
            }
            Mode::Irq => {
                self.register_bank.r13_irq = self.registers.register_at(13);
                self.register_bank.r14_irq = self.registers.register_at(14);
                self.register_bank.spsr_irq = self.spsr;
            }
            Mode::Undefined => {
                self.register_bank.r13_und = self.registers.register_at(13);
                self.register_bank.r14_und = self.registers.register_at(14);
                self.register_bank.spsr_und = self.spsr;
            }
        }

        // Install the incoming mode's bank.
        match new_mode {
            Mode::Fiq => {
                self.register_bank.r8_old = self.registers.register_at(8);
                self.register_bank.r9_old = self.registers.register_at(9);
                self.register_bank.r10_old = self.registers.register_at(10);
                self.register_bank.r11_old = self.registers.register_at(11);
                self.register_bank.r12_old = self.registers.register_at(12);

                self.registers.set_register_at(8, self.register_bank.r8_fiq);
                self.registers.set_register_at(9, self.register_bank.r9_fiq);
                self.registers
                    .set_register_at(10, self.register_bank.r10_fiq);
                self.registers
                    .set_register_at(11, self.register_bank.r11_fiq);
                self.registers
                    .set_register_at(12, self.register_bank.r12_fiq);
                self.registers
                    .set_register_at(13, self.register_bank.r13_fiq);
                self.registers
                    .set_register_at(14, self.register_bank.r14_fiq);
                self.spsr = self.register_bank.spsr_fiq;
            }
            Mode::User | Mode::System => {
                self.registers
                    .set_register_at(13, self.register_bank.r13_old);
                self.registers
                    .set_register_at(14, self.register_bank.r14_old);
            }
            Mode::Supervisor => {
                self.registers
                    .set_register_at(13, self.register_bank.r13_svc);
                self.registers
                    .set_register_at(14, self.register_bank.r14_svc);
                self.spsr = self.register_bank.spsr_svc;
            }
            Mode::Abort => {
                self.registers
                    .set_register_at(13, self.register_bank.r13_abt);
                self.registers
                    .set_register_at(14, self.register_bank.r14_abt);
                self.spsr = self.register_bank.spsr_abt;
            }
            Mode::Irq => {
                self.registers
                    .set_register_at(13, self.register_bank.r13_irq);
                self.registers
                    .set_register_at(14, self.register_bank.r14_irq);
                self.spsr = self.register_bank.spsr_irq;
            }
            Mode::Undefined => {
                self.registers
                    .set_register_at(13, self.register_bank.r13_und);
                self.registers
                    .set_register_at(14, self.register_bank.r14_und);
                self.spsr = self.register_bank.spsr_und;
            }
        }

        self.cpsr.set_mode(new_mode);
    }

    /// Write the CPSR through an MSR-style field mask, banking registers on
    /// a mode change. Invalid mode bit patterns are masked back to the
    /// current mode.
    pub(crate) fn write_cpsr(&mut self, bus: &mut Bus, value: u32, mask: u32) {
        let old = u32::from(self.cpsr);
        let mut new = (old & !mask) | (value & mask);

        if mask & 0xFF != 0 {
            match Mode::try_from(new & 0b11111) {
                Ok(mode) => self.swap_mode(mode),
                Err(bits) => {
                    bus.diagnostics.note_invalid_mode_write(bits);
                    new = (new & !0b11111) | (old & 0b11111);
                }
            }
        }

        self.cpsr = Psr::from(new);
    }

    /// Exception-return CPSR restore: `SUBS PC, LR, #4`, `MOVS PC, LR` and
    /// `LDM {..., PC}^` all funnel through here.
    pub(crate) fn restore_cpsr_from_spsr(&mut self) {
        let spsr = self.spsr;
        self.swap_mode(spsr.mode());
        self.cpsr = spsr;
    }

    // ------------------------------------------------------------------
    // Interrupts and HLE BIOS entry points
    // ------------------------------------------------------------------

    /// Deliver an IRQ: performs the exception entry sequence and then the
    /// BIOS trampoline in high-level form, dispatching straight to the
    /// handler installed at [`IRQ_HANDLER_POINTER`].
    pub fn handle_irq(&mut self, bus: &mut Bus) {
        let handler = bus.read_word(IRQ_HANDLER_POINTER);
        if handler == 0 || !Self::is_executable(handler & !1) {
            // No handler installed; leave the request pending.
            return;
        }

        self.halted = false;

        // Return address such that `SUBS PC, LR, #4` resumes the next
        // instruction: PC + 4 in both states.
        let return_address = match self.cpsr.cpu_state() {
            CpuState::Arm => self.registers.program_counter().wrapping_sub(4),
            CpuState::Thumb => self.registers.program_counter(),
        };

        let old_cpsr = self.cpsr;
        self.swap_mode(Mode::Irq);
        self.spsr = old_cpsr;
        self.cpsr.set_irq_disable(true);
        self.cpsr.set_cpu_state(CpuState::Arm);
        self.registers.set_register_at(REG_LR, return_address);

        // BIOS trampoline prologue: STMFD SP!, {R0-R3, R12, LR}.
        let frame_base = self.registers.register_at(REG_SP).wrapping_sub(24);
        for (slot, reg) in [0, 1, 2, 3, 12, REG_LR].into_iter().enumerate() {
            bus.write_word(
                frame_base.wrapping_add(slot as u32 * 4),
                self.registers.register_at(reg),
            );
        }
        self.registers.set_register_at(REG_SP, frame_base);
        self.registers.set_register_at(REG_LR, BIOS_IRQ_RETURN);

        // BX into the handler.
        self.cpsr.set_cpu_state(handler.get_bit(0).into());
        let target = handler & !1;
        match self.cpsr.cpu_state() {
            CpuState::Arm => self
                .registers
                .set_program_counter((target & !3).wrapping_add(ARM_PC_OFFSET)),
            CpuState::Thumb => self
                .registers
                .set_program_counter(target.wrapping_add(THUMB_PC_OFFSET)),
        }
    }

    /// The PC landed inside the BIOS region. Either this is the HLE IRQ
    /// trampoline return stub, or a stray branch that we unwind through LR.
    fn step_bios(&mut self, bus: &mut Bus, pc: u32) -> u32 {
        if (BIOS_IRQ_RETURN - 4..=BIOS_IRQ_RETURN).contains(&pc) {
            return self.return_from_irq_trampoline(bus);
        }

        // Stray branch into BIOS space: unwind to the caller.
        let lr = self.registers.register_at(REG_LR);
        if Self::is_executable(lr & !1) && lr & !1 >= 0x0000_4000 {
            self.branch_and_exchange(bus, lr);
        } else {
            bus.diagnostics.note_invalid_pc_write(pc);
            self.registers.advance_program_counter(SIZE_OF_ARM_INSTRUCTION);
        }
        3
    }

    /// Epilogue of the HLE IRQ trampoline: pop {R0-R3, R12, LR} from the
    /// IRQ stack, restore the interrupted CPSR if the handler came back via
    /// `BX LR` (still in IRQ mode), and resume at the interrupted
    /// instruction.
    fn return_from_irq_trampoline(&mut self, bus: &mut Bus) -> u32 {
        let in_irq_mode = self.cpsr.mode() == Mode::Irq;
        let frame_base = if in_irq_mode {
            self.registers.register_at(REG_SP)
        } else {
            // The handler already returned with `SUBS PC, LR, #4`; the
            // frame is still on the banked IRQ stack.
            self.register_bank.r13_irq
        };

        let mut frame = [0_u32; 6];
        for (slot, value) in frame.iter_mut().enumerate() {
            *value = bus.read_word(frame_base.wrapping_add(slot as u32 * 4));
        }

        let new_sp = frame_base.wrapping_add(24);
        if in_irq_mode {
            self.registers.set_register_at(REG_SP, new_sp);
        } else {
            self.register_bank.r13_irq = new_sp;
        }

        for (slot, reg) in [0, 1, 2, 3, 12].into_iter().enumerate() {
            self.registers.set_register_at(reg, frame[slot]);
        }

        if in_irq_mode {
            self.restore_cpsr_from_spsr();
        }

        // frame[5] holds the original return address (interrupted PC + 4).
        let resume = frame[5].wrapping_sub(4);
        self.jump_to(bus, resume);
        3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reset_state() {
        let cpu = Arm7tdmi::default();
        assert_eq!(cpu.cpsr.mode(), Mode::System);
        assert_eq!(cpu.cpsr.cpu_state(), CpuState::Arm);
        assert_eq!(cpu.registers.program_counter(), 0x0800_0008);
        assert_eq!(cpu.registers.register_at(REG_SP), 0x0300_7F00);
        assert!(!cpu.halted);
    }

    #[test]
    fn swap_mode_banks_sp_lr() {
        let mut cpu = Arm7tdmi::default();
        for reg in 0..=15 {
            cpu.registers.set_register_at(reg, reg as u32);
        }
        cpu.registers.set_register_at(13, 100);
        cpu.registers.set_register_at(14, 200);

        cpu.swap_mode(Mode::Irq);
        assert_eq!(cpu.registers.register_at(13), SP_IRQ);
        assert_eq!(cpu.registers.register_at(14), 0);
        // Unbanked registers survive.
        assert_eq!(cpu.registers.register_at(7), 7);

        cpu.swap_mode(Mode::System);
        assert_eq!(cpu.registers.register_at(13), 100);
        assert_eq!(cpu.registers.register_at(14), 200);
    }

    #[test]
    fn swap_mode_fiq_banks_r8_to_r14() {
        let mut cpu = Arm7tdmi::default();
        for reg in 8..=12 {
            cpu.registers.set_register_at(reg, reg as u32 * 11);
        }

        cpu.swap_mode(Mode::Fiq);
        for reg in 8..=12 {
            assert_eq!(cpu.registers.register_at(reg), 0);
        }

        cpu.swap_mode(Mode::System);
        for reg in 8..=12 {
            assert_eq!(cpu.registers.register_at(reg), reg as u32 * 11);
        }
    }

    #[test]
    fn invalid_branch_target_is_skipped() {
        let mut cpu = Arm7tdmi::default();
        let mut bus = Bus::default();
        let pc_before = cpu.registers.program_counter();

        cpu.jump_to(&mut bus, 0xF000_0000);
        assert_eq!(cpu.registers.program_counter(), pc_before);
        assert!(!cpu.branched);
        assert_eq!(bus.diagnostics.invalid_pc_writes(), 1);
    }

    #[test]
    fn write_cpsr_masks_invalid_mode() {
        let mut cpu = Arm7tdmi::default();
        let mut bus = Bus::default();

        cpu.write_cpsr(&mut bus, 0x0000_0003, 0xFFFF_FFFF);
        assert_eq!(cpu.cpsr.mode(), Mode::System);
        assert_eq!(bus.diagnostics.invalid_mode_writes(), 1);

        cpu.write_cpsr(&mut bus, Mode::Irq as u32, 0x0000_00FF);
        assert_eq!(cpu.cpsr.mode(), Mode::Irq);
    }

    #[test]
    fn irq_entry_and_bx_lr_return() {
        let mut cpu = Arm7tdmi::default();
        let mut bus = Bus::default();

        // Handler at an ARM address in IWRAM.
        bus.write_word(IRQ_HANDLER_POINTER, 0x0300_1000);
        cpu.registers.set_register_at(0, 0xAAAA);
        cpu.registers.set_register_at(12, 0xBBBB);
        let interrupted_pc = cpu.registers.program_counter();

        cpu.handle_irq(&mut bus);
        assert_eq!(cpu.cpsr.mode(), Mode::Irq);
        assert!(cpu.cpsr.irq_disable());
        assert_eq!(cpu.registers.program_counter(), 0x0300_1000 + 8);
        assert_eq!(cpu.registers.register_at(REG_LR), BIOS_IRQ_RETURN);

        // Handler clobbers the scratch registers and returns with BX LR.
        cpu.registers.set_register_at(0, 0);
        cpu.registers.set_register_at(12, 0);
        cpu.branch_and_exchange(&mut bus, BIOS_IRQ_RETURN);
        let cycles = cpu.step(&mut bus);
        assert_eq!(cycles, 3);

        assert_eq!(cpu.cpsr.mode(), Mode::System);
        assert!(!cpu.cpsr.irq_disable());
        assert_eq!(cpu.registers.program_counter(), interrupted_pc);
        assert_eq!(cpu.registers.register_at(0), 0xAAAA);
        assert_eq!(cpu.registers.register_at(12), 0xBBBB);
        // The IRQ stack is balanced again.
        assert_eq!(cpu.register_bank.r13_irq, SP_IRQ);
    }

    #[test]
    fn irq_without_handler_is_deferred() {
        let mut cpu = Arm7tdmi::default();
        let mut bus = Bus::default();
        let pc = cpu.registers.program_counter();

        cpu.handle_irq(&mut bus);
        assert_eq!(cpu.cpsr.mode(), Mode::System);
        assert_eq!(cpu.registers.program_counter(), pc);
    }

    #[test]
    fn stray_bios_branch_returns_through_lr() {
        let mut cpu = Arm7tdmi::default();
        let mut bus = Bus::default();
        cpu.registers.set_register_at(REG_LR, 0x0800_0100);

        cpu.jump_to(&mut bus, 0x0000_0000);
        cpu.step(&mut bus);
        assert_eq!(cpu.registers.program_counter(), 0x0800_0100 + 8);
    }
}
