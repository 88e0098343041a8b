//! Execution of decoded ARM instructions.

use crate::bitwise::Bits;
use crate::bus::Bus;
use crate::cpu::alu::{self, ArithmeticOpResult, ShiftOutput};
use crate::cpu::arm::instructions::{
    AluInstruction, AluSecondOperand, ArmModeInstruction, HalfwordOffset, HalfwordTransferKind,
    MultiplyLongVariant, PsrKind, PsrOpKind, ShiftSource, SingleDataTransferOffset,
};
use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::bios;
use crate::cpu::cpu_modes::Mode;
use crate::cpu::flags::{Indexing, LoadStoreKind, Offsetting};
use crate::cpu::registers::{REG_LR, REG_PC};

impl Arm7tdmi {
    pub(crate) fn execute_arm(&mut self, bus: &mut Bus, instruction: ArmModeInstruction) -> u32 {
        use ArmModeInstruction::{
            BlockDataTransfer, Branch, BranchAndExchange, CoprocessorOperation, DataProcessing,
            HalfwordDataTransfer, Multiply, MultiplyLong, PsrTransfer, SingleDataSwap,
            SingleDataTransfer, SoftwareInterrupt, Undefined,
        };

        match instruction {
            DataProcessing {
                condition: _,
                alu_instruction,
                set_conditions,
                rn,
                rd,
                op2,
            } => self.data_processing(bus, alu_instruction, set_conditions, rn, rd, op2),
            PsrTransfer {
                condition: _,
                psr,
                kind,
            } => self.psr_transfer(bus, psr, kind),
            Multiply {
                condition: _,
                accumulate,
                set_conditions,
                rd,
                rn,
                rs,
                rm,
            } => self.multiply(accumulate, set_conditions, rd, rn, rs, rm),
            MultiplyLong {
                condition: _,
                variant,
                set_conditions,
                rd_hi,
                rd_lo,
                rs,
                rm,
            } => self.multiply_long(variant, set_conditions, rd_hi, rd_lo, rs, rm),
            SingleDataSwap {
                condition: _,
                byte,
                rn,
                rd,
                rm,
            } => self.single_data_swap(bus, byte, rn, rd, rm),
            BranchAndExchange {
                condition: _,
                register,
            } => {
                let target = self.registers.register_at(register as usize);
                self.branch_and_exchange(bus, target);
                3
            }
            HalfwordDataTransfer {
                condition: _,
                indexing,
                offsetting,
                write_back,
                load_store,
                transfer_kind,
                offset,
                base_register,
                rd,
            } => self.halfword_data_transfer(
                bus,
                indexing,
                offsetting,
                write_back,
                load_store,
                transfer_kind,
                offset,
                base_register,
                rd,
            ),
            SingleDataTransfer {
                condition: _,
                load_store,
                byte,
                write_back,
                indexing,
                offsetting,
                rd,
                base_register,
                offset,
            } => self.single_data_transfer(
                bus,
                load_store,
                byte,
                write_back,
                indexing,
                offsetting,
                rd,
                base_register,
                offset,
            ),
            BlockDataTransfer {
                condition: _,
                indexing,
                offsetting,
                load_psr,
                write_back,
                load_store,
                base_register,
                register_list,
            } => self.block_data_transfer(
                bus,
                indexing,
                offsetting,
                load_psr,
                write_back,
                load_store,
                base_register,
                register_list,
            ),
            Branch {
                condition: _,
                link,
                offset,
            } => self.branch(bus, link, offset),
            SoftwareInterrupt {
                condition: _,
                comment,
            } => bios::software_interrupt(self, bus, comment),
            CoprocessorOperation { .. } => 1,
            Undefined => {
                tracing::debug!(
                    "undefined ARM instruction at {:#010X}",
                    self.logical_pc()
                );
                1
            }
        }
    }

    /// Resolve operand 2 and its shifter carry-out.
    fn evaluate_second_operand(&self, op2: AluSecondOperand) -> ShiftOutput {
        let carry_in = self.cpsr.carry_flag();
        match op2 {
            AluSecondOperand::Immediate { base, rotate } => {
                let value = base.rotate_right(rotate);
                ShiftOutput {
                    value,
                    // A rotated immediate produces bit 31 as carry; rotate
                    // 0 leaves the flag alone.
                    carry: if rotate == 0 {
                        carry_in
                    } else {
                        value.get_bit(31)
                    },
                }
            }
            AluSecondOperand::Register {
                register,
                shift_kind,
                shift,
            } => {
                let value = self.registers.register_at(register as usize);
                match shift {
                    ShiftSource::Immediate(amount) => {
                        alu::shift_immediate(shift_kind, amount, value, carry_in)
                    }
                    ShiftSource::Register(rs) => {
                        let amount = self.registers.register_at(rs as usize) & 0xFF;
                        alu::shift(shift_kind, amount, value, carry_in)
                    }
                }
            }
        }
    }

    fn data_processing(
        &mut self,
        bus: &mut Bus,
        alu_instruction: AluInstruction,
        set_conditions: bool,
        rn: u32,
        rd: u32,
        op2: AluSecondOperand,
    ) -> u32 {
        use AluInstruction::{
            Adc, Add, And, Bic, Cmn, Cmp, Eor, Mov, Mvn, Orr, Rsb, Rsc, Sbc, Sub, Teq, Tst,
        };

        let shifter = self.evaluate_second_operand(op2);
        let op1 = self.registers.register_at(rn as usize);
        let op2_value = shifter.value;
        let carry = self.cpsr.carry_flag();

        let logical = |result: u32| ArithmeticOpResult {
            result,
            carry: shifter.carry,
            overflow: self.cpsr.overflow_flag(),
            sign: result.get_bit(31),
            zero: result == 0,
        };

        let (outcome, write_result) = match alu_instruction {
            And => (logical(op1 & op2_value), true),
            Eor => (logical(op1 ^ op2_value), true),
            Sub => (alu::sub(op1, op2_value), true),
            Rsb => (alu::sub(op2_value, op1), true),
            Add => (alu::add(op1, op2_value), true),
            Adc => (alu::adc(op1, op2_value, carry), true),
            Sbc => (alu::sbc(op1, op2_value, carry), true),
            Rsc => (alu::sbc(op2_value, op1, carry), true),
            Tst => (logical(op1 & op2_value), false),
            Teq => (logical(op1 ^ op2_value), false),
            Cmp => (alu::sub(op1, op2_value), false),
            Cmn => (alu::add(op1, op2_value), false),
            Orr => (logical(op1 | op2_value), true),
            Mov => (logical(op2_value), true),
            Bic => (logical(op1 & !op2_value), true),
            Mvn => (logical(!op2_value), true),
        };

        if write_result && rd == REG_PC as u32 {
            // Writing the PC: with the S bit set this is an exception
            // return and the CPSR comes back from the SPSR first.
            if set_conditions {
                self.restore_cpsr_from_spsr();
            }
            self.jump_to(bus, outcome.result);
            return 3;
        }

        if write_result {
            self.registers.set_register_at(rd as usize, outcome.result);
        }
        if set_conditions {
            self.cpsr.set_flags(outcome);
        }

        1
    }

    fn psr_transfer(&mut self, bus: &mut Bus, psr: PsrKind, kind: PsrOpKind) -> u32 {
        match kind {
            PsrOpKind::Mrs { destination } => {
                let value = match psr {
                    PsrKind::Cpsr => u32::from(self.cpsr),
                    PsrKind::Spsr => u32::from(self.spsr),
                };
                self.registers.set_register_at(destination as usize, value);
            }
            PsrOpKind::Msr {
                operand,
                field_mask,
            } => {
                let value = self.evaluate_second_operand(operand).value;

                let mut mask = 0_u32;
                for field in 0..4_u8 {
                    if field_mask.get_bit(field) {
                        mask |= 0xFF << (field * 8);
                    }
                }

                match psr {
                    PsrKind::Cpsr => self.write_cpsr(bus, value, mask),
                    PsrKind::Spsr => {
                        // User and System have no SPSR to write.
                        if !matches!(self.cpsr.mode(), Mode::User | Mode::System) {
                            let old = u32::from(self.spsr);
                            self.spsr = ((old & !mask) | (value & mask)).into();
                        }
                    }
                }
            }
        }
        1
    }

    fn multiply(
        &mut self,
        accumulate: bool,
        set_conditions: bool,
        rd: u32,
        rn: u32,
        rs: u32,
        rm: u32,
    ) -> u32 {
        let mut result = self
            .registers
            .register_at(rm as usize)
            .wrapping_mul(self.registers.register_at(rs as usize));
        if accumulate {
            result = result.wrapping_add(self.registers.register_at(rn as usize));
        }

        self.registers.set_register_at(rd as usize, result);
        if set_conditions {
            self.cpsr.set_sign_flag(result.get_bit(31));
            self.cpsr.set_zero_flag(result == 0);
        }

        if accumulate {
            3
        } else {
            2
        }
    }

    fn multiply_long(
        &mut self,
        variant: MultiplyLongVariant,
        set_conditions: bool,
        rd_hi: u32,
        rd_lo: u32,
        rs: u32,
        rm: u32,
    ) -> u32 {
        let rm_value = self.registers.register_at(rm as usize);
        let rs_value = self.registers.register_at(rs as usize);
        let accumulator = (u64::from(self.registers.register_at(rd_hi as usize)) << 32)
            | u64::from(self.registers.register_at(rd_lo as usize));

        let result = match variant {
            MultiplyLongVariant::Umull => u64::from(rm_value) * u64::from(rs_value),
            MultiplyLongVariant::Umlal => {
                (u64::from(rm_value) * u64::from(rs_value)).wrapping_add(accumulator)
            }
            MultiplyLongVariant::Smull => {
                (i64::from(rm_value as i32) * i64::from(rs_value as i32)) as u64
            }
            MultiplyLongVariant::Smlal => (i64::from(rm_value as i32)
                * i64::from(rs_value as i32))
            .wrapping_add(accumulator as i64) as u64,
        };

        self.registers
            .set_register_at(rd_hi as usize, (result >> 32) as u32);
        self.registers.set_register_at(rd_lo as usize, result as u32);

        if set_conditions {
            self.cpsr.set_sign_flag(result >> 63 != 0);
            self.cpsr.set_zero_flag(result == 0);
        }

        4
    }

    fn single_data_swap(&mut self, bus: &mut Bus, byte: bool, rn: u32, rd: u32, rm: u32) -> u32 {
        let address = self.registers.register_at(rn as usize);
        let source = self.registers.register_at(rm as usize);

        if byte {
            let loaded = bus.read_byte(address);
            bus.write_byte(address, source as u8);
            self.registers.set_register_at(rd as usize, u32::from(loaded));
        } else {
            let loaded = bus.read_word(address);
            bus.write_word(address, source);
            self.registers.set_register_at(rd as usize, loaded);
        }

        4
    }

    #[allow(clippy::too_many_arguments)]
    fn halfword_data_transfer(
        &mut self,
        bus: &mut Bus,
        indexing: Indexing,
        offsetting: Offsetting,
        write_back: bool,
        load_store: LoadStoreKind,
        transfer_kind: HalfwordTransferKind,
        offset: HalfwordOffset,
        base_register: u32,
        rd: u32,
    ) -> u32 {
        let offset_value = match offset {
            HalfwordOffset::Immediate(value) => value,
            HalfwordOffset::Register(register) => self.registers.register_at(register as usize),
        };

        let base = self.registers.register_at(base_register as usize);
        let applied = match offsetting {
            Offsetting::Up => base.wrapping_add(offset_value),
            Offsetting::Down => base.wrapping_sub(offset_value),
        };
        let address = match indexing {
            Indexing::Pre => applied,
            Indexing::Post => base,
        };

        match load_store {
            LoadStoreKind::Load => {
                let value = match transfer_kind {
                    HalfwordTransferKind::UnsignedHalfword => {
                        u32::from(bus.read_half_word(address & !1))
                    }
                    HalfwordTransferKind::SignedByte => {
                        bus.read_byte(address) as i8 as i32 as u32
                    }
                    HalfwordTransferKind::SignedHalfword => {
                        bus.read_half_word(address & !1) as i16 as i32 as u32
                    }
                };
                if rd == REG_PC as u32 {
                    self.jump_to(bus, value);
                } else {
                    self.registers.set_register_at(rd as usize, value);
                }
            }
            LoadStoreKind::Store => {
                // Only STRH exists in this group; the stored PC reads one
                // word further ahead than an operand read.
                let mut value = self.registers.register_at(rd as usize);
                if rd == REG_PC as u32 {
                    value = value.wrapping_add(4);
                }
                bus.write_half_word(address & !1, value as u16);
            }
        }

        let load_overwrote_base =
            load_store == LoadStoreKind::Load && rd == base_register && rd != REG_PC as u32;
        if !load_overwrote_base {
            match indexing {
                Indexing::Post => self
                    .registers
                    .set_register_at(base_register as usize, applied),
                Indexing::Pre if write_back => self
                    .registers
                    .set_register_at(base_register as usize, applied),
                Indexing::Pre => {}
            }
        }

        3
    }

    #[allow(clippy::too_many_arguments)]
    fn single_data_transfer(
        &mut self,
        bus: &mut Bus,
        load_store: LoadStoreKind,
        byte: bool,
        write_back: bool,
        indexing: Indexing,
        offsetting: Offsetting,
        rd: u32,
        base_register: u32,
        offset: SingleDataTransferOffset,
    ) -> u32 {
        let offset_value = match offset {
            SingleDataTransferOffset::Immediate(value) => value,
            SingleDataTransferOffset::Register {
                register,
                shift_kind,
                shift_amount,
            } => {
                let value = self.registers.register_at(register as usize);
                alu::shift_immediate(shift_kind, shift_amount, value, self.cpsr.carry_flag())
                    .value
            }
        };

        let base = self.registers.register_at(base_register as usize);
        let applied = match offsetting {
            Offsetting::Up => base.wrapping_add(offset_value),
            Offsetting::Down => base.wrapping_sub(offset_value),
        };
        let address = match indexing {
            Indexing::Pre => applied,
            Indexing::Post => base,
        };

        match load_store {
            LoadStoreKind::Load => {
                let value = if byte {
                    u32::from(bus.read_byte(address))
                } else {
                    // Misaligned word loads come back rotated from the bus.
                    bus.read_word(address)
                };
                if rd == REG_PC as u32 {
                    self.jump_to(bus, value);
                } else {
                    self.registers.set_register_at(rd as usize, value);
                }
            }
            LoadStoreKind::Store => {
                let mut value = self.registers.register_at(rd as usize);
                if rd == REG_PC as u32 {
                    value = value.wrapping_add(4);
                }
                if byte {
                    bus.write_byte(address, value as u8);
                } else {
                    bus.write_word(address, value);
                }
            }
        }

        let load_overwrote_base =
            load_store == LoadStoreKind::Load && rd == base_register && rd != REG_PC as u32;
        if !load_overwrote_base {
            match indexing {
                Indexing::Post => self
                    .registers
                    .set_register_at(base_register as usize, applied),
                Indexing::Pre if write_back => self
                    .registers
                    .set_register_at(base_register as usize, applied),
                Indexing::Pre => {}
            }
        }

        3
    }

    #[allow(clippy::too_many_arguments)]
    fn block_data_transfer(
        &mut self,
        bus: &mut Bus,
        indexing: Indexing,
        offsetting: Offsetting,
        load_psr: bool,
        write_back: bool,
        load_store: LoadStoreKind,
        base_register: u32,
        register_list: u16,
    ) -> u32 {
        let count = u32::from(register_list.count_ones());
        let base = self.registers.register_at(base_register as usize);

        // Transfers always run from the lowest address upward; a
        // decrementing variant starts below the base and the
        // before/after flag flips accordingly.
        let (start, final_base) = match offsetting {
            Offsetting::Up => (base, base.wrapping_add(count * 4)),
            Offsetting::Down => {
                let start = base.wrapping_sub(count * 4);
                (start, start)
            }
        };
        let increment_before = matches!(
            (indexing, offsetting),
            (Indexing::Pre, Offsetting::Up) | (Indexing::Post, Offsetting::Down)
        );

        let mut address = start;
        let mut loaded_pc = None;
        for reg in 0..16_usize {
            if !register_list.get_bit(reg as u8) {
                continue;
            }

            if increment_before {
                address = address.wrapping_add(4);
            }
            match load_store {
                LoadStoreKind::Load => {
                    let value = bus.read_word(address & !3);
                    if reg == REG_PC {
                        loaded_pc = Some(value);
                    } else {
                        self.registers.set_register_at(reg, value);
                    }
                }
                LoadStoreKind::Store => {
                    let mut value = self.registers.register_at(reg);
                    if reg == REG_PC {
                        value = value.wrapping_add(4);
                    }
                    bus.write_word(address & !3, value);
                }
            }
            if !increment_before {
                address = address.wrapping_add(4);
            }
        }

        let base_loaded = load_store == LoadStoreKind::Load
            && register_list.get_bit(base_register as u8);
        if write_back && !base_loaded {
            self.registers
                .set_register_at(base_register as usize, final_base);
        }

        if let Some(target) = loaded_pc {
            // LDM {..., PC}^ in a privileged mode is an exception return.
            if load_psr && !matches!(self.cpsr.mode(), Mode::User | Mode::System) {
                self.restore_cpsr_from_spsr();
            }
            self.jump_to(bus, target);
        }

        count + 2
    }

    fn branch(&mut self, bus: &mut Bus, link: bool, offset: i32) -> u32 {
        let pc = self.registers.program_counter();
        if link {
            // Return address is the instruction after this one.
            self.registers
                .set_register_at(REG_LR, pc.wrapping_sub(4));
        }
        self.jump_to(bus, pc.wrapping_add(offset as u32));
        3
    }
}
