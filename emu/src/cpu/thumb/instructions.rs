use crate::bitwise::Bits;
use crate::cpu::alu::ShiftKind;
use crate::cpu::condition::Condition;
use crate::cpu::flags::LoadStoreKind;

/// ALU operation of the Thumb register-to-register format, bits 6-9.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum ThumbAluOp {
    And = 0x0,
    Eor = 0x1,
    Lsl = 0x2,
    Lsr = 0x3,
    Asr = 0x4,
    Adc = 0x5,
    Sbc = 0x6,
    Ror = 0x7,
    Tst = 0x8,
    Neg = 0x9,
    Cmp = 0xA,
    Cmn = 0xB,
    Orr = 0xC,
    Mul = 0xD,
    Bic = 0xE,
    Mvn = 0xF,
}

impl From<u16> for ThumbAluOp {
    fn from(bits: u16) -> Self {
        use ThumbAluOp::{
            Adc, And, Asr, Bic, Cmn, Cmp, Eor, Lsl, Lsr, Mul, Mvn, Neg, Orr, Ror, Sbc, Tst,
        };
        match bits & 0xF {
            0x0 => And,
            0x1 => Eor,
            0x2 => Lsl,
            0x3 => Lsr,
            0x4 => Asr,
            0x5 => Adc,
            0x6 => Sbc,
            0x7 => Ror,
            0x8 => Tst,
            0x9 => Neg,
            0xA => Cmp,
            0xB => Cmn,
            0xC => Orr,
            0xD => Mul,
            0xE => Bic,
            0xF => Mvn,
            _ => unreachable!(),
        }
    }
}

/// Hi-register operation, bits 8-9 of format 5.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum HiRegisterOp {
    Add,
    Cmp,
    Mov,
    BxBlx,
}

/// Immediate-operand operation of format 3.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum ImmediateOp {
    Mov,
    Cmp,
    Add,
    Sub,
}

/// A decoded Thumb instruction.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ThumbModeInstruction {
    MoveShiftedRegister {
        shift_kind: ShiftKind,
        offset: u32,
        rs: u32,
        rd: u32,
    },
    AddSubtract {
        immediate: bool,
        subtract: bool,
        rn_or_imm: u32,
        rs: u32,
        rd: u32,
    },
    MoveCompareAddSubtractImm {
        operation: ImmediateOp,
        rd: u32,
        immediate: u32,
    },
    AluOp {
        operation: ThumbAluOp,
        rs: u32,
        rd: u32,
    },
    HiRegisterOpBx {
        operation: HiRegisterOp,
        rs: u32,
        rd: u32,
    },
    PcRelativeLoad {
        rd: u32,
        word_offset: u32,
    },
    LoadStoreRegisterOffset {
        load_store: LoadStoreKind,
        byte: bool,
        ro: u32,
        rb: u32,
        rd: u32,
    },
    LoadStoreSignExtended {
        /// Bits 10-11: 0 STRH, 1 LDRSB, 2 LDRH, 3 LDRSH.
        operation: u16,
        ro: u32,
        rb: u32,
        rd: u32,
    },
    LoadStoreImmOffset {
        load_store: LoadStoreKind,
        byte: bool,
        offset: u32,
        rb: u32,
        rd: u32,
    },
    LoadStoreHalfword {
        load_store: LoadStoreKind,
        offset: u32,
        rb: u32,
        rd: u32,
    },
    SpRelativeLoadStore {
        load_store: LoadStoreKind,
        rd: u32,
        byte_offset: u32,
    },
    LoadAddress {
        sp: bool,
        rd: u32,
        byte_offset: u32,
    },
    AddOffsetSp {
        negative: bool,
        byte_offset: u32,
    },
    PushPopRegisters {
        load_store: LoadStoreKind,
        pc_lr: bool,
        register_list: u8,
    },
    MultipleLoadStore {
        load_store: LoadStoreKind,
        rb: u32,
        register_list: u8,
    },
    ConditionalBranch {
        condition: Condition,
        offset: i32,
    },
    SoftwareInterrupt {
        comment: u32,
    },
    UnconditionalBranch {
        offset: i32,
    },
    /// First half of the long branch: loads the high part of the target
    /// into LR.
    LongBranchFirstHalf {
        offset: u32,
    },
    /// Second half: completes the branch and links. The BLX form switches
    /// to ARM state.
    LongBranchSecondHalf {
        exchange: bool,
        offset: u32,
    },
    Undefined,
}

impl From<u16> for ThumbModeInstruction {
    fn from(op_code: u16) -> Self {
        // Longest prefixes first; several formats share the top three bits.
        if op_code.get_bits(8..=15) == 0b1101_1111 {
            return Self::SoftwareInterrupt {
                comment: u32::from(op_code.get_bits(0..=7)),
            };
        }

        if op_code.get_bits(8..=15) == 0b1011_0000 {
            return Self::AddOffsetSp {
                negative: op_code.get_bit(7),
                byte_offset: u32::from(op_code.get_bits(0..=6)) << 2,
            };
        }

        if op_code.get_bits(10..=15) == 0b0100_00 {
            return Self::AluOp {
                operation: ThumbAluOp::from(op_code.get_bits(6..=9)),
                rs: u32::from(op_code.get_bits(3..=5)),
                rd: u32::from(op_code.get_bits(0..=2)),
            };
        }

        if op_code.get_bits(10..=15) == 0b0100_01 {
            let operation = match op_code.get_bits(8..=9) {
                0 => HiRegisterOp::Add,
                1 => HiRegisterOp::Cmp,
                2 => HiRegisterOp::Mov,
                3 => HiRegisterOp::BxBlx,
                _ => unreachable!(),
            };
            let h1 = op_code.get_bit(7);
            let h2 = op_code.get_bit(6);
            return Self::HiRegisterOpBx {
                operation,
                rs: u32::from(op_code.get_bits(3..=5)) + if h2 { 8 } else { 0 },
                rd: u32::from(op_code.get_bits(0..=2)) + if h1 { 8 } else { 0 },
            };
        }

        if op_code.get_bits(11..=15) == 0b00011 {
            return Self::AddSubtract {
                immediate: op_code.get_bit(10),
                subtract: op_code.get_bit(9),
                rn_or_imm: u32::from(op_code.get_bits(6..=8)),
                rs: u32::from(op_code.get_bits(3..=5)),
                rd: u32::from(op_code.get_bits(0..=2)),
            };
        }

        if op_code.get_bits(13..=15) == 0b000 {
            return Self::MoveShiftedRegister {
                shift_kind: ShiftKind::from(u32::from(op_code.get_bits(11..=12))),
                offset: u32::from(op_code.get_bits(6..=10)),
                rs: u32::from(op_code.get_bits(3..=5)),
                rd: u32::from(op_code.get_bits(0..=2)),
            };
        }

        if op_code.get_bits(13..=15) == 0b001 {
            let operation = match op_code.get_bits(11..=12) {
                0 => ImmediateOp::Mov,
                1 => ImmediateOp::Cmp,
                2 => ImmediateOp::Add,
                3 => ImmediateOp::Sub,
                _ => unreachable!(),
            };
            return Self::MoveCompareAddSubtractImm {
                operation,
                rd: u32::from(op_code.get_bits(8..=10)),
                immediate: u32::from(op_code.get_bits(0..=7)),
            };
        }

        if op_code.get_bits(11..=15) == 0b01001 {
            return Self::PcRelativeLoad {
                rd: u32::from(op_code.get_bits(8..=10)),
                word_offset: u32::from(op_code.get_bits(0..=7)),
            };
        }

        if op_code.get_bits(12..=15) == 0b0101 {
            let ro = u32::from(op_code.get_bits(6..=8));
            let rb = u32::from(op_code.get_bits(3..=5));
            let rd = u32::from(op_code.get_bits(0..=2));
            if op_code.get_bit(9) {
                return Self::LoadStoreSignExtended {
                    operation: op_code.get_bits(10..=11),
                    ro,
                    rb,
                    rd,
                };
            }
            return Self::LoadStoreRegisterOffset {
                load_store: op_code.get_bit(11).into(),
                byte: op_code.get_bit(10),
                ro,
                rb,
                rd,
            };
        }

        if op_code.get_bits(13..=15) == 0b011 {
            let byte = op_code.get_bit(12);
            let raw_offset = u32::from(op_code.get_bits(6..=10));
            return Self::LoadStoreImmOffset {
                load_store: op_code.get_bit(11).into(),
                byte,
                offset: if byte { raw_offset } else { raw_offset << 2 },
                rb: u32::from(op_code.get_bits(3..=5)),
                rd: u32::from(op_code.get_bits(0..=2)),
            };
        }

        if op_code.get_bits(12..=15) == 0b1000 {
            return Self::LoadStoreHalfword {
                load_store: op_code.get_bit(11).into(),
                offset: u32::from(op_code.get_bits(6..=10)) << 1,
                rb: u32::from(op_code.get_bits(3..=5)),
                rd: u32::from(op_code.get_bits(0..=2)),
            };
        }

        if op_code.get_bits(12..=15) == 0b1001 {
            return Self::SpRelativeLoadStore {
                load_store: op_code.get_bit(11).into(),
                rd: u32::from(op_code.get_bits(8..=10)),
                byte_offset: u32::from(op_code.get_bits(0..=7)) << 2,
            };
        }

        if op_code.get_bits(12..=15) == 0b1010 {
            return Self::LoadAddress {
                sp: op_code.get_bit(11),
                rd: u32::from(op_code.get_bits(8..=10)),
                byte_offset: u32::from(op_code.get_bits(0..=7)) << 2,
            };
        }

        if op_code.get_bits(12..=15) == 0b1011 && op_code.get_bits(9..=10) == 0b10 {
            return Self::PushPopRegisters {
                load_store: op_code.get_bit(11).into(),
                pc_lr: op_code.get_bit(8),
                register_list: op_code.get_bits(0..=7) as u8,
            };
        }

        if op_code.get_bits(12..=15) == 0b1100 {
            return Self::MultipleLoadStore {
                load_store: op_code.get_bit(11).into(),
                rb: u32::from(op_code.get_bits(8..=10)),
                register_list: op_code.get_bits(0..=7) as u8,
            };
        }

        if op_code.get_bits(12..=15) == 0b1101 {
            // Condition 0xE is an undefined encoding, 0xF is SWI (already
            // matched above).
            if op_code.get_bits(8..=11) == 0xE {
                return Self::Undefined;
            }
            let condition = Condition::from(op_code.get_bits(8..=11) as u8);
            let offset = i32::from(op_code.get_bits(0..=7) as u8 as i8) * 2;
            return Self::ConditionalBranch { condition, offset };
        }

        if op_code.get_bits(11..=15) == 0b11100 {
            let offset = ((i32::from(op_code.get_bits(0..=10)) << 21) >> 21) * 2;
            return Self::UnconditionalBranch { offset };
        }

        if op_code.get_bits(11..=15) == 0b11110 {
            return Self::LongBranchFirstHalf {
                offset: u32::from(op_code.get_bits(0..=10)),
            };
        }

        if op_code.get_bits(11..=15) == 0b11111 || op_code.get_bits(11..=15) == 0b11101 {
            return Self::LongBranchSecondHalf {
                exchange: op_code.get_bits(11..=15) == 0b11101,
                offset: u32::from(op_code.get_bits(0..=10)),
            };
        }

        Self::Undefined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decode_move_shifted_register() {
        // LSL R1, R2, #3
        let output = ThumbModeInstruction::from(0b000_00_00011_010_001);
        assert_eq!(
            output,
            ThumbModeInstruction::MoveShiftedRegister {
                shift_kind: ShiftKind::Lsl,
                offset: 3,
                rs: 2,
                rd: 1,
            }
        );
    }

    #[test]
    fn decode_add_subtract() {
        // SUB R1, R0, #7
        let output = ThumbModeInstruction::from(0b00011_1_1_111_000_001);
        assert_eq!(
            output,
            ThumbModeInstruction::AddSubtract {
                immediate: true,
                subtract: true,
                rn_or_imm: 7,
                rs: 0,
                rd: 1,
            }
        );
    }

    #[test]
    fn decode_alu_op() {
        // MUL R0, R4
        let output = ThumbModeInstruction::from(0b010000_1101_100_000);
        assert_eq!(
            output,
            ThumbModeInstruction::AluOp {
                operation: ThumbAluOp::Mul,
                rs: 4,
                rd: 0,
            }
        );
    }

    #[test]
    fn decode_hi_register_bx() {
        // BX LR
        let output = ThumbModeInstruction::from(0b010001_11_0_1_110_000);
        assert_eq!(
            output,
            ThumbModeInstruction::HiRegisterOpBx {
                operation: HiRegisterOp::BxBlx,
                rs: 14,
                rd: 0,
            }
        );
    }

    #[test]
    fn decode_pc_relative_load() {
        // LDR R1, [PC, #0x160]
        let output = ThumbModeInstruction::from(0b01001_001_0101_1000);
        assert_eq!(
            output,
            ThumbModeInstruction::PcRelativeLoad {
                rd: 1,
                word_offset: 0x58,
            }
        );
    }

    #[test]
    fn decode_load_store_imm_offset() {
        // STR R0, [R7, #52]
        let output = ThumbModeInstruction::from(0b011_0_0_01101_111_000);
        assert_eq!(
            output,
            ThumbModeInstruction::LoadStoreImmOffset {
                load_store: LoadStoreKind::Store,
                byte: false,
                offset: 52,
                rb: 7,
                rd: 0,
            }
        );
    }

    #[test]
    fn decode_push_pop() {
        // PUSH {R4-R7, LR}
        let output = ThumbModeInstruction::from(0b1011_0_10_1_1111_0000);
        assert_eq!(
            output,
            ThumbModeInstruction::PushPopRegisters {
                load_store: LoadStoreKind::Store,
                pc_lr: true,
                register_list: 0xF0,
            }
        );
    }

    #[test]
    fn decode_conditional_branch() {
        // BLT -8
        let output = ThumbModeInstruction::from(0b1101_1011_1111_1100);
        assert_eq!(
            output,
            ThumbModeInstruction::ConditionalBranch {
                condition: Condition::LT,
                offset: -8,
            }
        );
    }

    #[test]
    fn decode_swi() {
        let output = ThumbModeInstruction::from(0b1101_1111_0000_0110);
        assert_eq!(output, ThumbModeInstruction::SoftwareInterrupt { comment: 6 });
    }

    #[test]
    fn decode_unconditional_branch() {
        // B +606
        let output = ThumbModeInstruction::from(0b11100_00_1001_0111_1);
        assert_eq!(
            output,
            ThumbModeInstruction::UnconditionalBranch { offset: 606 }
        );

        // B -4
        let output = ThumbModeInstruction::from(0b11100_111_1111_1110);
        assert_eq!(output, ThumbModeInstruction::UnconditionalBranch { offset: -4 });
    }

    #[test]
    fn decode_long_branch_with_link() {
        let output = ThumbModeInstruction::from(0b11110_00000000001);
        assert_eq!(
            output,
            ThumbModeInstruction::LongBranchFirstHalf { offset: 1 }
        );

        let output = ThumbModeInstruction::from(0b11111_00000000001);
        assert_eq!(
            output,
            ThumbModeInstruction::LongBranchSecondHalf {
                exchange: false,
                offset: 1,
            }
        );

        // BLX form.
        let output = ThumbModeInstruction::from(0b11101_00000000010);
        assert_eq!(
            output,
            ThumbModeInstruction::LongBranchSecondHalf {
                exchange: true,
                offset: 2,
            }
        );
    }
}
