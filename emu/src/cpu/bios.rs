//! High-level emulation of the BIOS software interrupt services.
//!
//! SWIs are serviced directly at the call site: no BIOS machine code runs
//! and the PC falls through to the next instruction unless the service
//! itself redirects it (SoftReset). Unrecognized calls return unchanged.
//!
//! The service number is the low byte of the SWI comment field, matching
//! how the games this core targets encode their calls.

use crate::bus::Bus;
use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::cpu_modes::Mode;
use crate::cpu::psr::CpuState;
use crate::cpu::registers::REG_SP;

/// Value returned by GetBiosChecksum on the original hardware.
const BIOS_CHECKSUM: u32 = 0xBAAE_187F;

/// Dispatch a software interrupt. Returns the consumed cycles.
pub fn software_interrupt(cpu: &mut Arm7tdmi, bus: &mut Bus, comment: u32) -> u32 {
    match comment & 0xFF {
        0x00 => soft_reset(cpu, bus),
        // Halt, Stop, IntrWait, VBlankIntrWait: park the CPU until an
        // interrupt is delivered. The frame driver keeps burning scanline
        // time while halted.
        0x02..=0x05 => cpu.halted = true,
        0x06 => divide(cpu),
        0x08 => square_root(cpu),
        0x0B => cpu_set(cpu, bus),
        0x0C => cpu_fast_set(cpu, bus),
        0x0D => cpu.registers.set_register_at(0, BIOS_CHECKSUM),
        0x11 | 0x12 => lz77_decompress(cpu, bus),
        0x14 | 0x15 => run_length_decompress(cpu, bus),
        service => {
            tracing::debug!("unimplemented BIOS call {service:#04X}");
        }
    }
    3
}

fn soft_reset(cpu: &mut Arm7tdmi, bus: &mut Bus) {
    cpu.swap_mode(Mode::Supervisor);
    cpu.cpsr.set_irq_disable(true);
    cpu.cpsr.set_fiq_disable(true);
    cpu.cpsr.set_cpu_state(CpuState::Arm);
    cpu.registers.set_register_at(REG_SP, 0x0300_7F00);
    cpu.jump_to(bus, 0x0800_0000);
}

/// R0 / R1 -> quotient in R0, remainder in R1, |quotient| in R3.
fn divide(cpu: &mut Arm7tdmi) {
    let numerator = cpu.registers.register_at(0) as i32;
    let denominator = cpu.registers.register_at(1) as i32;

    if denominator == 0 {
        cpu.registers.set_register_at(0, 0);
        cpu.registers.set_register_at(1, 0);
        cpu.registers.set_register_at(3, 0);
        return;
    }

    let quotient = numerator.wrapping_div(denominator);
    let remainder = numerator.wrapping_rem(denominator);
    cpu.registers.set_register_at(0, quotient as u32);
    cpu.registers.set_register_at(1, remainder as u32);
    cpu.registers
        .set_register_at(3, quotient.unsigned_abs());
}

/// Integer square root of R0.
fn square_root(cpu: &mut Arm7tdmi) {
    let mut value = cpu.registers.register_at(0);
    let mut result = 0_u32;
    let mut bit = 1_u32 << 30;

    while bit > value {
        bit >>= 2;
    }
    while bit != 0 {
        if value >= result + bit {
            value -= result + bit;
            result = (result >> 1) + bit;
        } else {
            result >>= 1;
        }
        bit >>= 2;
    }

    cpu.registers.set_register_at(0, result);
}

/// Memory fill/copy: R0 source, R1 destination, R2 count and flags
/// (bit 24 fixed source, bit 26 word-sized units).
fn cpu_set(cpu: &mut Arm7tdmi, bus: &mut Bus) {
    let mut source = cpu.registers.register_at(0);
    let mut destination = cpu.registers.register_at(1);
    let length_mode = cpu.registers.register_at(2);

    let count = length_mode & 0x1F_FFFF;
    let fixed_source = length_mode & (1 << 24) != 0;
    let word_units = length_mode & (1 << 26) != 0;

    for _ in 0..count {
        if word_units {
            let value = bus.read_word(source & !3);
            bus.write_word(destination & !3, value);
            if !fixed_source {
                source = source.wrapping_add(4);
            }
            destination = destination.wrapping_add(4);
        } else {
            let value = bus.read_half_word(source & !1);
            bus.write_half_word(destination & !1, value);
            if !fixed_source {
                source = source.wrapping_add(2);
            }
            destination = destination.wrapping_add(2);
        }
    }
}

/// Word-only variant of `cpu_set`.
fn cpu_fast_set(cpu: &mut Arm7tdmi, bus: &mut Bus) {
    let mut source = cpu.registers.register_at(0);
    let mut destination = cpu.registers.register_at(1);
    let length_mode = cpu.registers.register_at(2);

    let count = length_mode & 0x1F_FFFF;
    let fixed_source = length_mode & (1 << 24) != 0;

    for _ in 0..count {
        let value = bus.read_word(source & !3);
        bus.write_word(destination & !3, value);
        if !fixed_source {
            source = source.wrapping_add(4);
        }
        destination = destination.wrapping_add(4);
    }
}

/// LZ77UnComp: R0 compressed source (4-byte header with the decompressed
/// size in bits 8-31), R1 destination. R0 is left past the consumed input.
fn lz77_decompress(cpu: &mut Arm7tdmi, bus: &mut Bus) {
    let mut source = cpu.registers.register_at(0);
    let destination = cpu.registers.register_at(1);

    let header = bus.read_word(source & !3);
    let size = header >> 8;
    source = source.wrapping_add(4);

    let mut written = 0_u32;
    while written < size {
        let flags = bus.read_byte(source);
        source = source.wrapping_add(1);

        for slot in 0..8 {
            if written >= size {
                break;
            }
            if flags & (0x80 >> slot) != 0 {
                // Back-reference: 4-bit length-3, 12-bit distance-1.
                let first = bus.read_byte(source);
                let second = bus.read_byte(source.wrapping_add(1));
                source = source.wrapping_add(2);

                let length = u32::from(first >> 4) + 3;
                let distance = ((u32::from(first & 0xF) << 8) | u32::from(second)) + 1;

                for _ in 0..length {
                    if written >= size {
                        break;
                    }
                    let value =
                        bus.read_byte(destination.wrapping_add(written).wrapping_sub(distance));
                    bus.write_byte(destination.wrapping_add(written), value);
                    written += 1;
                }
            } else {
                let value = bus.read_byte(source);
                source = source.wrapping_add(1);
                bus.write_byte(destination.wrapping_add(written), value);
                written += 1;
            }
        }
    }

    cpu.registers.set_register_at(0, source);
}

/// RLUnComp: run-length blocks with bit 7 selecting a run (length-3, one
/// data byte) over a literal stretch (length-1 bytes).
fn run_length_decompress(cpu: &mut Arm7tdmi, bus: &mut Bus) {
    let mut source = cpu.registers.register_at(0);
    let destination = cpu.registers.register_at(1);

    let header = bus.read_word(source & !3);
    let size = header >> 8;
    source = source.wrapping_add(4);

    let mut written = 0_u32;
    while written < size {
        let flag = bus.read_byte(source);
        source = source.wrapping_add(1);

        if flag & 0x80 != 0 {
            let length = u32::from(flag & 0x7F) + 3;
            let value = bus.read_byte(source);
            source = source.wrapping_add(1);
            for _ in 0..length {
                if written >= size {
                    break;
                }
                bus.write_byte(destination.wrapping_add(written), value);
                written += 1;
            }
        } else {
            let length = u32::from(flag & 0x7F) + 1;
            for _ in 0..length {
                if written >= size {
                    break;
                }
                let value = bus.read_byte(source);
                source = source.wrapping_add(1);
                bus.write_byte(destination.wrapping_add(written), value);
                written += 1;
            }
        }
    }

    cpu.registers.set_register_at(0, source);
}
