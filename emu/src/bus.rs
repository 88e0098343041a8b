//! The memory bus.
//!
//! Sole owner of every region buffer and hardware register block. All CPU,
//! DMA and save-state traffic goes through the `read_*`/`write_*` methods,
//! which decode the region from the address top byte, apply the per-region
//! width and mirroring rules and run the I/O side effects:
//!
//! - IF is write-1-to-clear; VCOUNT and KEYINPUT writes are ignored.
//! - A rising DMA enable bit latches the channel's internal registers and,
//!   for immediate start timing, runs the whole transfer inside the write.
//! - Timer control writes reload the counter on an enable rising edge.
//! - 8-bit stores to palette RAM replicate into the full halfword; 8-bit
//!   stores to OAM are dropped.
//! - Unmapped reads return 0 and unmapped writes are discarded, both
//!   counted by the diagnostics sink.
//!
//! 32-bit reads return the aligned word rotated right by `(addr & 3) * 8`
//! bits, which is what the CPU's unaligned LDR expects.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::dma::{max_count, AddressControl, Dma, StartTiming};
use crate::cpu::hardware::internal_memory::InternalMemory;
use crate::cpu::hardware::interrupt_control::{InterruptControl, INT_DMA0, INT_KEYPAD};
use crate::cpu::hardware::keypad::Keypad;
use crate::cpu::hardware::lcd::Lcd;
use crate::cpu::hardware::sound::Sound;
use crate::cpu::hardware::timers::Timers;
use crate::diagnostics::Diagnostics;

#[derive(Default, Serialize, Deserialize)]
pub struct Bus {
    pub internal_memory: InternalMemory,
    pub lcd: Lcd,
    pub sound: Sound,
    pub dma: Dma,
    pub timers: Timers,
    pub keypad: Keypad,
    pub interrupt_control: InterruptControl,

    #[serde(skip)]
    pub diagnostics: Diagnostics,

    /// Set by a HALTCNT write; drained by the frame driver.
    #[serde(skip)]
    halt_requested: bool,
}

impl Bus {
    #[must_use]
    pub fn with_rom(rom: Vec<u8>) -> Self {
        Self {
            internal_memory: InternalMemory::new(rom),
            ..Default::default()
        }
    }

    /// Reinitialize everything except the loaded ROM.
    pub fn reset(&mut self) {
        let rom = std::mem::take(&mut self.internal_memory.rom);
        *self = Self::with_rom(rom);
    }

    // ------------------------------------------------------------------
    // CPU-facing access
    // ------------------------------------------------------------------

    /// 8-bit read.
    pub fn read_byte(&mut self, address: u32) -> u8 {
        self.read_raw(address)
    }

    /// 8-bit write, with the byte-store quirks of the video regions.
    pub fn write_byte(&mut self, address: u32, value: u8) {
        match address >> 24 {
            0x05 => self.lcd.write_palette_byte(address, value),
            // Byte stores to OAM are ignored by the hardware.
            0x07 => {}
            _ => self.write_raw(address, value),
        }
    }

    /// 16-bit read, aligned to the halfword boundary.
    pub fn read_half_word(&mut self, address: u32) -> u16 {
        let aligned = address & !1;
        u16::from(self.read_raw(aligned)) | (u16::from(self.read_raw(aligned + 1)) << 8)
    }

    pub fn write_half_word(&mut self, address: u32, value: u16) {
        let aligned = address & !1;
        self.write_raw(aligned, value.get_byte(0));
        self.write_raw(aligned + 1, value.get_byte(1));
    }

    /// 32-bit read. Misaligned addresses return the aligned word rotated
    /// right by `(address & 3) * 8` bits.
    pub fn read_word(&mut self, address: u32) -> u32 {
        let aligned = address & !3;
        let mut value = 0_u32;
        for byte in 0..4 {
            value |= u32::from(self.read_raw(aligned + byte)) << (byte * 8);
        }
        value.rotate_right((address & 3) * 8)
    }

    pub fn write_word(&mut self, address: u32, value: u32) {
        let aligned = address & !3;
        for byte in 0..4_u8 {
            self.write_raw(aligned + u32::from(byte), value.get_byte(byte));
        }
    }

    fn read_raw(&mut self, address: u32) -> u8 {
        match address >> 24 {
            0x04 => self.read_io(address),
            0x05 => self.lcd.read_palette(address),
            0x06 => self.lcd.read_vram(address),
            0x07 => self.lcd.read_oam(address),
            _ => match self.internal_memory.read_at(address) {
                Some(value) => value,
                None => {
                    self.diagnostics.note_unmapped_read(address);
                    0
                }
            },
        }
    }

    fn write_raw(&mut self, address: u32, value: u8) {
        match address >> 24 {
            0x04 => self.write_io(address, value),
            0x05 => self.lcd.write_palette(address, value),
            0x06 => self.lcd.write_vram(address, value),
            0x07 => self.lcd.write_oam(address, value),
            _ => {
                if !self.internal_memory.write_at(address, value) {
                    self.diagnostics.note_unmapped_write(address, value);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // I/O registers
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_lines)]
    fn read_io(&mut self, address: u32) -> u8 {
        if address >= 0x0400_0400 {
            self.diagnostics.note_unmapped_read(address);
            return 0;
        }

        let offset = address - 0x0400_0000;
        let byte = (offset & 1) as u8;
        match offset {
            0x00 | 0x01 => self.lcd.dispcnt.get_byte(byte),
            0x02 | 0x03 => self.lcd.green_swap.get_byte(byte),
            0x04 | 0x05 => self.interrupt_control.dispstat.get_byte(byte),
            0x06 | 0x07 => self.interrupt_control.vcount.get_byte(byte),
            0x08..=0x0F => {
                let bg = ((offset - 0x08) / 2) as usize;
                self.lcd.bg_cnt[bg].get_byte(byte)
            }
            0x48 | 0x49 => self.lcd.winin.get_byte(byte),
            0x4A | 0x4B => self.lcd.winout.get_byte(byte),
            0x50 | 0x51 => self.lcd.bldcnt.get_byte(byte),
            0x52 | 0x53 => self.lcd.bldalpha.get_byte(byte),
            // Scroll, affine, window dimension, mosaic, BLDY and the sound
            // FIFOs are write-only.
            0x10..=0x47 | 0x4C..=0x4F | 0x54..=0x5F | 0xA0..=0xA7 => 0,
            0x60..=0x9F => self.read_sound(offset),
            0xB0..=0xDF => {
                let channel = ((offset - 0xB0) / 12) as usize;
                let reg = (offset - 0xB0) % 12;
                match reg {
                    // Source, destination and count are write-only.
                    0..=9 => 0,
                    _ => self.dma.channels[channel].control.get_byte((reg - 10) as u8),
                }
            }
            0x100..=0x10F => {
                let timer = ((offset - 0x100) / 4) as usize;
                match (offset - 0x100) % 4 {
                    0 => self.timers.timers[timer].counter.get_byte(0),
                    1 => self.timers.timers[timer].counter.get_byte(1),
                    2 => self.timers.timers[timer].control.get_byte(0),
                    _ => self.timers.timers[timer].control.get_byte(1),
                }
            }
            0x130 | 0x131 => self.keypad.key_input.get_byte(byte),
            0x132 | 0x133 => self.keypad.key_interrupt_control.get_byte(byte),
            0x200 | 0x201 => self.interrupt_control.interrupt_enable.get_byte(byte),
            0x202 | 0x203 => self.interrupt_control.interrupt_request.get_byte(byte),
            0x204 | 0x205 => self.interrupt_control.wait_state_control.get_byte(byte),
            0x208 | 0x209 => self.interrupt_control.interrupt_master_enable.get_byte(byte),
            0x300 => self.interrupt_control.post_boot_flag,
            // Serial and the remaining gaps read as zero.
            _ => 0,
        }
    }

    #[allow(clippy::too_many_lines)]
    fn write_io(&mut self, address: u32, value: u8) {
        if address >= 0x0400_0400 {
            self.diagnostics.note_unmapped_write(address, value);
            return;
        }

        let offset = address - 0x0400_0000;
        let byte = (offset & 1) as u8;
        match offset {
            0x00 | 0x01 => self.lcd.dispcnt.set_byte(byte, value),
            0x02 | 0x03 => self.lcd.green_swap.set_byte(byte, value),
            0x04 => self.interrupt_control.write_dispstat_low(value),
            0x05 => self.interrupt_control.dispstat.set_byte(1, value),
            // VCOUNT is read-only.
            0x06 | 0x07 => {}
            0x08..=0x0F => {
                let bg = ((offset - 0x08) / 2) as usize;
                self.lcd.bg_cnt[bg].set_byte(byte, value);
            }
            0x10..=0x1F => {
                let half = (offset - 0x10) / 2;
                let bg = (half / 2) as usize;
                if half % 2 == 0 {
                    self.lcd.bg_hofs[bg].set_byte(byte, value);
                } else {
                    self.lcd.bg_vofs[bg].set_byte(byte, value);
                }
            }
            0x20 | 0x21 => self.lcd.bg2pa.set_byte(byte, value),
            0x22 | 0x23 => self.lcd.bg2pb.set_byte(byte, value),
            0x24 | 0x25 => self.lcd.bg2pc.set_byte(byte, value),
            0x26 | 0x27 => self.lcd.bg2pd.set_byte(byte, value),
            0x28..=0x2B => self.lcd.write_bg2x_byte((offset - 0x28) as u8, value),
            0x2C..=0x2F => self.lcd.write_bg2y_byte((offset - 0x2C) as u8, value),
            0x30 | 0x31 => self.lcd.bg3pa.set_byte(byte, value),
            0x32 | 0x33 => self.lcd.bg3pb.set_byte(byte, value),
            0x34 | 0x35 => self.lcd.bg3pc.set_byte(byte, value),
            0x36 | 0x37 => self.lcd.bg3pd.set_byte(byte, value),
            0x38..=0x3B => self.lcd.write_bg3x_byte((offset - 0x38) as u8, value),
            0x3C..=0x3F => self.lcd.write_bg3y_byte((offset - 0x3C) as u8, value),
            0x40 | 0x41 => self.lcd.win0h.set_byte(byte, value),
            0x42 | 0x43 => self.lcd.win1h.set_byte(byte, value),
            0x44 | 0x45 => self.lcd.win0v.set_byte(byte, value),
            0x46 | 0x47 => self.lcd.win1v.set_byte(byte, value),
            0x48 | 0x49 => self.lcd.winin.set_byte(byte, value),
            0x4A | 0x4B => self.lcd.winout.set_byte(byte, value),
            0x4C | 0x4D => self.lcd.mosaic.set_byte(byte, value),
            0x50 | 0x51 => self.lcd.bldcnt.set_byte(byte, value),
            0x52 | 0x53 => self.lcd.bldalpha.set_byte(byte, value),
            0x54 | 0x55 => self.lcd.bldy.set_byte(byte, value),
            0x60..=0xA7 => self.write_sound(offset, value),
            0xB0..=0xDF => self.write_dma(offset, value),
            0x100..=0x10F => {
                let timer = ((offset - 0x100) / 4) as usize;
                let sub = (offset - 0x100) % 4;
                match sub {
                    0 | 1 => {
                        let mut reload = self.timers.timers[timer].reload;
                        reload.set_byte(sub as u8, value);
                        self.timers.write_reload(timer, reload);
                    }
                    _ => {
                        let mut control = self.timers.timers[timer].control;
                        control.set_byte((sub - 2) as u8, value);
                        self.timers.write_control(timer, control);
                    }
                }
            }
            // KEYINPUT is produced by the input subsystem.
            0x130 | 0x131 => {}
            0x132 | 0x133 => self.keypad.key_interrupt_control.set_byte(byte, value),
            0x200 | 0x201 => self.interrupt_control.interrupt_enable.set_byte(byte, value),
            // Each written 1 bit acknowledges that pending interrupt.
            0x202 => self.interrupt_control.acknowledge(u16::from(value)),
            0x203 => self.interrupt_control.acknowledge(u16::from(value) << 8),
            0x204 | 0x205 => self
                .interrupt_control
                .wait_state_control
                .set_byte(byte, value),
            0x208 | 0x209 => self
                .interrupt_control
                .interrupt_master_enable
                .set_byte(byte, value),
            0x300 => self.interrupt_control.post_boot_flag = value,
            0x301 => self.halt_requested = true,
            // Serial and the remaining holes swallow the write.
            0x110..=0x12F | 0x134..=0x1FF | 0x206 | 0x207 | 0x20A..=0x2FF => {}
            _ => self.diagnostics.note_unmapped_write(address, value),
        }
    }

    fn read_sound(&self, offset: u32) -> u8 {
        let byte = (offset & 1) as u8;
        match offset {
            0x60 | 0x61 => self.sound.channel1_sweep.get_byte(byte),
            0x62 | 0x63 => self.sound.channel1_duty_length_envelope.get_byte(byte),
            0x64 | 0x65 => self.sound.channel1_frequency_control.get_byte(byte),
            0x68 | 0x69 => self.sound.channel2_duty_length_envelope.get_byte(byte),
            0x6C | 0x6D => self.sound.channel2_frequency_control.get_byte(byte),
            0x70 | 0x71 => self.sound.channel3_stop_wave_ram_select.get_byte(byte),
            0x72 | 0x73 => self.sound.channel3_length_volume.get_byte(byte),
            0x74 | 0x75 => self.sound.channel3_frequency_control.get_byte(byte),
            0x78 | 0x79 => self.sound.channel4_length_envelope.get_byte(byte),
            0x7C | 0x7D => self.sound.channel4_frequency_control.get_byte(byte),
            0x80 | 0x81 => self.sound.control_stereo_volume_enable.get_byte(byte),
            0x82 | 0x83 => self.sound.control_mixing_dma_control.get_byte(byte),
            0x84 | 0x85 => self.sound.control_sound_on_off.get_byte(byte),
            0x88 | 0x89 => self.sound.sound_pwm_control.get_byte(byte),
            0x90..=0x9F => self.sound.channel3_wave_pattern_ram[(offset - 0x90) as usize],
            _ => 0,
        }
    }

    fn write_sound(&mut self, offset: u32, value: u8) {
        let byte = (offset & 1) as u8;
        match offset {
            0x60 | 0x61 => self.sound.channel1_sweep.set_byte(byte, value),
            0x62 | 0x63 => self.sound.channel1_duty_length_envelope.set_byte(byte, value),
            0x64 | 0x65 => self.sound.channel1_frequency_control.set_byte(byte, value),
            0x68 | 0x69 => self.sound.channel2_duty_length_envelope.set_byte(byte, value),
            0x6C | 0x6D => self.sound.channel2_frequency_control.set_byte(byte, value),
            0x70 | 0x71 => self.sound.channel3_stop_wave_ram_select.set_byte(byte, value),
            0x72 | 0x73 => self.sound.channel3_length_volume.set_byte(byte, value),
            0x74 | 0x75 => self.sound.channel3_frequency_control.set_byte(byte, value),
            0x78 | 0x79 => self.sound.channel4_length_envelope.set_byte(byte, value),
            0x7C | 0x7D => self.sound.channel4_frequency_control.set_byte(byte, value),
            0x80 | 0x81 => self.sound.control_stereo_volume_enable.set_byte(byte, value),
            0x82 | 0x83 => self.sound.control_mixing_dma_control.set_byte(byte, value),
            0x84 | 0x85 => self.sound.control_sound_on_off.set_byte(byte, value),
            0x88 | 0x89 => self.sound.sound_pwm_control.set_byte(byte, value),
            0x90..=0x9F => {
                self.sound.channel3_wave_pattern_ram[(offset - 0x90) as usize] = value;
            }
            // FIFO ports accept and discard; nothing synthesizes audio.
            0xA0..=0xA7 => {}
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // DMA
    // ------------------------------------------------------------------

    fn write_dma(&mut self, offset: u32, value: u8) {
        let index = ((offset - 0xB0) / 12) as usize;
        let reg = (offset - 0xB0) % 12;
        let channel = &mut self.dma.channels[index];

        match reg {
            0..=3 => channel.source_address.set_byte(reg as u8, value),
            4..=7 => channel.destination_address.set_byte((reg - 4) as u8, value),
            8 | 9 => channel.word_count.set_byte((reg - 8) as u8, value),
            _ => {
                let mut control = channel.control;
                control.set_byte((reg - 10) as u8, value);
                let enable_rising = channel.update_control(control);
                if enable_rising {
                    channel.latch(max_count(index));
                    if channel.start_timing() == StartTiming::Immediate {
                        self.execute_dma(index);
                    }
                }
            }
        }
    }

    /// Fire every enabled channel waiting on the given start timing.
    pub fn trigger_dma(&mut self, timing: StartTiming) {
        for index in 0..4 {
            let channel = &self.dma.channels[index];
            if channel.enabled && channel.start_timing() == timing {
                self.execute_dma(index);
            }
        }
    }

    fn execute_dma(&mut self, index: usize) {
        let channel = &self.dma.channels[index];
        let word = channel.word_transfer;
        let unit: u32 = if word { 4 } else { 2 };
        let count = channel.internal_count;
        let repeat = channel.repeat;
        let irq_enable = channel.irq_enable;
        let source_control = channel.source_control();
        let destination_control = channel.destination_control();

        let step = |control: AddressControl| -> i64 {
            match control {
                AddressControl::Increment | AddressControl::IncrementReload => i64::from(unit),
                AddressControl::Decrement => -i64::from(unit),
                AddressControl::Fixed => 0,
            }
        };
        let source_step = step(source_control);
        let destination_step = step(destination_control);

        let mut source = channel.internal_source;
        let mut destination = channel.internal_dest;

        for _ in 0..count {
            // The DMA unit only drives 28 address bits.
            let from = source & 0x0FFF_FFFF;
            let to = destination & 0x0FFF_FFFF;
            if word {
                let value = self.read_word(from & !3);
                self.write_word(to & !3, value);
            } else {
                let value = self.read_half_word(from & !1);
                self.write_half_word(to & !1, value);
            }
            source = source.wrapping_add(source_step as u32);
            destination = destination.wrapping_add(destination_step as u32);
        }

        let channel = &mut self.dma.channels[index];
        channel.internal_source = source;
        channel.internal_dest = destination;

        if repeat {
            channel.internal_count = if channel.word_count == 0 {
                max_count(index)
            } else {
                u32::from(channel.word_count)
            };
            if destination_control == AddressControl::IncrementReload {
                channel.internal_dest = channel.destination_address;
            }
        } else {
            channel.disable();
        }

        if irq_enable {
            self.interrupt_control.raise(INT_DMA0 << index);
        }
    }

    // ------------------------------------------------------------------
    // Frame-driver hooks
    // ------------------------------------------------------------------

    /// Advance the timers; overflow interrupts land in the interrupt
    /// controller before the CPU's next instruction.
    pub fn tick_timers(&mut self, cycles: u32) {
        let Self {
            timers,
            interrupt_control,
            ..
        } = self;
        timers.tick(cycles, interrupt_control);
    }

    /// Latch the host button mask: mirrors it into the fixed EWRAM input
    /// byte, synthesizes the active-low KEYINPUT register and evaluates the
    /// KEYCNT interrupt condition.
    pub fn set_buttons(&mut self, mask: u16) {
        self.internal_memory.set_ai_input(mask as u8);
        self.keypad.set_buttons(mask);
        if self.keypad.irq_requested() {
            self.interrupt_control.raise(INT_KEYPAD);
        }
    }

    #[must_use]
    pub const fn irq_pending(&self) -> bool {
        self.interrupt_control.pending()
    }

    pub fn take_halt_request(&mut self) -> bool {
        std::mem::take(&mut self.halt_requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ewram_mirroring() {
        let mut bus = Bus::default();
        bus.write_byte(0x0200_1234, 0xAB);

        let mut address = 0x0200_1234_u32;
        while address < 0x0300_0000 {
            assert_eq!(bus.read_byte(address), 0xAB);
            address += 0x0004_0000;
        }
    }

    #[test]
    fn iwram_mirroring() {
        let mut bus = Bus::default();
        bus.write_byte(0x0300_0042, 0x55);

        let mut address = 0x0300_0042_u32;
        while address < 0x0400_0000 {
            assert_eq!(bus.read_byte(address), 0x55);
            address += 0x0000_8000;
        }
    }

    #[test]
    fn palette_endianness_and_byte_replication() {
        let mut bus = Bus::default();
        bus.write_half_word(0x0500_0000, 0xBEEF);
        assert_eq!(bus.read_half_word(0x0500_0000), 0xBEEF);
        assert_eq!(bus.read_byte(0x0500_0000), 0xEF);
        assert_eq!(bus.read_byte(0x0500_0001), 0xBE);

        // 8-bit palette stores fill the whole halfword.
        bus.write_byte(0x0500_0010, 0x12);
        assert_eq!(bus.read_half_word(0x0500_0010), 0x1212);
        bus.write_byte(0x0500_0013, 0x34);
        assert_eq!(bus.read_half_word(0x0500_0012), 0x3434);
    }

    #[test]
    fn oam_ignores_byte_stores() {
        let mut bus = Bus::default();
        bus.write_byte(0x0700_0000, 0x77);
        assert_eq!(bus.read_byte(0x0700_0000), 0);

        bus.write_half_word(0x0700_0000, 0x1234);
        assert_eq!(bus.read_half_word(0x0700_0000), 0x1234);
    }

    #[test]
    fn rotated_unaligned_word_read() {
        let mut bus = Bus::default();
        bus.write_word(0x0200_0000, 0x1122_3344);

        assert_eq!(bus.read_word(0x0200_0000), 0x1122_3344);
        assert_eq!(bus.read_word(0x0200_0001), 0x4411_2233);
        assert_eq!(bus.read_word(0x0200_0002), 0x3344_1122);
        assert_eq!(bus.read_word(0x0200_0003), 0x2233_4411);
    }

    #[test]
    fn unmapped_reads_zero_and_count() {
        let mut bus = Bus::default();
        assert_eq!(bus.read_byte(0x1234_5678), 0);
        bus.write_byte(0x1234_5678, 9);
        assert_eq!(bus.diagnostics.unmapped_reads(), 1);
        assert_eq!(bus.diagnostics.unmapped_writes(), 1);
    }

    #[test]
    fn vcount_write_ignored() {
        let mut bus = Bus::default();
        bus.interrupt_control.vcount = 93;
        bus.write_half_word(0x0400_0006, 12);
        assert_eq!(bus.read_half_word(0x0400_0006), 93);
    }

    #[test]
    fn keyinput_write_ignored() {
        let mut bus = Bus::default();
        bus.write_half_word(0x0400_0130, 0);
        assert_eq!(bus.read_half_word(0x0400_0130), 0x03FF);
    }

    #[test]
    fn interrupt_flag_write_one_to_clear() {
        let mut bus = Bus::default();
        bus.interrupt_control.raise(0x0101);
        bus.write_half_word(0x0400_0202, 0x0001);
        assert_eq!(bus.read_half_word(0x0400_0202), 0x0100);
        bus.write_half_word(0x0400_0202, 0x0100);
        assert_eq!(bus.read_half_word(0x0400_0202), 0);
    }

    #[test]
    fn haltcnt_requests_halt() {
        let mut bus = Bus::default();
        assert!(!bus.take_halt_request());
        bus.write_byte(0x0400_0301, 0);
        assert!(bus.take_halt_request());
        assert!(!bus.take_halt_request());
    }

    #[test]
    fn dispstat_write_preserves_flags() {
        let mut bus = Bus::default();
        bus.interrupt_control.update_vcount(160);
        bus.write_half_word(0x0400_0004, 0x0008);
        let dispstat = bus.read_half_word(0x0400_0004);
        assert!(dispstat.get_bit(0));
        assert!(dispstat.get_bit(3));
    }

    #[test]
    fn timer_reload_and_counter_read() {
        let mut bus = Bus::default();
        bus.write_half_word(0x0400_0100, 0xF000);
        // Counter tracks reload while the timer is disabled.
        assert_eq!(bus.read_half_word(0x0400_0100), 0xF000);

        bus.write_half_word(0x0400_0102, 0x0080);
        bus.tick_timers(16);
        assert_eq!(bus.read_half_word(0x0400_0100), 0xF010);
        assert_eq!(bus.read_half_word(0x0400_0102), 0x0080);
    }

    #[test]
    fn dma_immediate_transfer_increment() {
        let mut bus = Bus::default();
        for i in 0..4_u32 {
            bus.write_word(0x0200_0000 + i * 4, 0xAABB_0000 | i);
        }

        bus.write_word(0x0400_00B0, 0x0200_0000);
        bus.write_word(0x0400_00B4, 0x0300_0000);
        bus.write_half_word(0x0400_00B8, 4);
        // Enable, 32-bit, immediate, src/dst increment.
        bus.write_half_word(0x0400_00BA, 0x8400);

        for i in 0..4_u32 {
            assert_eq!(bus.read_word(0x0300_0000 + i * 4), 0xAABB_0000 | i);
        }
        // Channel disabled after a non-repeating transfer, addresses
        // advanced past the block.
        assert!(!bus.dma.channels[0].enabled);
        assert_eq!(bus.dma.channels[0].internal_source, 0x0200_0010);
        assert_eq!(bus.dma.channels[0].internal_dest, 0x0300_0010);
    }

    #[test]
    fn dma_immediate_transfer_decrement_and_fixed() {
        let mut bus = Bus::default();
        bus.write_half_word(0x0200_0000, 0x1111);
        bus.write_half_word(0x0200_0002, 0x2222);

        // Source decrement from 0x02000002, destination fixed.
        bus.write_word(0x0400_00B0, 0x0200_0002);
        bus.write_word(0x0400_00B4, 0x0300_0000);
        bus.write_half_word(0x0400_00B8, 2);
        // Enable, 16-bit, immediate, src decrement (bit 7), dst fixed
        // (bits 5-6 = 10).
        bus.write_half_word(0x0400_00BA, 0x8000 | (1 << 7) | (2 << 5));

        // Both halfwords landed on the same destination; the last one wins.
        assert_eq!(bus.read_half_word(0x0300_0000), 0x1111);
        assert_eq!(bus.dma.channels[0].internal_source, 0x0200_0002 - 4);
        assert_eq!(bus.dma.channels[0].internal_dest, 0x0300_0000);
    }

    #[test]
    fn dma_repeat_with_destination_reload() {
        let mut bus = Bus::default();
        bus.write_half_word(0x0200_0000, 0xABCD);

        bus.write_word(0x0400_00B0, 0x0200_0000);
        bus.write_word(0x0400_00B4, 0x0300_0000);
        bus.write_half_word(0x0400_00B8, 1);
        // Enable, repeat, VBlank timing, dst increment+reload, src fixed.
        let control = 0x8000 | (1 << 9) | (1 << 12) | (3 << 5) | (2 << 7);
        bus.write_half_word(0x0400_00BA, control);

        // Not immediate: nothing has run yet.
        assert_eq!(bus.read_half_word(0x0300_0000), 0);

        bus.trigger_dma(StartTiming::VBlank);
        assert_eq!(bus.read_half_word(0x0300_0000), 0xABCD);
        assert!(bus.dma.channels[0].enabled);
        // Destination reloaded for the next trigger.
        assert_eq!(bus.dma.channels[0].internal_dest, 0x0300_0000);

        bus.trigger_dma(StartTiming::VBlank);
        assert!(bus.dma.channels[0].enabled);
    }

    #[test]
    fn dma_irq_on_completion() {
        let mut bus = Bus::default();
        bus.write_word(0x0400_00D4, 0x0200_0000);
        bus.write_word(0x0400_00D8, 0x0300_0000);
        bus.write_half_word(0x0400_00DC, 1);
        bus.write_half_word(0x0400_00DE, 0x8000 | (1 << 14));

        assert_ne!(
            bus.interrupt_control.interrupt_request & (INT_DMA0 << 3),
            0
        );
    }

    #[test]
    fn dma_count_zero_is_max() {
        let mut bus = Bus::default();
        bus.write_word(0x0400_00B0, 0x0200_0000);
        bus.write_word(0x0400_00B4, 0x0201_0000);
        bus.write_half_word(0x0400_00B8, 0);
        bus.write_half_word(0x0400_00BA, 0x8000);

        // 0x4000 halfwords were copied.
        assert_eq!(bus.dma.channels[0].internal_source, 0x0200_0000 + 0x8000);
    }

    #[test]
    fn buttons_reach_keyinput_and_ewram() {
        let mut bus = Bus::default();
        bus.set_buttons(0b1000_0001);
        assert_eq!(bus.read_half_word(0x0400_0130), 0x03FF & !0b1000_0001);
        assert_eq!(bus.read_byte(0x0203_CF64), 0b1000_0001);
    }

    #[test]
    fn gpio_window_inside_rom() {
        let mut bus = Bus::with_rom(vec![0; 0x200]);
        // Direction: all four pins output; control: readable.
        bus.write_byte(0x0800_00C6, 0x0F);
        bus.write_byte(0x0800_00C8, 0x01);
        bus.write_byte(0x0800_00C4, 0x05);
        assert_eq!(bus.read_byte(0x0800_00C4), 0x05);
        assert_eq!(bus.read_byte(0x0800_00C6), 0x0F);
    }
}
