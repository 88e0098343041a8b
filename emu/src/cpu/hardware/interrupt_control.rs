//! IE/IF/IME bookkeeping plus the display status registers that drive the
//! video interrupts.
//!
//! DISPSTAT and VCOUNT live here rather than with the LCD because every
//! flag transition they expose (VBlank, HBlank, VCount match) is an
//! interrupt source. Flags change at scanline granularity: `update_vcount`
//! runs once at the start of every scanline and `enter_hblank` once at the
//! end of every visible one.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

pub const INT_VBLANK: u16 = 1 << 0;
pub const INT_HBLANK: u16 = 1 << 1;
pub const INT_VCOUNT: u16 = 1 << 2;
pub const INT_TIMER0: u16 = 1 << 3;
pub const INT_TIMER1: u16 = 1 << 4;
pub const INT_TIMER2: u16 = 1 << 5;
pub const INT_TIMER3: u16 = 1 << 6;
pub const INT_SERIAL: u16 = 1 << 7;
pub const INT_DMA0: u16 = 1 << 8;
pub const INT_DMA1: u16 = 1 << 9;
pub const INT_DMA2: u16 = 1 << 10;
pub const INT_DMA3: u16 = 1 << 11;
pub const INT_KEYPAD: u16 = 1 << 12;
pub const INT_GAMEPAK: u16 = 1 << 13;

#[derive(Default, Serialize, Deserialize)]
pub struct InterruptControl {
    /// IE, 0x04000200.
    pub interrupt_enable: u16,
    /// IF, 0x04000202. Write-1-to-clear from the CPU side.
    pub interrupt_request: u16,
    /// IME, 0x04000208. Only bit 0 matters.
    pub interrupt_master_enable: u16,
    /// DISPSTAT, 0x04000004. Bits 0-2 are hardware-owned status flags.
    pub dispstat: u16,
    /// VCOUNT, 0x04000006. Read-only for the CPU.
    pub vcount: u16,
    last_vcount: u16,
    /// WAITCNT, 0x04000204. Stored, not interpreted (no wait states).
    pub wait_state_control: u16,
    /// POSTFLG, 0x04000300.
    pub post_boot_flag: u8,
}

impl InterruptControl {
    pub fn raise(&mut self, flags: u16) {
        self.interrupt_request |= flags;
    }

    /// Write-1-to-clear acknowledge.
    pub fn acknowledge(&mut self, flags: u16) {
        self.interrupt_request &= !flags;
    }

    /// True when an enabled interrupt is pending and the master switch is
    /// on. The CPU's own I bit is checked by the caller.
    #[must_use]
    pub const fn pending(&self) -> bool {
        self.interrupt_master_enable & 1 != 0
            && self.interrupt_enable & self.interrupt_request != 0
    }

    /// Start-of-scanline bookkeeping: updates VCOUNT and the VBlank/VCount
    /// flags, raising their interrupts on the configured transitions.
    pub fn update_vcount(&mut self, scanline: u16) {
        let prev = self.last_vcount;
        self.vcount = scanline;
        self.last_vcount = scanline;

        // A new scanline starts outside the horizontal blank.
        self.dispstat.set_bit_off(1);

        let vcount_setting = self.dispstat.get_byte(1);
        if scanline == u16::from(vcount_setting) {
            self.dispstat.set_bit_on(2);
            if self.dispstat.get_bit(5) {
                self.raise(INT_VCOUNT);
            }
        } else {
            self.dispstat.set_bit_off(2);
        }

        // VBlank raises only on the rising transition into scanline 160 so
        // a frame fires it exactly once.
        if scanline == 160 && prev != 160 {
            self.dispstat.set_bit_on(0);
            if self.dispstat.get_bit(3) {
                self.raise(INT_VBLANK);
            }
        } else if scanline == 0 {
            self.dispstat.set_bit_off(0);
        }
    }

    /// End-of-visible-scanline bookkeeping.
    pub fn enter_hblank(&mut self) {
        self.dispstat.set_bit_on(1);
        if self.dispstat.get_bit(4) {
            self.raise(INT_HBLANK);
        }
    }

    /// DISPSTAT low byte write: the three status flags are read-only.
    pub fn write_dispstat_low(&mut self, value: u8) {
        let preserved = self.dispstat & 0b111;
        self.dispstat.set_byte(0, value & 0xF8);
        self.dispstat |= preserved;
    }
}
