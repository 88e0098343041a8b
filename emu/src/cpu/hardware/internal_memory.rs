//! Backing store for BIOS, work RAM, cartridge ROM, flash and the GPIO
//! port.
//!
//! # Regions handled here
//!
//! | Region     | Address range           | Size    | Mirroring              |
//! |------------|-------------------------|---------|------------------------|
//! | BIOS       | `0x0000_0000-0000_3FFF` | 16 KiB  | none (HLE, reads as 0) |
//! | EWRAM      | `0x0200_0000-02FF_FFFF` | 256 KiB | every 256 KiB          |
//! | IWRAM      | `0x0300_0000-03FF_FFFF` | 32 KiB  | every 32 KiB, plus the |
//! |            | `0x0100_0000-01FF_FFFF` |         | 0x01 window            |
//! | ROM        | `0x0800_0000-0DFF_FFFF` | ≤32 MiB | 3 mirrors              |
//! | Flash/SRAM | `0x0E00_0000-0FFF_FFFF` | 128 KiB | 64 KiB banked window   |
//!
//! The BIOS is high-level emulated, so the region has no buffer: reads
//! return 0 and the CPU intercepts program counters that land there.
//!
//! # Flash command machine
//!
//! The 128 KiB flash is driven by command sequences written to `0x5555` and
//! `0x2AAA`: `AA, 55` then a mode byte (0x90 ID mode, 0xF0 reset, 0xA0 byte
//! program, 0x80 erase prefix, 0xB0 bank select). ID mode reads return the
//! Macronix MX29L1011 identity {0xC2, 0x09}.
//!
//! # GPIO
//!
//! ROM offsets 0xC4/0xC6/0xC8 are the cartridge GPIO data/direction/control
//! registers. Writes to the data register are forwarded to the RTC; reads
//! return the RTC-driven SIO level on input pins while the control
//! register's visibility bit is set.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::rtc::Rtc;

pub const EWRAM_SIZE: usize = 0x0004_0000;
pub const IWRAM_SIZE: usize = 0x0000_8000;
pub const FLASH_SIZE: usize = 0x0002_0000;

/// EWRAM offset of the externally written input byte. Reads and writes from
/// the CPU treat it as ordinary work RAM.
pub const AI_INPUT_OFFSET: usize = 0x3CF64;

const GPIO_SIO: u16 = 1 << 1;

/// Flash command machine state.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlashState {
    #[default]
    Ready,
    /// Received 0xAA at 0x5555.
    Command1,
    /// Received 0x55 at 0x2AAA, waiting for the mode byte.
    Command2,
    /// Reads return the chip identity until 0xF0.
    IdMode,
    /// Received the 0x80 erase prefix.
    EraseCommand,
    EraseCommand1,
    EraseCommand2,
    /// Next write to 0x0000 selects the 64 KiB bank.
    BankSelect,
    /// Next write programs one byte.
    WriteCommand,
}

#[derive(Serialize, Deserialize)]
pub struct InternalMemory {
    working_ram: Vec<u8>,
    working_iram: Vec<u8>,

    /// Cartridge ROM. Not serialized; re-attached on save-state load.
    #[serde(skip)]
    pub rom: Vec<u8>,

    sram: Vec<u8>,
    flash_state: FlashState,
    flash_bank: u8,

    gpio_data: u16,
    gpio_direction: u16,
    gpio_control: u16,
    pub rtc: Rtc,
}

impl Default for InternalMemory {
    fn default() -> Self {
        Self {
            working_ram: vec![0; EWRAM_SIZE],
            working_iram: vec![0; IWRAM_SIZE],
            rom: Vec::new(),
            sram: vec![0xFF; FLASH_SIZE],
            flash_state: FlashState::Ready,
            flash_bank: 0,
            gpio_data: 0,
            gpio_direction: 0,
            gpio_control: 1,
            rtc: Rtc::default(),
        }
    }
}

impl InternalMemory {
    #[must_use]
    pub fn new(rom: Vec<u8>) -> Self {
        Self {
            rom,
            ..Default::default()
        }
    }

    /// Reads a byte from a region owned by this component. `None` means the
    /// address is unmapped; the bus applies the open-bus fallback.
    #[must_use]
    pub fn read_at(&self, address: u32) -> Option<u8> {
        match address {
            // BIOS is HLE-only.
            0x0000_0000..=0x0000_3FFF => Some(0),
            0x0100_0000..=0x01FF_FFFF | 0x0300_0000..=0x03FF_FFFF => {
                Some(self.working_iram[address as usize % IWRAM_SIZE])
            }
            0x0200_0000..=0x02FF_FFFF => {
                Some(self.working_ram[address as usize % EWRAM_SIZE])
            }
            0x0800_0000..=0x0DFF_FFFF => Some(self.read_rom(address & 0x01FF_FFFF)),
            0x0E00_0000..=0x0FFF_FFFF => Some(self.read_flash(address)),
            _ => None,
        }
    }

    /// Writes a byte to a region owned by this component. Returns false for
    /// unmapped addresses so the bus can count the dropped write.
    pub fn write_at(&mut self, address: u32, value: u8) -> bool {
        match address {
            // BIOS is read-only.
            0x0000_0000..=0x0000_3FFF => true,
            0x0100_0000..=0x01FF_FFFF | 0x0300_0000..=0x03FF_FFFF => {
                self.working_iram[address as usize % IWRAM_SIZE] = value;
                true
            }
            0x0200_0000..=0x02FF_FFFF => {
                self.working_ram[address as usize % EWRAM_SIZE] = value;
                true
            }
            0x0800_0000..=0x0DFF_FFFF => {
                self.write_rom(address & 0x01FF_FFFF, value);
                true
            }
            0x0E00_0000..=0x0FFF_FFFF => {
                self.write_flash(address, value);
                true
            }
            _ => false,
        }
    }

    fn read_rom(&self, offset: u32) -> u8 {
        if (0xC4..=0xC9).contains(&offset) {
            return self.read_gpio(offset);
        }

        let offset = offset as usize;
        if offset < self.rom.len() {
            self.rom[offset]
        } else {
            // The Game Pak data and low address lines share a bus; reads
            // past the end of the image return the halfword address the CPU
            // just put there.
            (((offset >> 1) & 0xFFFF) as u16).get_byte((offset & 1) as u8)
        }
    }

    fn write_rom(&mut self, offset: u32, value: u8) {
        if (0xC4..=0xC9).contains(&offset) {
            match offset {
                0xC4 => {
                    self.gpio_data.set_byte(0, value);
                    self.rtc.gpio_write(self.gpio_data, self.gpio_direction);
                }
                0xC5 => self.gpio_data.set_byte(1, value),
                0xC6 => self.gpio_direction.set_byte(0, value),
                0xC7 => self.gpio_direction.set_byte(1, value),
                0xC8 => self.gpio_control.set_byte(0, value),
                0xC9 => self.gpio_control.set_byte(1, value),
                _ => unreachable!(),
            }
        }
        // Everything else in ROM space is read-only; the write is dropped.
    }

    fn read_gpio(&self, offset: u32) -> u8 {
        // Control bit 0 makes the port readable; otherwise it is write-only.
        if self.gpio_control & 1 == 0 {
            return 0;
        }

        let value = match offset {
            0xC4 => {
                // Output pins read back what the CPU drove; the SIO pin, when
                // configured as input, carries the RTC's output level.
                let mut data = self.gpio_data & self.gpio_direction;
                if self.gpio_direction & GPIO_SIO == 0 && self.rtc.sio_out() {
                    data |= GPIO_SIO;
                }
                data.get_byte(0)
            }
            0xC5 => 0,
            0xC6 => self.gpio_direction.get_byte(0),
            0xC7 => self.gpio_direction.get_byte(1),
            0xC8 => self.gpio_control.get_byte(0),
            0xC9 => self.gpio_control.get_byte(1),
            _ => unreachable!(),
        };
        value
    }

    fn read_flash(&self, address: u32) -> u8 {
        let offset = (address & 0xFFFF) as usize;

        if self.flash_state == FlashState::IdMode {
            // Macronix MX29L1011.
            return match offset {
                0x0000 => 0xC2,
                0x0001 => 0x09,
                _ => 0xFF,
            };
        }

        let real_offset = self.flash_bank as usize * 0x10000 + offset;
        self.sram.get(real_offset).copied().unwrap_or(0xFF)
    }

    fn write_flash(&mut self, address: u32, value: u8) {
        let offset = (address & 0xFFFF) as usize;

        match self.flash_state {
            FlashState::Ready => {
                if offset == 0x5555 && value == 0xAA {
                    self.flash_state = FlashState::Command1;
                }
            }
            FlashState::Command1 => {
                self.flash_state = if offset == 0x2AAA && value == 0x55 {
                    FlashState::Command2
                } else {
                    FlashState::Ready
                };
            }
            FlashState::Command2 => {
                self.flash_state = if offset == 0x5555 {
                    match value {
                        0x90 => FlashState::IdMode,
                        0xF0 => FlashState::Ready,
                        0x80 => FlashState::EraseCommand,
                        0xA0 => FlashState::WriteCommand,
                        0xB0 => FlashState::BankSelect,
                        _ => {
                            tracing::debug!("unknown flash command {value:#04X}");
                            FlashState::Ready
                        }
                    }
                } else {
                    FlashState::Ready
                };
            }
            FlashState::IdMode => {
                if value == 0xF0 {
                    self.flash_state = FlashState::Ready;
                } else if offset == 0x5555 && value == 0xAA {
                    self.flash_state = FlashState::Command1;
                }
            }
            FlashState::EraseCommand => {
                self.flash_state = if offset == 0x5555 && value == 0xAA {
                    FlashState::EraseCommand1
                } else {
                    FlashState::Ready
                };
            }
            FlashState::EraseCommand1 => {
                self.flash_state = if offset == 0x2AAA && value == 0x55 {
                    FlashState::EraseCommand2
                } else {
                    FlashState::Ready
                };
            }
            FlashState::EraseCommand2 => {
                if offset == 0x5555 && value == 0x10 {
                    self.sram.fill(0xFF);
                } else if value == 0x30 {
                    // 4 KiB sector erase.
                    let sector = self.flash_bank as usize * 0x10000 + (offset & 0xF000);
                    for byte in &mut self.sram[sector..sector + 0x1000] {
                        *byte = 0xFF;
                    }
                }
                self.flash_state = FlashState::Ready;
            }
            FlashState::BankSelect => {
                if offset == 0x0000 {
                    self.flash_bank = value & 1;
                }
                self.flash_state = FlashState::Ready;
            }
            FlashState::WriteCommand => {
                let real_offset = self.flash_bank as usize * 0x10000 + offset;
                if real_offset < self.sram.len() {
                    self.sram[real_offset] = value;
                }
                self.flash_state = FlashState::Ready;
            }
        }
    }

    /// The externally supplied input byte at its fixed EWRAM location.
    #[must_use]
    pub fn ai_input(&self) -> u8 {
        self.working_ram[AI_INPUT_OFFSET]
    }

    pub fn set_ai_input(&mut self, value: u8) {
        self.working_ram[AI_INPUT_OFFSET] = value;
    }
}
