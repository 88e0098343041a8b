//! DMA channel state.
//!
//! The registers mirror the I/O layout; the `internal_*` copies are the
//! working values latched when the enable bit rises. Transfer execution
//! lives on the bus, which owns both endpoints of every copy.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

/// DMAxCNT_H start timing field.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StartTiming {
    Immediate,
    VBlank,
    HBlank,
    /// Sound FIFO / video capture. Accepted but never triggered here: audio
    /// synthesis is out of scope.
    Special,
}

impl From<u16> for StartTiming {
    fn from(bits: u16) -> Self {
        match bits & 0b11 {
            0 => Self::Immediate,
            1 => Self::VBlank,
            2 => Self::HBlank,
            _ => Self::Special,
        }
    }
}

/// Address stepping applied to either endpoint after each unit.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AddressControl {
    Increment,
    Decrement,
    Fixed,
    /// Increment during the transfer, reload on repeat. Destination only.
    IncrementReload,
}

impl From<u16> for AddressControl {
    fn from(bits: u16) -> Self {
        match bits & 0b11 {
            0 => Self::Increment,
            1 => Self::Decrement,
            2 => Self::Fixed,
            _ => Self::IncrementReload,
        }
    }
}

#[derive(Default, Serialize, Deserialize)]
pub struct DmaChannel {
    pub source_address: u32,
    pub destination_address: u32,
    pub word_count: u16,
    pub control: u16,

    pub enabled: bool,
    pub irq_enable: bool,
    pub repeat: bool,
    pub word_transfer: bool,

    pub internal_source: u32,
    pub internal_dest: u32,
    pub internal_count: u32,
}

impl DmaChannel {
    #[must_use]
    pub fn start_timing(&self) -> StartTiming {
        StartTiming::from(self.control.get_bits(12..=13))
    }

    #[must_use]
    pub fn source_control(&self) -> AddressControl {
        AddressControl::from(self.control.get_bits(7..=8))
    }

    #[must_use]
    pub fn destination_control(&self) -> AddressControl {
        AddressControl::from(self.control.get_bits(5..=6))
    }

    /// Decode the flag bits out of a fresh control value. Returns true when
    /// the enable bit rose, which is the bus's cue to latch the internal
    /// registers.
    pub fn update_control(&mut self, value: u16) -> bool {
        let was_enabled = self.enabled;

        self.control = value;
        self.enabled = value.get_bit(15);
        self.irq_enable = value.get_bit(14);
        self.repeat = value.get_bit(9);
        self.word_transfer = value.get_bit(10);

        self.enabled && !was_enabled
    }

    /// Latch source/destination/count into the working copies.
    pub fn latch(&mut self, max_count: u32) {
        self.internal_source = self.source_address;
        self.internal_dest = self.destination_address;
        self.internal_count = if self.word_count == 0 {
            max_count
        } else {
            u32::from(self.word_count)
        };
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        self.control.set_bit_off(15);
    }
}

#[derive(Default, Serialize, Deserialize)]
pub struct Dma {
    pub channels: [DmaChannel; 4],
}

/// Count 0 means the channel maximum: 0x4000 units on channels 0-2,
/// 0x10000 on channel 3.
#[must_use]
pub const fn max_count(channel: usize) -> u32 {
    if channel == 3 {
        0x10000
    } else {
        0x4000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_decode() {
        let mut channel = DmaChannel::default();
        let rising = channel.update_control(0x8000 | 0x4000 | 0x0400 | 0x0200);
        assert!(rising);
        assert!(channel.enabled);
        assert!(channel.irq_enable);
        assert!(channel.word_transfer);
        assert!(channel.repeat);
        assert_eq!(channel.start_timing(), StartTiming::Immediate);

        // Writing again with enable still set is not a rising edge.
        assert!(!channel.update_control(0x8000));
    }

    #[test]
    fn latch_applies_max_count() {
        let mut channel = DmaChannel {
            source_address: 0x0200_0000,
            destination_address: 0x0600_0000,
            word_count: 0,
            ..Default::default()
        };
        channel.latch(max_count(3));
        assert_eq!(channel.internal_count, 0x10000);
        assert_eq!(channel.internal_source, 0x0200_0000);
        assert_eq!(channel.internal_dest, 0x0600_0000);
    }

    #[test]
    fn address_controls() {
        let mut channel = DmaChannel::default();
        // dst decrement (01 at bits 5-6), src fixed (10 at bits 7-8).
        channel.update_control(0b0000_0001_0010_0000);
        assert_eq!(channel.destination_control(), AddressControl::Decrement);
        assert_eq!(channel.source_control(), AddressControl::Fixed);
    }
}
