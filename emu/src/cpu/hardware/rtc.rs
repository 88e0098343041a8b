//! Serial real-time clock behind the cartridge GPIO port.
//!
//! The RTC speaks a three-wire protocol over the GPIO data register: SCK
//! (bit 0), SIO (bit 1) and CS (bit 2). A transaction starts on a CS rising
//! edge; each SCK rising edge while CS is high clocks one bit. The first
//! eight bits form the command byte; read commands then flip the data
//! direction and successive SCK edges shift response bits out on SIO,
//! least-significant bit of each byte first.
//!
//! Time payloads are BCD, derived from the host clock: a base timestamp is
//! captured at init/reset and the current value is base + elapsed real time.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

const PIN_SCK: u16 = 1 << 0;
const PIN_SIO: u16 = 1 << 1;
const PIN_CS: u16 = 1 << 2;

const CMD_RESET: u8 = 0x60;
const CMD_STATUS: u8 = 0x62;
const CMD_DATETIME: u8 = 0x64;
const CMD_TIME: u8 = 0x66;

fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

fn host_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

#[derive(Serialize, Deserialize)]
pub struct Rtc {
    pub control: u8,
    pub status: u8,
    command: u8,
    bit_index: u32,
    buffer: [u8; 8],
    buffer_pos: u32,
    reading: bool,
    writing: bool,
    last_sck: bool,
    last_cs: bool,
    /// Host epoch seconds captured at init/reset.
    base_timestamp: u64,
}

impl Default for Rtc {
    fn default() -> Self {
        Self {
            control: 0,
            status: 0,
            command: 0,
            bit_index: 0,
            buffer: [0; 8],
            buffer_pos: 0,
            reading: false,
            writing: false,
            last_sck: false,
            last_cs: false,
            base_timestamp: host_epoch_seconds(),
        }
    }
}

impl Rtc {
    /// Re-arm the base timestamp. Called on emulator reset.
    pub fn reset_base_timestamp(&mut self) {
        *self = Self::default();
    }

    /// Current output level of the SIO line, valid while a read command is
    /// in flight.
    #[must_use]
    pub fn sio_out(&self) -> bool {
        if !self.reading || self.bit_index >= 64 {
            return false;
        }

        let byte_index = (self.bit_index / 8) as usize;
        let bit_pos = self.bit_index % 8;
        (self.buffer[byte_index] >> bit_pos) & 1 != 0
    }

    /// Clock the state machine from a GPIO data write. Only pins driven as
    /// outputs by the CPU reach us; input pins read back through
    /// [`Self::sio_out`].
    pub fn gpio_write(&mut self, data: u16, direction: u16) {
        // A pin configured as input keeps its previous level.
        let driven = data & direction;
        let sck = driven & PIN_SCK != 0;
        let sio = driven & PIN_SIO != 0;
        let cs = driven & PIN_CS != 0;

        if cs && !self.last_cs {
            // Start of transaction.
            self.bit_index = 0;
            self.buffer_pos = 0;
            self.buffer = [0; 8];
            self.reading = false;
            self.writing = true;
        }

        if !cs && self.last_cs {
            self.reading = false;
            self.writing = false;
        }

        if sck && !self.last_sck && cs {
            if self.writing && self.bit_index < 64 {
                let byte_index = (self.bit_index / 8) as usize;
                let bit_pos = self.bit_index % 8;
                if sio {
                    self.buffer[byte_index] |= 1 << bit_pos;
                } else {
                    self.buffer[byte_index] &= !(1 << bit_pos);
                }

                self.bit_index += 1;

                if self.bit_index == 8 {
                    self.dispatch_command();
                } else if self.bit_index == 16 && self.command & 0xFE == CMD_STATUS {
                    // Control/status write: second byte is the new value.
                    self.control = self.buffer[1];
                }
            } else if self.reading && self.bit_index < 64 {
                self.bit_index += 1;
            }
        }

        self.last_sck = sck;
        self.last_cs = cs;
    }

    fn dispatch_command(&mut self) {
        self.command = self.buffer[0];
        let read = self.command & 1 == 0;

        match self.command & 0xFE {
            CMD_RESET => {
                self.reset_base_timestamp();
                // Transaction state survives the reset so CS release is
                // still observed.
                self.last_cs = true;
                self.last_sck = true;
            }
            CMD_STATUS => {
                if read {
                    self.begin_read([self.status, 0, 0, 0, 0, 0, 0, 0]);
                }
                // The write variant keeps collecting bits; handled above.
            }
            CMD_DATETIME | CMD_TIME => {
                if read {
                    self.begin_read(self.time_payload());
                } else {
                    // Time writes are accepted and discarded; the host clock
                    // is the time source.
                    tracing::debug!("RTC time write command {:#04X} ignored", self.command);
                }
            }
            _ => {
                tracing::debug!("unknown RTC command {:#04X}", self.command);
                self.writing = false;
            }
        }
    }

    fn begin_read(&mut self, payload: [u8; 8]) {
        self.buffer = payload;
        self.reading = true;
        self.writing = false;
        self.bit_index = 0;
    }

    /// Seconds / minutes / hours / day counter, all time fields in BCD.
    fn time_payload(&self) -> [u8; 8] {
        let now = host_epoch_seconds();
        let elapsed = now.saturating_sub(self.base_timestamp);
        let wall = self.base_timestamp + elapsed;

        let seconds = to_bcd((wall % 60) as u8);
        let minutes = to_bcd(((wall / 60) % 60) as u8);
        let hours = to_bcd(((wall / 3600) % 24) as u8);
        let days = (elapsed / 86_400) as u16;

        [
            seconds,
            minutes,
            hours,
            days as u8,
            (days >> 8) as u8,
            0,
            self.control,
            self.status,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock_bits(rtc: &mut Rtc, byte: u8) {
        // All three pins driven as outputs.
        let dir = PIN_SCK | PIN_SIO | PIN_CS;
        for bit in 0..8 {
            let sio = if (byte >> bit) & 1 != 0 { PIN_SIO } else { 0 };
            rtc.gpio_write(PIN_CS | sio, dir);
            rtc.gpio_write(PIN_CS | sio | PIN_SCK, dir);
        }
    }

    fn read_bits(rtc: &mut Rtc, count: u32) -> Vec<bool> {
        // SIO as input now, SCK/CS still outputs.
        let dir = PIN_SCK | PIN_CS;
        let mut out = Vec::new();
        for _ in 0..count {
            out.push(rtc.sio_out());
            rtc.gpio_write(PIN_CS, dir);
            rtc.gpio_write(PIN_CS | PIN_SCK, dir);
        }
        out
    }

    #[test]
    fn status_read_after_command() {
        let mut rtc = Rtc::default();
        rtc.status = 0x40;

        // CS rising edge opens the transaction.
        rtc.gpio_write(0, PIN_SCK | PIN_SIO | PIN_CS);
        rtc.gpio_write(PIN_CS, PIN_SCK | PIN_SIO | PIN_CS);

        clock_bits(&mut rtc, CMD_STATUS);
        assert!(rtc.reading);

        let bits = read_bits(&mut rtc, 8);
        let mut value = 0_u8;
        for (i, bit) in bits.iter().enumerate() {
            value |= u8::from(*bit) << i;
        }
        assert_eq!(value, 0x40);
    }

    #[test]
    fn time_read_is_bcd() {
        let mut rtc = Rtc::default();
        let payload = rtc.time_payload();

        // Each BCD nibble stays in decimal range.
        for byte in &payload[0..3] {
            assert!(byte & 0xF <= 9);
            assert!(byte >> 4 <= 9);
        }

        // Freshly initialized clock has no elapsed days.
        assert_eq!(payload[3], 0);
        assert_eq!(payload[4], 0);

        rtc.gpio_write(PIN_CS, PIN_SCK | PIN_SIO | PIN_CS);
        clock_bits(&mut rtc, CMD_TIME);
        assert!(rtc.reading);
        assert!(!rtc.writing);
    }

    #[test]
    fn cs_falling_edge_ends_transaction() {
        let mut rtc = Rtc::default();
        rtc.gpio_write(PIN_CS, PIN_SCK | PIN_SIO | PIN_CS);
        clock_bits(&mut rtc, CMD_STATUS);
        assert!(rtc.reading);

        rtc.gpio_write(0, PIN_SCK | PIN_SIO | PIN_CS);
        assert!(!rtc.reading);
        assert!(!rtc.writing);
    }
}
