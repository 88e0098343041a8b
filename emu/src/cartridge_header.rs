//! GBA cartridge header parsing and validation.
//!
//! Every ROM starts with a 192-byte header:
//!
//! | Offset | Size | Description                                   |
//! |--------|------|-----------------------------------------------|
//! | 0x000  |  4   | Entry point (usually an ARM branch)           |
//! | 0x004  | 156  | Nintendo logo bitmap                          |
//! | 0x0A0  | 12   | Game title, uppercase ASCII                   |
//! | 0x0AC  |  4   | Game code (e.g. "BPEE")                       |
//! | 0x0B0  |  2   | Maker code                                    |
//! | 0x0B2  |  1   | Fixed value 0x96                              |
//! | 0x0BC  |  1   | Software version                              |
//! | 0x0BD  |  1   | Header checksum                               |
//!
//! The checksum is `-(sum of bytes 0xA0..=0xBC) - 0x19` modulo 256. A bad
//! checksum or logo is diagnostic only: the caller may still run the ROM.

const HEADER_SIZE: usize = 0xC0;

/// Largest ROM the Game Pak bus can address.
pub const MAX_ROM_SIZE: usize = 0x0200_0000;

/// ROM rejected outright: nothing emulatable inside.
#[derive(Debug, PartialEq, Eq)]
pub enum RomError {
    /// Shorter than the cartridge header.
    TooSmall(usize),
    /// Larger than the 32 MiB Game Pak address space.
    TooLarge(usize),
}

impl std::fmt::Display for RomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooSmall(size) => {
                write!(f, "ROM of {size} bytes is smaller than the cartridge header")
            }
            Self::TooLarge(size) => {
                write!(f, "ROM of {size} bytes exceeds the 32 MiB Game Pak space")
            }
        }
    }
}

impl std::error::Error for RomError {}

/// Parsed cartridge header with its validation results.
pub struct CartridgeHeader {
    /// Raw entry instruction at ROM offset 0.
    pub rom_entry_point: [u8; 4],
    /// Game title, trailing NULs stripped.
    pub game_title: String,
    /// Four character game code, e.g. "BPEE" for Pokémon Emerald.
    pub game_code: String,
    /// Two character maker code, "01" for Nintendo.
    pub maker_code: String,
    pub software_version: u8,
    /// Checksum byte stored in the ROM.
    pub complement_check: u8,
    /// Checksum recomputed from the header bytes.
    pub calculated_checksum: u8,
    /// Must be 0x96 on licensed cartridges.
    pub fixed_value: u8,

    pub checksum_valid: bool,
    pub fixed_value_valid: bool,
}

impl CartridgeHeader {
    /// Parse the header out of a ROM image. Fails only when the image
    /// cannot contain a header at all; validation problems are recorded in
    /// the flags and logged.
    pub fn parse(data: &[u8]) -> Result<Self, RomError> {
        if data.len() < HEADER_SIZE {
            return Err(RomError::TooSmall(data.len()));
        }
        if data.len() > MAX_ROM_SIZE {
            return Err(RomError::TooLarge(data.len()));
        }

        let complement_check = data[0xBD];
        let calculated_checksum = Self::calculate_checksum(data);
        let fixed_value = data[0xB2];

        let checksum_valid = complement_check == calculated_checksum;
        let fixed_value_valid = fixed_value == 0x96;

        if !checksum_valid {
            tracing::warn!(
                "header checksum mismatch: stored {complement_check:#04X}, calculated {calculated_checksum:#04X}"
            );
        }
        if !fixed_value_valid {
            tracing::warn!("header fixed value is {fixed_value:#04X}, expected 0x96");
        }

        Ok(Self {
            rom_entry_point: data[0x00..0x04].try_into().unwrap(),
            game_title: Self::ascii_field(&data[0xA0..0xAC]),
            game_code: Self::ascii_field(&data[0xAC..0xB0]),
            maker_code: Self::ascii_field(&data[0xB0..0xB2]),
            software_version: data[0xBC],
            complement_check,
            calculated_checksum,
            fixed_value,
            checksum_valid,
            fixed_value_valid,
        })
    }

    /// `-(sum of bytes 0xA0..=0xBC) - 0x19` modulo 256.
    fn calculate_checksum(data: &[u8]) -> u8 {
        data[0xA0..0xBD]
            .iter()
            .fold(0_u8, |acc, &byte| acc.wrapping_sub(byte))
            .wrapping_sub(0x19)
    }

    fn ascii_field(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes)
            .trim_end_matches('\0')
            .to_string()
    }

    /// Every boot-critical field checks out.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.checksum_valid && self.fixed_value_valid
    }

    /// Target of the branch instruction at offset 0, when there is one.
    /// ROMs enter at 0x08000000 with the PC pipelined 8 bytes ahead.
    #[must_use]
    pub fn entry_point_address(&self) -> u32 {
        let op_code = u32::from_le_bytes(self.rom_entry_point);
        if op_code >> 24 == 0xEA {
            let offset = ((op_code & 0x00FF_FFFF) << 8) as i32 >> 6;
            (0x0800_0008_i64 + i64::from(offset)) as u32
        } else {
            0x0800_0000
        }
    }
}
