//! Save states.
//!
//! The serialized image starts with the magic, a version fence and the
//! frame counter, followed by the CPU and the full bus state (RAM, video
//! memory, I/O and peripheral state) serialized field by field. The ROM is
//! never part of the image: the loader re-attaches the currently loaded ROM
//! and refuses the state when the stored game code names a different game.

use serde::{Deserialize, Serialize};

use crate::bus::Bus;
use crate::cpu::arm7tdmi::Arm7tdmi;

/// "EMER".
pub const SAVE_STATE_MAGIC: u32 = 0x454D_4552;

pub const SAVE_STATE_VERSION: u32 = 1;

#[derive(Debug, PartialEq, Eq)]
pub enum SaveStateError {
    MagicMismatch(u32),
    VersionMismatch(u32),
    /// The state was taken from a different game than the attached ROM.
    RomMismatch { expected: String, found: String },
    /// The byte stream does not decode as a save state.
    Corrupted,
}

impl std::fmt::Display for SaveStateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MagicMismatch(found) => {
                write!(f, "save state magic mismatch: {found:#010X}")
            }
            Self::VersionMismatch(found) => {
                write!(f, "unsupported save state version {found}")
            }
            Self::RomMismatch { expected, found } => {
                write!(f, "save state is for game {found:?}, loaded ROM is {expected:?}")
            }
            Self::Corrupted => write!(f, "save state data is corrupted"),
        }
    }
}

impl std::error::Error for SaveStateError {}

/// Borrowing view used when writing a state out.
#[derive(Serialize)]
struct SaveStateRef<'a> {
    magic: u32,
    version: u32,
    frame_count: u64,
    game_code: &'a str,
    cpu: &'a Arm7tdmi,
    bus: &'a Bus,
}

/// Owned image produced when reading a state back.
#[derive(Deserialize)]
pub struct SaveState {
    magic: u32,
    version: u32,
    pub frame_count: u64,
    game_code: String,
    pub cpu: Arm7tdmi,
    pub bus: Bus,
}

/// Serialize the complete emulator state.
#[must_use]
pub fn save(frame_count: u64, game_code: &str, cpu: &Arm7tdmi, bus: &Bus) -> Vec<u8> {
    let state = SaveStateRef {
        magic: SAVE_STATE_MAGIC,
        version: SAVE_STATE_VERSION,
        frame_count,
        game_code,
        cpu,
        bus,
    };

    bincode::serialize(&state).expect("save state serialization cannot fail")
}

/// Decode and validate a save state against the attached ROM's game code.
pub fn load(bytes: &[u8], expected_game_code: &str) -> Result<SaveState, SaveStateError> {
    let state: SaveState =
        bincode::deserialize(bytes).map_err(|_| SaveStateError::Corrupted)?;

    if state.magic != SAVE_STATE_MAGIC {
        return Err(SaveStateError::MagicMismatch(state.magic));
    }
    if state.version != SAVE_STATE_VERSION {
        return Err(SaveStateError::VersionMismatch(state.version));
    }
    if state.game_code != expected_game_code {
        return Err(SaveStateError::RomMismatch {
            expected: expected_game_code.to_string(),
            found: state.game_code,
        });
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let mut cpu = Arm7tdmi::default();
        let mut bus = Bus::default();
        cpu.registers.set_register_at(5, 0x1234_5678);
        bus.write_byte(0x0200_0042, 0xAB);
        bus.write_half_word(0x0400_0208, 1);

        let bytes = save(99, "BPEE", &cpu, &bus);
        let mut state = load(&bytes, "BPEE").unwrap();

        assert_eq!(state.frame_count, 99);
        assert_eq!(state.cpu.registers.register_at(5), 0x1234_5678);
        assert_eq!(state.bus.read_byte(0x0200_0042), 0xAB);
        assert_eq!(
            state.bus.interrupt_control.interrupt_master_enable,
            1
        );
    }

    #[test]
    fn magic_is_the_leading_word() {
        let bytes = save(0, "BPEE", &Arm7tdmi::default(), &Bus::default());
        // bincode writes fixed-width little-endian integers in field
        // order, so the file starts with "EMER"'s magic.
        assert_eq!(
            u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            SAVE_STATE_MAGIC
        );
        assert_eq!(
            u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            SAVE_STATE_VERSION
        );
    }

    #[test]
    fn rejects_other_games() {
        let bytes = save(0, "BPEE", &Arm7tdmi::default(), &Bus::default());
        assert!(matches!(
            load(&bytes, "AXVE"),
            Err(SaveStateError::RomMismatch { .. })
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            load(&[1, 2, 3], "BPEE"),
            Err(SaveStateError::Corrupted)
        ));
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut bytes = save(0, "BPEE", &Arm7tdmi::default(), &Bus::default());
        bytes[0] ^= 0xFF;
        assert!(matches!(
            load(&bytes, "BPEE"),
            Err(SaveStateError::MagicMismatch(_))
        ));
    }
}
