//! Rate-limited anomaly accounting.
//!
//! Commercial ROMs poke every dark corner of the address space, so internal
//! anomalies are never fatal: the bus and CPU apply a defined fallback,
//! bump a counter here, and keep running. Only the first few occurrences of
//! each kind reach the log; release hot paths must not format strings, so
//! every logging site is gated on the counter first.

use logger::log;
use vecfixed::VecFixed;

const MAX_LOGGED: u64 = 10;

#[derive(Default)]
pub struct Diagnostics {
    unmapped_reads: u64,
    unmapped_writes: u64,
    invalid_pc_writes: u64,
    invalid_mode_writes: u64,
    pc_history: VecFixed<16, u32>,
}

impl Diagnostics {
    fn bump(counter: &mut u64, message: impl FnOnce() -> String) {
        *counter += 1;
        if *counter <= MAX_LOGGED {
            log(message());
            if *counter == MAX_LOGGED {
                log("(suppressing further diagnostics of this kind)");
            }
        }
    }

    pub fn note_unmapped_read(&mut self, address: u32) {
        Self::bump(&mut self.unmapped_reads, || {
            format!("read from unmapped address {address:#010X}")
        });
    }

    pub fn note_unmapped_write(&mut self, address: u32, value: u8) {
        Self::bump(&mut self.unmapped_writes, || {
            format!("write to unmapped address {address:#010X} = {value:#04X}")
        });
    }

    pub fn note_invalid_pc_write(&mut self, address: u32) {
        Self::bump(&mut self.invalid_pc_writes, || {
            format!("branch to unmapped address {address:#010X} skipped")
        });
    }

    pub fn note_invalid_mode_write(&mut self, bits: u32) {
        Self::bump(&mut self.invalid_mode_writes, || {
            format!("invalid CPU mode bits {bits:05b} masked")
        });
    }

    #[must_use]
    pub const fn unmapped_reads(&self) -> u64 {
        self.unmapped_reads
    }

    #[must_use]
    pub const fn unmapped_writes(&self) -> u64 {
        self.unmapped_writes
    }

    #[must_use]
    pub const fn invalid_pc_writes(&self) -> u64 {
        self.invalid_pc_writes
    }

    #[must_use]
    pub const fn invalid_mode_writes(&self) -> u64 {
        self.invalid_mode_writes
    }

    /// Sample the program counter once per frame for wedge detection.
    pub fn record_frame_pc(&mut self, pc: u32) {
        self.pc_history.push(pc);
    }

    /// Distinct program counters among the recent per-frame samples. A
    /// value of 1 with a full history means the CPU has been sitting on the
    /// same address for many frames.
    #[must_use]
    pub fn unique_recent_pcs(&self) -> usize {
        let mut seen: Vec<u32> = Vec::with_capacity(16);
        for &pc in self.pc_history.iter() {
            if !seen.contains(&pc) {
                seen.push(pc);
            }
        }
        seen.len()
    }

    #[must_use]
    pub fn looks_stuck(&self) -> bool {
        self.pc_history.len() == 16 && self.unique_recent_pcs() == 1
    }
}
