pub mod instructions;
pub mod operations;

/// Size in bytes of a Thumb instruction.
pub const SIZE_OF_THUMB_INSTRUCTION: u32 = 2;

/// Pipeline prefetch offset: R15 reads as instruction address + 4.
pub const THUMB_PC_OFFSET: u32 = 4;
