pub mod instructions;
pub mod operations;

/// Size in bytes of an ARM instruction.
pub const SIZE_OF_ARM_INSTRUCTION: u32 = 4;

/// Pipeline prefetch offset: R15 reads as instruction address + 8.
pub const ARM_PC_OFFSET: u32 = 8;
