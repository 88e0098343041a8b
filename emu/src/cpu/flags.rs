//! Small decode enums shared by the ARM and Thumb instruction sets.

/// Direction of a data transfer.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LoadStoreKind {
    Store,
    Load,
}

impl From<bool> for LoadStoreKind {
    fn from(b: bool) -> Self {
        match b {
            false => Self::Store,
            true => Self::Load,
        }
    }
}

/// When the offset is applied relative to the transfer.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Indexing {
    /// Apply the offset after the transfer (always writes back).
    Post,

    /// Apply the offset before the transfer.
    Pre,
}

impl From<bool> for Indexing {
    fn from(state: bool) -> Self {
        match state {
            false => Self::Post,
            true => Self::Pre,
        }
    }
}

/// Whether the offset is added to or subtracted from the base.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Offsetting {
    Down,
    Up,
}

impl From<bool> for Offsetting {
    fn from(state: bool) -> Self {
        match state {
            false => Self::Down,
            true => Self::Up,
        }
    }
}

/// Operand 2 source of a data-processing instruction.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum OperandKind {
    Immediate,
    Register,
}

impl From<bool> for OperandKind {
    fn from(b: bool) -> Self {
        match b {
            false => Self::Register,
            true => Self::Immediate,
        }
    }
}
