use crate::u4;

/// Error types that can occur while loading or running a program.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MachineError {
    #[error("Program image is too large ({size} bytes), max size is {max_size} bytes")]
    ImageTooLarge { size: usize, max_size: usize },

    #[error("Memory access out of range at address {address:#06X}")]
    AddressOutOfRange { address: u16 },

    #[error("Stack underflow: attempted to return from a subroutine with empty call stack")]
    StackUnderflow,
}

/// Execution state of the machine between `step` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    /// Fetch, decode and execute proceed normally.
    Running,
    /// An `Fx0A` instruction is pending. `step` only scans the keypad and writes the
    /// first pressed key into `target`.
    AwaitingKey { target: u4 },
}

pub const DISPLAY_X: usize = 64;
pub const DISPLAY_Y: usize = 32;
/// A type alias for the display buffer representation, indexed as `[y][x]`.
pub type Display<T> = [[T; DISPLAY_X]; DISPLAY_Y];
