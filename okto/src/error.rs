//! Result and errors.
use std::fmt::{self, Display, Formatter};
use std::io;

use crate::constants::Address;

pub type OktoResult<T> = std::result::Result<T, OktoError>;

#[derive(Debug)]
pub enum OktoError {
    /// Attempt to load a ROM that can't fit in program memory.
    RomTooLarge(usize),
    /// IO failure while the ROM bytes were being read.
    RomLoad(io::Error),
    /// Call nested deeper than the stack capacity.
    StackOverflow,
    /// Return executed with an empty call stack.
    StackUnderflow,
    /// Memory access at or beyond the end of the address space.
    MemoryOutOfRange(Address),
    /// Keypad index outside of 0x0-0xF.
    InvalidKeyIndex(u8),
    Fmt(fmt::Error),
}

impl Display for OktoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::RomTooLarge(size) => {
                write!(f, "ROM of {} bytes too large for program memory", size)
            }
            Self::RomLoad(err) => write!(f, "failed to load ROM: {}", err),
            Self::StackOverflow => write!(f, "call stack overflow"),
            Self::StackUnderflow => write!(f, "call stack underflow"),
            Self::MemoryOutOfRange(addr) => {
                write!(f, "memory access out of range: 0x{:04X}", addr)
            }
            Self::InvalidKeyIndex(key) => {
                write!(f, "key index must be in range 0 <= key < 16, got {}", key)
            }
            Self::Fmt(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for OktoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::RomLoad(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for OktoError {
    fn from(err: io::Error) -> Self {
        OktoError::RomLoad(err)
    }
}

impl From<fmt::Error> for OktoError {
    fn from(err: fmt::Error) -> Self {
        OktoError::Fmt(err)
    }
}
