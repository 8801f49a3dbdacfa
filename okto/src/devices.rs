//! Collaborator interfaces.
use log::{debug, warn};

use crate::{constants::Address, error::OktoError, vm::RunState};

/// Hook for the engine to report notable events to the host.
///
/// Replaces a process-global logging level: the host injects whatever
/// telemetry it wants, and the engine stays free of global state.
pub trait Monitor {
    /// An instruction word matched no documented pattern.
    ///
    /// Execution continues past it; many ROMs embed data words in the
    /// instruction stream.
    fn unknown_opcode(&mut self, pc: Address, word: u16) {
        let _ = (pc, word);
    }

    /// The machine moved to a new run state.
    fn state_changed(&mut self, state: RunState) {
        let _ = state;
    }
}

/// Default monitor that forwards events to the `log` facade.
#[derive(Default)]
pub struct LogMonitor;

impl Monitor for LogMonitor {
    fn unknown_opcode(&mut self, pc: Address, word: u16) {
        warn!("unknown opcode {:04X} at {:04X}, skipping", word, pc);
    }

    fn state_changed(&mut self, state: RunState) {
        debug!("machine is now {:?}", state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyCode {
    Key0 = 0,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
    Key6,
    Key7,
    Key8,
    Key9,
    KeyA,
    KeyB,
    KeyC,
    KeyD,
    KeyE,
    KeyF = 0xF,
}

impl KeyCode {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for KeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let key_id = self.as_u8();
        write!(f, "k{key_id:x}")
    }
}

impl From<KeyCode> for u8 {
    fn from(keycode: KeyCode) -> Self {
        keycode.as_u8()
    }
}

impl TryFrom<u8> for KeyCode {
    type Error = OktoError;

    fn try_from(key_id: u8) -> Result<Self, Self::Error> {
        match key_id {
            0 => Ok(Self::Key0),
            1 => Ok(Self::Key1),
            2 => Ok(Self::Key2),
            3 => Ok(Self::Key3),
            4 => Ok(Self::Key4),
            5 => Ok(Self::Key5),
            6 => Ok(Self::Key6),
            7 => Ok(Self::Key7),
            8 => Ok(Self::Key8),
            9 => Ok(Self::Key9),
            10 => Ok(Self::KeyA),
            11 => Ok(Self::KeyB),
            12 => Ok(Self::KeyC),
            13 => Ok(Self::KeyD),
            14 => Ok(Self::KeyE),
            15 => Ok(Self::KeyF),
            _ => Err(OktoError::InvalidKeyIndex(key_id)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_keycode_round_trip() {
        for key_id in 0u8..16 {
            let key = KeyCode::try_from(key_id).unwrap();
            assert_eq!(key.as_u8(), key_id);
        }
    }

    #[test]
    fn test_keycode_rejects_out_of_range() {
        assert!(matches!(
            KeyCode::try_from(16),
            Err(OktoError::InvalidKeyIndex(16))
        ));
        assert!(matches!(
            KeyCode::try_from(0xFF),
            Err(OktoError::InvalidKeyIndex(0xFF))
        ));
    }
}
