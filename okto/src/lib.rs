mod clock;
pub mod constants;
mod cpu;
mod decode;
mod devices;
mod error;
mod vm;

pub use self::vm::Hz;

use self::constants::DISPLAY_BUFFER_SIZE;

/// Monochrome screen contents, one `bool` per pixel, row-major.
pub type DisplayBuffer = [bool; DISPLAY_BUFFER_SIZE];

pub mod prelude {
    pub use super::{
        decode::{decode, Instr},
        devices::{KeyCode, LogMonitor, Monitor},
        error::{OktoError, OktoResult},
        vm::{Flow, OktoConf, OktoVm, RunState},
    };
}
