//! Entrypoint for CLI
use std::{env, fs, process::ExitCode, time::Instant};

use log::{debug, error, info};
use okto::prelude::*;

static USAGE: &str = r#"
usage: okto FILE

Run the target Chip-8 ROM file.

examples:
    okto breakout.rom
"#;

fn run_rom(filepath: &str) -> OktoResult<()> {
    info!("loading ROM {filepath}");

    let rom = fs::read(filepath).map_err(OktoError::RomLoad)?;

    let mut vm = OktoVm::new(OktoConf::default());
    vm.load_rom(rom.as_slice())?;

    if log::log_enabled!(log::Level::Debug) {
        debug!("program memory:\n{}", vm.dump_ram(rom.len())?);
    }

    let start = Instant::now();
    let result = vm.execute();
    let end = Instant::now();

    println!(
        "time taken: {}ms",
        end.duration_since(start).as_nanos() as f64 / 1000000.0
    ); // to millis
    println!("{}", vm.dump_display()?);

    result?;

    Ok(())
}

fn main() -> ExitCode {
    simple_logger::SimpleLogger::new().env().init().unwrap();

    let filepath = match parse_args() {
        Some(filepath) => filepath,
        None => {
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match run_rom(&filepath) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

/// The single positional argument is the ROM file path.
fn parse_args() -> Option<String> {
    env::args().nth(1)
}

fn print_usage() {
    println!("okto v{}", env!("CARGO_PKG_VERSION"));
    println!("{USAGE}");
}
