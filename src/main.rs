//! Binary entrypoint for the `reel` CLI.

use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();
    match httpreel::run(std::env::args()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
