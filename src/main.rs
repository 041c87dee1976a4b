use std::path::PathBuf;
use std::process::ExitCode;

use sas_invariant::{InvariantConfig, InvariantSession};

fn main() -> ExitCode {
    env_logger::init(); // Log to stderr (if you run with `RUST_LOG=debug`).

    let mut args = std::env::args().skip(1);
    let Some(session_path) = args.next().map(PathBuf::from) else {
        eprintln!("usage: sas-invariant <session.json> [config.yaml]");
        return ExitCode::FAILURE;
    };

    let config = match args.next() {
        Some(path) => match InvariantConfig::load_yaml(&PathBuf::from(path)) {
            Ok(config) => config,
            Err(e) => {
                log::error!("{e}");
                return ExitCode::FAILURE;
            }
        },
        None => InvariantConfig::default(),
    };

    let mut session = match InvariantSession::load(&session_path, config) {
        Ok(session) => session,
        Err(e) => {
            log::error!("Failed to load {}: {e}", session_path.display());
            return ExitCode::FAILURE;
        }
    };

    if session.curve().is_some() {
        if let Err(e) = session.compute() {
            log::error!("Compute failed: {e}");
        }
    }
    println!("{}", session.report());
    ExitCode::SUCCESS
}
