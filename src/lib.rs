use std::process::ExitCode;

use clap::Parser;

pub mod adapters;
pub mod core;
pub mod runtime;

use adapters::config::Settings;
use runtime::cli::{Cli, CliError};

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let (settings, config_path) = match cli.config.clone() {
        Some(path) => (Settings::load_from(&path), path),
        None => (Settings::load_global(), Settings::global_config_path()),
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.log_level()),
    )
    .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(runtime::cli::execute(cli, settings, config_path)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Reported) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err}");
            if err.is_unauthorized() {
                runtime::cli::print_auth_hint();
            }
            ExitCode::FAILURE
        }
    }
}
