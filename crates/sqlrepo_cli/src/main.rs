//! Command-line entry point for script execution and sequence maintenance.
//!
//! # Responsibility
//! - Run GO-separated SQL scripts against a configured database.
//! - Realign sequence generators on demand.
//! - Keep output deterministic for quick local sanity checks.

use log::error;
use sqlrepo_core::db::open_with_config;
use sqlrepo_core::{
    core_version, default_log_level, init_logging, DatabaseConfig, LogConfig, ScriptExecutor,
    SequenceResetter,
};
use std::process::ExitCode;

const USAGE: &str = "usage:
  sqlrepo_cli version
  sqlrepo_cli run <connection-string> <script.sql>
  sqlrepo_cli reset-sequences <connection-string>";

fn main() -> ExitCode {
    if let Err(err) = init_logging(&LogConfig::stderr(default_log_level())) {
        eprintln!("warning: {err}");
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_exit module=cli status=error error={message}");
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<(), String> {
    match args {
        [command] if command == "version" => {
            println!("sqlrepo_core version={}", core_version());
            Ok(())
        }
        [command, connection, script] if command == "run" => {
            let config = DatabaseConfig::parse(connection).map_err(|err| err.to_string())?;
            let batches = ScriptExecutor::new(&config)
                .run(
                    &std::fs::read_to_string(script)
                        .map_err(|err| format!("cannot read `{script}`: {err}"))?,
                )
                .map_err(|err| err.to_string())?;
            println!("batches={batches}");
            Ok(())
        }
        [command, connection] if command == "reset-sequences" => {
            let config = DatabaseConfig::parse(connection).map_err(|err| err.to_string())?;
            let conn = open_with_config(&config).map_err(|err| err.to_string())?;
            let resets = SequenceResetter::reset_all(&conn).map_err(|err| err.to_string())?;
            for reset in resets {
                println!("{} {:?} next={}", reset.name, reset.kind, reset.next_value);
            }
            Ok(())
        }
        _ => Err(USAGE.to_string()),
    }
}
