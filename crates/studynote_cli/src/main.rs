//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `studynote_core` linkage.
//! - Optionally validate a JSON config file and both database schemas.
//! - Keep output deterministic for quick local sanity checks.

use std::process::ExitCode;
use studynote_core::{open_db_in_memory, CoreConfig, Schema};

fn main() -> ExitCode {
    println!("studynote_core ping={}", studynote_core::ping());
    println!("studynote_core version={}", studynote_core::core_version());

    for schema in [Schema::Notes, Schema::Project] {
        if let Err(err) = open_db_in_memory(schema) {
            eprintln!("studynote_core schema={schema} status=error error={err}");
            return ExitCode::FAILURE;
        }
        println!("studynote_core schema={schema} status=ok");
    }

    // Usage: studynote_cli [config.json]
    if let Some(path) = std::env::args().nth(1) {
        match CoreConfig::load(&path) {
            Ok(config) => {
                println!("config notes_db={}", config.notes_db_path().display());
                println!("config project_db={}", config.project_db_path().display());
                println!("config log_dir={}", config.log_dir().display());
            }
            Err(err) => {
                eprintln!("config path={path} status=error error={err}");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}
