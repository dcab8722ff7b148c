use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use vipsgen::cli::CommandLineInterface;
use vipsgen::error::Error;

fn init_tracing(forced: Option<&str>) {
    // RUST_LOG takes a bare level ("debug") or a full filter spec
    let filter = match (forced, std::env::var("RUST_LOG")) {
        (Some(filter), _) => filter.to_string(),
        (None, Ok(level)) if is_plain_level(&level) => format!("vipsgen={level}"),
        (None, Ok(spec)) => spec,
        (None, Err(_)) => "vipsgen=info".to_string(),
    };
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));
    if tracing_subscriber::registry().with(fmt_layer).try_init().is_err() {
        eprintln!("Warning: tracing subscriber already initialized");
    }
}

fn is_plain_level(s: &str) -> bool {
    matches!(s.to_ascii_lowercase().as_str(), "trace" | "debug" | "info" | "warn" | "error")
}

fn main() -> ExitCode {
    let command_line_interface = CommandLineInterface::load();
    init_tracing(command_line_interface.log_filter());
    match command_line_interface.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let stage = err.downcast_ref::<Error>().map_or("setup", Error::stage);
            error!(stage, "{err:#}");
            ExitCode::FAILURE
        }
    }
}
