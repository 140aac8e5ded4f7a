use clap::Parser;
use tracing_subscriber::EnvFilter;

use chart2rgd_core::ConvertError;

mod args;
mod cmd;
mod io;
mod output;
mod renderer;

fn main() {
    let cli = args::Cli::parse();
    init_tracing(cli.verbose);
    output::init(cli.json);

    let code = match cmd::dispatch(cli) {
        Ok(()) => 0,
        Err(err) => {
            output::error_line(&format!("{err:#}"));
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Map failures onto the stable exit-code contract.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<output::OutputWriteError>().is_some() {
        return 6;
    }
    err.downcast_ref::<ConvertError>()
        .map(ConvertError::exit_code)
        .unwrap_or(1)
}
