use chain_cli::{init_tracing, run, Cli};
use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose, cli.json) {
        eprintln!("failed to initialize logging: {e:#}");
        return ExitCode::from(2);
    }

    debug!("chainctl {}", env!("CARGO_PKG_VERSION"));

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(2)
        }
    }
}
