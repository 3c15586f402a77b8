use std::process::ExitCode;

use clap::Parser;
use sizemarks::{cli, logger};

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();
    logger::init(args.verbose);
    if args.verbose
        && let Some(path) = logger::log_path()
    {
        eprintln!("log: {}", path.display());
    }
    cli::run(args)
}
