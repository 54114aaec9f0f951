mod browser;
mod cli;
mod executor;
mod model;
mod store;
#[cfg(feature = "tui")]
mod tui;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    // stdout carries playbook output; diagnostics go to stderr only.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let args = cli::Cli::parse();
    if let Err(e) = args.check() {
        e.exit();
    }
    init_tracing();

    if let Err(e) = cli::run(args) {
        eprintln!("ansibank: {e:#}");
        std::process::exit(cli::exit_code(&e));
    }
}
