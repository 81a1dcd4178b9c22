use clap::Parser;
use portsim::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    cli.init_logging();
    run(cli)
}
