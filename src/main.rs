use clap::Parser;

use photofe::cli::{self, CliArgs};
use photofe::{log_err, logger};

fn main() {
    if let Err(e) = logger::init() {
        eprintln!("warning: session log unavailable: {}", e);
    }
    let args = CliArgs::parse();
    if let Err(e) = cli::run(args) {
        log_err!("CLI run failed: {}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
