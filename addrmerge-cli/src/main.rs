//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use addrmerge_cli::CliError;

fn main() {
    match addrmerge_cli::run() {
        Ok(()) => {}
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(err) => {
            eprintln!("addrmerge: {err}");
            std::process::exit(1);
        }
    }
}
