//! The `mfr` command line: inspect how paths are classified, resolved and
//! listed under a redirection configuration.

pub mod commands;
pub mod logging;

pub use crate::commands::MfrCmd;

/// Parses the process arguments and runs the selected command, exiting with
/// a non-zero status on failure.
pub fn run() {
    use clap::Parser;

    let cmd = MfrCmd::parse();
    if let Err(e) = cmd.execute() {
        eprintln!("error: {e:?}");
        std::process::exit(1);
    }
}
