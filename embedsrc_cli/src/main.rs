//! embedsrc: embed an arbitrary byte stream as C/C++ source.
//!
//! Reads stdin, writes a `const char` array declaration to stdout. The
//! heavy lifting — transport selection, zero-copy output, build-time
//! specialised formatting — lives in the library crates; this binary only
//! parses arguments, frames the declaration and reports errors.

mod args;
mod framing;
mod report;

use embedsrc_core::io::{STDIN_FD, STDOUT_FD};
use std::process::ExitCode;

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().skip(1).collect();

    let command = match args::parse_args_vec(&argv) {
        Ok(command) => command,
        Err(error) => return ExitCode::from(report::usage_error(&error)),
    };

    match command {
        args::Command::Help => {
            print!("{}", args::help_text());
            ExitCode::from(report::EXIT_SUCCESS)
        }
        args::Command::Embed { varname, language } => {
            let prefix = framing::prefix(language, &varname);
            match embedsrc_engine::execute(
                STDIN_FD,
                STDOUT_FD,
                prefix.as_bytes(),
                framing::SUFFIX.as_bytes(),
            ) {
                Ok(()) => ExitCode::from(report::EXIT_SUCCESS),
                Err(error) => ExitCode::from(report::runtime_error(&error)),
            }
        }
    }
}
