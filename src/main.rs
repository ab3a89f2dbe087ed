//! The `zephyr` interpreter binary: reads a script, runs it, and exits
//! non-zero on a fatal error. Grounded on the teacher's
//! `src/bin/why/main.rs`.
mod cli;

use std::fs;

use cli::Cli;
use log::error;

fn main() {
    let args = Cli::init();

    simple_logger::init_with_level((&args.verbosity).into()).unwrap();

    let source = match fs::read_to_string(&args.file) {
        Ok(source) => source,
        Err(err) => {
            error!("could not read '{}': {err}", args.file.display());
            std::process::exit(-1);
        }
    };

    let file_name = args.file.to_string_lossy().into_owned();
    let (_, ok) = zephyr_lang::run(&file_name, &source, false);

    if !ok {
        std::process::exit(-1);
    }
}
