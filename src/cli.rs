//! # Cli
//!
//! CLI argument parsing for the `zephyr` binary. Grounded on the
//! teacher's `src/bin/why/cli.rs`: a `clap`-derived struct plus a
//! `LogLevel` enum that converts into `log::Level`.
use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// The path to the script to run.
    #[arg(index = 1)]
    pub file: std::path::PathBuf,

    /// Specify the log level of the interpreter.
    #[arg(value_enum, short, long, default_value_t = LogLevel::default())]
    pub verbosity: LogLevel,
}

impl Cli {
    pub fn init() -> Self {
        Cli::parse()
    }
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum LogLevel {
    #[default]
    #[value(alias("0"))]
    Error,

    #[value(alias("1"))]
    Warn,

    #[value(alias("2"))]
    Info,

    #[value(alias("3"))]
    Debug,

    #[value(alias("4"))]
    Trace,
}

impl From<&LogLevel> for log::Level {
    fn from(value: &LogLevel) -> Self {
        match value {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}
