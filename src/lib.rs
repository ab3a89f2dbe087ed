//! Interpreter core for the (rather small and very experimental) Zephyr
//! scripting language: a single-pass lexer/parser/evaluator, no
//! materialized AST, with a frame-stack environment model and a
//! per-function memoization cache.
pub mod error;
pub mod evaluator;
pub mod frame;
pub mod function;
pub mod lexer;
pub mod symbol;
pub mod token;
pub mod value;

use std::io::{self, Write};

pub use error::RuntimeError;
pub use value::Value;

use evaluator::Interpreter;

/// Run one script to completion.
///
/// `test_mode` suppresses `print`/`cowsay` output (for harnesses that only
/// care about the returned value) without changing evaluation semantics.
/// Returns the value of the last top-level statement and whether the run
/// completed without a fatal error; on error, the diagnostic has already
/// been printed to stderr.
pub fn run(source_name: &str, source_text: &str, test_mode: bool) -> (Value, bool) {
    let mut stdout;
    let mut null_sink;
    let sink: &mut dyn Write = if test_mode {
        null_sink = io::sink();
        &mut null_sink
    } else {
        stdout = io::stdout();
        &mut stdout
    };
    run_to_sink(source_name, source_text, sink)
}

/// Like [`run`], but writes `print`/`cowsay` output to `buffer` and
/// returns it alongside the result. Used by the integration tests, which
/// need to assert on observable output without a subprocess.
pub fn run_capturing(source_name: &str, source_text: &str) -> (Value, bool, String) {
    let mut buffer = Vec::new();
    let (value, ok) = run_to_sink(source_name, source_text, &mut buffer);
    (value, ok, String::from_utf8_lossy(&buffer).into_owned())
}

fn run_to_sink(source_name: &str, source_text: &str, sink: &mut dyn Write) -> (Value, bool) {
    let interpreter = Interpreter::new(source_name, source_text, sink);
    let mut interpreter = match interpreter {
        Ok(interpreter) => interpreter,
        Err(err) => {
            eprint!("{err}");
            return (Value::Undefined, false);
        }
    };
    match interpreter.eval_program() {
        Ok(value) => (value, true),
        Err(err) => {
            eprint!("{err}");
            (Value::Undefined, false)
        }
    }
}
