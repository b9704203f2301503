//! Tree-walking interpreter for the 1y scripting language: a hand-rolled
//! lexer, a Pratt parser, and a recursive evaluator over shared-ownership
//! runtime values with lexical closures.

use std::io::{self, Write};
use std::time::Instant;

use thiserror::Error;

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod token;

pub use runtime::{stock_env, Env, RuntimeError, Value};

use parser::parse_source;

/// Everything that can stop a source string from producing a value.
/// Parser errors come as a batch; evaluation stops at the first runtime
/// error.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("{}", .0.join("\n"))]
    Parse(Vec<String>),
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
}

/// Parse and evaluate a source string against the given environment,
/// yielding the value of the last statement.
pub fn evaluate(source: &str, env: &Env) -> Result<Value, ExecError> {
    let program = parse_source(source).map_err(ExecError::Parse)?;
    runtime::eval_program(&program, env).map_err(ExecError::Runtime)
}

/// Run one REPL line or script body and render the outcome the way the
/// interactive driver does: parser errors tab-indented one per line,
/// runtime errors with an `ERROR:` prefix, non-null results inspected.
pub fn execute_line(
    out: &mut impl Write,
    line: &str,
    env: &Env,
    timed: bool,
) -> io::Result<()> {
    let started = timed.then(Instant::now);

    match evaluate(line, env) {
        Ok(value) => {
            if !matches!(value, Value::Null) {
                writeln!(out, "{}", value.inspect())?;
            }
        }
        Err(ExecError::Parse(errors)) => {
            for message in errors {
                writeln!(out, "\t{}", message)?;
            }
        }
        Err(ExecError::Runtime(error)) => {
            writeln!(out, "ERROR: {}", error)?;
        }
    }

    if let Some(started) = started {
        writeln!(out, "Execution time: {:?}", started.elapsed())?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn evaluate_returns_last_value() {
        let env = stock_env();
        let value = evaluate("let a = 5; a + 3;", &env).unwrap();
        assert_eq!("8", value.inspect());
    }

    #[test]
    fn environment_persists_across_lines() {
        let env = stock_env();
        evaluate("let a = 2;", &env).unwrap();
        let value = evaluate("a * 21", &env).unwrap();
        assert_eq!("42", value.inspect());
    }

    #[test]
    fn execute_line_formats_outcomes() {
        let env = stock_env();

        let mut out = Vec::new();
        execute_line(&mut out, "1 + 1", &env, false).unwrap();
        assert_eq!("2\n", String::from_utf8(out).unwrap());

        let mut out = Vec::new();
        execute_line(&mut out, "puts", &env, false).unwrap();
        assert_eq!("builtin function\n", String::from_utf8(out).unwrap());

        // Null results stay silent
        let mut out = Vec::new();
        execute_line(&mut out, "if (false) { 1 }", &env, false).unwrap();
        assert_eq!("", String::from_utf8(out).unwrap());

        let mut out = Vec::new();
        execute_line(&mut out, "1 / 0", &env, false).unwrap();
        assert_eq!(
            "ERROR: division by zero\n",
            String::from_utf8(out).unwrap()
        );

        let mut out = Vec::new();
        execute_line(&mut out, "let = 5", &env, false).unwrap();
        let rendered = String::from_utf8(out).unwrap();
        assert!(rendered.starts_with('\t'), "parser errors are tab-indented");

        let mut out = Vec::new();
        execute_line(&mut out, "7", &env, true).unwrap();
        let rendered = String::from_utf8(out).unwrap();
        assert!(rendered.contains("Execution time:"), "got: {}", rendered);
    }
}
