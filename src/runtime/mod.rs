pub mod builtin;
pub mod env;
pub mod interpreter;
pub mod stdlib;
pub mod value;

pub use env::Env;
pub use interpreter::{eval_program, RuntimeError};
pub use value::Value;

/// Environment handed to the REPL and the script runner: empty top level
/// plus the stock library namespaces. The global builtin table needs no
/// registration; identifier resolution falls back to it.
pub fn stock_env() -> Env {
    let env = Env::new();
    stdlib::install_stdlib(&env);
    env
}
