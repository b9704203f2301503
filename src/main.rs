use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use oney::{execute_line, stock_env};

/// Interpreter for the 1y scripting language.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Execute a script file instead of starting the interactive prompt
    #[arg(short, long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Print the wall-clock duration of each execution
    #[arg(short, long)]
    time: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = args.file {
        let source = fs::read_to_string(&path)
            .with_context(|| format!("unable to read script file {}", path.display()))?;
        let env = stock_env();
        let mut stdout = io::stdout().lock();
        execute_line(&mut stdout, source.trim(), &env, args.time)?;
    } else {
        run_prompt(args.time)?;
    }
    Ok(())
}

const PROMPT: &str = ">> ";

fn run_prompt(timed: bool) -> Result<()> {
    let mut stdout = io::stdout().lock();
    let mut reader = BufReader::new(io::stdin().lock());
    let env = stock_env();

    writeln!(
        stdout,
        "1y language {} -- type \"quit\" or \"exit\" to leave.",
        env!("CARGO_PKG_VERSION")
    )?;

    let mut line = String::new();
    loop {
        write!(stdout, "{}", PROMPT)?;
        stdout.flush()?;

        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim_end_matches(['\n', '\r']);
        if input == "exit" || input == "quit" {
            break;
        }
        execute_line(&mut stdout, input, &env, timed)?;
    }
    Ok(())
}
