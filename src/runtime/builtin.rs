use std::io::{self, BufRead, Write};
use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use rand::Rng;

use crate::runtime::interpreter::RuntimeError;
use crate::runtime::value::{BuiltinDef, Value};

/// The process-wide builtin table. Identifier resolution consults it after
/// the environment chain misses, so user bindings can shadow any entry.
pub static BUILTINS: &[BuiltinDef] = &[
    BuiltinDef {
        name: "len",
        func: builtin_len,
    },
    BuiltinDef {
        name: "puts",
        func: builtin_puts,
    },
    BuiltinDef {
        name: "first",
        func: builtin_first,
    },
    BuiltinDef {
        name: "last",
        func: builtin_last,
    },
    BuiltinDef {
        name: "rest",
        func: builtin_rest,
    },
    BuiltinDef {
        name: "push",
        func: builtin_push,
    },
    BuiltinDef {
        name: "pop",
        func: builtin_pop,
    },
    BuiltinDef {
        name: "concat",
        func: builtin_concat,
    },
    BuiltinDef {
        name: "range",
        func: builtin_range,
    },
    BuiltinDef {
        name: "random",
        func: builtin_random,
    },
    BuiltinDef {
        name: "input",
        func: builtin_input,
    },
    BuiltinDef {
        name: "sprintf",
        func: builtin_sprintf,
    },
    BuiltinDef {
        name: "split",
        func: builtin_split,
    },
    BuiltinDef {
        name: "int",
        func: builtin_int,
    },
    BuiltinDef {
        name: "float",
        func: builtin_float,
    },
    BuiltinDef {
        name: "str",
        func: builtin_str,
    },
    BuiltinDef {
        name: "type",
        func: builtin_type,
    },
];

pub fn lookup_builtin(name: &str) -> Option<&'static BuiltinDef> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

pub(crate) fn wrong_args(got: usize, want: &str) -> RuntimeError {
    RuntimeError::msg(format!(
        "wrong number of arguments. got={}, want={}",
        got, want
    ))
}

pub(crate) fn want_exactly(args: &[Value], n: usize) -> Result<(), RuntimeError> {
    if args.len() != n {
        return Err(wrong_args(args.len(), &n.to_string()));
    }
    Ok(())
}

fn builtin_len(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 1)?;
    match &args[0] {
        Value::Str(s) => Ok(Value::int(BigInt::from(s.as_str().len()))),
        Value::Array(elements) => Ok(Value::int(BigInt::from(elements.borrow().len()))),
        other => Err(RuntimeError::msg(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_puts(args: Vec<Value>) -> Result<Value, RuntimeError> {
    for arg in &args {
        println!("{}", arg.inspect());
    }
    Ok(Value::Null)
}

pub(crate) fn array_arg<'a>(args: &'a [Value], name: &str) -> Result<&'a Value, RuntimeError> {
    match &args[0] {
        value @ Value::Array(_) => Ok(value),
        other => Err(RuntimeError::msg(format!(
            "argument to `{}` must be ARRAY, got {}",
            name,
            other.type_name()
        ))),
    }
}

fn builtin_first(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 1)?;
    let Value::Array(elements) = array_arg(&args, "first")? else {
        unreachable!()
    };
    Ok(elements.borrow().first().cloned().unwrap_or(Value::Null))
}

fn builtin_last(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 1)?;
    let Value::Array(elements) = array_arg(&args, "last")? else {
        unreachable!()
    };
    Ok(elements.borrow().last().cloned().unwrap_or(Value::Null))
}

fn builtin_rest(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 1)?;
    let Value::Array(elements) = array_arg(&args, "rest")? else {
        unreachable!()
    };
    let elements = elements.borrow();
    if elements.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::array(elements[1..].to_vec()))
}

// Appends in place and returns the same array, so aliases observe the push
fn builtin_push(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let Value::Array(elements) = array_arg(&args, "push")? else {
        unreachable!()
    };
    elements.borrow_mut().push(args[1].clone());
    Ok(args[0].clone())
}

fn builtin_pop(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 1)?;
    let Value::Array(elements) = array_arg(&args, "pop")? else {
        unreachable!()
    };
    let popped = elements.borrow_mut().pop();
    Ok(popped.unwrap_or(Value::Null))
}

fn builtin_concat(args: Vec<Value>) -> Result<Value, RuntimeError> {
    if args.len() < 2 {
        return Err(wrong_args(args.len(), "2+"));
    }
    let mut elements = Vec::new();
    for arg in &args {
        match arg {
            Value::Array(part) => elements.extend(part.borrow().iter().cloned()),
            other => {
                return Err(RuntimeError::msg(format!(
                    "argument to `concat` must be ARRAY, got {}",
                    other.type_name()
                )))
            }
        }
    }
    Ok(Value::array(elements))
}

pub(crate) fn int_arg(args: &[Value], index: usize, name: &str) -> Result<BigInt, RuntimeError> {
    match &args[index] {
        Value::Int(value) => Ok(value.borrow().clone()),
        other => Err(RuntimeError::msg(format!(
            "argument to `{}` must be INTEGER, got {}",
            name,
            other.type_name()
        ))),
    }
}

fn builtin_range(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let start = int_arg(&args, 0, "range")?;
    let end = int_arg(&args, 1, "range")?;
    if start > end {
        return Err(RuntimeError::msg(
            "start index cannot be greater than end index",
        ));
    }
    let mut elements = Vec::new();
    let mut i = start;
    while i < end {
        elements.push(Value::int(i.clone()));
        i = i + BigInt::from(1);
    }
    Ok(Value::array(elements))
}

fn builtin_random(args: Vec<Value>) -> Result<Value, RuntimeError> {
    let (min, max) = match args.len() {
        1 => (0, random_bound(&args, 0)?),
        2 => (random_bound(&args, 0)?, random_bound(&args, 1)?),
        n => return Err(wrong_args(n, "1 or 2")),
    };
    if min >= max {
        return Err(RuntimeError::msg("invalid range for `random`"));
    }
    let picked = rand::thread_rng().gen_range(min..max);
    Ok(Value::int(BigInt::from(picked)))
}

fn random_bound(args: &[Value], index: usize) -> Result<i64, RuntimeError> {
    int_arg(args, index, "random")?
        .to_i64()
        .ok_or_else(|| RuntimeError::msg("argument to `random` out of range"))
}

fn builtin_input(args: Vec<Value>) -> Result<Value, RuntimeError> {
    match args.len() {
        0 => {}
        1 => {
            // The prompt is the one place escape sequences are decoded
            print!("{}", process_escapes(&args[0].inspect()));
            let _ = io::stdout().flush();
        }
        n => return Err(wrong_args(n, "0 or 1")),
    }
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|err| RuntimeError::msg(format!("could not read input: {}", err)))?;
    Ok(Value::str(line.trim_end_matches(['\n', '\r'])))
}

fn process_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

// printf-style substitution: every `%<verb>` consumes the next argument's
// inspected form; `%%` is a literal percent
fn builtin_sprintf(args: Vec<Value>) -> Result<Value, RuntimeError> {
    if args.is_empty() {
        return Err(wrong_args(0, "1+"));
    }
    let template = match &args[0] {
        Value::Str(s) => s.as_str().to_string(),
        other => {
            return Err(RuntimeError::msg(format!(
                "first argument to `sprintf` must be STRING, got {}",
                other.type_name()
            )))
        }
    };

    let mut out = String::with_capacity(template.len());
    let mut next = 1;
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(verb) => {
                if next < args.len() {
                    out.push_str(&args[next].inspect());
                    next += 1;
                } else {
                    out.push_str(&format!("%!{}(MISSING)", verb));
                }
            }
            None => out.push('%'),
        }
    }
    Ok(Value::str(out))
}

pub(crate) fn str_arg<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a str, RuntimeError> {
    match &args[index] {
        Value::Str(s) => Ok(s.as_str()),
        other => Err(RuntimeError::msg(format!(
            "argument to `{}` must be STRING, got {}",
            name,
            other.type_name()
        ))),
    }
}

fn builtin_split(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let text = str_arg(&args, 0, "split")?;
    let sep = str_arg(&args, 1, "split")?;
    let pieces: Vec<Value> = if sep.is_empty() {
        text.chars().map(|c| Value::str(c.to_string())).collect()
    } else {
        text.split(sep).map(Value::str).collect()
    };
    Ok(Value::array(pieces))
}

fn builtin_int(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 1)?;
    match &args[0] {
        Value::Str(s) => BigInt::from_str(s.as_str())
            .map(Value::int)
            .map_err(|_| RuntimeError::msg(format!("cannot convert {} to int", s.as_str()))),
        Value::Float(value) => {
            let rendered = value.normalized().to_string();
            BigInt::from_str(&rendered)
                .map(Value::int)
                .map_err(|_| RuntimeError::msg(format!("cannot convert {} to int", rendered)))
        }
        other => Err(RuntimeError::msg(format!(
            "argument to `int` must be STRING or FLOAT, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_float(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 1)?;
    match &args[0] {
        Value::Str(s) => BigDecimal::from_str(s.as_str())
            .map(Value::Float)
            .map_err(|_| RuntimeError::msg(format!("cannot convert {} to float", s.as_str()))),
        Value::Int(value) => Ok(Value::Float(BigDecimal::from(value.borrow().clone()))),
        other => Err(RuntimeError::msg(format!(
            "argument to `float` must be STRING or INTEGER, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_str(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 1)?;
    match &args[0] {
        Value::Int(value) => Ok(Value::str(value.borrow().to_string())),
        Value::Float(value) => Ok(Value::str(value.to_string())),
        other => Err(RuntimeError::msg(format!(
            "argument to `str` must be INTEGER or FLOAT, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_type(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 1)?;
    Ok(Value::str(args[0].type_name()))
}
