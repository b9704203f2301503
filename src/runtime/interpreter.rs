use std::fs;
use std::io;
use std::rc::Rc;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive, Zero};
use thiserror::Error;

use crate::ast::{Block, Expr, Program, Stmt};
use crate::parser::parse_source;
use crate::runtime::builtin::lookup_builtin;
use crate::runtime::env::Env;
use crate::runtime::value::{FunctionValue, HashData, HashKey, HashPair, Value};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("identifier not found: {0}")]
    IdentifierNotFound(String),
    #[error("type mismatch: {left} {op} {right}")]
    TypeMismatch {
        left: &'static str,
        op: String,
        right: &'static str,
    },
    #[error("unknown operator: {op}{operand}")]
    UnknownUnaryOperator {
        op: String,
        operand: &'static str,
    },
    #[error("unknown operator: {left} {op} {right}")]
    UnknownOperator {
        left: &'static str,
        op: String,
        right: &'static str,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("modulus by zero")]
    ModulusByZero,
    #[error("invalid shift amount")]
    InvalidShift,
    #[error("cannot assign to constant '{0}'")]
    AssignToConstant(String),
    #[error("cannot redeclare variable '{0}'")]
    RedeclareVariable(String),
    #[error("cannot redeclare constant '{0}'")]
    RedeclareConstant(String),
    #[error("invalid variable name '{0}'")]
    InvalidName(String),
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,
    #[error("unusable as hash key: {0}")]
    UnusableHashKey(&'static str),
    #[error("not a hash: {0}")]
    NotAHash(&'static str),
    #[error("not a function: {0}")]
    NotAFunction(&'static str),
    #[error("index operator not supported: {0}")]
    IndexNotSupported(&'static str),
    #[error("wrong number of arguments: expected {expected}, got {got}")]
    WrongArity { expected: usize, got: usize },
    #[error("import path must be a string, got {0}")]
    ImportNotString(&'static str),
    #[error("could not read file: {0}")]
    ImportRead(String),
    #[error("parsing file {path} failed: {errors}")]
    ImportParse { path: String, errors: String },
    #[error("break outside of a loop")]
    InvalidBreak,
    #[error("continue outside of a loop")]
    InvalidContinue,
    #[error("{0}")]
    Message(String),
}

impl RuntimeError {
    pub fn msg(message: impl Into<String>) -> RuntimeError {
        RuntimeError::Message(message.into())
    }
}

/// Why evaluation of a node stopped early. `return`, `break`, `continue`
/// and runtime errors all unwind through the same channel; loops, calls and
/// the program top level each catch the causes they own.
pub enum UnwindCause {
    Error(RuntimeError),
    Return(Value),
    Break,
    Continue,
}

impl From<RuntimeError> for UnwindCause {
    fn from(error: RuntimeError) -> UnwindCause {
        UnwindCause::Error(error)
    }
}

type Outcome = Result<Value, UnwindCause>;

/// Evaluate a whole program. A top-level `return` yields its value; stray
/// `break`/`continue` are errors.
pub fn eval_program(program: &Program, env: &Env) -> Result<Value, RuntimeError> {
    let mut result = Value::Null;
    for stmt in &program.statements {
        match eval_stmt(stmt, env) {
            Ok(value) => result = value,
            Err(UnwindCause::Return(value)) => return Ok(value),
            Err(UnwindCause::Error(error)) => return Err(error),
            Err(UnwindCause::Break) => return Err(RuntimeError::InvalidBreak),
            Err(UnwindCause::Continue) => return Err(RuntimeError::InvalidContinue),
        }
    }
    Ok(result)
}

fn eval_stmt(stmt: &Stmt, env: &Env) -> Outcome {
    match stmt {
        Stmt::Let { name, value } => {
            let value = eval_expr(value, env)?;
            env.declare_var(name, value.clone())?;
            Ok(value)
        }
        Stmt::Const { name, value } => {
            let value = eval_expr(value, env)?;
            env.declare_const(name, value.clone())?;
            Ok(value)
        }
        Stmt::Return(value) => {
            let value = eval_expr(value, env)?;
            Err(UnwindCause::Return(value))
        }
        Stmt::While { cond, body } => loop {
            let condition = eval_expr(cond, env)?;
            if !condition.is_truthy() {
                return Ok(Value::Null);
            }
            // Each iteration gets a fresh scope so loop-local bindings
            // cannot leak or collide between rounds
            let body_env = Env::enclosed(env);
            match eval_block(body, &body_env) {
                Ok(_) => {}
                Err(UnwindCause::Break) => return Ok(Value::Null),
                Err(UnwindCause::Continue) => {}
                Err(other) => return Err(other),
            }
        },
        Stmt::For {
            init,
            cond,
            post,
            body,
        } => {
            // The init binding lives in a scope wrapped around the whole
            // loop, visible to cond, post and every iteration
            let loop_env = Env::enclosed(env);
            if let Some(init) = init {
                eval_stmt(init, &loop_env)?;
            }
            loop {
                if let Some(cond) = cond {
                    if !eval_expr(cond, &loop_env)?.is_truthy() {
                        return Ok(Value::Null);
                    }
                }
                let body_env = Env::enclosed(&loop_env);
                match eval_block(body, &body_env) {
                    Ok(_) => {}
                    Err(UnwindCause::Break) => return Ok(Value::Null),
                    Err(UnwindCause::Continue) => {}
                    Err(other) => return Err(other),
                }
                if let Some(post) = post {
                    eval_stmt(post, &loop_env)?;
                }
            }
        }
        Stmt::Break => Err(UnwindCause::Break),
        Stmt::Continue => Err(UnwindCause::Continue),
        Stmt::Expr(expr) => eval_expr(expr, env),
    }
}

// A block evaluates to its last statement's value; any unwind passes
// through untouched so the owner (loop, call, program) can catch it
fn eval_block(block: &Block, env: &Env) -> Outcome {
    let mut result = Value::Null;
    for stmt in &block.statements {
        result = eval_stmt(stmt, env)?;
    }
    Ok(result)
}

fn eval_expr(expr: &Expr, env: &Env) -> Outcome {
    match expr {
        Expr::Ident(name) => eval_identifier(name, env),
        Expr::Int(value) => Ok(Value::int(value.clone())),
        Expr::Float(value) => Ok(Value::Float(value.clone())),
        Expr::Str(value) => Ok(Value::str(value.clone())),
        Expr::Bool(value) => Ok(Value::Bool(*value)),
        Expr::Array(elements) => {
            let mut evaluated = Vec::with_capacity(elements.len());
            for element in elements {
                evaluated.push(eval_expr(element, env)?);
            }
            Ok(Value::array(evaluated))
        }
        Expr::Hash(pairs) => eval_hash_literal(pairs, env),
        Expr::Prefix { op, right } => {
            let value = eval_expr(right, env)?;
            eval_prefix(op, &value).map_err(Into::into)
        }
        Expr::Postfix { op, left } => {
            let value = eval_expr(left, env)?;
            eval_postfix(op, &value).map_err(Into::into)
        }
        Expr::Infix { op, left, right } => match op.as_str() {
            // Logical operators short-circuit and yield the selected
            // operand itself, not a coerced boolean
            "&&" => {
                let left = eval_expr(left, env)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                eval_expr(right, env)
            }
            "||" => {
                let left = eval_expr(left, env)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                eval_expr(right, env)
            }
            _ => {
                let left = eval_expr(left, env)?;
                let right = eval_expr(right, env)?;
                eval_infix(op, &left, &right).map_err(Into::into)
            }
        },
        Expr::If {
            cond,
            consequence,
            elifs,
            alternative,
        } => {
            if eval_expr(cond, env)?.is_truthy() {
                return eval_block(consequence, env);
            }
            for (elif_cond, elif_body) in elifs {
                if eval_expr(elif_cond, env)?.is_truthy() {
                    return eval_block(elif_body, env);
                }
            }
            match alternative {
                Some(alternative) => eval_block(alternative, env),
                None => Ok(Value::Null),
            }
        }
        Expr::Function { parameters, body } => Ok(Value::Function(Rc::new(FunctionValue {
            parameters: parameters.clone(),
            body: body.clone(),
            env: env.clone(),
        }))),
        Expr::Call {
            function,
            arguments,
        } => {
            let function = eval_expr(function, env)?;
            let mut args = Vec::with_capacity(arguments.len());
            for argument in arguments {
                args.push(eval_expr(argument, env)?);
            }
            apply_function(&function, args)
        }
        Expr::Index { left, indices } => {
            let mut value = eval_expr(left, env)?;
            // Multi-dimensional tuples index layer by layer
            for index in indices {
                let index = eval_expr(index, env)?;
                value = eval_index(&value, &index)?;
            }
            Ok(value)
        }
        Expr::Assign { target, value } => eval_assignment(target, value, env),
        Expr::Dot { left, property } => {
            let value = eval_expr(left, env)?;
            eval_dot(&value, property).map_err(Into::into)
        }
        Expr::Import(path) => eval_import(path, env),
    }
}

fn eval_identifier(name: &str, env: &Env) -> Outcome {
    if let Some(binding) = env.get(name) {
        return Ok(binding.value);
    }
    if let Some(builtin) = lookup_builtin(name) {
        return Ok(Value::Builtin(builtin));
    }
    Err(RuntimeError::IdentifierNotFound(name.to_string()).into())
}

fn eval_hash_literal(pairs: &[(Expr, Expr)], env: &Env) -> Outcome {
    let mut data = HashData::default();
    for (key_expr, value_expr) in pairs {
        let key = eval_expr(key_expr, env)?;
        let hash_key = key
            .hash_key()
            .ok_or(RuntimeError::UnusableHashKey(key.type_name()))?;
        let value = eval_expr(value_expr, env)?;
        data.pairs.insert(hash_key, HashPair { key, value });
    }
    Ok(Value::hash(data))
}

fn eval_prefix(op: &str, value: &Value) -> Result<Value, RuntimeError> {
    match op {
        "!" => Ok(Value::Bool(eval_bang(value))),
        "-" => match value {
            Value::Int(cell) => Ok(Value::int(-&*cell.borrow())),
            Value::Float(value) => Ok(Value::Float(-value)),
            other => Err(unknown_unary(op, other)),
        },
        "~" => match value {
            Value::Int(cell) => Ok(Value::int(!&*cell.borrow())),
            other => Err(unknown_unary(op, other)),
        },
        "++" => eval_step(op, value, 1, true),
        "--" => eval_step(op, value, -1, true),
        _ => Err(unknown_unary(op, value)),
    }
}

// `!` treats numeric zero as false on top of the usual truthiness
fn eval_bang(value: &Value) -> bool {
    if value.is_zero_number() {
        return true;
    }
    !value.is_truthy()
}

fn eval_postfix(op: &str, value: &Value) -> Result<Value, RuntimeError> {
    match op {
        "++" => eval_step(op, value, 1, false),
        "--" => eval_step(op, value, -1, false),
        _ => Err(unknown_unary(op, value)),
    }
}

// Increment/decrement mutate the shared integer cell in place, so the
// update is visible through every alias of the operand. Prefix forms
// return the updated cell, postfix forms a snapshot of the old value.
fn eval_step(op: &str, value: &Value, delta: i64, is_prefix: bool) -> Result<Value, RuntimeError> {
    match value {
        Value::Int(cell) => {
            let updated = &*cell.borrow() + BigInt::from(delta);
            if is_prefix {
                *cell.borrow_mut() = updated;
                Ok(Value::Int(cell.clone()))
            } else {
                let snapshot = cell.replace(updated);
                Ok(Value::int(snapshot))
            }
        }
        other => Err(unknown_unary(op, other)),
    }
}

fn unknown_unary(op: &str, operand: &Value) -> RuntimeError {
    RuntimeError::UnknownUnaryOperator {
        op: op.to_string(),
        operand: operand.type_name(),
    }
}

fn eval_infix(op: &str, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => eval_integer_infix(op, a, b),
        (Value::Float(_), Value::Int(_))
        | (Value::Int(_), Value::Float(_))
        | (Value::Float(_), Value::Float(_)) => eval_float_infix(op, left, right),
        (Value::Bool(a), Value::Bool(b)) => match op {
            "==" => Ok(Value::Bool(a == b)),
            "!=" => Ok(Value::Bool(a != b)),
            _ => Err(unknown_infix(left, op, right)),
        },
        (Value::Hash(_), Value::Hash(_)) => match op {
            "==" => Ok(Value::Bool(left.is_equal(right))),
            "!=" => Ok(Value::Bool(!left.is_equal(right))),
            _ => Err(unknown_infix(left, op, right)),
        },
        (Value::Str(a), Value::Str(b)) => eval_string_infix(op, a.as_str(), b.as_str()),
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
            if op == "*" {
                let count = repeat_count(&n.borrow())?;
                Ok(Value::str(s.as_str().repeat(count)))
            } else {
                Err(unknown_infix(left, op, right))
            }
        }
        (Value::Array(a), Value::Array(b)) => match op {
            "+" => {
                // Fresh array; the operands keep their own storage
                let (a, b) = (a.borrow(), b.borrow());
                let mut elements = Vec::with_capacity(a.len() + b.len());
                elements.extend(a.iter().cloned());
                elements.extend(b.iter().cloned());
                Ok(Value::array(elements))
            }
            "==" => Ok(Value::Bool(left.is_equal(right))),
            "!=" => Ok(Value::Bool(!left.is_equal(right))),
            _ => Err(unknown_infix(left, op, right)),
        },
        (Value::Array(a), Value::Int(n)) | (Value::Int(n), Value::Array(a)) => {
            if op == "*" {
                let count = repeat_count(&n.borrow())?;
                let source = a.borrow();
                let mut elements = Vec::with_capacity(source.len() * count);
                for _ in 0..count {
                    elements.extend(source.iter().cloned());
                }
                Ok(Value::array(elements))
            } else {
                Err(unknown_infix(left, op, right))
            }
        }
        _ => match op {
            "==" => Ok(Value::Bool(left.identity_eq(right))),
            "!=" => Ok(Value::Bool(!left.identity_eq(right))),
            _ if left.type_name() != right.type_name() => Err(RuntimeError::TypeMismatch {
                left: left.type_name(),
                op: op.to_string(),
                right: right.type_name(),
            }),
            _ => Err(unknown_infix(left, op, right)),
        },
    }
}

fn unknown_infix(left: &Value, op: &str, right: &Value) -> RuntimeError {
    RuntimeError::UnknownOperator {
        left: left.type_name(),
        op: op.to_string(),
        right: right.type_name(),
    }
}

fn repeat_count(n: &BigInt) -> Result<usize, RuntimeError> {
    n.to_usize()
        .ok_or_else(|| RuntimeError::msg(format!("invalid repeat count: {}", n)))
}

fn eval_integer_infix(
    op: &str,
    a: &Rc<std::cell::RefCell<BigInt>>,
    b: &Rc<std::cell::RefCell<BigInt>>,
) -> Result<Value, RuntimeError> {
    let l = a.borrow();
    let r = b.borrow();
    match op {
        "+" => Ok(Value::int(&*l + &*r)),
        "-" => Ok(Value::int(&*l - &*r)),
        "*" => Ok(Value::int(&*l * &*r)),
        "/" => {
            if r.is_zero() {
                return Err(RuntimeError::DivisionByZero);
            }
            Ok(Value::int(&*l / &*r))
        }
        "%" => {
            if r.is_zero() {
                return Err(RuntimeError::ModulusByZero);
            }
            Ok(Value::int(&*l % &*r))
        }
        // Exponentiation goes through a float approximation
        "**" => float_pow(big_to_f64(&l), big_to_f64(&r)),
        "<" => Ok(Value::Bool(*l < *r)),
        ">" => Ok(Value::Bool(*l > *r)),
        "<=" => Ok(Value::Bool(*l <= *r)),
        ">=" => Ok(Value::Bool(*l >= *r)),
        "==" => Ok(Value::Bool(*l == *r)),
        "!=" => Ok(Value::Bool(*l != *r)),
        "&" => Ok(Value::int(&*l & &*r)),
        "|" => Ok(Value::int(&*l | &*r)),
        "^" => Ok(Value::int(&*l ^ &*r)),
        "<<" => {
            let count = r.to_usize().ok_or(RuntimeError::InvalidShift)?;
            Ok(Value::int(l.clone() << count))
        }
        ">>" => {
            let count = r.to_usize().ok_or(RuntimeError::InvalidShift)?;
            Ok(Value::int(l.clone() >> count))
        }
        _ => Err(RuntimeError::UnknownOperator {
            left: "INTEGER",
            op: op.to_string(),
            right: "INTEGER",
        }),
    }
}

fn eval_float_infix(op: &str, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let l = to_decimal(left);
    let r = to_decimal(right);
    match op {
        "+" => Ok(Value::Float(&l + &r)),
        "-" => Ok(Value::Float(&l - &r)),
        "*" => Ok(Value::Float(&l * &r)),
        "/" => {
            if r.is_zero() {
                return Err(RuntimeError::DivisionByZero);
            }
            Ok(Value::Float(&l / &r))
        }
        "**" => float_pow(
            l.to_f64().unwrap_or(f64::NAN),
            r.to_f64().unwrap_or(f64::NAN),
        ),
        "<" => Ok(Value::Bool(l < r)),
        ">" => Ok(Value::Bool(l > r)),
        "<=" => Ok(Value::Bool(l <= r)),
        ">=" => Ok(Value::Bool(l >= r)),
        "==" => Ok(Value::Bool(l == r)),
        "!=" => Ok(Value::Bool(l != r)),
        _ => Err(unknown_infix(left, op, right)),
    }
}

// Int operands promote to floats in mixed arithmetic
fn to_decimal(value: &Value) -> BigDecimal {
    match value {
        Value::Int(cell) => BigDecimal::from(cell.borrow().clone()),
        Value::Float(value) => value.clone(),
        _ => BigDecimal::zero(),
    }
}

fn big_to_f64(value: &BigInt) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

fn float_pow(base: f64, exponent: f64) -> Result<Value, RuntimeError> {
    let result = base.powf(exponent);
    BigDecimal::from_f64(result)
        .map(Value::Float)
        .ok_or_else(|| RuntimeError::msg("exponentiation result is not finite"))
}

fn eval_string_infix(op: &str, left: &str, right: &str) -> Result<Value, RuntimeError> {
    match op {
        "+" => Ok(Value::str(format!("{}{}", left, right))),
        "==" => Ok(Value::Bool(left == right)),
        "!=" => Ok(Value::Bool(left != right)),
        "<" => Ok(Value::Bool(left < right)),
        ">" => Ok(Value::Bool(left > right)),
        "<=" => Ok(Value::Bool(left <= right)),
        ">=" => Ok(Value::Bool(left >= right)),
        _ => Err(RuntimeError::UnknownOperator {
            left: "STRING",
            op: op.to_string(),
            right: "STRING",
        }),
    }
}

pub(crate) fn apply_function(function: &Value, args: Vec<Value>) -> Outcome {
    match function {
        Value::Function(func) => {
            if args.len() != func.parameters.len() {
                return Err(RuntimeError::WrongArity {
                    expected: func.parameters.len(),
                    got: args.len(),
                }
                .into());
            }
            let call_env = Env::enclosed(&func.env);
            for (parameter, arg) in func.parameters.iter().zip(args) {
                call_env.bind(parameter, arg);
            }
            match eval_block(&func.body, &call_env) {
                Ok(value) => Ok(value),
                Err(UnwindCause::Return(value)) => Ok(value),
                Err(UnwindCause::Break) => Err(RuntimeError::InvalidBreak.into()),
                Err(UnwindCause::Continue) => Err(RuntimeError::InvalidContinue.into()),
                Err(error) => Err(error),
            }
        }
        Value::Builtin(builtin) => (builtin.func)(args).map_err(Into::into),
        other => Err(RuntimeError::NotAFunction(other.type_name()).into()),
    }
}

fn eval_index(value: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match (value, index) {
        (Value::Array(elements), Value::Int(i)) => {
            // Out-of-range and negative indices yield null, not an error
            let slot = i
                .borrow()
                .to_usize()
                .and_then(|i| elements.borrow().get(i).cloned());
            Ok(slot.unwrap_or(Value::Null))
        }
        (Value::Hash(data), index) => {
            let key = index
                .hash_key()
                .ok_or(RuntimeError::UnusableHashKey(index.type_name()))?;
            Ok(data
                .borrow()
                .pairs
                .get(&key)
                .map(|pair| pair.value.clone())
                .unwrap_or(Value::Null))
        }
        (Value::Str(s), Value::Int(i)) => {
            let byte = i
                .borrow()
                .to_usize()
                .and_then(|i| s.as_str().as_bytes().get(i).copied());
            Ok(byte
                .map(|b| Value::str((b as char).to_string()))
                .unwrap_or(Value::Null))
        }
        _ => Err(RuntimeError::IndexNotSupported(value.type_name())),
    }
}

fn eval_assignment(target: &Expr, value_expr: &Expr, env: &Env) -> Outcome {
    let value = eval_expr(value_expr, env)?;
    match target {
        Expr::Ident(name) => {
            env.assign(name, value.clone())?;
            Ok(value)
        }
        Expr::Dot { left, property } => {
            let container = eval_expr(left, env)?;
            match container {
                Value::Hash(data) => {
                    let key = HashKey::of_str(property);
                    data.borrow_mut().pairs.insert(
                        key,
                        HashPair {
                            key: Value::str(property.clone()),
                            value: value.clone(),
                        },
                    );
                    Ok(value)
                }
                other => Err(RuntimeError::NotAHash(other.type_name()).into()),
            }
        }
        _ => Err(RuntimeError::InvalidAssignmentTarget.into()),
    }
}

fn eval_dot(value: &Value, property: &str) -> Result<Value, RuntimeError> {
    match value {
        Value::Hash(data) => {
            let key = HashKey::of_str(property);
            Ok(data
                .borrow()
                .pairs
                .get(&key)
                .map(|pair| pair.value.clone())
                .unwrap_or(Value::Null))
        }
        other => Err(RuntimeError::NotAHash(other.type_name())),
    }
}

fn eval_import(path_expr: &Expr, env: &Env) -> Outcome {
    let path_value = eval_expr(path_expr, env)?;
    let path = match &path_value {
        Value::Str(s) => s.as_str().to_string(),
        other => return Err(RuntimeError::ImportNotString(other.type_name()).into()),
    };
    let path = if path.ends_with(".1y") {
        path
    } else {
        format!("{}.1y", path)
    };

    let source =
        read_module(&path).map_err(|_| RuntimeError::ImportRead(path.clone()))?;
    let program = parse_source(&source).map_err(|errors| RuntimeError::ImportParse {
        path: path.clone(),
        errors: errors.join("\n"),
    })?;

    // Modules run against a fresh top level; the global builtin table is
    // still reachable through identifier resolution
    let module_env = Env::new();
    eval_program(&program, &module_env)?;

    let mut data = HashData::default();
    for (name, value) in module_env.exports() {
        let key = HashKey::of_str(&name);
        data.pairs.insert(
            key,
            HashPair {
                key: Value::str(name),
                value,
            },
        );
    }
    Ok(Value::hash(data))
}

// Resolve against the working directory first, then next to the
// interpreter binary
fn read_module(path: &str) -> io::Result<String> {
    match fs::read_to_string(path) {
        Ok(source) => Ok(source),
        Err(_) => {
            let exe = std::env::current_exe()?;
            let dir = exe
                .parent()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no executable directory"))?;
            fs::read_to_string(dir.join(path))
        }
    }
}
