//! Stock library namespaces. Each is a hash from member name to a builtin,
//! bound as a constant (`String`, `Array`, `Math`) when the environment for
//! a REPL session or script is assembled.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};

use crate::runtime::builtin::{array_arg, int_arg, str_arg, want_exactly, wrong_args};
use crate::runtime::env::Env;
use crate::runtime::interpreter::RuntimeError;
use crate::runtime::value::{BuiltinDef, HashData, HashKey, HashPair, Value};

pub fn install_stdlib(env: &Env) {
    register_namespace(env, "String", STRING_FUNCS);
    register_namespace(env, "Array", ARRAY_FUNCS);
    register_namespace(env, "Math", MATH_FUNCS);
}

/// Wrap a table of host callables into a hash and bind it read-only under
/// the namespace name.
fn register_namespace(env: &Env, name: &str, funcs: &'static [BuiltinDef]) {
    let mut data = HashData::default();
    for def in funcs {
        data.pairs.insert(
            HashKey::of_str(def.name),
            HashPair {
                key: Value::str(def.name),
                value: Value::Builtin(def),
            },
        );
    }
    env.bind_const(name, Value::hash(data));
}

static STRING_FUNCS: &[BuiltinDef] = &[
    BuiltinDef { name: "concat", func: str_concat },
    BuiltinDef { name: "len", func: str_len },
    BuiltinDef { name: "upper", func: str_upper },
    BuiltinDef { name: "lower", func: str_lower },
    BuiltinDef { name: "trim", func: str_trim },
    BuiltinDef { name: "contains", func: str_contains },
    BuiltinDef { name: "replace", func: str_replace },
    BuiltinDef { name: "split", func: str_split },
    BuiltinDef { name: "join", func: str_join },
    BuiltinDef { name: "index", func: str_index },
    BuiltinDef { name: "lastIndex", func: str_last_index },
    BuiltinDef { name: "hasPrefix", func: str_has_prefix },
    BuiltinDef { name: "hasSuffix", func: str_has_suffix },
    BuiltinDef { name: "repeat", func: str_repeat },
    BuiltinDef { name: "fields", func: str_fields },
    BuiltinDef { name: "trimPrefix", func: str_trim_prefix },
    BuiltinDef { name: "trimSuffix", func: str_trim_suffix },
    BuiltinDef { name: "trimLeft", func: str_trim_left },
    BuiltinDef { name: "trimRight", func: str_trim_right },
    BuiltinDef { name: "compare", func: str_compare },
    BuiltinDef { name: "count", func: str_count },
];

fn str_concat(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let a = str_arg(&args, 0, "concat")?;
    let b = str_arg(&args, 1, "concat")?;
    Ok(Value::str(format!("{}{}", a, b)))
}

fn str_len(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 1)?;
    Ok(Value::int(BigInt::from(str_arg(&args, 0, "len")?.len())))
}

fn str_upper(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 1)?;
    Ok(Value::str(str_arg(&args, 0, "upper")?.to_uppercase()))
}

fn str_lower(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 1)?;
    Ok(Value::str(str_arg(&args, 0, "lower")?.to_lowercase()))
}

fn str_trim(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 1)?;
    Ok(Value::str(str_arg(&args, 0, "trim")?.trim()))
}

fn str_contains(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let s = str_arg(&args, 0, "contains")?;
    let sub = str_arg(&args, 1, "contains")?;
    Ok(Value::Bool(s.contains(sub)))
}

// replace(s, old, new, n): n < 0 replaces every occurrence
fn str_replace(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 4)?;
    let s = str_arg(&args, 0, "replace")?;
    let old = str_arg(&args, 1, "replace")?;
    let new = str_arg(&args, 2, "replace")?;
    let n = int_arg(&args, 3, "replace")?;
    let replaced = match n.to_i64() {
        Some(n) if n < 0 => s.replace(old, new),
        Some(n) => s.replacen(old, new, n as usize),
        None => s.replace(old, new),
    };
    Ok(Value::str(replaced))
}

fn str_split(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let s = str_arg(&args, 0, "split")?;
    let sep = str_arg(&args, 1, "split")?;
    let pieces: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::str(c.to_string())).collect()
    } else {
        s.split(sep).map(Value::str).collect()
    };
    Ok(Value::array(pieces))
}

fn str_join(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let Value::Array(elements) = array_arg(&args, "join")? else {
        unreachable!()
    };
    let sep = str_arg(&args, 1, "join")?;
    let mut parts = Vec::new();
    for element in elements.borrow().iter() {
        match element {
            Value::Str(s) => parts.push(s.as_str().to_string()),
            other => {
                return Err(RuntimeError::msg(format!(
                    "argument to `join` must be ARRAY of STRING, got element {}",
                    other.type_name()
                )))
            }
        }
    }
    Ok(Value::str(parts.join(sep)))
}

fn str_index(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let s = str_arg(&args, 0, "index")?;
    let sub = str_arg(&args, 1, "index")?;
    let index = s.find(sub).map(|i| i as i64).unwrap_or(-1);
    Ok(Value::int(BigInt::from(index)))
}

fn str_last_index(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let s = str_arg(&args, 0, "lastIndex")?;
    let sub = str_arg(&args, 1, "lastIndex")?;
    let index = s.rfind(sub).map(|i| i as i64).unwrap_or(-1);
    Ok(Value::int(BigInt::from(index)))
}

fn str_has_prefix(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let s = str_arg(&args, 0, "hasPrefix")?;
    let prefix = str_arg(&args, 1, "hasPrefix")?;
    Ok(Value::Bool(s.starts_with(prefix)))
}

fn str_has_suffix(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let s = str_arg(&args, 0, "hasSuffix")?;
    let suffix = str_arg(&args, 1, "hasSuffix")?;
    Ok(Value::Bool(s.ends_with(suffix)))
}

fn str_repeat(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let s = str_arg(&args, 0, "repeat")?;
    let count = int_arg(&args, 1, "repeat")?
        .to_usize()
        .ok_or_else(|| RuntimeError::msg("invalid repeat count"))?;
    Ok(Value::str(s.repeat(count)))
}

fn str_fields(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 1)?;
    let s = str_arg(&args, 0, "fields")?;
    Ok(Value::array(
        s.split_whitespace().map(Value::str).collect(),
    ))
}

fn str_trim_prefix(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let s = str_arg(&args, 0, "trimPrefix")?;
    let prefix = str_arg(&args, 1, "trimPrefix")?;
    Ok(Value::str(s.strip_prefix(prefix).unwrap_or(s)))
}

fn str_trim_suffix(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let s = str_arg(&args, 0, "trimSuffix")?;
    let suffix = str_arg(&args, 1, "trimSuffix")?;
    Ok(Value::str(s.strip_suffix(suffix).unwrap_or(s)))
}

// trimLeft/trimRight take a cutset of characters, not a prefix
fn str_trim_left(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let s = str_arg(&args, 0, "trimLeft")?;
    let cutset = str_arg(&args, 1, "trimLeft")?;
    Ok(Value::str(s.trim_start_matches(|c| cutset.contains(c))))
}

fn str_trim_right(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let s = str_arg(&args, 0, "trimRight")?;
    let cutset = str_arg(&args, 1, "trimRight")?;
    Ok(Value::str(s.trim_end_matches(|c| cutset.contains(c))))
}

fn str_compare(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let a = str_arg(&args, 0, "compare")?;
    let b = str_arg(&args, 1, "compare")?;
    let ordering = a.cmp(b) as i64;
    Ok(Value::int(BigInt::from(ordering)))
}

fn str_count(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let s = str_arg(&args, 0, "count")?;
    let sub = str_arg(&args, 1, "count")?;
    let count = if sub.is_empty() {
        s.chars().count() + 1
    } else {
        s.matches(sub).count()
    };
    Ok(Value::int(BigInt::from(count)))
}

static ARRAY_FUNCS: &[BuiltinDef] = &[
    BuiltinDef { name: "len", func: arr_len },
    BuiltinDef { name: "push", func: arr_push },
    BuiltinDef { name: "pop", func: arr_pop },
    BuiltinDef { name: "shift", func: arr_shift },
    BuiltinDef { name: "unshift", func: arr_unshift },
    BuiltinDef { name: "indexOf", func: arr_index_of },
    BuiltinDef { name: "contains", func: arr_contains },
    BuiltinDef { name: "slice", func: arr_slice },
    BuiltinDef { name: "join", func: arr_join },
];

fn arr_len(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 1)?;
    let Value::Array(elements) = array_arg(&args, "len")? else {
        unreachable!()
    };
    Ok(Value::int(BigInt::from(elements.borrow().len())))
}

fn arr_push(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let Value::Array(elements) = array_arg(&args, "push")? else {
        unreachable!()
    };
    elements.borrow_mut().push(args[1].clone());
    Ok(args[0].clone())
}

fn arr_pop(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 1)?;
    let Value::Array(elements) = array_arg(&args, "pop")? else {
        unreachable!()
    };
    let popped = elements.borrow_mut().pop();
    Ok(popped.unwrap_or(Value::Null))
}

fn arr_shift(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 1)?;
    let Value::Array(elements) = array_arg(&args, "shift")? else {
        unreachable!()
    };
    let mut elements = elements.borrow_mut();
    if elements.is_empty() {
        return Ok(Value::Null);
    }
    Ok(elements.remove(0))
}

fn arr_unshift(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let Value::Array(elements) = array_arg(&args, "unshift")? else {
        unreachable!()
    };
    elements.borrow_mut().insert(0, args[1].clone());
    Ok(args[0].clone())
}

fn arr_index_of(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let Value::Array(elements) = array_arg(&args, "indexOf")? else {
        unreachable!()
    };
    let index = elements
        .borrow()
        .iter()
        .position(|el| el.is_equal(&args[1]))
        .map(|i| i as i64)
        .unwrap_or(-1);
    Ok(Value::int(BigInt::from(index)))
}

fn arr_contains(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let Value::Array(elements) = array_arg(&args, "contains")? else {
        unreachable!()
    };
    let found = elements.borrow().iter().any(|el| el.is_equal(&args[1]));
    Ok(Value::Bool(found))
}

fn arr_slice(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 3)?;
    let Value::Array(elements) = array_arg(&args, "slice")? else {
        unreachable!()
    };
    let elements = elements.borrow();
    let start = int_arg(&args, 1, "slice")?.to_usize();
    let end = int_arg(&args, 2, "slice")?.to_usize();
    match (start, end) {
        (Some(start), Some(end)) if start <= end && end <= elements.len() => {
            Ok(Value::array(elements[start..end].to_vec()))
        }
        _ => Err(RuntimeError::msg("invalid slice bounds")),
    }
}

fn arr_join(args: Vec<Value>) -> Result<Value, RuntimeError> {
    want_exactly(&args, 2)?;
    let Value::Array(elements) = array_arg(&args, "join")? else {
        unreachable!()
    };
    let sep = str_arg(&args, 1, "join")?;
    let parts: Vec<String> = elements.borrow().iter().map(|el| el.inspect()).collect();
    Ok(Value::str(parts.join(sep)))
}

static MATH_FUNCS: &[BuiltinDef] = &[
    BuiltinDef { name: "sin", func: math_sin },
    BuiltinDef { name: "cos", func: math_cos },
    BuiltinDef { name: "tan", func: math_tan },
    BuiltinDef { name: "asin", func: math_asin },
    BuiltinDef { name: "acos", func: math_acos },
    BuiltinDef { name: "atan", func: math_atan },
    BuiltinDef { name: "exp", func: math_exp },
    BuiltinDef { name: "log", func: math_log },
    BuiltinDef { name: "sqrt", func: math_sqrt },
    BuiltinDef { name: "pow", func: math_pow },
    BuiltinDef { name: "abs", func: math_abs },
    BuiltinDef { name: "ceil", func: math_ceil },
    BuiltinDef { name: "floor", func: math_floor },
    BuiltinDef { name: "round", func: math_round },
    BuiltinDef { name: "trunc", func: math_trunc },
    BuiltinDef { name: "mod", func: math_mod },
    BuiltinDef { name: "max", func: math_max },
    BuiltinDef { name: "min", func: math_min },
    BuiltinDef { name: "hypot", func: math_hypot },
];

// Math functions run through f64 and come back as floats
fn num_arg(args: &[Value], index: usize, name: &str) -> Result<f64, RuntimeError> {
    match &args[index] {
        Value::Int(value) => Ok(value.borrow().to_f64().unwrap_or(f64::NAN)),
        Value::Float(value) => Ok(value.to_f64().unwrap_or(f64::NAN)),
        other => Err(RuntimeError::msg(format!(
            "argument to `{}` must be INTEGER or FLOAT, got {}",
            name,
            other.type_name()
        ))),
    }
}

fn float_result(name: &str, value: f64) -> Result<Value, RuntimeError> {
    BigDecimal::from_f64(value)
        .map(Value::Float)
        .ok_or_else(|| RuntimeError::msg(format!("result of `{}` is not finite", name)))
}

fn unary_math(
    args: Vec<Value>,
    name: &str,
    f: fn(f64) -> f64,
) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return Err(wrong_args(args.len(), "1"));
    }
    float_result(name, f(num_arg(&args, 0, name)?))
}

fn binary_math(
    args: Vec<Value>,
    name: &str,
    f: fn(f64, f64) -> f64,
) -> Result<Value, RuntimeError> {
    if args.len() != 2 {
        return Err(wrong_args(args.len(), "2"));
    }
    let a = num_arg(&args, 0, name)?;
    let b = num_arg(&args, 1, name)?;
    float_result(name, f(a, b))
}

fn math_sin(args: Vec<Value>) -> Result<Value, RuntimeError> {
    unary_math(args, "sin", f64::sin)
}

fn math_cos(args: Vec<Value>) -> Result<Value, RuntimeError> {
    unary_math(args, "cos", f64::cos)
}

fn math_tan(args: Vec<Value>) -> Result<Value, RuntimeError> {
    unary_math(args, "tan", f64::tan)
}

fn math_asin(args: Vec<Value>) -> Result<Value, RuntimeError> {
    unary_math(args, "asin", f64::asin)
}

fn math_acos(args: Vec<Value>) -> Result<Value, RuntimeError> {
    unary_math(args, "acos", f64::acos)
}

fn math_atan(args: Vec<Value>) -> Result<Value, RuntimeError> {
    unary_math(args, "atan", f64::atan)
}

fn math_exp(args: Vec<Value>) -> Result<Value, RuntimeError> {
    unary_math(args, "exp", f64::exp)
}

fn math_log(args: Vec<Value>) -> Result<Value, RuntimeError> {
    unary_math(args, "log", f64::ln)
}

fn math_sqrt(args: Vec<Value>) -> Result<Value, RuntimeError> {
    unary_math(args, "sqrt", f64::sqrt)
}

fn math_pow(args: Vec<Value>) -> Result<Value, RuntimeError> {
    binary_math(args, "pow", f64::powf)
}

fn math_abs(args: Vec<Value>) -> Result<Value, RuntimeError> {
    unary_math(args, "abs", f64::abs)
}

fn math_ceil(args: Vec<Value>) -> Result<Value, RuntimeError> {
    unary_math(args, "ceil", f64::ceil)
}

fn math_floor(args: Vec<Value>) -> Result<Value, RuntimeError> {
    unary_math(args, "floor", f64::floor)
}

fn math_round(args: Vec<Value>) -> Result<Value, RuntimeError> {
    unary_math(args, "round", f64::round)
}

fn math_trunc(args: Vec<Value>) -> Result<Value, RuntimeError> {
    unary_math(args, "trunc", f64::trunc)
}

fn math_mod(args: Vec<Value>) -> Result<Value, RuntimeError> {
    binary_math(args, "mod", |a, b| a % b)
}

fn math_max(args: Vec<Value>) -> Result<Value, RuntimeError> {
    binary_math(args, "max", f64::max)
}

fn math_min(args: Vec<Value>) -> Result<Value, RuntimeError> {
    binary_math(args, "min", f64::min)
}

fn math_hypot(args: Vec<Value>) -> Result<Value, RuntimeError> {
    binary_math(args, "hypot", f64::hypot)
}

#[cfg(test)]
mod test {
    use super::*;

    fn int(v: i64) -> Value {
        Value::int(BigInt::from(v))
    }

    #[test]
    fn namespaces_bind_as_constants() {
        let env = Env::new();
        install_stdlib(&env);
        for name in ["String", "Array", "Math"] {
            let binding = env.get(name).unwrap();
            assert!(binding.read_only, "{} must be constant", name);
            assert!(matches!(binding.value, Value::Hash(_)));
        }
    }

    #[test]
    fn string_helpers() {
        assert_eq!(
            Value::str("AB"),
            str_upper(vec![Value::str("ab")]).unwrap()
        );
        assert_eq!(
            Value::str("a-b"),
            str_join(vec![
                Value::array(vec![Value::str("a"), Value::str("b")]),
                Value::str("-"),
            ])
            .unwrap()
        );
        assert_eq!(
            int(2),
            str_index(vec![Value::str("abcabc"), Value::str("c")]).unwrap()
        );
        assert_eq!(
            int(5),
            str_last_index(vec![Value::str("abcabc"), Value::str("c")]).unwrap()
        );
        assert_eq!(
            int(-1),
            str_index(vec![Value::str("abc"), Value::str("z")]).unwrap()
        );
        assert_eq!(
            Value::str("xbc"),
            str_replace(vec![
                Value::str("abc"),
                Value::str("a"),
                Value::str("x"),
                int(-1),
            ])
            .unwrap()
        );
        assert_eq!(
            int(3),
            str_count(vec![Value::str("cheese"), Value::str("e")]).unwrap()
        );
    }

    #[test]
    fn array_helpers() {
        let array = Value::array(vec![int(1), int(2), int(3)]);
        assert_eq!(int(2), arr_shift(vec![Value::array(vec![int(2)])]).unwrap());
        assert_eq!(
            int(1),
            arr_index_of(vec![array.clone(), int(2)]).unwrap()
        );
        assert_eq!(
            Value::Bool(true),
            arr_contains(vec![array.clone(), int(3)]).unwrap()
        );
        assert_eq!(
            Value::array(vec![int(2), int(3)]),
            arr_slice(vec![array.clone(), int(1), int(3)]).unwrap()
        );
        assert!(arr_slice(vec![array.clone(), int(2), int(9)]).is_err());
        assert_eq!(
            Value::str("1,2,3"),
            arr_join(vec![array.clone(), Value::str(",")]).unwrap()
        );
        let target = Value::array(vec![int(2)]);
        arr_unshift(vec![target.clone(), int(1)]).unwrap();
        assert_eq!(Value::array(vec![int(1), int(2)]), target);
    }

    #[test]
    fn math_helpers() {
        use std::str::FromStr;
        assert_eq!(
            Value::Float(BigDecimal::from_str("3").unwrap()),
            math_sqrt(vec![int(9)]).unwrap()
        );
        assert_eq!(
            Value::Float(BigDecimal::from_str("8").unwrap()),
            math_pow(vec![int(2), int(3)]).unwrap()
        );
        assert_eq!(
            Value::Float(BigDecimal::from_str("4").unwrap()),
            math_round(vec![Value::Float(BigDecimal::from_str("3.7").unwrap())]).unwrap()
        );
        // Out-of-domain results surface as errors instead of NaN values
        assert!(math_sqrt(vec![int(-1)]).is_err());
        assert!(math_log(vec![int(0)]).is_err());
    }
}
