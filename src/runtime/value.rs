use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug, Formatter};
use std::hash::Hasher;
use std::rc::Rc;

use bigdecimal::BigDecimal;
use fnv::{FnvHashMap, FnvHasher};
use num_bigint::{BigInt, Sign};
use num_traits::Zero;

use crate::ast::Block;
use crate::runtime::env::Env;
use crate::runtime::interpreter::RuntimeError;

/// A runtime value. Integers, arrays and hashes are shared with interior
/// mutability: two bindings to the same container observe each other's
/// mutations, and `++`/`--` write through whatever alias reached them.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(Rc<RefCell<BigInt>>),
    Float(BigDecimal),
    Str(Rc<StrValue>),
    Array(Rc<RefCell<Vec<Value>>>),
    Hash(Rc<RefCell<HashData>>),
    Function(Rc<FunctionValue>),
    Builtin(&'static BuiltinDef),
}

/// String contents plus a lazily computed FNV-1a hash. Strings are
/// immutable, so the hash is computed at most once per object.
pub struct StrValue {
    value: String,
    hash: Cell<Option<u64>>,
}

impl StrValue {
    pub fn new(value: impl Into<String>) -> StrValue {
        StrValue {
            value: value.into(),
            hash: Cell::new(None),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    fn fnv_hash(&self) -> u64 {
        if let Some(hash) = self.hash.get() {
            return hash;
        }
        let hash = fnv1a(self.value.as_bytes());
        self.hash.set(Some(hash));
        hash
    }
}

/// A user function: parameter names, body, and the environment captured
/// when the literal was evaluated (the closure).
pub struct FunctionValue {
    pub parameters: Rc<Vec<String>>,
    pub body: Rc<Block>,
    pub env: Env,
}

/// A host-provided callable. The table of these lives in
/// `runtime::builtin`; values refer into it by static reference, so builtin
/// identity is pointer identity.
pub struct BuiltinDef {
    pub name: &'static str,
    pub func: fn(Vec<Value>) -> Result<Value, RuntimeError>,
}

#[derive(Default)]
pub struct HashData {
    pub pairs: FnvHashMap<HashKey, HashPair>,
}

/// The original key value alongside the stored value, so iteration can
/// recover the key for display and export.
#[derive(Clone)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

/// Derived lookup key for hash containers: a type tag plus 64 bits taken
/// from the value. Only integers, booleans and strings are hashable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HashKey {
    tag: HashTag,
    raw: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum HashTag {
    Int,
    Bool,
    Str,
}

impl HashKey {
    /// Key for a string-valued property without building a `Value` first.
    pub fn of_str(value: &str) -> HashKey {
        HashKey {
            tag: HashTag::Str,
            raw: fnv1a(value.as_bytes()),
        }
    }
}

pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(bytes);
    hasher.finish()
}

// The low 64 bits of the integer, two's-complement style for negatives so
// that small negative keys stay distinct
fn low_bits(value: &BigInt) -> u64 {
    let digit = value.iter_u64_digits().next().unwrap_or(0);
    if value.sign() == Sign::Minus {
        digit.wrapping_neg()
    } else {
        digit
    }
}

impl Value {
    pub fn int(value: BigInt) -> Value {
        Value::Int(Rc::new(RefCell::new(value)))
    }

    pub fn str(value: impl Into<String>) -> Value {
        Value::Str(Rc::new(StrValue::new(value)))
    }

    pub fn array(elements: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn hash(data: HashData) -> Value {
        Value::Hash(Rc::new(RefCell::new(data)))
    }

    /// Upper-case type tag used in error messages and by `type`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::Str(_) => "STRING",
            Value::Array(_) => "ARRAY",
            Value::Hash(_) => "HASH",
            Value::Function(_) => "FUNCTION",
            Value::Builtin(_) => "BUILTIN",
        }
    }

    /// Null and false are falsy; every other value, including zero and
    /// empty collections, is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            _ => true,
        }
    }

    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Int(value) => Some(HashKey {
                tag: HashTag::Int,
                raw: low_bits(&value.borrow()),
            }),
            Value::Bool(value) => Some(HashKey {
                tag: HashTag::Bool,
                raw: u64::from(*value),
            }),
            Value::Str(value) => Some(HashKey {
                tag: HashTag::Str,
                raw: value.fnv_hash(),
            }),
            _ => None,
        }
    }

    /// Render the value for `puts` and the REPL.
    pub fn inspect(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(value) => value.to_string(),
            Value::Int(value) => value.borrow().to_string(),
            Value::Float(value) => value.to_string(),
            Value::Str(value) => value.as_str().to_string(),
            Value::Array(elements) => {
                let parts: Vec<String> =
                    elements.borrow().iter().map(|el| el.inspect()).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Hash(data) => {
                let parts: Vec<String> = data
                    .borrow()
                    .pairs
                    .values()
                    .map(|pair| format!("{}: {}", pair.key.inspect(), pair.value.inspect()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Function(func) => {
                format!("fn({}) {{\n{}\n}}", func.parameters.join(", "), func.body)
            }
            Value::Builtin(_) => "builtin function".to_string(),
        }
    }

    /// Structural equality: numeric across Int/Float, deep for arrays and
    /// hashes, reference identity for functions and builtins.
    pub fn is_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => *a.borrow() == *b.borrow(),
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) => BigDecimal::from(a.borrow().clone()) == *b,
            (Value::Float(a), Value::Int(b)) => *a == BigDecimal::from(b.borrow().clone()),
            (Value::Str(a), Value::Str(b)) => a.as_str() == b.as_str(),
            (Value::Array(a), Value::Array(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.is_equal(y))
            }
            (Value::Hash(a), Value::Hash(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.pairs.len() == b.pairs.len()
                    && a.pairs.iter().all(|(key, pair)| {
                        b.pairs
                            .get(key)
                            .is_some_and(|other| pair.value.is_equal(&other.value))
                    })
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
            _ => false,
        }
    }

    /// Reference identity, the fallback for `==` between kinds with no
    /// specific comparison rule.
    pub fn identity_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => Rc::ptr_eq(a, b),
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
            _ => false,
        }
    }

    pub fn is_zero_number(&self) -> bool {
        match self {
            Value::Int(value) => value.borrow().is_zero(),
            Value::Float(value) => value.is_zero(),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal(other)
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name(), self.inspect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn string_hash_keys_match_and_cache() {
        let a = Value::str("Hello World");
        let b = Value::str("Hello World");
        let c = Value::str("Hello Moon");
        assert_eq!(a.hash_key(), b.hash_key());
        assert_ne!(a.hash_key(), c.hash_key());
        // Second derivation comes from the cache and stays identical
        assert_eq!(a.hash_key(), a.hash_key());
        assert_eq!(a.hash_key().unwrap(), HashKey::of_str("Hello World"));
    }

    #[test]
    fn numeric_and_bool_keys_are_tagged() {
        let one = Value::int(BigInt::from(1));
        let yes = Value::Bool(true);
        // Same raw 64-bit payload, different tag
        assert_ne!(one.hash_key(), yes.hash_key());
        let minus = Value::int(BigInt::from(-1));
        assert_ne!(one.hash_key(), minus.hash_key());
    }

    #[test]
    fn floats_are_not_hashable() {
        use std::str::FromStr;
        let f = Value::Float(BigDecimal::from_str("1.5").unwrap());
        assert!(f.hash_key().is_none());
        assert!(Value::Null.hash_key().is_none());
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::int(BigInt::from(0)).is_truthy());
        assert!(Value::str("").is_truthy());
        assert!(Value::array(Vec::new()).is_truthy());
    }

    #[test]
    fn deep_equality() {
        let a = Value::array(vec![Value::int(BigInt::from(1)), Value::str("x")]);
        let b = Value::array(vec![Value::int(BigInt::from(1)), Value::str("x")]);
        assert!(a.is_equal(&b));
        assert!(!a.identity_eq(&b));
        assert!(a.identity_eq(&a.clone()));

        let int = Value::int(BigInt::from(3));
        use std::str::FromStr;
        let float = Value::Float(BigDecimal::from_str("3").unwrap());
        assert!(int.is_equal(&float));
        assert!(!int.is_equal(&Value::str("3")));
    }

    #[test]
    fn inspect_forms() {
        assert_eq!("null", Value::Null.inspect());
        assert_eq!("17", Value::int(BigInt::from(17)).inspect());
        assert_eq!("abc", Value::str("abc").inspect());
        assert_eq!(
            "[1, two]",
            Value::array(vec![Value::int(BigInt::from(1)), Value::str("two")]).inspect()
        );
    }
}
