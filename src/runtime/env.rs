use std::cell::RefCell;
use std::rc::Rc;

use fnv::FnvHashMap;

use crate::runtime::interpreter::RuntimeError;
use crate::runtime::value::Value;

#[derive(Clone)]
pub struct Binding {
    pub value: Value,
    pub read_only: bool,
}

#[derive(Default)]
struct Frame {
    store: FnvHashMap<String, Binding>,
    outer: Option<Env>,
}

/// A lexically nested environment: one shared frame plus a link to the
/// enclosing one. Frames are reference counted because closures keep their
/// defining environment alive and write through it.
#[derive(Clone)]
pub struct Env(Rc<RefCell<Frame>>);

impl Env {
    pub fn new() -> Env {
        Env(Rc::new(RefCell::new(Frame::default())))
    }

    pub fn enclosed(outer: &Env) -> Env {
        Env(Rc::new(RefCell::new(Frame {
            store: FnvHashMap::default(),
            outer: Some(outer.clone()),
        })))
    }

    /// Look a name up through the chain.
    pub fn get(&self, name: &str) -> Option<Binding> {
        let mut env = self.clone();
        loop {
            let next = {
                let frame = env.0.borrow();
                if let Some(binding) = frame.store.get(name) {
                    return Some(binding.clone());
                }
                frame.outer.clone()
            };
            env = next?;
        }
    }

    /// Declare a mutable binding in the innermost frame.
    pub fn declare_var(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        if !is_valid_name(name) {
            return Err(RuntimeError::InvalidName(name.to_string()));
        }
        let mut frame = self.0.borrow_mut();
        if frame.store.contains_key(name) {
            return Err(RuntimeError::RedeclareVariable(name.to_string()));
        }
        frame.store.insert(
            name.to_string(),
            Binding {
                value,
                read_only: false,
            },
        );
        Ok(())
    }

    /// Declare a constant in the innermost frame.
    pub fn declare_const(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        if !is_valid_name(name) {
            return Err(RuntimeError::InvalidName(name.to_string()));
        }
        let mut frame = self.0.borrow_mut();
        if frame.store.contains_key(name) {
            return Err(RuntimeError::RedeclareConstant(name.to_string()));
        }
        frame.store.insert(
            name.to_string(),
            Binding {
                value,
                read_only: true,
            },
        );
        Ok(())
    }

    /// Write to an existing binding, walking outward to the frame that owns
    /// it. Fails on constants and on names that are bound nowhere.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let mut env = self.clone();
        loop {
            let next = {
                let mut frame = env.0.borrow_mut();
                if let Some(binding) = frame.store.get_mut(name) {
                    if binding.read_only {
                        return Err(RuntimeError::AssignToConstant(name.to_string()));
                    }
                    binding.value = value;
                    return Ok(());
                }
                frame.outer.clone()
            };
            match next {
                Some(outer) => env = outer,
                None => return Err(RuntimeError::IdentifierNotFound(name.to_string())),
            }
        }
    }

    /// Insert into the innermost frame without the declaration checks.
    /// Used for parameter binding, where positional rebinding must win.
    pub fn bind(&self, name: &str, value: Value) {
        self.0.borrow_mut().store.insert(
            name.to_string(),
            Binding {
                value,
                read_only: false,
            },
        );
    }

    /// Like `bind`, but read-only. Used for the stock library namespaces.
    pub fn bind_const(&self, name: &str, value: Value) {
        self.0.borrow_mut().store.insert(
            name.to_string(),
            Binding {
                value,
                read_only: true,
            },
        );
    }

    /// Snapshot of the innermost frame, for module export.
    pub fn exports(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .store
            .iter()
            .map(|(name, binding)| (name.clone(), binding.value.clone()))
            .collect()
    }
}

impl Default for Env {
    fn default() -> Env {
        Env::new()
    }
}

fn is_valid_name(name: &str) -> bool {
    match name.as_bytes().first() {
        None => false,
        Some(first) => !first.is_ascii_digit(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use num_bigint::BigInt;

    fn int(v: i64) -> Value {
        Value::int(BigInt::from(v))
    }

    #[test]
    fn declare_and_get() {
        let env = Env::new();
        env.declare_var("x", int(1)).unwrap();
        assert_eq!(int(1), env.get("x").unwrap().value);
        assert!(env.get("y").is_none());
    }

    #[test]
    fn redeclaration_fails() {
        let env = Env::new();
        env.declare_var("x", int(1)).unwrap();
        assert!(matches!(
            env.declare_var("x", int(2)),
            Err(RuntimeError::RedeclareVariable(_))
        ));
        env.declare_const("k", int(1)).unwrap();
        assert!(matches!(
            env.declare_const("k", int(2)),
            Err(RuntimeError::RedeclareConstant(_))
        ));
    }

    #[test]
    fn invalid_names_rejected() {
        let env = Env::new();
        assert!(matches!(
            env.declare_var("", int(1)),
            Err(RuntimeError::InvalidName(_))
        ));
        assert!(matches!(
            env.declare_var("1abc", int(1)),
            Err(RuntimeError::InvalidName(_))
        ));
    }

    #[test]
    fn assignment_walks_the_chain() {
        let outer = Env::new();
        outer.declare_var("x", int(1)).unwrap();
        let inner = Env::enclosed(&outer);
        inner.assign("x", int(5)).unwrap();
        assert_eq!(int(5), outer.get("x").unwrap().value);
        assert!(matches!(
            inner.assign("missing", int(0)),
            Err(RuntimeError::IdentifierNotFound(_))
        ));
    }

    #[test]
    fn constants_reject_assignment() {
        let env = Env::new();
        env.declare_const("k", int(1)).unwrap();
        let err = env.assign("k", int(2)).unwrap_err();
        assert_eq!("cannot assign to constant 'k'", err.to_string());
    }

    #[test]
    fn shadowing_declares_locally() {
        let outer = Env::new();
        outer.declare_var("x", int(1)).unwrap();
        let inner = Env::enclosed(&outer);
        inner.declare_var("x", int(2)).unwrap();
        assert_eq!(int(2), inner.get("x").unwrap().value);
        assert_eq!(int(1), outer.get("x").unwrap().value);
    }

    #[test]
    fn exports_snapshot_innermost_frame() {
        let outer = Env::new();
        outer.declare_var("hidden", int(1)).unwrap();
        let module = Env::enclosed(&outer);
        module.declare_var("a", int(1)).unwrap();
        module.declare_const("b", int(2)).unwrap();
        let mut names: Vec<String> = module.exports().into_iter().map(|(n, _)| n).collect();
        names.sort();
        assert_eq!(vec!["a".to_string(), "b".to_string()], names);
    }
}
