//! The backend side of compilation: providers turn a lambda into a callable.
use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use crate::ast::{Lambda, Value};

type Call0 = dyn Fn() -> Result<Value> + Send + Sync;
type Call1 = dyn Fn(Value) -> Result<Value> + Send + Sync;
type Call2 = dyn Fn(Value, Value) -> Result<Value> + Send + Sync;
type Call3 = dyn Fn(Value, Value, Value) -> Result<Value> + Send + Sync;
type Call4 = dyn Fn(Value, Value, Value, Value) -> Result<Value> + Send + Sync;
type CallN = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// A compiled query, tagged by the number of arguments it takes. Fixed-arity
/// variants are called without building an argument slice; `Variadic` is
/// the generic fallback.
#[derive(Clone)]
pub enum NativeQuery {
    Nullary(Arc<Call0>),
    Unary(Arc<Call1>),
    Binary(Arc<Call2>),
    Ternary(Arc<Call3>),
    Quaternary(Arc<Call4>),
    Variadic(Arc<CallN>),
}

impl NativeQuery {
    pub fn nullary(f: impl Fn() -> Result<Value> + Send + Sync + 'static) -> Self {
        NativeQuery::Nullary(Arc::new(f))
    }

    pub fn unary(f: impl Fn(Value) -> Result<Value> + Send + Sync + 'static) -> Self {
        NativeQuery::Unary(Arc::new(f))
    }

    pub fn binary(f: impl Fn(Value, Value) -> Result<Value> + Send + Sync + 'static) -> Self {
        NativeQuery::Binary(Arc::new(f))
    }

    pub fn ternary(f: impl Fn(Value, Value, Value) -> Result<Value> + Send + Sync + 'static) -> Self {
        NativeQuery::Ternary(Arc::new(f))
    }

    pub fn quaternary(
        f: impl Fn(Value, Value, Value, Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        NativeQuery::Quaternary(Arc::new(f))
    }

    pub fn variadic(f: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static) -> Self {
        NativeQuery::Variadic(Arc::new(f))
    }

    /// Wrap a slice-taking function in the fixed-arity adapter for `arity`,
    /// falling back to `Variadic` above four arguments.
    pub fn for_arity(arity: usize, f: Arc<CallN>) -> Self {
        match arity {
            0 => NativeQuery::nullary(move || f(&[])),
            1 => NativeQuery::unary(move |a| f(&[a])),
            2 => NativeQuery::binary(move |a, b| f(&[a, b])),
            3 => NativeQuery::ternary(move |a, b, c| f(&[a, b, c])),
            4 => NativeQuery::quaternary(move |a, b, c, d| f(&[a, b, c, d])),
            _ => NativeQuery::Variadic(f),
        }
    }

    /// Fixed arity, or `None` for the variadic fallback.
    pub fn arity(&self) -> Option<usize> {
        match self {
            NativeQuery::Nullary(_) => Some(0),
            NativeQuery::Unary(_) => Some(1),
            NativeQuery::Binary(_) => Some(2),
            NativeQuery::Ternary(_) => Some(3),
            NativeQuery::Quaternary(_) => Some(4),
            NativeQuery::Variadic(_) => None,
        }
    }

    /// Generic invocation from a slice.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        match (self, args) {
            (NativeQuery::Nullary(f), []) => f(),
            (NativeQuery::Unary(f), [a]) => f(a.clone()),
            (NativeQuery::Binary(f), [a, b]) => f(a.clone(), b.clone()),
            (NativeQuery::Ternary(f), [a, b, c]) => f(a.clone(), b.clone(), c.clone()),
            (NativeQuery::Quaternary(f), [a, b, c, d]) => {
                f(a.clone(), b.clone(), c.clone(), d.clone())
            }
            (NativeQuery::Variadic(f), args) => f(args),
            (callable, args) => anyhow::bail!(
                "callable takes {} argument(s), got {}",
                callable.arity().unwrap_or_default(),
                args.len()
            ),
        }
    }
}

impl fmt::Debug for NativeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arity() {
            Some(n) => write!(f, "NativeQuery(arity {})", n),
            None => write!(f, "NativeQuery(variadic)"),
        }
    }
}

/// An execution backend. Providers are discovered from the query tree (or
/// supplied explicitly) and asked to compile a lambda once; the result is
/// cached by [`super::CompiledQuery`].
pub trait QueryProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Compile `query` into a callable taking the lambda's parameters in order.
    fn execute(&self, query: &Lambda) -> Result<NativeQuery>;
}
