//! Compile-once cache around a lambda query.
//!
//! The slot starts empty. The first invocation resolves a provider, compiles
//! and publishes the callable; every later invocation reuses it. Racing first
//! invocations each compile, but only the first published callable is kept
//! and every thread dispatches through that one.
use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use super::provider::{NativeQuery, QueryProvider};
use super::resolve::{resolve_provider, Resolution, ResolvedProvider};
use crate::ast::{Lambda, Value};
use crate::error::{QueryError, Result};

/// A published callable together with where it came from.
pub struct CompiledPlan {
    callable: NativeQuery,
    provider: String,
    resolution: Resolution,
}

impl CompiledPlan {
    pub fn callable(&self) -> &NativeQuery {
        &self.callable
    }

    pub fn provider_name(&self) -> &str {
        &self.provider
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
}

impl fmt::Debug for CompiledPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPlan")
            .field("callable", &self.callable)
            .field("provider", &self.provider)
            .field("resolution", &self.resolution)
            .finish()
    }
}

pub struct CompiledQuery {
    query: Arc<Lambda>,
    slot: OnceLock<Arc<CompiledPlan>>,
}

impl CompiledQuery {
    pub fn new(query: Lambda) -> Self {
        Self {
            query: Arc::new(query),
            slot: OnceLock::new(),
        }
    }

    pub fn query(&self) -> &Lambda {
        &self.query
    }

    pub fn arity(&self) -> usize {
        self.query.arity()
    }

    pub fn is_compiled(&self) -> bool {
        self.slot.get().is_some()
    }

    /// The published plan, if any.
    pub fn plan(&self) -> Option<Arc<CompiledPlan>> {
        self.slot.get().cloned()
    }

    /// Compile now. With `provider` the tree is not searched; without it the
    /// provider must be resolvable from the tree alone. Returns the existing
    /// plan when already compiled.
    pub fn compile(&self, provider: Option<Arc<dyn QueryProvider>>) -> Result<Arc<CompiledPlan>> {
        if let Some(plan) = self.slot.get() {
            return Ok(plan.clone());
        }
        let resolved = match provider {
            Some(provider) => ResolvedProvider {
                provider,
                resolution: Resolution::Explicit,
            },
            None => resolve_provider(&self.query, &[])?,
        };
        self.publish(resolved)
    }

    fn ensure_compiled(&self, args: &[Value]) -> Result<Arc<CompiledPlan>> {
        if let Some(plan) = self.slot.get() {
            return Ok(plan.clone());
        }
        let resolved = resolve_provider(&self.query, args)?;
        self.publish(resolved)
    }

    fn publish(&self, resolved: ResolvedProvider) -> Result<Arc<CompiledPlan>> {
        let callable = resolved
            .provider
            .execute(&self.query)
            .map_err(QueryError::BackendCompile)?;
        if let Some(n) = callable.arity() {
            if n != self.arity() {
                return Err(QueryError::BackendCompile(anyhow::anyhow!(
                    "provider {} returned a callable of arity {} for a query of arity {}",
                    resolved.provider.name(),
                    n,
                    self.arity()
                )));
            }
        }

        let plan = Arc::new(CompiledPlan {
            callable,
            provider: resolved.provider.name().to_string(),
            resolution: resolved.resolution,
        });
        match self.slot.set(plan.clone()) {
            Ok(()) => info!(
                provider = plan.provider_name(),
                resolution = %plan.resolution(),
                arity = self.arity(),
                "compiled query"
            ),
            Err(_) => debug!(
                provider = plan.provider_name(),
                "another caller published first, discarding this compilation"
            ),
        }
        Ok(self.slot.get().cloned().unwrap_or(plan))
    }

    fn check_arity(&self, actual: usize) -> Result<()> {
        let expected = self.arity();
        if expected != actual {
            return Err(QueryError::ArityMismatch { expected, actual });
        }
        Ok(())
    }

    /// Generic invocation.
    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        self.check_arity(args.len())?;
        let plan = self.ensure_compiled(args)?;
        plan.callable.call(args).map_err(unwrap_dispatch)
    }

    pub fn invoke0(&self) -> Result<Value> {
        self.check_arity(0)?;
        let plan = self.ensure_compiled(&[])?;
        match &plan.callable {
            NativeQuery::Nullary(f) => f(),
            other => other.call(&[]),
        }
        .map_err(unwrap_dispatch)
    }

    pub fn invoke1(&self, a: Value) -> Result<Value> {
        self.check_arity(1)?;
        let plan = match self.slot.get() {
            Some(plan) => plan.clone(),
            None => self.ensure_compiled(std::slice::from_ref(&a))?,
        };
        match &plan.callable {
            NativeQuery::Unary(f) => f(a),
            other => other.call(&[a]),
        }
        .map_err(unwrap_dispatch)
    }

    pub fn invoke2(&self, a: Value, b: Value) -> Result<Value> {
        self.check_arity(2)?;
        let plan = match self.slot.get() {
            Some(plan) => plan.clone(),
            None => self.ensure_compiled(&[a.clone(), b.clone()])?,
        };
        match &plan.callable {
            NativeQuery::Binary(f) => f(a, b),
            other => other.call(&[a, b]),
        }
        .map_err(unwrap_dispatch)
    }

    pub fn invoke3(&self, a: Value, b: Value, c: Value) -> Result<Value> {
        self.check_arity(3)?;
        let plan = match self.slot.get() {
            Some(plan) => plan.clone(),
            None => self.ensure_compiled(&[a.clone(), b.clone(), c.clone()])?,
        };
        match &plan.callable {
            NativeQuery::Ternary(f) => f(a, b, c),
            other => other.call(&[a, b, c]),
        }
        .map_err(unwrap_dispatch)
    }

    pub fn invoke4(&self, a: Value, b: Value, c: Value, d: Value) -> Result<Value> {
        self.check_arity(4)?;
        let plan = match self.slot.get() {
            Some(plan) => plan.clone(),
            None => self.ensure_compiled(&[a.clone(), b.clone(), c.clone(), d.clone()])?,
        };
        match &plan.callable {
            NativeQuery::Quaternary(f) => f(a, b, c, d),
            other => other.call(&[a, b, c, d]),
        }
        .map_err(unwrap_dispatch)
    }
}

impl fmt::Debug for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledQuery")
            .field("arity", &self.arity())
            .field("plan", &self.slot.get())
            .finish()
    }
}

/// Surface the callable's own error. A `QueryError` raised inside the
/// callable is returned as is rather than nested in `Dispatch`.
fn unwrap_dispatch(err: anyhow::Error) -> QueryError {
    match err.downcast::<QueryError>() {
        Ok(inner) => inner,
        Err(err) => QueryError::Dispatch(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, LogicalType, ParameterDecl, QuerySource};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    /// Echoes its arguments back as a list and counts compilations.
    struct Echo {
        compiles: AtomicUsize,
    }

    impl Echo {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                compiles: AtomicUsize::new(0),
            })
        }
    }

    impl QueryProvider for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn execute(&self, query: &Lambda) -> anyhow::Result<NativeQuery> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            Ok(NativeQuery::for_arity(
                query.arity(),
                Arc::new(|args: &[Value]| Ok(Value::List(args.to_vec()))),
            ))
        }
    }

    struct Broken;

    impl QueryProvider for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn execute(&self, _query: &Lambda) -> anyhow::Result<NativeQuery> {
            anyhow::bail!("cannot compile")
        }
    }

    struct Failing;

    impl QueryProvider for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn execute(&self, _query: &Lambda) -> anyhow::Result<NativeQuery> {
            Ok(NativeQuery::unary(|_| anyhow::bail!("statement timeout")))
        }
    }

    fn bound_query(provider: Arc<dyn QueryProvider>, params: Vec<ParameterDecl>) -> CompiledQuery {
        let body = Expr::source(QuerySource::bound("users", provider)).scan("u");
        CompiledQuery::new(Lambda::new(params, body))
    }

    fn int_params(n: usize) -> Vec<ParameterDecl> {
        (0..n)
            .map(|i| ParameterDecl::new(format!("p{}", i), LogicalType::Int64))
            .collect()
    }

    #[test]
    fn test_first_invoke_compiles_once() {
        let echo = Echo::new();
        let q = bound_query(echo.clone(), int_params(1));
        assert!(!q.is_compiled());
        assert_eq!(q.invoke1(Value::Int(1)).unwrap(), Value::List(vec![Value::Int(1)]));
        assert_eq!(q.invoke1(Value::Int(2)).unwrap(), Value::List(vec![Value::Int(2)]));
        assert!(q.is_compiled());
        assert_eq!(echo.compiles.load(Ordering::SeqCst), 1);
        assert_eq!(q.plan().unwrap().resolution(), Resolution::Literal);
    }

    #[test]
    fn test_plan_identity_is_stable() {
        let q = bound_query(Echo::new(), int_params(0));
        q.invoke0().unwrap();
        let first = q.plan().unwrap();
        q.invoke(&[]).unwrap();
        let second = q.plan().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_fast_paths_match_generic_invoke() {
        for n in 0..=4 {
            let q = bound_query(Echo::new(), int_params(n));
            let args: Vec<Value> = (0..n as i64).map(Value::Int).collect();
            let generic = q.invoke(&args).unwrap();
            let fast = match n {
                0 => q.invoke0(),
                1 => q.invoke1(args[0].clone()),
                2 => q.invoke2(args[0].clone(), args[1].clone()),
                3 => q.invoke3(args[0].clone(), args[1].clone(), args[2].clone()),
                _ => q.invoke4(
                    args[0].clone(),
                    args[1].clone(),
                    args[2].clone(),
                    args[3].clone(),
                ),
            }
            .unwrap();
            assert_eq!(generic, fast);
        }
    }

    #[test]
    fn test_variadic_fallback_above_four() {
        let q = bound_query(Echo::new(), int_params(6));
        let args: Vec<Value> = (0..6).map(Value::Int).collect();
        assert_eq!(q.invoke(&args).unwrap(), Value::List(args.clone()));
        assert_eq!(q.plan().unwrap().callable().arity(), None);
    }

    #[test]
    fn test_arity_mismatch_before_resolution() {
        let q = CompiledQuery::new(Lambda::new(
            int_params(2),
            Expr::source(QuerySource::new("users")).scan("u"),
        ));
        let err = q.invoke1(Value::Int(1)).unwrap_err();
        assert!(matches!(
            err,
            QueryError::ArityMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert!(!q.is_compiled());
    }

    #[test]
    fn test_unresolvable_provider() {
        let q = CompiledQuery::new(Lambda::new(
            int_params(1),
            Expr::source(QuerySource::new("users")).scan("u"),
        ));
        let err = q.invoke1(Value::Int(1)).unwrap_err();
        assert!(matches!(err, QueryError::ProviderResolution(_)));
        assert!(!q.is_compiled());
    }

    #[test]
    fn test_explicit_provider_skips_resolution() {
        let echo = Echo::new();
        let q = CompiledQuery::new(Lambda::new(
            int_params(1),
            Expr::source(QuerySource::new("users")).scan("u"),
        ));
        let plan = q.compile(Some(echo.clone())).unwrap();
        assert_eq!(plan.resolution(), Resolution::Explicit);
        assert_eq!(q.invoke1(Value::Int(3)).unwrap(), Value::List(vec![Value::Int(3)]));
        assert_eq!(echo.compiles.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backend_compile_error_leaves_slot_empty() {
        let q = bound_query(Arc::new(Broken), int_params(0));
        let err = q.invoke0().unwrap_err();
        assert!(matches!(err, QueryError::BackendCompile(_)));
        assert_eq!(err.to_string(), "cannot compile");
        assert!(!q.is_compiled());
    }

    #[test]
    fn test_dispatch_error_is_unwrapped() {
        let q = bound_query(Arc::new(Failing), int_params(1));
        let err = q.invoke1(Value::Int(1)).unwrap_err();
        assert!(matches!(err, QueryError::Dispatch(_)));
        assert_eq!(err.to_string(), "statement timeout");
    }

    #[test]
    fn test_concurrent_first_use_publishes_one_plan() {
        let echo = Echo::new();
        let q = bound_query(echo.clone(), int_params(1));
        let threads = 8;
        let barrier = Barrier::new(threads);
        let plans: Vec<Arc<CompiledPlan>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|i| {
                    let q = &q;
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        let out = q.invoke1(Value::Int(i as i64)).unwrap();
                        assert_eq!(out, Value::List(vec![Value::Int(i as i64)]));
                        q.plan().unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(plans.iter().all(|p| Arc::ptr_eq(p, &plans[0])));
        let compiles = echo.compiles.load(Ordering::SeqCst);
        assert!((1..=threads).contains(&compiles));
    }
}
