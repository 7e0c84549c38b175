//! Rewrite pass infrastructure.
//!
//! Provides a pass-based system for transforming query trees before they are
//! formatted. Each pass consumes a tree and returns a new one with the same
//! meaning. The translator composes passes in a fixed order; plug-ins may
//! contribute extra lowering passes.
use std::sync::Arc;

use tracing::trace;

use super::evaluator::fold_closed_subtrees;
use super::types::*;
use super::value::Value;
use crate::error::{QueryError, Result};

/// A single rewrite pass over a query tree.
///
/// Passes should be pure functions: given the same input, they produce
/// the same output. This makes them composable and testable.
///
/// # Example
///
/// ```ignore
/// struct DropTrueFilters;
///
/// impl RewritePass for DropTrueFilters {
///     fn name(&self) -> &str { "drop_true_filters" }
///     fn transform(&self, expr: Expr) -> Result<Expr> {
///         // Filter(x, TRUE) → x
///     }
/// }
/// ```
pub trait RewritePass: Send + Sync {
    /// Unique name identifying this pass.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Transform a tree, returning it unchanged if nothing applies.
    fn transform(&self, expr: Expr) -> Result<Expr>;
}

/// An ordered pipeline of rewrite passes.
#[derive(Default, Clone)]
pub struct Optimizer {
    passes: Vec<Arc<dyn RewritePass>>,
}

impl Optimizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pass to the end of the pipeline.
    pub fn add_pass(&mut self, pass: Arc<dyn RewritePass>) {
        self.passes.push(pass);
    }

    /// Run every pass in order.
    pub fn optimize(&self, expr: Expr) -> Result<Expr> {
        let mut current = expr;
        for pass in &self.passes {
            trace!("running rewrite pass {}", pass.name());
            current = pass.transform(current)?;
        }
        Ok(current)
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }
}

/// Backend-independent simplifications shared by every dialect.
///
/// * folds closed subtrees into constants
/// * merges `Filter(Filter(x, a), b)` into `Filter(x, a AND b)`
/// * drops filters whose predicate is the literal `TRUE`
/// * puts the literal on the right of a comparison
/// * `NOT NOT x` → `x`, `x = NULL` → `x IS NULL`
pub struct GenericLowering;

impl RewritePass for GenericLowering {
    fn name(&self) -> &str {
        "generic_lowering"
    }

    fn description(&self) -> &str {
        "Folds constants and canonicalizes equivalent node shapes"
    }

    fn transform(&self, expr: Expr) -> Result<Expr> {
        reject_nested_lambdas(&expr)?;
        let folded = fold_closed_subtrees(expr);
        Ok(folded.transform_up(&mut lower_node))
    }
}

fn reject_nested_lambdas(expr: &Expr) -> Result<()> {
    if expr.any(&|e| matches!(e, Expr::Lambda(_))) {
        return Err(QueryError::unsupported(
            NodeKind::Lambda,
            "lambda nested inside a query body",
        ));
    }
    Ok(())
}

fn is_true(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Constant {
            value: Value::Bool(true),
            ..
        }
    )
}

fn is_null_literal(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Constant {
            value: Value::Null,
            ..
        }
    )
}

fn lower_node(expr: Expr) -> Expr {
    match expr {
        Expr::Filter { input, predicate } => {
            if is_true(&predicate) {
                return *input;
            }
            match *input {
                Expr::Filter {
                    input: inner,
                    predicate: first,
                } => Expr::Filter {
                    input: inner,
                    predicate: Box::new(Expr::binary(BinaryOperator::And, *first, *predicate)),
                },
                other => Expr::Filter {
                    input: Box::new(other),
                    predicate,
                },
            }
        }
        Expr::Ordering { input, keys } if keys.is_empty() => *input,
        Expr::Binary {
            op: BinaryOperator::And,
            left,
            right,
            ty,
        } => {
            if is_true(&left) {
                *right
            } else if is_true(&right) {
                *left
            } else {
                Expr::Binary {
                    op: BinaryOperator::And,
                    left,
                    right,
                    ty,
                }
            }
        }
        Expr::Binary { op, left, right, ty } if op.is_comparison() => {
            let (op, left, right) = match op.flipped() {
                Some(flipped) if left.is_constant() && !right.is_constant() => (flipped, right, left),
                _ => (op, left, right),
            };
            match op {
                BinaryOperator::Eq if is_null_literal(&right) => {
                    Expr::unary(UnaryOperator::IsNull, *left)
                }
                BinaryOperator::NotEq if is_null_literal(&right) => {
                    Expr::unary(UnaryOperator::IsNotNull, *left)
                }
                _ => Expr::Binary { op, left, right, ty },
            }
        }
        Expr::Unary {
            op: UnaryOperator::Not,
            operand,
            ty,
        } => match *operand {
            Expr::Unary {
                op: UnaryOperator::Not,
                operand: inner,
                ..
            } => *inner,
            other => Expr::Unary {
                op: UnaryOperator::Not,
                operand: Box::new(other),
                ty,
            },
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::value::QuerySource;

    fn users() -> Expr {
        Expr::source(QuerySource::new("users")).scan("u")
    }

    fn age() -> Expr {
        Expr::column("u", "age", LogicalType::Int32)
    }

    struct Rename;

    impl RewritePass for Rename {
        fn name(&self) -> &str {
            "rename"
        }

        fn transform(&self, expr: Expr) -> Result<Expr> {
            Ok(expr.transform_up(&mut |e| match e {
                Expr::Scan { source, ty, .. } => Expr::Scan {
                    source,
                    alias: "renamed".into(),
                    ty,
                },
                other => other,
            }))
        }
    }

    #[test]
    fn test_optimizer_empty() {
        let opt = Optimizer::new();
        let result = opt.optimize(users()).unwrap();
        assert_eq!(result, users());
        assert!(opt.pass_names().is_empty());
    }

    #[test]
    fn test_optimizer_runs_passes_in_order() {
        let mut opt = Optimizer::new();
        opt.add_pass(Arc::new(GenericLowering));
        opt.add_pass(Arc::new(Rename));
        assert_eq!(opt.pass_names(), vec!["generic_lowering", "rename"]);
        let result = opt.optimize(users().filter(Expr::boolean(true))).unwrap();
        assert!(matches!(result, Expr::Scan { ref alias, .. } if alias == "renamed"));
    }

    #[test]
    fn test_folds_constant_predicate() {
        let q = users().filter(age().gt(Expr::binary(BinaryOperator::Plus, Expr::int(10), Expr::int(8))));
        let lowered = GenericLowering.transform(q).unwrap();
        assert_eq!(lowered, users().filter(age().gt(Expr::int(18))));
    }

    #[test]
    fn test_merges_adjacent_filters() {
        let q = users().filter(age().gt(Expr::int(18))).filter(age().lt(Expr::int(65)));
        let lowered = GenericLowering.transform(q).unwrap();
        let expected = users().filter(age().gt(Expr::int(18)).and(age().lt(Expr::int(65))));
        assert_eq!(lowered, expected);
    }

    #[test]
    fn test_removes_always_true_filter() {
        let q = users().filter(Expr::int(1).eq(Expr::int(1)));
        assert_eq!(GenericLowering.transform(q).unwrap(), users());
    }

    #[test]
    fn test_flips_literal_on_left() {
        let q = users().filter(Expr::int(18).lt(age()));
        let lowered = GenericLowering.transform(q).unwrap();
        assert_eq!(lowered, users().filter(age().gt(Expr::int(18))));
    }

    #[test]
    fn test_double_negation() {
        let q = users().filter(age().gt(Expr::int(1)).not().not());
        let lowered = GenericLowering.transform(q).unwrap();
        assert_eq!(lowered, users().filter(age().gt(Expr::int(1))));
    }

    #[test]
    fn test_eq_null_becomes_is_null() {
        let q = users().filter(Expr::null(LogicalType::Int32).eq(age()));
        let lowered = GenericLowering.transform(q).unwrap();
        assert_eq!(
            lowered,
            users().filter(Expr::unary(UnaryOperator::IsNull, age()))
        );
    }

    #[test]
    fn test_and_true_is_dropped() {
        let q = users().filter(age().gt(Expr::int(1)).and(Expr::boolean(true)));
        let lowered = GenericLowering.transform(q).unwrap();
        assert_eq!(lowered, users().filter(age().gt(Expr::int(1))));
    }

    #[test]
    fn test_empty_ordering_removed() {
        let q = users().order_by(vec![]);
        assert_eq!(GenericLowering.transform(q).unwrap(), users());
    }

    #[test]
    fn test_server_functions_are_not_folded() {
        let q = users().filter(age().eq(Expr::function("LASTVAL", vec![], LogicalType::Int64)));
        let lowered = GenericLowering.transform(q.clone()).unwrap();
        assert_eq!(lowered, q);
    }

    #[test]
    fn test_nested_lambda_is_unsupported() {
        let q = users().filter(Expr::Lambda(Lambda::new(vec![], Expr::boolean(true))));
        let err = GenericLowering.transform(q).unwrap_err();
        assert!(matches!(
            err,
            QueryError::UnsupportedConstruct {
                kind: NodeKind::Lambda,
                ..
            }
        ));
    }
}
