//! Ordering normalization.
//!
//! Orderings written deep inside a query are lifted to the outermost block
//! where SQL can express them. Outer keys win; lifted inner keys become
//! tie-breakers. Keys that would be lost when crossing a nested projection are
//! exposed as extra columns of that projection.
use super::optimizer::RewritePass;
use super::types::*;
use crate::error::{QueryError, Result};

/// How the enclosing node consumes the orderings of its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// The caller sits above this subtree and orders by keys it can see.
    Expose,
    /// The subtree is the top-level block; projections keep orderings below them.
    Place,
    /// Orderings are meaningless here (set-operation branches).
    Discard,
}

/// Lifts orderings out of subqueries. DISTINCT projections ordered by an
/// unprojected key are rewritten according to the dialect: with aggregate
/// DISTINCT support the projection becomes a grouping and the key is
/// projected as `MIN(key)`; without it the key joins the DISTINCT list.
pub struct OrderingNormalizer {
    allow_distinct_in_aggregates: bool,
}

impl OrderingNormalizer {
    pub fn new(allow_distinct_in_aggregates: bool) -> Self {
        Self {
            allow_distinct_in_aggregates,
        }
    }

    fn lift(&self, expr: Expr, mode: Mode) -> Result<(Expr, Vec<OrderKey>)> {
        match expr {
            Expr::Scan { .. } => Ok((expr, vec![])),
            Expr::Filter { input, predicate } => {
                let (input, keys) = self.lift(*input, mode)?;
                Ok((
                    Expr::Filter {
                        input: Box::new(input),
                        predicate,
                    },
                    keys,
                ))
            }
            Expr::Ordering { input, keys: outer } => {
                let (input, inner) = self.lift(*input, mode)?;
                Ok((input, merge_keys(outer, inner)))
            }
            Expr::Limit { input, take, skip } => {
                let (input, keys) = self.lift(*input, mode)?;
                let input = if keys.is_empty() {
                    input
                } else {
                    input.order_by(keys.clone())
                };
                let node = Expr::Limit {
                    input: Box::new(input),
                    take,
                    skip,
                };
                // The keys stay inside the limit and still order the rows above it.
                Ok((node, keys))
            }
            Expr::Projection(p) => self.lift_projection(*p, mode),
            Expr::Join(j) => {
                let j = *j;
                let (left, mut keys) = self.lift(j.left, Mode::Expose)?;
                let (right, right_keys) = self.lift(j.right, Mode::Expose)?;
                keys = merge_keys(keys, right_keys);
                Ok((
                    Expr::Join(Box::new(Join {
                        kind: j.kind,
                        left,
                        right,
                        on: j.on,
                    })),
                    keys,
                ))
            }
            Expr::SetOp(s) => {
                let s = *s;
                let (left, _) = self.lift(s.left, Mode::Discard)?;
                let (right, _) = self.lift(s.right, Mode::Discard)?;
                Ok((
                    Expr::SetOp(Box::new(SetOperation {
                        op: s.op,
                        all: s.all,
                        left,
                        right,
                        alias: s.alias,
                    })),
                    vec![],
                ))
            }
            other => Err(QueryError::unsupported(
                other.kind(),
                "expected a relational node where rows are produced",
            )),
        }
    }

    fn lift_projection(&self, mut p: Projection, mode: Mode) -> Result<(Expr, Vec<OrderKey>)> {
        let (input, keys) = self.lift(p.input, Mode::Expose)?;
        p.input = input;

        let has_aggregates = p
            .columns
            .iter()
            .any(|c| c.expr.any(&|e| matches!(e, Expr::Aggregate { .. })));
        if keys.is_empty() || mode == Mode::Discard || !p.group_by.is_empty() || has_aggregates {
            return Ok((Expr::Projection(Box::new(p)), vec![]));
        }

        if p.distinct {
            let mapped = self.expose_distinct_keys(&mut p, keys);
            return Ok((Expr::Projection(Box::new(p)), mapped));
        }

        if mode == Mode::Place {
            if !is_limited_ordering(&p.input, &keys) {
                p.input = p.input.order_by(keys);
            }
            return Ok((Expr::Projection(Box::new(p)), vec![]));
        }

        let mapped = keys
            .into_iter()
            .map(|key| {
                let name = match p.columns.iter().find(|c| c.expr == key.expr) {
                    Some(existing) => existing.name.clone(),
                    None => {
                        let name = fresh_column_name(&p, &key.expr);
                        p.columns.push(ColumnDecl::new(name.clone(), key.expr.clone()));
                        name
                    }
                };
                OrderKey {
                    expr: Expr::column(p.alias.clone(), name, key.expr.ty()),
                    direction: key.direction,
                }
            })
            .collect();
        Ok((Expr::Projection(Box::new(p)), mapped))
    }

    fn expose_distinct_keys(&self, p: &mut Projection, keys: Vec<OrderKey>) -> Vec<OrderKey> {
        let unmatched = keys
            .iter()
            .any(|k| !p.columns.iter().any(|c| c.expr == k.expr));
        if unmatched && self.allow_distinct_in_aggregates {
            p.distinct = false;
            p.group_by = p.columns.iter().map(|c| c.expr.clone()).collect();
        }

        keys.into_iter()
            .map(|key| {
                let existing = p
                    .columns
                    .iter()
                    .find(|c| c.expr == key.expr || c.expr == min_of(&key.expr))
                    .map(|c| c.name.clone());
                let name = match existing {
                    Some(name) => name,
                    None => {
                        let name = fresh_column_name(p, &key.expr);
                        let expr = if p.group_by.is_empty() {
                            key.expr.clone()
                        } else {
                            min_of(&key.expr)
                        };
                        p.columns.push(ColumnDecl::new(name.clone(), expr));
                        name
                    }
                };
                OrderKey {
                    expr: Expr::column(p.alias.clone(), name, key.expr.ty()),
                    direction: key.direction,
                }
            })
            .collect()
    }
}

impl RewritePass for OrderingNormalizer {
    fn name(&self) -> &str {
        "ordering_normalization"
    }

    fn description(&self) -> &str {
        "Lifts ORDER BY clauses out of subqueries to the outermost block"
    }

    fn transform(&self, expr: Expr) -> Result<Expr> {
        let (expr, keys) = self.lift(expr, Mode::Place)?;
        if keys.is_empty() || is_limited_ordering(&expr, &keys) {
            return Ok(expr);
        }
        Ok(expr.order_by(keys))
    }
}

/// Outer keys first, then inner keys not already present (compared by expression).
fn merge_keys(outer: Vec<OrderKey>, inner: Vec<OrderKey>) -> Vec<OrderKey> {
    let mut merged: Vec<OrderKey> = Vec::with_capacity(outer.len() + inner.len());
    for key in outer.into_iter().chain(inner) {
        if !merged.iter().any(|k| k.expr == key.expr) {
            merged.push(key);
        }
    }
    merged
}

/// `Limit(Ordering(_, keys))` already orders by exactly these keys.
fn is_limited_ordering(expr: &Expr, keys: &[OrderKey]) -> bool {
    match expr {
        Expr::Limit { input, .. } => {
            matches!(input.as_ref(), Expr::Ordering { keys: existing, .. } if existing.as_slice() == keys)
        }
        _ => false,
    }
}

fn min_of(expr: &Expr) -> Expr {
    Expr::aggregate(AggregateFunction::Min, Some(expr.clone()), false)
}

fn fresh_column_name(p: &Projection, key: &Expr) -> String {
    let base = match key {
        Expr::Column { name, .. } => name.clone(),
        _ => "c".to_string(),
    };
    let taken = |name: &str| p.columns.iter().any(|c| c.name == name);
    if !taken(&base) {
        return base;
    }
    (1..)
        .map(|n| format!("{}{}", base, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}
