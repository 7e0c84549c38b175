//! Dead-column elimination.
//!
//! Walks the tree top-down carrying the set of `alias.column` pairs that
//! enclosing nodes refer to, and drops projected columns nobody reads. The
//! outermost projection, DISTINCT projections and set-operation branches
//! define the shape of their output and are left alone.
use std::collections::BTreeSet;

use super::optimizer::RewritePass;
use super::types::*;
use crate::error::Result;

pub type ColumnSet = BTreeSet<(String, String)>;

pub struct DeadColumnElimination;

impl RewritePass for DeadColumnElimination {
    fn name(&self) -> &str {
        "dead_column_elimination"
    }

    fn description(&self) -> &str {
        "Removes projected columns no enclosing node refers to"
    }

    fn transform(&self, expr: Expr) -> Result<Expr> {
        Ok(prune(expr, ColumnSet::new(), true))
    }
}

/// Every `alias.column` pair referenced by scalar expressions in `expr`,
/// without descending into relational children.
pub fn referenced_columns(expr: &Expr) -> ColumnSet {
    let mut out = ColumnSet::new();
    collect_columns(expr, &mut out);
    out
}

fn collect_columns(expr: &Expr, out: &mut ColumnSet) {
    if let Expr::Column { alias, name, .. } = expr {
        out.insert((alias.clone(), name.clone()));
        return;
    }
    if expr.is_relational() {
        return;
    }
    for child in expr.children() {
        collect_columns(child, out);
    }
}

fn extend_with<'a>(mut needed: ColumnSet, exprs: impl IntoIterator<Item = &'a Expr>) -> ColumnSet {
    for e in exprs {
        collect_columns(e, &mut needed);
    }
    needed
}

/// `protect` marks a projection whose columns form an output the caller
/// observes positionally.
fn prune(expr: Expr, needed: ColumnSet, protect: bool) -> Expr {
    match expr {
        Expr::Projection(p) => {
            let mut p = *p;
            if !protect && !p.distinct {
                let alias = p.alias.clone();
                let first = p.columns.first().cloned();
                p.columns
                    .retain(|c| needed.contains(&(alias.clone(), c.name.clone())));
                if p.columns.is_empty() {
                    p.columns.extend(first);
                }
            }
            let inner = extend_with(
                ColumnSet::new(),
                p.columns.iter().map(|c| &c.expr).chain(p.group_by.iter()),
            );
            p.input = prune(p.input, inner, false);
            Expr::Projection(Box::new(p))
        }
        Expr::Filter { input, predicate } => {
            let needed = extend_with(needed, [predicate.as_ref()]);
            Expr::Filter {
                input: Box::new(prune(*input, needed, protect)),
                predicate,
            }
        }
        Expr::Ordering { input, keys } => {
            let needed = extend_with(needed, keys.iter().map(|k| &k.expr));
            Expr::Ordering {
                input: Box::new(prune(*input, needed, protect)),
                keys,
            }
        }
        Expr::Limit { input, take, skip } => {
            let needed = extend_with(
                needed,
                take.iter().chain(skip.iter()).map(|e| e.as_ref()),
            );
            Expr::Limit {
                input: Box::new(prune(*input, needed, protect)),
                take,
                skip,
            }
        }
        Expr::Join(j) => {
            let j = *j;
            let needed = extend_with(needed, j.on.iter());
            Expr::Join(Box::new(Join {
                kind: j.kind,
                left: prune(j.left, needed.clone(), protect),
                right: prune(j.right, needed, protect),
                on: j.on,
            }))
        }
        Expr::SetOp(s) => {
            let s = *s;
            Expr::SetOp(Box::new(SetOperation {
                op: s.op,
                all: s.all,
                left: prune(s.left, ColumnSet::new(), true),
                right: prune(s.right, ColumnSet::new(), true),
                alias: s.alias,
            }))
        }
        other => other,
    }
}
