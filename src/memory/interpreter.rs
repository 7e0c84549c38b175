//! Direct interpretation of relational trees over in-memory tables.
//!
//! Every relation carries `(alias, column)` pairs so column references
//! resolve the same way they do in the rendered SQL.
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;

use anyhow::{anyhow, bail, Result};

use crate::ast::evaluator::{evaluate, evaluate_with, Env};
use crate::ast::types::{
    AggregateFunction, Expr, JoinKind, OrderDirection, OrderKey, Projection, SetOperation,
    SetOperator,
};
use crate::ast::{RowSet, Value};

/// Rows with qualified column names.
#[derive(Debug, Clone, Default)]
struct Relation {
    columns: Vec<(String, String)>,
    rows: Vec<Vec<Value>>,
}

impl Relation {
    fn into_row_set(self) -> RowSet {
        RowSet::new(
            self.columns.into_iter().map(|(_, name)| name).collect(),
            self.rows,
        )
    }
}

struct RowEnv<'a> {
    columns: &'a [(String, String)],
    row: Option<&'a [Value]>,
}

impl Env for RowEnv<'_> {
    fn parameter(&self, _name: &str) -> Option<Value> {
        None
    }

    fn column(&self, alias: &str, name: &str) -> Option<Value> {
        let idx = self
            .columns
            .iter()
            .position(|(a, n)| a == alias && n == name)?;
        // An empty group still resolves its columns, as NULL.
        Some(self.row.map_or(Value::Null, |row| row[idx].clone()))
    }
}

/// Run a substituted, folded query body. Relational bodies produce
/// `Value::Rows`; scalar bodies are evaluated directly.
pub fn run(body: &Expr, tables: &HashMap<String, RowSet>) -> Result<Value> {
    if !body.is_relational() {
        return Ok(evaluate(body)?);
    }
    let relation = eval_relation(body, tables)?;
    Ok(Value::Rows(relation.into_row_set()))
}

fn eval_relation(expr: &Expr, tables: &HashMap<String, RowSet>) -> Result<Relation> {
    match expr {
        Expr::Scan { source, alias, .. } => {
            let table = match source.as_ref() {
                Expr::Constant {
                    value: Value::Source(source),
                    ..
                } => &source.table,
                other => bail!("scan source {} was not reduced to a table", other.kind()),
            };
            let rows = tables
                .get(table)
                .ok_or_else(|| anyhow!("unknown table '{}'", table))?;
            Ok(Relation {
                columns: rows
                    .columns
                    .iter()
                    .map(|c| (alias.clone(), c.clone()))
                    .collect(),
                rows: rows.rows.clone(),
            })
        }
        Expr::Filter { input, predicate } => {
            let mut relation = eval_relation(input, tables)?;
            let mut kept = Vec::with_capacity(relation.rows.len());
            for row in relation.rows {
                let env = RowEnv {
                    columns: &relation.columns,
                    row: Some(row.as_slice()),
                };
                if evaluate_with(predicate, &env)? == Value::Bool(true) {
                    kept.push(row);
                }
            }
            relation.rows = kept;
            Ok(relation)
        }
        Expr::Projection(p) => project(p, tables),
        Expr::Ordering { input, keys } => {
            let relation = eval_relation(input, tables)?;
            sort(relation, keys)
        }
        Expr::Limit { input, take, skip } => {
            let mut relation = eval_relation(input, tables)?;
            let skip = count_operand(skip.as_deref())?.unwrap_or(0);
            let take = count_operand(take.as_deref())?;
            relation.rows = relation
                .rows
                .into_iter()
                .skip(skip)
                .take(take.unwrap_or(usize::MAX))
                .collect();
            Ok(relation)
        }
        Expr::Join(j) => {
            let left = eval_relation(&j.left, tables)?;
            let right = eval_relation(&j.right, tables)?;
            join(j.kind, left, right, j.on.as_ref())
        }
        Expr::SetOp(s) => set_operation(s, tables),
        other => bail!("{} is not a relation", other.kind()),
    }
}

fn count_operand(expr: Option<&Expr>) -> Result<Option<usize>> {
    let Some(expr) = expr else {
        return Ok(None);
    };
    match evaluate(expr)? {
        Value::Int(n) => Ok(Some(n.max(0) as usize)),
        Value::Null => Ok(None),
        other => bail!("row count must be an integer, got {}", other.display()),
    }
}

fn project(p: &Projection, tables: &HashMap<String, RowSet>) -> Result<Relation> {
    let input = eval_relation(&p.input, tables)?;
    let columns: Vec<(String, String)> = p
        .columns
        .iter()
        .map(|c| (p.alias.clone(), c.name.clone()))
        .collect();

    let aggregated = p
        .columns
        .iter()
        .any(|c| c.expr.any(&|e| matches!(e, Expr::Aggregate { .. })));

    let mut rows = Vec::new();
    if aggregated || !p.group_by.is_empty() {
        for group in group_rows(&input, &p.group_by)? {
            let first = group.first().map(|row| row.as_slice());
            let env = RowEnv {
                columns: &input.columns,
                row: first,
            };
            let mut out = Vec::with_capacity(p.columns.len());
            for column in &p.columns {
                let expr = replace_aggregates(&column.expr, &input.columns, &group)?;
                out.push(evaluate_with(&expr, &env)?);
            }
            rows.push(out);
        }
    } else {
        for row in &input.rows {
            let env = RowEnv {
                columns: &input.columns,
                row: Some(row.as_slice()),
            };
            let out = p
                .columns
                .iter()
                .map(|c| evaluate_with(&c.expr, &env))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(out);
        }
    }

    if p.distinct {
        rows = dedup(rows);
    }
    Ok(Relation { columns, rows })
}

/// Split rows into groups in first-seen order. No grouping keys means a
/// single group, present even when the input is empty.
fn group_rows(input: &Relation, group_by: &[Expr]) -> Result<Vec<Vec<Vec<Value>>>> {
    if group_by.is_empty() {
        return Ok(vec![input.rows.clone()]);
    }
    let mut groups: Vec<(Vec<Value>, Vec<Vec<Value>>)> = Vec::new();
    for row in &input.rows {
        let env = RowEnv {
            columns: &input.columns,
            row: Some(row.as_slice()),
        };
        let key = group_by
            .iter()
            .map(|e| evaluate_with(e, &env))
            .collect::<Result<Vec<_>, _>>()?;
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(row.clone()),
            None => groups.push((key, vec![row.clone()])),
        }
    }
    Ok(groups.into_iter().map(|(_, members)| members).collect())
}

/// Replace every aggregate in `expr` with a constant computed over `group`.
fn replace_aggregates(
    expr: &Expr,
    columns: &[(String, String)],
    group: &[Vec<Value>],
) -> Result<Expr> {
    expr.clone().try_map_children(&mut |child| replace_aggregates(&child, columns, group))
        .and_then(|rebuilt| match rebuilt {
            Expr::Aggregate {
                func,
                arg,
                distinct,
                ty,
            } => {
                let value = aggregate(func, arg.as_deref(), distinct, columns, group)?;
                Ok(Expr::Constant { value, ty })
            }
            other => Ok(other),
        })
}

fn aggregate(
    func: AggregateFunction,
    arg: Option<&Expr>,
    distinct: bool,
    columns: &[(String, String)],
    group: &[Vec<Value>],
) -> Result<Value> {
    let Some(arg) = arg else {
        return Ok(Value::Int(group.len() as i64));
    };
    let mut values = Vec::with_capacity(group.len());
    for row in group {
        let env = RowEnv {
            columns,
            row: Some(row.as_slice()),
        };
        let value = evaluate_with(arg, &env)?;
        if !value.is_null() {
            values.push(value);
        }
    }
    if distinct {
        values = dedup(values);
    }

    match func {
        AggregateFunction::Count => Ok(Value::Int(values.len() as i64)),
        AggregateFunction::Sum => sum(&values),
        AggregateFunction::Avg => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let total = values
                .iter()
                .map(|v| v.as_f64().ok_or_else(|| anyhow!("AVG over {}", v.display())))
                .sum::<Result<f64>>()?;
            Ok(Value::Float(total / values.len() as f64))
        }
        AggregateFunction::Min => Ok(extreme(values, CmpOrdering::Less)),
        AggregateFunction::Max => Ok(extreme(values, CmpOrdering::Greater)),
    }
}

fn sum(values: &[Value]) -> Result<Value> {
    if values.is_empty() {
        return Ok(Value::Null);
    }
    if values.iter().all(|v| matches!(v, Value::Int(_))) {
        let mut total: i64 = 0;
        for v in values {
            let n = v.as_i64().unwrap_or_default();
            total = total
                .checked_add(n)
                .ok_or_else(|| anyhow!("SUM overflowed"))?;
        }
        return Ok(Value::Int(total));
    }
    let total = values
        .iter()
        .map(|v| v.as_f64().ok_or_else(|| anyhow!("SUM over {}", v.display())))
        .sum::<Result<f64>>()?;
    Ok(Value::Float(total))
}

fn extreme(values: Vec<Value>, wanted: CmpOrdering) -> Value {
    values.into_iter().fold(Value::Null, |best, v| {
        if best.is_null() || v.sql_cmp(&best) == Some(wanted) {
            v
        } else {
            best
        }
    })
}

fn sort(mut relation: Relation, keys: &[OrderKey]) -> Result<Relation> {
    let mut keyed = Vec::with_capacity(relation.rows.len());
    for row in relation.rows {
        let env = RowEnv {
            columns: &relation.columns,
            row: Some(row.as_slice()),
        };
        let values = keys
            .iter()
            .map(|k| evaluate_with(&k.expr, &env))
            .collect::<Result<Vec<_>, _>>()?;
        keyed.push((values, row));
    }
    // sort_by is stable, so equal keys keep input order.
    keyed.sort_by(|(a, _), (b, _)| {
        keys.iter()
            .zip(a.iter().zip(b))
            .map(|(key, (x, y))| match key.direction {
                OrderDirection::Ascending => x.sort_cmp(y),
                OrderDirection::Descending => y.sort_cmp(x),
            })
            .find(|o| *o != CmpOrdering::Equal)
            .unwrap_or(CmpOrdering::Equal)
    });
    relation.rows = keyed.into_iter().map(|(_, row)| row).collect();
    Ok(relation)
}

fn join(kind: JoinKind, left: Relation, right: Relation, on: Option<&Expr>) -> Result<Relation> {
    if matches!(kind, JoinKind::Right | JoinKind::Full) {
        bail!("{:?} joins are not supported in memory", kind);
    }
    let mut columns = left.columns.clone();
    columns.extend(right.columns.iter().cloned());

    let mut rows = Vec::new();
    for l in &left.rows {
        let mut matched = false;
        for r in &right.rows {
            let mut row = l.clone();
            row.extend(r.iter().cloned());
            let keep = match (kind, on) {
                (JoinKind::Cross, _) | (_, None) => true,
                (_, Some(predicate)) => {
                    let env = RowEnv {
                        columns: &columns,
                        row: Some(row.as_slice()),
                    };
                    evaluate_with(predicate, &env)? == Value::Bool(true)
                }
            };
            if keep {
                matched = true;
                rows.push(row);
            }
        }
        if kind == JoinKind::Left && !matched {
            let mut row = l.clone();
            row.extend(std::iter::repeat(Value::Null).take(right.columns.len()));
            rows.push(row);
        }
    }
    Ok(Relation { columns, rows })
}

fn set_operation(s: &SetOperation, tables: &HashMap<String, RowSet>) -> Result<Relation> {
    let left = eval_relation(&s.left, tables)?;
    let right = eval_relation(&s.right, tables)?;
    if left.columns.len() != right.columns.len() {
        bail!(
            "set operation branches have {} and {} columns",
            left.columns.len(),
            right.columns.len()
        );
    }
    let columns = left
        .columns
        .iter()
        .map(|(_, name)| (s.alias.clone(), name.clone()))
        .collect();

    let rows = match s.op {
        SetOperator::Union => {
            let mut rows = left.rows;
            rows.extend(right.rows);
            rows
        }
        SetOperator::Intersect => left
            .rows
            .into_iter()
            .filter(|row| right.rows.contains(row))
            .collect(),
        SetOperator::Except => left
            .rows
            .into_iter()
            .filter(|row| !right.rows.contains(row))
            .collect(),
    };
    let rows = if s.all { rows } else { dedup(rows) };
    Ok(Relation { columns, rows })
}

fn dedup<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
