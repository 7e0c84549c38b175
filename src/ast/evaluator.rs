//! Scalar evaluation and partial evaluation of query trees.
//!
//! The same folding utility serves provider resolution (turning a captured
//! `ctx.orders` member chain into a literal source) and generic lowering
//! (turning `1 + 2` into `3` before formatting).
use std::collections::HashMap;

use super::types::{BinaryOperator, Expr, LogicalType, ParameterDecl, UnaryOperator};
use super::value::Value;
use crate::error::EvalError;

/// Pure functions the evaluator knows how to compute.
pub const BUILTIN_FUNCTIONS: &[&str] = &["LOWER", "UPPER", "LENGTH", "ABS", "COALESCE", "CONCAT"];

/// Bindings visible to the evaluator.
pub trait Env {
    fn parameter(&self, name: &str) -> Option<Value>;

    fn column(&self, _alias: &str, _name: &str) -> Option<Value> {
        None
    }
}

/// No bindings at all.
pub struct EmptyEnv;

impl Env for EmptyEnv {
    fn parameter(&self, _name: &str) -> Option<Value> {
        None
    }
}

impl Env for HashMap<String, Value> {
    fn parameter(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_FUNCTIONS
        .iter()
        .any(|f| f.eq_ignore_ascii_case(name))
}

/// Evaluate a closed scalar expression.
pub fn evaluate(expr: &Expr) -> Result<Value, EvalError> {
    evaluate_with(expr, &EmptyEnv)
}

pub fn evaluate_with(expr: &Expr, env: &dyn Env) -> Result<Value, EvalError> {
    match expr {
        Expr::Constant { value, .. } => Ok(value.clone()),
        Expr::Parameter { name, .. } => env
            .parameter(name)
            .ok_or_else(|| EvalError::UnboundParameter(name.clone())),
        Expr::Column { alias, name, .. } => {
            env.column(alias, name)
                .ok_or_else(|| EvalError::UnknownColumn {
                    alias: alias.clone(),
                    name: name.clone(),
                })
        }
        Expr::Member { target, member, .. } => match evaluate_with(target, env)? {
            Value::Record(mut fields) => fields
                .remove(member)
                .ok_or_else(|| EvalError::MissingMember(member.clone())),
            Value::Null => Ok(Value::Null),
            other => Err(EvalError::TypeMismatch {
                op: format!(".{}", member),
                detail: format!("cannot access a member of {}", other.display()),
            }),
        },
        Expr::Binary { op, left, right, .. } => {
            let l = evaluate_with(left, env)?;
            // AND / OR short-circuit only on a decided left side.
            match (op, &l) {
                (BinaryOperator::And, Value::Bool(false)) => return Ok(Value::Bool(false)),
                (BinaryOperator::Or, Value::Bool(true)) => return Ok(Value::Bool(true)),
                _ => {}
            }
            let r = evaluate_with(right, env)?;
            eval_binary(*op, l, r)
        }
        Expr::Unary { op, operand, .. } => eval_unary(*op, evaluate_with(operand, env)?),
        Expr::Function { name, args, .. } => {
            let values = args
                .iter()
                .map(|a| evaluate_with(a, env))
                .collect::<Result<Vec<_>, _>>()?;
            eval_function(name, values)
        }
        other => Err(EvalError::NotScalar(other.kind())),
    }
}

fn mismatch(op: BinaryOperator, l: &Value, r: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op: format!("{:?}", op),
        detail: format!("{} and {}", l.display(), r.display()),
    }
}

fn eval_binary(op: BinaryOperator, l: Value, r: Value) -> Result<Value, EvalError> {
    use BinaryOperator::*;
    match op {
        And => match (l.as_bool(), r.as_bool()) {
            (Some(false), _) | (_, Some(false)) => Ok(Value::Bool(false)),
            (Some(true), Some(true)) => Ok(Value::Bool(true)),
            _ if (l.is_null() || l.as_bool().is_some()) && (r.is_null() || r.as_bool().is_some()) => {
                Ok(Value::Null)
            }
            _ => Err(mismatch(op, &l, &r)),
        },
        Or => match (l.as_bool(), r.as_bool()) {
            (Some(true), _) | (_, Some(true)) => Ok(Value::Bool(true)),
            (Some(false), Some(false)) => Ok(Value::Bool(false)),
            _ if (l.is_null() || l.as_bool().is_some()) && (r.is_null() || r.as_bool().is_some()) => {
                Ok(Value::Null)
            }
            _ => Err(mismatch(op, &l, &r)),
        },
        _ if l.is_null() || r.is_null() => Ok(Value::Null),
        Eq | NotEq | Lt | LtEq | Gt | GtEq => {
            let ord = l.sql_cmp(&r).ok_or_else(|| mismatch(op, &l, &r))?;
            let result = match op {
                Eq => ord.is_eq(),
                NotEq => ord.is_ne(),
                Lt => ord.is_lt(),
                LtEq => ord.is_le(),
                Gt => ord.is_gt(),
                _ => ord.is_ge(),
            };
            Ok(Value::Bool(result))
        }
        Plus | Minus | Multiply | Divide | Modulo => eval_arithmetic(op, l, r),
        Concat => Ok(Value::Text(format!("{}{}", l.display(), r.display()))),
        Like => match (&l, &r) {
            (Value::Text(s), Value::Text(p)) => Ok(Value::Bool(like_match(s, p))),
            _ => Err(mismatch(op, &l, &r)),
        },
    }
}

fn eval_arithmetic(op: BinaryOperator, l: Value, r: Value) -> Result<Value, EvalError> {
    use BinaryOperator::*;
    let overflow = || EvalError::Overflow(format!("{:?}", op));
    match (&l, &r) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                Plus => a.checked_add(b).ok_or_else(overflow)?,
                Minus => a.checked_sub(b).ok_or_else(overflow)?,
                Multiply => a.checked_mul(b).ok_or_else(overflow)?,
                Divide => {
                    if b == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    a.checked_div(b).ok_or_else(overflow)?
                }
                _ => {
                    if b == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    a.checked_rem(b).ok_or_else(overflow)?
                }
            };
            Ok(Value::Int(result))
        }
        _ => {
            let (a, b) = match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(mismatch(op, &l, &r)),
            };
            let result = match op {
                Plus => a + b,
                Minus => a - b,
                Multiply => a * b,
                Divide => {
                    if b == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    a / b
                }
                _ => {
                    if b == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    a % b
                }
            };
            Ok(Value::Float(result))
        }
    }
}

fn eval_unary(op: UnaryOperator, v: Value) -> Result<Value, EvalError> {
    match op {
        UnaryOperator::IsNull => Ok(Value::Bool(v.is_null())),
        UnaryOperator::IsNotNull => Ok(Value::Bool(!v.is_null())),
        _ if v.is_null() => Ok(Value::Null),
        UnaryOperator::Not => match v {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(EvalError::TypeMismatch {
                op: "NOT".into(),
                detail: other.display(),
            }),
        },
        UnaryOperator::Negate => match v {
            Value::Int(i) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| EvalError::Overflow("Negate".into())),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(EvalError::TypeMismatch {
                op: "-".into(),
                detail: other.display(),
            }),
        },
    }
}

fn eval_function(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    let upper = name.to_ascii_uppercase();
    let arity = |n: usize| -> Result<(), EvalError> {
        if args.len() == n {
            Ok(())
        } else {
            Err(EvalError::TypeMismatch {
                op: upper.clone(),
                detail: format!("expected {} argument(s), got {}", n, args.len()),
            })
        }
    };
    match upper.as_str() {
        "COALESCE" => Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null)),
        "CONCAT" => Ok(Value::Text(
            args.iter()
                .filter(|v| !v.is_null())
                .map(|v| v.display())
                .collect(),
        )),
        "LOWER" | "UPPER" | "LENGTH" => {
            arity(1)?;
            match &args[0] {
                Value::Null => Ok(Value::Null),
                Value::Text(s) => Ok(match upper.as_str() {
                    "LOWER" => Value::Text(s.to_lowercase()),
                    "UPPER" => Value::Text(s.to_uppercase()),
                    _ => Value::Int(s.chars().count() as i64),
                }),
                other => Err(EvalError::TypeMismatch {
                    op: upper.clone(),
                    detail: other.display(),
                }),
            }
        }
        "ABS" => {
            arity(1)?;
            match &args[0] {
                Value::Null => Ok(Value::Null),
                Value::Int(i) => i
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| EvalError::Overflow("ABS".into())),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(EvalError::TypeMismatch {
                    op: upper.clone(),
                    detail: other.display(),
                }),
            }
        }
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}

/// SQL LIKE with `%` and `_` wildcards.
pub fn like_match(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let (mut ti, mut pi) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == t[ti]) {
            ti += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '%')
}

/// True if the subtree can be evaluated with no bindings: no parameter or
/// column reference, no relational node, aggregate or lambda, and only
/// built-in functions.
pub fn is_closed(expr: &Expr) -> bool {
    match expr {
        Expr::Constant { .. } => true,
        Expr::Parameter { .. } | Expr::Column { .. } | Expr::Aggregate { .. } | Expr::Lambda(_) => {
            false
        }
        Expr::Function { name, args, .. } => is_builtin(name) && args.iter().all(is_closed),
        Expr::Member { target, .. } => is_closed(target),
        Expr::Binary { left, right, .. } => is_closed(left) && is_closed(right),
        Expr::Unary { operand, .. } => is_closed(operand),
        _ => false,
    }
}

/// Replace every maximal closed subtree with a constant holding its value.
/// Subtrees whose evaluation fails are left as they are.
pub fn fold_closed_subtrees(expr: Expr) -> Expr {
    if is_closed(&expr) && !expr.is_constant() {
        match evaluate(&expr) {
            Ok(value) => {
                let ty = folded_type(expr.ty(), &value);
                return Expr::Constant { value, ty };
            }
            Err(err) => {
                tracing::trace!("leaving {} unfolded: {}", expr.kind(), err);
            }
        }
    }
    expr.map_children(fold_closed_subtrees)
}

/// The declared type, unless the computed number is of the other kind.
fn folded_type(declared: LogicalType, value: &Value) -> LogicalType {
    match value {
        Value::Float(_) if !declared.is_float() => LogicalType::Float64,
        Value::Int(_) if declared.is_float() => LogicalType::Int64,
        _ => declared,
    }
}

/// Replace references to `params` with constants holding the matching `args`.
/// Lambdas that redeclare a name shadow it.
pub fn substitute_parameters(expr: Expr, params: &[ParameterDecl], args: &[Value]) -> Expr {
    let bindings: HashMap<&str, (&Value, &LogicalType)> = params
        .iter()
        .zip(args)
        .map(|(p, v)| (p.name.as_str(), (v, &p.ty)))
        .collect();
    substitute(expr, &bindings)
}

fn substitute(expr: Expr, bindings: &HashMap<&str, (&Value, &LogicalType)>) -> Expr {
    match expr {
        Expr::Parameter { name, ty } => match bindings.get(name.as_str()) {
            Some((value, declared)) => Expr::Constant {
                value: (*value).clone(),
                ty: (*declared).clone(),
            },
            None => Expr::Parameter { name, ty },
        },
        Expr::Lambda(lambda) => {
            let inner: HashMap<&str, (&Value, &LogicalType)> = bindings
                .iter()
                .filter(|(name, _)| !lambda.params.iter().any(|p| p.name == **name))
                .map(|(k, v)| (*k, *v))
                .collect();
            Expr::Lambda(super::types::Lambda {
                params: lambda.params,
                body: Box::new(substitute(*lambda.body, &inner)),
            })
        }
        other => other.map_children(|child| substitute(child, bindings)),
    }
}

/// Depth-first, pre-order search for the first node whose type satisfies `pred`.
pub fn find_typed_subtree<'a>(expr: &'a Expr, pred: &dyn Fn(&LogicalType) -> bool) -> Option<&'a Expr> {
    if pred(&expr.ty()) {
        return Some(expr);
    }
    expr.children()
        .into_iter()
        .find_map(|child| find_typed_subtree(child, pred))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{ColumnDecl, Lambda};
    use crate::ast::value::QuerySource;
    use std::collections::BTreeMap;

    fn int(i: i64) -> Expr {
        Expr::int(i)
    }

    #[test]
    fn test_evaluate_arithmetic() {
        let e = Expr::binary(BinaryOperator::Plus, int(2), Expr::binary(BinaryOperator::Multiply, int(3), int(4)));
        assert_eq!(evaluate(&e).unwrap(), Value::Int(14));
    }

    #[test]
    fn test_evaluate_mixed_arithmetic_is_float() {
        let e = Expr::binary(BinaryOperator::Divide, int(3), Expr::constant(2.0, LogicalType::Float64));
        assert_eq!(evaluate(&e).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn test_division_by_zero() {
        let e = Expr::binary(BinaryOperator::Divide, int(1), int(0));
        assert_eq!(evaluate(&e), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let e = Expr::binary(BinaryOperator::Plus, int(i64::MAX), int(1));
        assert!(matches!(evaluate(&e), Err(EvalError::Overflow(_))));
    }

    #[test]
    fn test_three_valued_logic() {
        let null = Expr::null(LogicalType::Bool);
        let and_false = null.clone().and(Expr::boolean(false));
        assert_eq!(evaluate(&and_false).unwrap(), Value::Bool(false));
        let and_true = null.clone().and(Expr::boolean(true));
        assert_eq!(evaluate(&and_true).unwrap(), Value::Null);
        let or_true = Expr::binary(BinaryOperator::Or, null.clone(), Expr::boolean(true));
        assert_eq!(evaluate(&or_true).unwrap(), Value::Bool(true));
        let cmp = Expr::null(LogicalType::Int64).eq(int(1));
        assert_eq!(evaluate(&cmp).unwrap(), Value::Null);
        let is_null = Expr::unary(UnaryOperator::IsNull, Expr::null(LogicalType::Int64));
        assert_eq!(evaluate(&is_null).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_builtin_functions() {
        let lower = Expr::function("lower", vec![Expr::text("HeLLo")], LogicalType::String);
        assert_eq!(evaluate(&lower).unwrap(), Value::from("hello"));
        let len = Expr::function("LENGTH", vec![Expr::text("héllo")], LogicalType::Int64);
        assert_eq!(evaluate(&len).unwrap(), Value::Int(5));
        let coalesce = Expr::function(
            "COALESCE",
            vec![Expr::null(LogicalType::Int64), int(7)],
            LogicalType::Int64,
        );
        assert_eq!(evaluate(&coalesce).unwrap(), Value::Int(7));
        let concat = Expr::function(
            "CONCAT",
            vec![Expr::text("a"), Expr::null(LogicalType::String), int(1)],
            LogicalType::String,
        );
        assert_eq!(evaluate(&concat).unwrap(), Value::from("a1"));
    }

    #[test]
    fn test_like_match() {
        assert!(like_match("hello", "h%"));
        assert!(like_match("hello", "h_llo"));
        assert!(like_match("hello", "%ll%"));
        assert!(!like_match("hello", "h_o"));
        assert!(like_match("", "%"));
    }

    #[test]
    fn test_member_access_on_record() {
        let mut fields = BTreeMap::new();
        fields.insert("limit".to_string(), Value::Int(10));
        let record = Expr::constant(Value::Record(fields), LogicalType::Record("ctx".into()));
        let e = record.member("limit", LogicalType::Int64);
        assert_eq!(evaluate(&e).unwrap(), Value::Int(10));
    }

    #[test]
    fn test_is_closed() {
        assert!(is_closed(&Expr::binary(BinaryOperator::Plus, int(1), int(2))));
        assert!(!is_closed(&Expr::param("p", LogicalType::Int64)));
        assert!(!is_closed(&Expr::column("t", "a", LogicalType::Int64)));
        assert!(!is_closed(&Expr::function("LASTVAL", vec![], LogicalType::Int64)));
    }

    #[test]
    fn test_fold_closed_subtrees_keeps_open_parts() {
        let e = Expr::column("t", "a", LogicalType::Int64)
            .eq(Expr::binary(BinaryOperator::Plus, int(1), int(2)));
        let folded = fold_closed_subtrees(e);
        let expected = Expr::column("t", "a", LogicalType::Int64).eq(int(3));
        assert_eq!(folded, expected);
    }

    #[test]
    fn test_fold_of_mixed_arithmetic_is_float_typed() {
        let e = Expr::binary(BinaryOperator::Plus, int(1), Expr::constant(2.5, LogicalType::Float64));
        assert_eq!(
            fold_closed_subtrees(e),
            Expr::Constant {
                value: Value::Float(3.5),
                ty: LogicalType::Float64,
            }
        );
    }

    #[test]
    fn test_folded_type_follows_value_kind() {
        assert_eq!(folded_type(LogicalType::Int64, &Value::Float(1.5)), LogicalType::Float64);
        assert_eq!(folded_type(LogicalType::Float32, &Value::Int(2)), LogicalType::Int64);
        assert_eq!(folded_type(LogicalType::Int32, &Value::Int(2)), LogicalType::Int32);
        assert_eq!(folded_type(LogicalType::String, &Value::Null), LogicalType::String);
    }

    #[test]
    fn test_fold_leaves_failing_subtree() {
        let bad = Expr::binary(BinaryOperator::Divide, int(1), int(0));
        assert_eq!(fold_closed_subtrees(bad.clone()), bad);
    }

    #[test]
    fn test_fold_resolves_captured_source() {
        let mut fields = BTreeMap::new();
        fields.insert("users".to_string(), Value::Source(QuerySource::new("users")));
        let ctx = Expr::constant(Value::Record(fields), LogicalType::Record("ctx".into()));
        let scan = ctx.member("users", LogicalType::queryable_of("users")).scan("u");
        let folded = fold_closed_subtrees(scan);
        match folded {
            Expr::Scan { source, .. } => assert_eq!(*source, Expr::source(QuerySource::new("users"))),
            other => panic!("expected scan, got {:?}", other),
        }
    }

    #[test]
    fn test_substitute_parameters() {
        let params = vec![ParameterDecl::new("p", LogicalType::Int64)];
        let body = Expr::column("t", "id", LogicalType::Int64).eq(Expr::param("p", LogicalType::Int64));
        let out = substitute_parameters(body, &params, &[Value::Int(42)]);
        assert_eq!(out, Expr::column("t", "id", LogicalType::Int64).eq(int(42)));
    }

    #[test]
    fn test_substitute_respects_shadowing() {
        let params = vec![ParameterDecl::new("p", LogicalType::Int64)];
        let inner = Expr::Lambda(Lambda::new(
            vec![ParameterDecl::new("p", LogicalType::Int64)],
            Expr::param("p", LogicalType::Int64),
        ));
        let out = substitute_parameters(inner.clone(), &params, &[Value::Int(1)]);
        assert_eq!(out, inner);
    }

    #[test]
    fn test_find_typed_subtree_is_preorder() {
        let q = Expr::source(QuerySource::new("a"))
            .scan("x")
            .join(
                crate::ast::types::JoinKind::Cross,
                Expr::source(QuerySource::new("b")).scan("y"),
                None,
            )
            .project("p", vec![ColumnDecl::new("c", int(1))]);
        let found = find_typed_subtree(&q, &|t| t.is_queryable()).unwrap();
        assert_eq!(*found, Expr::source(QuerySource::new("a")));
    }
}
