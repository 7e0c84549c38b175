//! Query tree → SQL text plus an ordered parameter list.
//!
//! A relational tree is rendered block by block. One SELECT block absorbs,
//! from the top down, at most:
//!
//! ```text
//! Limit? → Ordering? → Projection? → Limit? → Ordering? → Filter* → from-item
//! ```
//!
//! Any node met out of that order starts a nested block rendered as a
//! subquery `(...) AS alias`. Formatting never mutates the tree and is
//! deterministic: identical trees give identical text and parameter order.
use super::types::*;
use super::value::Value;
use crate::error::{QueryError, Result};
use crate::language::QueryLanguage;

/// Rendered statement ready for a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlCommand {
    pub sql: String,
    pub parameters: Vec<QueryParameter>,
}

/// One positional parameter. Lambda parameters carry no value; they are
/// bound from invocation arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameter {
    pub name: String,
    pub ty: LogicalType,
    pub value: Option<Value>,
}

/// Format a single statement.
pub fn format_query(expr: &Expr, language: &dyn QueryLanguage) -> Result<SqlCommand> {
    let mut f = SqlFormatter::new(language);
    let sql = f.statement(expr)?;
    Ok(SqlCommand {
        sql,
        parameters: f.parameters,
    })
}

/// Format several statements into one command. Parameter numbering continues
/// across statements.
pub fn format_batch(exprs: &[Expr], language: &dyn QueryLanguage) -> Result<SqlCommand> {
    if exprs.len() > 1 && !language.allows_multiple_statements() {
        return Err(QueryError::unsupported(
            exprs[1].kind(),
            format!("{} does not allow multiple statements per command", language.name()),
        ));
    }
    let mut f = SqlFormatter::new(language);
    let statements = exprs
        .iter()
        .map(|e| f.statement(e))
        .collect::<Result<Vec<_>>>()?;
    Ok(SqlCommand {
        sql: statements.join(";\n"),
        parameters: f.parameters,
    })
}

#[derive(Default)]
struct Block<'e> {
    outer_limit: Option<(&'e Option<Box<Expr>>, &'e Option<Box<Expr>>)>,
    outer_order: &'e [OrderKey],
    projection: Option<&'e Projection>,
    inner_limit: Option<(&'e Option<Box<Expr>>, &'e Option<Box<Expr>>)>,
    inner_order: &'e [OrderKey],
    filters: Vec<&'e Expr>,
    from: Option<&'e Expr>,
}

impl<'e> Block<'e> {
    fn split(expr: &'e Expr) -> Block<'e> {
        let mut block = Block::default();
        let mut stage = 0u8;
        let mut cur = expr;
        loop {
            match cur {
                Expr::Limit { input, take, skip } if stage == 0 => {
                    block.outer_limit = Some((take, skip));
                    stage = 1;
                    cur = &**input;
                }
                Expr::Ordering { input, keys } if stage <= 1 => {
                    block.outer_order = keys.as_slice();
                    stage = 2;
                    cur = &**input;
                }
                Expr::Projection(p) if stage <= 2 => {
                    block.projection = Some(&**p);
                    stage = 3;
                    cur = &p.input;
                }
                Expr::Limit { input, take, skip } if stage == 3 && block.allows_inner_limit() => {
                    block.inner_limit = Some((take, skip));
                    stage = 4;
                    cur = &**input;
                }
                Expr::Ordering { input, keys } if stage == 3 || stage == 4 => {
                    block.inner_order = keys.as_slice();
                    stage = 5;
                    cur = &**input;
                }
                Expr::Filter { input, predicate } if stage <= 5 => {
                    block.filters.push(&**predicate);
                    stage = 5;
                    cur = &**input;
                }
                _ => {
                    block.from = Some(cur);
                    return block;
                }
            }
        }
    }

    /// A limit below the projection may only move up when nothing above it
    /// depends on the row count and the projection maps rows one to one.
    fn allows_inner_limit(&self) -> bool {
        self.outer_limit.is_none()
            && self.outer_order.is_empty()
            && self
                .projection
                .map(|p| !p.distinct && p.group_by.is_empty())
                .unwrap_or(true)
    }

    fn is_bare_from(&self) -> bool {
        self.outer_limit.is_none()
            && self.outer_order.is_empty()
            && self.projection.is_none()
            && self.inner_limit.is_none()
            && self.inner_order.is_empty()
            && self.filters.is_empty()
    }
}

struct SqlFormatter<'l> {
    language: &'l dyn QueryLanguage,
    parameters: Vec<QueryParameter>,
    constant_count: usize,
    /// Alias of the projection whose columns are referenced by bare name.
    bare_alias: Option<String>,
}

impl<'l> SqlFormatter<'l> {
    fn new(language: &'l dyn QueryLanguage) -> Self {
        Self {
            language,
            parameters: Vec::new(),
            constant_count: 0,
            bare_alias: None,
        }
    }

    fn statement(&mut self, expr: &Expr) -> Result<String> {
        if let Expr::Lambda(lambda) = expr {
            return self.statement(&lambda.body);
        }
        if !expr.is_relational() {
            return Err(QueryError::unsupported(
                expr.kind(),
                "a statement must produce rows",
            ));
        }
        self.query(expr)
    }

    /// Render a relational node as a complete query.
    fn query(&mut self, expr: &Expr) -> Result<String> {
        let block = Block::split(expr);
        if let (true, Some(Expr::SetOp(s))) = (block.is_bare_from(), block.from) {
            return self.set_operation(s);
        }
        self.block(&block)
    }

    fn block(&mut self, block: &Block<'_>) -> Result<String> {
        let mut parts = Vec::new();

        let select = match block.projection {
            Some(p) => {
                let columns = p
                    .columns
                    .iter()
                    .map(|c| self.column_decl(c))
                    .collect::<Result<Vec<_>>>()?;
                let distinct = if p.distinct { "DISTINCT " } else { "" };
                format!("SELECT {}{}", distinct, columns.join(", "))
            }
            None => "SELECT *".to_string(),
        };
        parts.push(select);

        if let Some(from) = block.from {
            parts.push(format!("FROM {}", self.from_item(from)?));
        }

        match block.filters.as_slice() {
            [] => {}
            [single] => parts.push(format!("WHERE {}", self.expr(single)?)),
            many => {
                // Collected top-down; the innermost filter applies first.
                let predicates = many
                    .iter()
                    .rev()
                    .map(|f| self.operand(f))
                    .collect::<Result<Vec<_>>>()?;
                parts.push(format!("WHERE {}", predicates.join(" AND ")));
            }
        }

        if let Some(p) = block.projection {
            if !p.group_by.is_empty() {
                let groups = p
                    .group_by
                    .iter()
                    .map(|g| self.expr(g))
                    .collect::<Result<Vec<_>>>()?;
                parts.push(format!("GROUP BY {}", groups.join(", ")));
            }
        }

        let previous = std::mem::replace(
            &mut self.bare_alias,
            block.projection.map(|p| p.alias.clone()),
        );
        let mut orders = Vec::new();
        for key in block.outer_order {
            orders.push(self.order_key(key)?);
        }
        self.bare_alias = previous.clone();
        for key in block.inner_order {
            orders.push(self.order_key(key)?);
        }
        if !orders.is_empty() {
            parts.push(format!("ORDER BY {}", orders.join(", ")));
        }

        if let Some((take, skip)) = block.outer_limit.or(block.inner_limit) {
            if let Some(take) = take {
                parts.push(format!("LIMIT {}", self.expr(take)?));
            }
            if let Some(skip) = skip {
                parts.push(format!("OFFSET {}", self.expr(skip)?));
            }
        }
        self.bare_alias = previous;

        Ok(parts.join(" "))
    }

    fn column_decl(&mut self, column: &ColumnDecl) -> Result<String> {
        let rendered = self.expr(&column.expr)?;
        match &column.expr {
            Expr::Column { name, .. } if *name == column.name => Ok(rendered),
            _ => Ok(format!("{} AS {}", rendered, self.language.quote(&column.name))),
        }
    }

    fn order_key(&mut self, key: &OrderKey) -> Result<String> {
        let rendered = self.expr(&key.expr)?;
        Ok(match key.direction {
            OrderDirection::Ascending => rendered,
            OrderDirection::Descending => format!("{} DESC", rendered),
        })
    }

    fn from_item(&mut self, expr: &Expr) -> Result<String> {
        match expr {
            Expr::Scan { source, alias, .. } => match source.as_ref() {
                Expr::Constant {
                    value: Value::Source(s),
                    ..
                } => Ok(format!("{} AS {}", self.language.quote(&s.table), alias)),
                other => Err(QueryError::unsupported(
                    other.kind(),
                    "table source must be a literal queryable source",
                )),
            },
            Expr::Join(j) => {
                let left = self.from_item(&j.left)?;
                let right = self.from_item(&j.right)?;
                let keyword = match j.kind {
                    JoinKind::Inner => "INNER JOIN",
                    JoinKind::Left => "LEFT JOIN",
                    JoinKind::Right => "RIGHT JOIN",
                    JoinKind::Full => "FULL JOIN",
                    JoinKind::Cross => "CROSS JOIN",
                };
                match (&j.on, j.kind) {
                    (_, JoinKind::Cross) | (None, _) => Ok(format!("{} {} {}", left, keyword, right)),
                    (Some(on), _) => {
                        let on = self.expr(on)?;
                        Ok(format!("{} {} {} ON {}", left, keyword, right, on))
                    }
                }
            }
            other => {
                let alias = relation_alias(other).ok_or_else(|| {
                    QueryError::unsupported(other.kind(), "subquery has no single alias")
                })?;
                let sql = self.query(other)?;
                Ok(format!("({}) AS {}", sql, alias))
            }
        }
    }

    fn set_operation(&mut self, s: &SetOperation) -> Result<String> {
        let left = self.set_branch(&s.left)?;
        let right = self.set_branch(&s.right)?;
        let op = match s.op {
            SetOperator::Union => "UNION",
            SetOperator::Intersect => "INTERSECT",
            SetOperator::Except => "EXCEPT",
        };
        let all = if s.all { " ALL" } else { "" };
        Ok(format!("{} {}{} {}", left, op, all, right))
    }

    fn set_branch(&mut self, branch: &Expr) -> Result<String> {
        let sql = self.query(branch)?;
        let needs_parens = matches!(
            branch,
            Expr::Ordering { .. } | Expr::Limit { .. } | Expr::SetOp(_)
        ) || matches!(branch, Expr::Projection(p) if matches!(p.input, Expr::Ordering { .. } | Expr::Limit { .. }));
        if needs_parens {
            Ok(format!("({})", sql))
        } else {
            Ok(sql)
        }
    }

    /// Render an operand, parenthesizing nested binary expressions.
    fn operand(&mut self, expr: &Expr) -> Result<String> {
        let rendered = self.expr(expr)?;
        if matches!(expr, Expr::Binary { .. }) {
            Ok(format!("({})", rendered))
        } else {
            Ok(rendered)
        }
    }

    fn expr(&mut self, expr: &Expr) -> Result<String> {
        match expr {
            Expr::Constant { value, ty } => self.literal(value, ty),
            Expr::Parameter { name, ty } => Ok(self.named_parameter(name, ty)),
            Expr::Column { alias, name, .. } => {
                if self.bare_alias.as_deref() == Some(alias.as_str()) {
                    Ok(self.language.quote(name))
                } else {
                    Ok(format!("{}.{}", alias, self.language.quote(name)))
                }
            }
            Expr::Binary { op, left, right, .. } => {
                let l = self.operand(left)?;
                let r = self.operand(right)?;
                Ok(format!("{} {} {}", l, binary_operator(*op), r))
            }
            Expr::Unary { op, operand, .. } => {
                let inner = self.operand(operand)?;
                Ok(match op {
                    UnaryOperator::Not => format!("NOT {}", inner),
                    UnaryOperator::Negate => format!("-{}", inner),
                    UnaryOperator::IsNull => format!("{} IS NULL", inner),
                    UnaryOperator::IsNotNull => format!("{} IS NOT NULL", inner),
                })
            }
            Expr::Function { name, args, .. } => {
                let args = args
                    .iter()
                    .map(|a| self.expr(a))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("{}({})", name, args.join(", ")))
            }
            Expr::Aggregate {
                func,
                arg,
                distinct,
                ..
            } => {
                if *distinct && !self.language.allows_distinct_in_aggregates() {
                    return Err(QueryError::unsupported(
                        NodeKind::Aggregate,
                        format!(
                            "{} does not allow DISTINCT inside {}",
                            self.language.name(),
                            func.sql_name()
                        ),
                    ));
                }
                let inner = match arg {
                    Some(a) => self.expr(a)?,
                    None => "*".to_string(),
                };
                let distinct = if *distinct { "DISTINCT " } else { "" };
                Ok(format!("{}({}{})", func.sql_name(), distinct, inner))
            }
            Expr::Member { member, .. } => Err(QueryError::unsupported(
                NodeKind::MemberAccess,
                format!("member '{}' has no SQL equivalent", member),
            )),
            other => Err(QueryError::unsupported(
                other.kind(),
                "not valid in a scalar position",
            )),
        }
    }

    fn literal(&mut self, value: &Value, ty: &LogicalType) -> Result<String> {
        match value {
            Value::Null => Ok("NULL".to_string()),
            Value::Bool(true) => Ok("TRUE".to_string()),
            Value::Bool(false) => Ok("FALSE".to_string()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) if f.is_finite() => Ok(format!("{:?}", f)),
            Value::Float(_)
            | Value::Text(_)
            | Value::Bytes(_)
            | Value::Date(_)
            | Value::Time(_)
            | Value::DateTime(_) => {
                let name = format!("_c{}", self.constant_count);
                self.constant_count += 1;
                self.parameters.push(QueryParameter {
                    name: name.clone(),
                    ty: ty.clone(),
                    value: Some(value.clone()),
                });
                Ok(self
                    .language
                    .parameter_placeholder(self.parameters.len(), &name))
            }
            other => Err(QueryError::unsupported(
                NodeKind::Constant,
                format!("{} cannot be rendered as SQL", other.display()),
            )),
        }
    }

    fn named_parameter(&mut self, name: &str, ty: &LogicalType) -> String {
        let index = match self.parameters.iter().position(|p| p.name == name && p.value.is_none()) {
            Some(existing) => existing + 1,
            None => {
                self.parameters.push(QueryParameter {
                    name: name.to_string(),
                    ty: ty.clone(),
                    value: None,
                });
                self.parameters.len()
            }
        };
        self.language.parameter_placeholder(index, name)
    }
}

fn binary_operator(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Eq => "=",
        BinaryOperator::NotEq => "<>",
        BinaryOperator::Lt => "<",
        BinaryOperator::LtEq => "<=",
        BinaryOperator::Gt => ">",
        BinaryOperator::GtEq => ">=",
        BinaryOperator::And => "AND",
        BinaryOperator::Or => "OR",
        BinaryOperator::Plus => "+",
        BinaryOperator::Minus => "-",
        BinaryOperator::Multiply => "*",
        BinaryOperator::Divide => "/",
        BinaryOperator::Modulo => "%",
        BinaryOperator::Like => "LIKE",
        BinaryOperator::Concat => "||",
    }
}

/// The alias under which a relation's columns are visible to its parent.
pub fn relation_alias(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Scan { alias, .. } => Some(alias.as_str()),
        Expr::Projection(p) => Some(p.alias.as_str()),
        Expr::SetOp(s) => Some(s.alias.as_str()),
        Expr::Filter { input, .. } | Expr::Ordering { input, .. } | Expr::Limit { input, .. } => {
            relation_alias(input)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::value::QuerySource;
    use crate::language::{DialectConfig, GenericLanguage, PlaceholderStyle, QuoteStyle};
    use chrono::NaiveDate;

    fn dialect(distinct_aggregates: bool, multiple: bool) -> GenericLanguage {
        GenericLanguage::new(DialectConfig {
            name: "test".into(),
            allows_multiple_statements: multiple,
            allows_distinct_in_aggregates: distinct_aggregates,
            quote_style: QuoteStyle::None,
            placeholder_style: PlaceholderStyle::Dollar,
            ..DialectConfig::default()
        })
    }

    fn fmt(expr: &Expr) -> SqlCommand {
        format_query(expr, &dialect(true, false)).unwrap()
    }

    fn t() -> Expr {
        Expr::source(QuerySource::new("users")).scan("t")
    }

    fn col(name: &str) -> Expr {
        Expr::column("t", name, LogicalType::Int64)
    }

    #[test]
    fn test_format_scan() {
        assert_eq!(fmt(&t()).sql, "SELECT * FROM users AS t");
    }

    #[test]
    fn test_format_projection_with_filter() {
        let q = t()
            .filter(col("age").gt(Expr::int(18)))
            .project(
                "p",
                vec![
                    ColumnDecl::new("id", col("id")),
                    ColumnDecl::new("years", col("age")),
                ],
            );
        assert_eq!(
            fmt(&q).sql,
            "SELECT t.id, t.age AS years FROM users AS t WHERE t.age > 18"
        );
    }

    #[test]
    fn test_format_multiple_filters_innermost_first() {
        let q = t()
            .filter(col("a").gt(Expr::int(1)))
            .filter(col("b").lt(Expr::int(2)));
        assert_eq!(
            fmt(&q).sql,
            "SELECT * FROM users AS t WHERE (t.a > 1) AND (t.b < 2)"
        );
    }

    #[test]
    fn test_format_order_and_limit() {
        let q = t()
            .order_by(vec![OrderKey::desc(col("age")), OrderKey::asc(col("id"))])
            .take(10);
        assert_eq!(
            fmt(&q).sql,
            "SELECT * FROM users AS t ORDER BY t.age DESC, t.id LIMIT 10"
        );
    }

    #[test]
    fn test_format_outer_order_uses_bare_projection_names() {
        let q = t()
            .project("p", vec![ColumnDecl::new("n", col("name"))])
            .order_by(vec![OrderKey::asc(Expr::column("p", "n", LogicalType::String))]);
        assert_eq!(fmt(&q).sql, "SELECT t.name AS n FROM users AS t ORDER BY n");
    }

    #[test]
    fn test_format_outer_then_inner_ordering() {
        let q = t()
            .order_by(vec![OrderKey::asc(col("b"))])
            .project("p", vec![ColumnDecl::new("a", col("a"))])
            .order_by(vec![OrderKey::asc(Expr::column("p", "a", LogicalType::Int64))]);
        assert_eq!(
            fmt(&q).sql,
            "SELECT t.a FROM users AS t ORDER BY a, t.b"
        );
    }

    #[test]
    fn test_format_filter_over_projection_is_subquery() {
        let q = t()
            .project("p", vec![ColumnDecl::new("a", col("a"))])
            .filter(Expr::column("p", "a", LogicalType::Int64).gt(Expr::int(1)));
        assert_eq!(
            fmt(&q).sql,
            "SELECT * FROM (SELECT t.a FROM users AS t) AS p WHERE p.a > 1"
        );
    }

    #[test]
    fn test_format_limit_below_ordering_is_subquery() {
        let q = t().take(5).order_by(vec![OrderKey::asc(col("a"))]);
        assert_eq!(
            fmt(&q).sql,
            "SELECT * FROM (SELECT * FROM users AS t LIMIT 5) AS t ORDER BY t.a"
        );
    }

    #[test]
    fn test_format_skip_and_take() {
        let q = Expr::Limit {
            input: Box::new(t()),
            take: Some(Box::new(Expr::int(10))),
            skip: Some(Box::new(Expr::int(20))),
        };
        assert_eq!(fmt(&q).sql, "SELECT * FROM users AS t LIMIT 10 OFFSET 20");
    }

    #[test]
    fn test_format_group_by_and_aggregates() {
        let q = Expr::Projection(Box::new(Projection {
            alias: "g".into(),
            input: t(),
            columns: vec![
                ColumnDecl::new("city", col("city")),
                ColumnDecl::new("n", Expr::aggregate(AggregateFunction::Count, None, false)),
            ],
            distinct: false,
            group_by: vec![col("city")],
        }));
        assert_eq!(
            fmt(&q).sql,
            "SELECT t.city, COUNT(*) AS n FROM users AS t GROUP BY t.city"
        );
    }

    #[test]
    fn test_format_join() {
        let orders = Expr::source(QuerySource::new("orders")).scan("o");
        let q = t().join(
            JoinKind::Left,
            orders,
            Some(col("id").eq(Expr::column("o", "user_id", LogicalType::Int64))),
        );
        assert_eq!(
            fmt(&q).sql,
            "SELECT * FROM users AS t LEFT JOIN orders AS o ON t.id = o.user_id"
        );
    }

    #[test]
    fn test_format_union_parenthesizes_limited_branch() {
        let left = t()
            .order_by(vec![OrderKey::asc(col("a"))])
            .take(1)
            .project("l", vec![ColumnDecl::new("a", col("a"))]);
        let right = t().project("r", vec![ColumnDecl::new("a", col("a"))]);
        let q = left.set_op(SetOperator::Union, true, right, "u");
        assert_eq!(
            fmt(&q).sql,
            "(SELECT t.a FROM users AS t ORDER BY t.a LIMIT 1) UNION ALL SELECT t.a FROM users AS t"
        );
    }

    #[test]
    fn test_format_text_literal_becomes_parameter() {
        let q = t().filter(Expr::column("t", "name", LogicalType::String).eq(Expr::text("bob")));
        let cmd = fmt(&q);
        assert_eq!(cmd.sql, "SELECT * FROM users AS t WHERE t.name = $1");
        assert_eq!(
            cmd.parameters,
            vec![QueryParameter {
                name: "_c0".into(),
                ty: LogicalType::String,
                value: Some(Value::from("bob")),
            }]
        );
    }

    #[test]
    fn test_format_date_literal_becomes_parameter() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let q = t().filter(
            Expr::column("t", "born", LogicalType::Date).lt(Expr::constant(Value::Date(date), LogicalType::Date)),
        );
        let cmd = fmt(&q);
        assert_eq!(cmd.parameters.len(), 1);
        assert_eq!(cmd.parameters[0].value, Some(Value::Date(date)));
    }

    #[test]
    fn test_format_repeated_parameter_shares_placeholder() {
        let p = Expr::param("p", LogicalType::Int64);
        let q = t().filter(
            col("a")
                .eq(p.clone())
                .and(col("b").eq(p)),
        );
        let cmd = fmt(&q);
        assert_eq!(
            cmd.sql,
            "SELECT * FROM users AS t WHERE (t.a = $1) AND (t.b = $1)"
        );
        assert_eq!(cmd.parameters.len(), 1);
        assert_eq!(cmd.parameters[0].value, None);
    }

    #[test]
    fn test_format_null_and_bool_inline() {
        let q = t().filter(Expr::unary(UnaryOperator::IsNull, col("a")).and(Expr::boolean(false)));
        assert_eq!(
            fmt(&q).sql,
            "SELECT * FROM users AS t WHERE t.a IS NULL AND FALSE"
        );
    }

    #[test]
    fn test_format_distinct_aggregate_gated() {
        let q = t().project(
            "p",
            vec![ColumnDecl::new(
                "n",
                Expr::aggregate(AggregateFunction::Count, Some(col("a")), true),
            )],
        );
        assert_eq!(
            format_query(&q, &dialect(true, false)).unwrap().sql,
            "SELECT COUNT(DISTINCT t.a) AS n FROM users AS t"
        );
        let err = format_query(&q, &dialect(false, false)).unwrap_err();
        assert!(matches!(
            err,
            QueryError::UnsupportedConstruct {
                kind: NodeKind::Aggregate,
                ..
            }
        ));
    }

    #[test]
    fn test_format_member_access_unsupported() {
        let q = t().filter(col("a").member("x", LogicalType::Int64).eq(Expr::int(1)));
        let err = format_query(&q, &dialect(true, false)).unwrap_err();
        assert!(matches!(
            err,
            QueryError::UnsupportedConstruct {
                kind: NodeKind::MemberAccess,
                ..
            }
        ));
    }

    #[test]
    fn test_format_is_deterministic() {
        let q = t()
            .filter(Expr::column("t", "name", LogicalType::String).eq(Expr::text("x")))
            .order_by(vec![OrderKey::asc(col("id"))]);
        let a = fmt(&q);
        let b = fmt(&q.clone());
        assert_eq!(a, b);
    }

    #[test]
    fn test_format_batch_requires_multiple_statements() {
        let err = format_batch(&[t(), t()], &dialect(true, false)).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedConstruct { .. }));
        let ok = format_batch(&[t(), t()], &dialect(true, true)).unwrap();
        assert_eq!(ok.sql, "SELECT * FROM users AS t;\nSELECT * FROM users AS t");
    }

    #[test]
    fn test_format_float_literal() {
        let q = t().filter(col("score").gt(Expr::constant(2.0, LogicalType::Float64)));
        assert_eq!(fmt(&q).sql, "SELECT * FROM users AS t WHERE t.score > 2.0");
    }
}
