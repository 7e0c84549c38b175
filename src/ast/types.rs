//! Portable query tree types for sqlweave.
//!
//! This module defines the tree every stage of the pipeline consumes: the
//! rewrite passes, the SQL formatter, provider resolution and the in-memory
//! interpreter. The tree is designed to be:
//! - Immutable-friendly (clone-based transformations, no in-place mutation of shared trees)
//! - Typed (every node reports the logical type of the value it produces)
//! - Relational (Scan / Filter / Projection / Ordering / Limit / Join / SetOp over scalar expressions)
use std::fmt;

use super::value::{QuerySource, Value};

/// Logical type carried by every node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Bool,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Bytes,
    Date,
    Time,
    DateTime,
    /// A host-side object with named members, e.g. a captured context.
    Record(String),
    /// The row shape of a named table or projection.
    Row(String),
    /// A sequence of rows produced by a relational node.
    Sequence(Box<LogicalType>),
    /// A queryable source (table) yielding rows of the given shape.
    Queryable(Box<LogicalType>),
    /// An execution backend.
    Provider,
}

impl LogicalType {
    /// Scalar types a backend must be able to bind as parameters.
    pub const SCALARS: [LogicalType; 11] = [
        LogicalType::Bool,
        LogicalType::Int16,
        LogicalType::Int32,
        LogicalType::Int64,
        LogicalType::Float32,
        LogicalType::Float64,
        LogicalType::String,
        LogicalType::Bytes,
        LogicalType::Date,
        LogicalType::Time,
        LogicalType::DateTime,
    ];

    pub fn sequence_of(row: impl Into<String>) -> Self {
        LogicalType::Sequence(Box::new(LogicalType::Row(row.into())))
    }

    pub fn queryable_of(row: impl Into<String>) -> Self {
        LogicalType::Queryable(Box::new(LogicalType::Row(row.into())))
    }

    pub fn is_provider(&self) -> bool {
        matches!(self, LogicalType::Provider)
    }

    pub fn is_queryable(&self) -> bool {
        matches!(self, LogicalType::Queryable(_))
    }

    pub fn is_scalar(&self) -> bool {
        Self::SCALARS.contains(self)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, LogicalType::Float32 | LogicalType::Float64)
    }

    /// Result type of arithmetic over `left` and `right`: the wider integer,
    /// or a float as soon as either side is one. Non-numeric operands keep
    /// the left type.
    pub fn arithmetic_result(left: LogicalType, right: LogicalType) -> LogicalType {
        if !left.is_numeric() || !right.is_numeric() {
            return left;
        }
        match (&left, &right) {
            (LogicalType::Float32, LogicalType::Float32) => LogicalType::Float32,
            (l, r) if l.is_float() || r.is_float() => LogicalType::Float64,
            (LogicalType::Int64, _) | (_, LogicalType::Int64) => LogicalType::Int64,
            (LogicalType::Int32, _) | (_, LogicalType::Int32) => LogicalType::Int32,
            _ => left,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            LogicalType::Int16
                | LogicalType::Int32
                | LogicalType::Int64
                | LogicalType::Float32
                | LogicalType::Float64
        )
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Bool => write!(f, "bool"),
            LogicalType::Int16 => write!(f, "int16"),
            LogicalType::Int32 => write!(f, "int32"),
            LogicalType::Int64 => write!(f, "int64"),
            LogicalType::Float32 => write!(f, "float32"),
            LogicalType::Float64 => write!(f, "float64"),
            LogicalType::String => write!(f, "string"),
            LogicalType::Bytes => write!(f, "bytes"),
            LogicalType::Date => write!(f, "date"),
            LogicalType::Time => write!(f, "time"),
            LogicalType::DateTime => write!(f, "datetime"),
            LogicalType::Record(name) => write!(f, "record<{}>", name),
            LogicalType::Row(name) => write!(f, "row<{}>", name),
            LogicalType::Sequence(elem) => write!(f, "sequence<{}>", elem),
            LogicalType::Queryable(elem) => write!(f, "queryable<{}>", elem),
            LogicalType::Provider => write!(f, "provider"),
        }
    }
}

/// Node kind, used to identify the offending node in errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Constant,
    Parameter,
    MemberAccess,
    Column,
    Binary,
    Unary,
    FunctionCall,
    Aggregate,
    Lambda,
    Scan,
    Filter,
    Projection,
    Ordering,
    Limit,
    Join,
    SetOp,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Constant => "Constant",
            NodeKind::Parameter => "ParameterRef",
            NodeKind::MemberAccess => "MemberAccess",
            NodeKind::Column => "Column",
            NodeKind::Binary => "Binary",
            NodeKind::Unary => "Unary",
            NodeKind::FunctionCall => "FunctionCall",
            NodeKind::Aggregate => "Aggregate",
            NodeKind::Lambda => "Lambda",
            NodeKind::Scan => "Scan",
            NodeKind::Filter => "Filter",
            NodeKind::Projection => "Projection",
            NodeKind::Ordering => "Ordering",
            NodeKind::Limit => "Limit",
            NodeKind::Join => "Join",
            NodeKind::SetOp => "SetOp",
        };
        f.write_str(name)
    }
}

/// Core expression type. Recursive to support arbitrary nesting.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value.
    Constant { value: Value, ty: LogicalType },
    /// Reference to a formal parameter of an enclosing lambda.
    Parameter { name: String, ty: LogicalType },
    /// `target.member` on a record value.
    Member {
        target: Box<Expr>,
        member: String,
        ty: LogicalType,
    },
    /// Column of an aliased relation: `alias.name`.
    Column {
        alias: String,
        name: String,
        ty: LogicalType,
    },
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
        ty: LogicalType,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expr>,
        ty: LogicalType,
    },
    /// Function call: `name(args)`.
    Function {
        name: String,
        args: Vec<Expr>,
        ty: LogicalType,
    },
    /// Aggregate over the rows of a group. `arg: None` means `*`.
    Aggregate {
        func: AggregateFunction,
        arg: Option<Box<Expr>>,
        distinct: bool,
        ty: LogicalType,
    },
    Lambda(Lambda),
    /// `FROM source AS alias`. The source has a queryable type.
    Scan {
        source: Box<Expr>,
        alias: String,
        ty: LogicalType,
    },
    Filter {
        input: Box<Expr>,
        predicate: Box<Expr>,
    },
    Projection(Box<Projection>),
    Ordering {
        input: Box<Expr>,
        keys: Vec<OrderKey>,
    },
    Limit {
        input: Box<Expr>,
        take: Option<Box<Expr>>,
        skip: Option<Box<Expr>>,
    },
    Join(Box<Join>),
    SetOp(Box<SetOperation>),
}

/// A lambda with ordered, typed formal parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<ParameterDecl>,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDecl {
    pub name: String,
    pub ty: LogicalType,
}

/// A projection: `SELECT [DISTINCT] columns FROM input [GROUP BY group_by]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub alias: String,
    pub input: Expr,
    pub columns: Vec<ColumnDecl>,
    pub distinct: bool,
    pub group_by: Vec<Expr>,
}

/// One projected column: `expr AS name`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDecl {
    pub name: String,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderKey {
    pub expr: Expr,
    pub direction: OrderDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub left: Expr,
    pub right: Expr,
    pub on: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

/// Set operations (UNION, INTERSECT, EXCEPT). Output columns are the left branch's.
#[derive(Debug, Clone, PartialEq)]
pub struct SetOperation {
    pub op: SetOperator,
    pub all: bool,
    pub left: Expr,
    pub right: Expr,
    pub alias: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    // String
    Like,
    Concat,
}

impl BinaryOperator {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::NotEq
                | BinaryOperator::Lt
                | BinaryOperator::LtEq
                | BinaryOperator::Gt
                | BinaryOperator::GtEq
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }

    /// The operator that gives the same result with swapped operands.
    pub fn flipped(self) -> Option<BinaryOperator> {
        match self {
            BinaryOperator::Eq => Some(BinaryOperator::Eq),
            BinaryOperator::NotEq => Some(BinaryOperator::NotEq),
            BinaryOperator::Lt => Some(BinaryOperator::Gt),
            BinaryOperator::LtEq => Some(BinaryOperator::GtEq),
            BinaryOperator::Gt => Some(BinaryOperator::Lt),
            BinaryOperator::GtEq => Some(BinaryOperator::LtEq),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateFunction {
    pub fn sql_name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Avg => "AVG",
        }
    }
}

/// A field of a mapped entity, used for dialect-supplied fragments.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: LogicalType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: LogicalType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl OrderKey {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            direction: OrderDirection::Ascending,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            direction: OrderDirection::Descending,
        }
    }
}

impl ColumnDecl {
    pub fn new(name: impl Into<String>, expr: Expr) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }
}

impl ParameterDecl {
    pub fn new(name: impl Into<String>, ty: LogicalType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// A reference to this parameter.
    pub fn to_ref(&self) -> Expr {
        Expr::param(self.name.clone(), self.ty.clone())
    }
}

impl Lambda {
    pub fn new(params: Vec<ParameterDecl>, body: Expr) -> Self {
        Self {
            params,
            body: Box::new(body),
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl Expr {
    pub fn kind(&self) -> NodeKind {
        match self {
            Expr::Constant { .. } => NodeKind::Constant,
            Expr::Parameter { .. } => NodeKind::Parameter,
            Expr::Member { .. } => NodeKind::MemberAccess,
            Expr::Column { .. } => NodeKind::Column,
            Expr::Binary { .. } => NodeKind::Binary,
            Expr::Unary { .. } => NodeKind::Unary,
            Expr::Function { .. } => NodeKind::FunctionCall,
            Expr::Aggregate { .. } => NodeKind::Aggregate,
            Expr::Lambda(_) => NodeKind::Lambda,
            Expr::Scan { .. } => NodeKind::Scan,
            Expr::Filter { .. } => NodeKind::Filter,
            Expr::Projection(_) => NodeKind::Projection,
            Expr::Ordering { .. } => NodeKind::Ordering,
            Expr::Limit { .. } => NodeKind::Limit,
            Expr::Join(_) => NodeKind::Join,
            Expr::SetOp(_) => NodeKind::SetOp,
        }
    }

    /// The logical type of the value this node produces.
    pub fn ty(&self) -> LogicalType {
        match self {
            Expr::Constant { ty, .. }
            | Expr::Parameter { ty, .. }
            | Expr::Member { ty, .. }
            | Expr::Column { ty, .. }
            | Expr::Binary { ty, .. }
            | Expr::Unary { ty, .. }
            | Expr::Function { ty, .. }
            | Expr::Aggregate { ty, .. }
            | Expr::Scan { ty, .. } => ty.clone(),
            Expr::Lambda(lambda) => lambda.body.ty(),
            Expr::Filter { input, .. } | Expr::Ordering { input, .. } | Expr::Limit { input, .. } => {
                input.ty()
            }
            Expr::Projection(p) => LogicalType::sequence_of(p.alias.clone()),
            Expr::Join(j) => {
                LogicalType::sequence_of(format!("{}+{}", row_name(&j.left), row_name(&j.right)))
            }
            Expr::SetOp(s) => LogicalType::sequence_of(s.alias.clone()),
        }
    }

    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            Expr::Scan { .. }
                | Expr::Filter { .. }
                | Expr::Projection(_)
                | Expr::Ordering { .. }
                | Expr::Limit { .. }
                | Expr::Join(_)
                | Expr::SetOp(_)
        )
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Constant { .. })
    }

    /// Direct children in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Constant { .. } | Expr::Parameter { .. } | Expr::Column { .. } => vec![],
            Expr::Member { target, .. } => vec![target],
            Expr::Binary { left, right, .. } => vec![left, right],
            Expr::Unary { operand, .. } => vec![operand],
            Expr::Function { args, .. } => args.iter().collect(),
            Expr::Aggregate { arg, .. } => arg.iter().map(|a| a.as_ref()).collect(),
            Expr::Lambda(lambda) => vec![&lambda.body],
            Expr::Scan { source, .. } => vec![source],
            Expr::Filter { input, predicate } => vec![input, predicate],
            Expr::Projection(p) => {
                let mut out = vec![&p.input];
                out.extend(p.columns.iter().map(|c| &c.expr));
                out.extend(p.group_by.iter());
                out
            }
            Expr::Ordering { input, keys } => {
                let mut out = vec![input.as_ref()];
                out.extend(keys.iter().map(|k| &k.expr));
                out
            }
            Expr::Limit { input, take, skip } => {
                let mut out = vec![input.as_ref()];
                out.extend(take.iter().map(|t| t.as_ref()));
                out.extend(skip.iter().map(|s| s.as_ref()));
                out
            }
            Expr::Join(j) => {
                let mut out = vec![&j.left, &j.right];
                out.extend(j.on.iter());
                out
            }
            Expr::SetOp(s) => vec![&s.left, &s.right],
        }
    }

    /// Rebuild this node with every direct child replaced by `f(child)`.
    pub fn try_map_children<E>(self, f: &mut impl FnMut(Expr) -> Result<Expr, E>) -> Result<Expr, E> {
        let mapped = match self {
            leaf @ (Expr::Constant { .. } | Expr::Parameter { .. } | Expr::Column { .. }) => leaf,
            Expr::Member { target, member, ty } => Expr::Member {
                target: Box::new(f(*target)?),
                member,
                ty,
            },
            Expr::Binary { op, left, right, ty } => Expr::Binary {
                op,
                left: Box::new(f(*left)?),
                right: Box::new(f(*right)?),
                ty,
            },
            Expr::Unary { op, operand, ty } => Expr::Unary {
                op,
                operand: Box::new(f(*operand)?),
                ty,
            },
            Expr::Function { name, args, ty } => Expr::Function {
                name,
                args: args.into_iter().map(&mut *f).collect::<Result<_, _>>()?,
                ty,
            },
            Expr::Aggregate {
                func,
                arg,
                distinct,
                ty,
            } => Expr::Aggregate {
                func,
                arg: match arg {
                    Some(a) => Some(Box::new(f(*a)?)),
                    None => None,
                },
                distinct,
                ty,
            },
            Expr::Lambda(lambda) => Expr::Lambda(Lambda {
                params: lambda.params,
                body: Box::new(f(*lambda.body)?),
            }),
            Expr::Scan { source, alias, ty } => Expr::Scan {
                source: Box::new(f(*source)?),
                alias,
                ty,
            },
            Expr::Filter { input, predicate } => Expr::Filter {
                input: Box::new(f(*input)?),
                predicate: Box::new(f(*predicate)?),
            },
            Expr::Projection(p) => {
                let p = *p;
                Expr::Projection(Box::new(Projection {
                    alias: p.alias,
                    input: f(p.input)?,
                    columns: p
                        .columns
                        .into_iter()
                        .map(|c| Ok(ColumnDecl::new(c.name, f(c.expr)?)))
                        .collect::<Result<_, E>>()?,
                    distinct: p.distinct,
                    group_by: p.group_by.into_iter().map(&mut *f).collect::<Result<_, _>>()?,
                }))
            }
            Expr::Ordering { input, keys } => Expr::Ordering {
                input: Box::new(f(*input)?),
                keys: keys
                    .into_iter()
                    .map(|k| {
                        Ok(OrderKey {
                            expr: f(k.expr)?,
                            direction: k.direction,
                        })
                    })
                    .collect::<Result<_, E>>()?,
            },
            Expr::Limit { input, take, skip } => Expr::Limit {
                input: Box::new(f(*input)?),
                take: match take {
                    Some(t) => Some(Box::new(f(*t)?)),
                    None => None,
                },
                skip: match skip {
                    Some(s) => Some(Box::new(f(*s)?)),
                    None => None,
                },
            },
            Expr::Join(j) => {
                let j = *j;
                Expr::Join(Box::new(Join {
                    kind: j.kind,
                    left: f(j.left)?,
                    right: f(j.right)?,
                    on: match j.on {
                        Some(on) => Some(f(on)?),
                        None => None,
                    },
                }))
            }
            Expr::SetOp(s) => {
                let s = *s;
                Expr::SetOp(Box::new(SetOperation {
                    op: s.op,
                    all: s.all,
                    left: f(s.left)?,
                    right: f(s.right)?,
                    alias: s.alias,
                }))
            }
        };
        Ok(mapped)
    }

    /// Infallible variant of [`Expr::try_map_children`].
    pub fn map_children(self, mut f: impl FnMut(Expr) -> Expr) -> Expr {
        match self.try_map_children::<std::convert::Infallible>(&mut |e| Ok(f(e))) {
            Ok(expr) => expr,
            Err(never) => match never {},
        }
    }

    /// Rebuild the tree bottom-up, applying `f` to every node after its children.
    pub fn transform_up(self, f: &mut impl FnMut(Expr) -> Expr) -> Expr {
        let rebuilt = self.map_children(|child| child.transform_up(f));
        f(rebuilt)
    }

    /// True if `pred` holds for this node or any descendant.
    pub fn any(&self, pred: &impl Fn(&Expr) -> bool) -> bool {
        pred(self) || self.children().into_iter().any(|c| c.any(pred))
    }

    // ------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------

    pub fn constant(value: impl Into<Value>, ty: LogicalType) -> Self {
        Expr::Constant {
            value: value.into(),
            ty,
        }
    }

    pub fn null(ty: LogicalType) -> Self {
        Expr::Constant {
            value: Value::Null,
            ty,
        }
    }

    pub fn boolean(b: bool) -> Self {
        Expr::constant(b, LogicalType::Bool)
    }

    pub fn int(i: i64) -> Self {
        Expr::constant(i, LogicalType::Int64)
    }

    pub fn text(s: impl Into<String>) -> Self {
        Expr::constant(Value::Text(s.into()), LogicalType::String)
    }

    /// A literal queryable source.
    pub fn source(source: QuerySource) -> Self {
        let ty = LogicalType::queryable_of(source.table.clone());
        Expr::Constant {
            value: Value::Source(source),
            ty,
        }
    }

    pub fn param(name: impl Into<String>, ty: LogicalType) -> Self {
        Expr::Parameter {
            name: name.into(),
            ty,
        }
    }

    pub fn column(alias: impl Into<String>, name: impl Into<String>, ty: LogicalType) -> Self {
        Expr::Column {
            alias: alias.into(),
            name: name.into(),
            ty,
        }
    }

    pub fn member(self, member: impl Into<String>, ty: LogicalType) -> Self {
        Expr::Member {
            target: Box::new(self),
            member: member.into(),
            ty,
        }
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>, ty: LogicalType) -> Self {
        Expr::Function {
            name: name.into(),
            args,
            ty,
        }
    }

    pub fn aggregate(func: AggregateFunction, arg: Option<Expr>, distinct: bool) -> Self {
        let ty = match (func, &arg) {
            (AggregateFunction::Count, _) => LogicalType::Int64,
            (AggregateFunction::Avg, _) => LogicalType::Float64,
            (_, Some(a)) => a.ty(),
            (_, None) => LogicalType::Int64,
        };
        Expr::Aggregate {
            func,
            arg: arg.map(Box::new),
            distinct,
            ty,
        }
    }

    pub fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Self {
        let ty = if op.is_comparison() || op.is_logical() || op == BinaryOperator::Like {
            LogicalType::Bool
        } else if op == BinaryOperator::Concat {
            LogicalType::String
        } else {
            LogicalType::arithmetic_result(left.ty(), right.ty())
        };
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            ty,
        }
    }

    pub fn unary(op: UnaryOperator, operand: Expr) -> Self {
        let ty = match op {
            UnaryOperator::Negate => operand.ty(),
            _ => LogicalType::Bool,
        };
        Expr::Unary {
            op,
            operand: Box::new(operand),
            ty,
        }
    }

    pub fn eq(self, right: Expr) -> Self {
        Expr::binary(BinaryOperator::Eq, self, right)
    }

    pub fn gt(self, right: Expr) -> Self {
        Expr::binary(BinaryOperator::Gt, self, right)
    }

    pub fn lt(self, right: Expr) -> Self {
        Expr::binary(BinaryOperator::Lt, self, right)
    }

    pub fn and(self, right: Expr) -> Self {
        Expr::binary(BinaryOperator::And, self, right)
    }

    pub fn not(self) -> Self {
        Expr::unary(UnaryOperator::Not, self)
    }

    /// `FROM self AS alias`; `self` must be a queryable source.
    pub fn scan(self, alias: impl Into<String>) -> Self {
        let ty = match self.ty() {
            LogicalType::Queryable(row) => LogicalType::Sequence(row),
            other => LogicalType::Sequence(Box::new(other)),
        };
        Expr::Scan {
            source: Box::new(self),
            alias: alias.into(),
            ty,
        }
    }

    pub fn filter(self, predicate: Expr) -> Self {
        Expr::Filter {
            input: Box::new(self),
            predicate: Box::new(predicate),
        }
    }

    pub fn order_by(self, keys: Vec<OrderKey>) -> Self {
        Expr::Ordering {
            input: Box::new(self),
            keys,
        }
    }

    pub fn take(self, n: i64) -> Self {
        Expr::Limit {
            input: Box::new(self),
            take: Some(Box::new(Expr::int(n))),
            skip: None,
        }
    }

    pub fn skip(self, n: i64) -> Self {
        Expr::Limit {
            input: Box::new(self),
            take: None,
            skip: Some(Box::new(Expr::int(n))),
        }
    }

    pub fn project(self, alias: impl Into<String>, columns: Vec<ColumnDecl>) -> Self {
        Expr::Projection(Box::new(Projection {
            alias: alias.into(),
            input: self,
            columns,
            distinct: false,
            group_by: vec![],
        }))
    }

    pub fn project_distinct(self, alias: impl Into<String>, columns: Vec<ColumnDecl>) -> Self {
        Expr::Projection(Box::new(Projection {
            alias: alias.into(),
            input: self,
            columns,
            distinct: true,
            group_by: vec![],
        }))
    }

    pub fn join(self, kind: JoinKind, right: Expr, on: Option<Expr>) -> Self {
        Expr::Join(Box::new(Join {
            kind,
            left: self,
            right,
            on,
        }))
    }

    pub fn set_op(self, op: SetOperator, all: bool, right: Expr, alias: impl Into<String>) -> Self {
        Expr::SetOp(Box::new(SetOperation {
            op,
            all,
            left: self,
            right,
            alias: alias.into(),
        }))
    }
}

fn row_name(expr: &Expr) -> String {
    match expr.ty() {
        LogicalType::Sequence(row) => match *row {
            LogicalType::Row(name) => name,
            other => other.to_string(),
        },
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Expr {
        Expr::source(QuerySource::new("users")).scan("u")
    }

    #[test]
    fn test_arithmetic_promotes_operand_types() {
        let int = Expr::column("u", "id", LogicalType::Int32);
        let float = Expr::constant(2.5, LogicalType::Float64);
        let sum = Expr::binary(BinaryOperator::Plus, int.clone(), float.clone());
        assert_eq!(sum.ty(), LogicalType::Float64);
        let sum = Expr::binary(BinaryOperator::Plus, float, int.clone());
        assert_eq!(sum.ty(), LogicalType::Float64);
        let wide = Expr::binary(BinaryOperator::Multiply, int.clone(), Expr::int(3));
        assert_eq!(wide.ty(), LogicalType::Int64);
        let narrow = Expr::binary(BinaryOperator::Minus, int.clone(), int);
        assert_eq!(narrow.ty(), LogicalType::Int32);
    }

    #[test]
    fn test_scan_type_is_sequence_of_row() {
        let scan = users();
        assert_eq!(scan.ty(), LogicalType::sequence_of("users"));
        assert_eq!(scan.kind(), NodeKind::Scan);
        assert!(scan.is_relational());
    }

    #[test]
    fn test_source_constant_is_queryable() {
        let source = Expr::source(QuerySource::new("users"));
        assert!(source.ty().is_queryable());
        assert!(source.is_constant());
    }

    #[test]
    fn test_comparison_builder_is_bool() {
        let pred = Expr::column("u", "age", LogicalType::Int32).gt(Expr::int(18));
        assert_eq!(pred.ty(), LogicalType::Bool);
    }

    #[test]
    fn test_transparent_nodes_keep_input_type() {
        let q = users()
            .filter(Expr::boolean(true))
            .order_by(vec![OrderKey::asc(Expr::column("u", "id", LogicalType::Int64))]);
        assert_eq!(q.ty(), LogicalType::sequence_of("users"));
    }

    #[test]
    fn test_projection_type_uses_alias() {
        let q = users().project(
            "p",
            vec![ColumnDecl::new("id", Expr::column("u", "id", LogicalType::Int64))],
        );
        assert_eq!(q.ty(), LogicalType::sequence_of("p"));
    }

    #[test]
    fn test_transform_up_rebuilds_without_mutating_original() {
        let original = users().filter(Expr::int(1).eq(Expr::int(1)));
        let rewritten = original.clone().transform_up(&mut |e| match e {
            Expr::Constant {
                value: Value::Int(1),
                ty,
            } => Expr::Constant {
                value: Value::Int(2),
                ty,
            },
            other => other,
        });
        assert_ne!(original, rewritten);
        assert!(original.any(&|e| matches!(e, Expr::Constant { value: Value::Int(1), .. })));
        assert!(!rewritten.any(&|e| matches!(e, Expr::Constant { value: Value::Int(1), .. })));
    }

    #[test]
    fn test_children_order() {
        let q = users().filter(Expr::boolean(true));
        let kinds: Vec<NodeKind> = q.children().iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, vec![NodeKind::Scan, NodeKind::Constant]);
    }

    #[test]
    fn test_flipped_operators() {
        assert_eq!(BinaryOperator::Lt.flipped(), Some(BinaryOperator::Gt));
        assert_eq!(BinaryOperator::GtEq.flipped(), Some(BinaryOperator::LtEq));
        assert_eq!(BinaryOperator::Plus.flipped(), None);
    }

    #[test]
    fn test_lambda_arity() {
        let lambda = Lambda::new(
            vec![ParameterDecl::new("p", LogicalType::Int64)],
            users(),
        );
        assert_eq!(lambda.arity(), 1);
    }
}
