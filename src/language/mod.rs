//! Dialects and the per-dialect translation pipeline.
//!
//! ```text
//! query tree
//!       ↓
//! Ordering normalization   (ast/ordering.rs, gated by dialect flags)
//!       ↓
//! Generic lowering         (ast/optimizer.rs)
//!       ↓
//! Plug-in lowering passes  (ast/plugin.rs)
//!       ↓
//! Dead-column elimination  (ast/columns.rs)
//!       ↓
//! SQL formatter            (ast/formatter.rs)
//! ```
pub mod generic;
pub mod types;

use std::sync::Arc;

use tracing::debug;

use crate::ast::columns::DeadColumnElimination;
use crate::ast::formatter::{self, SqlCommand};
use crate::ast::optimizer::{GenericLowering, Optimizer, RewritePass};
use crate::ast::ordering::OrderingNormalizer;
use crate::ast::{Expr, Field, Lambda};
use crate::error::Result;

pub use generic::{DialectConfig, GenericLanguage, PlaceholderStyle, QuoteStyle};
pub use types::{DbQueryType, DbTypeSystem, QueryTypeSystem, SqlType};

/// Per-backend policy: capability flags, quoting, placeholders, type mapping
/// and dialect-specific node factories. Implementations hold only immutable
/// configuration and are shared across threads.
pub trait QueryLanguage: Send + Sync {
    fn name(&self) -> &str;

    fn type_system(&self) -> &dyn QueryTypeSystem;

    fn allows_multiple_statements(&self) -> bool;

    fn allows_distinct_in_aggregates(&self) -> bool;

    /// Quote an identifier. Backends without special quoting return it as is.
    fn quote(&self, identifier: &str) -> String {
        identifier.to_string()
    }

    /// Placeholder text for the `index`-th (1-based) parameter.
    fn parameter_placeholder(&self, index: usize, name: &str) -> String;

    /// Expression yielding the value the backend just generated for `field`.
    fn generated_id_expression(&self, field: &Field) -> Expr;

    /// Expression yielding the number of rows the last statement affected.
    fn rows_affected_expression(&self) -> Expr;

    fn is_rows_affected_expression(&self, expr: &Expr) -> bool;

    fn create_translator(self: Arc<Self>) -> Translator;
}

/// Rewrite passes plus formatter for one dialect.
#[derive(Clone)]
pub struct Translator {
    language: Arc<dyn QueryLanguage>,
    optimizer: Optimizer,
}

impl Translator {
    pub fn new(language: Arc<dyn QueryLanguage>) -> Self {
        Self::with_passes(language, Vec::new())
    }

    /// Build the fixed pipeline with `extra` lowering passes between generic
    /// lowering and dead-column elimination.
    pub fn with_passes(language: Arc<dyn QueryLanguage>, extra: Vec<Arc<dyn RewritePass>>) -> Self {
        let mut optimizer = Optimizer::new();
        optimizer.add_pass(Arc::new(OrderingNormalizer::new(
            language.allows_distinct_in_aggregates(),
        )));
        optimizer.add_pass(Arc::new(GenericLowering));
        for pass in extra {
            optimizer.add_pass(pass);
        }
        optimizer.add_pass(Arc::new(DeadColumnElimination));
        Self {
            language,
            optimizer,
        }
    }

    pub fn language(&self) -> &Arc<dyn QueryLanguage> {
        &self.language
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.optimizer.pass_names()
    }

    /// Run every rewrite pass. A lambda keeps its parameters; only the body
    /// is rewritten.
    pub fn translate(&self, expr: Expr) -> Result<Expr> {
        match expr {
            Expr::Lambda(lambda) => {
                let body = self.optimizer.optimize(*lambda.body)?;
                Ok(Expr::Lambda(Lambda::new(lambda.params, body)))
            }
            other => self.optimizer.optimize(other),
        }
    }

    pub fn format(&self, expr: &Expr) -> Result<SqlCommand> {
        formatter::format_query(expr, self.language.as_ref())
    }

    pub fn format_batch(&self, exprs: &[Expr]) -> Result<SqlCommand> {
        formatter::format_batch(exprs, self.language.as_ref())
    }

    /// Translate and format in one step.
    pub fn to_sql(&self, expr: Expr) -> Result<SqlCommand> {
        let translated = self.translate(expr)?;
        let command = self.format(&translated)?;
        debug!(dialect = self.language.name(), sql = %command.sql, "translated query");
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ColumnDecl, LogicalType, OrderKey, ParameterDecl, QuerySource};

    fn language(distinct_aggregates: bool) -> Arc<GenericLanguage> {
        Arc::new(GenericLanguage::new(DialectConfig {
            name: "test".into(),
            allows_distinct_in_aggregates: distinct_aggregates,
            ..DialectConfig::default()
        }))
    }

    fn t() -> Expr {
        Expr::source(QuerySource::new("T")).scan("t")
    }

    fn col(name: &str) -> Expr {
        Expr::column("t", name, LogicalType::Int64)
    }

    fn distinct_ab_ordered_by_c() -> Expr {
        t().order_by(vec![OrderKey::asc(col("c"))]).project_distinct(
            "p",
            vec![ColumnDecl::new("a", col("a")), ColumnDecl::new("b", col("b"))],
        )
    }

    #[test]
    fn test_pipeline_order() {
        let translator = language(true).create_translator();
        assert_eq!(
            translator.pass_names(),
            vec![
                "ordering_normalization",
                "generic_lowering",
                "dead_column_elimination"
            ]
        );
    }

    #[test]
    fn test_distinct_order_with_aggregate_support() {
        let translator = language(true).create_translator();
        let cmd = translator.to_sql(distinct_ab_ordered_by_c()).unwrap();
        assert_eq!(
            cmd.sql,
            "SELECT t.a, t.b, MIN(t.c) AS c FROM T AS t GROUP BY t.a, t.b ORDER BY c"
        );
    }

    #[test]
    fn test_distinct_order_without_aggregate_support() {
        let translator = language(false).create_translator();
        let cmd = translator.to_sql(distinct_ab_ordered_by_c()).unwrap();
        assert_eq!(cmd.sql, "SELECT DISTINCT t.a, t.b, t.c FROM T AS t ORDER BY c");
    }

    #[test]
    fn test_translate_keeps_lambda_parameters() {
        let lambda = Expr::Lambda(Lambda::new(
            vec![ParameterDecl::new("p", LogicalType::Int64)],
            t().filter(col("id").eq(Expr::param("p", LogicalType::Int64))),
        ));
        let translator = language(true).create_translator();
        let translated = translator.translate(lambda).unwrap();
        match &translated {
            Expr::Lambda(l) => assert_eq!(l.params.len(), 1),
            other => panic!("expected lambda, got {:?}", other),
        }
        let cmd = translator.format(&translated).unwrap();
        assert_eq!(cmd.sql, "SELECT * FROM T AS t WHERE t.id = $1");
        assert_eq!(cmd.parameters[0].name, "p");
    }

    #[test]
    fn test_lifted_inner_ordering_survives_elimination() {
        let inner = t()
            .order_by(vec![OrderKey::asc(col("c"))])
            .project(
                "s",
                vec![ColumnDecl::new("a", col("a")), ColumnDecl::new("b", col("b"))],
            );
        let q = inner.project(
            "o",
            vec![ColumnDecl::new("a", Expr::column("s", "a", LogicalType::Int64))],
        );
        let cmd = language(true).create_translator().to_sql(q).unwrap();
        assert_eq!(
            cmd.sql,
            "SELECT s.a FROM (SELECT t.a, t.c FROM T AS t) AS s ORDER BY s.c"
        );
    }
}
