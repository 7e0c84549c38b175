/// In-memory execution backend.
///
/// Tables are plain row sets keyed by name. Compiling a query checks that
/// the tables it names exist and applies the same generic lowering the SQL
/// backends get, so `x = NULL` means `x IS NULL` here too. Each invocation
/// substitutes the arguments, folds what became closed and interprets the
/// tree.
pub mod interpreter;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::debug;

use crate::ast::evaluator::{fold_closed_subtrees, substitute_parameters};
use crate::ast::optimizer::GenericLowering;
use crate::ast::{Expr, Lambda, QuerySource, RewritePass, RowSet, Value};
use crate::compiled::{NativeQuery, QueryProvider};

#[derive(Debug, Default)]
pub struct MemoryProvider {
    tables: Arc<HashMap<String, RowSet>>,
    compilations: AtomicUsize,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, rows: RowSet) -> Self {
        Arc::make_mut(&mut self.tables).insert(name.into(), rows);
        self
    }

    pub fn table(&self, name: &str) -> Option<&RowSet> {
        self.tables.get(name)
    }

    /// A source for `table` bound to this provider.
    pub fn source(self: &Arc<Self>, table: impl Into<String>) -> QuerySource {
        QuerySource::bound(table, self.clone())
    }

    /// How many times `execute` has compiled a query.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::SeqCst)
    }
}

/// Table names of every literal source in the tree.
fn literal_tables(expr: &Expr, out: &mut Vec<String>) {
    if let Expr::Constant {
        value: Value::Source(source),
        ..
    } = expr
    {
        out.push(source.table.clone());
    }
    for child in expr.children() {
        literal_tables(child, out);
    }
}

impl QueryProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn execute(&self, query: &Lambda) -> Result<NativeQuery> {
        let mut referenced = Vec::new();
        literal_tables(&query.body, &mut referenced);
        for table in &referenced {
            if !self.tables.contains_key(table) {
                bail!("unknown table '{}'", table);
            }
        }

        let lowered = GenericLowering.transform((*query.body).clone())?;

        let n = self.compilations.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(arity = query.arity(), compilations = n, "compiled in-memory query");

        let tables = self.tables.clone();
        let query = Lambda::new(query.params.clone(), lowered);
        let arity = query.arity();
        let run = move |args: &[Value]| -> Result<Value> {
            let body = substitute_parameters((*query.body).clone(), &query.params, args);
            interpreter::run(&fold_closed_subtrees(body), &tables)
        };
        Ok(NativeQuery::for_arity(arity, Arc::new(run)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{LogicalType, OrderKey, ParameterDecl};
    use crate::compiled::{CompiledQuery, Resolution};
    use crate::error::QueryError;
    use crate::language::QueryLanguage;

    fn provider() -> Arc<MemoryProvider> {
        Arc::new(
            MemoryProvider::new().with_table(
                "users",
                RowSet::new(
                    vec!["id".into(), "name".into()],
                    vec![
                        vec![Value::Int(41), "ann".into()],
                        vec![Value::Int(42), "bob".into()],
                        vec![Value::Int(43), "cy".into()],
                    ],
                ),
            ),
        )
    }

    fn id_eq_p() -> Expr {
        Expr::column("x", "id", LogicalType::Int64).eq(Expr::param("p", LogicalType::Int64))
    }

    #[test]
    fn test_runtime_supplied_source() {
        let memory = provider();
        let params = vec![
            ParameterDecl::new("source", LogicalType::queryable_of("users")),
            ParameterDecl::new("p", LogicalType::Int64),
        ];
        let body = Expr::param("source", LogicalType::queryable_of("users"))
            .scan("x")
            .filter(id_eq_p());
        let q = CompiledQuery::new(Lambda::new(params, body));

        let out = q
            .invoke2(Value::Source(memory.source("users")), Value::Int(42))
            .unwrap();
        let rows = out.as_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.column_values("name"), vec![Value::from("bob")]);
        assert_eq!(q.plan().unwrap().resolution(), Resolution::Substitution);
    }

    #[test]
    fn test_unbound_source_fails_resolution() {
        let params = vec![
            ParameterDecl::new("source", LogicalType::queryable_of("users")),
            ParameterDecl::new("p", LogicalType::Int64),
        ];
        let body = Expr::param("source", LogicalType::queryable_of("users"))
            .scan("x")
            .filter(id_eq_p());
        let q = CompiledQuery::new(Lambda::new(params, body));

        let err = q
            .invoke2(Value::Source(QuerySource::new("users")), Value::Int(42))
            .unwrap_err();
        assert!(matches!(err, QueryError::ProviderResolution(_)));
    }

    #[test]
    fn test_literal_source_compiles_once() {
        let memory = provider();
        let body = Expr::source(memory.source("users"))
            .scan("x")
            .filter(id_eq_p())
            .order_by(vec![OrderKey::asc(Expr::column("x", "id", LogicalType::Int64))]);
        let q = CompiledQuery::new(Lambda::new(
            vec![ParameterDecl::new("p", LogicalType::Int64)],
            body,
        ));
        for id in [41, 43, 99] {
            let out = q.invoke1(Value::Int(id)).unwrap();
            let expected = usize::from(id != 99);
            assert_eq!(out.as_rows().unwrap().len(), expected);
        }
        assert_eq!(memory.compilations(), 1);
    }

    #[test]
    fn test_null_equality_matches_sql_backends() {
        let memory = Arc::new(MemoryProvider::new().with_table(
            "users",
            RowSet::new(
                vec!["id".into(), "name".into()],
                vec![
                    vec![Value::Int(1), Value::Null],
                    vec![Value::Int(2), "bob".into()],
                ],
            ),
        ));
        let name_is_null = |source: QuerySource| {
            Expr::source(source)
                .scan("u")
                .filter(Expr::column("u", "name", LogicalType::String).eq(Expr::null(LogicalType::String)))
        };

        let q = CompiledQuery::new(Lambda::new(vec![], name_is_null(memory.source("users"))));
        let out = q.invoke0().unwrap();
        assert_eq!(out.as_rows().unwrap().column_values("id"), vec![Value::Int(1)]);

        let translator = Arc::new(crate::db::PostgresLanguage::new()).create_translator();
        let sql = translator.to_sql(name_is_null(QuerySource::new("users"))).unwrap().sql;
        assert_eq!(sql, "SELECT * FROM users AS u WHERE u.name IS NULL");
    }

    #[test]
    fn test_unknown_table_is_compile_error() {
        let memory = provider();
        let body = Expr::source(memory.source("orders")).scan("o");
        let q = CompiledQuery::new(Lambda::new(vec![], body));
        let err = q.invoke0().unwrap_err();
        assert!(matches!(err, QueryError::BackendCompile(_)));
        assert_eq!(err.to_string(), "unknown table 'orders'");
        assert!(!q.is_compiled());
        assert_eq!(memory.compilations(), 0);
    }
}
