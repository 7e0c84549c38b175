//! Executes compiled queries against PostgreSQL.
//!
//! A query whose sources are all literal is translated once, at compile
//! time. A query that scans a source passed in as an argument is translated
//! on every call, after that argument has been substituted.
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use deadpool_postgres::Pool;
use tokio::runtime::Runtime;
use tokio_postgres::types::{ToSql, Type};
use tracing::{debug, info};

use super::connection::{create_pool, ConnectionConfig};
use super::language::PostgresLanguage;
use super::types::{bind_value, parse_rows, require_parameter_type, BoxedParam, PostgresTypeMap};
use crate::ast::evaluator::{fold_closed_subtrees, substitute_parameters};
use crate::ast::{Expr, Lambda, ParameterDecl, QuerySource, Value};
use crate::compiled::{NativeQuery, QueryProvider};
use crate::language::{QueryLanguage, Translator};

/// Where a statement parameter gets its value.
#[derive(Debug, Clone)]
enum Binding {
    /// Position in the invocation arguments.
    Argument(usize),
    Constant(Value),
}

/// A formatted statement with its parameter types resolved.
#[derive(Debug, Clone)]
pub struct PreparedCommand {
    pub sql: String,
    types: Vec<Type>,
    bindings: Vec<Binding>,
}

impl PreparedCommand {
    pub fn parameter_types(&self) -> &[Type] {
        &self.types
    }

    fn bind(&self, args: &[Value]) -> Result<Vec<BoxedParam>> {
        self.bindings
            .iter()
            .zip(&self.types)
            .map(|(binding, ty)| match binding {
                Binding::Argument(i) => {
                    let value = args
                        .get(*i)
                        .ok_or_else(|| anyhow!("missing argument {}", i))?;
                    bind_value(value, ty)
                }
                Binding::Constant(value) => bind_value(value, ty),
            })
            .collect()
    }
}

/// Translate and format `query`, resolving every parameter to an argument
/// position or a constant.
fn prepare(translator: &Translator, types: &PostgresTypeMap, query: &Lambda) -> Result<PreparedCommand> {
    let translated = translator.translate(Expr::Lambda(query.clone()))?;
    let command = translator.format(&translated)?;

    let mut param_types = Vec::with_capacity(command.parameters.len());
    let mut bindings = Vec::with_capacity(command.parameters.len());
    for parameter in &command.parameters {
        param_types.push(require_parameter_type(types, &parameter.ty)?.clone());
        let binding = match &parameter.value {
            Some(value) => Binding::Constant(value.clone()),
            None => {
                let position = query
                    .params
                    .iter()
                    .position(|p| p.name == parameter.name)
                    .ok_or_else(|| anyhow!("parameter '{}' is not declared", parameter.name))?;
                Binding::Argument(position)
            }
        };
        bindings.push(binding);
    }
    Ok(PreparedCommand {
        sql: command.sql,
        types: param_types,
        bindings,
    })
}

/// True if some scan reads from something other than a literal source.
fn has_dynamic_source(expr: &Expr) -> bool {
    expr.any(&|e| matches!(e, Expr::Scan { source, .. } if !source.is_constant()))
}

/// Substitute the queryable arguments into `query` and fold, leaving the
/// scalar parameters in place.
fn bind_sources(query: &Lambda, args: &[Value]) -> Lambda {
    let (params, values): (Vec<ParameterDecl>, Vec<Value>) = query
        .params
        .iter()
        .zip(args)
        .filter(|(p, _)| p.ty.is_queryable())
        .map(|(p, v)| (p.clone(), v.clone()))
        .unzip();
    let body = substitute_parameters((*query.body).clone(), &params, &values);
    Lambda::new(query.params.clone(), fold_closed_subtrees(body))
}

/// Invocations block the calling thread on the provider's own runtime, so
/// they must not be made from inside an async task.
pub struct PostgresProvider {
    pool: Pool,
    runtime: Arc<Runtime>,
    translator: Translator,
    types: Arc<PostgresTypeMap>,
}

impl PostgresProvider {
    /// Provider using the PostgreSQL dialect.
    pub fn new(pool: Pool, runtime: Arc<Runtime>) -> crate::error::Result<Self> {
        let language: Arc<dyn QueryLanguage> = Arc::new(PostgresLanguage::new());
        Self::with_translator(pool, runtime, Translator::new(language))
    }

    /// Provider with a custom translator, e.g. one from a plugin registry.
    /// Fails if the translator's type system maps to types PostgreSQL
    /// cannot bind.
    pub fn with_translator(
        pool: Pool,
        runtime: Arc<Runtime>,
        translator: Translator,
    ) -> crate::error::Result<Self> {
        let types = PostgresTypeMap::new(translator.language().type_system())?;
        Ok(Self {
            pool,
            runtime,
            translator,
            types: Arc::new(types),
        })
    }

    /// Build the pool and a dedicated runtime from `config`.
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to create runtime for PostgreSQL provider")?;
        let pool = create_pool(config)?;
        Ok(Self::new(pool, Arc::new(runtime))?)
    }

    pub fn source(self: &Arc<Self>, table: impl Into<String>) -> QuerySource {
        QuerySource::bound(table, self.clone())
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    /// The statement this provider would send for `query`.
    pub fn prepare(&self, query: &Lambda) -> Result<PreparedCommand> {
        prepare(&self.translator, &self.types, query)
    }
}

impl QueryProvider for PostgresProvider {
    fn name(&self) -> &str {
        "postgres"
    }

    fn execute(&self, query: &Lambda) -> Result<NativeQuery> {
        let fixed = if has_dynamic_source(&query.body) {
            debug!("query scans an argument source, translating per call");
            None
        } else {
            let prepared = self.prepare(query)?;
            info!(sql = %prepared.sql, "compiled PostgreSQL query");
            Some(Arc::new(prepared))
        };

        let pool = self.pool.clone();
        let runtime = self.runtime.clone();
        let translator = self.translator.clone();
        let types = self.types.clone();
        let query = Arc::new(query.clone());
        let arity = query.arity();

        let run = move |args: &[Value]| -> Result<Value> {
            let command = match &fixed {
                Some(command) => command.clone(),
                None => Arc::new(prepare(&translator, &types, &bind_sources(&query, args))?),
            };
            let params = command.bind(args)?;
            let refs: Vec<&(dyn ToSql + Sync)> = params
                .iter()
                .map(|p| p.as_ref() as &(dyn ToSql + Sync))
                .collect();

            let rows = runtime.block_on(async {
                let client = pool
                    .get()
                    .await
                    .context("Failed to check out a PostgreSQL connection")?;
                let statement = client
                    .prepare_typed_cached(&command.sql, &command.types)
                    .await?;
                let rows = client.query(&statement, &refs).await?;
                Ok::<_, anyhow::Error>(rows)
            })?;
            debug!(rows = rows.len(), "query returned");
            Ok(Value::Rows(parse_rows(&rows)))
        };
        Ok(NativeQuery::for_arity(arity, Arc::new(run)))
    }
}
