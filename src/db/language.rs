use std::sync::Arc;

use crate::ast::{Expr, Field, LogicalType};
use crate::language::{DbTypeSystem, QueryLanguage, QueryTypeSystem, Translator};

const GENERATED_ID_FUNCTION: &str = "LASTVAL";
const ROWS_AFFECTED_FUNCTION: &str = "ROW_COUNT";

/// PostgreSQL dialect: single statement per command, DISTINCT allowed in
/// aggregates, identifiers emitted as written, `$n` placeholders.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresLanguage {
    types: DbTypeSystem,
}

impl PostgresLanguage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueryLanguage for PostgresLanguage {
    fn name(&self) -> &str {
        "postgres"
    }

    fn type_system(&self) -> &dyn QueryTypeSystem {
        &self.types
    }

    fn allows_multiple_statements(&self) -> bool {
        false
    }

    fn allows_distinct_in_aggregates(&self) -> bool {
        true
    }

    fn parameter_placeholder(&self, index: usize, _name: &str) -> String {
        format!("${}", index)
    }

    /// `LASTVAL()`, the PostgreSQL spelling of MySQL's `LAST_INSERT_ID()`.
    fn generated_id_expression(&self, field: &Field) -> Expr {
        Expr::function(GENERATED_ID_FUNCTION, vec![], field.ty.clone())
    }

    fn rows_affected_expression(&self) -> Expr {
        Expr::function(ROWS_AFFECTED_FUNCTION, vec![], LogicalType::Int32)
    }

    fn is_rows_affected_expression(&self, expr: &Expr) -> bool {
        matches!(
            expr,
            Expr::Function { name, args, .. } if name == ROWS_AFFECTED_FUNCTION && args.is_empty()
        )
    }

    fn create_translator(self: Arc<Self>) -> Translator {
        Translator::new(self)
    }
}
