//! A dialect described entirely by configuration.
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::types::{DbTypeSystem, QueryTypeSystem};
use super::{QueryLanguage, Translator};
use crate::ast::{Expr, Field, LogicalType};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStyle {
    #[default]
    None,
    /// `"name"`
    Double,
    /// `` `name` ``
    Backtick,
    /// `[name]`
    Bracket,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderStyle {
    /// `$1`, `$2`, ...
    #[default]
    Dollar,
    /// `?`
    Question,
    /// `@name`
    Named,
}

/// Dialect descriptor as it appears in the engine configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DialectConfig {
    pub name: String,
    #[serde(default)]
    pub allows_multiple_statements: bool,
    #[serde(default)]
    pub allows_distinct_in_aggregates: bool,
    #[serde(default)]
    pub quote_style: QuoteStyle,
    #[serde(default)]
    pub placeholder_style: PlaceholderStyle,
    #[serde(default = "default_generated_id_function")]
    pub generated_id_function: String,
    #[serde(default = "default_rows_affected_function")]
    pub rows_affected_function: String,
}

fn default_generated_id_function() -> String {
    String::from("LAST_INSERT_ID")
}

fn default_rows_affected_function() -> String {
    String::from("ROW_COUNT")
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self {
            name: String::from("generic"),
            allows_multiple_statements: false,
            allows_distinct_in_aggregates: false,
            quote_style: QuoteStyle::default(),
            placeholder_style: PlaceholderStyle::default(),
            generated_id_function: default_generated_id_function(),
            rows_affected_function: default_rows_affected_function(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenericLanguage {
    config: DialectConfig,
    types: DbTypeSystem,
}

impl GenericLanguage {
    pub fn new(config: DialectConfig) -> Self {
        Self {
            config,
            types: DbTypeSystem,
        }
    }

    pub fn config(&self) -> &DialectConfig {
        &self.config
    }
}

impl QueryLanguage for GenericLanguage {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn type_system(&self) -> &dyn QueryTypeSystem {
        &self.types
    }

    fn allows_multiple_statements(&self) -> bool {
        self.config.allows_multiple_statements
    }

    fn allows_distinct_in_aggregates(&self) -> bool {
        self.config.allows_distinct_in_aggregates
    }

    fn quote(&self, identifier: &str) -> String {
        match self.config.quote_style {
            QuoteStyle::None => identifier.to_string(),
            QuoteStyle::Double => format!("\"{}\"", identifier.replace('"', "\"\"")),
            QuoteStyle::Backtick => format!("`{}`", identifier.replace('`', "``")),
            QuoteStyle::Bracket => format!("[{}]", identifier.replace(']', "]]")),
        }
    }

    fn parameter_placeholder(&self, index: usize, name: &str) -> String {
        match self.config.placeholder_style {
            PlaceholderStyle::Dollar => format!("${}", index),
            PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::Named => format!("@{}", name),
        }
    }

    fn generated_id_expression(&self, field: &Field) -> Expr {
        Expr::function(self.config.generated_id_function.clone(), vec![], field.ty.clone())
    }

    fn rows_affected_expression(&self) -> Expr {
        Expr::function(self.config.rows_affected_function.clone(), vec![], LogicalType::Int32)
    }

    fn is_rows_affected_expression(&self, expr: &Expr) -> bool {
        matches!(
            expr,
            Expr::Function { name, args, .. }
                if args.is_empty() && name.eq_ignore_ascii_case(&self.config.rows_affected_function)
        )
    }

    fn create_translator(self: Arc<Self>) -> Translator {
        Translator::new(self)
    }
}
