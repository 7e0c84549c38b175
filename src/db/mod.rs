//! PostgreSQL backend: dialect, parameter types, pooled connections and
//! the provider that runs compiled queries.
mod connection;
mod language;
mod provider;
mod types;

use std::sync::Arc;

use anyhow::Result;

use crate::ast::{PluginRegistry, QueryPlugin};
use crate::language::QueryLanguage;

pub use connection::*;
pub use language::*;
pub use provider::*;
pub use types::*;

/// Registers the PostgreSQL dialect.
pub struct PostgresPlugin;

impl QueryPlugin for PostgresPlugin {
    fn name(&self) -> &str {
        "postgres"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "PostgreSQL dialect and parameter types"
    }

    fn register(&self, registry: &mut PluginRegistry) -> Result<()> {
        let language = PostgresLanguage::new();
        // Reject a dialect whose types cannot be bound before anything uses it.
        PostgresTypeMap::new(language.type_system())?;
        registry.add_language(Arc::new(language));
        Ok(())
    }
}
