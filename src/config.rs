//! Engine configuration, read from `<config_dir>/sqlweave/config.toml`.
//!
//! ```toml
//! log_level = "debug"
//!
//! [[dialects]]
//! name = "mysql"
//! quote_style = "backtick"
//! placeholder_style = "question"
//!
//! [postgres]
//! host = "localhost"
//! port = 5432
//! database = "app"
//! username = "app"
//! ```
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::ast::PluginRegistry;
use crate::db::{ConnectionConfig, PostgresPlugin};
use crate::error::QueryError;
use crate::language::{DialectConfig, GenericLanguage};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Extra dialects built from descriptors.
    #[serde(default)]
    pub dialects: Vec<DialectConfig>,
    #[serde(default)]
    pub postgres: Option<ConnectionConfig>,
}

fn default_log_level() -> String {
    String::from("info")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dialects: Vec::new(),
            postgres: None,
        }
    }
}

impl EngineConfig {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sqlweave")
            .join("config.toml")
    }

    /// Load from the default location. A missing file gives the defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn level(&self) -> crate::error::Result<Level> {
        self.log_level.parse().map_err(|_| {
            QueryError::Configuration(format!("unknown log level '{}'", self.log_level))
        })
    }

    /// Install a global `tracing` subscriber at the configured level. Does
    /// nothing if one is already installed.
    pub fn init_logging(&self) -> crate::error::Result<()> {
        let level = self.level()?;
        let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
        Ok(())
    }

    /// A registry with the PostgreSQL plugin plus every configured dialect.
    /// A configured dialect replaces a built-in one of the same name.
    pub fn registry(&self) -> Result<PluginRegistry> {
        let mut registry = PluginRegistry::new();
        registry.load_plugin(Box::new(PostgresPlugin))?;
        for dialect in &self.dialects {
            if dialect.name.is_empty() {
                return Err(QueryError::Configuration("dialect without a name".into()).into());
            }
            registry.add_language(Arc::new(GenericLanguage::new(dialect.clone())));
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{PlaceholderStyle, QuoteStyle};

    const SAMPLE: &str = r#"
log_level = "debug"

[[dialects]]
name = "mysql"
quote_style = "backtick"
placeholder_style = "question"

[[dialects]]
name = "mssql"
allows_multiple_statements = true
quote_style = "bracket"
placeholder_style = "named"
generated_id_function = "SCOPE_IDENTITY"
rows_affected_function = "@@ROWCOUNT"

[postgres]
host = "db.internal"
port = 5433
database = "app"
username = "svc"
"#;

    #[test]
    fn test_parse_sample() {
        let config = EngineConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.level().unwrap(), Level::DEBUG);
        assert_eq!(config.dialects.len(), 2);
        assert_eq!(config.dialects[0].quote_style, QuoteStyle::Backtick);
        assert_eq!(config.dialects[1].placeholder_style, PlaceholderStyle::Named);
        assert_eq!(config.postgres.as_ref().unwrap().port, 5433);
    }

    #[test]
    fn test_empty_config_is_default() {
        let config = EngineConfig::parse("").unwrap();
        assert_eq!(config.log_level, "info");
        assert!(config.dialects.is_empty());
        assert!(config.postgres.is_none());
    }

    #[test]
    fn test_missing_file_is_default() {
        let path = std::env::temp_dir().join("sqlweave-missing").join("config.toml");
        let config = EngineConfig::load_from(&path).unwrap();
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_save_round_trip() {
        let dir = std::env::temp_dir().join(format!("sqlweave-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let mut config = EngineConfig::parse(SAMPLE).unwrap();
        config.log_level = "warn".into();
        config.save_to(&path).unwrap();
        let loaded = EngineConfig::load_from(&path).unwrap();
        assert_eq!(loaded.log_level, "warn");
        assert_eq!(loaded.dialects.len(), 2);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_bad_level() {
        let config = EngineConfig {
            log_level: "loud".into(),
            ..EngineConfig::default()
        };
        assert!(matches!(config.level(), Err(QueryError::Configuration(_))));
    }

    #[test]
    fn test_registry_includes_configured_dialects() {
        let registry = EngineConfig::parse(SAMPLE).unwrap().registry().unwrap();
        let mut names = registry.language_names();
        names.sort();
        assert_eq!(names, vec!["mssql", "mysql", "postgres"]);
        let mssql = registry.language("mssql").unwrap();
        assert!(mssql.allows_multiple_statements());
        assert_eq!(mssql.quote("order"), "[order]");
    }
}
