/// Plugin architecture for extending sqlweave.
///
/// Backends register their dialects and any extra lowering passes with the
/// registry. Translators handed out by the registry run those passes after
/// generic lowering.
use std::sync::Arc;

use anyhow::Result;

use super::optimizer::RewritePass;
use crate::error::QueryError;
use crate::language::{QueryLanguage, Translator};

/// A backend extension. `register` runs once, when the plugin is loaded,
/// and adds the backend's dialects and passes to the registry.
///
/// # Example
///
/// ```ignore
/// struct SqlitePlugin;
///
/// impl QueryPlugin for SqlitePlugin {
///     fn name(&self) -> &str { "sqlite" }
///     fn version(&self) -> &str { "0.1.0" }
///     fn register(&self, registry: &mut PluginRegistry) -> Result<()> {
///         registry.add_language(Arc::new(SqliteLanguage));
///         Ok(())
///     }
/// }
/// ```
pub trait QueryPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn register(&self, registry: &mut PluginRegistry) -> Result<()>;
}

/// Central registry of dialects and plugin-provided passes.
#[derive(Default)]
pub struct PluginRegistry {
    languages: Vec<Arc<dyn QueryLanguage>>,
    lowering_passes: Vec<Arc<dyn RewritePass>>,
    loaded_plugins: Vec<PluginInfo>,
}

#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dialect. A later registration under the same name replaces
    /// the earlier one.
    pub fn add_language(&mut self, language: Arc<dyn QueryLanguage>) {
        self.languages.retain(|l| l.name() != language.name());
        self.languages.push(language);
    }

    /// Register a lowering pass run by every translator from this registry.
    pub fn add_lowering_pass(&mut self, pass: Arc<dyn RewritePass>) {
        self.lowering_passes.push(pass);
    }

    pub fn load_plugin(&mut self, plugin: Box<dyn QueryPlugin>) -> Result<()> {
        let info = PluginInfo {
            name: plugin.name().to_string(),
            version: plugin.version().to_string(),
            description: plugin.description().to_string(),
        };

        plugin.register(self)?;
        tracing::info!("loaded plugin {} {}", info.name, info.version);
        self.loaded_plugins.push(info);
        Ok(())
    }

    pub fn language(&self, name: &str) -> Option<Arc<dyn QueryLanguage>> {
        self.languages.iter().find(|l| l.name() == name).cloned()
    }

    pub fn language_names(&self) -> Vec<&str> {
        self.languages.iter().map(|l| l.name()).collect()
    }

    /// A translator for `name` that also runs the registered lowering passes.
    pub fn translator(&self, name: &str) -> crate::error::Result<Translator> {
        let language = self
            .language(name)
            .ok_or_else(|| QueryError::Configuration(format!("unknown dialect '{}'", name)))?;
        Ok(Translator::with_passes(language, self.lowering_passes.clone()))
    }

    pub fn loaded_plugins(&self) -> &[PluginInfo] {
        &self.loaded_plugins
    }
}
