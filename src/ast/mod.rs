/// Portable query trees and the translation passes over them.
///
/// ```text
/// Query tree (built by a front-end)   (types.rs, value.rs)
///       ↓
/// Rewrite passes                      (ordering.rs, optimizer.rs, columns.rs)
///       ↓
/// SQL formatter                       (formatter.rs)
///       ↓
/// Backend driver                      (db/ or memory/)
/// ```
///
/// The evaluator (evaluator.rs) folds closed subtrees for both generic
/// lowering and provider resolution. The plugin system (plugin.rs) lets
/// backends contribute dialects and lowering passes.
pub mod columns;
pub mod evaluator;
pub mod formatter;
pub mod optimizer;
pub mod ordering;
pub mod plugin;
pub mod types;
pub mod value;

// Re-export key types for convenience
pub use formatter::{format_query, QueryParameter, SqlCommand};
pub use optimizer::{Optimizer, RewritePass};
pub use plugin::{PluginRegistry, QueryPlugin};
pub use types::*;
pub use value::{QuerySource, RowSet, Value};
