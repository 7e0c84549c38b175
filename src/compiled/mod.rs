/// Compiled queries: provider resolution, compile-once caching and
/// arity-specialized dispatch.
///
/// ```text
/// Lambda ─► resolve_provider ─► QueryProvider::execute ─► NativeQuery
///                                                             │
///                     CompiledQuery slot (published once) ◄───┘
/// ```
pub mod provider;
pub mod query;
pub mod resolve;

pub use provider::{NativeQuery, QueryProvider};
pub use query::{CompiledPlan, CompiledQuery};
pub use resolve::{resolve_provider, Resolution, ResolvedProvider};
