//! Finding the provider a query is bound to.
//!
//! The search looks for a node typed as a provider, then for one typed as a
//! queryable source, depth-first over the tree as captured. A literal hit
//! wins immediately. Otherwise the runtime arguments are substituted for the
//! lambda's parameters and the search repeats; as a last resort every closed
//! subtree is folded to a literal and the search runs once more.
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::provider::QueryProvider;
use crate::ast::evaluator::{find_typed_subtree, fold_closed_subtrees, substitute_parameters};
use crate::ast::{Expr, Lambda, Value};
use crate::error::{QueryError, Result};

/// How a provider was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Supplied by the caller.
    Explicit,
    /// A literal already present in the captured tree.
    Literal,
    /// A literal after runtime arguments replaced the parameters.
    Substitution,
    /// A literal after closed subtrees were folded.
    PartialEvaluation,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resolution::Explicit => "explicit",
            Resolution::Literal => "literal",
            Resolution::Substitution => "substitution",
            Resolution::PartialEvaluation => "partial evaluation",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct ResolvedProvider {
    pub provider: Arc<dyn QueryProvider>,
    pub resolution: Resolution,
}

impl fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("provider", &self.provider.name())
            .field("resolution", &self.resolution)
            .finish()
    }
}

/// The first provider-typed node, else the first queryable-typed node.
fn find_provider_node(expr: &Expr) -> Option<&Expr> {
    find_typed_subtree(expr, &|t| t.is_provider())
        .or_else(|| find_typed_subtree(expr, &|t| t.is_queryable()))
}

/// The provider held by a literal provider or bound literal source.
fn literal_provider(node: Option<&Expr>) -> Option<Arc<dyn QueryProvider>> {
    match node {
        Some(Expr::Constant { value, .. }) => value.bound_provider(),
        _ => None,
    }
}

pub fn resolve_provider(query: &Lambda, args: &[Value]) -> Result<ResolvedProvider> {
    let body = query.body.as_ref();
    let found = |provider: Arc<dyn QueryProvider>, resolution: Resolution| -> Result<ResolvedProvider> {
        debug!(provider = provider.name(), %resolution, "resolved query provider");
        Ok(ResolvedProvider {
            provider,
            resolution,
        })
    };

    if let Some(provider) = literal_provider(find_provider_node(body)) {
        return found(provider, Resolution::Literal);
    }

    let substituted = if args.is_empty() {
        None
    } else {
        Some(substitute_parameters(body.clone(), &query.params, args))
    };
    if let Some(tree) = &substituted {
        if let Some(provider) = literal_provider(find_provider_node(tree)) {
            return found(provider, Resolution::Substitution);
        }
    }

    let folded = fold_closed_subtrees(substituted.unwrap_or_else(|| body.clone()));
    if let Some(provider) = literal_provider(find_provider_node(&folded)) {
        return found(provider, Resolution::PartialEvaluation);
    }

    let detail = match find_provider_node(&folded) {
        Some(node @ Expr::Constant { .. }) => format!(
            "{} is not bound to a provider; supply one explicitly",
            node.ty()
        ),
        Some(node) => format!(
            "{} node of type {} could not be reduced to a literal",
            node.kind(),
            node.ty()
        ),
        None => "no provider or queryable source appears in the query".to_string(),
    };
    Err(QueryError::ProviderResolution(detail))
}
