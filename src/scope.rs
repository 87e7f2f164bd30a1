//! Scope-based authorization.
//!
//! A scope is either the global wildcard `*` or `resource:action` with both
//! parts non-empty. A granted `resource:*` covers every action on that
//! resource.

use thiserror::Error;

/// Global wildcard scope.
pub const WILDCARD: &str = "*";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("at least one scope is required")]
    Empty,

    #[error("invalid scope format: {0:?} (expected resource:action or *)")]
    InvalidFormat(String),
}

/// Validate the declared scopes of a token.
pub fn validate_scope_syntax<S: AsRef<str>>(scopes: &[S]) -> Result<(), ScopeError> {
    if scopes.is_empty() {
        return Err(ScopeError::Empty);
    }
    for scope in scopes {
        let scope = scope.as_ref();
        if !is_valid_scope(scope) {
            return Err(ScopeError::InvalidFormat(scope.to_string()));
        }
    }
    Ok(())
}

fn is_valid_scope(scope: &str) -> bool {
    if scope == WILDCARD {
        return true;
    }
    let mut parts = scope.split(':');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(resource), Some(action), None) if !resource.is_empty() && !action.is_empty()
    )
}

/// Whether `granted` satisfies `required`.
///
/// An empty requirement is always satisfied. Otherwise the first granted
/// scope that is the wildcard, an exact match, or a `resource:*` prefix of
/// the requirement grants access.
pub fn has_permission<S: AsRef<str>>(granted: &[S], required: &str) -> bool {
    if required.is_empty() {
        return true;
    }
    granted.iter().any(|scope| {
        let scope = scope.as_ref();
        if scope == WILDCARD || scope == required {
            return true;
        }
        scope
            .strip_suffix('*')
            .is_some_and(|prefix| prefix.ends_with(':') && required.starts_with(prefix))
    })
}

/// Whether every required scope is granted.
pub fn match_all<S: AsRef<str>, R: AsRef<str>>(granted: &[S], required: &[R]) -> bool {
    required
        .iter()
        .all(|scope| has_permission(granted, scope.as_ref()))
}

/// Required scopes that are not granted, in request order.
pub fn missing_scopes<S: AsRef<str>, R: AsRef<str>>(granted: &[S], required: &[R]) -> Vec<String> {
    required
        .iter()
        .map(|scope| scope.as_ref())
        .filter(|scope| !has_permission(granted, scope))
        .map(|scope| scope.to_string())
        .collect()
}
