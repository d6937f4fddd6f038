//! Instance identifier resolution.
//!
//! The endpoint path carries an opaque instance identifier so that several
//! hosts (or several accounts on one host) can share a single remote
//! endpoint. The identifier is resolved once per connection attempt; when
//! resolution fails the bridge falls back to a fixed default.

use futures::future::{self, BoxFuture};
use futures::FutureExt;

use crate::error::InstanceError;

/// Identifier used when nothing better can be resolved.
pub const DEFAULT_INSTANCE_ID: &str = "default";

/// Produces the instance identifier for a connection attempt.
pub trait InstanceResolver: Send + Sync {
    /// Resolves the identifier.
    fn resolve(&self) -> BoxFuture<'static, Result<String, InstanceError>>;
}

impl<F> InstanceResolver for F
where
    F: Fn() -> BoxFuture<'static, Result<String, InstanceError>> + Send + Sync,
{
    fn resolve(&self) -> BoxFuture<'static, Result<String, InstanceError>> {
        self()
    }
}

/// Always resolves to the same identifier.
#[derive(Debug, Clone)]
pub struct StaticInstance(pub String);

impl InstanceResolver for StaticInstance {
    fn resolve(&self) -> BoxFuture<'static, Result<String, InstanceError>> {
        future::ready(Ok(self.0.clone())).boxed()
    }
}

/// Derives the identifier from the logged-in account name.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountInstance;

impl InstanceResolver for AccountInstance {
    fn resolve(&self) -> BoxFuture<'static, Result<String, InstanceError>> {
        let account = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .map_err(|_| InstanceError::Unavailable("no account name in environment".to_string()));

        future::ready(account.and_then(|name| {
            let id = sanitise(&name);
            if id.is_empty() {
                Err(InstanceError::Unavailable(format!(
                    "account name '{name}' has no usable characters"
                )))
            } else {
                Ok(id)
            }
        }))
        .boxed()
    }
}

/// Lowercases and maps anything outside `[a-z0-9-]` to `-`, trimming dashes.
#[must_use]
pub fn sanitise(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    mapped.trim_matches('-').to_string()
}

/// Resolves through `resolver`, falling back to `fallback` on failure or an empty id.
pub async fn resolve_or_default(resolver: &dyn InstanceResolver, fallback: &str) -> String {
    match resolver.resolve().await {
        Ok(id) if !id.trim().is_empty() => id,
        Ok(_) => {
            tracing::warn!(fallback, "Instance resolver returned an empty id, using fallback");
            fallback.to_string()
        }
        Err(e) => {
            tracing::warn!(error = %e, fallback, "Instance resolution failed, using fallback");
            fallback.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitise_account_names() {
        assert_eq!(sanitise("Alice"), "alice");
        assert_eq!(sanitise("DOMAIN\\Bob Smith"), "domain-bob-smith");
        assert_eq!(sanitise("__x__"), "x");
        assert_eq!(sanitise("***"), "");
    }

    #[tokio::test]
    async fn static_instance_resolves() {
        let resolver = StaticInstance("work".to_string());
        assert_eq!(resolve_or_default(&resolver, "default").await, "work");
    }

    #[tokio::test]
    async fn failure_falls_back() {
        let resolver = || -> BoxFuture<'static, Result<String, InstanceError>> {
            future::ready(Err(InstanceError::Unavailable("signed out".to_string()))).boxed()
        };
        assert_eq!(resolve_or_default(&resolver, "default").await, "default");
    }

    #[tokio::test]
    async fn empty_id_falls_back() {
        let resolver = StaticInstance("  ".to_string());
        assert_eq!(resolve_or_default(&resolver, "fallback").await, "fallback");
    }
}
