//! Conflict resolution between a queued local write and the server's copy.
//!
//! Each table may register a [`ConflictPolicy`]; tables without one use
//! server-wins. Resolution is a pure function of its inputs, including the
//! `now` timestamp used to stamp merged records, so the same inputs always
//! produce the same output.
//!
//! # Strategies
//!
//! - `client-wins`: the local payload is kept unchanged.
//! - `server-wins`: the server payload is kept unchanged.
//! - `merge`: shallow merge, client fields override server fields one by one,
//!   server-only fields survive, and `updated_at` is stamped.
//! - `manual`: a registered resolver function decides. Without one the
//!   resolution falls back to server-wins and reports the fallback.

use crate::{clock::to_rfc3339, Record, TableName, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Field stamped on merged records.
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// How conflicts on a table are settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    ClientWins,
    #[default]
    ServerWins,
    Merge,
    Manual,
}

/// A custom resolver: `(client, server) -> resolved`.
pub type ResolverFn = Arc<dyn Fn(&Record, &Record) -> Record + Send + Sync>;

/// A table's registered policy.
#[derive(Clone, Default)]
pub struct ConflictPolicy {
    pub strategy: ConflictStrategy,
    resolver: Option<ResolverFn>,
}

impl std::fmt::Debug for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictPolicy")
            .field("strategy", &self.strategy)
            .field("has_resolver", &self.resolver.is_some())
            .finish()
    }
}

impl ConflictPolicy {
    /// A policy using a built-in strategy.
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self {
            strategy,
            resolver: None,
        }
    }

    /// A manual policy with its resolver function.
    pub fn manual<F>(resolver: F) -> Self
    where
        F: Fn(&Record, &Record) -> Record + Send + Sync + 'static,
    {
        Self {
            strategy: ConflictStrategy::Manual,
            resolver: Some(Arc::new(resolver)),
        }
    }

    /// Whether a resolver function is attached.
    pub fn has_resolver(&self) -> bool {
        self.resolver.is_some()
    }
}

/// Which rule actually produced the resolved record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictResolution {
    ClientWins,
    ServerWins,
    Merged,
    Custom,
    /// `manual` was registered without a resolver; server-wins was applied.
    ServerWinsFallback,
}

/// Result of resolving one conflict.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub record: Record,
    pub applied: ConflictResolution,
}

/// Per-table conflict policies, registered at startup and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    policies: HashMap<TableName, ConflictPolicy>,
}

impl ConflictResolver {
    /// Create a resolver where every table is server-wins.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a policy for a table (builder style).
    pub fn with_policy(mut self, table: impl Into<TableName>, policy: ConflictPolicy) -> Self {
        self.register(table, policy);
        self
    }

    /// Register a policy for a table.
    pub fn register(&mut self, table: impl Into<TableName>, policy: ConflictPolicy) {
        self.policies.insert(table.into(), policy);
    }

    /// The effective strategy for a table.
    pub fn strategy_for(&self, table: &str) -> ConflictStrategy {
        self.policies
            .get(table)
            .map(|p| p.strategy)
            .unwrap_or_default()
    }

    /// Resolve a conflict between the local and server versions of a record.
    pub fn resolve(
        &self,
        table: &str,
        client: &Record,
        server: &Record,
        now: Timestamp,
    ) -> Resolution {
        let Some(policy) = self.policies.get(table) else {
            return server_wins(server, ConflictResolution::ServerWins);
        };

        match policy.strategy {
            ConflictStrategy::ClientWins => Resolution {
                record: client.clone(),
                applied: ConflictResolution::ClientWins,
            },
            ConflictStrategy::ServerWins => server_wins(server, ConflictResolution::ServerWins),
            ConflictStrategy::Merge => Resolution {
                record: merge(client, server, now),
                applied: ConflictResolution::Merged,
            },
            ConflictStrategy::Manual => match &policy.resolver {
                Some(resolver) => Resolution {
                    record: resolver(client, server),
                    applied: ConflictResolution::Custom,
                },
                None => server_wins(server, ConflictResolution::ServerWinsFallback),
            },
        }
    }
}

fn server_wins(server: &Record, applied: ConflictResolution) -> Resolution {
    Resolution {
        record: server.clone(),
        applied,
    }
}

/// `{ ...server, ...client, updated_at: now }`
pub fn merge(client: &Record, server: &Record, now: Timestamp) -> Record {
    let mut merged = server.clone();
    merged.patch(client);
    merged.insert(UPDATED_AT_FIELD, Value::String(to_rfc3339(now)));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    fn fixtures() -> (Record, Record) {
        (
            record(json!({"a": 1, "b": 2})),
            record(json!({"a": 9, "b": 2, "c": 3})),
        )
    }

    #[test]
    fn default_is_server_wins() {
        let (client, server) = fixtures();
        let resolver = ConflictResolver::new();

        let resolution = resolver.resolve("clients", &client, &server, 0);
        assert_eq!(resolution.record, server);
        assert_eq!(resolution.applied, ConflictResolution::ServerWins);
        assert_eq!(resolver.strategy_for("clients"), ConflictStrategy::ServerWins);
    }

    #[test]
    fn client_wins() {
        let (client, server) = fixtures();
        let resolver = ConflictResolver::new()
            .with_policy("clients", ConflictPolicy::new(ConflictStrategy::ClientWins));

        let resolution = resolver.resolve("clients", &client, &server, 0);
        assert_eq!(resolution.record, client);
        assert_eq!(resolution.applied, ConflictResolution::ClientWins);
    }

    #[test]
    fn merge_prefers_client_fields_and_keeps_server_only_fields() {
        let (client, server) = fixtures();
        let resolver = ConflictResolver::new()
            .with_policy("clients", ConflictPolicy::new(ConflictStrategy::Merge));

        let resolution = resolver.resolve("clients", &client, &server, 1_706_745_600_000);
        let merged = resolution.record;

        assert_eq!(merged.get("a"), Some(&json!(1)));
        assert_eq!(merged.get("b"), Some(&json!(2)));
        assert_eq!(merged.get("c"), Some(&json!(3)));
        assert_eq!(
            merged.get(UPDATED_AT_FIELD),
            Some(&json!("2024-02-01T00:00:00.000Z"))
        );
        assert_eq!(merged.fields().len(), 4);
        assert_eq!(resolution.applied, ConflictResolution::Merged);
    }

    #[test]
    fn merge_is_deterministic() {
        let (client, server) = fixtures();
        assert_eq!(merge(&client, &server, 77), merge(&client, &server, 77));
    }

    #[test]
    fn manual_uses_resolver() {
        let (client, server) = fixtures();
        let resolver = ConflictResolver::new().with_policy(
            "clients",
            ConflictPolicy::manual(|client, server| {
                let mut out = client.clone();
                out.insert("c", server.get("c").cloned().unwrap_or(Value::Null));
                out.insert("resolved", json!(true));
                out
            }),
        );

        let resolution = resolver.resolve("clients", &client, &server, 0);
        assert_eq!(
            resolution.record.into_value(),
            json!({"a": 1, "b": 2, "c": 3, "resolved": true})
        );
        assert_eq!(resolution.applied, ConflictResolution::Custom);
    }

    #[test]
    fn manual_without_resolver_falls_back_to_server() {
        let (client, server) = fixtures();
        let resolver = ConflictResolver::new()
            .with_policy("clients", ConflictPolicy::new(ConflictStrategy::Manual));

        let resolution = resolver.resolve("clients", &client, &server, 0);
        assert_eq!(resolution.record, server);
        assert_eq!(resolution.applied, ConflictResolution::ServerWinsFallback);
    }

    #[test]
    fn strategy_wire_names() {
        let json = serde_json::to_string(&ConflictStrategy::ClientWins).unwrap();
        assert_eq!(json, "\"client-wins\"");
        let parsed: ConflictStrategy = serde_json::from_str("\"server-wins\"").unwrap();
        assert_eq!(parsed, ConflictStrategy::ServerWins);
    }

    #[test]
    fn policies_are_per_table() {
        let (client, server) = fixtures();
        let resolver = ConflictResolver::new()
            .with_policy("clients", ConflictPolicy::new(ConflictStrategy::ClientWins));

        assert_eq!(resolver.resolve("tasks", &client, &server, 0).record, server);
    }
}
