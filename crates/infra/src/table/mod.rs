//! Player table boundary.
//!
//! This module defines the storage-facing abstraction the directory runs on:
//! a table addressed by the `id` primary key with at least one secondary
//! index on `email`. Adapters live next to it (in-memory for tests/dev,
//! DynamoDB for deployments).

pub mod dynamo;
pub mod in_memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use clouddart_core::PlayerId;
use clouddart_players::Player;

pub use dynamo::DynamoPlayerTable;
pub use in_memory::InMemoryPlayerTable;

/// Primary key attribute of the player table.
pub const ID_ATTRIBUTE: &str = "id";

/// Attribute the email index is keyed on.
pub const EMAIL_ATTRIBUTE: &str = "email";

/// Default name of the secondary index on `email`.
pub const DEFAULT_EMAIL_INDEX: &str = "email-index";

/// Player table operation error.
///
/// These are **infrastructure errors**; the directory surfaces them to callers
/// unchanged (apart from `NotFound` on updates, which it reports as a missing
/// player).
#[derive(Debug, Error)]
pub enum TableError {
    /// A conditional update targeted a row that does not exist.
    #[error("item not found: {0}")]
    NotFound(String),

    /// A conditional write was rejected (e.g. email already claimed).
    #[error("conditional check failed: {0}")]
    ConditionFailed(String),

    /// The query named an index the table does not have.
    #[error("unknown index: {0}")]
    UnknownIndex(String),

    /// An item could not be encoded or decoded.
    #[error("malformed item: {0}")]
    Malformed(String),

    /// The backend rejected the request for capacity reasons.
    #[error("request throttled: {0}")]
    Throttled(String),

    /// Any other backend failure (connectivity, permissions, ...).
    #[error("backend error: {0}")]
    Backend(String),
}

/// Table of player records keyed by `id`, with a secondary index on `email`.
///
/// ## Implementation Requirements
///
/// - `put` is an unconditional upsert by primary key.
/// - `update_set` replaces one attribute of an **existing** row and returns the
///   post-update record; a missing row is `TableError::NotFound`.
/// - `scan_all` and `query_index` return every matching row (all pages), in
///   whatever order the backend produces.
/// - `put_new` may enforce email uniqueness atomically. Backends that cannot
///   do so keep the default, which is a plain `put`.
#[async_trait]
pub trait PlayerTable: Send + Sync {
    async fn put(&self, player: &Player) -> Result<(), TableError>;

    /// Insert a freshly created player, rejecting it with
    /// `TableError::ConditionFailed` when another row already owns its email.
    async fn put_new(&self, player: &Player) -> Result<(), TableError> {
        self.put(player).await
    }

    async fn update_set(
        &self,
        id: PlayerId,
        attribute: &str,
        value: JsonValue,
    ) -> Result<Player, TableError>;

    async fn scan_all(&self) -> Result<Vec<Player>, TableError>;

    async fn query_index(
        &self,
        index: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<Player>, TableError>;
}

#[async_trait]
impl<S> PlayerTable for Arc<S>
where
    S: PlayerTable + ?Sized,
{
    async fn put(&self, player: &Player) -> Result<(), TableError> {
        (**self).put(player).await
    }

    async fn put_new(&self, player: &Player) -> Result<(), TableError> {
        (**self).put_new(player).await
    }

    async fn update_set(
        &self,
        id: PlayerId,
        attribute: &str,
        value: JsonValue,
    ) -> Result<Player, TableError> {
        (**self).update_set(id, attribute, value).await
    }

    async fn scan_all(&self) -> Result<Vec<Player>, TableError> {
        (**self).scan_all().await
    }

    async fn query_index(
        &self,
        index: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<Player>, TableError> {
        (**self).query_index(index, key, value).await
    }
}
