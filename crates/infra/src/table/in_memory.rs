use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

use clouddart_core::PlayerId;
use clouddart_players::Player;

use super::{PlayerTable, TableError, DEFAULT_EMAIL_INDEX, EMAIL_ATTRIBUTE, ID_ATTRIBUTE};

type Item = Map<String, JsonValue>;

/// In-memory player table for tests/dev.
///
/// Rows are kept as schemaless attribute maps so partial updates behave like a
/// real table: `update_set` rewrites one attribute and decodes the row again.
/// Secondary indexes must be declared; querying any other index fails.
#[derive(Debug)]
pub struct InMemoryPlayerTable {
    items: RwLock<HashMap<PlayerId, Item>>,
    /// index name -> key attribute
    indexes: HashMap<String, String>,
}

impl InMemoryPlayerTable {
    /// Empty table with the default `email-index`.
    pub fn new() -> Self {
        Self::without_indexes().with_index(DEFAULT_EMAIL_INDEX, EMAIL_ATTRIBUTE)
    }

    pub fn without_indexes() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            indexes: HashMap::new(),
        }
    }

    pub fn with_index(mut self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.indexes.insert(name.into(), key.into());
        self
    }

    /// Number of stored rows. Counts through a poisoned lock, since a panic
    /// while holding it never leaves a half-written row behind.
    pub fn len(&self) -> usize {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn encode(player: &Player) -> Result<Item, TableError> {
        match serde_json::to_value(player) {
            Ok(JsonValue::Object(item)) => Ok(item),
            Ok(other) => Err(TableError::Malformed(format!(
                "player encoded as non-object: {other}"
            ))),
            Err(e) => Err(TableError::Malformed(format!("player encode failed: {e}"))),
        }
    }

    fn decode(item: &Item) -> Result<Player, TableError> {
        serde_json::from_value(JsonValue::Object(item.clone()))
            .map_err(|e| TableError::Malformed(format!("player decode failed: {e}")))
    }

    fn poisoned() -> TableError {
        TableError::Backend("lock poisoned".to_string())
    }
}

impl Default for InMemoryPlayerTable {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlayerTable for InMemoryPlayerTable {
    async fn put(&self, player: &Player) -> Result<(), TableError> {
        let item = Self::encode(player)?;
        let mut items = self.items.write().map_err(|_| Self::poisoned())?;
        items.insert(player.id(), item);
        Ok(())
    }

    async fn put_new(&self, player: &Player) -> Result<(), TableError> {
        let item = Self::encode(player)?;
        // Check and insert under one write lock so concurrent creates cannot
        // both claim the same email.
        let mut items = self.items.write().map_err(|_| Self::poisoned())?;
        let claimed = items.iter().any(|(id, existing)| {
            *id != player.id()
                && existing.get(EMAIL_ATTRIBUTE).and_then(JsonValue::as_str) == Some(player.email())
        });
        if claimed {
            return Err(TableError::ConditionFailed(format!(
                "email {} already claimed",
                player.email()
            )));
        }
        items.insert(player.id(), item);
        Ok(())
    }

    async fn update_set(
        &self,
        id: PlayerId,
        attribute: &str,
        value: JsonValue,
    ) -> Result<Player, TableError> {
        if attribute == ID_ATTRIBUTE {
            return Err(TableError::Malformed(format!(
                "cannot update key attribute '{ID_ATTRIBUTE}'"
            )));
        }

        let mut items = self.items.write().map_err(|_| Self::poisoned())?;
        let item = items
            .get_mut(&id)
            .ok_or_else(|| TableError::NotFound(id.to_string()))?;

        let mut updated = item.clone();
        updated.insert(attribute.to_string(), value);
        // Reject updates that would leave an undecodable row behind.
        let player = Self::decode(&updated)?;
        *item = updated;
        Ok(player)
    }

    async fn scan_all(&self) -> Result<Vec<Player>, TableError> {
        let items = self.items.read().map_err(|_| Self::poisoned())?;
        items.values().map(Self::decode).collect()
    }

    async fn query_index(
        &self,
        index: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<Player>, TableError> {
        let index_key = self
            .indexes
            .get(index)
            .ok_or_else(|| TableError::UnknownIndex(index.to_string()))?;
        if index_key != key {
            return Err(TableError::UnknownIndex(format!(
                "index '{index}' is keyed on '{index_key}', not '{key}'"
            )));
        }

        let items = self.items.read().map_err(|_| Self::poisoned())?;
        items
            .values()
            .filter(|item| item.get(key).and_then(JsonValue::as_str) == Some(value))
            .map(Self::decode)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clouddart_players::PlayerDraft;

    fn player(email: &str) -> Player {
        PlayerDraft::new(email, "P").into_player(PlayerId::new())
    }

    #[tokio::test]
    async fn put_then_scan_and_query() {
        let table = InMemoryPlayerTable::new();
        let a = player("a@x.com");
        let b = player("b@x.com");
        table.put(&a).await.unwrap();
        table.put(&b).await.unwrap();

        let mut all = table.scan_all().await.unwrap();
        all.sort_by_key(|p| p.email().to_string());
        assert_eq!(all, vec![a.clone(), b]);

        let found = table
            .query_index(DEFAULT_EMAIL_INDEX, EMAIL_ATTRIBUTE, "a@x.com")
            .await
            .unwrap();
        assert_eq!(found, vec![a]);
    }

    #[tokio::test]
    async fn put_is_an_upsert_by_id() {
        let table = InMemoryPlayerTable::new();
        let mut p = player("a@x.com");
        table.put(&p).await.unwrap();
        p.record_match("m1");
        table.put(&p).await.unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.scan_all().await.unwrap(), vec![p]);
    }

    #[tokio::test]
    async fn update_set_rewrites_one_attribute() {
        let table = InMemoryPlayerTable::new();
        let p = player("a@x.com");
        table.put(&p).await.unwrap();

        let updated = table
            .update_set(p.id(), "matches", serde_json::json!(["m1", "m2"]))
            .await
            .unwrap();
        assert_eq!(updated.id(), p.id());
        assert_eq!(updated.email(), "a@x.com");
        assert_eq!(updated.matches(), ["m1", "m2"]);
    }

    #[tokio::test]
    async fn update_set_on_missing_row_is_not_found() {
        let table = InMemoryPlayerTable::new();
        let err = table
            .update_set(PlayerId::new(), "matches", serde_json::json!([]))
            .await
            .unwrap_err();
        assert!(matches!(err, TableError::NotFound(_)));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn update_set_rejects_key_and_undecodable_values() {
        let table = InMemoryPlayerTable::new();
        let p = player("a@x.com");
        table.put(&p).await.unwrap();

        let err = table
            .update_set(p.id(), "id", serde_json::json!("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, TableError::Malformed(_)));

        let err = table
            .update_set(p.id(), "matches", serde_json::json!(42))
            .await
            .unwrap_err();
        assert!(matches!(err, TableError::Malformed(_)));
        assert_eq!(table.scan_all().await.unwrap(), vec![p]);
    }

    #[tokio::test]
    async fn unknown_index_is_rejected() {
        let table = InMemoryPlayerTable::without_indexes();
        let err = table
            .query_index(DEFAULT_EMAIL_INDEX, EMAIL_ATTRIBUTE, "a@x.com")
            .await
            .unwrap_err();
        assert!(matches!(err, TableError::UnknownIndex(_)));

        let table = InMemoryPlayerTable::new();
        let err = table
            .query_index(DEFAULT_EMAIL_INDEX, "name", "P")
            .await
            .unwrap_err();
        assert!(matches!(err, TableError::UnknownIndex(_)));
    }

    #[tokio::test]
    async fn put_new_refuses_claimed_email() {
        let table = InMemoryPlayerTable::new();
        table.put_new(&player("a@x.com")).await.unwrap();

        let err = table.put_new(&player("a@x.com")).await.unwrap_err();
        assert!(matches!(err, TableError::ConditionFailed(_)));
        assert_eq!(table.len(), 1);

        // Plain put stays unconditional.
        table.put(&player("a@x.com")).await.unwrap();
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn poisoned_lock_keeps_count_but_fails_operations() {
        let table = InMemoryPlayerTable::new();
        table.put(&player("a@x.com")).await.unwrap();

        let poisoned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = table.items.write().unwrap();
            panic!("poison the lock");
        }));
        assert!(poisoned.is_err());

        assert_eq!(table.len(), 1);
        assert!(!table.is_empty());
        let err = table.scan_all().await.unwrap_err();
        assert!(matches!(err, TableError::Backend(_)));
        let err = table.put(&player("b@x.com")).await.unwrap_err();
        assert!(matches!(err, TableError::Backend(_)));
    }
}
