//! Player directory service (application-level orchestration).
//!
//! The directory is the only place that enforces player rules against the
//! table: email uniqueness on create, identifier assignment, and the
//! append-only match history.
//!
//! ```text
//! create(draft)
//!   ↓
//! 1. Query the email index
//!   ↓
//! 2. Reject if the email is already claimed (DuplicateEmail)
//!   ↓
//! 3. Assign a fresh PlayerId
//!   ↓
//! 4. Persist with one write (put_new)
//! ```
//!
//! ## Consistency
//!
//! Steps 1 and 4 are separate round trips. On tables whose `put_new` is an
//! atomic check-and-insert the race between concurrent creates is closed at
//! step 4; on plain tables two concurrent creates with the same email can both
//! succeed, and `get_by_email` will then return both records. Callers that
//! need the guarantee on such tables must serialize `create`.
//!
//! Nothing here retries: every table failure goes back to the caller.

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use clouddart_core::PlayerId;
use clouddart_players::{ensure_email_unclaimed, Player, PlayerDraft, MATCHES_ATTRIBUTE};

use crate::config::TableConfig;
use crate::table::{
    DynamoPlayerTable, PlayerTable, TableError, DEFAULT_EMAIL_INDEX, EMAIL_ATTRIBUTE,
};

/// Outcome of a failed directory operation.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Another player already uses the candidate's email. The rejected
    /// candidate is handed back untouched; it was not persisted.
    #[error("a player with email {} already exists", .candidate.email)]
    DuplicateEmail { candidate: Box<PlayerDraft> },

    /// The targeted player does not exist in the table.
    #[error("player {0} not found")]
    NotFound(PlayerId),

    /// The table failed (connectivity, throttling, malformed item, ...).
    #[error("storage error: {0}")]
    Storage(#[from] TableError),
}

/// Generate a fresh player identifier.
///
/// Random UUIDv4; the table is never consulted for collisions.
pub fn create_id() -> PlayerId {
    PlayerId::new()
}

/// Directory of players on top of a `PlayerTable`.
///
/// Holds nothing but the table handle and the name of the email index, so a
/// single instance can serve any number of concurrent requests.
#[derive(Debug, Clone)]
pub struct PlayerDirectory<T> {
    table: T,
    email_index: String,
}

impl<T> PlayerDirectory<T> {
    pub fn new(table: T) -> Self {
        Self {
            table,
            email_index: DEFAULT_EMAIL_INDEX.to_string(),
        }
    }

    pub fn with_email_index(mut self, email_index: impl Into<String>) -> Self {
        self.email_index = email_index.into();
        self
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    pub fn into_table(self) -> T {
        self.table
    }
}

impl PlayerDirectory<DynamoPlayerTable> {
    /// Directory over the DynamoDB table described by `config`.
    pub async fn connect(config: &TableConfig) -> Self {
        let table = DynamoPlayerTable::connect(config).await;
        Self::new(table).with_email_index(config.email_index.clone())
    }
}

impl<T> PlayerDirectory<T>
where
    T: PlayerTable,
{
    /// Register a new player.
    ///
    /// Issues one index query and, when the email is free, one write. The
    /// returned record carries the assigned `id`.
    #[instrument(skip(self, candidate), fields(email = %candidate.email), err)]
    pub async fn create(&self, candidate: PlayerDraft) -> Result<Player, DirectoryError> {
        let existing = self.find_by_email(&candidate.email).await?;
        if let Err(conflict) = ensure_email_unclaimed(&candidate.email, &existing) {
            warn!(reason = %conflict, "rejected player with duplicate email");
            return Err(DirectoryError::DuplicateEmail {
                candidate: Box::new(candidate),
            });
        }

        let player = candidate.into_player(create_id());
        match self.table.put_new(&player).await {
            Ok(()) => {
                info!(player_id = %player.id(), "player created");
                Ok(player)
            }
            Err(TableError::ConditionFailed(reason)) => {
                warn!(%reason, "email claimed concurrently");
                Err(DirectoryError::DuplicateEmail {
                    candidate: Box::new(player.into()),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Append `match_id` to the player's history and persist the new list.
    ///
    /// Returns the record as the table reports it after the update. No
    /// duplicate check: adding the same match twice lists it twice.
    #[instrument(skip(self, player), fields(player_id = %player.id()), err)]
    pub async fn add_match(
        &self,
        mut player: Player,
        match_id: &str,
    ) -> Result<Player, DirectoryError> {
        let id = player.id();
        player.record_match(match_id);

        let matches = serde_json::to_value(player.matches())
            .map_err(|e| TableError::Malformed(format!("matches encode failed: {e}")))?;

        match self.table.update_set(id, MATCHES_ATTRIBUTE, matches).await {
            Ok(updated) => {
                info!(matches = updated.matches().len(), "match recorded");
                Ok(updated)
            }
            Err(TableError::NotFound(_)) => Err(DirectoryError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Every player in the table, in table order.
    #[instrument(skip(self), err)]
    pub async fn get_all(&self) -> Result<Vec<Player>, DirectoryError> {
        let players = self.table.scan_all().await?;
        debug!(count = players.len(), "listed players");
        Ok(players)
    }

    /// Players indexed under `email`: normally zero or one, more only if
    /// concurrent creates raced on a table without an atomic email guard.
    #[instrument(skip(self), err)]
    pub async fn get_by_email(&self, email: &str) -> Result<Vec<Player>, DirectoryError> {
        Ok(self.find_by_email(email).await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Vec<Player>, TableError> {
        let players = self
            .table
            .query_index(&self.email_index, EMAIL_ATTRIBUTE, email)
            .await?;
        debug!(count = players.len(), "email index lookup");
        Ok(players)
    }
}
