use serde::{Deserialize, Serialize};

use clouddart_core::{DomainError, DomainResult, PlayerId};

/// Attribute name under which the match history is stored.
pub const MATCHES_ATTRIBUTE: &str = "matches";

/// A player that has not been persisted yet (no identifier assigned).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerDraft {
    pub age: i64,
    pub email: String,
    pub name: String,
    pub nick_name: String,
    #[serde(default)]
    pub matches: Vec<String>,
}

impl PlayerDraft {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            age: 0,
            email: email.into(),
            name: name.into(),
            nick_name: String::new(),
            matches: Vec::new(),
        }
    }

    pub fn with_nick_name(mut self, nick_name: impl Into<String>) -> Self {
        self.nick_name = nick_name.into();
        self
    }

    pub fn with_age(mut self, age: i64) -> Self {
        self.age = age;
        self
    }

    /// Attach an identifier, producing the record that gets persisted.
    pub fn into_player(self, id: PlayerId) -> Player {
        Player {
            age: self.age,
            email: self.email,
            id,
            name: self.name,
            nick_name: self.nick_name,
            matches: self.matches,
        }
    }
}

/// Player record, as stored in the player table.
///
/// # Invariants
/// - `id` is assigned once at creation and never changes.
/// - `matches` only grows: entries are appended, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    age: i64,
    email: String,
    id: PlayerId,
    name: String,
    nick_name: String,
    #[serde(default)]
    matches: Vec<String>,
}

impl Player {
    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nick_name(&self) -> &str {
        &self.nick_name
    }

    pub fn age(&self) -> i64 {
        self.age
    }

    pub fn matches(&self) -> &[String] {
        &self.matches
    }

    /// Append a match to the history.
    ///
    /// Duplicates are kept: recording the same match twice lists it twice.
    pub fn record_match(&mut self, match_id: impl Into<String>) {
        self.matches.push(match_id.into());
    }
}

impl From<Player> for PlayerDraft {
    fn from(value: Player) -> Self {
        Self {
            age: value.age,
            email: value.email,
            name: value.name,
            nick_name: value.nick_name,
            matches: value.matches,
        }
    }
}

/// Email uniqueness rule: `existing` are the records already indexed under
/// `email`. Any record carrying that email means the address is taken.
pub fn ensure_email_unclaimed(email: &str, existing: &[Player]) -> DomainResult<()> {
    if let Some(owner) = existing.iter().find(|p| p.email == email) {
        return Err(DomainError::conflict(format!(
            "email {email} already registered to player {}",
            owner.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(email: &str) -> Player {
        PlayerDraft::new(email, "Ada")
            .with_nick_name("ace")
            .with_age(31)
            .into_player(PlayerId::new())
    }

    #[test]
    fn into_player_keeps_draft_fields() {
        let id = PlayerId::new();
        let player = PlayerDraft::new("a@x.com", "A")
            .with_nick_name("aa")
            .with_age(20)
            .into_player(id);

        assert_eq!(player.id(), id);
        assert_eq!(player.email(), "a@x.com");
        assert_eq!(player.name(), "A");
        assert_eq!(player.nick_name(), "aa");
        assert_eq!(player.age(), 20);
        assert!(player.matches().is_empty());
    }

    #[test]
    fn record_match_appends_and_keeps_duplicates() {
        let mut player = sample("a@x.com");
        player.record_match("m1");
        player.record_match("m2");
        player.record_match("m1");
        assert_eq!(player.matches(), ["m1", "m2", "m1"]);
    }

    #[test]
    fn json_shape_uses_wire_field_names() {
        let player = sample("a@x.com");
        let json = serde_json::to_value(&player).unwrap();
        let obj = json.as_object().unwrap();

        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["age", "email", "id", "matches", "name", "nick_name"]);
        assert_eq!(obj["id"], serde_json::Value::String(player.id().to_string()));
    }

    #[test]
    fn missing_matches_decodes_as_empty() {
        let id = PlayerId::new();
        let json = serde_json::json!({
            "age": 40,
            "email": "b@x.com",
            "id": id.to_string(),
            "name": "B",
            "nick_name": "bee",
        });
        let player: Player = serde_json::from_value(json).unwrap();
        assert_eq!(player.id(), id);
        assert!(player.matches().is_empty());
    }

    #[test]
    fn unclaimed_email_passes() {
        assert!(ensure_email_unclaimed("a@x.com", &[]).is_ok());
        assert!(ensure_email_unclaimed("a@x.com", &[sample("b@x.com")]).is_ok());
    }

    #[test]
    fn claimed_email_is_a_conflict() {
        let owner = sample("a@x.com");
        let err = ensure_email_unclaimed("a@x.com", std::slice::from_ref(&owner)).unwrap_err();
        match err {
            DomainError::Conflict(msg) => assert!(msg.contains(&owner.id().to_string())),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: recording matches never drops or reorders prior entries.
            #[test]
            fn history_is_append_only(
                initial in proptest::collection::vec("[a-z0-9]{1,12}", 0..8),
                added in proptest::collection::vec("[a-z0-9]{1,12}", 0..8),
            ) {
                let mut draft = PlayerDraft::new("p@x.com", "P");
                draft.matches = initial.clone();
                let mut player = draft.into_player(PlayerId::new());

                for m in &added {
                    let before = player.matches().to_vec();
                    player.record_match(m.clone());
                    prop_assert_eq!(&player.matches()[..before.len()], &before[..]);
                    prop_assert_eq!(player.matches().last(), Some(m));
                }

                let expected: Vec<String> = initial.into_iter().chain(added).collect();
                prop_assert_eq!(player.matches(), &expected[..]);
            }

            /// Property: an email is claimed exactly when some existing record carries it.
            #[test]
            fn uniqueness_rule_matches_membership(
                email in "[a-z]{1,8}@[a-z]{1,5}\\.com",
                others in proptest::collection::vec("[a-z]{1,8}@[a-z]{1,5}\\.com", 0..5),
            ) {
                let existing: Vec<Player> = others.iter().map(|e| sample(e)).collect();
                let claimed = others.contains(&email);
                prop_assert_eq!(ensure_email_unclaimed(&email, &existing).is_err(), claimed);
            }
        }
    }
}
