//! Players domain module (identity records and match history).
//!
//! This crate contains business rules for players, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod player;

pub use player::{ensure_email_unclaimed, Player, PlayerDraft, MATCHES_ATTRIBUTE};
