//! Conversation store (spec.md §4.8): conversations and messages, bound by
//! `(org_id, user_id)`.

pub mod repository;
