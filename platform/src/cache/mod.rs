//! In-memory caches

pub mod slug;
