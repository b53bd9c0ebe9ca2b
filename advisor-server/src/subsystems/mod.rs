pub mod chat;
pub mod relevance;
pub mod sessions;
