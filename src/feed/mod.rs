// src/feed/mod.rs
pub mod aggregator;
pub mod cache;
pub mod comments;
pub mod profiles;
