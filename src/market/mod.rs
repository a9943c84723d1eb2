// src/market/mod.rs
pub mod batcher;
pub mod http;
pub mod stream;
