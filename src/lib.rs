// src/lib.rs
pub mod config;
pub mod error;
pub mod feed;
pub mod market;
pub mod remote;
pub mod types;
