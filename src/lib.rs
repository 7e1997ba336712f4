//! Real-time chat backend: REST API + WebSocket fan-out over an in-memory,
//! JSON-snapshot-persisted store.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod friends;
pub mod groups;
pub mod routes;
pub mod state;
pub mod store;
pub mod users;
pub mod ws;
