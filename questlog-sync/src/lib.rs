//! `questlog` sync server library.
//!
//! Exposes the HTTP endpoint and record store for use in tests and
//! embedding. The server stores one opaque JSON document per sync id and
//! never interprets its contents.

pub mod config;
pub mod server;
pub mod store;
