//! Shared checklist model, reset scheduling, and schema migration for `questlog`.

pub mod api;
pub mod catalog;
pub mod ids;
pub mod migrate;
pub mod model;
pub mod reset;
pub mod schedule;
