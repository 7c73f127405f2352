//! `questlog` -- daily and weekly checklist tracker library.

pub mod app;
pub mod clock;
pub mod config;
pub mod identity;
pub mod session;
pub mod sync;
