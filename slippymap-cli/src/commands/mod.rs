//! CLI subcommands.

pub mod cache;
pub mod common;
pub mod fetch;
pub mod providers;
pub mod quadkey;
pub mod tiles;
