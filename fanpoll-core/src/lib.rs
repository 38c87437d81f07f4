//! Fanpoll Core
//!
//! Consistency engine for a creator/fan polling platform. Creators publish
//! time-boxed campaigns ("projects") made of voting options; fans follow
//! creators and vote on options.
//!
//! # Overview
//!
//! The records form a denormalized graph with no referential integrity in
//! the store itself:
//!
//! - creator <-> fan follow edges, mirrored in `Creator.fans` and
//!   `Fan.favoritCreators`
//! - fan -> option votes in `Fan.votes`, counted by `PollOption.counter`
//! - project -> option containment and creator -> project ownership
//!
//! This crate keeps that graph correct under concurrent mutation, runs the
//! campaign lifecycle on durable timers and propagates deletions.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use fanpoll_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = FanpollConfig::load()?;
//!     fanpoll_core::logging::init_logging(&config.logging)?;
//!
//!     let platform = Platform::open(config).await?;
//!     let fan = platform.accounts().authenticate("finn@example.com", "Secret1").await?;
//!     platform
//!         .handle(Some(&fan), FanCommand::RecordVote { option_id: "...".into() }.into())
//!         .await?;
//!     platform.shutdown().await
//! }
//! ```
//!
//! # Architecture
//!
//! - [`store`] - entity store contract, in-memory store and journal
//! - [`locks`] - per-entity async locks taken in a global order
//! - [`graph`] - follow edges
//! - [`ledger`] - votes and counters
//! - [`lifecycle`] - campaign status, durable transitions and the sweeper
//! - [`cascade`] - cascading deletes
//! - [`accounts`] and [`catalog`] - sign-up, profiles, options and queries
//! - [`platform`] - command dispatch over all of the above

pub mod accounts;
pub mod audit;
pub mod cascade;
pub mod catalog;
pub mod commands;
pub mod config; // Configuration system with TOML support
pub mod context;
pub mod entity;
pub mod error;
pub mod graph;
pub mod id;
pub mod identity;
pub mod ledger;
pub mod lifecycle;
pub mod locks;
pub mod logging; // Process-wide logger for the `log` facade
pub mod platform;
pub mod store;

mod steps;

#[cfg(test)]
pub mod testing;

// Prelude module for convenient imports
pub mod prelude;

// Re-exports of main types and traits
pub use commands::{Command, CreatorCommand, FanCommand, Outcome};
pub use config::FanpollConfig;
pub use error::{EngineError, EngineResult, ErrorKind, ErrorReport};
pub use id::{EntityId, EntityKind};
pub use identity::{Identity, Role};
pub use platform::Platform;
pub use store::{EntityStore, MemoryEntityStore};
