//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use fanpoll_core::prelude::*;
//! ```

// === Platform and commands ===
pub use crate::commands::{Command, CreatorCommand, FanCommand, Outcome};
pub use crate::platform::Platform;

// === Inputs ===
pub use crate::accounts::{Account, ProfileUpdate, Registration};
pub use crate::catalog::{NewOption, OptionEdit, ProjectDetail};
pub use crate::lifecycle::{NewProject, ProjectUpdate};

// === Records ===
pub use crate::entity::{Creator, Entity, Fan, PollOption, Project};
pub use crate::id::{EntityId, EntityKind};
pub use crate::identity::{Identity, Role};

// === Configuration ===
pub use crate::config::FanpollConfig;

// === Errors ===
pub use crate::error::{EngineError, EngineResult, ErrorKind, ErrorReport};

// === Store ===
pub use crate::store::{EntityStore, MemoryEntityStore};
