//! Image Purge Core
//!
//! Prunes local container images that no branch of a git repository still
//! references. A caller-supplied listing command is run on every branch to
//! build the keep set; pattern rules then decide which of the runtime's
//! images are removed.

pub mod config;
pub mod error;
pub mod exec;
pub mod pattern;
pub mod purge;
pub mod runtime;
pub mod selection;
pub mod vcs;

// Re-export commonly used types
pub use config::{PurgeConfig, PurgeOptions};
pub use error::{PurgeError, Result};
pub use exec::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use pattern::ImagePattern;
pub use purge::Purger;
pub use runtime::{ImageEntry, ImageInventory, ImageRuntime};
pub use selection::{Decision, KeepReason, KeepSet, RemovalPlan, RemoveReason, SelectionRules};
pub use vcs::GitRepo;
