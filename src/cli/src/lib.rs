//! Image purge CLI - prune local container images no branch still uses.

pub mod commands;
pub mod output;
