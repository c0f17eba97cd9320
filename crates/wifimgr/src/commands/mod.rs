//! Command handlers: bridge CLI args -> engine calls -> output formatting.

pub mod apply;
pub mod backups;
pub mod util;
