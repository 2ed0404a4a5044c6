//! CLI command implementations

pub mod serving;
pub mod smoke;
