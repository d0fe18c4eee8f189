//! CLI command implementations.

pub mod plan;
pub mod token_status;
