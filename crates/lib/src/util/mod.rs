//! Shared utilities.
//!
//! File system helpers used by both execution modes, plus test helpers.

pub mod fs;

#[cfg(test)]
pub mod testutil;
