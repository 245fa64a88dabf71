//! Extension manifest model.
//!
//! - [`types`]: the manifest record shared by author and resolved manifests
//! - [`resolve`]: the pure author-to-resolved transform

mod resolve;
mod types;

pub use resolve::*;
pub use types::*;
