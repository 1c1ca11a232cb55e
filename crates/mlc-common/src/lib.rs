//! Shared plumbing for the MLC compiler.
//!
//! - [`events`]: the diagnostics event bus that semantic services publish to
//! - [`module_path`]: namespace derivation and qualified member keys

pub mod events;
pub mod module_path;
