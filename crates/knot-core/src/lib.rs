//! # Knot Core
//!
//! Shared types used throughout the knot code-hosting server: decentralized
//! identifiers, time-ordered event keys, and path-safety primitives.

#![forbid(unsafe_code)]

mod did;
mod error;
mod path;
mod tid;

pub use did::Did;
pub use error::{Error, Result};
pub use path::{is_valid_repo_name, secure_join, secure_join_all};
pub use tid::Tid;
