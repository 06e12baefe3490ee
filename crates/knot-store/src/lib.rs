//! The knot's single embedded relational store: known DIDs, public keys,
//! RBAC policy/grouping rows, the change oplog, and the firehose cursor.
//!
//! All access goes through [`Store`], a cheaply-cloneable handle around a
//! pooled SQLite connection.

mod cursor;
mod dids;
mod error;
mod events;
mod keys;
mod pool;
mod rbac;

pub use cursor::STALE_AFTER_US;
pub use dids::DidRole;
pub use error::{Result, StoreError};
pub use events::Event;
pub use keys::PublicKey;
pub use pool::Store;
pub use rbac::{GroupingRow, PolicyRow};
