//! # knowledge-query
//!
//! Query and update evaluation over in-memory document collections.
//!
//! ## Features
//! - Filters: dot-path field lookup, literal equality, and the operators
//!   `$gt $gte $lt $lte $ne $in $nin $exists $regex`
//! - Updates: `$set`, `$inc`, `$unset` with dot paths; every update bumps
//!   `_version` by exactly one and stamps `_updatedAt`
//! - Stable multi-key sorting, projection that always keeps `_id`
//! - Paged queries that report the total matched before pagination

pub mod error;
pub mod filter;
pub mod path;
pub mod query;
pub mod update;

pub use error::QueryError;
pub use filter::{matches, Filter};
pub use path::{get_path, remove_path, set_path};
pub use query::{apply_projection, apply_sort, query_documents, FindOptions, QueryPage, SortKey};
pub use update::{apply_update, stamp_mutation, Update};
