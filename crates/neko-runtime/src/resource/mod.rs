//! Shared network resource pools
//!
//! - [`SharedResource`] - single-flight lazy cell that registers its own teardown
//! - [`HttpPool`] - one `reqwest::Client` for the whole process
//! - [`DatabasePool`] - one PostgreSQL pool, configured on first use

mod database;
mod http;
mod shared;

pub use database::{DatabasePool, DbPoolStats, PooledDb};
pub use http::{HttpHandle, HttpPool};
pub use shared::SharedResource;
