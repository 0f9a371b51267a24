pub mod db_pool;
pub mod db_utils;
pub mod schema;
pub mod view_store;

pub use db_pool::{build_pool, DuckDbConnectionManager, DuckDbPool};
pub use view_store::{StoreError, ViewStore};
