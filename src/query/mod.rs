//! Query execution path: a [`QueryStore`] runs SQL, the [`guard`] keeps it
//! read-only and the [`cache`] memoizes results per `(sql, params)`.

pub mod cache;
pub mod duckdb_store;
pub mod guard;
pub mod params;
pub mod result;

pub use cache::{CacheStats, Clock, QueryCache, SystemClock};
pub use duckdb_store::DuckDbStore;
pub use guard::ReadOnlyGuard;
pub use params::{GlobalParams, ParamValue, QueryParams};
pub use result::{Column, ColumnType, QueryResult, Value};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("blocked: only SELECT or WITH statements may run (attempted `{0}`)")]
    Blocked(String),

    #[error("query references :{0} but no such parameter was supplied")]
    MissingParameter(String),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("query failed: {0}")]
    Store(#[from] duckdb::Error),

    #[error("could not read query result: {0}")]
    Conversion(String),
}

impl QueryError {
    pub fn is_blocked(&self) -> bool {
        matches!(self, QueryError::Blocked(_))
    }
}

/// Anything that can execute a statement with bound parameters.
///
/// Implementations block the calling thread for the duration of the query.
pub trait QueryStore: Send + Sync {
    fn fetch(&self, sql: &str, params: &QueryParams) -> Result<QueryResult, QueryError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory store that records every statement it receives.
    pub struct RecordingStore {
        pub calls: AtomicUsize,
        pub seen: Mutex<Vec<String>>,
        responder: Box<dyn Fn(&str) -> Result<QueryResult, QueryError> + Send + Sync>,
    }

    impl RecordingStore {
        pub fn returning(result: QueryResult) -> Self {
            Self::with(move |_| Ok(result.clone()))
        }

        pub fn with<F>(responder: F) -> Self
        where
            F: Fn(&str) -> Result<QueryResult, QueryError> + Send + Sync + 'static,
        {
            Self {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                responder: Box::new(responder),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl QueryStore for RecordingStore {
        fn fetch(&self, sql: &str, _params: &QueryParams) -> Result<QueryResult, QueryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(sql.to_string());
            (self.responder)(sql)
        }
    }
}
