use std::sync::Arc;
use tracing::warn;

use crate::query::{QueryError, QueryParams, QueryResult, QueryStore};
use crate::util::format::truncate_chars;

/// Leading keywords a statement may start with.
const READ_PREFIXES: [&str; 2] = ["SELECT", "WITH"];

/// How much of a rejected statement reaches the operator log.
const LOGGED_STATEMENT_CHARS: usize = 50;

/// True when `sql` starts with `SELECT` or `WITH`, ignoring surrounding
/// whitespace and case. This is a prefix check only: it is the sole
/// authorization boundary, so untrusted input must travel in bound
/// parameters, never spliced into the statement text.
pub fn is_read_only(sql: &str) -> bool {
    let normalized = sql.trim().to_uppercase();
    READ_PREFIXES.iter().any(|prefix| normalized.starts_with(prefix))
}

/// Rejects anything that is not a read query before it reaches the store.
/// The submitted text, not the normalized form, is what executes.
pub struct ReadOnlyGuard {
    store: Arc<dyn QueryStore>,
}

impl ReadOnlyGuard {
    pub fn new(store: Arc<dyn QueryStore>) -> Self {
        Self { store }
    }

    pub fn execute(&self, sql: &str, params: &QueryParams) -> Result<QueryResult, QueryError> {
        if !is_read_only(sql) {
            let attempted = truncate_chars(sql.trim(), LOGGED_STATEMENT_CHARS).to_string();
            warn!("Blocked non-read statement: {}...", attempted);
            return Err(QueryError::Blocked(attempted));
        }

        self.store.fetch(sql, params)
    }
}

impl QueryStore for ReadOnlyGuard {
    fn fetch(&self, sql: &str, params: &QueryParams) -> Result<QueryResult, QueryError> {
        self.execute(sql, params)
    }
}
