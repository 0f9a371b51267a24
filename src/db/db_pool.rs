use duckdb::Connection;
use r2d2::{ManageConnection, Pool};

/// Connection string that selects a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

pub struct DuckDbConnectionManager {
    connection_string: String,
}

impl DuckDbConnectionManager {
    pub fn new(connection_string: String) -> Self {
        Self { connection_string }
    }

    fn is_in_memory(&self) -> bool {
        self.connection_string.is_empty() || self.connection_string == IN_MEMORY
    }
}

impl ManageConnection for DuckDbConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        if self.is_in_memory() {
            Connection::open_in_memory()
        } else {
            Connection::open(&self.connection_string)
        }
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

pub type DuckDbPool = Pool<DuckDbConnectionManager>;

/// Builds the shared pool. In-memory databases are private to each
/// connection, so they get one connection that is never recycled.
pub fn build_pool(connection_string: &str, pool_size: u32) -> Result<DuckDbPool, r2d2::Error> {
    let manager = DuckDbConnectionManager::new(connection_string.to_string());
    if manager.is_in_memory() {
        return Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager);
    }
    Pool::builder().max_size(pool_size.max(1)).build(manager)
}
