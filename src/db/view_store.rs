use duckdb::{params, OptionalExt};
use thiserror::Error;
use tracing::{info, warn};

use super::db_pool::DuckDbPool;
use crate::view::{View, ViewStructure};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("view {0} not found")]
    NotFound(i64),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("stored structure of view {id} is unreadable: {source}")]
    Corrupt {
        id: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not serialize view structure: {0}")]
    Serialize(#[source] serde_json::Error),
}

const CREATE_SQL: &str = "
CREATE SEQUENCE IF NOT EXISTS visoes_dashboard_id_seq START 1;
CREATE TABLE IF NOT EXISTS visoes_dashboard (
    id BIGINT PRIMARY KEY DEFAULT nextval('visoes_dashboard_id_seq'),
    nome VARCHAR NOT NULL,
    descricao_prompt VARCHAR,
    estrutura_json VARCHAR NOT NULL
);
";

/// Saved views in the `visoes_dashboard` table.
#[derive(Clone)]
pub struct ViewStore {
    pool: DuckDbPool,
}

impl ViewStore {
    pub fn new(pool: DuckDbPool) -> Self {
        Self { pool }
    }

    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute_batch(CREATE_SQL)?;
        Ok(())
    }

    pub fn create(
        &self,
        name: &str,
        prompt: Option<&str>,
        structure: &ViewStructure,
    ) -> Result<View, StoreError> {
        let json = serde_json::to_string(structure).map_err(StoreError::Serialize)?;
        let conn = self.pool.get()?;
        let id: i64 = conn.query_row(
            "INSERT INTO visoes_dashboard (nome, descricao_prompt, estrutura_json) VALUES (?, ?, ?) RETURNING id",
            params![name, prompt, json],
            |row| row.get(0),
        )?;

        info!("Saved view {} ('{}')", id, name);
        Ok(View {
            id,
            name: name.to_string(),
            prompt_description: prompt.map(str::to_string),
            structure: structure.clone(),
        })
    }

    /// All views, newest first. Rows whose structure no longer parses are
    /// skipped with a warning.
    pub fn list(&self) -> Result<Vec<View>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, nome, descricao_prompt, estrutura_json FROM visoes_dashboard ORDER BY id DESC",
        )?;
        let rows = stmt
            .query_map([], StoredRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_view() {
                Ok(view) => views.push(view),
                Err(e) => warn!("Skipping view: {}", e),
            }
        }
        Ok(views)
    }

    pub fn get(&self, id: i64) -> Result<View, StoreError> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT id, nome, descricao_prompt, estrutura_json FROM visoes_dashboard WHERE id = ?",
                params![id],
                StoredRow::from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound(id))?;
        row.into_view()
    }

    pub fn update(
        &self,
        id: i64,
        name: &str,
        prompt: Option<&str>,
        structure: &ViewStructure,
    ) -> Result<View, StoreError> {
        let json = serde_json::to_string(structure).map_err(StoreError::Serialize)?;
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE visoes_dashboard SET nome = ?, descricao_prompt = ?, estrutura_json = ? WHERE id = ?",
            params![name, prompt, json, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }

        info!("Updated view {} ('{}')", id, name);
        Ok(View {
            id,
            name: name.to_string(),
            prompt_description: prompt.map(str::to_string),
            structure: structure.clone(),
        })
    }

    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        let changed = conn.execute("DELETE FROM visoes_dashboard WHERE id = ?", params![id])?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        info!("Deleted view {}", id);
        Ok(())
    }
}

struct StoredRow {
    id: i64,
    name: String,
    prompt: Option<String>,
    json: String,
}

impl StoredRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            prompt: row.get(2)?,
            json: row.get(3)?,
        })
    }

    fn into_view(self) -> Result<View, StoreError> {
        let structure = serde_json::from_str(&self.json).map_err(|source| StoreError::Corrupt {
            id: self.id,
            source,
        })?;
        Ok(View {
            id: self.id,
            name: self.name,
            prompt_description: self.prompt,
            structure,
        })
    }
}
