use duckdb::Connection;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataType {
    Integer,
    Decimal,
    Text,
    Boolean,
    Timestamp,
}

impl DataType {
    pub fn to_sql_type(self) -> &'static str {
        match self {
            DataType::Integer => "INTEGER",
            DataType::Decimal => "DECIMAL(18, 2)",
            DataType::Text => "VARCHAR",
            DataType::Boolean => "BOOLEAN",
            DataType::Timestamp => "TIMESTAMP",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnSchema {
    pub name: &'static str,
    pub data_type: DataType,
    /// Shown to the view generator. Columns that exist for the load
    /// pipeline only are left out of the prompt.
    pub advertised: bool,
}

impl ColumnSchema {
    const fn new(name: &'static str, data_type: DataType) -> Self {
        Self { name, data_type, advertised: true }
    }

    const fn internal(name: &'static str, data_type: DataType) -> Self {
        Self { name, data_type, advertised: false }
    }

    pub fn to_sql_definition(&self) -> String {
        format!("{} {}", self.name, self.data_type.to_sql_type())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn to_create_table_sql(&self) -> String {
        let columns_sql: Vec<String> = self
            .columns
            .iter()
            .map(ColumnSchema::to_sql_definition)
            .collect();

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
            self.name,
            columns_sql.join(",\n    ")
        )
    }

    /// `pedidos (id_pedido, cliente_ref, ...)`, the form used as generator context.
    pub fn to_prompt_line(&self) -> String {
        let names: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| c.advertised)
            .map(|c| c.name)
            .collect();
        format!("{} ({})", self.name, names.join(", "))
    }
}

/// The read-only warehouse that view queries run against.
pub fn warehouse_tables() -> Vec<TableSchema> {
    use DataType::*;

    vec![
        TableSchema {
            name: "pedidos",
            columns: vec![
                ColumnSchema::new("id_pedido", Text),
                ColumnSchema::new("cliente_ref", Text),
                ColumnSchema::new("criado_em", Timestamp),
                ColumnSchema::new("status", Text),
                ColumnSchema::new("valor_total", Decimal),
                ColumnSchema::new("custo_frete", Decimal),
                ColumnSchema::new("cidade_cliente", Text),
                ColumnSchema::new("estado_cliente", Text),
                ColumnSchema::internal("cep_cliente", Text),
                ColumnSchema::internal("transportadora", Text),
                ColumnSchema::internal("contagem_itens", Integer),
                ColumnSchema::internal("peso_kg", Decimal),
                ColumnSchema::new("total_itens_preco", Decimal),
                ColumnSchema::new("desconto_implicito", Decimal),
                ColumnSchema::new("desconto_perc", Decimal),
                ColumnSchema::new("mes_pedido", Integer),
                ColumnSchema::new("ano_pedido", Integer),
                ColumnSchema::new("dia_semana", Integer),
            ],
        },
        TableSchema {
            name: "itens",
            columns: vec![
                ColumnSchema::new("id", Integer),
                ColumnSchema::new("id_pedido", Text),
                ColumnSchema::new("id_produto", Text),
                ColumnSchema::new("id_material", Text),
                ColumnSchema::new("nome_material", Text),
                ColumnSchema::new("categoria", Text),
                ColumnSchema::new("preco", Decimal),
                ColumnSchema::new("status", Text),
                ColumnSchema::internal("quantidade", Integer),
            ],
        },
        TableSchema {
            name: "suprimentos",
            columns: vec![
                ColumnSchema::new("id_suprimento", Text),
                ColumnSchema::new("id_material", Text),
                ColumnSchema::new("nome_material", Text),
                ColumnSchema::new("quantidade", Integer),
                ColumnSchema::new("tempo_entrega", Integer),
                ColumnSchema::new("id_fabrica", Integer),
                ColumnSchema::internal("descontinuado", Boolean),
            ],
        },
    ]
}

/// Warehouse tables that the connected database does not have.
pub fn missing_tables(conn: &Connection) -> Result<Vec<&'static str>, duckdb::Error> {
    let mut stmt = conn.prepare(
        "SELECT table_name FROM information_schema.tables WHERE table_schema = 'main'",
    )?;
    let present = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(warehouse_tables()
        .into_iter()
        .map(|t| t.name)
        .filter(|name| !present.iter().any(|p| p == name))
        .collect())
}
