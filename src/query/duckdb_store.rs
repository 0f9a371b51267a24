use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType, Date32Type, Float64Type, Int64Type, Schema, TimeUnit, TimestampMicrosecondType,
};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use tracing::debug;

use crate::db::db_utils::bind_named;
use crate::db::DuckDbPool;
use crate::query::{Column, ColumnType, QueryError, QueryParams, QueryResult, QueryStore, Value};

/// Runs statements on the DuckDB warehouse and converts the Arrow batches it
/// returns into a [`QueryResult`].
#[derive(Clone)]
pub struct DuckDbStore {
    pool: DuckDbPool,
}

impl DuckDbStore {
    pub fn new(pool: DuckDbPool) -> Self {
        Self { pool }
    }
}

impl QueryStore for DuckDbStore {
    fn fetch(&self, sql: &str, params: &QueryParams) -> Result<QueryResult, QueryError> {
        let bound = bind_named(sql, params)?;
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare(&bound.sql)?;
        let arrow = stmt.query_arrow(duckdb::params_from_iter(bound.values))?;
        let schema = arrow.get_schema();
        let batches: Vec<RecordBatch> = arrow.collect();

        let result = from_batches(&schema, &batches).map_err(|e| QueryError::Conversion(e.to_string()))?;
        debug!("Query returned {} rows, {} columns", result.len(), result.columns().len());
        Ok(result)
    }
}

fn column_type(data_type: &DataType) -> ColumnType {
    match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => ColumnType::Integer,
        DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => ColumnType::Float,
        DataType::Boolean => ColumnType::Boolean,
        DataType::Date32 | DataType::Date64 => ColumnType::Date,
        DataType::Timestamp(_, _) => ColumnType::DateTime,
        _ => ColumnType::Text,
    }
}

pub(crate) fn from_batches(schema: &Schema, batches: &[RecordBatch]) -> Result<QueryResult, ArrowError> {
    let columns: Vec<Column> = schema
        .fields()
        .iter()
        .map(|f| Column::new(f.name().clone(), column_type(f.data_type())))
        .collect();

    let total_rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
    let mut cells: Vec<Vec<Value>> = columns.iter().map(|_| Vec::with_capacity(total_rows)).collect();

    for batch in batches {
        for (idx, column) in columns.iter().enumerate() {
            read_column(batch.column(idx), column.kind, &mut cells[idx])?;
        }
    }

    let mut rows: Vec<Vec<Value>> = (0..total_rows).map(|_| Vec::with_capacity(columns.len())).collect();
    for column in cells {
        for (row, value) in rows.iter_mut().zip(column) {
            row.push(value);
        }
    }

    Ok(QueryResult::new(columns, rows))
}

fn read_column(array: &ArrayRef, kind: ColumnType, out: &mut Vec<Value>) -> Result<(), ArrowError> {
    match kind {
        ColumnType::Integer => {
            let casted = cast(array, &DataType::Int64)?;
            let values = casted.as_primitive::<Int64Type>();
            out.extend((0..values.len()).map(|i| {
                if values.is_null(i) { Value::Null } else { Value::Int(values.value(i)) }
            }));
        }
        ColumnType::Float => {
            let casted = cast(array, &DataType::Float64)?;
            let values = casted.as_primitive::<Float64Type>();
            out.extend((0..values.len()).map(|i| {
                if values.is_null(i) { Value::Null } else { Value::Float(values.value(i)) }
            }));
        }
        ColumnType::Boolean => {
            let values = array.as_boolean();
            out.extend((0..values.len()).map(|i| {
                if values.is_null(i) { Value::Null } else { Value::Bool(values.value(i)) }
            }));
        }
        ColumnType::Date => {
            let casted = cast(array, &DataType::Date32)?;
            let values = casted.as_primitive::<Date32Type>();
            out.extend((0..values.len()).map(|i| {
                if values.is_null(i) {
                    Value::Null
                } else {
                    values.value_as_date(i).map_or(Value::Null, Value::Date)
                }
            }));
        }
        ColumnType::DateTime => {
            let casted = cast(array, &DataType::Timestamp(TimeUnit::Microsecond, None))?;
            let values = casted.as_primitive::<TimestampMicrosecondType>();
            out.extend((0..values.len()).map(|i| {
                if values.is_null(i) {
                    Value::Null
                } else {
                    values.value_as_datetime(i).map_or(Value::Null, Value::DateTime)
                }
            }));
        }
        ColumnType::Text => match cast(array, &DataType::Utf8) {
            Ok(casted) => {
                let values = casted.as_string::<i32>();
                out.extend((0..values.len()).map(|i| {
                    if values.is_null(i) { Value::Null } else { Value::Text(values.value(i).to_string()) }
                }));
            }
            Err(_) => {
                for i in 0..array.len() {
                    out.push(if array.is_null(i) {
                        Value::Null
                    } else {
                        Value::Text(array_value_to_string(array, i)?)
                    });
                }
            }
        },
    }
    Ok(())
}
