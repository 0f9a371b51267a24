use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Text,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::DateTime)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// One cell of a query result.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the cell. Numeric text is accepted; other text is not.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if f.is_finite() => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            _ => None,
        }
    }

    /// Ascending order among values of one numeric or temporal column.
    /// Dates and numbers come first, then cells with no ordinal reading
    /// (NaN, non-numeric text), then nulls. Cells inside either of the last
    /// two groups compare equal, so a stable sort leaves them in place.
    pub fn cmp_ordinal(&self, other: &Value) -> Ordering {
        match (self.ordinal(), other.ordinal()) {
            (Ordinal::Time(a), Ordinal::Time(b)) => a.cmp(&b),
            (Ordinal::Number(a), Ordinal::Number(b)) => a.total_cmp(&b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    fn ordinal(&self) -> Ordinal {
        match self {
            Value::Null => Ordinal::Missing,
            Value::Date(d) => Ordinal::Time(d.and_time(NaiveTime::MIN)),
            Value::DateTime(dt) => Ordinal::Time(*dt),
            other => other.as_f64().map_or(Ordinal::Unordered, Ordinal::Number),
        }
    }
}

/// Sort position of one cell; see [`Value::cmp_ordinal`].
enum Ordinal {
    Time(NaiveDateTime),
    Number(f64),
    Unordered,
    Missing,
}

impl Ordinal {
    fn rank(&self) -> u8 {
        match self {
            Ordinal::Time(_) => 0,
            Ordinal::Number(_) => 1,
            Ordinal::Unordered => 2,
            Ordinal::Missing => 3,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(_) => serializer.serialize_unit(),
            Value::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
            Value::DateTime(dt) => serializer.collect_str(&dt.format("%Y-%m-%dT%H:%M:%S")),
            Value::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

/// Tabular result of one statement. Rows are stored column-aligned with
/// `columns`; every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// Builds a result, padding short rows with nulls and dropping extra
    /// cells so the shape invariant always holds.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Null);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn first_cell(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }

    /// Values of one column, top to bottom.
    pub fn values(&self, index: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[index])
    }

    /// A copy with rows rearranged by `order` (indices into the current rows).
    pub fn reordered(&self, order: &[usize]) -> QueryResult {
        QueryResult {
            columns: self.columns.clone(),
            rows: order.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// A copy keeping only rows for which `keep` returns true.
    pub fn filtered<F>(&self, mut keep: F) -> QueryResult
    where
        F: FnMut(&[Value]) -> bool,
    {
        QueryResult {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|row| keep(row)).cloned().collect(),
        }
    }

    /// Replaces one column's type and cells.
    pub fn with_column(mut self, index: usize, kind: ColumnType, values: Vec<Value>) -> QueryResult {
        self.columns[index].kind = kind;
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[index] = value;
        }
        self
    }

    /// Row-oriented view used as `source_rows` for downstream consumers.
    pub fn to_records(&self) -> Vec<Record<'_>> {
        self.rows
            .iter()
            .map(|row| Record {
                columns: &self.columns,
                row,
            })
            .collect()
    }

    pub fn to_json_records(&self) -> Vec<serde_json::Value> {
        self.to_records()
            .iter()
            .map(|record| serde_json::to_value(record).unwrap_or(serde_json::Value::Null))
            .collect()
    }
}

/// A single row serialized as `{column: value, ...}` in column order.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [Column],
    row: &'a [Value],
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.row) {
            map.serialize_entry(&column.name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> QueryResult {
        QueryResult::new(
            vec![
                Column::new("dia", ColumnType::Date),
                Column::new("total", ColumnType::Float),
            ],
            vec![
                vec![NaiveDate::from_ymd_opt(2025, 1, 2).unwrap().into(), 10.5.into()],
                vec![Value::Null, Value::Null],
            ],
        )
    }

    #[test]
    fn records_keep_column_names_and_iso_dates() {
        let records = sample().to_json_records();
        assert_eq!(records[0], json!({"dia": "2025-01-02", "total": 10.5}));
        assert_eq!(records[1], json!({"dia": null, "total": null}));
    }

    #[test]
    fn short_rows_are_padded() {
        let result = QueryResult::new(
            vec![Column::new("a", ColumnType::Integer), Column::new("b", ColumnType::Integer)],
            vec![vec![1i64.into()]],
        );
        assert_eq!(result.rows()[0], vec![Value::Int(1), Value::Null]);
    }

    #[test]
    fn numeric_text_is_numeric() {
        assert_eq!(Value::from(" 12.5 ").as_f64(), Some(12.5));
        assert_eq!(Value::from("abc").as_f64(), None);
        assert_eq!(Value::Float(f64::NAN).as_f64(), None);
    }

    #[test]
    fn nulls_order_last() {
        assert_eq!(Value::Null.cmp_ordinal(&Value::Int(1)), Ordering::Greater);
        assert_eq!(Value::Int(2).cmp_ordinal(&Value::Float(1.5)), Ordering::Greater);
    }

    #[test]
    fn nan_orders_after_numbers_and_before_nulls() {
        let nan = Value::Float(f64::NAN);
        assert_eq!(nan.cmp_ordinal(&Value::Float(1.0)), Ordering::Greater);
        assert_eq!(nan.cmp_ordinal(&Value::Int(3)), Ordering::Greater);
        assert_eq!(nan.cmp_ordinal(&Value::Null), Ordering::Less);
        assert_eq!(nan.cmp_ordinal(&Value::Float(f64::INFINITY)), Ordering::Equal);

        let mut cells: Vec<Value> = (0..40)
            .map(|i| match i % 4 {
                0 => Value::Float(f64::NAN),
                1 => Value::Null,
                _ => Value::Int(40 - i),
            })
            .collect();
        cells.sort_by(Value::cmp_ordinal);
        assert_eq!(cells[0], Value::Int(1));
        assert!(matches!(cells[20], Value::Float(f) if f.is_nan()));
        assert_eq!(cells[39], Value::Null);
    }

    #[test]
    fn dates_and_datetimes_share_one_timeline() {
        let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let noon = day.and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(Value::Date(day).cmp_ordinal(&Value::DateTime(noon)), Ordering::Less);
        assert_eq!(Value::DateTime(noon).cmp_ordinal(&Value::Null), Ordering::Less);
    }
}
