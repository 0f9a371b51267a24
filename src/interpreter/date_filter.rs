use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::query::{ColumnType, GlobalParams, QueryResult, Value};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%d/%m/%Y %H:%M:%S"];

/// Second-pass date bound applied to fetched rows.
///
/// Columns whose name contains one of the hints are read as dates and rows
/// outside `[data_inicio, data_fim]` are dropped, as are rows with no date in
/// such a column. A hinted column that does not read cleanly as dates is left
/// alone and reported in the warnings.
#[derive(Debug, Clone)]
pub struct DateFilter {
    enabled: bool,
    hints: Vec<String>,
}

impl Default for DateFilter {
    fn default() -> Self {
        Self::new(true, vec!["data".into(), "criado_em".into(), "dia".into()])
    }
}

#[derive(Debug)]
pub struct Filtered {
    pub rows: QueryResult,
    pub warnings: Vec<String>,
}

impl DateFilter {
    pub fn new(enabled: bool, hints: Vec<String>) -> Self {
        let hints = hints.into_iter().map(|h| h.to_lowercase()).collect();
        Self { enabled, hints }
    }

    pub fn disabled() -> Self {
        Self::new(false, Vec::new())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_hinted(&self, column: &str) -> bool {
        let column = column.to_lowercase();
        self.hints.iter().any(|hint| column.contains(hint.as_str()))
    }

    pub fn apply(&self, rows: &QueryResult, range: &GlobalParams) -> Filtered {
        let mut result = rows.clone();
        let mut warnings = Vec::new();
        if !self.enabled {
            return Filtered { rows: result, warnings };
        }

        let hinted: Vec<usize> = rows
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, c)| self.is_hinted(&c.name))
            .map(|(i, _)| i)
            .collect();

        for index in hinted {
            match coerce_column(&result, index) {
                Ok((kind, values)) => {
                    result = result.with_column(index, kind, values);
                    result = result.filtered(|row| row[index].as_date().is_some_and(|d| range.contains(d)));
                }
                Err(reason) => {
                    let name = &rows.columns()[index].name;
                    warnings.push(format!("column '{}' left unfiltered: {}", name, reason));
                }
            }
        }

        Filtered { rows: result, warnings }
    }
}

/// Reads every cell of a column as a date. Any non-null cell that is not a
/// date fails the whole column.
fn coerce_column(rows: &QueryResult, index: usize) -> Result<(ColumnType, Vec<Value>), String> {
    let original = rows.columns()[index].kind;
    let mut any_time = false;

    let values = rows
        .values(index)
        .map(|value| match value {
            Value::Null | Value::Date(_) => Ok(value.clone()),
            Value::DateTime(_) => {
                any_time = true;
                Ok(value.clone())
            }
            Value::Text(text) => parse_temporal(text)
                .inspect(|v| any_time |= matches!(v, Value::DateTime(_)))
                .ok_or_else(|| format!("'{}' is not a date", text)),
            other => Err(format!("'{}' is not a date", other)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let kind = match original {
        ColumnType::Date | ColumnType::DateTime => original,
        _ if any_time => ColumnType::DateTime,
        _ => ColumnType::Date,
    };
    Ok((kind, values))
}

fn parse_temporal(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
    {
        return Some(Value::Date(date));
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
    {
        return Some(Value::DateTime(dt));
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| Value::DateTime(dt.naive_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Column;

    fn january() -> GlobalParams {
        GlobalParams::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
        )
    }

    fn by_day(kind: ColumnType, days: Vec<Value>) -> QueryResult {
        let rows = days.into_iter().map(|d| vec![d, Value::Int(1)]).collect();
        QueryResult::new(vec![Column::new("dia", kind), Column::new("pedidos", ColumnType::Integer)], rows)
    }

    fn date(y: i32, m: u32, d: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn drops_rows_outside_inclusive_range() {
        let rows = by_day(
            ColumnType::Date,
            vec![date(2024, 12, 31), date(2025, 1, 1), date(2025, 1, 31), date(2025, 2, 1), Value::Null],
        );
        let filtered = DateFilter::default().apply(&rows, &january());

        let days: Vec<String> = filtered.rows.values(0).map(ToString::to_string).collect();
        assert_eq!(days, vec!["2025-01-01", "2025-01-31"]);
        assert!(filtered.warnings.is_empty());
    }

    #[test]
    fn text_dates_are_coerced() {
        let rows = by_day(
            ColumnType::Text,
            vec![Value::from("2025-01-10"), Value::from("15/01/2025"), Value::from("2025-03-01T10:00:00Z")],
        );
        let filtered = DateFilter::default().apply(&rows, &january());

        assert_eq!(filtered.rows.len(), 2);
        assert_eq!(filtered.rows.columns()[0].kind, ColumnType::DateTime);
        assert_eq!(filtered.rows.rows()[0][0], date(2025, 1, 10));
    }

    #[test]
    fn unreadable_column_is_left_alone() {
        let rows = QueryResult::new(
            vec![Column::new("dia_semana", ColumnType::Integer)],
            vec![vec![Value::Int(1)], vec![Value::Int(5)]],
        );
        let filtered = DateFilter::default().apply(&rows, &january());

        assert_eq!(filtered.rows, rows);
        assert_eq!(filtered.warnings.len(), 1);
        assert!(filtered.warnings[0].contains("dia_semana"));
    }

    #[test]
    fn unhinted_columns_are_ignored() {
        let rows = QueryResult::new(
            vec![Column::new("mes", ColumnType::Date)],
            vec![vec![date(2020, 1, 1)]],
        );
        assert_eq!(DateFilter::default().apply(&rows, &january()).rows.len(), 1);
    }

    #[test]
    fn disabled_filter_keeps_everything() {
        let rows = by_day(ColumnType::Date, vec![date(2020, 1, 1)]);
        let filtered = DateFilter::disabled().apply(&rows, &january());
        assert_eq!(filtered.rows, rows);
    }

    #[test]
    fn hint_matching_ignores_case() {
        let filter = DateFilter::default();
        assert!(filter.is_hinted("Criado_Em"));
        assert!(filter.is_hinted("data_pedido"));
        assert!(!filter.is_hinted("valor_total"));
    }
}
