//! Presentation order for a chart's category axis.
//!
//! Numeric and temporal axes sort by value. Text axes, usually bucket labels
//! produced by `CASE WHEN` (`"0-5%"`, `"5-10%"`, `">15%"`), sort by the first
//! number in each label so buckets come out in numeric sequence. Labels that
//! share a number (`"2025-01"`, `"2025-02"`) fall back to their text.

use regex::Regex;
use std::cmp::Ordering;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::warn;

use crate::query::{QueryResult, Value};

/// Nudge applied to `>N` and `<N` labels so they land just after or before `N`.
const BOUND_BIAS: f64 = 0.1;

#[derive(Debug, Error)]
enum KeyError {
    #[error("invalid numeric token pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Number(f64, String),
    Label(String),
    Null,
}

impl SortKey {
    fn rank(&self) -> u8 {
        match self {
            SortKey::Number(..) => 0,
            SortKey::Label(_) => 1,
            SortKey::Null => 2,
        }
    }

    fn cmp(&self, other: &SortKey) -> Ordering {
        match (self, other) {
            (SortKey::Number(a, la), SortKey::Number(b, lb)) => a.total_cmp(b).then_with(|| la.cmp(lb)),
            (SortKey::Label(a), SortKey::Label(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

fn numeric_token() -> Result<&'static Regex, KeyError> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(\d+[.,]?\d*)"))
        .as_ref()
        .map_err(|e| KeyError::Pattern(e.clone()))
}

fn label_key(label: &str, pattern: &Regex) -> SortKey {
    let label = label.trim();
    // The token is digits with at most one separator, so it always parses.
    let number = pattern
        .find(label)
        .and_then(|token| token.as_str().replace(',', ".").parse::<f64>().ok());
    let Some(mut number) = number else {
        return SortKey::Label(label.to_string());
    };

    if label.starts_with('>') {
        number += BOUND_BIAS;
    } else if label.starts_with('<') {
        number -= BOUND_BIAS;
    }
    SortKey::Number(number, label.to_string())
}

fn text_keys(rows: &QueryResult, index: usize, pattern: &Regex) -> Vec<SortKey> {
    rows.values(index)
        .map(|value| match value {
            Value::Null => SortKey::Null,
            other => label_key(&other.to_string(), pattern),
        })
        .collect()
}

/// Returns `rows` reordered along `axis_column`. Values are never changed and
/// no row is dropped. A missing column leaves the order untouched, and so does
/// a failure while deriving text keys (logged as a warning).
pub fn sort(rows: &QueryResult, axis_column: &str) -> QueryResult {
    sort_with(rows, axis_column, numeric_token)
}

fn sort_with<P>(rows: &QueryResult, axis_column: &str, pattern: P) -> QueryResult
where
    P: FnOnce() -> Result<&'static Regex, KeyError>,
{
    let Some(index) = rows.column_index(axis_column) else {
        return rows.clone();
    };
    if rows.is_empty() {
        return rows.clone();
    }

    let mut order: Vec<usize> = (0..rows.len()).collect();
    let kind = rows.columns()[index].kind;

    if kind.is_numeric() || kind.is_temporal() {
        let cells = rows.rows();
        order.sort_by(|&a, &b| cells[a][index].cmp_ordinal(&cells[b][index]));
    } else {
        match pattern() {
            Ok(pattern) => {
                let keys = text_keys(rows, index, pattern);
                order.sort_by(|&a, &b| keys[a].cmp(&keys[b]));
            }
            Err(e) => {
                warn!("Keeping original order of axis '{}': {}", axis_column, e);
                return rows.clone();
            }
        }
    }

    rows.reordered(&order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Column, ColumnType};

    fn single(kind: ColumnType, values: Vec<Value>) -> QueryResult {
        let rows = values.into_iter().enumerate().map(|(i, v)| vec![v, Value::Int(i as i64)]).collect();
        QueryResult::new(
            vec![Column::new("eixo", kind), Column::new("pos", ColumnType::Integer)],
            rows,
        )
    }

    fn axis(result: &QueryResult) -> Vec<String> {
        result.values(0).map(ToString::to_string).collect()
    }

    fn labels(values: &[&str]) -> QueryResult {
        single(ColumnType::Text, values.iter().map(|&s| Value::from(s)).collect())
    }

    #[test]
    fn bucket_labels_follow_numeric_sequence() {
        let sorted = sort(&labels(&["10-15%", "5-10%", "0-5%", ">15%"]), "eixo");
        assert_eq!(axis(&sorted), vec!["0-5%", "5-10%", "10-15%", ">15%"]);
    }

    #[test]
    fn bounds_land_next_to_their_number() {
        let sorted = sort(&labels(&[">15", "15", "<15", "14,5"]), "eixo");
        assert_eq!(axis(&sorted), vec!["14,5", "<15", "15", ">15"]);
    }

    #[test]
    fn labels_without_numbers_sort_lexically() {
        let sorted = sort(&labels(&["Mar", "Jan", "Feb"]), "eixo");
        assert_eq!(axis(&sorted), vec!["Feb", "Jan", "Mar"]);
    }

    #[test]
    fn numbers_precede_plain_labels_and_nulls_go_last() {
        let input = single(
            ColumnType::Text,
            vec![Value::from("outros"), Value::Null, Value::from("200+"), Value::from("000-050")],
        );
        let sorted = sort(&input, "eixo");
        assert_eq!(axis(&sorted), vec!["000-050", "200+", "outros", ""]);
    }

    #[test]
    fn numeric_column_sorts_by_value() {
        let input = single(ColumnType::Integer, vec![Value::Int(30), Value::Int(10), Value::Int(20)]);
        let sorted = sort(&input, "eixo");
        assert_eq!(axis(&sorted), vec!["10", "20", "30"]);
        // whole rows move together
        let positions: Vec<String> = sorted.values(1).map(ToString::to_string).collect();
        assert_eq!(positions, vec!["1", "2", "0"]);
    }


    #[test]
    fn equal_numbers_fall_back_to_label_text() {
        let sorted = sort(&labels(&["5 b", "1", "5 a"]), "eixo");
        assert_eq!(axis(&sorted), vec!["1", "5 a", "5 b"]);
    }

    #[test]
    fn month_labels_come_out_chronological() {
        let sorted = sort(&labels(&["2025-03", "2024-12", "2025-01", "2025-02"]), "eixo");
        assert_eq!(axis(&sorted), vec!["2024-12", "2025-01", "2025-02", "2025-03"]);
    }

    #[test]
    fn identical_labels_keep_query_order() {
        let sorted = sort(&labels(&["3", "1", "3"]), "eixo");
        let positions: Vec<String> = sorted.values(1).map(ToString::to_string).collect();
        assert_eq!(positions, vec!["1", "0", "2"]);
    }

    #[test]
    fn nan_in_float_axis_sorts_after_numbers() {
        let values: Vec<Value> = (0..64i32)
            .map(|i| if i % 5 == 0 { Value::Float(f64::NAN) } else { Value::Float(f64::from(64 - i)) })
            .collect();
        let sorted = sort(&single(ColumnType::Float, values), "eixo");

        assert_eq!(sorted.len(), 64);
        let cells: Vec<&Value> = sorted.values(0).collect();
        let finite: Vec<f64> = cells.iter().filter_map(|v| v.as_f64()).collect();
        assert_eq!(finite.len(), 51);
        assert!(finite.windows(2).all(|w| w[0] <= w[1]));
        assert!(cells[51..].iter().all(|v| matches!(v, Value::Float(f) if f.is_nan())));
    }

    #[test]
    fn key_failure_keeps_original_order() {
        let input = labels(&["10-15%", "0-5%", "5-10%"]);
        let sorted = sort_with(&input, "eixo", || Err(KeyError::Pattern(Regex::new("(").unwrap_err())));
        assert_eq!(sorted, input);
    }

    #[test]
    fn missing_column_leaves_rows_untouched() {
        let input = labels(&["b", "a"]);
        assert_eq!(sort(&input, "nao_existe"), input);
    }
}
