use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// A value bound to a named placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Date(NaiveDate),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<NaiveDate> for ParamValue {
    fn from(value: NaiveDate) -> Self {
        ParamValue::Date(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

/// Named parameters, kept sorted by name so equal maps always produce the
/// same cache key regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryParams(BTreeMap<String, ParamValue>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<ParamValue>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Type-tagged, order-stable rendering used as the cache key.
    pub fn canonical_key(&self) -> String {
        let mut key = String::new();
        for (name, value) in &self.0 {
            let _ = match value {
                ParamValue::Date(d) => write!(key, "{}=d:{};", name, d),
                ParamValue::Int(i) => write!(key, "{}=i:{};", name, i),
                ParamValue::Float(f) => write!(key, "{}=f:{:?};", name, f),
                ParamValue::Text(s) => write!(key, "{}=t:{:?};", name, s),
            };
        }
        key
    }
}

/// The date range every component query is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalParams {
    pub data_inicio: NaiveDate,
    pub data_fim: NaiveDate,
}

impl GlobalParams {
    pub fn new(data_inicio: NaiveDate, data_fim: NaiveDate) -> Self {
        Self {
            data_inicio,
            data_fim,
        }
    }

    /// The `days`-long window ending at `today`, the batch job's default.
    pub fn last_days(days: i64, today: NaiveDate) -> Self {
        Self::new(today - Duration::days(days), today)
    }

    pub fn is_valid(&self) -> bool {
        self.data_inicio <= self.data_fim
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.data_inicio && date <= self.data_fim
    }

    /// Parameters bound into component SQL. The `_datetime` aliases exist for
    /// older views that reference them.
    pub fn to_query_params(&self) -> QueryParams {
        QueryParams::new()
            .with("data_inicio", self.data_inicio)
            .with("data_fim", self.data_fim)
            .with("data_inicio_datetime", self.data_inicio)
            .with("data_fim_datetime", self.data_fim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn canonical_key_ignores_insertion_order() {
        let a = QueryParams::new().with("data_fim", date(2025, 1, 31)).with("data_inicio", date(2025, 1, 1));
        let b = QueryParams::new().with("data_inicio", date(2025, 1, 1)).with("data_fim", date(2025, 1, 31));
        assert_eq!(a.canonical_key(), b.canonical_key());
    }

    #[test]
    fn canonical_key_distinguishes_types() {
        let as_date = QueryParams::new().with("x", date(2025, 1, 1));
        let as_text = QueryParams::new().with("x", "2025-01-01");
        assert_ne!(as_date.canonical_key(), as_text.canonical_key());
    }

    #[test]
    fn global_params_bind_both_names() {
        let params = GlobalParams::new(date(2025, 3, 1), date(2025, 3, 31)).to_query_params();
        assert_eq!(params.get("data_inicio"), Some(&ParamValue::Date(date(2025, 3, 1))));
        assert_eq!(params.get("data_fim"), Some(&ParamValue::Date(date(2025, 3, 31))));
        assert!(params.get("data_fim_datetime").is_some());
    }

    #[test]
    fn last_days_window_ends_today() {
        let window = GlobalParams::last_days(30, date(2025, 3, 31));
        assert_eq!(window.data_inicio, date(2025, 3, 1));
        assert!(window.contains(date(2025, 3, 31)));
        assert!(!window.contains(date(2025, 2, 28)));
    }
}
