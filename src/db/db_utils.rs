use duckdb::types::Value as DuckValue;

use crate::query::{ParamValue, QueryError, QueryParams};

/// A statement with `:name` placeholders rewritten to positional `?` and the
/// matching values in order.
#[derive(Debug)]
pub struct BoundStatement {
    pub sql: String,
    pub values: Vec<DuckValue>,
}

/// Rewrites named placeholders (`:data_inicio`) into positional parameters.
///
/// Quoted literals, quoted identifiers, comments and `::` casts are copied
/// through untouched. A name used twice is bound twice.
pub fn bind_named(sql: &str, params: &QueryParams) -> Result<BoundStatement, QueryError> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                let end = quoted_end(&chars, i, c);
                out.extend(&chars[i..end]);
                i = end;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                let end = chars[i..].iter().position(|&ch| ch == '\n').map_or(chars.len(), |p| i + p);
                out.extend(&chars[i..end]);
                i = end;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let end = find_block_comment_end(&chars, i + 2);
                out.extend(&chars[i..end]);
                i = end;
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                out.push_str("::");
                i += 2;
            }
            ':' if chars.get(i + 1).is_some_and(|ch| ch.is_ascii_alphabetic() || *ch == '_') => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                let value = params
                    .get(&name)
                    .ok_or_else(|| QueryError::MissingParameter(name.clone()))?;
                values.push(to_duck_value(value));
                out.push('?');
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Ok(BoundStatement { sql: out, values })
}

/// Index just past the closing quote; doubled quotes are escapes.
fn quoted_end(chars: &[char], start: usize, quote: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

fn find_block_comment_end(chars: &[char], from: usize) -> usize {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return i + 2;
        }
        i += 1;
    }
    chars.len()
}

// Dates travel as ISO text; DuckDB casts them to whatever type the
// placeholder's context expects (DATE, TIMESTAMP).
fn to_duck_value(value: &ParamValue) -> DuckValue {
    match value {
        ParamValue::Date(d) => DuckValue::Text(d.format("%Y-%m-%d").to_string()),
        ParamValue::Int(i) => DuckValue::BigInt(*i),
        ParamValue::Float(f) => DuckValue::Double(*f),
        ParamValue::Text(s) => DuckValue::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn params() -> QueryParams {
        QueryParams::new()
            .with("data_inicio", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
            .with("data_fim", NaiveDate::from_ymd_opt(2025, 1, 31).unwrap())
    }

    #[test]
    fn rewrites_placeholders_in_order() {
        let bound = bind_named(
            "SELECT * FROM pedidos WHERE criado_em BETWEEN :data_inicio AND :data_fim",
            &params(),
        )
        .unwrap();

        assert_eq!(bound.sql, "SELECT * FROM pedidos WHERE criado_em BETWEEN ? AND ?");
        assert_eq!(
            bound.values,
            vec![DuckValue::Text("2025-01-01".into()), DuckValue::Text("2025-01-31".into())]
        );
    }

    #[test]
    fn leaves_casts_literals_and_comments_alone() {
        let sql = "SELECT criado_em::DATE AS dia, ':data_fim' AS lit, \"a:b\" -- :nope\nFROM p /* :nope */ WHERE x > :data_inicio";
        let bound = bind_named(sql, &params()).unwrap();

        assert_eq!(
            bound.sql,
            "SELECT criado_em::DATE AS dia, ':data_fim' AS lit, \"a:b\" -- :nope\nFROM p /* :nope */ WHERE x > ?"
        );
        assert_eq!(bound.values.len(), 1);
    }

    #[test]
    fn repeated_names_bind_twice() {
        let bound = bind_named("SELECT :data_fim, :data_fim", &params()).unwrap();
        assert_eq!(bound.values.len(), 2);
    }

    #[test]
    fn missing_parameter_is_an_error() {
        let err = bind_named("SELECT :desconhecido", &params()).unwrap_err();
        assert!(matches!(err, QueryError::MissingParameter(name) if name == "desconhecido"));
    }

    #[test]
    fn sql_without_placeholders_is_unchanged() {
        let bound = bind_named("SELECT 1", &QueryParams::new()).unwrap();
        assert_eq!(bound.sql, "SELECT 1");
        assert!(bound.values.is_empty());
    }
}
