//! The persisted view document and its validated, typed form.
//!
//! JSON keys stay in Portuguese because stored documents and generator
//! output use them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("component {index} ('{title}') has no SQL")]
    MissingSql { index: usize, title: String },

    #[error("component {index} ('{title}') of type {kind} requires {axis}")]
    MissingAxis {
        index: usize,
        title: String,
        kind: &'static str,
        axis: &'static str,
    },

    #[error("component {index} ('{title}') has unknown type '{kind}'")]
    UnknownType {
        index: usize,
        title: String,
        kind: String,
    },

    #[error("invalid view document: {0}")]
    Json(#[from] serde_json::Error),
}

/// A stored view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub id: i64,
    pub name: String,
    pub prompt_description: Option<String>,
    pub structure: ViewStructure,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewStructure {
    #[serde(rename = "nome", default)]
    pub name: String,
    #[serde(rename = "componentes", default)]
    pub components: Vec<Component>,
    /// Keys this crate does not interpret, kept so the document round-trips.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ViewStructure {
    pub fn from_json(text: &str) -> Result<Self, SpecError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, SpecError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    #[serde(rename = "tipo")]
    pub kind: ComponentKind,
    #[serde(rename = "titulo", default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(rename = "eixo_x", default, skip_serializing_if = "Option::is_none")]
    pub x_axis: Option<String>,
    #[serde(rename = "eixo_y", default, skip_serializing_if = "Option::is_none")]
    pub y_axis: Option<String>,
    #[serde(rename = "eixo_y2", default, skip_serializing_if = "Option::is_none")]
    pub y_axis_2: Option<String>,
}

/// Component type tag. Unrecognised tags are carried through verbatim and
/// rejected only when the component is planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ComponentKind {
    Indicator,
    BarChart,
    LineChart,
    ComboChart,
    Table,
    Other(String),
}

impl ComponentKind {
    pub fn as_str(&self) -> &str {
        match self {
            ComponentKind::Indicator => "indicador",
            ComponentKind::BarChart => "grafico_barra",
            ComponentKind::LineChart => "grafico_linha",
            ComponentKind::ComboChart => "grafico_combinado",
            ComponentKind::Table => "tabela",
            ComponentKind::Other(tag) => tag,
        }
    }
}

impl From<String> for ComponentKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "indicador" => ComponentKind::Indicator,
            "grafico_barra" => ComponentKind::BarChart,
            "grafico_linha" => ComponentKind::LineChart,
            "grafico_combinado" => ComponentKind::ComboChart,
            "tabela" => ComponentKind::Table,
            _ => ComponentKind::Other(tag),
        }
    }
}

impl From<ComponentKind> for String {
    fn from(kind: ComponentKind) -> Self {
        match kind {
            ComponentKind::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

/// Axis bindings of a chart component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Axes<'a> {
    pub x: &'a str,
    pub y: &'a str,
}

/// A component that passed validation, ready to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentPlan<'a> {
    Indicator { title: &'a str, sql: &'a str },
    Bar { title: &'a str, sql: &'a str, axes: Axes<'a> },
    Line { title: &'a str, sql: &'a str, axes: Axes<'a> },
    Combo { title: &'a str, sql: &'a str, axes: Axes<'a>, y_axis_2: &'a str },
    Table { title: &'a str, sql: &'a str },
}

impl<'a> ComponentPlan<'a> {
    pub fn title(&self) -> &'a str {
        match *self {
            ComponentPlan::Indicator { title, .. }
            | ComponentPlan::Bar { title, .. }
            | ComponentPlan::Line { title, .. }
            | ComponentPlan::Combo { title, .. }
            | ComponentPlan::Table { title, .. } => title,
        }
    }

    pub fn sql(&self) -> &'a str {
        match *self {
            ComponentPlan::Indicator { sql, .. }
            | ComponentPlan::Bar { sql, .. }
            | ComponentPlan::Line { sql, .. }
            | ComponentPlan::Combo { sql, .. }
            | ComponentPlan::Table { sql, .. } => sql,
        }
    }
}

impl Component {
    /// Validates the component at position `index` and returns its typed plan.
    pub fn plan(&self, index: usize) -> Result<ComponentPlan<'_>, SpecError> {
        let title = self.title.as_str();
        let sql = self
            .sql
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| SpecError::MissingSql {
                index,
                title: title.to_string(),
            })?;

        Ok(match &self.kind {
            ComponentKind::Indicator => ComponentPlan::Indicator { title, sql },
            ComponentKind::Table => ComponentPlan::Table { title, sql },
            ComponentKind::BarChart => ComponentPlan::Bar {
                title,
                sql,
                axes: self.axes(index, "grafico_barra")?,
            },
            ComponentKind::LineChart => ComponentPlan::Line {
                title,
                sql,
                axes: self.axes(index, "grafico_linha")?,
            },
            ComponentKind::ComboChart => ComponentPlan::Combo {
                title,
                sql,
                axes: self.axes(index, "grafico_combinado")?,
                y_axis_2: self.required(&self.y_axis_2, index, "grafico_combinado", "eixo_y2")?,
            },
            ComponentKind::Other(kind) => {
                return Err(SpecError::UnknownType {
                    index,
                    title: title.to_string(),
                    kind: kind.clone(),
                });
            }
        })
    }

    fn axes(&self, index: usize, kind: &'static str) -> Result<Axes<'_>, SpecError> {
        Ok(Axes {
            x: self.required(&self.x_axis, index, kind, "eixo_x")?,
            y: self.required(&self.y_axis, index, kind, "eixo_y")?,
        })
    }

    fn required<'a>(
        &self,
        value: &'a Option<String>,
        index: usize,
        kind: &'static str,
        axis: &'static str,
    ) -> Result<&'a str, SpecError> {
        value
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SpecError::MissingAxis {
                index,
                title: self.title.clone(),
                kind,
                axis,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "nome": "Vendas",
        "componentes": [
            {"tipo": "indicador", "titulo": "Faturamento", "sql": "SELECT SUM(valor_total) FROM pedidos"},
            {"tipo": "grafico_combinado", "titulo": "Volume x Ticket", "sql": "SELECT 1",
             "eixo_x": "mes", "eixo_y": "total_vendas", "eixo_y2": "ticket_medio"},
            {"tipo": "tabela", "titulo": "Top", "sql": "SELECT 1"}
        ],
        "versao_layout": 2
    }"#;

    #[test]
    fn document_round_trips_field_for_field() {
        let parsed = ViewStructure::from_json(SAMPLE).unwrap();
        let reparsed = ViewStructure::from_json(&parsed.to_json().unwrap()).unwrap();

        assert_eq!(parsed.components, reparsed.components);
        assert_eq!(reparsed.extra.get("versao_layout"), Some(&serde_json::json!(2)));
        assert_eq!(parsed.components[1].kind, ComponentKind::ComboChart);
        assert_eq!(parsed.components[1].y_axis_2.as_deref(), Some("ticket_medio"));
    }

    #[test]
    fn unknown_type_survives_round_trip_but_fails_planning() {
        let json = r#"{"nome": "x", "componentes": [{"tipo": "mapa", "titulo": "M", "sql": "SELECT 1"}]}"#;
        let parsed = ViewStructure::from_json(json).unwrap();
        let text = parsed.to_json().unwrap();
        assert!(text.contains(r#""tipo":"mapa""#));

        let err = parsed.components[0].plan(0).unwrap_err();
        assert!(matches!(err, SpecError::UnknownType { kind, .. } if kind == "mapa"));
    }

    #[test]
    fn combo_without_second_axis_is_invalid() {
        let component = Component {
            kind: ComponentKind::ComboChart,
            title: "C".into(),
            sql: Some("SELECT 1".into()),
            x_axis: Some("x".into()),
            y_axis: Some("y".into()),
            y_axis_2: None,
        };
        let err = component.plan(3).unwrap_err();
        assert!(matches!(err, SpecError::MissingAxis { index: 3, axis: "eixo_y2", .. }));
    }

    #[test]
    fn chart_plans_carry_axes() {
        let parsed = ViewStructure::from_json(SAMPLE).unwrap();
        let plan = parsed.components[1].plan(1).unwrap();
        assert_eq!(
            plan,
            ComponentPlan::Combo {
                title: "Volume x Ticket",
                sql: "SELECT 1",
                axes: Axes { x: "mes", y: "total_vendas" },
                y_axis_2: "ticket_medio",
            }
        );
        assert!(matches!(parsed.components[0].plan(0).unwrap(), ComponentPlan::Indicator { .. }));
    }

    #[test]
    fn missing_sql_is_invalid() {
        let component = Component {
            kind: ComponentKind::Table,
            title: "T".into(),
            sql: Some("   ".into()),
            x_axis: None,
            y_axis: None,
            y_axis_2: None,
        };
        assert!(matches!(component.plan(0), Err(SpecError::MissingSql { .. })));
    }
}
