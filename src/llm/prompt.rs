use minijinja::{Environment, context};

use crate::db::schema::warehouse_tables;
use crate::llm::LlmError;

const TEMPLATE_NAME: &str = "view_prompt";

/// Renders the authoring prompt for one user request.
pub fn build_prompt(request: &str) -> Result<String, LlmError> {
    let mut env = Environment::new();
    env.add_template(TEMPLATE_NAME, include_str!("../../templates/view_prompt.j2"))
        .map_err(|e| LlmError::Config(format!("prompt template: {}", e)))?;

    let tables: Vec<String> = warehouse_tables().iter().map(|t| t.to_prompt_line()).collect();

    env.get_template(TEMPLATE_NAME)
        .and_then(|template| template.render(context! { tables => tables, request => request.trim() }))
        .map_err(|e| LlmError::Config(format!("prompt template: {}", e)))
}
