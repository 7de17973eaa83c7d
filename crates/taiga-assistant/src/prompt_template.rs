use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tera::{Context, Error as TeraError, Tera};

use crate::models::tool::Tool;

/// Built-in system instruction, rendered with `language` and `tools`
pub const SYSTEM_PROMPT: &str = include_str!("prompts/system.md");

pub const DEFAULT_LANGUAGE: &str = "English";

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

pub fn load_prompt_file<T: Serialize>(
    template_file: impl Into<PathBuf>,
    context_data: &T,
) -> Result<String, TeraError> {
    let template_path = template_file.into();
    let template_content = fs::read_to_string(&template_path).map_err(|e| {
        TeraError::chain(
            format!("Failed to read template file {}", template_path.display()),
            e,
        )
    })?;
    load_prompt(&template_content, context_data)
}

#[derive(Serialize)]
struct SystemContext<'a> {
    language: &'a str,
    tools: &'a [Tool],
}

/// Render the session's system instruction, from `template_file` when one is configured
pub fn system_prompt(
    template_file: Option<&PathBuf>,
    language: &str,
    tools: &[Tool],
) -> Result<String, TeraError> {
    let context = SystemContext { language, tools };
    match template_file {
        Some(path) => load_prompt_file(path.clone(), &context),
        None => load_prompt(SYSTEM_PROMPT, &context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::fs;

    #[test]
    fn test_load_prompt() {
        let template = "Hello, {{ name }}! You are {{ age }} years old.";
        let mut context = HashMap::new();
        context.insert("name".to_string(), "Alice".to_string());
        context.insert("age".to_string(), 30.to_string());

        let result = load_prompt(template, &context).unwrap();
        assert_eq!(result, "Hello, Alice! You are 30 years old.");
    }

    #[test]
    fn test_load_prompt_missing_variable() {
        let template = "Hello, {{ name }}! You are {{ age }} years old.";
        let mut context = HashMap::new();
        context.insert("name".to_string(), "Alice".to_string());
        // 'age' is missing from context
        let result = load_prompt(template, &context);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_prompt_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("system.md");
        fs::write(&file_path, "Answer in {{ language }}.").unwrap();

        let mut context = HashMap::new();
        context.insert("language".to_string(), "Spanish".to_string());

        let result = load_prompt_file(file_path, &context).unwrap();
        assert_eq!(result, "Answer in Spanish.");
    }

    #[test]
    fn test_load_prompt_file_missing_file() {
        let context: HashMap<String, String> = HashMap::new();
        let result = load_prompt_file("non_existent_template.txt", &context);
        assert!(result.is_err());
    }

    #[test]
    fn test_system_prompt_lists_tools() {
        let tools = vec![
            Tool::new("get_projects", "List projects", json!({"type": "object"})),
            Tool::new("get_task", "Get a task", json!({"type": "object"})),
        ];

        let prompt = system_prompt(None, DEFAULT_LANGUAGE, &tools).unwrap();
        assert!(prompt.contains("Always answer in English"));
        assert!(prompt.contains("- get_projects: List projects\n"));
        assert!(prompt.contains("- get_task: Get a task\n"));
    }

    #[test]
    fn test_system_prompt_override() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("custom.md");
        fs::write(&file_path, "{{ tools | length }} tools, {{ language }}").unwrap();

        let tools = vec![Tool::new("global_search", "Search", json!({}))];
        let prompt = system_prompt(Some(&file_path), "German", &tools).unwrap();
        assert_eq!(prompt, "1 tools, German");
    }
}
