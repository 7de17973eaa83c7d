use std::io::{self, Write};

use anyhow::Result;
use bat::WrappingMode;
use cliclack::spinner;
use console::style;
use serde_json::Value;
use taiga_assistant::models::chat::{ChatMessage, Part};
use taiga_assistant::protocol::StreamEvent;

use super::{Input, InputType, Prompt, Theme};

const PROMPT: &str = "\x1b[1m\x1b[38;5;30mtaiga> \x1b[0m";
const MAX_STRING_LENGTH: usize = 40;
const INDENT: &str = "    ";

pub struct RustylinePrompt {
    editor: rustyline::DefaultEditor,
    spinner: cliclack::ProgressBar,
    theme: Theme,
}

impl RustylinePrompt {
    pub fn new() -> Result<Self> {
        Ok(RustylinePrompt {
            editor: rustyline::DefaultEditor::new()?,
            spinner: spinner(),
            theme: Theme::Dark,
        })
    }

    fn theme_name(&self) -> &'static str {
        match self.theme {
            Theme::Light => "GitHub",
            Theme::Dark => "zenburn",
        }
    }
}

/// Map a typed line to the action it asks for
pub fn parse_input(line: &str) -> Input {
    let text = line.trim();
    let command = |input_type| Input {
        input_type,
        content: None,
    };

    match text.to_ascii_lowercase().as_str() {
        "/exit" | "/quit" => command(InputType::Exit),
        "/retry" => command(InputType::Retry),
        "/new" => command(InputType::NewSession),
        "/sessions" => command(InputType::ListSessions),
        "" => command(InputType::AskAgain),
        _ => Input {
            input_type: InputType::Message,
            content: Some(text.to_string()),
        },
    }
}

fn print_help() {
    println!("Commands:");
    println!("/exit - Exit the session");
    println!("/retry - Regenerate the last reply");
    println!("/new - Start a new conversation");
    println!("/sessions - List saved conversations");
    println!("/t - Toggle Light/Dark theme");
    println!("/? | /help - Display this help message");
    println!("Ctrl+C - Stop the reply (the interrupted message is not saved)");
}

fn print_markdown(content: &str, theme: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme(theme)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print();
    if printed.is_err() {
        println!("{}", content);
    }
}

fn print_tool_header(name: &str) {
    println!();
    println!(
        "─── {} | {} ──────────────────────────",
        style(name),
        style("taiga").magenta().dim(),
    );
}

/// One line describing what a tool returned
pub fn summarize_output(result: &Value) -> String {
    match result {
        Value::Array(items) => format!("{} item(s)", items.len()),
        Value::Object(map) => match map.get("success").and_then(Value::as_bool) {
            Some(true) => map
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("done")
                .to_string(),
            _ => format!("{} field(s)", map.len()),
        },
        Value::Null => "no result".to_string(),
        other => other.to_string(),
    }
}

/// Format and print parameters recursively with proper indentation and colors
fn print_params(value: &Value, depth: usize) {
    let indent = INDENT.repeat(depth);

    match value {
        Value::Object(map) => {
            for (key, val) in map {
                match val {
                    Value::Object(_) => {
                        println!("{}{}:", indent, style(key).dim());
                        print_params(val, depth + 1);
                    }
                    Value::Array(arr) => {
                        println!("{}{}:", indent, style(key).dim());
                        for item in arr.iter() {
                            println!("{}{}- ", indent, INDENT);
                            print_params(item, depth + 2);
                        }
                    }
                    Value::String(s) => {
                        if s.chars().count() > MAX_STRING_LENGTH {
                            println!("{}{}: {}", indent, style(key).dim(), style("...").dim());
                        } else {
                            println!("{}{}: {}", indent, style(key).dim(), style(s).green());
                        }
                    }
                    Value::Number(n) => {
                        println!("{}{}: {}", indent, style(key).dim(), style(n).blue());
                    }
                    Value::Bool(b) => {
                        println!("{}{}: {}", indent, style(key).dim(), style(b).blue());
                    }
                    Value::Null => {
                        println!("{}{}: {}", indent, style(key).dim(), style("null").dim());
                    }
                }
            }
        }
        Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                println!("{}{}.", indent, i + 1);
                print_params(item, depth + 1);
            }
        }
        Value::String(s) => println!("{}{}", indent, style(s).green()),
        Value::Number(n) => println!("{}{}", indent, style(n).yellow()),
        Value::Bool(b) => println!("{}{}", indent, style(b).yellow()),
        Value::Null => println!("{}{}", indent, style("null").dim()),
    }
}

impl Prompt for RustylinePrompt {
    fn render(&mut self, message: &ChatMessage) {
        let theme = self.theme_name();
        // tool calls were already shown as they ran
        for part in &message.parts {
            match part {
                Part::Text { text } => print_markdown(text, theme),
                Part::Reasoning { .. } | Part::ToolCall(_) => {}
            }
        }
        println!();
        let _ = io::stdout().flush();
    }

    fn render_event(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Reasoning { content } => {
                self.spinner.set_message(format!("Thinking... {}", content.trim()));
            }
            StreamEvent::Text { .. } => self.spinner.set_message("Writing..."),
            StreamEvent::ToolCallStart {
                tool_name, input, ..
            } => {
                self.hide_busy();
                print_tool_header(tool_name);
                print_params(input, 0);
                self.show_busy();
            }
            StreamEvent::ToolCallResult {
                result,
                is_error,
                error,
                ..
            } => {
                self.hide_busy();
                if *is_error {
                    let reason = error.as_deref().unwrap_or("Tool execution failed");
                    println!("{} {}", style("✗").red(), style(reason).red());
                } else {
                    println!("{} {}", style("✓").green(), style(summarize_output(result)).dim());
                }
                self.show_busy();
            }
            StreamEvent::Error { .. } | StreamEvent::Done => {}
        }
    }

    fn notice(&self, text: &str) {
        println!("{}", style(text).dim());
    }

    fn error(&self, text: &str) {
        eprintln!("{} {}", style("Error:").red().bold(), text);
    }

    fn show_busy(&mut self) {
        self.spinner = spinner();
        self.spinner.start("Thinking...");
    }

    fn hide_busy(&self) {
        self.spinner.stop("");
    }

    fn get_input(&mut self) -> Result<Input> {
        let line = match self.editor.readline(PROMPT) {
            Ok(line) => line,
            Err(e) => {
                match e {
                    rustyline::error::ReadlineError::Interrupted
                    | rustyline::error::ReadlineError::Eof => (),
                    _ => eprintln!("Input error: {}", e),
                }
                return Ok(Input {
                    input_type: InputType::Exit,
                    content: None,
                });
            }
        };
        let _ = self.editor.add_history_entry(line.as_str());

        let text = line.trim();
        if text.eq_ignore_ascii_case("/t") {
            self.theme = match self.theme {
                Theme::Light => {
                    println!("Switching to Dark theme");
                    Theme::Dark
                }
                Theme::Dark => {
                    println!("Switching to Light theme");
                    Theme::Light
                }
            };
            return Ok(Input {
                input_type: InputType::AskAgain,
                content: None,
            });
        }
        if text.eq_ignore_ascii_case("/?") || text.eq_ignore_ascii_case("/help") {
            print_help();
            return Ok(Input {
                input_type: InputType::AskAgain,
                content: None,
            });
        }
        Ok(parse_input(text))
    }

    fn close(&self) {
        // No cleanup required
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_input("/exit").input_type, InputType::Exit);
        assert_eq!(parse_input(" /QUIT ").input_type, InputType::Exit);
        assert_eq!(parse_input("/retry").input_type, InputType::Retry);
        assert_eq!(parse_input("/new").input_type, InputType::NewSession);
        assert_eq!(parse_input("/sessions").input_type, InputType::ListSessions);
        assert_eq!(parse_input("   ").input_type, InputType::AskAgain);

        let input = parse_input("  show sprint 3 ");
        assert_eq!(input.input_type, InputType::Message);
        assert_eq!(input.content.as_deref(), Some("show sprint 3"));
    }

    #[test]
    fn test_summarize_output() {
        assert_eq!(summarize_output(&json!([1, 2, 3])), "3 item(s)");
        assert_eq!(
            summarize_output(&json!({"success": true, "message": "Task created"})),
            "Task created"
        );
        assert_eq!(summarize_output(&json!({"id": 1, "name": "Atlas"})), "2 field(s)");
        assert_eq!(summarize_output(&Value::Null), "no result");
    }
}
