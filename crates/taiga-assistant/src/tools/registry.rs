use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};

/// Executes one tool call. Always resolves: failures are returned as `{"error": ...}`.
pub type ToolHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Value> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Number,
    String,
    Boolean,
    StringArray,
}

/// One declared parameter of a tool
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub nullable: bool,
    pub description: &'static str,
}

impl ParamSpec {
    fn new(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            nullable: false,
            description,
        }
    }

    pub fn number(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::Number, description)
    }

    pub fn string(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::String, description)
    }

    pub fn boolean(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::Boolean, description)
    }

    pub fn string_array(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::StringArray, description)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Accepts an explicit null, which clears the field
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self.required = false;
        self
    }

    fn schema(&self) -> Value {
        let mut schema = match self.kind {
            ParamKind::Number => json!({"type": "number"}),
            ParamKind::String => json!({"type": "string"}),
            ParamKind::Boolean => json!({"type": "boolean"}),
            ParamKind::StringArray => json!({"type": "array", "items": {"type": "string"}}),
        };
        if self.nullable {
            let kind = schema["type"].take();
            schema["type"] = json!([kind, "null"]);
        }
        schema["description"] = json!(self.description);
        schema
    }
}

#[derive(Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
    handler: ToolHandler,
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl ToolDefinition {
    pub fn new(
        name: &'static str,
        description: &'static str,
        params: Vec<ParamSpec>,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name,
            description,
            params,
            handler,
        }
    }

    /// JSON schema object describing the parameters
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            properties.insert(param.name.to_string(), param.schema());
            if param.required {
                required.push(json!(param.name));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn tool(&self) -> Tool {
        Tool::new(self.name, self.description, self.input_schema())
    }

    pub async fn call(&self, arguments: Value) -> Value {
        (self.handler)(arguments).await
    }
}

/// Build a handler from a typed async function.
///
/// Arguments are decoded into `I` first; a decode failure or an `Err` from `f` both
/// resolve to an error object instead of propagating.
pub fn typed<I, F, Fut, E>(f: F) -> ToolHandler
where
    I: DeserializeOwned + Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, E>> + Send + 'static,
    E: Display,
{
    let f = Arc::new(f);
    Arc::new(move |arguments: Value| {
        let f = f.clone();
        async move {
            let arguments = if arguments.is_null() {
                json!({})
            } else {
                arguments
            };
            let input: I = match serde_json::from_value(arguments) {
                Ok(input) => input,
                Err(e) => return error_value(format!("Invalid parameters: {}", e)),
            };
            match f(input).await {
                Ok(value) => value,
                Err(e) => error_value(e.to_string()),
            }
        }
        .boxed()
    })
}

pub fn error_value<S: Into<String>>(message: S) -> Value {
    json!({"error": message.into()})
}

/// Whether a tool output reports a failure
pub fn is_error_output(output: &Value) -> bool {
    output.get("error").is_some_and(|e| !e.is_null())
}

/// The fixed set of tools bound to one chat request
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: ToolDefinition) -> AgentResult<()> {
        if self.index.contains_key(definition.name) {
            return Err(AgentError::Internal(format!(
                "Duplicate tool name: {}",
                definition.name
            )));
        }
        self.index.insert(definition.name, self.tools.len());
        self.tools.push(definition);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|i| &self.tools[*i])
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tools.iter().map(|t| t.name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool descriptions handed to the model
    pub fn tools(&self) -> Vec<Tool> {
        self.tools.iter().map(ToolDefinition::tool).collect()
    }

    /// Run a tool call. Only an unknown tool name is an `Err`; handler failures are values.
    pub async fn dispatch(&self, call: &ToolCall) -> AgentResult<Value> {
        let definition = self
            .get(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        info!(tool = definition.name, "running tool");
        let output = definition.call(call.arguments.clone()).await;
        if is_error_output(&output) {
            warn!(tool = definition.name, error = %output["error"], "tool returned an error");
        }
        Ok(output)
    }
}
