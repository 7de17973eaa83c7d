//! Tools the model can call, and the catalog of backend operations.
pub mod registry;
pub mod taiga;

pub use registry::{ParamKind, ParamSpec, ToolDefinition, ToolHandler, ToolRegistry};
