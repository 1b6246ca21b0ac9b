// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Manual memory operations exposed as model-callable tools.
//!
//! Each [`MemoryTool`] deserializes its JSON input into a typed struct and
//! calls one [`MemoryManager`] method. The [`ToolRegistry`] is built once at
//! startup and generates tool definitions for the provider request.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use mnemos_core::{MemoryContext, Metadata, MnemosError};

use crate::candidate::Candidate;
use crate::manager::{MemoryManager, MemoryUpdate};

const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Output from a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text or JSON handed back to the model.
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// A named operation the model can call with JSON input.
#[async_trait]
pub trait MemoryTool: Send + Sync {
    /// Unique name, used for lookup and in tool definitions.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the input object.
    fn parameters_schema(&self) -> Value;

    /// Runs the tool inside the caller's scope.
    async fn invoke(&self, ctx: &MemoryContext, input: Value) -> Result<ToolOutput, MnemosError>;
}

fn parse_input<T: DeserializeOwned>(tool: &str, input: Value) -> Result<T, MnemosError> {
    serde_json::from_value(input)
        .map_err(|e| MnemosError::invalid_record(format!("invalid input for {tool}: {e}")))
}

/// Registry of memory tools, indexed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn MemoryTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `memory_search`, `memory_add`, `memory_update` and
    /// `memory_delete`, all bound to `manager`.
    pub fn with_memory_tools(manager: Arc<MemoryManager>) -> Self {
        let mut registry = Self::new();
        let tools: [Arc<dyn MemoryTool>; 4] = [
            Arc::new(SearchTool(manager.clone())),
            Arc::new(AddTool(manager.clone())),
            Arc::new(UpdateTool(manager.clone())),
            Arc::new(DeleteTool(manager)),
        ];
        for tool in tools {
            registry.tools.insert(tool.name().to_string(), tool);
        }
        registry
    }

    /// Registers a tool under its `name()`. Names must be unique.
    pub fn register(&mut self, tool: Arc<dyn MemoryTool>) -> Result<(), MnemosError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(MnemosError::Config(format!("tool `{name}` is already registered")));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn MemoryTool>> {
        self.tools.get(name).cloned()
    }

    /// (name, description) pairs sorted by name.
    pub fn list(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .tools
            .values()
            .map(|t| (t.name(), t.description()))
            .collect();
        entries.sort_by_key(|(name, _)| *name);
        entries
    }

    /// Tool definitions in `{name, description, input_schema}` form, sorted by name.
    pub fn tool_definitions(&self) -> Vec<Value> {
        let mut defs: Vec<Value> = self
            .tools
            .values()
            .map(|t| {
                json!({
                    "name": t.name(),
                    "description": t.description(),
                    "input_schema": t.parameters_schema(),
                })
            })
            .collect();
        defs.sort_by(|a, b| {
            a["name"]
                .as_str()
                .unwrap_or("")
                .cmp(b["name"].as_str().unwrap_or(""))
        });
        defs
    }

    /// Invoke `name`. Unknown tools and tool failures come back as
    /// `is_error` outputs rather than errors.
    pub async fn invoke(&self, name: &str, ctx: &MemoryContext, input: Value) -> ToolOutput {
        let Some(tool) = self.get(name) else {
            return ToolOutput::error(format!("unknown tool: {name}"));
        };
        debug!(tool = name, owner_id = ctx.owner_id(), "invoking memory tool");
        match tool.invoke(ctx, input).await {
            Ok(output) => output,
            Err(e) => ToolOutput::error(e.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// --- memory_search ---

#[derive(Deserialize)]
struct SearchInput {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

struct SearchTool(Arc<MemoryManager>);

#[async_trait]
impl MemoryTool for SearchTool {
    fn name(&self) -> &str {
        "memory_search"
    }

    fn description(&self) -> &str {
        "Search long-term memory for facts relevant to a query."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "What to look for"},
                "limit": {"type": "integer", "minimum": 1, "description": "Maximum results"}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, ctx: &MemoryContext, input: Value) -> Result<ToolOutput, MnemosError> {
        let input: SearchInput = parse_input(self.name(), input)?;
        let limit = input.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        let retrieval = self.0.retrieve(&input.query, ctx, limit).await;
        if let Some(e) = retrieval.error {
            return Err(e);
        }
        let hits: Vec<Value> = retrieval
            .memories
            .iter()
            .map(|h| {
                json!({
                    "id": h.memory.id,
                    "content": h.memory.content,
                    "category": h.memory.category,
                    "similarity": h.similarity,
                })
            })
            .collect();
        Ok(ToolOutput::ok(Value::Array(hits).to_string()))
    }
}

// --- memory_add ---

#[derive(Deserialize)]
struct AddInput {
    content: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    importance: Option<f64>,
}

struct AddTool(Arc<MemoryManager>);

#[async_trait]
impl MemoryTool for AddTool {
    fn name(&self) -> &str {
        "memory_add"
    }

    fn description(&self) -> &str {
        "Store a fact in long-term memory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {"type": "string", "description": "The fact as a standalone statement"},
                "category": {"type": "string"},
                "importance": {"type": "number", "minimum": 0, "maximum": 1}
            },
            "required": ["content"]
        })
    }

    async fn invoke(&self, ctx: &MemoryContext, input: Value) -> Result<ToolOutput, MnemosError> {
        let input: AddInput = parse_input(self.name(), input)?;
        let candidate = Candidate {
            content: input.content,
            category: input.category,
            importance: input.importance,
            metadata: Metadata::new(),
        };
        let id = self.0.add_memory(candidate, ctx).await?;
        Ok(ToolOutput::ok(json!({ "id": id }).to_string()))
    }
}

// --- memory_update ---

#[derive(Deserialize)]
struct UpdateInput {
    id: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    importance: Option<f64>,
}

struct UpdateTool(Arc<MemoryManager>);

#[async_trait]
impl MemoryTool for UpdateTool {
    fn name(&self) -> &str {
        "memory_update"
    }

    fn description(&self) -> &str {
        "Correct or reclassify a stored memory by id."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "content": {"type": "string"},
                "category": {"type": "string"},
                "importance": {"type": "number", "minimum": 0, "maximum": 1}
            },
            "required": ["id"]
        })
    }

    async fn invoke(&self, ctx: &MemoryContext, input: Value) -> Result<ToolOutput, MnemosError> {
        let input: UpdateInput = parse_input(self.name(), input)?;
        let update = MemoryUpdate {
            content: input.content,
            category: input.category,
            importance: input.importance,
            ..MemoryUpdate::default()
        };
        let record = self.0.update_memory(&input.id, update, ctx).await?;
        Ok(ToolOutput::ok(
            json!({
                "id": record.id,
                "content": record.content,
                "category": record.category,
                "importance": record.importance,
            })
            .to_string(),
        ))
    }
}

// --- memory_delete ---

#[derive(Deserialize)]
struct DeleteInput {
    id: String,
}

struct DeleteTool(Arc<MemoryManager>);

#[async_trait]
impl MemoryTool for DeleteTool {
    fn name(&self) -> &str {
        "memory_delete"
    }

    fn description(&self) -> &str {
        "Forget a stored memory by id."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"id": {"type": "string"}},
            "required": ["id"]
        })
    }

    async fn invoke(&self, ctx: &MemoryContext, input: Value) -> Result<ToolOutput, MnemosError> {
        let input: DeleteInput = parse_input(self.name(), input)?;
        let deleted = self.0.delete_memory(&input.id, ctx).await?;
        Ok(ToolOutput::ok(json!({ "deleted": deleted }).to_string()))
    }
}
