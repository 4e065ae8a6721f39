//! Aggregated tool catalog across all connected servers.
//!
//! Tool names are flat: the model sees `get_time`, not `time-server/get_time`.
//! When two servers export the same name, the first registered wins and the
//! duplicate is logged and dropped. Registration order is descriptor order,
//! so the resolution is deterministic for a given configuration.

use std::collections::HashMap;

use serde_json::Value;

use super::types::ToolDescriptor;

// ─── Tool ───────────────────────────────────────────────────────────────────

/// A discovered tool, tagged with the server that exports it.
#[derive(Debug, Clone)]
pub struct Tool {
    pub server_id: String,
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments, passed through verbatim to the model.
    pub input_schema: Value,
}

impl Tool {
    pub fn from_descriptor(server_id: &str, d: ToolDescriptor) -> Self {
        // Providers may omit the schema; the gateway still wants an object.
        let input_schema = if d.input_schema.is_null() {
            serde_json::json!({ "type": "object", "properties": {} })
        } else {
            d.input_schema
        };
        Self {
            server_id: server_id.to_string(),
            name: d.name,
            description: d.description,
            input_schema,
        }
    }
}

// ─── Catalog ────────────────────────────────────────────────────────────────

/// Ordered, name-unique view of every tool the manager knows about.
#[derive(Debug, Default)]
pub struct ToolCatalog {
    tools: Vec<Tool>,
    by_name: HashMap<String, usize>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a server's tools, skipping names already claimed by an
    /// earlier registration.
    pub fn register(&mut self, tools: Vec<Tool>) {
        for tool in tools {
            if let Some(&existing) = self.by_name.get(&tool.name) {
                tracing::warn!(
                    tool = %tool.name,
                    winner = %self.tools[existing].server_id,
                    loser = %tool.server_id,
                    "duplicate tool name, keeping first registration"
                );
                continue;
            }
            self.by_name.insert(tool.name.clone(), self.tools.len());
            self.tools.push(tool);
        }
    }

    /// Drop every tool exported by `server_id`, keeping relative order of
    /// the rest. Used when a server disconnects.
    pub fn remove_server(&mut self, server_id: &str) {
        self.tools.retain(|t| t.server_id != server_id);
        self.by_name = self
            .tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
    }

    /// Map a flat tool name to its owning server.
    pub fn resolve(&self, name: &str) -> Option<&Tool> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn clear(&mut self) {
        self.tools.clear();
        self.by_name.clear();
    }

    /// Render the catalog as OpenAI-style function definitions for a chat
    /// completion request.
    pub fn to_gateway_definitions(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(server: &str, name: &str) -> Tool {
        Tool {
            server_id: server.into(),
            name: name.into(),
            description: format!("{name} from {server}"),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut catalog = ToolCatalog::new();
        catalog.register(vec![tool("time", "get_time"), tool("time", "set_alarm")]);

        assert_eq!(catalog.len(), 2);
        let resolved = catalog.resolve("get_time").unwrap();
        assert_eq!(resolved.server_id, "time");
        assert!(catalog.resolve("missing").is_none());
    }

    #[test]
    fn test_first_registration_wins_on_collision() {
        let mut catalog = ToolCatalog::new();
        catalog.register(vec![tool("alpha", "search")]);
        catalog.register(vec![tool("beta", "search"), tool("beta", "fetch")]);

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.resolve("search").unwrap().server_id, "alpha");
        assert_eq!(catalog.resolve("fetch").unwrap().server_id, "beta");
    }

    #[test]
    fn test_order_follows_registration() {
        let mut catalog = ToolCatalog::new();
        catalog.register(vec![tool("b", "two")]);
        catalog.register(vec![tool("a", "one")]);

        let names: Vec<&str> = catalog.tools().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["two", "one"]);
    }

    #[test]
    fn test_remove_server_reindexes() {
        let mut catalog = ToolCatalog::new();
        catalog.register(vec![tool("alpha", "search")]);
        catalog.register(vec![tool("beta", "fetch"), tool("beta", "store")]);

        catalog.remove_server("alpha");

        assert_eq!(catalog.len(), 2);
        assert!(catalog.resolve("search").is_none());
        assert_eq!(catalog.resolve("fetch").unwrap().server_id, "beta");
        assert_eq!(catalog.resolve("store").unwrap().server_id, "beta");
    }

    #[test]
    fn test_gateway_definitions_shape() {
        let mut catalog = ToolCatalog::new();
        catalog.register(vec![tool("time", "get_time")]);

        let defs = catalog.to_gateway_definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0]["type"], "function");
        assert_eq!(defs[0]["function"]["name"], "get_time");
        assert!(defs[0]["function"]["parameters"].is_object());
    }

    #[test]
    fn test_missing_schema_defaults_to_empty_object() {
        let t = Tool::from_descriptor(
            "time",
            ToolDescriptor {
                name: "get_time".into(),
                description: String::new(),
                input_schema: serde_json::Value::Null,
            },
        );
        assert_eq!(t.input_schema["type"], "object");
        assert!(t.description.is_empty());
    }
}
