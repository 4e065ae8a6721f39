//! Server configuration loading.
//!
//! Config is a single JSON file listing the tool servers to launch:
//!
//! ```json
//! {
//!   "servers": [
//!     { "id": "time", "command": "uv", "args": ["run", "time_server.py"] }
//!   ]
//! }
//! ```
//!
//! File order is preserved: it fixes catalog ordering and duplicate-name
//! resolution.

use std::path::Path;

use serde::Deserialize;

use crate::mcp::errors::McpError;
use crate::mcp::types::ServerDescriptor;

#[derive(Debug, Deserialize)]
struct ConfigFile {
    servers: Vec<ServerDescriptor>,
}

/// Load server descriptors from a JSON config file.
pub fn load_server_config(path: &Path) -> Result<Vec<ServerDescriptor>, McpError> {
    let raw = std::fs::read_to_string(path).map_err(|e| McpError::Config {
        reason: format!("cannot read {}: {e}", path.display()),
    })?;

    let parsed: ConfigFile = serde_json::from_str(&raw).map_err(|e| McpError::Config {
        reason: format!("cannot parse {}: {e}", path.display()),
    })?;

    let mut seen = std::collections::HashSet::new();
    for server in &parsed.servers {
        if server.id.is_empty() {
            return Err(McpError::Config {
                reason: "server id must not be empty".to_string(),
            });
        }
        if !seen.insert(server.id.clone()) {
            return Err(McpError::Config {
                reason: format!("duplicate server id '{}'", server.id),
            });
        }
    }

    tracing::debug!(servers = parsed.servers.len(), path = %path.display(), "loaded server config");
    Ok(parsed.servers)
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_preserves_order() {
        let file = write_config(
            r#"{
                "servers": [
                    { "id": "time", "command": "uv", "args": ["run", "time.py"] },
                    { "id": "files", "command": "node", "args": ["files.js"] }
                ]
            }"#,
        );

        let servers = load_server_config(file.path()).unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].id, "time");
        assert_eq!(servers[0].args, vec!["run", "time.py"]);
        assert_eq!(servers[1].id, "files");
    }

    #[test]
    fn test_optional_fields_default() {
        let file = write_config(r#"{ "servers": [{ "id": "t", "command": "srv" }] }"#);
        let servers = load_server_config(file.path()).unwrap();
        assert!(servers[0].args.is_empty());
        assert!(servers[0].env.is_empty());
        assert!(servers[0].working_dir.is_none());
        assert!(servers[0].display_name.is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let file = write_config(
            r#"{ "servers": [
                { "id": "t", "command": "a" },
                { "id": "t", "command": "b" }
            ] }"#,
        );
        let err = load_server_config(file.path()).unwrap_err();
        assert!(matches!(err, McpError::Config { ref reason } if reason.contains("duplicate")));
    }

    #[test]
    fn test_missing_file() {
        let err = load_server_config(Path::new("/nonexistent/servers.json")).unwrap_err();
        assert!(matches!(err, McpError::Config { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ not json");
        let err = load_server_config(file.path()).unwrap_err();
        assert!(matches!(err, McpError::Config { .. }));
    }
}
