//! Backend fleet configuration: a minimal TOML file naming the backend
//! servers `mcpmux` should connect to and how to reach each one.
//!
//! Compose-style YAML loading, environment-variable expansion, and the full
//! container/process runtime are external collaborators (§1); this is
//! deliberately a narrow, CLI-local format that exercises the engine end to
//! end without pulling in that machinery.

use std::path::Path;

use serde::Deserialize;

/// One `[[server]]` entry: a backend MCP server reached over stdio by
/// spawning `command` with `args`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Name other servers and the CLI refer to this backend by. Must not
    /// contain `.` or `:` (those delimit namespaced tool names and resource
    /// URIs once the orchestrator aggregates the fleet).
    pub name: String,
    /// Executable to spawn.
    pub command: String,
    /// Arguments passed to `command`.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the spawned process, `KEY=VALUE`.
    #[serde(default)]
    pub env: Vec<String>,
}

/// The top-level config file: a flat list of backend servers.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FleetConfig {
    /// Backend servers to register at startup.
    #[serde(rename = "server", default)]
    pub servers: Vec<ServerConfig>,
}

impl FleetConfig {
    /// Loads and parses a fleet config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
        toml::from_str(&text).map_err(|e| format!("parsing {}: {e}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_fleet() {
        let toml = r#"
            [[server]]
            name = "weather"
            command = "weather-mcp-server"
            args = ["--stdio"]
        "#;
        let config: FleetConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].name, "weather");
        assert_eq!(config.servers[0].args, vec!["--stdio"]);
    }

    #[test]
    fn empty_config_has_no_servers() {
        let config: FleetConfig = toml::from_str("").unwrap();
        assert!(config.servers.is_empty());
    }
}
