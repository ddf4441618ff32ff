//! A [`ServerRuntime`] that spawns a backend server as a child process and
//! speaks stdio to it. The minimal "container/process runtime" this CLI
//! needs to exercise the orchestrator end to end; a real deployment swaps
//! this for its own runtime (health checks, restarts, log capture) without
//! touching the engine (§1).

use std::process::Stdio;
use std::sync::Arc;

use mcpmux_core::{McpError, McpResult};
use mcpmux_transport::{StdioTransport, Transport};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::ServerConfig;

/// Spawns `command args...` fresh on every [`ServerRuntime::connect`] call,
/// wiring its stdin/stdout into a [`StdioTransport`].
///
/// Holds the most recently spawned [`Child`] so the process stays alive for
/// as long as the runtime does; a reconnect drops (and, via
/// `kill_on_drop`, kills) the previous child before spawning a new one.
pub struct ProcessRuntime {
    config: ServerConfig,
    child: Mutex<Option<Child>>,
}

impl ProcessRuntime {
    /// Wraps a server config for later spawning.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            child: Mutex::new(None),
        }
    }
}

impl mcpmux::ServerRuntime for ProcessRuntime {
    fn connect(&self) -> mcpmux_transport::BoxFuture<'_, McpResult<Arc<dyn Transport>>> {
        Box::pin(async move {
            let mut command = Command::new(&self.config.command);
            command
                .args(&self.config.args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .kill_on_drop(true);
            for entry in &self.config.env {
                if let Some((key, value)) = entry.split_once('=') {
                    command.env(key, value);
                }
            }

            let mut child = command
                .spawn()
                .map_err(|e| McpError::transport_error(format!("spawning {}: {e}", self.config.command)))?;
            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| McpError::transport_error("child process has no stdin"))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| McpError::transport_error("child process has no stdout"))?;

            *self.child.lock().await = Some(child);

            let transport: Arc<dyn Transport> = Arc::new(StdioTransport::new(stdout, stdin));
            Ok(transport)
        })
    }
}
