use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_protocol::AgentServer;
use agent_server_mock::{MockServer, MOCK_SERVER_ID};
use stepwise::EnvConfig;

mod local;
mod recorded;

pub use local::{LocalServer, LOCAL_SERVER_ID};
pub use recorded::{RecordedServer, RECORDED_SERVER_PREFIX};

pub const DEFAULT_SERVER_ID: &str = LOCAL_SERVER_ID;

/// Resolves the server named by `STEPWISE_SERVER`, storing local sessions under
/// `STEPWISE_SESSION_DIR` or `<cwd>/.stepwise/sessions`.
pub fn server_from_config(config: &EnvConfig) -> Result<Arc<dyn AgentServer>, String> {
    let session_root = match &config.session_dir {
        Some(dir) => dir.clone(),
        None => default_session_root()?,
    };

    server_for_id(
        config.server.as_deref().unwrap_or(DEFAULT_SERVER_ID),
        &session_root,
    )
}

pub fn server_for_id(server_id: &str, session_root: &Path) -> Result<Arc<dyn AgentServer>, String> {
    if let Some(path) = server_id.strip_prefix(RECORDED_SERVER_PREFIX) {
        let server = RecordedServer::from_path(Path::new(path)).map_err(|error| error.to_string())?;
        return Ok(Arc::new(server));
    }

    match server_id {
        LOCAL_SERVER_ID => Ok(Arc::new(LocalServer::new(session_root))),
        MOCK_SERVER_ID => Ok(Arc::new(MockServer::new())),
        unknown => Err(format!(
            "Unsupported server '{unknown}'. Available servers: {LOCAL_SERVER_ID}, \
{MOCK_SERVER_ID}, {RECORDED_SERVER_PREFIX}<path>"
        )),
    }
}

fn default_session_root() -> Result<PathBuf, String> {
    let cwd = std::env::current_dir()
        .map_err(|error| format!("Failed to resolve working directory: {error}"))?;
    Ok(session_store::session_root(&cwd))
}
