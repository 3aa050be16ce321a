/*
 * Copyright (C) 2026 Mark Wells Dev
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Server supervisor (C3): one `ServerState` per distinct `serverKey`,
//! spawned lazily on first use and routed to by file extension.

use anyhow::Result;
use lsp_types::WorkspaceFolder;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{Config, ServerConfig};
use crate::error::BridgeError;
use crate::lsp::LspClient;
use crate::lsp::state::ServerLifecycle;

/// The concurrency cap on simultaneously live servers (spec §5).
pub const MAX_ACTIVE_SERVERS: usize = 8;

/// Full per-server record: configuration, live client, and lifecycle state
/// (spec §3 `ServerState`).
pub struct ServerState {
    /// The JSON-encoded command array identifying this server.
    pub key: String,
    /// The configuration this server was spawned from.
    pub config: ServerConfig,
    /// The live LSP client, or `None` if the process has crashed and not yet
    /// been respawned.
    pub client: Mutex<Option<Arc<LspClient>>>,
    lifecycle: Arc<AtomicU8>,
    /// Set when the server process has exited unexpectedly and not yet been
    /// cleared by a fresh spawn attempt.
    pub failed: Arc<AtomicBool>,
    spawned_at: Mutex<Instant>,
}

impl ServerState {
    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> ServerLifecycle {
        ServerLifecycle::from_u8(self.lifecycle.load(Ordering::SeqCst))
    }

    fn set_lifecycle(&self, state: ServerLifecycle) {
        self.lifecycle.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Seconds since this server instance was spawned.
    #[must_use]
    pub async fn uptime_secs(&self) -> u64 {
        self.spawned_at.lock().await.elapsed().as_secs()
    }

    /// Whether this server is due for a periodic clean restart.
    pub async fn due_for_restart(&self) -> bool {
        let Some(minutes) = self.config.restart_interval_minutes else {
            return false;
        };
        let elapsed = self.spawned_at.lock().await.elapsed();
        elapsed >= Duration::from_secs_f64(minutes * 60.0)
    }
}

/// Supervises the fleet of LSP server processes, spawning them lazily per
/// `serverKey`, routing by file extension, and enforcing the concurrency cap.
pub struct ClientManager {
    config: Config,
    roots: Mutex<Vec<PathBuf>>,
    servers: Mutex<HashMap<String, Arc<ServerState>>>,
    cap: usize,
}

impl ClientManager {
    /// Creates a manager rooted at `root` with servers drawn from `config`.
    #[must_use]
    pub fn new(config: Config, root: PathBuf) -> Self {
        Self {
            config,
            roots: Mutex::new(vec![root]),
            servers: Mutex::new(HashMap::new()),
            cap: MAX_ACTIVE_SERVERS,
        }
    }

    /// Replaces the set of workspace roots and notifies every live server of
    /// the change via `workspace/didChangeWorkspaceFolders` (spec §9 open
    /// question #1: explicit root sync, no priming-file workaround).
    ///
    /// # Errors
    ///
    /// Returns an error if notifying any live server fails; other servers
    /// are still notified best-effort.
    pub async fn sync_roots(&self, new_roots: Vec<PathBuf>) -> Result<()> {
        let added = Self::roots_to_folders(&new_roots);
        let removed = {
            let current = self.roots.lock().await;
            Self::roots_to_folders(&current)
        };

        *self.roots.lock().await = new_roots;

        let servers = self.servers.lock().await;
        for server in servers.values() {
            if server.lifecycle() != ServerLifecycle::Ready {
                continue;
            }
            let client = server.client.lock().await.clone();
            if let Some(client) = client
                && let Err(e) = client
                    .did_change_workspace_folders(added.clone(), removed.clone())
                    .await
            {
                warn!(server_key = %server.key, "failed to notify root change: {e}");
            }
        }
        Ok(())
    }

    fn roots_to_folders(roots: &[PathBuf]) -> Vec<WorkspaceFolder> {
        roots
            .iter()
            .filter_map(|r| {
                let uri = crate::path_utils::path_to_uri(r).ok()?;
                Some(WorkspaceFolder {
                    uri,
                    name: r
                        .file_name()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_else(|| "workspace".to_string()),
                })
            })
            .collect()
    }

    /// Returns the live, `Ready` server responsible for `extension`,
    /// spawning and initializing it if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NoServerForExtension`] if no config entry
    /// covers the extension, or [`BridgeError::AtCapacity`] if the
    /// concurrency cap would be exceeded by spawning a new server.
    pub async fn get_or_spawn(&self, extension: &str) -> Result<Arc<ServerState>, BridgeError> {
        let server_config = self
            .config
            .server_for_extension(extension)
            .ok_or_else(|| BridgeError::NoServerForExtension {
                extension: extension.to_string(),
            })?
            .clone();

        let key = server_config
            .server_key()
            .map_err(BridgeError::Internal)?;

        {
            let servers = self.servers.lock().await;
            if let Some(existing) = servers.get(&key) {
                let has_client = existing.client.lock().await.is_some();
                if has_client && !existing.failed.load(Ordering::SeqCst) {
                    return Ok(existing.clone());
                }
            }
        }

        let mut servers = self.servers.lock().await;
        if let Some(existing) = servers.get(&key) {
            let has_client = existing.client.lock().await.is_some();
            if has_client && !existing.failed.load(Ordering::SeqCst) {
                return Ok(existing.clone());
            }
        }

        if !servers.contains_key(&key) && servers.len() >= self.cap {
            return Err(BridgeError::AtCapacity {
                active: servers.len(),
                cap: self.cap,
            });
        }

        let state = match servers.remove(&key) {
            Some(existing) => existing,
            None => Arc::new(ServerState {
                key: key.clone(),
                config: server_config.clone(),
                client: Mutex::new(None),
                lifecycle: Arc::new(AtomicU8::new(ServerLifecycle::Spawning.as_u8())),
                failed: Arc::new(AtomicBool::new(false)),
                spawned_at: Mutex::new(Instant::now()),
            }),
        };

        self.spawn_into(&state, &server_config).await?;
        servers.insert(key, state.clone());
        Ok(state)
    }

    async fn spawn_into(
        &self,
        state: &Arc<ServerState>,
        server_config: &ServerConfig,
    ) -> Result<(), BridgeError> {
        state.set_lifecycle(ServerLifecycle::Spawning);
        state.failed.store(false, Ordering::SeqCst);

        info!(server_key = %state.key, command = ?server_config.command, "spawning language server");

        let extension = server_config
            .extensions
            .first()
            .map(String::as_str)
            .unwrap_or("plaintext");
        let language = crate::path_utils::language_id_for_extension(extension);

        let mut client = LspClient::spawn(&server_config.command, language)
            .await
            .map_err(BridgeError::Internal)?;

        state.set_lifecycle(ServerLifecycle::Initializing);

        let roots = self.roots.lock().await.clone();
        let roots = if let Some(root_dir) = &server_config.root_dir {
            vec![root_dir.clone()]
        } else {
            roots
        };

        client
            .initialize(&roots)
            .await
            .map_err(BridgeError::Internal)?;

        state.set_lifecycle(ServerLifecycle::Ready);
        *state.client.lock().await = Some(Arc::new(client));
        *state.spawned_at.lock().await = Instant::now();

        Ok(())
    }

    /// Returns a snapshot of all currently active servers.
    pub async fn active_servers(&self) -> Vec<Arc<ServerState>> {
        self.servers.lock().await.values().cloned().collect()
    }

    /// Clears the `failed` flag on any server whose process has since been
    /// observed crashed, allowing the next `get_or_spawn` to respawn it.
    pub async fn clear_failed_servers(&self) {
        let servers = self.servers.lock().await;
        for state in servers.values() {
            let dead = match state.client.lock().await.as_ref() {
                Some(client) => !client.is_alive(),
                None => false,
            };
            if dead {
                state.failed.store(true, Ordering::SeqCst);
                state.set_lifecycle(ServerLifecycle::Terminated);
            }
        }
    }

    /// Restarts any server whose `restartIntervalMinutes` has elapsed.
    ///
    /// # Errors
    ///
    /// Returns an error if respawning a due server fails.
    pub async fn restart_due_servers(&self) -> Result<(), BridgeError> {
        let due: Vec<Arc<ServerState>> = {
            let servers = self.servers.lock().await;
            let mut due = Vec::new();
            for state in servers.values() {
                if state.due_for_restart().await {
                    due.push(state.clone());
                }
            }
            due
        };

        for state in due {
            info!(server_key = %state.key, "periodic restart due");
            self.restart(&state).await?;
        }
        Ok(())
    }

    async fn restart(&self, state: &Arc<ServerState>) -> Result<(), BridgeError> {
        state.set_lifecycle(ServerLifecycle::Restarting);
        if let Some(client) = state.client.lock().await.take() {
            if let Some(mut client) = Arc::into_inner(client) {
                let _ = client.shutdown().await;
            }
        }
        let config = state.config.clone();
        self.spawn_into(state, &config).await
    }

    /// Restarts server(s) on demand (spec §6 `restart_server`): if
    /// `extensions` is given, restarts only the live servers covering one of
    /// them; otherwise restarts every active server. Returns the keys of the
    /// servers restarted.
    ///
    /// # Errors
    ///
    /// Returns an error if any restart fails; servers already restarted
    /// before the failure stay up on their fresh instance.
    pub async fn restart_servers(&self, extensions: Option<&[String]>) -> Result<Vec<String>, BridgeError> {
        let targets: Vec<Arc<ServerState>> = {
            let servers = self.servers.lock().await;
            match extensions {
                Some(exts) => servers
                    .values()
                    .filter(|s| exts.iter().any(|e| s.config.extension_set().contains(e)))
                    .cloned()
                    .collect(),
                None => servers.values().cloned().collect(),
            }
        };

        let mut restarted = Vec::new();
        for state in &targets {
            info!(server_key = %state.key, "restart requested");
            self.restart(state).await?;
            restarted.push(state.key.clone());
        }
        Ok(restarted)
    }

    /// Shuts down a specific server by key, if it exists.
    pub async fn shutdown_server(&self, key: &str) {
        let mut servers = self.servers.lock().await;
        if let Some(state) = servers.remove(key) {
            info!(server_key = %key, "shutting down language server");
            if let Some(client) = state.client.lock().await.take()
                && let Some(mut client) = Arc::into_inner(client)
                && client.is_alive()
                && let Err(e) = client.shutdown().await
            {
                warn!(server_key = %key, "failed to shut down cleanly: {e}");
            }
        }
    }

    /// Shuts down every active server.
    pub async fn shutdown_all(&self) {
        let keys: Vec<String> = self.servers.lock().await.keys().cloned().collect();
        for key in keys {
            self.shutdown_server(&key).await;
        }
    }

    /// Returns the workspace roots currently known to the manager.
    pub async fn roots(&self) -> Vec<PathBuf> {
        self.roots.lock().await.clone()
    }

    /// True if `extension` has no matching server configured.
    #[must_use]
    pub fn has_server_for(&self, extension: &str) -> bool {
        self.config.server_for_extension(extension).is_some()
    }
}

/// Extracts the file extension from a path for routing purposes.
#[must_use]
pub fn extension_for(path: &Path) -> Option<String> {
    crate::path_utils::extension_of(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn test_config() -> Config {
        Config {
            servers: vec![ServerConfig {
                extensions: vec!["rs".to_string()],
                command: vec!["nonexistent-lsp-binary-xyz".to_string()],
                root_dir: None,
                restart_interval_minutes: None,
                initialization_options: None,
            }],
        }
    }

    #[tokio::test]
    async fn unconfigured_extension_is_rejected() {
        let manager = ClientManager::new(test_config(), PathBuf::from("."));
        let result = manager.get_or_spawn("py").await;
        assert!(matches!(
            result,
            Err(BridgeError::NoServerForExtension { .. })
        ));
    }

    #[tokio::test]
    async fn spawn_failure_surfaces_as_internal_error() {
        let manager = ClientManager::new(test_config(), PathBuf::from("."));
        let result = manager.get_or_spawn("rs").await;
        assert!(result.is_err());
    }

    #[test]
    fn extension_for_path() {
        assert_eq!(
            extension_for(Path::new("src/main.rs")),
            Some("rs".to_string())
        );
    }
}
