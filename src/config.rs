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

//! Layered configuration loading (§12): compiled-in defaults, then
//! `<workspace>/.warpline/config.json`, then `WARPLINE_`-prefixed
//! environment variables.

use anyhow::{Context, Result};
use config::FileFormat;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Top-level configuration: a list of language server definitions.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Language server definitions, one per entry in the config file's
    /// `servers` array.
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// `ServerConfig` per spec §3: `{extensions, command, rootDir?,
/// restartIntervalMinutes?, initializationOptions?}`.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// File extensions this server handles, lowercased and dot-less.
    pub extensions: Vec<String>,

    /// The full command line: `[program, arg1, arg2, ...]`.
    pub command: Vec<String>,

    /// Workspace root for this server; defaults to the discovered project
    /// root when omitted.
    #[serde(default)]
    pub root_dir: Option<PathBuf>,

    /// Minutes between periodic clean restarts; `None` disables it.
    #[serde(default)]
    pub restart_interval_minutes: Option<f64>,

    /// Opaque `initializationOptions` forwarded verbatim to `initialize`.
    #[serde(default)]
    pub initialization_options: Option<serde_json::Value>,
}

impl ServerConfig {
    /// The server key used to identify a live `ServerState`: the JSON-encoded
    /// `command` array (spec §4.2).
    ///
    /// # Errors
    ///
    /// Returns an error only if `command` somehow fails to serialize, which
    /// cannot happen for a `Vec<String>`.
    pub fn server_key(&self) -> Result<String> {
        serde_json::to_string(&self.command).context("failed to encode server key")
    }

    /// Returns the normalized (lowercased, dot-less) extension set.
    #[must_use]
    pub fn extension_set(&self) -> HashSet<String> {
        self.extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect()
    }
}

impl Config {
    /// Loads configuration layered from defaults, project file, and
    /// environment variables.
    ///
    /// `workspace_root` is searched for `.warpline/config.json`;
    /// `explicit_file`, if given, is layered on top of that.
    ///
    /// # Errors
    ///
    /// Returns an error if any source fails to parse or the merged result
    /// cannot be deserialized into `Config`.
    pub fn load(workspace_root: Option<&Path>, explicit_file: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder().set_default("servers", Vec::<String>::new())?;

        if let Some(root) = workspace_root {
            let project_path = root.join(".warpline").join("config.json");
            if project_path.exists() {
                builder = builder
                    .add_source(config::File::from(project_path).format(FileFormat::Json));
            }
        }

        if let Some(path) = explicit_file {
            builder = builder.add_source(config::File::from(path).format(FileFormat::Json));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("WARPLINE")
                .separator("__")
                .try_parsing(true),
        );

        let built = builder.build().context("failed to build configuration")?;
        built
            .try_deserialize()
            .context("failed to deserialize configuration")
    }

    /// Picks the first `ServerConfig` whose extension set contains
    /// `extension` (first in config order wins, per spec §4.2 routing).
    #[must_use]
    pub fn server_for_extension(&self, extension: &str) -> Option<&ServerConfig> {
        let ext = extension.to_ascii_lowercase();
        self.servers
            .iter()
            .find(|s| s.extension_set().contains(&ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_project_config_json() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg_dir = dir.path().join(".warpline");
        std::fs::create_dir_all(&cfg_dir)?;
        let mut f = std::fs::File::create(cfg_dir.join("config.json"))?;
        write!(
            f,
            r#"{{ "servers": [ {{ "extensions": ["ts","tsx"], "command": ["typescript-language-server","--stdio"], "rootDir": ".", "restartIntervalMinutes": 60 }} ] }}"#
        )?;

        let cfg = Config::load(Some(dir.path()), None)?;
        assert_eq!(cfg.servers.len(), 1);
        assert_eq!(cfg.servers[0].extensions, vec!["ts", "tsx"]);
        assert_eq!(cfg.servers[0].restart_interval_minutes, Some(60.0));
        Ok(())
    }

    #[test]
    fn missing_config_yields_empty_servers() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = Config::load(Some(dir.path()), None)?;
        assert!(cfg.servers.is_empty());
        Ok(())
    }

    #[test]
    fn server_for_extension_first_match_wins() {
        let cfg = Config {
            servers: vec![
                ServerConfig {
                    extensions: vec!["ts".to_string()],
                    command: vec!["server-a".to_string()],
                    root_dir: None,
                    restart_interval_minutes: None,
                    initialization_options: None,
                },
                ServerConfig {
                    extensions: vec!["ts".to_string()],
                    command: vec!["server-b".to_string()],
                    root_dir: None,
                    restart_interval_minutes: None,
                    initialization_options: None,
                },
            ],
        };
        let found = cfg.server_for_extension("ts").expect("match");
        assert_eq!(found.command, vec!["server-a"]);
    }

    #[test]
    fn server_key_is_stable() -> Result<()> {
        let sc = ServerConfig {
            extensions: vec!["rs".to_string()],
            command: vec!["rust-analyzer".to_string()],
            root_dir: None,
            restart_interval_minutes: None,
            initialization_options: None,
        };
        assert_eq!(sc.server_key()?, r#"["rust-analyzer"]"#);
        Ok(())
    }
}
