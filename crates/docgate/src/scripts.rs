//! Per-client program registry
//!
//! Resolves which external program handles a client's documents. Explicit
//! `[scripts.programs]` entries win; otherwise the conventional layout
//! `<dir>/<client>/<client>.py` is assumed and checked on disk.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::ScriptsConfig;

#[derive(Debug, Clone)]
pub struct ScriptRegistry {
    dir: PathBuf,
    programs: HashMap<String, PathBuf>,
}

impl ScriptRegistry {
    pub fn new(config: &ScriptsConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            programs: config.programs.clone(),
        }
    }

    /// Program path for a client, or `None` when the client is unknown.
    ///
    /// Explicit entries are trusted as configured; conventional candidates
    /// must exist on disk.
    pub fn resolve(&self, client: &str) -> Option<PathBuf> {
        if let Some(path) = self.programs.get(client) {
            return Some(path.clone());
        }
        if !valid_client_name(client) {
            return None;
        }
        let candidate = self.dir.join(client).join(format!("{client}.py"));
        candidate.is_file().then_some(candidate)
    }

    /// Every client with a resolvable program: explicit entries plus
    /// conventional subdirectories of the scripts dir.
    pub fn discover_clients(&self) -> Vec<String> {
        let mut clients: Vec<String> = self.programs.keys().cloned().collect();

        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if !valid_client_name(name) {
                    continue;
                }
                if entry.path().join(format!("{name}.py")).is_file() {
                    clients.push(name.to_string());
                }
            }
        }

        clients.sort();
        clients.dedup();
        clients
    }
}

/// Client names feed into filesystem paths; keep them boring.
fn valid_client_name(client: &str) -> bool {
    !client.is_empty()
        && client
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
