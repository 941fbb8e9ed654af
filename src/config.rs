//! Server configuration.
//!
//! A server reads one YAML document at startup describing what it is: a
//! leaf running a single farm or a root carrying the farm registry, in
//! development or production, listening where, federating with which root
//! server, and loading layout schemata from which directory. Every field
//! has a sensible default so an empty document boots a development leaf.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::farm::DEFAULT_ROOT_SERVER;
use crate::federation::RootClient;

/// What a server carries: one farm, or the registry of all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    Leaf,
    Root,
}

/// Whether the server federates with a root server.
///
/// Development leaves skip federation and assume a fixed root id, so a
/// laptop can run a full farm with no network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    Development,
    Production,
}

/// A configuration file that could not be read or parsed.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, message: String },
    Parse { path: PathBuf, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, message } => {
                write!(f, "could not read {}: {}", path.display(), message)
            }
            ConfigError::Parse { path, message } => {
                write!(f, "could not parse {}: {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Startup configuration for one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub kind: ServerKind,
    pub mode: ServerMode,
    /// Address and port to listen on.
    pub listen: String,
    /// Root server a production leaf announces itself to.
    pub root_server: String,
    /// Directory of layout schema documents to load alongside the stock
    /// schemata.
    pub schemata_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Parses a configuration document.
    pub fn parse(text: &str) -> Result<ServerConfig, serde_yml::Error> {
        serde_yml::from_str(text)
    }

    /// Reads and parses a configuration file.
    pub fn load(path: &Path) -> Result<ServerConfig, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        ServerConfig::parse(&text).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    /// Returns the client this server federates through, if any.
    ///
    /// Only a production leaf announces itself upward. Roots are the top of
    /// the hierarchy and development leaves stay local.
    pub fn root_client(&self) -> Option<RootClient> {
        match (self.kind, self.mode) {
            (ServerKind::Leaf, ServerMode::Production) => {
                Some(RootClient::new(self.root_server.clone()))
            }
            _ => None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            kind: ServerKind::Leaf,
            mode: ServerMode::Development,
            listen: "0.0.0.0:8000".to_string(),
            root_server: DEFAULT_ROOT_SERVER.to_string(),
            schemata_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_default_is_a_development_leaf() {
        let config = ServerConfig::default();
        assert_eq!(config.kind, ServerKind::Leaf);
        assert_eq!(config.mode, ServerMode::Development);
        assert_eq!(config.listen, "0.0.0.0:8000");
        assert_eq!(config.root_server, DEFAULT_ROOT_SERVER);
        assert_eq!(config.schemata_dir, None);
    }

    #[test]
    fn an_empty_document_is_the_default() {
        let config = ServerConfig::parse("{}").unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn documents_override_field_by_field() {
        let config = ServerConfig::parse(
            "kind: root\nmode: production\nlisten: 127.0.0.1:9000\nschemata_dir: /etc/trellis/schemata\n",
        )
        .unwrap();
        assert_eq!(config.kind, ServerKind::Root);
        assert_eq!(config.mode, ServerMode::Production);
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(
            config.schemata_dir,
            Some(PathBuf::from("/etc/trellis/schemata"))
        );
        // Unset fields keep their defaults.
        assert_eq!(config.root_server, DEFAULT_ROOT_SERVER);
    }

    #[test]
    fn unknown_kinds_fail_to_parse() {
        assert!(ServerConfig::parse("kind: branch\n").is_err());
    }

    #[test]
    fn only_production_leaves_federate() {
        let mut config = ServerConfig::default();
        assert!(config.root_client().is_none());

        config.mode = ServerMode::Production;
        let client = config.root_client().unwrap();
        assert_eq!(client.base_url(), DEFAULT_ROOT_SERVER);

        config.kind = ServerKind::Root;
        assert!(config.root_client().is_none());
    }

    #[test]
    fn missing_files_report_the_path() {
        let err = ServerConfig::load(Path::new("/nonexistent/trellis.yaml")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("/nonexistent/trellis.yaml"));
    }
}
