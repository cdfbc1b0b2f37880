//! Configuration system for the Projboard console client.
//!
//! Same layering as the server: CLI arguments, then environment variables,
//! then a TOML config file (`~/.config/projboard/config.toml`), then
//! compiled defaults.

use std::path::PathBuf;

/// Errors that can occur when loading client configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// No username was supplied by CLI, env, or config file.
    #[error("no username configured; pass --username or set it in the config file")]
    MissingUsername,
}

/// Top-level TOML config file structure for the client.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ClientConfigFile {
    client: ClientFileSection,
}

/// `[client]` section of the client config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ClientFileSection {
    server_addr: Option<String>,
    username: Option<String>,
}

/// CLI arguments for the console client.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Projboard console client")]
pub struct ClientCliArgs {
    /// Address of the project server.
    #[arg(short, long, env = "PROJBOARD_SERVER")]
    pub server: Option<String>,

    /// Display name to join the project with.
    #[arg(short, long, env = "PROJBOARD_USERNAME")]
    pub username: Option<String>,

    /// Path to config file (default: `~/.config/projboard/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn", env = "PROJBOARD_LOG")]
    pub log_level: String,
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Address of the project server.
    pub server_addr: String,
    /// Display name to join with.
    pub username: String,
    /// Log level filter string.
    pub log_level: String,
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if no username is configured anywhere.
    pub fn load(cli: &ClientCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. The username has no default.
    fn resolve(cli: &ClientCliArgs, file: &ClientConfigFile) -> Result<Self, ConfigError> {
        let username = cli
            .username
            .clone()
            .or_else(|| file.client.username.clone())
            .ok_or(ConfigError::MissingUsername)?;
        Ok(Self {
            server_addr: cli
                .server
                .clone()
                .or_else(|| file.client.server_addr.clone())
                .unwrap_or_else(|| "127.0.0.1:12345".to_string()),
            username,
            log_level: cli.log_level.clone(),
        })
    }
}

/// Load and parse a TOML config file for the client.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<ClientConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ClientConfigFile::default());
        };
        config_dir.join("projboard").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
