//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "PSCORE_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "pscore.db";

/// Attachment directory name inside the root folder
pub const ATTACHMENTS_DIR: &str = "attachments";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5790;

/// Default lifetime of signed attachment URLs
pub const DEFAULT_URL_TTL_SECS: u64 = 900;

/// Contents of `config.toml`
///
/// Every field is optional; a missing file yields all defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub attachments: AttachmentConfig,
}

/// `[server]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// `[attachments]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AttachmentConfig {
    /// Secret for signing download URLs; generated and persisted when absent
    pub signing_secret: Option<String>,
    /// Lifetime of a signed URL in seconds
    pub url_ttl_secs: u64,
    /// Prefix for signed URLs (e.g. `https://scores.example.org`)
    pub public_base_url: Option<String>,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            signing_secret: None,
            url_ttl_secs: DEFAULT_URL_TTL_SECS,
            public_base_url: None,
        }
    }
}

impl TomlConfig {
    /// Parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse config text
    pub fn parse(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

        if config.attachments.url_ttl_secs == 0 {
            return Err(Error::Config(
                "attachments.url_ttl_secs must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }

    /// Load the platform config file, falling back to defaults
    ///
    /// A missing file is normal; an unreadable or invalid one is logged and ignored.
    pub fn load_or_default() -> Self {
        let Some(path) = config_file_path() else {
            debug!("No config file found, using defaults");
            return Self::default();
        };

        match Self::load(&path) {
            Ok(config) => {
                debug!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Locate the config file for the platform
///
/// Linux checks `~/.config/pscore/config.toml` then `/etc/pscore/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("pscore").join("config.toml"));
    if let Some(path) = user_config.filter(|p| p.exists()) {
        return Some(path);
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/pscore/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("pscore"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/pscore"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("pscore"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/pscore"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("pscore"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\pscore"))
    } else {
        PathBuf::from("./pscore_data")
    }
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. `PSCORE_ROOT_FOLDER` environment variable
/// 3. `root_folder` in the TOML config
/// 4. OS-dependent compiled default
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, toml: &TomlConfig) -> Self {
        Self {
            cli_arg,
            toml_root: toml.root_folder.clone(),
        }
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            return path.clone();
        }

        default_root_folder()
    }
}

/// Creates the root folder layout and derives file locations from it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.attachments_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.root.join(ATTACHMENTS_DIR)
    }
}
