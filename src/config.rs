use crate::error::{AppError, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// OPDS catalog server for a directory of ebooks.
#[derive(Parser, Debug, Clone)]
#[command(name = "shelf-rs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "SHELF_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Catalog root directory.
        #[arg(short, long, env = "SHELF_ROOT")]
        root: Option<PathBuf>,

        /// Public URL prefix used in feed links (e.g. http://192.168.1.10:8080).
        #[arg(long, env = "SHELF_BASE_URL")]
        base_url: Option<String>,
    },

    /// Print the most recently modified files under the root.
    Recent {
        /// Number of files.
        #[arg(short)]
        n: Option<String>,

        /// Oldest first instead of newest first.
        #[arg(long)]
        ascending: bool,

        /// Catalog root directory.
        #[arg(short, long, env = "SHELF_ROOT")]
        root: Option<PathBuf>,
    },

    /// Create a default config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Catalog directory configuration.
    #[serde(default)]
    pub library: LibraryConfig,

    /// External converter configuration.
    #[serde(default)]
    pub convert: ConvertConfig,

    /// Conversion cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Catalog title.
    #[serde(default = "default_title")]
    pub title: String,

    /// URL prefix clients use to reach this server. Required: readers
    /// resolve search and acquisition links against it.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            title: default_title(),
            base_url: None,
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        8080,
    )
}

fn default_title() -> String {
    "My Shelf".to_string()
}

/// Catalog directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Directory tree served by the catalog.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Number of entries in the recent listing when the client sends none.
    #[serde(default = "default_recent_count")]
    pub recent_count: usize,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            recent_count: default_recent_count(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("books")
}

fn default_recent_count() -> usize {
    crate::library::DEFAULT_RECENT_COUNT
}

/// External converter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertConfig {
    /// Converter executable, invoked as `<program> <source> <destination>`.
    #[serde(default = "default_program")]
    pub program: String,

    /// Target formats offered for conversion. Each is also a URL prefix.
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,

    /// Kill the converter after this many seconds (0 to disable).
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            formats: default_formats(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_program() -> String {
    "ebook-convert".to_string()
}

fn default_formats() -> Vec<String> {
    ["epub", "mobi", "azw3", "fb2", "txt"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_timeout() -> u64 {
    300
}

/// Conversion cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Parent directory for converted artifacts.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Maximum number of artifacts kept on disk.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    std::env::temp_dir()
}

/// A format tag is one or more dot-separated alphanumeric parts, e.g.
/// `epub` or `fb2.zip`.
fn is_format_tag(tag: &str) -> bool {
    tag.split('.')
        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric()))
}

fn default_max_entries() -> usize {
    32
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("shelf-rs.toml"),
            dirs::config_dir()
                .map(|p| p.join("shelf-rs").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/shelf-rs/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Check everything the server needs before it accepts traffic.
    pub fn validate(&self) -> Result<()> {
        match self.server.base_url.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(AppError::Config(
                    "server.base_url is required (or set SHELF_BASE_URL)".to_string(),
                ));
            }
            Some(_) => {}
        }

        if self.convert.formats.is_empty() {
            return Err(AppError::Config(
                "convert.formats must list at least one format".to_string(),
            ));
        }

        if let Some(bad) = self
            .convert
            .formats
            .iter()
            .find(|f| !is_format_tag(f))
        {
            return Err(AppError::Config(format!(
                "Invalid conversion format: {:?}",
                bad
            )));
        }

        if self.cache.max_entries == 0 {
            return Err(AppError::Config(
                "cache.max_entries must be at least 1".to_string(),
            ));
        }

        if !self.library.root.is_dir() {
            return Err(AppError::Config(format!(
                "Catalog root is not a directory: {}",
                self.library.root.display()
            )));
        }

        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.server
            .base_url
            .as_deref()
            .unwrap_or_default()
            .trim()
            .trim_end_matches('/')
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# shelf-rs configuration

[server]
bind = "0.0.0.0:8080"
title = "My Shelf"
# Required: the URL e-readers use to reach this server.
base_url = "http://192.168.1.10:8080"

[library]
root = "books"
recent_count = 50

[convert]
program = "ebook-convert"
formats = ["epub", "mobi", "azw3", "fb2", "txt"]
# Kill a hung conversion after this many seconds (0 to disable)
timeout_seconds = 300

[cache]
# dir = "/var/cache/shelf-rs"
max_entries = 32
"#
        .to_string()
    }
}
