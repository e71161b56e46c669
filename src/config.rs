use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relgraph: RelgraphConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub images: ImageConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

/// Storage and process settings
#[derive(Debug, Clone, Deserialize)]
pub struct RelgraphConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Directory holding the numbered `.sql` migration files.
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for RelgraphConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            migrations_dir: default_migrations_dir(),
            log_level: default_log_level(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: Vec::new(),
        }
    }
}

/// Profile image storage settings
#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    /// Directory the processed images are written to.
    #[serde(default = "default_images_folder")]
    pub folder: PathBuf,
    /// Prefix of the reference stored in `imagen_url` and served over HTTP.
    #[serde(default = "default_images_url_prefix")]
    pub url_prefix: String,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
    /// Side of the square footprint every image is normalized to.
    #[serde(default = "default_image_size")]
    pub size: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            folder: default_images_folder(),
            url_prefix: default_images_url_prefix(),
            allowed_extensions: default_allowed_extensions(),
            max_file_size: default_max_file_size(),
            size: default_image_size(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

/// Visual attributes assigned by the graph aggregator
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_root_node_size")]
    pub root_node_size: u32,
    #[serde(default = "default_node_size")]
    pub node_size: u32,
    #[serde(default = "default_image_node_size")]
    pub image_node_size: u32,
    /// Strength at or above which an edge is "strong".
    #[serde(default = "default_strong_threshold")]
    pub strong_threshold: i64,
    /// Strength at or above which an edge is "medium".
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: i64,
    #[serde(default = "default_strong_color")]
    pub strong_color: String,
    #[serde(default = "default_medium_color")]
    pub medium_color: String,
    #[serde(default = "default_weak_color")]
    pub weak_color: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            root_node_size: default_root_node_size(),
            node_size: default_node_size(),
            image_node_size: default_image_node_size(),
            strong_threshold: default_strong_threshold(),
            medium_threshold: default_medium_threshold(),
            strong_color: default_strong_color(),
            medium_color: default_medium_color(),
            weak_color: default_weak_color(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("red_social.db")
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_images_folder() -> PathBuf {
    PathBuf::from("static/images/users")
}

fn default_images_url_prefix() -> String {
    "static/images/users".to_string()
}

fn default_allowed_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif", "webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_file_size() -> usize {
    5 * 1024 * 1024
}

fn default_image_size() -> u32 {
    150
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_root_node_size() -> u32 {
    50
}

fn default_node_size() -> u32 {
    30
}

fn default_image_node_size() -> u32 {
    80
}

fn default_strong_threshold() -> i64 {
    8
}

fn default_medium_threshold() -> i64 {
    6
}

fn default_strong_color() -> String {
    "#10b981".to_string()
}

fn default_medium_color() -> String {
    "#f59e0b".to_string()
}

fn default_weak_color() -> String {
    "#6b7280".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in RELGRAPH_CONFIG environment variable (must exist)
    /// 2. ./config.toml in current directory (built-in defaults when absent)
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config = match std::env::var("RELGRAPH_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let default_path = PathBuf::from("config.toml");
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    log::info!("No config.toml found, using built-in defaults");
                    Config::default()
                }
            }
        };

        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.images.allowed_extensions.is_empty() {
            anyhow::bail!("images.allowed_extensions must not be empty");
        }

        if self.images.url_prefix.trim_matches('/').is_empty() {
            anyhow::bail!("images.url_prefix must not be empty");
        }

        if self.images.max_file_size == 0 {
            anyhow::bail!("images.max_file_size must be greater than 0");
        }

        if self.images.size == 0 {
            anyhow::bail!("images.size must be greater than 0");
        }

        if self.images.jpeg_quality == 0 || self.images.jpeg_quality > 100 {
            anyhow::bail!("images.jpeg_quality must be between 1 and 100");
        }

        if self.graph.medium_threshold > self.graph.strong_threshold {
            anyhow::bail!(
                "graph.medium_threshold ({}) must not exceed graph.strong_threshold ({})",
                self.graph.medium_threshold,
                self.graph.strong_threshold
            );
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.relgraph.db_path
    }

    /// Get the migrations directory
    pub fn migrations_dir(&self) -> &Path {
        &self.relgraph.migrations_dir
    }
}
