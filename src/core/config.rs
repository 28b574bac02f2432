//! Configuration management for the body transform server.
//!
//! Configuration is read from an optional YAML file (with `${VAR}` expansion),
//! layered with `BODY_TRANSFORM__*` environment variables through the `config`
//! crate. `HOST` and `PORT` override the listen address.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::scripting::EngineConfig;

/// Default configuration file path, overridable with `CONFIG_PATH`.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Prefix for environment variables layered over the file.
const ENV_PREFIX: &str = "BODY_TRANSFORM";

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port)
    #[serde(default)]
    pub server: ServerConfig,

    /// Body transformation settings
    #[serde(default)]
    pub transform: TransformConfig,

    /// Where the standalone server forwards transformed requests
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

/// Which body the script rewrites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformMode {
    /// Rewrite the request body before it reaches the downstream handler
    #[default]
    Request,
    /// Rewrite the response body before it reaches the client
    Response,
}

impl TransformMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformMode::Request => "request",
            TransformMode::Response => "response",
        }
    }
}

impl std::fmt::Display for TransformMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for the body transform middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Inline Lua source defining `transform(body)`
    #[serde(default)]
    pub script: String,

    /// Path to a Lua source file, used when `script` is empty
    #[serde(default)]
    pub script_file: Option<PathBuf>,

    /// Which body is transformed; absent means request mode
    #[serde(default)]
    pub transform_type: TransformMode,

    /// Largest request body read in request mode
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Largest downstream response body captured in response mode
    #[serde(default = "default_max_body_bytes")]
    pub max_response_bytes: usize,

    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            script: String::new(),
            script_file: None,
            transform_type: TransformMode::default(),
            max_body_bytes: default_max_body_bytes(),
            max_response_bytes: default_max_body_bytes(),
            engine: EngineConfig::default(),
        }
    }
}

impl TransformConfig {
    /// Build a request- or response-mode config from inline source.
    pub fn inline(script: impl Into<String>, mode: TransformMode) -> Self {
        Self {
            script: script.into(),
            transform_type: mode,
            ..Self::default()
        }
    }

    /// Return the script source, reading `script_file` when no inline script
    /// is configured.
    pub fn resolve_script(&self) -> Result<String> {
        if !self.script.trim().is_empty() {
            return Ok(self.script.clone());
        }

        match &self.script_file {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("Failed to read script file: {}", path.display())),
            None => Err(anyhow::anyhow!(
                "transform.script or transform.script_file must be set"
            )),
        }
    }
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Upstream server the standalone binary proxies to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL requests are forwarded to
    #[serde(default = "default_upstream_url")]
    pub url: String,

    /// Upstream request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    /// Whether to verify SSL certificates for upstream requests
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            timeout_secs: default_request_timeout(),
            verify_ssl: default_verify_ssl(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    18080
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_upstream_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_request_timeout() -> u64 {
    300
}

fn default_verify_ssl() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from `CONFIG_PATH` (default `config.yaml`).
    pub fn from_env() -> Result<Self> {
        let path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(&path)
    }

    /// Load configuration from a YAML file layered with environment variables.
    ///
    /// A missing file is not an error: every setting has a default or can
    /// come from the environment.
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = Config::builder();

        match fs::read_to_string(path) {
            Ok(content) => {
                let expanded = expand_env_vars(&content);
                builder = builder.add_source(File::from_str(&expanded, FileFormat::Yaml));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path, "Config file not found, using defaults and environment");
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read config file: {}", path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        if let Ok(host) = std::env::var("HOST") {
            config.server.host = host;
        }

        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                config.server.port = port;
            }
        }

        Ok(config)
    }
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-?([^}]*))?\}")
            .expect("env var pattern is valid")
    })
}

/// Expand environment variables in configuration content.
///
/// Supports patterns: ${VAR}, ${VAR:-default}, ${VAR:default}
fn expand_env_vars(content: &str) -> String {
    env_var_pattern()
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
        })
        .to_string()
}
