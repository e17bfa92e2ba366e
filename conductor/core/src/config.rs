//! TOML Configuration File Support
//!
//! Endpoint settings and HTTP tuning live in
//! `~/.config/ibops-chat/config.toml`.
//!
//! # Configuration Priority
//!
//! Values are loaded with the following priority (highest first):
//! 1. Environment variables (`IBOPS_MODE`, `IBOPS_TOKEN`, `IBOPS_RESOURCE_ID`,
//!    `IBOPS_LOCAL_URL`)
//! 2. TOML configuration file
//! 3. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [endpoint]
//! mode = "remote"
//! token = "eyJ..."
//! resource_id = "arn:aws:bedrock-agentcore:us-east-1:123456789012:runtime/ibops"
//! session_header = "X-Amzn-Bedrock-AgentCore-Runtime-Session-Id"
//!
//! [stream]
//! trailing_line = "discard"
//!
//! [http]
//! connect_timeout_secs = 10
//! read_timeout_secs = 120
//! system_proxy = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::HttpSettings;
use crate::endpoint::{DeploymentMode, EndpointConfig, EndpointSetting};
use crate::error::ConfigError;
use crate::streaming::TrailingLinePolicy;

/// Environment variable names
pub mod env {
    /// Deployment mode (`local` / `remote`)
    pub const MODE: &str = "IBOPS_MODE";
    /// Bearer token
    pub const TOKEN: &str = "IBOPS_TOKEN";
    /// Agent resource identifier
    pub const RESOURCE_ID: &str = "IBOPS_RESOURCE_ID";
    /// Local endpoint URL
    pub const LOCAL_URL: &str = "IBOPS_LOCAL_URL";
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// At least one value from an environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[endpoint]` section
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointToml {
    /// `local` or `remote`
    pub mode: Option<String>,
    /// Bearer token for remote mode
    pub token: Option<String>,
    /// Agent resource identifier for remote mode
    pub resource_id: Option<String>,
    /// Local endpoint URL
    pub local_url: Option<String>,
    /// Remote host template containing `{region}`
    pub provider_host: Option<String>,
    /// Session correlation header name
    pub session_header: Option<String>,
}

/// `[stream]` section
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// `discard` or `flush`
    pub trailing_line: Option<String>,
}

/// `[http]` section
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpToml {
    /// Connect timeout in seconds
    pub connect_timeout_secs: Option<u64>,
    /// Idle timeout between body reads in seconds (0 = unbounded)
    pub read_timeout_secs: Option<u64>,
    /// Honour proxy environment variables
    pub system_proxy: Option<bool>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Endpoint section
    pub endpoint: EndpointToml,
    /// Stream decoding section
    pub stream: StreamToml,
    /// HTTP client section
    pub http: HttpToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved client configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatConfig {
    /// Where requests go and with which credentials
    pub endpoint: EndpointConfig,
    /// HTTP client settings
    pub http: HttpSettings,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            http: HttpSettings::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ChatConfig {
    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Convert back into the on-disk representation
    #[must_use]
    pub fn to_toml(&self) -> ChatToml {
        ChatToml {
            endpoint: endpoint_to_toml(&self.endpoint),
            stream: StreamToml {
                trailing_line: Some(policy_name(self.http.trailing_line).to_string()),
            },
            http: HttpToml {
                connect_timeout_secs: Some(self.http.connect_timeout.as_secs()),
                read_timeout_secs: Some(self.http.read_timeout.map_or(0, |t| t.as_secs())),
                system_proxy: Some(self.http.system_proxy),
            },
        }
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/ibops-chat/config.toml` or
/// `~/.config/ibops-chat/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ibops-chat").join("config.toml"))
}

/// Load configuration from the default path and the process environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed,
/// or holds an invalid value. A missing file is not an error.
pub fn load_config() -> Result<ChatConfig, ConfigError> {
    let mut config = load_config_from_path(default_config_path())?;
    ConfigOverrides::from_env().apply(&mut config)?;
    Ok(config)
}

/// Load configuration from a specific file, without environment overrides
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ChatConfig, ConfigError> {
    let mut config = ChatConfig::default();

    let Some(config_path) = path else {
        return Ok(config);
    };

    if !config_path.exists() {
        tracing::debug!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        config.config_file_path = Some(config_path);
        return Ok(config);
    }

    let toml_content =
        std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
            path: config_path.clone(),
            source: e,
        })?;

    let toml_config: ChatToml = toml::from_str(&toml_content)?;
    apply_toml_config(&mut config, &toml_config)?;
    config.source = ConfigSource::File;

    tracing::info!(
        path = %config_path.display(),
        mode = %config.endpoint.mode,
        "Loaded configuration from file"
    );
    config.config_file_path = Some(config_path);

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ChatConfig, toml: &ChatToml) -> Result<(), ConfigError> {
    let endpoint = &toml.endpoint;
    if let Some(ref mode) = endpoint.mode {
        config.endpoint.mode = parse_mode(mode)?;
    }
    if endpoint.token.is_some() {
        config.endpoint.token = endpoint.token.clone();
    }
    if endpoint.resource_id.is_some() {
        config.endpoint.resource_id = endpoint.resource_id.clone();
    }
    if let Some(ref url) = endpoint.local_url {
        config.endpoint.local_url = url.clone();
    }
    if let Some(ref host) = endpoint.provider_host {
        if !host.contains("{region}") {
            return Err(ConfigError::ValidationError(format!(
                "provider_host '{host}' must contain {{region}}"
            )));
        }
        config.endpoint.provider_host = host.clone();
    }
    if let Some(ref header) = endpoint.session_header {
        if header.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "session_header must not be empty".to_string(),
            ));
        }
        config.endpoint.session_header = header.clone();
    }

    if let Some(ref policy) = toml.stream.trailing_line {
        config.http.trailing_line = TrailingLinePolicy::parse(policy).ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "trailing_line must be 'discard' or 'flush', got '{policy}'"
            ))
        })?;
    }

    if let Some(secs) = toml.http.connect_timeout_secs {
        config.http.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.http.read_timeout_secs {
        config.http.read_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if let Some(enabled) = toml.http.system_proxy {
        config.http.system_proxy = enabled;
    }

    Ok(())
}

fn parse_mode(mode: &str) -> Result<DeploymentMode, ConfigError> {
    DeploymentMode::parse(mode).ok_or_else(|| {
        ConfigError::ValidationError(format!("mode must be 'local' or 'remote', got '{mode}'"))
    })
}

fn policy_name(policy: TrailingLinePolicy) -> &'static str {
    match policy {
        TrailingLinePolicy::Discard => "discard",
        TrailingLinePolicy::Flush => "flush",
    }
}

fn endpoint_to_toml(endpoint: &EndpointConfig) -> EndpointToml {
    EndpointToml {
        mode: Some(endpoint.mode.as_str().to_string()),
        token: endpoint.token.clone(),
        resource_id: endpoint.resource_id.clone(),
        local_url: Some(endpoint.local_url.clone()),
        provider_host: Some(endpoint.provider_host.clone()),
        session_header: Some(endpoint.session_header.clone()),
    }
}

// =============================================================================
// Saving
// =============================================================================

/// Write the full configuration to `path`, creating parent directories
///
/// # Errors
///
/// Returns an error if the file cannot be serialized or written.
pub fn save_config_to_path(path: &Path, config: &ChatConfig) -> Result<(), ConfigError> {
    write_toml(path, &config.to_toml())
}

/// Write one endpoint setting into the file at `path`
///
/// Only that field changes. Everything else stays as it is on disk, so
/// values supplied through the environment are never written out.
///
/// # Errors
///
/// Returns an error if the existing file cannot be read or parsed, or the
/// result cannot be written.
pub fn save_setting_to_path(path: &Path, setting: &EndpointSetting) -> Result<(), ConfigError> {
    let mut toml_config = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str::<ChatToml>(&content)?
    } else {
        ChatToml::default()
    };

    let endpoint = &mut toml_config.endpoint;
    match setting {
        EndpointSetting::Mode(mode) => endpoint.mode = Some(mode.as_str().to_string()),
        EndpointSetting::Token(token) => endpoint.token = token.clone(),
        EndpointSetting::ResourceId(id) => endpoint.resource_id = Some(id.clone()),
    }
    write_toml(path, &toml_config)
}

fn write_toml(path: &Path, toml_config: &ChatToml) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::WriteError {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let content = toml::to_string_pretty(toml_config)?;
    std::fs::write(path, content).map_err(write_err)?;

    // File may hold a bearer token
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(write_err)?;
    }

    tracing::info!(path = %path.display(), "Saved configuration");
    Ok(())
}

// =============================================================================
// Environment Overrides
// =============================================================================

/// Overrides applied on top of the file configuration
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Deployment mode override (raw spelling)
    pub mode: Option<String>,
    /// Token override
    pub token: Option<String>,
    /// Resource identifier override
    pub resource_id: Option<String>,
    /// Local URL override
    pub local_url: Option<String>,
}

impl std::fmt::Debug for ConfigOverrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigOverrides")
            .field("mode", &self.mode)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("resource_id", &self.resource_id)
            .field("local_url", &self.local_url)
            .finish()
    }
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary lookup (empty values are ignored)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key| lookup(key).filter(|v: &String| !v.trim().is_empty());
        Self {
            mode: get(env::MODE),
            token: get(env::TOKEN),
            resource_id: get(env::RESOURCE_ID),
            local_url: get(env::LOCAL_URL),
        }
    }

    /// Set local URL override
    #[must_use]
    pub fn with_local_url(mut self, url: impl Into<String>) -> Self {
        self.local_url = Some(url.into());
        self
    }

    /// Whether any override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mode.is_none()
            && self.token.is_none()
            && self.resource_id.is_none()
            && self.local_url.is_none()
    }

    /// Apply overrides to a configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the mode override is not a known mode.
    pub fn apply(&self, config: &mut ChatConfig) -> Result<(), ConfigError> {
        if self.is_empty() {
            return Ok(());
        }

        if let Some(ref mode) = self.mode {
            config.endpoint.mode = parse_mode(mode)?;
        }
        if self.token.is_some() {
            config.endpoint.token = self.token.clone();
        }
        if self.resource_id.is_some() {
            config.endpoint.resource_id = self.resource_id.clone();
        }
        if let Some(ref url) = self.local_url {
            config.endpoint.local_url = url.clone();
        }

        config.source = ConfigSource::Env;
        tracing::debug!(overrides = ?self, "Applied environment overrides");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
