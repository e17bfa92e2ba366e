//! Transport Resolution
//!
//! Turns the deployment mode and stored credentials into a concrete request
//! target: URL plus header set. Everything here is pure; no I/O happens until
//! a backend receives the [`ResolvedTarget`].
//!
//! # Remote identifiers
//!
//! Remote agents are addressed by a colon-delimited resource identifier:
//!
//! ```text
//! arn:aws:bedrock-agentcore:us-east-1:123456789012:runtime/agent-id
//!  │   │        │              │           │            └ resource-type/resource-id
//!  │   │        │              │           └ account
//!  │   │        │              └ region (4th field)
//!  │   │        └ service
//!  │   └ provider
//!  └ scheme
//! ```

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ValidationError};
use crate::messages::SessionId;

/// Loopback endpoint used in local mode
pub const DEFAULT_LOCAL_URL: &str = "http://localhost:8080/invocations";

/// Remote host template, `{region}` is substituted
pub const DEFAULT_PROVIDER_HOST: &str = "bedrock-agentcore.{region}.amazonaws.com";

/// Header carrying the session correlation ID in remote mode
pub const DEFAULT_SESSION_HEADER: &str = "X-Session-Id";

/// Path-segment escape set: everything except unreserved marks `-_.!~*'()`
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Where requests go
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Agent running on this machine, no auth
    #[default]
    Local,
    /// Managed remote runtime, bearer auth
    Remote,
}

impl DeploymentMode {
    /// Config/command spelling
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }

    /// Parse the config/command spelling (`deployed` is accepted for remote)
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Some(Self::Local),
            "remote" | "deployed" => Some(Self::Remote),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Endpoint settings supplied by configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Deployment mode
    pub mode: DeploymentMode,
    /// Bearer token (remote mode)
    pub token: Option<String>,
    /// Agent resource identifier (remote mode)
    pub resource_id: Option<String>,
    /// Full URL used in local mode
    pub local_url: String,
    /// Remote host template containing `{region}`
    pub provider_host: String,
    /// Name of the session correlation header
    pub session_header: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::Local,
            token: None,
            resource_id: None,
            local_url: DEFAULT_LOCAL_URL.to_string(),
            provider_host: DEFAULT_PROVIDER_HOST.to_string(),
            session_header: DEFAULT_SESSION_HEADER.to_string(),
        }
    }
}

// Hand-written so the token never lands in logs
impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("mode", &self.mode)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("resource_id", &self.resource_id)
            .field("local_url", &self.local_url)
            .field("provider_host", &self.provider_host)
            .field("session_header", &self.session_header)
            .finish()
    }
}

impl EndpointConfig {
    /// Local-mode settings pointing at `url`
    pub fn local(url: impl Into<String>) -> Self {
        Self {
            local_url: url.into(),
            ..Default::default()
        }
    }

    /// Remote-mode settings
    pub fn remote(token: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            mode: DeploymentMode::Remote,
            token: Some(token.into()),
            resource_id: Some(resource_id.into()),
            ..Default::default()
        }
    }

    /// Check that the current mode has everything it needs to send
    ///
    /// Only presence is checked here; the identifier's shape is checked by
    /// [`resolve`].
    pub fn check_credentials(&self) -> Result<(), ValidationError> {
        if self.mode == DeploymentMode::Local {
            return Ok(());
        }
        if non_blank(self.token.as_deref()).is_none() {
            return Err(ValidationError::MissingToken);
        }
        if non_blank(self.resource_id.as_deref()).is_none() {
            return Err(ValidationError::MissingResourceId);
        }
        Ok(())
    }

    /// Short human-readable description of where requests go
    #[must_use]
    pub fn summary(&self) -> String {
        match self.mode {
            DeploymentMode::Local => format!("local ({})", self.local_url),
            DeploymentMode::Remote => match self.resource_id.as_deref().map(parse_region) {
                Some(Ok(region)) => format!("remote ({region})"),
                _ => "remote (not configured)".to_string(),
            },
        }
    }
}

/// One user-made change to the endpoint settings
///
/// Surfaces persist exactly this change, so values that came from the
/// environment never leak into the config file.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointSetting {
    /// `/mode`
    Mode(DeploymentMode),
    /// `/token`; `None` clears it
    Token(Option<String>),
    /// `/arn`
    ResourceId(String),
}

impl EndpointSetting {
    /// Apply the change to `endpoint`
    pub fn apply(&self, endpoint: &mut EndpointConfig) {
        match self {
            Self::Mode(mode) => endpoint.mode = *mode,
            Self::Token(token) => endpoint.token = token.clone(),
            Self::ResourceId(id) => endpoint.resource_id = Some(id.clone()),
        }
    }
}

impl std::fmt::Debug for EndpointSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mode(mode) => f.debug_tuple("Mode").field(mode).finish(),
            Self::Token(token) => f
                .debug_tuple("Token")
                .field(&token.as_ref().map(|_| "<redacted>"))
                .finish(),
            Self::ResourceId(id) => f.debug_tuple("ResourceId").field(id).finish(),
        }
    }
}

/// A fully resolved request target
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Absolute URL
    pub url: String,
    /// Header name/value pairs, in the order they should be sent
    pub headers: Vec<(String, String)>,
}

impl ResolvedTarget {
    /// Look up a header value (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Build the request target for the configured mode
pub fn resolve(config: &EndpointConfig, session: &SessionId) -> Result<ResolvedTarget, ConfigError> {
    let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];

    match config.mode {
        DeploymentMode::Local => Ok(ResolvedTarget {
            url: config.local_url.clone(),
            headers,
        }),
        DeploymentMode::Remote => {
            let token =
                non_blank(config.token.as_deref()).ok_or(ConfigError::MissingField("token"))?;
            let resource_id = non_blank(config.resource_id.as_deref())
                .ok_or(ConfigError::MissingField("resource_id"))?;

            let region = parse_region(resource_id)?;
            let host = config.provider_host.replace("{region}", region);
            let encoded = utf8_percent_encode(resource_id, URI_COMPONENT);
            let url = format!("https://{host}/runtimes/{encoded}/invocations?qualifier=DEFAULT");

            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
            headers.push((config.session_header.clone(), session.to_string()));

            Ok(ResolvedTarget { url, headers })
        }
    }
}

/// Extract the region (4th colon-delimited field) from a resource identifier
pub fn parse_region(resource_id: &str) -> Result<&str, ConfigError> {
    let segments: Vec<&str> = resource_id.split(':').collect();
    if segments.len() < 4 {
        return Err(ConfigError::MalformedResourceId {
            resource_id: resource_id.to_string(),
            reason: "expected at least 4 colon-delimited segments",
        });
    }

    let region = segments[3].trim();
    if region.is_empty() {
        return Err(ConfigError::MalformedResourceId {
            resource_id: resource_id.to_string(),
            reason: "region segment is empty",
        });
    }
    Ok(region)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
