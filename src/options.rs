//! Configuration surface: which backend to talk to and how to reach it.

use std::collections::HashMap;
use std::time::Duration;

use crate::client::ClientError;

/// A secret string type for sensitive data like API keys.
/// Prevents accidental logging or display of secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// The backend a client talks to. Exactly one variant is active per client
/// and it is never mutated after the client is built.
///
/// `extra_headers` must not carry the credential; supply it through the
/// variant's key field instead.
///
/// # Example
/// ```rust
/// use openai_service::options::BackendConfiguration;
///
/// // Local Ollama server, no authentication.
/// let local = BackendConfiguration::custom_host("http://localhost:11434");
///
/// // Groq, which serves the API under an `openai` path segment.
/// let groq = BackendConfiguration::custom_host("https://api.groq.com")
///     .with_api_key("gsk-...")
///     .with_proxy_path("openai");
/// ```
#[derive(Debug, Clone)]
pub enum BackendConfiguration {
    /// The canonical API host, authenticated with a bearer key.
    Direct {
        api_key: SecretString,
        organization_id: Option<String>,
    },

    /// An enterprise gateway with its own URL layout and auth scheme.
    Gateway(GatewayConfiguration),

    /// A key-protecting proxy service. The full key never ships with the app.
    ManagedProxy {
        partial_key: SecretString,
        /// Overrides the default proxy host.
        service_url: Option<String>,
        client_id: ClientIdentity,
    },

    /// Any OpenAI-compatible server (local models, third-party hosts).
    CustomHost {
        /// Omitted entirely from requests when `None` or empty.
        auth: Option<ApiAuth>,
        base_url: String,
        /// Inserted between the base URL and the version segment.
        proxy_path: Option<String>,
        /// Replaces the default `v1` version segment.
        version: Option<String>,
        /// Merged last, overriding any header of the same name.
        extra_headers: Option<HashMap<String, String>>,
    },
}

impl BackendConfiguration {
    /// Direct access with the given API key.
    pub fn direct(api_key: impl Into<SecretString>) -> Self {
        BackendConfiguration::Direct {
            api_key: api_key.into(),
            organization_id: None,
        }
    }

    /// Managed proxy access with the given partial key and the default
    /// client identity.
    pub fn managed_proxy(partial_key: impl Into<SecretString>) -> Self {
        BackendConfiguration::ManagedProxy {
            partial_key: partial_key.into(),
            service_url: None,
            client_id: ClientIdentity::default(),
        }
    }

    /// A custom host without credentials.
    pub fn custom_host(base_url: impl Into<String>) -> Self {
        BackendConfiguration::CustomHost {
            auth: None,
            base_url: base_url.into(),
            proxy_path: None,
            version: None,
            extra_headers: None,
        }
    }

    /// Set the organization id. Ignored for non-direct variants.
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        if let BackendConfiguration::Direct {
            organization_id, ..
        } = &mut self
        {
            *organization_id = Some(organization.into());
        }
        self
    }

    /// Set an API key sent as `Authorization: Bearer`. Ignored for variants
    /// other than `CustomHost`.
    pub fn with_api_key(self, key: impl Into<SecretString>) -> Self {
        self.with_auth(ApiAuth::Bearer(key.into()))
    }

    /// Set the credential and the scheme it is sent with. Applies to
    /// `CustomHost` and `Gateway`.
    pub fn with_auth(mut self, credential: ApiAuth) -> Self {
        match &mut self {
            BackendConfiguration::CustomHost { auth, .. } => *auth = Some(credential),
            BackendConfiguration::Gateway(gateway) => gateway.auth = credential,
            _ => {}
        }
        self
    }

    /// Set the proxy path. Ignored for variants other than `CustomHost`.
    pub fn with_proxy_path(mut self, path: impl Into<String>) -> Self {
        if let BackendConfiguration::CustomHost { proxy_path, .. } = &mut self {
            *proxy_path = Some(path.into());
        }
        self
    }

    /// Override the version segment. Ignored for variants other than `CustomHost`.
    pub fn with_version(mut self, override_version: impl Into<String>) -> Self {
        if let BackendConfiguration::CustomHost { version, .. } = &mut self {
            *version = Some(override_version.into());
        }
        self
    }

    /// Add a single extra header. Ignored for variants other than
    /// `CustomHost` and `Gateway`.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let headers = match &mut self {
            BackendConfiguration::CustomHost { extra_headers, .. } => Some(extra_headers),
            BackendConfiguration::Gateway(gateway) => Some(&mut gateway.extra_headers),
            _ => None,
        };
        if let Some(headers) = headers {
            headers
                .get_or_insert_with(HashMap::new)
                .insert(key.into(), value.into());
        }
        self
    }

    /// Build a configuration from the process environment.
    ///
    /// Reads `OPENAI_API_KEY` (required), `OPENAI_ORG_ID`, and
    /// `OPENAI_BASE_URL`. A base URL selects the `CustomHost` variant.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let api_key = lookup("OPENAI_API_KEY")
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ClientError::Config("OPENAI_API_KEY is not set".to_string()))?;

        match lookup("OPENAI_BASE_URL").filter(|url| !url.is_empty()) {
            Some(base_url) => Ok(Self::custom_host(base_url).with_api_key(api_key)),
            None => Ok(BackendConfiguration::Direct {
                api_key: api_key.into(),
                organization_id: lookup("OPENAI_ORG_ID").filter(|org| !org.is_empty()),
            }),
        }
    }
}

/// Azure-style enterprise gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfiguration {
    /// Subdomain of `openai.azure.com`.
    pub resource_name: String,
    /// Deployment that serves every request made through this client.
    pub deployment: String,
    /// Sent as the `api-version` query parameter.
    pub api_version: String,
    pub auth: ApiAuth,
    pub extra_headers: Option<HashMap<String, String>>,
}

impl GatewayConfiguration {
    pub fn new(
        resource_name: impl Into<String>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
        auth: ApiAuth,
    ) -> Self {
        Self {
            resource_name: resource_name.into(),
            deployment: deployment.into(),
            api_version: api_version.into(),
            auth,
            extra_headers: None,
        }
    }
}

/// A credential and the header scheme it is sent with. Used by gateways and
/// custom hosts.
#[derive(Debug, Clone)]
pub enum ApiAuth {
    /// Sent in the `api-key` header.
    ApiKey(SecretString),
    /// Sent as `Authorization: Bearer <token>` (e.g. an Entra ID token).
    Bearer(SecretString),
}

impl ApiAuth {
    pub fn secret(&self) -> &SecretString {
        match self {
            ApiAuth::ApiKey(secret) | ApiAuth::Bearer(secret) => secret,
        }
    }
}

/// How the managed-proxy client identifier is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ClientIdentity {
    /// A caller-supplied id, such as an existing user id.
    Provided(String),
    /// Derived from the host and user names; stable across restarts of the
    /// same installation.
    #[default]
    Installation,
    /// Random, generated once and reused for the lifetime of the process.
    Process,
}

/// Transport options shared by every backend.
///
/// # Example
/// ```rust
/// use openai_service::options::TransportOptions;
/// use std::time::Duration;
///
/// let options = TransportOptions::default()
///     .with_timeout(Duration::from_secs(30))
///     .with_proxy("http://proxy.example.com:8080");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    /// Request timeout
    pub timeout: Option<Duration>,

    /// HTTP proxy URL
    pub proxy: Option<String>,
}

impl TransportOptions {
    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }
}
