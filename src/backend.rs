//! Backend selection.
//!
//! A [`BackendConfiguration`] is resolved once, at client construction, into
//! a [`ResolvedBackend`]: a base URL, optional query pairs, and a header set.
//! Nothing past this point branches on the backend kind.

use std::collections::HashMap;
use std::sync::OnceLock;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use tracing::warn;
use uuid::Uuid;

use crate::client::ClientError;
use crate::options::{ApiAuth, BackendConfiguration, ClientIdentity, SecretString};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com";
pub const DEFAULT_PROXY_BASE: &str = "https://api.aiproxy.pro";
pub const DEFAULT_VERSION: &str = "v1";

const ORGANIZATION_HEADER: &str = "openai-organization";
const API_KEY_HEADER: &str = "api-key";
const PROXY_KEY_HEADER: &str = "aiproxy-partial-key";
const PROXY_CLIENT_HEADER: &str = "aiproxy-client-id";

/// Header names that carry credentials and should never arrive through
/// `extra_headers`.
const CREDENTIAL_HEADERS: [&str; 3] = ["authorization", API_KEY_HEADER, PROXY_KEY_HEADER];

/// A backend configuration reduced to what a request needs.
#[derive(Debug, Clone)]
pub struct ResolvedBackend {
    base_url: Url,
    query: Vec<(String, String)>,
    headers: HeaderMap,
}

impl ResolvedBackend {
    /// Resolve a configuration, validating URLs and headers up front.
    pub fn resolve(config: &BackendConfiguration) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let (base_url, query) = match config {
            BackendConfiguration::Direct {
                api_key,
                organization_id,
            } => {
                headers.insert(AUTHORIZATION, bearer(api_key)?);
                if let Some(organization) = organization_id {
                    headers.insert(
                        HeaderName::from_static(ORGANIZATION_HEADER),
                        header_value(organization)?,
                    );
                }
                (prefixed_url(DEFAULT_API_BASE, &[DEFAULT_VERSION])?, Vec::new())
            }
            BackendConfiguration::Gateway(gateway) => {
                insert_auth(&mut headers, &gateway.auth)?;
                merge_extra_headers(&mut headers, gateway.extra_headers.as_ref())?;

                let host = format!("https://{}.openai.azure.com", gateway.resource_name);
                let segments = ["openai", "deployments", gateway.deployment.as_str()];
                let base_url = prefixed_url(&host, &segments)?;
                let query = vec![("api-version".to_string(), gateway.api_version.clone())];
                (base_url, query)
            }
            BackendConfiguration::ManagedProxy {
                partial_key,
                service_url,
                client_id,
            } => {
                headers.insert(HeaderName::from_static(PROXY_KEY_HEADER), secret(partial_key)?);
                headers.insert(
                    HeaderName::from_static(PROXY_CLIENT_HEADER),
                    header_value(&client_identifier(client_id))?,
                );
                let host = service_url.as_deref().unwrap_or(DEFAULT_PROXY_BASE);
                (prefixed_url(host, &[DEFAULT_VERSION])?, Vec::new())
            }
            BackendConfiguration::CustomHost {
                auth,
                base_url,
                proxy_path,
                version,
                extra_headers,
            } => {
                if let Some(auth) = auth.as_ref().filter(|auth| !auth.secret().is_empty()) {
                    insert_auth(&mut headers, auth)?;
                }
                merge_extra_headers(&mut headers, extra_headers.as_ref())?;

                let version = version.as_deref().unwrap_or(DEFAULT_VERSION);
                let segments: Vec<&str> = proxy_path
                    .as_deref()
                    .into_iter()
                    .chain(std::iter::once(version))
                    .collect();
                (prefixed_url(base_url, &segments)?, Vec::new())
            }
        };

        Ok(Self {
            base_url,
            query,
            headers,
        })
    }

    /// Base URL every endpoint is resolved against. Always ends with `/`.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Headers sent with every request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Full URL for an endpoint path such as `chat/completions`.
    pub fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        let mut url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::Config(format!("invalid endpoint `{path}`: {e}")))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }
}

/// Parse `base` and append `segments` so the result ends with a slash.
///
/// Segments may themselves contain `/`; empty pieces are dropped.
fn prefixed_url(base: &str, segments: &[&str]) -> Result<Url, ClientError> {
    let mut url = Url::parse(base)
        .map_err(|e| ClientError::Config(format!("invalid base URL `{base}`: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::Config(format!(
            "invalid base URL `{base}`: unsupported scheme `{}`",
            url.scheme()
        )));
    }

    url.path_segments_mut()
        .map_err(|_| ClientError::Config(format!("invalid base URL `{base}`: cannot be a base")))?
        .pop_if_empty()
        .extend(
            segments
                .iter()
                .flat_map(|segment| segment.split('/'))
                .filter(|piece| !piece.is_empty()),
        )
        .push("");

    Ok(url)
}

/// Insert caller-supplied headers last, so they replace any earlier value
/// under the same name.
fn merge_extra_headers(
    headers: &mut HeaderMap,
    extra_headers: Option<&HashMap<String, String>>,
) -> Result<(), ClientError> {
    for (name, value) in extra_headers.into_iter().flatten() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ClientError::Config(format!("invalid header name `{name}`: {e}")))?;
        if CREDENTIAL_HEADERS.contains(&name.as_str()) {
            warn!(header = %name, "credential passed through extra headers");
        }
        headers.insert(name, header_value(value)?);
    }
    Ok(())
}

fn insert_auth(headers: &mut HeaderMap, auth: &ApiAuth) -> Result<(), ClientError> {
    match auth {
        ApiAuth::ApiKey(key) => headers.insert(HeaderName::from_static(API_KEY_HEADER), secret(key)?),
        ApiAuth::Bearer(token) => headers.insert(AUTHORIZATION, bearer(token)?),
    };
    Ok(())
}

fn header_value(value: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(value)
        .map_err(|_| ClientError::Config(format!("invalid header value `{value}`")))
}

fn secret(value: &SecretString) -> Result<HeaderValue, ClientError> {
    let mut header = HeaderValue::from_str(value.expose_secret())
        .map_err(|_| ClientError::Config("API key contains invalid characters".to_string()))?;
    header.set_sensitive(true);
    Ok(header)
}

fn bearer(value: &SecretString) -> Result<HeaderValue, ClientError> {
    secret(&SecretString::new(format!("Bearer {}", value.expose_secret())))
}

/// Files holding a stable per-machine identity, most specific first.
const MACHINE_ID_FILES: [&str; 4] = [
    "/etc/machine-id",
    "/var/lib/dbus/machine-id",
    "/proc/sys/kernel/hostname",
    "/etc/hostname",
];

fn client_identifier(identity: &ClientIdentity) -> String {
    match identity {
        ClientIdentity::Provided(id) => id.clone(),
        ClientIdentity::Process => process_id(),
        ClientIdentity::Installation => installation_id(),
    }
}

fn process_id() -> String {
    static PROCESS_ID: OnceLock<String> = OnceLock::new();
    PROCESS_ID
        .get_or_init(|| Uuid::new_v4().to_string())
        .clone()
}

/// Deterministic id for this machine and user.
///
/// Falls back to the per-process id when no machine identity is readable,
/// so unrelated machines never share an id.
fn installation_id() -> String {
    let user = non_empty_var(&["USER", "USERNAME", "LOGNAME"]).unwrap_or_default();
    match machine_identity() {
        Some(machine) => installation_id_for(&machine, &user),
        None => {
            warn!("no machine identity found, using a per-process client id");
            process_id()
        }
    }
}

fn installation_id_for(machine: &str, user: &str) -> String {
    let fingerprint = format!("{machine}/{user}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, fingerprint.as_bytes()).to_string()
}

fn machine_identity() -> Option<String> {
    MACHINE_ID_FILES
        .iter()
        .find_map(|path| {
            std::fs::read_to_string(path)
                .ok()
                .map(|contents| contents.trim().to_string())
                .filter(|contents| !contents.is_empty())
        })
        .or_else(|| non_empty_var(&["COMPUTERNAME", "HOSTNAME"]))
}

fn non_empty_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|value| !value.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::GatewayConfiguration;

    fn header<'a>(backend: &'a ResolvedBackend, name: &str) -> Option<&'a str> {
        backend.headers().get(name).and_then(|v| v.to_str().ok())
    }

    fn all_variants() -> Vec<BackendConfiguration> {
        let gateway = GatewayConfiguration::new(
            "contoso",
            "gpt-4o",
            "2024-10-21",
            ApiAuth::ApiKey("azure-key".into()),
        );
        vec![
            BackendConfiguration::direct("sk-test").with_organization("org-1"),
            BackendConfiguration::Gateway(gateway),
            BackendConfiguration::managed_proxy("partial"),
            BackendConfiguration::custom_host("https://h")
                .with_api_key("sk-custom")
                .with_header("X-Extra", "1"),
        ]
    }

    #[test]
    fn test_direct() {
        let backend =
            ResolvedBackend::resolve(&BackendConfiguration::direct("sk-test").with_organization("org-1"))
                .unwrap();

        assert_eq!(
            backend.endpoint("chat/completions").unwrap().as_str(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(header(&backend, "authorization"), Some("Bearer sk-test"));
        assert_eq!(header(&backend, "openai-organization"), Some("org-1"));
        assert!(backend.headers().get(AUTHORIZATION).unwrap().is_sensitive());
    }

    #[test]
    fn test_direct_without_organization() {
        let backend = ResolvedBackend::resolve(&BackendConfiguration::direct("sk-test")).unwrap();
        assert!(backend.headers().get("openai-organization").is_none());
    }

    #[test]
    fn test_custom_host_default_version() {
        let backend =
            ResolvedBackend::resolve(&BackendConfiguration::custom_host("https://h")).unwrap();
        assert_eq!(backend.base_url().as_str(), "https://h/v1/");
        assert_eq!(
            backend.endpoint("chat/completions").unwrap().as_str(),
            "https://h/v1/chat/completions"
        );
    }

    #[test]
    fn test_custom_host_proxy_path_before_version() {
        let config = BackendConfiguration::custom_host("https://h").with_proxy_path("openai");
        let backend = ResolvedBackend::resolve(&config).unwrap();
        assert_eq!(
            backend.endpoint("chat/completions").unwrap().as_str(),
            "https://h/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_custom_host_version_override_and_base_path() {
        let config = BackendConfiguration::custom_host("https://h/api/")
            .with_proxy_path("/nested/path/")
            .with_version("v1beta");
        let backend = ResolvedBackend::resolve(&config).unwrap();
        assert_eq!(backend.base_url().as_str(), "https://h/api/nested/path/v1beta/");
    }

    #[test]
    fn test_custom_host_without_key_sends_no_authorization() {
        let backend =
            ResolvedBackend::resolve(&BackendConfiguration::custom_host("http://localhost:11434"))
                .unwrap();
        assert!(backend.headers().get(AUTHORIZATION).is_none());

        let empty_key = BackendConfiguration::custom_host("http://localhost:11434").with_api_key("");
        let backend = ResolvedBackend::resolve(&empty_key).unwrap();
        assert!(backend.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_extra_headers_last_write_wins() {
        let config = BackendConfiguration::custom_host("https://h")
            .with_api_key("sk-custom")
            .with_header("Content-Type", "application/vnd.custom+json")
            .with_header("X-Trace", "abc");
        let backend = ResolvedBackend::resolve(&config).unwrap();

        let content_types: Vec<_> = backend.headers().get_all(CONTENT_TYPE).iter().collect();
        assert_eq!(content_types.len(), 1);
        assert_eq!(header(&backend, "content-type"), Some("application/vnd.custom+json"));
        assert_eq!(header(&backend, "x-trace"), Some("abc"));
        assert_eq!(header(&backend, "authorization"), Some("Bearer sk-custom"));
    }

    #[test]
    fn test_no_variant_repeats_a_header() {
        for config in all_variants() {
            let backend = ResolvedBackend::resolve(&config).unwrap();
            for name in backend.headers().keys() {
                assert_eq!(
                    backend.headers().get_all(name).iter().count(),
                    1,
                    "header `{}` repeated for {:?}",
                    name,
                    config
                );
            }
        }
    }

    #[test]
    fn test_gateway_url_and_auth() {
        let mut gateway = GatewayConfiguration::new(
            "contoso",
            "gpt-4o",
            "2024-10-21",
            ApiAuth::ApiKey("azure-key".into()),
        );
        gateway.extra_headers = Some(HashMap::from([("x-ms-client".to_string(), "app".to_string())]));
        let backend = ResolvedBackend::resolve(&BackendConfiguration::Gateway(gateway)).unwrap();

        assert_eq!(
            backend.endpoint("chat/completions").unwrap().as_str(),
            "https://contoso.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-10-21"
        );
        assert_eq!(header(&backend, "api-key"), Some("azure-key"));
        assert_eq!(header(&backend, "x-ms-client"), Some("app"));
        assert!(backend.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_gateway_bearer() {
        let gateway = GatewayConfiguration::new(
            "contoso",
            "gpt-4o",
            "2024-10-21",
            ApiAuth::Bearer("entra-token".into()),
        );
        let backend = ResolvedBackend::resolve(&BackendConfiguration::Gateway(gateway)).unwrap();
        assert_eq!(header(&backend, "authorization"), Some("Bearer entra-token"));
        assert!(backend.headers().get("api-key").is_none());
    }

    #[test]
    fn test_managed_proxy() {
        let config = BackendConfiguration::ManagedProxy {
            partial_key: "partial".into(),
            service_url: Some("https://api.aiproxy.pro/1234/5678".to_string()),
            client_id: ClientIdentity::Provided("user-42".to_string()),
        };
        let backend = ResolvedBackend::resolve(&config).unwrap();

        assert_eq!(
            backend.endpoint("chat/completions").unwrap().as_str(),
            "https://api.aiproxy.pro/1234/5678/v1/chat/completions"
        );
        assert_eq!(header(&backend, "aiproxy-partial-key"), Some("partial"));
        assert_eq!(header(&backend, "aiproxy-client-id"), Some("user-42"));
    }

    #[test]
    fn test_managed_proxy_default_host_and_stable_ids() {
        let backend =
            ResolvedBackend::resolve(&BackendConfiguration::managed_proxy("partial")).unwrap();
        assert_eq!(backend.base_url().as_str(), "https://api.aiproxy.pro/v1/");

        assert_eq!(
            client_identifier(&ClientIdentity::Installation),
            client_identifier(&ClientIdentity::Installation)
        );
        assert_eq!(
            client_identifier(&ClientIdentity::Process),
            client_identifier(&ClientIdentity::Process)
        );
    }

    #[test]
    fn test_installation_id_depends_on_machine() {
        assert_ne!(
            installation_id_for("0f3c9a51d2e84b7c", "root"),
            installation_id_for("7ab1e0c44f6d4c02", "root")
        );
        assert_eq!(
            installation_id_for("0f3c9a51d2e84b7c", "root"),
            installation_id_for("0f3c9a51d2e84b7c", "root")
        );

        // Never collapses to an id shared by every machine with this user.
        let user = non_empty_var(&["USER", "USERNAME", "LOGNAME"]).unwrap_or_default();
        assert_ne!(
            client_identifier(&ClientIdentity::Installation),
            installation_id_for("", &user)
        );
    }

    #[test]
    fn test_custom_host_api_key_header_scheme() {
        let config = BackendConfiguration::custom_host("https://h")
            .with_auth(ApiAuth::ApiKey("compat-key".into()));
        let backend = ResolvedBackend::resolve(&config).unwrap();

        assert_eq!(header(&backend, "api-key"), Some("compat-key"));
        assert!(backend.headers().get("api-key").unwrap().is_sensitive());
        assert!(backend.headers().get(AUTHORIZATION).is_none());

        let empty = BackendConfiguration::custom_host("https://h").with_auth(ApiAuth::ApiKey("".into()));
        let backend = ResolvedBackend::resolve(&empty).unwrap();
        assert!(backend.headers().get("api-key").is_none());
    }

    #[test]
    fn test_malformed_base_url_fails_at_resolve() {
        for base_url in ["not a url", "h", "mailto:someone@example.com", "ftp://h"] {
            let result = ResolvedBackend::resolve(&BackendConfiguration::custom_host(base_url));
            assert!(
                matches!(result, Err(ClientError::Config(_))),
                "expected config error for {base_url}"
            );
        }
    }

    #[test]
    fn test_invalid_extra_header_fails_at_resolve() {
        let config = BackendConfiguration::custom_host("https://h").with_header("bad header", "1");
        assert!(matches!(
            ResolvedBackend::resolve(&config),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let backend = ResolvedBackend::resolve(&BackendConfiguration::direct("sk-secret")).unwrap();
        assert!(!format!("{:?}", backend).contains("sk-secret"));
    }
}
