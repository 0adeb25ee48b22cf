//! Authenticated request construction.
//!
//! [`Connector`] owns the `reqwest` client built from a [`ConnectionConfig`]
//! and hands out one [`Connection`] per request. A connection carries the
//! Basic credentials, the optional session token (query parameter and
//! cookie) and any caller headers; it is consumed when sent.

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE};
use reqwest::tls::Version;
use reqwest::{Body, Client, Method, RequestBuilder, Response};
use tracing::{debug, warn};
use url::Url;

use super::constants::{MediaTypes, SESSION_TOKEN_NAME};
use super::multipart::ContentReadError;
use crate::config::{ConnectionConfig, TlsMode};
use crate::error::ApiError;
use crate::query::add_url_param;

/// Builds connections for one client instance.
///
/// Cloning is cheap; clones share the same client and configuration.
#[derive(Debug, Clone)]
pub struct Connector {
    config: Arc<ConnectionConfig>,
    media_types: Arc<MediaTypes>,
    client: Client,
}

impl Connector {
    /// Builds the HTTP client for `config` with the default media types.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::UnsupportedProtocol`] for an unknown relaxed-TLS
    /// protocol name and [`ApiError::ClientBuild`] if the TLS backend rejects
    /// the configuration.
    pub fn new(config: ConnectionConfig) -> Result<Self, ApiError> {
        Self::with_media_types(config, MediaTypes::default())
    }

    /// Same as [`new`](Self::new) with a custom media type table.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_media_types(
        config: ConnectionConfig,
        media_types: MediaTypes,
    ) -> Result<Self, ApiError> {
        let client = build_client(&config)?;
        Ok(Self {
            config: Arc::new(config),
            media_types: Arc::new(media_types),
            client,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    #[must_use]
    pub fn media_types(&self) -> &MediaTypes {
        &self.media_types
    }

    /// Prepares an authenticated request.
    ///
    /// The session token, when configured and not omitted, is added both as
    /// a `freedomIdentifyKey` query parameter and as a cookie. Caller headers
    /// are applied before `Authorization`, so they cannot replace it.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::UnsupportedMethod`] for methods other than GET,
    /// POST, PUT and DELETE, and [`ApiError::InvalidUrl`] if the final URL
    /// does not parse.
    pub fn open(
        &self,
        url: &str,
        method: Method,
        headers: &[(&str, &str)],
        omit_session_token: bool,
    ) -> Result<Connection, ApiError> {
        if !matches!(
            method,
            Method::GET | Method::POST | Method::PUT | Method::DELETE
        ) {
            return Err(ApiError::UnsupportedMethod {
                method: method.to_string(),
                reason: "the forms API accepts GET, POST, PUT and DELETE only",
            });
        }

        let session_token = self
            .config
            .session_token()
            .filter(|_| !omit_session_token);

        let url = match session_token {
            Some(token) => add_url_param(url, &format!("{SESSION_TOKEN_NAME}={token}")),
            None => url.to_string(),
        };
        debug!(url = %url, method = %method, "modified URL");

        let parsed = Url::parse(&url).map_err(|_| ApiError::invalid_url(url.clone()))?;

        let mut request = self.client.request(method.clone(), parsed);
        for (name, value) in headers {
            debug!(header = name, value, "adding header");
            request = request.header(*name, *value);
        }

        debug!("adding Authorization header: Basic <redacted>");
        request = request.header(
            AUTHORIZATION,
            format!("Basic {}", self.config.credentials_encoded()),
        );

        if let Some(token) = session_token {
            debug!(cookie = SESSION_TOKEN_NAME, "adding session cookie");
            request = request.header(COOKIE, format!("{SESSION_TOKEN_NAME}={token}"));
        }

        let writes_body = matches!(method, Method::POST | Method::PUT);
        Ok(Connection {
            method,
            url,
            request,
            writes_body,
        })
    }
}

/// A prepared request, consumed by [`send`](Connection::send).
#[derive(Debug)]
pub struct Connection {
    method: Method,
    url: String,
    request: RequestBuilder,
    writes_body: bool,
}

impl Connection {
    /// Final request URL, including any session token parameter.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Whether this connection may carry a request body (POST and PUT).
    #[must_use]
    pub fn writes_body(&self) -> bool {
        self.writes_body
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.request = self.request.header(name, value);
        self
    }

    /// Sets `Content-Type` and the request body.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::UnsupportedMethod`] when the method is not POST
    /// or PUT.
    pub fn write_body(
        mut self,
        content_type: &str,
        body: impl Into<Body>,
    ) -> Result<Self, ApiError> {
        if !self.writes_body {
            return Err(ApiError::UnsupportedMethod {
                method: self.method.to_string(),
                reason: "only POST and PUT requests carry a body",
            });
        }
        self.request = self.request.header(CONTENT_TYPE, content_type).body(body);
        Ok(self)
    }

    /// Sends the request.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Upload`] when a streamed upload body fails to read
    /// its content, and [`ApiError::Connection`] on any other transport
    /// failure, including timeouts.
    pub async fn send(self) -> Result<Response, ApiError> {
        let Self {
            method,
            url,
            request,
            ..
        } = self;
        request.send().await.map_err(|e| match content_read_failure(&e) {
            Some(read) => ApiError::upload(
                read.file_name.clone(),
                std::io::Error::new(read.source.kind(), read.source.to_string()),
            ),
            None => ApiError::connection(method.as_str(), url, e),
        })
    }
}

fn content_read_failure(error: &reqwest::Error) -> Option<&ContentReadError> {
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        if let Some(read) = cause.downcast_ref::<ContentReadError>() {
            return Some(read);
        }
        source = cause.source();
    }
    None
}

fn build_client(config: &ConnectionConfig) -> Result<Client, ApiError> {
    let mut builder = Client::builder()
        .connect_timeout(config.connect_timeout())
        .timeout(config.request_timeout())
        // Each operation owns its socket; nothing is kept idle between calls.
        .pool_max_idle_per_host(0)
        .gzip(true)
        .user_agent(crate::user_agent::default_user_agent());

    if let TlsMode::Relaxed { protocol } = config.tls_mode() {
        warn!(
            protocol = %protocol,
            "relaxed TLS enabled: server certificates and host names are not verified"
        );
        builder = builder.danger_accept_invalid_certs(true);
        if let Some(version) = tls_version_for(protocol)? {
            builder = builder.min_tls_version(version).max_tls_version(version);
        }
    }

    builder
        .build()
        .map_err(|source| ApiError::ClientBuild { source })
}

/// Maps a protocol name to a pinned TLS version. `SSL` and `TLS` name the
/// protocol family and leave the negotiated range alone.
fn tls_version_for(protocol: &str) -> Result<Option<Version>, ApiError> {
    match protocol.to_ascii_uppercase().as_str() {
        "SSL" | "TLS" => Ok(None),
        "TLSV1" | "TLSV1.0" => Ok(Some(Version::TLS_1_0)),
        "TLSV1.1" => Ok(Some(Version::TLS_1_1)),
        "TLSV1.2" => Ok(Some(Version::TLS_1_2)),
        "TLSV1.3" => Ok(Some(Version::TLS_1_3)),
        _ => Err(ApiError::UnsupportedProtocol {
            protocol: protocol.to_string(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn connector(token: Option<&str>) -> Connector {
        let mut config = ConnectionConfig::new("https://forms.example.com", "user", "pw").unwrap();
        if let Some(token) = token {
            config = config.with_session_token(token);
        }
        Connector::new(config).unwrap()
    }

    #[test]
    fn test_open_rejects_patch() {
        let result = connector(None).open("https://forms.example.com/x", Method::PATCH, &[], false);
        assert!(matches!(result, Err(ApiError::UnsupportedMethod { .. })));
    }

    #[test]
    fn test_open_appends_session_token_parameter() {
        let conn = connector(Some("1234"))
            .open("https://forms.example.com/data?x=1", Method::GET, &[], false)
            .unwrap();
        assert_eq!(conn.url(), "https://forms.example.com/data?x=1&freedomIdentifyKey=1234");
    }

    #[test]
    fn test_open_omits_session_token_when_asked() {
        let conn = connector(Some("1234"))
            .open("https://forms.example.com/swagger.json", Method::GET, &[], true)
            .unwrap();
        assert_eq!(conn.url(), "https://forms.example.com/swagger.json");
    }

    #[test]
    fn test_open_rejects_unparseable_url() {
        let result = connector(None).open("not a url", Method::GET, &[], false);
        assert!(matches!(result, Err(ApiError::InvalidUrl { .. })));
    }

    #[test]
    fn test_write_body_only_for_post_and_put() {
        let conn = connector(None)
            .open("https://forms.example.com/x", Method::DELETE, &[], false)
            .unwrap();
        assert!(!conn.writes_body());
        assert!(matches!(
            conn.write_body("text/plain", "x"),
            Err(ApiError::UnsupportedMethod { .. })
        ));

        let conn = connector(None)
            .open("https://forms.example.com/x", Method::PUT, &[], false)
            .unwrap();
        assert!(conn.write_body("text/plain", "x").is_ok());
    }

    #[test]
    fn test_tls_version_for_known_and_unknown_names() {
        assert_eq!(tls_version_for("TLSv1.2").unwrap(), Some(Version::TLS_1_2));
        assert_eq!(tls_version_for("tlsv1.3").unwrap(), Some(Version::TLS_1_3));
        assert_eq!(tls_version_for("SSL").unwrap(), None);
        assert!(matches!(
            tls_version_for("SSLv3"),
            Err(ApiError::UnsupportedProtocol { .. })
        ));
    }

    #[test]
    fn test_relaxed_tls_with_unknown_protocol_fails_construction() {
        let config = ConnectionConfig::new("https://h", "u", "p")
            .unwrap()
            .with_relaxed_tls("QUIC");
        assert!(matches!(
            Connector::new(config),
            Err(ApiError::UnsupportedProtocol { .. })
        ));
    }
}
