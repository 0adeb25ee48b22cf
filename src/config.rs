//! Client connection configuration.
//!
//! [`ConnectionConfig`] is built once per client and never changes after the
//! client is constructed. It carries the server location, the encoded
//! credentials, the TLS policy and the optional session token.

use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use crate::error::ApiError;
use crate::http::constants::{CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS};

/// Web context used when the caller does not name one.
pub const DEFAULT_CONTEXT: &str = "forms-basic";

/// Protocol pinned for relaxed TLS when none is given.
pub const DEFAULT_RELAXED_PROTOCOL: &str = "TLSv1.2";

/// Certificate validation policy for HTTPS targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsMode {
    /// Platform trust chain and hostname verification.
    SystemDefault,
    /// Accept any certificate and host name, using the named protocol.
    ///
    /// For development servers with self-signed certificates only.
    Relaxed {
        /// Protocol name such as `TLSv1.2`.
        protocol: String,
    },
}

/// Immutable connection settings for one client instance.
#[derive(Clone)]
pub struct ConnectionConfig {
    base_host: String,
    context: String,
    credentials_encoded: String,
    tls_mode: TlsMode,
    session_token: Option<String>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("base_host", &self.base_host)
            .field("context", &self.context)
            .field("credentials_encoded", &"<redacted>")
            .field("tls_mode", &self.tls_mode)
            .field("session_token", &self.session_token)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ConnectionConfig {
    /// Creates a configuration for `host` (for example
    /// `https://forms.example.com`) authenticating as `username`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MissingParameter`] if any argument is empty.
    pub fn new(host: &str, username: &str, password: &str) -> Result<Self, ApiError> {
        if host.trim().is_empty() {
            return Err(ApiError::missing(
                "host",
                "server host name is required, e.g. http://myserver.com",
            ));
        }
        if username.is_empty() {
            return Err(ApiError::missing("username", "the username is required"));
        }
        if password.is_empty() {
            return Err(ApiError::missing("password", "the password is required"));
        }
        debug!(host, "host name provided");

        Ok(Self {
            base_host: host.trim_end_matches('/').to_string(),
            context: DEFAULT_CONTEXT.to_string(),
            credentials_encoded: encode_credentials(username, password),
            tls_mode: TlsMode::SystemDefault,
            session_token: None,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        })
    }

    /// Sets the web context. An empty value keeps [`DEFAULT_CONTEXT`].
    #[must_use]
    pub fn with_context(mut self, context: &str) -> Self {
        let context = context.trim_matches('/');
        if context.is_empty() {
            debug!(context = %self.context, "context was not provided, keeping default");
        } else {
            debug!(context, "custom context was provided");
            self.context = context.to_string();
        }
        self
    }

    /// Opts into relaxed certificate checking. An empty protocol becomes
    /// [`DEFAULT_RELAXED_PROTOCOL`].
    #[must_use]
    pub fn with_relaxed_tls(mut self, protocol: &str) -> Self {
        let protocol = if protocol.trim().is_empty() {
            debug!(
                protocol = DEFAULT_RELAXED_PROTOCOL,
                "protocol was not provided, using default"
            );
            DEFAULT_RELAXED_PROTOCOL
        } else {
            protocol.trim()
        };
        self.tls_mode = TlsMode::Relaxed {
            protocol: protocol.to_string(),
        };
        self
    }

    /// Sets the session token. Empty tokens are treated as absent.
    #[must_use]
    pub fn with_session_token(mut self, token: &str) -> Self {
        self.session_token = (!token.is_empty()).then(|| token.to_string());
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn base_host(&self) -> &str {
        &self.base_host
    }

    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Base64 of `username:password`.
    #[must_use]
    pub fn credentials_encoded(&self) -> &str {
        &self.credentials_encoded
    }

    #[must_use]
    pub fn tls_mode(&self) -> &TlsMode {
        &self.tls_mode
    }

    #[must_use]
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// `<host>/<context>/secure/org/data/`, the record endpoints.
    #[must_use]
    pub fn data_url_base(&self) -> String {
        format!("{}/{}/secure/org/data/", self.base_host, self.context)
    }

    /// `<host>/<context>/secure/org/app`, the application endpoints.
    #[must_use]
    pub fn app_url_base(&self) -> String {
        format!("{}/{}/secure/org/app", self.base_host, self.context)
    }

    /// `<host>/<context>/secure/org/`.
    #[must_use]
    pub fn org_url_base(&self) -> String {
        format!("{}/{}/secure/org/", self.base_host, self.context)
    }

    /// `<host>/<context>/secure/org/admin/`.
    #[must_use]
    pub fn admin_url_base(&self) -> String {
        format!("{}/{}/secure/org/admin/", self.base_host, self.context)
    }
}

fn encode_credentials(username: &str, password: &str) -> String {
    STANDARD.encode(format!("{username}:{password}"))
}
