//! The forms API client.
//!
//! [`FormsClient`] composes the [`http`](crate::http) primitives into the
//! platform operations. Every operation is an `async fn` that issues its
//! requests one after another and returns once every response has been
//! consumed.
//!
//! # Example
//!
//! ```no_run
//! use forms_client::{ConnectionConfig, FilterOperator, FilterSet, FormsClient, ReturnFormat};
//!
//! # async fn example() -> Result<(), forms_client::ApiError> {
//! let config = ConnectionConfig::new("https://forms.example.com", "admin", "secret")?
//!     .with_context("forms");
//! let client = FormsClient::new(config)?;
//!
//! let mut filters = FilterSet::new();
//! filters.add_filter("F_LastName", FilterOperator::StartsWith, "Sm")?;
//! let envelope = client
//!     .list_records("app-uid", "F_Form1", Some(&filters), ReturnFormat::Json)
//!     .await?;
//! println!("HTTP {} {}", envelope.http_status, envelope.status_text);
//! # Ok(())
//! # }
//! ```

mod apps;
mod attachments;
mod records;

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::Method;
use reqwest::header::ACCEPT;
use tracing::debug;

pub use apps::ArchiveTarget;

use crate::config::ConnectionConfig;
use crate::error::ApiError;
use crate::http::{Connector, MediaTypes, ResultEnvelope, dispatch};

/// Client for one server and one set of credentials.
///
/// Cloning is cheap and clones share the underlying HTTP client.
#[derive(Debug, Clone)]
pub struct FormsClient {
    connector: Connector,
}

impl FormsClient {
    /// Builds a client for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::UnsupportedProtocol`] or [`ApiError::ClientBuild`]
    /// if the TLS settings cannot be applied.
    pub fn new(config: ConnectionConfig) -> Result<Self, ApiError> {
        Ok(Self {
            connector: Connector::new(config)?,
        })
    }

    /// Builds a client that routes on a custom media type table.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_media_types(
        config: ConnectionConfig,
        media_types: MediaTypes,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            connector: Connector::with_media_types(config, media_types)?,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        self.connector.config()
    }

    #[must_use]
    pub fn media_types(&self) -> &MediaTypes {
        self.connector.media_types()
    }

    /// Generates a session token from the current time.
    ///
    /// The value is the epoch time in milliseconds truncated to a signed
    /// 32-bit integer, so it may be negative.
    #[must_use]
    pub fn generate_session_key() -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        #[allow(clippy::cast_possible_truncation)]
        let truncated = millis as u64 as i32;
        truncated.to_string()
    }

    /// GET with an `Accept` header, dispatched.
    async fn get(
        &self,
        url: &str,
        accept: &str,
        omit_session_token: bool,
    ) -> Result<ResultEnvelope, ApiError> {
        let connection =
            self.connector
                .open(url, Method::GET, &[(ACCEPT.as_str(), accept)], omit_session_token)?;
        let response = connection.send().await?;
        dispatch(response, self.media_types()).await
    }

    /// Sends an optional JSON body with `Accept: application/json`.
    async fn send_json(
        &self,
        url: &str,
        method: Method,
        json: Option<String>,
    ) -> Result<ResultEnvelope, ApiError> {
        let media_types = self.media_types();
        let mut connection =
            self.connector
                .open(url, method, &[(ACCEPT.as_str(), media_types.json.as_str())], false)?;
        if let Some(json) = json {
            debug!(bytes = json.len(), "writing JSON body");
            connection = connection.write_body(&media_types.json, json)?;
        }
        let response = connection.send().await?;
        dispatch(response, media_types).await
    }
}

/// Fails with [`ApiError::MissingParameter`] when `value` is empty.
fn require(value: &str, name: &'static str, hint: &'static str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::missing(name, hint));
    }
    Ok(())
}

/// What a [`DeleteReport`] lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteSubject {
    Records,
    Applications,
}

/// Outcome of deleting one record or application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub uid: String,
    pub deleted: bool,
}

/// Per-item results of a bulk delete, in the order the deletes were issued.
///
/// `Display` renders one line per item, each preceded by a newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    subject: DeleteSubject,
    outcomes: Vec<DeleteOutcome>,
}

impl DeleteReport {
    #[must_use]
    pub fn new(subject: DeleteSubject) -> Self {
        Self {
            subject,
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, uid: impl Into<String>, deleted: bool) {
        self.outcomes.push(DeleteOutcome {
            uid: uid.into(),
            deleted,
        });
    }

    #[must_use]
    pub fn subject(&self) -> DeleteSubject {
        self.subject
    }

    #[must_use]
    pub fn outcomes(&self) -> &[DeleteOutcome] {
        &self.outcomes
    }

    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.deleted).count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.deleted_count()
    }
}

impl fmt::Display for DeleteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            match (self.subject, outcome.deleted) {
                (DeleteSubject::Records, true) => {
                    write!(f, "\nSuccessfully deleted record {}", outcome.uid)?;
                }
                (DeleteSubject::Records, false) => {
                    write!(f, "\nFailed to delete record {}", outcome.uid)?;
                }
                (DeleteSubject::Applications, true) => {
                    write!(f, "\n{} deleted successfully", outcome.uid)?;
                }
                (DeleteSubject::Applications, false) => {
                    write!(f, "\n Failed to delete {}", outcome.uid)?;
                }
            }
        }
        Ok(())
    }
}
