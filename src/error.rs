//! Error types for the forms API client.
//!
//! A single error enum covers every operation. Variants carry the context a
//! caller needs to act on the failure (URL, path, HTTP status) and are built
//! through helper constructors rather than blanket `From` impls.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`FormsClient`](crate::FormsClient) operations and the
/// request/response primitives underneath them.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A filter field name contains whitespace.
    #[error("filter field '{field}' may not contain a space")]
    InvalidFilterField {
        /// The rejected field name.
        field: String,
    },

    /// A required argument or configuration value was empty or absent.
    #[error("missing required parameter `{name}`: {hint}")]
    MissingParameter {
        /// Parameter name as the caller knows it.
        name: &'static str,
        /// What the caller should supply.
        hint: &'static str,
    },

    /// The request URL could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The URL that failed to parse.
        url: String,
    },

    /// The relaxed-TLS protocol name is not recognised.
    #[error("unsupported TLS protocol '{protocol}' (expected SSL, TLS, TLSv1, TLSv1.1, TLSv1.2 or TLSv1.3)")]
    UnsupportedProtocol {
        /// The protocol name from configuration.
        protocol: String,
    },

    /// The underlying HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The builder error.
        #[source]
        source: reqwest::Error,
    },

    /// Network-level failure while sending a request.
    #[error("connection error for {method} {url}: {source}")]
    Connection {
        /// HTTP method of the failed request.
        method: String,
        /// The request URL.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The method is not one the platform API speaks, or cannot carry a body.
    #[error("unsupported method {method}: {reason}")]
    UnsupportedMethod {
        /// The offending method.
        method: String,
        /// Why the method was rejected.
        reason: &'static str,
    },

    /// Reading the upload content failed.
    #[error("upload of '{file_name}' failed: {source}")]
    Upload {
        /// File name declared for the part.
        file_name: String,
        /// The read error.
        #[source]
        source: std::io::Error,
    },

    /// The server did not accept an attachment upload that a follow-up step depends on.
    #[error("attachment upload was rejected: HTTP {status} ({status_text})")]
    UploadRejected {
        /// HTTP status of the upload response.
        status: u16,
        /// Status reason phrase.
        status_text: String,
    },

    /// Reading the response body failed.
    #[error("failed reading response from {url}: {source}")]
    Response {
        /// The request URL.
        url: String,
        /// The underlying read error.
        #[source]
        source: reqwest::Error,
    },

    /// The response body could not be parsed in the declared format.
    #[error("malformed {format} body from {url}: {reason}")]
    MalformedBody {
        /// The request URL.
        url: String,
        /// Expected format (`JSON`, `XML`).
        format: &'static str,
        /// Parser message.
        reason: String,
    },

    /// A JSON value did not have the expected shape.
    #[error("unexpected JSON shape at `{key}`: expected {expected}")]
    UnexpectedShape {
        /// Key or path that was inspected.
        key: String,
        /// The expected JSON type.
        expected: &'static str,
    },

    /// Filesystem error reading or writing local files.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The listing step of a bulk delete did not return 200.
    #[error("failed to get records to delete: HTTP {status} ({status_text})")]
    ListFailed {
        /// HTTP status of the list response.
        status: u16,
        /// Status reason phrase.
        status_text: String,
    },

    /// The first listing of a bulk delete matched no records.
    #[error("there are no records to delete ({status_text})")]
    NothingToDelete {
        /// Status reason phrase of the list response.
        status_text: String,
    },

    /// The follow-up tag request after an import failed.
    #[error("failed to assign tags to application {app_id}: {reason}")]
    TagAssignmentFailed {
        /// The newly imported application id.
        app_id: String,
        /// Transport error or rejected status.
        reason: String,
    },

    /// The admin listing returned 404, meaning the user lacks the admin role.
    #[error("user is not part of the AdministrativeUsers role")]
    NotAdministrator,

    /// Any other transport failure, wrapped with the originating operation.
    #[error("{operation} failed: {source}")]
    Transport {
        /// Operation that was running.
        operation: &'static str,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ApiError {
    /// Creates an invalid filter field error.
    pub fn invalid_filter_field(field: impl Into<String>) -> Self {
        Self::InvalidFilterField {
            field: field.into(),
        }
    }

    /// Creates a missing parameter error.
    #[must_use]
    pub fn missing(name: &'static str, hint: &'static str) -> Self {
        Self::MissingParameter { name, hint }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a connection error from a reqwest error.
    pub fn connection(
        method: impl Into<String>,
        url: impl Into<String>,
        source: reqwest::Error,
    ) -> Self {
        Self::Connection {
            method: method.into(),
            url: url.into(),
            source,
        }
    }

    /// Creates an upload error.
    pub fn upload(file_name: impl Into<String>, source: std::io::Error) -> Self {
        Self::Upload {
            file_name: file_name.into(),
            source,
        }
    }

    /// Creates a response read error.
    pub fn response(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Response {
            url: url.into(),
            source,
        }
    }

    /// Creates a malformed JSON body error.
    pub fn malformed_json(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedBody {
            url: url.into(),
            format: "JSON",
            reason: reason.to_string(),
        }
    }

    /// Creates a malformed XML body error.
    pub fn malformed_xml(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedBody {
            url: url.into(),
            format: "XML",
            reason: reason.to_string(),
        }
    }

    /// Creates an unexpected JSON shape error.
    pub fn unexpected_shape(key: impl Into<String>, expected: &'static str) -> Self {
        Self::UnexpectedShape {
            key: key.into(),
            expected,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a tag assignment error.
    pub fn tag_assignment(app_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::TagAssignmentFailed {
            app_id: app_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Wraps an unanticipated failure with the operation that hit it.
    pub fn transport(
        operation: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            operation,
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_field_display() {
        let msg = ApiError::invalid_filter_field("F_First Name").to_string();
        assert!(msg.contains("F_First Name"), "Expected field in: {msg}");
        assert!(msg.contains("space"), "Expected reason in: {msg}");
    }

    #[test]
    fn test_list_failed_display_includes_status() {
        let error = ApiError::ListFailed {
            status: 403,
            status_text: "Forbidden".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("403"), "Expected status in: {msg}");
        assert!(msg.contains("Forbidden"), "Expected status text in: {msg}");
    }

    #[test]
    fn test_io_display_includes_path() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let msg = ApiError::io("/tmp/app.nitro_s", io_error).to_string();
        assert!(msg.contains("/tmp/app.nitro_s"), "Expected path in: {msg}");
    }

    #[test]
    fn test_transport_keeps_source() {
        let io_error = std::io::Error::other("socket closed");
        let error = ApiError::transport("export", io_error);
        assert!(error.to_string().starts_with("export failed"));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_malformed_body_names_format() {
        let msg = ApiError::malformed_xml("https://h/feed", "unexpected end").to_string();
        assert!(msg.contains("XML"), "Expected format in: {msg}");
        assert!(msg.contains("https://h/feed"), "Expected url in: {msg}");
    }
}
