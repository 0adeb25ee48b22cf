//! Response classification into a single result envelope.

use std::path::Path;

use futures_util::StreamExt;
use reqwest::{Response, StatusCode};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use super::constants::MediaTypes;
use super::xml::XmlElement;
use crate::error::ApiError;
use crate::json::normalize_id;

/// Parsed response body. Exactly one variant is populated per response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Body {
    Structured(Map<String, Value>),
    Xml(XmlElement),
    Raw(Vec<u8>),
    None,
}

/// Status and body of one API response.
///
/// A non-2xx status is not an error: it is reported here with an empty body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEnvelope {
    pub http_status: u16,
    pub status_text: String,
    pub body: Body,
}

impl ResultEnvelope {
    /// An envelope with no body.
    #[must_use]
    pub fn status_only(http_status: u16, status_text: impl Into<String>) -> Self {
        Self {
            http_status,
            status_text: status_text.into(),
            body: Body::None,
        }
    }

    /// True for 200 and 201.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        matches!(self.http_status, 200 | 201)
    }

    #[must_use]
    pub fn json(&self) -> Option<&Map<String, Value>> {
        match &self.body {
            Body::Structured(map) => Some(map),
            _ => None,
        }
    }

    #[must_use]
    pub fn xml(&self) -> Option<&XmlElement> {
        match &self.body {
            Body::Xml(element) => Some(element),
            _ => None,
        }
    }

    #[must_use]
    pub fn raw(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Takes the structured body, leaving [`Body::None`].
    pub fn take_json(&mut self) -> Option<Map<String, Value>> {
        match std::mem::replace(&mut self.body, Body::None) {
            Body::Structured(map) => Some(map),
            other => {
                self.body = other;
                None
            }
        }
    }
}

/// Reason phrase for `status`. The server's own phrase is not available, so
/// this is the registered phrase, or `HTTP <code>` for unregistered codes.
pub(crate) fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map_or_else(|| format!("HTTP {}", status.as_u16()), str::to_string)
}

/// Reads a response and classifies its body by content type.
///
/// For 200/201 with a non-empty body: JSON is parsed (a parse failure, as for
/// an empty delete response, yields [`Body::None`]); Atom is parsed into an
/// [`XmlElement`]; anything else is kept as raw bytes. The response is
/// consumed on every path.
///
/// # Errors
///
/// Returns [`ApiError::Response`] if reading the body fails and
/// [`ApiError::MalformedBody`] for unparseable Atom or a JSON body that is
/// not an object.
pub async fn dispatch(response: Response, media_types: &MediaTypes) -> Result<ResultEnvelope, ApiError> {
    let status = response.status();
    let url = response.url().to_string();
    let mut envelope = ResultEnvelope::status_only(status.as_u16(), status_text(status));

    if !envelope.is_successful() {
        debug!(url = %url, status = envelope.http_status, "non-success status, body discarded");
        return Ok(envelope);
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::response(url.clone(), e))?;
    if bytes.is_empty() {
        return Ok(envelope);
    }

    envelope.body = if content_type.starts_with(&media_types.json) {
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(mut map)) => {
                normalize_id(&mut map);
                Body::Structured(map)
            }
            Ok(_) => {
                return Err(ApiError::malformed_json(url, "top-level value is not an object"));
            }
            Err(e) => {
                debug!(url = %url, error = %e, "JSON body did not parse, treating as empty");
                Body::None
            }
        }
    } else if content_type.starts_with(&media_types.atom) {
        let text = std::str::from_utf8(&bytes).map_err(|e| ApiError::malformed_xml(url.clone(), e))?;
        Body::Xml(XmlElement::parse(text).map_err(|e| ApiError::malformed_xml(url.clone(), e))?)
    } else {
        Body::Raw(bytes.to_vec())
    };

    debug!(url = %url, status = envelope.http_status, content_type = %content_type, "dispatched response");
    Ok(envelope)
}

/// Response body streamed to the caller, for attachments and archives.
#[derive(Debug)]
pub struct AttachmentStream {
    url: String,
    http_status: u16,
    response: Response,
}

impl AttachmentStream {
    pub(crate) fn new(response: Response) -> Self {
        Self {
            url: response.url().to_string(),
            http_status: response.status().as_u16(),
            response,
        }
    }

    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.http_status
    }

    /// Next chunk of the body, or `None` at the end.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Response`] if the read fails.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ApiError> {
        let chunk = self
            .response
            .chunk()
            .await
            .map_err(|e| ApiError::response(self.url.clone(), e))?;
        Ok(chunk.map(|c| c.to_vec()))
    }

    /// Reads the remaining body into memory.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Response`] if the read fails.
    pub async fn read_to_end(self) -> Result<Vec<u8>, ApiError> {
        let url = self.url;
        self.response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ApiError::response(url, e))
    }

    /// Streams the remaining body into a new file at `path`, returning the
    /// number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Io`] for file errors and [`ApiError::Response`]
    /// for read errors.
    pub async fn write_to_file(self, path: &Path) -> Result<u64, ApiError> {
        let file = File::create(path)
            .await
            .map_err(|e| ApiError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        let mut stream = self.response.bytes_stream();
        let mut bytes_written: u64 = 0;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| ApiError::response(self.url.clone(), e))?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| ApiError::io(path, e))?;
            bytes_written += chunk.len() as u64;
        }

        writer.flush().await.map_err(|e| ApiError::io(path, e))?;
        debug!(path = %path.display(), bytes = bytes_written, "wrote response body to file");
        Ok(bytes_written)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn respond(template: ResponseTemplate) -> ResultEnvelope {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/r"))
            .respond_with(template)
            .mount(&server)
            .await;
        let response = reqwest::get(format!("{}/r", server.uri())).await.unwrap();
        dispatch(response, &MediaTypes::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_normalizes_fractional_id() {
        let envelope = respond(
            ResponseTemplate::new(200)
                .set_body_raw(r#"{"id":5.0,"name":"x"}"#, "application/json"),
        )
        .await;
        let json = envelope.json().unwrap();
        assert_eq!(json["id"], Value::from(5));
        assert!(json["id"].is_i64() || json["id"].is_u64());
        assert_eq!(json["name"], "x");
    }

    #[tokio::test]
    async fn test_dispatch_json_with_charset_parameter() {
        let envelope = respond(
            ResponseTemplate::new(201)
                .set_body_raw(r#"{"uid":"abc"}"#, "application/json;charset=UTF-8"),
        )
        .await;
        assert!(envelope.is_successful());
        assert_eq!(envelope.json().unwrap()["uid"], "abc");
    }

    #[tokio::test]
    async fn test_dispatch_unparseable_json_becomes_none() {
        let envelope = respond(
            ResponseTemplate::new(200).set_body_raw("deleted", "application/json"),
        )
        .await;
        assert_eq!(envelope.http_status, 200);
        assert_eq!(envelope.body, Body::None);
    }

    #[tokio::test]
    async fn test_dispatch_status_text_for_unregistered_code() {
        let envelope = respond(ResponseTemplate::new(599)).await;
        assert_eq!(envelope.http_status, 599);
        assert_eq!(envelope.status_text, "HTTP 599");
        assert!(!envelope.is_successful());

        let envelope = respond(ResponseTemplate::new(404)).await;
        assert_eq!(envelope.status_text, "Not Found");
    }

    #[tokio::test]
    async fn test_dispatch_empty_body_is_none() {
        let envelope = respond(ResponseTemplate::new(200)).await;
        assert_eq!(envelope.body, Body::None);
    }

    #[tokio::test]
    async fn test_dispatch_atom_parses_tree() {
        let envelope = respond(ResponseTemplate::new(200).set_body_raw(
            "<feed xmlns=\"http://www.w3.org/2005/Atom\"><entry><id>a1</id></entry></feed>",
            "application/atom+xml",
        ))
        .await;
        let feed = envelope.xml().unwrap();
        assert_eq!(feed.name, "feed");
        assert_eq!(feed.element("entry").unwrap().element("id").unwrap().text(), "a1");
    }

    #[tokio::test]
    async fn test_dispatch_other_content_type_is_raw() {
        let envelope = respond(
            ResponseTemplate::new(200)
                .set_body_raw(vec![0x50u8, 0x4b, 0x03, 0x04], "application/vnd.oasis.opendocument.spreadsheet"),
        )
        .await;
        assert_eq!(envelope.raw().unwrap(), &[0x50, 0x4b, 0x03, 0x04]);
    }

    #[tokio::test]
    async fn test_dispatch_error_status_reported_not_raised() {
        let envelope = respond(
            ResponseTemplate::new(404).set_body_raw(r#"{"error":"nope"}"#, "application/json"),
        )
        .await;
        assert_eq!(envelope.http_status, 404);
        assert_eq!(envelope.status_text, "Not Found");
        assert!(!envelope.is_successful());
        assert_eq!(envelope.body, Body::None);
    }

    #[tokio::test]
    async fn test_dispatch_malformed_atom_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<feed>", "application/atom+xml"))
            .mount(&server)
            .await;
        let response = reqwest::get(server.uri()).await.unwrap();
        let result = dispatch(response, &MediaTypes::default()).await;
        assert!(matches!(result, Err(ApiError::MalformedBody { format: "XML", .. })));
    }

    #[test]
    fn test_take_json_leaves_none() {
        let mut map = Map::new();
        map.insert("id".to_string(), Value::from(1));
        let mut envelope = ResultEnvelope {
            http_status: 200,
            status_text: "OK".to_string(),
            body: Body::Structured(map),
        };
        assert!(envelope.take_json().is_some());
        assert_eq!(envelope.body, Body::None);
    }
}
