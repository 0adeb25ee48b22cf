//! Single-part `multipart/form-data` upload bodies.
//!
//! The server expects a fixed part layout:
//!
//! ```text
//! --<boundary>
//! Content-Disposition: form-data; name="<name>"; filename="<file name>"
//! Content-Type: application/octet-stream
//! Content-Transfer-Encoding: binary
//!
//! <bytes>
//! --<boundary>--
//! ```
//!
//! The part is always declared as `application/octet-stream`, whatever media
//! type the caller gives. Existing servers are known to accept that form.
//!
//! The content is streamed in [`CHUNK_SIZE`] reads while the request is
//! sent; it is never held in memory as a whole.

use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::stream::{self, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use super::connection::Connection;
use super::constants::MediaTypes;
use crate::error::ApiError;

const LINE_FEED: &str = "\r\n";

/// Bytes read from the upload content per chunk.
pub const CHUNK_SIZE: usize = 4096;

/// Part name used when the caller has none.
pub const FALLBACK_PART_NAME: &str = "dummyFile";

/// File name used when the caller has none.
pub const FALLBACK_FILE_NAME: &str = "dummyFileName";

/// One file to upload. Lives for a single upload call.
#[derive(Debug)]
pub struct UploadTarget<R> {
    /// Form part name.
    pub name: String,
    /// File name reported in `Content-Disposition`.
    pub file_name: String,
    /// Media type the caller believes the content has. Logged only.
    pub media_type: String,
    /// Content, read to the end by the body stream and then dropped.
    pub content: R,
}

impl<R> UploadTarget<R> {
    /// Builds a target, substituting the fallback names for empty ones.
    pub fn new(name: &str, file_name: &str, media_type: &str, content: R) -> Self {
        let name = if name.is_empty() {
            FALLBACK_PART_NAME
        } else {
            name
        };
        let file_name = if file_name.is_empty() {
            FALLBACK_FILE_NAME
        } else {
            file_name
        };
        Self {
            name: name.to_string(),
            file_name: file_name.to_string(),
            media_type: media_type.to_string(),
            content,
        }
    }
}

/// A read of the upload content failed while the body was being sent.
#[derive(Debug, thiserror::Error)]
#[error("reading upload content '{file_name}' failed: {source}")]
pub(crate) struct ContentReadError {
    pub(crate) file_name: String,
    #[source]
    pub(crate) source: std::io::Error,
}

/// Generates a boundary token from the current time in milliseconds, as hex.
#[must_use]
pub fn generate_boundary() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{millis:x}")
}

/// Opening boundary and part headers, up to and including the blank line.
fn part_head(boundary: &str, name: &str, file_name: &str, part_content_type: &str) -> String {
    let mut head = String::new();
    head.push_str(&format!("--{boundary}{LINE_FEED}"));
    head.push_str(&format!(
        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"{LINE_FEED}"
    ));
    head.push_str(&format!("Content-Type: {part_content_type}{LINE_FEED}"));
    head.push_str(&format!("Content-Transfer-Encoding: binary{LINE_FEED}"));
    head.push_str(LINE_FEED);
    head
}

fn part_tail(boundary: &str) -> String {
    format!("{LINE_FEED}--{boundary}--{LINE_FEED}")
}

/// Renders the full multipart body for one part held in memory.
#[must_use]
pub fn encode_body(
    boundary: &str,
    name: &str,
    file_name: &str,
    part_content_type: &str,
    content: &[u8],
) -> Vec<u8> {
    let head = part_head(boundary, name, file_name, part_content_type);
    let tail = part_tail(boundary);

    let mut body = Vec::with_capacity(head.len() + content.len() + tail.len());
    body.extend_from_slice(head.as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(tail.as_bytes());
    body
}

/// Reads `reader` in [`CHUNK_SIZE`] pieces. Ends after the first error; the
/// reader is dropped at the end of the content.
fn content_chunks<R>(
    reader: R,
    file_name: String,
) -> impl Stream<Item = Result<Vec<u8>, ContentReadError>> + Send + 'static
where
    R: AsyncRead + Unpin + Send + 'static,
{
    stream::unfold(Some(reader), move |state| {
        let file_name = file_name.clone();
        async move {
            let mut reader = state?;
            let mut chunk = vec![0u8; CHUNK_SIZE];
            match reader.read(&mut chunk).await {
                Ok(0) => None,
                Ok(read) => {
                    chunk.truncate(read);
                    Some((Ok(chunk), Some(reader)))
                }
                Err(source) => Some((Err(ContentReadError { file_name, source }), None)),
            }
        }
    })
}

/// The whole multipart body as a stream: head, content chunks, tail.
fn body_stream<R>(
    boundary: &str,
    target: UploadTarget<R>,
    part_content_type: &str,
) -> impl Stream<Item = Result<Vec<u8>, ContentReadError>> + Send + use<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let UploadTarget {
        name,
        file_name,
        content,
        ..
    } = target;
    let head = part_head(boundary, &name, &file_name, part_content_type).into_bytes();
    let tail = part_tail(boundary).into_bytes();

    stream::once(async move { Ok(head) })
        .chain(content_chunks(content, file_name))
        .chain(stream::once(async move { Ok(tail) }))
}

/// Attaches `target` to `connection` as a streamed multipart body with a
/// fresh boundary.
///
/// The content is read while the request is sent. A failed read aborts the
/// request and surfaces from [`Connection::send`] as [`ApiError::Upload`].
///
/// # Errors
///
/// Returns [`ApiError::UnsupportedMethod`] if the connection cannot carry a
/// body.
pub fn write_multipart<R>(
    connection: Connection,
    target: UploadTarget<R>,
    media_types: &MediaTypes,
) -> Result<Connection, ApiError>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let boundary = generate_boundary();
    debug!(
        name = %target.name,
        file_name = %target.file_name,
        declared_media_type = %target.media_type,
        boundary = %boundary,
        "streaming multipart upload"
    );

    let body = reqwest::Body::wrap_stream(body_stream(&boundary, target, &media_types.octet_stream));
    let content_type = format!("{}; boundary={boundary}", media_types.multipart);
    connection.write_body(&content_type, body)
}
